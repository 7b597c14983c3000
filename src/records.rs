use crate::calc::{AssessmentKind, AssessmentRef, CalcError, ScoredResult, SemesterEntry};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Teacher,
    Student,
    Parent,
    Alumni,
}

impl Role {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "teacher" => Some(Role::Teacher),
            "student" => Some(Role::Student),
            "parent" => Some(Role::Parent),
            "alumni" => Some(Role::Alumni),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Teacher => "teacher",
            Role::Student => "student",
            Role::Parent => "parent",
            Role::Alumni => "alumni",
        }
    }

    pub fn is_staff(self) -> bool {
        matches!(self, Role::Admin | Role::Teacher)
    }
}

/// The caller on whose behalf a request runs. Identity comes from the host
/// application; it is never looked up here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Viewer {
    pub role: Role,
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultScope {
    All,
    Student(String),
    TaughtBy(String),
    ChildrenOf(String),
    Nothing,
}

impl ResultScope {
    pub fn for_viewer(viewer: &Viewer) -> Self {
        match viewer.role {
            Role::Admin => ResultScope::All,
            Role::Teacher => ResultScope::TaughtBy(viewer.user_id.clone()),
            Role::Student => ResultScope::Student(viewer.user_id.clone()),
            Role::Parent => ResultScope::ChildrenOf(viewer.user_id.clone()),
            Role::Alumni => ResultScope::Nothing,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadedResult {
    pub scored: ScoredResult,
    pub student_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentRecord {
    pub id: String,
    pub name: String,
    pub surname: String,
    pub parent_id: Option<String>,
    pub required_credits: i64,
}

impl StudentRecord {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.name, self.surname)
    }
}

fn query_failed(e: rusqlite::Error) -> CalcError {
    CalcError::new("db_query_failed", e.to_string())
}

pub fn load_student(conn: &Connection, student_id: &str) -> Result<StudentRecord, CalcError> {
    conn.query_row(
        "SELECT id, name, surname, parent_id, required_credits FROM students WHERE id = ?",
        [student_id],
        |r| {
            Ok(StudentRecord {
                id: r.get(0)?,
                name: r.get(1)?,
                surname: r.get(2)?,
                parent_id: r.get(3)?,
                required_credits: r.get(4)?,
            })
        },
    )
    .optional()
    .map_err(query_failed)?
    .ok_or_else(|| CalcError::new("not_found", "student not found"))
}

/// Whether `viewer` may see data belonging to `student`.
pub fn viewer_can_see_student(
    conn: &Connection,
    viewer: &Viewer,
    student: &StudentRecord,
) -> Result<bool, CalcError> {
    match viewer.role {
        Role::Admin => Ok(true),
        Role::Student => Ok(viewer.user_id == student.id),
        Role::Parent => Ok(student.parent_id.as_deref() == Some(viewer.user_id.as_str())),
        Role::Alumni => Ok(false),
        // A teacher sees students they graded or took attendance for.
        Role::Teacher => conn
            .query_row(
                "SELECT 1 FROM results r
                 LEFT JOIN exams e ON e.id = r.exam_id
                 LEFT JOIN lessons el ON el.id = e.lesson_id
                 LEFT JOIN assignments a ON a.id = r.assignment_id
                 LEFT JOIN lessons al ON al.id = a.lesson_id
                 WHERE r.student_id = ?1 AND (el.teacher_id = ?2 OR al.teacher_id = ?2)
                 UNION ALL
                 SELECT 1 FROM attendance att
                 JOIN lessons l ON l.id = att.lesson_id
                 WHERE att.student_id = ?1 AND l.teacher_id = ?2
                 LIMIT 1",
                (&student.id, &viewer.user_id),
                |r| r.get::<_, i64>(0),
            )
            .optional()
            .map(|v| v.is_some())
            .map_err(query_failed),
    }
}

struct ResolvedRow {
    id: String,
    score: f64,
    student_id: String,
    subject_id: String,
    student_name: String,
    exam: Option<AssessmentRef>,
    assignment: Option<AssessmentRef>,
}

fn resolve_assessment(
    kind: AssessmentKind,
    id: Option<String>,
    title: Option<String>,
    subject_id: Option<String>,
    subject_credit: Option<i64>,
    teacher_id: Option<String>,
    date: Option<String>,
) -> Option<AssessmentRef> {
    // Every link in assessment -> lesson -> subject must exist.
    Some(AssessmentRef {
        kind,
        id: id?,
        title: title?,
        subject_id: subject_id?,
        subject_credit: subject_credit?,
        teacher_id,
        date,
    })
}

/// Loads results in `scope`, each resolved to its exam (preferred) or
/// assignment. Unresolvable results come back with `assessment: None`.
pub fn load_results(
    conn: &Connection,
    scope: &ResultScope,
) -> Result<Vec<LoadedResult>, CalcError> {
    let (clause, binds): (&str, Vec<Value>) = match scope {
        ResultScope::Nothing => return Ok(Vec::new()),
        ResultScope::All => ("1 = 1", Vec::new()),
        ResultScope::Student(id) => ("r.student_id = ?", vec![Value::Text(id.clone())]),
        ResultScope::ChildrenOf(id) => ("st.parent_id = ?", vec![Value::Text(id.clone())]),
        ResultScope::TaughtBy(id) => (
            "(el.teacher_id = ? OR al.teacher_id = ?)",
            vec![Value::Text(id.clone()), Value::Text(id.clone())],
        ),
    };

    let sql = format!(
        "SELECT r.id, r.score, r.student_id, r.subject_id, st.name, st.surname,
                e.id, e.title, es.id, es.credit, el.teacher_id, el.start_time,
                a.id, a.title, asub.id, asub.credit, al.teacher_id, a.start_date
         FROM results r
         JOIN students st ON st.id = r.student_id
         LEFT JOIN exams e ON e.id = r.exam_id
         LEFT JOIN lessons el ON el.id = e.lesson_id
         LEFT JOIN subjects es ON es.id = el.subject_id
         LEFT JOIN assignments a ON a.id = r.assignment_id
         LEFT JOIN lessons al ON al.id = a.lesson_id
         LEFT JOIN subjects asub ON asub.id = al.subject_id
         WHERE {}
         ORDER BY r.rowid",
        clause
    );

    let mut stmt = conn.prepare(&sql).map_err(query_failed)?;
    let rows: Vec<ResolvedRow> = stmt
        .query_map(params_from_iter(binds), |r| {
            let name: String = r.get(4)?;
            let surname: String = r.get(5)?;
            Ok(ResolvedRow {
                id: r.get(0)?,
                score: r.get(1)?,
                student_id: r.get(2)?,
                subject_id: r.get(3)?,
                student_name: format!("{} {}", name, surname),
                exam: resolve_assessment(
                    AssessmentKind::Exam,
                    r.get(6)?,
                    r.get(7)?,
                    r.get(8)?,
                    r.get(9)?,
                    r.get(10)?,
                    r.get(11)?,
                ),
                assignment: resolve_assessment(
                    AssessmentKind::Assignment,
                    r.get(12)?,
                    r.get(13)?,
                    r.get(14)?,
                    r.get(15)?,
                    r.get(16)?,
                    r.get(17)?,
                ),
            })
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(query_failed)?;

    Ok(rows
        .into_iter()
        .map(|row| {
            let assessment = row.exam.or(row.assignment);
            if assessment.is_none() {
                tracing::debug!(result_id = %row.id, "result has no resolvable assessment");
            }
            LoadedResult {
                scored: ScoredResult {
                    id: row.id,
                    student_id: row.student_id,
                    subject_id: row.subject_id,
                    score: row.score,
                    assessment,
                },
                student_name: row.student_name,
            }
        })
        .collect())
}

/// A student's results joined to their recorded subject, limited to one
/// semester and ordered by subject name. Results whose exam or assignment
/// no longer resolves are left out, as in `load_results`.
pub fn load_semester_entries(
    conn: &Connection,
    student_id: &str,
    semester_id: i64,
) -> Result<Vec<SemesterEntry>, CalcError> {
    let mut stmt = conn
        .prepare(
            "SELECT r.id, s.name, s.credit, s.semester_id, r.score
             FROM results r
             JOIN subjects s ON s.id = r.subject_id
             LEFT JOIN exams e ON e.id = r.exam_id
             LEFT JOIN lessons el ON el.id = e.lesson_id
             LEFT JOIN subjects es ON es.id = el.subject_id
             LEFT JOIN assignments a ON a.id = r.assignment_id
             LEFT JOIN lessons al ON al.id = a.lesson_id
             LEFT JOIN subjects asub ON asub.id = al.subject_id
             WHERE r.student_id = ? AND s.semester_id = ?
               AND (es.id IS NOT NULL OR asub.id IS NOT NULL)
             ORDER BY s.name, r.id",
        )
        .map_err(query_failed)?;
    stmt.query_map((student_id, semester_id), |r| {
        Ok(SemesterEntry {
            result_id: r.get(0)?,
            subject_name: r.get(1)?,
            credit: r.get(2)?,
            semester_id: r.get(3)?,
            score: r.get(4)?,
        })
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .map_err(query_failed)
}

pub fn load_attendance_marks(conn: &Connection, student_id: &str) -> Result<Vec<bool>, CalcError> {
    let mut stmt = conn
        .prepare("SELECT present FROM attendance WHERE student_id = ? ORDER BY date")
        .map_err(query_failed)?;
    stmt.query_map([student_id], |r| Ok(r.get::<_, i64>(0)? != 0))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(query_failed)
}

/// Attendance marks for every student that has at least one record, keyed
/// by student id.
pub fn load_attendance_by_student(
    conn: &Connection,
) -> Result<BTreeMap<String, (StudentRecord, Vec<bool>)>, CalcError> {
    let mut stmt = conn
        .prepare(
            "SELECT st.id, st.name, st.surname, st.parent_id, st.required_credits, a.present
             FROM attendance a
             JOIN students st ON st.id = a.student_id
             ORDER BY st.id, a.date",
        )
        .map_err(query_failed)?;
    let rows = stmt
        .query_map([], |r| {
            Ok((
                StudentRecord {
                    id: r.get(0)?,
                    name: r.get(1)?,
                    surname: r.get(2)?,
                    parent_id: r.get(3)?,
                    required_credits: r.get(4)?,
                },
                r.get::<_, i64>(5)? != 0,
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(query_failed)?;

    let mut by_student: BTreeMap<String, (StudentRecord, Vec<bool>)> = BTreeMap::new();
    for (student, present) in rows {
        by_student
            .entry(student.id.clone())
            .or_insert_with(|| (student, Vec::new()))
            .1
            .push(present);
    }
    Ok(by_student)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calc::credit_summary;
    use crate::db;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_workspace(prefix: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "{}-{}",
            prefix,
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ))
    }

    fn seed(conn: &Connection) {
        conn.execute_batch(
            "INSERT INTO subjects(id, name, code, credit, semester_id) VALUES
                ('math', 'Engineering Mathematics I', 'ENGR101', 5, 1),
                ('phys', 'Engineering Physics', 'ENGR102', 4, 1);
             INSERT INTO students(id, name, surname, parent_id, required_credits) VALUES
                ('s1', 'Ada', 'Lovelace', 'p1', 20),
                ('s2', 'Alan', 'Turing', 'p2', 20);
             INSERT INTO lessons(id, name, subject_id, teacher_id, start_time) VALUES
                ('l1', 'Lec1', 'math', 't1', '2025-08-01T09:00:00Z'),
                ('l2', 'Lec2', 'phys', 't2', '2025-08-02T09:00:00Z');
             INSERT INTO exams(id, title, lesson_id, start_time, end_time) VALUES
                ('e1', 'Midterm', 'l1', '2025-09-01T09:00:00Z', '2025-09-01T11:00:00Z');
             INSERT INTO assignments(id, title, lesson_id, start_date, due_date) VALUES
                ('a1', 'Lab report', 'l2', '2025-09-03', '2025-09-10');
             INSERT INTO results(id, score, student_id, subject_id, exam_id, assignment_id) VALUES
                ('r1', 72, 's1', 'math', 'e1', NULL),
                ('r2', 64, 's1', 'phys', NULL, 'a1'),
                ('r3', 80, 's1', 'phys', 'gone', NULL),
                ('r4', 90, 's2', 'math', 'e1', NULL);",
        )
        .expect("seed");
    }

    #[test]
    fn results_resolve_through_lessons_and_respect_scope() {
        let ws = temp_workspace("creditd-records");
        let conn = db::open_db(&ws).expect("open db");
        seed(&conn);

        let mine = load_results(&conn, &ResultScope::Student("s1".into())).expect("load");
        assert_eq!(mine.len(), 3);
        let exam = mine[0].scored.assessment.as_ref().expect("exam resolves");
        assert_eq!(exam.kind, AssessmentKind::Exam);
        assert_eq!(exam.subject_credit, 5);
        assert_eq!(exam.date.as_deref(), Some("2025-08-01T09:00:00Z"));
        let assignment = mine[1].scored.assessment.as_ref().expect("assignment resolves");
        assert_eq!(assignment.kind, AssessmentKind::Assignment);
        assert_eq!(assignment.date.as_deref(), Some("2025-09-03"));
        assert!(mine[2].scored.assessment.is_none());

        let summary = credit_summary(20, mine.iter().map(|r| &r.scored));
        assert_eq!(summary.total_earned, 9);
        assert_eq!(summary.deficient, -11);

        let taught = load_results(&conn, &ResultScope::TaughtBy("t2".into())).expect("load");
        assert_eq!(taught.len(), 1);
        assert_eq!(taught[0].scored.id, "r2");

        let children = load_results(&conn, &ResultScope::ChildrenOf("p2".into())).expect("load");
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].student_name, "Alan Turing");

        assert!(load_results(&conn, &ResultScope::Nothing).expect("load").is_empty());
        assert_eq!(load_results(&conn, &ResultScope::All).expect("load").len(), 4);

        drop(conn);
        let _ = std::fs::remove_dir_all(ws);
    }

    #[test]
    fn viewer_visibility_follows_role() {
        let ws = temp_workspace("creditd-visibility");
        let conn = db::open_db(&ws).expect("open db");
        seed(&conn);
        let s1 = load_student(&conn, "s1").expect("student");

        let check = |role: Role, id: &str| {
            viewer_can_see_student(
                &conn,
                &Viewer {
                    role,
                    user_id: id.to_string(),
                },
                &s1,
            )
            .expect("visibility")
        };
        assert!(check(Role::Admin, "anyone"));
        assert!(check(Role::Student, "s1"));
        assert!(!check(Role::Student, "s2"));
        assert!(check(Role::Parent, "p1"));
        assert!(!check(Role::Parent, "p2"));
        assert!(check(Role::Teacher, "t2"));
        assert!(!check(Role::Teacher, "t9"));
        assert!(!check(Role::Alumni, "s1"));

        assert_eq!(
            load_student(&conn, "nobody").expect_err("missing").code,
            "not_found"
        );

        drop(conn);
        let _ = std::fs::remove_dir_all(ws);
    }

    #[test]
    fn teacher_sees_students_from_their_attendance() {
        let ws = temp_workspace("creditd-visibility-attendance");
        let conn = db::open_db(&ws).expect("open db");
        seed(&conn);
        conn.execute_batch(
            "INSERT INTO lessons(id, name, subject_id, teacher_id, start_time) VALUES
                ('l3', 'Tutorial', 'phys', 't3', NULL);
             INSERT INTO attendance(id, student_id, lesson_id, date, present) VALUES
                ('att1', 's2', 'l3', '2025-09-01', 1);",
        )
        .expect("seed attendance");
        let s2 = load_student(&conn, "s2").expect("student");

        let t3 = Viewer {
            role: Role::Teacher,
            user_id: "t3".to_string(),
        };
        let t2 = Viewer {
            role: Role::Teacher,
            user_id: "t2".to_string(),
        };
        assert!(viewer_can_see_student(&conn, &t3, &s2).expect("visibility"));
        assert!(!viewer_can_see_student(&conn, &t2, &s2).expect("visibility"));

        drop(conn);
        let _ = std::fs::remove_dir_all(ws);
    }

    #[test]
    fn semester_entries_skip_unresolvable_assessments() {
        let ws = temp_workspace("creditd-semester-entries");
        let conn = db::open_db(&ws).expect("open db");
        seed(&conn);

        // r3 points at an exam that does not exist.
        let entries = load_semester_entries(&conn, "s1", 1).expect("entries");
        let ids: Vec<&str> = entries.iter().map(|e| e.result_id.as_str()).collect();
        assert_eq!(ids, vec!["r1", "r2"]);
        assert!(load_semester_entries(&conn, "s1", 2).expect("entries").is_empty());

        drop(conn);
        let _ = std::fs::remove_dir_all(ws);
    }
}
