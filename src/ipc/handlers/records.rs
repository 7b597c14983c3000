use crate::intake::{
    AssessmentTarget, AssignmentInput, ExamInput, LessonInput, ResultInput, StudentInput,
    SubjectInput, ValidationError,
};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, required_str};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde_json::json;
use uuid::Uuid;

fn parse_input<T: DeserializeOwned>(req: &Request) -> Result<T, serde_json::Value> {
    serde_json::from_value(req.params.clone())
        .map_err(|e| err(&req.id, "bad_params", e.to_string(), None))
}

fn invalid(req: &Request, e: ValidationError) -> serde_json::Value {
    err(
        &req.id,
        "bad_params",
        e.to_string(),
        Some(json!({ "field": e.field() })),
    )
}

fn record_id(id: &Option<String>) -> String {
    id.as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

// `table` is always one of the fixed names below, never caller input.
fn row_exists(conn: &Connection, table: &'static str, id: &str) -> rusqlite::Result<bool> {
    let sql = format!("SELECT 1 FROM {} WHERE id = ?", table);
    conn.query_row(&sql, [id], |r| r.get::<_, i64>(0))
        .optional()
        .map(|v| v.is_some())
}

/// Fails with `not_found` unless `table` has a row with `id`.
fn ensure_exists(
    conn: &Connection,
    req: &Request,
    table: &'static str,
    what: &str,
    id: &str,
) -> Result<(), serde_json::Value> {
    match row_exists(conn, table, id) {
        Ok(true) => Ok(()),
        Ok(false) => Err(err(
            &req.id,
            "not_found",
            format!("{} not found", what),
            Some(json!({ "id": id })),
        )),
        Err(e) => Err(err(&req.id, "db_query_failed", e.to_string(), None)),
    }
}

fn handle_subjects_upsert(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let input: SubjectInput = match parse_input(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    if let Err(e) = input.validate() {
        return invalid(req, e);
    }
    let id = record_id(&input.id);
    if let Err(e) = conn.execute(
        "INSERT INTO subjects(id, name, code, credit, semester_id) VALUES(?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
           name = excluded.name,
           code = excluded.code,
           credit = excluded.credit,
           semester_id = excluded.semester_id",
        (
            &id,
            input.name.trim(),
            input.code.trim(),
            input.credit,
            input.semester_id,
        ),
    ) {
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "subjectId": id }))
}

fn handle_subjects_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let semester_id = req.params.get("semesterId").and_then(|v| v.as_i64());
    let mut stmt = match conn.prepare(
        "SELECT id, name, code, credit, semester_id
         FROM subjects
         WHERE (?1 IS NULL OR semester_id = ?1)
         ORDER BY semester_id, name",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([semester_id], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "name": r.get::<_, String>(1)?,
                "code": r.get::<_, String>(2)?,
                "credit": r.get::<_, i64>(3)?,
                "semesterId": r.get::<_, Option<i64>>(4)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    match rows {
        Ok(subjects) => ok(&req.id, json!({ "subjects": subjects })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_students_upsert(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let input: StudentInput = match parse_input(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    if let Err(e) = input.validate() {
        return invalid(req, e);
    }
    let id = record_id(&input.id);
    if let Err(e) = conn.execute(
        "INSERT INTO students(id, name, surname, parent_id, required_credits) VALUES(?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
           name = excluded.name,
           surname = excluded.surname,
           parent_id = excluded.parent_id,
           required_credits = excluded.required_credits",
        (
            &id,
            input.name.trim(),
            input.surname.trim(),
            input.parent_id(),
            input.required_credits,
        ),
    ) {
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "studentId": id }))
}

fn handle_lessons_upsert(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let input: LessonInput = match parse_input(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    if let Err(e) = input.validate() {
        return invalid(req, e);
    }
    let subject_id = input.subject_id.trim();
    if let Err(e) = ensure_exists(conn, req, "subjects", "subject", subject_id) {
        return e;
    }
    let id = record_id(&input.id);
    if let Err(e) = conn.execute(
        "INSERT INTO lessons(id, name, subject_id, teacher_id, start_time) VALUES(?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
           name = excluded.name,
           subject_id = excluded.subject_id,
           teacher_id = excluded.teacher_id,
           start_time = excluded.start_time",
        (
            &id,
            input.name.trim(),
            subject_id,
            input.teacher_id.trim(),
            input.start_time(),
        ),
    ) {
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "lessonId": id }))
}

fn handle_exams_upsert(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let input: ExamInput = match parse_input(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    if let Err(e) = input.validate() {
        return invalid(req, e);
    }
    let lesson_id = input.lesson_id.trim();
    if let Err(e) = ensure_exists(conn, req, "lessons", "lesson", lesson_id) {
        return e;
    }
    let id = record_id(&input.id);
    if let Err(e) = conn.execute(
        "INSERT INTO exams(id, title, lesson_id, start_time, end_time) VALUES(?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
           title = excluded.title,
           lesson_id = excluded.lesson_id,
           start_time = excluded.start_time,
           end_time = excluded.end_time",
        (
            &id,
            input.title.trim(),
            lesson_id,
            input.start_time.trim(),
            input.end_time.trim(),
        ),
    ) {
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "examId": id }))
}

fn handle_assignments_upsert(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let input: AssignmentInput = match parse_input(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    if let Err(e) = input.validate() {
        return invalid(req, e);
    }
    let lesson_id = input.lesson_id.trim();
    if let Err(e) = ensure_exists(conn, req, "lessons", "lesson", lesson_id) {
        return e;
    }
    let id = record_id(&input.id);
    if let Err(e) = conn.execute(
        "INSERT INTO assignments(id, title, lesson_id, start_date, due_date) VALUES(?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
           title = excluded.title,
           lesson_id = excluded.lesson_id,
           start_date = excluded.start_date,
           due_date = excluded.due_date",
        (
            &id,
            input.title.trim(),
            lesson_id,
            input.start_date.trim(),
            input.due_date.trim(),
        ),
    ) {
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "assignmentId": id }))
}

fn handle_results_upsert(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let input: ResultInput = match parse_input(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let (score, target) = match input.validate() {
        Ok(v) => v,
        Err(e) => return invalid(req, e),
    };
    let student_id = input.student_id.trim();
    let subject_id = input.subject_id.trim();
    if let Err(e) = ensure_exists(conn, req, "students", "student", student_id) {
        return e;
    }
    if let Err(e) = ensure_exists(conn, req, "subjects", "subject", subject_id) {
        return e;
    }
    let (exam_id, assignment_id) = match target {
        AssessmentTarget::Exam(id) => {
            if let Err(e) = ensure_exists(conn, req, "exams", "exam", id) {
                return e;
            }
            (Some(id), None)
        }
        AssessmentTarget::Assignment(id) => {
            if let Err(e) = ensure_exists(conn, req, "assignments", "assignment", id) {
                return e;
            }
            (None, Some(id))
        }
    };

    let id = record_id(&input.id);
    if let Err(e) = conn.execute(
        "INSERT INTO results(id, score, student_id, subject_id, exam_id, assignment_id)
         VALUES(?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
           score = excluded.score,
           student_id = excluded.student_id,
           subject_id = excluded.subject_id,
           exam_id = excluded.exam_id,
           assignment_id = excluded.assignment_id",
        (&id, score, student_id, subject_id, exam_id, assignment_id),
    ) {
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "resultId": id }))
}

fn handle_results_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let result_id = match required_str(req, "resultId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match conn.execute("DELETE FROM results WHERE id = ?", [&result_id]) {
        Ok(0) => err(&req.id, "not_found", "result not found", None),
        Ok(_) => ok(&req.id, json!({ "ok": true })),
        Err(e) => err(&req.id, "db_delete_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "subjects.upsert" => Some(handle_subjects_upsert(state, req)),
        "subjects.list" => Some(handle_subjects_list(state, req)),
        "students.upsert" => Some(handle_students_upsert(state, req)),
        "lessons.upsert" => Some(handle_lessons_upsert(state, req)),
        "exams.upsert" => Some(handle_exams_upsert(state, req)),
        "assignments.upsert" => Some(handle_assignments_upsert(state, req)),
        "results.upsert" => Some(handle_results_upsert(state, req)),
        "results.delete" => Some(handle_results_delete(state, req)),
        _ => None,
    }
}
