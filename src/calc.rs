use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Serialize, thiserror::Error)]
#[error("{code}: {message}")]
pub struct CalcError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl CalcError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Half-up rounding to one decimal place: `floor(10*x + 0.5) / 10`.
pub fn round_off_1_decimal(x: f64) -> f64 {
    ((10.0 * x) + 0.5).floor() / 10.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LetterGrade {
    pub grade: &'static str,
    pub grade_point: u32,
}

// Highest floor first; the first floor the score reaches wins.
const GRADE_SCALE: [(f64, &str, u32); 7] = [
    (90.0, "O", 10),
    (80.0, "S", 9),
    (70.0, "A", 8),
    (60.0, "B", 7),
    (50.0, "C", 6),
    (45.0, "D", 5),
    (40.0, "E", 4),
];

/// Maps any score to its letter grade. Out-of-range input is not an error;
/// NaN fails every comparison and lands on F.
pub fn letter_grade(score: f64) -> LetterGrade {
    for &(floor, grade, grade_point) in GRADE_SCALE.iter() {
        if score >= floor {
            return LetterGrade { grade, grade_point };
        }
    }
    LetterGrade {
        grade: "F",
        grade_point: 0,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentKind {
    Exam,
    Assignment,
}

impl AssessmentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AssessmentKind::Exam => "exam",
            AssessmentKind::Assignment => "assignment",
        }
    }
}

/// The exam or assignment a result points at, resolved through its lesson.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentRef {
    pub kind: AssessmentKind,
    pub id: String,
    pub title: String,
    pub subject_id: String,
    pub subject_credit: i64,
    pub teacher_id: Option<String>,
    pub date: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredResult {
    pub id: String,
    pub student_id: String,
    pub subject_id: String,
    pub score: f64,
    /// `None` when neither the exam nor the assignment reference resolves.
    pub assessment: Option<AssessmentRef>,
}

/// Credits a single result earns against its assessment's subject.
///
/// The pass gate is the strict `score > 39`, so 39.5 earns credit. The
/// result's recorded subject must also match the assessment's subject.
pub fn awarded_credits(
    result: &ScoredResult,
    assessment_subject_credit: i64,
    assessment_subject_id: &str,
) -> i64 {
    if result.score > 39.0 && result.subject_id == assessment_subject_id {
        assessment_subject_credit
    } else {
        0
    }
}

/// Like [`awarded_credits`], resolving the assessment from the result itself.
pub fn result_credits(result: &ScoredResult) -> i64 {
    match &result.assessment {
        Some(a) => awarded_credits(result, a.subject_credit, &a.subject_id),
        None => 0,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditSummary {
    pub total_earned: i64,
    pub required: i64,
    /// `total_earned - required`, signed and never clamped.
    pub deficient: i64,
}

impl CreditSummary {
    /// Credits still to earn, floored at zero. Display only.
    pub fn outstanding(&self) -> i64 {
        (self.required - self.total_earned).max(0)
    }
}

/// Sums awarded credits over a student's complete result set.
pub fn credit_summary<'a, I>(required_credits: i64, results: I) -> CreditSummary
where
    I: IntoIterator<Item = &'a ScoredResult>,
{
    let total_earned: i64 = results
        .into_iter()
        .filter(|r| r.assessment.is_some())
        .map(result_credits)
        .sum();
    CreditSummary {
        total_earned,
        required: required_credits,
        deficient: total_earned - required_credits,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SemesterEntry {
    pub result_id: String,
    pub subject_name: String,
    pub credit: i64,
    pub semester_id: Option<i64>,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SemesterRow {
    pub result_id: String,
    pub subject_name: String,
    pub credit: i64,
    pub score: f64,
    pub letter_grade: &'static str,
    pub grade_point: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Classification {
    #[serde(rename = "First Class with Distinction")]
    FirstClassWithDistinction,
    #[serde(rename = "First Class")]
    FirstClass,
    #[serde(rename = "Second Class")]
    SecondClass,
    #[serde(rename = "Below Second Class")]
    BelowSecondClass,
}

impl Classification {
    pub fn from_cgpa(cgpa: f64) -> Self {
        if cgpa >= 7.75 {
            Classification::FirstClassWithDistinction
        } else if cgpa >= 6.75 {
            Classification::FirstClass
        } else if cgpa >= 5.75 {
            Classification::SecondClass
        } else {
            Classification::BelowSecondClass
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Classification::FirstClassWithDistinction => "First Class with Distinction",
            Classification::FirstClass => "First Class",
            Classification::SecondClass => "Second Class",
            Classification::BelowSecondClass => "Below Second Class",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SemesterReport {
    pub semester_id: i64,
    pub rows: Vec<SemesterRow>,
    pub total_credits_attempted: i64,
    pub total_credits_earned: i64,
    pub total_grade_points: i64,
    pub sgpa: f64,
    /// Alias of `sgpa`; there is no multi-semester rollup here.
    pub cgpa: f64,
    pub classification: Classification,
}

/// Grades every attempted subject of one semester.
///
/// Unlike the credit award rule, every row counts toward the GPA whether it
/// passed or not, and "earned" uses the inclusive `score >= 40`.
pub fn semester_report(semester_id: i64, entries: &[SemesterEntry]) -> SemesterReport {
    let rows: Vec<SemesterRow> = entries
        .iter()
        .filter(|e| e.semester_id == Some(semester_id))
        .map(|e| {
            let g = letter_grade(e.score);
            SemesterRow {
                result_id: e.result_id.clone(),
                subject_name: e.subject_name.clone(),
                credit: e.credit,
                score: e.score,
                letter_grade: g.grade,
                grade_point: g.grade_point,
            }
        })
        .collect();

    let mut total_credits_attempted = 0_i64;
    let mut total_credits_earned = 0_i64;
    let mut total_grade_points = 0_i64;
    for row in &rows {
        total_credits_attempted += row.credit;
        if row.score >= 40.0 {
            total_credits_earned += row.credit;
        }
        total_grade_points += row.credit * i64::from(row.grade_point);
    }

    let sgpa = if total_credits_attempted > 0 {
        total_grade_points as f64 / total_credits_attempted as f64
    } else {
        0.0
    };
    let cgpa = sgpa;

    SemesterReport {
        semester_id,
        rows,
        total_credits_attempted,
        total_credits_earned,
        total_grade_points,
        sgpa,
        cgpa,
        classification: Classification::from_cgpa(cgpa),
    }
}

/// Mean SGPA over the semesters that are not N/A (`None`).
pub fn cumulative_gpa(sgpas: &[Option<f64>]) -> Result<f64, CalcError> {
    let valid: Vec<f64> = sgpas.iter().flatten().copied().collect();
    if valid.is_empty() {
        return Err(CalcError::new("bad_params", "at least one semester is required"));
    }
    if let Some(bad) = valid.iter().find(|v| !v.is_finite() || **v < 0.0 || **v > 10.0) {
        return Err(
            CalcError::new("bad_params", "SGPA must be between 0 and 10")
                .with_details(serde_json::json!({ "sgpa": bad })),
        );
    }
    Ok(valid.iter().sum::<f64>() / valid.len() as f64)
}

pub fn cgpa_to_percentage(cgpa: f64) -> Result<f64, CalcError> {
    if !cgpa.is_finite() || !(0.0..=10.0).contains(&cgpa) {
        return Err(CalcError::new("bad_params", "CGPA must be between 0 and 10"));
    }
    Ok((cgpa - 0.75) * 10.0)
}

pub const DEFAULT_LOW_ATTENDANCE_PERCENT: f64 = 75.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceSummary {
    pub total: usize,
    pub present: usize,
    pub percentage: f64,
}

impl AttendanceSummary {
    pub fn is_low(&self, threshold_percent: f64) -> bool {
        self.percentage < threshold_percent
    }
}

/// Present/total over a student's attendance marks; `None` with no marks.
pub fn attendance_summary<I>(marks: I) -> Option<AttendanceSummary>
where
    I: IntoIterator<Item = bool>,
{
    let mut total = 0_usize;
    let mut present = 0_usize;
    for m in marks {
        total += 1;
        if m {
            present += 1;
        }
    }
    if total == 0 {
        return None;
    }
    Some(AttendanceSummary {
        total,
        present,
        percentage: (present as f64 / total as f64) * 100.0,
    })
}
