//! Typed request payloads for record writes, with the field rules a record
//! must satisfy before it reaches the workspace database.

use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field} is required")]
    Missing { field: &'static str },
    #[error("{field} must be at least {min}")]
    TooSmall { field: &'static str, min: i64 },
    #[error("score must be between 0 and 100")]
    ScoreOutOfRange,
    #[error("exactly one of examId or assignmentId must be set")]
    AssessmentReference,
    #[error("{field} must be {expected}")]
    BadFormat {
        field: &'static str,
        expected: &'static str,
    },
}

impl ValidationError {
    pub fn field(&self) -> &'static str {
        match self {
            ValidationError::Missing { field }
            | ValidationError::TooSmall { field, .. }
            | ValidationError::BadFormat { field, .. } => *field,
            ValidationError::ScoreOutOfRange => "score",
            ValidationError::AssessmentReference => "examId",
        }
    }
}

fn require(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Missing { field });
    }
    Ok(())
}

fn require_rfc3339(field: &'static str, value: &str) -> Result<(), ValidationError> {
    require(field, value)?;
    chrono::DateTime::parse_from_rfc3339(value.trim()).map_err(|_| ValidationError::BadFormat {
        field,
        expected: "an RFC 3339 timestamp",
    })?;
    Ok(())
}

fn require_date(field: &'static str, value: &str) -> Result<(), ValidationError> {
    require(field, value)?;
    chrono::NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| {
        ValidationError::BadFormat {
            field,
            expected: "a YYYY-MM-DD date",
        }
    })?;
    Ok(())
}

/// Blank optional ids count as absent.
fn non_blank(v: &Option<String>) -> Option<&str> {
    v.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectInput {
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub credit: i64,
    pub semester_id: Option<i64>,
}

impl SubjectInput {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require("name", &self.name)?;
        require("code", &self.code)?;
        if self.credit < 1 {
            return Err(ValidationError::TooSmall {
                field: "credit",
                min: 1,
            });
        }
        if matches!(self.semester_id, Some(s) if s < 1) {
            return Err(ValidationError::TooSmall {
                field: "semesterId",
                min: 1,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentInput {
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub surname: String,
    pub parent_id: Option<String>,
    #[serde(default)]
    pub required_credits: i64,
}

impl StudentInput {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require("name", &self.name)?;
        require("surname", &self.surname)?;
        if self.required_credits < 1 {
            return Err(ValidationError::TooSmall {
                field: "requiredCredits",
                min: 1,
            });
        }
        Ok(())
    }

    pub fn parent_id(&self) -> Option<&str> {
        non_blank(&self.parent_id)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonInput {
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub subject_id: String,
    #[serde(default)]
    pub teacher_id: String,
    pub start_time: Option<String>,
}

impl LessonInput {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require("name", &self.name)?;
        require("subjectId", &self.subject_id)?;
        require("teacherId", &self.teacher_id)?;
        if let Some(t) = non_blank(&self.start_time) {
            require_rfc3339("startTime", t)?;
        }
        Ok(())
    }

    pub fn start_time(&self) -> Option<&str> {
        non_blank(&self.start_time)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamInput {
    pub id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub lesson_id: String,
    #[serde(default)]
    pub start_time: String,
    #[serde(default)]
    pub end_time: String,
}

impl ExamInput {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require("title", &self.title)?;
        require("lessonId", &self.lesson_id)?;
        require_rfc3339("startTime", &self.start_time)?;
        require_rfc3339("endTime", &self.end_time)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentInput {
    pub id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub lesson_id: String,
    #[serde(default)]
    pub start_date: String,
    #[serde(default)]
    pub due_date: String,
}

impl AssignmentInput {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require("title", &self.title)?;
        require("lessonId", &self.lesson_id)?;
        require_date("startDate", &self.start_date)?;
        require_date("dueDate", &self.due_date)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssessmentTarget<'a> {
    Exam(&'a str),
    Assignment(&'a str),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultInput {
    pub id: Option<String>,
    pub score: Option<f64>,
    #[serde(default)]
    pub student_id: String,
    #[serde(default)]
    pub subject_id: String,
    pub exam_id: Option<String>,
    pub assignment_id: Option<String>,
}

impl ResultInput {
    /// Returns the checked score and the single assessment it references.
    pub fn validate(&self) -> Result<(f64, AssessmentTarget<'_>), ValidationError> {
        let score = self.score.ok_or(ValidationError::Missing { field: "score" })?;
        if !score.is_finite() || !(0.0..=100.0).contains(&score) {
            return Err(ValidationError::ScoreOutOfRange);
        }
        require("studentId", &self.student_id)?;
        require("subjectId", &self.subject_id)?;
        let target = match (non_blank(&self.exam_id), non_blank(&self.assignment_id)) {
            (Some(exam), None) => AssessmentTarget::Exam(exam),
            (None, Some(assignment)) => AssessmentTarget::Assignment(assignment),
            _ => return Err(ValidationError::AssessmentReference),
        };
        Ok((score, target))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceInput {
    #[serde(default)]
    pub student_id: String,
    #[serde(default)]
    pub lesson_id: String,
    #[serde(default)]
    pub date: String,
    pub present: Option<bool>,
}

impl AttendanceInput {
    pub fn validate(&self) -> Result<bool, ValidationError> {
        require("studentId", &self.student_id)?;
        require("lessonId", &self.lesson_id)?;
        require_date("date", &self.date)?;
        self.present
            .ok_or(ValidationError::Missing { field: "present" })
    }
}
