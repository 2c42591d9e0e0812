use serde_json::json;

use super::model::LessonRef;

pub type SchedResult<T> = Result<T, SchedError>;

/// Failure kinds surfaced to callers. Every variant is terminal for the
/// attempt; nothing in the engine retries.
#[derive(Debug, thiserror::Error)]
pub enum SchedError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    InvalidWeek(String),

    #[error("{0}")]
    DateMismatch(String),

    #[error("{0}")]
    DeadlineExceeded(String),

    #[error("{message}")]
    Conflict {
        message: String,
        lesson: Option<LessonRef>,
    },

    #[error("{0}")]
    SlotUnavailable(String),

    #[error("{0}")]
    BadParams(String),

    #[error("storage failure: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl SchedError {
    pub fn conflict(message: impl Into<String>) -> Self {
        SchedError::Conflict {
            message: message.into(),
            lesson: None,
        }
    }

    pub fn lesson_conflict(message: impl Into<String>, lesson: LessonRef) -> Self {
        SchedError::Conflict {
            message: message.into(),
            lesson: Some(lesson),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            SchedError::NotFound(_) => "not_found",
            SchedError::Forbidden(_) => "forbidden",
            SchedError::InvalidWeek(_) => "invalid_week",
            SchedError::DateMismatch(_) => "date_mismatch",
            SchedError::DeadlineExceeded(_) => "deadline_exceeded",
            SchedError::Conflict { .. } => "conflict",
            SchedError::SlotUnavailable(_) => "slot_unavailable",
            SchedError::BadParams(_) => "bad_params",
            SchedError::Storage(_) => "db_query_failed",
            SchedError::Internal(_) => "internal",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            SchedError::NotFound(_) => 404,
            SchedError::Forbidden(_) => 403,
            SchedError::InvalidWeek(_)
            | SchedError::DateMismatch(_)
            | SchedError::DeadlineExceeded(_)
            | SchedError::BadParams(_) => 400,
            SchedError::Conflict { .. } | SchedError::SlotUnavailable(_) => 409,
            SchedError::Storage(_) | SchedError::Internal(_) => 500,
        }
    }

    pub fn details(&self) -> serde_json::Value {
        let mut details = json!({ "httpStatus": self.http_status() });
        if let SchedError::Conflict {
            lesson: Some(lesson),
            ..
        } = self
        {
            details["conflictingLesson"] = json!(lesson);
        }
        details
    }
}

/// Maps a unique-index violation on `individual_bookings` to the outcome the
/// losing writer should see. Anything else stays a storage failure.
pub fn classify_booking_write(e: rusqlite::Error) -> SchedError {
    if let rusqlite::Error::SqliteFailure(ref f, Some(ref msg)) = e {
        if f.code == rusqlite::ErrorCode::ConstraintViolation && msg.contains("UNIQUE") {
            if msg.contains("student_id") {
                return SchedError::conflict("student already has a booking for this week");
            }
            return SchedError::SlotUnavailable("requested slot is no longer available".into());
        }
    }
    SchedError::Storage(e)
}
