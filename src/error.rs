use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("malformed {table} row: {reason}")]
    Malformed { table: &'static str, reason: String },
}

/// Failures of the AI plan adapter. All of them fall back to the rule-based planner.
#[derive(Debug, Error)]
pub enum AiError {
    #[error("AI service unavailable: {0}")]
    Unavailable(String),

    #[error("AI returned an invalid plan: {0}")]
    InvalidResponse(String),

    #[error("AI did not answer within {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("student not found: {0}")]
    StudentNotFound(String),

    #[error("could not load student {student_id}: {source}")]
    Lookup {
        student_id: String,
        #[source]
        source: StoreError,
    },

    #[error("could not save recovery plan: {0}")]
    Persistence(#[source] StoreError),
}
