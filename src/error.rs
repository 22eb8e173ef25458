//! Error types for the industry planner

use thiserror::Error;

/// Result type used across the library
pub type Result<T> = std::result::Result<T, PlannerError>;

#[derive(Debug, Error)]
pub enum PlannerError {
    /// A product, process, building, plan or node id that does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// A structural operation that was rejected without touching the plan
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// The remote location service failed; callers keep their cached state
    #[error("external service failure: {0}")]
    ExternalServiceFailure(String),

    /// Plan title already used by another saved plan
    #[error("a plan titled '{0}' already exists")]
    ReservedNameConflict(String),

    #[error("plan generation was cancelled")]
    Cancelled,

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl PlannerError {
    pub fn not_found(what: impl std::fmt::Display) -> Self {
        PlannerError::NotFound(what.to_string())
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        PlannerError::InvalidOperation(msg.into())
    }
}
