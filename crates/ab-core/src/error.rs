use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("malformed markup: {0}")]
    Markup(String),

    #[error("invalid category {path}: {reason}")]
    InvalidCategory { path: String, reason: String },

    #[error("bad interchange record: {0}")]
    Record(String),

    #[error("external service failed: {0}")]
    Service(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
