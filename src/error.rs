use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed caller input. No partial mutation has happened when this
    /// is returned.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A referenced filename has no catalog record where one was required.
    #[error("not found: {0}")]
    NotFound(String),

    /// None of the fallback metadata fields yielded a parseable timestamp.
    /// Fatal for the single file being reconciled; the record is left
    /// unmodified.
    #[error("no parseable timestamp among candidates: {0:?}")]
    UnparseableTimestamp(Vec<String>),

    /// Misuse of the record store: unknown field name, malformed row shape.
    /// Callers treat this as a programmer error.
    #[error("schema violation: {0}")]
    Schema(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }

    pub fn schema(msg: impl Into<String>) -> Self {
        Error::Schema(msg.into())
    }
}
