//! Storage errors.

/// Errors that can occur when reading or writing the database.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Database lock poisoned")]
    Poisoned,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Parent comment {0} not found")]
    ParentNotFound(String),

    #[error("Not allowed to modify this comment")]
    Forbidden,

    #[error("Too many comments, retry in {retry_after}s")]
    RateLimited { retry_after: i64 },

    #[error("Invalid input: {0}")]
    Invalid(String),
}
