use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("not found")]
    NotFound,

    /// The row exists but has been soft-deleted.
    #[error("gone")]
    Gone,

    #[error("name already exists: {0}")]
    NameConflict(String),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("a unit of work is already open on this thread")]
    NestedUnitOfWork,

    #[error("token lookup collision")]
    TokenLookupCollision,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid token format")]
    InvalidTokenFormat,

    #[error("token hashing failed: {0}")]
    TokenHash(String),
}

pub type Result<T> = std::result::Result<T, Error>;
