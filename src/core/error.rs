use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("database '{0}' is already registered")]
    DuplicateName(String),

    #[error("database '{0}' is not registered")]
    NotRegistered(String),

    #[error("invalid filter pattern: {0}")]
    PatternSyntax(#[from] regex::Error),

    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("field '{0}' has no unique index")]
    MissingUniqueIndex(String),

    #[error("document {0} does not exist")]
    UnknownDocument(u64),

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("lock error: {0}")]
    LockError(String),
}

pub type Result<T> = std::result::Result<T, DbError>;

impl<T> From<std::sync::PoisonError<T>> for DbError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

impl From<serde_json::Error> for DbError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}
