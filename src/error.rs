use std::fmt;

#[derive(Debug)]
pub enum AppError {
    DatabaseError(String),
    RemoteError(String),
    BlobError(String),
    NotFound(String),
    DeserializationError(String),
    ConfigurationError(String),
    MigrationError(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::DatabaseError(msg) => write!(f, "Database error: {}", msg),
            AppError::RemoteError(msg) => write!(f, "Remote API error: {}", msg),
            AppError::BlobError(msg) => write!(f, "Attachment blob error: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::DeserializationError(msg) => write!(f, "Deserialization error: {}", msg),
            AppError::ConfigurationError(msg) => write!(f, "Configuration error: {}", msg),
            AppError::MigrationError(msg) => write!(f, "Migration error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;
