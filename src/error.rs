use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Cluster error: {0}")]
    Cluster(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Clone for DbError {
    fn clone(&self) -> Self {
        match self {
            DbError::Io(e) => DbError::IoError(e.to_string()),
            DbError::IoError(s) => DbError::IoError(s.clone()),
            DbError::Network(s) => DbError::Network(s.clone()),
            DbError::Serialization(s) => DbError::Serialization(s.clone()),
            DbError::Unavailable(s) => DbError::Unavailable(s.clone()),
            DbError::NotFound(s) => DbError::NotFound(s.clone()),
            DbError::InvalidArgument(s) => DbError::InvalidArgument(s.clone()),
            DbError::Configuration(s) => DbError::Configuration(s.clone()),
            DbError::Timeout(s) => DbError::Timeout(s.clone()),
            DbError::Storage(s) => DbError::Storage(s.clone()),
            DbError::Cluster(s) => DbError::Cluster(s.clone()),
            DbError::Internal(s) => DbError::Internal(s.clone()),
        }
    }
}

pub type Result<T> = std::result::Result<T, DbError>;

impl From<serde_json::Error> for DbError {
    fn from(e: serde_json::Error) -> Self {
        DbError::Serialization(e.to_string())
    }
}
