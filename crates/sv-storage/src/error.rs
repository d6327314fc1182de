//! Error types for sv-storage

use sv_security::CodecError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<StorageError> for sv_core::Error {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Io(e) => sv_core::Error::Io(e),
            StorageError::Codec(e) => sv_core::Error::Encryption(e.to_string()),
            StorageError::Other(e) => sv_core::Error::Other(e),
            other => sv_core::Error::Database(other.to_string()),
        }
    }
}
