use thiserror::Error;

use crate::validation::ValidationErrors;

#[derive(Error, Debug)]
pub enum Error {
    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("File not found: {0}")]
    FileNotFound(i64),

    #[error("Access denied")]
    AccessDenied,

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Email already registered: {0}")]
    EmailTaken(String),

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationErrors),

    #[error("This feature is only available for subscribed users")]
    SubscriptionRequired,

    #[error("Invalid file type")]
    InvalidFileType,

    #[error("Could not read file contents")]
    Unreadable,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
