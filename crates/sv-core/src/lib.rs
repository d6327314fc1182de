//! Core domain models for Secure Vision
//!
//! This crate contains:
//! - Domain models (User, FileRecord, FileShare, AccessLog)
//! - The shared error type
//! - Input validation ahead of persistence

pub mod access;
pub mod error;
pub mod file;
pub mod user;
pub mod validation;

pub use access::{AccessAction, AccessLog, Viewer};
pub use error::{Error, Result};
pub use file::{ENCRYPTED_SUFFIX, FileRecord, FileShare, NewFileRecord};
pub use user::{NewUser, User};
pub use validation::{
    FieldError, LoginForm, RegistrationForm, ShareForm, UploadForm, ValidationErrors,
};
