//! Storage layer for Secure Vision
//!
//! This crate provides:
//! - SQLite persistence for users, files, shares and access logs
//! - The upload directory, including encryption at rest

pub mod db;
pub mod error;
pub mod files;
mod models;

pub use db::Storage;
pub use error::{Result, StorageError};
pub use files::{
    FileLock, FileStore, StoredFile, decrypt_file, decrypted_path, encrypt_file, encrypted_path,
    secure_filename,
};
