//! Stored document domain model

use serde::Serialize;
use time::OffsetDateTime;

/// Suffix appended to the stored path once a file is encrypted
pub const ENCRYPTED_SUFFIX: &str = ".encrypted";

#[derive(Debug, Clone, Serialize)]
pub struct FileRecord {
    pub id: i64,
    /// Sanitised name used on disk
    pub filename: String,
    /// Name as uploaded, used for downloads
    pub original_filename: String,
    pub file_path: String,
    /// BLAKE3 of the uploaded plaintext
    pub content_hash: String,
    pub is_encrypted: bool,
    pub has_sensitive_data: bool,
    /// Comma-joined category names recorded at upload
    pub sensitive_data_types: String,
    pub user_id: i64,
    #[serde(with = "time::serde::timestamp")]
    pub created_at: OffsetDateTime,
}

impl FileRecord {
    /// Name offered to the client when downloading the stored bytes
    pub fn download_name(&self) -> String {
        if self.is_encrypted {
            format!("{}{}", self.original_filename, ENCRYPTED_SUFFIX)
        } else {
            self.original_filename.clone()
        }
    }

    pub fn sensitive_types(&self) -> Vec<String> {
        self.sensitive_data_types
            .split(',')
            .filter(|t| !t.is_empty())
            .map(String::from)
            .collect()
    }
}

/// File row ready to be inserted
#[derive(Debug, Clone)]
pub struct NewFileRecord {
    pub filename: String,
    pub original_filename: String,
    pub file_path: String,
    pub content_hash: String,
    pub has_sensitive_data: bool,
    pub sensitive_data_types: String,
    pub user_id: i64,
}

/// Grant of access to another account
#[derive(Debug, Clone, Serialize)]
pub struct FileShare {
    pub id: i64,
    pub file_id: i64,
    pub shared_with_id: i64,
    pub can_edit: bool,
    #[serde(with = "time::serde::timestamp")]
    pub created_at: OffsetDateTime,
}
