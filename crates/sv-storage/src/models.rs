//! Row mapping between SQLite and the core models
//!
//! Timestamps are stored as unix seconds.

use std::str::FromStr;

use anyhow::anyhow;
use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use sv_core::{AccessAction, AccessLog, FileRecord, FileShare, User};
use time::OffsetDateTime;

use crate::Result;

pub(crate) fn timestamp(secs: i64) -> Result<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp(secs)
        .map_err(|e| anyhow!("invalid stored timestamp {}: {}", secs, e).into())
}

pub(crate) fn user_from_row(row: &SqliteRow) -> Result<User> {
    let expires: Option<i64> = row.try_get("subscription_expires_at")?;
    Ok(User {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        is_admin: row.try_get("is_admin")?,
        is_subscribed: row.try_get("is_subscribed")?,
        subscription_count: row.try_get("subscription_count")?,
        subscription_expires_at: expires.map(timestamp).transpose()?,
        created_at: timestamp(row.try_get("created_at")?)?,
    })
}

pub(crate) fn file_from_row(row: &SqliteRow) -> Result<FileRecord> {
    Ok(FileRecord {
        id: row.try_get("id")?,
        filename: row.try_get("filename")?,
        original_filename: row.try_get("original_filename")?,
        file_path: row.try_get("file_path")?,
        content_hash: row.try_get("content_hash")?,
        is_encrypted: row.try_get("is_encrypted")?,
        has_sensitive_data: row.try_get("has_sensitive_data")?,
        sensitive_data_types: row.try_get("sensitive_data_types")?,
        user_id: row.try_get("user_id")?,
        created_at: timestamp(row.try_get("created_at")?)?,
    })
}

pub(crate) fn share_from_row(row: &SqliteRow) -> Result<FileShare> {
    Ok(FileShare {
        id: row.try_get("id")?,
        file_id: row.try_get("file_id")?,
        shared_with_id: row.try_get("shared_with_id")?,
        can_edit: row.try_get("can_edit")?,
        created_at: timestamp(row.try_get("created_at")?)?,
    })
}

pub(crate) fn access_log_from_row(row: &SqliteRow) -> Result<AccessLog> {
    let action: String = row.try_get("action")?;
    let action = AccessAction::from_str(&action).map_err(|e| anyhow!(e))?;
    Ok(AccessLog {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        file_id: row.try_get("file_id")?,
        action,
        ip_address: row.try_get("ip_address")?,
        user_agent: row.try_get("user_agent")?,
        timestamp: timestamp(row.try_get("timestamp")?)?,
    })
}
