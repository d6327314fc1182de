//! Database operations

use std::path::PathBuf;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sv_core::{AccessAction, AccessLog, FileRecord, FileShare, NewFileRecord, NewUser, User};
use time::OffsetDateTime;

use crate::models::{access_log_from_row, file_from_row, share_from_row, user_from_row};
use crate::{Result, StorageError};

const MIGRATIONS: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        email TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        is_admin INTEGER NOT NULL DEFAULT 0,
        is_subscribed INTEGER NOT NULL DEFAULT 0,
        subscription_count INTEGER NOT NULL DEFAULT 0,
        subscription_expires_at INTEGER,
        created_at INTEGER NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS files (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        filename TEXT NOT NULL,
        original_filename TEXT NOT NULL,
        file_path TEXT NOT NULL,
        content_hash TEXT NOT NULL,
        is_encrypted INTEGER NOT NULL DEFAULT 0,
        has_sensitive_data INTEGER NOT NULL DEFAULT 0,
        sensitive_data_types TEXT NOT NULL DEFAULT '',
        user_id INTEGER NOT NULL REFERENCES users(id),
        created_at INTEGER NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS file_shares (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        file_id INTEGER NOT NULL REFERENCES files(id),
        shared_with_id INTEGER NOT NULL REFERENCES users(id),
        can_edit INTEGER NOT NULL DEFAULT 0,
        created_at INTEGER NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS access_logs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL REFERENCES users(id),
        file_id INTEGER NOT NULL REFERENCES files(id),
        action TEXT NOT NULL,
        ip_address TEXT,
        user_agent TEXT,
        timestamp INTEGER NOT NULL
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_files_user ON files(user_id)",
    "CREATE INDEX IF NOT EXISTS idx_shares_file ON file_shares(file_id, shared_with_id)",
    "CREATE INDEX IF NOT EXISTS idx_logs_file ON access_logs(file_id, timestamp)",
];

/// Main storage interface
#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    /// Open (creating if needed) the database and run migrations.
    /// `None` uses the platform data directory.
    pub async fn new(db_path: Option<PathBuf>) -> Result<Self> {
        let path = match db_path {
            Some(path) => path,
            None => Self::default_path(),
        };
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let storage = Self { pool };
        storage.migrate().await?;
        tracing::debug!("Opened database at {}", path.display());
        Ok(storage)
    }

    /// Private in-memory database, used by tests
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .in_memory(true)
            .foreign_keys(true);
        // A single connection keeps every query on the same memory database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let storage = Self { pool };
        storage.migrate().await?;
        Ok(storage)
    }

    fn default_path() -> PathBuf {
        if let Some(dirs) = directories::ProjectDirs::from("com", "securevision", "sv") {
            dirs.data_dir().join("secure_vision.db")
        } else {
            PathBuf::from("secure_vision.db")
        }
    }

    async fn migrate(&self) -> Result<()> {
        for statement in MIGRATIONS {
            sqlx::query(*statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    // ---- users ----

    pub async fn create_user(&self, user: &NewUser) -> Result<User> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let result = sqlx::query(
            "INSERT INTO users (email, password_hash, is_admin, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.is_admin)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.get_user(result.last_insert_rowid()).await
    }

    pub async fn get_user(&self, id: i64) -> Result<User> {
        let row = sqlx::query("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("user {}", id)))?;
        user_from_row(&row)
    }

    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    pub async fn list_users(&self) -> Result<Vec<User>> {
        let rows = sqlx::query("SELECT * FROM users ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(user_from_row).collect()
    }

    /// Persist the subscription fields of `user`
    pub async fn update_subscription(&self, user: &User) -> Result<()> {
        let result = sqlx::query(
            "UPDATE users SET is_subscribed = ?, subscription_count = ?, subscription_expires_at = ? WHERE id = ?",
        )
        .bind(user.is_subscribed)
        .bind(user.subscription_count)
        .bind(user.subscription_expires_at.map(|t| t.unix_timestamp()))
        .bind(user.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("user {}", user.id)));
        }
        Ok(())
    }

    /// Spend one subscription credit; returns false when none were left
    pub async fn consume_credit(&self, user_id: i64) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE users SET subscription_count = subscription_count - 1 WHERE id = ? AND subscription_count > 0",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    // ---- files ----

    pub async fn create_file(&self, file: &NewFileRecord) -> Result<FileRecord> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let result = sqlx::query(
            r#"INSERT INTO files
                (filename, original_filename, file_path, content_hash, is_encrypted,
                 has_sensitive_data, sensitive_data_types, user_id, created_at)
               VALUES (?, ?, ?, ?, 0, ?, ?, ?, ?)"#,
        )
        .bind(&file.filename)
        .bind(&file.original_filename)
        .bind(&file.file_path)
        .bind(&file.content_hash)
        .bind(file.has_sensitive_data)
        .bind(&file.sensitive_data_types)
        .bind(file.user_id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.get_file(result.last_insert_rowid()).await
    }

    pub async fn get_file(&self, id: i64) -> Result<FileRecord> {
        let row = sqlx::query("SELECT * FROM files WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("file {}", id)))?;
        file_from_row(&row)
    }

    pub async fn list_files_for_user(&self, user_id: i64) -> Result<Vec<FileRecord>> {
        let rows = sqlx::query("SELECT * FROM files WHERE user_id = ? ORDER BY created_at DESC, id DESC")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(file_from_row).collect()
    }

    /// Files shared with `user_id` by other owners
    pub async fn list_files_shared_with(&self, user_id: i64) -> Result<Vec<FileRecord>> {
        let rows = sqlx::query(
            r#"SELECT DISTINCT f.* FROM files f
               JOIN file_shares s ON s.file_id = f.id
               WHERE s.shared_with_id = ?
               ORDER BY f.created_at DESC, f.id DESC"#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(file_from_row).collect()
    }

    pub async fn list_files(&self) -> Result<Vec<FileRecord>> {
        let rows = sqlx::query("SELECT * FROM files ORDER BY created_at DESC, id DESC")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(file_from_row).collect()
    }

    /// Record that the file now lives encrypted at `path`
    pub async fn mark_encrypted(&self, file_id: i64, path: &str) -> Result<()> {
        let result = sqlx::query("UPDATE files SET is_encrypted = 1, file_path = ? WHERE id = ?")
            .bind(path)
            .bind(file_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("file {}", file_id)));
        }
        Ok(())
    }

    // ---- shares ----

    pub async fn create_share(
        &self,
        file_id: i64,
        shared_with_id: i64,
        can_edit: bool,
    ) -> Result<FileShare> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let result = sqlx::query(
            "INSERT INTO file_shares (file_id, shared_with_id, can_edit, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(file_id)
        .bind(shared_with_id)
        .bind(can_edit)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query("SELECT * FROM file_shares WHERE id = ?")
            .bind(result.last_insert_rowid())
            .fetch_one(&self.pool)
            .await?;
        share_from_row(&row)
    }

    pub async fn is_shared_with(&self, file_id: i64, user_id: i64) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM file_shares WHERE file_id = ? AND shared_with_id = ?",
        )
        .bind(file_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    pub async fn list_shares(&self, file_id: i64) -> Result<Vec<FileShare>> {
        let rows = sqlx::query("SELECT * FROM file_shares WHERE file_id = ? ORDER BY id")
            .bind(file_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(share_from_row).collect()
    }

    // ---- access logs ----

    pub async fn log_access(
        &self,
        user_id: i64,
        file_id: i64,
        action: AccessAction,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<AccessLog> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let result = sqlx::query(
            r#"INSERT INTO access_logs (user_id, file_id, action, ip_address, user_agent, timestamp)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(user_id)
        .bind(file_id)
        .bind(action.as_str())
        .bind(ip_address)
        .bind(user_agent)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query("SELECT * FROM access_logs WHERE id = ?")
            .bind(result.last_insert_rowid())
            .fetch_one(&self.pool)
            .await?;
        access_log_from_row(&row)
    }

    /// Access history of one file, newest first
    pub async fn file_history(&self, file_id: i64) -> Result<Vec<AccessLog>> {
        let rows = sqlx::query(
            "SELECT * FROM access_logs WHERE file_id = ? ORDER BY timestamp DESC, id DESC",
        )
        .bind(file_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(access_log_from_row).collect()
    }

    pub async fn recent_access_logs(&self, limit: i64) -> Result<Vec<AccessLog>> {
        let rows = sqlx::query("SELECT * FROM access_logs ORDER BY timestamp DESC, id DESC LIMIT ?")
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(access_log_from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            email: email.to_string(),
            password_hash: "hash".to_string(),
            is_admin: false,
        }
    }

    fn new_file(user_id: i64) -> NewFileRecord {
        NewFileRecord {
            filename: "notes.txt".to_string(),
            original_filename: "notes.txt".to_string(),
            file_path: "/tmp/notes.txt".to_string(),
            content_hash: "abc".to_string(),
            has_sensitive_data: true,
            sensitive_data_types: "email,phone".to_string(),
            user_id,
        }
    }

    #[tokio::test]
    async fn test_user_roundtrip() {
        let storage = Storage::in_memory().await.unwrap();
        let created = storage.create_user(&new_user("a@example.com")).await.unwrap();

        assert_eq!(created.email, "a@example.com");
        assert!(!created.is_subscribed);
        assert_eq!(created.subscription_count, 0);

        let found = storage.find_user_by_email("a@example.com").await.unwrap();
        assert_eq!(found.map(|u| u.id), Some(created.id));
        assert!(storage.find_user_by_email("b@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let storage = Storage::in_memory().await.unwrap();
        storage.create_user(&new_user("a@example.com")).await.unwrap();
        assert!(storage.create_user(&new_user("a@example.com")).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_user() {
        let storage = Storage::in_memory().await.unwrap();
        assert!(matches!(
            storage.get_user(42).await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_subscription_and_credits() {
        let storage = Storage::in_memory().await.unwrap();
        let mut user = storage.create_user(&new_user("a@example.com")).await.unwrap();

        user.subscription_count = 1;
        user.is_subscribed = true;
        user.subscription_expires_at = Some(OffsetDateTime::from_unix_timestamp(2_000_000_000).unwrap());
        storage.update_subscription(&user).await.unwrap();

        assert!(storage.consume_credit(user.id).await.unwrap());
        assert!(!storage.consume_credit(user.id).await.unwrap());

        let reloaded = storage.get_user(user.id).await.unwrap();
        assert_eq!(reloaded.subscription_count, 0);
        assert!(reloaded.is_subscribed);
        assert_eq!(
            reloaded.subscription_expires_at.map(|t| t.unix_timestamp()),
            Some(2_000_000_000)
        );
    }

    #[tokio::test]
    async fn test_file_lifecycle() {
        let storage = Storage::in_memory().await.unwrap();
        let user = storage.create_user(&new_user("a@example.com")).await.unwrap();

        let file = storage.create_file(&new_file(user.id)).await.unwrap();
        assert!(!file.is_encrypted);
        assert_eq!(file.sensitive_types(), vec!["email", "phone"]);

        storage
            .mark_encrypted(file.id, "/tmp/notes.txt.encrypted")
            .await
            .unwrap();
        let file = storage.get_file(file.id).await.unwrap();
        assert!(file.is_encrypted);
        assert_eq!(file.file_path, "/tmp/notes.txt.encrypted");

        assert_eq!(storage.list_files_for_user(user.id).await.unwrap().len(), 1);
        assert_eq!(storage.list_files().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_shares() {
        let storage = Storage::in_memory().await.unwrap();
        let owner = storage.create_user(&new_user("owner@example.com")).await.unwrap();
        let friend = storage.create_user(&new_user("friend@example.com")).await.unwrap();
        let file = storage.create_file(&new_file(owner.id)).await.unwrap();

        assert!(!storage.is_shared_with(file.id, friend.id).await.unwrap());
        let share = storage.create_share(file.id, friend.id, true).await.unwrap();
        assert!(share.can_edit);

        assert!(storage.is_shared_with(file.id, friend.id).await.unwrap());
        assert_eq!(storage.list_shares(file.id).await.unwrap().len(), 1);
        let shared = storage.list_files_shared_with(friend.id).await.unwrap();
        assert_eq!(shared.len(), 1);
        assert_eq!(shared[0].id, file.id);
    }

    #[tokio::test]
    async fn test_access_history_newest_first() {
        let storage = Storage::in_memory().await.unwrap();
        let user = storage.create_user(&new_user("a@example.com")).await.unwrap();
        let file = storage.create_file(&new_file(user.id)).await.unwrap();

        storage
            .log_access(user.id, file.id, AccessAction::Upload, Some("127.0.0.1"), None)
            .await
            .unwrap();
        storage
            .log_access(user.id, file.id, AccessAction::View, None, Some("curl/8"))
            .await
            .unwrap();

        let history = storage.file_history(file.id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].action, AccessAction::View);
        assert_eq!(history[0].user_agent.as_deref(), Some("curl/8"));
        assert_eq!(history[1].ip_address.as_deref(), Some("127.0.0.1"));

        let recent = storage.recent_access_logs(1).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].action, AccessAction::View);
    }

    #[tokio::test]
    async fn test_on_disk_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db").join("sv.db");

        let storage = Storage::new(Some(path.clone())).await.unwrap();
        storage.create_user(&new_user("a@example.com")).await.unwrap();
        drop(storage);

        let reopened = Storage::new(Some(path)).await.unwrap();
        assert_eq!(reopened.list_users().await.unwrap().len(), 1);
    }
}
