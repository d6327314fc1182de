//! Application operations over storage, detection and encryption

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use sv_config::Config;
use sv_core::validation::allowed_file;
use sv_core::{
    AccessAction, AccessLog, Error, FileRecord, LoginForm, NewFileRecord, NewUser,
    RegistrationForm, Result, ShareForm, UploadForm, User, ValidationErrors, Viewer,
};
use sv_security::{CategorySet, Codec, Detector, Masker, Redaction, RegexDetector, decode_text};
use sv_storage::{FileStore, Storage, StorageError};
use time::OffsetDateTime;

use crate::password::{hash_password, verify_password};

/// Shown in place of content that is not valid text
pub const BINARY_PLACEHOLDER: &str = "[Binary file content]";
/// Characters returned by a preview
pub const PREVIEW_CHARS: usize = 500;
/// Access log entries on the admin overview
pub const ADMIN_LOG_LIMIT: i64 = 100;

/// Limits and keys the service enforces
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub allowed_extensions: Vec<String>,
    pub max_content_length: usize,
    pub admin_key: Option<String>,
}

impl ServiceSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            allowed_extensions: config.storage.allowed_extensions.clone(),
            max_content_length: config.storage.max_content_length,
            admin_key: config.security.admin_key.clone(),
        }
    }
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// A file as submitted by a client
#[derive(Debug, Clone)]
pub struct Upload {
    pub filename: String,
    pub bytes: Vec<u8>,
    pub encrypt: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub files: Vec<FileRecord>,
    pub shared_with_me: Vec<FileRecord>,
    pub is_subscribed: bool,
    pub subscription_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileView {
    pub file: FileRecord,
    pub content: String,
    pub is_binary: bool,
    /// True when `content` is the masked rendition
    pub masked: bool,
    pub redactions: Vec<Redaction>,
}

/// Bytes handed to the client, named for the attachment
#[derive(Debug, Clone)]
pub struct Download {
    pub file: FileRecord,
    pub filename: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FilePreview {
    pub preview: String,
    pub total_length: usize,
    pub has_sensitive_data: bool,
    pub sensitive_types: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdminOverview {
    pub users: Vec<User>,
    pub files: Vec<FileRecord>,
    pub logs: Vec<AccessLog>,
}

/// Entry point for every user-facing operation
#[derive(Clone)]
pub struct DocumentService {
    storage: Storage,
    files: FileStore,
    codec: Arc<Codec>,
    detector: Arc<dyn Detector>,
    masker: Masker,
    settings: Arc<ServiceSettings>,
}

impl DocumentService {
    pub fn new(storage: Storage, files: FileStore, codec: Codec, settings: ServiceSettings) -> Self {
        Self {
            storage,
            files,
            codec: Arc::new(codec),
            detector: Arc::new(RegexDetector::new()),
            masker: Masker::new(),
            settings: Arc::new(settings),
        }
    }

    /// Open the database and upload directory named by `config`
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let storage = Storage::new(Some(config.database_path())).await?;
        let files = FileStore::new(config.upload_dir())?;
        let codec = Codec::new(config.encryption_passphrase());
        Ok(Self::new(storage, files, codec, ServiceSettings::from_config(config)))
    }

    /// Replace the detector used at upload time
    pub fn with_detector(mut self, detector: Arc<dyn Detector>) -> Self {
        self.detector = detector;
        self
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    // ---- accounts ----

    pub async fn register(&self, form: &RegistrationForm) -> Result<User> {
        form.validate(self.settings.admin_key.as_deref())?;
        self.create_account(&form.email, &form.password, form.is_admin)
            .await
    }

    /// Create an account without the registration checks on admin keys
    pub async fn create_account(&self, email: &str, password: &str, is_admin: bool) -> Result<User> {
        let email = email.trim();
        if self.storage.find_user_by_email(email).await?.is_some() {
            return Err(Error::EmailTaken(email.to_string()));
        }

        let user = self
            .storage
            .create_user(&NewUser {
                email: email.to_string(),
                password_hash: hash_password(password)?,
                is_admin,
            })
            .await?;
        tracing::info!(user_id = user.id, is_admin, "Registered account");
        Ok(user)
    }

    pub async fn login(&self, form: &LoginForm) -> Result<User> {
        form.validate()?;
        let user = self
            .storage
            .find_user_by_email(form.email.trim())
            .await?
            .ok_or(Error::InvalidCredentials)?;

        if !verify_password(&form.password, &user.password_hash) {
            return Err(Error::InvalidCredentials);
        }
        Ok(user)
    }

    /// Current state of an account as a caller identity
    pub async fn viewer(&self, user_id: i64) -> Result<Viewer> {
        let user = self.load_user(user_id).await?;
        Ok(Viewer::new(user.id, user.is_admin, user.is_subscribed))
    }

    pub async fn user(&self, user_id: i64) -> Result<User> {
        self.load_user(user_id).await
    }

    pub async fn list_users(&self) -> Result<Vec<User>> {
        Ok(self.storage.list_users().await?)
    }

    /// Simulated subscription purchase
    pub async fn subscribe(&self, viewer: &Viewer) -> Result<User> {
        let mut user = self.load_user(viewer.user_id).await?;
        user.subscribe(OffsetDateTime::now_utc());
        self.storage.update_subscription(&user).await?;
        tracing::info!(
            user_id = user.id,
            credits = user.subscription_count,
            "Subscription activated"
        );
        Ok(user)
    }

    pub async fn subscribe_email(&self, email: &str) -> Result<User> {
        let user = self
            .storage
            .find_user_by_email(email.trim())
            .await?
            .ok_or_else(|| Error::UserNotFound(email.to_string()))?;
        self.subscribe(&Viewer::new(user.id, user.is_admin, user.is_subscribed))
            .await
    }

    // ---- files ----

    pub async fn dashboard(&self, viewer: &Viewer) -> Result<Dashboard> {
        let user = self.load_user(viewer.user_id).await?;
        Ok(Dashboard {
            files: self.storage.list_files_for_user(user.id).await?,
            shared_with_me: self.storage.list_files_shared_with(user.id).await?,
            is_subscribed: user.is_subscribed,
            subscription_count: user.subscription_count,
        })
    }

    /// Store an upload, classify it, and optionally encrypt it at rest
    pub async fn upload(&self, viewer: &Viewer, upload: Upload) -> Result<FileRecord> {
        if !upload.filename.trim().is_empty()
            && !allowed_file(&upload.filename, &self.settings.allowed_extensions)
        {
            return Err(Error::InvalidFileType);
        }
        UploadForm {
            filename: upload.filename.clone(),
            size: upload.bytes.len(),
            encrypt: upload.encrypt,
        }
        .validate(
            &self.settings.allowed_extensions,
            self.settings.max_content_length,
        )?;

        let stored = self.files.save(&upload.filename, &upload.bytes).await?;
        let detection = self.detector.detect_decoded(decode_text(&upload.bytes));
        tracing::debug!(
            file = %stored.filename,
            categories = %detection.categories.to_list_string(),
            "Classified upload"
        );

        let mut record = self
            .storage
            .create_file(&NewFileRecord {
                filename: stored.filename.clone(),
                original_filename: stored.filename,
                file_path: stored.path.to_string_lossy().into_owned(),
                content_hash: stored.content_hash,
                has_sensitive_data: detection.has_sensitive_data,
                sensitive_data_types: detection.categories.to_list_string(),
                user_id: viewer.user_id,
            })
            .await?;

        if upload.encrypt {
            record = self.encrypt_at_rest(record.id).await?.0;
        }

        self.record(viewer, record.id, AccessAction::Upload).await?;
        tracing::info!(
            file_id = record.id,
            sensitive = record.has_sensitive_data,
            encrypted = record.is_encrypted,
            "Uploaded file"
        );
        Ok(record)
    }

    /// Content for display; masked for subscribed callers when the file
    /// was classified as sensitive
    pub async fn view(&self, viewer: &Viewer, file_id: i64) -> Result<FileView> {
        let guard = self.files.lock(file_id).await;
        let record = self.load_file(file_id).await?;
        self.check_read(viewer, &record).await?;

        let bytes = match self.files.read_plaintext(&self.codec, &record).await {
            Ok(bytes) => Some(bytes),
            Err(StorageError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(file_id, "Stored bytes are missing");
                None
            }
            Err(e) => return Err(e.into()),
        };
        drop(guard);

        let (content, is_binary, masked, redactions) =
            match bytes.as_deref().and_then(decode_text) {
                None => (BINARY_PLACEHOLDER.to_string(), true, false, Vec::new()),
                Some(text) if viewer.is_subscribed && record.has_sensitive_data => {
                    let categories = CategorySet::parse_list(&record.sensitive_data_types);
                    let result = self.masker.mask(text, &categories);
                    (result.text, false, true, result.redactions)
                }
                Some(text) => (text.to_string(), false, false, Vec::new()),
            };

        self.record(viewer, file_id, AccessAction::View).await?;
        Ok(FileView {
            file: record,
            content,
            is_binary,
            masked,
            redactions,
        })
    }

    /// Stored bytes for download. A subscribed caller forces a sensitive
    /// file to be encrypted at rest first.
    pub async fn download(&self, viewer: &Viewer, file_id: i64) -> Result<Download> {
        let guard = self.files.lock(file_id).await;
        let mut record = self.load_file(file_id).await?;
        self.check_read(viewer, &record).await?;

        if viewer.is_subscribed && record.has_sensitive_data && !record.is_encrypted {
            record = self.encrypt_locked(record).await?.0;
        }

        let download = self.attachment(record).await?;
        drop(guard);
        self.record(viewer, file_id, AccessAction::Download).await?;
        Ok(download)
    }

    pub async fn share(&self, viewer: &Viewer, file_id: i64, form: &ShareForm) -> Result<()> {
        let record = self.load_file(file_id).await?;
        if record.user_id != viewer.user_id {
            tracing::warn!(file_id, user_id = viewer.user_id, "Share refused: not the owner");
            return Err(Error::AccessDenied);
        }
        form.validate()?;

        let target = self
            .storage
            .find_user_by_email(form.user_email.trim())
            .await?
            .ok_or_else(|| Error::UserNotFound(form.user_email.clone()))?;
        if target.id == viewer.user_id {
            return Err(ValidationErrors::single(
                "user_email",
                "Cannot share a file with yourself.",
            )
            .into());
        }

        self.storage
            .create_share(file_id, target.id, form.can_edit)
            .await?;
        self.record(viewer, file_id, AccessAction::Share).await?;
        tracing::info!(file_id, shared_with = target.id, "Shared file");
        Ok(())
    }

    /// Admin return: sensitive files are encrypted before they leave
    pub async fn return_file(&self, viewer: &Viewer, file_id: i64) -> Result<Download> {
        if !viewer.is_admin {
            return Err(Error::AccessDenied);
        }
        let guard = self.files.lock(file_id).await;
        let mut record = self.load_file(file_id).await?;
        self.ensure_on_disk(&record).await?;

        if record.has_sensitive_data && !record.is_encrypted {
            record = self.encrypt_locked(record).await?.0;
        }

        let download = self.attachment(record).await?;
        drop(guard);
        self.record(viewer, file_id, AccessAction::Return).await?;
        Ok(download)
    }

    /// Subscriber return: encrypting a sensitive file spends one credit
    pub async fn return_file_auto(&self, viewer: &Viewer, file_id: i64) -> Result<Download> {
        if viewer.is_admin {
            return Err(Error::AccessDenied);
        }
        let user = self.load_user(viewer.user_id).await?;
        if !user.has_credits() {
            return Err(Error::SubscriptionRequired);
        }

        let guard = self.files.lock(file_id).await;
        let mut record = self.load_file(file_id).await?;
        self.check_read(viewer, &record).await?;
        self.ensure_on_disk(&record).await?;

        if record.has_sensitive_data && !record.is_encrypted {
            let (encrypted, newly) = self.encrypt_locked(record).await?;
            if newly && !self.storage.consume_credit(user.id).await? {
                tracing::warn!(user_id = user.id, "Credit already spent elsewhere");
            }
            record = encrypted;
        }

        let download = self.attachment(record).await?;
        drop(guard);
        self.record(viewer, file_id, AccessAction::Return).await?;
        Ok(download)
    }

    /// Access history, newest first
    pub async fn file_history(&self, viewer: &Viewer, file_id: i64) -> Result<Vec<AccessLog>> {
        if !viewer.is_subscribed {
            return Err(Error::SubscriptionRequired);
        }
        let record = self.load_file(file_id).await?;
        check_owner_or_admin(viewer, &record)?;
        Ok(self.storage.file_history(file_id).await?)
    }

    /// First characters of the plaintext
    pub async fn file_preview(&self, viewer: &Viewer, file_id: i64) -> Result<FilePreview> {
        if !viewer.is_subscribed {
            return Err(Error::SubscriptionRequired);
        }
        let guard = self.files.lock(file_id).await;
        let record = self.load_file(file_id).await?;
        check_owner_or_admin(viewer, &record)?;

        let bytes = self
            .files
            .read_plaintext(&self.codec, &record)
            .await
            .map_err(|e| {
                tracing::debug!(file_id, "Preview read failed: {}", e);
                Error::Unreadable
            })?;
        drop(guard);
        let text = decode_text(&bytes).ok_or(Error::Unreadable)?;

        let total_length = text.chars().count();
        let preview = if total_length > PREVIEW_CHARS {
            let mut head: String = text.chars().take(PREVIEW_CHARS).collect();
            head.push_str("...");
            head
        } else {
            text.to_string()
        };

        Ok(FilePreview {
            preview,
            total_length,
            has_sensitive_data: record.has_sensitive_data,
            sensitive_types: record.sensitive_types(),
        })
    }

    pub async fn admin_overview(&self, viewer: &Viewer) -> Result<AdminOverview> {
        if !viewer.is_admin {
            return Err(Error::AccessDenied);
        }
        Ok(AdminOverview {
            users: self.storage.list_users().await?,
            files: self.storage.list_files().await?,
            logs: self.storage.recent_access_logs(ADMIN_LOG_LIMIT).await?,
        })
    }

    // ---- internals ----

    /// Encrypt a file at rest under its lock. Returns the current record
    /// and whether this call did the encryption.
    async fn encrypt_at_rest(&self, file_id: i64) -> Result<(FileRecord, bool)> {
        let _guard = self.files.lock(file_id).await;
        let record = self.load_file(file_id).await?;
        self.encrypt_locked(record).await
    }

    /// Same as [`Self::encrypt_at_rest`] for a caller that already holds the
    /// file's lock and loaded `record` under it
    async fn encrypt_locked(&self, record: FileRecord) -> Result<(FileRecord, bool)> {
        if record.is_encrypted {
            return Ok((record, false));
        }
        let file_id = record.id;

        let plaintext = PathBuf::from(&record.file_path);
        let encrypted = self.files.encrypt_file(&self.codec, &plaintext).await?;
        let encrypted = encrypted.to_string_lossy().into_owned();
        self.storage.mark_encrypted(file_id, &encrypted).await?;
        self.files.remove(&plaintext).await?;

        tracing::info!(file_id, "Encrypted file at rest");
        Ok((
            FileRecord {
                is_encrypted: true,
                file_path: encrypted,
                ..record
            },
            true,
        ))
    }

    async fn attachment(&self, record: FileRecord) -> Result<Download> {
        let bytes = match self.files.read(Path::new(&record.file_path)).await {
            Ok(bytes) => bytes,
            Err(StorageError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::FileNotFound(record.id));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(Download {
            filename: record.download_name(),
            file: record,
            bytes,
        })
    }

    async fn ensure_on_disk(&self, record: &FileRecord) -> Result<()> {
        match tokio::fs::try_exists(&record.file_path).await {
            Ok(true) => Ok(()),
            _ => Err(Error::FileNotFound(record.id)),
        }
    }

    /// Owner, admin, or a user the file was shared with
    async fn check_read(&self, viewer: &Viewer, record: &FileRecord) -> Result<()> {
        if viewer.is_admin || record.user_id == viewer.user_id {
            return Ok(());
        }
        if self.storage.is_shared_with(record.id, viewer.user_id).await? {
            return Ok(());
        }
        tracing::warn!(file_id = record.id, user_id = viewer.user_id, "Access denied");
        Err(Error::AccessDenied)
    }

    async fn load_file(&self, file_id: i64) -> Result<FileRecord> {
        match self.storage.get_file(file_id).await {
            Ok(record) => Ok(record),
            Err(StorageError::NotFound(_)) => Err(Error::FileNotFound(file_id)),
            Err(e) => Err(e.into()),
        }
    }

    async fn load_user(&self, user_id: i64) -> Result<User> {
        match self.storage.get_user(user_id).await {
            Ok(user) => Ok(user),
            Err(StorageError::NotFound(_)) => Err(Error::UserNotFound(user_id.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    async fn record(&self, viewer: &Viewer, file_id: i64, action: AccessAction) -> Result<()> {
        self.storage
            .log_access(
                viewer.user_id,
                file_id,
                action,
                viewer.ip_address.as_deref(),
                viewer.user_agent.as_deref(),
            )
            .await?;
        Ok(())
    }
}

fn check_owner_or_admin(viewer: &Viewer, record: &FileRecord) -> Result<()> {
    if viewer.is_admin || record.user_id == viewer.user_id {
        Ok(())
    } else {
        Err(Error::AccessDenied)
    }
}
