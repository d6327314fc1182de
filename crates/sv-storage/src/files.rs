//! Upload directory management
//!
//! Uploaded bytes live under a single directory. Encryption writes the
//! ciphertext durably before the plaintext is removed, and callers serialize
//! work on one file through [`FileStore::lock`].

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use sv_core::{ENCRYPTED_SUFFIX, FileRecord};
use sv_security::Codec;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::Result;

/// Result of writing an upload to disk
#[derive(Debug, Clone)]
pub struct StoredFile {
    /// Sanitized name shown to users
    pub filename: String,
    pub path: PathBuf,
    /// BLAKE3 hex digest of the stored bytes
    pub content_hash: String,
}

type LockTable = DashMap<i64, Arc<Mutex<()>>>;

#[derive(Clone)]
pub struct FileStore {
    root: PathBuf,
    locks: Arc<LockTable>,
}

/// Held while one file's on-disk state is in use. The table entry is
/// dropped with the last holder.
pub struct FileLock {
    file_id: i64,
    locks: Arc<LockTable>,
    _guard: OwnedMutexGuard<()>,
}

impl Drop for FileLock {
    fn drop(&mut self) {
        // the table and this guard are the only owners when nobody waits
        self.locks
            .remove_if(&self.file_id, |_, lock| Arc::strong_count(lock) == 2);
    }
}

impl FileStore {
    pub fn new(root: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            locks: Arc::new(DashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Exclusive access to one file's on-disk state
    pub async fn lock(&self, file_id: i64) -> FileLock {
        let lock = self
            .locks
            .entry(file_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        FileLock {
            file_id,
            locks: self.locks.clone(),
            _guard: lock.lock_owned().await,
        }
    }

    /// Write an upload under a unique name derived from `original_name`
    pub async fn save(&self, original_name: &str, bytes: &[u8]) -> Result<StoredFile> {
        let filename = secure_filename(original_name);
        let unique = uuid::Uuid::new_v4().simple().to_string();
        let path = self.root.join(format!("{}_{}", &unique[..12], filename));

        write_durably(&path, bytes).await?;
        tracing::debug!("Stored upload {} at {}", filename, path.display());

        Ok(StoredFile {
            filename,
            path,
            content_hash: blake3::hash(bytes).to_hex().to_string(),
        })
    }

    pub async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        Ok(tokio::fs::read(path).await?)
    }

    /// Stored bytes of `record`, decrypted in memory when needed
    pub async fn read_plaintext(&self, codec: &Codec, record: &FileRecord) -> Result<Vec<u8>> {
        let bytes = self.read(Path::new(&record.file_path)).await?;
        if record.is_encrypted {
            Ok(codec.decrypt(&bytes)?)
        } else {
            Ok(bytes)
        }
    }

    pub async fn encrypt_file(&self, codec: &Codec, path: &Path) -> Result<PathBuf> {
        encrypt_file(codec, path).await
    }

    pub async fn decrypt_file(&self, codec: &Codec, path: &Path) -> Result<PathBuf> {
        decrypt_file(codec, path).await
    }

    /// Remove a file, tolerating one that is already gone
    pub async fn remove(&self, path: &Path) -> Result<()> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Encrypt `path` into `path.encrypted`, leaving the plaintext in place.
/// The ciphertext is synced to disk before this returns.
pub async fn encrypt_file(codec: &Codec, path: &Path) -> Result<PathBuf> {
    let plaintext = tokio::fs::read(path).await?;
    let token = codec.encrypt(&plaintext);
    let target = encrypted_path(path);
    write_durably(&target, &token).await?;
    Ok(target)
}

/// Decrypt `path` next to itself; returns the plaintext path.
/// Nothing is written when the token does not verify.
pub async fn decrypt_file(codec: &Codec, path: &Path) -> Result<PathBuf> {
    let token = tokio::fs::read(path).await?;
    let plaintext = codec.decrypt(&token)?;
    let target = decrypted_path(path);
    write_durably(&target, &plaintext).await?;
    Ok(target)
}

/// `path` with the encrypted suffix appended
pub fn encrypted_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(ENCRYPTED_SUFFIX);
    PathBuf::from(name)
}

/// `path` with a trailing encrypted suffix removed, or `.decrypted`
/// appended when it has none
pub fn decrypted_path(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    match raw.strip_suffix(ENCRYPTED_SUFFIX) {
        Some(stripped) if !stripped.is_empty() => PathBuf::from(stripped),
        _ => {
            let mut name = OsString::from(path.as_os_str());
            name.push(".decrypted");
            PathBuf::from(name)
        }
    }
}

/// Reduce a client-supplied name to a safe single path component
pub fn secure_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();
    let trimmed = cleaned.trim_matches(|c| c == '.' || c == '_');
    if trimmed.is_empty() {
        "file".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Write through a sibling temp file, fsync, rename into place, then
/// fsync the directory so the new entry survives a crash
async fn write_durably(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut tmp = OsString::from(path.as_os_str());
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let written = match write_synced(&tmp, bytes).await {
        Ok(()) => tokio::fs::rename(&tmp, path).await,
        Err(e) => Err(e),
    };
    if let Err(e) = written {
        if let Err(cleanup) = tokio::fs::remove_file(&tmp).await
            && cleanup.kind() != std::io::ErrorKind::NotFound
        {
            tracing::warn!("Could not remove {}: {}", tmp.display(), cleanup);
        }
        return Err(e.into());
    }

    sync_parent(path).await?;
    Ok(())
}

async fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await
}

#[cfg(unix)]
async fn sync_parent(path: &Path) -> std::io::Result<()> {
    match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => tokio::fs::File::open(parent).await?.sync_all().await,
        None => Ok(()),
    }
}

#[cfg(not(unix))]
async fn sync_parent(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
