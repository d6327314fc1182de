use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Passphrase used when none is configured. Anyone holding the source can
/// decrypt files encrypted under it.
pub const DEFAULT_ENCRYPTION_KEY: &str = "your-encryption-key-here";

/// Configuration for Secure Vision
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_session_hours")]
    pub session_lifetime_hours: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database file; defaults to the platform data directory
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// Directory receiving uploaded files; defaults to the platform data directory
    #[serde(default)]
    pub upload_dir: Option<PathBuf>,

    #[serde(default = "default_max_content_length")]
    pub max_content_length: usize,

    #[serde(default = "default_extensions")]
    pub allowed_extensions: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Passphrase the file encryption key is derived from
    #[serde(default)]
    pub encryption_key: Option<String>,

    /// Key required to register an admin account; admin sign-up is
    /// disabled when unset
    #[serde(default)]
    pub admin_key: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            session_lifetime_hours: default_session_hours(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            upload_dir: None,
            max_content_length: default_max_content_length(),
            allowed_extensions: default_extensions(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_session_hours() -> u64 {
    24
}

fn default_max_content_length() -> usize {
    16 * 1024 * 1024
}

fn default_extensions() -> Vec<String> {
    ["txt", "pdf", "doc", "docx", "xls", "xlsx"]
        .iter()
        .map(|ext| ext.to_string())
        .collect()
}

impl Config {
    /// Load config from default location or create default if not found,
    /// then apply environment overrides
    pub fn load() -> anyhow::Result<Self> {
        Self::load_at(None)
    }

    /// Like [`Config::load`], reading `path` instead of the default location
    pub fn load_at(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => Self::load_from(path)?,
            None => Self::load_from(&Self::config_path())?,
        };
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Load config from an explicit path, writing defaults if it is missing
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = Config::default();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let content = toml::to_string_pretty(&config)?;
            std::fs::write(path, content)?;
            Ok(config)
        }
    }

    /// Override settings from environment-style variables
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("ENCRYPTION_KEY").filter(|v| !v.is_empty()) {
            self.security.encryption_key = Some(key);
        }
        if let Some(key) = lookup("ADMIN_REGISTRATION_KEY").filter(|v| !v.is_empty()) {
            self.security.admin_key = Some(key);
        }
        if let Some(url) = lookup("DATABASE_URL").filter(|v| !v.is_empty()) {
            let path = url.strip_prefix("sqlite://").unwrap_or(&url);
            self.storage.database_path = Some(PathBuf::from(path));
        }
        if let Some(dir) = lookup("SV_UPLOAD_DIR").filter(|v| !v.is_empty()) {
            self.storage.upload_dir = Some(PathBuf::from(dir));
        }
    }

    /// Passphrase for the file codec, falling back to the fixed default
    pub fn encryption_passphrase(&self) -> &str {
        match self.security.encryption_key.as_deref() {
            Some(key) if !key.is_empty() => key,
            _ => {
                tracing::warn!(
                    "No encryption key configured; using the built-in default passphrase. \
                     Set ENCRYPTION_KEY before storing real data."
                );
                DEFAULT_ENCRYPTION_KEY
            }
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| Self::data_dir().join("secure_vision.db"))
    }

    pub fn upload_dir(&self) -> PathBuf {
        self.storage
            .upload_dir
            .clone()
            .unwrap_or_else(|| Self::data_dir().join("uploads"))
    }

    /// Get config file path
    pub fn config_path() -> PathBuf {
        if let Some(dirs) = directories::ProjectDirs::from("com", "securevision", "sv") {
            dirs.config_dir().join("config.toml")
        } else {
            PathBuf::from("~/.sv/config.toml")
        }
    }

    fn data_dir() -> PathBuf {
        if let Some(dirs) = directories::ProjectDirs::from("com", "securevision", "sv") {
            dirs.data_dir().to_path_buf()
        } else {
            PathBuf::from("~/.sv")
        }
    }
}
