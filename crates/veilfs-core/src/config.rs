use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{VeilError, VeilResult};
use crate::DEFAULT_CHUNK_SIZE;

/// Top-level configuration (loaded from veilfs.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VeilConfig {
    pub storage: StorageConfig,
    pub overlay: OverlayConfig,
    pub log: LogConfig,
}

/// Which backend holds the token streams
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Directory on the local filesystem
    #[default]
    Local,
    /// Process-local, discarded on exit
    Memory,
    /// S3-compatible object store via OpenDAL
    S3,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: BackendKind,
    /// Root directory (local) or key prefix (s3)
    pub root: PathBuf,
    /// Create the local root if it does not exist (default: true)
    pub create: bool,
    /// S3 endpoint
    pub endpoint: String,
    /// S3 region (default: us-east-1)
    pub region: String,
    /// S3 bucket name
    pub bucket: String,
    /// Refuse plaintext HTTP endpoints
    pub enforce_tls: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    /// Plaintext bytes sealed per token (default: 65536)
    pub chunk_size: usize,
    /// Environment variable holding the encoded key (default: VEILFS_KEY)
    pub key_env: String,
    /// File holding the encoded key; takes precedence over `key_env`
    pub key_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Local,
            root: PathBuf::from("./veilfs-data"),
            create: true,
            endpoint: "http://localhost:8333".into(),
            region: "us-east-1".into(),
            bucket: String::new(),
            enforce_tls: false,
        }
    }
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            key_env: "VEILFS_KEY".into(),
            key_file: None,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl VeilConfig {
    /// Load and validate a config file, falling back to defaults when the
    /// file does not exist.
    pub fn load(path: &Path) -> VeilResult<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| VeilError::Config(format!("reading {}: {e}", path.display())))?;
        let config: VeilConfig = toml::from_str(&content)
            .map_err(|e| VeilError::Config(format!("parsing {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> VeilResult<()> {
        if self.overlay.chunk_size == 0 {
            return Err(VeilError::Config("overlay.chunk_size must be greater than zero".into()));
        }
        if self.storage.backend == BackendKind::S3 && self.storage.bucket.is_empty() {
            return Err(VeilError::Config("storage.bucket is required for the s3 backend".into()));
        }
        match self.log.format.as_str() {
            "text" | "json" => Ok(()),
            other => Err(VeilError::Config(format!(
                "log.format must be \"text\" or \"json\", got \"{other}\""
            ))),
        }
    }
}
