//! Overlay construction options and key resolution

use std::path::Path;

use secrecy::SecretString;
use veilfs_core::config::OverlayConfig;
use veilfs_core::{VeilError, VeilResult, DEFAULT_CHUNK_SIZE};
use veilfs_crypto::OverlayKey;

/// Everything an overlay instance needs besides its backend.
#[derive(Debug, Clone)]
pub struct OverlayOptions {
    pub key: OverlayKey,
    /// Plaintext bytes sealed per token for writes that don't override it.
    pub chunk_size: usize,
}

impl OverlayOptions {
    pub fn new(key: OverlayKey) -> Self {
        Self {
            key,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn from_config(cfg: &OverlayConfig, explicit: Option<&SecretString>) -> VeilResult<Self> {
        Ok(Self::new(resolve_key(cfg, explicit)?).with_chunk_size(cfg.chunk_size))
    }

    pub fn validate(&self) -> VeilResult<()> {
        if self.chunk_size == 0 {
            return Err(VeilError::Config("chunk_size must be greater than 0".into()));
        }
        Ok(())
    }
}

/// Find the overlay key. Precedence: an explicit value, then
/// `overlay.key_file`, then the environment variable named by
/// `overlay.key_env`.
pub fn resolve_key(cfg: &OverlayConfig, explicit: Option<&SecretString>) -> VeilResult<OverlayKey> {
    if let Some(secret) = explicit {
        tracing::debug!("using explicitly supplied overlay key");
        return OverlayKey::from_secret(secret);
    }
    if let Some(path) = &cfg.key_file {
        tracing::debug!(path = %path.display(), "reading overlay key from file");
        return read_key_file(path);
    }
    match std::env::var(&cfg.key_env) {
        Ok(value) => {
            tracing::debug!(var = %cfg.key_env, "reading overlay key from environment");
            OverlayKey::from_secret(&SecretString::from(value))
        }
        Err(_) => Err(VeilError::InvalidKey(format!(
            "no key supplied: set {} or overlay.key_file",
            cfg.key_env
        ))),
    }
}

fn read_key_file(path: &Path) -> VeilResult<OverlayKey> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| VeilError::InvalidKey(format!("reading {}: {e}", path.display())))?;
    OverlayKey::from_secret(&SecretString::from(contents))
}
