//! Overlay key: the single caller-supplied secret. Never persisted here.

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use veilfs_core::{VeilError, VeilResult};
use zeroize::Zeroize;

use crate::KEY_SIZE;

/// A 256-bit overlay key. Zeroized on drop.
#[derive(Clone)]
pub struct OverlayKey {
    bytes: [u8; KEY_SIZE],
}

impl OverlayKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn from_slice(bytes: &[u8]) -> VeilResult<Self> {
        let bytes: [u8; KEY_SIZE] = bytes.try_into().map_err(|_| {
            VeilError::InvalidKey(format!(
                "expected {KEY_SIZE} key bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self { bytes })
    }

    /// Parse a base64-encoded key. URL-safe and standard alphabets are
    /// accepted, with or without padding.
    pub fn parse(encoded: &str) -> VeilResult<Self> {
        let encoded = encoded.trim();
        if encoded.is_empty() {
            return Err(VeilError::InvalidKey("key is empty".into()));
        }

        let mut decoded = [&URL_SAFE, &URL_SAFE_NO_PAD, &STANDARD, &STANDARD_NO_PAD]
            .iter()
            .find_map(|engine| engine.decode(encoded).ok())
            .ok_or_else(|| VeilError::InvalidKey("key is not valid base64".into()))?;

        let key = Self::from_slice(&decoded);
        decoded.zeroize();
        key
    }

    pub fn from_secret(secret: &SecretString) -> VeilResult<Self> {
        Self::parse(secret.expose_secret())
    }

    /// Generate a fresh random key.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self::from_bytes(bytes)
    }

    /// Render the key in padded URL-safe base64, the form `parse` reads back.
    pub fn to_encoded(&self) -> SecretString {
        SecretString::from(URL_SAFE.encode(self.bytes))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for OverlayKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for OverlayKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverlayKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}
