//! Token sealing and opening with XChaCha20-Poly1305.
//!
//! Binary token body:
//! ```text
//! [1 byte: version][24 bytes: random nonce][N bytes: ciphertext][16 bytes: Poly1305 tag]
//! AAD = "veilfs-token" || version
//! ```
//!
//! The body is rendered as unpadded URL-safe base64 and terminated with `==`.
//! Every token is independently verifiable, so tokens may be appended to a
//! stored object without touching the ones already there.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    XChaCha20Poly1305, XNonce,
};
use rand::RngCore;
use veilfs_core::{VeilError, VeilResult};

use crate::keys::OverlayKey;
use crate::{NONCE_SIZE, TAG_SIZE, TOKEN_MARKER, TOKEN_VERSION};

const AAD_DOMAIN: &[u8] = b"veilfs-token";

/// Smallest possible decoded body: version + nonce + tag over an empty chunk
const MIN_BODY_SIZE: usize = 1 + NONCE_SIZE + TAG_SIZE;

/// One sealed chunk in its text-safe, self-delimited form.
///
/// Tokens from two `encrypt` calls over the same plaintext differ (fresh
/// nonce), so they are not comparable for deduplication.
#[derive(Clone, PartialEq, Eq)]
pub struct Token(String);

impl Token {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Encoded length of the token sealing `plaintext_len` bytes.
    pub fn encoded_len(plaintext_len: usize) -> usize {
        (4 * (MIN_BODY_SIZE + plaintext_len)).div_ceil(3) + TOKEN_MARKER.len()
    }
}

impl AsRef<[u8]> for Token {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Token").field(&self.0.len()).finish()
    }
}

/// Seals plaintext into tokens and opens them again under one overlay key.
#[derive(Clone, Debug)]
pub struct TokenCodec {
    key: OverlayKey,
}

impl TokenCodec {
    pub fn new(key: OverlayKey) -> Self {
        Self { key }
    }

    /// Seal `plaintext` into a fresh token.
    pub fn encrypt(&self, plaintext: &[u8]) -> VeilResult<Token> {
        let cipher = XChaCha20Poly1305::new(self.key.as_bytes().into());

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = XNonce::from_slice(&nonce_bytes);

        let aad = build_aad(TOKEN_VERSION);

        let ciphertext = cipher
            .encrypt(
                nonce,
                Payload {
                    msg: plaintext,
                    aad: &aad,
                },
            )
            .map_err(|e| VeilError::Other(anyhow::anyhow!("token encryption failed: {e}")))?;

        let mut body = Vec::with_capacity(1 + NONCE_SIZE + ciphertext.len());
        body.push(TOKEN_VERSION);
        body.extend_from_slice(&nonce_bytes);
        body.extend_from_slice(&ciphertext);

        let mut encoded = URL_SAFE_NO_PAD.encode(&body);
        encoded.push_str("==");
        Ok(Token(encoded))
    }

    /// Open a single token (terminator included) and return its plaintext.
    ///
    /// Any failure is `VeilError::Integrity`: a missing terminator, bytes
    /// outside the token alphabet, a short body, an unknown version, or a
    /// tag that does not verify under this key.
    pub fn decrypt(&self, token: &[u8]) -> VeilResult<Vec<u8>> {
        let body = token
            .strip_suffix(TOKEN_MARKER.as_slice())
            .ok_or_else(|| VeilError::Integrity("token is missing its terminator".into()))?;
        if body.is_empty() {
            return Err(VeilError::Integrity("empty token".into()));
        }

        let decoded = URL_SAFE_NO_PAD
            .decode(body)
            .map_err(|e| VeilError::Integrity(format!("token is not valid base64url: {e}")))?;

        if decoded.len() < MIN_BODY_SIZE {
            return Err(VeilError::Integrity(format!(
                "token too short: {} bytes (minimum {MIN_BODY_SIZE})",
                decoded.len()
            )));
        }

        let version = decoded[0];
        if version != TOKEN_VERSION {
            return Err(VeilError::Integrity(format!(
                "unsupported token version {version}"
            )));
        }

        let (nonce_bytes, ciphertext) = decoded[1..].split_at(NONCE_SIZE);
        let nonce = XNonce::from_slice(nonce_bytes);
        let cipher = XChaCha20Poly1305::new(self.key.as_bytes().into());

        let aad = build_aad(version);

        cipher
            .decrypt(
                nonce,
                Payload {
                    msg: ciphertext,
                    aad: &aad,
                },
            )
            .map_err(|_| {
                VeilError::Integrity(
                    "token authentication failed: wrong key or corrupted data".into(),
                )
            })
    }
}

/// Build AAD: domain label || version byte
fn build_aad(version: u8) -> Vec<u8> {
    let mut aad = Vec::with_capacity(AAD_DOMAIN.len() + 1);
    aad.extend_from_slice(AAD_DOMAIN);
    aad.push(version);
    aad
}
