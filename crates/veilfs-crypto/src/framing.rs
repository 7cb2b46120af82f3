//! Recover the token sequence of a stored object.
//!
//! A token stream is the plain concatenation of tokens, each ending in the
//! `==` terminator. Token bodies are unpadded base64url and never contain
//! `=`, so the first `=` after a boundary must be the start of the next
//! terminator. Anything else (a lone `=`, an empty frame, or a tail with no
//! terminator) means the stream was damaged and the whole read fails.

use tracing::{debug, warn};
use veilfs_core::{VeilError, VeilResult};

use crate::codec::TokenCodec;
use crate::TOKEN_MARKER;

/// Iterator over the raw tokens (terminators included) of a token stream.
///
/// Yields `VeilError::Integrity` once and then stops if the stream is
/// malformed.
pub struct TokenFrames<'a> {
    stream: &'a [u8],
    pos: usize,
    failed: bool,
}

impl<'a> TokenFrames<'a> {
    pub fn new(stream: &'a [u8]) -> Self {
        Self {
            stream,
            pos: 0,
            failed: false,
        }
    }

    fn fail(&mut self, msg: String) -> Option<VeilResult<&'a [u8]>> {
        self.failed = true;
        Some(Err(VeilError::Integrity(msg)))
    }
}

impl<'a> Iterator for TokenFrames<'a> {
    type Item = VeilResult<&'a [u8]>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pos >= self.stream.len() {
            return None;
        }

        let start = self.pos;
        let rest = &self.stream[start..];
        let Some(eq) = rest.iter().position(|&b| b == TOKEN_MARKER[0]) else {
            return self.fail(format!(
                "unterminated token at offset {start} ({} trailing bytes)",
                rest.len()
            ));
        };
        if eq == 0 {
            return self.fail(format!("empty token frame at offset {start}"));
        }
        if rest.get(eq + 1) != Some(&TOKEN_MARKER[1]) {
            return self.fail(format!(
                "stray terminator byte at offset {}",
                start + eq
            ));
        }

        let end = eq + TOKEN_MARKER.len();
        self.pos = start + end;
        Some(Ok(&rest[..end]))
    }
}

/// Split a token stream into its tokens, validating the framing of the
/// whole stream before returning anything.
pub fn split_tokens(stream: &[u8]) -> VeilResult<Vec<&[u8]>> {
    TokenFrames::new(stream).collect()
}

/// Decrypt every token of a stream and concatenate the plaintexts in order.
///
/// An empty stream yields empty plaintext without touching the cipher. Any
/// framing or authentication failure aborts the whole read.
pub fn decrypt_stream(codec: &TokenCodec, stream: &[u8]) -> VeilResult<Vec<u8>> {
    let tokens = split_tokens(stream).inspect_err(|e| {
        warn!(bytes = stream.len(), error = %e, "token stream framing rejected");
    })?;

    let mut plaintext = Vec::with_capacity(stream.len() * 3 / 4);
    for (index, token) in tokens.iter().enumerate() {
        let chunk = codec.decrypt(token).inspect_err(|e| {
            warn!(index, tokens = tokens.len(), error = %e, "token failed to decrypt");
        })?;
        plaintext.extend_from_slice(&chunk);
    }

    debug!(tokens = tokens.len(), bytes = plaintext.len(), "token stream decrypted");
    Ok(plaintext)
}
