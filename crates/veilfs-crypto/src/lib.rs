//! veilfs-crypto: the token layer of the veilfs overlay
//!
//! Pipeline: plaintext → bounded chunks → seal each chunk → text-safe token → append
//!
//! Token layout:
//! ```text
//! base64url_nopad( version (1) || nonce (24) || ciphertext || tag (16) ) || "=="
//! AEAD: XChaCha20-Poly1305 (key=overlay key, nonce=random_192bit, AAD="veilfs-token"||version)
//! ```
//!
//! A stored object is the concatenation of such tokens. The unpadded base64url
//! alphabet has no `=`, so the `==` terminator can never occur inside a token
//! and the stream splits back into tokens without a length table.

pub mod chunk;
pub mod codec;
pub mod framing;
pub mod keys;

pub use chunk::ChunkedWriter;
pub use codec::{Token, TokenCodec};
pub use framing::{decrypt_stream, split_tokens, TokenFrames};
pub use keys::OverlayKey;

/// Size of an overlay key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of an XChaCha20-Poly1305 nonce (192-bit)
pub const NONCE_SIZE: usize = 24;

/// Size of a Poly1305 authentication tag
pub const TAG_SIZE: usize = 16;

/// Current token format version, the first byte of every token body
pub const TOKEN_VERSION: u8 = 1;

/// Two-character terminator that ends every token
pub const TOKEN_MARKER: &[u8; 2] = b"==";
