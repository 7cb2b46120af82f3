//! veilfs-overlay: a plaintext view over a backend that only ever stores
//! ciphertext.
//!
//! Payload operations seal data into tokens (one per chunk) and append
//! them to the stored object; reads split the object back into tokens and
//! authenticate every one before returning anything. Structural
//! operations (directories, listing, stat, copy, move) pass straight
//! through to the backend.

pub mod opener;
pub mod options;
pub mod overlay;
pub mod stream;

pub use opener::open_url;
pub use options::{resolve_key, OverlayOptions};
pub use overlay::EncryptingOverlay;
pub use stream::{EncryptedStream, EncryptedTextStream};
