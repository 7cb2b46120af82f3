//! veilfs-core: shared types, config schema, and error taxonomy for the
//! veilfs encrypting storage overlay.

pub mod config;
pub mod error;
pub mod types;

pub use config::VeilConfig;
pub use error::{VeilError, VeilResult};
pub use types::{EntryInfo, OpenMode, TextEncoding};

/// Default amount of plaintext sealed into a single token (64 KiB)
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;
