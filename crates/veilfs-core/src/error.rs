use std::io;

use thiserror::Error;

pub type VeilResult<T> = Result<T, VeilError>;

#[derive(Debug, Error)]
pub enum VeilError {
    /// A token failed authentication: wrong key, corruption, truncation,
    /// or bytes that were never a token.
    #[error("integrity check failed: {0}")]
    Integrity(String),

    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("resource already exists: {0}")]
    AlreadyExists(String),

    #[error("is a directory: {0}")]
    IsADirectory(String),

    #[error("not a directory: {0}")]
    NotADirectory(String),

    #[error("directory not empty: {0}")]
    DirectoryNotEmpty(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("text encoding error: {0}")]
    Encoding(String),

    #[error("storage error: {0}")]
    Storage(String),

    /// The filesystem was closed and accepts no further operations.
    #[error("filesystem is closed")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl VeilError {
    pub fn is_integrity(&self) -> bool {
        matches!(self, VeilError::Integrity(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, VeilError::NotFound(_))
    }

    /// Classify an `io::Error` raised while touching `path` into the
    /// structural variants, keeping anything unrecognised as `Io`.
    pub fn from_io(err: io::Error, path: &str) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => VeilError::NotFound(path.to_string()),
            io::ErrorKind::AlreadyExists => VeilError::AlreadyExists(path.to_string()),
            io::ErrorKind::IsADirectory => VeilError::IsADirectory(path.to_string()),
            io::ErrorKind::NotADirectory => VeilError::NotADirectory(path.to_string()),
            io::ErrorKind::DirectoryNotEmpty => VeilError::DirectoryNotEmpty(path.to_string()),
            _ => VeilError::Io(err),
        }
    }
}

impl From<VeilError> for io::Error {
    fn from(err: VeilError) -> Self {
        match err {
            VeilError::Io(e) => e,
            VeilError::Integrity(_) => io::Error::new(io::ErrorKind::InvalidData, err),
            VeilError::Encoding(_) => io::Error::new(io::ErrorKind::InvalidData, err),
            VeilError::NotFound(_) => io::Error::new(io::ErrorKind::NotFound, err),
            VeilError::AlreadyExists(_) => io::Error::new(io::ErrorKind::AlreadyExists, err),
            VeilError::InvalidPath(_) | VeilError::InvalidKey(_) | VeilError::Config(_) => {
                io::Error::new(io::ErrorKind::InvalidInput, err)
            }
            other => io::Error::other(other),
        }
    }
}
