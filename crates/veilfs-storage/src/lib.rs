//! veilfs-storage: path-addressed backends holding token streams
//!
//! The overlay only needs the small capability set in [`Backend`]; three
//! implementations are provided: a host directory, a process-local tree,
//! and any OpenDAL operator (S3 in practice).

pub mod backend;
pub mod health;
pub mod local;
pub mod memory;
pub mod object_store;
pub mod operator;
pub mod paths;
pub mod scoped;

pub use backend::{Backend, RawHandle};
pub use health::{check_health, is_healthy};
pub use local::LocalBackend;
pub use memory::MemoryBackend;
pub use object_store::OpendalBackend;
pub use operator::{build_s3_operator, S3Credentials};
pub use scoped::ScopedBackend;

use veilfs_core::config::{BackendKind, StorageConfig};
use veilfs_core::VeilResult;

/// Construct the backend selected by `storage.backend`.
pub fn open_backend(
    storage: &StorageConfig,
    creds: Option<&S3Credentials>,
) -> VeilResult<Box<dyn Backend>> {
    let backend: Box<dyn Backend> = match storage.backend {
        BackendKind::Local => Box::new(LocalBackend::new(&storage.root, storage.create)?),
        BackendKind::Memory => Box::new(MemoryBackend::new()),
        BackendKind::S3 => Box::new(OpendalBackend::new(build_s3_operator(storage, creds)?)?),
    };
    tracing::info!(backend = ?storage.backend, "storage backend opened");
    Ok(backend)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_local_backend() {
        let tmp = tempfile::TempDir::new().unwrap();
        let storage = StorageConfig {
            root: tmp.path().join("vault"),
            ..Default::default()
        };
        let backend = open_backend(&storage, None).unwrap();
        backend.write_bytes("/x", b"1").unwrap();
        assert!(backend.is_file("/x").unwrap());
    }

    #[test]
    fn test_open_memory_backend() {
        let storage = StorageConfig {
            backend: BackendKind::Memory,
            ..Default::default()
        };
        let backend = open_backend(&storage, None).unwrap();
        assert!(backend.list_dir("/").unwrap().is_empty());
    }
}
