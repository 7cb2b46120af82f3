//! Storage health check

use veilfs_core::{VeilError, VeilResult};

use crate::backend::Backend;

/// Verify the backend is reachable by listing the root
pub fn check_health(backend: &dyn Backend) -> VeilResult<()> {
    backend
        .list_dir("/")
        .map(|_| ())
        .map_err(|e| VeilError::Storage(format!("storage health check failed: {e}")))
}

/// Returns true if storage is reachable, false otherwise (non-panicking)
pub fn is_healthy(backend: &dyn Backend) -> bool {
    check_health(backend).is_ok()
}
