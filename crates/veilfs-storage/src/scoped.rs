//! A directory of another backend, presented as its root.

use veilfs_core::{EntryInfo, OpenMode, VeilError, VeilResult};

use crate::backend::{Backend, RawHandle};
use crate::paths::normalize;

/// Borrowed view of `inner` rooted at one of its directories.
///
/// Paths are normalized before the prefix is applied, so `..` can never
/// reach outside the scoped directory.
pub struct ScopedBackend<'a, B: Backend + ?Sized> {
    inner: &'a B,
    prefix: String,
}

impl<'a, B: Backend + ?Sized> ScopedBackend<'a, B> {
    /// Scope `inner` to the existing directory `dir`.
    pub fn new(inner: &'a B, dir: &str) -> VeilResult<Self> {
        if !inner.stat(dir)?.is_dir {
            return Err(VeilError::NotADirectory(dir.to_string()));
        }
        Ok(Self {
            inner,
            prefix: normalize(dir)?,
        })
    }

    /// The scoped directory, normalized, relative to the inner root.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn resolve(&self, path: &str) -> VeilResult<String> {
        let rel = normalize(path)?;
        Ok(match (self.prefix.is_empty(), rel.is_empty()) {
            (true, _) => rel,
            (false, true) => self.prefix.clone(),
            (false, false) => format!("{}/{rel}", self.prefix),
        })
    }
}

impl<B: Backend + ?Sized> Backend for ScopedBackend<'_, B> {
    fn write_bytes(&self, path: &str, data: &[u8]) -> VeilResult<()> {
        self.inner.write_bytes(&self.resolve(path)?, data)
    }

    fn append_bytes(&self, path: &str, data: &[u8]) -> VeilResult<()> {
        self.inner.append_bytes(&self.resolve(path)?, data)
    }

    fn read_bytes(&self, path: &str) -> VeilResult<Vec<u8>> {
        self.inner.read_bytes(&self.resolve(path)?)
    }

    fn make_dir(&self, path: &str, recreate: bool) -> VeilResult<()> {
        self.inner.make_dir(&self.resolve(path)?, recreate)
    }

    fn make_dirs(&self, path: &str) -> VeilResult<()> {
        self.inner.make_dirs(&self.resolve(path)?)
    }

    fn list_dir(&self, path: &str) -> VeilResult<Vec<String>> {
        self.inner.list_dir(&self.resolve(path)?)
    }

    fn remove(&self, path: &str) -> VeilResult<()> {
        self.inner.remove(&self.resolve(path)?)
    }

    fn remove_dir(&self, path: &str) -> VeilResult<()> {
        let target = self.resolve(path)?;
        if target == self.prefix {
            return Err(VeilError::InvalidPath("cannot remove the root directory".into()));
        }
        self.inner.remove_dir(&target)
    }

    fn stat(&self, path: &str) -> VeilResult<EntryInfo> {
        let target = self.resolve(path)?;
        let mut info = self.inner.stat(&target)?;
        if target == self.prefix {
            info.name.clear();
        }
        Ok(info)
    }

    fn open(&self, path: &str, mode: OpenMode) -> VeilResult<Box<dyn RawHandle>> {
        self.inner.open(&self.resolve(path)?, mode)
    }

    fn describe(&self, path: &str) -> VeilResult<String> {
        self.inner.describe(&self.resolve(path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryBackend;

    fn populated() -> MemoryBackend {
        let backend = MemoryBackend::new();
        backend.make_dirs("/test_dir/sub").unwrap();
        backend.write_bytes("/test_dir/x.txt", b"x").unwrap();
        backend.write_bytes("/outside.txt", b"o").unwrap();
        backend
    }

    #[test]
    fn test_scope_maps_paths() {
        let backend = populated();
        let scoped = ScopedBackend::new(&backend, "/test_dir").unwrap();
        assert_eq!(scoped.prefix(), "test_dir");
        assert_eq!(scoped.list_dir("./").unwrap(), vec!["sub", "x.txt"]);
        assert_eq!(scoped.read_bytes("x.txt").unwrap(), b"x");

        scoped.write_bytes("/sub/y.txt", b"y").unwrap();
        assert_eq!(backend.read_bytes("/test_dir/sub/y.txt").unwrap(), b"y");
        assert_eq!(scoped.stat("/").unwrap().name, "");
    }

    #[test]
    fn test_scope_cannot_escape() {
        let backend = populated();
        let scoped = ScopedBackend::new(&backend, "/test_dir").unwrap();
        assert!(matches!(
            scoped.read_bytes("../outside.txt"),
            Err(VeilError::InvalidPath(_))
        ));
        assert!(matches!(scoped.remove_dir("/"), Err(VeilError::InvalidPath(_))));
    }

    #[test]
    fn test_scope_requires_directory() {
        let backend = populated();
        assert!(matches!(
            ScopedBackend::new(&backend, "/outside.txt"),
            Err(VeilError::NotADirectory(_))
        ));
        assert!(matches!(
            ScopedBackend::new(&backend, "/nope"),
            Err(VeilError::NotFound(_))
        ));
    }
}
