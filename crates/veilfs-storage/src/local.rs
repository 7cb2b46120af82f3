//! Local filesystem backend using `std::fs` directly.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use veilfs_core::{EntryInfo, OpenMode, VeilError, VeilResult};

use crate::backend::{Backend, RawHandle};
use crate::paths::{basename, normalize};

/// Storage rooted at a directory on the host filesystem.
#[derive(Debug, Clone)]
pub struct LocalBackend {
    root: PathBuf,
}

impl LocalBackend {
    /// Open a backend rooted at `root`. With `create`, a missing root
    /// directory (and its parents) is created.
    pub fn new(root: impl AsRef<Path>, create: bool) -> VeilResult<Self> {
        let root = root.as_ref();
        if !root.exists() {
            if !create {
                return Err(VeilError::NotFound(root.display().to_string()));
            }
            fs::create_dir_all(root)
                .map_err(|e| VeilError::from_io(e, &root.display().to_string()))?;
            tracing::info!(root = %root.display(), "created storage root");
        }
        // Canonicalize for stable `describe` output with symlinked roots.
        let root = fs::canonicalize(root)?;
        if !root.is_dir() {
            return Err(VeilError::NotADirectory(root.display().to_string()));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve an overlay path to a host path under the root.
    fn resolve(&self, path: &str) -> VeilResult<PathBuf> {
        let key = normalize(path)?;
        if key.is_empty() {
            Ok(self.root.clone())
        } else {
            Ok(self.root.join(key))
        }
    }

    fn metadata(&self, host: &Path, path: &str) -> VeilResult<fs::Metadata> {
        fs::metadata(host).map_err(|e| VeilError::from_io(e, path))
    }
}

impl Backend for LocalBackend {
    fn write_bytes(&self, path: &str, data: &[u8]) -> VeilResult<()> {
        let host = self.resolve(path)?;
        fs::write(&host, data).map_err(|e| VeilError::from_io(e, path))
    }

    fn append_bytes(&self, path: &str, data: &[u8]) -> VeilResult<()> {
        let host = self.resolve(path)?;
        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&host)
            .map_err(|e| VeilError::from_io(e, path))?;
        file.write_all(data)?;
        Ok(())
    }

    fn read_bytes(&self, path: &str) -> VeilResult<Vec<u8>> {
        let host = self.resolve(path)?;
        if self.metadata(&host, path)?.is_dir() {
            return Err(VeilError::IsADirectory(path.to_string()));
        }
        fs::read(&host).map_err(|e| VeilError::from_io(e, path))
    }

    fn make_dir(&self, path: &str, recreate: bool) -> VeilResult<()> {
        let host = self.resolve(path)?;
        match fs::create_dir(&host) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::AlreadyExists && recreate && host.is_dir() => Ok(()),
            Err(e) => Err(VeilError::from_io(e, path)),
        }
    }

    fn make_dirs(&self, path: &str) -> VeilResult<()> {
        let host = self.resolve(path)?;
        if host.is_file() {
            return Err(VeilError::AlreadyExists(path.to_string()));
        }
        fs::create_dir_all(&host).map_err(|e| VeilError::from_io(e, path))
    }

    fn list_dir(&self, path: &str) -> VeilResult<Vec<String>> {
        let host = self.resolve(path)?;
        if !self.metadata(&host, path)?.is_dir() {
            return Err(VeilError::NotADirectory(path.to_string()));
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(&host).map_err(|e| VeilError::from_io(e, path))? {
            names.push(entry?.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    fn remove(&self, path: &str) -> VeilResult<()> {
        let host = self.resolve(path)?;
        let meta = fs::symlink_metadata(&host).map_err(|e| VeilError::from_io(e, path))?;
        if meta.is_dir() {
            return Err(VeilError::IsADirectory(path.to_string()));
        }
        fs::remove_file(&host).map_err(|e| VeilError::from_io(e, path))
    }

    fn remove_dir(&self, path: &str) -> VeilResult<()> {
        if normalize(path)?.is_empty() {
            return Err(VeilError::InvalidPath("cannot remove the root directory".into()));
        }
        let host = self.resolve(path)?;
        if !self.metadata(&host, path)?.is_dir() {
            return Err(VeilError::NotADirectory(path.to_string()));
        }
        fs::remove_dir(&host).map_err(|e| VeilError::from_io(e, path))
    }

    fn stat(&self, path: &str) -> VeilResult<EntryInfo> {
        let key = normalize(path)?;
        let host = self.resolve(&key)?;
        let meta = self.metadata(&host, path)?;
        Ok(EntryInfo {
            name: basename(&key).to_string(),
            is_dir: meta.is_dir(),
            size: if meta.is_dir() { 0 } else { meta.len() },
        })
    }

    fn open(&self, path: &str, mode: OpenMode) -> VeilResult<Box<dyn RawHandle>> {
        let host = self.resolve(path)?;
        if host.is_dir() {
            return Err(VeilError::IsADirectory(path.to_string()));
        }
        let file = OpenOptions::new()
            .read(mode.read)
            .write(mode.write && !mode.append)
            .append(mode.append)
            .truncate(mode.truncate)
            .create(mode.create && !mode.exclusive)
            .create_new(mode.exclusive)
            .open(&host)
            .map_err(|e| VeilError::from_io(e, path))?;
        Ok(Box::new(file))
    }

    fn describe(&self, path: &str) -> VeilResult<String> {
        Ok(self.resolve(path)?.display().to_string())
    }

    fn copy(&self, src: &str, dst: &str, overwrite: bool) -> VeilResult<()> {
        let from = self.resolve(src)?;
        let to = self.resolve(dst)?;
        if self.metadata(&from, src)?.is_dir() {
            return Err(VeilError::IsADirectory(src.to_string()));
        }
        if !overwrite && to.exists() {
            return Err(VeilError::AlreadyExists(dst.to_string()));
        }
        fs::copy(&from, &to).map_err(|e| VeilError::from_io(e, dst))?;
        Ok(())
    }

    fn move_file(&self, src: &str, dst: &str, overwrite: bool) -> VeilResult<()> {
        let from = self.resolve(src)?;
        let to = self.resolve(dst)?;
        if self.metadata(&from, src)?.is_dir() {
            return Err(VeilError::IsADirectory(src.to_string()));
        }
        if !overwrite && to.exists() {
            return Err(VeilError::AlreadyExists(dst.to_string()));
        }
        fs::rename(&from, &to).map_err(|e| VeilError::from_io(e, dst))
    }
}
