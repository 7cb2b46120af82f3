//! Object-store backend over an OpenDAL `Operator`.
//!
//! OpenDAL 0.55 only exposes an async API, so each backend owns a small
//! current-thread runtime and blocks on it. Calling into this backend from
//! inside another tokio runtime will panic; use `spawn_blocking` there.

use std::future::IntoFuture;
use std::sync::Arc;

use opendal::{ErrorKind, Operator};
use tokio::runtime::Runtime;
use veilfs_core::{EntryInfo, OpenMode, VeilError, VeilResult};

use crate::backend::{Backend, BufferedHandle, Publish, RawHandle};
use crate::paths::{basename, normalize, parent};

/// Backend storing token streams as objects behind an OpenDAL operator.
///
/// Directories are represented by `dir/` marker objects, matching what
/// `Operator::create_dir` produces.
#[derive(Clone)]
pub struct OpendalBackend {
    op: Operator,
    rt: Arc<Runtime>,
    native_append: bool,
}

impl std::fmt::Debug for OpendalBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let info = self.op.info();
        f.debug_struct("OpendalBackend")
            .field("scheme", &info.scheme())
            .field("root", &info.root())
            .field("native_append", &self.native_append)
            .finish()
    }
}

/// Translate an OpenDAL error into the overlay's structural variants.
fn map_err(err: opendal::Error, path: &str) -> VeilError {
    match err.kind() {
        ErrorKind::NotFound => VeilError::NotFound(path.to_string()),
        ErrorKind::AlreadyExists => VeilError::AlreadyExists(path.to_string()),
        ErrorKind::IsADirectory => VeilError::IsADirectory(path.to_string()),
        ErrorKind::NotADirectory => VeilError::NotADirectory(path.to_string()),
        _ => VeilError::Storage(format!("{path}: {err}")),
    }
}

fn dir_key(key: &str) -> String {
    if key.is_empty() {
        "/".to_string()
    } else {
        format!("{key}/")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    File(u64),
    Dir,
}

impl OpendalBackend {
    pub fn new(op: Operator) -> VeilResult<Self> {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let native_append = op.info().full_capability().write_can_append;
        tracing::debug!(
            scheme = %op.info().scheme(),
            native_append,
            "opendal backend ready"
        );
        Ok(Self {
            op,
            rt: Arc::new(rt),
            native_append,
        })
    }

    pub fn operator(&self) -> &Operator {
        &self.op
    }

    /// Look up `key` as an object first, then as a directory marker.
    fn kind(&self, key: &str) -> VeilResult<Option<Kind>> {
        if key.is_empty() {
            return Ok(Some(Kind::Dir));
        }
        match self.rt.block_on(self.op.stat(key)) {
            Ok(meta) if meta.is_dir() => return Ok(Some(Kind::Dir)),
            Ok(meta) => return Ok(Some(Kind::File(meta.content_length()))),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(map_err(e, key)),
        }
        match self.rt.block_on(self.op.stat(&dir_key(key))) {
            Ok(_) => Ok(Some(Kind::Dir)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(map_err(e, key)),
        }
    }

    fn require_dir(&self, key: &str, path: &str) -> VeilResult<()> {
        match self.kind(key)? {
            Some(Kind::Dir) => Ok(()),
            Some(Kind::File(_)) => Err(VeilError::NotADirectory(path.to_string())),
            None => Err(VeilError::NotFound(path.to_string())),
        }
    }

    fn require_file(&self, key: &str, path: &str) -> VeilResult<u64> {
        match self.kind(key)? {
            Some(Kind::File(size)) => Ok(size),
            Some(Kind::Dir) => Err(VeilError::IsADirectory(path.to_string())),
            None => Err(VeilError::NotFound(path.to_string())),
        }
    }

    fn put(&self, key: &str, data: Vec<u8>) -> VeilResult<()> {
        self.rt
            .block_on(self.op.write(key, data))
            .map(|_| ())
            .map_err(|e| map_err(e, key))
    }

    fn get(&self, key: &str) -> VeilResult<Vec<u8>> {
        self.rt
            .block_on(self.op.read(key))
            .map(|buf| buf.to_vec())
            .map_err(|e| map_err(e, key))
    }

    fn writable(&self, key: &str, path: &str) -> VeilResult<()> {
        if let Some(Kind::Dir) = self.kind(key)? {
            return Err(VeilError::IsADirectory(path.to_string()));
        }
        self.require_dir(parent(key), parent(key))
    }

    fn children(&self, key: &str) -> VeilResult<Vec<String>> {
        let prefix = dir_key(key);
        let entries = self
            .rt
            .block_on(self.op.list(&prefix))
            .map_err(|e| map_err(e, key))?;
        let mut names: Vec<String> = entries
            .into_iter()
            .filter(|entry| entry.path() != prefix && entry.path() != "/")
            .map(|entry| entry.name().trim_end_matches('/').to_string())
            .filter(|name| !name.is_empty())
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }
}

impl Backend for OpendalBackend {
    fn write_bytes(&self, path: &str, data: &[u8]) -> VeilResult<()> {
        let key = normalize(path)?;
        self.writable(&key, path)?;
        self.put(&key, data.to_vec())
    }

    fn append_bytes(&self, path: &str, data: &[u8]) -> VeilResult<()> {
        let key = normalize(path)?;
        self.writable(&key, path)?;
        if self.native_append {
            return self
                .rt
                .block_on(self.op.write_with(&key, data.to_vec()).append(true).into_future())
                .map(|_| ())
                .map_err(|e| map_err(e, path));
        }
        // Read-modify-write for stores without append support.
        let mut current = match self.get(&key) {
            Ok(bytes) => bytes,
            Err(VeilError::NotFound(_)) => Vec::new(),
            Err(e) => return Err(e),
        };
        current.extend_from_slice(data);
        self.put(&key, current)
    }

    fn read_bytes(&self, path: &str) -> VeilResult<Vec<u8>> {
        let key = normalize(path)?;
        self.require_file(&key, path)?;
        self.get(&key)
    }

    fn make_dir(&self, path: &str, recreate: bool) -> VeilResult<()> {
        let key = normalize(path)?;
        match self.kind(&key)? {
            Some(Kind::Dir) if recreate => return Ok(()),
            Some(_) => return Err(VeilError::AlreadyExists(path.to_string())),
            None => {}
        }
        self.require_dir(parent(&key), parent(&key))?;
        self.rt
            .block_on(self.op.create_dir(&dir_key(&key)))
            .map_err(|e| map_err(e, path))
    }

    fn make_dirs(&self, path: &str) -> VeilResult<()> {
        let key = normalize(path)?;
        let mut prefix = String::new();
        for part in key.split('/').filter(|p| !p.is_empty()) {
            if !prefix.is_empty() {
                prefix.push('/');
            }
            prefix.push_str(part);
            match self.kind(&prefix)? {
                Some(Kind::Dir) => continue,
                Some(Kind::File(_)) => return Err(VeilError::AlreadyExists(prefix)),
                None => self
                    .rt
                    .block_on(self.op.create_dir(&dir_key(&prefix)))
                    .map_err(|e| map_err(e, &prefix))?,
            }
        }
        Ok(())
    }

    fn list_dir(&self, path: &str) -> VeilResult<Vec<String>> {
        let key = normalize(path)?;
        self.require_dir(&key, path)?;
        self.children(&key)
    }

    fn remove(&self, path: &str) -> VeilResult<()> {
        let key = normalize(path)?;
        self.require_file(&key, path)?;
        self.rt
            .block_on(self.op.delete(&key))
            .map_err(|e| map_err(e, path))
    }

    fn remove_dir(&self, path: &str) -> VeilResult<()> {
        let key = normalize(path)?;
        if key.is_empty() {
            return Err(VeilError::InvalidPath("cannot remove the root directory".into()));
        }
        self.require_dir(&key, path)?;
        if !self.children(&key)?.is_empty() {
            return Err(VeilError::DirectoryNotEmpty(path.to_string()));
        }
        self.rt
            .block_on(self.op.delete(&dir_key(&key)))
            .map_err(|e| map_err(e, path))
    }

    fn stat(&self, path: &str) -> VeilResult<EntryInfo> {
        let key = normalize(path)?;
        let name = basename(&key).to_string();
        match self.kind(&key)? {
            Some(Kind::Dir) => Ok(EntryInfo {
                name,
                is_dir: true,
                size: 0,
            }),
            Some(Kind::File(size)) => Ok(EntryInfo {
                name,
                is_dir: false,
                size,
            }),
            None => Err(VeilError::NotFound(path.to_string())),
        }
    }

    fn open(&self, path: &str, mode: OpenMode) -> VeilResult<Box<dyn RawHandle>> {
        let key = normalize(path)?;
        let initial = match self.kind(&key)? {
            Some(Kind::Dir) => return Err(VeilError::IsADirectory(path.to_string())),
            Some(Kind::File(_)) if mode.exclusive => {
                return Err(VeilError::AlreadyExists(path.to_string()))
            }
            Some(Kind::File(_)) if mode.truncate => {
                self.put(&key, Vec::new())?;
                Vec::new()
            }
            Some(Kind::File(_)) => self.get(&key)?,
            None if mode.create => {
                self.require_dir(parent(&key), parent(&key))?;
                self.put(&key, Vec::new())?;
                Vec::new()
            }
            None => return Err(VeilError::NotFound(path.to_string())),
        };

        let op = self.op.clone();
        let rt = Arc::clone(&self.rt);
        let publish: Publish = Box::new(move |data: &[u8]| {
            rt.block_on(op.write(&key, data.to_vec()))
                .map(|_| ())
                .map_err(|e| map_err(e, &key))
        });
        Ok(Box::new(BufferedHandle::new(initial, mode, publish)))
    }

    fn describe(&self, path: &str) -> VeilResult<String> {
        let key = normalize(path)?;
        let info = self.op.info();
        let root = info.root();
        let sep = if root.ends_with('/') { "" } else { "/" };
        Ok(format!("{}://{}{}{}", info.scheme(), root, sep, key))
    }
}
