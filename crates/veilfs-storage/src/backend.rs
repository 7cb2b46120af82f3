//! Backend capability trait.
//!
//! A backend is a path-addressed byte store with directories. It knows
//! nothing about tokens or keys: the overlay hands it ciphertext and asks
//! for ciphertext back. Structural errors are reported through the
//! `VeilError` structural variants so the overlay can pass them through
//! unchanged.

use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};

use veilfs_core::{EntryInfo, OpenMode, VeilError, VeilResult};

use crate::paths::{join, normalize};

/// A byte handle returned by [`Backend::open`].
///
/// Dropping a handle releases it; `close` additionally surfaces any error
/// from publishing buffered writes.
pub trait RawHandle: Read + Write + Seek + Send {
    fn close(&mut self) -> VeilResult<()> {
        self.flush().map_err(VeilError::from)
    }
}

impl RawHandle for std::fs::File {
    fn close(&mut self) -> VeilResult<()> {
        self.flush()?;
        self.sync_all().map_err(VeilError::from)
    }
}

/// Path-addressed storage the overlay delegates to.
///
/// # Invariants
///
/// - `append_bytes` creates the object when it is missing and never
///   rewrites bytes already stored
/// - `read_bytes` returns exactly the concatenation of what was written
///   and appended since the last `write_bytes`
/// - `stat` reports the stored (raw) size
pub trait Backend: Send + Sync {
    /// Create or replace the object at `path`.
    fn write_bytes(&self, path: &str, data: &[u8]) -> VeilResult<()>;

    /// Append to the object at `path`, creating it when missing.
    fn append_bytes(&self, path: &str, data: &[u8]) -> VeilResult<()>;

    /// Read the whole object at `path`.
    fn read_bytes(&self, path: &str) -> VeilResult<Vec<u8>>;

    /// Create a single directory. With `recreate`, an existing directory
    /// is not an error.
    fn make_dir(&self, path: &str, recreate: bool) -> VeilResult<()>;

    /// Create a directory and any missing parents.
    fn make_dirs(&self, path: &str) -> VeilResult<()>;

    /// Names of the entries directly under `path`, sorted.
    fn list_dir(&self, path: &str) -> VeilResult<Vec<String>>;

    /// Remove a file.
    fn remove(&self, path: &str) -> VeilResult<()>;

    /// Remove an empty directory.
    fn remove_dir(&self, path: &str) -> VeilResult<()>;

    fn stat(&self, path: &str) -> VeilResult<EntryInfo>;

    fn open(&self, path: &str, mode: OpenMode) -> VeilResult<Box<dyn RawHandle>>;

    /// Human-readable location of `path` inside the backend.
    fn describe(&self, path: &str) -> VeilResult<String>;

    fn exists(&self, path: &str) -> VeilResult<bool> {
        match self.stat(path) {
            Ok(_) => Ok(true),
            Err(VeilError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn is_dir(&self, path: &str) -> VeilResult<bool> {
        match self.stat(path) {
            Ok(info) => Ok(info.is_dir),
            Err(VeilError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn is_file(&self, path: &str) -> VeilResult<bool> {
        match self.stat(path) {
            Ok(info) => Ok(!info.is_dir),
            Err(VeilError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Copy a file's raw bytes to `dst`.
    fn copy(&self, src: &str, dst: &str, overwrite: bool) -> VeilResult<()> {
        if self.stat(src)?.is_dir {
            return Err(VeilError::IsADirectory(src.to_string()));
        }
        if !overwrite && self.exists(dst)? {
            return Err(VeilError::AlreadyExists(dst.to_string()));
        }
        let data = self.read_bytes(src)?;
        self.write_bytes(dst, &data)
    }

    /// Move a file to `dst`.
    fn move_file(&self, src: &str, dst: &str, overwrite: bool) -> VeilResult<()> {
        self.copy(src, dst, overwrite)?;
        self.remove(src)
    }

    /// Recursively copy the contents of directory `src` into `dst`,
    /// replacing files that already exist there. With `create`, a missing
    /// `dst` (and its parents) is created; otherwise it must exist.
    fn copy_dir(&self, src: &str, dst: &str, create: bool) -> VeilResult<()> {
        if !self.stat(src)?.is_dir {
            return Err(VeilError::NotADirectory(src.to_string()));
        }
        let (from, to) = (normalize(src)?, normalize(dst)?);
        if from.is_empty() || to == from || to.starts_with(&format!("{from}/")) {
            return Err(VeilError::InvalidPath(format!(
                "cannot copy '{src}' into itself at '{dst}'"
            )));
        }
        if create {
            self.make_dirs(dst)?;
        } else if !self.stat(dst)?.is_dir {
            return Err(VeilError::NotADirectory(dst.to_string()));
        }
        for name in self.list_dir(src)? {
            let from = join(src, &name)?;
            let to = join(dst, &name)?;
            if self.is_dir(&from)? {
                self.copy_dir(&from, &to, true)?;
            } else {
                self.copy(&from, &to, true)?;
            }
        }
        Ok(())
    }
}

impl<B: Backend + ?Sized> Backend for Box<B> {
    fn write_bytes(&self, path: &str, data: &[u8]) -> VeilResult<()> {
        (**self).write_bytes(path, data)
    }

    fn append_bytes(&self, path: &str, data: &[u8]) -> VeilResult<()> {
        (**self).append_bytes(path, data)
    }

    fn read_bytes(&self, path: &str) -> VeilResult<Vec<u8>> {
        (**self).read_bytes(path)
    }

    fn make_dir(&self, path: &str, recreate: bool) -> VeilResult<()> {
        (**self).make_dir(path, recreate)
    }

    fn make_dirs(&self, path: &str) -> VeilResult<()> {
        (**self).make_dirs(path)
    }

    fn list_dir(&self, path: &str) -> VeilResult<Vec<String>> {
        (**self).list_dir(path)
    }

    fn remove(&self, path: &str) -> VeilResult<()> {
        (**self).remove(path)
    }

    fn remove_dir(&self, path: &str) -> VeilResult<()> {
        (**self).remove_dir(path)
    }

    fn stat(&self, path: &str) -> VeilResult<EntryInfo> {
        (**self).stat(path)
    }

    fn open(&self, path: &str, mode: OpenMode) -> VeilResult<Box<dyn RawHandle>> {
        (**self).open(path, mode)
    }

    fn describe(&self, path: &str) -> VeilResult<String> {
        (**self).describe(path)
    }

    fn exists(&self, path: &str) -> VeilResult<bool> {
        (**self).exists(path)
    }

    fn is_dir(&self, path: &str) -> VeilResult<bool> {
        (**self).is_dir(path)
    }

    fn is_file(&self, path: &str) -> VeilResult<bool> {
        (**self).is_file(path)
    }

    fn copy(&self, src: &str, dst: &str, overwrite: bool) -> VeilResult<()> {
        (**self).copy(src, dst, overwrite)
    }

    fn move_file(&self, src: &str, dst: &str, overwrite: bool) -> VeilResult<()> {
        (**self).move_file(src, dst, overwrite)
    }

    fn copy_dir(&self, src: &str, dst: &str, create: bool) -> VeilResult<()> {
        (**self).copy_dir(src, dst, create)
    }
}

/// Callback that stores a handle's full contents back into its backend.
pub(crate) type Publish = Box<dyn FnMut(&[u8]) -> VeilResult<()> + Send>;

/// Handle over an in-memory copy of an object, for backends without
/// native file handles. Writes are published as a whole on `flush`,
/// `close`, and drop.
pub(crate) struct BufferedHandle {
    buf: Cursor<Vec<u8>>,
    mode: OpenMode,
    dirty: bool,
    publish: Publish,
}

impl BufferedHandle {
    pub(crate) fn new(initial: Vec<u8>, mode: OpenMode, publish: Publish) -> Self {
        let mut buf = Cursor::new(initial);
        if mode.append {
            buf.set_position(buf.get_ref().len() as u64);
        }
        Self {
            buf,
            mode,
            dirty: false,
            publish,
        }
    }
}

impl Read for BufferedHandle {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if !self.mode.read {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "handle not opened for reading",
            ));
        }
        self.buf.read(out)
    }
}

impl Write for BufferedHandle {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if !self.mode.is_writing() {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "handle not opened for writing",
            ));
        }
        if self.mode.append {
            self.buf.seek(SeekFrom::End(0))?;
        }
        self.dirty = true;
        self.buf.write(data)
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.dirty {
            // One publish attempt per batch of writes: a failure surfaces
            // here and is not retried on drop.
            self.dirty = false;
            (self.publish)(self.buf.get_ref())?;
        }
        Ok(())
    }
}

impl Seek for BufferedHandle {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.buf.seek(pos)
    }
}

impl RawHandle for BufferedHandle {}

impl Drop for BufferedHandle {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            tracing::warn!(error = %e, "buffered handle failed to publish on drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn recording(mode: OpenMode, initial: &[u8]) -> (BufferedHandle, Arc<Mutex<Vec<Vec<u8>>>>) {
        let published = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&published);
        let handle = BufferedHandle::new(
            initial.to_vec(),
            mode,
            Box::new(move |data| {
                sink.lock().push(data.to_vec());
                Ok(())
            }),
        );
        (handle, published)
    }

    #[test]
    fn test_read_only_handle_rejects_writes() {
        let (mut handle, published) = recording(OpenMode::READ, b"abc");
        let mut out = String::new();
        handle.read_to_string(&mut out).unwrap();
        assert_eq!(out, "abc");

        let err = handle.write(b"x").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
        drop(handle);
        assert!(published.lock().is_empty(), "clean handle must not publish");
    }

    #[test]
    fn test_append_handle_writes_at_end() {
        let (mut handle, published) = recording(OpenMode::APPEND, b"abc");
        handle.seek(SeekFrom::Start(0)).unwrap();
        handle.write_all(b"def").unwrap();
        handle.close().unwrap();
        assert_eq!(published.lock().as_slice(), &[b"abcdef".to_vec()]);
    }

    #[test]
    fn test_failed_publish_is_not_retried_on_drop() {
        let attempts = Arc::new(Mutex::new(0usize));
        let counter = Arc::clone(&attempts);
        let mut handle = BufferedHandle::new(
            Vec::new(),
            OpenMode::WRITE,
            Box::new(move |_| {
                *counter.lock() += 1;
                Err(VeilError::Storage("store unavailable".into()))
            }),
        );
        handle.write_all(b"lost").unwrap();
        assert!(handle.close().is_err());
        drop(handle);
        assert_eq!(*attempts.lock(), 1);
    }

    #[test]
    fn test_drop_publishes_pending_writes_once() {
        let (mut handle, published) = recording(OpenMode::WRITE, b"");
        handle.write_all(b"hello").unwrap();
        handle.flush().unwrap();
        drop(handle);
        assert_eq!(published.lock().len(), 1);
    }
}
