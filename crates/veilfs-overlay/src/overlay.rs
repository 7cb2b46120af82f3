use std::sync::atomic::{AtomicBool, Ordering};

use veilfs_core::{EntryInfo, OpenMode, TextEncoding, VeilError, VeilResult};
use veilfs_crypto::{decrypt_stream, ChunkedWriter, OverlayKey, TokenCodec};
use veilfs_storage::{Backend, ScopedBackend};

use crate::options::OverlayOptions;
use crate::stream::{EncryptedStream, EncryptedTextStream};

/// Plaintext view over a backend whose objects are token streams.
///
/// Payload operations go through the token codec; every structural
/// operation is forwarded to the backend untouched, so sizes reported by
/// [`stat`](Self::stat) are ciphertext sizes. Use
/// [`plaintext_len`](Self::plaintext_len) for the decrypted length.
///
/// There is no internal locking: concurrent appends to one path can
/// interleave tokens. Callers keep to one writer per path.
pub struct EncryptingOverlay<B: Backend> {
    backend: B,
    codec: TokenCodec,
    chunk_size: usize,
    closed: AtomicBool,
}

impl<B: Backend> std::fmt::Debug for EncryptingOverlay<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptingOverlay")
            .field("chunk_size", &self.chunk_size)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl<B: Backend> EncryptingOverlay<B> {
    /// Overlay with the default chunk size.
    pub fn new(backend: B, key: OverlayKey) -> Self {
        let options = OverlayOptions::new(key);
        Self::from_parts(backend, TokenCodec::new(options.key), options.chunk_size)
    }

    /// Fails with `Config` before touching the backend if the options are
    /// unusable.
    pub fn with_options(backend: B, options: OverlayOptions) -> VeilResult<Self> {
        options.validate()?;
        tracing::debug!(chunk_size = options.chunk_size, "encrypting overlay ready");
        Ok(Self::from_parts(backend, TokenCodec::new(options.key), options.chunk_size))
    }

    fn from_parts(backend: B, codec: TokenCodec, chunk_size: usize) -> Self {
        Self {
            backend,
            codec,
            chunk_size,
            closed: AtomicBool::new(false),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn into_inner(self) -> B {
        self.backend
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Mark the overlay closed. Later operations fail with `Closed`;
    /// closing twice is harmless. Streams already open are unaffected.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::debug!("encrypting overlay closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn live(&self) -> VeilResult<&B> {
        if self.is_closed() {
            return Err(VeilError::Closed);
        }
        Ok(&self.backend)
    }

    /// Overlay rooted at the directory `path`, sharing this key and chunk
    /// size. Paths inside it cannot climb above `path`.
    pub fn opendir(&self, path: &str) -> VeilResult<EncryptingOverlay<ScopedBackend<'_, B>>> {
        let scoped = ScopedBackend::new(self.live()?, path)?;
        tracing::debug!(dir = scoped.prefix(), "opened scoped overlay");
        Ok(EncryptingOverlay::from_parts(
            scoped,
            self.codec.clone(),
            self.chunk_size,
        ))
    }

    // --- payload operations ---

    /// Replace the object at `path` with `data`.
    pub fn write_bytes(&self, path: &str, data: &[u8]) -> VeilResult<()> {
        self.write_chunked(path, data, self.chunk_size).map(|_| ())
    }

    /// Replace the object at `path`, sealing `chunk_size` plaintext bytes
    /// per token. Returns the plaintext length written.
    ///
    /// The object is cleared first and then grown one append per chunk. A
    /// failure part way through leaves a readable prefix behind.
    pub fn write_chunked(&self, path: &str, data: &[u8], chunk_size: usize) -> VeilResult<usize> {
        let backend = self.live()?;
        let writer = ChunkedWriter::new(&self.codec, chunk_size)?;
        backend.write_bytes(path, b"")?;
        let written = writer.write(data, |token| backend.append_bytes(path, token.as_bytes()))?;
        tracing::debug!(
            path,
            bytes = written,
            tokens = writer.chunk_count(written),
            "wrote encrypted object"
        );
        Ok(written)
    }

    /// Add `data` after the existing tokens of `path`, creating it if needed.
    pub fn append_bytes(&self, path: &str, data: &[u8]) -> VeilResult<()> {
        self.append_chunked(path, data, self.chunk_size).map(|_| ())
    }

    /// [`append_bytes`](Self::append_bytes) sealing `chunk_size` plaintext
    /// bytes per token. Returns the plaintext length appended.
    pub fn append_chunked(&self, path: &str, data: &[u8], chunk_size: usize) -> VeilResult<usize> {
        let backend = self.live()?;
        let writer = ChunkedWriter::new(&self.codec, chunk_size)?;
        if data.is_empty() && !backend.exists(path)? {
            // Appending nothing still leaves an (empty) object behind.
            backend.write_bytes(path, b"")?;
            return Ok(0);
        }
        let written = writer.write(data, |token| backend.append_bytes(path, token.as_bytes()))?;
        tracing::debug!(
            path,
            bytes = written,
            tokens = writer.chunk_count(written),
            "appended to encrypted object"
        );
        Ok(written)
    }

    /// Read and authenticate the whole object. Any bad token fails the
    /// entire read with `Integrity`.
    pub fn read_bytes(&self, path: &str) -> VeilResult<Vec<u8>> {
        let stream = self.live()?.read_bytes(path)?;
        decrypt_stream(&self.codec, &stream)
    }

    pub fn write_text(&self, path: &str, text: &str, encoding: TextEncoding) -> VeilResult<()> {
        self.write_bytes(path, &encoding.encode(text)?)
    }

    pub fn append_text(&self, path: &str, text: &str, encoding: TextEncoding) -> VeilResult<()> {
        self.append_bytes(path, &encoding.encode(text)?)
    }

    pub fn read_text(&self, path: &str, encoding: TextEncoding) -> VeilResult<String> {
        encoding.decode(self.read_bytes(path)?)
    }

    /// Decrypted length of the object. Requires a full read.
    pub fn plaintext_len(&self, path: &str) -> VeilResult<u64> {
        Ok(self.read_bytes(path)?.len() as u64)
    }

    /// Open a byte stream whose reads decrypt and whose writes encrypt.
    pub fn open_binary(&self, path: &str, mode: OpenMode) -> VeilResult<EncryptedStream> {
        let handle = self.live()?.open(path, mode)?;
        tracing::debug!(path, %mode, "opened encrypted stream");
        EncryptedStream::new(handle, mode, self.codec.clone(), self.chunk_size)
    }

    /// Text flavour of [`open_binary`](Self::open_binary).
    pub fn open(
        &self,
        path: &str,
        mode: OpenMode,
        encoding: TextEncoding,
    ) -> VeilResult<EncryptedTextStream> {
        Ok(EncryptedTextStream::new(self.open_binary(path, mode)?, encoding))
    }

    // --- structural pass-through ---

    pub fn describe(&self, path: &str) -> VeilResult<String> {
        self.live()?.describe(path)
    }

    pub fn make_dir(&self, path: &str, recreate: bool) -> VeilResult<()> {
        self.live()?.make_dir(path, recreate)
    }

    pub fn make_dirs(&self, path: &str) -> VeilResult<()> {
        self.live()?.make_dirs(path)
    }

    pub fn list_dir(&self, path: &str) -> VeilResult<Vec<String>> {
        self.live()?.list_dir(path)
    }

    pub fn remove(&self, path: &str) -> VeilResult<()> {
        self.live()?.remove(path)
    }

    pub fn remove_dir(&self, path: &str) -> VeilResult<()> {
        self.live()?.remove_dir(path)
    }

    pub fn exists(&self, path: &str) -> VeilResult<bool> {
        self.live()?.exists(path)
    }

    pub fn is_dir(&self, path: &str) -> VeilResult<bool> {
        self.live()?.is_dir(path)
    }

    pub fn is_file(&self, path: &str) -> VeilResult<bool> {
        self.live()?.is_file(path)
    }

    /// Backend metadata; `size` is the stored (ciphertext) size.
    pub fn stat(&self, path: &str) -> VeilResult<EntryInfo> {
        self.live()?.stat(path)
    }

    /// Copies ciphertext as-is; the copy decrypts under the same key.
    pub fn copy(&self, src: &str, dst: &str, overwrite: bool) -> VeilResult<()> {
        self.live()?.copy(src, dst, overwrite)
    }

    pub fn move_file(&self, src: &str, dst: &str, overwrite: bool) -> VeilResult<()> {
        self.live()?.move_file(src, dst, overwrite)
    }

    /// Recursive [`copy`](Self::copy) of a directory tree. With `create`,
    /// `dst` and its parents are made as needed.
    pub fn copy_dir(&self, src: &str, dst: &str, create: bool) -> VeilResult<()> {
        self.live()?.copy_dir(src, dst, create)
    }
}
