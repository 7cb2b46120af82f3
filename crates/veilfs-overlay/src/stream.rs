//! Plaintext streams over raw backend handles.
//!
//! Reads decrypt the whole object: tokens have no random access, so there
//! is no partial decrypt. Writes seal each buffer into tokens and always
//! land after the existing tokens, whatever the handle's cursor says.

use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};

use veilfs_core::{OpenMode, TextEncoding, VeilResult};
use veilfs_crypto::{decrypt_stream, ChunkedWriter, TokenCodec};
use veilfs_storage::RawHandle;

pub struct EncryptedStream {
    handle: Box<dyn RawHandle>,
    mode: OpenMode,
    codec: TokenCodec,
    chunk_size: usize,
    /// Decrypted object backing `io::Read`; dropped on every write.
    plaintext: Option<Cursor<Vec<u8>>>,
    closed: bool,
}

impl std::fmt::Debug for EncryptedStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedStream")
            .field("mode", &self.mode)
            .field("chunk_size", &self.chunk_size)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

fn not_permitted(what: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::PermissionDenied,
        format!("stream not opened for {what}"),
    )
}

impl EncryptedStream {
    /// Wrap `handle`, which must have been opened with `mode`.
    pub fn new(
        handle: Box<dyn RawHandle>,
        mode: OpenMode,
        codec: TokenCodec,
        chunk_size: usize,
    ) -> VeilResult<Self> {
        // Validate the chunk size up front rather than on first write.
        ChunkedWriter::new(&codec, chunk_size)?;
        Ok(Self {
            handle,
            mode,
            codec,
            chunk_size,
            plaintext: None,
            closed: false,
        })
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    /// Re-read and decrypt the entire object. Holds no state between calls.
    pub fn read_all(&mut self) -> VeilResult<Vec<u8>> {
        if !self.mode.read {
            return Err(not_permitted("reading").into());
        }
        self.handle.seek(SeekFrom::Start(0))?;
        let mut raw = Vec::new();
        self.handle.read_to_end(&mut raw)?;
        decrypt_stream(&self.codec, &raw)
    }

    /// Seal `data` and append its tokens. Returns the plaintext length.
    pub fn write_plain(&mut self, data: &[u8]) -> VeilResult<usize> {
        if !self.mode.is_writing() {
            return Err(not_permitted("writing").into());
        }
        if data.is_empty() {
            return Ok(0);
        }
        self.plaintext = None;
        self.handle.seek(SeekFrom::End(0))?;
        let writer = ChunkedWriter::new(&self.codec, self.chunk_size)?;
        let handle = &mut self.handle;
        writer.write(data, |token| {
            handle.write_all(token.as_bytes())?;
            Ok(())
        })
    }

    /// Flush and close the underlying handle.
    pub fn close(mut self) -> VeilResult<()> {
        self.closed = true;
        self.handle.close()
    }
}

impl Read for EncryptedStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.plaintext.is_none() {
            let plain = self.read_all()?;
            self.plaintext = Some(Cursor::new(plain));
        }
        match self.plaintext.as_mut() {
            Some(cursor) => cursor.read(buf),
            None => Ok(0),
        }
    }
}

impl Write for EncryptedStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(self.write_plain(buf)?)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.handle.flush()
    }
}

impl Drop for EncryptedStream {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.handle.close() {
            tracing::warn!(error = %e, "closing encrypted stream on drop failed");
        }
    }
}

/// [`EncryptedStream`] that encodes and decodes text around the same
/// byte path.
#[derive(Debug)]
pub struct EncryptedTextStream {
    inner: EncryptedStream,
    encoding: TextEncoding,
}

impl EncryptedTextStream {
    pub fn new(inner: EncryptedStream, encoding: TextEncoding) -> Self {
        Self { inner, encoding }
    }

    pub fn encoding(&self) -> TextEncoding {
        self.encoding
    }

    /// Whole decrypted object as text.
    pub fn read_text(&mut self) -> VeilResult<String> {
        let bytes = self.inner.read_all()?;
        self.encoding.decode(bytes)
    }

    /// Encode and append `text`. Returns the number of characters written.
    pub fn write_text(&mut self, text: &str) -> VeilResult<usize> {
        let bytes = self.encoding.encode(text)?;
        self.inner.write_plain(&bytes)?;
        Ok(text.chars().count())
    }

    pub fn into_inner(self) -> EncryptedStream {
        self.inner
    }

    pub fn close(self) -> VeilResult<()> {
        self.inner.close()
    }
}
