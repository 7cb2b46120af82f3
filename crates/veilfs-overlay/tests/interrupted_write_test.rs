//! A store that dies part way through a chunked write leaves behind a
//! prefix of whole chunks that still decrypts.

use parking_lot::Mutex;
use proptest::prelude::*;
use veilfs_core::{EntryInfo, OpenMode, VeilError, VeilResult};
use veilfs_crypto::OverlayKey;
use veilfs_overlay::EncryptingOverlay;
use veilfs_storage::{Backend, MemoryBackend, RawHandle};

/// Memory store whose `fail_on`-th append (1-based) fails.
struct FailingAppendBackend {
    inner: MemoryBackend,
    appends: Mutex<usize>,
    fail_on: usize,
}

impl FailingAppendBackend {
    fn new(fail_on: usize) -> Self {
        Self {
            inner: MemoryBackend::new(),
            appends: Mutex::new(0),
            fail_on,
        }
    }
}

impl Backend for FailingAppendBackend {
    fn write_bytes(&self, path: &str, data: &[u8]) -> VeilResult<()> {
        self.inner.write_bytes(path, data)
    }

    fn append_bytes(&self, path: &str, data: &[u8]) -> VeilResult<()> {
        let mut appends = self.appends.lock();
        *appends += 1;
        if *appends == self.fail_on {
            return Err(VeilError::Storage(format!("{path}: connection reset")));
        }
        self.inner.append_bytes(path, data)
    }

    fn read_bytes(&self, path: &str) -> VeilResult<Vec<u8>> {
        self.inner.read_bytes(path)
    }

    fn make_dir(&self, path: &str, recreate: bool) -> VeilResult<()> {
        self.inner.make_dir(path, recreate)
    }

    fn make_dirs(&self, path: &str) -> VeilResult<()> {
        self.inner.make_dirs(path)
    }

    fn list_dir(&self, path: &str) -> VeilResult<Vec<String>> {
        self.inner.list_dir(path)
    }

    fn remove(&self, path: &str) -> VeilResult<()> {
        self.inner.remove(path)
    }

    fn remove_dir(&self, path: &str) -> VeilResult<()> {
        self.inner.remove_dir(path)
    }

    fn stat(&self, path: &str) -> VeilResult<EntryInfo> {
        self.inner.stat(path)
    }

    fn open(&self, path: &str, mode: OpenMode) -> VeilResult<Box<dyn RawHandle>> {
        self.inner.open(path, mode)
    }

    fn describe(&self, path: &str) -> VeilResult<String> {
        self.inner.describe(path)
    }
}

fn overlay(fail_on: usize) -> EncryptingOverlay<FailingAppendBackend> {
    EncryptingOverlay::new(FailingAppendBackend::new(fail_on), OverlayKey::generate())
}

#[test]
fn failed_write_leaves_whole_chunk_prefix() {
    let data: Vec<u8> = (0u8..=99).collect();
    let fs = overlay(4);

    let err = fs.write_chunked("/big.bin", &data, 10).unwrap_err();
    assert!(matches!(err, VeilError::Storage(_)));
    assert_eq!(fs.read_bytes("/big.bin").unwrap(), &data[..30]);
}

#[test]
fn failure_on_first_chunk_leaves_empty_object() {
    let fs = overlay(1);
    assert!(fs.write_chunked("/f", b"abcdef", 2).is_err());
    assert!(fs.is_file("/f").unwrap());
    assert!(fs.read_bytes("/f").unwrap().is_empty());
}

#[test]
fn failed_append_keeps_earlier_content() {
    let fs = overlay(3);
    fs.write_chunked("/log", b"first", 8).unwrap();
    assert!(fs.append_chunked("/log", b"0123456789", 4).is_err());
    assert_eq!(fs.read_bytes("/log").unwrap(), b"first0123");
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn interrupted_write_prefix(
        data in proptest::collection::vec(any::<u8>(), 1..200),
        chunk in 1usize..16,
        fail_on in 1usize..8,
    ) {
        let chunks = data.len().div_ceil(chunk);
        prop_assume!(fail_on <= chunks);

        let fs = overlay(fail_on);
        prop_assert!(fs.write_chunked("/p", &data, chunk).is_err());
        let kept = (fail_on - 1) * chunk;
        prop_assert_eq!(fs.read_bytes("/p").unwrap(), data[..kept].to_vec());
    }
}
