//! Directory and metadata operations behave the same whether or not
//! payloads are encrypted.

use veilfs_core::VeilError;
use veilfs_crypto::OverlayKey;
use veilfs_overlay::EncryptingOverlay;
use veilfs_storage::{Backend, LocalBackend, MemoryBackend};

fn exercise<B: Backend>(fs: &EncryptingOverlay<B>) {
    fs.make_dir("/docs", false).unwrap();
    fs.write_bytes("/docs/f.txt", b"Hello, World!").unwrap();

    assert_eq!(fs.list_dir("/docs").unwrap(), vec!["f.txt"]);
    assert!(fs.exists("/docs/f.txt").unwrap());
    assert!(fs.is_file("/docs/f.txt").unwrap());
    assert!(fs.is_dir("/docs").unwrap());
    assert!(!fs.exists("/docs/other.txt").unwrap());

    let info = fs.stat("/docs/f.txt").unwrap();
    assert_eq!(info.name, "f.txt");
    assert_eq!(info.size, fs.backend().stat("/docs/f.txt").unwrap().size);

    assert!(matches!(
        fs.make_dir("/docs", false),
        Err(VeilError::AlreadyExists(_))
    ));
    assert!(matches!(
        fs.read_bytes("/docs"),
        Err(VeilError::IsADirectory(_))
    ));
    assert!(matches!(
        fs.remove_dir("/docs"),
        Err(VeilError::DirectoryNotEmpty(_))
    ));

    fs.remove("/docs/f.txt").unwrap();
    assert!(!fs.exists("/docs/f.txt").unwrap());
    fs.remove_dir("/docs").unwrap();
    assert!(fs.list_dir("/").unwrap().is_empty());
}

#[test]
fn memory_backend_structure_passes_through() {
    exercise(&EncryptingOverlay::new(MemoryBackend::new(), OverlayKey::generate()));
}

#[test]
fn local_backend_structure_passes_through() {
    let dir = tempfile::TempDir::new().unwrap();
    let backend = LocalBackend::new(dir.path(), false).unwrap();
    exercise(&EncryptingOverlay::new(backend, OverlayKey::generate()));
}

#[test]
fn listing_shows_name_of_encrypted_file() {
    let dir = tempfile::TempDir::new().unwrap();
    let backend = LocalBackend::new(dir.path(), false).unwrap();
    let fs = EncryptingOverlay::new(backend, OverlayKey::generate());
    fs.write_bytes("/f.txt", b"Hello, World!").unwrap();

    assert_eq!(fs.list_dir("/").unwrap(), vec!["f.txt"]);
    let on_disk = std::fs::read(dir.path().join("f.txt")).unwrap();
    assert_ne!(on_disk, b"Hello, World!");
}

#[test]
fn describe_passes_through() {
    let fs = EncryptingOverlay::new(MemoryBackend::new(), OverlayKey::generate());
    assert_eq!(
        fs.describe("/a/b.txt").unwrap(),
        fs.backend().describe("/a/b.txt").unwrap()
    );
}

#[test]
fn open_url_round_trip() {
    use secrecy::ExposeSecret;

    let dir = tempfile::TempDir::new().unwrap();
    let root = dir.path().join("vault");
    let key = OverlayKey::generate();
    let url = format!(
        "enc://{}?key={}&chunk_size=8",
        root.display(),
        key.to_encoded().expose_secret()
    );

    let fs = veilfs_overlay::open_url(&url).unwrap();
    assert_eq!(fs.chunk_size(), 8);
    fs.write_bytes("/notes.txt", b"opened from a url").unwrap();

    let again = EncryptingOverlay::new(LocalBackend::new(&root, false).unwrap(), key);
    assert_eq!(again.read_bytes("/notes.txt").unwrap(), b"opened from a url");
}
