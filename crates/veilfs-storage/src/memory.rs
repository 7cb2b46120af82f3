//! In-memory backend for tests and ephemeral overlays.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use veilfs_core::{EntryInfo, OpenMode, VeilError, VeilResult};

use crate::backend::{Backend, BufferedHandle, Publish, RawHandle};
use crate::paths::{basename, normalize, parent};

#[derive(Debug, Clone)]
enum Node {
    File(Vec<u8>),
    Dir,
}

type Tree = BTreeMap<String, Node>;

/// The root is implicit and always a directory
static ROOT: Node = Node::Dir;

/// A directory tree held in process memory. Cloning shares the tree.
///
/// Directories are explicit: writing a file requires its parent directory
/// to exist, as on a real filesystem.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    tree: Arc<RwLock<Tree>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

fn lookup<'t>(tree: &'t Tree, key: &str) -> Option<&'t Node> {
    if key.is_empty() {
        return Some(&ROOT);
    }
    tree.get(key)
}

/// Check that `key`'s parent is an existing directory.
fn require_parent(tree: &Tree, key: &str, path: &str) -> VeilResult<()> {
    match lookup(tree, parent(key)) {
        Some(Node::Dir) => Ok(()),
        Some(Node::File(_)) => Err(VeilError::NotADirectory(path.to_string())),
        None => Err(VeilError::NotFound(path.to_string())),
    }
}

fn children<'t>(tree: &'t Tree, key: &'t str) -> impl Iterator<Item = &'t str> + 't {
    let prefix = if key.is_empty() {
        String::new()
    } else {
        format!("{key}/")
    };
    tree.keys()
        .filter_map(move |k| k.strip_prefix(prefix.as_str()).map(|rest| (k, rest)))
        .filter(|(_, rest)| !rest.is_empty() && !rest.contains('/'))
        .map(|(k, _)| basename(k))
}

impl Backend for MemoryBackend {
    fn write_bytes(&self, path: &str, data: &[u8]) -> VeilResult<()> {
        let key = normalize(path)?;
        let mut tree = self.tree.write();
        if matches!(lookup(&tree, &key), Some(Node::Dir)) {
            return Err(VeilError::IsADirectory(path.to_string()));
        }
        require_parent(&tree, &key, path)?;
        tree.insert(key, Node::File(data.to_vec()));
        Ok(())
    }

    fn append_bytes(&self, path: &str, data: &[u8]) -> VeilResult<()> {
        let key = normalize(path)?;
        let mut tree = self.tree.write();
        match tree.get_mut(&key) {
            Some(Node::File(existing)) => {
                existing.extend_from_slice(data);
                Ok(())
            }
            Some(Node::Dir) => Err(VeilError::IsADirectory(path.to_string())),
            None if key.is_empty() => Err(VeilError::IsADirectory(path.to_string())),
            None => {
                require_parent(&tree, &key, path)?;
                tree.insert(key, Node::File(data.to_vec()));
                Ok(())
            }
        }
    }

    fn read_bytes(&self, path: &str) -> VeilResult<Vec<u8>> {
        let key = normalize(path)?;
        let tree = self.tree.read();
        match lookup(&tree, &key) {
            Some(Node::File(data)) => Ok(data.clone()),
            Some(Node::Dir) => Err(VeilError::IsADirectory(path.to_string())),
            None => Err(VeilError::NotFound(path.to_string())),
        }
    }

    fn make_dir(&self, path: &str, recreate: bool) -> VeilResult<()> {
        let key = normalize(path)?;
        let mut tree = self.tree.write();
        match lookup(&tree, &key) {
            Some(Node::Dir) if recreate => return Ok(()),
            Some(_) => return Err(VeilError::AlreadyExists(path.to_string())),
            None => {}
        }
        require_parent(&tree, &key, path)?;
        tree.insert(key, Node::Dir);
        Ok(())
    }

    fn make_dirs(&self, path: &str) -> VeilResult<()> {
        let key = normalize(path)?;
        let mut tree = self.tree.write();
        let mut current = String::new();
        for component in key.split('/').filter(|c| !c.is_empty()) {
            if !current.is_empty() {
                current.push('/');
            }
            current.push_str(component);
            match tree.get(&current) {
                Some(Node::Dir) => {}
                Some(Node::File(_)) => return Err(VeilError::AlreadyExists(current)),
                None => {
                    tree.insert(current.clone(), Node::Dir);
                }
            }
        }
        Ok(())
    }

    fn list_dir(&self, path: &str) -> VeilResult<Vec<String>> {
        let key = normalize(path)?;
        let tree = self.tree.read();
        match lookup(&tree, &key) {
            Some(Node::Dir) => Ok(children(&tree, &key).map(str::to_string).collect()),
            Some(Node::File(_)) => Err(VeilError::NotADirectory(path.to_string())),
            None => Err(VeilError::NotFound(path.to_string())),
        }
    }

    fn remove(&self, path: &str) -> VeilResult<()> {
        let key = normalize(path)?;
        let mut tree = self.tree.write();
        match lookup(&tree, &key) {
            Some(Node::File(_)) => {
                tree.remove(&key);
                Ok(())
            }
            Some(Node::Dir) => Err(VeilError::IsADirectory(path.to_string())),
            None => Err(VeilError::NotFound(path.to_string())),
        }
    }

    fn remove_dir(&self, path: &str) -> VeilResult<()> {
        let key = normalize(path)?;
        if key.is_empty() {
            return Err(VeilError::InvalidPath("cannot remove the root directory".into()));
        }
        let mut tree = self.tree.write();
        match lookup(&tree, &key) {
            Some(Node::Dir) => {
                if children(&tree, &key).next().is_some() {
                    return Err(VeilError::DirectoryNotEmpty(path.to_string()));
                }
                tree.remove(&key);
                Ok(())
            }
            Some(Node::File(_)) => Err(VeilError::NotADirectory(path.to_string())),
            None => Err(VeilError::NotFound(path.to_string())),
        }
    }

    fn stat(&self, path: &str) -> VeilResult<EntryInfo> {
        let key = normalize(path)?;
        let tree = self.tree.read();
        let node = lookup(&tree, &key).ok_or_else(|| VeilError::NotFound(path.to_string()))?;
        Ok(EntryInfo {
            name: basename(&key).to_string(),
            is_dir: matches!(node, Node::Dir),
            size: match node {
                Node::File(data) => data.len() as u64,
                Node::Dir => 0,
            },
        })
    }

    fn open(&self, path: &str, mode: OpenMode) -> VeilResult<Box<dyn RawHandle>> {
        let key = normalize(path)?;
        let initial = {
            let mut tree = self.tree.write();
            match lookup(&tree, &key).cloned() {
                Some(Node::Dir) => return Err(VeilError::IsADirectory(path.to_string())),
                Some(Node::File(_)) if mode.exclusive => {
                    return Err(VeilError::AlreadyExists(path.to_string()))
                }
                Some(Node::File(_)) if mode.truncate => {
                    tree.insert(key.clone(), Node::File(Vec::new()));
                    Vec::new()
                }
                Some(Node::File(data)) => data,
                None if mode.create => {
                    require_parent(&tree, &key, path)?;
                    tree.insert(key.clone(), Node::File(Vec::new()));
                    Vec::new()
                }
                None => return Err(VeilError::NotFound(path.to_string())),
            }
        };

        let tree = Arc::clone(&self.tree);
        let publish: Publish = Box::new(move |data: &[u8]| {
            tree.write().insert(key.clone(), Node::File(data.to_vec()));
            Ok(())
        });
        Ok(Box::new(BufferedHandle::new(initial, mode, publish)))
    }

    fn describe(&self, path: &str) -> VeilResult<String> {
        Ok(format!("memory://{}", normalize(path)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};

    #[test]
    fn test_write_read_roundtrip() {
        let backend = MemoryBackend::new();
        backend.write_bytes("/a.txt", b"hello").unwrap();
        assert_eq!(backend.read_bytes("a.txt").unwrap(), b"hello");
        assert_eq!(backend.stat("/a.txt").unwrap().size, 5);
    }

    #[test]
    fn test_append_creates_and_extends() {
        let backend = MemoryBackend::new();
        backend.append_bytes("/log", b"one").unwrap();
        backend.append_bytes("/log", b"two").unwrap();
        assert_eq!(backend.read_bytes("/log").unwrap(), b"onetwo");
    }

    #[test]
    fn test_write_requires_parent() {
        let backend = MemoryBackend::new();
        let err = backend.write_bytes("/missing/a.txt", b"x").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_directories() {
        let backend = MemoryBackend::new();
        backend.make_dir("/test_dir", false).unwrap();
        assert!(matches!(
            backend.make_dir("/test_dir", false),
            Err(VeilError::AlreadyExists(_))
        ));
        backend.make_dir("/test_dir", true).unwrap();
        backend.write_bytes("/test_dir/f.txt", b"x").unwrap();
        backend.write_bytes("/top.txt", b"y").unwrap();

        assert_eq!(backend.list_dir("/").unwrap(), vec!["test_dir", "top.txt"]);
        assert_eq!(backend.list_dir("/test_dir").unwrap(), vec!["f.txt"]);
        assert!(backend.is_dir("/test_dir").unwrap());
        assert!(backend.is_file("/top.txt").unwrap());
        assert!(!backend.exists("/nope").unwrap());

        assert!(matches!(
            backend.remove_dir("/test_dir"),
            Err(VeilError::DirectoryNotEmpty(_))
        ));
        backend.remove("/test_dir/f.txt").unwrap();
        backend.remove_dir("/test_dir").unwrap();
        assert!(!backend.exists("/test_dir").unwrap());
    }

    #[test]
    fn test_make_dirs_creates_parents() {
        let backend = MemoryBackend::new();
        backend.make_dirs("/a/b/c").unwrap();
        assert!(backend.is_dir("/a/b").unwrap());
        backend.make_dirs("/a/b/c").unwrap();
    }

    #[test]
    fn test_remove_errors() {
        let backend = MemoryBackend::new();
        backend.make_dir("/d", false).unwrap();
        assert!(matches!(backend.remove("/d"), Err(VeilError::IsADirectory(_))));
        assert!(backend.remove("/none").unwrap_err().is_not_found());
        assert!(matches!(backend.remove_dir("/"), Err(VeilError::InvalidPath(_))));
    }

    #[test]
    fn test_handle_publishes_on_close() {
        let backend = MemoryBackend::new();
        {
            let mut handle = backend.open("/h.bin", OpenMode::WRITE).unwrap();
            handle.write_all(b"streamed").unwrap();
            handle.close().unwrap();
        }
        let mut handle = backend.open("/h.bin", OpenMode::READ).unwrap();
        let mut out = Vec::new();
        handle.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"streamed");
    }

    #[test]
    fn test_open_modes() {
        let backend = MemoryBackend::new();
        assert!(matches!(
            backend.open("/x", OpenMode::READ),
            Err(VeilError::NotFound(_))
        ));

        backend.write_bytes("/x", b"old").unwrap();
        let exclusive: OpenMode = "x".parse().unwrap();
        assert!(matches!(
            backend.open("/x", exclusive),
            Err(VeilError::AlreadyExists(_))
        ));

        drop(backend.open("/x", OpenMode::WRITE).unwrap());
        assert_eq!(backend.read_bytes("/x").unwrap(), b"", "w truncates on open");
    }

    #[test]
    fn test_copy_and_move() {
        let backend = MemoryBackend::new();
        backend.write_bytes("/src", b"data").unwrap();
        backend.copy("/src", "/dst", false).unwrap();
        assert!(matches!(
            backend.copy("/src", "/dst", false),
            Err(VeilError::AlreadyExists(_))
        ));
        backend.move_file("/src", "/moved", false).unwrap();
        assert!(!backend.exists("/src").unwrap());
        assert_eq!(backend.read_bytes("/moved").unwrap(), b"data");
    }

    #[test]
    fn test_copy_dir_recursive() {
        let backend = MemoryBackend::new();
        backend.make_dirs("/test_dir/nested").unwrap();
        backend.write_bytes("/test_dir/a.txt", b"a").unwrap();
        backend.write_bytes("/test_dir/nested/b.txt", b"b").unwrap();

        assert!(matches!(
            backend.copy_dir("/test_dir", "/new_dir", false),
            Err(VeilError::NotFound(_))
        ));
        backend.copy_dir("/test_dir", "/new_dir", true).unwrap();
        assert!(backend.is_dir("/new_dir").unwrap());
        assert_eq!(backend.list_dir("/new_dir").unwrap(), vec!["a.txt", "nested"]);
        assert_eq!(backend.read_bytes("/new_dir/nested/b.txt").unwrap(), b"b");

        assert!(backend.exists("/test_dir/nested/b.txt").unwrap());
    }

    #[test]
    fn test_copy_dir_rejects_bad_targets() {
        let backend = MemoryBackend::new();
        backend.make_dir("/d", false).unwrap();
        backend.write_bytes("/f", b"x").unwrap();
        assert!(matches!(
            backend.copy_dir("/f", "/g", true),
            Err(VeilError::NotADirectory(_))
        ));
        assert!(matches!(
            backend.copy_dir("/d", "/d/inner", true),
            Err(VeilError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_clones_share_tree() {
        let a = MemoryBackend::new();
        let b = a.clone();
        a.write_bytes("/shared", b"1").unwrap();
        assert!(b.exists("/shared").unwrap());
    }
}
