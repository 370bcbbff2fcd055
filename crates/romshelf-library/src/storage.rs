//! Storage access used by the scanner
//!
//! The indexer never touches the filesystem directly: it lists directory
//! children and opens files through [`Storage`], so the same traversal works
//! over local paths or any other tree-shaped backend.

use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

/// Kind of a directory child
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// One child reported by [`Storage::list`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEntry {
    /// Display name; `None` when the backend cannot report one
    pub name: Option<String>,
    /// Opaque locator passed back to `open`/`list`
    pub locator: String,
    pub kind: EntryKind,
}

/// Tree-shaped storage backend
pub trait Storage {
    /// List the children of a directory, in backend order
    fn list(&self, dir: &str) -> io::Result<Vec<StorageEntry>>;

    /// Open a file for random-access reads
    fn open(&self, locator: &str) -> io::Result<Box<dyn FileHandle>>;

    /// Identity of a directory once links are resolved
    ///
    /// Two locators reaching the same directory return the same value. Backends
    /// without links can rely on the default.
    fn canonical(&self, locator: &str) -> io::Result<String> {
        Ok(locator.to_string())
    }
}

/// An open file. Dropping the handle closes it.
pub trait FileHandle {
    fn name(&self) -> &str;

    /// Total size in bytes
    fn size(&mut self) -> io::Result<u64>;

    /// Read up to `buf.len()` bytes starting at `offset`
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize>;

    /// Fill `buf` completely starting at `offset`
    fn read_exact_at(&mut self, mut offset: u64, mut buf: &mut [u8]) -> io::Result<()> {
        while !buf.is_empty() {
            match self.read_at(offset, buf) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!("{}: unexpected end of file at {:#x}", self.name(), offset),
                    ));
                }
                Ok(n) => {
                    offset += n as u64;
                    let rest = buf;
                    buf = &mut rest[n..];
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

/// Extension of a file name: the text after the last `.`
///
/// Returns `None` for an empty name, a name without a `.`, or a name ending in `.`.
pub fn extension_of(name: &str) -> Option<&str> {
    let (_, ext) = name.rsplit_once('.')?;
    if ext.is_empty() { None } else { Some(ext) }
}

/// File name without its extension
pub fn stem_of(name: &str) -> &str {
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => name,
    }
}

/// Drop entries that failed to read, so one bad entry does not lose its siblings
fn readable<T>(
    dir: &str,
    entries: impl IntoIterator<Item = io::Result<T>>,
) -> impl Iterator<Item = T> {
    entries.into_iter().filter_map(move |entry| match entry {
        Ok(entry) => Some(entry),
        Err(e) => {
            tracing::warn!("Skipping unreadable entry in {}: {}", dir, e);
            None
        }
    })
}

/// Local filesystem storage, locators are paths
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalStorage;

impl LocalStorage {
    pub fn new() -> Self {
        Self
    }
}

impl Storage for LocalStorage {
    fn list(&self, dir: &str) -> io::Result<Vec<StorageEntry>> {
        let mut children = Vec::new();

        for entry in readable(dir, fs::read_dir(dir)?) {
            let path = entry.path();

            // fs::metadata follows symlinks, so linked directories are walked too
            let kind = match fs::metadata(&path) {
                Ok(meta) if meta.is_dir() => EntryKind::Directory,
                Ok(_) => EntryKind::File,
                Err(e) => {
                    tracing::debug!("Cannot stat {}: {}", path.display(), e);
                    EntryKind::File
                }
            };

            children.push(StorageEntry {
                name: entry.file_name().to_str().map(str::to_string),
                locator: path.to_string_lossy().to_string(),
                kind,
            });
        }

        Ok(children)
    }

    fn open(&self, locator: &str) -> io::Result<Box<dyn FileHandle>> {
        let path = Path::new(locator);
        let file = File::open(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        Ok(Box::new(LocalFile { file, name }))
    }

    fn canonical(&self, locator: &str) -> io::Result<String> {
        Ok(fs::canonicalize(locator)?.to_string_lossy().to_string())
    }
}

/// Handle to a file on the local filesystem
#[derive(Debug)]
pub struct LocalFile {
    file: File,
    name: String,
}

impl FileHandle for LocalFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&mut self) -> io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("game.nro"), Some("nro"));
        assert_eq!(extension_of("Game.NRO"), Some("NRO"));
        assert_eq!(extension_of("archive.tar.nro"), Some("nro"));
        assert_eq!(extension_of(".nro"), Some("nro"));
        assert_eq!(extension_of("README"), None);
        assert_eq!(extension_of("trailing."), None);
        assert_eq!(extension_of(""), None);
    }

    #[test]
    fn test_stem_of() {
        assert_eq!(stem_of("hbmenu.nro"), "hbmenu");
        assert_eq!(stem_of("a.b.nro"), "a.b");
        assert_eq!(stem_of(".nro"), ".nro");
        assert_eq!(stem_of("plain"), "plain");
    }

    #[test]
    fn test_local_list_and_read() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("data.bin"), b"0123456789").unwrap();

        let storage = LocalStorage::new();
        let root = dir.path().to_string_lossy().to_string();
        let mut children = storage.list(&root).unwrap();
        children.sort_by(|a, b| a.name.cmp(&b.name));

        assert_eq!(children.len(), 2);
        assert_eq!(children[0].name.as_deref(), Some("data.bin"));
        assert_eq!(children[0].kind, EntryKind::File);
        assert_eq!(children[1].kind, EntryKind::Directory);
        assert_eq!(
            storage.canonical(&children[1].locator).unwrap(),
            fs::canonicalize(dir.path().join("sub"))
                .unwrap()
                .to_string_lossy()
                .to_string()
        );

        let mut handle = storage.open(&children[0].locator).unwrap();
        assert_eq!(handle.name(), "data.bin");
        assert_eq!(handle.size().unwrap(), 10);

        let mut buf = [0u8; 4];
        handle.read_exact_at(3, &mut buf).unwrap();
        assert_eq!(&buf, b"3456");

        let mut tail = [0u8; 4];
        let err = handle.read_exact_at(8, &mut tail).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_unreadable_entry_keeps_siblings() {
        let entries = vec![
            Ok("a.nro"),
            Err(io::Error::other("I/O error")),
            Ok("b.nro"),
        ];
        let kept: Vec<_> = readable("/games", entries).collect();
        assert_eq!(kept, vec!["a.nro", "b.nro"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_local_canonical_resolves_links() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("real")).unwrap();
        std::os::unix::fs::symlink(dir.path().join("real"), dir.path().join("link")).unwrap();

        let storage = LocalStorage::new();
        let real = storage
            .canonical(&dir.path().join("real").to_string_lossy())
            .unwrap();
        let link = storage
            .canonical(&dir.path().join("link").to_string_lossy())
            .unwrap();
        assert_eq!(real, link);
    }

    #[test]
    fn test_local_list_missing_dir() {
        let storage = LocalStorage::new();
        let err = storage.list("/nonexistent/romshelf/dir").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
