//! Test doubles: in-memory storage and synthetic ROM images
//!
//! Besides serving files, [`MemoryStorage`] counts directory listings and open
//! handles so tests can observe whether a scan ran and whether every opened
//! file was released.
//!
//! # Usage
//!
//! ```
//! use romshelf_library::mock::MemoryStorage;
//! use romshelf_library::Storage;
//!
//! let mut storage = MemoryStorage::new("/games");
//! let homebrew = storage.add_dir("/games", "homebrew");
//! storage.add_file(&homebrew, "hbmenu.nro", vec![0u8; 16]);
//!
//! assert_eq!(storage.list("/games").unwrap().len(), 1);
//! ```
//!
//! [`NroImage`] builds NRO files with a chosen title, publisher, version and icon.

use crate::loader::nro::{
    ASSET_HEADER_LEN, ASSET_MAGIC, NACP_ENTRY_LEN, NACP_LEN, NACP_NAME_LEN, NACP_PUBLISHER_LEN,
    NACP_VERSION_LEN, NACP_VERSION_OFFSET, NRO_HEADER_LEN, NRO_MAGIC, NRO_MAGIC_OFFSET,
    NRO_SIZE_OFFSET,
};
use crate::storage::{EntryKind, FileHandle, Storage, StorageEntry};
use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Tree of directories and byte buffers keyed by `/`-joined locators
#[derive(Debug, Default)]
pub struct MemoryStorage {
    dirs: HashMap<String, Vec<StorageEntry>>,
    files: HashMap<String, Arc<Vec<u8>>>,
    links: HashMap<String, String>,
    denied: HashSet<String>,
    unnamed: usize,
    open_handles: Arc<AtomicUsize>,
    opens: AtomicUsize,
    listings: AtomicUsize,
}

impl MemoryStorage {
    /// Create storage with a single empty root directory
    pub fn new(root: &str) -> Self {
        let mut storage = Self::default();
        storage.dirs.insert(root.to_string(), Vec::new());
        storage
    }

    /// Add a sub-directory, returning its locator
    pub fn add_dir(&mut self, parent: &str, name: &str) -> String {
        let locator = join(parent, name);
        self.push_child(parent, Some(name), &locator, EntryKind::Directory);
        self.dirs.entry(locator.clone()).or_default();
        locator
    }

    /// Add a file, returning its locator
    pub fn add_file(&mut self, parent: &str, name: &str, data: Vec<u8>) -> String {
        let locator = join(parent, name);
        self.push_child(parent, Some(name), &locator, EntryKind::File);
        self.files.insert(locator.clone(), Arc::new(data));
        locator
    }

    /// Add a directory link to `target`, returning the link's locator
    ///
    /// Listing the link lists the target, so links can form cycles.
    pub fn add_link(&mut self, parent: &str, name: &str, target: &str) -> String {
        let locator = join(parent, name);
        self.push_child(parent, Some(name), &locator, EntryKind::Directory);
        self.links.insert(locator.clone(), target.to_string());
        locator
    }

    /// Add a file whose name the backend cannot report
    pub fn add_unnamed_file(&mut self, parent: &str, data: Vec<u8>) -> String {
        self.unnamed += 1;
        let locator = format!("{}/#unnamed-{}", parent, self.unnamed);
        self.push_child(parent, None, &locator, EntryKind::File);
        self.files.insert(locator.clone(), Arc::new(data));
        locator
    }

    /// Make `open`/`list` on a locator fail with `PermissionDenied`
    pub fn deny(&mut self, locator: &str) {
        self.denied.insert(locator.to_string());
    }

    /// Handles currently open
    pub fn open_handles(&self) -> usize {
        self.open_handles.load(Ordering::SeqCst)
    }

    /// Successful `open` calls so far
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Successful `list` calls so far
    pub fn listings(&self) -> usize {
        self.listings.load(Ordering::SeqCst)
    }

    fn push_child(&mut self, parent: &str, name: Option<&str>, locator: &str, kind: EntryKind) {
        self.dirs
            .entry(parent.to_string())
            .or_default()
            .push(StorageEntry {
                name: name.map(str::to_string),
                locator: locator.to_string(),
                kind,
            });
    }

    fn check_access(&self, locator: &str) -> io::Result<()> {
        if self.denied.contains(locator) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("access denied: {}", locator),
            ));
        }
        Ok(())
    }
}

fn join(parent: &str, name: &str) -> String {
    format!("{}/{}", parent.trim_end_matches('/'), name)
}

impl Storage for MemoryStorage {
    fn list(&self, dir: &str) -> io::Result<Vec<StorageEntry>> {
        self.check_access(dir)?;
        let target = self.links.get(dir).map_or(dir, String::as_str);
        let children = self.dirs.get(target).cloned().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no such directory: {}", dir))
        })?;
        self.listings.fetch_add(1, Ordering::SeqCst);
        Ok(children)
    }

    fn open(&self, locator: &str) -> io::Result<Box<dyn FileHandle>> {
        self.check_access(locator)?;
        let data = self.files.get(locator).cloned().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no such file: {}", locator))
        })?;

        self.opens.fetch_add(1, Ordering::SeqCst);
        self.open_handles.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(MemoryFile {
            name: locator.rsplit('/').next().unwrap_or_default().to_string(),
            data,
            open_handles: Arc::clone(&self.open_handles),
        }))
    }

    fn canonical(&self, locator: &str) -> io::Result<String> {
        Ok(self.links.get(locator).map_or(locator, String::as_str).to_string())
    }
}

/// Handle into a [`MemoryStorage`] file
#[derive(Debug)]
pub struct MemoryFile {
    name: String,
    data: Arc<Vec<u8>>,
    open_handles: Arc<AtomicUsize>,
}

impl FileHandle for MemoryFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&mut self) -> io::Result<u64> {
        Ok(self.data.len() as u64)
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        let len = self.data.len() as u64;
        if offset >= len {
            return Ok(0);
        }
        let start = offset as usize;
        let n = buf.len().min(self.data.len() - start);
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        Ok(n)
    }
}

impl Drop for MemoryFile {
    fn drop(&mut self) {
        self.open_handles.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Builder for synthetic NRO files
#[derive(Debug, Clone)]
pub struct NroImage {
    name: String,
    author: Option<String>,
    version: Option<String>,
    icon: Vec<u8>,
    language: usize,
    assets: bool,
    image_size: usize,
}

impl NroImage {
    /// Size of the fake executable image preceding the assets
    pub const DEFAULT_IMAGE_SIZE: usize = 0x100;

    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            author: None,
            version: None,
            icon: Vec::new(),
            language: 0,
            assets: true,
            image_size: Self::DEFAULT_IMAGE_SIZE,
        }
    }

    pub fn with_author(mut self, author: &str) -> Self {
        self.author = Some(author.to_string());
        self
    }

    pub fn with_version(mut self, version: &str) -> Self {
        self.version = Some(version.to_string());
        self
    }

    pub fn with_icon(mut self, icon: Vec<u8>) -> Self {
        self.icon = icon;
        self
    }

    /// Store the title in another NACP language slot
    pub fn in_language(mut self, language: usize) -> Self {
        self.language = language;
        self
    }

    /// Plain executable with no asset section
    pub fn without_assets(mut self) -> Self {
        self.assets = false;
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let image_size = self.image_size.max(NRO_HEADER_LEN);
        let mut data = vec![0u8; image_size];
        data[NRO_MAGIC_OFFSET..NRO_MAGIC_OFFSET + 4].copy_from_slice(NRO_MAGIC);
        data[NRO_SIZE_OFFSET..NRO_SIZE_OFFSET + 4]
            .copy_from_slice(&(image_size as u32).to_le_bytes());

        if !self.assets {
            return data;
        }

        let icon_offset = ASSET_HEADER_LEN as u64;
        let nacp_offset = icon_offset + self.icon.len() as u64;
        let romfs_offset = nacp_offset + NACP_LEN as u64;

        let mut header = vec![0u8; ASSET_HEADER_LEN];
        header[..4].copy_from_slice(ASSET_MAGIC);
        let sections = [
            (icon_offset, self.icon.len() as u64),
            (nacp_offset, NACP_LEN as u64),
            (romfs_offset, 0),
        ];
        for (i, (offset, size)) in sections.iter().enumerate() {
            let at = 0x08 + i * 0x10;
            header[at..at + 8].copy_from_slice(&offset.to_le_bytes());
            header[at + 8..at + 16].copy_from_slice(&size.to_le_bytes());
        }

        let mut nacp = vec![0u8; NACP_LEN];
        let entry = self.language * NACP_ENTRY_LEN;
        write_c_string(&mut nacp[entry..entry + NACP_NAME_LEN], &self.name);
        if let Some(author) = &self.author {
            let at = entry + NACP_NAME_LEN;
            write_c_string(&mut nacp[at..at + NACP_PUBLISHER_LEN], author);
        }
        if let Some(version) = &self.version {
            write_c_string(
                &mut nacp[NACP_VERSION_OFFSET..NACP_VERSION_OFFSET + NACP_VERSION_LEN],
                version,
            );
        }

        data.extend_from_slice(&header);
        data.extend_from_slice(&self.icon);
        data.extend_from_slice(&nacp);
        data
    }
}

fn write_c_string(field: &mut [u8], value: &str) {
    let len = value.len().min(field.len() - 1);
    field[..len].copy_from_slice(&value.as_bytes()[..len]);
}
