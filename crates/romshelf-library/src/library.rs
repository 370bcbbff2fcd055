//! Cache-or-rescan orchestration
//!
//! [`Library`] decides whether the persisted snapshot can be trusted. With the
//! refresh flag clear it serves the cache; otherwise, or when the cache is
//! missing or unreadable, it walks the search root once per registered loader,
//! persists the new snapshot and clears the flag.

use crate::LibraryError;
use crate::cache::{CacheError, LibraryCache};
use crate::entry::TitleFormat;
use crate::index::LibraryIndex;
use crate::loader::LoaderRegistry;
use crate::scanner::{DirectoryScanner, ScanResult};
use crate::storage::Storage;
use romshelf_config::{Preferences, REFRESH_REQUIRED_KEY, SEARCH_LOCATION_KEY};
use tracing::{info, warn};

/// Where the index came from, or what the library is doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexState {
    Uninitialized,
    /// Snapshot loaded from the cache
    CacheHit,
    /// Refresh flag set, or no usable cache
    CacheMissOrStale,
    Rescanning,
    Ready,
}

/// The title library exposed to clients
pub struct Library<S: Storage, P: Preferences> {
    storage: S,
    preferences: P,
    registry: LoaderRegistry,
    cache: LibraryCache,
    scanner: DirectoryScanner,
    state: IndexState,
    /// How the current index was produced
    source: IndexState,
    index: LibraryIndex,
    last_scan: Vec<(TitleFormat, ScanResult)>,
}

impl<S: Storage, P: Preferences> Library<S, P> {
    pub fn new(
        storage: S,
        preferences: P,
        registry: LoaderRegistry,
        cache: LibraryCache,
        scanner: DirectoryScanner,
    ) -> Self {
        Self {
            storage,
            preferences,
            registry,
            cache,
            scanner,
            state: IndexState::Uninitialized,
            source: IndexState::Uninitialized,
            index: LibraryIndex::new(),
            last_scan: Vec::new(),
        }
    }

    /// Titles, from memory, the cache, or a fresh scan as needed
    pub fn get_entries(&mut self) -> Result<&LibraryIndex, LibraryError> {
        let root = self.search_root()?;

        if !self.refresh_required() {
            if self.state == IndexState::Ready {
                return Ok(&self.index);
            }

            match self.cache.load() {
                Ok(index) => {
                    info!(
                        "Loaded {} titles from {}",
                        index.len(),
                        self.cache.path().display()
                    );
                    self.state = IndexState::CacheHit;
                    self.source = IndexState::CacheHit;
                    self.index = index;
                    self.state = IndexState::Ready;
                    return Ok(&self.index);
                }
                Err(CacheError::NotFound(path)) => {
                    info!("No library cache at {}, rescanning", path.display());
                }
                Err(e) => {
                    warn!("Ran into error while loading library cache: {}", e);
                }
            }
        } else {
            info!("Refresh required, ignoring library cache");
        }

        self.state = IndexState::CacheMissOrStale;
        self.rescan(&root)
    }

    /// Rescan regardless of the cache and the refresh flag
    pub fn force_refresh(&mut self) -> Result<&LibraryIndex, LibraryError> {
        let root = self.search_root()?;
        self.state = IndexState::CacheMissOrStale;
        self.rescan(&root)
    }

    /// Point the library at a new tree; the next `get_entries` rescans
    pub fn set_search_root(&mut self, locator: &str) -> Result<(), LibraryError> {
        self.preferences.set_string(SEARCH_LOCATION_KEY, locator)?;
        self.invalidate()
    }

    /// Raise the refresh flag
    pub fn invalidate(&mut self) -> Result<(), LibraryError> {
        self.preferences.set_bool(REFRESH_REQUIRED_KEY, true)?;
        Ok(())
    }

    /// Delete the persisted snapshot and drop the in-memory index
    pub fn clear_cache(&mut self) -> Result<(), LibraryError> {
        self.cache.clear()?;
        self.index.clear();
        self.state = IndexState::Uninitialized;
        self.source = IndexState::Uninitialized;
        Ok(())
    }

    pub fn search_root(&self) -> Result<String, LibraryError> {
        self.preferences
            .get_string(SEARCH_LOCATION_KEY)
            .filter(|root| !root.is_empty())
            .ok_or(LibraryError::NotConfigured)
    }

    pub fn refresh_required(&self) -> bool {
        self.preferences.get_bool(REFRESH_REQUIRED_KEY, false)
    }

    pub fn state(&self) -> IndexState {
        self.state
    }

    /// `CacheHit` or `Rescanning` for a ready index, `Uninitialized` otherwise
    pub fn source(&self) -> IndexState {
        self.source
    }

    pub fn index(&self) -> &LibraryIndex {
        &self.index
    }

    /// Per-format scan results of the last rescan; their entries live in the index
    pub fn last_scan(&self) -> &[(TitleFormat, ScanResult)] {
        &self.last_scan
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn preferences(&self) -> &P {
        &self.preferences
    }

    pub fn cache(&self) -> &LibraryCache {
        &self.cache
    }

    fn rescan(&mut self, root: &str) -> Result<&LibraryIndex, LibraryError> {
        self.state = IndexState::Rescanning;
        self.index.clear();
        self.last_scan.clear();

        let mut index = LibraryIndex::new();
        let mut results = Vec::with_capacity(self.registry.len());

        for (extension, loader) in self.registry.iter() {
            let mut result = match self.scanner.scan(&self.storage, root, extension, loader) {
                Ok(result) => result,
                Err(e) => {
                    self.state = IndexState::Uninitialized;
                    self.source = IndexState::Uninitialized;
                    return Err(e);
                }
            };
            index.extend_group(loader.format(), std::mem::take(&mut result.entries));
            results.push((loader.format(), result));
        }

        self.index = index;
        self.last_scan = results;

        if let Err(e) = self.cache.save(&self.index) {
            warn!("Ran into error while saving library cache: {}", e);
        }

        if let Err(e) = self.preferences.set_bool(REFRESH_REQUIRED_KEY, false) {
            warn!("Could not clear the refresh flag: {}", e);
        }

        if self.index.is_empty() {
            info!("No titles found under {}", root);
        } else {
            info!("Indexed {} titles under {}", self.index.len(), root);
        }

        self.source = IndexState::Rescanning;
        self.state = IndexState::Ready;
        Ok(&self.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MemoryStorage, NroImage};
    use romshelf_config::MemoryPreferences;
    use tempfile::TempDir;

    struct Fixture {
        #[allow(dead_code)]
        temp_dir: TempDir,
        library: Library<MemoryStorage, MemoryPreferences>,
    }

    fn fixture(storage: MemoryStorage, root: Option<&str>) -> Fixture {
        let temp_dir = TempDir::new().unwrap();
        let mut preferences = MemoryPreferences::new();
        if let Some(root) = root {
            preferences.set_string(SEARCH_LOCATION_KEY, root).unwrap();
        }
        let library = Library::new(
            storage,
            preferences,
            LoaderRegistry::with_defaults(),
            LibraryCache::new(temp_dir.path().join("roms.bin")),
            DirectoryScanner::new(),
        );
        Fixture { temp_dir, library }
    }

    fn games() -> MemoryStorage {
        let mut storage = MemoryStorage::new("/games");
        storage.add_file("/games", "a.nro", NroImage::new("Alpha").build());
        storage.add_file("/games", "b.nro", vec![0u8; 0x40]);
        storage.add_file("/games", "readme.txt", b"read me".to_vec());
        storage
    }

    #[test]
    fn test_not_configured() {
        let mut fx = fixture(games(), None);
        let err = fx.library.get_entries().unwrap_err();
        assert!(matches!(err, LibraryError::NotConfigured));
        assert_eq!(fx.library.state(), IndexState::Uninitialized);
        assert_eq!(fx.library.storage().listings(), 0);
    }

    #[test]
    fn test_cache_miss_rescans_and_saves() {
        let mut fx = fixture(games(), Some("/games"));

        let index = fx.library.get_entries().unwrap();
        let names: Vec<_> = index.entries().map(|e| e.name().to_string()).collect();
        assert_eq!(names, vec!["Alpha"]);

        assert_eq!(fx.library.state(), IndexState::Ready);
        assert_eq!(fx.library.source(), IndexState::Rescanning);
        assert!(fx.library.cache().exists());
        assert_eq!(fx.library.cache().load().unwrap(), *fx.library.index());
        assert!(!fx.library.refresh_required());

        let (format, result) = &fx.library.last_scan()[0];
        assert_eq!(*format, TitleFormat::Nro);
        assert_eq!(result.found, 1);
        assert_eq!(result.skipped.len(), 1);
    }

    #[test]
    fn test_cache_hit_skips_traversal() {
        let mut fx = fixture(games(), Some("/games"));
        let scanned = fx.library.get_entries().unwrap().clone();
        let cache_path = fx.library.cache().path().to_path_buf();

        let mut fresh = Library::new(
            games(),
            fx.library.preferences().clone(),
            LoaderRegistry::with_defaults(),
            LibraryCache::new(cache_path),
            DirectoryScanner::new(),
        );
        let cached = fresh.get_entries().unwrap().clone();

        assert_eq!(cached, scanned);
        assert_eq!(fresh.source(), IndexState::CacheHit);
        assert_eq!(fresh.storage().listings(), 0);
        assert_eq!(fresh.storage().opens(), 0);
    }

    #[test]
    fn test_ready_index_is_reused() {
        let mut fx = fixture(games(), Some("/games"));
        fx.library.get_entries().unwrap();
        let listings = fx.library.storage().listings();

        fx.library.get_entries().unwrap();
        assert_eq!(fx.library.storage().listings(), listings);
    }

    #[test]
    fn test_refresh_flag_forces_rescan() {
        let mut fx = fixture(games(), Some("/games"));
        fx.library.get_entries().unwrap();
        let listings = fx.library.storage().listings();

        fx.library.invalidate().unwrap();
        assert!(fx.library.refresh_required());

        fx.library.get_entries().unwrap();
        assert!(fx.library.storage().listings() > listings);
        assert!(!fx.library.refresh_required());
        assert_eq!(fx.library.source(), IndexState::Rescanning);
    }

    #[test]
    fn test_corrupt_cache_falls_back_to_rescan() {
        let mut fx = fixture(games(), Some("/games"));
        std::fs::write(fx.library.cache().path(), b"garbage").unwrap();

        let index = fx.library.get_entries().unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(fx.library.source(), IndexState::Rescanning);
        assert!(fx.library.cache().load().is_ok());
    }

    #[test]
    fn test_cache_write_failure_keeps_index() {
        let temp_dir = TempDir::new().unwrap();
        // A directory where the cache file should be makes the rename fail
        let cache_path = temp_dir.path().join("roms.bin");
        std::fs::create_dir(&cache_path).unwrap();
        std::fs::write(cache_path.join("keep"), b"x").unwrap();

        let mut preferences = MemoryPreferences::new();
        preferences.set_string(SEARCH_LOCATION_KEY, "/games").unwrap();
        preferences.set_bool(REFRESH_REQUIRED_KEY, true).unwrap();
        let mut library = Library::new(
            games(),
            preferences,
            LoaderRegistry::with_defaults(),
            LibraryCache::new(cache_path),
            DirectoryScanner::new(),
        );

        let index = library.get_entries().unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(library.state(), IndexState::Ready);
        assert!(!library.refresh_required());
    }

    #[test]
    fn test_empty_tree_is_ready() {
        let mut fx = fixture(MemoryStorage::new("/games"), Some("/games"));
        let index = fx.library.get_entries().unwrap();
        assert!(index.is_empty());
        assert_eq!(index.rows(), vec![crate::IndexRow::Empty]);
        assert_eq!(fx.library.state(), IndexState::Ready);
    }

    #[test]
    fn test_root_unavailable_keeps_flag() {
        let mut fx = fixture(games(), Some("/elsewhere"));
        fx.library.invalidate().unwrap();

        let err = fx.library.get_entries().unwrap_err();
        assert!(matches!(err, LibraryError::RootUnavailable { .. }));
        assert!(fx.library.refresh_required());
        assert_eq!(fx.library.state(), IndexState::Uninitialized);
    }

    #[test]
    fn test_set_search_root_invalidates() {
        let mut storage = games();
        let other = storage.add_dir("/games", "other");
        storage.add_file(&other, "z.nro", NroImage::new("Zeta").build());

        let mut fx = fixture(storage, Some("/games/other"));
        assert_eq!(fx.library.get_entries().unwrap().len(), 1);

        fx.library.set_search_root("/games").unwrap();
        assert!(fx.library.refresh_required());

        let names: Vec<_> = fx
            .library
            .get_entries()
            .unwrap()
            .entries()
            .map(|e| e.name().to_string())
            .collect();
        assert_eq!(names, vec!["Alpha", "Zeta"]);
    }

    #[test]
    fn test_force_refresh_bypasses_cache() {
        let mut fx = fixture(games(), Some("/games"));
        fx.library.get_entries().unwrap();
        let opens = fx.library.storage().opens();

        fx.library.force_refresh().unwrap();
        assert!(fx.library.storage().opens() > opens);
        assert_eq!(fx.library.storage().open_handles(), 0);
    }

    #[test]
    fn test_clear_cache() {
        let mut fx = fixture(games(), Some("/games"));
        fx.library.get_entries().unwrap();

        fx.library.clear_cache().unwrap();
        assert!(!fx.library.cache().exists());
        assert_eq!(fx.library.state(), IndexState::Uninitialized);
        assert!(fx.library.index().is_empty());
    }
}
