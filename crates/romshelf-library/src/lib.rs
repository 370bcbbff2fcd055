//! ROM library indexing for romshelf
//!
//! Walks a user-selected directory tree, verifies candidate files with a
//! per-format loader, and keeps the resulting title index in a binary cache so
//! clients can list titles without rescanning storage on every launch.
//!
//! # Example
//!
//! ```no_run
//! use romshelf_config::{MemoryPreferences, Preferences, SEARCH_LOCATION_KEY};
//! use romshelf_library::{DirectoryScanner, Library, LibraryCache, LoaderRegistry, LocalStorage};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut preferences = MemoryPreferences::new();
//!     preferences.set_string(SEARCH_LOCATION_KEY, "/roms/switch")?;
//!
//!     let mut library = Library::new(
//!         LocalStorage::new(),
//!         preferences,
//!         LoaderRegistry::with_defaults(),
//!         LibraryCache::new("/tmp/romshelf/roms.bin"),
//!         DirectoryScanner::new(),
//!     );
//!
//!     for entry in library.get_entries()?.entries() {
//!         println!("{} ({})", entry.name(), entry.location());
//!     }
//!     Ok(())
//! }
//! ```

mod cache;
mod entry;
mod index;
mod library;
pub mod loader;
pub mod mock;
mod scanner;
mod storage;

pub use cache::{CacheError, LibraryCache};
pub use entry::{TitleEntry, TitleFormat, TitleMetadata};
pub use index::{IndexRow, LibraryIndex, TitleGroup};
pub use library::{IndexState, Library};
pub use loader::{FormatLoader, LoaderError, LoaderRegistry, NroLoader};
pub use romshelf_config::ScanConfig;
pub use scanner::{DirectoryScanner, FileOutcome, ScanResult, SkipReason, SkippedFile};
pub use storage::{
    EntryKind, FileHandle, LocalFile, LocalStorage, Storage, StorageEntry, extension_of, stem_of,
};

use romshelf_config::ConfigError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("Search root unavailable: {root}: {source}")]
    RootUnavailable {
        root: String,
        #[source]
        source: std::io::Error,
    },

    #[error("No search location configured")]
    NotConfigured,

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Preferences error: {0}")]
    Preferences(#[from] ConfigError),
}
