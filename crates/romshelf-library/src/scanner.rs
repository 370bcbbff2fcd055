//! ROM scanning functionality

use crate::LibraryError;
use crate::entry::TitleEntry;
use crate::loader::{FormatLoader, LoaderError};
use crate::storage::{EntryKind, Storage, StorageEntry, extension_of};
use romshelf_config::ScanConfig;
use std::collections::HashSet;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Why a file was left out of the index
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SkipReason {
    #[error("file name is empty or has no extension")]
    MalformedName,

    #[error("header did not verify")]
    Unverified,

    #[error("corrupt: {0}")]
    Corrupt(String),

    #[error("IO error: {0}")]
    Io(String),
}

/// A skipped file or directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedFile {
    pub location: String,
    pub reason: SkipReason,
}

/// Outcome of visiting a single file
#[derive(Debug)]
pub enum FileOutcome {
    Found(TitleEntry),
    Skipped(SkipReason),
    /// Extension does not match the scan target
    Ignored,
}

/// Result of a ROM scan
#[derive(Debug, Default)]
pub struct ScanResult {
    /// Entries in pre-order discovery order
    pub entries: Vec<TitleEntry>,
    pub skipped: Vec<SkippedFile>,
    /// Files looked at, whatever their extension
    pub files_seen: usize,
    /// Entries found; stays valid after `entries` has been moved out
    pub found: usize,
    pub duration: Duration,
}

impl ScanResult {
    fn skip(&mut self, location: &str, reason: SkipReason) {
        self.skipped.push(SkippedFile {
            location: location.to_string(),
            reason,
        });
    }
}

/// Depth-first directory scanner
#[derive(Debug, Clone, Default)]
pub struct DirectoryScanner {
    config: ScanConfig,
}

impl DirectoryScanner {
    /// Create a new scanner with default config
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with custom config
    pub fn with_config(config: ScanConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Scan the tree under `root` for files with `extension`, handing each to `loader`
    ///
    /// Traversal is pre-order in the order the backend lists children. Each
    /// directory is entered once by its canonical identity, so links back into
    /// the tree are not walked again. Problems with individual files or
    /// sub-directories are recorded in [`ScanResult::skipped`]; only an
    /// unlistable root fails the scan.
    pub fn scan<S: Storage + ?Sized>(
        &self,
        storage: &S,
        root: &str,
        extension: &str,
        loader: &dyn FormatLoader,
    ) -> Result<ScanResult, LibraryError> {
        let start = Instant::now();

        let children = storage
            .list(root)
            .map_err(|source| LibraryError::RootUnavailable {
                root: root.to_string(),
                source,
            })?;

        let mut visited = HashSet::new();
        visited.insert(self.identity(storage, root));

        let mut result = ScanResult::default();
        let mut stack: Vec<(usize, std::vec::IntoIter<StorageEntry>)> =
            vec![(0, children.into_iter())];

        while let Some((depth, pending)) = stack.last_mut() {
            let depth = *depth;
            let Some(entry) = pending.next() else {
                stack.pop();
                continue;
            };

            if self.config.skip_hidden
                && entry.name.as_deref().is_some_and(|name| name.starts_with('.'))
            {
                continue;
            }

            match entry.kind {
                EntryKind::Directory => {
                    if !self.config.recursive {
                        continue;
                    }
                    if entry
                        .name
                        .as_deref()
                        .is_some_and(|name| self.config.skips_dir(name))
                    {
                        debug!("Skipping directory {}", entry.locator);
                        continue;
                    }
                    if depth + 1 > self.config.max_depth {
                        warn!(
                            "Not descending into {}: deeper than {} levels",
                            entry.locator, self.config.max_depth
                        );
                        continue;
                    }
                    if !visited.insert(self.identity(storage, &entry.locator)) {
                        debug!("Already visited {}, not entering again", entry.locator);
                        continue;
                    }

                    match storage.list(&entry.locator) {
                        Ok(children) => stack.push((depth + 1, children.into_iter())),
                        Err(e) => {
                            warn!("Cannot list {}: {}", entry.locator, e);
                            result.skip(&entry.locator, SkipReason::Io(e.to_string()));
                        }
                    }
                }
                EntryKind::File => {
                    result.files_seen += 1;
                    match self.visit_file(storage, &entry, extension, loader) {
                        FileOutcome::Found(title) => result.entries.push(title),
                        FileOutcome::Skipped(reason) => result.skip(&entry.locator, reason),
                        FileOutcome::Ignored => {}
                    }
                }
            }
        }

        result.found = result.entries.len();
        result.duration = start.elapsed();

        info!(
            "Scanned {} for .{}: {} found, {} skipped, {} files in {:?}",
            root,
            extension,
            result.found,
            result.skipped.len(),
            result.files_seen,
            result.duration
        );

        Ok(result)
    }

    fn identity<S: Storage + ?Sized>(&self, storage: &S, locator: &str) -> String {
        storage.canonical(locator).unwrap_or_else(|e| {
            debug!("Cannot resolve {}: {}", locator, e);
            locator.to_string()
        })
    }

    /// Check, open, verify and extract one file
    ///
    /// The handle is dropped before returning, whatever the outcome.
    pub fn visit_file<S: Storage + ?Sized>(
        &self,
        storage: &S,
        entry: &StorageEntry,
        extension: &str,
        loader: &dyn FormatLoader,
    ) -> FileOutcome {
        let Some(file_ext) = entry.name.as_deref().and_then(extension_of) else {
            debug!("Skipping {}: malformed file name", entry.locator);
            return FileOutcome::Skipped(SkipReason::MalformedName);
        };

        if !file_ext.eq_ignore_ascii_case(extension) {
            return FileOutcome::Ignored;
        }

        let mut handle = match storage.open(&entry.locator) {
            Ok(handle) => handle,
            Err(e) => {
                warn!("Cannot open {}: {}", entry.locator, e);
                return FileOutcome::Skipped(SkipReason::Io(e.to_string()));
            }
        };

        if !loader.verify(handle.as_mut()) {
            debug!("Skipping {}: not a valid .{} file", entry.locator, extension);
            return FileOutcome::Skipped(SkipReason::Unverified);
        }

        match loader.extract(handle.as_mut(), &entry.locator) {
            Ok(title) => {
                debug!("Found {} at {}", title.name(), entry.locator);
                FileOutcome::Found(title)
            }
            Err(LoaderError::Corrupt(msg)) => {
                warn!("Skipping corrupt file {}: {}", entry.locator, msg);
                FileOutcome::Skipped(SkipReason::Corrupt(msg))
            }
            Err(LoaderError::Io(e)) => {
                warn!("Ran into IO error reading {}: {}", entry.locator, e);
                FileOutcome::Skipped(SkipReason::Io(e.to_string()))
            }
        }
    }
}
