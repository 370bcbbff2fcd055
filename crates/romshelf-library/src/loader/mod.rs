//! Format loaders: per-format verification and metadata extraction
//!
//! A scan is parameterised by one `(extension, loader)` pair from the
//! [`LoaderRegistry`]. Supporting another format means registering another
//! [`FormatLoader`]; the scanner itself never changes.

pub(crate) mod nro;

pub use nro::NroLoader;

use crate::entry::{TitleEntry, TitleFormat};
use crate::storage::FileHandle;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("Corrupt file: {0}")]
    Corrupt(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Verifier and extractor for one ROM format
pub trait FormatLoader: Send + Sync {
    fn format(&self) -> TitleFormat;

    /// Extension this loader is registered under
    fn extension(&self) -> &str {
        self.format().extension()
    }

    /// Check the minimal header; malformed input yields `false`, never an error
    fn verify(&self, handle: &mut dyn FileHandle) -> bool;

    /// Build an entry for a file that passed [`verify`](FormatLoader::verify)
    fn extract(
        &self,
        handle: &mut dyn FileHandle,
        location: &str,
    ) -> Result<TitleEntry, LoaderError>;
}

/// Extension to loader table, in registration order
pub struct LoaderRegistry {
    loaders: Vec<(String, Box<dyn FormatLoader>)>,
}

impl Default for LoaderRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl LoaderRegistry {
    /// Registry without any loaders
    pub fn empty() -> Self {
        Self {
            loaders: Vec::new(),
        }
    }

    /// Registry with every built-in loader
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(NroLoader::new()));
        registry
    }

    /// Register a loader under its extension, replacing any previous one
    pub fn register(&mut self, loader: Box<dyn FormatLoader>) {
        let extension = loader.extension().to_lowercase();
        match self.loaders.iter_mut().find(|(ext, _)| *ext == extension) {
            Some(slot) => slot.1 = loader,
            None => self.loaders.push((extension, loader)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &dyn FormatLoader)> {
        self.loaders
            .iter()
            .map(|(ext, loader)| (ext.as_str(), loader.as_ref()))
    }

    pub fn len(&self) -> usize {
        self.loaders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loaders.is_empty()
    }
}

impl std::fmt::Debug for LoaderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.loaders.iter().map(|(ext, _)| ext))
            .finish()
    }
}
