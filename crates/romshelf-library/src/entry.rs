//! Title entries produced by format loaders

use serde::{Deserialize, Serialize};

/// Supported ROM container formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum TitleFormat {
    /// Switch homebrew relocatable object
    Nro,
}

impl TitleFormat {
    /// Canonical file extension, without the dot
    pub fn extension(self) -> &'static str {
        match self {
            TitleFormat::Nro => "nro",
        }
    }

    /// Group header shown above titles of this format
    pub fn label(self) -> &'static str {
        match self {
            TitleFormat::Nro => "NRO",
        }
    }
}

impl std::fmt::Display for TitleFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Format-specific details read out of a title
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleMetadata {
    pub name: String,
    pub author: Option<String>,
    pub version: Option<String>,
    /// Raw icon image as stored in the file (JPEG for NRO)
    pub icon: Option<Vec<u8>>,
}

/// One indexed title
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleEntry {
    format: TitleFormat,
    location: String,
    metadata: TitleMetadata,
}

impl TitleEntry {
    pub fn new(format: TitleFormat, location: impl Into<String>, metadata: TitleMetadata) -> Self {
        Self {
            format,
            location: location.into(),
            metadata,
        }
    }

    pub fn format(&self) -> TitleFormat {
        self.format
    }

    /// Storage locator of the file this entry was read from
    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn metadata(&self) -> &TitleMetadata {
        &self.metadata
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }
}
