//! Directory scanner settings

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Scanner configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Scan subdirectories
    #[serde(default = "default_recursive")]
    pub recursive: bool,

    /// Skip hidden files/directories
    #[serde(default)]
    pub skip_hidden: bool,

    /// Directory names to skip, matched ignoring case
    #[serde(default)]
    pub skip_dirs: HashSet<String>,

    /// Deepest directory level entered below the root
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

fn default_recursive() -> bool {
    true
}

fn default_max_depth() -> usize {
    32
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            recursive: default_recursive(),
            skip_hidden: false,
            skip_dirs: HashSet::new(),
            max_depth: default_max_depth(),
        }
    }
}

impl ScanConfig {
    /// Whether a directory with this name should be left out of the walk
    pub fn skips_dir(&self, name: &str) -> bool {
        (self.skip_hidden && name.starts_with('.'))
            || self
                .skip_dirs
                .iter()
                .any(|dir| dir.eq_ignore_ascii_case(name))
    }
}
