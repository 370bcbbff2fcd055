//! Persistent library cache (`roms.bin`)
//!
//! File layout, all integers little-endian:
//!
//! | offset | size | field |
//! |--------|------|-------|
//! | 0      | 4    | magic `RSIX` |
//! | 4      | 4    | format version |
//! | 8      | 4    | CRC32 of the payload |
//! | 12     | 8    | payload length |
//! | 20     | n    | bincode-encoded title groups |
//!
//! Only files written by the same format version are read back.

use crate::index::{LibraryIndex, TitleGroup};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

const CACHE_MAGIC: &[u8; 4] = b"RSIX";

/// Cache format version - bump when the layout or entry types change
const CACHE_VERSION: u32 = 1;

const HEADER_LEN: usize = 20;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache not found: {0}")]
    NotFound(PathBuf),

    #[error("Corrupt cache: {0}")]
    Corrupt(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    groups: &'a [TitleGroup],
}

#[derive(Deserialize)]
struct Snapshot {
    groups: Vec<TitleGroup>,
}

/// Reads and writes the index snapshot at a fixed path
#[derive(Debug, Clone)]
pub struct LibraryCache {
    path: PathBuf,
}

impl LibraryCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Write a snapshot, replacing any previous one
    pub fn save(&self, index: &LibraryIndex) -> Result<(), CacheError> {
        let payload = bincode::serialize(&SnapshotRef {
            groups: index.groups(),
        })
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        let mut data = Vec::with_capacity(HEADER_LEN + payload.len());
        data.extend_from_slice(CACHE_MAGIC);
        data.extend_from_slice(&CACHE_VERSION.to_le_bytes());
        data.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
        data.extend_from_slice(&(payload.len() as u64).to_le_bytes());
        data.extend_from_slice(&payload);

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Write atomically (temp file + rename)
        let temp_path = self.path.with_extension("bin.tmp");
        if let Err(e) = write_and_replace(&temp_path, &self.path, &data) {
            let _ = fs::remove_file(&temp_path);
            return Err(e.into());
        }

        tracing::debug!(
            "Saved {} titles to {} ({} bytes)",
            index.len(),
            self.path.display(),
            data.len()
        );
        Ok(())
    }

    /// Read the last snapshot back
    pub fn load(&self) -> Result<LibraryIndex, CacheError> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(CacheError::NotFound(self.path.clone()));
            }
            Err(e) => return Err(e.into()),
        };

        if data.len() < HEADER_LEN {
            return Err(CacheError::Corrupt(format!(
                "{} bytes is shorter than the header",
                data.len()
            )));
        }
        let (header, payload) = data.split_at(HEADER_LEN);

        if &header[0..4] != CACHE_MAGIC {
            return Err(CacheError::Corrupt("bad magic".to_string()));
        }

        let version = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
        if version != CACHE_VERSION {
            return Err(CacheError::Corrupt(format!(
                "version mismatch: expected {}, got {}",
                CACHE_VERSION, version
            )));
        }

        let checksum = u32::from_le_bytes([header[8], header[9], header[10], header[11]]);
        let mut len_bytes = [0u8; 8];
        len_bytes.copy_from_slice(&header[12..20]);
        let payload_len = u64::from_le_bytes(len_bytes);

        if payload_len != payload.len() as u64 {
            return Err(CacheError::Corrupt(format!(
                "payload length mismatch: header says {}, file has {}",
                payload_len,
                payload.len()
            )));
        }
        if crc32fast::hash(payload) != checksum {
            return Err(CacheError::Corrupt("checksum mismatch".to_string()));
        }

        let snapshot: Snapshot =
            bincode::deserialize(payload).map_err(|e| CacheError::Corrupt(e.to_string()))?;

        Ok(LibraryIndex::from_groups(snapshot.groups))
    }

    /// Delete the cache file if present
    pub fn clear(&self) -> Result<(), CacheError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn write_and_replace(temp_path: &Path, path: &Path, data: &[u8]) -> io::Result<()> {
    let mut file = fs::File::create(temp_path)?;
    file.write_all(data)?;
    file.sync_all()?;
    fs::rename(temp_path, path)
}
