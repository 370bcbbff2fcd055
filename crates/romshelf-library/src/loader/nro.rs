//! NRO (Switch homebrew) loader
//!
//! Layout handled here:
//! - 0x80 byte header with magic `NRO0` at 0x10 and the executable image size at 0x18
//! - optional asset section right after the image: `ASET` header followed by
//!   `(offset, size)` pairs for the icon, NACP and RomFS, relative to the
//!   asset header
//! - NACP: 16 language entries of 0x300 bytes (name, publisher), display
//!   version at 0x3060

use super::{FormatLoader, LoaderError};
use crate::entry::{TitleEntry, TitleFormat, TitleMetadata};
use crate::storage::{FileHandle, stem_of};

pub(crate) const NRO_HEADER_LEN: usize = 0x80;
pub(crate) const NRO_MAGIC_OFFSET: usize = 0x10;
pub(crate) const NRO_MAGIC: &[u8; 4] = b"NRO0";
pub(crate) const NRO_SIZE_OFFSET: usize = 0x18;

pub(crate) const ASSET_MAGIC: &[u8; 4] = b"ASET";
pub(crate) const ASSET_HEADER_LEN: usize = 0x38;

pub(crate) const NACP_LANGUAGE_COUNT: usize = 16;
pub(crate) const NACP_ENTRY_LEN: usize = 0x300;
pub(crate) const NACP_NAME_LEN: usize = 0x200;
pub(crate) const NACP_PUBLISHER_LEN: usize = 0x100;
pub(crate) const NACP_VERSION_OFFSET: usize = 0x3060;
pub(crate) const NACP_VERSION_LEN: usize = 0x10;
pub(crate) const NACP_LEN: usize = 0x4000;

const MAX_ICON_LEN: u64 = 512 * 1024;

/// `(offset, size)` of a section, relative to the asset header
#[derive(Debug, Clone, Copy)]
struct AssetSection {
    offset: u64,
    size: u64,
}

impl AssetSection {
    fn parse(header: &[u8], at: usize) -> Self {
        Self {
            offset: u64_at(header, at),
            size: u64_at(header, at + 8),
        }
    }
}

/// Loader for `.nro` files
#[derive(Debug, Clone, Copy, Default)]
pub struct NroLoader;

impl NroLoader {
    pub fn new() -> Self {
        Self
    }

    /// Absolute file offset of a section, checked against the file length
    fn locate(
        base: u64,
        section: AssetSection,
        file_len: u64,
        what: &str,
    ) -> Result<u64, LoaderError> {
        let start = base
            .checked_add(section.offset)
            .ok_or_else(|| LoaderError::Corrupt(format!("{} offset overflows", what)))?;
        let end = start
            .checked_add(section.size)
            .ok_or_else(|| LoaderError::Corrupt(format!("{} size overflows", what)))?;
        if end > file_len {
            return Err(LoaderError::Corrupt(format!(
                "{} section {:#x}..{:#x} lies outside the file ({:#x} bytes)",
                what, start, end, file_len
            )));
        }
        Ok(start)
    }

    fn read_icon(
        handle: &mut dyn FileHandle,
        base: u64,
        section: AssetSection,
        file_len: u64,
    ) -> Result<Option<Vec<u8>>, LoaderError> {
        if section.size == 0 {
            return Ok(None);
        }
        if section.size > MAX_ICON_LEN {
            return Err(LoaderError::Corrupt(format!(
                "icon is {} bytes, larger than {}",
                section.size, MAX_ICON_LEN
            )));
        }
        let start = Self::locate(base, section, file_len, "icon")?;
        let mut icon = vec![0u8; section.size as usize];
        handle.read_exact_at(start, &mut icon)?;
        Ok(Some(icon))
    }

    /// Name, publisher and version from the NACP, `None` when there is no NACP
    fn read_nacp(
        handle: &mut dyn FileHandle,
        base: u64,
        section: AssetSection,
        file_len: u64,
    ) -> Result<Option<(String, Option<String>, Option<String>)>, LoaderError> {
        if section.size == 0 {
            return Ok(None);
        }
        if section.size < (NACP_VERSION_OFFSET + NACP_VERSION_LEN) as u64 {
            return Err(LoaderError::Corrupt(format!(
                "NACP is only {:#x} bytes",
                section.size
            )));
        }
        let start = Self::locate(base, section, file_len, "NACP")?;

        let mut nacp = vec![0u8; NACP_VERSION_OFFSET + NACP_VERSION_LEN];
        handle.read_exact_at(start, &mut nacp)?;

        let language = (0..NACP_LANGUAGE_COUNT)
            .map(|i| &nacp[i * NACP_ENTRY_LEN..(i + 1) * NACP_ENTRY_LEN])
            .find(|entry| !c_string(&entry[..NACP_NAME_LEN]).is_empty());

        let Some(language) = language else {
            return Ok(None);
        };

        let name = c_string(&language[..NACP_NAME_LEN]);
        let publisher =
            c_string(&language[NACP_NAME_LEN..NACP_NAME_LEN + NACP_PUBLISHER_LEN]);
        let version =
            c_string(&nacp[NACP_VERSION_OFFSET..NACP_VERSION_OFFSET + NACP_VERSION_LEN]);

        Ok(Some((name, non_empty(publisher), non_empty(version))))
    }
}

impl FormatLoader for NroLoader {
    fn format(&self) -> TitleFormat {
        TitleFormat::Nro
    }

    fn verify(&self, handle: &mut dyn FileHandle) -> bool {
        let mut header = [0u8; NRO_HEADER_LEN];
        if handle.read_exact_at(0, &mut header).is_err() {
            return false;
        }
        &header[NRO_MAGIC_OFFSET..NRO_MAGIC_OFFSET + 4] == NRO_MAGIC
    }

    fn extract(
        &self,
        handle: &mut dyn FileHandle,
        location: &str,
    ) -> Result<TitleEntry, LoaderError> {
        let file_len = handle.size()?;

        let mut header = [0u8; NRO_HEADER_LEN];
        handle.read_exact_at(0, &mut header)?;
        if &header[NRO_MAGIC_OFFSET..NRO_MAGIC_OFFSET + 4] != NRO_MAGIC {
            return Err(LoaderError::Corrupt("missing NRO0 magic".to_string()));
        }

        let image_size = u64::from(u32_at(&header, NRO_SIZE_OFFSET));
        if image_size < NRO_HEADER_LEN as u64 {
            return Err(LoaderError::Corrupt(format!(
                "image size {:#x} is smaller than the header",
                image_size
            )));
        }
        if image_size > file_len {
            return Err(LoaderError::Corrupt(format!(
                "image size {:#x} exceeds file length {:#x}",
                image_size, file_len
            )));
        }

        let fallback_name = stem_of(handle.name()).to_string();

        // Plain executables carry no asset section
        if image_size == file_len {
            return Ok(TitleEntry::new(
                TitleFormat::Nro,
                location,
                TitleMetadata {
                    name: fallback_name,
                    ..TitleMetadata::default()
                },
            ));
        }

        if file_len - image_size < ASSET_HEADER_LEN as u64 {
            return Err(LoaderError::Corrupt("truncated asset header".to_string()));
        }

        let mut asset_header = [0u8; ASSET_HEADER_LEN];
        handle.read_exact_at(image_size, &mut asset_header)?;
        if &asset_header[..4] != ASSET_MAGIC {
            return Err(LoaderError::Corrupt("missing ASET magic".to_string()));
        }

        let icon_section = AssetSection::parse(&asset_header, 0x08);
        let nacp_section = AssetSection::parse(&asset_header, 0x18);
        let romfs_section = AssetSection::parse(&asset_header, 0x28);
        Self::locate(image_size, romfs_section, file_len, "RomFS")?;

        let icon = Self::read_icon(handle, image_size, icon_section, file_len)?;
        let (name, author, version) =
            match Self::read_nacp(handle, image_size, nacp_section, file_len)? {
                Some(fields) => fields,
                None => (fallback_name, None, None),
            };

        Ok(TitleEntry::new(
            TitleFormat::Nro,
            location,
            TitleMetadata {
                name,
                author,
                version,
                icon,
            },
        ))
    }
}

fn u32_at(buf: &[u8], at: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&buf[at..at + 4]);
    u32::from_le_bytes(bytes)
}

fn u64_at(buf: &[u8], at: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[at..at + 8]);
    u64::from_le_bytes(bytes)
}

/// NUL-terminated UTF-8, trimmed
fn c_string(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).trim().to_string()
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() { None } else { Some(value) }
}
