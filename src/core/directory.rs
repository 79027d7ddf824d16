//! Fixed-slot flat directory
//!
//! Each slot is an explicit concatenation of fixed-width fields, independent
//! of any native struct layout:
//!
//! ```text
//! 0..255    name         UTF-8, zero-padded
//! 255..259  size         u32 LE
//! 259..263  first_block  u32 LE (0xFFFFFFFF for files without blocks)
//! 263       flags        bit 0 = protected against removal
//! ```
//!
//! A slot whose first byte is zero is empty.

use crate::error::{ImageError, Result};
use crate::io::ImageFile;
use crate::layout::Layout;
use tracing::debug;

pub const NAME_FIELD_LEN: usize = 255;
pub const MAX_NAME_LEN: usize = NAME_FIELD_LEN;

/// Encoded width of one slot record
pub const SLOT_WIDTH: usize = NAME_FIELD_LEN + 4 + 4 + 1;

/// `first_block` value of files that own no blocks
pub const NO_BLOCK: u32 = u32::MAX;

pub const FLAG_PROTECTED: u8 = 0x01;

/// Check that `name` can be stored in a slot
pub fn validate_name(name: &str) -> Result<()> {
    if name.len() > MAX_NAME_LEN {
        return Err(ImageError::NameTooLong {
            len: name.len(),
            max: MAX_NAME_LEN,
        });
    }
    if name.is_empty() || name.contains('\0') {
        return Err(ImageError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// One occupied directory slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub size: u32,
    /// First block of the chain, `None` for empty files
    pub first_block: Option<u32>,
    pub flags: u8,
}

impl DirEntry {
    pub fn new(name: impl Into<String>, size: u32, first_block: Option<u32>) -> Self {
        DirEntry {
            name: name.into(),
            size,
            first_block,
            flags: 0,
        }
    }

    pub fn is_protected(&self) -> bool {
        self.flags & FLAG_PROTECTED != 0
    }

    /// Set or clear the protection bit, leaving other flag bits alone
    pub fn set_protected(&mut self, enabled: bool) {
        if enabled {
            self.flags |= FLAG_PROTECTED;
        } else {
            self.flags &= !FLAG_PROTECTED;
        }
    }

    /// Encode the record, zero-padded to `slot_width` bytes
    pub fn to_bytes(&self, slot_width: usize) -> Vec<u8> {
        let mut bytes = vec![0u8; slot_width.max(SLOT_WIDTH)];

        let name = self.name.as_bytes();
        let name_len = name.len().min(NAME_FIELD_LEN);
        bytes[..name_len].copy_from_slice(&name[..name_len]);

        bytes[255..259].copy_from_slice(&self.size.to_le_bytes());
        bytes[259..263].copy_from_slice(&self.first_block.unwrap_or(NO_BLOCK).to_le_bytes());
        bytes[263] = self.flags;

        bytes
    }

    /// Decode a slot, `None` if it is empty
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < SLOT_WIDTH || bytes[0] == 0 {
            return None;
        }

        let name_field = &bytes[..NAME_FIELD_LEN];
        let name_len = name_field
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(NAME_FIELD_LEN);
        let name = String::from_utf8_lossy(&name_field[..name_len]).into_owned();

        let size = u32::from_le_bytes([bytes[255], bytes[256], bytes[257], bytes[258]]);
        let first_block = match u32::from_le_bytes([bytes[259], bytes[260], bytes[261], bytes[262]]) {
            NO_BLOCK => None,
            block => Some(block),
        };

        Some(DirEntry {
            name,
            size,
            first_block,
            flags: bytes[263],
        })
    }
}

/// In-memory copy of the directory region
///
/// Slots stay in storage order; lookups scan from slot 0 and act on the
/// first match.
#[derive(Debug, Clone)]
pub struct Directory {
    slots: Vec<Option<DirEntry>>,
    layout: Layout,
}

impl Directory {
    /// Decode every slot of the directory region, empty ones included
    pub fn load_all(file: &mut ImageFile, layout: &Layout) -> Result<Self> {
        let bytes = file.read_region(layout.directory_offset, layout.directory_size as usize)?;

        let slots = bytes
            .chunks_exact(layout.slot_width as usize)
            .map(DirEntry::from_bytes)
            .collect();

        Ok(Directory {
            slots,
            layout: *layout,
        })
    }

    pub fn slots(&self) -> &[Option<DirEntry>] {
        &self.slots
    }

    /// Occupied slots with their indices, in storage order
    pub fn entries(&self) -> impl Iterator<Item = (usize, &DirEntry)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|entry| (index, entry)))
    }

    pub fn len(&self) -> usize {
        self.entries().count()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().next().is_none()
    }

    pub fn find_by_name(&self, name: &str) -> Result<(usize, &DirEntry)> {
        self.entries()
            .find(|(_, entry)| entry.name == name)
            .ok_or_else(|| ImageError::NotFound(name.to_string()))
    }

    pub fn find_free_slot(&self) -> Result<usize> {
        self.slots
            .iter()
            .position(Option::is_none)
            .ok_or(ImageError::DirectoryFull)
    }

    /// Overwrite exactly one slot
    pub fn write_slot(&mut self, file: &mut ImageFile, index: usize, entry: DirEntry) -> Result<()> {
        self.check_index(index)?;
        debug!("Writing directory slot {} for {}", index, entry.name);

        let bytes = entry.to_bytes(self.layout.slot_width as usize);
        file.write_at(self.layout.slot_offset(index), &bytes)?;
        self.slots[index] = Some(entry);

        Ok(())
    }

    /// Zero-fill one slot
    pub fn clear_slot(&mut self, file: &mut ImageFile, index: usize) -> Result<()> {
        self.check_index(index)?;
        debug!("Clearing directory slot {}", index);

        let bytes = vec![0u8; self.layout.slot_width as usize];
        file.write_at(self.layout.slot_offset(index), &bytes)?;
        self.slots[index] = None;

        Ok(())
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.slots.len() {
            return Err(ImageError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!(
                    "directory slot {} out of range ({} slots)",
                    index,
                    self.slots.len()
                ),
            )));
        }
        Ok(())
    }
}
