//! Region layout of an image file
//!
//! ```text
//! ┌──────────────────────────────┐ 0
//! │ Header (header_size)         │
//! ├──────────────────────────────┤ table_offset
//! │ Allocation table             │  (total_size / block_size) × 4 bytes
//! ├──────────────────────────────┤ directory_offset
//! │ Directory                    │  max_entries × slot_width bytes
//! ├──────────────────────────────┤ data_offset
//! │ Data blocks                  │  block_count × block_size bytes
//! │ (trailing partial block)     │
//! └──────────────────────────────┘ total_size
//! ```

use crate::error::{ImageError, Result};

pub const DEFAULT_BLOCK_SIZE: u32 = 4096;
pub const DEFAULT_HEADER_SIZE: u32 = 1024;
pub const DEFAULT_MAX_ENTRIES: u32 = 1000;

pub const MIN_BLOCK_SIZE: u32 = 512;
pub const MAX_BLOCK_SIZE: u32 = 65536;
pub const MIN_HEADER_SIZE: u32 = 64;

/// Width of one allocation table entry in bytes
pub const TABLE_ENTRY_SIZE: u64 = 4;

/// Fixed region boundaries of an image
///
/// Computed once when an image is created, or rebuilt from the stored
/// header when an existing image is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub total_size: u64,
    pub block_size: u32,
    pub header_size: u32,
    pub table_offset: u64,
    pub table_size: u64,
    pub directory_offset: u64,
    pub directory_size: u64,
    pub max_entries: u32,
    pub slot_width: u32,
    pub data_offset: u64,
    /// Number of whole blocks that fit in the data region
    pub block_count: u32,
}

/// Derive region offsets and counts for an image of `total_size` bytes.
pub fn compute_layout(
    total_size: u64,
    block_size: u32,
    header_size: u32,
    max_entries: u32,
    entry_size: u32,
) -> Result<Layout> {
    if !block_size.is_power_of_two() || !(MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE).contains(&block_size) {
        return Err(ImageError::InvalidConfig(format!(
            "block size {} must be a power of two between {} and {}",
            block_size, MIN_BLOCK_SIZE, MAX_BLOCK_SIZE
        )));
    }
    if header_size < MIN_HEADER_SIZE {
        return Err(ImageError::InvalidConfig(format!(
            "header size {} is below the minimum of {}",
            header_size, MIN_HEADER_SIZE
        )));
    }
    if max_entries == 0 {
        return Err(ImageError::InvalidConfig(
            "directory must hold at least one entry".to_string(),
        ));
    }
    if (entry_size as usize) < crate::directory::SLOT_WIDTH {
        return Err(ImageError::InvalidConfig(format!(
            "slot width {} is below the record width of {}",
            entry_size,
            crate::directory::SLOT_WIDTH
        )));
    }
    if total_size > u32::MAX as u64 {
        return Err(ImageError::InvalidConfig(format!(
            "image size {} exceeds the 32-bit header limit",
            total_size
        )));
    }

    let table_offset = header_size as u64;
    let table_size = (total_size / block_size as u64) * TABLE_ENTRY_SIZE;
    let directory_offset = table_offset + table_size;
    let directory_size = max_entries as u64 * entry_size as u64;
    let data_offset = directory_offset + directory_size;

    if total_size <= data_offset {
        return Err(ImageError::SizeTooSmall {
            size: total_size,
            minimum: data_offset,
        });
    }

    let block_count = ((total_size - data_offset) / block_size as u64) as u32;

    Ok(Layout {
        total_size,
        block_size,
        header_size,
        table_offset,
        table_size,
        directory_offset,
        directory_size,
        max_entries,
        slot_width: entry_size,
        data_offset,
        block_count,
    })
}

impl Layout {
    /// Layout with the default geometry (4 KiB blocks, 1 KiB header, 1000 slots)
    pub fn with_defaults(total_size: u64) -> Result<Self> {
        compute_layout(
            total_size,
            DEFAULT_BLOCK_SIZE,
            DEFAULT_HEADER_SIZE,
            DEFAULT_MAX_ENTRIES,
            crate::directory::SLOT_WIDTH as u32,
        )
    }

    /// Byte offset of a data block
    pub fn block_offset(&self, index: u32) -> u64 {
        self.data_offset + index as u64 * self.block_size as u64
    }

    /// Byte offset of a directory slot
    pub fn slot_offset(&self, index: usize) -> u64 {
        self.directory_offset + index as u64 * self.slot_width as u64
    }

    /// Number of blocks needed to hold `len` bytes
    pub fn blocks_for(&self, len: u64) -> u64 {
        len.div_ceil(self.block_size as u64)
    }

    /// Capacity of the data region in bytes (whole blocks only)
    pub fn data_capacity(&self) -> u64 {
        self.block_count as u64 * self.block_size as u64
    }
}
