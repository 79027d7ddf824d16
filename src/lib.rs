//! # chainfs - Single-File Virtual Filesystem Image
//!
//! `chainfs` stores a flat set of named files inside one fixed-size host
//! file. Space is divided into equal blocks; each file's blocks are linked
//! into a chain through an allocation table, and a fixed-size directory maps
//! names to the first block of each chain.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use chainfs::{Image, Result};
//!
//! # fn main() -> Result<()> {
//! // 1 MiB image with 4 KiB blocks and 1000 directory slots
//! let image = Image::create("disk.img", 1024 * 1024)?;
//!
//! image.import_file(b"Hello, World!", "hello.txt")?;
//! let content = image.read_file("hello.txt")?;
//! assert_eq!(content, b"Hello, World!");
//!
//! for file in &image.list()? {
//!     println!("{} ({} bytes)", file.name, file.size);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Custom Geometry
//!
//! ```rust,no_run
//! use chainfs::{ImageBuilder, Result};
//!
//! # fn main() -> Result<()> {
//! let image = ImageBuilder::new()
//!     .path("small.img")
//!     .total_size(256 * 1024)
//!     .block_size(1024)
//!     .max_entries(64)
//!     .build()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Layout
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ Header (header_size bytes)                   │
//! ├──────────────────────────────────────────────┤
//! │ Allocation table                             │
//! │   (total_size / block_size) × u32            │
//! ├──────────────────────────────────────────────┤
//! │ Directory                                    │
//! │   max_entries × 264-byte slots               │
//! ├──────────────────────────────────────────────┤
//! │ Data region                                  │
//! │   block_count × block_size                   │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! All integers on disk are little-endian.

pub mod core;

// Re-export core modules internally so crate:: paths in core still work
#[allow(unused_imports)]
pub(crate) use self::core::{
    allocator, config, directory, error, header, image, integrity, io, layout,
};

pub use crate::core::{
    allocator::{
        table::{AllocationTable, TableEntry},
        BlockAllocator,
    },
    config::ImageConfig,
    directory::{DirEntry, MAX_NAME_LEN, SLOT_WIDTH},
    error::{ImageError, Result},
    image::{FileInfo, Image, ImageStats, Listing, ListingIter},
    integrity::{CorruptFile, IntegrityReport},
    layout::{compute_layout, Layout},
};

use std::path::PathBuf;
use tracing::info;

/// Builder for images with a custom geometry
///
/// # Examples
///
/// ```rust,no_run
/// use chainfs::ImageBuilder;
///
/// # fn main() -> chainfs::Result<()> {
/// let image = ImageBuilder::new()
///     .path("data.img")
///     .total_size(4 * 1024 * 1024)
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct ImageBuilder {
    path: Option<PathBuf>,
    config: ImageConfig,
}

impl ImageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the image file path (required)
    pub fn path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Replace the whole geometry, e.g. one loaded from TOML
    pub fn config(mut self, config: ImageConfig) -> Self {
        self.config = config;
        self
    }

    pub fn total_size(mut self, total_size: u64) -> Self {
        self.config.total_size = total_size;
        self
    }

    pub fn block_size(mut self, block_size: u32) -> Self {
        self.config.block_size = block_size;
        self
    }

    pub fn header_size(mut self, header_size: u32) -> Self {
        self.config.header_size = header_size;
        self
    }

    /// Set the number of directory slots
    pub fn max_entries(mut self, max_entries: u32) -> Self {
        self.config.max_entries = max_entries;
        self
    }

    /// Create the image file
    pub fn build(self) -> Result<Image> {
        let path = self
            .path
            .ok_or_else(|| ImageError::InvalidConfig("path must be set".to_string()))?;

        info!("Building image at {:?}", path);
        Image::create_with_config(path, &self.config)
    }
}
