//! Image geometry configuration
//!
//! Geometry can be given in code or loaded from TOML:
//!
//! ```toml
//! total_size = 16777216
//! block_size = 4096
//! header_size = 1024
//! max_entries = 1000
//! ```
//!
//! Missing keys fall back to the defaults.

use crate::directory::SLOT_WIDTH;
use crate::error::Result;
use crate::layout::{
    compute_layout, Layout, DEFAULT_BLOCK_SIZE, DEFAULT_HEADER_SIZE, DEFAULT_MAX_ENTRIES,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// 16 MiB
pub const DEFAULT_TOTAL_SIZE: u64 = 16 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    /// Size of the whole image file in bytes
    pub total_size: u64,
    pub block_size: u32,
    pub header_size: u32,
    /// Number of directory slots
    pub max_entries: u32,
}

impl ImageConfig {
    /// Default geometry with the given image size
    pub fn new(total_size: u64) -> Self {
        ImageConfig {
            total_size,
            ..Self::default()
        }
    }

    pub fn from_toml_str(source: &str) -> Result<Self> {
        Ok(toml::from_str(source)?)
    }

    /// Read a TOML configuration file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    /// Compute the region layout this configuration describes
    pub fn layout(&self) -> Result<Layout> {
        compute_layout(
            self.total_size,
            self.block_size,
            self.header_size,
            self.max_entries,
            SLOT_WIDTH as u32,
        )
    }
}

impl Default for ImageConfig {
    fn default() -> Self {
        ImageConfig {
            total_size: DEFAULT_TOTAL_SIZE,
            block_size: DEFAULT_BLOCK_SIZE,
            header_size: DEFAULT_HEADER_SIZE,
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }
}
