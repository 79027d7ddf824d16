//! Image format and operations
//!
//! - [`layout`] - Region geometry computed from the image size
//! - [`header`] - On-disk header carrying the geometry
//! - [`io`] - Positioned reads and writes on the image file
//! - [`allocator`] - Allocation table and block chains
//! - [`directory`] - Fixed-width directory slots
//! - [`integrity`] - Cross-checks between table and directory
//! - [`config`] - Geometry configuration (TOML)
//! - [`image`] - User-visible file operations

pub mod allocator;
pub mod config;
pub mod directory;
pub mod error;
pub mod header;
pub mod image;
pub mod integrity;
pub mod io;
pub mod layout;

pub use image::{FileInfo, Image, ImageStats, Listing, ListingIter};
