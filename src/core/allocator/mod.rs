//! Block allocation for image files
//!
//! Blocks are tracked by a linked allocation table: one entry per data
//! block, each entry either free, pointing at the next block of a file, or
//! terminating a chain.

pub mod table;

use crate::error::Result;

/// Block allocator trait
///
/// Defines the interface for reserving and releasing data blocks.
pub trait BlockAllocator {
    /// Allocate blocks for a given size in bytes
    ///
    /// Returns the block indices in chain order, already linked.
    fn allocate(&mut self, size: u64) -> Result<Vec<u32>>;

    /// Release every block of the chain starting at `start`
    fn free(&mut self, start: u32) -> Result<Vec<u32>>;

    /// Calculate fragmentation score (0.0 = every chain contiguous)
    fn fragmentation_score(&self) -> f64;

    /// Get total number of blocks managed
    fn total_blocks(&self) -> usize;

    /// Get number of free blocks available
    fn free_blocks(&self) -> usize;
}
