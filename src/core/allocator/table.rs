//! Linked allocation table
//!
//! On disk each entry is a little-endian `u32`:
//! - `0` = free block
//! - `1..block_count` = next block of the chain
//! - `0xFFFFFFFF` = last block of the chain
//!
//! Block 0 can start a chain but never follow another block, since its
//! index would alias the free sentinel. First-fit allocation hands out
//! ascending indices, so successors are always greater than zero.

use crate::allocator::BlockAllocator;
use crate::error::{ImageError, Result};
use crate::io::ImageFile;
use crate::layout::{Layout, TABLE_ENTRY_SIZE};

pub const FREE_VALUE: u32 = 0;
pub const END_VALUE: u32 = u32::MAX;

/// State of a single data block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableEntry {
    /// Block is unused
    Free,
    /// Block holds file data, chain continues at the given block
    Next(u32),
    /// Block holds file data and ends its chain
    End,
}

impl TableEntry {
    /// Decode a raw table value
    pub fn decode(raw: u32) -> Self {
        match raw {
            FREE_VALUE => TableEntry::Free,
            END_VALUE => TableEntry::End,
            next => TableEntry::Next(next),
        }
    }

    /// Encode the entry stored at `index` of a table with `block_count` entries
    pub fn encode(self, index: u32, block_count: u32) -> Result<u32> {
        match self {
            TableEntry::Free => Ok(FREE_VALUE),
            TableEntry::End => Ok(END_VALUE),
            TableEntry::Next(next) if next == FREE_VALUE || next >= block_count => {
                Err(ImageError::InvalidEntryValue { index, value: next })
            }
            TableEntry::Next(next) => Ok(next),
        }
    }

    #[inline]
    pub fn is_free(&self) -> bool {
        matches!(self, TableEntry::Free)
    }
}

/// In-memory copy of the allocation table
///
/// Loaded fresh for every image operation and written back as a whole.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationTable {
    entries: Vec<TableEntry>,
    block_size: u32,
}

impl AllocationTable {
    /// Create a table with every block free
    pub fn new(block_count: u32, block_size: u32) -> Self {
        AllocationTable {
            entries: vec![TableEntry::Free; block_count as usize],
            block_size,
        }
    }

    /// Wrap an existing entry sequence
    pub fn from_entries(entries: Vec<TableEntry>, block_size: u32) -> Self {
        AllocationTable {
            entries,
            block_size,
        }
    }

    /// Decode the table region of an image
    pub fn load(file: &mut ImageFile, layout: &Layout) -> Result<Self> {
        let len = layout.block_count as usize * TABLE_ENTRY_SIZE as usize;
        let bytes = file.read_region(layout.table_offset, len)?;

        let entries = bytes
            .chunks_exact(TABLE_ENTRY_SIZE as usize)
            .map(|raw| TableEntry::decode(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]])))
            .collect();

        Ok(AllocationTable {
            entries,
            block_size: layout.block_size,
        })
    }

    /// Overwrite the table region with one contiguous write
    ///
    /// Every entry is encoded before anything touches the file, so an
    /// invalid entry leaves the stored table untouched.
    pub fn store(&self, file: &mut ImageFile, layout: &Layout) -> Result<()> {
        if self.entries.len() != layout.block_count as usize {
            return Err(ImageError::InvalidHeader(format!(
                "table holds {} entries, layout expects {}",
                self.entries.len(),
                layout.block_count
            )));
        }

        let block_count = self.entries.len() as u32;
        let mut bytes = Vec::with_capacity(self.entries.len() * TABLE_ENTRY_SIZE as usize);
        for (index, entry) in self.entries.iter().enumerate() {
            let raw = entry.encode(index as u32, block_count)?;
            bytes.extend_from_slice(&raw.to_le_bytes());
        }

        file.write_at(layout.table_offset, &bytes)
    }

    pub fn entries(&self) -> &[TableEntry] {
        &self.entries
    }

    pub fn get(&self, index: u32) -> Option<TableEntry> {
        self.entries.get(index as usize).copied()
    }

    pub fn block_count(&self) -> u32 {
        self.entries.len() as u32
    }

    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    /// Number of free blocks
    pub fn free_count(&self) -> usize {
        self.entries.iter().filter(|entry| entry.is_free()).count()
    }

    /// First `count` free blocks in ascending order
    pub fn find_free(&self, count: usize) -> Result<Vec<u32>> {
        let found: Vec<u32> = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.is_free())
            .map(|(index, _)| index as u32)
            .take(count)
            .collect();

        if found.len() < count {
            return Err(ImageError::NoSpace {
                requested: count,
                available: found.len(),
            });
        }

        Ok(found)
    }

    /// Link `indices` into a chain in the given order
    ///
    /// All indices must be in range.
    pub fn link_chain(&mut self, indices: &[u32]) {
        for pair in indices.windows(2) {
            self.entries[pair[0] as usize] = TableEntry::Next(pair[1]);
        }
        if let Some(&last) = indices.last() {
            self.entries[last as usize] = TableEntry::End;
        }
    }

    /// Lazily follow the chain starting at `start`
    pub fn walk(&self, start: u32) -> ChainWalk<'_> {
        ChainWalk {
            table: self,
            start,
            next: Some(start),
            steps: 0,
        }
    }

    /// Collect the full chain starting at `start`
    pub fn chain(&self, start: u32) -> Result<Vec<u32>> {
        self.walk(start).collect()
    }

    /// Reset every block of the chain starting at `start` to free
    ///
    /// The chain is validated completely before any entry changes.
    pub fn free_chain(&mut self, start: u32) -> Result<Vec<u32>> {
        let chain = self.chain(start)?;
        for &index in &chain {
            self.entries[index as usize] = TableEntry::Free;
        }
        Ok(chain)
    }

    /// Mark a single block free, returning whether it was allocated
    pub fn release(&mut self, index: u32) -> bool {
        match self.entries.get_mut(index as usize) {
            Some(entry) if !entry.is_free() => {
                *entry = TableEntry::Free;
                true
            }
            _ => false,
        }
    }
}

impl BlockAllocator for AllocationTable {
    fn allocate(&mut self, size: u64) -> Result<Vec<u32>> {
        let count = size.div_ceil(self.block_size as u64) as usize;
        let indices = self.find_free(count)?;
        self.link_chain(&indices);
        Ok(indices)
    }

    fn free(&mut self, start: u32) -> Result<Vec<u32>> {
        self.free_chain(start)
    }

    fn fragmentation_score(&self) -> f64 {
        // Share of links that jump somewhere other than the following block
        let mut links = 0usize;
        let mut jumps = 0usize;

        for (index, entry) in self.entries.iter().enumerate() {
            if let TableEntry::Next(next) = entry {
                links += 1;
                if *next as usize != index + 1 {
                    jumps += 1;
                }
            }
        }

        if links == 0 {
            0.0
        } else {
            jumps as f64 / links as f64
        }
    }

    fn total_blocks(&self) -> usize {
        self.entries.len()
    }

    fn free_blocks(&self) -> usize {
        self.free_count()
    }
}

/// Iterator over the blocks of one chain
///
/// Yields at most `block_count` blocks; a longer walk means the chain loops
/// back on itself. After an error the iterator is exhausted.
pub struct ChainWalk<'a> {
    table: &'a AllocationTable,
    start: u32,
    next: Option<u32>,
    steps: usize,
}

impl Iterator for ChainWalk<'_> {
    type Item = Result<u32>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next.take()?;

        if self.steps >= self.table.entries.len() {
            return Some(Err(ImageError::corrupt(
                self.start,
                format!("cycle detected after {} blocks", self.steps),
            )));
        }

        match self.table.get(current) {
            None => Some(Err(ImageError::corrupt(
                self.start,
                format!(
                    "block {} out of range ({} blocks)",
                    current,
                    self.table.entries.len()
                ),
            ))),
            Some(TableEntry::Free) => Some(Err(ImageError::corrupt(
                self.start,
                format!("block {} is marked free", current),
            ))),
            Some(entry) => {
                if let TableEntry::Next(next) = entry {
                    self.next = Some(next);
                }
                self.steps += 1;
                Some(Ok(current))
            }
        }
    }
}
