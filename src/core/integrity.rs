//! Consistency scan across the allocation table and directory
//!
//! Import writes the table before the directory slot and delete clears the
//! slot before writing the table, so an interrupted operation leaves at
//! worst blocks that are allocated but owned by no file. The scan finds
//! those along with genuinely corrupt state.

use crate::allocator::table::AllocationTable;
use crate::directory::Directory;
use crate::layout::Layout;
use serde::Serialize;
use tracing::warn;

/// File whose chain cannot be walked
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CorruptFile {
    pub name: String,
    pub first_block: u32,
    pub reason: String,
}

/// Result of [`scan`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IntegrityReport {
    pub files_checked: usize,
    pub corrupt_files: Vec<CorruptFile>,
    /// Files whose chain length does not cover their recorded size exactly
    pub size_mismatches: Vec<String>,
    /// Blocks reachable from more than one file
    pub shared_blocks: Vec<u32>,
    /// Allocated blocks no file reaches
    pub orphaned_blocks: Vec<u32>,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.corrupt_files.is_empty()
            && self.size_mismatches.is_empty()
            && self.shared_blocks.is_empty()
            && self.orphaned_blocks.is_empty()
    }
}

/// Walk every file chain and cross-check it against the table
pub fn scan(table: &AllocationTable, directory: &Directory, layout: &Layout) -> IntegrityReport {
    let mut report = IntegrityReport::default();
    // Slot index of the file that reached each block first
    let mut owner: Vec<Option<usize>> = vec![None; table.block_count() as usize];

    for (slot, entry) in directory.entries() {
        report.files_checked += 1;

        let Some(start) = entry.first_block else {
            if entry.size != 0 {
                report.size_mismatches.push(entry.name.clone());
            }
            continue;
        };

        let mut length = 0u64;
        let mut broken = None;

        for step in table.walk(start) {
            match step {
                Ok(block) => {
                    length += 1;
                    match owner[block as usize] {
                        None => owner[block as usize] = Some(slot),
                        Some(other) if other != slot => {
                            if !report.shared_blocks.contains(&block) {
                                report.shared_blocks.push(block);
                            }
                        }
                        Some(_) => {}
                    }
                }
                Err(e) => broken = Some(e.to_string()),
            }
        }

        if let Some(reason) = broken {
            warn!("Corrupt chain for {}: {}", entry.name, reason);
            report.corrupt_files.push(CorruptFile {
                name: entry.name.clone(),
                first_block: start,
                reason,
            });
        } else if length != layout.blocks_for(entry.size as u64) {
            report.size_mismatches.push(entry.name.clone());
        }
    }

    report.orphaned_blocks = table
        .entries()
        .iter()
        .enumerate()
        .filter(|(index, entry)| !entry.is_free() && owner[*index].is_none())
        .map(|(index, _)| index as u32)
        .collect();

    if !report.shared_blocks.is_empty() {
        warn!("{} blocks are shared between files", report.shared_blocks.len());
    }
    if !report.orphaned_blocks.is_empty() {
        warn!("{} allocated blocks belong to no file", report.orphaned_blocks.len());
    }

    report
}
