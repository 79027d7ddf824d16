//! Image operations
//!
//! Combines layout, allocation table and directory into the user-visible
//! operations on an image file. Nothing is cached between calls: every
//! operation re-reads the table and directory from the image, so the file
//! on disk is always the only state.

use crate::allocator::table::AllocationTable;
use crate::allocator::BlockAllocator;
use crate::config::ImageConfig;
use crate::directory::{validate_name, DirEntry, Directory};
use crate::error::{ImageError, Result};
use crate::integrity::{self, IntegrityReport};
use crate::io::ImageFile;
use crate::layout::Layout;
use parking_lot::Mutex;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Listing entry for one stored file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileInfo {
    pub name: String,
    pub size: u64,
    pub first_block: Option<u32>,
    pub protected: bool,
}

impl From<&DirEntry> for FileInfo {
    fn from(entry: &DirEntry) -> Self {
        FileInfo {
            name: entry.name.clone(),
            size: entry.size as u64,
            first_block: entry.first_block,
            protected: entry.is_protected(),
        }
    }
}

/// Snapshot of the directory taken by [`Image::list`]
///
/// Iterating is lazy and can be repeated; each pass walks the slots in
/// storage order and yields the occupied ones.
#[derive(Debug, Clone)]
pub struct Listing {
    directory: Directory,
}

impl Listing {
    pub fn iter(&self) -> ListingIter<'_> {
        ListingIter {
            slots: self.directory.slots().iter(),
        }
    }

    pub fn len(&self) -> usize {
        self.directory.len()
    }

    pub fn is_empty(&self) -> bool {
        self.directory.is_empty()
    }
}

impl<'a> IntoIterator for &'a Listing {
    type Item = FileInfo;
    type IntoIter = ListingIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

pub struct ListingIter<'a> {
    slots: std::slice::Iter<'a, Option<DirEntry>>,
}

impl Iterator for ListingIter<'_> {
    type Item = FileInfo;

    fn next(&mut self) -> Option<Self::Item> {
        self.slots
            .find_map(|slot| slot.as_ref().map(FileInfo::from))
    }
}

/// Image statistics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageStats {
    pub total_blocks: u64,
    pub free_blocks: u64,
    pub used_blocks: u64,
    pub free_bytes: u64,
    pub file_count: usize,
    pub fragmentation: f64,
}

/// An open image file
///
/// Only [`Image::create`] and [`Image::open`] produce an `Image`, so every
/// operation runs against an image whose layout is known. The file handle
/// sits behind a mutex held for the whole of each operation; an `Image`
/// shared between threads serializes its operations.
pub struct Image {
    layout: Layout,
    file: Mutex<ImageFile>,
}

impl Image {
    /// Create a new image with the default geometry
    ///
    /// Truncates any existing file at `path`.
    pub fn create<P: AsRef<Path>>(path: P, total_size: u64) -> Result<Self> {
        Self::create_with_config(path, &ImageConfig::new(total_size))
    }

    /// Create a new image with a custom geometry
    pub fn create_with_config<P: AsRef<Path>>(path: P, config: &ImageConfig) -> Result<Self> {
        let layout = config.layout()?;
        info!(
            "Creating image at {:?}: {} bytes, {} blocks of {} bytes, {} directory slots",
            path.as_ref(),
            layout.total_size,
            layout.block_count,
            layout.block_size,
            layout.max_entries
        );

        let file = ImageFile::create(path, &layout)?;

        Ok(Image {
            layout,
            file: Mutex::new(file),
        })
    }

    /// Open an existing image
    ///
    /// The layout comes from the stored header, never from the caller.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = ImageFile::open(&path)?;
        let header = file.read_header()?;
        let layout = header.layout()?;

        let len = file.file_len()?;
        if len < layout.total_size {
            return Err(ImageError::InvalidHeader(format!(
                "image file is {} bytes, header declares {}",
                len, layout.total_size
            )));
        }

        info!(
            "Opened image at {:?}: {} blocks of {} bytes",
            path.as_ref(),
            layout.block_count,
            layout.block_size
        );

        Ok(Image {
            layout,
            file: Mutex::new(file),
        })
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn path(&self) -> PathBuf {
        self.file.lock().path().to_path_buf()
    }

    /// Store `data` as a new file called `name`
    ///
    /// Every capacity check runs before the first write. Payload blocks are
    /// written first, then the table, then the directory slot, so an
    /// interruption can leave an unowned chain but never a slot pointing at
    /// free blocks.
    pub fn import_file(&self, data: &[u8], name: &str) -> Result<()> {
        validate_name(name)?;
        debug!("Importing {} bytes as {}", data.len(), name);

        let layout = &self.layout;
        let mut guard = self.file.lock();
        let file = &mut *guard;

        let mut table = AllocationTable::load(file, layout)?;
        let mut directory = Directory::load_all(file, layout)?;

        if directory.find_by_name(name).is_ok() {
            return Err(ImageError::NameConflict(name.to_string()));
        }

        let available = table.free_count() as u64 * layout.block_size as u64;
        if data.len() as u64 > available {
            return Err(ImageError::InsufficientSpace {
                requested: data.len() as u64,
                available,
            });
        }

        let blocks = table.find_free(layout.blocks_for(data.len() as u64) as usize)?;
        let slot = directory.find_free_slot()?;

        table.link_chain(&blocks);
        for (&block, chunk) in blocks.iter().zip(data.chunks(layout.block_size as usize)) {
            file.write_block(layout, block, chunk)?;
        }
        table.store(file, layout)?;

        let entry = DirEntry::new(name, data.len() as u32, blocks.first().copied());
        directory.write_slot(file, slot, entry)?;

        debug!("Imported {} into slot {} using {} blocks", name, slot, blocks.len());
        Ok(())
    }

    /// Copy a host file into the image
    pub fn import_path<P: AsRef<Path>>(&self, source: P, name: &str) -> Result<()> {
        let data = std::fs::read(source)?;
        self.import_file(&data, name)
    }

    /// Write the content of `name` to `destination`
    ///
    /// Exactly `size` bytes are written; the unused tail of the last block
    /// is dropped. Returns the number of bytes written.
    pub fn export_file<W: Write>(&self, name: &str, destination: &mut W) -> Result<u64> {
        debug!("Exporting {}", name);

        let layout = &self.layout;
        let mut guard = self.file.lock();
        let file = &mut *guard;

        let directory = Directory::load_all(file, layout)?;
        let (_, entry) = directory.find_by_name(name)?;

        let Some(start) = entry.first_block else {
            if entry.size != 0 {
                return Err(ImageError::corrupt(
                    crate::directory::NO_BLOCK,
                    format!("{} records {} bytes but owns no blocks", name, entry.size),
                ));
            }
            return Ok(0);
        };

        let table = AllocationTable::load(file, layout)?;
        let chain = table.chain(start)?;

        let expected = layout.blocks_for(entry.size as u64);
        if chain.len() as u64 != expected {
            return Err(ImageError::corrupt(
                start,
                format!(
                    "chain has {} blocks, {} bytes need {}",
                    chain.len(),
                    entry.size,
                    expected
                ),
            ));
        }

        let mut remaining = entry.size as usize;
        for block in chain {
            let data = file.read_block(layout, block)?;
            let take = remaining.min(data.len());
            destination.write_all(&data[..take])?;
            remaining -= take;
        }

        Ok(entry.size as u64)
    }

    /// Copy a stored file out to a host path
    ///
    /// The destination is only created once the content has been read.
    pub fn export_to_path<P: AsRef<Path>>(&self, name: &str, destination: P) -> Result<u64> {
        let data = self.read_file(name)?;
        std::fs::write(destination, &data)?;
        Ok(data.len() as u64)
    }

    /// Read a stored file into memory
    pub fn read_file(&self, name: &str) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        self.export_file(name, &mut buffer)?;
        Ok(buffer)
    }

    /// Rename a file in place
    ///
    /// Renaming onto a name held by another file fails with `NameConflict`;
    /// renaming a file to its own name does nothing.
    pub fn rename(&self, old_name: &str, new_name: &str) -> Result<()> {
        validate_name(new_name)?;
        debug!("Renaming {} to {}", old_name, new_name);

        let mut guard = self.file.lock();
        let file = &mut *guard;

        let mut directory = Directory::load_all(file, &self.layout)?;
        let (slot, entry) = directory.find_by_name(old_name)?;
        if old_name == new_name {
            return Ok(());
        }

        let mut renamed = entry.clone();
        if directory.find_by_name(new_name).is_ok() {
            return Err(ImageError::NameConflict(new_name.to_string()));
        }

        renamed.name = new_name.to_string();
        directory.write_slot(file, slot, renamed)
    }

    /// Remove a file and release its blocks
    ///
    /// The chain is validated and freed in memory first, then the slot is
    /// cleared, then the table is written.
    pub fn delete(&self, name: &str) -> Result<()> {
        debug!("Deleting {}", name);

        let layout = &self.layout;
        let mut guard = self.file.lock();
        let file = &mut *guard;

        let mut directory = Directory::load_all(file, layout)?;
        let (slot, entry) = directory.find_by_name(name)?;
        if entry.is_protected() {
            return Err(ImageError::Protected(name.to_string()));
        }

        let mut table = AllocationTable::load(file, layout)?;
        let freed = match entry.first_block {
            Some(start) => table.free(start)?,
            None => Vec::new(),
        };

        directory.clear_slot(file, slot)?;
        if !freed.is_empty() {
            table.store(file, layout)?;
        }

        debug!("Deleted {}, released {} blocks", name, freed.len());
        Ok(())
    }

    /// Set or clear the removal protection of a file
    pub fn protect(&self, name: &str, enabled: bool) -> Result<()> {
        debug!("Setting protection of {} to {}", name, enabled);

        let mut guard = self.file.lock();
        let file = &mut *guard;

        let mut directory = Directory::load_all(file, &self.layout)?;
        let (slot, entry) = directory.find_by_name(name)?;

        let mut updated = entry.clone();
        updated.set_protected(enabled);
        directory.write_slot(file, slot, updated)
    }

    /// List stored files in directory order
    pub fn list(&self) -> Result<Listing> {
        let mut guard = self.file.lock();
        let directory = Directory::load_all(&mut guard, &self.layout)?;
        Ok(Listing { directory })
    }

    /// Get the listing entry of one file
    pub fn metadata(&self, name: &str) -> Result<FileInfo> {
        let mut guard = self.file.lock();
        let directory = Directory::load_all(&mut guard, &self.layout)?;
        let (_, entry) = directory.find_by_name(name)?;
        Ok(FileInfo::from(entry))
    }

    pub fn exists(&self, name: &str) -> Result<bool> {
        match self.metadata(name) {
            Ok(_) => Ok(true),
            Err(ImageError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Free bytes: free blocks × block size
    pub fn free_space(&self) -> Result<u64> {
        let mut guard = self.file.lock();
        let table = AllocationTable::load(&mut guard, &self.layout)?;
        Ok(table.free_count() as u64 * self.layout.block_size as u64)
    }

    /// Get image statistics
    pub fn stats(&self) -> Result<ImageStats> {
        let mut guard = self.file.lock();
        let file = &mut *guard;

        let table = AllocationTable::load(file, &self.layout)?;
        let directory = Directory::load_all(file, &self.layout)?;

        let total_blocks = table.total_blocks() as u64;
        let free_blocks = table.free_blocks() as u64;

        Ok(ImageStats {
            total_blocks,
            free_blocks,
            used_blocks: total_blocks - free_blocks,
            free_bytes: free_blocks * self.layout.block_size as u64,
            file_count: directory.len(),
            fragmentation: table.fragmentation_score(),
        })
    }

    /// Cross-check every file chain against the allocation table
    pub fn verify(&self) -> Result<IntegrityReport> {
        let mut guard = self.file.lock();
        let file = &mut *guard;

        let table = AllocationTable::load(file, &self.layout)?;
        let directory = Directory::load_all(file, &self.layout)?;

        Ok(integrity::scan(&table, &directory, &self.layout))
    }

    /// Free blocks that are allocated but owned by no file
    ///
    /// Refuses to touch the table while any file chain is corrupt, since
    /// the ownership of its blocks is unknown. Returns the number of blocks
    /// released.
    pub fn reclaim_orphans(&self) -> Result<usize> {
        let mut guard = self.file.lock();
        let file = &mut *guard;

        let mut table = AllocationTable::load(file, &self.layout)?;
        let directory = Directory::load_all(file, &self.layout)?;
        let report = integrity::scan(&table, &directory, &self.layout);

        if let Some(corrupt) = report.corrupt_files.first() {
            return Err(ImageError::corrupt(
                corrupt.first_block,
                format!("{}: {}", corrupt.name, corrupt.reason),
            ));
        }

        let reclaimed = report
            .orphaned_blocks
            .iter()
            .filter(|&&block| table.release(block))
            .count();

        if reclaimed > 0 {
            table.store(file, &self.layout)?;
            warn!("Reclaimed {} orphaned blocks", reclaimed);
        }

        Ok(reclaimed)
    }

    /// Flush the image file to stable storage
    pub fn sync(&self) -> Result<()> {
        self.file.lock().sync()
    }
}
