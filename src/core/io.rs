//! Disk I/O operations for image files

use crate::error::{ImageError, Result};
use crate::header::{Header, HEADER_FIELDS_LEN};
use crate::layout::Layout;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Disk-backed image storage
///
/// Positioned reads and writes over the container file. Knows nothing about
/// tables or directories; callers pass offsets derived from a [`Layout`].
pub struct ImageFile {
    file: File,
    path: PathBuf,
}

impl ImageFile {
    /// Create a new image file
    ///
    /// Writes the header region and extends the file with zeros up to
    /// `layout.total_size`, which leaves table, directory and data regions
    /// zero-filled.
    pub fn create<P: AsRef<Path>>(path: P, layout: &Layout) -> Result<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;

        file.write_all(&Header::from_layout(layout).to_bytes())?;
        file.set_len(layout.total_size)?;
        file.flush()?;

        Ok(ImageFile {
            file,
            path: path.as_ref().to_path_buf(),
        })
    }

    /// Open an existing image file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(&path)?;

        Ok(ImageFile {
            file,
            path: path.as_ref().to_path_buf(),
        })
    }

    /// Read and validate the header
    pub fn read_header(&mut self) -> Result<Header> {
        let mut buffer = vec![0u8; HEADER_FIELDS_LEN];
        self.read_at(0, &mut buffer)?;
        Header::from_bytes(&buffer)
    }

    /// Fill `buffer` from `offset`
    pub fn read_at(&mut self, offset: u64, buffer: &mut [u8]) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(buffer)?;
        Ok(())
    }

    /// Write `data` at `offset`
    pub fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(data)?;
        self.file.flush()?;
        Ok(())
    }

    /// Read `len` bytes starting at `offset`
    pub fn read_region(&mut self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let mut buffer = vec![0u8; len];
        self.read_at(offset, &mut buffer)?;
        Ok(buffer)
    }

    /// Read one full data block
    pub fn read_block(&mut self, layout: &Layout, index: u32) -> Result<Vec<u8>> {
        self.check_block(layout, index)?;
        self.read_region(layout.block_offset(index), layout.block_size as usize)
    }

    /// Write one data block
    ///
    /// Shorter payloads are zero-padded to the block size.
    pub fn write_block(&mut self, layout: &Layout, index: u32, data: &[u8]) -> Result<()> {
        self.check_block(layout, index)?;

        let block_size = layout.block_size as usize;
        if data.len() > block_size {
            return Err(ImageError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!(
                    "Block data must be at most {} bytes, got {}",
                    block_size,
                    data.len()
                ),
            )));
        }

        let mut block = vec![0u8; block_size];
        block[..data.len()].copy_from_slice(data);
        self.write_at(layout.block_offset(index), &block)
    }

    fn check_block(&self, layout: &Layout, index: u32) -> Result<()> {
        if index >= layout.block_count {
            return Err(ImageError::corrupt(
                index,
                format!("block index beyond the {} data blocks", layout.block_count),
            ));
        }
        Ok(())
    }

    /// Current length of the container file
    pub fn file_len(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    /// Get file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sync all writes to disk
    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }
}
