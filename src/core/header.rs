use crate::error::{ImageError, Result};
use crate::layout::{compute_layout, Layout};

pub const MAGIC: [u8; 8] = *b"CHFS\x00\x01\x00\x00";
pub const VERSION_MAJOR: u16 = 1;
pub const VERSION_MINOR: u16 = 0;

/// Number of meaningful bytes at the start of the header region
pub const HEADER_FIELDS_LEN: usize = 40;

/// Bytes covered by the header checksum
const CHECKSUM_COVERAGE: usize = 36;

/// Image header (offset 0)
///
/// The first four fields sit at the very start of the region so the
/// geometry can be read without knowing the format version. The rest of
/// the region up to `header_size` is zero padding.
///
/// ```text
/// 0..4    total_size     u32 LE
/// 4..8    block_size     u32 LE
/// 8..12   header_size    u32 LE
/// 12..16  data_offset    u32 LE
/// 16..24  magic          "CHFS\x00\x01\x00\x00"
/// 24..26  version_major  u16 LE
/// 26..28  version_minor  u16 LE
/// 28..32  max_entries    u32 LE
/// 32..36  slot_width     u32 LE
/// 36..40  checksum       CRC-32 of bytes 0..36
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub total_size: u32,
    pub block_size: u32,
    pub header_size: u32,
    pub data_offset: u32,
    pub magic: [u8; 8],
    pub version_major: u16,
    pub version_minor: u16,
    pub max_entries: u32,
    pub slot_width: u32,
}

impl Header {
    /// Build the header describing `layout`
    pub fn from_layout(layout: &Layout) -> Self {
        Header {
            total_size: layout.total_size as u32,
            block_size: layout.block_size,
            header_size: layout.header_size,
            data_offset: layout.data_offset as u32,
            magic: MAGIC,
            version_major: VERSION_MAJOR,
            version_minor: VERSION_MINOR,
            max_entries: layout.max_entries,
            slot_width: layout.slot_width,
        }
    }

    /// Validate the header magic and version
    pub fn validate(&self) -> Result<()> {
        if self.magic != MAGIC {
            return Err(ImageError::InvalidMagic);
        }

        // Exact match for now
        if self.version_major != VERSION_MAJOR || self.version_minor != VERSION_MINOR {
            return Err(ImageError::UnsupportedVersion {
                major: self.version_major,
                minor: self.version_minor,
            });
        }

        Ok(())
    }

    /// Rebuild the layout from the stored geometry
    ///
    /// The stored data offset must agree with the recomputed one, otherwise
    /// the regions cannot be trusted.
    pub fn layout(&self) -> Result<Layout> {
        let layout = compute_layout(
            self.total_size as u64,
            self.block_size,
            self.header_size,
            self.max_entries,
            self.slot_width,
        )
        .map_err(|e| ImageError::InvalidHeader(e.to_string()))?;

        if layout.data_offset != self.data_offset as u64 {
            return Err(ImageError::InvalidHeader(format!(
                "stored data offset {} does not match computed {}",
                self.data_offset, layout.data_offset
            )));
        }

        Ok(layout)
    }

    /// Serialize the header to a full header region
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.header_size as usize);

        bytes.extend_from_slice(&self.total_size.to_le_bytes());
        bytes.extend_from_slice(&self.block_size.to_le_bytes());
        bytes.extend_from_slice(&self.header_size.to_le_bytes());
        bytes.extend_from_slice(&self.data_offset.to_le_bytes());
        bytes.extend_from_slice(&self.magic);
        bytes.extend_from_slice(&self.version_major.to_le_bytes());
        bytes.extend_from_slice(&self.version_minor.to_le_bytes());
        bytes.extend_from_slice(&self.max_entries.to_le_bytes());
        bytes.extend_from_slice(&self.slot_width.to_le_bytes());

        let checksum = crc32fast::hash(&bytes[..CHECKSUM_COVERAGE]);
        bytes.extend_from_slice(&checksum.to_le_bytes());

        // Pad to the header region size
        bytes.resize((self.header_size as usize).max(HEADER_FIELDS_LEN), 0);

        bytes
    }

    /// Deserialize and validate a header
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_FIELDS_LEN {
            return Err(ImageError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "Insufficient bytes for header",
            )));
        }

        let u32_at = |offset: usize| {
            u32::from_le_bytes([
                bytes[offset],
                bytes[offset + 1],
                bytes[offset + 2],
                bytes[offset + 3],
            ])
        };
        let u16_at = |offset: usize| u16::from_le_bytes([bytes[offset], bytes[offset + 1]]);

        let mut magic = [0u8; 8];
        magic.copy_from_slice(&bytes[16..24]);

        let header = Header {
            total_size: u32_at(0),
            block_size: u32_at(4),
            header_size: u32_at(8),
            data_offset: u32_at(12),
            magic,
            version_major: u16_at(24),
            version_minor: u16_at(26),
            max_entries: u32_at(28),
            slot_width: u32_at(32),
        };

        header.validate()?;

        let stored = u32_at(CHECKSUM_COVERAGE);
        let computed = crc32fast::hash(&bytes[..CHECKSUM_COVERAGE]);
        if stored != computed {
            return Err(ImageError::ChecksumMismatch { stored, computed });
        }

        Ok(header)
    }
}
