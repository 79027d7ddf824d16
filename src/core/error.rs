use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("Image size {size} too small: header, table and directory need more than {minimum} bytes")]
    SizeTooSmall { size: u64, minimum: u64 },

    #[error("Invalid image configuration: {0}")]
    InvalidConfig(String),

    #[error("File name is {len} bytes long (maximum {max})")]
    NameTooLong { len: usize, max: usize },

    #[error("Invalid file name: {0:?}")]
    InvalidName(String),

    #[error("File already exists: {0}")]
    NameConflict(String),

    #[error("Insufficient space: {requested} bytes requested, {available} bytes free")]
    InsufficientSpace { requested: u64, available: u64 },

    #[error("Out of space: {requested} blocks requested, {available} free")]
    NoSpace { requested: usize, available: usize },

    #[error("Directory full: no free slot left")]
    DirectoryFull,

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("File is protected against removal: {0}")]
    Protected(String),

    #[error("Corrupt block chain starting at block {start}: {reason}")]
    CorruptChain { start: u32, reason: String },

    #[error("Invalid allocation table value at block {index}: {value:#x}")]
    InvalidEntryValue { index: u32, value: u32 },

    #[error("Invalid magic number in header")]
    InvalidMagic,

    #[error("Unsupported format version: {major}.{minor}")]
    UnsupportedVersion { major: u16, minor: u16 },

    #[error("Header checksum mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    ChecksumMismatch { stored: u32, computed: u32 },

    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration parse error: {0}")]
    Config(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, ImageError>;

impl ImageError {
    pub(crate) fn corrupt(start: u32, reason: impl Into<String>) -> Self {
        ImageError::CorruptChain {
            start,
            reason: reason.into(),
        }
    }
}
