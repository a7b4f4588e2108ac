use std::path::PathBuf;
use thiserror::Error;

pub type BlockIndex = u32;

pub const DEFAULT_BLOCK_SIZE: u32 = 4096;
pub const DEFAULT_BLOCK_COUNT: u32 = 16;
pub const DEFAULT_READ_SIZE: u32 = 16;
pub const DEFAULT_PROG_SIZE: u32 = 16;

pub const ERASE_SENTINEL: u8 = 0xFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub block_size: u32,
    pub block_count: u32,
    pub read_size: u32,
    pub prog_size: u32,
}

impl Geometry {
    pub fn new(
        block_size: u32,
        block_count: u32,
        read_size: u32,
        prog_size: u32,
    ) -> Result<Self, ImageError> {
        if block_size == 0 || block_count == 0 || read_size == 0 || prog_size == 0 {
            return Err(ImageError::InvalidGeometry {
                block_size,
                block_count,
            });
        }
        Ok(Self {
            block_size,
            block_count,
            read_size,
            prog_size,
        })
    }

    #[inline]
    pub fn image_len(&self) -> usize {
        self.block_size as usize * self.block_count as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockClass {
    Blank,
    Printable,
    Binary,
}

impl std::fmt::Display for BlockClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlockClass::Blank => write!(f, "blank"),
            BlockClass::Printable => write!(f, "printable"),
            BlockClass::Binary => write!(f, "binary"),
        }
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagLabel {
    FileEntry,
    DirEntry,
    Superblock,
    Unknown,
}

impl std::fmt::Display for TagLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TagLabel::FileEntry => write!(f, "File entry"),
            TagLabel::DirEntry => write!(f, "Directory entry"),
            TagLabel::Superblock => write!(f, "Superblock"),
            TagLabel::Unknown => write!(f, "Unknown type"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagGuess {
    pub raw_tag: u32,
    pub tag_type: u8,
    pub label: TagLabel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
}

#[derive(Debug, Clone)]
pub struct DirEntry {
    pub name: String,
    pub kind: EntryKind,
    pub size: u64,
    pub pair: [BlockIndex; 2],
}

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("failed to open image file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read image file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid geometry: block_size={block_size} block_count={block_count} (all sizes must be positive)")]
    InvalidGeometry { block_size: u32, block_count: u32 },
    #[error("block {index} out of range (image has {count} blocks)")]
    OutOfRange { index: BlockIndex, count: u32 },
    #[error("block too short for a tag: {len} bytes")]
    Truncated { len: usize },
}

#[derive(Debug, Error)]
pub enum MountError {
    #[error("no littlefs superblock entry in blocks 0-1")]
    NoSuperblock,
    #[error("unsupported littlefs disk version {0:#010x}")]
    UnsupportedVersion(u32),
    #[error("superblock geometry mismatch: image says block_size={disk}, configured {configured}")]
    BlockSizeMismatch { disk: u32, configured: u32 },
    #[error("superblock claims {disk} blocks, configured {configured}")]
    BlockCountMismatch { disk: u32, configured: u32 },
    #[error("root metadata pair is corrupt: {0}")]
    CorruptRoot(String),
}

#[derive(Debug, Error)]
pub enum WalkError {
    #[error("path not found: {0}")]
    NotFound(String),
    #[error("not a directory: {0}")]
    NotADirectory(String),
    #[error("corrupt metadata: {0}")]
    Corrupt(String),
    #[error(transparent)]
    Image(#[from] ImageError),
}
