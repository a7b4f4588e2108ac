pub mod classify;
pub mod image;
pub mod lfs;
pub mod mount;
pub mod reach;
pub mod report;
pub mod tag;
pub mod types;

pub use classify::classify;
pub use image::ImageStore;
pub use lfs::LfsMounter;
pub use mount::{survey, Directory, Filesystem, Mounter};
pub use reach::ReachabilityMap;
pub use report::{scan_orphans, ScanSummary};
pub use tag::{decode, find_superblock};
pub use types::{
    BlockClass, BlockIndex, DirEntry, EntryKind, Geometry, ImageError, MountError, TagGuess,
    TagLabel, WalkError,
};
