use tracing::warn;

use crate::image::ImageStore;
use crate::reach::ReachabilityMap;
use crate::types::{DirEntry, EntryKind, Geometry, MountError, WalkError};

// Corrupt images can loop metadata pairs back on themselves; the walker
// refuses to recurse past this depth instead of overflowing the stack.
const MAX_WALK_DEPTH: usize = 64;

/// A directory listing as reported by the mount collaborator.
///
/// `pairs` holds the backing metadata block pair of every segment in
/// the directory's log chain, in chain order.
#[derive(Debug, Clone, Default)]
pub struct Directory {
    pub pairs: Vec<[u32; 2]>,
    pub entries: Vec<DirEntry>,
}

/// The mounted-filesystem collaborator. The orphan engine treats this
/// as opaque: it only needs directory listings, whole-file reads, and
/// the trace of blocks each operation physically touched.
pub trait Filesystem {
    fn read_dir(&mut self, path: &str) -> Result<Directory, WalkError>;

    /// Reads the file at `path` to completion, discarding content.
    /// Returns the number of bytes consumed. Only the side effect on
    /// the block trace matters to the caller.
    fn read_file(&mut self, path: &str) -> Result<u64, WalkError>;

    /// Blocks physically read since the previous drain, in access
    /// order. May contain duplicates and out-of-range indices.
    fn drain_trace(&mut self) -> Vec<u32>;
}

pub trait Mounter {
    fn mount<'a>(
        &self,
        image: &'a ImageStore,
        geometry: Geometry,
    ) -> Result<Box<dyn Filesystem + 'a>, MountError>;
}

/// Walks the live tree rooted at `/`, recording every observed block
/// access into a fresh reachability map.
///
/// A subtree that fails to open is warned about and skipped; its
/// siblings and the rest of the scan proceed on partial information.
pub fn survey(fs: &mut dyn Filesystem, block_count: u32) -> ReachabilityMap {
    let mut reach = ReachabilityMap::new(block_count);
    walk_dir(fs, "/", &mut reach, 0);
    reach
}

fn walk_dir(fs: &mut dyn Filesystem, path: &str, reach: &mut ReachabilityMap, depth: usize) {
    if depth > MAX_WALK_DEPTH {
        warn!(path, "directory tree deeper than {MAX_WALK_DEPTH} levels, assuming a cycle");
        return;
    }

    let dir = match fs.read_dir(path) {
        Ok(dir) => dir,
        Err(err) => {
            warn!(path, %err, "failed to open directory, skipping subtree");
            reach.extend(fs.drain_trace());
            return;
        }
    };
    for pair in &dir.pairs {
        reach.mark(pair[0]);
        reach.mark(pair[1]);
    }
    reach.extend(fs.drain_trace());

    for entry in &dir.entries {
        let child = join_path(path, &entry.name);
        match entry.kind {
            EntryKind::File => {
                if let Err(err) = fs.read_file(&child) {
                    warn!(path = %child, %err, "failed to read file");
                }
                reach.extend(fs.drain_trace());
            }
            EntryKind::Dir => walk_dir(fs, &child, reach, depth + 1),
        }
    }
}

fn join_path(parent: &str, name: &str) -> String {
    if parent.ends_with('/') {
        format!("{parent}{name}")
    } else {
        format!("{parent}/{name}")
    }
}
