//! Read-only littlefs v2 mount adapter.
//!
//! This is the stand-in for the littlefs library proper: just enough of
//! the on-disk format to mount an image, walk the live tree, and read
//! file content, with every physical block access recorded in a trace.
//! No allocation, no writes, no gstate/move resolution.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::image::ImageStore;
use crate::mount::{Directory, Filesystem, Mounter};
use crate::types::{BlockIndex, DirEntry, EntryKind, Geometry, MountError, WalkError};

const DISK_VERSION_MAJOR: u16 = 2;

// 11-bit on-disk tag types.
const TYPE_REG: u16 = 0x001;
const TYPE_DIR: u16 = 0x002;
const TYPE_SUPERBLOCK: u16 = 0x0ff;
const TYPE_DIRSTRUCT: u16 = 0x200;
const TYPE_INLINESTRUCT: u16 = 0x201;
const TYPE_CTZSTRUCT: u16 = 0x202;

// 3-bit abstract tag groups.
const GROUP_NAME: u8 = 0x0;
const GROUP_STRUCT: u8 = 0x2;
const GROUP_SPLICE: u8 = 0x4;
const GROUP_CRC: u8 = 0x5;
const GROUP_TAIL: u8 = 0x6;

const SPLICE_CREATE: u8 = 0x01;
const SPLICE_DELETE: u8 = 0xff;
const CRC_FCRC: u8 = 0xff;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Tag(u32);

impl Tag {
    #[inline]
    fn is_valid(self) -> bool {
        self.0 & 0x8000_0000 == 0
    }

    #[inline]
    fn full_type(self) -> u16 {
        ((self.0 >> 20) & 0x7ff) as u16
    }

    #[inline]
    fn group(self) -> u8 {
        ((self.0 >> 28) & 0x7) as u8
    }

    #[inline]
    fn chunk(self) -> u8 {
        ((self.0 >> 20) & 0xff) as u8
    }

    #[inline]
    fn id(self) -> u16 {
        ((self.0 >> 10) & 0x3ff) as u16
    }

    #[inline]
    fn size(self) -> usize {
        (self.0 & 0x3ff) as usize
    }

    // 0x3ff in the size field means a deletion marker carrying no data.
    #[inline]
    fn data_len(self) -> usize {
        if self.size() == 0x3ff {
            0
        } else {
            self.size()
        }
    }

    #[inline]
    fn dsize(self) -> usize {
        4 + self.data_len()
    }
}

// littlefs CRC: reflected CRC-32 updated from a running register with
// no final inversion. crc32fast exposes the standard finalized form, so
// the register is recovered by inverting on the way in and out.
fn lfs_crc(seed: u32, data: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new_with_initial(!seed);
    hasher.update(data);
    !hasher.finalize()
}

#[inline]
fn le32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

#[inline]
fn be32(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NameKind {
    Reg,
    Dir,
    Superblock,
}

#[derive(Debug, Clone)]
enum Struct {
    Dir([BlockIndex; 2]),
    Inline(Vec<u8>),
    Ctz { head: BlockIndex, size: u32 },
}

#[derive(Debug, Clone, Default)]
struct Slot {
    name: Option<(String, NameKind)>,
    strct: Option<Struct>,
}

#[derive(Debug, Clone, Default)]
struct MdirState {
    slots: Vec<Slot>,
    tail: Option<[BlockIndex; 2]>,
    split: bool,
}

#[derive(Debug, Clone)]
struct Mdir {
    pair: [BlockIndex; 2],
    state: MdirState,
}

struct PendingTag {
    tag: Tag,
    data: Vec<u8>,
}

pub struct LfsMounter;

impl Mounter for LfsMounter {
    fn mount<'a>(
        &self,
        image: &'a ImageStore,
        geometry: Geometry,
    ) -> Result<Box<dyn Filesystem + 'a>, MountError> {
        let mut fs = LfsFilesystem {
            image,
            geometry,
            trace: Vec::new(),
        };
        fs.check_superblock()?;
        Ok(Box::new(fs))
    }
}

pub struct LfsFilesystem<'a> {
    image: &'a ImageStore,
    geometry: Geometry,
    trace: Vec<BlockIndex>,
}

impl<'a> LfsFilesystem<'a> {
    fn bread(&mut self, index: BlockIndex) -> Result<&'a [u8], WalkError> {
        self.trace.push(index);
        Ok(self.image.block(index)?)
    }

    /// Parses one metadata block: revision word, then big-endian
    /// XOR-chained tags grouped into commits, each sealed by a CRC tag.
    /// Only CRC-verified commits are replayed; a torn or corrupt tail
    /// is dropped. Returns None when no commit verifies.
    fn parse_mdir_block(&mut self, index: BlockIndex) -> Option<(u32, MdirState)> {
        let data = self.bread(index).ok()?;
        if data.len() < 8 {
            return None;
        }

        let rev = le32(&data[0..4]);
        let mut crc = lfs_crc(0xffff_ffff, &data[0..4]);
        let mut ptag: u32 = 0xffff_ffff;
        let mut off = 4usize;
        let mut state = MdirState::default();
        let mut pending: Vec<PendingTag> = Vec::new();
        let mut committed = false;

        while off + 4 <= data.len() {
            let raw = &data[off..off + 4];
            let tag = Tag(be32(raw) ^ ptag);
            if !tag.is_valid() {
                break;
            }
            crc = lfs_crc(crc, raw);

            let dsize = tag.dsize();
            if off + dsize > data.len() {
                break;
            }

            if tag.group() == GROUP_CRC && tag.chunk() != CRC_FCRC {
                // Commit seal: stored CRC covers everything from the
                // revision word (or previous seal) up to and including
                // this tag's on-disk bytes.
                if tag.data_len() < 4 {
                    break;
                }
                let stored = le32(&data[off + 4..off + 8]);
                if stored != crc {
                    break;
                }
                apply_commit(&mut state, &pending);
                pending.clear();
                committed = true;
                // The low chunk bit perturbs the valid bit expected of
                // the next commit's first tag.
                ptag = tag.0 ^ ((tag.chunk() as u32 & 1) << 31);
                crc = 0xffff_ffff;
                off += dsize;
                continue;
            }

            crc = lfs_crc(crc, &data[off + 4..off + dsize]);
            pending.push(PendingTag {
                tag,
                data: data[off + 4..off + dsize].to_vec(),
            });
            ptag = tag.0;
            off += dsize;
        }

        if committed {
            Some((rev, state))
        } else {
            None
        }
    }

    /// Fetches a metadata pair, preferring the valid block with the
    /// newer revision (sequence comparison, wrap-safe).
    fn fetch_pair(&mut self, pair: [BlockIndex; 2]) -> Result<Mdir, WalkError> {
        let a = self.parse_mdir_block(pair[0]);
        let b = self.parse_mdir_block(pair[1]);

        let (rev, state) = match (a, b) {
            (Some(a), Some(b)) => {
                if (a.0.wrapping_sub(b.0) as i32) > 0 {
                    a
                } else {
                    b
                }
            }
            (Some(a), None) => a,
            (None, Some(b)) => b,
            (None, None) => {
                return Err(WalkError::Corrupt(format!(
                    "no valid commit in metadata pair {{{}, {}}}",
                    pair[0], pair[1]
                )));
            }
        };

        debug!(pair = ?pair, rev, entries = state.slots.len(), "fetched metadata pair");
        Ok(Mdir { pair, state })
    }

    /// Fetches a directory's full metadata chain, following hard tails
    /// (same-directory continuations) with a cycle guard.
    fn fetch_chain(&mut self, start: [BlockIndex; 2]) -> Result<Vec<Mdir>, WalkError> {
        let mut chain = Vec::new();
        let mut seen: HashSet<[BlockIndex; 2]> = HashSet::new();
        let mut pair = start;

        loop {
            if !seen.insert(pair) {
                warn!(pair = ?pair, "metadata chain loops back on itself, truncating");
                break;
            }
            if chain.len() as u32 > self.geometry.block_count {
                return Err(WalkError::Corrupt(
                    "metadata chain longer than the device".to_string(),
                ));
            }
            let mdir = self.fetch_pair(pair)?;
            let next = if mdir.state.split { mdir.state.tail } else { None };
            chain.push(mdir);
            match next {
                Some(tail) => pair = tail,
                None => break,
            }
        }

        Ok(chain)
    }

    fn check_superblock(&mut self) -> Result<(), MountError> {
        let root = self
            .fetch_pair([0, 1])
            .map_err(|err| MountError::CorruptRoot(err.to_string()))?;

        let slot = root
            .state
            .slots
            .iter()
            .find(|slot| matches!(slot.name, Some((_, NameKind::Superblock))))
            .ok_or(MountError::NoSuperblock)?;

        let Some(Struct::Inline(data)) = &slot.strct else {
            return Err(MountError::NoSuperblock);
        };
        if data.len() < 12 {
            return Err(MountError::NoSuperblock);
        }

        let version = le32(&data[0..4]);
        let block_size = le32(&data[4..8]);
        let block_count = le32(&data[8..12]);

        if (version >> 16) as u16 != DISK_VERSION_MAJOR {
            return Err(MountError::UnsupportedVersion(version));
        }
        if block_size != self.geometry.block_size {
            return Err(MountError::BlockSizeMismatch {
                disk: block_size,
                configured: self.geometry.block_size,
            });
        }
        if block_count != self.geometry.block_count {
            return Err(MountError::BlockCountMismatch {
                disk: block_count,
                configured: self.geometry.block_count,
            });
        }

        debug!(version, block_size, block_count, "mounted");
        Ok(())
    }

    /// Resolves a path to the directory pair holding its final
    /// component, returning the matching slot. `/` resolves to None.
    fn lookup(&mut self, path: &str) -> Result<Option<Slot>, WalkError> {
        let mut pair = [0u32, 1u32];
        let mut resolved: Option<Slot> = None;

        for component in path.split('/').filter(|c| !c.is_empty() && *c != ".") {
            // Descending past a file, or a dir entry with no pair.
            if let Some(slot) = &resolved {
                match &slot.strct {
                    Some(Struct::Dir(next)) => pair = *next,
                    _ => return Err(WalkError::NotADirectory(path.to_string())),
                }
            }

            let chain = self.fetch_chain(pair)?;
            let found = chain.iter().flat_map(|mdir| &mdir.state.slots).find(|slot| {
                matches!(&slot.name, Some((name, kind)) if name.as_str() == component
                    && matches!(kind, NameKind::Reg | NameKind::Dir))
            });
            match found {
                Some(slot) => resolved = Some(slot.clone()),
                None => return Err(WalkError::NotFound(path.to_string())),
            }
        }

        Ok(resolved)
    }

    fn dir_pair_of(&mut self, path: &str) -> Result<[BlockIndex; 2], WalkError> {
        match self.lookup(path)? {
            None => Ok([0, 1]),
            Some(slot) => match (&slot.name, &slot.strct) {
                (Some((_, NameKind::Dir)), Some(Struct::Dir(pair))) => Ok(*pair),
                (Some((_, NameKind::Dir)), _) => Err(WalkError::Corrupt(format!(
                    "directory entry without a pair: {path}"
                ))),
                _ => Err(WalkError::NotADirectory(path.to_string())),
            },
        }
    }

    fn ctz_traverse(&mut self, head: BlockIndex, size: u32) -> Result<u64, WalkError> {
        if size == 0 {
            return Ok(0);
        }
        if self.geometry.block_size <= 8 {
            return Err(WalkError::Corrupt(
                "block size too small for CTZ files".to_string(),
            ));
        }

        let mut index = ctz_index(self.geometry.block_size, size as u64 - 1);
        if index >= self.geometry.block_count as u64 {
            return Err(WalkError::Corrupt(format!(
                "CTZ file claims {} blocks on a {}-block device",
                index + 1,
                self.geometry.block_count
            )));
        }

        let mut block = head;
        loop {
            let data = self.bread(block)?;
            if index == 0 {
                return Ok(size as u64);
            }
            // First skip-list word points at the previous block.
            block = le32(&data[0..4]);
            index -= 1;
        }
    }
}

// Index of the CTZ skip-list block containing byte `off`. Every block
// past the first loses 4 bytes per skip pointer, which the popcount
// term accounts for.
fn ctz_index(block_size: u32, off: u64) -> u64 {
    let b = (block_size - 8) as u64;
    let i = off / b;
    if i == 0 {
        return 0;
    }
    (off - 4 * ((i - 1).count_ones() as u64 + 2)) / b
}

fn apply_commit(state: &mut MdirState, pending: &[PendingTag]) {
    for entry in pending {
        let tag = entry.tag;
        let id = tag.id() as usize;
        match tag.group() {
            GROUP_SPLICE => match tag.chunk() {
                SPLICE_CREATE => {
                    let at = id.min(state.slots.len());
                    state.slots.insert(at, Slot::default());
                }
                SPLICE_DELETE => {
                    if id < state.slots.len() {
                        state.slots.remove(id);
                    }
                }
                _ => {}
            },
            GROUP_NAME => {
                let kind = match tag.full_type() {
                    TYPE_REG => NameKind::Reg,
                    TYPE_DIR => NameKind::Dir,
                    TYPE_SUPERBLOCK => NameKind::Superblock,
                    _ => continue,
                };
                let name = String::from_utf8_lossy(&entry.data).into_owned();
                slot_mut(state, id).name = Some((name, kind));
            }
            GROUP_STRUCT => {
                let strct = match tag.full_type() {
                    TYPE_DIRSTRUCT if entry.data.len() >= 8 => {
                        Struct::Dir([le32(&entry.data[0..4]), le32(&entry.data[4..8])])
                    }
                    TYPE_INLINESTRUCT => Struct::Inline(entry.data.clone()),
                    TYPE_CTZSTRUCT if entry.data.len() >= 8 => Struct::Ctz {
                        head: le32(&entry.data[0..4]),
                        size: le32(&entry.data[4..8]),
                    },
                    _ => continue,
                };
                slot_mut(state, id).strct = Some(strct);
            }
            GROUP_TAIL => {
                if entry.data.len() >= 8 {
                    state.tail = Some([le32(&entry.data[0..4]), le32(&entry.data[4..8])]);
                    state.split = tag.chunk() & 1 == 1;
                }
            }
            // gstate, user attributes, from-moves: irrelevant to a
            // read-only reachability walk.
            _ => {}
        }
    }
}

fn slot_mut(state: &mut MdirState, id: usize) -> &mut Slot {
    if id >= state.slots.len() {
        state.slots.resize_with(id + 1, Slot::default);
    }
    &mut state.slots[id]
}

impl<'a> Filesystem for LfsFilesystem<'a> {
    fn read_dir(&mut self, path: &str) -> Result<Directory, WalkError> {
        let start = self.dir_pair_of(path)?;
        let chain = self.fetch_chain(start)?;

        let mut dir = Directory::default();
        for mdir in &chain {
            dir.pairs.push(mdir.pair);
            for slot in &mdir.state.slots {
                let Some((name, kind)) = &slot.name else {
                    continue;
                };
                match kind {
                    NameKind::Reg => dir.entries.push(DirEntry {
                        name: name.clone(),
                        kind: EntryKind::File,
                        size: match &slot.strct {
                            Some(Struct::Inline(data)) => data.len() as u64,
                            Some(Struct::Ctz { size, .. }) => *size as u64,
                            _ => 0,
                        },
                        pair: mdir.pair,
                    }),
                    NameKind::Dir => {
                        if let Some(Struct::Dir(pair)) = &slot.strct {
                            dir.entries.push(DirEntry {
                                name: name.clone(),
                                kind: EntryKind::Dir,
                                size: 0,
                                pair: *pair,
                            });
                        }
                    }
                    // The superblock entry is structural, not a file.
                    NameKind::Superblock => {}
                }
            }
        }

        Ok(dir)
    }

    fn read_file(&mut self, path: &str) -> Result<u64, WalkError> {
        let slot = self
            .lookup(path)?
            .ok_or_else(|| WalkError::NotFound(path.to_string()))?;

        match (&slot.name, &slot.strct) {
            (Some((_, NameKind::Reg)), Some(Struct::Inline(data))) => Ok(data.len() as u64),
            (Some((_, NameKind::Reg)), Some(Struct::Ctz { head, size })) => {
                let (head, size) = (*head, *size);
                self.ctz_traverse(head, size)
            }
            (Some((_, NameKind::Reg)), None) => Ok(0),
            _ => Err(WalkError::NotFound(path.to_string())),
        }
    }

    fn drain_trace(&mut self) -> Vec<BlockIndex> {
        std::mem::take(&mut self.trace)
    }
}
