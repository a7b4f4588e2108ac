#![allow(dead_code)]

use lfscav::types::Geometry;

pub const BLOCK_SIZE: u32 = 4096;
pub const BLOCK_COUNT: u32 = 16;

pub const TYPE_CREATE: u16 = 0x401;
pub const TYPE_REG_NAME: u16 = 0x001;
pub const TYPE_DIR_NAME: u16 = 0x002;
pub const TYPE_SUPERBLOCK_NAME: u16 = 0x0ff;
pub const TYPE_DIRSTRUCT: u16 = 0x200;
pub const TYPE_INLINESTRUCT: u16 = 0x201;
pub const TYPE_CTZSTRUCT: u16 = 0x202;

pub fn geometry() -> Geometry {
    Geometry::new(BLOCK_SIZE, BLOCK_COUNT, 16, 16).unwrap()
}

pub fn blank_image() -> Vec<u8> {
    vec![0xFF; (BLOCK_SIZE * BLOCK_COUNT) as usize]
}

pub fn set_block(image: &mut [u8], index: u32, content: &[u8]) {
    let start = (index * BLOCK_SIZE) as usize;
    image[start..start + content.len()].copy_from_slice(content);
}

pub fn block_of(image: &[u8], index: u32) -> &[u8] {
    let start = (index * BLOCK_SIZE) as usize;
    &image[start..start + BLOCK_SIZE as usize]
}

// littlefs CRC: reflected CRC-32 register, no final inversion.
fn lfs_crc(seed: u32, data: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new_with_initial(!seed);
    hasher.update(data);
    !hasher.finalize()
}

/// Builds a single littlefs v2 metadata block: revision word followed
/// by big-endian XOR-chained tags sealed with a commit CRC tag.
pub struct MdirBuilder {
    data: Vec<u8>,
    off: usize,
    ptag: u32,
    crc: u32,
}

impl MdirBuilder {
    pub fn new(rev: u32) -> Self {
        let mut data = vec![0xFF; BLOCK_SIZE as usize];
        data[0..4].copy_from_slice(&rev.to_le_bytes());
        let crc = lfs_crc(0xffff_ffff, &data[0..4]);
        Self {
            data,
            off: 4,
            ptag: 0xffff_ffff,
            crc,
        }
    }

    pub fn tag(mut self, full_type: u16, id: u16, payload: &[u8]) -> Self {
        assert!(payload.len() < 0x3ff);
        let tag = ((full_type as u32) << 20) | ((id as u32) << 10) | payload.len() as u32;
        self.push_tag(tag);
        self.data[self.off..self.off + payload.len()].copy_from_slice(payload);
        self.crc = lfs_crc(self.crc, payload);
        self.off += payload.len();
        self
    }

    pub fn commit(mut self) -> Self {
        let tag = (0x500u32 << 20) | (0x3ffu32 << 10) | 4;
        self.push_tag(tag);
        let crc = self.crc;
        self.data[self.off..self.off + 4].copy_from_slice(&crc.to_le_bytes());
        self.off += 4;
        self.crc = 0xffff_ffff;
        self
    }

    fn push_tag(&mut self, tag: u32) {
        let raw = (tag ^ self.ptag).to_be_bytes();
        self.data[self.off..self.off + 4].copy_from_slice(&raw);
        self.crc = lfs_crc(self.crc, &raw);
        self.off += 4;
        self.ptag = tag;
    }

    pub fn build(self) -> Vec<u8> {
        self.data
    }
}

pub fn superblock_payload() -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(&0x0002_0000u32.to_le_bytes()); // disk version 2.0
    payload.extend_from_slice(&BLOCK_SIZE.to_le_bytes());
    payload.extend_from_slice(&BLOCK_COUNT.to_le_bytes());
    payload.extend_from_slice(&255u32.to_le_bytes()); // name_max
    payload.extend_from_slice(&0x7fff_ffffu32.to_le_bytes()); // file_max
    payload.extend_from_slice(&1022u32.to_le_bytes()); // attr_max
    payload
}

pub fn ctz_payload(head: u32, size: u32) -> Vec<u8> {
    let mut payload = head.to_le_bytes().to_vec();
    payload.extend_from_slice(&size.to_le_bytes());
    payload
}

pub fn dir_pair_payload(pair: [u32; 2]) -> Vec<u8> {
    let mut payload = pair[0].to_le_bytes().to_vec();
    payload.extend_from_slice(&pair[1].to_le_bytes());
    payload
}

/// Root metadata block with the superblock entry at id 0.
pub fn root_builder(rev: u32) -> MdirBuilder {
    MdirBuilder::new(rev)
        .tag(TYPE_CREATE, 0, &[])
        .tag(TYPE_SUPERBLOCK_NAME, 0, b"littlefs")
        .tag(TYPE_INLINESTRUCT, 0, &superblock_payload())
}

/// The reference image of the end-to-end scenarios: a valid superblock
/// in block 0 and one regular file whose CTZ list covers blocks 2 and 3
/// (head in block 3 pointing back at block 2), everything else erased.
pub fn two_block_file_image() -> Vec<u8> {
    let mut image = blank_image();

    // Revision 6 keeps the leading word's low 6 bits looking like a
    // superblock tag, which is what the heuristic decoder keys on.
    let root = root_builder(6)
        .tag(TYPE_CREATE, 1, &[])
        .tag(TYPE_REG_NAME, 1, b"data.bin")
        .tag(TYPE_CTZSTRUCT, 1, &ctz_payload(3, BLOCK_SIZE + 10))
        .commit()
        .build();
    set_block(&mut image, 0, &root);

    let mut first = vec![0xAB; BLOCK_SIZE as usize];
    first[0] = 0x00;
    set_block(&mut image, 2, &first);

    let mut head = vec![0xCD; BLOCK_SIZE as usize];
    head[0..4].copy_from_slice(&2u32.to_le_bytes());
    set_block(&mut image, 3, &head);

    image
}
