use crate::image::ImageStore;
use crate::types::{BlockIndex, ImageError, TagGuess, TagLabel};

const TAG_TYPE_MASK: u32 = 0x3F;

const TAG_FILE_ENTRY: u8 = 0x01;
const TAG_DIR_ENTRY: u8 = 0x02;
const TAG_SUPERBLOCK_A: u8 = 0x05;
const TAG_SUPERBLOCK_B: u8 = 0x06;

/// Best-effort structural guess from a block's leading 32-bit
/// little-endian word. The low 6 bits are treated as a littlefs tag
/// type.
///
/// This is a heuristic only: no CRC is checked and no tag chain is
/// followed, so file content whose first word happens to match a tag
/// pattern will be mislabeled. That trade-off is deliberate; a stricter
/// decoder would stop flagging corrupt-but-recognizable metadata.
pub fn decode(block: &[u8]) -> Result<TagGuess, ImageError> {
    if block.len() < 4 {
        return Err(ImageError::Truncated { len: block.len() });
    }

    let raw_tag = u32::from_le_bytes([block[0], block[1], block[2], block[3]]);
    let tag_type = (raw_tag & TAG_TYPE_MASK) as u8;

    let label = match tag_type {
        TAG_FILE_ENTRY => TagLabel::FileEntry,
        TAG_DIR_ENTRY => TagLabel::DirEntry,
        TAG_SUPERBLOCK_A | TAG_SUPERBLOCK_B => TagLabel::Superblock,
        _ => TagLabel::Unknown,
    };

    Ok(TagGuess {
        raw_tag,
        tag_type,
        label,
    })
}

/// Presence check over the two canonical superblock locations.
///
/// Returns the first of blocks 0 and 1 whose leading tag type matches a
/// superblock, with the decoded guess. Not a superblock content parse.
pub fn find_superblock(image: &ImageStore) -> Option<(BlockIndex, TagGuess)> {
    for index in 0..=1u32.min(image.block_count().saturating_sub(1)) {
        let Ok(block) = image.block(index) else {
            continue;
        };
        let Ok(guess) = decode(block) else {
            continue;
        };
        if guess.label == TagLabel::Superblock {
            return Some((index, guess));
        }
    }
    None
}
