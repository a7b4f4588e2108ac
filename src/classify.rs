use crate::types::{BlockClass, ERASE_SENTINEL};

/// Classifies a block's content. Pure and total over any byte slice.
///
/// A block is blank only if every byte equals the erase sentinel; the
/// full block is scanned so a printable-looking tail cannot mask a
/// partially written head. A single non-printable, non-newline byte
/// anywhere flips the whole block to binary.
pub fn classify(block: &[u8]) -> BlockClass {
    if block.iter().all(|&b| b == ERASE_SENTINEL) {
        return BlockClass::Blank;
    }

    if block
        .iter()
        .all(|&b| (0x20..=0x7E).contains(&b) || b == b'\n' || b == b'\r')
    {
        return BlockClass::Printable;
    }

    BlockClass::Binary
}
