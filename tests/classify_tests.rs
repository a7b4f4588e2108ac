use lfscav::classify;
use lfscav::types::BlockClass;
use proptest::prelude::*;

#[test]
fn test_all_erase_sentinel_is_blank() {
    let block = vec![0xFF; 4096];
    assert_eq!(classify(&block), BlockClass::Blank);
}

#[test]
fn test_full_block_scanned_for_blank() {
    // A single written byte at the very end must defeat the blank check.
    let mut block = vec![0xFF; 4096];
    block[4095] = 0x00;
    assert_eq!(classify(&block), BlockClass::Binary);
}

#[test]
fn test_ascii_text_is_printable() {
    let block = b"hello forensic world\r\nsecond line\n".to_vec();
    assert_eq!(classify(&block), BlockClass::Printable);
}

#[test]
fn test_single_binary_byte_flips_whole_block() {
    let mut block = vec![b'a'; 4096];
    block[2048] = 0x07;
    assert_eq!(classify(&block), BlockClass::Binary);
}

#[test]
fn test_tab_is_not_printable() {
    // Only \n and \r are accepted outside the printable ASCII range.
    let block = b"col1\tcol2".to_vec();
    assert_eq!(classify(&block), BlockClass::Binary);
}

#[test]
fn test_high_bytes_are_binary() {
    let block = vec![0xFE; 512];
    assert_eq!(classify(&block), BlockClass::Binary);
}

proptest! {
    #[test]
    fn prop_classify_is_deterministic(block in proptest::collection::vec(any::<u8>(), 0..4096)) {
        prop_assert_eq!(classify(&block), classify(&block));
    }

    #[test]
    fn prop_non_printable_byte_forces_binary(
        mut block in proptest::collection::vec(0x20u8..=0x7E, 1..512),
        pos in any::<proptest::sample::Index>(),
        bad in 0x00u8..0x1F,
    ) {
        prop_assume!(bad != b'\n' && bad != b'\r');
        let at = pos.index(block.len());
        block[at] = bad;
        prop_assert_eq!(classify(&block), BlockClass::Binary);
    }

    #[test]
    fn prop_printable_blocks_stay_printable(
        block in proptest::collection::vec(
            prop_oneof![0x20u8..=0x7E, Just(b'\n'), Just(b'\r')],
            1..512,
        )
    ) {
        prop_assert_eq!(classify(&block), BlockClass::Printable);
    }
}
