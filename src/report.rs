use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::classify::classify;
use crate::image::ImageStore;
use crate::reach::ReachabilityMap;
use crate::tag;
use crate::types::{BlockClass, BlockIndex};

pub const HEX_PREVIEW_BYTES: usize = 64;
pub const DUMP_PREFIX_BYTES: usize = 16;

#[derive(Debug)]
pub struct ScanSummary {
    pub used: Vec<BlockIndex>,
    pub free: Vec<BlockIndex>,
    pub orphans: Vec<BlockIndex>,
    pub write_failures: usize,
}

/// Scans every block the traversal never reached, reports the non-blank
/// ones as orphans and persists their raw content.
///
/// One artifact per orphan, `block_<index>.bin` in `output_dir`, exactly
/// one block long, silently overwriting any previous run's artifact.
/// A failed write is warned about and counted; the scan never aborts.
/// That includes a failure to create `output_dir` itself, which just
/// leaves every per-block persist failing the same way.
pub fn scan_orphans(
    image: &ImageStore,
    reach: &ReachabilityMap,
    output_dir: &Path,
    out: &mut dyn Write,
) -> io::Result<ScanSummary> {
    if let Err(err) = fs::create_dir_all(output_dir) {
        warn!(path = %output_dir.display(), %err, "failed to create artifact directory");
        writeln!(out, "[!] Failed to create {}: {err}", output_dir.display())?;
    }

    let mut orphans = Vec::new();
    let mut write_failures = 0usize;

    for (index, block) in image.blocks() {
        if reach.is_reachable(index) {
            continue;
        }
        let class = classify(block);
        if class == BlockClass::Blank {
            continue;
        }

        orphans.push(index);
        render_orphan(index, block, class, out)?;

        let artifact = artifact_path(output_dir, index);
        match persist_block(&artifact, block) {
            Ok(()) => writeln!(out, "Saved block {index} to {}", artifact.display())?,
            Err(err) => {
                warn!(index, path = %artifact.display(), %err, "failed to persist orphaned block");
                writeln!(out, "[!] Failed to write {}: {err}", artifact.display())?;
                write_failures += 1;
            }
        }
    }

    Ok(ScanSummary {
        used: reach.used_indices(),
        free: reach.free_indices(),
        orphans,
        write_failures,
    })
}

fn render_orphan(
    index: BlockIndex,
    block: &[u8],
    class: BlockClass,
    out: &mut dyn Write,
) -> io::Result<()> {
    writeln!(out, "\nOrphaned block {index} ({class}):")?;

    match tag::decode(block) {
        Ok(guess) => writeln!(
            out,
            "Leading tag: {:#010x} (type {:#04x}, {})",
            guess.raw_tag, guess.tag_type, guess.label
        )?,
        Err(err) => writeln!(out, "Leading tag: unreadable ({err})")?,
    }

    match class {
        BlockClass::Printable => {
            writeln!(out, "ASCII content:")?;
            // Printable blocks are ASCII plus newlines by definition.
            out.write_all(block)?;
            writeln!(out)?;
        }
        _ => {
            writeln!(out, "Hex dump (first {HEX_PREVIEW_BYTES} bytes):")?;
            write_hex_line(out, &block[..HEX_PREVIEW_BYTES.min(block.len())])?;
            writeln!(out, "...")?;
        }
    }
    Ok(())
}

pub fn artifact_path(output_dir: &Path, index: BlockIndex) -> PathBuf {
    output_dir.join(format!("block_{index}.bin"))
}

fn persist_block(path: &Path, block: &[u8]) -> io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(block)?;
    file.sync_all()
}

pub fn render_summary(summary: &ScanSummary, out: &mut dyn Write) -> io::Result<()> {
    write!(out, "\nUsed blocks: ")?;
    write_index_line(out, &summary.used)?;
    write!(out, "Free blocks: ")?;
    write_index_line(out, &summary.free)?;
    writeln!(
        out,
        "Orphaned blocks: {} ({} artifact write failures)",
        summary.orphans.len(),
        summary.write_failures
    )
}

/// The `struct` front-end's per-block dump: a 16-byte hex prefix and
/// the heuristic tag guess, for the first `count` blocks.
pub fn render_block_dump(
    image: &ImageStore,
    count: u32,
    out: &mut dyn Write,
) -> io::Result<()> {
    writeln!(out, "\nDumping first {count} blocks:")?;
    for (index, block) in image.blocks().take(count as usize) {
        write!(out, "  Block {index}: ")?;
        write_hex_line(out, &block[..DUMP_PREFIX_BYTES.min(block.len())])?;
        match tag::decode(block) {
            Ok(guess) => writeln!(out, " -->  {}...", guess.label)?,
            Err(err) => writeln!(out, " -->  unreadable ({err})")?,
        }
    }
    Ok(())
}

/// The `struct` front-end's usage summary: blank blocks are free,
/// everything else is used. Purely content-based, no traversal.
pub fn render_blank_usage(image: &ImageStore, out: &mut dyn Write) -> io::Result<()> {
    let mut used = Vec::new();
    let mut free = Vec::new();
    for (index, block) in image.blocks() {
        if classify(block) == BlockClass::Blank {
            free.push(index);
        } else {
            used.push(index);
        }
    }
    writeln!(out, "\nBlock Usage Summary:")?;
    write!(out, "  Used blocks: ")?;
    write_index_line(out, &used)?;
    write!(out, "  Free blocks: ")?;
    write_index_line(out, &free)
}

pub fn render_superblock_info(image: &ImageStore, out: &mut dyn Write) -> io::Result<()> {
    writeln!(out, "Superblock information:")?;
    match tag::find_superblock(image) {
        Some((index, guess)) => {
            writeln!(out, "  Superblock tag detected in block {index}")?;
            writeln!(out, "  Raw tag: {:#010x}", guess.raw_tag)?;
            writeln!(out, "  Tag type: {:#04x} (Superblock)", guess.tag_type)
        }
        None => writeln!(out, "  [!] No valid superblock tag found in block 0 or 1."),
    }
}

fn write_hex_line(out: &mut dyn Write, bytes: &[u8]) -> io::Result<()> {
    for byte in bytes {
        write!(out, "{byte:02X} ")?;
    }
    Ok(())
}

fn write_index_line(out: &mut dyn Write, indices: &[BlockIndex]) -> io::Result<()> {
    for index in indices {
        write!(out, "{index} ")?;
    }
    writeln!(out)
}
