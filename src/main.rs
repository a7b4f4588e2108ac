use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use console::style;
use std::io::Write;
use std::path::PathBuf;
use tracing::warn;

use lfscav::mount::{Filesystem, Mounter};
use lfscav::types::{
    EntryKind, Geometry, DEFAULT_BLOCK_COUNT, DEFAULT_BLOCK_SIZE, DEFAULT_PROG_SIZE,
    DEFAULT_READ_SIZE,
};
use lfscav::{report, survey, ImageStore, LfsMounter, ReachabilityMap};

const DEFAULT_DUMP_COUNT: u32 = 8;
const DEFAULT_OUTPUT_DIR: &str = "recovered_blocks";

#[derive(Parser)]
#[command(name = "lfscav")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Forensic block-usage analysis and orphan recovery for littlefs images")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Mount the image and list the live directory tree
    List(GeometryArgs),

    /// Inspect on-disk structures: superblock, usage summary, block dump
    #[command(name = "struct")]
    Struct {
        #[command(flatten)]
        geometry: GeometryArgs,

        /// Number of leading blocks to dump
        #[arg(value_parser = clap::value_parser!(u32).range(1..))]
        dump_count: Option<u32>,
    },

    /// Recover orphaned blocks not reachable from the live tree
    Recover {
        #[command(flatten)]
        geometry: GeometryArgs,

        /// Directory for recovered block artifacts
        #[arg(short, long, default_value = DEFAULT_OUTPUT_DIR)]
        output: PathBuf,
    },
}

#[derive(Args)]
struct GeometryArgs {
    /// Path to the raw flash image file
    image: PathBuf,

    #[arg(default_value_t = DEFAULT_BLOCK_SIZE, value_parser = clap::value_parser!(u32).range(1..))]
    block_size: u32,

    #[arg(default_value_t = DEFAULT_BLOCK_COUNT, value_parser = clap::value_parser!(u32).range(1..))]
    block_count: u32,

    #[arg(default_value_t = DEFAULT_READ_SIZE, value_parser = clap::value_parser!(u32).range(1..))]
    read_size: u32,

    #[arg(default_value_t = DEFAULT_PROG_SIZE, value_parser = clap::value_parser!(u32).range(1..))]
    prog_size: u32,
}

impl GeometryArgs {
    fn load(&self) -> Result<(ImageStore, Geometry)> {
        let geometry = Geometry::new(
            self.block_size,
            self.block_count,
            self.read_size,
            self.prog_size,
        )?;
        let image = ImageStore::load(&self.image, geometry)
            .with_context(|| format!("failed to load image {}", self.image.display()))?;
        Ok((image, geometry))
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    // Usage errors exit 1 rather than clap's default 2; help and
    // version output still exit 0.
    let cli = Cli::try_parse().unwrap_or_else(|err| {
        let _ = err.print();
        std::process::exit(if err.use_stderr() { 1 } else { 0 });
    });

    match cli.command {
        Command::List(geometry) => run_list(&geometry),
        Command::Struct {
            geometry,
            dump_count,
        } => run_struct(&geometry, dump_count.unwrap_or(DEFAULT_DUMP_COUNT)),
        Command::Recover { geometry, output } => run_recover(&geometry, &output),
    }
}

fn run_list(args: &GeometryArgs) -> Result<()> {
    let (image, geometry) = args.load()?;
    let mut fs = LfsMounter
        .mount(&image, geometry)
        .context("failed to mount filesystem")?;
    print_tree(fs.as_mut(), "/", false);
    Ok(())
}

fn run_struct(args: &GeometryArgs, dump_count: u32) -> Result<()> {
    let (image, geometry) = args.load()?;
    let stdout = &mut std::io::stdout().lock();

    let dump_count = if dump_count > geometry.block_count {
        println!(
            "[!] The filesystem has only {} blocks, but {} were requested for dump.",
            geometry.block_count, dump_count
        );
        println!("    Proceeding to dump {} blocks instead.", geometry.block_count);
        geometry.block_count
    } else {
        dump_count
    };

    report::render_superblock_info(&image, stdout)?;

    println!("\nFilesystem configuration:");
    println!("  Block size: {}", geometry.block_size);
    println!("  Block count: {}", geometry.block_count);
    println!("  Read size: {}", geometry.read_size);
    println!("  Prog size: {}", geometry.prog_size);
    println!();

    let mut fs = LfsMounter
        .mount(&image, geometry)
        .context("failed to mount filesystem")?;
    print_tree(fs.as_mut(), "/", true);

    report::render_blank_usage(&image, stdout)?;
    report::render_block_dump(&image, dump_count, stdout)?;
    Ok(())
}

fn run_recover(args: &GeometryArgs, output: &PathBuf) -> Result<()> {
    let (image, geometry) = args.load()?;

    let reach = match LfsMounter.mount(&image, geometry) {
        Ok(mut fs) => survey(fs.as_mut(), geometry.block_count),
        Err(err) => {
            warn!(%err, "mount failed, degrading to content-only orphan scan");
            eprintln!(
                "[!] {} every non-blank block will be treated as orphaned.",
                style("Failed to mount image:").yellow()
            );
            ReachabilityMap::new(geometry.block_count)
        }
    };

    let stdout = &mut std::io::stdout().lock();
    writeln!(stdout, "Orphaned Block Scan:")?;
    let summary = report::scan_orphans(&image, &reach, output, stdout)
        .with_context(|| format!("failed to write artifacts under {}", output.display()))?;
    report::render_summary(&summary, stdout)?;

    if summary.orphans.is_empty() {
        println!("\n{}", style("No orphaned blocks found.").green());
    } else {
        println!(
            "\n{} {} orphaned block(s) saved under {}",
            style("Recovered").green().bold(),
            summary.orphans.len(),
            output.display()
        );
    }
    Ok(())
}

fn print_tree(fs: &mut dyn Filesystem, path: &str, sizes: bool) {
    let dir = match fs.read_dir(path) {
        Ok(dir) => dir,
        Err(err) => {
            eprintln!("[!] Failed to open directory {path}: {err}");
            return;
        }
    };

    println!("{} {}", style("DIR:").cyan(), path);
    for entry in &dir.entries {
        let child = if path.ends_with('/') {
            format!("{path}{}", entry.name)
        } else {
            format!("{path}/{}", entry.name)
        };
        match entry.kind {
            EntryKind::File => {
                if sizes {
                    println!("  FILE: {child} (Size: {})", entry.size);
                } else {
                    println!("  FILE: {child}");
                }
            }
            EntryKind::Dir => print_tree(fs, &child, sizes),
        }
    }
}
