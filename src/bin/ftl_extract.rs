//! Command-line front-end: reconstruct the logical volume held in a raw FTL flash dump.

use anyhow::{Context, Result};
use bytes::Bytes;
use clap::{ArgAction, Parser, Subcommand};
use tracing::Level;

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use ftl_extractor::recover::{scan_dump, Recovery};

/// Accept sizes in decimal or `0x`-prefixed hex
fn parse_size(s: &str) -> Result<u32, std::num::ParseIntError> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    }
}

fn load_dump(path: &Path) -> Result<Recovery> {
    let dump = fs::read(path).with_context(|| format!("cannot read {}", path.display()))?;
    Ok(scan_dump(&Bytes::from(dump)))
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Reconstruct the logical volume image from a dump
    Extract {
        /// The raw dump read from flash
        dump: PathBuf,

        /// Where to write the volume image
        output: PathBuf,

        /// Override the medium size declared by the last unit header in the dump
        #[clap(long, value_parser = parse_size)]
        medium_size: Option<u32>,
    },

    /// Print a summary of every unit found in a dump; this is a read-only operation
    Units {
        /// The raw dump read from flash
        dump: PathBuf,
    },
}

impl Command {
    fn execute(self) -> Result<()> {
        match self {
            Command::Extract {
                dump,
                output,
                medium_size,
            } => {
                let mut recovery = load_dump(&dump)?;
                println!("total unit num: {}", recovery.volume().len());
                if let Some(size) = medium_size {
                    recovery = recovery.with_medium_size(size);
                }

                println!(
                    "writing {:#x} bytes to {}",
                    recovery.medium_size(),
                    output.display()
                );
                let file = File::create(&output)
                    .with_context(|| format!("cannot create {}", output.display()))?;
                recovery
                    .write_image(&mut BufWriter::new(file))
                    .with_context(|| format!("cannot write {}", output.display()))?;
            }

            Command::Units { dump } => {
                let recovery = load_dump(&dump)?;

                for unit in recovery.volume().units() {
                    let geometry = match unit.geometry() {
                        Some(g) => format!(
                            "sector {:#x}, unit {:#x}, BAM at {:#x}",
                            g.sector_size, g.unit_size, g.bam_offset
                        ),
                        None => "unusable geometry".to_string(),
                    };
                    let header = unit.header();
                    println!(
                        "{:#010x} => unit {:#06x} of {}, serial {:#010x}: {geometry}, {} sectors {:?}",
                        unit.offset(),
                        unit.logical_unit_no(),
                        header.unit_count,
                        header.serial_number,
                        unit.sectors().len(),
                        unit.stats(),
                    );
                }

                println!("total unit num: {}", recovery.volume().len());
                println!("medium size: {:#x}", recovery.medium_size());
            }
        };

        Ok(())
    }
}

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Cli {
    /// Log more detail (-v: info, -vv: debug, -vvv: trace); warnings are always shown
    #[clap(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[clap(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Don't show scanning progress
    #[clap(long, global = true)]
    no_progress: bool,

    #[clap(subcommand)]
    cmd: Command,
}

impl Cli {
    fn log_level(&self) -> Level {
        match (self.quiet, self.verbose) {
            (true, _) => Level::ERROR,
            (false, 0) => Level::WARN,
            (false, 1) => Level::INFO,
            (false, 2) => Level::DEBUG,
            (false, _) => Level::TRACE,
        }
    }
}

fn main() -> Result<()> {
    let args = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(args.log_level())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if !args.no_progress {
        howudoin::init(howudoin::consumers::TermLine::default());
    }

    args.cmd.execute()
}

#[test]
fn test_parse_size() {
    assert_eq!(parse_size("4096"), Ok(4096));
    assert_eq!(parse_size("0x3000"), Ok(0x3000));
    assert_eq!(parse_size("0XFF"), Ok(0xFF));
    assert!(parse_size("0x").is_err());
    assert!(parse_size("12k").is_err());
}

#[test]
fn test_cli() {
    use clap::CommandFactory;
    Cli::command().debug_assert();

    let args = Cli::parse_from(["ftl-extract", "-vv", "extract", "in.bin", "out.img"]);
    assert_eq!(args.log_level(), Level::DEBUG);
    let args = Cli::parse_from(["ftl-extract", "units", "in.bin", "--quiet"]);
    assert_eq!(args.log_level(), Level::ERROR);
    assert!(Cli::try_parse_from(["ftl-extract", "-q", "-v", "units", "in.bin"]).is_err());

    let args = Cli::parse_from([
        "ftl-extract",
        "extract",
        "in.bin",
        "out.img",
        "--medium-size",
        "0x3000",
    ]);
    assert!(matches!(
        args.cmd,
        Command::Extract {
            medium_size: Some(0x3000),
            ..
        }
    ));
}
