//! IAR command-line utility
//!
//! Packs directories or JSON tree descriptions into IAR archives and
//! unpacks them again.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use iar_rs::{Archive, ArchiveBuilder, PackOptions, SymlinkPolicy, VERSION};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "iar")]
#[command(about = "Pack and unpack page-aligned IAR archives")]
#[command(version, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Pack a file or directory tree
    Pack {
        /// File or directory to pack
        source: PathBuf,

        #[command(flatten)]
        output: PackArgs,
    },

    /// Pack the virtual tree described by a JSON file
    Json {
        /// JSON document to pack
        source: PathBuf,

        #[command(flatten)]
        output: PackArgs,
    },

    /// Unpack an archive
    Unpack {
        /// Archive to unpack
        archive: PathBuf,

        /// Destination directory
        #[arg(short, long, default_value = "output")]
        output: PathBuf,
    },

    /// Print the latest archive version this utility supports
    FormatVersion,
}

#[derive(Args, Debug)]
struct PackArgs {
    /// Archive to write
    #[arg(short, long, default_value = "output.iar")]
    output: PathBuf,

    /// Name of the root entry [default: last component of the source path]
    #[arg(short, long)]
    name: Option<String>,

    /// Content alignment in bytes (power of two)
    #[arg(long)]
    align: Option<u64>,

    /// Symbolic link handling (skip, follow, error)
    #[arg(long, value_parser = SymlinkPolicy::parse)]
    symlinks: Option<SymlinkPolicy>,

    /// TOML file with pack options; flags override it
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
}

impl PackArgs {
    fn options(&self) -> Result<PackOptions> {
        let mut options = match &self.config {
            Some(path) => PackOptions::from_toml_file(path)
                .with_context(|| format!("Failed to load config {:?}", path))?,
            None => PackOptions::default(),
        };

        if let Some(align) = self.align {
            options.page_bytes = align;
        }
        if let Some(policy) = self.symlinks {
            options.symlinks = policy;
        }

        Ok(options)
    }
}

/// Create the output archive, run `pack` on it and write the header
///
/// A failed pack leaves a partial archive behind, so the output is removed.
fn write_archive<F>(args: &PackArgs, pack: F) -> Result<()>
where
    F: FnOnce(&mut Archive) -> Result<u64>,
{
    let mut archive = ArchiveBuilder::with_options(args.options()?)
        .create(&args.output)
        .with_context(|| format!("Failed to open {:?} for writing", args.output))?;

    let packed = pack(&mut archive).and_then(|_| Ok(archive.write_header()?));
    if let Err(e) = packed {
        drop(archive);
        std::fs::remove_file(&args.output).ok();
        return Err(e);
    }

    archive.close()?;
    info!("Wrote {:?}", args.output);
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Pack { source, output } => {
            write_archive(&output, |archive| {
                archive
                    .pack(&source, output.name.as_deref())
                    .with_context(|| format!("Failed to pack {:?}", source))
            })?;
        }

        Commands::Json { source, output } => {
            write_archive(&output, |archive| {
                archive
                    .pack_json(&source, output.name.as_deref())
                    .with_context(|| format!("Failed to pack JSON tree {:?}", source))
            })?;
        }

        Commands::Unpack { archive, output } => {
            let reader = Archive::open_read(&archive)
                .with_context(|| format!("Failed to open {:?} for reading", archive))?;

            reader
                .unpack(&output)
                .with_context(|| format!("Failed to unpack {:?}", archive))?;
        }

        Commands::FormatVersion => {
            println!("Command-line utility supports up to IAR version {}", VERSION);
        }
    }

    Ok(())
}
