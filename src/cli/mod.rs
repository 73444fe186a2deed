use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{DEFAULT_CACHE_SIZE, DEFAULT_SECTOR_SIZE};

#[derive(Parser, Debug)]
#[command(author, version, about = "CD File System Manager: pack, unpack, list and verify CDFS archives", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Create a CDFS archive from the specified directory.
    Pack {
        /// Source directory containing files to pack.
        input_dir: PathBuf,

        /// Destination archive file to create (e.g., output.dat).
        output_file: PathBuf,

        /// Sector size in bytes.
        #[arg(long, default_value_t = DEFAULT_SECTOR_SIZE, value_parser = clap::value_parser!(u32).range(1..))]
        sector_size: u32,

        /// Recommended cache size in bytes, stored in the header as a hint for readers.
        #[arg(long, default_value_t = DEFAULT_CACHE_SIZE)]
        cache_size: u32,

        /// Number of worker threads. [default: CDFS_WORKERS, else CPU cores]
        #[arg(long)]
        workers: Option<usize>,

        /// Show a progress bar on stderr.
        #[arg(long)]
        progress: bool,

        /// Display detailed information.
        #[arg(long)]
        debug: bool,
    },

    /// Unpack files from the specified CDFS archive into the given directory.
    Unpack {
        /// Source archive file to unpack.
        input_file: PathBuf,

        /// Destination directory for unpacked files. Created if missing.
        output_dir: PathBuf,

        /// Number of worker threads. [default: CDFS_WORKERS, else CPU cores]
        #[arg(long)]
        workers: Option<usize>,

        /// Show a progress bar on stderr.
        #[arg(long)]
        progress: bool,

        /// Display detailed information.
        #[arg(long)]
        debug: bool,
    },

    /// List the contents of the specified CDFS archive.
    List {
        /// Archive file to list the contents of.
        input_file: PathBuf,

        /// Print the listing as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Verify the structural integrity of the specified CDFS archive.
    Verify {
        /// Archive file to verify.
        input_file: PathBuf,
    },
}

impl Commands {
    /// Whether the command asked for detailed output.
    pub fn debug(&self) -> bool {
        match self {
            Commands::Pack { debug, .. } | Commands::Unpack { debug, .. } => *debug,
            _ => false,
        }
    }
}

/// Parses command-line arguments using `clap` and returns the command to execute.
pub fn run() -> Result<Commands, clap::Error> {
    let args = Args::try_parse()?;
    Ok(args.command)
}
