//! # CDFS Core Library
//!
//! This crate provides the core functionality for the `cdfs` archiver.
//!
//! CDFS is a flat container: one header, one file table, one string table, then every
//! file's bytes starting on a sector boundary. It trades compression for cheap random
//! access, the way CD-ROM era games packed their assets.
//!
//! ## Key Modules
//!
//! - [`archive`]: Header and file table codecs, the string table and the preamble reader.
//! - [`layout`]: Sector allocation for a pack run.
//! - [`pack`]: Builds an archive from a directory tree.
//! - [`extract`]: Unpacks an archive into a directory tree, and lists its contents.
//! - [`verify`]: Structural checks on an existing archive.
//! - [`workers`]: The bounded worker pool behind pack and unpack.
//!
//! ## Examples
//!
//! ```no_run
//! use std::path::Path;
//! use cdfs::{pack_archive, unpack_archive, verify_archive, PackOptions, UnpackOptions};
//!
//! let report = pack_archive(Path::new("assets"), Path::new("assets.dat"), &PackOptions::default())?;
//! assert!(report.is_clean());
//! verify_archive(Path::new("assets.dat"))?;
//! unpack_archive(Path::new("assets.dat"), Path::new("out"), &UnpackOptions::default())?;
//! # Ok::<(), cdfs::CdfsError>(())
//! ```

pub mod archive;
pub mod cli;
pub mod cli_runner;
pub mod config;
pub mod error;
pub mod extract;
pub mod fsx;
pub mod layout;
pub mod logging;
pub mod pack;
pub mod progress;
pub mod verify;
pub mod workers;

pub use config::{PackOptions, UnpackOptions};
pub use error::{CdfsError, ErrorKind};
pub use extract::{list_archive, unpack_archive, ArchiveListing, UnpackReport};
pub use pack::{pack_archive, PackReport};
pub use verify::{verify_archive, VerifySummary};
