//! # Extraction Module
//!
//! Reads an archive's preamble once, resolves every entry to a host path and byte range,
//! then streams the payloads out in parallel. Each job opens its own read handle and
//! writes its own output file, so jobs never share state.
//!
//! Also home of [`list_archive`], the read-only listing built on the same preamble.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::archive::{display_path, magic_text, ArchiveHeader, Preamble};
use crate::config::UnpackOptions;
use crate::fsx;
use crate::progress::{ProgressCallback, ProgressTracker};
use crate::workers::{Job, TaskFailure, WorkerPool};
use crate::CdfsError;

/// Upper bound for the per-job transfer buffer.
pub const TRANSFER_BUFFER_SIZE: usize = 16 * 1024 * 1024;

/// One payload read: `length` bytes at `offset` in the archive go to `target`.
#[derive(Debug, Clone)]
pub struct UnpackJob {
    pub index: usize,
    pub target: PathBuf,
    pub offset: u64,
    pub length: u64,
}

impl Job for UnpackJob {
    fn index(&self) -> usize {
        self.index
    }

    fn path(&self) -> &Path {
        &self.target
    }
}

/// Resolves every entry to a destination path and byte range.
///
/// Fails on the first entry whose names cannot be read or would escape `output_dir`.
pub fn plan_unpack(preamble: &Preamble, output_dir: &Path) -> Result<Vec<UnpackJob>, CdfsError> {
    preamble
        .entries
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            let (dir, name) = preamble.entry_names(entry)?;
            let target = fsx::host_path(output_dir, dir, name)?;
            let (offset, _) = entry.byte_range(&preamble.header);
            Ok(UnpackJob {
                index,
                target,
                offset,
                length: entry.length as u64,
            })
        })
        .collect()
}

/// Keeps only the last entry, in table order, for each destination path.
///
/// Names that differ only by case are stored identically, so they land on one path.
/// The earlier entries come back as failures rather than racing on the same file.
pub fn split_shadowed(jobs: Vec<UnpackJob>) -> (Vec<UnpackJob>, Vec<TaskFailure>) {
    let mut winners: HashMap<PathBuf, usize> = HashMap::with_capacity(jobs.len());
    for job in &jobs {
        winners.insert(job.target.clone(), job.index);
    }

    let mut kept = Vec::with_capacity(winners.len());
    let mut shadowed = Vec::new();
    for job in jobs {
        match winners.get(&job.target) {
            Some(&winner) if winner != job.index => {
                warn!(
                    "Entry {} ({}) is shadowed by entry {}",
                    job.index,
                    job.target.display(),
                    winner
                );
                shadowed.push(TaskFailure {
                    index: job.index,
                    error: CdfsError::ShadowedEntry {
                        path: job.target.clone(),
                        kept: winner,
                    },
                    path: job.target,
                });
            }
            _ => kept.push(job),
        }
    }
    (kept, shadowed)
}

fn extract_payload(archive_path: &Path, job: &UnpackJob) -> Result<u64, CdfsError> {
    if let Some(parent) = job.target.parent() {
        fs::create_dir_all(parent).map_err(|e| CdfsError::io(parent, e))?;
    }

    let mut archive = File::open(archive_path).map_err(|e| CdfsError::io(archive_path, e))?;
    archive
        .seek(SeekFrom::Start(job.offset))
        .map_err(|e| CdfsError::io(archive_path, e))?;
    let mut out = File::create(&job.target).map_err(|e| CdfsError::io(&job.target, e))?;

    let mut buf = vec![0u8; (job.length as usize).min(TRANSFER_BUFFER_SIZE)];
    let mut remaining = job.length;
    while remaining > 0 {
        let chunk = remaining.min(buf.len() as u64) as usize;
        archive.read_exact(&mut buf[..chunk]).map_err(|e| {
            let e = if e.kind() == io::ErrorKind::UnexpectedEof {
                io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("archive ends before {} bytes at offset {}", job.length, job.offset),
                )
            } else {
                e
            };
            CdfsError::io(archive_path, e)
        })?;
        out.write_all(&buf[..chunk])
            .map_err(|e| CdfsError::io(&job.target, e))?;
        remaining -= chunk as u64;
    }
    Ok(job.length)
}

/// Outcome of an unpack run.
///
/// `Ok(UnpackReport)` means the preamble parsed and every job ran. Files that could not be
/// written are listed in `failures` only.
#[derive(Debug)]
pub struct UnpackReport {
    pub output_dir: PathBuf,
    pub header: ArchiveHeader,
    pub file_count: usize,
    pub total_bytes: u64,
    pub version_mismatch: bool,
    pub failures: Vec<TaskFailure>,
}

impl UnpackReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Recreates every stored file below `output_dir`.
pub fn unpack_archive(
    archive_path: &Path,
    output_dir: &Path,
    opts: &UnpackOptions,
) -> Result<UnpackReport, CdfsError> {
    unpack_archive_with_progress(archive_path, output_dir, opts, None)
}

/// Like [`unpack_archive`], reporting each finished file to `progress`.
pub fn unpack_archive_with_progress(
    archive_path: &Path,
    output_dir: &Path,
    opts: &UnpackOptions,
    progress: Option<&ProgressCallback>,
) -> Result<UnpackReport, CdfsError> {
    let start = Instant::now();
    let preamble = Preamble::read(archive_path)?;
    let header = preamble.header;
    debug!(
        "CDFS Magic: {:#x} | {}, version {}, sector size {} bytes, cache hint {} bytes, \
         first sector at {}, {} sectors, {} entries",
        header.magic,
        magic_text(header.magic),
        header.version,
        header.sector_size,
        header.recommended_cache_size,
        header.first_sector_offset,
        header.total_sectors,
        header.file_table_entries
    );

    let jobs = plan_unpack(&preamble, output_dir)?;
    let entry_count = jobs.len();
    let (jobs, shadowed) = split_shadowed(jobs);
    fs::create_dir_all(output_dir).map_err(|e| CdfsError::io(output_dir, e))?;

    let total_files = jobs.len();
    let total_bytes: u64 = jobs.iter().map(|j| j.length).sum();
    info!("Unpacking {} files...", total_files);

    let pool = WorkerPool::new(opts.workers);
    let mut tracker = ProgressTracker::new(total_files as u64, total_bytes);
    let report = pool.run(
        jobs,
        |job| extract_payload(archive_path, job),
        |outcome| {
            let state = tracker.record(outcome.result.as_ref().ok().copied());
            match &outcome.result {
                Ok(len) => debug!(
                    "unpacking [{}/{}]: {} ({} bytes)",
                    state.processed_files,
                    total_files,
                    outcome.path.display(),
                    len
                ),
                Err(e) => error!("Error unpacking {}: {}", outcome.path.display(), e),
            }
            if let Some(cb) = progress {
                cb(state);
            }
        },
    );

    info!(
        "Unpacking completed in {:.2}s. Files unpacked to {}",
        start.elapsed().as_secs_f64(),
        output_dir.display()
    );

    Ok(UnpackReport {
        output_dir: output_dir.to_path_buf(),
        header,
        file_count: entry_count,
        total_bytes,
        version_mismatch: !header.version_matches(),
        failures: shadowed.into_iter().chain(report.failures).collect(),
    })
}

/// One row of an archive listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListEntry {
    pub index: usize,
    pub length: u32,
    pub start_sector: u32,
    /// `DIR\NAME`, or just `NAME` for root files.
    pub path: String,
}

/// Header summary plus every entry, in table order.
#[derive(Debug, Clone, Serialize)]
pub struct ArchiveListing {
    pub magic: String,
    pub version: u32,
    pub file_count: u32,
    pub sector_size: u32,
    pub recommended_cache_size: u32,
    pub archive_size: u64,
    pub total_sectors: u32,
    pub entries: Vec<ListEntry>,
}

/// Reads the preamble and lists its entries without touching any payload.
pub fn list_archive(archive_path: &Path) -> Result<ArchiveListing, CdfsError> {
    let preamble = Preamble::read(archive_path)?;
    let header = preamble.header;
    let entries = preamble
        .entries
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            let (dir, name) = preamble.entry_names(entry)?;
            Ok(ListEntry {
                index,
                length: entry.length,
                start_sector: entry.start_sector,
                path: display_path(dir, name),
            })
        })
        .collect::<Result<Vec<_>, CdfsError>>()?;

    Ok(ArchiveListing {
        magic: magic_text(header.magic),
        version: header.version,
        file_count: header.file_table_entries,
        sector_size: header.sector_size,
        recommended_cache_size: header.recommended_cache_size,
        archive_size: preamble.archive_size,
        total_sectors: header.total_sectors,
        entries,
    })
}
