//! # Pack Engine
//!
//! Builds a CDFS archive from a directory tree:
//!
//! 1. Walk the tree and record every regular file with its size.
//! 2. Intern each file's directory and name into the string table.
//! 3. Plan the layout (see [`crate::layout`]).
//! 4. Write header, file table and string table, pad to the first sector and grow the
//!    archive to its final size.
//! 5. Fan the payloads out over the worker pool. Every job owns a disjoint,
//!    sector-aligned byte range and opens its own handle, so no locking is needed.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::archive::{ArchiveHeader, FileEntry, InternCache, StringTable, CDFS_MAGIC, CDFS_VERSION};
use crate::config::PackOptions;
use crate::fsx;
use crate::layout::{self, LayoutPlan};
use crate::progress::{ProgressCallback, ProgressTracker};
use crate::workers::{Job, TaskFailure, WorkerPool};
use crate::CdfsError;

/// A regular file found under the source root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    /// Path relative to the source root.
    pub rel_path: PathBuf,
    pub size: u64,
}

/// Walks `source_dir` and returns its regular files in a stable order: within each
/// directory, files before subdirectories, both sorted by name.
pub fn collect_source_files(source_dir: &Path) -> Result<Vec<SourceFile>, CdfsError> {
    if !source_dir.is_dir() {
        return Err(CdfsError::MissingSource(source_dir.to_path_buf()));
    }

    let walker = WalkDir::new(source_dir)
        .min_depth(1)
        .follow_links(false)
        .sort_by(|a, b| {
            a.file_type()
                .is_dir()
                .cmp(&b.file_type().is_dir())
                .then_with(|| a.file_name().cmp(b.file_name()))
        });

    let mut files = Vec::new();
    for entry in walker {
        let entry = entry?;
        let file_type = entry.file_type();
        if file_type.is_dir() {
            continue;
        }
        if !file_type.is_file() {
            warn!("Skipping non-regular file {}", entry.path().display());
            continue;
        }
        let size = entry.metadata()?.len();
        let rel_path = entry
            .path()
            .strip_prefix(source_dir)
            .unwrap_or(entry.path())
            .to_path_buf();
        files.push(SourceFile {
            path: entry.path().to_path_buf(),
            rel_path,
            size,
        });
    }
    Ok(files)
}

/// Everything needed to write an archive, computed without touching the output file.
#[derive(Debug, Clone)]
pub struct PackPlan {
    pub header: ArchiveHeader,
    pub entries: Vec<FileEntry>,
    pub strings: StringTable,
    pub layout: LayoutPlan,
    pub files: Vec<SourceFile>,
}

impl PackPlan {
    /// Interns names and assigns sectors for `files`, in the order given.
    pub fn build(files: Vec<SourceFile>, opts: &PackOptions) -> Result<Self, CdfsError> {
        opts.validate()?;

        let mut strings = StringTable::new();
        let mut cache = InternCache::new();
        let mut entries = Vec::with_capacity(files.len());
        for file in &files {
            let length = u32::try_from(file.size).map_err(|_| CdfsError::FileTooLarge {
                path: file.path.clone(),
                size: file.size,
            })?;
            let (dir, name) = fsx::split_relative(&file.rel_path)?;
            let dir_name_offset = strings.intern(&mut cache, &dir)?;
            let file_name_offset = strings.intern(&mut cache, &name)?;
            entries.push(FileEntry {
                file_name_offset,
                dir_name_offset,
                start_sector: 0,
                length,
            });
        }
        // The cache is scoped to this build and dropped here.
        drop(cache);

        let sizes: Vec<u64> = files.iter().map(|f| f.size).collect();
        let layout = layout::plan(&sizes, opts.sector_size, strings.len())?;
        for (entry, &start) in entries.iter_mut().zip(&layout.start_sectors) {
            entry.start_sector = start;
        }

        let header = ArchiveHeader {
            magic: CDFS_MAGIC,
            version: CDFS_VERSION,
            sector_size: opts.sector_size,
            recommended_cache_size: opts.cache_size_hint,
            first_sector_offset: layout.first_sector_offset,
            total_sectors: layout.total_sectors,
            file_table_length: layout.file_table_length,
            file_table_entries: entries.len() as u32,
            string_table_length: layout.string_table_length,
            string_table_entries: strings.slot_count(),
        };

        Ok(Self {
            header,
            entries,
            strings,
            layout,
            files,
        })
    }

    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }

    /// Writes the preamble and grows the file to its final size. Truncates any existing file.
    pub fn write_preamble(&self, archive_path: &Path) -> Result<(), CdfsError> {
        let io_err = |e: io::Error| CdfsError::io(archive_path, e);

        let file = File::create(archive_path).map_err(io_err)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(&self.header.to_bytes()).map_err(io_err)?;
        for entry in &self.entries {
            writer.write_all(&entry.to_bytes()).map_err(io_err)?;
        }
        writer.write_all(self.strings.as_bytes()).map_err(io_err)?;
        io::copy(
            &mut io::repeat(0).take(self.layout.preamble_padding()),
            &mut writer,
        )
        .map_err(io_err)?;

        let mut file = writer.into_inner().map_err(|e| io_err(e.into_error()))?;
        fsx::preallocate(&mut file, self.layout.archive_size()).map_err(io_err)?;
        Ok(())
    }

    /// Writes the preamble, then fans the payloads out over `workers` threads.
    ///
    /// Sources are read when their job runs. A source that cannot be read, or whose size
    /// no longer matches the plan, fails its own job and leaves its sectors zeroed.
    pub fn write_archive(
        &self,
        archive_path: &Path,
        workers: usize,
        progress: Option<&ProgressCallback>,
    ) -> Result<PackReport, CdfsError> {
        self.write_preamble(archive_path)?;

        let total_files = self.files.len();
        let total_bytes = self.total_bytes();
        let pool = WorkerPool::new(workers);
        debug!("Writing payloads with {} workers", pool.workers());

        let mut tracker = ProgressTracker::new(total_files as u64, total_bytes);
        let sector_size = self.header.sector_size;
        let report = pool.run(
            self.jobs(),
            |job| write_payload(archive_path, job, sector_size),
            |outcome| {
                let state = tracker.record(outcome.result.as_ref().ok().copied());
                match &outcome.result {
                    Ok(len) => {
                        debug!(
                            "Packing [{}/{}]: {} ({} bytes)",
                            state.processed_files,
                            total_files,
                            outcome.path.display(),
                            len
                        );
                        debug!(
                            "Progress: {}/{} bytes ({}%)",
                            state.processed_bytes, total_bytes, state.progress_percent as u32
                        );
                    }
                    Err(e) => error!("Error packing file {}: {}", outcome.path.display(), e),
                }
                if let Some(cb) = progress {
                    cb(state);
                }
            },
        );

        Ok(PackReport {
            archive_path: archive_path.to_path_buf(),
            header: self.header,
            archive_size: self.layout.archive_size(),
            file_count: total_files,
            total_bytes,
            failures: report.failures,
        })
    }

    fn jobs(&self) -> Vec<PackJob> {
        self.files
            .iter()
            .zip(&self.entries)
            .enumerate()
            .map(|(index, (file, entry))| PackJob {
                index,
                source: file.path.clone(),
                offset: self.header.sector_offset(entry.start_sector),
                size: file.size,
            })
            .collect()
    }
}

/// One payload write: copy `source` to `offset` in the archive and pad to a sector.
#[derive(Debug, Clone)]
pub struct PackJob {
    pub index: usize,
    pub source: PathBuf,
    pub offset: u64,
    pub size: u64,
}

impl Job for PackJob {
    fn index(&self) -> usize {
        self.index
    }

    fn path(&self) -> &Path {
        &self.source
    }
}

fn write_payload(archive_path: &Path, job: &PackJob, sector_size: u32) -> Result<u64, CdfsError> {
    let data = fs::read(&job.source).map_err(|e| CdfsError::io(&job.source, e))?;
    let len = data.len() as u64;
    if len != job.size {
        return Err(CdfsError::SourceChanged {
            path: job.source.clone(),
            expected: job.size,
            found: len,
        });
    }

    let io_err = |e: io::Error| CdfsError::io(archive_path, e);
    let mut out = OpenOptions::new().write(true).open(archive_path).map_err(io_err)?;
    out.seek(SeekFrom::Start(job.offset)).map_err(io_err)?;
    out.write_all(&data).map_err(io_err)?;
    let padding = layout::align_up(len, sector_size as u64) - len;
    if padding > 0 {
        io::copy(&mut io::repeat(0).take(padding), &mut out).map_err(io_err)?;
    }
    Ok(len)
}

/// Outcome of a pack run.
///
/// `Ok(PackReport)` means the preamble and every sector allocation were written. Payload
/// jobs that failed are listed in `failures` and are not reflected anywhere else.
#[derive(Debug)]
pub struct PackReport {
    pub archive_path: PathBuf,
    pub header: ArchiveHeader,
    pub archive_size: u64,
    pub file_count: usize,
    pub total_bytes: u64,
    pub failures: Vec<TaskFailure>,
}

impl PackReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Packs every regular file under `source_dir` into `archive_path`.
pub fn pack_archive(
    source_dir: &Path,
    archive_path: &Path,
    opts: &PackOptions,
) -> Result<PackReport, CdfsError> {
    pack_archive_with_progress(source_dir, archive_path, opts, None)
}

/// Like [`pack_archive`], reporting each finished payload to `progress`.
pub fn pack_archive_with_progress(
    source_dir: &Path,
    archive_path: &Path,
    opts: &PackOptions,
    progress: Option<&ProgressCallback>,
) -> Result<PackReport, CdfsError> {
    opts.validate()?;
    let start = Instant::now();

    let files = collect_source_files(source_dir)?;
    info!("Found {} files for packing", files.len());

    let plan = PackPlan::build(files, opts)?;
    debug!(
        "Layout: first sector at {} bytes, {} sectors of {} bytes, {} strings",
        plan.header.first_sector_offset,
        plan.header.total_sectors,
        plan.header.sector_size,
        plan.header.string_table_entries
    );
    let report = plan.write_archive(archive_path, opts.workers, progress)?;

    info!(
        "Packing completed in {:.2}s. Archive saved to {}",
        start.elapsed().as_secs_f64(),
        archive_path.display()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn source(rel: &str, size: u64) -> SourceFile {
        SourceFile {
            path: PathBuf::from("/src").join(rel),
            rel_path: PathBuf::from(rel),
            size,
        }
    }

    #[test]
    fn plan_shares_directory_strings() {
        let files = vec![source("maps/a.bsp", 10), source("maps/b.bsp", 3000), source("c.txt", 1)];
        let plan = PackPlan::build(files, &PackOptions::default()).unwrap();
        assert_eq!(plan.entries[0].dir_name_offset, plan.entries[1].dir_name_offset);
        assert_eq!(plan.entries[2].dir_name_offset, 0);
        assert_eq!(plan.strings.lookup(plan.entries[1].file_name_offset).unwrap(), "B.BSP");
        assert_eq!(
            plan.entries.iter().map(|e| e.start_sector).collect::<Vec<_>>(),
            vec![0, 1, 3]
        );
        assert_eq!(plan.header.total_sectors, 4);
        assert_eq!(plan.header.string_table_entries, 5);
        assert_eq!(plan.header.file_table_length, 48);
    }

    #[test]
    fn plan_rejects_oversized_files() {
        let files = vec![source("huge.bin", u32::MAX as u64 + 1)];
        assert!(matches!(
            PackPlan::build(files, &PackOptions::default()),
            Err(CdfsError::FileTooLarge { .. })
        ));
    }

    #[test]
    fn walk_lists_files_before_subdirectories() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::create_dir_all(dir.path().join("a_dir"))?;
        fs::write(dir.path().join("a_dir").join("inner.txt"), b"x")?;
        fs::write(dir.path().join("z.txt"), b"zz")?;
        fs::write(dir.path().join("b.txt"), b"")?;

        let files = collect_source_files(dir.path())?;
        let rels: Vec<_> = files.iter().map(|f| f.rel_path.clone()).collect();
        assert_eq!(
            rels,
            vec![
                PathBuf::from("b.txt"),
                PathBuf::from("z.txt"),
                Path::new("a_dir").join("inner.txt"),
            ]
        );
        assert_eq!(files[1].size, 2);
        Ok(())
    }

    #[test]
    fn missing_source_is_reported() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(
            collect_source_files(&missing),
            Err(CdfsError::MissingSource(_))
        ));
    }

    #[test]
    fn changed_source_is_not_written() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let src = dir.path().join("grown.bin");
        fs::write(&src, vec![7u8; 100])?;
        let archive = dir.path().join("out.cdfs");
        fs::write(&archive, vec![0u8; 4096])?;

        let job = PackJob {
            index: 0,
            source: src.clone(),
            offset: 2048,
            size: 10,
        };
        assert!(matches!(
            write_payload(&archive, &job, 2048),
            Err(CdfsError::SourceChanged { expected: 10, found: 100, .. })
        ));
        assert!(fs::read(&archive)?.iter().all(|&b| b == 0));
        Ok(())
    }
}
