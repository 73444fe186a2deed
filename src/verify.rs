//! Read-only structural audit of an archive.
//!
//! Checks run in a fixed order and stop at the first violation:
//!
//! 1. the file holds a full header and the magic matches;
//! 2. the first sector offset lies inside the file;
//! 3. `file_table_entries * 16 == file_table_length`;
//! 4. the file table and string table are complete, and the header geometry is
//!    consistent (non-zero sector size, aligned first sector past the preamble,
//!    all sectors inside the file);
//! 5. per entry, in table order: the payload range lies inside the file and both names
//!    resolve to valid text.
//!
//! Payload bytes are never read, so a passing archive may still hold corrupted content.

use std::path::Path;

use tracing::{debug, info};

use crate::archive::{ArchiveHeader, ArchiveReader, ENTRY_SIZE};
use crate::CdfsError;

/// What a successful verification saw.
#[derive(Debug, Clone)]
pub struct VerifySummary {
    pub header: ArchiveHeader,
    pub archive_size: u64,
    pub file_count: u32,
    pub total_sectors: u32,
    /// The archive was written by a different format version.
    pub version_mismatch: bool,
}

fn check_geometry(header: &ArchiveHeader, archive_size: u64) -> Result<(), CdfsError> {
    if header.sector_size == 0 {
        return Err(CdfsError::InvalidSectorSize(0));
    }
    let first = header.first_sector_offset as u64;
    if first % header.sector_size as u64 != 0 {
        return Err(CdfsError::BadGeometry(format!(
            "first sector offset {} is not a multiple of the sector size {}",
            first, header.sector_size
        )));
    }
    if first < header.preamble_len() {
        return Err(CdfsError::BadGeometry(format!(
            "first sector offset {} lies inside the {}-byte preamble",
            first,
            header.preamble_len()
        )));
    }
    let sectors_end = header.sector_offset(header.total_sectors);
    if sectors_end > archive_size {
        return Err(CdfsError::BadGeometry(format!(
            "{} sectors end at {}, past the end of the {}-byte archive",
            header.total_sectors, sectors_end, archive_size
        )));
    }
    Ok(())
}

/// Verifies the archive at `path`, returning the first violation found.
pub fn verify_archive(path: &Path) -> Result<VerifySummary, CdfsError> {
    // 1. size and magic
    let mut reader = ArchiveReader::open(path)?;
    let header = *reader.header();
    let archive_size = reader.archive_size();

    // 2.
    if header.first_sector_offset as u64 > archive_size {
        return Err(CdfsError::FirstSectorBeyondEnd {
            offset: header.first_sector_offset as u64,
            size: archive_size,
        });
    }

    // 3.
    let expected = header.file_table_entries as u64 * ENTRY_SIZE as u64;
    if expected != header.file_table_length as u64 {
        return Err(CdfsError::FileTableLengthMismatch {
            expected,
            found: header.file_table_length,
        });
    }

    // 4.
    debug!("Verifying file table integrity...");
    let entries = reader.read_file_table()?;
    debug!("Verifying string table integrity...");
    let strings = reader.read_string_table()?;
    check_geometry(&header, archive_size)?;

    // 5.
    debug!("Verifying file entries and offsets...");
    for (index, entry) in entries.iter().enumerate() {
        let (_, end) = entry.byte_range(&header);
        if end > archive_size {
            return Err(CdfsError::EntryBeyondEnd {
                index,
                end,
                size: archive_size,
            });
        }
        for (field, offset) in [
            ("filename", entry.file_name_offset),
            ("directory name", entry.dir_name_offset),
        ] {
            if offset as usize >= strings.len() {
                return Err(CdfsError::StringRefOutOfBounds {
                    index,
                    field,
                    offset,
                    table_len: strings.len(),
                });
            }
        }
        for offset in [entry.file_name_offset, entry.dir_name_offset] {
            strings
                .lookup(offset)
                .map_err(|e| CdfsError::EntryStringInvalid {
                    index,
                    source: Box::new(e),
                })?;
        }
    }

    info!(
        "Verification successful: {} files across {} sectors",
        header.file_table_entries, header.total_sectors
    );
    Ok(VerifySummary {
        header,
        archive_size,
        file_count: header.file_table_entries,
        total_sectors: header.total_sectors,
        version_mismatch: !header.version_matches(),
    })
}
