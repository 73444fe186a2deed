//! # CDFS Archive Format
//!
//! This module defines the on-disk structures of a CDFS archive and the logic to encode
//! and decode them. Every field is a little-endian `u32`.
//!
//! 1.  **Header** (40 bytes): magic, version, sector size, recommended cache size,
//!     first sector offset, total sectors, file table length, file table entries,
//!     string table length, string table entries.
//! 2.  **File table**: `file_table_entries` records of 16 bytes each
//!     (`file_name_offset`, `dir_name_offset`, `start_sector`, `length`).
//! 3.  **String table**: `string_table_length` bytes of null-terminated, upper-cased
//!     path components, see [`string_table`].
//! 4.  Zero padding up to `first_sector_offset`, followed by the sector-aligned payloads.

pub mod string_table;

pub use string_table::{InternCache, StringTable};

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::CdfsError;

/// Magic word, `"CDFS"` when read big-endian (stored as `SFDC` on disk).
pub const CDFS_MAGIC: u32 = 0x4344_4653;
pub const CDFS_VERSION: u32 = 1;
pub const HEADER_SIZE: usize = 40;
pub const ENTRY_SIZE: usize = 16;

fn le_u32(buf: &[u8], offset: usize) -> u32 {
    let mut word = [0u8; 4];
    word.copy_from_slice(&buf[offset..offset + 4]);
    u32::from_le_bytes(word)
}

/// Renders a magic word as text, falling back to `?` for non-printable bytes.
pub fn magic_text(magic: u32) -> String {
    magic
        .to_be_bytes()
        .iter()
        .map(|&b| if b.is_ascii_graphic() { b as char } else { '?' })
        .collect()
}

/// The fixed-size header at the start of every archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveHeader {
    pub magic: u32,
    pub version: u32,
    /// Bytes per sector; every payload starts on a sector boundary.
    pub sector_size: u32,
    /// Informational hint for readers, never enforced.
    pub recommended_cache_size: u32,
    /// Byte offset of sector 0.
    pub first_sector_offset: u32,
    pub total_sectors: u32,
    pub file_table_length: u32,
    pub file_table_entries: u32,
    pub string_table_length: u32,
    /// Approximate number of strings in the string table. Informational only.
    pub string_table_entries: u32,
}

impl ArchiveHeader {
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let fields = [
            self.magic,
            self.version,
            self.sector_size,
            self.recommended_cache_size,
            self.first_sector_offset,
            self.total_sectors,
            self.file_table_length,
            self.file_table_entries,
            self.string_table_length,
            self.string_table_entries,
        ];
        let mut out = [0u8; HEADER_SIZE];
        for (slot, field) in out.chunks_exact_mut(4).zip(fields) {
            slot.copy_from_slice(&field.to_le_bytes());
        }
        out
    }

    /// Decodes a header, failing on a short buffer or a foreign magic word.
    ///
    /// A version mismatch is not an error here; see [`ArchiveHeader::version_matches`].
    pub fn from_bytes(buf: &[u8]) -> Result<Self, CdfsError> {
        if buf.len() < HEADER_SIZE {
            return Err(CdfsError::TooSmall {
                size: buf.len() as u64,
            });
        }
        let header = ArchiveHeader {
            magic: le_u32(buf, 0),
            version: le_u32(buf, 4),
            sector_size: le_u32(buf, 8),
            recommended_cache_size: le_u32(buf, 12),
            first_sector_offset: le_u32(buf, 16),
            total_sectors: le_u32(buf, 20),
            file_table_length: le_u32(buf, 24),
            file_table_entries: le_u32(buf, 28),
            string_table_length: le_u32(buf, 32),
            string_table_entries: le_u32(buf, 36),
        };
        if header.magic != CDFS_MAGIC {
            return Err(CdfsError::BadMagic {
                found: header.magic,
                text: magic_text(header.magic),
            });
        }
        Ok(header)
    }

    pub fn version_matches(&self) -> bool {
        self.version == CDFS_VERSION
    }

    /// Absolute byte offset of a sector.
    pub fn sector_offset(&self, sector: u32) -> u64 {
        self.first_sector_offset as u64 + sector as u64 * self.sector_size as u64
    }

    /// Bytes taken by header, file table and string table together.
    pub fn preamble_len(&self) -> u64 {
        HEADER_SIZE as u64 + self.file_table_length as u64 + self.string_table_length as u64
    }
}

/// One packed file: where its names live in the string table and where its bytes live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileEntry {
    pub file_name_offset: u32,
    pub dir_name_offset: u32,
    /// 0-based, relative to the first sector offset.
    pub start_sector: u32,
    /// Exact payload length, not rounded to sectors.
    pub length: u32,
}

impl FileEntry {
    pub fn to_bytes(&self) -> [u8; ENTRY_SIZE] {
        let mut out = [0u8; ENTRY_SIZE];
        out[0..4].copy_from_slice(&self.file_name_offset.to_le_bytes());
        out[4..8].copy_from_slice(&self.dir_name_offset.to_le_bytes());
        out[8..12].copy_from_slice(&self.start_sector.to_le_bytes());
        out[12..16].copy_from_slice(&self.length.to_le_bytes());
        out
    }

    /// `buf` must hold at least [`ENTRY_SIZE`] bytes.
    pub fn from_bytes(buf: &[u8]) -> Self {
        FileEntry {
            file_name_offset: le_u32(buf, 0),
            dir_name_offset: le_u32(buf, 4),
            start_sector: le_u32(buf, 8),
            length: le_u32(buf, 12),
        }
    }

    /// Byte range `[start, end)` of the payload inside the archive.
    pub fn byte_range(&self, header: &ArchiveHeader) -> (u64, u64) {
        let start = header.sector_offset(self.start_sector);
        (start, start + self.length as u64)
    }
}

/// Reads as many bytes as are available up to `buf.len()`, returning the count.
fn read_up_to(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Sequential reader over the preamble (header, file table, string table) of an archive.
///
/// Each step fails with a specific error when its region is short, so callers can
/// interleave their own checks between the steps.
pub struct ArchiveReader {
    path: PathBuf,
    reader: BufReader<File>,
    archive_size: u64,
    header: ArchiveHeader,
}

impl ArchiveReader {
    /// Opens the archive and decodes its header.
    pub fn open(path: &Path) -> Result<Self, CdfsError> {
        let file = File::open(path).map_err(|e| CdfsError::io(path, e))?;
        let archive_size = file
            .metadata()
            .map_err(|e| CdfsError::io(path, e))?
            .len();
        let mut reader = BufReader::new(file);

        let mut buf = [0u8; HEADER_SIZE];
        let got = read_up_to(&mut reader, &mut buf).map_err(|e| CdfsError::io(path, e))?;
        if got < HEADER_SIZE {
            return Err(CdfsError::TooSmall { size: archive_size });
        }
        let header = ArchiveHeader::from_bytes(&buf)?;
        if !header.version_matches() {
            warn!(
                "Version mismatch in {}: expected {}, found {}",
                path.display(),
                CDFS_VERSION,
                header.version
            );
        }

        Ok(Self {
            path: path.to_path_buf(),
            reader,
            archive_size,
            header,
        })
    }

    pub fn header(&self) -> &ArchiveHeader {
        &self.header
    }

    pub fn archive_size(&self) -> u64 {
        self.archive_size
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads `file_table_entries` records directly after the header.
    pub fn read_file_table(&mut self) -> Result<Vec<FileEntry>, CdfsError> {
        let count = self.header.file_table_entries;
        // Capacity is bounded by what the file could possibly hold.
        let plausible = (self.archive_size / ENTRY_SIZE as u64).min(count as u64) as usize;
        let mut entries = Vec::with_capacity(plausible);
        let mut buf = [0u8; ENTRY_SIZE];
        for index in 0..count {
            let got = read_up_to(&mut self.reader, &mut buf)
                .map_err(|e| CdfsError::io(&self.path, e))?;
            if got < ENTRY_SIZE {
                return Err(CdfsError::TruncatedFileTable { index });
            }
            entries.push(FileEntry::from_bytes(&buf));
        }
        Ok(entries)
    }

    /// Reads the string table; must be called after [`ArchiveReader::read_file_table`].
    pub fn read_string_table(&mut self) -> Result<StringTable, CdfsError> {
        let expected = self.header.string_table_length;
        let mut bytes = Vec::new();
        (&mut self.reader)
            .take(expected as u64)
            .read_to_end(&mut bytes)
            .map_err(|e| CdfsError::io(&self.path, e))?;
        if bytes.len() < expected as usize {
            return Err(CdfsError::TruncatedStringTable {
                expected,
                found: bytes.len() as u64,
            });
        }
        Ok(StringTable::from_bytes(bytes))
    }

    /// Reads both tables, consuming the reader.
    pub fn into_preamble(mut self) -> Result<Preamble, CdfsError> {
        let entries = self.read_file_table()?;
        let strings = self.read_string_table()?;
        Ok(Preamble {
            header: self.header,
            archive_size: self.archive_size,
            entries,
            strings,
        })
    }
}

/// Everything in front of the first sector, read once and never mutated.
#[derive(Debug, Clone)]
pub struct Preamble {
    pub header: ArchiveHeader,
    pub archive_size: u64,
    pub entries: Vec<FileEntry>,
    pub strings: StringTable,
}

impl Preamble {
    pub fn read(path: &Path) -> Result<Self, CdfsError> {
        ArchiveReader::open(path)?.into_preamble()
    }

    /// Directory and file name of an entry, as stored (upper-cased, backslash-separated).
    pub fn entry_names(&self, entry: &FileEntry) -> Result<(&str, &str), CdfsError> {
        let dir = self.strings.lookup(entry.dir_name_offset)?;
        let name = self.strings.lookup(entry.file_name_offset)?;
        Ok((dir, name))
    }
}

/// Joins a stored directory and file name the way listings show them (`DIR\NAME`).
pub fn display_path(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{}\\{}", dir, name)
    }
}
