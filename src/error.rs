use std::path::PathBuf;

/// Broad classes of failure, used by callers that only care about the category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The file is not a CDFS archive at all (bad magic).
    Format,
    /// Offsets, lengths or counts that do not fit the archive or its 32-bit fields.
    Layout,
    /// Bytes in the string table (or a source path) that are not valid text.
    Encoding,
    /// A read or write failed.
    Io,
}

/// The primary error type for all operations in the `cdfs` crate.
#[derive(Debug, thiserror::Error)]
pub enum CdfsError {
    /// An I/O error occurred, typically while reading or writing a file.
    /// Includes the path where the error happened.
    #[error("I/O error on path '{}': {source}", .path.display())]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },

    /// The magic word at the start of the file is not the CDFS signature.
    #[error("invalid file format, magic {found:#010x} ({text})")]
    BadMagic { found: u32, text: String },

    #[error("file is too small to be a CDFS archive ({size} bytes, header is 40)")]
    TooSmall { size: u64 },

    #[error("first sector offset ({offset}) exceeds file size ({size})")]
    FirstSectorBeyondEnd { offset: u64, size: u64 },

    #[error("file table length mismatch, expected {expected}, found {found}")]
    FileTableLengthMismatch { expected: u64, found: u32 },

    #[error("truncated file table at entry {index}")]
    TruncatedFileTable { index: u32 },

    #[error("truncated string table, expected {expected} bytes, found {found}")]
    TruncatedStringTable { expected: u32, found: u64 },

    #[error("invalid sector size {0}")]
    InvalidSectorSize(u32),

    /// Header geometry that contradicts itself (alignment, preamble overlap, sector extent).
    #[error("inconsistent header: {0}")]
    BadGeometry(String),

    #[error("file entry {index} extends beyond end of archive ({end} > {size})")]
    EntryBeyondEnd { index: usize, end: u64, size: u64 },

    #[error("file entry {index} has invalid {field} offset {offset} (string table is {table_len} bytes)")]
    StringRefOutOfBounds {
        index: usize,
        field: &'static str,
        offset: u32,
        table_len: usize,
    },

    #[error("file entry {index} has invalid string table references")]
    EntryStringInvalid {
        index: usize,
        #[source]
        source: Box<CdfsError>,
    },

    #[error("string table offset {offset} is out of bounds ({len} bytes)")]
    StringOffsetOutOfBounds { offset: u32, len: usize },

    #[error("string at offset {offset} is not valid UTF-8")]
    InvalidString {
        offset: u32,
        #[source]
        source: std::str::Utf8Error,
    },

    #[error("path '{}' is not valid UTF-8", .0.display())]
    NonUtf8Path(PathBuf),

    /// A stored name that would escape the destination directory or is otherwise unusable.
    #[error("refusing unsafe stored path '{0}'")]
    UnsafePath(String),

    #[error("'{}' is {size} bytes, larger than the 4 GiB entry limit", .path.display())]
    FileTooLarge { path: PathBuf, size: u64 },

    /// The layout does not fit the 32-bit header fields.
    #[error("archive layout overflows the {0} field")]
    LayoutOverflow(&'static str),

    /// A later file table entry unpacks to the same path.
    #[error("'{}' is shadowed by entry {kept}, which unpacks to the same path", .path.display())]
    ShadowedEntry { path: PathBuf, kept: usize },

    #[error("'{}' changed while packing: planned {expected} bytes, read {found}", .path.display())]
    SourceChanged {
        path: PathBuf,
        expected: u64,
        found: u64,
    },

    #[error("directory '{}' doesn't exist", .0.display())]
    MissingSource(PathBuf),

    #[error("failed to walk source tree: {0}")]
    Walk(#[from] walkdir::Error),
}

impl CdfsError {
    /// Wraps an I/O error with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CdfsError::Io {
            source,
            path: path.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            CdfsError::BadMagic { .. } => ErrorKind::Format,
            CdfsError::EntryStringInvalid { .. }
            | CdfsError::StringOffsetOutOfBounds { .. }
            | CdfsError::InvalidString { .. }
            | CdfsError::NonUtf8Path(_) => ErrorKind::Encoding,
            CdfsError::Io { .. } | CdfsError::SourceChanged { .. } | CdfsError::Walk(_) => {
                ErrorKind::Io
            }
            CdfsError::MissingSource(_) => ErrorKind::Io,
            _ => ErrorKind::Layout,
        }
    }
}

// Generic IO error conversion that doesn't require a path
impl From<std::io::Error> for CdfsError {
    fn from(err: std::io::Error) -> Self {
        CdfsError::Io {
            source: err,
            path: PathBuf::new(),
        }
    }
}
