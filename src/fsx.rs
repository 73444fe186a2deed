//! Filesystem helpers shared by pack and unpack.
//!
//! Stored directories use `\` as separator regardless of the host; these helpers
//! translate between stored names and host paths, and pre-size archive files.

use std::fs::File;
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Component, Path, PathBuf};

use crate::CdfsError;

/// Separator used inside the string table.
pub const STORED_SEPARATOR: char = '\\';

/// Grows `file` to exactly `len` bytes; the new tail reads as zeros.
///
/// Uses `set_len` and falls back to writing a single zero byte at `len - 1` when the
/// filesystem refuses to truncate-extend.
pub fn preallocate(file: &mut File, len: u64) -> io::Result<()> {
    match file.set_len(len) {
        Ok(()) => Ok(()),
        Err(e) if len > 0 => {
            tracing::debug!("set_len({}) failed ({}), extending with a write", len, e);
            file.seek(SeekFrom::Start(len - 1))?;
            file.write_all(&[0])?;
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Splits a path relative to the source root into its stored directory and file name.
///
/// Directory components are joined with [`STORED_SEPARATOR`]; a file in the root gets an
/// empty directory.
pub fn split_relative(rel: &Path) -> Result<(String, String), CdfsError> {
    let mut parts = Vec::new();
    for component in rel.components() {
        match component {
            Component::Normal(part) => {
                let part = part
                    .to_str()
                    .ok_or_else(|| CdfsError::NonUtf8Path(rel.to_path_buf()))?;
                parts.push(part);
            }
            Component::CurDir => {}
            _ => return Err(CdfsError::UnsafePath(rel.display().to_string())),
        }
    }
    let name = parts
        .pop()
        .ok_or_else(|| CdfsError::UnsafePath(rel.display().to_string()))?;
    Ok((parts.join(&STORED_SEPARATOR.to_string()), name.to_string()))
}

/// A stored component is safe when the host reads it back as exactly one plain name.
///
/// `:` is only refused where the host gives it meaning (drive and stream prefixes).
fn is_safe_component(part: &str) -> bool {
    if part.is_empty() || part.contains(['/', '\\', '\0']) {
        return false;
    }
    if cfg!(windows) && part.contains(':') {
        return false;
    }
    let mut components = Path::new(part).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

/// Maps a stored directory and name onto a host path below `root`.
///
/// Refuses anything that could escape `root`.
pub fn host_path(root: &Path, dir: &str, name: &str) -> Result<PathBuf, CdfsError> {
    let mut path = root.to_path_buf();
    if !dir.is_empty() {
        for part in dir.split(STORED_SEPARATOR) {
            if !is_safe_component(part) {
                return Err(CdfsError::UnsafePath(crate::archive::display_path(dir, name)));
            }
            path.push(part);
        }
    }
    if !is_safe_component(name) {
        return Err(CdfsError::UnsafePath(crate::archive::display_path(dir, name)));
    }
    path.push(name);
    Ok(path)
}
