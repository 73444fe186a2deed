use cdfs::archive::HEADER_SIZE;
use cdfs::{pack_archive, verify_archive, CdfsError, ErrorKind, PackOptions};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::{tempdir, TempDir};

fn packed_archive() -> Result<(TempDir, PathBuf), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let src = dir.path().join("src");
    fs::create_dir_all(src.join("maps"))?;
    fs::write(src.join("maps").join("level1.map"), vec![9u8; 4000])?;
    fs::write(src.join("boot.cfg"), b"fullscreen=1\n")?;
    let archive = dir.path().join("game.dat");
    pack_archive(&src, &archive, &PackOptions::default())?;
    Ok((dir, archive))
}

fn patch_u32(path: &Path, offset: usize, value: u32) -> Result<(), Box<dyn std::error::Error>> {
    let mut bytes = fs::read(path)?;
    bytes[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    fs::write(path, bytes)?;
    Ok(())
}

#[test]
fn fresh_archive_passes() -> Result<(), Box<dyn std::error::Error>> {
    let (_dir, archive) = packed_archive()?;
    let summary = verify_archive(&archive)?;
    assert_eq!(summary.file_count, 2);
    assert_eq!(summary.total_sectors, 3);
    assert!(!summary.version_mismatch);
    Ok(())
}

#[test]
fn wrong_magic_is_a_format_error() -> Result<(), Box<dyn std::error::Error>> {
    let (_dir, archive) = packed_archive()?;
    patch_u32(&archive, 0, u32::from_le_bytes(*b"PK\x03\x04"))?;
    let err = verify_archive(&archive).unwrap_err();
    assert!(matches!(err, CdfsError::BadMagic { .. }));
    assert_eq!(err.kind(), ErrorKind::Format);
    Ok(())
}

#[test]
fn entry_past_the_end_is_a_bounds_error() -> Result<(), Box<dyn std::error::Error>> {
    let (_dir, archive) = packed_archive()?;
    // Length field of entry 1.
    patch_u32(&archive, HEADER_SIZE + 16 + 12, 1 << 20)?;
    let err = verify_archive(&archive).unwrap_err();
    assert!(matches!(err, CdfsError::EntryBeyondEnd { index: 1, .. }), "{:?}", err);
    assert_eq!(err.kind(), ErrorKind::Layout);
    Ok(())
}

#[test]
fn file_table_length_mismatch_is_detected() -> Result<(), Box<dyn std::error::Error>> {
    let (_dir, archive) = packed_archive()?;
    patch_u32(&archive, 24, 17)?;
    let err = verify_archive(&archive).unwrap_err();
    assert!(matches!(
        err,
        CdfsError::FileTableLengthMismatch {
            expected: 32,
            found: 17
        }
    ));
    Ok(())
}

#[test]
fn version_mismatch_only_warns() -> Result<(), Box<dyn std::error::Error>> {
    let (_dir, archive) = packed_archive()?;
    patch_u32(&archive, 4, 2)?;
    let summary = verify_archive(&archive)?;
    assert!(summary.version_mismatch);
    Ok(())
}

#[test]
fn dangling_name_offset_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let (_dir, archive) = packed_archive()?;
    patch_u32(&archive, HEADER_SIZE, 60_000)?;
    let err = verify_archive(&archive).unwrap_err();
    assert!(matches!(
        err,
        CdfsError::StringRefOutOfBounds {
            index: 0,
            field: "filename",
            ..
        }
    ));
    Ok(())
}

#[test]
fn tiny_file_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let archive = dir.path().join("tiny.dat");
    fs::write(&archive, b"SFDC")?;
    assert!(matches!(
        verify_archive(&archive),
        Err(CdfsError::TooSmall { size: 4 })
    ));
    Ok(())
}
