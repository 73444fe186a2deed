//! Sector allocation for a pack run.
//!
//! Payloads are placed back-to-back in discovery order, each one starting on a sector
//! boundary. The plan depends only on the sizes, the string table length and the sector
//! size, so the same inputs always produce the same archive layout.

use crate::archive::{ENTRY_SIZE, HEADER_SIZE};
use crate::CdfsError;

/// Rounds `value` up to the next multiple of `align` (`align` > 0).
pub fn align_up(value: u64, align: u64) -> u64 {
    value.div_ceil(align) * align
}

/// Sectors needed to hold `size` bytes.
pub fn sectors_for(size: u64, sector_size: u32) -> u64 {
    size.div_ceil(sector_size as u64)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutPlan {
    pub sector_size: u32,
    pub file_table_length: u32,
    pub string_table_length: u32,
    /// Header, file table and string table before padding.
    pub preamble_len: u64,
    pub first_sector_offset: u32,
    pub total_sectors: u32,
    /// Start sector of every entry, in the order the sizes were given.
    pub start_sectors: Vec<u32>,
}

impl LayoutPlan {
    /// Absolute byte offset of a sector.
    pub fn sector_offset(&self, sector: u32) -> u64 {
        self.first_sector_offset as u64 + sector as u64 * self.sector_size as u64
    }

    /// Final archive size, including the padding of the last payload.
    pub fn archive_size(&self) -> u64 {
        self.sector_offset(self.total_sectors)
    }

    /// Zero bytes between the end of the preamble and the first sector.
    pub fn preamble_padding(&self) -> u64 {
        self.first_sector_offset as u64 - self.preamble_len
    }
}

/// Computes table sizes, the first sector offset and a start sector per entry.
pub fn plan(sizes: &[u64], sector_size: u32, string_table_len: usize) -> Result<LayoutPlan, CdfsError> {
    if sector_size == 0 {
        return Err(CdfsError::InvalidSectorSize(sector_size));
    }

    let file_table_length = sizes
        .len()
        .checked_mul(ENTRY_SIZE)
        .and_then(|n| u32::try_from(n).ok())
        .ok_or(CdfsError::LayoutOverflow("file_table_length"))?;
    let string_table_length =
        u32::try_from(string_table_len).map_err(|_| CdfsError::LayoutOverflow("string_table_length"))?;

    let preamble_len = HEADER_SIZE as u64 + file_table_length as u64 + string_table_length as u64;
    let first_sector_offset = u32::try_from(align_up(preamble_len, sector_size as u64))
        .map_err(|_| CdfsError::LayoutOverflow("first_sector_offset"))?;

    let mut start_sectors = Vec::with_capacity(sizes.len());
    let mut current: u64 = 0;
    for &size in sizes {
        let start = u32::try_from(current).map_err(|_| CdfsError::LayoutOverflow("start_sector"))?;
        start_sectors.push(start);
        current += sectors_for(size, sector_size);
    }
    let total_sectors = u32::try_from(current).map_err(|_| CdfsError::LayoutOverflow("total_sectors"))?;

    Ok(LayoutPlan {
        sector_size,
        file_table_length,
        string_table_length,
        preamble_len,
        first_sector_offset,
        total_sectors,
        start_sectors,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_plan_still_reserves_one_sector_of_preamble() {
        let plan = plan(&[], 2048, 1).unwrap();
        assert_eq!(plan.file_table_length, 0);
        assert_eq!(plan.preamble_len, 41);
        assert_eq!(plan.first_sector_offset, 2048);
        assert_eq!(plan.total_sectors, 0);
        assert_eq!(plan.archive_size(), 2048);
        assert_eq!(plan.preamble_padding(), 2007);
    }

    #[test]
    fn entries_are_allocated_back_to_back_in_order() {
        let plan = plan(&[10, 2048, 0, 2049, 1], 2048, 30).unwrap();
        assert_eq!(plan.start_sectors, vec![0, 1, 2, 2, 4]);
        assert_eq!(plan.total_sectors, 5);
        assert_eq!(plan.file_table_length, 80);
    }

    #[test]
    fn first_sector_offset_is_aligned_and_covers_preamble() {
        for sector_size in [1u32, 7, 512, 2048, 4096] {
            let plan = plan(&[1, 2, 3], sector_size, 123).unwrap();
            let first = plan.first_sector_offset as u64;
            assert_eq!(first % sector_size as u64, 0);
            assert!(first >= plan.preamble_len);
            assert!(first < plan.preamble_len + sector_size as u64);
        }
    }

    #[test]
    fn exact_multiple_needs_no_padding() {
        // 40 + 16 + 8 = 64
        let plan = plan(&[5], 64, 8).unwrap();
        assert_eq!(plan.first_sector_offset, 64);
        assert_eq!(plan.preamble_padding(), 0);
    }

    #[test]
    fn zero_sector_size_is_rejected() {
        assert!(matches!(plan(&[1], 0, 1), Err(CdfsError::InvalidSectorSize(0))));
    }

    #[test]
    fn sector_count_overflow_is_rejected() {
        let sizes = vec![u32::MAX as u64; 3];
        assert!(matches!(
            plan(&sizes, 1, 1),
            Err(CdfsError::LayoutOverflow("total_sectors")) | Err(CdfsError::LayoutOverflow("start_sector"))
        ));
    }

    #[test]
    fn helpers_round_up() {
        assert_eq!(align_up(41, 2048), 2048);
        assert_eq!(align_up(2048, 2048), 2048);
        assert_eq!(sectors_for(0, 2048), 0);
        assert_eq!(sectors_for(2049, 2048), 2);
    }
}
