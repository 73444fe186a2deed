//! Deduplicating table of null-terminated, upper-cased path components.
//!
//! The table always starts with an empty string at offset 0, which entries use when a
//! file has no directory component. Strings are addressed by the offset of their first
//! byte and end at the next null byte.

use std::collections::HashMap;

use crate::CdfsError;

/// Offsets handed out during one pack run, keyed by the upper-cased string.
///
/// Lives only as long as the build session that owns it.
#[derive(Debug, Default)]
pub struct InternCache {
    offsets: HashMap<String, u32>,
    /// Table bytes before this position are already indexed in `offsets`.
    indexed: usize,
}

impl InternCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringTable {
    bytes: Vec<u8>,
    slots: u32,
}

impl Default for StringTable {
    fn default() -> Self {
        Self::new()
    }
}

impl StringTable {
    /// A fresh table holding only the empty string at offset 0.
    pub fn new() -> Self {
        Self {
            bytes: vec![0],
            slots: 1,
        }
    }

    /// Wraps a table read from an archive.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let slots = bytes.iter().filter(|&&b| b == 0).count() as u32;
        Self { bytes, slots }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Number of slots the table holds. Written to the header as a hint.
    pub fn slot_count(&self) -> u32 {
        self.slots
    }

    /// Reads the string starting at `offset`, up to the next null byte or the table end.
    pub fn lookup(&self, offset: u32) -> Result<&str, CdfsError> {
        lookup(&self.bytes, offset)
    }

    /// Returns the offset of `value` (upper-cased), appending it if it is not present yet.
    ///
    /// Existing entries are matched at entry starts only, never on a suffix of a longer
    /// string.
    pub fn intern(&mut self, cache: &mut InternCache, value: &str) -> Result<u32, CdfsError> {
        let value = value.to_uppercase();
        self.index_into(cache);
        if let Some(&offset) = cache.offsets.get(&value) {
            return Ok(offset);
        }

        let offset = self.append(value.as_bytes())?;
        cache.offsets.insert(value, offset);
        cache.indexed = self.bytes.len();
        Ok(offset)
    }

    /// Records every complete entry the cache has not seen yet, keeping the first offset
    /// of duplicates.
    fn index_into(&self, cache: &mut InternCache) {
        let mut start = cache.indexed;
        while start < self.bytes.len() {
            let Some(n) = self.bytes[start..].iter().position(|&b| b == 0) else {
                break;
            };
            let end = start + n;
            if let (Ok(text), Ok(offset)) = (std::str::from_utf8(&self.bytes[start..end]), u32::try_from(start)) {
                cache.offsets.entry(text.to_string()).or_insert(offset);
            }
            start = end + 1;
        }
        cache.indexed = start;
    }

    fn append(&mut self, value: &[u8]) -> Result<u32, CdfsError> {
        let offset =
            u32::try_from(self.bytes.len()).map_err(|_| CdfsError::LayoutOverflow("string_table_length"))?;
        self.bytes.extend_from_slice(value);
        self.bytes.push(0);
        self.slots += 1;
        Ok(offset)
    }
}

/// Reads a null-terminated string from a raw table.
pub fn lookup(table: &[u8], offset: u32) -> Result<&str, CdfsError> {
    let start = offset as usize;
    if start >= table.len() {
        return Err(CdfsError::StringOffsetOutOfBounds {
            offset,
            len: table.len(),
        });
    }
    let end = table[start..]
        .iter()
        .position(|&b| b == 0)
        .map_or(table.len(), |n| start + n);
    std::str::from_utf8(&table[start..end]).map_err(|source| CdfsError::InvalidString { offset, source })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_table_holds_the_empty_string() {
        let table = StringTable::new();
        assert_eq!(table.as_bytes(), b"\0");
        assert_eq!(table.lookup(0).unwrap(), "");
        assert_eq!(table.slot_count(), 1);
    }

    #[test]
    fn intern_upper_cases_and_appends() {
        let mut table = StringTable::new();
        let mut cache = InternCache::new();
        let data = table.intern(&mut cache, "data").unwrap();
        let readme = table.intern(&mut cache, "Readme.txt").unwrap();
        assert_eq!(data, 1);
        assert_eq!(readme, 6);
        assert_eq!(table.as_bytes(), b"\0DATA\0README.TXT\0");
        assert_eq!(table.lookup(readme).unwrap(), "README.TXT");
        assert_eq!(table.slot_count(), 3);
    }

    #[test]
    fn intern_reuses_offsets_case_insensitively() {
        let mut table = StringTable::new();
        let mut cache = InternCache::new();
        let first = table.intern(&mut cache, "Maps").unwrap();
        let len = table.len();
        assert_eq!(table.intern(&mut cache, "MAPS").unwrap(), first);
        assert_eq!(table.intern(&mut cache, "maps").unwrap(), first);
        assert_eq!(table.len(), len);
    }

    #[test]
    fn empty_string_maps_to_offset_zero() {
        let mut table = StringTable::new();
        let mut cache = InternCache::new();
        table.intern(&mut cache, "SOUND").unwrap();
        assert_eq!(table.intern(&mut cache, "").unwrap(), 0);
        assert_eq!(table.slot_count(), 2);
    }

    #[test]
    fn reloaded_table_is_indexed_on_first_use() {
        let mut table = StringTable::new();
        let mut cache = InternCache::new();
        let offset = table.intern(&mut cache, "TEXTURES").unwrap();

        let mut reloaded = StringTable::from_bytes(table.as_bytes().to_vec());
        let mut fresh = InternCache::new();
        assert_eq!(reloaded.intern(&mut fresh, "textures").unwrap(), offset);
        assert_eq!(reloaded.len(), table.len());
    }

    #[test]
    fn suffixes_are_not_reused() {
        let mut table = StringTable::new();
        let mut cache = InternCache::new();
        table.intern(&mut cache, "README.TXT").unwrap();
        let mut fresh = InternCache::new();
        let txt = table.intern(&mut fresh, "TXT").unwrap();
        assert_eq!(table.lookup(txt).unwrap(), "TXT");
        assert_eq!(txt, 12);
    }

    #[test]
    fn lookup_rejects_out_of_bounds_and_bad_utf8() {
        assert!(matches!(
            lookup(b"\0ABC\0", 5),
            Err(CdfsError::StringOffsetOutOfBounds { offset: 5, len: 5 })
        ));
        assert!(matches!(
            lookup(b"\0\xff\xfe\0", 1),
            Err(CdfsError::InvalidString { offset: 1, .. })
        ));
        // Unterminated tail reads to the end of the table.
        assert_eq!(lookup(b"\0ABC", 1).unwrap(), "ABC");
        // Starting mid-string yields the suffix.
        assert_eq!(lookup(b"\0ABC\0", 2).unwrap(), "BC");
    }
}
