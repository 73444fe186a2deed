//! Options for pack and unpack runs.

use crate::CdfsError;

pub const DEFAULT_SECTOR_SIZE: u32 = 2048;
pub const DEFAULT_CACHE_SIZE: u32 = 128 * 1024;

/// Environment variable consulted for the worker count when no flag is given.
pub const WORKERS_ENV: &str = "CDFS_WORKERS";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackOptions {
    /// Bytes per sector.
    pub sector_size: u32,
    /// Written to the header as a hint for readers; not enforced.
    pub cache_size_hint: u32,
    /// Worker threads for payload writes. `0` means host parallelism.
    pub workers: usize,
}

impl Default for PackOptions {
    fn default() -> Self {
        Self {
            sector_size: DEFAULT_SECTOR_SIZE,
            cache_size_hint: DEFAULT_CACHE_SIZE,
            workers: 0,
        }
    }
}

impl PackOptions {
    pub fn with_sector_size(mut self, sector_size: u32) -> Self {
        self.sector_size = sector_size;
        self
    }

    pub fn with_cache_size_hint(mut self, cache_size_hint: u32) -> Self {
        self.cache_size_hint = cache_size_hint;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn validate(&self) -> Result<(), CdfsError> {
        if self.sector_size == 0 {
            return Err(CdfsError::InvalidSectorSize(self.sector_size));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UnpackOptions {
    /// Worker threads for payload reads. `0` means host parallelism.
    pub workers: usize,
}

impl UnpackOptions {
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }
}

/// Picks the worker count: explicit value, then [`WORKERS_ENV`], then `0` (auto).
pub fn workers_from_opt_or_env(workers: Option<usize>) -> usize {
    if let Some(n) = workers {
        return n;
    }
    std::env::var(WORKERS_ENV)
        .ok()
        .and_then(|s| s.trim().parse::<usize>().ok())
        .unwrap_or(0)
}
