//! The `HostStats` seam: point-in-time OS readings the agent samples and ranks.
//!
//! Implementations own whatever counters they need to compute "percent since
//! last call". The first such reading after startup may cover a very short
//! window; callers take it as-is.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::types::LoadAvg;

#[derive(Debug, Error)]
pub enum HostStatsError {
    #[error("{0} reading unavailable on this platform")]
    Unsupported(&'static str),
    #[error("{0} reading unavailable")]
    Unavailable(&'static str),
    #[error("no mounted filesystem contains {0}")]
    DiskNotFound(PathBuf),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemoryStats {
    pub total: u64,
    pub used: u64,
    pub used_percent: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiskStats {
    pub total: u64,
    pub used: u64,
    pub used_percent: f64,
}

/// One enumerated process. A `None` field is a reading that failed for this
/// process only.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessReading {
    pub pid: u32,
    pub cpu: Option<f64>,
    // resident set size, bytes
    pub memory: Option<u64>,
    pub name: Option<String>,
}

pub trait HostStats: Send + Sync {
    /// Aggregate CPU busy percent across all logical CPUs.
    fn cpu_percent(&self) -> Result<f64, HostStatsError>;

    fn memory(&self) -> Result<MemoryStats, HostStatsError>;

    /// Usage of the filesystem holding `path`.
    fn disk_usage(&self, path: &Path) -> Result<DiskStats, HostStatsError>;

    fn load_average(&self) -> Result<LoadAvg, HostStatsError>;

    /// Snapshot of every live process. Fails only when the listing itself fails.
    fn processes(&self) -> Result<Vec<ProcessReading>, HostStatsError>;
}

/// `used / total` as a percentage; zero when `total` is zero.
pub fn percent_of(used: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    used as f64 / total as f64 * 100.0
}
