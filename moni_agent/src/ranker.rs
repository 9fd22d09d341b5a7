//! Top-N process ranking by CPU or resident memory.

use std::cmp::Reverse;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use thiserror::Error;

use crate::host::{HostStats, HostStatsError, ProcessReading};
use crate::types::ProcInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    #[default]
    Cpu,
    Memory,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid sort key {0:?}, expected \"cpu\" or \"memory\"")]
pub struct ParseSortKeyError(pub String);

impl FromStr for SortKey {
    type Err = ParseSortKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cpu" => Ok(Self::Cpu),
            "memory" => Ok(Self::Memory),
            other => Err(ParseSortKeyError(other.to_string())),
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Cpu => "cpu",
            Self::Memory => "memory",
        })
    }
}

/// Ranks already-enumerated processes.
///
/// A process whose sort-key reading failed is dropped; a failed reading of the
/// other field is reported as zero since it does not affect the order.
pub fn rank_readings(readings: Vec<ProcessReading>, key: SortKey, limit: usize) -> Vec<ProcInfo> {
    let mut ranked: Vec<ProcInfo> = readings
        .into_iter()
        .filter_map(|p| {
            let (cpu, memory) = match key {
                SortKey::Cpu => (p.cpu.filter(|c| c.is_finite())?, p.memory.unwrap_or(0)),
                SortKey::Memory => (p.cpu.filter(|c| c.is_finite()).unwrap_or(0.0), p.memory?),
            };
            Some(ProcInfo {
                pid: p.pid,
                cpu,
                memory,
                command: p.name.unwrap_or_default(),
            })
        })
        .collect();

    match key {
        SortKey::Cpu => ranked.sort_unstable_by(|a, b| b.cpu.total_cmp(&a.cpu)),
        SortKey::Memory => ranked.sort_unstable_by_key(|p| Reverse(p.memory)),
    }
    ranked.truncate(limit);
    ranked
}

/// Takes a fresh process snapshot per call; holds no state of its own.
#[derive(Clone)]
pub struct ProcessRanker {
    host: Arc<dyn HostStats>,
}

impl ProcessRanker {
    pub fn new(host: Arc<dyn HostStats>) -> Self {
        Self { host }
    }

    pub fn rank(&self, key: SortKey, limit: usize) -> Result<Vec<ProcInfo>, HostStatsError> {
        let readings = self.host.processes()?;
        Ok(rank_readings(readings, key, limit))
    }
}
