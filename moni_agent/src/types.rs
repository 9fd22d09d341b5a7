//! Data types persisted to the store and returned by the query API.
//! Keep this module minimal and stable; it defines the wire format.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LoadAvg {
    pub load1: f64,
    pub load5: f64,
    pub load15: f64,
}

/// One host-health sample. Every field comes from the same tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    /// Unix seconds of the sampling tick.
    pub timestamp: i64,
    pub cpu_percent: f64,
    pub mem_total: u64,
    pub mem_used: u64,
    pub mem_percent: f64,
    pub disk_total: u64,
    pub disk_used: u64,
    pub disk_percent: f64,
    pub load_avg: LoadAvg,
}

/// One ranked process. Built per request, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcInfo {
    pub pid: u32,
    pub cpu: f64,
    // resident set size, bytes
    pub memory: u64,
    pub command: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsResponse {
    /// Oldest first.
    pub points: Vec<DataPoint>,
    pub top_processes: Vec<ProcInfo>,
}

/// Human-readable host summary for the `/info` endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostInfo {
    pub hostname: String,
    pub ip: String,
    pub uptime: String,
    pub os: String,
    pub arch: String,
    pub cpu: String,
    pub memory: String,
    pub disk: String,
}
