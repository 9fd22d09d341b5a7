//! Live host summary for the `/info` endpoint. Nothing here is persisted.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::host::HostStats;
use crate::metrics::primary_ipv4;
use crate::types::HostInfo;

const GIB: f64 = (1u64 << 30) as f64;

pub struct SystemInfo {
    host: Arc<dyn HostStats>,
    started: Instant,
    disk_path: PathBuf,
    // resolved once at startup
    hostname: String,
    ip: String,
}

impl SystemInfo {
    /// `started` is the process start instant; uptime is measured from it.
    pub fn new(host: Arc<dyn HostStats>, started: Instant, disk_path: impl Into<PathBuf>) -> Self {
        let hostname = hostname::get()
            .ok()
            .and_then(|s| s.into_string().ok())
            .unwrap_or_else(|| "unknown".to_string());
        let ip = primary_ipv4()
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        Self {
            host,
            started,
            disk_path: disk_path.into(),
            hostname,
            ip,
        }
    }

    /// Blocking: reads memory and disk from the host.
    pub fn snapshot(&self) -> HostInfo {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let memory = self
            .host
            .memory()
            .map(|m| format_gb(m.used, m.total))
            .unwrap_or_else(|_| "unknown".to_string());
        let disk = self
            .host
            .disk_usage(&self.disk_path)
            .map(|d| format_gb(d.used, d.total))
            .unwrap_or_else(|_| "unknown".to_string());
        HostInfo {
            hostname: self.hostname.clone(),
            ip: self.ip.clone(),
            uptime: format_uptime(self.started.elapsed()),
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            cpu: format!("{cores} cores"),
            memory,
            disk,
        }
    }
}

/// Whole seconds as `1h2m3s`, `4m0s`, `59s`.
pub fn format_uptime(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    let (h, m, s) = (secs / 3600, secs % 3600 / 60, secs % 60);
    if h > 0 {
        format!("{h}h{m}m{s}s")
    } else if m > 0 {
        format!("{m}m{s}s")
    } else {
        format!("{s}s")
    }
}

fn format_gb(used: u64, total: u64) -> String {
    format!("{:.1} GB / {:.1} GB", used as f64 / GIB, total as f64 / GIB)
}
