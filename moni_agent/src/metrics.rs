//! Host readings using sysinfo for moni_agent.

use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use sysinfo::{Disks, Networks, ProcessRefreshKind, ProcessesToUpdate, System};

use crate::host::{percent_of, DiskStats, HostStats, HostStatsError, MemoryStats, ProcessReading};
use crate::types::LoadAvg;

/// `HostStats` backed by long-lived sysinfo handles.
///
/// CPU figures are deltas between consecutive refreshes of the shared `System`,
/// so the handle is refreshed once at construction to give the first reading a
/// baseline.
pub struct SysinfoHost {
    sys: Mutex<System>,
    disks: Mutex<Disks>,
}

impl SysinfoHost {
    pub fn new() -> Self {
        let mut sys = System::new();
        sys.refresh_cpu_usage();
        sys.refresh_memory();
        sys.refresh_processes_specifics(ProcessesToUpdate::All, true, process_refresh_kind());
        Self {
            sys: Mutex::new(sys),
            disks: Mutex::new(Disks::new_with_refreshed_list()),
        }
    }

    fn sys(&self) -> MutexGuard<'_, System> {
        // sysinfo state stays usable even if a holder panicked mid-refresh
        self.sys.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SysinfoHost {
    fn default() -> Self {
        Self::new()
    }
}

fn process_refresh_kind() -> ProcessRefreshKind {
    ProcessRefreshKind::nothing().with_cpu().with_memory()
}

fn ensure_supported(reading: &'static str) -> Result<(), HostStatsError> {
    if sysinfo::IS_SUPPORTED_SYSTEM {
        Ok(())
    } else {
        Err(HostStatsError::Unsupported(reading))
    }
}

impl HostStats for SysinfoHost {
    fn cpu_percent(&self) -> Result<f64, HostStatsError> {
        ensure_supported("cpu")?;
        let mut sys = self.sys();
        sys.refresh_cpu_usage();
        if sys.cpus().is_empty() {
            return Err(HostStatsError::Unavailable("cpu"));
        }
        let pct = f64::from(sys.global_cpu_usage());
        if !pct.is_finite() {
            return Err(HostStatsError::Unavailable("cpu"));
        }
        Ok(pct.clamp(0.0, 100.0))
    }

    fn memory(&self) -> Result<MemoryStats, HostStatsError> {
        ensure_supported("memory")?;
        let mut sys = self.sys();
        sys.refresh_memory();
        let total = sys.total_memory();
        if total == 0 {
            return Err(HostStatsError::Unavailable("memory"));
        }
        // used = total - available, matching what top/free report as pressure
        let used = total.saturating_sub(sys.available_memory());
        Ok(MemoryStats {
            total,
            used,
            used_percent: percent_of(used, total),
        })
    }

    fn disk_usage(&self, path: &Path) -> Result<DiskStats, HostStatsError> {
        ensure_supported("disk")?;
        let mut disks = self.disks.lock().unwrap_or_else(PoisonError::into_inner);
        disks.refresh(true);
        // The filesystem holding `path` is the one with the deepest matching mount point.
        let disk = disks
            .list()
            .iter()
            .filter(|d| path.starts_with(d.mount_point()))
            .max_by_key(|d| d.mount_point().as_os_str().len())
            .ok_or_else(|| HostStatsError::DiskNotFound(path.to_path_buf()))?;
        let total = disk.total_space();
        let used = total.saturating_sub(disk.available_space());
        Ok(DiskStats {
            total,
            used,
            used_percent: percent_of(used, total),
        })
    }

    fn load_average(&self) -> Result<LoadAvg, HostStatsError> {
        ensure_supported("load average")?;
        let load = System::load_average();
        Ok(LoadAvg {
            load1: load.one,
            load5: load.five,
            load15: load.fifteen,
        })
    }

    fn processes(&self) -> Result<Vec<ProcessReading>, HostStatsError> {
        ensure_supported("process list")?;
        let mut sys = self.sys();
        sys.refresh_processes_specifics(ProcessesToUpdate::All, true, process_refresh_kind());
        let procs = sys
            .processes()
            .values()
            .map(|p| {
                let cpu = f64::from(p.cpu_usage());
                let name = p.name().to_string_lossy().into_owned();
                ProcessReading {
                    pid: p.pid().as_u32(),
                    cpu: cpu.is_finite().then_some(cpu),
                    memory: Some(p.memory()),
                    name: (!name.is_empty()).then_some(name),
                }
            })
            .collect();
        Ok(procs)
    }
}

/// First non-loopback IPv4 address across interfaces, in interface-name order.
pub fn primary_ipv4() -> Option<Ipv4Addr> {
    let networks = Networks::new_with_refreshed_list();
    let list = networks.list();
    let mut names: Vec<&String> = list.keys().collect();
    names.sort();
    names
        .into_iter()
        .filter_map(|name| list.get(name))
        .flat_map(|data| data.ip_networks().iter())
        .find_map(|net| match net.addr {
            IpAddr::V4(v4) if !v4.is_loopback() && !v4.is_unspecified() => Some(v4),
            _ => None,
        })
}
