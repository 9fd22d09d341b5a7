//! Scriptable `HostStats` for integration tests.
#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use moni_agent::host::{DiskStats, HostStats, HostStatsError, MemoryStats, ProcessReading};
use moni_agent::types::LoadAvg;

pub const GIB: u64 = 1 << 30;

#[derive(Default)]
pub struct FakeHost {
    pub fail_cpu: AtomicBool,
    pub fail_disk: AtomicBool,
    pub fail_processes: AtomicBool,
    pub process_calls: AtomicUsize,
    pub procs: Mutex<Vec<ProcessReading>>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_processes(procs: Vec<ProcessReading>) -> Self {
        let host = Self::default();
        *host.procs.lock().unwrap() = procs;
        host
    }

    pub fn set_fail_cpu(&self, fail: bool) {
        self.fail_cpu.store(fail, Ordering::SeqCst);
    }

    pub fn process_calls(&self) -> usize {
        self.process_calls.load(Ordering::SeqCst)
    }
}

pub fn proc_with_mem(pid: u32, memory: u64) -> ProcessReading {
    ProcessReading {
        pid,
        cpu: Some(pid as f64),
        memory: Some(memory),
        name: Some(format!("proc{pid}")),
    }
}

impl HostStats for FakeHost {
    fn cpu_percent(&self) -> Result<f64, HostStatsError> {
        if self.fail_cpu.load(Ordering::SeqCst) {
            return Err(HostStatsError::Unavailable("cpu"));
        }
        Ok(12.5)
    }

    fn memory(&self) -> Result<MemoryStats, HostStatsError> {
        Ok(MemoryStats {
            total: 8 * GIB,
            used: 2 * GIB,
            used_percent: 25.0,
        })
    }

    fn disk_usage(&self, path: &Path) -> Result<DiskStats, HostStatsError> {
        if self.fail_disk.load(Ordering::SeqCst) {
            return Err(HostStatsError::DiskNotFound(path.to_path_buf()));
        }
        Ok(DiskStats {
            total: 100 * GIB,
            used: 40 * GIB,
            used_percent: 40.0,
        })
    }

    fn load_average(&self) -> Result<LoadAvg, HostStatsError> {
        Ok(LoadAvg {
            load1: 1.0,
            load5: 0.75,
            load15: 0.5,
        })
    }

    fn processes(&self) -> Result<Vec<ProcessReading>, HostStatsError> {
        self.process_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_processes.load(Ordering::SeqCst) {
            return Err(HostStatsError::Unavailable("process list"));
        }
        Ok(self.procs.lock().unwrap().clone())
    }
}
