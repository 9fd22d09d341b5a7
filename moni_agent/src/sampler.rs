//! Background sampler: once per interval, reads the host and appends one
//! `DataPoint` to the store. Per-tick failures are logged and never stop the loop.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, warn};

use crate::host::{HostStats, HostStatsError};
use crate::store::{Store, StoreError};
use crate::types::DataPoint;

#[derive(Debug, Error)]
pub enum SampleError {
    /// A host reading failed; nothing was written for this tick.
    #[error("sample skipped, {reading} reading failed: {source}")]
    Skipped {
        reading: &'static str,
        #[source]
        source: HostStatsError,
    },
    #[error("failed to store sample: {0}")]
    Storage(#[from] StoreError),
    #[error("host reading task failed: {0}")]
    Task(#[from] JoinError),
}

fn skipped(reading: &'static str) -> impl FnOnce(HostStatsError) -> SampleError {
    move |source| SampleError::Skipped { reading, source }
}

/// Reads every field of one point, or none of them.
fn read_point(
    host: &dyn HostStats,
    disk_path: &Path,
    timestamp: i64,
) -> Result<DataPoint, SampleError> {
    let cpu_percent = host.cpu_percent().map_err(skipped("cpu"))?;
    let mem = host.memory().map_err(skipped("memory"))?;
    let disk = host.disk_usage(disk_path).map_err(skipped("disk"))?;
    let load_avg = host.load_average().map_err(skipped("load average"))?;
    Ok(DataPoint {
        timestamp,
        cpu_percent,
        mem_total: mem.total,
        mem_used: mem.used,
        mem_percent: mem.used_percent,
        disk_total: disk.total,
        disk_used: disk.used,
        disk_percent: disk.used_percent,
        load_avg,
    })
}

pub struct Sampler {
    host: Arc<dyn HostStats>,
    store: Arc<Store>,
    disk_path: PathBuf,
}

impl Sampler {
    pub fn new(host: Arc<dyn HostStats>, store: Arc<Store>, disk_path: impl Into<PathBuf>) -> Self {
        Self {
            host,
            store,
            disk_path: disk_path.into(),
        }
    }

    /// One tick: sample the host and store the point under `timestamp`.
    pub async fn sample_at(&self, timestamp: i64) -> Result<DataPoint, SampleError> {
        let host = Arc::clone(&self.host);
        let disk_path = self.disk_path.clone();
        // host readings block; keep them off the runtime threads
        let point =
            tokio::task::spawn_blocking(move || read_point(host.as_ref(), &disk_path, timestamp))
                .await??;
        self.store.put(timestamp, &point).await?;
        Ok(point)
    }
}

/// Runs `sampler` every `period` until the task is aborted.
///
/// The first sample is taken one full period after start so that "percent
/// since last refresh" readings cover a real window. Ticks missed while a
/// sample is stuck are skipped, not replayed.
pub fn spawn_sampler(sampler: Arc<Sampler>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let now = Utc::now().timestamp();
            match sampler.sample_at(now).await {
                Ok(point) => debug!(
                    timestamp = point.timestamp,
                    cpu = point.cpu_percent,
                    mem = point.mem_percent,
                    "sample recorded"
                ),
                Err(e @ SampleError::Skipped { .. }) => warn!(timestamp = now, "{e}"),
                Err(e) => warn!(timestamp = now, error = %e, "sample not recorded"),
            }
        }
    })
}
