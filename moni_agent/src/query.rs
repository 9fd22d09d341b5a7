//! The metrics query: recent history plus a live process ranking, all or nothing.

use std::sync::Arc;

use thiserror::Error;

use crate::host::HostStatsError;
use crate::ranker::{ParseSortKeyError, ProcessRanker, SortKey};
use crate::store::{Store, StoreError};
use crate::types::MetricsResponse;

#[derive(Debug, Error)]
pub enum QueryError {
    /// Client input was malformed; not a system fault.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("metrics history unreadable: {0}")]
    Storage(#[from] StoreError),
    #[error("process enumeration failed: {0}")]
    ProcessEnumeration(#[from] HostStatsError),
    #[error("process ranking task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl From<ParseSortKeyError> for QueryError {
    fn from(e: ParseSortKeyError) -> Self {
        Self::InvalidParameter(e.to_string())
    }
}

#[derive(Clone)]
pub struct QueryService {
    store: Arc<Store>,
    ranker: ProcessRanker,
}

impl QueryService {
    pub fn new(store: Arc<Store>, ranker: ProcessRanker) -> Self {
        Self { store, ranker }
    }

    /// Up to `history_limit` points (oldest first) and the top `proc_limit`
    /// processes by `sort_by` (`"cpu"` or `"memory"`).
    ///
    /// `sort_by` is validated before the store or the host is touched.
    pub async fn metrics(
        &self,
        history_limit: usize,
        proc_limit: usize,
        sort_by: &str,
    ) -> Result<MetricsResponse, QueryError> {
        let key: SortKey = sort_by.parse()?;
        let points = self.store.recent(history_limit).await?;
        let ranker = self.ranker.clone();
        let top_processes =
            tokio::task::spawn_blocking(move || ranker.rank(key, proc_limit)).await??;
        Ok(MetricsResponse {
            points,
            top_processes,
        })
    }
}
