//! Shared agent state cloned into every HTTP handler.

use std::sync::Arc;

use crate::info::SystemInfo;
use crate::query::QueryService;

/// Query defaults applied when a request leaves them out.
#[derive(Debug, Clone, Copy)]
pub struct QueryDefaults {
    pub history_limit: usize,
    pub proc_limit: usize,
}

impl Default for QueryDefaults {
    fn default() -> Self {
        Self {
            history_limit: crate::store::RETENTION_CAP,
            proc_limit: 10,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub query: QueryService,
    pub info: Arc<SystemInfo>,
    pub defaults: QueryDefaults,
}
