//! HTTP routes: `GET /metrics` and `GET /info`.

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::query::QueryError;
use crate::state::AppState;
use crate::types::{HostInfo, MetricsResponse};

#[derive(Debug, Default, Deserialize)]
pub struct MetricsParams {
    #[serde(rename = "sortProcessesBy", alias = "sortBy")]
    pub sort_by: Option<String>,
    #[serde(rename = "historyLimit")]
    pub history_limit: Option<usize>,
    #[serde(rename = "procLimit")]
    pub proc_limit: Option<usize>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/info", get(info_handler))
        .with_state(state)
}

pub async fn metrics_handler(
    State(state): State<AppState>,
    params: Result<Query<MetricsParams>, QueryRejection>,
) -> Result<Json<MetricsResponse>, ApiError> {
    // malformed limits and duplicate sort keys get the same JSON error as a bad sort key
    let Query(params) =
        params.map_err(|rejection| QueryError::InvalidParameter(rejection.body_text()))?;
    let sort_by = params.sort_by.as_deref().unwrap_or("cpu");
    let history_limit = params
        .history_limit
        .unwrap_or(state.defaults.history_limit);
    let proc_limit = params.proc_limit.unwrap_or(state.defaults.proc_limit);
    let response = state
        .query
        .metrics(history_limit, proc_limit, sort_by)
        .await?;
    Ok(Json(response))
}

pub async fn info_handler(State(state): State<AppState>) -> Result<Json<HostInfo>, StatusCode> {
    let info = state.info.clone();
    match tokio::task::spawn_blocking(move || info.snapshot()).await {
        Ok(snapshot) => Ok(Json(snapshot)),
        Err(e) => {
            warn!(error = %e, "host info task failed");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// A `QueryError` rendered as `{"error": "..."}`.
#[derive(Debug)]
pub struct ApiError(pub QueryError);

impl From<QueryError> for ApiError {
    fn from(e: QueryError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            QueryError::InvalidParameter(_) => {
                debug!(error = %self.0, "rejected metrics query");
                StatusCode::BAD_REQUEST
            }
            _ => {
                warn!(error = %self.0, "metrics query failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}
