//! Entry point for moni_agent. Parses config, opens the store, starts the
//! sampler and serves the HTTP API until Ctrl-C.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use moni_agent::config::{Config, ConfigError};
use moni_agent::host::HostStats;
use moni_agent::http::router;
use moni_agent::info::SystemInfo;
use moni_agent::metrics::SysinfoHost;
use moni_agent::query::QueryService;
use moni_agent::ranker::ProcessRanker;
use moni_agent::sampler::{spawn_sampler, Sampler};
use moni_agent::state::{AppState, QueryDefaults};
use moni_agent::store::Store;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "cannot listen for Ctrl-C; running until killed");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let started = Instant::now();
    let config = match Config::from_args_and_env(std::env::args(), |k| std::env::var(k).ok()) {
        Ok(c) => c,
        Err(ConfigError::Help(usage)) => {
            println!("{usage}");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };
    init_tracing();

    let store = Store::open(&config.db_path)
        .await
        .with_context(|| format!("cannot open metrics store {}", config.db_path.display()))?;
    let store = Arc::new(store);
    info!(points = store.len().await?, "history loaded");

    let host: Arc<dyn HostStats> = Arc::new(SysinfoHost::new());
    let sampler = Arc::new(Sampler::new(
        Arc::clone(&host),
        Arc::clone(&store),
        config.disk_path.clone(),
    ));
    let sampler_task = spawn_sampler(sampler, config.interval);
    info!(interval = ?config.interval, disk = %config.disk_path.display(), "sampler started");

    let state = AppState {
        query: QueryService::new(Arc::clone(&store), ProcessRanker::new(Arc::clone(&host))),
        info: Arc::new(SystemInfo::new(host, started, config.disk_path.clone())),
        defaults: QueryDefaults::default(),
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("cannot bind {addr}"))?;
    info!(addr = %listener.local_addr()?, "moni agent listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sampler_task.abort();
    store.close().await;
    Ok(())
}
