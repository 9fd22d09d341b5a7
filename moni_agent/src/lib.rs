//! Host monitoring agent: samples CPU, memory, disk and load average into a
//! bounded on-disk time series and answers queries over recent history plus a
//! live process ranking.

pub mod config;
pub mod host;
pub mod http;
pub mod info;
pub mod metrics;
pub mod query;
pub mod ranker;
pub mod sampler;
pub mod state;
pub mod store;
pub mod types;
