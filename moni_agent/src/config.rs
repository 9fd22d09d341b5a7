//! Agent configuration from CLI flags, then `MONI_*` environment variables,
//! then defaults.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_DB_PATH: &str = "./metrics.db";
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_DISK_PATH: &str = "/";

pub const PORT_ENV: &str = "MONI_PORT";
pub const DB_PATH_ENV: &str = "MONI_METRICS_PATH";
pub const INTERVAL_ENV: &str = "MONI_UPDATE_INTERVAL";
pub const DISK_PATH_ENV: &str = "MONI_DISK_PATH";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// `--help` was given; the payload is the usage text.
    #[error("{0}")]
    Help(String),
    #[error("invalid port {0:?}")]
    InvalidPort(String),
    #[error("invalid update interval {value:?}: {reason}")]
    InvalidInterval { value: String, reason: &'static str },
    #[error("missing value for {0}")]
    MissingValue(String),
    #[error("unexpected argument {0:?}, see --help")]
    UnexpectedArgument(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub port: u16,
    pub db_path: PathBuf,
    pub interval: Duration,
    /// Mount whose usage goes into each sample.
    pub disk_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            interval: DEFAULT_INTERVAL,
            disk_path: PathBuf::from(DEFAULT_DISK_PATH),
        }
    }
}

fn usage(prog: &str) -> String {
    format!(
        "Usage: {prog} [--port PORT|-p PORT] [--db PATH|-d PATH] [--interval DURATION|-i DURATION] [--disk PATH]\n\
         \n\
         Environment: {PORT_ENV}, {DB_PATH_ENV}, {INTERVAL_ENV} (e.g. 1s, 500ms, 1m30s), {DISK_PATH_ENV}"
    )
}

impl Config {
    /// `args` includes the program name; `env` looks up one variable.
    pub fn from_args_and_env<I, F>(args: I, env: F) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = String>,
        F: Fn(&str) -> Option<String>,
    {
        let mut it = args.into_iter();
        let prog = it.next().unwrap_or_else(|| "moni_agent".into());
        let mut port: Option<String> = None;
        let mut db: Option<String> = None;
        let mut interval: Option<String> = None;
        let mut disk: Option<String> = None;

        while let Some(arg) = it.next() {
            let (flag, inline) = match arg.split_once('=') {
                Some((f, v)) if f.starts_with("--") => (f.to_string(), Some(v.to_string())),
                _ => (arg.clone(), None),
            };
            let slot = match flag.as_str() {
                "-h" | "--help" => return Err(ConfigError::Help(usage(&prog))),
                "--port" | "-p" => &mut port,
                "--db" | "-d" => &mut db,
                "--interval" | "-i" => &mut interval,
                "--disk" => &mut disk,
                _ => return Err(ConfigError::UnexpectedArgument(arg)),
            };
            let value = match inline {
                Some(v) => v,
                None => it.next().ok_or_else(|| ConfigError::MissingValue(flag.clone()))?,
            };
            *slot = Some(value);
        }

        let mut config = Config::default();
        if let Some(text) = port.or_else(|| env(PORT_ENV)) {
            config.port = text
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidPort(text))?;
        }
        if let Some(text) = db.or_else(|| env(DB_PATH_ENV)).filter(|s| !s.is_empty()) {
            config.db_path = PathBuf::from(text);
        }
        if let Some(text) = interval.or_else(|| env(INTERVAL_ENV)) {
            config.interval = parse_duration(&text)
                .map_err(|reason| ConfigError::InvalidInterval { value: text, reason })?;
        }
        if let Some(text) = disk.or_else(|| env(DISK_PATH_ENV)).filter(|s| !s.is_empty()) {
            config.disk_path = PathBuf::from(text);
        }
        Ok(config)
    }
}

/// Parses Go-style durations: an optional sign, then one or more
/// `<number><unit>` pairs with units `ns`, `us`/`µs`, `ms`, `s`, `m`, `h`.
/// Go also accepts a bare `0` and negative values; both are rejected here
/// since an interval must be positive.
pub fn parse_duration(text: &str) -> Result<Duration, &'static str> {
    let text = text.trim();
    let mut rest = text.strip_prefix('+').unwrap_or(text);
    if rest.is_empty() {
        return Err("empty duration");
    }
    if rest == "0" || rest.starts_with('-') {
        return Err("interval must be positive");
    }
    let mut nanos = 0f64;
    while !rest.is_empty() {
        let num_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if num_len == 0 {
            return Err("expected a number");
        }
        let value: f64 = rest[..num_len].parse().map_err(|_| "malformed number")?;
        rest = &rest[num_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let scale = match &rest[..unit_len] {
            "ns" => 1.0,
            "us" | "µs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            "" => return Err("missing unit"),
            _ => return Err("unknown unit"),
        };
        nanos += value * scale;
        rest = &rest[unit_len..];
    }
    if nanos < 1.0 {
        return Err("interval must be positive");
    }
    Ok(Duration::from_nanos(nanos as u64))
}
