use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, bail};
use serde::Deserialize;

use crate::http::body::DEFAULT_SPOOL_THRESHOLD;
use crate::http::connection::ConnectionSettings;
use crate::http::parser::ParseOptions;
use crate::server::endpoint::Endpoint;

/// What the acceptor does when the work queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Admission {
    /// Stop accepting until a worker frees a slot
    #[default]
    Block,
    /// Answer 503 and close
    Reject,
}

impl FromStr for Admission {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "block" => Ok(Admission::Block),
            "reject" => Ok(Admission::Reject),
            other => bail!("unknown admission policy {other:?} (expected block or reject)"),
        }
    }
}

/// Server configuration.
///
/// Loaded from an optional YAML file named by `TACK_CONFIG`, then
/// overridden field by field from `TACK_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Unix socket path or `host[:port]`
    pub listen: String,
    pub workers: usize,
    pub queue_capacity: usize,
    pub admission: Admission,
    pub read_timeout_secs: u64,
    pub write_timeout_secs: u64,
    pub shutdown_timeout_secs: u64,
    pub spool_threshold: usize,
    pub spool_dir: Option<PathBuf>,
    pub max_line_bytes: usize,
    pub max_headers: usize,
    pub pid_file: Option<PathBuf>,
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        let parse = ParseOptions::default();
        Self {
            listen: "0.0.0.0:9292".to_string(),
            workers: 4,
            queue_capacity: 1024,
            admission: Admission::Block,
            read_timeout_secs: 30,
            write_timeout_secs: 30,
            shutdown_timeout_secs: 10,
            spool_threshold: DEFAULT_SPOOL_THRESHOLD,
            spool_dir: None,
            max_line_bytes: parse.max_line_bytes,
            max_headers: parse.max_headers,
            pid_file: None,
            log_file: None,
        }
    }
}

impl Config {
    /// Loads configuration from the process environment.
    pub fn load() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration with `lookup` standing in for the environment.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = match lookup("TACK_CONFIG") {
            Some(path) => Self::from_yaml_file(Path::new(&path))?,
            None => Self::default(),
        };

        if let Some(v) = lookup("TACK_LISTEN") {
            cfg.listen = v;
        }
        override_parsed(&lookup, "TACK_WORKERS", &mut cfg.workers)?;
        override_parsed(&lookup, "TACK_QUEUE_CAPACITY", &mut cfg.queue_capacity)?;
        override_parsed(&lookup, "TACK_ADMISSION", &mut cfg.admission)?;
        override_parsed(&lookup, "TACK_READ_TIMEOUT_SECS", &mut cfg.read_timeout_secs)?;
        override_parsed(&lookup, "TACK_WRITE_TIMEOUT_SECS", &mut cfg.write_timeout_secs)?;
        override_parsed(&lookup, "TACK_SHUTDOWN_TIMEOUT_SECS", &mut cfg.shutdown_timeout_secs)?;
        override_parsed(&lookup, "TACK_SPOOL_THRESHOLD", &mut cfg.spool_threshold)?;
        if let Some(v) = lookup("TACK_SPOOL_DIR") {
            cfg.spool_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("TACK_PID_FILE") {
            cfg.pid_file = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("TACK_LOG_FILE") {
            cfg.log_file = Some(PathBuf::from(v));
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_yaml_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::from_yaml_str(&text).with_context(|| format!("parsing config file {}", path.display()))
    }

    pub fn from_yaml_str(text: &str) -> anyhow::Result<Self> {
        let cfg: Config = serde_yaml::from_str(text)?;
        Ok(cfg)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.endpoint()?;
        if self.workers == 0 {
            bail!("workers must be at least 1");
        }
        if self.queue_capacity == 0 {
            bail!("queue_capacity must be at least 1");
        }
        if self.max_line_bytes == 0 || self.max_headers == 0 {
            bail!("max_line_bytes and max_headers must be positive");
        }
        Ok(())
    }

    pub fn endpoint(&self) -> anyhow::Result<Endpoint> {
        Endpoint::parse(&self.listen).with_context(|| format!("invalid listen address {:?}", self.listen))
    }

    pub fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            parse: ParseOptions {
                max_line_bytes: self.max_line_bytes,
                max_headers: self.max_headers,
                spool_threshold: self.spool_threshold,
                spool_dir: self.spool_dir.clone(),
            },
            read_timeout: Duration::from_secs(self.read_timeout_secs),
            write_timeout: Duration::from_secs(self.write_timeout_secs),
        }
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

fn override_parsed<F, T>(lookup: &F, key: &str, slot: &mut T) -> anyhow::Result<()>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(raw) = lookup(key) {
        *slot = raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid {key}={raw:?}: {e}"))?;
    }
    Ok(())
}
