// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! wardend configuration
//!
//! Settings come from an optional TOML file with command-line flags layered
//! on top. Anything left unset falls back to a default.

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use warden_adapters::ConsulConfig;
use warden_core::{LockConfig, LockIdentity, DEFAULT_RETRY_INTERVAL};

pub const DEFAULT_CONSUL_ADDRESS: &str = "http://127.0.0.1:8500";
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Errors loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("lock key is required (--key or [lock] key)")]
    MissingKey,

    #[error("retry interval must be greater than zero")]
    InvalidRetryInterval,

    #[error("invalid consul settings: {0}")]
    Consul(String),
}

/// File layout
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub lock: LockSection,
    pub consul: ConsulSection,
    pub log: LogSection,
    pub metrics: MetricsSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LockSection {
    pub key: Option<String>,
    pub value: Option<String>,
    #[serde(with = "humantime_serde", default)]
    pub retry_interval: Option<Duration>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConsulSection {
    pub address: Option<String>,
    pub session_name: Option<String>,
    #[serde(with = "humantime_serde", default)]
    pub ttl: Option<Duration>,
    #[serde(with = "humantime_serde", default)]
    pub lock_delay: Option<Duration>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogSection {
    /// Filter directive, e.g. "info" or "warden_engine=debug"
    pub level: Option<String>,
    /// Write logs here instead of stderr
    pub file: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MetricsSection {
    /// Serve Prometheus metrics on this address
    pub listen: Option<SocketAddr>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text, path)
    }

    pub fn parse(text: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Command-line overrides
#[derive(Debug, Default, Clone, clap::Args)]
pub struct Overrides {
    /// Lock key
    #[arg(long)]
    pub key: Option<String>,

    /// Value written with the lock (default: <hostname>-<uuid>)
    #[arg(long)]
    pub value: Option<String>,

    /// Delay before retrying a failed acquisition, e.g. "5s"
    #[arg(long, value_parser = humantime::parse_duration)]
    pub retry_interval: Option<Duration>,

    /// Consul HTTP address
    #[arg(long)]
    pub consul_address: Option<String>,

    /// Name given to Consul sessions
    #[arg(long)]
    pub session_name: Option<String>,

    /// Consul session TTL, between 10s and 24h
    #[arg(long, value_parser = humantime::parse_duration)]
    pub ttl: Option<Duration>,

    /// Consul lock delay
    #[arg(long, value_parser = humantime::parse_duration)]
    pub lock_delay: Option<Duration>,

    /// Log filter directive
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log file path
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Serve Prometheus metrics on this address
    #[arg(long)]
    pub metrics_listen: Option<SocketAddr>,
}

/// Fully resolved settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub lock: LockConfig,
    pub consul: ConsulConfig,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
    pub metrics_listen: Option<SocketAddr>,
}

/// Default config file location
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("warden").join("warden.toml"))
}

/// Load the config file (explicit path, or the default one if present) and
/// apply overrides
pub fn load(explicit: Option<&Path>, overrides: Overrides) -> Result<Settings, ConfigError> {
    let file = match explicit {
        Some(path) => FileConfig::load(path)?,
        None => match default_path() {
            Some(path) if path.is_file() => FileConfig::load(&path)?,
            _ => FileConfig::default(),
        },
    };
    resolve(file, overrides)
}

/// Merge the file with overrides and validate the result
pub fn resolve(file: FileConfig, overrides: Overrides) -> Result<Settings, ConfigError> {
    let key = overrides
        .key
        .or(file.lock.key)
        .filter(|key| !key.trim().is_empty())
        .ok_or(ConfigError::MissingKey)?;
    let value = overrides
        .value
        .or(file.lock.value)
        .unwrap_or_else(default_value);

    let retry_interval = overrides
        .retry_interval
        .or(file.lock.retry_interval)
        .unwrap_or(DEFAULT_RETRY_INTERVAL);
    if retry_interval.is_zero() {
        return Err(ConfigError::InvalidRetryInterval);
    }

    let address = overrides
        .consul_address
        .or(file.consul.address)
        .unwrap_or_else(|| DEFAULT_CONSUL_ADDRESS.to_string());
    let mut consul = ConsulConfig::new(address);
    if let Some(name) = overrides.session_name.or(file.consul.session_name) {
        consul = consul.with_session_name(name);
    }
    if let Some(ttl) = overrides.ttl.or(file.consul.ttl) {
        consul = consul.with_ttl(ttl);
    }
    if let Some(delay) = overrides.lock_delay.or(file.consul.lock_delay) {
        consul = consul.with_lock_delay(delay);
    }
    consul
        .validate()
        .map_err(|e| ConfigError::Consul(e.to_string()))?;

    Ok(Settings {
        lock: LockConfig::new(LockIdentity::new(key, value)).with_retry_interval(retry_interval),
        consul,
        log_level: overrides
            .log_level
            .or(file.log.level)
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
        log_file: overrides.log_file.or(file.log.file),
        metrics_listen: overrides.metrics_listen.or(file.metrics.listen),
    })
}

/// `<hostname>-<uuid>`, unique per process
fn default_value() -> String {
    let host = hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "wardend".to_string());
    format!("{}-{}", host, uuid::Uuid::new_v4())
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
