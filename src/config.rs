use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

/// Default StatsD port used when neither `port` nor `host` carries one.
pub const DEFAULT_STATSD_PORT: u16 = 8125;

/// Top-level configuration for the tunnelstats daemon.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Logging verbosity (debug, info, warn, error). Default: "info".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Stats queue and StatsD sink configuration.
    #[serde(default)]
    pub stats: StatsConfig,

    /// Prometheus health metrics server configuration.
    #[serde(default)]
    pub health: HealthConfig,
}

/// Stats queue and StatsD sink configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StatsConfig {
    /// Master switch. When false every push is a no-op. Default: false.
    #[serde(default)]
    pub enabled: bool,

    /// StatsD host, optionally with `:port`. Default: "localhost".
    #[serde(default = "default_statsd_host")]
    pub host: String,

    /// StatsD port. Overrides any port in `host`.
    #[serde(default)]
    pub port: Option<u16>,

    /// Prepended to every metric name.
    #[serde(default)]
    pub prefix: String,

    /// Emit Telegraf-style tags instead of DogStatsD-style tags.
    #[serde(default)]
    pub telegraf: bool,

    /// Hostname tag value. Resolved at startup when empty.
    #[serde(default)]
    pub hostname: String,

    /// Extra `key:value` tags added to every metric.
    #[serde(default)]
    pub global_tags: Vec<String>,

    /// Period between queue drains. Default: 10s.
    #[serde(default = "default_flush_interval", with = "humantime_serde")]
    pub flush_interval: Duration,
}

/// Prometheus health metrics server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct HealthConfig {
    /// Serve /metrics and /healthz. Default: false.
    #[serde(default)]
    pub enabled: bool,

    /// Listen address. Default: ":9090".
    #[serde(default = "default_health_addr")]
    pub addr: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_statsd_host() -> String {
    "localhost".to_string()
}

fn default_flush_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_health_addr() -> String {
    ":9090".to_string()
}

// --- Default trait impls ---

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            stats: StatsConfig::default(),
            health: HealthConfig::default(),
        }
    }
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: default_statsd_host(),
            port: None,
            prefix: String::new(),
            telegraf: false,
            hostname: String::new(),
            global_tags: Vec::new(),
            flush_interval: default_flush_interval(),
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            addr: default_health_addr(),
        }
    }
}

// --- Validation and loading ---

impl Config {
    /// Load configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;

        let mut cfg: Config = serde_yaml::from_str(&data)
            .with_context(|| format!("parsing config file {}", path.display()))?;

        cfg.validate()?;
        cfg.resolve_hostname();

        Ok(cfg)
    }

    /// Validate the configuration for required fields and consistency.
    pub fn validate(&self) -> Result<()> {
        if self.stats.enabled {
            if self.stats.host.is_empty() {
                bail!("stats.host is required when stats are enabled");
            }

            if self.stats.port == Some(0) {
                bail!("stats.port must be positive");
            }

            if self.stats.flush_interval.is_zero() {
                bail!("stats.flush_interval must be positive");
            }
        }

        for tag in &self.stats.global_tags {
            if tag.is_empty() || tag.contains(|c: char| matches!(c, ',' | '|' | '#')) {
                bail!("stats.global_tags entry {tag:?} is not a valid tag");
            }
        }

        if self.health.enabled && self.health.addr.is_empty() {
            bail!("health.addr is required when health is enabled");
        }

        Ok(())
    }

    /// Fills an empty `stats.hostname` once, from the kernel hostname or
    /// `$HOSTNAME`, falling back to "unknown".
    pub fn resolve_hostname(&mut self) {
        if !self.stats.hostname.is_empty() {
            return;
        }

        let kernel = std::fs::read_to_string("/proc/sys/kernel/hostname").ok();
        let env = std::env::var("HOSTNAME").ok();
        self.stats.hostname = pick_hostname(kernel, env);
    }
}

fn pick_hostname(kernel: Option<String>, env: Option<String>) -> String {
    [kernel, env]
        .into_iter()
        .flatten()
        .map(|h| h.trim().to_string())
        .find(|h| !h.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

impl StatsConfig {
    /// Returns the `host:port` address of the StatsD server.
    ///
    /// An explicit `port` wins over one embedded in `host`. IPv6 literals
    /// come back bracketed.
    pub fn sink_addr(&self) -> String {
        if let Ok(addr) = self.host.parse::<SocketAddr>() {
            return SocketAddr::new(addr.ip(), self.port.unwrap_or(addr.port())).to_string();
        }

        let bare = self.host.trim_start_matches('[').trim_end_matches(']');
        if let Ok(ip) = bare.parse::<IpAddr>() {
            return SocketAddr::new(ip, self.port.unwrap_or(DEFAULT_STATSD_PORT)).to_string();
        }

        let (name, host_port) = match self.host.rsplit_once(':') {
            Some((name, p)) => match p.parse::<u16>() {
                Ok(p) => (name, Some(p)),
                Err(_) => (self.host.as_str(), None),
            },
            None => (self.host.as_str(), None),
        };
        let port = self.port.or(host_port).unwrap_or(DEFAULT_STATSD_PORT);
        format!("{name}:{port}")
    }
}
