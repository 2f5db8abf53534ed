//! Configuration loading and validation
//!
//! Resolution priority for every setting:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (both surfaced through [`ConfigOverrides`])
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! The result is an [`AppConfig`], a validated value object handed to the
//! coordinator. Nothing downstream re-reads the environment.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default number of items per batch when the caller does not ask for more
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Default hard ceiling on items per batch
pub const DEFAULT_MAX_BATCH_SIZE: usize = 50;

/// Default minimum delay between consecutive remote calls (seconds)
pub const DEFAULT_API_DELAY_SECS: f64 = 2.0;

/// Default per-request timeout for manager calls (seconds)
pub const DEFAULT_REQUEST_TIMEOUT_SECS: f64 = 15.0;

/// Default HTTP bind host
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 9999;

/// Base URL and API key for one remote manager (Radarr or Sonarr)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerEndpoint {
    /// Base URL without trailing slash, e.g. `http://localhost:7878`
    pub base_url: String,
    pub api_key: String,
}

impl ManagerEndpoint {
    /// Build an endpoint from optional URL/key pair.
    ///
    /// Returns `Ok(None)` when no URL is configured (manager disabled).
    pub fn from_parts(name: &str, url: Option<&str>, api_key: Option<&str>) -> Result<Option<Self>> {
        let url = match url.map(str::trim).filter(|u| !u.is_empty()) {
            Some(url) => url,
            None => return Ok(None),
        };

        let parsed = url::Url::parse(url)
            .map_err(|e| Error::Config(format!("{} URL '{}' is invalid: {}", name, url, e)))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(Error::Config(format!(
                "{} URL '{}' must use http or https",
                name, url
            )));
        }

        let api_key = api_key.map(str::trim).unwrap_or_default();
        if api_key.is_empty() {
            return Err(Error::Config(format!(
                "{} URL is set but its API key is empty",
                name
            )));
        }

        Ok(Some(Self {
            base_url: url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }))
    }
}

/// Validated configuration consumed by the migration coordinator
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Legacy catalog database (opened read-only)
    pub catalog_path: PathBuf,
    /// Status ledger database (created on first run)
    pub ledger_path: PathBuf,
    pub radarr: Option<ManagerEndpoint>,
    pub sonarr: Option<ManagerEndpoint>,
    /// Items per batch when a request does not specify a size
    pub batch_size: usize,
    /// Hard ceiling on items per batch
    pub max_batch_size: usize,
    /// Minimum delay between consecutive remote calls
    pub api_delay: Duration,
    /// Timeout applied to every single manager request
    pub request_timeout: Duration,
    /// Delete the whole season in Sonarr even when a release names single episodes
    pub sonarr_delete_whole_season: bool,
    pub host: String,
    pub port: u16,
}

impl AppConfig {
    /// Merge overrides over the TOML file over compiled defaults, then validate
    pub fn resolve(overrides: ConfigOverrides, file: TomlConfig) -> Result<Self> {
        let catalog_path = overrides
            .catalog_path
            .or(file.catalog_path)
            .unwrap_or_else(|| PathBuf::from("db.sqlite"));
        let ledger_path = overrides
            .ledger_path
            .or(file.ledger_path)
            .unwrap_or_else(default_ledger_path);

        let radarr_url = overrides.radarr_url.or(file.radarr_url);
        let radarr_key = overrides.radarr_api_key.or(file.radarr_api_key);
        let sonarr_url = overrides.sonarr_url.or(file.sonarr_url);
        let sonarr_key = overrides.sonarr_api_key.or(file.sonarr_api_key);

        let config = Self {
            catalog_path,
            ledger_path,
            radarr: ManagerEndpoint::from_parts("Radarr", radarr_url.as_deref(), radarr_key.as_deref())?,
            sonarr: ManagerEndpoint::from_parts("Sonarr", sonarr_url.as_deref(), sonarr_key.as_deref())?,
            batch_size: overrides
                .batch_size
                .or(file.batch_size)
                .unwrap_or(DEFAULT_BATCH_SIZE),
            max_batch_size: overrides
                .max_batch_size
                .or(file.max_batch_size)
                .unwrap_or(DEFAULT_MAX_BATCH_SIZE),
            api_delay: seconds(
                "api_delay",
                overrides
                    .api_delay
                    .or(file.api_delay)
                    .unwrap_or(DEFAULT_API_DELAY_SECS),
            )?,
            request_timeout: seconds(
                "request_timeout",
                overrides
                    .request_timeout
                    .or(file.request_timeout)
                    .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            )?,
            sonarr_delete_whole_season: overrides
                .sonarr_delete_whole_season
                .or(file.sonarr_delete_whole_season)
                .unwrap_or(true),
            host: overrides
                .host
                .or(file.host)
                .unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: overrides.port.or(file.port).unwrap_or(DEFAULT_PORT),
        };

        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::Config("batch_size must be at least 1".to_string()));
        }
        if self.max_batch_size == 0 {
            return Err(Error::Config("max_batch_size must be at least 1".to_string()));
        }
        if self.batch_size > self.max_batch_size {
            return Err(Error::Config(format!(
                "batch_size ({}) exceeds max_batch_size ({})",
                self.batch_size, self.max_batch_size
            )));
        }
        if self.request_timeout.is_zero() {
            return Err(Error::Config("request_timeout must be greater than zero".to_string()));
        }
        Ok(())
    }

    /// `host:port` string for the HTTP listener
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn seconds(name: &str, value: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(value).map_err(|e| {
        Error::Config(format!(
            "{} must be a non-negative number of seconds, got {} ({})",
            name, value, e
        ))
    })
}

/// Values supplied on the command line or through environment variables
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub catalog_path: Option<PathBuf>,
    pub ledger_path: Option<PathBuf>,
    pub radarr_url: Option<String>,
    pub radarr_api_key: Option<String>,
    pub sonarr_url: Option<String>,
    pub sonarr_api_key: Option<String>,
    pub batch_size: Option<usize>,
    pub max_batch_size: Option<usize>,
    pub api_delay: Option<f64>,
    pub request_timeout: Option<f64>,
    pub sonarr_delete_whole_season: Option<bool>,
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// On-disk TOML configuration; every key is optional
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub catalog_path: Option<PathBuf>,
    pub ledger_path: Option<PathBuf>,
    pub radarr_url: Option<String>,
    pub radarr_api_key: Option<String>,
    pub sonarr_url: Option<String>,
    pub sonarr_api_key: Option<String>,
    pub batch_size: Option<usize>,
    pub max_batch_size: Option<usize>,
    pub api_delay: Option<f64>,
    pub request_timeout: Option<f64>,
    pub sonarr_delete_whole_season: Option<bool>,
    pub host: Option<String>,
    pub port: Option<u16>,
}

impl TomlConfig {
    /// Load the TOML file.
    ///
    /// An explicit path must exist. Without one, the platform config
    /// location is tried and a missing file yields the empty config.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => {
                if !path.exists() {
                    return Err(Error::Config(format!(
                        "Config file not found: {}",
                        path.display()
                    )));
                }
                path.to_path_buf()
            }
            None => match default_config_file() {
                Some(path) if path.exists() => path,
                _ => {
                    tracing::debug!("No config file found, using defaults");
                    return Ok(Self::default());
                }
            },
        };

        let content = std::fs::read_to_string(&path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        let config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;

        tracing::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }
}

/// `<config dir>/ndm/config.toml`
fn default_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("ndm").join("config.toml"))
}

/// `<data dir>/ndm/status.db`
fn default_ledger_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("ndm"))
        .unwrap_or_else(|| PathBuf::from("./data"))
        .join("status.db")
}
