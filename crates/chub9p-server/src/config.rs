//! Server configuration.
//!
//! Layered, highest precedence first:
//!
//! 1. Command-line flags ([`Overrides`])
//! 2. Environment (`CHUB_API_KEY`)
//! 3. TOML file (`--config`)
//! 4. Built-in defaults ([`crate::constants`])
//!
//! ```toml
//! bind = "127.0.0.1"
//! port = 5640
//! api_base = "https://api.chub.ai"
//! api_key = "..."
//! cache_ttl_secs = 300
//! fetch_timeout_secs = 30
//! fixtures = "fixtures.json"
//! ```

use serde::Deserialize;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use chub9p_kernel::GatewayConfig;

use crate::constants::{CACHE_TTL, DEFAULT_API_BASE, DEFAULT_BIND, DEFAULT_PORT, FETCH_TIMEOUT};

/// Configuration error type.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Resolved server configuration.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Address the 9P listener binds.
    pub bind: IpAddr,
    /// TCP port for the 9P listener.
    pub port: u16,
    /// Base URL of the remote content API.
    pub api_base: String,
    /// Bearer token for the remote API.
    pub api_key: Option<String>,
    pub cache_ttl_secs: u64,
    pub fetch_timeout_secs: u64,
    /// Serve records from this JSON file instead of the remote API.
    pub fixtures: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND,
            port: DEFAULT_PORT,
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: None,
            cache_ttl_secs: CACHE_TTL.as_secs(),
            fetch_timeout_secs: FETCH_TIMEOUT.as_secs(),
            fixtures: None,
        }
    }
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("bind", &self.bind)
            .field("port", &self.port)
            .field("api_base", &self.api_base)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("cache_ttl_secs", &self.cache_ttl_secs)
            .field("fetch_timeout_secs", &self.fetch_timeout_secs)
            .field("fixtures", &self.fixtures)
            .finish()
    }
}

/// Command-line values that replace file and environment settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub bind: Option<IpAddr>,
    pub port: Option<u16>,
    pub api_base: Option<String>,
    pub fixtures: Option<PathBuf>,
}

impl ServerConfig {
    /// Parse a TOML config file. Missing keys take defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Build the effective configuration from every layer.
    ///
    /// `env_api_key` is the value of `CHUB_API_KEY`, if set.
    pub fn load(
        path: Option<&Path>,
        env_api_key: Option<String>,
        overrides: &Overrides,
    ) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(env_api_key);
        config.apply_overrides(overrides);
        config.validate()?;
        Ok(config)
    }

    /// Apply environment values. Empty strings count as unset.
    pub fn apply_env(&mut self, api_key: Option<String>) {
        if let Some(key) = api_key.filter(|k| !k.trim().is_empty()) {
            self.api_key = Some(key);
        }
    }

    pub fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(bind) = overrides.bind {
            self.bind = bind;
        }
        if let Some(port) = overrides.port {
            self.port = port;
        }
        if let Some(api_base) = &overrides.api_base {
            self.api_base = api_base.clone();
        }
        if let Some(fixtures) = &overrides.fixtures {
            self.fixtures = Some(fixtures.clone());
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_base.trim().is_empty() {
            return Err(ConfigError::Invalid("api_base is empty".into()));
        }
        if self.fetch_timeout_secs == 0 {
            return Err(ConfigError::Invalid("fetch_timeout_secs must be at least 1".into()));
        }
        Ok(())
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            cache_ttl: self.cache_ttl(),
            fetch_timeout: self.fetch_timeout(),
        }
    }
}
