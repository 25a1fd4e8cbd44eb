//! Layered service configuration.
//!
//! Values are resolved in order: built-in defaults, then an optional YAML
//! file, then `DISPATCH__*` environment variables (e.g.
//! `DISPATCH__SERVER__PORT=9090`).

use std::path::Path;
use std::time::Duration;

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use dispatch_api::{ExpiryPolicy, ServerConfig};
use dispatch_store::StoreConfig;
use serde::Deserialize;

/// Config file read when no `--config` path is given. Optional.
pub const DEFAULT_CONFIG_FILE: &str = "dispatch-config.yaml";

/// Prefix of environment variable overrides.
pub const ENV_PREFIX: &str = "DISPATCH";

/// Top-level configuration for the dispatch server.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ServiceConfig {
    /// HTTP listener settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Store sizing.
    #[serde(default)]
    pub store: StoreConfig,
    /// Time-to-live and sweep cadence.
    #[serde(default)]
    pub expiry: ExpiryConfig,
}

/// Expiration settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ExpiryConfig {
    /// Seconds each ping keeps its agent live. `0` disables expiry.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: i64,
    /// Milliseconds between expiration sweeps.
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
}

const fn default_ttl_secs() -> i64 {
    dispatch_api::state::DEFAULT_TTL_SECS
}

const fn default_sweep_interval_ms() -> u64 {
    1_000
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            sweep_interval_ms: default_sweep_interval_ms(),
        }
    }
}

impl ExpiryConfig {
    /// The per-ping expiry policy handed to the API layer.
    pub const fn policy(&self) -> ExpiryPolicy {
        ExpiryPolicy {
            ttl_secs: self.ttl_secs,
        }
    }

    /// Sweep cadence as a [`Duration`].
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

impl ServiceConfig {
    /// Load configuration from `path` (required if given), or from
    /// [`DEFAULT_CONFIG_FILE`] if present, overlaid with environment
    /// variables.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if an explicitly named file is missing,
    /// any source fails to parse, or the merged values are invalid.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };
        Self::from_builder(
            Config::builder().add_source(file).add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            ),
        )
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.store
            .validate()
            .map_err(|e| ConfigError::Message(format!("store: {e}")))?;
        if self.expiry.sweep_interval_ms == 0 {
            return Err(ConfigError::Message(String::from(
                "expiry.sweep_interval_ms must be positive",
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use config::FileFormat;

    use super::*;

    fn from_yaml(yaml: &str) -> Result<ServiceConfig, ConfigError> {
        ServiceConfig::from_builder(
            Config::builder().add_source(File::from_str(yaml, FileFormat::Yaml)),
        )
    }

    #[test]
    fn empty_yaml_gives_defaults() {
        let config = from_yaml("{}").unwrap();
        assert_eq!(config, ServiceConfig::default());
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.store.history_capacity, 100);
        assert_eq!(config.expiry.ttl_secs, 300);
        assert_eq!(config.expiry.sweep_interval(), Duration::from_secs(1));
    }

    #[test]
    fn yaml_overrides_sections() {
        let yaml = r"
server:
  host: 127.0.0.1
  port: 9000
store:
  history_capacity: 5
expiry:
  ttl_secs: 0
  sweep_interval_ms: 250
";
        let config = from_yaml(yaml).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.store.history_capacity, 5);
        assert_eq!(config.store.max_children, 50);
        assert_eq!(config.expiry.policy().expires_at(10), None);
        assert_eq!(config.expiry.sweep_interval(), Duration::from_millis(250));
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(from_yaml("store:\n  history_capacity: 0\n").is_err());
        assert!(from_yaml("store:\n  min_children: 30\n").is_err());
        assert!(from_yaml("expiry:\n  sweep_interval_ms: 0\n").is_err());
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let missing = Path::new("/nonexistent/dispatch-config.yaml");
        assert!(ServiceConfig::load(Some(missing)).is_err());
    }
}
