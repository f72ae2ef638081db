//! Agent configuration: TOML file with fully defaulted sections.
//!
//! A missing config file is not an error — the agent runs on defaults so a
//! bare host boots the same way a configured one does. Parse failures in an
//! existing file are fatal.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::errors::Result;

/// Default location of the agent configuration file.
pub const DEFAULT_CONFIG_FILE: &str = "/etc/csm/csm_agent.toml";

/// Default location of the instance marker file.
pub const DEFAULT_MARKER_FILE: &str = "/var/run/csm/csm_agent.pid";

/// Default log directory for the background agent.
pub const DEFAULT_LOG_DIR: &str = "/var/log/csm";

/// Default TCP port for the agent API.
pub const DEFAULT_AGENT_PORT: u16 = 28101;

/// Default product identifier used when the config does not name one.
pub const DEFAULT_PRODUCT: &str = "eos";

/// Top-level agent configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Deployment target selection.
    pub product: ProductConfig,
    /// Filesystem locations owned by the agent.
    pub paths: PathsConfig,
    /// API listener settings.
    pub api: ApiConfig,
    /// Alert monitor settings.
    pub monitor: MonitorConfig,
    /// Alert relay settings.
    pub relay: RelayConfig,
}

/// `[product]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductConfig {
    /// Product identifier selecting the alert plugin.
    pub name: String,
}

impl Default for ProductConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_PRODUCT.to_string(),
        }
    }
}

/// `[paths]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Instance marker file (single decimal PID line).
    pub marker_file: PathBuf,
    /// Log directory for the background agent.
    pub log_dir: PathBuf,
    /// Spool file the default alert plugin ingests from.
    pub alert_spool: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            marker_file: PathBuf::from(DEFAULT_MARKER_FILE),
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
            alert_spool: PathBuf::from("/var/lib/csm/alert.spool"),
        }
    }
}

/// `[api]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Interface the API listener binds to.
    pub bind: String,
    /// TCP port for the API listener.
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: DEFAULT_AGENT_PORT,
        }
    }
}

/// `[monitor]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Plugin poll interval in milliseconds. Also bounds monitor stop time.
    pub poll_interval_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 5_000,
        }
    }
}

impl MonitorConfig {
    /// Poll interval as a [`Duration`].
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// `[relay]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Maximum alerts held between the monitor and the API push path.
    pub queue_capacity: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self { queue_capacity: 256 }
    }
}

impl Config {
    /// Load configuration from `path`, falling back to defaults when the
    /// file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path).map_err(|e| crate::core::errors::CsmError::io(path, e))?;
        let config: Self = toml::from_str(&raw)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::{Config, DEFAULT_AGENT_PORT, DEFAULT_PRODUCT};
    use std::path::Path;

    #[test]
    fn defaults_cover_every_section() {
        let config = Config::default();
        assert_eq!(config.product.name, DEFAULT_PRODUCT);
        assert_eq!(config.api.port, DEFAULT_AGENT_PORT);
        assert_eq!(config.api.bind, "127.0.0.1");
        assert_eq!(config.monitor.poll_interval_ms, 5_000);
        assert_eq!(config.relay.queue_capacity, 256);
        assert!(config.paths.marker_file.ends_with("csm_agent.pid"));
    }

    #[test]
    fn missing_file_loads_defaults() {
        let config = Config::load(Path::new("/nonexistent/csm_agent.toml"))
            .expect("missing config should fall back to defaults");
        assert_eq!(config.product.name, DEFAULT_PRODUCT);
    }

    #[test]
    fn partial_file_keeps_defaults_for_absent_keys() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("csm_agent.toml");
        std::fs::write(&path, "[product]\nname = \"acme\"\n").unwrap();

        let config = Config::load(&path).expect("partial config should parse");
        assert_eq!(config.product.name, "acme");
        // Untouched sections stay at their defaults.
        assert_eq!(config.api.port, DEFAULT_AGENT_PORT);
    }

    #[test]
    fn unconfigured_product_falls_back_to_default() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("csm_agent.toml");
        std::fs::write(&path, "[api]\nport = 9000\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.product.name, DEFAULT_PRODUCT);
        assert_eq!(config.api.port, 9000);
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("csm_agent.toml");
        std::fs::write(&path, "[product\nname = ").unwrap();

        let err = Config::load(&path).unwrap_err();
        assert_eq!(err.code(), "CSM-1002");
    }

    #[test]
    fn config_round_trips_through_toml() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.product.name, config.product.name);
        assert_eq!(parsed.paths.marker_file, config.paths.marker_file);
    }
}
