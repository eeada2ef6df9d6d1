//! Hub configuration
//!
//! Layered in order: built-in defaults, an optional TOML/JSON/YAML file,
//! then `CREATUNE_*` environment variables. Nested keys use a double
//! underscore, e.g. `CREATUNE_RECONNECT__DELAY=2s`.

use crate::error::{HubError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::warn;
use url::Url;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "CREATUNE";

/// Reconnection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Fixed delay between a drop and the next attempt
    #[serde(with = "humantime_serde")]
    pub delay: Duration,

    /// Give up after this many consecutive failures (None = never)
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(5),
            max_attempts: None,
        }
    }
}

/// Staleness watchdog settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    /// How often the watchdog looks
    #[serde(with = "humantime_serde")]
    pub interval: Duration,

    /// Silence longer than this resets every connected device
    #[serde(with = "humantime_serde")]
    pub staleness_threshold: Duration,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            staleness_threshold: Duration::from_secs(15),
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Gateway WebSocket endpoint
    pub gateway_url: Url,

    /// Name sent in the identification frame
    pub client_name: String,

    /// Upper bound on a single connection handshake
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,

    pub reconnect: ReconnectConfig,

    pub watchdog: WatchdogConfig,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            gateway_url: default_gateway_url(),
            client_name: "CreaTune Web Client".to_string(),
            connect_timeout: Duration::from_secs(10),
            reconnect: ReconnectConfig::default(),
            watchdog: WatchdogConfig::default(),
        }
    }
}

fn default_gateway_url() -> Url {
    match Url::parse("ws://127.0.0.1:8080/") {
        Ok(url) => url,
        Err(_) => unreachable!("default gateway URL is valid"),
    }
}

impl HubConfig {
    /// Load configuration from defaults, an optional file and the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Self::default())?);

        if let Some(path) = path {
            if !path.exists() {
                return Err(HubError::config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let config: Self = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if !matches!(self.gateway_url.scheme(), "ws" | "wss") {
            return Err(HubError::config(format!(
                "Gateway URL must use ws or wss scheme, got {}",
                self.gateway_url.scheme()
            )));
        }

        if self.gateway_url.host_str().is_none() {
            return Err(HubError::config("Gateway URL has no host"));
        }

        if self.client_name.trim().is_empty() {
            return Err(HubError::config("Client name cannot be empty"));
        }

        let durations = [
            ("connect_timeout", self.connect_timeout),
            ("reconnect.delay", self.reconnect.delay),
            ("watchdog.interval", self.watchdog.interval),
            (
                "watchdog.staleness_threshold",
                self.watchdog.staleness_threshold,
            ),
        ];
        if let Some((name, _)) = durations.iter().find(|(_, d)| d.is_zero()) {
            return Err(HubError::config(format!("{name} must be greater than zero")));
        }

        if self.watchdog.staleness_threshold < self.watchdog.interval {
            warn!(
                threshold = ?self.watchdog.staleness_threshold,
                interval = ?self.watchdog.interval,
                "Staleness threshold is shorter than the watchdog interval"
            );
        }

        if self.reconnect.max_attempts == Some(0) {
            return Err(HubError::config(
                "reconnect.max_attempts must be at least 1 when set",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serial_test::serial;
    use std::io::Write;

    fn clear_env() {
        for key in [
            "CREATUNE_GATEWAY_URL",
            "CREATUNE_CLIENT_NAME",
            "CREATUNE_RECONNECT__DELAY",
            "CREATUNE_RECONNECT__MAX_ATTEMPTS",
        ] {
            std::env::remove_var(key);
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = HubConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.gateway_url.as_str(), "ws://127.0.0.1:8080/");
        assert_eq!(config.reconnect.delay, Duration::from_secs(5));
        assert_eq!(config.watchdog.interval, Duration::from_secs(10));
        assert_eq!(config.watchdog.staleness_threshold, Duration::from_secs(15));
    }

    #[test]
    #[serial]
    fn test_load_without_file_uses_defaults() {
        clear_env();
        let config = tokio_test::assert_ok!(HubConfig::load(None));
        assert_eq!(config, HubConfig::default());
    }

    #[test]
    #[serial]
    fn test_load_from_file() {
        clear_env();
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
gateway_url = "ws://gateway.local:9000/"
client_name = "Gallery Wall"

[reconnect]
delay = "2s"
max_attempts = 3

[watchdog]
staleness_threshold = "30s"
"#
        )
        .unwrap();

        let config = HubConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.gateway_url.as_str(), "ws://gateway.local:9000/");
        assert_eq!(config.client_name, "Gallery Wall");
        assert_eq!(config.reconnect.delay, Duration::from_secs(2));
        assert_eq!(config.reconnect.max_attempts, Some(3));
        assert_eq!(config.watchdog.staleness_threshold, Duration::from_secs(30));
        // Untouched keys keep their defaults
        assert_eq!(config.watchdog.interval, Duration::from_secs(10));
    }

    #[test]
    #[serial]
    fn test_env_overrides_defaults() {
        clear_env();
        std::env::set_var("CREATUNE_GATEWAY_URL", "wss://example.org/ws");
        std::env::set_var("CREATUNE_RECONNECT__DELAY", "750ms");

        let config = HubConfig::load(None);
        clear_env();

        let config = config.unwrap();
        assert_eq!(config.gateway_url.as_str(), "wss://example.org/ws");
        assert_eq!(config.reconnect.delay, Duration::from_millis(750));
    }

    #[test]
    #[serial]
    fn test_missing_file_is_config_error() {
        clear_env();
        let err = HubConfig::load(Some(Path::new("/nonexistent/creatune.toml"))).unwrap_err();
        assert!(matches!(err, HubError::Config(_)));
    }

    #[test]
    fn test_rejects_http_scheme() {
        let config = HubConfig {
            gateway_url: Url::parse("http://127.0.0.1:8080/").unwrap(),
            ..HubConfig::default()
        };
        assert!(matches!(config.validate(), Err(HubError::Config(_))));
    }

    #[test]
    fn test_rejects_zero_durations() {
        let mut config = HubConfig::default();
        config.watchdog.interval = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = HubConfig::default();
        config.reconnect.max_attempts = Some(0);
        assert!(config.validate().is_err());
    }
}
