//! Configuration for the release service

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SkipperConfig {
    /// Health check polling of newly deployed applications
    #[serde(default)]
    pub health_check: HealthCheckConfig,

    /// Manifest rendering
    #[serde(default)]
    pub renderer: RendererConfig,

    /// Event broadcasting
    #[serde(default)]
    pub events: EventsConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Health check configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheckConfig {
    /// Delay between status polls in milliseconds
    #[serde(default = "default_health_interval")]
    pub interval_ms: u64,

    /// Overall time allowed for new applications to become healthy
    #[serde(default = "default_health_timeout")]
    pub timeout_ms: u64,
}

impl HealthCheckConfig {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval_ms: interval.as_millis() as u64,
            timeout_ms: timeout.as_millis() as u64,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Same polling interval with another overall timeout
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self {
            timeout_ms: timeout.as_millis() as u64,
            ..self.clone()
        }
    }
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_health_interval(),
            timeout_ms: default_health_timeout(),
        }
    }
}

/// Renderer configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RendererConfig {
    /// Reject override keys and placeholders the package does not define
    #[serde(default)]
    pub strict: bool,
}

/// Event channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    #[serde(default = "default_event_capacity")]
    pub capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            capacity: default_event_capacity(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Fallback filter when `RUST_LOG` is not set
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value helpers
fn default_health_interval() -> u64 {
    10_000
}

fn default_health_timeout() -> u64 {
    300_000
}

fn default_event_capacity() -> usize {
    1024
}

fn default_log_level() -> String {
    "info".to_string()
}

impl SkipperConfig {
    /// Load configuration: defaults, then an optional file, then
    /// `SKIPPER_`-prefixed environment variables with `__` between sections
    /// (for example `SKIPPER_HEALTH_CHECK__TIMEOUT_MS=60000`).
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&SkipperConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("SKIPPER")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// Short polling intervals for local development
    pub fn development() -> Self {
        Self {
            health_check: HealthCheckConfig::new(Duration::from_millis(500), Duration::from_secs(30)),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SkipperConfig::default();
        assert_eq!(config.health_check.interval(), Duration::from_secs(10));
        assert_eq!(config.health_check.timeout(), Duration::from_secs(300));
        assert!(!config.renderer.strict);
        assert_eq!(config.events.capacity, 1024);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = SkipperConfig::load(None).unwrap();
        assert_eq!(config.health_check.timeout_ms, 300_000);
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("skipper-config-{}.toml", std::process::id()));
        std::fs::write(
            &path,
            "[health_check]\ninterval_ms = 250\ntimeout_ms = 5000\n\n[renderer]\nstrict = true\n",
        )
        .unwrap();

        let config = SkipperConfig::load(path.to_str()).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.health_check.interval(), Duration::from_millis(250));
        assert_eq!(config.health_check.timeout(), Duration::from_secs(5));
        assert!(config.renderer.strict);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_development_profile_polls_quickly() {
        let config = SkipperConfig::development();
        assert!(config.health_check.interval() < Duration::from_secs(1));
    }
}
