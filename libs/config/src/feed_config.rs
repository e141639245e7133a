//! Feed consumer configuration
//!
//! ```toml
//! node_id = 7
//! default_locale = "en"
//! desired_locales = ["de", "fr"]
//! disabled_producers = [6]
//! max_inactivity_seconds = 20          # freshness window of the health tracker
//! alive_violation_multiplier = 2       # broker heartbeat may be silent 2x the window
//! max_recovery_time_seconds = 3600     # recovery timeout
//! stateful_recovery_window_minutes = 4320
//! adjust_after_age = false             # clamp too-old recovery timestamps
//! recovery_check_interval_seconds = 10
//! ```

use crate::{ConfigError, Result};
use config_crate::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Environment variable prefix for overrides (`ODDSFEED_NODE_ID=3`)
pub const ENV_PREFIX: &str = "ODDSFEED";

const MIN_INACTIVITY_SECONDS: u64 = 10;
const MAX_INACTIVITY_SECONDS: u64 = 180;
const MIN_RECOVERY_TIME_SECONDS: u64 = 600;
const MAX_RECOVERY_TIME_SECONDS: u64 = 21_600;

/// Main feed consumer configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Node id used in recovery requests and node-specific routing keys
    pub node_id: Option<i32>,
    /// First locale of every dispatcher
    pub default_locale: String,
    /// Additional locales handed to the message mapper
    pub desired_locales: Vec<String>,
    /// Producers disabled before the producer registry is locked
    pub disabled_producers: Vec<u32>,
    /// Freshness window for per-interest content (seconds)
    pub max_inactivity_seconds: u64,
    /// Broker heartbeat may be silent this many inactivity windows
    pub alive_violation_multiplier: u32,
    /// Recovery timeout (seconds)
    pub max_recovery_time_seconds: u64,
    /// How far back an after-timestamp recovery may reach (minutes)
    pub stateful_recovery_window_minutes: u64,
    /// Clamp a too-old after-timestamp instead of failing recovery initiation
    pub adjust_after_age: bool,
    /// Period of the recovery watchdog (seconds)
    pub recovery_check_interval_seconds: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            node_id: None,
            default_locale: "en".to_string(),
            desired_locales: vec!["en".to_string()],
            disabled_producers: Vec::new(),
            max_inactivity_seconds: 20,
            alive_violation_multiplier: 2,
            max_recovery_time_seconds: 3600,
            stateful_recovery_window_minutes: 4320,
            adjust_after_age: false,
            recovery_check_interval_seconds: 10,
        }
    }
}

impl FeedConfig {
    /// Parse and validate configuration from a TOML string
    pub fn from_toml_str(toml_str: &str) -> Result<Self> {
        let config: Self = toml::from_str(toml_str)
            .map_err(|e| ConfigError::Load(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Load(format!("Failed to read config file: {}", e)))?;
        Self::from_toml_str(&contents)
    }

    /// Load from a file with `ODDSFEED_*` environment overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading feed configuration from {:?}", path);

        let config: Self = Config::builder()
            .add_source(File::from(path).required(true))
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .map_err(|e| ConfigError::Load(format!("Failed to build configuration: {}", e)))?
            .try_deserialize()
            .map_err(|e| ConfigError::Load(format!("Failed to deserialize configuration: {}", e)))?;

        config.validate()?;
        debug!(?config, "Feed configuration loaded");
        Ok(config)
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if !(MIN_INACTIVITY_SECONDS..=MAX_INACTIVITY_SECONDS).contains(&self.max_inactivity_seconds)
        {
            return Err(ConfigError::Invalid {
                field: "max_inactivity_seconds",
                reason: format!(
                    "must be within {}..={}, got {}",
                    MIN_INACTIVITY_SECONDS, MAX_INACTIVITY_SECONDS, self.max_inactivity_seconds
                ),
            });
        }

        if !(MIN_RECOVERY_TIME_SECONDS..=MAX_RECOVERY_TIME_SECONDS)
            .contains(&self.max_recovery_time_seconds)
        {
            return Err(ConfigError::Invalid {
                field: "max_recovery_time_seconds",
                reason: format!(
                    "must be within {}..={}, got {}",
                    MIN_RECOVERY_TIME_SECONDS,
                    MAX_RECOVERY_TIME_SECONDS,
                    self.max_recovery_time_seconds
                ),
            });
        }

        if self.alive_violation_multiplier == 0 {
            return Err(ConfigError::Invalid {
                field: "alive_violation_multiplier",
                reason: "must be > 0".to_string(),
            });
        }

        if self.stateful_recovery_window_minutes == 0 {
            return Err(ConfigError::Invalid {
                field: "stateful_recovery_window_minutes",
                reason: "must be > 0".to_string(),
            });
        }

        if self.recovery_check_interval_seconds == 0 {
            return Err(ConfigError::Invalid {
                field: "recovery_check_interval_seconds",
                reason: "must be > 0".to_string(),
            });
        }

        if self.default_locale.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "default_locale",
                reason: "cannot be empty".to_string(),
            });
        }

        if self.node_id == Some(0) {
            return Err(ConfigError::Invalid {
                field: "node_id",
                reason: "0 is reserved, leave unset instead".to_string(),
            });
        }

        Ok(())
    }

    /// Default locale first, then the desired locales without duplicates
    pub fn locales(&self) -> Vec<String> {
        let mut locales = vec![self.default_locale.clone()];
        for locale in &self.desired_locales {
            if !locales.contains(locale) {
                locales.push(locale.clone());
            }
        }
        locales
    }

    /// Period of the recovery watchdog timer
    pub fn recovery_check_interval(&self) -> Duration {
        Duration::from_secs(self.recovery_check_interval_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = FeedConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.alive_violation_multiplier, 2);
        assert!(!config.adjust_after_age);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = FeedConfig::from_toml_str(
            r#"
            node_id = 7
            desired_locales = ["de", "en"]
            adjust_after_age = true
            "#,
        )
        .unwrap();

        assert_eq!(config.node_id, Some(7));
        assert!(config.adjust_after_age);
        assert_eq!(config.max_inactivity_seconds, 20);
        assert_eq!(config.locales(), vec!["en".to_string(), "de".to_string()]);
    }

    #[test]
    fn rejects_out_of_range_values() {
        let err = FeedConfig::from_toml_str("max_inactivity_seconds = 5").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "max_inactivity_seconds",
                ..
            }
        ));

        let err = FeedConfig::from_toml_str("max_recovery_time_seconds = 60").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "max_recovery_time_seconds",
                ..
            }
        ));

        assert!(FeedConfig::from_toml_str("alive_violation_multiplier = 0").is_err());
    }

    #[test]
    fn rejects_malformed_toml() {
        assert!(matches!(
            FeedConfig::from_toml_str("node_id = \"seven\""),
            Err(ConfigError::Load(_))
        ));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "max_inactivity_seconds = 30").unwrap();
        writeln!(file, "disabled_producers = [3, 6]").unwrap();
        writeln!(file, "recovery_check_interval_seconds = 15").unwrap();

        let config = FeedConfig::from_file(file.path()).unwrap();
        assert_eq!(config.max_inactivity_seconds, 30);
        assert_eq!(config.disabled_producers, vec![3, 6]);
        assert_eq!(config.recovery_check_interval(), Duration::from_secs(15));

        let layered = FeedConfig::load(file.path()).unwrap();
        assert_eq!(layered.max_inactivity_seconds, 30);
    }
}
