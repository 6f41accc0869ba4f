//! Gateway configuration.
//!
//! Loaded from an optional TOML file, then overridden from `NOWTALK_*`
//! environment variables, then validated:
//!
//! ```toml
//! serialport = "/dev/ttyUSB0"
//! baudrate = 115200
//! database = "nowtalk.db"
//! external_ip = "203.0.113.7"
//! server_name = "nowTalk"
//! allow_guests = false
//! ```

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use nowtalk_core::constants::{
    DEFAULT_BAUD_RATE, DEFAULT_HANDSHAKE_TIMEOUT, DEFAULT_INTER_BYTE_TIMEOUT,
    DEFAULT_LIVENESS_TIMEOUT, DEFAULT_PAIRING_TIMEOUT, DEFAULT_RECONNECT_DELAY,
    DEFAULT_TICK_INTERVAL,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

/// Prefix of environment variables that override file values.
pub const ENV_PREFIX: &str = "NOWTALK";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for environment variable {name}: {reason}")]
    InvalidEnvVar { name: String, reason: String },

    #[error("Invalid configuration value for {key}: {reason}")]
    InvalidValue { key: &'static str, reason: String },
}

impl ConfigError {
    fn invalid_env_var(name: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::InvalidEnvVar {
            name: name.into(),
            reason: reason.into(),
        }
    }

    fn invalid_value(key: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            key,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Serial device path; `None` leaves the link down.
    pub serialport: Option<String>,
    pub baudrate: u32,
    /// SQLite database file.
    pub database: String,
    /// Address announced to badges in pairing offers.
    pub external_ip: String,
    /// Server name announced to badges in pairing offers.
    pub server_name: String,
    /// Admit unknown badges that ping the gateway.
    pub allow_guests: bool,
    /// Directory holding `nowTalkBadge.bin`.
    pub firmware_dir: PathBuf,
    pub reconnect_delay_ms: u64,
    pub handshake_timeout_ms: u64,
    pub pairing_timeout_ms: u64,
    pub inter_byte_timeout_ms: u64,
    pub liveness_timeout_ms: u64,
    pub tick_interval_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            serialport: None,
            baudrate: DEFAULT_BAUD_RATE,
            database: "nowtalk.db".to_string(),
            external_ip: String::new(),
            server_name: "nowTalk".to_string(),
            allow_guests: false,
            firmware_dir: PathBuf::from("firmware"),
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY.as_millis() as u64,
            handshake_timeout_ms: DEFAULT_HANDSHAKE_TIMEOUT.as_millis() as u64,
            pairing_timeout_ms: DEFAULT_PAIRING_TIMEOUT.as_millis() as u64,
            inter_byte_timeout_ms: DEFAULT_INTER_BYTE_TIMEOUT.as_millis() as u64,
            liveness_timeout_ms: DEFAULT_LIVENESS_TIMEOUT.as_millis() as u64,
            tick_interval_ms: DEFAULT_TICK_INTERVAL.as_millis() as u64,
        }
    }
}

impl GatewayConfig {
    /// Load the effective configuration.
    ///
    /// A missing file is not an error; defaults are used instead. Environment
    /// overrides are applied after the file, then the result is validated.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) if path.exists() => {
                info!("Loading configuration from: {}", path.display());
                let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                Self::from_toml_str(&content)?
            }
            Some(path) => {
                info!(
                    "Configuration file {} not found, using defaults",
                    path.display()
                );
                Self::default()
            }
            None => Self::default(),
        };

        config.apply_env_overrides(|name| env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Apply `NOWTALK_*` overrides using `lookup` to read variables.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |suffix: &str| {
            let name = format!("{ENV_PREFIX}_{suffix}");
            lookup(&name).map(|value| (name, value))
        };

        if let Some((_, value)) = var("SERIALPORT") {
            self.serialport = (!value.is_empty()).then_some(value);
        }
        if let Some((name, value)) = var("BAUDRATE") {
            self.baudrate = value
                .parse()
                .map_err(|_| ConfigError::invalid_env_var(name, "expected a baud rate"))?;
        }
        if let Some((_, value)) = var("DATABASE") {
            self.database = value;
        }
        if let Some((_, value)) = var("EXTERNAL_IP") {
            self.external_ip = value;
        }
        if let Some((_, value)) = var("SERVER_NAME") {
            self.server_name = value;
        }
        if let Some((name, value)) = var("ALLOW_GUESTS") {
            self.allow_guests = parse_bool(&value)
                .ok_or_else(|| ConfigError::invalid_env_var(name, "expected true or false"))?;
        }
        if let Some((_, value)) = var("FIRMWARE_DIR") {
            self.firmware_dir = PathBuf::from(value);
        }

        debug!(?self, "Configuration after environment overrides");
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.baudrate == 0 {
            return Err(ConfigError::invalid_value("baudrate", "must be positive"));
        }
        if self.server_name.contains('~') {
            return Err(ConfigError::invalid_value(
                "server_name",
                "must not contain '~'",
            ));
        }
        if self.external_ip.contains('~') {
            return Err(ConfigError::invalid_value(
                "external_ip",
                "must not contain '~'",
            ));
        }

        let timeouts = [
            ("reconnect_delay_ms", self.reconnect_delay_ms),
            ("handshake_timeout_ms", self.handshake_timeout_ms),
            ("pairing_timeout_ms", self.pairing_timeout_ms),
            ("inter_byte_timeout_ms", self.inter_byte_timeout_ms),
            ("liveness_timeout_ms", self.liveness_timeout_ms),
            ("tick_interval_ms", self.tick_interval_ms),
        ];
        for (key, value) in timeouts {
            if value == 0 {
                return Err(ConfigError::invalid_value(key, "must be greater than zero"));
            }
        }
        Ok(())
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn pairing_timeout(&self) -> Duration {
        Duration::from_millis(self.pairing_timeout_ms)
    }

    pub fn inter_byte_timeout(&self) -> Duration {
        Duration::from_millis(self.inter_byte_timeout_ms)
    }

    pub fn liveness_timeout(&self) -> Duration {
        Duration::from_millis(self.liveness_timeout_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::default();
        assert_eq!(config.serialport, None);
        assert_eq!(config.baudrate, 115_200);
        assert_eq!(config.database, "nowtalk.db");
        assert_eq!(config.server_name, "nowTalk");
        assert!(!config.allow_guests);
        assert_eq!(config.reconnect_delay(), Duration::from_secs(5));
        assert_eq!(config.handshake_timeout(), Duration::from_millis(1500));
        assert_eq!(config.pairing_timeout(), Duration::from_secs(90));
        assert_eq!(config.inter_byte_timeout(), Duration::from_millis(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = GatewayConfig::from_toml_str(
            r#"
            serialport = "/dev/ttyUSB0"
            external_ip = "203.0.113.7"
            allow_guests = true
            "#,
        )
        .unwrap();

        assert_eq!(config.serialport.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(config.external_ip, "203.0.113.7");
        assert!(config.allow_guests);
        assert_eq!(config.baudrate, 115_200);
    }

    #[test]
    fn test_env_overrides_file_values() {
        let mut config = GatewayConfig::from_toml_str("baudrate = 9600").unwrap();
        config
            .apply_env_overrides(env(&[
                ("NOWTALK_BAUDRATE", "57600"),
                ("NOWTALK_SERIALPORT", "/dev/ttyACM0"),
                ("NOWTALK_ALLOW_GUESTS", "yes"),
                ("NOWTALK_SERVER_NAME", "office"),
            ]))
            .unwrap();

        assert_eq!(config.baudrate, 57600);
        assert_eq!(config.serialport.as_deref(), Some("/dev/ttyACM0"));
        assert!(config.allow_guests);
        assert_eq!(config.server_name, "office");
    }

    #[test]
    fn test_invalid_env_value() {
        let mut config = GatewayConfig::default();
        let result = config.apply_env_overrides(env(&[("NOWTALK_BAUDRATE", "fast")]));
        assert!(matches!(result, Err(ConfigError::InvalidEnvVar { .. })));
    }

    #[rstest]
    #[case("baudrate = 0")]
    #[case("handshake_timeout_ms = 0")]
    #[case("pairing_timeout_ms = 0")]
    #[case("server_name = \"a~b\"")]
    fn test_validation_rejects(#[case] toml: &str) {
        let config = GatewayConfig::from_toml_str(toml).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = GatewayConfig::load(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config.baudrate, GatewayConfig::default().baudrate);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nowtalk.toml");
        fs::write(&path, "server_name = \"lab\"\nbaudrate = 9600\n").unwrap();

        let config = GatewayConfig::load(Some(&path)).unwrap();
        assert_eq!(config.server_name, "lab");
        assert_eq!(config.baudrate, 9600);
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(
            GatewayConfig::from_toml_str("baudrate = \"x\""),
            Err(ConfigError::Parse(_))
        ));
    }
}
