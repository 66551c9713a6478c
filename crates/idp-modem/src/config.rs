//! Modem engine configuration.

use std::path::Path;
use std::time::Duration;

use idp_at_protocol::CRC_PRESET;
use serde::{Deserialize, Serialize};

use crate::error::{ModemError, ModemResult};

// ============================================================================
// Configuration Types
// ============================================================================

/// Configuration for an [`IdpModem`](crate::IdpModem).
///
/// Every field has a default, so a YAML document only needs the keys it
/// changes:
///
/// ```yaml
/// name: modem0
/// command_timeout_ms: 10000
/// crc: true
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModemConfig {
    /// Name used in log messages and metric labels.
    pub name: String,
    /// Default per-line response timeout.
    pub command_timeout_ms: u64,
    /// How long to wait for a checksum line after the result code.
    pub checksum_timeout_ms: u64,
    /// Per-line timeout while draining unsolicited data before a command.
    pub drain_timeout_ms: u64,
    /// Total attempts per command when the response checksum fails.
    pub crc_retries: u32,
    /// CRC register preset.
    pub crc_preset: u16,
    /// Whether [`IdpModem::connect`](crate::IdpModem::connect) enables CRC.
    pub crc: bool,
    /// Address of a TCP serial bridge (`host:port`), if not using a local port.
    pub address: Option<String>,
}

impl Default for ModemConfig {
    fn default() -> Self {
        ModemConfig {
            name: "modem".to_string(),
            command_timeout_ms: 5000,
            checksum_timeout_ms: 1000,
            drain_timeout_ms: 250,
            crc_retries: 1,
            crc_preset: CRC_PRESET,
            crc: false,
            address: None,
        }
    }
}

impl ModemConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml_str(yaml: &str) -> ModemResult<Self> {
        let config: ModemConfig =
            serde_yaml::from_str(yaml).map_err(|e| ModemError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a YAML file.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> ModemResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ModemError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_yaml_str(&text)
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> ModemResult<()> {
        let timeouts = [
            ("command_timeout_ms", self.command_timeout_ms),
            ("checksum_timeout_ms", self.checksum_timeout_ms),
            ("drain_timeout_ms", self.drain_timeout_ms),
        ];
        for (key, value) in timeouts {
            if value == 0 {
                return Err(ModemError::Config(format!("{} must be positive", key)));
            }
        }
        if self.crc_retries == 0 {
            return Err(ModemError::Config("crc_retries must be at least 1".into()));
        }
        Ok(())
    }

    /// Default per-line response timeout.
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    /// Checksum tail read timeout.
    pub fn checksum_timeout(&self) -> Duration {
        Duration::from_millis(self.checksum_timeout_ms)
    }

    /// Pre-command drain timeout.
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ModemConfig::default();
        assert_eq!(config.command_timeout(), Duration::from_secs(5));
        assert_eq!(config.checksum_timeout(), Duration::from_secs(1));
        assert_eq!(config.drain_timeout(), Duration::from_millis(250));
        assert_eq!(config.crc_retries, 1);
        assert_eq!(config.crc_preset, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml() {
        let config = ModemConfig::from_yaml_str(
            "name: sat1\ncrc: true\ncrc_preset: 65535\naddress: \"127.0.0.1:4001\"\n",
        )
        .unwrap();
        assert_eq!(config.name, "sat1");
        assert!(config.crc);
        assert_eq!(config.crc_preset, 0xFFFF);
        assert_eq!(config.address.as_deref(), Some("127.0.0.1:4001"));
        assert_eq!(config.command_timeout_ms, 5000);
    }

    #[test]
    fn test_validation() {
        let err = ModemConfig::from_yaml_str("crc_retries: 0").unwrap_err();
        assert!(matches!(err, ModemError::Config(_)));

        let err = ModemConfig::from_yaml_str("checksum_timeout_ms: 0").unwrap_err();
        assert!(err.to_string().contains("checksum_timeout_ms"));

        let err = ModemConfig::from_yaml_str("command_timeout_ms: [1]").unwrap_err();
        assert!(matches!(err, ModemError::Config(_)));
    }

    #[test]
    fn test_yaml_round_trip() {
        let config = ModemConfig {
            crc: true,
            ..Default::default()
        };
        let text = serde_yaml::to_string(&config).unwrap();
        assert_eq!(ModemConfig::from_yaml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_missing_file() {
        let err = ModemConfig::from_yaml_file("/nonexistent/modem.yaml").unwrap_err();
        assert!(matches!(err, ModemError::Config(_)));
    }
}
