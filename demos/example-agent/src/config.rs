//! Example agent configuration file.

use std::{path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};
use workload_agent_core::{CloudProperties, LogLevel};

pub const LINUX_CONFIG_PATH: &str = "/etc/google-cloud-example-agent/configuration.json";
pub const WINDOWS_CONFIG_PATH: &str =
    r"C:\Program Files\Google\google-cloud-example-agent\conf\configuration.json";

const DEFAULT_FAST_SERVICE_LOOP_SECONDS: u64 = 5;
const DEFAULT_SLOW_SERVICE_LOOP_SECONDS: u64 = 30;

/// Contents of `configuration.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct Configuration {
    pub log_level: LogLevel,
    /// Overrides the properties read from the metadata server.
    pub cloud_properties: Option<CloudProperties>,
    pub fast_service_loop_seconds: u64,
    pub slow_service_loop_seconds: u64,
    pub communication: Option<CommunicationConfig>,
}

/// ACS channel settings. No channel means no communication service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct CommunicationConfig {
    /// Broker endpoint; empty uses the default.
    pub endpoint: String,
    pub channel: String,
}

impl Configuration {
    /// Fill in unset loop intervals.
    pub fn apply_defaults(&mut self) {
        if self.fast_service_loop_seconds == 0 {
            self.fast_service_loop_seconds = DEFAULT_FAST_SERVICE_LOOP_SECONDS;
        }
        if self.slow_service_loop_seconds == 0 {
            self.slow_service_loop_seconds = DEFAULT_SLOW_SERVICE_LOOP_SECONDS;
        }
    }

    #[must_use]
    pub const fn fast_interval(&self) -> Duration {
        Duration::from_secs(self.fast_service_loop_seconds)
    }

    #[must_use]
    pub const fn slow_interval(&self) -> Duration {
        Duration::from_secs(self.slow_service_loop_seconds)
    }

    /// Channel settings, if a channel is configured.
    #[must_use]
    pub fn channel(&self) -> Option<&CommunicationConfig> {
        self.communication.as_ref().filter(|c| !c.channel.is_empty())
    }
}

/// Default configuration path for `os_type`.
#[must_use]
pub fn default_config_path(os_type: &str) -> PathBuf {
    if os_type == "windows" {
        PathBuf::from(WINDOWS_CONFIG_PATH)
    } else {
        PathBuf::from(LINUX_CONFIG_PATH)
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use workload_agent_core::{ConfigError, config::parse_config};

    use super::*;

    #[test]
    fn test_parse_full_configuration() {
        let json = br#"{
            "logLevel": "DEBUG",
            "cloudProperties": {"projectId": "test-project", "zone": "us-central1-a"},
            "fastServiceLoopSeconds": 2,
            "slowServiceLoopSeconds": 10,
            "communication": {"endpoint": "localhost:9000", "channel": "example-channel"}
        }"#;
        let config: Configuration = parse_config(Path::new("configuration.json"), json).unwrap();

        assert_eq!(config.log_level, LogLevel::Debug);
        assert_eq!(
            config.cloud_properties.as_ref().map(|c| c.project_id.as_str()),
            Some("test-project")
        );
        assert_eq!(config.fast_interval(), Duration::from_secs(2));
        assert_eq!(config.slow_interval(), Duration::from_secs(10));
        assert_eq!(
            config.channel().map(|c| c.channel.as_str()),
            Some("example-channel")
        );
    }

    #[test]
    fn test_unknown_field_is_malformed() {
        for json in [
            &br#"{"fastServiceLoopSecond": 1}"#[..],
            br#"{"communication": {"chanel": "example-channel"}}"#,
        ] {
            let err = parse_config::<Configuration>(Path::new("configuration.json"), json)
                .unwrap_err();
            assert!(matches!(err, ConfigError::Malformed { .. }));
            assert_eq!(err.usage_error_code(), 2);
        }
    }

    #[test]
    fn test_apply_defaults() {
        let mut config: Configuration =
            parse_config(Path::new("configuration.json"), br#"{"logLevel": 2}"#).unwrap();
        config.apply_defaults();

        assert_eq!(config.log_level, LogLevel::Info);
        assert_eq!(config.fast_service_loop_seconds, 5);
        assert_eq!(config.slow_service_loop_seconds, 30);
        assert!(config.channel().is_none());
    }

    #[test]
    fn test_apply_defaults_keeps_configured_values() {
        let mut config = Configuration {
            fast_service_loop_seconds: 1,
            slow_service_loop_seconds: 2,
            ..Configuration::default()
        };
        config.apply_defaults();
        assert_eq!(config.fast_service_loop_seconds, 1);
        assert_eq!(config.slow_service_loop_seconds, 2);
    }

    #[test]
    fn test_empty_channel_disables_communication() {
        let config = Configuration {
            communication: Some(CommunicationConfig {
                endpoint: "localhost:9000".to_string(),
                channel: String::new(),
            }),
            ..Configuration::default()
        };
        assert!(config.channel().is_none());
    }

    #[test]
    fn test_default_config_path() {
        assert_eq!(default_config_path("linux"), PathBuf::from(LINUX_CONFIG_PATH));
        assert_eq!(default_config_path("windows"), PathBuf::from(WINDOWS_CONFIG_PATH));
    }
}
