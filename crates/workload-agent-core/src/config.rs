//! JSON configuration loading.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize, Serializer, de::DeserializeOwned};
use thiserror::Error;

use crate::usage::{GLOBAL_CONFIG_FILE_READ_ERROR, GLOBAL_MALFORMED_CONFIG_FILE_ERROR};

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not read configuration file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Configuration file {0} is empty")]
    Empty(PathBuf),
    #[error("Configuration JSON at '{path}' has error: {source}. Please fix the JSON and restart the agent")]
    Malformed {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl ConfigError {
    /// Usage metrics error code reported for this failure.
    #[must_use]
    pub const fn usage_error_code(&self) -> i32 {
        match self {
            Self::Read { .. } | Self::Empty(_) => GLOBAL_CONFIG_FILE_READ_ERROR,
            Self::Malformed { .. } => GLOBAL_MALFORMED_CONFIG_FILE_ERROR,
        }
    }
}

/// Read and parse a JSON configuration file.
///
/// # Errors
/// Returns error if the file is missing, empty, or not valid JSON for `T`.
pub async fn read_config<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let content = tokio::fs::read(path).await.map_err(|source| {
        tracing::error!(file = %path.display(), error = %source, "Could not read from configuration file");
        ConfigError::Read {
            path: path.to_path_buf(),
            source,
        }
    })?;
    parse_config(path, &content)
}

/// Parse configuration content that was read from `path`.
///
/// # Errors
/// Returns error if the content is empty or not valid JSON for `T`.
pub fn parse_config<T: DeserializeOwned>(path: &Path, content: &[u8]) -> Result<T, ConfigError> {
    if content.is_empty() {
        tracing::error!(file = %path.display(), "Configuration file is empty");
        return Err(ConfigError::Empty(path.to_path_buf()));
    }
    serde_json::from_slice(content).map_err(|source| {
        tracing::error!(
            file = %path.display(),
            content = %String::from_utf8_lossy(content),
            "Invalid content in the configuration file"
        );
        ConfigError::Malformed {
            path: path.to_path_buf(),
            source,
        }
    })
}

/// Log level as written in agent configuration files.
///
/// Accepts either the enum name (`"DEBUG"`) or its number (`1`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    #[default]
    Unspecified,
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    /// Name used in configuration files.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unspecified => "LOG_LEVEL_UNSPECIFIED",
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        }
    }

    const fn from_number(n: i64) -> Self {
        match n {
            1 => Self::Debug,
            2 => Self::Info,
            3 => Self::Warning,
            4 => Self::Error,
            _ => Self::Unspecified,
        }
    }

    fn from_name(name: &str) -> Self {
        match name {
            "DEBUG" => Self::Debug,
            "INFO" => Self::Info,
            "WARNING" => Self::Warning,
            "ERROR" => Self::Error,
            _ => Self::Unspecified,
        }
    }

    /// Tracing level for this configuration level. Unspecified means INFO.
    #[must_use]
    pub fn to_tracing(self) -> tracing::Level {
        match self {
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warning => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
            Self::Unspecified => {
                tracing::warn!(level = self.as_str(), "Unsupported log level, defaulting to INFO");
                tracing::Level::INFO
            }
        }
    }
}

impl Serialize for LogLevel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for LogLevel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Name(String),
            Number(i64),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Name(name) => Self::from_name(&name),
            Raw::Number(n) => Self::from_number(n),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct TestConfig {
        #[serde(default)]
        log_level: LogLevel,
        #[serde(default)]
        loop_seconds: u64,
    }

    #[test]
    fn test_parse_config() {
        let cfg: TestConfig =
            parse_config(Path::new("c.json"), br#"{"logLevel":"DEBUG","loopSeconds":7}"#).unwrap();
        assert_eq!(cfg.log_level, LogLevel::Debug);
        assert_eq!(cfg.loop_seconds, 7);
    }

    #[test]
    fn test_parse_config_numeric_level() {
        let cfg: TestConfig = parse_config(Path::new("c.json"), br#"{"logLevel":3}"#).unwrap();
        assert_eq!(cfg.log_level, LogLevel::Warning);
    }

    #[test]
    fn test_parse_config_empty() {
        let err = parse_config::<TestConfig>(Path::new("c.json"), b"").unwrap_err();
        assert!(matches!(err, ConfigError::Empty(_)));
        assert_eq!(err.usage_error_code(), GLOBAL_CONFIG_FILE_READ_ERROR);
    }

    #[test]
    fn test_parse_config_malformed() {
        let err = parse_config::<TestConfig>(Path::new("c.json"), b"{not json").unwrap_err();
        assert!(matches!(err, ConfigError::Malformed { .. }));
        assert_eq!(err.usage_error_code(), GLOBAL_MALFORMED_CONFIG_FILE_ERROR);
    }

    #[tokio::test]
    async fn test_read_config_missing_file() {
        let err = read_config::<TestConfig>(Path::new("/nonexistent/agent/configuration.json"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_log_level_to_tracing() {
        assert_eq!(LogLevel::Debug.to_tracing(), tracing::Level::DEBUG);
        assert_eq!(LogLevel::Error.to_tracing(), tracing::Level::ERROR);
        assert_eq!(LogLevel::Unspecified.to_tracing(), tracing::Level::INFO);
        assert_eq!(LogLevel::from_number(42), LogLevel::Unspecified);
    }
}
