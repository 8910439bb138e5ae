//! Configuration parsing for the supervisor daemon.
//!
//! Plain key=value format, one setting per line, `#` comments.
//! Precedence: CLI flags > `--config` file > defaults.

use crate::types::{ACCESS_MULTIMEDIA, ACCESS_TTS};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default package directories, scanned in this order.
pub const DEFAULT_APP_DIRS: [&str; 2] = ["/opt/apps", "/data/apps"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("invalid config line: {0}")]
    InvalidLine(String),
    #[error("invalid boolean value for {key}: {value}")]
    InvalidBool { key: String, value: String },
    #[error("invalid integer value for {key}: {value}")]
    InvalidInt { key: String, value: String },
    #[error("{0} must be greater than zero")]
    ZeroCapacity(&'static str),
}

/// Supervisor configuration.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Config {
    /// Package directories, loaded strictly in this order.
    pub app_dirs: Vec<PathBuf>,
    /// Permissions granted to applications registered at runtime.
    pub external_permissions: Vec<String>,
    /// Reject foreground-only calls from background callers with an error
    /// instead of acknowledging them without effect.
    pub strict_foreground: bool,
    /// Capacity of the supervisor request queue.
    pub request_queue: usize,
    /// Capacity of the notification broadcast channel.
    pub notification_capacity: usize,
    /// Unknown keys seen while parsing, reported by the daemon at startup.
    #[serde(skip)]
    pub warnings: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_dirs: DEFAULT_APP_DIRS.iter().map(PathBuf::from).collect(),
            external_permissions: vec![ACCESS_TTS.to_string(), ACCESS_MULTIMEDIA.to_string()],
            strict_foreground: false,
            request_queue: 64,
            notification_capacity: 128,
            warnings: Vec::new(),
        }
    }
}

impl Config {
    /// Load config from a file, merging with defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.load_file(path)?;
        Ok(config)
    }

    /// Load and merge values from a config file.
    pub fn load_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let content = std::fs::read_to_string(path)?;
        self.parse_content(&content)
    }

    /// Parse config content (key=value format).
    pub fn parse_content(&mut self, content: &str) -> Result<(), ConfigError> {
        for line in content.lines() {
            let trimmed = line.trim();

            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let Some((key, value)) = trimmed.split_once('=') else {
                return Err(ConfigError::InvalidLine(line.to_string()));
            };

            let key = key.trim();
            let value = Self::unquote(value.trim());

            self.apply_value(key, &value)?;
        }
        Ok(())
    }

    /// Remove surrounding quotes from a value.
    fn unquote(value: &str) -> String {
        if value.len() >= 2
            && ((value.starts_with('"') && value.ends_with('"'))
                || (value.starts_with('\'') && value.ends_with('\'')))
        {
            return value[1..value.len() - 1].to_string();
        }
        value.to_string()
    }

    /// Apply a single config value.
    fn apply_value(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            "app_dirs" => {
                self.app_dirs = value.split_whitespace().map(PathBuf::from).collect();
            }
            "external_permissions" => {
                self.external_permissions =
                    value.split_whitespace().map(str::to_string).collect();
            }
            "strict_foreground" => self.strict_foreground = Self::parse_bool(key, value)?,
            "request_queue" => self.request_queue = Self::parse_capacity(key, value)?,
            "notification_capacity" => {
                self.notification_capacity = Self::parse_capacity(key, value)?;
            }
            _ => {
                self.warnings.push(format!("unknown config key: {key}"));
            }
        }
        Ok(())
    }

    /// Parse a boolean value.
    fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
        match value.to_lowercase().as_str() {
            "true" | "1" | "yes" | "y" | "on" => Ok(true),
            "false" | "0" | "no" | "n" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidBool {
                key: key.to_string(),
                value: value.to_string(),
            }),
        }
    }

    /// Parse a channel capacity; zero is rejected since tokio channels panic on it.
    fn parse_capacity(key: &str, value: &str) -> Result<usize, ConfigError> {
        match value.parse::<usize>() {
            Ok(n) if n > 0 => Ok(n),
            _ => Err(ConfigError::InvalidInt {
                key: key.to_string(),
                value: value.to_string(),
            }),
        }
    }

    /// Check values that did not come through [`Config::parse_content`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.request_queue == 0 {
            return Err(ConfigError::ZeroCapacity("request_queue"));
        }
        if self.notification_capacity == 0 {
            return Err(ConfigError::ZeroCapacity("notification_capacity"));
        }
        Ok(())
    }

    /// Resolve relative package directories against a base directory.
    pub fn resolve_paths(&mut self, base: &Path) {
        self.app_dirs = self
            .app_dirs
            .iter()
            .map(|dir| {
                if dir.is_relative() {
                    base.join(dir)
                } else {
                    dir.clone()
                }
            })
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_has_expected_values() {
        let config = Config::default();
        assert_eq!(
            config.app_dirs,
            vec![PathBuf::from("/opt/apps"), PathBuf::from("/data/apps")]
        );
        assert_eq!(config.external_permissions, vec!["ACCESS_TTS", "ACCESS_MULTIMEDIA"]);
        assert!(!config.strict_foreground);
        assert_eq!(config.request_queue, 64);
        assert_eq!(config.notification_capacity, 128);
    }

    #[test]
    fn parse_simple_config() {
        let mut config = Config::default();
        let content = r#"
# package roots
app_dirs="/system/apps /data/apps"
strict_foreground=yes
request_queue=16
"#;
        config.parse_content(content).unwrap();
        assert_eq!(
            config.app_dirs,
            vec![PathBuf::from("/system/apps"), PathBuf::from("/data/apps")]
        );
        assert!(config.strict_foreground);
        assert_eq!(config.request_queue, 16);
        assert!(config.warnings.is_empty());
    }

    #[test]
    fn parse_external_permissions() {
        let mut config = Config::default();
        config
            .parse_content("external_permissions=ACCESS_TTS")
            .unwrap();
        assert_eq!(config.external_permissions, vec!["ACCESS_TTS"]);

        config.parse_content("external_permissions=").unwrap();
        assert!(config.external_permissions.is_empty());
    }

    #[test]
    fn unquote_removes_quotes() {
        assert_eq!(Config::unquote("\"hello\""), "hello");
        assert_eq!(Config::unquote("'world'"), "world");
        assert_eq!(Config::unquote("noquotes"), "noquotes");
    }

    #[test]
    fn parse_bool_accepts_variants() {
        assert!(Config::parse_bool("test", "true").unwrap());
        assert!(Config::parse_bool("test", "ON").unwrap());
        assert!(!Config::parse_bool("test", "0").unwrap());
        assert!(!Config::parse_bool("test", "off").unwrap());
        assert!(Config::parse_bool("test", "maybe").is_err());
    }

    #[test]
    fn rejects_line_without_equals() {
        let mut config = Config::default();
        assert!(matches!(
            config.parse_content("app_dirs"),
            Err(ConfigError::InvalidLine(_))
        ));
    }

    #[test]
    fn rejects_zero_capacity() {
        let mut config = Config::default();
        assert!(matches!(
            config.parse_content("notification_capacity=0"),
            Err(ConfigError::InvalidInt { .. })
        ));
        assert!(config.parse_content("request_queue=lots").is_err());
    }

    #[test]
    fn validate_rejects_zero_capacity_from_serde() {
        let config: Config = serde_json::from_str(r#"{"request_queue": 0}"#).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ZeroCapacity("request_queue"))
        ));

        let config: Config = serde_json::from_str(r#"{"notification_capacity": 0}"#).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ZeroCapacity("notification_capacity"))
        ));
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn unknown_keys_are_collected() {
        let mut config = Config::default();
        config.parse_content("volume=11").unwrap();
        assert_eq!(config.warnings, vec!["unknown config key: volume"]);
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "app_dirs=apps").unwrap();
        let mut config = Config::from_file(file.path()).unwrap();
        config.resolve_paths(Path::new("/srv"));
        assert_eq!(config.app_dirs, vec![PathBuf::from("/srv/apps")]);
    }

    #[test]
    fn missing_file_is_read_error() {
        let err = Config::from_file(Path::new("/nonexistent/vuid.conf")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadError(_)));
    }
}
