use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::version::detector::DetectionMethod;
use crate::version::error::ConfigError;
use crate::version::migration::{FieldMapping, MigrationStrategy};
use crate::version::semver::{Version, default_version};

// =============================================================================
// Detection defaults
// =============================================================================

/// Vendor media-type prefix searched for in the Accept header
pub const DEFAULT_ACCEPT_HEADER_PREFIX: &str = "application/vnd.api.v";

/// Query parameter carrying the requested version
pub const DEFAULT_QUERY_PARAM_NAME: &str = "version";

/// Request context key holding the resolved version
pub const DEFAULT_CONTEXT_KEY: &str = "api_version";

/// Source reported when the default version is used
pub const DEFAULT_VERSION_SOURCE: &str = "default_version";

/// Query parameter naming the target component
pub const COMPONENT_QUERY_PARAM: &str = "component";

// =============================================================================
// Header names
// =============================================================================

pub const API_VERSION_HEADER: &str = "API-Version";
pub const X_API_VERSION_HEADER: &str = "X-API-Version";
pub const COMPONENT_HEADER: &str = "X-Component";
pub const REQUEST_ID_HEADER: &str = "X-Request-ID";
pub const DETECTION_METHOD_HEADER: &str = "X-Version-Detection-Method";

/// Default log filter when neither config nor `RUST_LOG` sets one
pub const DEFAULT_LOG_LEVEL: &str = "info";

const APP_NAME: &str = "gateway-version";

/// Top-level configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct VersioningConfig {
    pub detector: DetectorConfig,
    pub migrations: Vec<MigrationConfig>,
    pub logging: LoggingConfig,
}

/// Version detection configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct DetectorConfig {
    pub default_version: Version,
    /// Enabled methods in priority order
    pub methods: Vec<DetectionMethod>,
    pub accept_header_prefix: String,
    pub query_param_name: String,
    pub context_key: String,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            default_version: default_version(),
            methods: DetectionMethod::ALL.to_vec(),
            accept_header_prefix: DEFAULT_ACCEPT_HEADER_PREFIX.to_string(),
            query_param_name: DEFAULT_QUERY_PARAM_NAME.to_string(),
            context_key: DEFAULT_CONTEXT_KEY.to_string(),
        }
    }
}

/// A declarative migration between two versions of a component
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MigrationConfig {
    pub component: String,
    pub from: Version,
    pub to: Version,
    #[serde(default = "default_strategy")]
    pub strategy: MigrationStrategy,
    #[serde(default)]
    pub field_mappings: Vec<FieldMapping>,
    #[serde(default)]
    pub reversible: bool,
    #[serde(default)]
    pub description: String,
}

fn default_strategy() -> MigrationStrategy {
    MigrationStrategy::Automatic
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct LoggingConfig {
    /// Filter directive, overridden by `RUST_LOG`
    pub level: String,
    pub json: bool,
    /// Write daily-rotated log files to [`log_path`] instead of stderr
    pub file: bool,
    /// Log file directory; implies `file`
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            json: false,
            file: false,
            directory: None,
        }
    }
}

impl LoggingConfig {
    /// Directory for log files, or None to log to stderr
    pub fn log_directory(&self) -> Option<PathBuf> {
        match &self.directory {
            Some(dir) => Some(dir.clone()),
            None if self.file => Some(log_path()),
            None => None,
        }
    }
}

/// Reads a JSON configuration file.
pub fn load_config(path: &Path) -> Result<VersioningConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_str(&content)?)
}

/// Returns the path to the data directory for gateway-version.
/// Uses $XDG_DATA_HOME/gateway-version if XDG_DATA_HOME is set,
/// otherwise falls back to ~/.local/share/gateway-version,
/// or ./gateway-version if neither is available.
pub fn data_dir() -> PathBuf {
    data_dir_with_env(std::env::var("XDG_DATA_HOME").ok(), dirs::home_dir())
}

/// Returns the directory for rotated log files.
pub fn log_path() -> PathBuf {
    data_dir().join("logs")
}

fn data_dir_with_env(xdg_data_home: Option<String>, home_dir: Option<PathBuf>) -> PathBuf {
    let data_dir = xdg_data_home
        .map(PathBuf::from)
        .or_else(|| home_dir.map(|home| home.join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("."));

    data_dir.join(APP_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::semver::parse_version;
    use serde_json::json;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn versioning_config_from_partial_object_uses_defaults_for_missing_fields() {
        let result = serde_json::from_value::<VersioningConfig>(json!({
            "detector": {
                "defaultVersion": "v2.0.0"
            }
        }))
        .unwrap();

        assert_eq!(result.detector.default_version, parse_version("v2.0.0"));
        assert_eq!(result.detector.methods, DetectionMethod::ALL.to_vec());
        assert_eq!(result.detector.query_param_name, DEFAULT_QUERY_PARAM_NAME);
        assert!(result.migrations.is_empty());
        assert_eq!(result.logging, LoggingConfig::default());
    }

    #[test]
    fn versioning_config_from_full_object_parses_all_fields() {
        let result = serde_json::from_value::<VersioningConfig>(json!({
            "detector": {
                "defaultVersion": "v1.1.0",
                "methods": ["query_parameter", "url_path"],
                "acceptHeaderPrefix": "application/x-acme-v",
                "queryParamName": "api",
                "contextKey": "tenant_version"
            },
            "migrations": [{
                "component": "users",
                "from": "v1.0.0",
                "to": "v2.0.0",
                "fieldMappings": [
                    { "fromField": "name", "toField": "display_name", "required": true }
                ],
                "reversible": true
            }],
            "logging": {
                "level": "debug",
                "json": true,
                "directory": "/var/log/gateway"
            }
        }))
        .unwrap();

        assert_eq!(
            result.detector,
            DetectorConfig {
                default_version: parse_version("v1.1.0"),
                methods: vec![DetectionMethod::QueryParameter, DetectionMethod::UrlPath],
                accept_header_prefix: "application/x-acme-v".to_string(),
                query_param_name: "api".to_string(),
                context_key: "tenant_version".to_string(),
            }
        );
        assert_eq!(result.migrations.len(), 1);
        assert_eq!(result.migrations[0].strategy, MigrationStrategy::Automatic);
        assert_eq!(result.migrations[0].field_mappings[0].to_field, "display_name");
        assert!(result.migrations[0].reversible);
        assert_eq!(
            result.logging,
            LoggingConfig {
                level: "debug".to_string(),
                json: true,
                file: false,
                directory: Some(PathBuf::from("/var/log/gateway")),
            }
        );
    }

    #[test]
    fn detector_methods_round_trip() {
        let config = DetectorConfig {
            methods: vec![DetectionMethod::ContextValue, DetectionMethod::AcceptHeader],
            ..Default::default()
        };

        let value = serde_json::to_value(&config).unwrap();
        let back: DetectorConfig = serde_json::from_value(value).unwrap();

        assert_eq!(back, config);
    }

    #[test]
    fn load_config_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"detector": {{"queryParamName": "v"}}}}"#).unwrap();

        let config = load_config(file.path()).unwrap();

        assert_eq!(config.detector.query_param_name, "v");
    }

    #[test]
    fn load_config_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.json");

        let err = load_config(&path).unwrap_err();

        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn load_config_reports_invalid_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();

        let err = load_config(file.path()).unwrap_err();

        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn data_dir_with_env_uses_xdg_data_home_when_set() {
        let path = data_dir_with_env(
            Some("/tmp/test-data".to_string()),
            Some(PathBuf::from("/home/user")),
        );

        assert_eq!(path, PathBuf::from("/tmp/test-data/gateway-version"));
    }

    #[test]
    fn data_dir_with_env_falls_back_to_home_local_share() {
        let path = data_dir_with_env(None, Some(PathBuf::from("/home/user")));

        assert_eq!(path, PathBuf::from("/home/user/.local/share/gateway-version"));
    }

    #[test]
    fn data_dir_with_env_falls_back_to_current_dir_when_no_dirs_available() {
        let path = data_dir_with_env(None, None);
        assert_eq!(path, PathBuf::from("./gateway-version"));
    }

    #[test]
    #[serial]
    fn log_path_follows_xdg_data_home() {
        let previous = std::env::var("XDG_DATA_HOME").ok();
        // SAFETY: serialized with other environment-dependent tests
        unsafe { std::env::set_var("XDG_DATA_HOME", "/tmp/xdg") };

        let path = log_path();

        match previous {
            Some(value) => unsafe { std::env::set_var("XDG_DATA_HOME", value) },
            None => unsafe { std::env::remove_var("XDG_DATA_HOME") },
        }
        assert_eq!(path, PathBuf::from("/tmp/xdg/gateway-version/logs"));
    }

    #[test]
    #[serial]
    fn file_logging_without_directory_uses_log_path() {
        let previous = std::env::var("XDG_DATA_HOME").ok();
        // SAFETY: serialized with other environment-dependent tests
        unsafe { std::env::set_var("XDG_DATA_HOME", "/tmp/xdg") };

        let file_only = serde_json::from_value::<LoggingConfig>(json!({ "file": true })).unwrap();
        let explicit = LoggingConfig {
            file: true,
            directory: Some(PathBuf::from("/var/log/gateway")),
            ..Default::default()
        };
        let stderr_only = LoggingConfig::default();

        let file_dir = file_only.log_directory();
        match previous {
            Some(value) => unsafe { std::env::set_var("XDG_DATA_HOME", value) },
            None => unsafe { std::env::remove_var("XDG_DATA_HOME") },
        }

        assert_eq!(file_dir, Some(PathBuf::from("/tmp/xdg/gateway-version/logs")));
        assert_eq!(explicit.log_directory(), Some(PathBuf::from("/var/log/gateway")));
        assert_eq!(stderr_only.log_directory(), None);
    }
}
