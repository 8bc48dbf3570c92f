//! Configuration loading for fieldsync-server.
//!
//! Configuration is loaded from a TOML file (default: `fieldsync.toml`).
//! Every field has a default, so an empty section (or a missing file, via
//! [`Config::default`]) is a valid configuration.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration for fieldsync-server.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Sync engine configuration.
    #[serde(default)]
    pub sync: SyncConfig,
    /// Identity matching configuration.
    #[serde(default)]
    pub matching: MatchingConfig,
    /// Rate limiting configuration.
    #[serde(default)]
    pub limits: LimitsConfig,
    /// HTTP endpoints configuration.
    #[serde(default)]
    pub http: HttpConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address for the HTTP API (default: 0.0.0.0:8080).
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

/// Storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to SQLite database file.
    #[serde(default = "default_database_path")]
    pub database: PathBuf,
}

/// Sync engine configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Largest page a device may ask for (default: 1000).
    /// Larger requested limits are clamped; the response still echoes the request.
    #[serde(default = "default_max_limit")]
    pub max_limit: usize,
    /// Location table refresh interval in seconds (default: 300, 0 disables).
    #[serde(default = "default_location_refresh_secs")]
    pub location_refresh_secs: u64,
}

/// Identity matching configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MatchingConfig {
    /// Restrict biometric search to identities found by phone / external id.
    #[serde(default)]
    pub mfa_enabled: bool,
    /// Only match identities registered in the requesting country.
    #[serde(default)]
    pub country_isolation: bool,
    /// Base URL of the biometric matching service (optional).
    /// Without it the biometric path always degrades to an empty result.
    pub oracle_url: Option<String>,
    /// Timeout for one matching-service call in milliseconds (default: 5000).
    #[serde(default = "default_oracle_timeout_ms")]
    pub oracle_timeout_ms: u64,
}

impl MatchingConfig {
    /// The matching-service timeout as a Duration.
    pub fn oracle_timeout(&self) -> Duration {
        Duration::from_millis(self.oracle_timeout_ms)
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Maximum sync / match requests per device per minute (default: 120).
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
    /// Maximum requests per second across all devices (default: 500).
    #[serde(default = "default_global_requests_per_second")]
    pub global_requests_per_second: u32,
}

/// HTTP endpoints configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Enable metrics endpoint (default: true).
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

// Default value functions
fn default_bind_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_database_path() -> PathBuf {
    PathBuf::from("fieldsync.db")
}

fn default_max_limit() -> usize {
    1000
}

fn default_location_refresh_secs() -> u64 {
    300 // 5 minutes
}

fn default_oracle_timeout_ms() -> u64 {
    5000
}

fn default_requests_per_minute() -> u32 {
    120
}

fn default_global_requests_per_second() -> u32 {
    500
}

fn default_metrics_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: default_database_path(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_limit: default_max_limit(),
            location_refresh_secs: default_location_refresh_secs(),
        }
    }
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            mfa_enabled: false,
            country_isolation: false,
            oracle_url: None,
            oracle_timeout_ms: default_oracle_timeout_ms(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: default_requests_per_minute(),
            global_requests_per_second: default_global_requests_per_second(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: default_metrics_enabled(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert_eq!(config.server.bind_address, "0.0.0.0:8080");
        assert_eq!(config.sync.max_limit, 1000);
        assert!(!config.matching.mfa_enabled);
        assert!(config.matching.oracle_url.is_none());
        assert_eq!(config.matching.oracle_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn config_from_toml_string() {
        let toml = r#"
[server]
bind_address = "127.0.0.1:5000"

[storage]
database = "/data/fieldsync.db"

[sync]
max_limit = 200
location_refresh_secs = 60

[matching]
mfa_enabled = true
country_isolation = true
oracle_url = "http://matcher:8090"
oracle_timeout_ms = 1500

[limits]
requests_per_minute = 30
"#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.bind_address, "127.0.0.1:5000");
        assert_eq!(config.storage.database, PathBuf::from("/data/fieldsync.db"));
        assert_eq!(config.sync.max_limit, 200);
        assert_eq!(config.sync.location_refresh_secs, 60);
        assert!(config.matching.mfa_enabled);
        assert!(config.matching.country_isolation);
        assert_eq!(config.matching.oracle_url.as_deref(), Some("http://matcher:8090"));
        assert_eq!(config.matching.oracle_timeout_ms, 1500);
        assert_eq!(config.limits.requests_per_minute, 30);
        assert_eq!(config.limits.global_requests_per_second, 500);
    }

    #[test]
    fn config_missing_sections_use_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.sync.location_refresh_secs, 300);
        assert!(config.http.metrics_enabled);
        assert_eq!(config.storage.database, PathBuf::from("fieldsync.db"));
    }

    #[test]
    fn config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[matching]\nmfa_enabled = true").unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert!(config.matching.mfa_enabled);
    }

    #[test]
    fn config_from_missing_file_fails() {
        let err = Config::from_file(std::path::Path::new("/nonexistent/fieldsync.toml"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::ReadError { .. }));
    }
}
