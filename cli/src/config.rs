//! Configuration file management
//!
//! `CLIConfiguration` with TOML parsing for `~/.venered/config.toml`.
//!
//! # Configuration Format
//!
//! ```toml
//! [server]
//! url = "https://project.supabase.co"  # Project URL
//! api_key = "anon-key"                 # Public project key
//! timeout = 30                         # Request timeout in seconds
//! max_retries = 3
//!
//! [connection]
//! auto_reconnect = true          # Auto-reconnect on connection loss
//! reconnect_delay_ms = 100       # Initial reconnect delay
//! max_reconnect_delay_ms = 30000 # Maximum reconnect delay
//! max_reconnect_attempts = 10    # Max reconnect attempts (0 = unlimited)
//!
//! [auth]
//! email = "me@example.com"
//! password = "secret"
//!
//! [upload]
//! imgbb_key = "key"
//!
//! [logging]
//! level = "warn"
//! ```
//!
//! Environment variables `VENERED_URL`, `VENERED_API_KEY`, `VENERED_EMAIL`,
//! `VENERED_PASSWORD` and `VENERED_IMGBB_KEY` override the file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use venered_link::{ConnectionOptions, DEFAULT_UPLOAD_ENDPOINT};

use crate::error::{CLIError, Result};

pub const DEFAULT_CONFIG_PATH: &str = "~/.venered/config.toml";

/// CLI configuration loaded from TOML file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CLIConfiguration {
    /// Server connection settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Connection/reconnection settings
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Sign-in settings
    #[serde(default)]
    pub auth: AuthConfig,

    /// Image host settings
    #[serde(default)]
    pub upload: UploadConfig,

    /// Log output settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Project URL (e.g., https://project.supabase.co)
    pub url: Option<String>,

    /// Public project key
    pub api_key: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Maximum retry attempts
    #[serde(default = "default_retries")]
    pub max_retries: u32,
}

/// Connection settings for reconnection behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default = "default_auto_reconnect")]
    pub auto_reconnect: bool,

    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    #[serde(default = "default_max_reconnect_delay_ms")]
    pub max_reconnect_delay_ms: u64,

    /// 0 = unlimited
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Image host API key; uploads are refused without it
    pub imgbb_key: Option<String>,

    #[serde(default = "default_upload_endpoint")]
    pub endpoint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when neither `--log-level` nor `RUST_LOG` is set
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_timeout() -> u64 {
    30
}

fn default_retries() -> u32 {
    3
}

fn default_auto_reconnect() -> bool {
    true
}

fn default_reconnect_delay_ms() -> u64 {
    100
}

fn default_max_reconnect_delay_ms() -> u64 {
    30000
}

fn default_max_reconnect_attempts() -> u32 {
    10
}

fn default_upload_endpoint() -> String {
    DEFAULT_UPLOAD_ENDPOINT.to_string()
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            timeout: default_timeout(),
            max_retries: default_retries(),
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            auto_reconnect: default_auto_reconnect(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            max_reconnect_delay_ms: default_max_reconnect_delay_ms(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            imgbb_key: None,
            endpoint: default_upload_endpoint(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

pub fn expand_config_path(path: &Path) -> PathBuf {
    let path_str = path.to_str().unwrap_or(DEFAULT_CONFIG_PATH);
    if let Some(rest) = path_str.strip_prefix("~/") {
        if let Some(home_dir) = dirs::home_dir() {
            return home_dir.join(rest);
        }
    }
    path.to_path_buf()
}

pub fn default_config_path() -> PathBuf {
    expand_config_path(Path::new(DEFAULT_CONFIG_PATH))
}

impl CLIConfiguration {
    /// Load configuration from file, then apply environment overrides.
    ///
    /// Returns default configuration if file doesn't exist.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = Self::load_file(path)?;
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Load only the file, without environment overrides.
    pub fn load_file(path: &Path) -> Result<Self> {
        let expanded_path = expand_config_path(path);
        let path = &expanded_path;

        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path).map_err(|e| {
            CLIError::ConfigurationError(format!("Failed to read config file: {}", e))
        })?;

        let config: CLIConfiguration = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let expanded_path = expand_config_path(path);
        let path = &expanded_path;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| CLIError::ConfigurationError(format!("Failed to serialize: {}", e)))?;

        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Overlay `VENERED_*` variables read through `lookup`. Empty values are
    /// ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(url) = get("VENERED_URL") {
            self.server.url = Some(url);
        }
        if let Some(key) = get("VENERED_API_KEY") {
            self.server.api_key = Some(key);
        }
        if let Some(email) = get("VENERED_EMAIL") {
            self.auth.email = Some(email);
        }
        if let Some(password) = get("VENERED_PASSWORD") {
            self.auth.password = Some(password);
        }
        if let Some(key) = get("VENERED_IMGBB_KEY") {
            self.upload.imgbb_key = Some(key);
        }
    }

    /// Build `ConnectionOptions` from the `[connection]` section.
    pub fn to_connection_options(&self) -> ConnectionOptions {
        let conn = &self.connection;
        let max_attempts = if conn.max_reconnect_attempts == 0 {
            None
        } else {
            Some(conn.max_reconnect_attempts)
        };

        ConnectionOptions::default()
            .with_auto_reconnect(conn.auto_reconnect)
            .with_reconnect_delay_ms(conn.reconnect_delay_ms)
            .with_max_reconnect_delay_ms(conn.max_reconnect_delay_ms)
            .with_max_reconnect_attempts(max_attempts)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_default_config() {
        let config = CLIConfiguration::default();
        assert!(config.server.url.is_none());
        assert_eq!(config.server.timeout, 30);
        assert_eq!(config.server.max_retries, 3);
        assert_eq!(config.upload.endpoint, DEFAULT_UPLOAD_ENDPOINT);
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: CLIConfiguration = toml::from_str(
            r#"
            [server]
            url = "https://demo.supabase.co"

            [connection]
            max_reconnect_attempts = 0
            "#,
        )
        .unwrap();
        assert_eq!(config.server.url.as_deref(), Some("https://demo.supabase.co"));
        assert_eq!(config.server.timeout, 30);
        assert!(config.connection.auto_reconnect);
        assert!(config.auth.email.is_none());
        assert_eq!(config.to_connection_options().max_reconnect_attempts, None);
    }

    #[test]
    fn test_to_connection_options() {
        let options = CLIConfiguration::default().to_connection_options();
        assert!(options.auto_reconnect);
        assert_eq!(options.reconnect_delay_ms, 100);
        assert_eq!(options.max_reconnect_delay_ms, 30000);
        assert_eq!(options.max_reconnect_attempts, Some(10));
    }

    #[test]
    fn test_env_overrides_file() {
        let mut config = CLIConfiguration::default();
        config.server.url = Some("https://file.example".into());
        config.auth.email = Some("file@example.com".into());

        let env: HashMap<&str, &str> = [
            ("VENERED_URL", "https://env.example"),
            ("VENERED_API_KEY", "anon"),
            ("VENERED_EMAIL", "  "),
            ("VENERED_IMGBB_KEY", "img"),
        ]
        .into_iter()
        .collect();
        config.apply_env(|name| env.get(name).map(|v| v.to_string()));

        assert_eq!(config.server.url.as_deref(), Some("https://env.example"));
        assert_eq!(config.server.api_key.as_deref(), Some("anon"));
        assert_eq!(config.auth.email.as_deref(), Some("file@example.com"));
        assert!(config.auth.password.is_none());
        assert_eq!(config.upload.imgbb_key.as_deref(), Some("img"));
    }

    #[test]
    fn test_missing_file_is_default_and_save_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let loaded = CLIConfiguration::load_file(&path).unwrap();
        assert!(loaded.server.url.is_none());

        let mut config = CLIConfiguration::default();
        config.server.url = Some("https://demo.supabase.co".into());
        config.logging.level = "debug".into();
        config.save(&path).unwrap();

        let reloaded = CLIConfiguration::load_file(&path).unwrap();
        assert_eq!(reloaded.server.url.as_deref(), Some("https://demo.supabase.co"));
        assert_eq!(reloaded.logging.level, "debug");
    }

    #[test]
    fn test_expand_config_path() {
        let plain = expand_config_path(Path::new("/etc/venered.toml"));
        assert_eq!(plain, PathBuf::from("/etc/venered.toml"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(default_config_path(), home.join(".venered/config.toml"));
        }
    }
}
