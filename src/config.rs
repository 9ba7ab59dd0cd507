//! Configuration loading and types for keepfs.
//!
//! Configuration is read from a YAML file and deserialized into the
//! [`Config`] struct. Every section and field has a default, so an empty
//! file is a valid (if not very useful) configuration.

use serde::Deserialize;
use std::path::Path;

use crate::auth::Account;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Accounts file and anonymous access.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Served directory and upload limits.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Digest header behaviour.
    #[serde(default)]
    pub digest: DigestConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind host address.
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Graceful shutdown timeout in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout: u64,

    /// Per-request timeout in seconds (0 disables it).
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            shutdown_timeout: default_shutdown_timeout(),
            request_timeout: default_request_timeout(),
        }
    }
}

/// Authentication settings.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Path to the JSON accounts file. Keep it outside the data directory.
    #[serde(default = "default_accounts_file")]
    pub accounts_file: String,

    /// Reload the accounts file when it changes on disk.
    #[serde(default = "default_true")]
    pub watch: bool,

    /// How often the accounts file is checked for changes, in milliseconds.
    #[serde(default = "default_watch_interval_ms")]
    pub watch_interval_ms: u64,

    /// Permissions granted to requests without valid credentials.
    #[serde(default)]
    pub anonymous: AnonymousConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            accounts_file: default_accounts_file(),
            watch: true,
            watch_interval_ms: default_watch_interval_ms(),
            anonymous: AnonymousConfig::default(),
        }
    }
}

/// The anonymous account. Empty lists (the default) grant nothing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnonymousConfig {
    #[serde(default)]
    pub readable: Vec<String>,

    #[serde(default)]
    pub writeable: Vec<String>,
}

impl AnonymousConfig {
    /// Build the default account used for unauthenticated requests.
    pub fn account(&self) -> Account {
        Account::anonymous(self.readable.clone(), self.writeable.clone())
    }
}

/// What to do with request bodies larger than `max_body_size`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyLimitPolicy {
    /// Stream up to the limit, then fail the upload.
    #[default]
    Truncate,
    /// Refuse requests whose `Content-Length` exceeds the limit with 413.
    Reject,
}

/// Served directory configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Root directory files are served from and uploaded to.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Maximum request body size in bytes (default 1 GiB).
    #[serde(default = "default_max_body_size")]
    pub max_body_size: u64,

    /// Oversized body handling.
    #[serde(default)]
    pub body_limit: BodyLimitPolicy,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            max_body_size: default_max_body_size(),
            body_limit: BodyLimitPolicy::default(),
        }
    }
}

/// Digest header configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DigestConfig {
    /// Always send a `Digest` header, falling back to MD5 when the client
    /// requested nothing we support.
    #[serde(default)]
    pub always: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: text or json.
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// -- Defaults ----------------------------------------------------------------

fn default_true() -> bool {
    true
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_request_timeout() -> u64 {
    70
}

fn default_accounts_file() -> String {
    "./accounts.json".to_string()
}

fn default_watch_interval_ms() -> u64 {
    1000
}

fn default_data_dir() -> String {
    "./data".to_string()
}

fn default_max_body_size() -> u64 {
    1 << 30 // 1 GiB
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

// -- Loader ------------------------------------------------------------------

/// Load and parse configuration from a YAML file at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    let config: Config = serde_yaml::from_str(&contents)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.storage.max_body_size, 1 << 30);
        assert_eq!(config.storage.body_limit, BodyLimitPolicy::Truncate);
        assert!(config.auth.watch);
        assert!(!config.digest.always);
        assert!(!config.auth.anonymous.account().can_read("/"));
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
server:
  port: 9000
auth:
  accounts_file: /etc/keepfs/accounts.json
  watch: false
  anonymous:
    readable: ["/public"]
storage:
  data_dir: /srv/files
  max_body_size: 1024
  body_limit: reject
digest:
  always: true
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.auth.accounts_file, "/etc/keepfs/accounts.json");
        assert!(!config.auth.watch);
        assert_eq!(config.auth.watch_interval_ms, 1000);
        assert!(config.auth.anonymous.account().can_read("/public/a.txt"));
        assert_eq!(config.storage.data_dir, "/srv/files");
        assert_eq!(config.storage.max_body_size, 1024);
        assert_eq!(config.storage.body_limit, BodyLimitPolicy::Reject);
        assert!(config.digest.always);
        assert_eq!(config.logging.format, "text");
    }

    #[test]
    fn test_empty_yaml_is_default() {
        let config: Config = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.storage.data_dir, "./data");
    }
}
