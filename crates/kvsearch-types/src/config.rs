//! Configuration loading for kvsearch.
//!
//! Layered config: defaults -> config file -> env vars -> CLI flags.
//! The default config file lives at ~/.config/kvsearch/config.toml.

use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::KvSearchError;

/// Connection parameters for the etcd cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EtcdSettings {
    /// Cluster endpoints (host:port)
    #[serde(default = "default_etcd_endpoints")]
    pub endpoints: Vec<String>,

    #[serde(default)]
    pub username: Option<String>,

    /// Loaded from env var, not stored in config file
    #[serde(default)]
    pub password: Option<String>,

    /// Connection timeout in seconds
    #[serde(default = "default_dial_timeout")]
    pub dial_timeout_secs: u64,

    /// Keys fetched per page during a prefix snapshot
    #[serde(default = "default_page_size")]
    pub page_size: i64,
}

fn default_etcd_endpoints() -> Vec<String> {
    vec!["localhost:2379".to_string(), "localhost:2380".to_string()]
}

fn default_dial_timeout() -> u64 {
    20
}

fn default_page_size() -> i64 {
    500
}

impl Default for EtcdSettings {
    fn default() -> Self {
        Self {
            endpoints: default_etcd_endpoints(),
            username: None,
            password: None,
            dial_timeout_secs: default_dial_timeout(),
            page_size: default_page_size(),
        }
    }
}

/// Search index and query settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSettings {
    /// Results returned when a request does not set a limit
    #[serde(default = "default_limit")]
    pub default_limit: usize,

    /// Upper bound on requested limits
    #[serde(default = "default_max_limit")]
    pub max_limit: usize,

    /// Match terms within edit distance 1
    #[serde(default)]
    pub fuzzy: bool,

    /// Memory budget for the index writer in MB
    #[serde(default = "default_writer_memory_mb")]
    pub writer_memory_mb: usize,
}

fn default_limit() -> usize {
    20
}

fn default_max_limit() -> usize {
    1000
}

fn default_writer_memory_mb() -> usize {
    50
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            max_limit: default_max_limit(),
            fuzzy: false,
            writer_memory_mb: default_writer_memory_mb(),
        }
    }
}

/// Watcher retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherSettings {
    #[serde(default = "default_backoff_initial_ms")]
    pub backoff_initial_ms: u64,

    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
}

fn default_backoff_initial_ms() -> u64 {
    500
}

fn default_backoff_max_ms() -> u64 {
    30_000
}

impl Default for WatcherSettings {
    fn default() -> Self {
        Self {
            backoff_initial_ms: default_backoff_initial_ms(),
            backoff_max_ms: default_backoff_max_ms(),
        }
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Key prefix mirrored into the index
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Seconds between reconciliation scans
    #[serde(default = "default_scan_interval")]
    pub scan_interval_secs: u64,

    /// Maximum random delay added before each scan
    #[serde(default)]
    pub scan_jitter_secs: u64,

    /// gRPC server port
    #[serde(default = "default_grpc_port")]
    pub grpc_port: u16,

    /// gRPC server host
    #[serde(default = "default_grpc_host")]
    pub grpc_host: String,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub etcd: EtcdSettings,

    #[serde(default)]
    pub search: SearchSettings,

    #[serde(default)]
    pub watcher: WatcherSettings,
}

fn default_key_prefix() -> String {
    "test".to_string()
}

fn default_scan_interval() -> u64 {
    60
}

fn default_grpc_port() -> u16 {
    50051
}

fn default_grpc_host() -> String {
    "0.0.0.0".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            key_prefix: default_key_prefix(),
            scan_interval_secs: default_scan_interval(),
            scan_jitter_secs: 0,
            grpc_port: default_grpc_port(),
            grpc_host: default_grpc_host(),
            log_level: default_log_level(),
            etcd: EtcdSettings::default(),
            search: SearchSettings::default(),
            watcher: WatcherSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (~/.config/kvsearch/config.toml)
    /// 3. CLI-specified config file (optional)
    /// 4. Environment variables (KVSEARCH_*, `__` for nesting)
    ///
    /// CLI flags should be applied by the caller after this returns.
    pub fn load(cli_config_path: Option<&str>) -> Result<Self, KvSearchError> {
        let config_dir = ProjectDirs::from("", "", "kvsearch")
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let default_config_path = config_dir.join("config");

        let mut builder = Config::builder()
            .set_default("key_prefix", default_key_prefix())
            .map_err(|e| KvSearchError::Config(e.to_string()))?
            .set_default("scan_interval_secs", default_scan_interval() as i64)
            .map_err(|e| KvSearchError::Config(e.to_string()))?
            .set_default("grpc_port", default_grpc_port() as i64)
            .map_err(|e| KvSearchError::Config(e.to_string()))?
            .set_default("grpc_host", default_grpc_host())
            .map_err(|e| KvSearchError::Config(e.to_string()))?
            .set_default("log_level", default_log_level())
            .map_err(|e| KvSearchError::Config(e.to_string()))?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = cli_config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // KVSEARCH_KEY_PREFIX, KVSEARCH_ETCD__ENDPOINTS=a:2379,b:2379, ...
        builder = builder.add_source(
            Environment::with_prefix("KVSEARCH")
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("etcd.endpoints")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| KvSearchError::Config(e.to_string()))?;

        let settings: Settings = config
            .try_deserialize()
            .map_err(|e| KvSearchError::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), KvSearchError> {
        if self.key_prefix.is_empty() {
            return Err(KvSearchError::Config("key_prefix must not be empty".into()));
        }
        if self.scan_interval_secs == 0 {
            return Err(KvSearchError::Config("scan_interval_secs must be > 0".into()));
        }
        if self.etcd.endpoints.is_empty() {
            return Err(KvSearchError::Config("etcd.endpoints must not be empty".into()));
        }
        if self.etcd.page_size <= 0 {
            return Err(KvSearchError::Config("etcd.page_size must be > 0".into()));
        }
        if self.search.default_limit == 0 || self.search.max_limit < self.search.default_limit {
            return Err(KvSearchError::Config(
                "search limits must satisfy 0 < default_limit <= max_limit".into(),
            ));
        }
        Ok(())
    }

    /// Get the socket address for the gRPC server
    pub fn grpc_addr(&self) -> String {
        format!("{}:{}", self.grpc_host, self.grpc_port)
    }
}
