//! Core configuration structures for sqlgate

use serde::{Deserialize, Serialize};

/// Main application configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Service identity and logging
    #[serde(default)]
    pub service: ServiceConfig,

    /// Task persistence backend
    #[serde(default)]
    pub storage: StorageConfig,

    /// Lifecycle coordinator tuning
    #[serde(default)]
    pub coordinator: CoordinatorConfig,

    /// Purging of soft-deleted tasks
    #[serde(default)]
    pub retention: RetentionConfig,
}

impl AppConfig {
    /// Defaults for a developer machine: in-memory store, verbose logs
    pub fn local() -> Self {
        Self {
            service: ServiceConfig {
                environment: Environment::Local,
                log_level: "debug".to_string(),
                log_format: LogFormat::Pretty,
            },
            storage: StorageConfig {
                backend: StorageBackend::Memory,
                sqlite_path: default_sqlite_path(),
            },
            coordinator: CoordinatorConfig::default(),
            retention: RetentionConfig {
                enabled: false,
                ..RetentionConfig::default()
            },
        }
    }

    /// Defaults for production: sqlite store, JSON logs, retention on
    pub fn production() -> Self {
        Self {
            service: ServiceConfig {
                environment: Environment::Production,
                log_level: "info".to_string(),
                log_format: LogFormat::Json,
            },
            storage: StorageConfig {
                backend: StorageBackend::Sqlite,
                sqlite_path: "/var/lib/sqlgate/sqlgate.db".to_string(),
            },
            coordinator: CoordinatorConfig::default(),
            retention: RetentionConfig::default(),
        }
    }
}

/// Service configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Environment type (production, staging, local)
    #[serde(default = "default_environment")]
    pub environment: Environment,

    /// Log level or filter directive (e.g. `info`, `sqlgate=debug`)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_format: LogFormat,
}

/// Environment types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Production,
    Staging,
    Local,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl LogFormat {
    pub fn is_json(&self) -> bool {
        matches!(self, LogFormat::Json)
    }
}

/// Storage configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    /// Database file, used by the sqlite backend; created if missing
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Sqlite,
}

/// Coordinator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Statements inspected concurrently within one inspect pass
    #[serde(default = "default_inspect_concurrency")]
    pub inspect_concurrency: usize,
}

/// Retention configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Run the background sweeper
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Age after soft delete at which a task is purged
    #[serde(default = "default_purge_after_secs")]
    pub purge_after_secs: u64,

    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Maximum tasks purged per sweep
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

// Default value functions
fn default_environment() -> Environment {
    Environment::Local
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_sqlite_path() -> String {
    "sqlgate.db".to_string()
}

fn default_inspect_concurrency() -> usize {
    8
}

fn default_purge_after_secs() -> u64 {
    30 * 24 * 3600 // 30 days
}

fn default_sweep_interval_secs() -> u64 {
    3600
}

fn default_batch_size() -> usize {
    100
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            log_level: default_log_level(),
            log_format: LogFormat::default(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            sqlite_path: default_sqlite_path(),
        }
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            inspect_concurrency: default_inspect_concurrency(),
        }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            purge_after_secs: default_purge_after_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            batch_size: default_batch_size(),
        }
    }
}
