//! sqlgate: lifecycle management for audited SQL change tasks
//!
//! A task is a batch of SQL statements submitted against one database
//! instance and schema. sqlgate splits it into statement records, then
//! drives three actions on it:
//!
//! - **inspect**: rate every statement with the inspector and record the
//!   task's normal rate and SQL type
//! - **commit**: execute the statements in order, stopping at the first
//!   failure and keeping a compensating statement for each success
//! - **rollback**: execute the compensations newest-first
//!
//! The crates of the workspace are re-exported here. The helpers below wire
//! them together from an [`AppConfig`](config::AppConfig).

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::info;

pub use sqlgate_config as config;
pub use sqlgate_metrics as metrics;
pub use sqlgate_orchestrator as orchestrator;
pub use sqlgate_store as store;
pub use sqlgate_types as types;

use sqlgate_config::{
    validate_config, AppConfig, ConfigError, ServiceConfig, StorageBackend, StorageConfig,
};
use sqlgate_metrics::{MetricsCollector, TracingError};
use sqlgate_orchestrator::{
    CoordinatorConfig, LifecycleCoordinator, RetentionPolicy, RetentionSweeper,
};
use sqlgate_store::{InMemoryStore, SqliteStore, StoreError, TaskStore};

/// Open the store selected by `storage`
pub async fn open_store(storage: &StorageConfig) -> Result<Arc<dyn TaskStore>, StoreError> {
    match storage.backend {
        StorageBackend::Memory => {
            info!("Using in-memory task store");
            Ok(Arc::new(InMemoryStore::new()))
        }
        StorageBackend::Sqlite => {
            info!(path = %storage.sqlite_path, "Opening sqlite task store");
            Ok(Arc::new(SqliteStore::new(&storage.sqlite_path).await?))
        }
    }
}

/// Coordinator settings from a validated `config`
pub fn coordinator_config(config: &AppConfig) -> Result<CoordinatorConfig, ConfigError> {
    validate_config(config)?;
    Ok(CoordinatorConfig::default()
        .with_inspect_concurrency(config.coordinator.inspect_concurrency))
}

/// Retention policy from a validated `config`
pub fn retention_policy(config: &AppConfig) -> Result<RetentionPolicy, ConfigError> {
    validate_config(config)?;
    Ok(RetentionPolicy {
        purge_after: Duration::from_secs(config.retention.purge_after_secs),
        batch_size: config.retention.batch_size,
    })
}

/// Install the global tracing subscriber. `RUST_LOG` takes precedence over the configured level.
pub fn init_logging(service: &ServiceConfig) -> Result<(), TracingError> {
    sqlgate_metrics::init_tracing(&service.log_level, service.log_format.is_json())
}

/// Start the background retention sweeper, unless retention is disabled
pub fn spawn_retention(
    coordinator: Arc<LifecycleCoordinator>,
    metrics: Arc<MetricsCollector>,
    config: &AppConfig,
) -> Result<Option<JoinHandle<()>>, ConfigError> {
    let policy = retention_policy(config)?;
    if !config.retention.enabled {
        return Ok(None);
    }

    let interval = Duration::from_secs(config.retention.sweep_interval_secs);
    let sweeper = Arc::new(RetentionSweeper::new(coordinator, metrics, policy));
    info!(
        interval_secs = config.retention.sweep_interval_secs,
        purge_after_secs = config.retention.purge_after_secs,
        "Retention sweeper started"
    );

    Ok(Some(sweeper.spawn(interval)))
}
