//! Configuration validation

use crate::{AppConfig, ConfigError, Result, StorageBackend};

/// Validation error details
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate the entire application configuration, reporting every invalid field
pub fn validate_config(config: &AppConfig) -> Result<()> {
    let errors = collect_errors(config);

    if !errors.is_empty() {
        let error_msg = errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        return Err(ConfigError::ValidationError(error_msg));
    }

    Ok(())
}

/// Every validation failure in `config`, in field order
pub fn collect_errors(config: &AppConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    // Service
    if let Err(e) = validate_log_level(&config.service.log_level) {
        errors.push(e);
    }

    // Storage
    if config.storage.backend == StorageBackend::Sqlite
        && config.storage.sqlite_path.trim().is_empty()
    {
        errors.push(ValidationError::new(
            "storage.sqlite_path",
            "sqlite backend requires a database path",
        ));
    }

    // Coordinator
    if config.coordinator.inspect_concurrency == 0 {
        errors.push(ValidationError::new(
            "coordinator.inspect_concurrency",
            "must be greater than 0",
        ));
    }

    // Retention; only checked when the sweeper will run
    if config.retention.enabled {
        if config.retention.purge_after_secs == 0 {
            errors.push(ValidationError::new(
                "retention.purge_after_secs",
                "must be greater than 0",
            ));
        }

        if config.retention.sweep_interval_secs == 0 {
            errors.push(ValidationError::new(
                "retention.sweep_interval_secs",
                "must be greater than 0",
            ));
        }

        if config.retention.batch_size == 0 {
            errors.push(ValidationError::new(
                "retention.batch_size",
                "must be greater than 0",
            ));
        }
    }

    errors
}

/// Accepts a bare level or a comma-separated list of `target=level` directives
pub fn validate_log_level(level: &str) -> std::result::Result<(), ValidationError> {
    const LEVELS: [&str; 6] = ["trace", "debug", "info", "warn", "error", "off"];

    if level.trim().is_empty() {
        return Err(ValidationError::new("service.log_level", "log level is required"));
    }

    for directive in level.split(',') {
        let lvl = directive
            .rsplit_once('=')
            .map_or(directive, |(_, lvl)| lvl)
            .trim()
            .to_lowercase();
        if !LEVELS.contains(&lvl.as_str()) {
            return Err(ValidationError::new(
                "service.log_level",
                format!("invalid log level '{lvl}', must be one of: {}", LEVELS.join(", ")),
            ));
        }
    }

    Ok(())
}
