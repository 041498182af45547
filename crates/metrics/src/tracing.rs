use sqlgate_types::{TaskAction, TaskId};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `level` when set. `json` selects the
/// machine-readable formatter; otherwise events are pretty-printed.
pub fn init_tracing(level: &str, json: bool) -> Result<(), TracingError> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| TracingError::InvalidFilter(e.to_string()))?;

    let registry = tracing_subscriber::registry().with(env_filter);

    let result = if json {
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_level(true)
                    .json(),
            )
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(true).pretty())
            .try_init()
    };

    result.map_err(|e| TracingError::InitError(e.to_string()))
}

/// Correlation ID for tracking one action across components
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CorrelationId(uuid::Uuid);

impl CorrelationId {
    /// Generate a new correlation ID
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Get the correlation ID as a string
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Span context for one action on one task
#[derive(Debug, Clone)]
pub struct TaskSpan {
    pub correlation_id: CorrelationId,
    pub task_id: TaskId,
    pub action: &'static str,
}

impl TaskSpan {
    pub fn new(task_id: TaskId, action: TaskAction) -> Self {
        Self::named(task_id, action.as_str())
    }

    /// Span for an administrative operation that is not a [`TaskAction`]
    pub fn named(task_id: TaskId, action: &'static str) -> Self {
        Self {
            correlation_id: CorrelationId::new(),
            task_id,
            action,
        }
    }

    /// Build the span; attach it to a future with `tracing::Instrument`
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "task_action",
            correlation_id = %self.correlation_id,
            task_id = %self.task_id,
            action = self.action,
        )
    }
}

/// Error enrichment for adding context to errors
pub trait ErrorContext {
    /// Log the error with the task it concerns
    fn with_task_id(self, task_id: TaskId) -> Self;
}

impl<T, E> ErrorContext for Result<T, E>
where
    E: std::fmt::Display,
{
    fn with_task_id(self, task_id: TaskId) -> Self {
        self.map_err(|e| {
            tracing::error!(
                task_id = %task_id,
                error = %e,
                "error occurred"
            );
            e
        })
    }
}

/// Tracing error types
#[derive(Debug, thiserror::Error)]
pub enum TracingError {
    #[error("invalid log filter: {0}")]
    InvalidFilter(String),

    #[error("tracing initialization error: {0}")]
    InitError(String),
}
