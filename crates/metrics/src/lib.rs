//! Metrics and monitoring for the SQL change task lifecycle
//!
//! This crate records lifecycle events (task creation, gate rejections,
//! per-statement execution and inspection outcomes) as Prometheus metrics and
//! sets up structured logging for the coordinator.
//!
//! # Features
//!
//! - Prometheus metrics in the text exposition format
//! - Tracing initialisation with pretty or JSON output
//! - Per-action spans carrying a correlation id
//!
//! # Example
//!
//! ```no_run
//! use sqlgate_metrics::{init_tracing, MetricsCollector};
//! use sqlgate_types::TaskAction;
//!
//! init_tracing("info", false).unwrap();
//!
//! let collector = MetricsCollector::new();
//! collector.record_task_created();
//! collector.record_gate_rejection(TaskAction::Commit, "already_committed");
//!
//! println!("{}", collector.export_metrics().unwrap());
//! ```

pub mod collector;
pub mod metrics;
pub mod tracing;

pub use collector::{ActionOutcome, MetricsCollector, MetricsError};
pub use tracing::{init_tracing, CorrelationId, ErrorContext, TaskSpan, TracingError};
