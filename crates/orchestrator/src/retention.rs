use serde::{Deserialize, Serialize};
use sqlgate_metrics::MetricsCollector;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::coordinator::LifecycleCoordinator;
use crate::error::CoordinatorError;

/// How long soft-deleted tasks are kept before being purged
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    pub purge_after: Duration,
    /// Maximum tasks purged per sweep
    pub batch_size: usize,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            purge_after: Duration::from_secs(30 * 24 * 3600),
            batch_size: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetentionReport {
    /// Expired tasks found
    pub expired: usize,
    pub purged: usize,
}

/// Hard-deletes tasks that have been soft-deleted for longer than the policy allows
pub struct RetentionSweeper {
    coordinator: Arc<LifecycleCoordinator>,
    metrics: Arc<MetricsCollector>,
    policy: RetentionPolicy,
}

impl RetentionSweeper {
    pub fn new(
        coordinator: Arc<LifecycleCoordinator>,
        metrics: Arc<MetricsCollector>,
        policy: RetentionPolicy,
    ) -> Self {
        Self {
            coordinator,
            metrics,
            policy,
        }
    }

    /// Purge one batch of tasks deleted before `now - purge_after`
    pub async fn sweep(&self, now: u64) -> Result<RetentionReport, CoordinatorError> {
        let threshold = now.saturating_sub(self.policy.purge_after.as_secs());
        let expired = self
            .coordinator
            .deleted_before(threshold, self.policy.batch_size)
            .await?;

        let purged = self.coordinator.purge_tasks(&expired).await?;
        self.metrics.record_retention_sweep();

        if purged > 0 {
            info!(threshold, purged, "Retention sweep purged tasks");
        }

        Ok(RetentionReport {
            expired: expired.len(),
            purged,
        })
    }

    /// Run [`sweep`](Self::sweep) every `interval` until the handle is aborted
    pub fn spawn(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let now = chrono::Utc::now().timestamp() as u64;
                if let Err(e) = self.sweep(now).await {
                    error!(error = %e, "Retention sweep failed");
                }
            }
        })
    }
}
