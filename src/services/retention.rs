//! Periodic deletion of transactions older than the retention window.
//!
//! The sweeper waits one interval before its first sweep. Cancellation is
//! only observed between sweeps; a delete that has started runs to completion.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::config::RetentionConfig;
use crate::domain::EntityKind;
use crate::ports::{Filter, RepositoryResult, Storage};

pub struct RetentionSweeper {
    storage: Arc<dyn Storage>,
    keep_for: Duration,
    interval: Duration,
}

impl RetentionSweeper {
    pub fn new(storage: Arc<dyn Storage>, config: &RetentionConfig) -> Self {
        Self {
            storage,
            keep_for: config.keep_transactions_for,
            interval: config.interval,
        }
    }

    /// Oldest `created_at` that survives a sweep at `now`.
    /// `None` when the window reaches past the earliest representable time.
    pub fn cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let keep_for = chrono::Duration::from_std(self.keep_for).ok()?;
        now.checked_sub_signed(keep_for)
    }

    /// Deletes every transaction created before the cutoff in one statement.
    pub async fn sweep_once(&self) -> RepositoryResult<u64> {
        let Some(cutoff) = self.cutoff(Utc::now()) else {
            debug!("Retention window exceeds the time range, nothing to sweep");
            return Ok(0);
        };

        self.storage
            .delete(EntityKind::Transaction, &[Filter::CreatedBefore(cutoff)])
            .await
    }

    /// Starts the sweep loop on the runtime.
    ///
    /// Dropping the returned handle also stops the loop at its next idle point.
    pub fn spawn(self) -> SweeperHandle {
        let (cancel, mut cancelled) = watch::channel(false);

        let task = tokio::spawn(async move {
            // The second deadline is computed on the first tick, so both must fit.
            let start = Instant::now()
                .checked_add(self.interval)
                .filter(|start| start.checked_add(self.interval).is_some());
            let Some(start) = start else {
                error!(
                    interval_secs = self.interval.as_secs(),
                    "Retention interval out of range, sweeper not started"
                );
                return;
            };

            let mut ticker = time::interval_at(start, self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            info!(
                keep_for_secs = self.keep_for.as_secs(),
                interval_secs = self.interval.as_secs(),
                "Retention sweeper started"
            );

            loop {
                tokio::select! {
                    biased;
                    _ = cancelled.changed() => break,
                    _ = ticker.tick() => {}
                }

                match self.sweep_once().await {
                    Ok(deleted) if deleted > 0 => {
                        info!(deleted, "Retention sweep removed old transactions");
                    }
                    Ok(_) => debug!("Retention sweep found nothing to remove"),
                    Err(e) => error!(error = %e, "Retention sweep failed"),
                }
            }

            info!("Retention sweeper stopped");
        });

        SweeperHandle { cancel, task }
    }
}

pub struct SweeperHandle {
    cancel: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Signals the loop to exit once it is idle.
    pub fn stop(&self) {
        self.cancel.send_replace(true);
    }

    /// Stops the loop and waits for an in-flight sweep to finish.
    pub async fn shutdown(self) -> Result<(), JoinError> {
        self.stop();
        self.task.await
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
