//! Orchestrator watchdog
//!
//! Terminates workflows whose global timeout or whose running action's
//! timeout has elapsed, independent of agent liveness.

use crate::error::Result;
use crate::store::{StoreError, WorkflowStore};
use chrono::{DateTime, TimeDelta, Utc};
use mayfly_crd::{State, Workflow};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Instant a timeout of `seconds` started at `started` runs out. Zero and
/// timeouts past the representable range never expire.
fn deadline(started: DateTime<Utc>, seconds: u64) -> Option<DateTime<Utc>> {
    if seconds == 0 {
        return None;
    }
    let delta = i64::try_from(seconds).ok().and_then(TimeDelta::try_seconds)?;
    started.checked_add_signed(delta)
}

fn expired(started: DateTime<Utc>, seconds: u64, now: DateTime<Utc>) -> bool {
    deadline(started, seconds).is_some_and(|limit| now > limit)
}

/// Mark expired actions and the workflow Timeout. Returns whether anything
/// changed. Only Running workflows are examined.
pub fn check_timeouts(workflow: &mut Workflow, now: DateTime<Utc>) -> bool {
    if workflow.state() != State::Running {
        return false;
    }

    let global_expired = workflow
        .status
        .started_at
        .is_some_and(|started| expired(started, workflow.status.global_timeout, now));

    let mut timed_out = Vec::new();
    for (task_idx, task) in workflow.status.tasks.iter_mut().enumerate() {
        for (action_idx, action) in task.actions.iter_mut().enumerate() {
            if action.status != State::Running {
                continue;
            }
            let Some(started) = action.started_at else {
                continue;
            };

            let action_expired = expired(started, action.timeout, now);
            if !action_expired && !global_expired {
                continue;
            }

            action.status = State::Timeout;
            action.seconds = action.elapsed_seconds(now);
            action.message = if action_expired {
                format!("action timed out after {}s", action.timeout)
            } else {
                "workflow global timeout exceeded".to_string()
            };
            timed_out.push((task_idx, action_idx));
        }
    }

    if !global_expired && timed_out.is_empty() {
        return false;
    }

    workflow.status.state = State::Timeout;
    for (task_idx, action_idx) in timed_out {
        let index = workflow.global_index(task_idx, action_idx);
        if let Some(current) = workflow.status.current.as_mut() {
            if current.action_index == index {
                current.state = State::Timeout;
            }
        }
    }
    true
}

/// Periodic timeout sweep over the store
pub struct Watchdog {
    store: Arc<dyn WorkflowStore>,
    interval: Duration,
}

impl Watchdog {
    pub fn new(store: Arc<dyn WorkflowStore>, interval: Duration) -> Self {
        Self { store, interval }
    }

    /// One pass over all Running workflows. Returns how many were timed out.
    pub async fn sweep(&self) -> Result<usize> {
        let now = Utc::now();
        let mut count = 0;

        for workflow in self.store.list_workflows().await? {
            let mut next = workflow.clone();
            if !check_timeouts(&mut next, now) {
                continue;
            }

            match self
                .store
                .update_status(workflow.id(), &next.status, workflow.metadata.resource_version)
                .await
            {
                Ok(_) => {
                    warn!(workflow = %workflow.id(), "workflow timed out");
                    count += 1;
                }
                Err(StoreError::Conflict { .. }) => {
                    debug!(workflow = %workflow.id(), "workflow changed during sweep, rechecking next pass");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(count)
    }

    /// Sweep every interval until shutdown is signalled
    pub async fn run(self, mut shutdown_rx: watch::Receiver<()>) {
        info!(interval = ?self.interval, "Starting workflow watchdog");
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {
                    if let Err(e) = self.sweep().await {
                        error!("Watchdog sweep failed: {}", e);
                    }
                }
                _ = shutdown_rx.changed() => {
                    info!("Shutdown signal received, stopping watchdog");
                    break;
                }
            }
        }
    }
}

impl std::fmt::Debug for Watchdog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watchdog")
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}
