//! Action executor
//!
//! Runs one workflow action to completion: pull, create, start, bounded
//! wait, unconditional removal, and the on-timeout / on-failure reaction
//! container when the primary does not succeed.

use crate::driver::ContainerDriver;
use crate::error::{Result, RuntimeError};
use mayfly_crd::{State, WorkflowAction};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Bound applied to actions declaring a zero timeout
pub const DEFAULT_ACTION_TIMEOUT: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Outcome of one action run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    /// Final state of the primary container: Success, Failed or Timeout
    pub state: State,
    /// State the reaction container ended in, if one ran
    pub reaction: Option<State>,
    pub message: String,
}

impl Execution {
    pub fn is_success(&self) -> bool {
        self.state == State::Success
    }
}

/// Resolves once `true` is sent on `shutdown`. A dropped sender never
/// resolves.
pub async fn shutdown_requested(mut shutdown: watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Runs actions through a [`ContainerDriver`]
#[derive(Debug, Clone)]
pub struct ActionExecutor {
    driver: ContainerDriver,
    shutdown: watch::Receiver<bool>,
}

impl ActionExecutor {
    pub fn new(driver: ContainerDriver) -> Self {
        let (_, shutdown) = watch::channel(false);
        Self { driver, shutdown }
    }

    /// Abandon running containers once `true` is sent on `shutdown`
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = shutdown;
        self
    }

    fn stopping(&self) -> bool {
        *self.shutdown.borrow()
    }

    pub fn driver(&self) -> &ContainerDriver {
        &self.driver
    }

    /// Effective timeout of an action
    pub fn action_timeout(action: &WorkflowAction) -> Duration {
        match action.timeout {
            0 => DEFAULT_ACTION_TIMEOUT,
            secs => Duration::from_secs(secs),
        }
    }

    /// Execute `action` of `workflow_id`.
    ///
    /// An error means the primary container never ran (pull, create or
    /// start failed) or shutdown interrupted it ([`RuntimeError::Cancelled`]).
    /// Every container that was created is removed.
    pub async fn execute(&self, workflow_id: &str, action: &WorkflowAction) -> Result<Execution> {
        if self.stopping() {
            return Err(RuntimeError::Cancelled);
        }

        self.driver.pull_image(&action.image).await?;

        let id = self
            .driver
            .create_container(&action.command, workflow_id, action)
            .await?;

        if let Err(err) = self.driver.start_container(&id).await {
            self.remove(&id).await;
            return Err(err);
        }

        info!(
            workflow = %workflow_id,
            action = %action.name,
            container = %id,
            "action container started"
        );

        if self.driver.config().capture_logs {
            self.driver.stream_logs(&id);
        }

        let timeout = Self::action_timeout(action);
        let waited = tokio::select! {
            result = self.driver.wait_for_container(&id, timeout) => result,
            _ = shutdown_requested(self.shutdown.clone()) => {
                warn!(
                    workflow = %workflow_id,
                    action = %action.name,
                    container = %id,
                    "shutdown requested, removing action container"
                );
                self.remove(&id).await;
                return Err(RuntimeError::Cancelled);
            }
        };

        let (state, message) = match waited {
            Ok(State::Success) => (State::Success, "finished successfully".to_string()),
            Ok(state) => (state, "container exited with a failure".to_string()),
            Err(RuntimeError::Timeout(t)) => (State::Timeout, format!("timed out after {:?}", t)),
            Err(err) => (State::Failed, err.to_string()),
        };

        self.remove(&id).await;

        let reaction_cmd = match state {
            State::Timeout => &action.on_timeout,
            State::Failed => &action.on_failure,
            _ => {
                return Ok(Execution {
                    state,
                    reaction: None,
                    message,
                })
            }
        };

        let reaction = if reaction_cmd.is_empty() {
            None
        } else {
            self.run_reaction(workflow_id, action, reaction_cmd, state).await
        };

        Ok(Execution {
            state,
            reaction,
            message,
        })
    }

    /// Run a best-effort reaction container. Errors are logged only.
    async fn run_reaction(
        &self,
        workflow_id: &str,
        action: &WorkflowAction,
        cmd: &[String],
        trigger: State,
    ) -> Option<State> {
        info!(
            workflow = %workflow_id,
            action = %action.name,
            trigger = %trigger,
            "running reaction container"
        );

        let id = match self.driver.create_container(cmd, workflow_id, action).await {
            Ok(id) => id,
            Err(err) => {
                error!(workflow = %workflow_id, action = %action.name, error = %err, "failed to create reaction container");
                return None;
            }
        };

        if let Err(err) = self.driver.start_container(&id).await {
            error!(workflow = %workflow_id, action = %action.name, error = %err, "failed to start reaction container");
            self.remove(&id).await;
            return None;
        }

        if self.driver.config().capture_logs {
            self.driver.stream_logs(&id);
        }

        let outcome = tokio::select! {
            outcome = self.driver.wait_for_failed_container(&id).outcome() => outcome,
            _ = shutdown_requested(self.shutdown.clone()) => {
                warn!(workflow = %workflow_id, action = %action.name, container = %id, "shutdown requested, removing reaction container");
                self.remove(&id).await;
                return None;
            }
        };
        info!(
            workflow = %workflow_id,
            action = %action.name,
            reaction = %outcome,
            "reaction container finished"
        );

        self.remove(&id).await;
        Some(outcome)
    }

    async fn remove(&self, id: &str) {
        if let Err(err) = self.driver.remove_container(id).await {
            warn!(container = %id, error = %err, "failed to remove container");
        }
    }
}
