//! Agent loop
//!
//! Polls the orchestrator, takes its turn on each workflow it is party to,
//! and drives consecutive actions it owns until the turn passes to another
//! worker or the workflow ends.

use crate::client::OrchestratorClient;
use crate::config::AgentConfig;
use crate::data_sync::WorkflowDataSync;
use crate::error::{AgentError, Result};
use crate::report::StatusReporter;
use crate::turn::{next_turn, Turn};
use mayfly_crd::{ActionStatusReport, State, WorkflowAction, WorkflowContext};
use mayfly_runtime::{shutdown_requested, ActionExecutor, ContainerDriver, ContainerEngine};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Result of one polling cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Poll {
    /// No non-terminal workflow involves this agent
    Idle,
    /// Workflows remain; poll again later
    Active,
}

/// How processing one workflow ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Handoff {
    /// Last action done
    Complete,
    /// Next action belongs to another worker
    Relinquished,
    /// Shutdown stopped the running action; it resumes on restart
    Interrupted,
}

/// One agent process. Owns every piece of per-agent state, so several
/// agents can share a process.
pub struct Agent {
    worker_id: String,
    client: Arc<dyn OrchestratorClient>,
    executor: ActionExecutor,
    reporter: StatusReporter,
    data: WorkflowDataSync,
    poll_interval: Duration,
    shutdown: watch::Receiver<bool>,
}

impl Agent {
    pub fn new(
        config: &AgentConfig,
        client: Arc<dyn OrchestratorClient>,
        engine: Arc<dyn ContainerEngine>,
    ) -> Self {
        let driver = ContainerDriver::new(engine, config.driver.clone());
        let (_, shutdown) = watch::channel(false);
        Self {
            worker_id: config.worker_id.clone(),
            executor: ActionExecutor::new(driver),
            reporter: StatusReporter::new(client.clone(), config.report_attempts, config.retry_interval),
            data: WorkflowDataSync::new(
                client.clone(),
                config.data_dir(),
                config.max_workflow_data_size,
            ),
            client,
            poll_interval: config.poll_interval,
            shutdown,
        }
    }

    /// Stop between actions, and remove the running container, once `true`
    /// is sent on `shutdown`
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.executor = self.executor.with_shutdown(shutdown.clone());
        self.shutdown = shutdown;
        self
    }

    fn stopping(&self) -> bool {
        *self.shutdown.borrow()
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Poll until no workflow involving this agent remains or shutdown is
    /// requested
    pub async fn run(&mut self) -> Result<()> {
        info!(worker = %self.worker_id, "Agent started");
        loop {
            if self.stopping() {
                info!(worker = %self.worker_id, "Agent stopped");
                return Ok(());
            }
            match self.poll_once().await? {
                Poll::Idle => {
                    info!(worker = %self.worker_id, "No workflows remain for this worker");
                    return Ok(());
                }
                Poll::Active => {
                    tokio::select! {
                        _ = tokio::time::sleep(self.poll_interval) => {}
                        _ = shutdown_requested(self.shutdown.clone()) => {}
                    }
                }
            }
        }
    }

    /// One polling cycle over every workflow assigned to this agent.
    ///
    /// Failing to fetch contexts or actions only defers to the next cycle.
    pub async fn poll_once(&mut self) -> Result<Poll> {
        let contexts = match self.client.get_workflow_contexts(&self.worker_id).await {
            Ok(contexts) => contexts,
            Err(e) => {
                warn!(worker = %self.worker_id, "Failed to fetch workflow contexts: {}", e);
                return Ok(Poll::Active);
            }
        };

        if contexts.is_empty() {
            return Ok(Poll::Idle);
        }

        for ctx in contexts {
            if self.stopping() {
                break;
            }
            let actions = match self.client.get_workflow_actions(&ctx.workflow_id).await {
                Ok(actions) => actions,
                Err(e) => {
                    warn!(workflow = %ctx.workflow_id, "Failed to fetch workflow actions: {}", e);
                    continue;
                }
            };

            match next_turn(&ctx, &actions, &self.worker_id) {
                Turn::Take(cursor) => {
                    let outcome = self.drive(&ctx, &actions, cursor).await?;
                    debug!(workflow = %ctx.workflow_id, outcome = ?outcome, "turn ended");
                }
                Turn::Wait(cursor) => {
                    debug!(
                        workflow = %ctx.workflow_id,
                        action_index = cursor,
                        owner = %actions[cursor].worker_id,
                        "waiting for another worker"
                    );
                }
                Turn::Finished => {
                    debug!(workflow = %ctx.workflow_id, "nothing left to run");
                }
            }
        }

        Ok(Poll::Active)
    }

    /// Run actions from `cursor` while the turn stays with this agent
    async fn drive(
        &mut self,
        ctx: &WorkflowContext,
        actions: &[WorkflowAction],
        mut cursor: usize,
    ) -> Result<Handoff> {
        let workflow_id = ctx.workflow_id.as_str();
        self.data.ensure_scratch(workflow_id).await?;

        let mut known_state = if ctx.has_started() && ctx.current_action_index == cursor {
            ctx.current_action_state
        } else {
            State::Pending
        };

        loop {
            let action = &actions[cursor];
            info!(
                workflow = %workflow_id,
                task = %action.task_name,
                action = %action.name,
                index = cursor,
                "Taking turn"
            );

            if known_state != State::Running {
                self.reporter
                    .report(&ActionStatusReport::new(workflow_id, action, State::Running))
                    .await?;
            }

            if let Err(e) = self.data.pull(workflow_id).await {
                warn!(workflow = %workflow_id, "Failed to pull workflow data, using local copy: {}", e);
            }

            let started = Instant::now();
            let result = self.executor.execute(workflow_id, action).await;
            let seconds = started.elapsed().as_secs();

            let execution = match result {
                Ok(execution) => execution,
                Err(err) if err.is_cancelled() => {
                    warn!(
                        workflow = %workflow_id,
                        action = %action.name,
                        "Action interrupted by shutdown, it resumes when an agent restarts"
                    );
                    return Ok(Handoff::Interrupted);
                }
                Err(err) => {
                    error!(workflow = %workflow_id, action = %action.name, "Action could not run: {}", err);
                    self.reporter
                        .report(
                            &ActionStatusReport::new(workflow_id, action, State::Failed)
                                .with_seconds(seconds)
                                .with_message(err.to_string()),
                        )
                        .await?;
                    return Err(AgentError::Runtime {
                        workflow: workflow_id.to_string(),
                        action: action.name.clone(),
                        source: err,
                    });
                }
            };

            if !execution.is_success() {
                error!(
                    workflow = %workflow_id,
                    action = %action.name,
                    state = %execution.state,
                    reaction = ?execution.reaction,
                    "Action did not succeed"
                );
                self.reporter
                    .report(
                        &ActionStatusReport::new(workflow_id, action, execution.state)
                            .with_seconds(seconds)
                            .with_message(execution.message.clone()),
                    )
                    .await?;
                return Err(AgentError::ActionFailed {
                    workflow: workflow_id.to_string(),
                    action: action.name.clone(),
                    state: execution.state,
                    message: execution.message,
                });
            }

            // Data goes up before Success so the next worker pulls it
            if let Err(e) = self.data.push_if_changed(workflow_id, action).await {
                warn!(workflow = %workflow_id, action = %action.name, "Failed to push workflow data: {}", e);
            }

            self.reporter
                .report(
                    &ActionStatusReport::new(workflow_id, action, State::Success)
                        .with_seconds(seconds)
                        .with_message(execution.message),
                )
                .await?;
            info!(workflow = %workflow_id, action = %action.name, seconds, "Action succeeded");

            let Some(next) = actions.get(cursor + 1) else {
                info!(workflow = %workflow_id, "Workflow complete");
                return Ok(Handoff::Complete);
            };
            if next.worker_id != self.worker_id {
                info!(
                    workflow = %workflow_id,
                    next_worker = %next.worker_id,
                    "Handing workflow to next worker"
                );
                return Ok(Handoff::Relinquished);
            }

            cursor += 1;
            known_state = State::Pending;
        }
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("worker_id", &self.worker_id)
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}
