//! Status reporting with fixed-interval retries

use crate::client::OrchestratorClient;
use crate::error::{AgentError, Result};
use mayfly_crd::ActionStatusReport;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Delivers action status reports, retrying a fixed number of times
#[derive(Clone)]
pub struct StatusReporter {
    client: Arc<dyn OrchestratorClient>,
    attempts: usize,
    interval: Duration,
}

impl StatusReporter {
    pub fn new(client: Arc<dyn OrchestratorClient>, attempts: usize, interval: Duration) -> Self {
        Self {
            client,
            attempts: attempts.max(1),
            interval,
        }
    }

    /// Send `report`. Exhausting every attempt is fatal for the agent run.
    pub async fn report(&self, report: &ActionStatusReport) -> Result<()> {
        let mut last_error = String::new();

        for attempt in 1..=self.attempts {
            match self.client.report_action_status(report).await {
                Ok(()) => {
                    debug!(
                        workflow = %report.workflow_id,
                        action = %report.action_name,
                        state = %report.action_status,
                        attempt,
                        "status reported"
                    );
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        workflow = %report.workflow_id,
                        action = %report.action_name,
                        state = %report.action_status,
                        attempt,
                        max_attempts = self.attempts,
                        "status report failed: {}",
                        e
                    );
                    last_error = e.to_string();
                }
            }

            if attempt < self.attempts {
                tokio::time::sleep(self.interval).await;
            }
        }

        error!(
            workflow = %report.workflow_id,
            action = %report.action_name,
            "giving up on status report"
        );
        Err(AgentError::ReportRetriesExhausted {
            workflow: report.workflow_id.clone(),
            action: report.action_name.clone(),
            attempts: self.attempts,
            last_error,
        })
    }
}

impl std::fmt::Debug for StatusReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusReporter")
            .field("attempts", &self.attempts)
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}
