//! Orchestrator service
//!
//! The transport-neutral RPC surface agents talk to. Every status write goes
//! through [`apply`](crate::transition::apply) on a fresh read of the stored
//! workflow and is committed with a version check.

use crate::error::{Result, WorkflowError};
use crate::store::{StoreError, StoredWorkflowData, WorkflowStore};
use crate::transition::{apply, Applied};
use chrono::Utc;
use mayfly_crd::{
    data_checksum, decode_workflow, ActionStatusReport, Workflow, WorkflowAction,
    WorkflowContext, WorkflowDataResponse, WorkflowDataUpdate,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub use mayfly_crd::DEFAULT_MAX_WORKFLOW_DATA_SIZE as DEFAULT_MAX_DATA_SIZE;

/// Read-apply-write attempts before a report gives up on conflicts
const STATUS_UPDATE_ATTEMPTS: usize = 5;

/// Orchestrator over a workflow store
#[derive(Clone)]
pub struct Orchestrator {
    store: Arc<dyn WorkflowStore>,
    max_data_size: usize,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("max_data_size", &self.max_data_size)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    pub fn new(store: Arc<dyn WorkflowStore>) -> Self {
        Self {
            store,
            max_data_size: DEFAULT_MAX_DATA_SIZE,
        }
    }

    pub fn with_max_data_size(mut self, bytes: usize) -> Self {
        self.max_data_size = bytes;
        self
    }

    pub fn store(&self) -> &Arc<dyn WorkflowStore> {
        &self.store
    }

    /// Contexts of every non-terminal workflow with a task bound to `worker_id`
    pub async fn get_workflow_contexts(&self, worker_id: &str) -> Result<Vec<WorkflowContext>> {
        if worker_id.is_empty() {
            return Err(WorkflowError::InvalidArgument("worker id is required".to_string()));
        }

        let contexts = self
            .store
            .list_workflows()
            .await?
            .iter()
            .filter(|wf| !wf.is_terminal() && wf.involves_worker(worker_id))
            .map(Workflow::context)
            .collect();
        Ok(contexts)
    }

    /// Rendered action list in execution order
    pub async fn get_workflow_actions(&self, workflow_id: &str) -> Result<Vec<WorkflowAction>> {
        let workflow = self.require(workflow_id).await?;
        Ok(workflow
            .actions()
            .map(|(_, task, action)| WorkflowAction::from_task_action(task, action))
            .collect())
    }

    /// Validate and apply one agent report
    pub async fn report_action_status(&self, report: &ActionStatusReport) -> Result<()> {
        for (field, value) in [
            ("workflow_id", &report.workflow_id),
            ("task_name", &report.task_name),
            ("action_name", &report.action_name),
        ] {
            if value.is_empty() {
                return Err(WorkflowError::InvalidArgument(format!("{} is required", field)));
            }
        }

        for attempt in 1..=STATUS_UPDATE_ATTEMPTS {
            let stored = self.require(&report.workflow_id).await?;
            let mut next = stored.clone();

            match apply(&mut next, report, Utc::now()) {
                Ok(Applied::Unchanged) => {
                    debug!(
                        workflow = %report.workflow_id,
                        action = %report.action_name,
                        "duplicate report ignored"
                    );
                    return Ok(());
                }
                Ok(Applied::Changed) => {}
                Err(e) => {
                    warn!(
                        workflow = %report.workflow_id,
                        task = %report.task_name,
                        action = %report.action_name,
                        state = %report.action_status,
                        "rejected action report: {}",
                        e
                    );
                    return Err(e);
                }
            }

            match self
                .store
                .update_status(stored.id(), &next.status, stored.metadata.resource_version)
                .await
            {
                Ok(updated) => {
                    info!(
                        workflow = %updated.id(),
                        task = %report.task_name,
                        action = %report.action_name,
                        state = %report.action_status,
                        workflow_state = %updated.state(),
                        "action status applied"
                    );
                    return Ok(());
                }
                Err(StoreError::Conflict { .. }) => {
                    debug!(workflow = %report.workflow_id, attempt, "status update conflict, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(WorkflowError::Conflict(report.workflow_id.clone()))
    }

    /// Current data blob, `{}` when nothing has been pushed yet
    pub async fn get_workflow_data(&self, workflow_id: &str) -> Result<WorkflowDataResponse> {
        self.require(workflow_id).await?;
        let response = match self.store.get_workflow_data(workflow_id).await? {
            Some(stored) => WorkflowDataResponse {
                workflow_id: workflow_id.to_string(),
                data: stored.data,
                metadata: Some(stored.metadata),
            },
            None => WorkflowDataResponse {
                workflow_id: workflow_id.to_string(),
                data: b"{}".to_vec(),
                metadata: None,
            },
        };
        Ok(response)
    }

    /// Replace the data blob. The stored checksum is always computed here; a
    /// supplied checksum must agree with it.
    pub async fn update_workflow_data(&self, update: WorkflowDataUpdate) -> Result<()> {
        if update.workflow_id.is_empty() {
            return Err(WorkflowError::InvalidArgument("workflow_id is required".to_string()));
        }
        self.require(&update.workflow_id).await?;

        if update.data.len() > self.max_data_size {
            return Err(WorkflowError::DataTooLarge {
                size: update.data.len(),
                max: self.max_data_size,
            });
        }

        let checksum = data_checksum(&update.data);
        if !update.metadata.sha_sum.is_empty() && update.metadata.sha_sum != checksum {
            return Err(WorkflowError::InvalidArgument(format!(
                "checksum mismatch: got {}, computed {}",
                update.metadata.sha_sum, checksum
            )));
        }

        let mut metadata = update.metadata;
        metadata.sha_sum = checksum;
        let stored = StoredWorkflowData {
            data: update.data,
            metadata,
        };
        self.store.put_workflow_data(&update.workflow_id, &stored).await?;

        debug!(
            workflow = %update.workflow_id,
            size = stored.data.len(),
            sha = %stored.metadata.sha_sum,
            "workflow data updated"
        );
        Ok(())
    }

    /// Store an already-rendered workflow
    pub async fn create_workflow(&self, workflow: Workflow) -> Result<Workflow> {
        workflow.validate()?;
        let created = self.store.create_workflow(&workflow).await?;
        info!(
            workflow = %created.id(),
            tasks = created.status.tasks.len(),
            actions = created.total_actions(),
            "workflow created"
        );
        Ok(created)
    }

    /// Decode a manifest in any supported schema version and store it
    pub async fn load_manifest(&self, document: serde_json::Value) -> Result<Workflow> {
        self.create_workflow(decode_workflow(document)?).await
    }

    pub async fn get_workflow(&self, workflow_id: &str) -> Result<Workflow> {
        self.require(workflow_id).await
    }

    async fn require(&self, workflow_id: &str) -> Result<Workflow> {
        self.store
            .get_workflow(workflow_id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(workflow_id.to_string()))
    }
}
