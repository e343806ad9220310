//! Workflow data synchronizer
//!
//! Keeps `<data_dir>/<workflow>/data` in step with the orchestrator's copy:
//! one pull before every action, at most one push after a successful one.

use crate::client::OrchestratorClient;
use crate::error::Result;
use chrono::Utc;
use mayfly_crd::{data_checksum, WorkflowAction, WorkflowDataMetadata, WorkflowDataUpdate};
use mayfly_runtime::workflow_data_path;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Per-agent data sync state. Checksums live only as long as the process.
pub struct WorkflowDataSync {
    client: Arc<dyn OrchestratorClient>,
    data_dir: PathBuf,
    max_size: usize,
    checksums: HashMap<String, String>,
}

impl WorkflowDataSync {
    pub fn new(client: Arc<dyn OrchestratorClient>, data_dir: impl Into<PathBuf>, max_size: usize) -> Self {
        Self {
            client,
            data_dir: data_dir.into(),
            max_size,
            checksums: HashMap::new(),
        }
    }

    pub fn data_path(&self, workflow_id: &str) -> PathBuf {
        workflow_data_path(&self.data_dir, workflow_id)
    }

    /// Last checksum seen for `workflow_id`, pulled or pushed
    pub fn known_checksum(&self, workflow_id: &str) -> Option<&str> {
        self.checksums.get(workflow_id).map(String::as_str)
    }

    /// Create the scratch directory, seeding the data file with `{}`
    pub async fn ensure_scratch(&self, workflow_id: &str) -> Result<()> {
        let path = self.data_path(workflow_id);
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        if !tokio::fs::try_exists(&path).await? {
            tokio::fs::write(&path, b"{}").await?;
            debug!(workflow = %workflow_id, path = %path.display(), "seeded workflow data");
        }
        Ok(())
    }

    /// Overwrite the local data file with the orchestrator's blob
    pub async fn pull(&mut self, workflow_id: &str) -> Result<()> {
        let response = self.client.get_workflow_data(workflow_id).await?;
        let path = self.data_path(workflow_id);
        tokio::fs::write(&path, &response.data).await?;
        self.checksums
            .insert(workflow_id.to_string(), data_checksum(&response.data));
        debug!(workflow = %workflow_id, size = response.data.len(), "pulled workflow data");
        Ok(())
    }

    /// Push the local data file if it is a valid, changed JSON object.
    /// Returns whether a push happened.
    pub async fn push_if_changed(&mut self, workflow_id: &str, action: &WorkflowAction) -> Result<bool> {
        let path = self.data_path(workflow_id);
        let Some(data) = self.read_valid(workflow_id, &path).await? else {
            return Ok(false);
        };

        let checksum = data_checksum(&data);
        if self.known_checksum(workflow_id) == Some(checksum.as_str()) {
            debug!(workflow = %workflow_id, action = %action.name, "workflow data unchanged");
            return Ok(false);
        }

        let update = WorkflowDataUpdate {
            workflow_id: workflow_id.to_string(),
            data,
            metadata: WorkflowDataMetadata {
                worker_id: action.worker_id.clone(),
                task_name: action.task_name.clone(),
                action_name: action.name.clone(),
                created_at: Utc::now(),
                sha_sum: checksum.clone(),
            },
        };
        self.client.update_workflow_data(&update).await?;
        self.checksums.insert(workflow_id.to_string(), checksum);

        info!(
            workflow = %workflow_id,
            action = %action.name,
            size = update.data.len(),
            "pushed workflow data"
        );
        Ok(true)
    }

    async fn read_valid(&self, workflow_id: &str, path: &Path) -> Result<Option<Vec<u8>>> {
        let data = match tokio::fs::read(path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(workflow = %workflow_id, path = %path.display(), "workflow data file missing, skipping push");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        if data.len() > self.max_size {
            warn!(
                workflow = %workflow_id,
                size = data.len(),
                max = self.max_size,
                "workflow data too large, skipping push"
            );
            return Ok(None);
        }

        match serde_json::from_slice::<serde_json::Value>(&data) {
            Ok(serde_json::Value::Object(_)) => Ok(Some(data)),
            Ok(_) => {
                warn!(workflow = %workflow_id, "workflow data is not a JSON object, skipping push");
                Ok(None)
            }
            Err(e) => {
                warn!(workflow = %workflow_id, "workflow data is not valid JSON, skipping push: {}", e);
                Ok(None)
            }
        }
    }
}

impl std::fmt::Debug for WorkflowDataSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowDataSync")
            .field("data_dir", &self.data_dir)
            .field("max_size", &self.max_size)
            .finish_non_exhaustive()
    }
}
