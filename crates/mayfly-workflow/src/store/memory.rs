//! In-memory storage backend

use super::{prepare_new, Result, StoreError, StoredWorkflowData, WorkflowStore};
use async_trait::async_trait;
use mayfly_crd::{Workflow, WorkflowStatus};
use std::collections::BTreeMap;
use std::sync::RwLock;

/// In-memory state store
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    workflows: RwLock<BTreeMap<String, Workflow>>,
    data: RwLock<BTreeMap<String, StoredWorkflowData>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Database("lock poisoned".to_string())
}

#[async_trait]
impl WorkflowStore for MemoryStateStore {
    async fn get_workflow(&self, id: &str) -> Result<Option<Workflow>> {
        Ok(self.workflows.read().map_err(poisoned)?.get(id).cloned())
    }

    async fn list_workflows(&self) -> Result<Vec<Workflow>> {
        Ok(self.workflows.read().map_err(poisoned)?.values().cloned().collect())
    }

    async fn create_workflow(&self, workflow: &Workflow) -> Result<Workflow> {
        let mut workflows = self.workflows.write().map_err(poisoned)?;
        let id = workflow.metadata.name.clone();
        if workflows.contains_key(&id) {
            return Err(StoreError::AlreadyExists(id));
        }
        let stored = prepare_new(workflow);
        workflows.insert(id, stored.clone());
        Ok(stored)
    }

    async fn update_status(
        &self,
        id: &str,
        status: &WorkflowStatus,
        expected_version: u64,
    ) -> Result<Workflow> {
        let mut workflows = self.workflows.write().map_err(poisoned)?;
        let workflow = workflows
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        if workflow.metadata.resource_version != expected_version {
            return Err(StoreError::Conflict {
                id: id.to_string(),
                expected: expected_version,
                actual: workflow.metadata.resource_version,
            });
        }

        workflow.status = status.clone();
        workflow.metadata.resource_version += 1;
        Ok(workflow.clone())
    }

    async fn get_workflow_data(&self, id: &str) -> Result<Option<StoredWorkflowData>> {
        Ok(self.data.read().map_err(poisoned)?.get(id).cloned())
    }

    async fn put_workflow_data(&self, id: &str, data: &StoredWorkflowData) -> Result<()> {
        self.data
            .write()
            .map_err(poisoned)?
            .insert(id.to_string(), data.clone());
        Ok(())
    }
}
