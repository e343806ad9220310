//! Storage backends for workflow state
//!
//! - `MemoryStateStore` - In-memory storage for testing and ephemeral servers
//! - `RedbStateStore` - Local embedded database using ReDB
//!
//! Only the Status sub-resource is mutable after creation, and every status
//! write is a compare-and-swap on `metadata.resource_version`.

mod memory;
mod redb_store;

#[cfg(test)]
mod tests;

pub use memory::MemoryStateStore;
pub use redb_store::RedbStateStore;

use async_trait::async_trait;
use mayfly_crd::{Workflow, WorkflowDataMetadata, WorkflowStatus};
use thiserror::Error;

/// Errors from storage operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("conflict on {id}: expected version {expected}, found {actual}")]
    Conflict { id: String, expected: u64, actual: u64 },

    #[error("database error: {0}")]
    Database(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Workflow data blob as the orchestrator keeps it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredWorkflowData {
    pub data: Vec<u8>,
    pub metadata: WorkflowDataMetadata,
}

/// Storage backend for workflows and their data blobs
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Get workflow by id
    async fn get_workflow(&self, id: &str) -> Result<Option<Workflow>>;

    /// List all workflows, ordered by id
    async fn list_workflows(&self) -> Result<Vec<Workflow>>;

    /// Store a new workflow at resource version 1
    async fn create_workflow(&self, workflow: &Workflow) -> Result<Workflow>;

    /// Replace the status if the stored version still equals `expected_version`.
    /// Returns the stored workflow with its bumped version.
    async fn update_status(
        &self,
        id: &str,
        status: &WorkflowStatus,
        expected_version: u64,
    ) -> Result<Workflow>;

    async fn get_workflow_data(&self, id: &str) -> Result<Option<StoredWorkflowData>>;

    async fn put_workflow_data(&self, id: &str, data: &StoredWorkflowData) -> Result<()>;
}

/// Prepare a workflow for its first write
pub(crate) fn prepare_new(workflow: &Workflow) -> Workflow {
    let mut stored = workflow.clone();
    stored.metadata.stamp_created();
    stored.metadata.resource_version = 1;
    stored
}
