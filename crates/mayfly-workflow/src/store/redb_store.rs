//! ReDB storage backend
//!
//! Local embedded database so workflow state survives orchestrator restarts.
//! Workflows are stored as JSON and decoded through the versioned
//! converters, so records written in the legacy shape load as canonical.

use super::{prepare_new, Result, StoreError, StoredWorkflowData, WorkflowStore};
use async_trait::async_trait;
use mayfly_crd::{decode_workflow, Workflow, WorkflowDataMetadata, WorkflowStatus};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use std::path::Path;
use std::sync::Arc;

// Table definitions
const WORKFLOW_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("workflows");
const DATA_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("workflow_data");
const DATA_META_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("workflow_data_meta");

/// ReDB storage backend
pub struct RedbStateStore {
    db: Arc<Database>,
}

impl std::fmt::Debug for RedbStateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStateStore").finish_non_exhaustive()
    }
}

fn db_err<E: std::fmt::Display>(context: &'static str) -> impl Fn(E) -> StoreError {
    move |e| StoreError::Database(format!("{} failed: {}", context, e))
}

fn decode(id: &str, bytes: &[u8]) -> Result<Workflow> {
    let value: serde_json::Value = serde_json::from_slice(bytes)
        .map_err(|e| StoreError::Serialization(format!("workflow {}: {}", id, e)))?;
    decode_workflow(value).map_err(|e| StoreError::Serialization(format!("workflow {}: {}", id, e)))
}

fn encode(workflow: &Workflow) -> Result<Vec<u8>> {
    serde_json::to_vec(workflow)
        .map_err(|e| StoreError::Serialization(format!("failed to serialize: {}", e)))
}

impl RedbStateStore {
    /// Open or create a ReDB database at the given path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = Database::create(path)
            .map_err(|e| StoreError::Database(format!("failed to open database: {}", e)))?;

        let write_txn = db
            .begin_write()
            .map_err(|e| StoreError::Database(format!("failed to begin transaction: {}", e)))?;
        for table in [WORKFLOW_TABLE, DATA_TABLE, DATA_META_TABLE] {
            write_txn
                .open_table(table)
                .map_err(|e| StoreError::Database(format!("failed to create table: {}", e)))?;
        }
        write_txn
            .commit()
            .map_err(|e| StoreError::Database(format!("failed to commit: {}", e)))?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Write a raw workflow document, bypassing version checks.
    ///
    /// Seeds records in any supported schema version.
    #[cfg(test)]
    pub(crate) fn put_raw(&self, id: &str, document: &serde_json::Value) -> Result<()> {
        let bytes = serde_json::to_vec(document)
            .map_err(|e| StoreError::Serialization(format!("failed to serialize: {}", e)))?;
        let write_txn = self.db.begin_write().map_err(db_err("begin write"))?;
        {
            let mut table = write_txn
                .open_table(WORKFLOW_TABLE)
                .map_err(db_err("open table"))?;
            table
                .insert(id, bytes.as_slice())
                .map_err(db_err("insert"))?;
        }
        write_txn.commit().map_err(db_err("commit"))?;
        Ok(())
    }
}

#[async_trait]
impl WorkflowStore for RedbStateStore {
    async fn get_workflow(&self, id: &str) -> Result<Option<Workflow>> {
        let read_txn = self.db.begin_read().map_err(db_err("begin read"))?;
        let table = read_txn
            .open_table(WORKFLOW_TABLE)
            .map_err(db_err("open table"))?;

        match table.get(id) {
            Ok(Some(value)) => decode(id, value.value()).map(Some),
            Ok(None) => Ok(None),
            Err(e) => Err(StoreError::Database(format!("get failed: {}", e))),
        }
    }

    async fn list_workflows(&self) -> Result<Vec<Workflow>> {
        let read_txn = self.db.begin_read().map_err(db_err("begin read"))?;
        let table = read_txn
            .open_table(WORKFLOW_TABLE)
            .map_err(db_err("open table"))?;

        let mut workflows = Vec::new();
        for entry in table.iter().map_err(db_err("iterate"))? {
            let (key, value) = entry.map_err(db_err("read entry"))?;
            workflows.push(decode(key.value(), value.value())?);
        }
        Ok(workflows)
    }

    async fn create_workflow(&self, workflow: &Workflow) -> Result<Workflow> {
        let id = workflow.metadata.name.as_str();
        let stored = prepare_new(workflow);
        let bytes = encode(&stored)?;

        let write_txn = self.db.begin_write().map_err(db_err("begin write"))?;
        {
            let mut table = write_txn
                .open_table(WORKFLOW_TABLE)
                .map_err(db_err("open table"))?;
            let exists = table
                .get(id)
                .map_err(db_err("get"))?
                .is_some();
            if exists {
                return Err(StoreError::AlreadyExists(id.to_string()));
            }
            table
                .insert(id, bytes.as_slice())
                .map_err(db_err("insert"))?;
        }
        write_txn.commit().map_err(db_err("commit"))?;
        Ok(stored)
    }

    async fn update_status(
        &self,
        id: &str,
        status: &WorkflowStatus,
        expected_version: u64,
    ) -> Result<Workflow> {
        let write_txn = self.db.begin_write().map_err(db_err("begin write"))?;
        let updated = {
            let mut table = write_txn
                .open_table(WORKFLOW_TABLE)
                .map_err(db_err("open table"))?;

            let current = match table.get(id).map_err(db_err("get"))? {
                Some(value) => decode(id, value.value())?,
                None => return Err(StoreError::NotFound(id.to_string())),
            };

            if current.metadata.resource_version != expected_version {
                return Err(StoreError::Conflict {
                    id: id.to_string(),
                    expected: expected_version,
                    actual: current.metadata.resource_version,
                });
            }

            let mut updated = current;
            updated.status = status.clone();
            updated.metadata.resource_version += 1;
            let bytes = encode(&updated)?;
            table
                .insert(id, bytes.as_slice())
                .map_err(db_err("insert"))?;
            updated
        };
        write_txn.commit().map_err(db_err("commit"))?;
        Ok(updated)
    }

    async fn get_workflow_data(&self, id: &str) -> Result<Option<StoredWorkflowData>> {
        let read_txn = self.db.begin_read().map_err(db_err("begin read"))?;
        let data_table = read_txn
            .open_table(DATA_TABLE)
            .map_err(db_err("open table"))?;
        let meta_table = read_txn
            .open_table(DATA_META_TABLE)
            .map_err(db_err("open table"))?;

        let data = match data_table.get(id).map_err(db_err("get"))? {
            Some(value) => value.value().to_vec(),
            None => return Ok(None),
        };
        let metadata: WorkflowDataMetadata = match meta_table
            .get(id)
            .map_err(db_err("get"))?
        {
            Some(value) => serde_json::from_slice(value.value())
                .map_err(|e| StoreError::Serialization(format!("data metadata {}: {}", id, e)))?,
            None => {
                return Err(StoreError::Database(format!(
                    "workflow data for {} has no metadata",
                    id
                )))
            }
        };

        Ok(Some(StoredWorkflowData { data, metadata }))
    }

    async fn put_workflow_data(&self, id: &str, data: &StoredWorkflowData) -> Result<()> {
        let meta = serde_json::to_vec(&data.metadata)
            .map_err(|e| StoreError::Serialization(format!("failed to serialize: {}", e)))?;

        let write_txn = self.db.begin_write().map_err(db_err("begin write"))?;
        {
            let mut data_table = write_txn
                .open_table(DATA_TABLE)
                .map_err(db_err("open table"))?;
            data_table
                .insert(id, data.data.as_slice())
                .map_err(db_err("insert"))?;

            let mut meta_table = write_txn
                .open_table(DATA_META_TABLE)
                .map_err(db_err("open table"))?;
            meta_table
                .insert(id, meta.as_slice())
                .map_err(db_err("insert"))?;
        }
        write_txn.commit().map_err(db_err("commit"))?;
        Ok(())
    }
}
