//! Store contract tests, run against every backend

use super::*;
use chrono::Utc;
use mayfly_crd::{Action, State, Task, Workflow, WorkflowDataMetadata};
use serde_json::json;
use std::sync::Arc;

/// Memory and ReDB stores, the latter in a throwaway directory
fn create_test_stores() -> Vec<(&'static str, Arc<dyn WorkflowStore>)> {
    let mut stores: Vec<(&'static str, Arc<dyn WorkflowStore>)> =
        vec![("memory", Arc::new(MemoryStateStore::new()))];

    let tmp = tempfile::tempdir().expect("failed to create temp dir");
    let redb_path = tmp.path().join("test.redb");
    // Leak the tempdir so it lives for the test duration
    let _tmp = Box::leak(Box::new(tmp));
    stores.push((
        "redb",
        Arc::new(RedbStateStore::open(&redb_path).expect("failed to open redb")),
    ));

    stores
}

fn workflow(name: &str) -> Workflow {
    Workflow::new(name, "ubuntu", "machine-1").with_task(
        Task::new("disk", "W1").with_action(Action::new("wipe", "wipe:v1").with_timeout(60)),
    )
}

fn metadata(sha: &str) -> WorkflowDataMetadata {
    WorkflowDataMetadata {
        worker_id: "W1".to_string(),
        task_name: "disk".to_string(),
        action_name: "wipe".to_string(),
        created_at: Utc::now(),
        sha_sum: sha.to_string(),
    }
}

#[tokio::test]
async fn test_create_and_get() {
    for (name, store) in create_test_stores() {
        assert!(store.get_workflow("wf-1").await.unwrap().is_none(), "{}", name);

        let created = store.create_workflow(&workflow("wf-1")).await.unwrap();
        assert_eq!(created.metadata.resource_version, 1, "{}", name);
        assert!(created.metadata.uid.is_some(), "{}", name);

        let fetched = store.get_workflow("wf-1").await.unwrap().unwrap();
        assert_eq!(fetched, created, "{}: stored workflow should round-trip", name);
    }
}

#[tokio::test]
async fn test_create_duplicate_rejected() {
    for (name, store) in create_test_stores() {
        store.create_workflow(&workflow("wf-1")).await.unwrap();
        let err = store.create_workflow(&workflow("wf-1")).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)), "{}: {:?}", name, err);
    }
}

#[tokio::test]
async fn test_list_is_ordered_by_id() {
    for (name, store) in create_test_stores() {
        for id in ["wf-c", "wf-a", "wf-b"] {
            store.create_workflow(&workflow(id)).await.unwrap();
        }
        let ids: Vec<_> = store
            .list_workflows()
            .await
            .unwrap()
            .into_iter()
            .map(|w| w.metadata.name)
            .collect();
        assert_eq!(ids, vec!["wf-a", "wf-b", "wf-c"], "{}", name);
    }
}

#[tokio::test]
async fn test_update_status_bumps_version() {
    for (name, store) in create_test_stores() {
        let created = store.create_workflow(&workflow("wf-1")).await.unwrap();

        let mut status = created.status.clone();
        status.state = State::Running;
        let updated = store.update_status("wf-1", &status, 1).await.unwrap();
        assert_eq!(updated.metadata.resource_version, 2, "{}", name);
        assert_eq!(updated.status.state, State::Running, "{}", name);

        let fetched = store.get_workflow("wf-1").await.unwrap().unwrap();
        assert_eq!(fetched.metadata.resource_version, 2, "{}", name);
        assert_eq!(fetched.spec, created.spec, "{}: spec is untouched", name);
    }
}

#[tokio::test]
async fn test_update_status_rejects_stale_version() {
    for (name, store) in create_test_stores() {
        let created = store.create_workflow(&workflow("wf-1")).await.unwrap();
        let mut status = created.status.clone();
        status.state = State::Running;
        store.update_status("wf-1", &status, 1).await.unwrap();

        status.state = State::Failed;
        let err = store.update_status("wf-1", &status, 1).await.unwrap_err();
        assert!(
            matches!(err, StoreError::Conflict { expected: 1, actual: 2, .. }),
            "{}: {:?}",
            name,
            err
        );

        let fetched = store.get_workflow("wf-1").await.unwrap().unwrap();
        assert_eq!(fetched.status.state, State::Running, "{}: no mutation", name);
    }
}

#[tokio::test]
async fn test_update_status_unknown_workflow() {
    for (name, store) in create_test_stores() {
        let err = store
            .update_status("nope", &Default::default(), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)), "{}: {:?}", name, err);
    }
}

#[tokio::test]
async fn test_workflow_data_round_trip() {
    for (name, store) in create_test_stores() {
        assert!(store.get_workflow_data("wf-1").await.unwrap().is_none(), "{}", name);

        let blob = StoredWorkflowData {
            data: br#"{"disk":"/dev/sda"}"#.to_vec(),
            metadata: metadata("abc123"),
        };
        store.put_workflow_data("wf-1", &blob).await.unwrap();
        let fetched = store.get_workflow_data("wf-1").await.unwrap().unwrap();
        assert_eq!(fetched, blob, "{}: data should be byte-identical", name);

        let newer = StoredWorkflowData {
            data: br#"{"disk":"/dev/nvme0n1"}"#.to_vec(),
            metadata: metadata("def456"),
        };
        store.put_workflow_data("wf-1", &newer).await.unwrap();
        let fetched = store.get_workflow_data("wf-1").await.unwrap().unwrap();
        assert_eq!(fetched.metadata.sha_sum, "def456", "{}", name);
    }
}

#[tokio::test]
async fn test_redb_decodes_legacy_records() {
    let tmp = tempfile::tempdir().unwrap();
    let store = RedbStateStore::open(tmp.path().join("legacy.redb")).unwrap();

    store
        .put_raw(
            "wf-old",
            &json!({
                "apiVersion": "tinkerbell.org/v1alpha1",
                "kind": "Workflow",
                "metadata": { "name": "wf-old", "resourceVersion": 4 },
                "spec": { "templateRef": "debian" },
                "status": {
                    "state": "STATE_PENDING",
                    "tasks": [{ "name": "t", "workerAddr": "W1",
                                "actions": [{ "name": "a", "image": "img" }] }]
                }
            }),
        )
        .unwrap();

    let wf = store.get_workflow("wf-old").await.unwrap().unwrap();
    assert_eq!(wf.type_meta.api_version, mayfly_crd::API_VERSION);
    assert_eq!(wf.metadata.resource_version, 4);
    assert_eq!(wf.status.tasks[0].worker_addr, "W1");

    // Status writes persist the canonical shape from then on.
    let updated = store.update_status("wf-old", &wf.status, 4).await.unwrap();
    assert_eq!(updated.metadata.resource_version, 5);
}

#[tokio::test]
async fn test_redb_survives_reopen() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("persist.redb");
    {
        let store = RedbStateStore::open(&path).unwrap();
        store.create_workflow(&workflow("wf-1")).await.unwrap();
    }
    let store = RedbStateStore::open(&path).unwrap();
    assert!(store.get_workflow("wf-1").await.unwrap().is_some());
}
