//! Versioned converters between stored schemas and the canonical model
//!
//! Only `decode_workflow` and `to_legacy` know that more than one shape
//! exists. Everything past the store boundary sees [`Workflow`].

use crate::{
    Action, CrdError, CurrentState, ObjectMeta, Result, State, Task, TypeMeta, Workflow,
    WorkflowSpec, WorkflowStatus, API_VERSION,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// apiVersion of Tinkerbell-shaped workflows
pub const LEGACY_API_VERSION: &str = "tinkerbell.org/v1alpha1";

/// Workflow in the Tinkerbell v1alpha1 shape
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LegacyWorkflow {
    pub api_version: String,
    pub kind: String,
    pub metadata: ObjectMeta,
    pub spec: LegacyWorkflowSpec,
    #[serde(default)]
    pub status: LegacyWorkflowStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct LegacyWorkflowSpec {
    pub template_ref: String,
    #[serde(default)]
    pub hardware_ref: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub hardware_map: HashMap<String, String>,
}

/// Flat cursor fields instead of a nested current state
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct LegacyWorkflowStatus {
    #[serde(default)]
    pub state: State,
    #[serde(default)]
    pub current_action: String,
    #[serde(default)]
    pub current_action_index: usize,
    #[serde(default)]
    pub current_action_state: State,
    #[serde(default)]
    pub current_worker: String,
    #[serde(default)]
    pub current_task: String,
    #[serde(default)]
    pub total_number_of_actions: usize,
    #[serde(default)]
    pub global_timeout: u64,
    #[serde(default)]
    pub tasks: Vec<LegacyTask>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LegacyTask {
    pub name: String,
    pub worker_addr: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub environment: HashMap<String, String>,
    #[serde(default)]
    pub actions: Vec<LegacyAction>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LegacyAction {
    pub name: String,
    pub image: String,
    #[serde(default)]
    pub timeout: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub on_timeout: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub on_failure: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub environment: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<String>,
    #[serde(default)]
    pub status: State,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub seconds: u64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

impl From<LegacyAction> for Action {
    fn from(a: LegacyAction) -> Self {
        Self {
            name: a.name,
            image: a.image,
            timeout: a.timeout,
            command: a.command,
            on_timeout: a.on_timeout,
            on_failure: a.on_failure,
            volumes: a.volumes,
            environment: a.environment,
            pid: a.pid,
            status: a.status,
            started_at: a.started_at,
            seconds: a.seconds,
            message: a.message,
        }
    }
}

impl From<&Action> for LegacyAction {
    fn from(a: &Action) -> Self {
        Self {
            name: a.name.clone(),
            image: a.image.clone(),
            timeout: a.timeout,
            command: a.command.clone(),
            on_timeout: a.on_timeout.clone(),
            on_failure: a.on_failure.clone(),
            volumes: a.volumes.clone(),
            environment: a.environment.clone(),
            pid: a.pid.clone(),
            status: a.status,
            started_at: a.started_at,
            seconds: a.seconds,
            message: a.message.clone(),
        }
    }
}

impl From<LegacyTask> for Task {
    fn from(t: LegacyTask) -> Self {
        Self {
            name: t.name,
            worker_addr: t.worker_addr,
            volumes: t.volumes,
            environment: t.environment,
            actions: t.actions.into_iter().map(Action::from).collect(),
        }
    }
}

impl From<&Task> for LegacyTask {
    fn from(t: &Task) -> Self {
        Self {
            name: t.name.clone(),
            worker_addr: t.worker_addr.clone(),
            volumes: t.volumes.clone(),
            environment: t.environment.clone(),
            actions: t.actions.iter().map(LegacyAction::from).collect(),
        }
    }
}

impl From<LegacyWorkflow> for Workflow {
    fn from(legacy: LegacyWorkflow) -> Self {
        let status = legacy.status;
        let tasks: Vec<Task> = status.tasks.into_iter().map(Task::from).collect();

        // The legacy shape has no workflow-level start time.
        let started_at = tasks
            .iter()
            .flat_map(|t| t.actions.iter())
            .filter_map(|a| a.started_at)
            .min();

        let current = (!status.current_action.is_empty()).then(|| CurrentState {
            worker_id: status.current_worker,
            task_name: status.current_task,
            action_name: status.current_action,
            action_index: status.current_action_index,
            state: status.current_action_state,
        });

        Self {
            type_meta: TypeMeta::workflow(),
            metadata: legacy.metadata,
            spec: WorkflowSpec {
                template_ref: legacy.spec.template_ref,
                hardware_ref: legacy.spec.hardware_ref,
                hardware_map: legacy.spec.hardware_map,
            },
            status: WorkflowStatus {
                state: status.state,
                global_timeout: status.global_timeout,
                started_at,
                current,
                tasks,
            },
        }
    }
}

/// Render a canonical workflow in the legacy shape
pub fn to_legacy(workflow: &Workflow) -> LegacyWorkflow {
    let ctx = workflow.context();
    LegacyWorkflow {
        api_version: LEGACY_API_VERSION.to_string(),
        kind: "Workflow".to_string(),
        metadata: workflow.metadata.clone(),
        spec: LegacyWorkflowSpec {
            template_ref: workflow.spec.template_ref.clone(),
            hardware_ref: workflow.spec.hardware_ref.clone(),
            hardware_map: workflow.spec.hardware_map.clone(),
        },
        status: LegacyWorkflowStatus {
            state: workflow.status.state,
            current_action: ctx.current_action,
            current_action_index: ctx.current_action_index,
            current_action_state: ctx.current_action_state,
            current_worker: ctx.current_worker,
            current_task: ctx.current_task,
            total_number_of_actions: ctx.total_number_of_actions,
            global_timeout: workflow.status.global_timeout,
            tasks: workflow.status.tasks.iter().map(LegacyTask::from).collect(),
        },
    }
}

/// Decode a stored or submitted workflow of any supported apiVersion.
///
/// A missing apiVersion is read as canonical.
pub fn decode_workflow(value: serde_json::Value) -> Result<Workflow> {
    let api_version = value
        .get("apiVersion")
        .and_then(|v| v.as_str())
        .unwrap_or(API_VERSION)
        .to_string();

    match api_version.as_str() {
        API_VERSION => {
            let mut value = value;
            if let Some(obj) = value.as_object_mut() {
                obj.entry("apiVersion")
                    .or_insert_with(|| API_VERSION.into());
                obj.entry("kind").or_insert_with(|| "Workflow".into());
            }
            Ok(serde_json::from_value(value)?)
        }
        LEGACY_API_VERSION => {
            let legacy: LegacyWorkflow = serde_json::from_value(value)?;
            Ok(legacy.into())
        }
        other => Err(CrdError::UnsupportedApiVersion(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn legacy_json() -> serde_json::Value {
        json!({
            "apiVersion": "tinkerbell.org/v1alpha1",
            "kind": "Workflow",
            "metadata": { "name": "wf-legacy", "resourceVersion": 3 },
            "spec": { "templateRef": "debian", "hardwareRef": "machine-7" },
            "status": {
                "state": "STATE_RUNNING",
                "currentAction": "stream",
                "currentActionIndex": 1,
                "currentActionState": "STATE_RUNNING",
                "currentWorker": "W1",
                "currentTask": "disk",
                "totalNumberOfActions": 2,
                "globalTimeout": 1800,
                "tasks": [{
                    "name": "disk",
                    "workerAddr": "W1",
                    "actions": [
                        { "name": "wipe", "image": "wipe:v1", "timeout": 60,
                          "status": "STATE_SUCCESS", "startedAt": "2024-05-01T10:00:00Z", "seconds": 4 },
                        { "name": "stream", "image": "image2disk:v1", "timeout": 600,
                          "status": "STATE_RUNNING", "startedAt": "2024-05-01T10:00:05Z" }
                    ]
                }]
            }
        })
    }

    #[test]
    fn test_decode_legacy_workflow() {
        let wf = decode_workflow(legacy_json()).unwrap();
        assert_eq!(wf.type_meta.api_version, API_VERSION);
        assert_eq!(wf.id(), "wf-legacy");
        assert_eq!(wf.metadata.resource_version, 3);
        assert_eq!(wf.state(), State::Running);
        assert_eq!(wf.status.global_timeout, 1800);

        let current = wf.status.current.as_ref().unwrap();
        assert_eq!(current.action_name, "stream");
        assert_eq!(current.action_index, 1);
        assert_eq!(current.worker_id, "W1");
        assert_eq!(current.state, State::Running);

        let started = wf.status.started_at.unwrap();
        assert_eq!(started.to_rfc3339(), "2024-05-01T10:00:00+00:00");
    }

    #[test]
    fn test_unstarted_legacy_has_no_cursor() {
        let mut value = legacy_json();
        let status = value["status"].as_object_mut().unwrap();
        status.insert("currentAction".into(), json!(""));
        status.insert("state".into(), json!("STATE_PENDING"));

        let wf = decode_workflow(value).unwrap();
        assert!(wf.status.current.is_none());
        assert_eq!(wf.expected_action_index(), Some(0));
    }

    #[test]
    fn test_legacy_roundtrip_preserves_cursor() {
        let wf = decode_workflow(legacy_json()).unwrap();
        let legacy = to_legacy(&wf);
        assert_eq!(legacy.api_version, LEGACY_API_VERSION);
        assert_eq!(legacy.status.current_action, "stream");
        assert_eq!(legacy.status.current_action_index, 1);
        assert_eq!(legacy.status.total_number_of_actions, 2);
        assert_eq!(legacy.status.tasks[0].worker_addr, "W1");

        let back: Workflow = legacy.into();
        assert_eq!(back, wf);
    }

    #[test]
    fn test_decode_canonical_without_type_meta() {
        let value = json!({
            "metadata": { "name": "wf-1" },
            "spec": { "templateRef": "ubuntu" },
            "status": {
                "globalTimeout": 60,
                "tasks": [{ "name": "t", "workerAddr": "W1",
                            "actions": [{ "name": "a", "image": "img" }] }]
            }
        });
        let wf = decode_workflow(value).unwrap();
        assert_eq!(wf.type_meta.kind, "Workflow");
        assert_eq!(wf.state(), State::Pending);
        assert_eq!(wf.total_actions(), 1);
    }

    #[test]
    fn test_decode_rejects_unknown_api_version() {
        let value = json!({ "apiVersion": "example.com/v9", "metadata": { "name": "x" } });
        assert!(matches!(
            decode_workflow(value),
            Err(CrdError::UnsupportedApiVersion(v)) if v == "example.com/v9"
        ));
    }

    #[test]
    fn test_decode_rejects_unknown_state() {
        let mut value = legacy_json();
        value["status"]["state"] = json!("STATE_WEIRD");
        assert!(matches!(
            decode_workflow(value),
            Err(CrdError::Serialization(_))
        ));
    }
}
