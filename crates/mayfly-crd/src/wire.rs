//! Messages exchanged between the orchestrator and its agents

use crate::{Action, State, Task};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Snapshot of a workflow's cursor, as seen by an agent
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkflowContext {
    pub workflow_id: String,
    pub current_worker: String,
    pub current_task: String,
    pub current_action: String,
    pub current_action_index: usize,
    pub current_action_state: State,
    pub total_number_of_actions: usize,
}

impl WorkflowContext {
    /// True once any action has been reported on
    pub fn has_started(&self) -> bool {
        !self.current_action.is_empty()
    }

    /// True when the cursor sits on the final action and it is terminal
    pub fn is_finished(&self) -> bool {
        self.has_started()
            && self.current_action_state.is_terminal()
            && self.current_action_index + 1 == self.total_number_of_actions
    }
}

/// Executable view of one action, flattened out of its task
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkflowAction {
    pub task_name: String,
    pub name: String,
    pub image: String,
    pub timeout: u64,
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub on_timeout: Vec<String>,
    #[serde(default)]
    pub on_failure: Vec<String>,
    pub worker_id: String,
    /// Task volumes followed by action volumes
    #[serde(default)]
    pub volumes: Vec<String>,
    /// Sorted `KEY=VALUE` pairs; action values override task defaults
    #[serde(default)]
    pub environment: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<String>,
}

impl WorkflowAction {
    pub fn from_task_action(task: &Task, action: &Action) -> Self {
        let mut env: BTreeMap<&str, &str> = task
            .environment
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        for (k, v) in &action.environment {
            env.insert(k.as_str(), v.as_str());
        }

        Self {
            task_name: task.name.clone(),
            name: action.name.clone(),
            image: action.image.clone(),
            timeout: action.timeout,
            command: action.command.clone(),
            on_timeout: action.on_timeout.clone(),
            on_failure: action.on_failure.clone(),
            worker_id: task.worker_addr.clone(),
            volumes: task
                .volumes
                .iter()
                .chain(action.volumes.iter())
                .cloned()
                .collect(),
            environment: env.into_iter().map(|(k, v)| format!("{}={}", k, v)).collect(),
            pid: action.pid.clone(),
        }
    }
}

/// Agent -> orchestrator status message for one action
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActionStatusReport {
    pub workflow_id: String,
    pub task_name: String,
    pub action_name: String,
    pub action_status: State,
    /// Whole seconds the action ran, zero for a Running report
    #[serde(default)]
    pub seconds: u64,
    #[serde(default)]
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub worker_id: String,
}

impl ActionStatusReport {
    /// Report for `action` of `workflow_id` in the given state
    pub fn new(workflow_id: impl Into<String>, action: &WorkflowAction, status: State) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            task_name: action.task_name.clone(),
            action_name: action.name.clone(),
            action_status: status,
            seconds: 0,
            message: String::new(),
            created_at: Utc::now(),
            worker_id: action.worker_id.clone(),
        }
    }

    pub fn with_seconds(mut self, seconds: u64) -> Self {
        self.seconds = seconds;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}

/// Provenance of the latest workflow data blob
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkflowDataMetadata {
    pub worker_id: String,
    pub task_name: String,
    pub action_name: String,
    pub created_at: DateTime<Utc>,
    /// Hex SHA-256 of the data bytes
    pub sha_sum: String,
}

/// Hex sha256 over the blob bytes
pub fn data_checksum(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

/// Agent -> orchestrator data push
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkflowDataUpdate {
    pub workflow_id: String,
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
    pub metadata: WorkflowDataMetadata,
}

/// Orchestrator -> agent data pull
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkflowDataResponse {
    pub workflow_id: String,
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<WorkflowDataMetadata>,
}

/// Byte payloads travel as standard base64 strings inside JSON
mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded.as_bytes()).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_checksum_is_content_hash() {
        assert_eq!(
            data_checksum(b"{}"),
            "44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a"
        );
        assert_ne!(data_checksum(b"{}"), data_checksum(b"{ }"));
    }

    #[test]
    fn test_action_env_merge_and_volume_order() {
        let task = Task::new("disk", "W1")
            .with_volume("/dev:/dev")
            .with_env("MIRROR", "http://task")
            .with_env("DEST_DISK", "/dev/sda");
        let action = Action::new("stream", "image2disk:v1")
            .with_timeout(300)
            .with_volume("/lib/firmware:/lib/firmware")
            .with_env("MIRROR", "http://action")
            .with_env("COMPRESSED", "true");

        let wa = WorkflowAction::from_task_action(&task, &action);
        assert_eq!(wa.task_name, "disk");
        assert_eq!(wa.worker_id, "W1");
        assert_eq!(wa.timeout, 300);
        assert_eq!(wa.volumes, vec!["/dev:/dev", "/lib/firmware:/lib/firmware"]);
        assert_eq!(
            wa.environment,
            vec!["COMPRESSED=true", "DEST_DISK=/dev/sda", "MIRROR=http://action"]
        );
    }

    #[test]
    fn test_context_finished() {
        let mut ctx = WorkflowContext {
            workflow_id: "wf".into(),
            current_worker: "W1".into(),
            current_task: "t".into(),
            current_action: "a".into(),
            current_action_index: 1,
            current_action_state: State::Success,
            total_number_of_actions: 2,
        };
        assert!(ctx.is_finished());

        ctx.current_action_state = State::Running;
        assert!(!ctx.is_finished());

        ctx.current_action_state = State::Success;
        ctx.current_action_index = 0;
        assert!(!ctx.is_finished());
    }

    #[test]
    fn test_report_wire_format() {
        let task = Task::new("disk", "W1");
        let action = Action::new("wipe", "wipe:v1");
        let wa = WorkflowAction::from_task_action(&task, &action);
        let report = ActionStatusReport::new("wf-1", &wa, State::Success)
            .with_seconds(12)
            .with_message("finished successfully");

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["action_status"], "STATE_SUCCESS");
        assert_eq!(json["worker_id"], "W1");
        assert_eq!(json["seconds"], 12);

        let bad = r#"{"workflow_id":"wf","task_name":"t","action_name":"a",
            "action_status":"STATE_FINISHED","created_at":"2024-01-01T00:00:00Z","worker_id":"w"}"#;
        assert!(serde_json::from_str::<ActionStatusReport>(bad).is_err());
    }

    #[test]
    fn test_data_payload_is_base64() {
        let update = WorkflowDataUpdate {
            workflow_id: "wf".into(),
            data: br#"{"k":"v"}"#.to_vec(),
            metadata: WorkflowDataMetadata {
                worker_id: "W1".into(),
                task_name: "t".into(),
                action_name: "a".into(),
                created_at: Utc::now(),
                sha_sum: "abc".into(),
            },
        };
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json["data"], "eyJrIjoidiJ9");

        let back: WorkflowDataUpdate = serde_json::from_value(json).unwrap();
        assert_eq!(back.data, update.data);
    }
}
