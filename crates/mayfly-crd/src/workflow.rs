//! Workflow resource
//!
//! A Workflow is one provisioning run: an ordered list of tasks, each bound
//! to a single worker, each holding an ordered list of container actions.
//! Actions run strictly in (task order, action order). The orchestrator owns
//! every mutable field under `status`.

use crate::wire::WorkflowContext;
use crate::{CrdError, ObjectMeta, Result, State, TypeMeta};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Workflow resource representing a provisioning job
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    #[serde(flatten)]
    pub type_meta: TypeMeta,

    pub metadata: ObjectMeta,

    pub spec: WorkflowSpec,

    #[serde(default)]
    pub status: WorkflowStatus,
}

/// References to the objects this workflow was rendered from
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSpec {
    pub template_ref: String,

    #[serde(default)]
    pub hardware_ref: String,

    /// Template variables used at render time, e.g. {"device_1": "00:11:22:33:44:55"}
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub hardware_map: HashMap<String, String>,
}

/// Workflow status sub-resource
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStatus {
    #[serde(default)]
    pub state: State,

    /// Seconds; 0 means unbounded
    #[serde(default)]
    pub global_timeout: u64,

    /// Set on the first Running report
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// Last action any agent reported on, unset until the first report
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<CurrentState>,

    #[serde(default)]
    pub tasks: Vec<Task>,
}

/// Cursor recorded by the orchestrator after each accepted report
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CurrentState {
    pub worker_id: String,
    pub task_name: String,
    pub action_name: String,
    pub action_index: usize,
    pub state: State,
}

/// A named group of actions bound to one worker
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub name: String,

    /// Identity of the agent that runs every action of this task
    pub worker_addr: String,

    /// Volumes mounted into every action of this task
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<String>,

    /// Environment defaults, overridden by action-level values
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub environment: HashMap<String, String>,

    pub actions: Vec<Action>,
}

impl Task {
    pub fn new(name: impl Into<String>, worker_addr: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            worker_addr: worker_addr.into(),
            volumes: Vec::new(),
            environment: HashMap::new(),
            actions: Vec::new(),
        }
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    pub fn with_volume(mut self, volume: impl Into<String>) -> Self {
        self.volumes.push(volume.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(CrdError::MissingField("name".to_string()));
        }
        if self.worker_addr.is_empty() {
            return Err(CrdError::MissingField("workerAddr".to_string()));
        }
        if self.actions.is_empty() {
            return Err(CrdError::MissingField("actions".to_string()));
        }

        let mut seen = HashSet::new();
        for (i, action) in self.actions.iter().enumerate() {
            action.validate().map_err(|e| CrdError::InvalidFieldValue {
                field: format!("actions[{}]", i),
                message: e.to_string(),
            })?;
            if !seen.insert(action.name.as_str()) {
                return Err(CrdError::InvalidFieldValue {
                    field: format!("actions[{}].name", i),
                    message: format!("duplicate action name '{}'", action.name),
                });
            }
        }
        Ok(())
    }
}

/// One container invocation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    pub name: String,

    pub image: String,

    /// Seconds; 0 means the executor's large default bound
    #[serde(default)]
    pub timeout: u64,

    /// Overrides the image's default command when non-empty
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,

    /// Reaction container command run when the action times out
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub on_timeout: Vec<String>,

    /// Reaction container command run when the action fails
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub on_failure: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<String>,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub environment: HashMap<String, String>,

    /// PID namespace hint, passed to the container runtime verbatim
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

impl Action {
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            timeout: 0,
            command: Vec::new(),
            on_timeout: Vec::new(),
            on_failure: Vec::new(),
            volumes: Vec::new(),
            environment: HashMap::new(),
            pid: None,
            status: State::Pending,
            started_at: None,
            seconds: 0,
            message: String::new(),
        }
    }

    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout = seconds;
        self
    }

    pub fn with_command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command = command.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_on_timeout<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.on_timeout = command.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_on_failure<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.on_failure = command.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    pub fn with_volume(mut self, volume: impl Into<String>) -> Self {
        self.volumes.push(volume.into());
        self
    }

    pub fn with_pid(mut self, pid: impl Into<String>) -> Self {
        self.pid = Some(pid.into());
        self
    }

    fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(CrdError::MissingField("name".to_string()));
        }
        if self.image.is_empty() {
            return Err(CrdError::MissingField("image".to_string()));
        }
        Ok(())
    }

    /// Whether the status may move to `next`.
    ///
    /// Legal edges are Pending -> Running -> {Success, Failed, Timeout}.
    /// Running -> Running (an agent resuming) and a repeated terminal state
    /// are accepted as no-op edges.
    pub fn can_transition_to(&self, next: State) -> bool {
        match (self.status, next) {
            (State::Pending, State::Running) => true,
            (State::Running, State::Running) => true,
            (State::Running, to) if to.is_terminal() => true,
            (from, to) if from == to && from.is_terminal() => true,
            _ => false,
        }
    }

    /// Seconds elapsed since StartedAt, zero if the action never started
    pub fn elapsed_seconds(&self, now: DateTime<Utc>) -> u64 {
        self.started_at
            .map(|started| now.signed_duration_since(started).num_seconds().max(0) as u64)
            .unwrap_or(0)
    }
}

impl Workflow {
    /// Create a new, empty Workflow
    pub fn new(
        name: impl Into<String>,
        template_ref: impl Into<String>,
        hardware_ref: impl Into<String>,
    ) -> Self {
        Self {
            type_meta: TypeMeta::workflow(),
            metadata: ObjectMeta::new(name),
            spec: WorkflowSpec {
                template_ref: template_ref.into(),
                hardware_ref: hardware_ref.into(),
                hardware_map: HashMap::new(),
            },
            status: WorkflowStatus::default(),
        }
    }

    pub fn with_task(mut self, task: Task) -> Self {
        self.status.tasks.push(task);
        self
    }

    pub fn with_global_timeout(mut self, seconds: u64) -> Self {
        self.status.global_timeout = seconds;
        self
    }

    /// The workflow id used on the wire
    pub fn id(&self) -> &str {
        &self.metadata.name
    }

    /// Validate the workflow
    pub fn validate(&self) -> Result<()> {
        if self.metadata.name.is_empty() {
            return Err(CrdError::MissingField("metadata.name".to_string()));
        }

        if self.status.tasks.is_empty() {
            return Err(CrdError::MissingField("status.tasks".to_string()));
        }

        let mut seen = HashSet::new();
        for (i, task) in self.status.tasks.iter().enumerate() {
            task.validate().map_err(|e| CrdError::InvalidFieldValue {
                field: format!("status.tasks[{}]", i),
                message: e.to_string(),
            })?;
            if !seen.insert(task.name.as_str()) {
                return Err(CrdError::InvalidFieldValue {
                    field: format!("status.tasks[{}].name", i),
                    message: format!("duplicate task name '{}'", task.name),
                });
            }
        }

        Ok(())
    }

    pub fn state(&self) -> State {
        self.status.state
    }

    /// Failed, Timeout or Success
    pub fn is_terminal(&self) -> bool {
        self.status.state.is_terminal()
    }

    /// Whether any task is bound to `worker_id`
    pub fn involves_worker(&self, worker_id: &str) -> bool {
        self.status.tasks.iter().any(|t| t.worker_addr == worker_id)
    }

    pub fn total_actions(&self) -> usize {
        self.status.tasks.iter().map(|t| t.actions.len()).sum()
    }

    /// All actions in execution order with their global index
    pub fn actions(&self) -> impl Iterator<Item = (usize, &Task, &Action)> {
        self.status
            .tasks
            .iter()
            .flat_map(|task| task.actions.iter().map(move |action| (task, action)))
            .enumerate()
            .map(|(index, (task, action))| (index, task, action))
    }

    /// Task and action at a global index
    pub fn action_at(&self, index: usize) -> Option<(&Task, &Action)> {
        self.actions()
            .nth(index)
            .map(|(_, task, action)| (task, action))
    }

    /// Global index of the action at (task_idx, action_idx)
    pub fn global_index(&self, task_idx: usize, action_idx: usize) -> usize {
        self.status.tasks[..task_idx]
            .iter()
            .map(|t| t.actions.len())
            .sum::<usize>()
            + action_idx
    }

    pub fn find_task(&self, task_name: &str) -> Option<usize> {
        self.status.tasks.iter().position(|t| t.name == task_name)
    }

    pub fn find_action(&self, task_idx: usize, action_name: &str) -> Option<usize> {
        self.status
            .tasks
            .get(task_idx)
            .and_then(|t| t.actions.iter().position(|a| a.name == action_name))
    }

    pub fn is_last_action(&self, index: usize) -> bool {
        index + 1 == self.total_actions()
    }

    /// Global index of the action the orchestrator expects to hear about
    /// next, or None once the workflow can no longer advance.
    pub fn expected_action_index(&self) -> Option<usize> {
        if self.is_terminal() {
            return None;
        }
        match &self.status.current {
            None => (self.total_actions() > 0).then_some(0),
            Some(current) => match current.state {
                State::Pending | State::Running => Some(current.action_index),
                State::Success if !self.is_last_action(current.action_index) => {
                    Some(current.action_index + 1)
                }
                _ => None,
            },
        }
    }

    /// Cursor handed to agents, derived from the stored status
    pub fn context(&self) -> WorkflowContext {
        let (current_worker, current_task, current_action, current_action_index, current_action_state) =
            match &self.status.current {
                Some(c) => (
                    c.worker_id.clone(),
                    c.task_name.clone(),
                    c.action_name.clone(),
                    c.action_index,
                    c.state,
                ),
                None => (String::new(), String::new(), String::new(), 0, State::Pending),
            };

        WorkflowContext {
            workflow_id: self.metadata.name.clone(),
            current_worker,
            current_task,
            current_action,
            current_action_index,
            current_action_state,
            total_number_of_actions: self.total_actions(),
        }
    }
}
