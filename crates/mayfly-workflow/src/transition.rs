//! Orchestrator state transition function
//!
//! Validates one agent report against the stored workflow and applies it in
//! place. A rejected report leaves the workflow untouched.

use crate::error::{Result, WorkflowError};
use chrono::{DateTime, Utc};
use mayfly_crd::{ActionStatusReport, CurrentState, State, Workflow};

/// What applying a report did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Changed,
    /// Exact repeat of an already-applied terminal report
    Unchanged,
}

/// Apply `report` to `workflow` at server time `now`
pub fn apply(workflow: &mut Workflow, report: &ActionStatusReport, now: DateTime<Utc>) -> Result<Applied> {
    let reported = report.action_status;
    if reported == State::Pending {
        return Err(WorkflowError::InvalidArgument(
            "STATE_PENDING is not a reportable action state".to_string(),
        ));
    }

    let task_idx = workflow
        .find_task(&report.task_name)
        .ok_or_else(|| WorkflowError::TaskNotFound(report.task_name.clone()))?;
    let action_idx = workflow
        .find_action(task_idx, &report.action_name)
        .ok_or_else(|| WorkflowError::ActionNotFound(report.action_name.clone()))?;
    let index = workflow.global_index(task_idx, action_idx);

    let task = &workflow.status.tasks[task_idx];
    if task.worker_addr != report.worker_id {
        return Err(WorkflowError::InvalidArgument(format!(
            "task '{}' is assigned to worker '{}', not '{}'",
            task.name, task.worker_addr, report.worker_id
        )));
    }

    if let Some(current) = &workflow.status.current {
        if current.action_index == index && current.state == reported && reported.is_terminal() {
            return Ok(Applied::Unchanged);
        }
    }

    if workflow.is_terminal() {
        return Err(WorkflowError::WorkflowTerminal {
            id: workflow.id().to_string(),
            state: workflow.state(),
        });
    }

    check_cursor(workflow, index, reported, report)?;

    let action = &workflow.status.tasks[task_idx].actions[action_idx];
    if !action.can_transition_to(reported) {
        return Err(WorkflowError::InvalidTransition {
            action: action.name.clone(),
            from: action.status,
            to: reported,
        });
    }

    let is_last = workflow.is_last_action(index);
    let action = &mut workflow.status.tasks[task_idx].actions[action_idx];
    action.status = reported;
    if !report.message.is_empty() {
        action.message = report.message.clone();
    }

    match reported {
        State::Running => {
            action.started_at.get_or_insert(now);
            workflow.status.state = State::Running;
            workflow.status.started_at.get_or_insert(now);
        }
        State::Success => {
            action.seconds = elapsed_or_reported(action.started_at, report.seconds, now);
            if is_last {
                workflow.status.state = State::Success;
            }
        }
        failure if failure.is_failure() => {
            action.seconds = elapsed_or_reported(action.started_at, report.seconds, now);
            workflow.status.state = failure;
        }
        _ => {}
    }

    workflow.status.current = Some(CurrentState {
        worker_id: report.worker_id.clone(),
        task_name: report.task_name.clone(),
        action_name: report.action_name.clone(),
        action_index: index,
        state: reported,
    });

    Ok(Applied::Changed)
}

fn check_cursor(workflow: &Workflow, index: usize, reported: State, report: &ActionStatusReport) -> Result<()> {
    let mismatch = |expected: String| {
        WorkflowError::CursorMismatch(format!(
            "reported {}/{} ({}), expected {}",
            report.task_name, report.action_name, reported, expected
        ))
    };

    if reported == State::Running {
        return match workflow.expected_action_index() {
            Some(expected) if expected == index => Ok(()),
            Some(expected) => Err(mismatch(describe(workflow, expected))),
            None => Err(mismatch("no further actions".to_string())),
        };
    }

    match &workflow.status.current {
        Some(current) if current.action_index == index && current.state == State::Running => Ok(()),
        Some(current) => Err(mismatch(format!(
            "terminal report for running action {}/{}",
            current.task_name, current.action_name
        ))),
        None => Err(mismatch("a running report first".to_string())),
    }
}

fn describe(workflow: &Workflow, index: usize) -> String {
    workflow
        .action_at(index)
        .map(|(task, action)| format!("{}/{}", task.name, action.name))
        .unwrap_or_else(|| format!("action #{}", index))
}

fn elapsed_or_reported(started_at: Option<DateTime<Utc>>, reported: u64, now: DateTime<Utc>) -> u64 {
    match started_at {
        Some(started) => now.signed_duration_since(started).num_seconds().max(0) as u64,
        None => reported,
    }
}
