//! Turn arbitration
//!
//! Exactly one agent may advance a workflow at a time. Each agent derives
//! from the shared context whether that agent is itself.

use mayfly_crd::{State, WorkflowAction, WorkflowContext};

/// Outcome of arbitration for one workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Turn {
    /// This agent runs the action at the index
    Take(usize),
    /// The action at the index belongs to another worker
    Wait(usize),
    /// Nothing left to run
    Finished,
}

/// Decide whose turn it is for `ctx`
pub fn next_turn(ctx: &WorkflowContext, actions: &[WorkflowAction], worker_id: &str) -> Turn {
    let cursor = if !ctx.has_started() {
        0
    } else {
        match ctx.current_action_state {
            State::Success if ctx.current_action_index + 1 < ctx.total_number_of_actions => {
                ctx.current_action_index + 1
            }
            State::Success | State::Failed | State::Timeout => return Turn::Finished,
            State::Pending | State::Running => ctx.current_action_index,
        }
    };

    match actions.get(cursor) {
        Some(action) if action.worker_id == worker_id => Turn::Take(cursor),
        Some(_) => Turn::Wait(cursor),
        None => Turn::Finished,
    }
}
