//! Workflow and action state
//!
//! One closed enumeration serves both workflows and actions. The wire form
//! is the Tinkerbell `STATE_*` name (or its numeric code); both directions
//! are explicit and unknown values are rejected rather than defaulted.

use crate::{CrdError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle state of a workflow or of a single action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum State {
    #[default]
    Pending,
    Running,
    Failed,
    Timeout,
    Success,
}

impl State {
    /// Every state, in wire-code order
    pub const ALL: [State; 5] = [
        State::Pending,
        State::Running,
        State::Failed,
        State::Timeout,
        State::Success,
    ];

    /// Wire name of the state
    pub fn as_wire(self) -> &'static str {
        match self {
            State::Pending => "STATE_PENDING",
            State::Running => "STATE_RUNNING",
            State::Failed => "STATE_FAILED",
            State::Timeout => "STATE_TIMEOUT",
            State::Success => "STATE_SUCCESS",
        }
    }

    /// Parse a wire name
    pub fn from_wire(value: &str) -> Result<Self> {
        match value {
            "STATE_PENDING" => Ok(State::Pending),
            "STATE_RUNNING" => Ok(State::Running),
            "STATE_FAILED" => Ok(State::Failed),
            "STATE_TIMEOUT" => Ok(State::Timeout),
            "STATE_SUCCESS" => Ok(State::Success),
            other => Err(CrdError::UnknownState(other.to_string())),
        }
    }

    /// Numeric wire code
    pub fn code(self) -> i32 {
        match self {
            State::Pending => 0,
            State::Running => 1,
            State::Failed => 2,
            State::Timeout => 3,
            State::Success => 4,
        }
    }

    /// Parse a numeric wire code
    pub fn from_code(code: i32) -> Result<Self> {
        match code {
            0 => Ok(State::Pending),
            1 => Ok(State::Running),
            2 => Ok(State::Failed),
            3 => Ok(State::Timeout),
            4 => Ok(State::Success),
            other => Err(CrdError::UnknownState(other.to_string())),
        }
    }

    /// Failed, Timeout and Success are final
    pub fn is_terminal(self) -> bool {
        matches!(self, State::Failed | State::Timeout | State::Success)
    }

    /// Failed or Timeout
    pub fn is_failure(self) -> bool {
        matches!(self, State::Failed | State::Timeout)
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

impl FromStr for State {
    type Err = CrdError;

    fn from_str(s: &str) -> Result<Self> {
        State::from_wire(s)
    }
}

impl TryFrom<String> for State {
    type Error = CrdError;

    fn try_from(value: String) -> Result<Self> {
        State::from_wire(&value)
    }
}

impl From<State> for String {
    fn from(state: State) -> Self {
        state.as_wire().to_string()
    }
}
