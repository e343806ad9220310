//! Error types for the agent

use mayfly_crd::State;
use mayfly_runtime::RuntimeError;
use thiserror::Error;

/// Errors talking to the orchestrator
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The orchestrator answered with a non-success status
    #[error("orchestrator rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The orchestrator URL cannot carry a path
    #[error("invalid orchestrator URL {0}")]
    InvalidUrl(String),
}

/// Fatal outcomes of an agent run
#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("status report for {workflow}/{action} failed after {attempts} attempts: {last_error}")]
    ReportRetriesExhausted {
        workflow: String,
        action: String,
        attempts: usize,
        last_error: String,
    },

    /// The action container ran but did not succeed
    #[error("action {workflow}/{action} ended {state}: {message}")]
    ActionFailed {
        workflow: String,
        action: String,
        state: State,
        message: String,
    },

    /// The action container could not be run at all
    #[error("action {workflow}/{action} could not run: {source}")]
    Runtime {
        workflow: String,
        action: String,
        #[source]
        source: RuntimeError,
    },

    #[error("workflow data: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AgentError>;
