//! Mayfly CRD Types
//!
//! Canonical data model for bare metal provisioning workflows, plus the
//! messages exchanged between the orchestrator and its agents.
//!
//! # API Group
//!
//! Canonical objects use the `mayfly.metal/v1` API group. Objects written in
//! the older Tinkerbell `v1alpha1` shape are converted at the store boundary
//! (see [`convert`]), so nothing past the boundary branches on schema version.
//!
//! # Resources
//!
//! - `Workflow` - one provisioning run: ordered tasks, each bound to a worker
//! - `WorkflowContext` - the cursor agents use to decide whose turn it is
//! - `ActionStatusReport` - the agent -> orchestrator status message
//!
//! # Credit
//!
//! Inspired by Tinkerbell (tinkerbell.org) bare metal provisioning system.

pub mod convert;
pub mod error;
pub mod metadata;
pub mod state;
pub mod wire;
pub mod workflow;

pub use convert::*;
pub use error::*;
pub use metadata::*;
pub use state::*;
pub use wire::*;
pub use workflow::*;

/// API version for canonical Mayfly objects
pub const API_VERSION: &str = "mayfly.metal/v1";

/// API group for all Mayfly objects
pub const API_GROUP: &str = "mayfly.metal";

/// API version string
pub const VERSION: &str = "v1";

/// Path inside every action container where the workflow scratch
/// directory is mounted
pub const WORKFLOW_MOUNT_PATH: &str = "/workflow";

/// Name of the workflow data file inside the scratch directory
pub const WORKFLOW_DATA_FILE: &str = "data";

/// Default upper bound for a workflow data blob, in bytes
pub const DEFAULT_MAX_WORKFLOW_DATA_SIZE: usize = 10 * 1024 * 1024;
