//! Mayfly Workflow Orchestration
//!
//! The authoritative side of the workflow protocol. Agents report what they
//! did; this crate decides whether the report is acceptable and what the
//! stored workflow becomes.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │              Orchestrator                            │
//! │   contexts | actions | status | workflow data        │
//! │                      │                               │
//! │                      ▼                               │
//! │  ┌─────────────────────────────────────────────┐    │
//! │  │   transition::apply   watchdog::check        │    │
//! │  └─────────────────────────────────────────────┘    │
//! │                      │                               │
//! │                      ▼                               │
//! │  ┌─────────────────────────────────────────────┐    │
//! │  │          WorkflowStore                      │    │
//! │  │   Memory | ReDB                             │    │
//! │  └─────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use mayfly_workflow::{MemoryStateStore, Orchestrator};
//! use std::sync::Arc;
//!
//! let orchestrator = Orchestrator::new(Arc::new(MemoryStateStore::new()));
//! let contexts = orchestrator.get_workflow_contexts("W1").await?;
//! ```

pub mod error;
pub mod service;
pub mod store;
pub mod transition;
pub mod watchdog;

pub use error::*;
pub use service::*;
pub use store::{MemoryStateStore, RedbStateStore, StoreError, StoredWorkflowData, WorkflowStore};
pub use transition::{apply, Applied};
pub use watchdog::{check_timeouts, Watchdog};
