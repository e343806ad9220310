//! Mayfly Container Runtime
//!
//! Runs workflow actions as containers on the local machine.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │            ActionExecutor                │
//! │  pull -> create -> start -> wait -> rm   │
//! │  on-timeout / on-failure reactions       │
//! └─────────────────────────────────────────┘
//!                    │
//!                    ▼
//! ┌─────────────────────────────────────────┐
//! │            ContainerDriver               │
//! │  image refs, /workflow bind, log relay   │
//! └─────────────────────────────────────────┘
//!                    │
//!                    ▼
//! ┌─────────────────────────────────────────┐
//! │     ContainerEngine (DockerCli, Fake)    │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use mayfly_runtime::{ActionExecutor, ContainerDriver, DockerCli, DriverConfig};
//! use std::sync::Arc;
//!
//! let driver = ContainerDriver::new(Arc::new(DockerCli::new("docker")), DriverConfig::new("W1"));
//! let executor = ActionExecutor::new(driver);
//! let execution = executor.execute("wf-1", &action).await?;
//! ```

pub mod docker;
pub mod driver;
pub mod engine;
pub mod error;
pub mod executor;
pub mod fake;

pub use docker::*;
pub use driver::*;
pub use engine::*;
pub use error::*;
pub use executor::*;
pub use fake::*;
