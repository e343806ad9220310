//! Container engine seam
//!
//! The driver talks to the local container runtime only through
//! [`ContainerEngine`], so tests can swap in [`crate::FakeEngine`].

use crate::error::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::fmt;

/// Everything needed to create a container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    pub image: String,
    /// Empty means the image's default command
    pub command: Vec<String>,
    /// `KEY=VALUE` pairs
    pub env: Vec<String>,
    /// `host:container[:opts]` bind specs
    pub binds: Vec<String>,
    pub pid: Option<String>,
    pub privileged: bool,
}

/// Observed container state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerStatus {
    pub running: bool,
    pub exit_code: i64,
}

/// Which output stream a log line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStream {
    Stdout,
    Stderr,
}

impl fmt::Display for LogStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogStream::Stdout => f.write_str("stdout"),
            LogStream::Stderr => f.write_str("stderr"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub stream: LogStream,
    pub line: String,
}

/// A local container runtime
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Whether the image is already present locally
    async fn image_exists(&self, image: &str) -> Result<bool>;

    async fn pull_image(&self, image: &str) -> Result<()>;

    /// Create a container, returning its id
    async fn create_container(&self, spec: &ContainerSpec) -> Result<String>;

    async fn start_container(&self, id: &str) -> Result<()>;

    async fn inspect_container(&self, id: &str) -> Result<ContainerStatus>;

    /// Block until the container is no longer running, returning its exit code
    async fn wait_container(&self, id: &str) -> Result<i64>;

    /// Follow the container's output until it stops
    async fn follow_logs(&self, id: &str) -> Result<BoxStream<'static, Result<LogLine>>>;

    /// Force-remove the container together with its anonymous volumes
    async fn remove_container(&self, id: &str) -> Result<()>;
}
