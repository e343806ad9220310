//! Mayfly worker agent
//!
//! Runs on (or next to) a machine being provisioned and executes the actions
//! of every workflow task bound to its worker id, one container at a time.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │                    Agent                         │
//! │   poll contexts ─▶ next_turn ─▶ drive actions    │
//! │         │                           │            │
//! │         ▼                           ▼            │
//! │  OrchestratorClient         ActionExecutor       │
//! │   StatusReporter            ContainerDriver      │
//! │   WorkflowDataSync          ContainerEngine      │
//! └──────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use mayfly_agent::{Agent, AgentConfig, HttpOrchestratorClient};
//! use mayfly_runtime::DockerCli;
//! use std::sync::Arc;
//!
//! let config = AgentConfig::new("W1", "http://orchestrator:42113");
//! let client = Arc::new(HttpOrchestratorClient::new(&config.server_url)?);
//! let mut agent = Agent::new(&config, client, Arc::new(DockerCli::default()));
//! agent.run().await?;
//! ```

pub mod agent;
pub mod client;
pub mod config;
pub mod data_sync;
pub mod error;
pub mod report;
pub mod turn;

pub use agent::{Agent, Poll};
pub use client::{ClientResult, HttpOrchestratorClient, OrchestratorClient};
pub use config::{AgentArgs, AgentConfig, RegistryAuth};
pub use data_sync::WorkflowDataSync;
pub use error::{AgentError, ClientError, Result};
pub use report::StatusReporter;
pub use turn::{next_turn, Turn};

use anyhow::Context;
use mayfly_runtime::DockerCli;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// Run an agent against the Docker CLI until its workflows are done or the
/// process is interrupted
pub async fn run(config: AgentConfig) -> anyhow::Result<()> {
    let docker = DockerCli::new(config.docker_bin.clone());
    if let Some(auth) = &config.registry_auth {
        docker
            .login(&auth.registry, &auth.username, &auth.password)
            .await
            .with_context(|| format!("failed to log in to registry {}", auth.registry))?;
        info!(registry = %auth.registry, "Logged in to registry");
    }

    let client = Arc::new(
        HttpOrchestratorClient::new(&config.server_url).context("failed to build HTTP client")?,
    );
    let (stop, shutdown) = watch::channel(false);
    let mut agent = Agent::new(&config, client, Arc::new(docker)).with_shutdown(shutdown);
    info!(
        worker = %config.worker_id,
        server = %config.server_url,
        data_dir = %config.data_dir().display(),
        "Starting mayfly agent"
    );

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, stopping agent");
            let _ = stop.send(true);
        }
    });

    agent.run().await.context("agent run failed")
}
