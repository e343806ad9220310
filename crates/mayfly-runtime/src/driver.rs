//! Container driver
//!
//! Stateless wrapper over a [`ContainerEngine`] that knows how a workflow
//! action maps onto a container: image reference, scratch directory bind,
//! identity environment, and log relay.

use crate::engine::{ContainerEngine, ContainerSpec};
use crate::error::{Result, RuntimeError};
use futures::StreamExt;
use mayfly_crd::{State, WorkflowAction, WORKFLOW_MOUNT_PATH};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Driver configuration shared by every container it creates
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Identity injected into every container
    pub worker_id: String,
    /// Registry prefix for image names
    pub registry: Option<String>,
    /// Use image names as-is even when a registry is configured
    pub absolute_image_uri: bool,
    /// Parent of the per-workflow scratch directories
    pub data_dir: PathBuf,
    pub capture_logs: bool,
    pub privileged: bool,
}

impl DriverConfig {
    pub fn new(worker_id: impl Into<String>) -> Self {
        Self {
            worker_id: worker_id.into(),
            registry: None,
            absolute_image_uri: false,
            data_dir: PathBuf::from("/worker"),
            capture_logs: false,
            privileged: true,
        }
    }

    pub fn with_registry(mut self, registry: impl Into<String>) -> Self {
        self.registry = Some(registry.into());
        self
    }

    pub fn with_absolute_image_uri(mut self, absolute: bool) -> Self {
        self.absolute_image_uri = absolute;
        self
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    pub fn with_capture_logs(mut self, capture: bool) -> Self {
        self.capture_logs = capture;
        self
    }

    pub fn with_privileged(mut self, privileged: bool) -> Self {
        self.privileged = privileged;
        self
    }
}

/// Pending outcome of a reaction container
///
/// Produced by [`ContainerDriver::wait_for_failed_container`]; the wait
/// itself runs in the background.
#[derive(Debug)]
pub struct ReactionHandle {
    rx: oneshot::Receiver<State>,
}

impl ReactionHandle {
    /// Resolve to the reaction's final state. A wait that died without
    /// reporting counts as Failed.
    pub async fn outcome(self) -> State {
        self.rx.await.unwrap_or(State::Failed)
    }
}

/// Drives containers for workflow actions
#[derive(Clone)]
pub struct ContainerDriver {
    engine: Arc<dyn ContainerEngine>,
    config: DriverConfig,
}

impl ContainerDriver {
    pub fn new(engine: Arc<dyn ContainerEngine>, config: DriverConfig) -> Self {
        Self { engine, config }
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Scratch directory of one workflow on the host
    pub fn workflow_dir(&self, workflow_id: &str) -> PathBuf {
        self.config.data_dir.join(workflow_id)
    }

    /// Full image reference for an action image
    pub fn image_ref(&self, image: &str) -> String {
        match &self.config.registry {
            Some(registry) if !self.config.absolute_image_uri && !registry.is_empty() => {
                format!("{}/{}", registry.trim_end_matches('/'), image)
            }
            _ => image.to_string(),
        }
    }

    /// Pull an image; a failed pull is tolerated if the image is already local
    pub async fn pull_image(&self, image: &str) -> Result<()> {
        let image_ref = self.image_ref(image);
        match self.engine.pull_image(&image_ref).await {
            Ok(()) => Ok(()),
            Err(err) => {
                if self.engine.image_exists(&image_ref).await.unwrap_or(false) {
                    warn!(image = %image_ref, error = %err, "pull failed, using local image");
                    Ok(())
                } else {
                    Err(err)
                }
            }
        }
    }

    /// Create a container for `action` running `cmd`
    pub async fn create_container(
        &self,
        cmd: &[String],
        workflow_id: &str,
        action: &WorkflowAction,
    ) -> Result<String> {
        let spec = self.container_spec(cmd, workflow_id, action);
        let id = self.engine.create_container(&spec).await?;
        debug!(
            workflow = %workflow_id,
            action = %action.name,
            container = %id,
            image = %spec.image,
            "container created"
        );
        Ok(id)
    }

    fn container_spec(&self, cmd: &[String], workflow_id: &str, action: &WorkflowAction) -> ContainerSpec {
        let mut binds = vec![format!(
            "{}:{}",
            self.workflow_dir(workflow_id).display(),
            WORKFLOW_MOUNT_PATH
        )];
        binds.extend(action.volumes.iter().cloned());

        let mut env = action.environment.clone();
        env.push(format!("MAYFLY_WORKFLOW_ID={}", workflow_id));
        env.push(format!("MAYFLY_WORKER_ID={}", self.config.worker_id));
        env.push(format!("MAYFLY_ACTION_NAME={}", action.name));

        ContainerSpec {
            image: self.image_ref(&action.image),
            command: cmd.to_vec(),
            env,
            binds,
            pid: action.pid.clone(),
            privileged: self.config.privileged,
        }
    }

    pub async fn start_container(&self, id: &str) -> Result<()> {
        self.engine.start_container(id).await
    }

    /// Wait for the container to stop, bounded by `timeout`.
    ///
    /// A container that can no longer be inspected is reported Failed
    /// without an error. Exceeding `timeout` is `RuntimeError::Timeout`.
    pub async fn wait_for_container(&self, id: &str, timeout: Duration) -> Result<State> {
        if let Err(err) = self.engine.inspect_container(id).await {
            warn!(container = %id, error = %err, "container gone before wait");
            return Ok(State::Failed);
        }

        match tokio::time::timeout(timeout, self.engine.wait_container(id)).await {
            Ok(Ok(0)) => Ok(State::Success),
            Ok(Ok(code)) => {
                info!(container = %id, exit_code = code, "container exited non-zero");
                Ok(State::Failed)
            }
            Ok(Err(err)) => Err(err),
            Err(_) => Err(RuntimeError::Timeout(timeout)),
        }
    }

    /// Wait for a reaction container in the background
    pub fn wait_for_failed_container(&self, id: &str) -> ReactionHandle {
        let (tx, rx) = oneshot::channel();
        let engine = self.engine.clone();
        let id = id.to_string();

        tokio::spawn(async move {
            let state = match engine.inspect_container(&id).await {
                Err(err) => {
                    warn!(container = %id, error = %err, "reaction container gone before wait");
                    State::Failed
                }
                Ok(_) => match engine.wait_container(&id).await {
                    Ok(0) => State::Success,
                    Ok(_) => State::Failed,
                    Err(err) => {
                        warn!(container = %id, error = %err, "reaction wait failed");
                        State::Failed
                    }
                },
            };
            let _ = tx.send(state);
        });

        ReactionHandle { rx }
    }

    /// Relay container output to the log sink in the background
    pub fn stream_logs(&self, id: &str) {
        let engine = self.engine.clone();
        let id = id.to_string();

        tokio::spawn(async move {
            let mut lines = match engine.follow_logs(&id).await {
                Ok(lines) => lines,
                Err(err) => {
                    warn!(container = %id, error = %err, "failed to follow container logs");
                    return;
                }
            };

            while let Some(item) = lines.next().await {
                match item {
                    Ok(line) => {
                        info!(target: "container", container = %id, stream = %line.stream, "{}", line.line)
                    }
                    Err(err) => {
                        warn!(container = %id, error = %err, "container log stream broke");
                        break;
                    }
                }
            }
        });
    }

    /// Force-remove the container and its anonymous volumes
    pub async fn remove_container(&self, id: &str) -> Result<()> {
        self.engine.remove_container(id).await
    }
}

impl std::fmt::Debug for ContainerDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerDriver")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Host-side path of the workflow data file
pub fn workflow_data_path(data_dir: &Path, workflow_id: &str) -> PathBuf {
    data_dir.join(workflow_id).join(mayfly_crd::WORKFLOW_DATA_FILE)
}
