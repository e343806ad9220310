//! In-memory container engine for tests
//!
//! Each created container takes the next [`ContainerScript`] queued for its
//! image (exit 0 when none is queued). Every engine call is recorded.

use crate::engine::{ContainerEngine, ContainerSpec, ContainerStatus, LogLine, LogStream};
use crate::error::{Result, RuntimeError};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use mayfly_crd::{WORKFLOW_DATA_FILE, WORKFLOW_MOUNT_PATH};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

/// Scripted behaviour of one fake container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerScript {
    /// None means the container never stops on its own
    pub exit_code: Option<i64>,
    /// Disappear as soon as it is started, so inspect fails
    pub vanish: bool,
    /// Refuse to start
    pub fail_start: bool,
    /// Bytes written to the bind-mounted workflow data file on start
    pub write_data: Option<Vec<u8>>,
    pub logs: Vec<String>,
}

impl ContainerScript {
    pub fn exit(code: i64) -> Self {
        Self {
            exit_code: Some(code),
            vanish: false,
            fail_start: false,
            write_data: None,
            logs: Vec::new(),
        }
    }

    pub fn hang() -> Self {
        Self {
            exit_code: None,
            ..Self::exit(0)
        }
    }

    pub fn vanish() -> Self {
        Self {
            vanish: true,
            ..Self::exit(0)
        }
    }

    pub fn failing_start() -> Self {
        Self {
            fail_start: true,
            ..Self::exit(0)
        }
    }

    pub fn writing_data(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.write_data = Some(data.into());
        self
    }

    pub fn with_logs<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.logs = lines.into_iter().map(Into::into).collect();
        self
    }
}

/// One recorded engine call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    ImageExists(String),
    Pull(String),
    Create { image: String, command: Vec<String> },
    Start(String),
    Inspect(String),
    Wait(String),
    Logs(String),
    Remove(String),
}

#[derive(Debug)]
struct FakeContainer {
    spec: ContainerSpec,
    script: ContainerScript,
    started: bool,
}

#[derive(Debug, Default)]
struct FakeState {
    local_images: HashSet<String>,
    failing_pulls: HashSet<String>,
    failing_creates: HashSet<String>,
    failing_starts: HashSet<String>,
    scripts: HashMap<String, VecDeque<ContainerScript>>,
    containers: HashMap<String, FakeContainer>,
    created: Vec<ContainerSpec>,
    calls: Vec<EngineCall>,
    next_id: u64,
}

/// Scriptable in-memory [`ContainerEngine`]
#[derive(Debug, Default)]
pub struct FakeEngine {
    state: Mutex<FakeState>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue the behaviour of the next container created from `image`
    pub fn script(&self, image: impl Into<String>, script: ContainerScript) -> &Self {
        self.state()
            .scripts
            .entry(image.into())
            .or_default()
            .push_back(script);
        self
    }

    /// Mark an image as already present locally
    pub fn with_local_image(&self, image: impl Into<String>) -> &Self {
        self.state().local_images.insert(image.into());
        self
    }

    pub fn fail_pull(&self, image: impl Into<String>) -> &Self {
        self.state().failing_pulls.insert(image.into());
        self
    }

    pub fn fail_create(&self, image: impl Into<String>) -> &Self {
        self.state().failing_creates.insert(image.into());
        self
    }

    pub fn fail_start(&self, image: impl Into<String>) -> &Self {
        self.state().failing_starts.insert(image.into());
        self
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.state().calls.clone()
    }

    /// Specs of every container created so far, in order
    pub fn created(&self) -> Vec<ContainerSpec> {
        self.state().created.clone()
    }

    pub fn removed(&self) -> Vec<String> {
        self.state()
            .calls
            .iter()
            .filter_map(|c| match c {
                EngineCall::Remove(id) => Some(id.clone()),
                _ => None,
            })
            .collect()
    }

    /// Containers created and not yet removed
    pub fn live_containers(&self) -> usize {
        self.state().containers.len()
    }

    fn record(&self, call: EngineCall) {
        self.state().calls.push(call);
    }

    fn data_path(spec: &ContainerSpec) -> Option<PathBuf> {
        let suffix = format!(":{}", WORKFLOW_MOUNT_PATH);
        spec.binds
            .iter()
            .find_map(|b| b.strip_suffix(&suffix))
            .map(|host| PathBuf::from(host).join(WORKFLOW_DATA_FILE))
    }
}

#[async_trait]
impl ContainerEngine for FakeEngine {
    async fn image_exists(&self, image: &str) -> Result<bool> {
        self.record(EngineCall::ImageExists(image.to_string()));
        Ok(self.state().local_images.contains(image))
    }

    async fn pull_image(&self, image: &str) -> Result<()> {
        self.record(EngineCall::Pull(image.to_string()));
        let mut state = self.state();
        if state.failing_pulls.contains(image) {
            return Err(RuntimeError::Pull {
                image: image.to_string(),
                message: "scripted pull failure".to_string(),
            });
        }
        state.local_images.insert(image.to_string());
        Ok(())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String> {
        self.record(EngineCall::Create {
            image: spec.image.clone(),
            command: spec.command.clone(),
        });
        let mut state = self.state();
        if state.failing_creates.contains(&spec.image) {
            return Err(RuntimeError::Create {
                image: spec.image.clone(),
                message: "scripted create failure".to_string(),
            });
        }

        state.next_id += 1;
        let id = format!("fake-{}", state.next_id);
        let script = state
            .scripts
            .get_mut(&spec.image)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| ContainerScript::exit(0));
        state.created.push(spec.clone());
        state.containers.insert(
            id.clone(),
            FakeContainer {
                spec: spec.clone(),
                script,
                started: false,
            },
        );
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        self.record(EngineCall::Start(id.to_string()));
        let write = {
            let mut state = self.state();
            let container = state.containers.get(id).ok_or_else(|| RuntimeError::Start {
                id: id.to_string(),
                message: "no such container".to_string(),
            })?;
            if container.script.fail_start || state.failing_starts.contains(&container.spec.image) {
                return Err(RuntimeError::Start {
                    id: id.to_string(),
                    message: "scripted start failure".to_string(),
                });
            }

            let vanish = container.script.vanish;
            let write = container
                .script
                .write_data
                .clone()
                .and_then(|data| Self::data_path(&container.spec).map(|path| (path, data)));

            if vanish {
                state.containers.remove(id);
            } else if let Some(container) = state.containers.get_mut(id) {
                container.started = true;
            }
            write
        };

        if let Some((path, data)) = write {
            tokio::fs::write(path, data).await?;
        }
        Ok(())
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerStatus> {
        self.record(EngineCall::Inspect(id.to_string()));
        let state = self.state();
        let container = state.containers.get(id).ok_or_else(|| RuntimeError::Inspect {
            id: id.to_string(),
            message: "no such container".to_string(),
        })?;
        Ok(ContainerStatus {
            running: container.started && container.script.exit_code.is_none(),
            exit_code: container.script.exit_code.unwrap_or(0),
        })
    }

    async fn wait_container(&self, id: &str) -> Result<i64> {
        self.record(EngineCall::Wait(id.to_string()));
        let exit_code = {
            let state = self.state();
            let container = state.containers.get(id).ok_or_else(|| RuntimeError::Wait {
                id: id.to_string(),
                message: "no such container".to_string(),
            })?;
            container.script.exit_code
        };

        match exit_code {
            Some(code) => Ok(code),
            None => std::future::pending().await,
        }
    }

    async fn follow_logs(&self, id: &str) -> Result<BoxStream<'static, Result<LogLine>>> {
        self.record(EngineCall::Logs(id.to_string()));
        let lines = self
            .state()
            .containers
            .get(id)
            .map(|c| c.script.logs.clone())
            .ok_or_else(|| RuntimeError::Logs(format!("no such container {}", id)))?;

        Ok(stream::iter(lines.into_iter().map(|line| {
            Ok(LogLine {
                stream: LogStream::Stdout,
                line,
            })
        }))
        .boxed())
    }

    async fn remove_container(&self, id: &str) -> Result<()> {
        self.record(EngineCall::Remove(id.to_string()));
        self.state().containers.remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(image: &str) -> ContainerSpec {
        ContainerSpec {
            image: image.to_string(),
            command: vec![],
            env: vec![],
            binds: vec![],
            pid: None,
            privileged: false,
        }
    }

    #[tokio::test]
    async fn test_scripts_are_consumed_in_order() {
        let engine = FakeEngine::new();
        engine
            .script("img", ContainerScript::exit(3))
            .script("img", ContainerScript::exit(0));

        let first = engine.create_container(&spec("img")).await.unwrap();
        let second = engine.create_container(&spec("img")).await.unwrap();
        let third = engine.create_container(&spec("img")).await.unwrap();

        assert_eq!(engine.wait_container(&first).await.unwrap(), 3);
        assert_eq!(engine.wait_container(&second).await.unwrap(), 0);
        assert_eq!(engine.wait_container(&third).await.unwrap(), 0);
        assert_eq!(engine.live_containers(), 3);
    }

    #[tokio::test]
    async fn test_vanished_container_cannot_be_inspected() {
        let engine = FakeEngine::new();
        engine.script("img", ContainerScript::vanish());
        let id = engine.create_container(&spec("img")).await.unwrap();
        engine.start_container(&id).await.unwrap();
        assert!(engine.inspect_container(&id).await.is_err());
    }

    #[tokio::test]
    async fn test_start_writes_workflow_data() {
        let dir = tempfile::tempdir().unwrap();
        let engine = FakeEngine::new();
        engine.script("img", ContainerScript::exit(0).writing_data(r#"{"x":1}"#));

        let mut s = spec("img");
        s.binds.push(format!("{}:{}", dir.path().display(), WORKFLOW_MOUNT_PATH));
        let id = engine.create_container(&s).await.unwrap();
        engine.start_container(&id).await.unwrap();

        let written = std::fs::read_to_string(dir.path().join(WORKFLOW_DATA_FILE)).unwrap();
        assert_eq!(written, r#"{"x":1}"#);
    }

    #[tokio::test]
    async fn test_scripted_failures() {
        let engine = FakeEngine::new();
        engine.fail_pull("a").fail_create("b").fail_start("c");

        assert!(engine.pull_image("a").await.is_err());
        assert!(engine.create_container(&spec("b")).await.is_err());
        let id = engine.create_container(&spec("c")).await.unwrap();
        assert!(engine.start_container(&id).await.is_err());
        assert!(!engine.image_exists("a").await.unwrap());
    }
}
