//! Docker CLI engine
//!
//! Drives the `docker` binary through `tokio::process::Command`.

use crate::engine::{ContainerEngine, ContainerSpec, ContainerStatus, LogLine, LogStream};
use crate::error::{Result, RuntimeError};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::debug;

/// Container engine backed by the docker command line
#[derive(Debug, Clone)]
pub struct DockerCli {
    bin: String,
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new("docker")
    }
}

impl DockerCli {
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }

    /// Run a docker subcommand, returning trimmed stdout or trimmed stderr
    async fn run(&self, args: &[String]) -> std::result::Result<String, String> {
        debug!(bin = %self.bin, args = ?args, "docker");
        let output = Command::new(&self.bin)
            .args(args)
            .output()
            .await
            .map_err(|e| format!("failed to run {}: {}", self.bin, e))?;

        if !output.status.success() {
            return Err(String::from_utf8_lossy(&output.stderr).trim().to_string());
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Log in to a registry, feeding the password on stdin
    pub async fn login(&self, registry: &str, username: &str, password: &str) -> Result<()> {
        let login_err = |message: String| RuntimeError::Login {
            registry: registry.to_string(),
            message,
        };

        let mut child = Command::new(&self.bin)
            .args(["login", registry, "--username", username, "--password-stdin"])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(password.as_bytes()).await?;
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(login_err(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(())
    }

    fn create_args(spec: &ContainerSpec) -> Vec<String> {
        let mut args = vec!["create".to_string()];
        if spec.privileged {
            args.push("--privileged".to_string());
        }
        for env in &spec.env {
            args.push("-e".to_string());
            args.push(env.clone());
        }
        for bind in &spec.binds {
            args.push("-v".to_string());
            args.push(bind.clone());
        }
        if let Some(pid) = &spec.pid {
            args.push(format!("--pid={}", pid));
        }
        args.push(spec.image.clone());
        args.extend(spec.command.iter().cloned());
        args
    }
}

fn line_stream<R>(reader: R, kind: LogStream) -> BoxStream<'static, Result<LogLine>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    stream::unfold(Some(BufReader::new(reader).lines()), move |state| async move {
        let mut lines = state?;
        match lines.next_line().await {
            Ok(Some(line)) => Some((Ok(LogLine { stream: kind, line }), Some(lines))),
            Ok(None) => None,
            Err(e) => Some((Err(RuntimeError::Logs(e.to_string())), None)),
        }
    })
    .boxed()
}

#[async_trait]
impl ContainerEngine for DockerCli {
    async fn image_exists(&self, image: &str) -> Result<bool> {
        let status = Command::new(&self.bin)
            .args(["image", "inspect", image])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await?;
        Ok(status.success())
    }

    async fn pull_image(&self, image: &str) -> Result<()> {
        self.run(&["pull".to_string(), image.to_string()])
            .await
            .map(|_| ())
            .map_err(|message| RuntimeError::Pull {
                image: image.to_string(),
                message,
            })
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String> {
        self.run(&Self::create_args(spec))
            .await
            .map_err(|message| RuntimeError::Create {
                image: spec.image.clone(),
                message,
            })
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        self.run(&["start".to_string(), id.to_string()])
            .await
            .map(|_| ())
            .map_err(|message| RuntimeError::Start {
                id: id.to_string(),
                message,
            })
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerStatus> {
        let inspect_err = |message: String| RuntimeError::Inspect {
            id: id.to_string(),
            message,
        };

        let out = self
            .run(&[
                "inspect".to_string(),
                "--format".to_string(),
                "{{.State.Running}} {{.State.ExitCode}}".to_string(),
                id.to_string(),
            ])
            .await
            .map_err(inspect_err)?;

        let mut parts = out.split_whitespace();
        let running = parts.next() == Some("true");
        let exit_code = parts
            .next()
            .and_then(|c| c.parse().ok())
            .ok_or_else(|| inspect_err(format!("unexpected inspect output: {}", out)))?;

        Ok(ContainerStatus { running, exit_code })
    }

    async fn wait_container(&self, id: &str) -> Result<i64> {
        let wait_err = |message: String| RuntimeError::Wait {
            id: id.to_string(),
            message,
        };

        let out = self
            .run(&["wait".to_string(), id.to_string()])
            .await
            .map_err(wait_err)?;

        out.parse()
            .map_err(|_| wait_err(format!("unexpected wait output: {}", out)))
    }

    async fn follow_logs(&self, id: &str) -> Result<BoxStream<'static, Result<LogLine>>> {
        let mut child = Command::new(&self.bin)
            .args(["logs", "-f", id])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RuntimeError::Logs("stdout not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| RuntimeError::Logs("stderr not captured".to_string()))?;

        let merged = stream::select(
            line_stream(stdout, LogStream::Stdout),
            line_stream(stderr, LogStream::Stderr),
        );

        // The child lives as long as the stream does.
        let guarded = stream::unfold((merged, child), |(mut merged, child)| async move {
            merged.next().await.map(|item| (item, (merged, child)))
        });
        Ok(guarded.boxed())
    }

    async fn remove_container(&self, id: &str) -> Result<()> {
        self.run(&[
            "rm".to_string(),
            "-f".to_string(),
            "-v".to_string(),
            id.to_string(),
        ])
        .await
        .map(|_| ())
        .map_err(|message| RuntimeError::Remove {
            id: id.to_string(),
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_args() {
        let spec = ContainerSpec {
            image: "registry.local/wipe:v1".to_string(),
            command: vec!["sh".to_string(), "-c".to_string(), "echo hi".to_string()],
            env: vec!["A=1".to_string()],
            binds: vec!["/worker/wf-1:/workflow".to_string()],
            pid: Some("host".to_string()),
            privileged: true,
        };
        assert_eq!(
            DockerCli::create_args(&spec),
            vec![
                "create",
                "--privileged",
                "-e",
                "A=1",
                "-v",
                "/worker/wf-1:/workflow",
                "--pid=host",
                "registry.local/wipe:v1",
                "sh",
                "-c",
                "echo hi",
            ]
        );
    }

    #[test]
    fn test_create_args_minimal() {
        let spec = ContainerSpec {
            image: "alpine".to_string(),
            command: vec![],
            env: vec![],
            binds: vec![],
            pid: None,
            privileged: false,
        };
        assert_eq!(DockerCli::create_args(&spec), vec!["create", "alpine"]);
    }

    #[tokio::test]
    async fn test_missing_binary_is_io_error() {
        let docker = DockerCli::new("/nonexistent/docker-binary");
        assert!(matches!(
            docker.image_exists("alpine").await,
            Err(RuntimeError::Io(_))
        ));
        assert!(matches!(
            docker.pull_image("alpine").await,
            Err(RuntimeError::Pull { .. })
        ));
    }

    #[tokio::test]
    async fn test_line_stream_splits_lines() {
        let input: &'static [u8] = b"one\ntwo\n";
        let lines: Vec<_> = line_stream(input, LogStream::Stdout)
            .map(|l| l.unwrap().line)
            .collect()
            .await;
        assert_eq!(lines, vec!["one", "two"]);
    }
}
