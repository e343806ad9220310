//! Agent configuration

use clap::{ArgAction, Parser};
use mayfly_crd::DEFAULT_MAX_WORKFLOW_DATA_SIZE;
use mayfly_runtime::DriverConfig;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:42113";

/// Command line for `mayfly agent`
#[derive(Parser, Debug, Clone)]
pub struct AgentArgs {
    /// Identity this agent answers to in task `workerAddr` fields
    #[arg(long, env = "MAYFLY_WORKER_ID")]
    pub worker_id: String,

    /// Orchestrator base URL
    #[arg(long, env = "MAYFLY_SERVER_URL", default_value = DEFAULT_SERVER_URL)]
    pub server: String,

    /// Host directory holding per-workflow scratch directories
    #[arg(long, env = "MAYFLY_DATA_DIR", default_value = "/worker")]
    pub data_dir: PathBuf,

    /// Registry that action images are pulled from
    #[arg(long, env = "MAYFLY_REGISTRY")]
    pub registry: Option<String>,

    #[arg(long, env = "MAYFLY_REGISTRY_USERNAME")]
    pub registry_username: Option<String>,

    #[arg(long, env = "MAYFLY_REGISTRY_PASSWORD", hide_env_values = true)]
    pub registry_password: Option<String>,

    /// Use action images exactly as written, never prefixed with the registry
    #[arg(long)]
    pub absolute_image_uri: bool,

    /// Relay action container output into the agent log
    #[arg(long)]
    pub capture_action_logs: bool,

    /// Run action containers privileged
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub privileged: bool,

    /// Attempts per status report
    #[arg(long, default_value_t = 3)]
    pub retries: usize,

    /// Seconds between status report attempts
    #[arg(long, default_value_t = 3)]
    pub retry_interval: u64,

    /// Seconds between polls of the orchestrator
    #[arg(long, default_value_t = 3)]
    pub poll_interval: u64,

    /// Largest workflow data file that will be pushed, in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_WORKFLOW_DATA_SIZE)]
    pub max_workflow_data_size: usize,

    /// Container CLI binary
    #[arg(long, env = "MAYFLY_DOCKER_BIN", default_value = "docker")]
    pub docker_bin: String,
}

/// Registry login details
#[derive(Clone, PartialEq, Eq)]
pub struct RegistryAuth {
    pub registry: String,
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for RegistryAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryAuth")
            .field("registry", &self.registry)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Resolved agent settings
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub worker_id: String,
    pub server_url: String,
    pub driver: DriverConfig,
    pub registry_auth: Option<RegistryAuth>,
    pub report_attempts: usize,
    pub retry_interval: Duration,
    pub poll_interval: Duration,
    pub max_workflow_data_size: usize,
    pub docker_bin: String,
}

impl AgentConfig {
    pub fn new(worker_id: impl Into<String>, server_url: impl Into<String>) -> Self {
        let worker_id = worker_id.into();
        Self {
            driver: DriverConfig::new(worker_id.clone()),
            worker_id,
            server_url: server_url.into(),
            registry_auth: None,
            report_attempts: 3,
            retry_interval: Duration::from_secs(3),
            poll_interval: Duration::from_secs(3),
            max_workflow_data_size: DEFAULT_MAX_WORKFLOW_DATA_SIZE,
            docker_bin: "docker".to_string(),
        }
    }

    pub fn data_dir(&self) -> &std::path::Path {
        &self.driver.data_dir
    }
}

impl From<AgentArgs> for AgentConfig {
    fn from(args: AgentArgs) -> Self {
        let mut driver = DriverConfig::new(args.worker_id.clone())
            .with_data_dir(args.data_dir)
            .with_absolute_image_uri(args.absolute_image_uri)
            .with_capture_logs(args.capture_action_logs)
            .with_privileged(args.privileged);
        if let Some(registry) = &args.registry {
            driver = driver.with_registry(registry.clone());
        }

        let registry_auth = match (args.registry, args.registry_username, args.registry_password) {
            (Some(registry), Some(username), Some(password)) => Some(RegistryAuth {
                registry,
                username,
                password,
            }),
            _ => None,
        };

        Self {
            worker_id: args.worker_id,
            server_url: args.server,
            driver,
            registry_auth,
            report_attempts: args.retries.max(1),
            retry_interval: Duration::from_secs(args.retry_interval),
            poll_interval: Duration::from_secs(args.poll_interval),
            max_workflow_data_size: args.max_workflow_data_size,
            docker_bin: args.docker_bin,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = AgentArgs::try_parse_from(["agent", "--worker-id", "W1"]).unwrap();
        let config = AgentConfig::from(args);

        assert_eq!(config.worker_id, "W1");
        assert_eq!(config.driver.worker_id, "W1");
        assert_eq!(config.data_dir(), std::path::Path::new("/worker"));
        assert!(config.driver.privileged);
        assert!(!config.driver.capture_logs);
        assert!(config.registry_auth.is_none());
        assert_eq!(config.report_attempts, 3);
        assert_eq!(config.retry_interval, Duration::from_secs(3));
        assert_eq!(config.max_workflow_data_size, DEFAULT_MAX_WORKFLOW_DATA_SIZE);
    }

    #[test]
    fn test_registry_and_flags() {
        let args = AgentArgs::try_parse_from([
            "agent",
            "--worker-id",
            "W2",
            "--registry",
            "registry.local:5000",
            "--registry-username",
            "admin",
            "--registry-password",
            "secret",
            "--privileged",
            "false",
            "--capture-action-logs",
        ])
        .unwrap();
        let config = AgentConfig::from(args);

        assert_eq!(config.driver.registry.as_deref(), Some("registry.local:5000"));
        assert!(!config.driver.privileged);
        assert!(config.driver.capture_logs);
        assert_eq!(
            config.registry_auth,
            Some(RegistryAuth {
                registry: "registry.local:5000".to_string(),
                username: "admin".to_string(),
                password: "secret".to_string(),
            })
        );
        assert!(!format!("{:?}", config).contains("secret"));
    }

    #[test]
    fn test_worker_id_required() {
        assert!(AgentArgs::try_parse_from(["agent"]).is_err());
    }
}
