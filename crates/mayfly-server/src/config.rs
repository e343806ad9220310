//! Server configuration

use clap::Parser;
use mayfly_workflow::DEFAULT_MAX_DATA_SIZE;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Default orchestrator listen address
pub const DEFAULT_LISTEN: &str = "0.0.0.0:42113";

/// Command line for `mayfly server`
#[derive(Parser, Debug, Clone)]
pub struct ServerArgs {
    /// Address to serve the workflow API on
    #[arg(long, env = "MAYFLY_LISTEN", default_value = DEFAULT_LISTEN)]
    pub listen: SocketAddr,

    /// ReDB file for workflow state. Without it state is kept in memory.
    #[arg(long, env = "MAYFLY_DB_PATH")]
    pub db_path: Option<PathBuf>,

    /// Directory of rendered workflow manifests (YAML or JSON) to load at startup
    #[arg(long, env = "MAYFLY_WORKFLOWS_DIR")]
    pub workflows_dir: Option<PathBuf>,

    /// Seconds between watchdog sweeps
    #[arg(long, default_value_t = 10)]
    pub watchdog_interval: u64,

    /// Largest accepted workflow data blob, in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_DATA_SIZE)]
    pub max_workflow_data_size: usize,
}

/// Resolved server settings
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    pub db_path: Option<PathBuf>,
    pub workflows_dir: Option<PathBuf>,
    pub watchdog_interval: Duration,
    pub max_workflow_data_size: usize,
}

impl From<ServerArgs> for ServerConfig {
    fn from(args: ServerArgs) -> Self {
        Self {
            listen: args.listen,
            db_path: args.db_path,
            workflows_dir: args.workflows_dir,
            // A zero interval would spin the sweep loop
            watchdog_interval: Duration::from_secs(args.watchdog_interval.max(1)),
            max_workflow_data_size: args.max_workflow_data_size,
        }
    }
}
