// Main binary: orchestrator server or worker agent
use clap::{Parser, Subcommand};
use color_eyre::eyre::{eyre, Result};
use mayfly_agent::{AgentArgs, AgentConfig};
use mayfly_server::{ServerArgs, ServerConfig};
use std::io::stderr;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, registry, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about = "Mayfly bare metal workflow engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output - shows more detailed logs
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Runs the workflow orchestrator.
    Server(ServerArgs),
    /// Runs a worker agent that executes workflow actions.
    Agent(AgentArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    // Respect RUST_LOG, fall back to verbose/info for our crates
    let level = if cli.verbose { "debug" } else { "info" };
    let default_directives = format!(
        "mayfly={level},mayfly_server={level},mayfly_agent={level},mayfly_workflow={level},mayfly_runtime={level},container=info,tower=warn,tower_http=info,hyper=warn,reqwest=warn,h2=warn,want=warn",
        level = level
    );
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives));
    registry().with(filter).with(fmt::layer().with_writer(stderr)).init();

    let result = match cli.command {
        Commands::Server(args) => {
            info!("Starting mayfly server");
            mayfly_server::run(ServerConfig::from(args)).await
        }
        Commands::Agent(args) => mayfly_agent::run(AgentConfig::from(args)).await,
    };

    result.map_err(|e| {
        error!("{:#}", e);
        eyre!("{:#}", e)
    })
}
