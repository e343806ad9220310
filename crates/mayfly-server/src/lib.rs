//! Mayfly orchestrator server
//!
//! Serves the workflow API to agents and runs the timeout watchdog against
//! the same store.

pub mod api;
pub mod config;

pub use api::{router, ApiError};
pub use config::{ServerArgs, ServerConfig};

use anyhow::{Context, Result};
use mayfly_workflow::{MemoryStateStore, Orchestrator, RedbStateStore, Watchdog, WorkflowError, WorkflowStore};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Open the configured store
pub fn open_store(config: &ServerConfig) -> Result<Arc<dyn WorkflowStore>> {
    match &config.db_path {
        Some(path) => {
            info!(path = %path.display(), "Using ReDB workflow store");
            let store = RedbStateStore::open(path)
                .with_context(|| format!("failed to open workflow database {}", path.display()))?;
            Ok(Arc::new(store))
        }
        None => {
            warn!("No --db-path given, workflow state is kept in memory only");
            Ok(Arc::new(MemoryStateStore::new()))
        }
    }
}

/// Load every `.yaml`, `.yml` and `.json` manifest in `dir`.
///
/// Manifests already present in the store are skipped so a restart against a
/// persistent store keeps their progress.
pub async fn load_manifests(orchestrator: &Orchestrator, dir: &Path) -> Result<usize> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("failed to read workflows directory {}", dir.display()))?;

    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
        if matches!(ext, "yaml" | "yml" | "json") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut loaded = 0;
    for path in paths {
        let raw = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        let document: serde_json::Value = serde_yaml::from_str(&raw)
            .with_context(|| format!("failed to parse {}", path.display()))?;

        match orchestrator.load_manifest(document).await {
            Ok(wf) => {
                info!(workflow = %wf.id(), path = %path.display(), "Loaded workflow manifest");
                loaded += 1;
            }
            Err(WorkflowError::AlreadyExists(id)) => {
                info!(workflow = %id, "Workflow already stored, skipping manifest");
            }
            Err(e) => {
                return Err(e).with_context(|| format!("invalid workflow manifest {}", path.display()));
            }
        }
    }
    Ok(loaded)
}

/// Run the orchestrator until Ctrl+C or SIGTERM
pub async fn run(config: ServerConfig) -> Result<()> {
    let store = open_store(&config)?;
    let orchestrator =
        Orchestrator::new(store.clone()).with_max_data_size(config.max_workflow_data_size);

    if let Some(dir) = &config.workflows_dir {
        let count = load_manifests(&orchestrator, dir).await?;
        info!(count, dir = %dir.display(), "Workflow manifests loaded");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let watchdog = tokio::spawn(Watchdog::new(store, config.watchdog_interval).run(shutdown_rx));

    let app = router(orchestrator).layer(TraceLayer::new_for_http());
    let listener = tokio::net::TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("failed to bind {}", config.listen))?;
    info!(address = %config.listen, "Mayfly orchestrator listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    let _ = shutdown_tx.send(());
    if let Err(e) = watchdog.await {
        error!("Watchdog task failed: {}", e);
    }
    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
                info!("Received SIGTERM");
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"
apiVersion: mayfly.metal/v1
kind: Workflow
metadata:
  name: wf-yaml
spec:
  templateRef: ubuntu
  hardwareRef: machine-1
status:
  globalTimeout: 600
  tasks:
    - name: disk
      workerAddr: W1
      actions:
        - name: wipe
          image: wipe:v1
          timeout: 60
"#;

    #[tokio::test]
    async fn test_load_manifests_from_directory() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("a.yaml"), MANIFEST).unwrap();
        std::fs::write(tmp.path().join("notes.txt"), "ignored").unwrap();

        let orch = Orchestrator::new(Arc::new(MemoryStateStore::new()));
        assert_eq!(load_manifests(&orch, tmp.path()).await.unwrap(), 1);

        let wf = orch.get_workflow("wf-yaml").await.unwrap();
        assert_eq!(wf.status.global_timeout, 600);
        assert_eq!(wf.status.tasks[0].actions[0].timeout, 60);

        // Reloading the same directory is a no-op
        assert_eq!(load_manifests(&orch, tmp.path()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_invalid_manifest_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join("bad.yaml"),
            "apiVersion: example.com/v9\nkind: Workflow\nmetadata: {name: x}\n",
        )
        .unwrap();

        let orch = Orchestrator::new(Arc::new(MemoryStateStore::new()));
        assert!(load_manifests(&orch, tmp.path()).await.is_err());
    }

    #[test]
    fn test_open_store_selects_backend() {
        let tmp = tempfile::tempdir().unwrap();
        let args = ServerArgs {
            listen: config::DEFAULT_LISTEN.parse().unwrap(),
            db_path: Some(tmp.path().join("state.redb")),
            workflows_dir: None,
            watchdog_interval: 10,
            max_workflow_data_size: 1024,
        };
        assert!(open_store(&ServerConfig::from(args)).is_ok());
        assert!(tmp.path().join("state.redb").exists());
    }
}
