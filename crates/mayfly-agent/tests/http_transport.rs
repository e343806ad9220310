//! Agent and orchestrator talking over real HTTP

use mayfly_agent::{Agent, AgentConfig, ClientError, HttpOrchestratorClient, OrchestratorClient};
use mayfly_crd::{Action, ActionStatusReport, State, Task, Workflow};
use mayfly_runtime::{ContainerScript, FakeEngine};
use mayfly_workflow::{MemoryStateStore, Orchestrator};
use std::sync::Arc;
use std::time::Duration;

async fn serve(orchestrator: Orchestrator) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, mayfly_server::router(orchestrator))
            .await
            .unwrap();
    });
    format!("http://{}", addr)
}

fn workflow() -> Workflow {
    Workflow::new("wf-1", "ubuntu", "machine-1").with_task(
        Task::new("disk", "W1")
            .with_action(Action::new("partition", "partition:v1"))
            .with_action(Action::new("format", "format:v1")),
    )
}

#[tokio::test]
async fn agent_completes_workflow_over_http() {
    let orchestrator = Orchestrator::new(Arc::new(MemoryStateStore::new()));
    orchestrator.create_workflow(workflow()).await.unwrap();
    let url = serve(orchestrator.clone()).await;

    let tmp = tempfile::tempdir().unwrap();
    let engine = Arc::new(FakeEngine::new());
    engine.script(
        "partition:v1",
        ContainerScript::exit(0).writing_data(r#"{"partitions":["/dev/sda1"]}"#),
    );

    let mut config = AgentConfig::new("W1", url.as_str());
    config.driver = config.driver.with_data_dir(tmp.path());
    config.poll_interval = Duration::from_millis(10);
    let client = Arc::new(HttpOrchestratorClient::new(&config.server_url).unwrap());
    Agent::new(&config, client, engine).run().await.unwrap();

    let wf = orchestrator.get_workflow("wf-1").await.unwrap();
    assert_eq!(wf.state(), State::Success);

    let data = orchestrator.get_workflow_data("wf-1").await.unwrap();
    assert_eq!(data.data, br#"{"partitions":["/dev/sda1"]}"#);
}

#[tokio::test]
async fn rejected_report_carries_status_and_message() {
    let orchestrator = Orchestrator::new(Arc::new(MemoryStateStore::new()));
    orchestrator.create_workflow(workflow()).await.unwrap();
    let client = HttpOrchestratorClient::new(&serve(orchestrator).await).unwrap();

    let actions = client.get_workflow_actions("wf-1").await.unwrap();
    assert_eq!(actions.len(), 2);

    // Skipping ahead to the second action is out of order
    let err = client
        .report_action_status(&ActionStatusReport::new("wf-1", &actions[1], State::Running))
        .await
        .unwrap_err();
    match err {
        ClientError::Rejected { status, message } => {
            assert_eq!(status, 400);
            assert!(message.contains("cursor"), "{}", message);
        }
        other => panic!("unexpected error: {:?}", other),
    }

    let err = client.get_workflow_actions("ghost").await.unwrap_err();
    assert!(matches!(err, ClientError::Rejected { status: 404, .. }));
}
