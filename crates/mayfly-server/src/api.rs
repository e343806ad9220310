//! Workflow API routes
//!
//! JSON over HTTP rendition of the agent RPC surface. Errors carry the
//! orchestrator's error class so clients can tell rejections apart.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use mayfly_crd::{ActionStatusReport, WorkflowDataUpdate};
use mayfly_workflow::{ErrorCode, Orchestrator, WorkflowError};
use serde::Serialize;
use tracing::error;

/// Error response wrapper for orchestrator failures
#[derive(Debug)]
pub struct ApiError(pub WorkflowError);

impl From<WorkflowError> for ApiError {
    fn from(err: WorkflowError) -> Self {
        Self(err)
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    code: ErrorCode,
}

pub fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::InvalidArgument => StatusCode::BAD_REQUEST,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::FailedPrecondition => StatusCode::PRECONDITION_FAILED,
        ErrorCode::AlreadyExists | ErrorCode::Aborted => StatusCode::CONFLICT,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.0.code();
        if code == ErrorCode::Internal {
            error!("Request failed: {}", self.0);
        }
        let body = ErrorBody {
            error: self.0.to_string(),
            code,
        };
        (status_for(code), Json(body)).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

/// Routes served under `/api/v1`
pub fn api_router() -> Router<Orchestrator> {
    Router::new()
        .route("/workers/{worker_id}/contexts", get(get_workflow_contexts))
        .route("/workflows", post(create_workflow))
        .route("/workflows/{id}", get(get_workflow))
        .route("/workflows/{id}/actions", get(get_workflow_actions))
        .route("/workflows/{id}/status", post(report_action_status))
        .route(
            "/workflows/{id}/data",
            get(get_workflow_data).put(update_workflow_data),
        )
}

/// Complete application router
pub fn router(orchestrator: Orchestrator) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .nest("/api/v1", api_router())
        .with_state(orchestrator)
}

async fn get_workflow_contexts(
    State(orch): State<Orchestrator>,
    Path(worker_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(orch.get_workflow_contexts(&worker_id).await?))
}

async fn get_workflow_actions(
    State(orch): State<Orchestrator>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(orch.get_workflow_actions(&id).await?))
}

async fn report_action_status(
    State(orch): State<Orchestrator>,
    Path(id): Path<String>,
    Json(report): Json<ActionStatusReport>,
) -> ApiResult<StatusCode> {
    check_path_id(&id, &report.workflow_id)?;
    orch.report_action_status(&report).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_workflow_data(
    State(orch): State<Orchestrator>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(orch.get_workflow_data(&id).await?))
}

async fn update_workflow_data(
    State(orch): State<Orchestrator>,
    Path(id): Path<String>,
    Json(update): Json<WorkflowDataUpdate>,
) -> ApiResult<StatusCode> {
    check_path_id(&id, &update.workflow_id)?;
    orch.update_workflow_data(update).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn create_workflow(
    State(orch): State<Orchestrator>,
    Json(document): Json<serde_json::Value>,
) -> ApiResult<impl IntoResponse> {
    let created = orch.load_manifest(document).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn get_workflow(
    State(orch): State<Orchestrator>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(orch.get_workflow(&id).await?))
}

fn check_path_id(path_id: &str, body_id: &str) -> ApiResult<()> {
    if path_id != body_id {
        return Err(WorkflowError::InvalidArgument(format!(
            "workflow id in path '{}' does not match body '{}'",
            path_id, body_id
        ))
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Method, Request};
    use http_body_util::BodyExt;
    use mayfly_crd::{
        Action, State as ActionState, Task, Workflow, WorkflowAction, WorkflowContext,
        WorkflowDataMetadata, WorkflowDataResponse,
    };
    use mayfly_workflow::MemoryStateStore;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    async fn app() -> Router {
        let orch = Orchestrator::new(Arc::new(MemoryStateStore::new()));
        orch.create_workflow(
            Workflow::new("wf-1", "ubuntu", "machine-1").with_task(
                Task::new("disk", "W1")
                    .with_action(Action::new("wipe", "wipe:v1"))
                    .with_action(Action::new("stream", "image2disk:v1")),
            ),
        )
        .await
        .unwrap();
        router(orch)
    }

    async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Vec<u8>) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(v) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&v).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, bytes.to_vec())
    }

    fn report(task: &str, action: &str, state: ActionState) -> Value {
        json!({
            "workflow_id": "wf-1",
            "task_name": task,
            "action_name": action,
            "action_status": state.as_wire(),
            "seconds": 0,
            "message": "",
            "created_at": "2026-01-01T00:00:00Z",
            "worker_id": "W1",
        })
    }

    #[tokio::test]
    async fn test_healthz() {
        let (status, body) = send(&app().await, Method::GET, "/healthz", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"ok");
    }

    #[tokio::test]
    async fn test_contexts_and_actions() {
        let app = app().await;
        let (status, body) = send(&app, Method::GET, "/api/v1/workers/W1/contexts", None).await;
        assert_eq!(status, StatusCode::OK);
        let contexts: Vec<WorkflowContext> = serde_json::from_slice(&body).unwrap();
        assert_eq!(contexts.len(), 1);
        assert_eq!(contexts[0].total_number_of_actions, 2);

        let (status, body) = send(&app, Method::GET, "/api/v1/workflows/wf-1/actions", None).await;
        assert_eq!(status, StatusCode::OK);
        let actions: Vec<WorkflowAction> = serde_json::from_slice(&body).unwrap();
        assert_eq!(actions[1].name, "stream");
    }

    #[tokio::test]
    async fn test_report_status_flow() {
        let app = app().await;
        let (status, _) = send(
            &app,
            Method::POST,
            "/api/v1/workflows/wf-1/status",
            Some(report("disk", "wipe", ActionState::Running)),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (_, body) = send(&app, Method::GET, "/api/v1/workflows/wf-1", None).await;
        let wf: Workflow = serde_json::from_slice(&body).unwrap();
        assert_eq!(wf.state(), ActionState::Running);
    }

    #[tokio::test]
    async fn test_report_mismatch_is_bad_request() {
        let app = app().await;
        let (status, body) = send(
            &app,
            Method::POST,
            "/api/v1/workflows/wf-1/status",
            Some(report("disk", "stream", ActionState::Running)),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["code"], "invalid_argument");
    }

    #[tokio::test]
    async fn test_report_path_body_mismatch() {
        let app = app().await;
        let (status, _) = send(
            &app,
            Method::POST,
            "/api/v1/workflows/other/status",
            Some(report("disk", "wipe", ActionState::Running)),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_workflow_is_not_found() {
        let (status, body) = send(&app().await, Method::GET, "/api/v1/workflows/ghost/actions", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["code"], "not_found");
    }

    #[tokio::test]
    async fn test_workflow_data_round_trip() {
        let app = app().await;
        let (_, body) = send(&app, Method::GET, "/api/v1/workflows/wf-1/data", None).await;
        let initial: WorkflowDataResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(initial.data, b"{}");

        let update = WorkflowDataUpdate {
            workflow_id: "wf-1".to_string(),
            data: br#"{"disk":"/dev/sda"}"#.to_vec(),
            metadata: WorkflowDataMetadata {
                worker_id: "W1".to_string(),
                task_name: "disk".to_string(),
                action_name: "wipe".to_string(),
                created_at: chrono::Utc::now(),
                sha_sum: String::new(),
            },
        };
        let (status, _) = send(
            &app,
            Method::PUT,
            "/api/v1/workflows/wf-1/data",
            Some(serde_json::to_value(&update).unwrap()),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (_, body) = send(&app, Method::GET, "/api/v1/workflows/wf-1/data", None).await;
        let pulled: WorkflowDataResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(pulled.data, update.data);
    }

    #[tokio::test]
    async fn test_create_workflow() {
        let app = app().await;
        let manifest = json!({
            "apiVersion": "mayfly.metal/v1",
            "kind": "Workflow",
            "metadata": { "name": "wf-2" },
            "spec": { "templateRef": "debian", "hardwareRef": "machine-2" },
            "status": {
                "tasks": [{ "name": "t", "workerAddr": "W2",
                            "actions": [{ "name": "a", "image": "img" }] }]
            }
        });
        let (status, _) = send(&app, Method::POST, "/api/v1/workflows", Some(manifest.clone())).await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = send(&app, Method::POST, "/api/v1/workflows", Some(manifest)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["code"], "already_exists");
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(ErrorCode::FailedPrecondition), StatusCode::PRECONDITION_FAILED);
        assert_eq!(status_for(ErrorCode::Aborted), StatusCode::CONFLICT);
        assert_eq!(status_for(ErrorCode::Internal), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
