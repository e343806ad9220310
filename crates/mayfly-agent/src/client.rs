//! Orchestrator client
//!
//! The agent only ever talks to the orchestrator through
//! [`OrchestratorClient`], so tests can drive an agent against an in-process
//! orchestrator.

use crate::error::ClientError;
use async_trait::async_trait;
use mayfly_crd::{
    ActionStatusReport, WorkflowAction, WorkflowContext, WorkflowDataResponse, WorkflowDataUpdate,
};
use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// RPC surface of the orchestrator, as the agent sees it
#[async_trait]
pub trait OrchestratorClient: Send + Sync {
    /// Non-terminal workflows with a task bound to `worker_id`
    async fn get_workflow_contexts(&self, worker_id: &str) -> ClientResult<Vec<WorkflowContext>>;

    async fn get_workflow_actions(&self, workflow_id: &str) -> ClientResult<Vec<WorkflowAction>>;

    async fn report_action_status(&self, report: &ActionStatusReport) -> ClientResult<()>;

    async fn get_workflow_data(&self, workflow_id: &str) -> ClientResult<WorkflowDataResponse>;

    async fn update_workflow_data(&self, update: &WorkflowDataUpdate) -> ClientResult<()>;
}

/// Default per-request timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client for the orchestrator's `/api/v1` routes
#[derive(Debug, Clone)]
pub struct HttpOrchestratorClient {
    client: Client,
    base_url: Url,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

impl HttpOrchestratorClient {
    pub fn new(server_url: &str) -> ClientResult<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Self::with_client(client, server_url)
    }

    pub fn with_client(client: Client, server_url: &str) -> ClientResult<Self> {
        let invalid = || ClientError::InvalidUrl(server_url.to_string());
        let mut base_url = Url::parse(server_url).map_err(|_| invalid())?;
        base_url
            .path_segments_mut()
            .map_err(|_| invalid())?
            .pop_if_empty()
            .extend(["api", "v1"]);
        Ok(Self { client, base_url })
    }

    /// Route under `/api/v1`. Each segment is percent-encoded, so ids never
    /// change the shape of the path.
    fn url(&self, segments: &[&str]) -> ClientResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidUrl(self.base_url.to_string()))?
            .extend(segments);
        Ok(url)
    }

    async fn check(response: Response) -> ClientResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .map(|b| b.error)
            .unwrap_or(body);
        Err(ClientError::Rejected {
            status: status.as_u16(),
            message,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, segments: &[&str]) -> ClientResult<T> {
        let url = self.url(segments)?;
        debug!(url = %url, "GET");
        let response = Self::check(self.client.get(url.clone()).send().await?).await?;
        let body = response.text().await?;
        serde_json::from_str(&body)
            .map_err(|e| ClientError::InvalidResponse(format!("{}: {}", url, e)))
    }
}

#[async_trait]
impl OrchestratorClient for HttpOrchestratorClient {
    async fn get_workflow_contexts(&self, worker_id: &str) -> ClientResult<Vec<WorkflowContext>> {
        self.get_json(&["workers", worker_id, "contexts"]).await
    }

    async fn get_workflow_actions(&self, workflow_id: &str) -> ClientResult<Vec<WorkflowAction>> {
        self.get_json(&["workflows", workflow_id, "actions"]).await
    }

    async fn report_action_status(&self, report: &ActionStatusReport) -> ClientResult<()> {
        let url = self.url(&["workflows", report.workflow_id.as_str(), "status"])?;
        let response = self.client.post(url).json(report).send().await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn get_workflow_data(&self, workflow_id: &str) -> ClientResult<WorkflowDataResponse> {
        self.get_json(&["workflows", workflow_id, "data"]).await
    }

    async fn update_workflow_data(&self, update: &WorkflowDataUpdate) -> ClientResult<()> {
        let url = self.url(&["workflows", update.workflow_id.as_str(), "data"])?;
        let response = self.client.put(url).json(update).send().await?;
        Self::check(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_normalised() {
        for server in ["http://orchestrator:42113", "http://orchestrator:42113/"] {
            let client = HttpOrchestratorClient::new(server).unwrap();
            assert_eq!(
                client.url(&["workflows", "wf-1", "actions"]).unwrap().as_str(),
                "http://orchestrator:42113/api/v1/workflows/wf-1/actions"
            );
        }
    }

    #[test]
    fn test_base_url_keeps_prefix() {
        let client = HttpOrchestratorClient::new("https://lab.example/mayfly/").unwrap();
        assert_eq!(
            client.url(&["workers", "W1", "contexts"]).unwrap().as_str(),
            "https://lab.example/mayfly/api/v1/workers/W1/contexts"
        );
    }

    #[test]
    fn test_ids_are_percent_encoded() {
        let client = HttpOrchestratorClient::new("http://orchestrator:42113").unwrap();
        let url = client.url(&["workflows", "a/b?c#d e", "status"]).unwrap();
        assert_eq!(
            url.as_str(),
            "http://orchestrator:42113/api/v1/workflows/a%2Fb%3Fc%23d%20e/status"
        );
        assert_eq!(url.path_segments().unwrap().count(), 5);
        assert_eq!(url.query(), None);
        assert_eq!(url.fragment(), None);
    }

    #[test]
    fn test_rejects_unusable_server_url() {
        for server in ["not a url", "mailto:ops@example.com"] {
            let err = HttpOrchestratorClient::new(server).unwrap_err();
            assert!(matches!(err, ClientError::InvalidUrl(_)), "{}", server);
        }
    }
}
