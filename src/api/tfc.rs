//! TFC/TFE REST client.
//!
//! Covers the calls needed to run a plan on a temporary agent pool: agent pool
//! and token management, workspace execution mode, runs, and plan logs.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::ApiError;

const JSON_API_CONTENT_TYPE: &str = "application/vnd.api+json";

/// Authentication token of an agent pool.
#[derive(Clone)]
pub struct AgentToken {
    pub id: String,
    pub token: String,
}

impl fmt::Debug for AgentToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentToken")
            .field("id", &self.id)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Snapshot of the execution settings of a workspace.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSettings {
    pub execution_mode: Option<String>,
    pub setting_overwrites: Option<Value>,
    /// Raw `agent-pool` relationship, `{"data": ...}`.
    pub agent_pool: Option<Value>,
}

/// Operations on the TFC/TFE API used by the variable recovery workflow.
#[async_trait]
pub trait TfcApi: Send + Sync {
    /// Creates an organization-scoped agent pool and returns its id.
    async fn create_agent_pool(&self, organization_id: &str, name: &str)
        -> Result<String, ApiError>;

    async fn create_agent_token(
        &self,
        agent_pool_id: &str,
        description: &str,
    ) -> Result<AgentToken, ApiError>;

    /// Deletes an agent pool, revoking its tokens.
    async fn delete_agent_pool(&self, agent_pool_id: &str) -> Result<(), ApiError>;

    async fn get_execution_settings(&self, workspace_id: &str)
        -> Result<ExecutionSettings, ApiError>;

    /// Switches a workspace to agent execution on the given pool.
    async fn use_agent_pool(&self, workspace_id: &str, agent_pool_id: &str)
        -> Result<(), ApiError>;

    async fn restore_execution_settings(
        &self,
        workspace_id: &str,
        settings: &ExecutionSettings,
    ) -> Result<(), ApiError>;

    /// Queues a plan-only run without refresh and returns the plan id.
    async fn create_plan_only_run(&self, workspace_id: &str) -> Result<String, ApiError>;

    /// Returns the temporary URL the plan log can be read from.
    async fn get_plan_log_url(&self, plan_id: &str) -> Result<String, ApiError>;

    /// Downloads a plain text document. Returns an empty string when the body is empty.
    async fn download_text(&self, url: &str) -> Result<String, ApiError>;
}

/// reqwest-backed [`TfcApi`].
pub struct TfcClient {
    api_base: String,
    token: String,
    http_client: Client,
}

impl TfcClient {
    /// Creates a client for `{endpoint}/api/v2`.
    pub fn new(endpoint: &str, token: impl Into<String>) -> Result<Self, ApiError> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| ApiError::RequestFailed(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            api_base: format!("{}/api/v2", endpoint.trim_end_matches('/')),
            token: token.into(),
            http_client,
        })
    }

    async fn call(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value, ApiError> {
        let url = format!("{}{}", self.api_base, path);
        tracing::debug!(method = %method, path, "Calling TFC/TFE API");

        let mut request = self
            .http_client
            .request(method, &url)
            .bearer_auth(&self.token)
            .header("Content-Type", JSON_API_CONTENT_TYPE);
        if let Some(body) = body {
            request = request.body(serde_json::to_vec(&body)?);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ApiError::RequestFailed(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ApiError::RequestFailed(e.to_string()))?;

        if !status.is_success() {
            return Err(ApiError::UnexpectedStatus {
                path: path.to_string(),
                code: status.as_u16(),
                message: text,
            });
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| ApiError::ParseError(format!("{path}: {e}")))
    }
}

fn string_at(value: &Value, pointer: &str, path: &str) -> Result<String, ApiError> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ApiError::MissingField {
            path: path.to_string(),
            field: pointer.to_string(),
        })
}

/// Body of the PATCH switching a workspace to an agent pool.
pub fn agent_pool_patch(agent_pool_id: &str) -> Value {
    json!({
        "data": {
            "attributes": {
                "agent-pool-id": agent_pool_id,
                "execution-mode": "agent",
                "setting-overwrites": {"execution-mode": true, "agent-pool": true}
            },
            "type": "workspaces"
        }
    })
}

/// Body of the PATCH restoring a workspace snapshot.
pub fn restore_patch(settings: &ExecutionSettings) -> Value {
    json!({
        "data": {
            "attributes": {
                "execution-mode": settings.execution_mode,
                "setting-overwrites": settings.setting_overwrites
            },
            "relationships": {
                "agent-pool": settings.agent_pool.clone().unwrap_or_else(|| json!({"data": null}))
            },
            "type": "workspaces"
        }
    })
}

/// Body of the POST creating a plan-only run.
pub fn plan_only_run(workspace_id: &str) -> Value {
    json!({
        "data": {
            "attributes": {
                "allow-empty-apply": false,
                "plan-only": true,
                "refresh": false
            },
            "relationships": {
                "workspace": {"data": {"id": workspace_id, "type": "workspaces"}}
            },
            "type": "runs"
        }
    })
}

/// Extracts a snapshot from a `GET /workspaces/{id}` response.
pub fn parse_execution_settings(response: &Value) -> ExecutionSettings {
    let data = response.get("data").unwrap_or(&Value::Null);
    ExecutionSettings {
        execution_mode: data
            .pointer("/attributes/execution-mode")
            .and_then(Value::as_str)
            .map(str::to_string),
        setting_overwrites: data.pointer("/attributes/setting-overwrites").cloned(),
        agent_pool: data.pointer("/relationships/agent-pool").cloned(),
    }
}

#[async_trait]
impl TfcApi for TfcClient {
    async fn create_agent_pool(
        &self,
        organization_id: &str,
        name: &str,
    ) -> Result<String, ApiError> {
        let path = format!("/organizations/{organization_id}/agent-pools");
        let body = json!({
            "data": {
                "attributes": {"name": name, "organization-scoped": true},
                "type": "agent-pools"
            }
        });
        let response = self.call(Method::POST, &path, Some(body)).await?;
        string_at(&response, "/data/id", &path)
    }

    async fn create_agent_token(
        &self,
        agent_pool_id: &str,
        description: &str,
    ) -> Result<AgentToken, ApiError> {
        let path = format!("/agent-pools/{agent_pool_id}/authentication-tokens");
        let body = json!({
            "data": {
                "attributes": {"description": description},
                "type": "authentication-tokens"
            }
        });
        let response = self.call(Method::POST, &path, Some(body)).await?;
        Ok(AgentToken {
            id: string_at(&response, "/data/id", &path)?,
            token: string_at(&response, "/data/attributes/token", &path)?,
        })
    }

    async fn delete_agent_pool(&self, agent_pool_id: &str) -> Result<(), ApiError> {
        let path = format!("/agent-pools/{agent_pool_id}");
        self.call(Method::DELETE, &path, None).await?;
        Ok(())
    }

    async fn get_execution_settings(
        &self,
        workspace_id: &str,
    ) -> Result<ExecutionSettings, ApiError> {
        let path = format!("/workspaces/{workspace_id}");
        let response = self.call(Method::GET, &path, None).await?;
        Ok(parse_execution_settings(&response))
    }

    async fn use_agent_pool(&self, workspace_id: &str, agent_pool_id: &str) -> Result<(), ApiError> {
        let path = format!("/workspaces/{workspace_id}");
        self.call(Method::PATCH, &path, Some(agent_pool_patch(agent_pool_id)))
            .await?;
        Ok(())
    }

    async fn restore_execution_settings(
        &self,
        workspace_id: &str,
        settings: &ExecutionSettings,
    ) -> Result<(), ApiError> {
        let path = format!("/workspaces/{workspace_id}");
        self.call(Method::PATCH, &path, Some(restore_patch(settings)))
            .await?;
        Ok(())
    }

    async fn create_plan_only_run(&self, workspace_id: &str) -> Result<String, ApiError> {
        let path = "/runs";
        let response = self
            .call(Method::POST, path, Some(plan_only_run(workspace_id)))
            .await?;
        string_at(&response, "/data/relationships/plan/data/id", path)
    }

    async fn get_plan_log_url(&self, plan_id: &str) -> Result<String, ApiError> {
        let path = format!("/plans/{plan_id}");
        let response = self.call(Method::GET, &path, None).await?;
        string_at(&response, "/data/attributes/log-read-url", &path)
    }

    async fn download_text(&self, url: &str) -> Result<String, ApiError> {
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| ApiError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::UnexpectedStatus {
                path: "plan log".to_string(),
                code: status.as_u16(),
                message: String::new(),
            });
        }

        response
            .text()
            .await
            .map_err(|e| ApiError::RequestFailed(e.to_string()))
    }
}
