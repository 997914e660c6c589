//! Spacelift GraphQL client.
//!
//! Authenticates by exchanging an API key for a JWT, then runs the stack
//! search, runtime config and mounted file queries the tfvars migration needs.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::OnceCell;

use crate::error::ApiError;

/// Page size used when searching stacks.
pub const STACK_PAGE_SIZE: usize = 50;

/// Config element type of mounted files.
pub const FILE_MOUNT: &str = "FILE_MOUNT";

const GET_TOKEN_MUTATION: &str = r#"
mutation GetSpaceliftToken($id: ID!, $secret: String!) {
    apiKeyUser(id: $id, secret: $secret) {
        jwt
    }
}
"#;

const SEARCH_STACKS_QUERY: &str = r#"
query SearchStacks($input: SearchInput!) {
    searchStacks(input: $input) {
        edges {
            cursor
            node {
                id
            }
        }
        pageInfo {
            hasNextPage
            endCursor
        }
    }
}
"#;

const RUNTIME_CONFIG_QUERY: &str = r#"
query GetEnvironment($stackId: ID!) {
    stack(id: $stackId) {
        id
        runtimeConfig {
            element {
                ...configElement
            }
        }
    }
}

fragment configElement on ConfigElement {
    id
    type
    value
    writeOnly
}
"#;

const SET_CONFIG_MUTATION: &str = r#"
mutation SetMountedFile($stack: ID!, $config: ConfigInput!) {
    stackConfigAdd(stack: $stack, config: $config) {
        id
    }
}
"#;

/// One page of stack ids.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StackPage {
    pub stack_ids: Vec<String>,
    pub has_next_page: bool,
    pub end_cursor: Option<String>,
}

/// Runtime configuration element of a stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigElement {
    /// Path-like name, e.g. `/mnt/workspace/tf_vars_with_invalid_name.auto.tfvars`.
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub write_only: bool,
}

impl ConfigElement {
    pub fn is_file_mount(&self) -> bool {
        self.kind == FILE_MOUNT
    }
}

/// Operations on the Spacelift API used by the tfvars migration.
#[async_trait]
pub trait SpaceliftApi: Send + Sync {
    /// Fetches one page of stack ids, ordered by the starred flag, descending.
    async fn search_stacks(&self, after: Option<&str>) -> Result<StackPage, ApiError>;

    async fn stack_config_elements(&self, stack_id: &str) -> Result<Vec<ConfigElement>, ApiError>;

    /// Creates or replaces a mounted file on a stack.
    async fn set_mounted_file(
        &self,
        stack_id: &str,
        filename: &str,
        content: &str,
        write_only: bool,
    ) -> Result<(), ApiError>;
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenData {
    api_key_user: Option<ApiKeyUser>,
}

#[derive(Debug, Deserialize)]
struct ApiKeyUser {
    jwt: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchData {
    search_stacks: SearchConnection,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchConnection {
    edges: Vec<SearchEdge>,
    page_info: PageInfo,
}

#[derive(Debug, Deserialize)]
struct SearchEdge {
    node: StackNode,
}

#[derive(Debug, Deserialize)]
struct StackNode {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    has_next_page: bool,
    end_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StackData {
    stack: Option<StackRuntimeConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StackRuntimeConfig {
    #[serde(default)]
    runtime_config: Vec<RuntimeConfigItem>,
}

#[derive(Debug, Deserialize)]
struct RuntimeConfigItem {
    element: ConfigElement,
}

/// reqwest-backed [`SpaceliftApi`].
pub struct SpaceliftClient {
    graphql_url: String,
    api_key_id: String,
    api_key_secret: String,
    http_client: Client,
    jwt: OnceCell<String>,
}

impl SpaceliftClient {
    /// Creates a client for `{api_key_endpoint}/graphql`.
    pub fn new(
        api_key_endpoint: &str,
        api_key_id: impl Into<String>,
        api_key_secret: impl Into<String>,
    ) -> Result<Self, ApiError> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| ApiError::RequestFailed(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            graphql_url: format!("{}/graphql", api_key_endpoint.trim_end_matches('/')),
            api_key_id: api_key_id.into(),
            api_key_secret: api_key_secret.into(),
            http_client,
            jwt: OnceCell::new(),
        })
    }

    async fn jwt(&self) -> Result<&str, ApiError> {
        let jwt = self
            .jwt
            .get_or_try_init(|| async {
                let data: TokenData = self
                    .post(
                        GET_TOKEN_MUTATION,
                        json!({"id": self.api_key_id, "secret": self.api_key_secret}),
                        None,
                    )
                    .await?;
                data.api_key_user.map(|user| user.jwt).ok_or_else(|| {
                    ApiError::Authentication("API key was rejected".to_string())
                })
            })
            .await?;
        Ok(jwt.as_str())
    }

    async fn call<T: DeserializeOwned>(&self, query: &str, variables: Value) -> Result<T, ApiError> {
        let jwt = self.jwt().await?;
        self.post(query, variables, Some(jwt)).await
    }

    async fn post<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: Value,
        jwt: Option<&str>,
    ) -> Result<T, ApiError> {
        let mut request = self
            .http_client
            .post(&self.graphql_url)
            .header("Content-Type", "application/json")
            .json(&json!({"query": query, "variables": variables}));
        if let Some(jwt) = jwt {
            request = request.bearer_auth(jwt);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ApiError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ApiError::UnexpectedStatus {
                path: self.graphql_url.clone(),
                code: status.as_u16(),
                message,
            });
        }

        let body: GraphQlResponse<T> = response
            .json()
            .await
            .map_err(|e| ApiError::ParseError(e.to_string()))?;
        into_data(body)
    }
}

fn into_data<T>(response: GraphQlResponse<T>) -> Result<T, ApiError> {
    if let Some(errors) = response.errors {
        if !errors.is_empty() {
            let messages: Vec<_> = errors.iter().map(|e| e.message.as_str()).collect();
            return Err(ApiError::GraphQl(messages.join("; ")));
        }
    }

    response
        .data
        .ok_or_else(|| ApiError::GraphQl("No data in GraphQL response".to_string()))
}

/// Variables of the stack search query.
pub fn search_variables(after: Option<&str>) -> Value {
    json!({
        "input": {
            "first": STACK_PAGE_SIZE,
            "after": after,
            "orderBy": [{"field": "starred", "direction": "DESC"}]
        }
    })
}

#[async_trait]
impl SpaceliftApi for SpaceliftClient {
    async fn search_stacks(&self, after: Option<&str>) -> Result<StackPage, ApiError> {
        let data: SearchData = self
            .call(SEARCH_STACKS_QUERY, search_variables(after))
            .await?;
        let connection = data.search_stacks;

        Ok(StackPage {
            stack_ids: connection.edges.into_iter().map(|e| e.node.id).collect(),
            has_next_page: connection.page_info.has_next_page,
            end_cursor: connection.page_info.end_cursor,
        })
    }

    async fn stack_config_elements(&self, stack_id: &str) -> Result<Vec<ConfigElement>, ApiError> {
        let data: StackData = self
            .call(RUNTIME_CONFIG_QUERY, json!({"stackId": stack_id}))
            .await?;

        let stack = data.stack.ok_or_else(|| ApiError::MissingField {
            path: format!("stack {stack_id}"),
            field: "stack".to_string(),
        })?;
        Ok(stack
            .runtime_config
            .into_iter()
            .map(|item| item.element)
            .collect())
    }

    async fn set_mounted_file(
        &self,
        stack_id: &str,
        filename: &str,
        content: &str,
        write_only: bool,
    ) -> Result<(), ApiError> {
        let variables = json!({
            "stack": stack_id,
            "config": {
                "id": filename,
                "type": FILE_MOUNT,
                "value": content,
                "writeOnly": write_only
            }
        });
        let _: Value = self.call(SET_CONFIG_MUTATION, variables).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_variables() {
        let first_page = search_variables(None);
        assert_eq!(first_page["input"]["first"], 50);
        assert!(first_page["input"]["after"].is_null());
        assert_eq!(
            first_page["input"]["orderBy"],
            json!([{"field": "starred", "direction": "DESC"}])
        );

        let next_page = search_variables(Some("cursor-1"));
        assert_eq!(next_page["input"]["after"], "cursor-1");
    }

    #[test]
    fn test_parse_search_response() {
        let response: GraphQlResponse<SearchData> = serde_json::from_value(json!({
            "data": {
                "searchStacks": {
                    "edges": [
                        {"cursor": "a", "node": {"id": "stack-a"}},
                        {"cursor": "b", "node": {"id": "stack-b"}}
                    ],
                    "pageInfo": {"hasNextPage": true, "endCursor": "b"}
                }
            }
        }))
        .unwrap();

        let data = into_data(response).unwrap();
        assert_eq!(data.search_stacks.edges.len(), 2);
        assert!(data.search_stacks.page_info.has_next_page);
        assert_eq!(data.search_stacks.page_info.end_cursor.as_deref(), Some("b"));
    }

    #[test]
    fn test_parse_runtime_config() {
        let response: GraphQlResponse<StackData> = serde_json::from_value(json!({
            "data": {
                "stack": {
                    "id": "stack-a",
                    "runtimeConfig": [
                        {"element": {"id": "/mnt/workspace/a.tfvars", "type": "FILE_MOUNT",
                                     "value": "YQ==", "writeOnly": false}},
                        {"element": {"id": "TF_VAR_x", "type": "ENVIRONMENT_VARIABLE",
                                     "value": null, "writeOnly": true}}
                    ]
                }
            }
        }))
        .unwrap();

        let stack = into_data(response).unwrap().stack.unwrap();
        let elements: Vec<ConfigElement> =
            stack.runtime_config.into_iter().map(|i| i.element).collect();
        assert!(elements[0].is_file_mount());
        assert!(!elements[1].is_file_mount());
        assert!(elements[1].write_only);
        assert_eq!(elements[1].value, None);
    }

    #[test]
    fn test_graphql_errors_are_reported() {
        let response: GraphQlResponse<Value> = serde_json::from_value(json!({
            "data": null,
            "errors": [{"message": "unauthorized"}, {"message": "try again"}]
        }))
        .unwrap();

        match into_data(response) {
            Err(ApiError::GraphQl(message)) => assert_eq!(message, "unauthorized; try again"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_client_graphql_url() {
        let client = SpaceliftClient::new("https://acme.app.spacelift.io/", "id", "secret").unwrap();
        assert_eq!(client.graphql_url, "https://acme.app.spacelift.io/graphql");
    }
}
