//! Integration tests for the sensitive variable recovery workflow.
//!
//! The TFC/TFE API and Docker are replaced by recording mocks.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;
use spacemk_custom::api::{AgentToken, ExecutionSettings, TfcApi};
use spacemk_custom::document::TfcDocument;
use spacemk_custom::error::{ApiError, ContainerError};
use spacemk_custom::execution::{ContainerConfig, ContainerInfo, ContainerRuntime};
use spacemk_custom::recovery::{LogWait, SensitiveVariableRecovery};

const PLAN_LOG: &str = "Terraform v1.5.7\n\
                        DB_PASSWORD=s3cr3t\n\
                        ATLAS_CONFIGURATION_VERSION_GITHUB_BRANCH=main\n\
                        Plan: 0 to add, 0 to change, 0 to destroy.\n";

#[derive(Default)]
struct MockTfc {
    fail_run: bool,
    log: Option<String>,
    calls: Mutex<Vec<String>>,
}

impl MockTfc {
    fn with_log(log: &str) -> Self {
        Self {
            log: Some(log.to_string()),
            ..Default::default()
        }
    }

    fn record(&self, call: String) {
        self.calls.lock().expect("lock poisoned").push(call);
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("lock poisoned").clone()
    }
}

#[async_trait]
impl TfcApi for MockTfc {
    async fn create_agent_pool(&self, organization_id: &str, name: &str) -> Result<String, ApiError> {
        self.record(format!("create_agent_pool {organization_id} {name}"));
        Ok(format!("apool-{organization_id}"))
    }

    async fn create_agent_token(
        &self,
        agent_pool_id: &str,
        _description: &str,
    ) -> Result<AgentToken, ApiError> {
        self.record(format!("create_agent_token {agent_pool_id}"));
        Ok(AgentToken {
            id: "at-1".to_string(),
            token: "agent-secret".to_string(),
        })
    }

    async fn delete_agent_pool(&self, agent_pool_id: &str) -> Result<(), ApiError> {
        self.record(format!("delete_agent_pool {agent_pool_id}"));
        Ok(())
    }

    async fn get_execution_settings(&self, workspace_id: &str) -> Result<ExecutionSettings, ApiError> {
        self.record(format!("get_execution_settings {workspace_id}"));
        Ok(ExecutionSettings {
            execution_mode: Some("remote".to_string()),
            ..Default::default()
        })
    }

    async fn use_agent_pool(&self, workspace_id: &str, agent_pool_id: &str) -> Result<(), ApiError> {
        self.record(format!("use_agent_pool {workspace_id} {agent_pool_id}"));
        Ok(())
    }

    async fn restore_execution_settings(
        &self,
        workspace_id: &str,
        settings: &ExecutionSettings,
    ) -> Result<(), ApiError> {
        self.record(format!(
            "restore_execution_settings {workspace_id} {}",
            settings.execution_mode.as_deref().unwrap_or("none")
        ));
        Ok(())
    }

    async fn create_plan_only_run(&self, workspace_id: &str) -> Result<String, ApiError> {
        self.record(format!("create_plan_only_run {workspace_id}"));
        if self.fail_run {
            return Err(ApiError::UnexpectedStatus {
                path: "/runs".to_string(),
                code: 422,
                message: "configuration version is missing".to_string(),
            });
        }
        Ok(format!("plan-{workspace_id}"))
    }

    async fn get_plan_log_url(&self, plan_id: &str) -> Result<String, ApiError> {
        self.record(format!("get_plan_log_url {plan_id}"));
        Ok(format!("https://archivist.example/{plan_id}"))
    }

    async fn download_text(&self, url: &str) -> Result<String, ApiError> {
        self.record(format!("download_text {url}"));
        Ok(self.log.clone().unwrap_or_default())
    }
}

#[derive(Default)]
struct MockRuntime {
    unavailable: bool,
    /// Container name whose creation fails.
    fail_create: Option<String>,
    calls: Mutex<Vec<String>>,
}

impl MockRuntime {
    fn record(&self, call: String) {
        self.calls.lock().expect("lock poisoned").push(call);
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("lock poisoned").clone()
    }
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    async fn ping(&self) -> Result<(), ContainerError> {
        if self.unavailable {
            return Err(ContainerError::DaemonUnavailable("connection refused".to_string()));
        }
        Ok(())
    }

    async fn inspect(&self, name: &str) -> Result<Option<ContainerInfo>, ContainerError> {
        self.record(format!("inspect {name}"));
        Ok(None)
    }

    async fn start(&self, id: &str) -> Result<(), ContainerError> {
        self.record(format!("start {id}"));
        Ok(())
    }

    async fn create(&self, config: &ContainerConfig) -> Result<String, ContainerError> {
        self.record(format!("create {} {}", config.name, config.env.join(",")));
        if self.fail_create.as_deref() == Some(config.name.as_str()) {
            return Err(ContainerError::PullFailed {
                image: config.image.clone(),
                reason: "manifest unknown".to_string(),
            });
        }
        Ok(format!("c-{}", config.name.trim_start_matches("smk-tfc-agent-")))
    }

    async fn stop(&self, id: &str) -> Result<(), ContainerError> {
        self.record(format!("stop {id}"));
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<(), ContainerError> {
        self.record(format!("remove {id}"));
        Ok(())
    }
}

fn document() -> TfcDocument {
    serde_json::from_value(json!({
        "organizations": [{"id": "acme"}],
        "workspaces": [
            {
                "id": "ws-1",
                "attributes": {"name": "network", "vcs-repo": {"identifier": "acme/network"}},
                "relationships": {
                    "organization": {"data": {"id": "acme", "type": "organizations"}},
                    "current-configuration-version": {"data": {"id": "cv-1"}}
                }
            },
            {
                "id": "ws-2",
                "attributes": {"name": "empty"},
                "relationships": {
                    "organization": {"data": {"id": "acme"}},
                    "current-configuration-version": {"data": null}
                }
            }
        ],
        "workspace_variables": [
            {"id": "var-1", "attributes": {"key": "DB_PASSWORD", "value": null, "sensitive": true},
             "relationships": {"workspace": {"data": {"id": "ws-1"}}}},
            {"id": "var-2", "attributes": {"key": "NOT_IN_LOG", "value": null, "sensitive": true},
             "relationships": {"workspace": {"data": {"id": "ws-1"}}}},
            {"id": "var-3", "attributes": {"key": "REGION", "value": "eu-west-1", "sensitive": false},
             "relationships": {"workspace": {"data": {"id": "ws-1"}}}},
            {"id": "var-4", "attributes": {"key": "TOKEN", "value": null, "sensitive": true},
             "relationships": {"workspace": {"data": {"id": "ws-2"}}}}
        ]
    }))
    .expect("valid document")
}

/// Adds a second organization with one workspace and one sensitive variable.
fn two_organizations() -> TfcDocument {
    let mut data = document();
    let extra: TfcDocument = serde_json::from_value(json!({
        "organizations": [{"id": "globex"}],
        "workspaces": [{
            "id": "ws-3",
            "attributes": {"name": "billing", "vcs-repo": {"identifier": "globex/billing"}},
            "relationships": {
                "organization": {"data": {"id": "globex"}},
                "current-configuration-version": {"data": {"id": "cv-3"}}
            }
        }],
        "workspace_variables": [
            {"id": "var-5", "attributes": {"key": "DB_PASSWORD", "value": null, "sensitive": true},
             "relationships": {"workspace": {"data": {"id": "ws-3"}}}}
        ]
    }))
    .expect("valid document");
    data.organizations.extend(extra.organizations);
    data.workspaces.extend(extra.workspaces);
    data.workspace_variables.extend(extra.workspace_variables);
    data
}

fn recovery(tfc: &Arc<MockTfc>, runtime: &Arc<MockRuntime>) -> SensitiveVariableRecovery {
    SensitiveVariableRecovery::new(tfc.clone(), runtime.clone()).with_log_wait(LogWait::immediate())
}

fn value_of<'a>(document: &'a TfcDocument, variable_id: &str) -> Option<&'a str> {
    document
        .workspace_variables
        .iter()
        .find(|v| v.id == variable_id)
        .and_then(|v| v.attributes.value.as_deref())
}

#[tokio::test]
async fn test_recovers_values_and_backfills_branch() {
    let tfc = Arc::new(MockTfc::with_log(PLAN_LOG));
    let runtime = Arc::new(MockRuntime::default());
    let mut data = document();

    let report = recovery(&tfc, &runtime).run(&mut data).await.expect("recovery succeeds");

    assert_eq!(report.organizations, 1);
    assert_eq!(report.workspaces_planned, 1);
    assert_eq!(report.variables_recovered, 1);
    assert_eq!(report.branches_backfilled, 1);

    assert_eq!(value_of(&data, "var-1"), Some("s3cr3t"));
    assert_eq!(value_of(&data, "var-2"), None);
    assert_eq!(value_of(&data, "var-3"), Some("eu-west-1"));
    assert_eq!(value_of(&data, "var-4"), None);

    let workspace = data.find_workspace("ws-1").expect("workspace");
    assert_eq!(workspace.vcs_branch(), Some("main"));
    let vcs_repo = workspace.attributes.vcs_repo.as_ref().expect("vcs repo");
    assert_eq!(vcs_repo.identifier.as_deref(), Some("acme/network"));
}

#[tokio::test]
async fn test_call_order_for_one_workspace() {
    let tfc = Arc::new(MockTfc::with_log(PLAN_LOG));
    let runtime = Arc::new(MockRuntime::default());
    let mut data = document();

    recovery(&tfc, &runtime).run(&mut data).await.expect("recovery succeeds");

    assert_eq!(
        tfc.calls(),
        vec![
            "create_agent_pool acme SMK",
            "create_agent_token apool-acme",
            "get_execution_settings ws-1",
            "use_agent_pool ws-1 apool-acme",
            "create_plan_only_run ws-1",
            "restore_execution_settings ws-1 remote",
            "get_plan_log_url plan-ws-1",
            "download_text https://archivist.example/plan-ws-1",
            "delete_agent_pool apool-acme",
        ]
    );
    assert_eq!(
        runtime.calls(),
        vec![
            "inspect smk-tfc-agent-acme",
            "create smk-tfc-agent-acme TFC_AGENT_NAME=SMK-Agent,TFC_AGENT_TOKEN=agent-secret",
            "start c-acme",
            "stop c-acme",
            "remove c-acme",
        ]
    );
}

#[tokio::test]
async fn test_existing_branch_is_kept() {
    let tfc = Arc::new(MockTfc::with_log(PLAN_LOG));
    let runtime = Arc::new(MockRuntime::default());
    let mut data = document();
    data.find_workspace_mut("ws-1")
        .and_then(|w| w.attributes.vcs_repo.as_mut())
        .expect("vcs repo")
        .branch = Some("develop".to_string());

    let report = recovery(&tfc, &runtime).run(&mut data).await.expect("recovery succeeds");

    assert_eq!(report.branches_backfilled, 0);
    assert_eq!(data.find_workspace("ws-1").and_then(|w| w.vcs_branch()), Some("develop"));
}

#[tokio::test]
async fn test_restore_runs_when_run_creation_fails() {
    let tfc = Arc::new(MockTfc {
        fail_run: true,
        log: Some(PLAN_LOG.to_string()),
        ..Default::default()
    });
    let runtime = Arc::new(MockRuntime::default());
    let mut data = document();

    let report = recovery(&tfc, &runtime).run(&mut data).await.expect("recovery succeeds");

    assert_eq!(report.workspaces_planned, 0);
    assert_eq!(value_of(&data, "var-1"), None);

    let calls = tfc.calls();
    assert!(calls.contains(&"restore_execution_settings ws-1 remote".to_string()));
    assert!(!calls.iter().any(|c| c.starts_with("get_plan_log_url")));
    assert_eq!(calls.last().map(String::as_str), Some("delete_agent_pool apool-acme"));
}

#[tokio::test]
async fn test_pool_deleted_when_container_fails() {
    let tfc = Arc::new(MockTfc::with_log(PLAN_LOG));
    let runtime = Arc::new(MockRuntime {
        fail_create: Some("smk-tfc-agent-acme".to_string()),
        ..Default::default()
    });
    let mut data = document();

    let result = recovery(&tfc, &runtime).run(&mut data).await;

    assert!(result.is_err());
    assert_eq!(
        tfc.calls().last().map(String::as_str),
        Some("delete_agent_pool apool-acme")
    );
    assert_eq!(value_of(&data, "var-1"), None);
}

#[tokio::test]
async fn test_empty_log_skips_workspace() {
    let tfc = Arc::new(MockTfc::default());
    let runtime = Arc::new(MockRuntime::default());
    let mut data = document();

    let report = recovery(&tfc, &runtime).run(&mut data).await.expect("recovery succeeds");

    assert_eq!(report.workspaces_planned, 0);
    assert_eq!(report.variables_recovered, 0);
    assert_eq!(data.find_workspace("ws-1").and_then(|w| w.vcs_branch()), None);
}

#[tokio::test]
async fn test_skipped_when_docker_unavailable() {
    let tfc = Arc::new(MockTfc::with_log(PLAN_LOG));
    let runtime = Arc::new(MockRuntime {
        unavailable: true,
        ..Default::default()
    });
    let mut data = document();

    let report = recovery(&tfc, &runtime).run(&mut data).await.expect("recovery succeeds");

    assert!(report.skipped);
    assert!(tfc.calls().is_empty());
    assert!(runtime.calls().is_empty());
    assert_eq!(value_of(&data, "var-1"), None);
}

#[tokio::test]
async fn test_nothing_to_do_without_sensitive_variables() {
    let tfc = Arc::new(MockTfc::with_log(PLAN_LOG));
    let runtime = Arc::new(MockRuntime::default());
    let mut data = document();
    for variable in &mut data.workspace_variables {
        variable.attributes.sensitive = Some(false);
    }

    let report = recovery(&tfc, &runtime).run(&mut data).await.expect("recovery succeeds");

    assert_eq!(report.organizations, 0);
    assert!(tfc.calls().is_empty());
}

#[tokio::test]
async fn test_each_organization_gets_its_own_pool_and_container() {
    let tfc = Arc::new(MockTfc::with_log(PLAN_LOG));
    let runtime = Arc::new(MockRuntime::default());
    let mut data = two_organizations();

    let report = recovery(&tfc, &runtime).run(&mut data).await.expect("recovery succeeds");

    assert_eq!(report.organizations, 2);
    assert_eq!(report.workspaces_planned, 2);
    assert_eq!(report.variables_recovered, 2);
    assert_eq!(value_of(&data, "var-1"), Some("s3cr3t"));
    assert_eq!(value_of(&data, "var-5"), Some("s3cr3t"));

    let pool_calls: Vec<_> = tfc
        .calls()
        .into_iter()
        .filter(|c| c.contains("agent_pool ") && !c.starts_with("use_agent_pool"))
        .collect();
    assert_eq!(
        pool_calls,
        vec![
            "create_agent_pool acme SMK",
            "delete_agent_pool apool-acme",
            "create_agent_pool globex SMK",
            "delete_agent_pool apool-globex",
        ]
    );
    assert!(tfc.calls().contains(&"use_agent_pool ws-3 apool-globex".to_string()));

    let creates: Vec<_> = runtime
        .calls()
        .into_iter()
        .filter(|c| c.starts_with("create ") || c.starts_with("remove "))
        .collect();
    assert_eq!(
        creates,
        vec![
            "create smk-tfc-agent-acme TFC_AGENT_NAME=SMK-Agent,TFC_AGENT_TOKEN=agent-secret",
            "remove c-acme",
            "create smk-tfc-agent-globex TFC_AGENT_NAME=SMK-Agent,TFC_AGENT_TOKEN=agent-secret",
            "remove c-globex",
        ]
    );
}

#[tokio::test]
async fn test_container_failure_in_second_organization_deletes_its_pool() {
    let tfc = Arc::new(MockTfc::with_log(PLAN_LOG));
    let runtime = Arc::new(MockRuntime {
        fail_create: Some("smk-tfc-agent-globex".to_string()),
        ..Default::default()
    });
    let mut data = two_organizations();

    let result = recovery(&tfc, &runtime).run(&mut data).await;

    assert!(result.is_err());
    assert_eq!(value_of(&data, "var-1"), Some("s3cr3t"));
    assert_eq!(value_of(&data, "var-5"), None);

    let calls = tfc.calls();
    assert!(calls.contains(&"delete_agent_pool apool-acme".to_string()));
    assert_eq!(calls.last().map(String::as_str), Some("delete_agent_pool apool-globex"));
    assert!(!calls.iter().any(|c| c.contains("ws-3")));
}
