//! Recovery of sensitive workspace variable values.
//!
//! Sensitive variables cannot be read back through the TFC/TFE API. Their
//! values are recovered by running a plan on a local agent whose log echoes
//! the run environment:
//!
//! ```text
//! per organization:
//!   create agent pool + token → start agent container
//!   per workspace: snapshot settings → switch to pool → queue plan → restore
//!                  → wait for plan log → scan NAME=value lines
//!   stop agent container → delete agent pool
//! ```
//!
//! Settings are restored right after the run is queued, not after the plan
//! completes. Processes interrupted mid-pass can leave agent pools and
//! containers behind; they must be removed by hand.

pub mod plan_log;

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::api::TfcApi;
use crate::config::RecoveryConfig;
use crate::document::tfc::VcsRepo;
use crate::document::TfcDocument;
use crate::error::RecoveryError;
use crate::execution::{AgentContainer, ContainerRuntime};

pub use plan_log::{mask, scan, wait_for_log, LogWait, PlanLogFindings, BRANCH_ENV_NAME};

/// Name and description given to temporary agent pools and tokens.
pub const AGENT_POOL_NAME: &str = "SMK";

/// `organization id -> workspace id -> variable id -> variable key`.
pub type SensitiveVariables = BTreeMap<String, BTreeMap<String, BTreeMap<String, String>>>;

/// Groups sensitive variables by organization and workspace.
///
/// Variables whose workspace or organization cannot be resolved are skipped.
pub fn group_sensitive_variables(document: &TfcDocument) -> SensitiveVariables {
    let mut grouped = SensitiveVariables::new();

    for variable in document.workspace_variables.iter().filter(|v| v.is_sensitive()) {
        let Some(workspace_id) = variable.workspace_id() else {
            warn!(variable = %variable.id, "Sensitive variable has no workspace. Ignoring.");
            continue;
        };
        let Some(workspace) = document.find_workspace(workspace_id) else {
            warn!(workspace = workspace_id, "Could not find workspace");
            continue;
        };
        let Some(organization_id) = workspace.organization_id() else {
            warn!(workspace = workspace_id, "Workspace has no organization. Ignoring.");
            continue;
        };

        grouped
            .entry(organization_id.to_string())
            .or_default()
            .entry(workspace_id.to_string())
            .or_default()
            .insert(variable.id.clone(), variable.attributes.key.clone());
    }

    grouped
}

/// Outcome of a recovery pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Docker was unreachable and nothing was attempted.
    pub skipped: bool,
    pub organizations: usize,
    pub workspaces_planned: usize,
    pub variables_recovered: usize,
    pub branches_backfilled: usize,
}

/// Recovers sensitive variable values through a local TFC/TFE agent.
pub struct SensitiveVariableRecovery {
    tfc: Arc<dyn TfcApi>,
    runtime: Arc<dyn ContainerRuntime>,
    agent_image: String,
    log_wait: LogWait,
}

impl SensitiveVariableRecovery {
    pub fn new(tfc: Arc<dyn TfcApi>, runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self::with_config(tfc, runtime, &RecoveryConfig::default())
    }

    pub fn with_config(
        tfc: Arc<dyn TfcApi>,
        runtime: Arc<dyn ContainerRuntime>,
        config: &RecoveryConfig,
    ) -> Self {
        Self {
            tfc,
            runtime,
            agent_image: config.agent_image.clone(),
            log_wait: LogWait {
                initial_delay: config.log_initial_delay(),
                interval: config.log_poll_interval(),
                max_attempts: config.log_poll_attempts,
            },
        }
    }

    /// Overrides how long to wait for plan logs.
    pub fn with_log_wait(mut self, log_wait: LogWait) -> Self {
        self.log_wait = log_wait;
        self
    }

    /// Fills in the values of sensitive variables in `document`.
    ///
    /// Variables whose value does not show up in the plan log keep their
    /// previous value. Errors creating the agent pool, token or container
    /// abort the pass after cleanup.
    pub async fn run(&self, document: &mut TfcDocument) -> Result<RecoveryReport, RecoveryError> {
        let mut report = RecoveryReport::default();

        if let Err(e) = self.runtime.ping().await {
            warn!(error = %e, "Docker is not available. Skipping enriching workspace variables data.");
            report.skipped = true;
            return Ok(report);
        }

        let grouped = group_sensitive_variables(document);
        if grouped.is_empty() {
            debug!("No sensitive workspace variables");
            return Ok(report);
        }

        info!("Start enriching workspace variables data");
        for (organization_id, workspaces) in &grouped {
            report.organizations += 1;
            self.recover_organization(document, organization_id, workspaces, &mut report)
                .await?;
        }
        info!(
            recovered = report.variables_recovered,
            planned = report.workspaces_planned,
            "Stop enriching workspace variables data"
        );

        Ok(report)
    }

    async fn recover_organization(
        &self,
        document: &mut TfcDocument,
        organization_id: &str,
        workspaces: &BTreeMap<String, BTreeMap<String, String>>,
        report: &mut RecoveryReport,
    ) -> Result<(), RecoveryError> {
        info!(organization = organization_id, "Start local TFC/TFE agent");

        let agent_pool_id = self
            .tfc
            .create_agent_pool(organization_id, AGENT_POOL_NAME)
            .await?;
        info!(agent_pool = %agent_pool_id, "Created agent pool");

        let result = self
            .recover_with_pool(document, organization_id, &agent_pool_id, workspaces, report)
            .await;

        info!(agent_pool = %agent_pool_id, "Deleting agent pool");
        if let Err(e) = self.tfc.delete_agent_pool(&agent_pool_id).await {
            error!(agent_pool = %agent_pool_id, error = %e, "Failed to delete agent pool, delete it manually");
        }

        result
    }

    async fn recover_with_pool(
        &self,
        document: &mut TfcDocument,
        organization_id: &str,
        agent_pool_id: &str,
        workspaces: &BTreeMap<String, BTreeMap<String, String>>,
        report: &mut RecoveryReport,
    ) -> Result<(), RecoveryError> {
        let token = self
            .tfc
            .create_agent_token(agent_pool_id, AGENT_POOL_NAME)
            .await?;
        info!(agent_token = %token.id, "Created agent token");

        let container = AgentContainer::start(
            self.runtime.as_ref(),
            organization_id,
            &self.agent_image,
            &token.token,
        )
        .await?;

        for (workspace_id, variables) in workspaces {
            self.recover_workspace(
                document,
                organization_id,
                workspace_id,
                agent_pool_id,
                variables,
                report,
            )
            .await;
        }

        info!(organization = organization_id, "Stop local TFC/TFE agent");
        container.teardown(self.runtime.as_ref()).await?;
        Ok(())
    }

    async fn recover_workspace(
        &self,
        document: &mut TfcDocument,
        organization_id: &str,
        workspace_id: &str,
        agent_pool_id: &str,
        variables: &BTreeMap<String, String>,
        report: &mut RecoveryReport,
    ) {
        let has_configuration = document
            .find_workspace(workspace_id)
            .and_then(|w| w.current_configuration_version_id())
            .is_some();
        if !has_configuration {
            warn!(
                workspace = %format!("{organization_id}/{workspace_id}"),
                "Workspace has no current configuration. Ignoring."
            );
            return;
        }

        let Some(log) = self.plan_workspace(workspace_id, agent_pool_id).await else {
            return;
        };
        report.workspaces_planned += 1;

        let findings = scan(&log, variables);
        for (variable_id, value) in findings.values {
            match document.find_variable_mut(&variable_id) {
                Some(variable) => {
                    debug!(
                        variable = %variable.attributes.key,
                        value = %mask(&value),
                        "Recovered sensitive variable"
                    );
                    variable.attributes.value = Some(value);
                    report.variables_recovered += 1;
                }
                None => warn!(variable = %variable_id, "Could not find variable"),
            }
        }

        if let Some(branch) = findings.branch {
            if let Some(workspace) = document.find_workspace_mut(workspace_id) {
                if workspace.vcs_branch().is_none() {
                    debug!(workspace = workspace_id, branch = %branch, "Backfilling VCS branch");
                    workspace
                        .attributes
                        .vcs_repo
                        .get_or_insert_with(VcsRepo::default)
                        .branch = Some(branch);
                    report.branches_backfilled += 1;
                }
            }
        }
    }

    /// Runs a plan on the agent pool and returns its log.
    ///
    /// Failures are logged and reported as `None` so the pass moves on to the
    /// next workspace.
    async fn plan_workspace(&self, workspace_id: &str, agent_pool_id: &str) -> Option<String> {
        info!(workspace = workspace_id, "Backing up the workspace execution mode");
        let backup = match self.tfc.get_execution_settings(workspace_id).await {
            Ok(backup) => backup,
            Err(e) => {
                error!(workspace = workspace_id, error = %e, "Failed to read workspace execution mode");
                return None;
            }
        };

        info!(workspace = workspace_id, "Updating the workspace to use the TFC/TFE agent");
        let run = match self.tfc.use_agent_pool(workspace_id, agent_pool_id).await {
            Ok(()) => {
                info!(workspace = workspace_id, "Triggering a plan");
                self.tfc.create_plan_only_run(workspace_id).await
            }
            Err(e) => Err(e),
        };

        info!(workspace = workspace_id, "Restoring the workspace execution mode");
        if let Err(e) = self
            .tfc
            .restore_execution_settings(workspace_id, &backup)
            .await
        {
            error!(
                workspace = workspace_id,
                error = %e,
                "Failed to restore the workspace execution mode, it is still using the agent pool"
            );
        }

        let plan_id = match run {
            Ok(plan_id) => plan_id,
            Err(e) => {
                error!(workspace = workspace_id, error = %e, "Failed to trigger a plan");
                return None;
            }
        };

        info!(workspace = workspace_id, plan = %plan_id, "Retrieving the plan output");
        let url = match self.tfc.get_plan_log_url(&plan_id).await {
            Ok(url) => url,
            Err(e) => {
                error!(plan = %plan_id, error = %e, "Failed to fetch plan");
                return None;
            }
        };

        match wait_for_log(self.tfc.as_ref(), &url, &self.log_wait).await {
            Ok(Some(log)) => Some(log),
            Ok(None) => {
                warn!(plan = %plan_id, "Plan log is still empty. Ignoring workspace.");
                None
            }
            Err(e) => {
                error!(plan = %plan_id, error = %e, "Failed to download plan log");
                None
            }
        }
    }
}
