//! Lifecycle of the local TFC/TFE agent container.
//!
//! An [`AgentContainer`] is started for one organization pass and must be
//! handed back to [`AgentContainer::teardown`] on every exit path. A container
//! that already vanished at teardown counts as cleaned up.

use tracing::{debug, info, warn};

use crate::error::ContainerError;
use crate::execution::docker_client::{ContainerConfig, ContainerRuntime};

/// Agent name reported to TFC/TFE.
pub const AGENT_NAME: &str = "SMK-Agent";

/// Name of the agent container for an organization.
pub fn agent_container_name(organization_id: &str) -> String {
    format!("smk-tfc-agent-{organization_id}")
}

/// A running TFC/TFE agent container.
#[derive(Debug)]
pub struct AgentContainer {
    id: String,
    name: String,
    reused: bool,
}

impl AgentContainer {
    /// Starts the agent container for an organization.
    ///
    /// A container with the same name is reused (and started if stopped)
    /// instead of creating a new one. A new container that fails to start is
    /// removed before the error is returned.
    pub async fn start(
        runtime: &dyn ContainerRuntime,
        organization_id: &str,
        image: &str,
        agent_token: &str,
    ) -> Result<Self, ContainerError> {
        let name = agent_container_name(organization_id);

        if let Some(existing) = runtime.inspect(&name).await? {
            info!(container = %name, "Found an existing agent container, using it instead of starting a new one");
            if !existing.running {
                runtime.start(&existing.id).await?;
            }
            debug!(
                container_id = %existing.id,
                image = existing.image.as_deref().unwrap_or("unknown"),
                "Reusing agent container"
            );
            return Ok(Self {
                id: existing.id,
                name,
                reused: true,
            });
        }

        let config = ContainerConfig::new(&name, image)
            .with_env("TFC_AGENT_NAME", AGENT_NAME)
            .with_env("TFC_AGENT_TOKEN", agent_token);
        let id = runtime.create(&config).await?;

        if let Err(e) = runtime.start(&id).await {
            // A leftover container would be reused with a revoked token.
            warn!(container_id = %id, error = %e, "Failed to start agent container, removing it");
            if let Err(remove_error) = runtime.remove(&id).await {
                warn!(
                    container_id = %id,
                    error = %remove_error,
                    "Failed to remove agent container, remove it manually"
                );
            }
            return Err(e);
        }
        debug!(container_id = %id, image, "Running agent container");

        Ok(Self {
            id,
            name,
            reused: false,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_reused(&self) -> bool {
        self.reused
    }

    /// Stops and removes the container.
    pub async fn teardown(self, runtime: &dyn ContainerRuntime) -> Result<(), ContainerError> {
        info!(container = %self.name, "Stopping agent container");

        match runtime.stop(&self.id).await {
            Ok(()) => {}
            Err(ContainerError::ContainerNotFound { id }) => {
                warn!(container_id = %id, "Could not find agent container to stop it. Ignoring.");
                return Ok(());
            }
            // Removal is forced, so a failed stop is not final.
            Err(e) => warn!(error = %e, "Failed to stop agent container"),
        }

        match runtime.remove(&self.id).await {
            Ok(()) => Ok(()),
            Err(ContainerError::ContainerNotFound { id }) => {
                warn!(container_id = %id, "Agent container already removed. Ignoring.");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
