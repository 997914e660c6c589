//! Docker API wrapper using the bollard crate.
//!
//! This module provides the [`ContainerRuntime`] interface the recovery
//! workflow drives, and its bollard implementation.

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, RemoveContainerOptions,
    StartContainerOptions, StopContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::Docker;
use futures::StreamExt;

use crate::error::ContainerError;

/// Configuration for creating a new container.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerConfig {
    /// Unique name for the container.
    pub name: String,
    /// Docker image to use.
    pub image: String,
    /// Environment variables (`KEY=value`).
    pub env: Vec<String>,
}

impl ContainerConfig {
    /// Creates a new container configuration with the given name and image.
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            env: Vec::new(),
        }
    }

    /// Adds an environment variable.
    pub fn with_env(mut self, key: &str, value: &str) -> Self {
        self.env.push(format!("{key}={value}"));
        self
    }
}

/// What `inspect` reports about an existing container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInfo {
    pub id: String,
    pub image: Option<String>,
    pub running: bool,
}

/// Container operations used by the recovery workflow.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Checks that the daemon answers.
    async fn ping(&self) -> Result<(), ContainerError>;

    /// Inspects a container by name or id. `None` when it does not exist.
    async fn inspect(&self, name: &str) -> Result<Option<ContainerInfo>, ContainerError>;

    async fn start(&self, id: &str) -> Result<(), ContainerError>;

    /// Pulls the image if needed and creates a detached container without
    /// starting it.
    ///
    /// # Returns
    ///
    /// The container ID on success.
    async fn create(&self, config: &ContainerConfig) -> Result<String, ContainerError>;

    /// Stops a container. Fails with `ContainerNotFound` if it is gone.
    async fn stop(&self, id: &str) -> Result<(), ContainerError>;

    /// Force-removes a container. Fails with `ContainerNotFound` if it is gone.
    async fn remove(&self, id: &str) -> Result<(), ContainerError>;
}

/// Docker client wrapper for container operations.
pub struct DockerClient {
    docker: Docker,
}

impl DockerClient {
    /// Creates a new Docker client connecting to the local Docker daemon.
    ///
    /// # Errors
    ///
    /// Returns `ContainerError::DaemonUnavailable` if the Docker daemon is not accessible.
    pub fn new() -> Result<Self, ContainerError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| ContainerError::DaemonUnavailable(format!("Failed to connect: {e}")))?;

        Ok(Self { docker })
    }

    async fn image_exists(&self, image: &str) -> bool {
        self.docker.inspect_image(image).await.is_ok()
    }

    async fn pull_image(&self, image: &str) -> Result<(), ContainerError> {
        tracing::info!(image, "Pulling image");
        let options = CreateImageOptions {
            from_image: image,
            ..Default::default()
        };

        let mut stream = self.docker.create_image(Some(options), None, None);

        while let Some(result) = stream.next().await {
            result.map_err(|e| ContainerError::PullFailed {
                image: image.to_string(),
                reason: e.to_string(),
            })?;
        }

        Ok(())
    }
}

/// Maps a bollard error, turning HTTP 404 into `ContainerNotFound`.
fn map_error(id: &str, action: &str, error: bollard::errors::Error) -> ContainerError {
    match error {
        bollard::errors::Error::DockerResponseServerError {
            status_code: 404, ..
        } => ContainerError::ContainerNotFound { id: id.to_string() },
        other => ContainerError::RunFailed(format!("Failed to {action} container: {other}")),
    }
}

#[async_trait]
impl ContainerRuntime for DockerClient {
    async fn ping(&self) -> Result<(), ContainerError> {
        self.docker
            .ping()
            .await
            .map_err(|e| ContainerError::DaemonUnavailable(e.to_string()))?;
        Ok(())
    }

    async fn inspect(&self, name: &str) -> Result<Option<ContainerInfo>, ContainerError> {
        match self
            .docker
            .inspect_container(name, None::<InspectContainerOptions>)
            .await
        {
            Ok(info) => Ok(Some(ContainerInfo {
                id: info.id.unwrap_or_else(|| name.to_string()),
                image: info.config.and_then(|c| c.image),
                running: info.state.and_then(|s| s.running).unwrap_or(false),
            })),
            Err(e) => match map_error(name, "inspect", e) {
                ContainerError::ContainerNotFound { .. } => Ok(None),
                other => Err(other),
            },
        }
    }

    async fn start(&self, id: &str) -> Result<(), ContainerError> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| map_error(id, "start", e))
    }

    async fn create(&self, config: &ContainerConfig) -> Result<String, ContainerError> {
        if !self.image_exists(&config.image).await {
            self.pull_image(&config.image).await?;
        }

        let options = CreateContainerOptions {
            name: config.name.clone(),
            platform: None,
        };
        let container_config = Config {
            image: Some(config.image.clone()),
            env: if config.env.is_empty() {
                None
            } else {
                Some(config.env.clone())
            },
            attach_stdin: Some(false),
            attach_stdout: Some(false),
            attach_stderr: Some(false),
            ..Default::default()
        };

        let response = self
            .docker
            .create_container(Some(options), container_config)
            .await
            .map_err(|e| ContainerError::RunFailed(format!("Failed to create container: {e}")))?;

        Ok(response.id)
    }

    /// Sends SIGTERM and waits up to 10 seconds before sending SIGKILL.
    async fn stop(&self, id: &str) -> Result<(), ContainerError> {
        let options = StopContainerOptions { t: 10 };

        match self.docker.stop_container(id, Some(options)).await {
            Ok(()) => Ok(()),
            // Already stopped.
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 304, ..
            }) => Ok(()),
            Err(e) => Err(map_error(id, "stop", e)),
        }
    }

    async fn remove(&self, id: &str) -> Result<(), ContainerError> {
        let options = RemoveContainerOptions {
            force: true,
            v: true,
            ..Default::default()
        };

        self.docker
            .remove_container(id, Some(options))
            .await
            .map_err(|e| map_error(id, "remove", e))
    }
}
