//! Docker execution layer for the local TFC/TFE agent.
//!
//! This module wraps the bollard crate behind the [`ContainerRuntime`] trait
//! and manages the agent container started for each organization pass.
//!
//! # Lifecycle
//!
//! ```text
//! INSPECT → (REUSE | PULL → CREATE → START) → USE → STOP → REMOVE
//! ```

pub mod container;
pub mod docker_client;

pub use container::{agent_container_name, AgentContainer, AGENT_NAME};
pub use docker_client::{ContainerConfig, ContainerInfo, ContainerRuntime, DockerClient};
