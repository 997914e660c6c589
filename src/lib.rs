//! spacemk-custom: customizations for migrating from Terraform Cloud/Enterprise
//! to Spacelift.
//!
//! This library filters extracted stacks before code generation, recovers the
//! values of sensitive workspace variables through a local TFC/TFE agent,
//! makes old mounted tfvars files editable and uploads state files to S3.

pub mod api;
pub mod cli;
pub mod config;
pub mod document;
pub mod error;
pub mod execution;
pub mod filter;
pub mod generator;
pub mod migration;
pub mod recovery;
pub mod upload;

// Re-export commonly used error types
pub use error::{
    ApiError, ConfigError, ContainerError, DocumentError, GeneratorError, RecoveryError,
    UploadError,
};
