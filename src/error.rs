//! Error types for spacemk-custom operations.
//!
//! Defines error types for each subsystem:
//! - TFC/TFE and Spacelift API calls
//! - Docker container management
//! - Configuration loading
//! - Extracted document loading and saving
//! - State file uploads
//! - Template rendering

use thiserror::Error;

/// Errors that can occur while talking to the TFC/TFE or Spacelift APIs.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("API error ({code}) on {path}: {message}")]
    UnexpectedStatus {
        path: String,
        code: u16,
        message: String,
    },

    #[error("GraphQL errors: {0}")]
    GraphQl(String),

    #[error("Missing field '{field}' in response from {path}")]
    MissingField { path: String, field: String },

    #[error("Failed to parse response: {0}")]
    ParseError(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors that can occur during Docker operations.
#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("Docker run failed: {0}")]
    RunFailed(String),

    #[error("Container '{id}' not found")]
    ContainerNotFound { id: String },

    #[error("Failed to pull image '{image}': {reason}")]
    PullFailed { image: String, reason: String },

    #[error("Docker daemon not available: {0}")]
    DaemonUnavailable(String),
}

/// Errors that abort the sensitive variable recovery of an organization.
#[derive(Debug, Error)]
pub enum RecoveryError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Container error: {0}")]
    Container(#[from] ContainerError),
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing configuration value: {0}")]
    MissingValue(String),

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to read configuration file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Errors that can occur while reading or writing extracted documents.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("Document '{0}' not found")]
    NotFound(String),

    #[error("Failed to parse document '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors that can occur while uploading state files.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Failed to upload file '{file}': {reason}")]
    UploadFailed { file: String, reason: String },
}

/// Errors that can occur while rendering Terraform code.
#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("Template directory '{0}' not found")]
    TemplateDirNotFound(String),

    #[error("Tera template rendering error: {0}")]
    Tera(#[from] tera::Error),

    #[error("Document error: {0}")]
    Document(#[from] DocumentError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
