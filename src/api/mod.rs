//! API clients for the SaaS platforms involved in a migration.
//!
//! - [`tfc`]: TFC/TFE REST API (JSON:API), source of the migration.
//! - [`spacelift`]: Spacelift GraphQL API, destination of the migration.
//!
//! Workflows depend on the [`TfcApi`] and [`SpaceliftApi`] traits so they can
//! run against test doubles.

pub mod spacelift;
pub mod tfc;

pub use spacelift::{ConfigElement, SpaceliftApi, SpaceliftClient, StackPage, FILE_MOUNT};
pub use tfc::{AgentToken, ExecutionSettings, TfcApi, TfcClient};
