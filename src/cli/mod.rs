//! Command-line interface for spacemk-custom.
//!
//! Provides the generation commands, the exporter hooks, the tfvars migration
//! and the state files upload.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands};
