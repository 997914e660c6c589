//! Data filtering applied before documents are rendered or written back.
//!
//! - [`filter_stacks`] keeps the stacks matching a [`StackType`], gives stacks
//!   without VCS settings a synthetic default, and drops orphaned variables.
//! - [`drop_aws_access_keys`] removes static AWS credentials from exported
//!   workspace variables.

use std::collections::HashSet;
use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::document::{Stack, StackDocument, TfcDocument, VcsConfig};

/// Workspace variable keys never carried over to Spacelift.
pub const AWS_ACCESS_KEY_NAMES: [&str; 2] = ["AWS_ACCESS_KEY_ID", "AWS_SECRET_ACCESS_KEY"];

/// Which stacks to generate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum StackType {
    /// Every stack; stacks without VCS settings get the synthetic default.
    #[default]
    All,
    /// Only stacks without VCS settings (driven from Jenkins).
    #[value(alias = "jenkins-only")]
    Jenkins,
    /// Only stacks with VCS settings.
    Regular,
}

impl StackType {
    /// Whether stacks without VCS settings are kept.
    fn keeps_stacks_without_vcs(self) -> bool {
        matches!(self, StackType::All | StackType::Jenkins)
    }

    /// Whether stacks with VCS settings are kept.
    fn keeps_stacks_with_vcs(self) -> bool {
        self != StackType::Jenkins
    }
}

impl fmt::Display for StackType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StackType::All => write!(f, "all"),
            StackType::Jenkins => write!(f, "jenkins"),
            StackType::Regular => write!(f, "regular"),
        }
    }
}

/// Keeps the stacks matching `stack_type` and the variables of kept stacks.
///
/// Missing or empty VCS repositories count as "no VCS settings". Nothing here
/// fails: malformed records are simply routed to the no-VCS branch or dropped.
pub fn filter_stacks(mut document: StackDocument, stack_type: StackType) -> StackDocument {
    info!(stack_type = %stack_type, "Start data processing");

    let stacks = std::mem::take(&mut document.stacks);
    let mut kept: Vec<Stack> = Vec::with_capacity(stacks.len());

    for mut stack in stacks {
        if stack.has_vcs_config() {
            if stack_type.keeps_stacks_with_vcs() {
                kept.push(stack);
            } else {
                debug!(stack = %stack.label(), "Ignoring stack because it has a VCS configuration");
            }
        } else if stack_type.keeps_stacks_without_vcs() {
            debug!(stack = %stack.label(), "Setting default VCS values for stack with no VCS configuration");
            stack
                .vcs
                .get_or_insert_with(VcsConfig::default)
                .apply_synthetic_default();
            kept.push(stack);
        } else {
            debug!(stack = %stack.label(), "Ignoring stack because it has no VCS configuration");
        }
    }

    let kept_ids: HashSet<&str> = kept
        .iter()
        .filter_map(|stack| stack.source_id.as_deref())
        .collect();

    let variables = std::mem::take(&mut document.stack_variables);
    let mut kept_variables = Vec::with_capacity(variables.len());

    for mut variable in variables {
        let Some(parent_id) = variable.stack_source_id() else {
            debug!(variable = %variable.label(), "Dropping variable without a parent stack");
            continue;
        };
        if !kept_ids.contains(parent_id) {
            continue;
        }

        if stack_type.keeps_stacks_without_vcs() {
            if let Some(stack_ref) = variable.relationships.stack.as_mut() {
                if !crate::document::has_repository(stack_ref.vcs.as_ref()) {
                    debug!(
                        variable = %variable_label(&stack_ref.name, &variable.name),
                        "Setting default VCS values on the parent stack of variable"
                    );
                    stack_ref.vcs = Some(VcsConfig::synthetic_default());
                }
            }
        }

        kept_variables.push(variable);
    }

    info!(
        stacks = kept.len(),
        stack_variables = kept_variables.len(),
        "Stop data processing"
    );

    document.stacks = kept;
    document.stack_variables = kept_variables;
    document
}

fn variable_label(stack_name: &Option<String>, name: &Option<String>) -> String {
    format!(
        "{}/{}",
        stack_name.as_deref().unwrap_or_default(),
        name.as_deref().unwrap_or_default()
    )
}

/// Removes `AWS_ACCESS_KEY_ID` and `AWS_SECRET_ACCESS_KEY` workspace variables.
pub fn drop_aws_access_keys(document: &mut TfcDocument) {
    document.workspace_variables.retain(|variable| {
        let key = variable.attributes.key.as_str();
        if AWS_ACCESS_KEY_NAMES.contains(&key) {
            debug!(variable = key, "Dropping workspace env var");
            false
        } else {
            true
        }
    });
}
