//! Makes old migrated tfvars files editable.
//!
//! Early migrations mounted variables with invalid Terraform names as two
//! files on each stack, both write-only. When a stack still has the secret
//! file write-only, the non-secret file is re-saved as editable.

use std::sync::Arc;

use tracing::{info, warn};

use crate::api::{ConfigElement, SpaceliftApi};
use crate::error::ApiError;

/// Suffix of the non-secret tfvars file.
pub const TFVARS_SUFFIX: &str = "/tf_vars_with_invalid_name.auto.tfvars";

/// Suffix of the secret tfvars file.
pub const SECRET_TFVARS_SUFFIX: &str = "/tf_secret_vars_with_invalid_name.auto.tfvars";

/// What to do with a stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TfvarsDecision {
    /// Make this file editable.
    MakeEditable(ConfigElement),
    /// Both files exist but the secret file is editable already.
    SecretNotWriteOnly,
    /// At least one of the two files is missing.
    NotBothFound,
}

/// Decides what to do from the runtime config of a stack.
pub fn decide(elements: &[ConfigElement]) -> TfvarsDecision {
    let mounted_files = elements.iter().filter(|e| e.is_file_mount());

    let mut tfvars = None;
    let mut secret_tfvars = None;
    for file in mounted_files {
        if file.id.ends_with(TFVARS_SUFFIX) {
            tfvars = Some(file);
        }
        if file.id.ends_with(SECRET_TFVARS_SUFFIX) {
            secret_tfvars = Some(file);
        }
    }

    match (tfvars, secret_tfvars) {
        (Some(tfvars), Some(secret)) if secret.write_only => {
            TfvarsDecision::MakeEditable(tfvars.clone())
        }
        (Some(_), Some(_)) => TfvarsDecision::SecretNotWriteOnly,
        _ => TfvarsDecision::NotBothFound,
    }
}

/// Outcome of a migration run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub dry_run: bool,
    pub processed: usize,
    pub eligible: usize,
    pub updated: usize,
    pub limit_reached: bool,
}

/// Walks every stack and makes old tfvars files editable.
pub struct TfvarsMigration {
    spacelift: Arc<dyn SpaceliftApi>,
}

impl TfvarsMigration {
    pub fn new(spacelift: Arc<dyn SpaceliftApi>) -> Self {
        Self { spacelift }
    }

    /// Lists the ids of every stack, following the search cursor.
    pub async fn stack_ids(&self) -> Result<Vec<String>, ApiError> {
        let mut stack_ids = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let page = self.spacelift.search_stacks(cursor.as_deref()).await?;
            stack_ids.extend(page.stack_ids);

            match page.end_cursor {
                Some(end_cursor) if page.has_next_page => cursor = Some(end_cursor),
                _ => break,
            }
        }

        Ok(stack_ids)
    }

    /// Runs the migration.
    ///
    /// In dry-run mode nothing is changed and `limit` is ignored. Otherwise the
    /// run stops once `limit` files have been updated.
    pub async fn run(&self, dry_run: bool, limit: usize) -> Result<MigrationReport, ApiError> {
        info!("Making old tfvars files editable");
        if dry_run {
            warn!("This is a dry run. No changes will be made and the limit will be ignored.");
        }

        let mut report = MigrationReport {
            dry_run,
            ..Default::default()
        };

        for stack_id in self.stack_ids().await? {
            info!(stack = %stack_id, "Processing stack");
            report.processed += 1;

            let elements = self.spacelift.stack_config_elements(&stack_id).await?;
            match decide(&elements) {
                TfvarsDecision::MakeEditable(file) => {
                    info!(
                        stack = %stack_id,
                        "Found both tfvars files and the secret tfvars file is write-only"
                    );
                    report.eligible += 1;
                    if dry_run {
                        warn!(
                            stack = %stack_id,
                            file = %file.id,
                            "Would have updated visibility if dry run was not enabled"
                        );
                    } else if self.make_editable(&stack_id, &file).await? {
                        report.updated += 1;
                    }
                }
                TfvarsDecision::SecretNotWriteOnly => info!(
                    stack = %stack_id,
                    "Found both tfvars files but the secret tfvars file is not write-only. Ignoring."
                ),
                TfvarsDecision::NotBothFound => {
                    info!(stack = %stack_id, "Did not find both tfvars files. Ignoring.")
                }
            }

            if !dry_run && report.updated >= limit {
                warn!(limit, "Reached the limit. Stopping.");
                report.limit_reached = true;
                break;
            }
        }

        Ok(report)
    }

    /// Re-saves a mounted file as not write-only. Returns `false` when the
    /// file content is not readable.
    async fn make_editable(&self, stack_id: &str, file: &ConfigElement) -> Result<bool, ApiError> {
        let Some(content) = file.value.as_deref() else {
            warn!(
                stack = stack_id,
                file = %file.id,
                "Content of the tfvars file is not readable. Ignoring."
            );
            return Ok(false);
        };

        warn!(stack = stack_id, file = %file.id, "Updating visibility to not write-only");
        self.spacelift
            .set_mounted_file(stack_id, &file.id, content, false)
            .await?;
        Ok(true)
    }
}
