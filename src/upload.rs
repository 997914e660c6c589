//! Upload of Terraform state files to S3.
//!
//! State files downloaded during extraction live in
//! `{tmp}/state-files/{organization}/{workspace id}.tfstate`. Each one is
//! uploaded as `{organization}/{stack}/{stack}.tfstate`, the stack being the
//! one built from that workspace.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::document::StackDocument;
use crate::error::UploadError;

/// Subfolder of the temporary folder holding state files.
pub const STATE_FILES_FOLDER: &str = "state-files";

/// A state file and where it goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateFile {
    pub path: PathBuf,
    pub object_key: String,
}

/// Object key of a stack's state file.
pub fn object_key(organization_folder: &str, stack_name: &str) -> String {
    format!("{organization_folder}/{stack_name}/{stack_name}.tfstate")
}

/// State files found on disk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateFileListing {
    pub files: Vec<StateFile>,
    /// Files whose workspace has no stack.
    pub skipped: usize,
}

/// Lists state files and resolves their object keys.
///
/// Files whose workspace has no stack in `document` are skipped with a
/// warning, as are stray entries at either level of the folder.
pub fn list_state_files(document: &StackDocument, folder: &Path) -> StateFileListing {
    let mut listing = StateFileListing::default();

    let entries = WalkDir::new(folder)
        .min_depth(1)
        .max_depth(2)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(error = %e, "Could not read state files folder entry. Ignoring.");
                None
            }
        });

    for entry in entries {
        let path = entry.path();
        let is_dir = entry.file_type().is_dir();

        if entry.depth() == 1 {
            if !is_dir {
                warn!(path = %path.display(), "Not a folder. Ignoring.");
            }
            continue;
        }

        if !entry.file_type().is_file() {
            warn!(path = %path.display(), "Not a file. Ignoring.");
            continue;
        }

        let (Some(workspace_id), Some(organization_folder)) = (
            path.file_stem().and_then(|s| s.to_str()),
            path.parent()
                .and_then(Path::file_name)
                .and_then(|s| s.to_str()),
        ) else {
            warn!(path = %path.display(), "Unexpected state file name. Ignoring.");
            continue;
        };

        let Some(stack_name) = document
            .find_stack_by_source_id(workspace_id)
            .and_then(|stack| stack.name.as_deref())
        else {
            warn!(workspace = workspace_id, "Could not find stack for workspace. Ignoring.");
            listing.skipped += 1;
            continue;
        };

        listing.files.push(StateFile {
            path: path.to_path_buf(),
            object_key: object_key(organization_folder, stack_name),
        });
    }

    listing
}

/// Destination of state file uploads.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn upload_file(&self, path: &Path, key: &str) -> Result<(), UploadError>;
}

/// S3 bucket as an [`ObjectStore`].
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

impl S3ObjectStore {
    /// Creates a store using the AWS configuration from the environment.
    pub async fn from_env(bucket: impl Into<String>) -> Self {
        let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self {
            client: Client::new(&aws_config),
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn upload_file(&self, path: &Path, key: &str) -> Result<(), UploadError> {
        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| UploadError::UploadFailed {
                file: path.display().to_string(),
                reason: e.to_string(),
            })?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .map_err(|e| UploadError::UploadFailed {
                file: path.display().to_string(),
                reason: e.to_string(),
            })?;

        Ok(())
    }
}

/// Outcome of an upload run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadReport {
    pub uploaded: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Uploads state files one by one. Failures are logged and not retried.
pub async fn upload_state_files(store: &dyn ObjectStore, listing: &StateFileListing) -> UploadReport {
    let mut report = UploadReport {
        skipped: listing.skipped,
        ..Default::default()
    };

    for file in &listing.files {
        debug!(path = %file.path.display(), key = %file.object_key, "Uploading state file");
        match store.upload_file(&file.path, &file.object_key).await {
            Ok(()) => report.uploaded += 1,
            Err(e) => {
                error!(key = %file.object_key, error = %e, "Failed to upload state file");
                report.failed += 1;
            }
        }
    }

    info!(
        uploaded = report.uploaded,
        failed = report.failed,
        skipped = report.skipped,
        "State files upload done"
    );
    report
}
