//! Extracted documents.
//!
//! Two shapes are handled: the raw [`TfcDocument`] exported from TFC/TFE, and
//! the [`StackDocument`] of Spacelift stacks the generator renders. Both are
//! plain JSON files in the temporary folder of a migration run.

pub mod stacks;
pub mod tfc;

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::DocumentError;

pub use stacks::{has_repository, Stack, StackDocument, StackVariable, VcsConfig};
pub use tfc::{Relationship, TfcDocument, Workspace, WorkspaceVariable};

/// File name of the extracted document inside the temporary folder.
pub const DATA_FILE_NAME: &str = "data.json";

/// Path of the extracted document for a temporary folder.
pub fn data_file_path(tmp_folder: &Path) -> PathBuf {
    tmp_folder.join(DATA_FILE_NAME)
}

/// Reads an explicit `null` the same as a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Loads and validates a JSON document.
pub fn load<T: DeserializeOwned>(path: &Path) -> Result<T, DocumentError> {
    if !path.exists() {
        return Err(DocumentError::NotFound(path.display().to_string()));
    }

    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(|source| DocumentError::Parse {
        path: path.display().to_string(),
        source,
    })
}

/// Writes a document as pretty JSON, creating parent folders.
pub fn save<T: Serialize>(document: &T, path: &Path) -> Result<(), DocumentError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let content = serde_json::to_string_pretty(document)?;
    std::fs::write(path, content)?;
    Ok(())
}
