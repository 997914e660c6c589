//! Typed records for the document extracted from TFC/TFE.
//!
//! Records follow the JSON:API layout returned by the TFC API
//! (`attributes`, `relationships`). Fields this crate does not act on are
//! kept in flattened `extra` maps so a loaded document writes back unchanged.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Document extracted from TFC/TFE.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TfcDocument {
    #[serde(default, deserialize_with = "super::null_as_default")]
    pub organizations: Vec<Organization>,
    #[serde(default, deserialize_with = "super::null_as_default")]
    pub workspaces: Vec<Workspace>,
    #[serde(default, deserialize_with = "super::null_as_default")]
    pub workspace_variables: Vec<WorkspaceVariable>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TfcDocument {
    pub fn find_workspace(&self, workspace_id: &str) -> Option<&Workspace> {
        self.workspaces.iter().find(|w| w.id == workspace_id)
    }

    pub fn find_workspace_mut(&mut self, workspace_id: &str) -> Option<&mut Workspace> {
        self.workspaces.iter_mut().find(|w| w.id == workspace_id)
    }

    pub fn find_variable_mut(&mut self, variable_id: &str) -> Option<&mut WorkspaceVariable> {
        self.workspace_variables
            .iter_mut()
            .find(|v| v.id == variable_id)
    }
}

/// JSON:API resource identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceIdentifier {
    pub id: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

/// JSON:API to-one relationship. `data` is `null` when unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    #[serde(default)]
    pub data: Option<ResourceIdentifier>,
}

impl Relationship {
    pub fn id(&self) -> Option<&str> {
        self.data.as_ref().map(|d| d.id.as_str())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Organization {
    pub id: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Workspace {
    pub id: String,
    #[serde(default, deserialize_with = "super::null_as_default")]
    pub attributes: WorkspaceAttributes,
    #[serde(default, deserialize_with = "super::null_as_default")]
    pub relationships: WorkspaceRelationships,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Workspace {
    pub fn organization_id(&self) -> Option<&str> {
        self.relationships
            .organization
            .as_ref()
            .and_then(Relationship::id)
    }

    pub fn current_configuration_version_id(&self) -> Option<&str> {
        self.relationships
            .current_configuration_version
            .as_ref()
            .and_then(Relationship::id)
    }

    /// Branch of the VCS connection, if set and non-empty.
    pub fn vcs_branch(&self) -> Option<&str> {
        self.attributes
            .vcs_repo
            .as_ref()
            .and_then(|repo| repo.branch.as_deref())
            .filter(|branch| !branch.is_empty())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkspaceAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "vcs-repo", default, skip_serializing_if = "Option::is_none")]
    pub vcs_repo: Option<VcsRepo>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VcsRepo {
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkspaceRelationships {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<Relationship>,
    #[serde(
        rename = "current-configuration-version",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub current_configuration_version: Option<Relationship>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkspaceVariable {
    pub id: String,
    #[serde(default, deserialize_with = "super::null_as_default")]
    pub attributes: VariableAttributes,
    #[serde(default, deserialize_with = "super::null_as_default")]
    pub relationships: VariableRelationships,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl WorkspaceVariable {
    pub fn workspace_id(&self) -> Option<&str> {
        self.relationships
            .workspace
            .as_ref()
            .and_then(Relationship::id)
    }

    /// Only an explicit `"sensitive": true` counts. A missing or `null` flag
    /// is treated as not sensitive, so such variables are never recovered.
    pub fn is_sensitive(&self) -> bool {
        self.attributes.sensitive == Some(true)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VariableAttributes {
    #[serde(default, deserialize_with = "super::null_as_default")]
    pub key: String,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensitive: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VariableRelationships {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<Relationship>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
