//! Typed records for the Spacelift-shaped document the generator renders.
//!
//! Stacks carry the id of the workspace they were built from in `_source_id`
//! and denormalized parent data under `_relationships`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Document of stacks and their variables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StackDocument {
    #[serde(default, deserialize_with = "super::null_as_default")]
    pub stacks: Vec<Stack>,
    #[serde(default, deserialize_with = "super::null_as_default")]
    pub stack_variables: Vec<StackVariable>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StackDocument {
    /// Finds the stack built from the given workspace id.
    pub fn find_stack_by_source_id(&self, source_id: &str) -> Option<&Stack> {
        self.stacks
            .iter()
            .find(|s| s.source_id.as_deref() == Some(source_id))
    }
}

/// VCS settings of a stack.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VcsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_root: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl VcsConfig {
    /// Synthetic VCS settings given to stacks that have none.
    pub fn synthetic_default() -> Self {
        let mut vcs = Self::default();
        vcs.apply_synthetic_default();
        vcs
    }

    /// Overwrites the five VCS fields with the synthetic values, keeping any
    /// other field already present.
    pub fn apply_synthetic_default(&mut self) {
        self.branch = Some("master".to_string());
        self.namespace = Some("CloudAutomation".to_string());
        self.project_root = Some("terraform/".to_string());
        self.provider = Some("github_custom".to_string());
        self.repository = Some("dummy-spacectl-repo".to_string());
    }
}

/// True when the VCS settings point at an actual repository.
pub fn has_repository(vcs: Option<&VcsConfig>) -> bool {
    vcs.and_then(|v| v.repository.as_deref())
        .is_some_and(|repo| !repo.is_empty())
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpaceRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Stack {
    #[serde(rename = "_source_id", default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vcs: Option<VcsConfig>,
    #[serde(rename = "_relationships", default, deserialize_with = "super::null_as_default")]
    pub relationships: StackRelationships,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Stack {
    pub fn has_vcs_config(&self) -> bool {
        has_repository(self.vcs.as_ref())
    }

    /// `space/name` label for log output.
    pub fn label(&self) -> String {
        format!(
            "{}/{}",
            self.relationships
                .space
                .as_ref()
                .and_then(|s| s.name.as_deref())
                .unwrap_or_default(),
            self.name.as_deref().unwrap_or_default()
        )
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StackRelationships {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub space: Option<SpaceRef>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Denormalized copy of the parent stack held by a variable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StackRef {
    #[serde(rename = "_source_id", default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vcs: Option<VcsConfig>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StackVariable {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "_relationships", default, deserialize_with = "super::null_as_default")]
    pub relationships: StackVariableRelationships,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StackVariable {
    pub fn stack_source_id(&self) -> Option<&str> {
        self.relationships
            .stack
            .as_ref()
            .and_then(|s| s.source_id.as_deref())
    }

    /// `space/stack/name` label for log output.
    pub fn label(&self) -> String {
        format!(
            "{}/{}/{}",
            self.relationships
                .space
                .as_ref()
                .and_then(|s| s.name.as_deref())
                .unwrap_or_default(),
            self.relationships
                .stack
                .as_ref()
                .and_then(|s| s.name.as_deref())
                .unwrap_or_default(),
            self.name.as_deref().unwrap_or_default()
        )
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StackVariableRelationships {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<StackRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub space: Option<SpaceRef>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
