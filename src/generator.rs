//! Terraform code generation from the extracted stack document.
//!
//! The document is filtered by stack type, written next to the original as
//! `data.filtered.json`, then rendered through a Tera template.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tera::{Context, Tera};
use tracing::info;

use crate::document::{self, StackDocument};
use crate::error::GeneratorError;
use crate::filter::{filter_stacks, StackType};

/// Template rendered by `generate`.
pub const MAIN_TEMPLATE: &str = "main.tf.tera";

/// Template rendered by `generate-jenkins-stacks`.
pub const JENKINS_TEMPLATE: &str = "jenkins.tf.tera";

/// File name of the filtered document.
pub const FILTERED_DATA_FILE_NAME: &str = "data.filtered.json";

/// Variables passed to templates next to the document.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExtraVars {
    /// Adds a lifecycle argument ignoring changes to stack branches.
    pub ignore_branch_changes: bool,
}

/// Renders Terraform code from stack documents.
pub struct Generator {
    tera: Tera,
    output_dir: PathBuf,
}

impl Generator {
    /// Loads every template under `templates_dir`.
    pub fn new(templates_dir: &Path, output_dir: impl Into<PathBuf>) -> Result<Self, GeneratorError> {
        if !templates_dir.is_dir() {
            return Err(GeneratorError::TemplateDirNotFound(
                templates_dir.display().to_string(),
            ));
        }

        let glob = format!("{}/**/*", templates_dir.display());
        let mut tera = Tera::new(&glob)?;
        tera.autoescape_on(vec![]);

        Ok(Self {
            tera,
            output_dir: output_dir.into(),
        })
    }

    /// Renders `template_name` into `{output_dir}/main.tf` and returns the written path.
    pub fn render(
        &self,
        document: &StackDocument,
        template_name: &str,
        extra_vars: &ExtraVars,
    ) -> Result<PathBuf, GeneratorError> {
        let mut context = Context::new();
        context.insert("stacks", &document.stacks);
        context.insert("stack_variables", &document.stack_variables);
        context.insert("extra_vars", extra_vars);

        let rendered = self.tera.render(template_name, &context)?;

        std::fs::create_dir_all(&self.output_dir)?;
        let path = self.output_dir.join("main.tf");
        std::fs::write(&path, rendered)?;

        info!(template = template_name, path = %path.display(), "Generated Terraform code");
        Ok(path)
    }

    /// Filters the document of `tmp_folder` by stack type and renders it.
    pub fn generate(
        &self,
        tmp_folder: &Path,
        stack_type: StackType,
        extra_vars: &ExtraVars,
    ) -> Result<PathBuf, GeneratorError> {
        let data: StackDocument = document::load(&document::data_file_path(tmp_folder))?;
        let filtered = filter_stacks(data, stack_type);
        document::save(&filtered, &tmp_folder.join(FILTERED_DATA_FILE_NAME))?;

        self.render(&filtered, MAIN_TEMPLATE, extra_vars)
    }

    /// Renders the unfiltered document of `tmp_folder` through a fixed template.
    pub fn generate_with_template(
        &self,
        tmp_folder: &Path,
        template_name: &str,
    ) -> Result<PathBuf, GeneratorError> {
        let data: StackDocument = document::load(&document::data_file_path(tmp_folder))?;
        self.render(&data, template_name, &ExtraVars::default())
    }
}
