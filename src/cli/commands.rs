//! CLI command definitions for spacemk-custom.
//!
//! Each subcommand loads the configuration, builds the clients it needs and
//! delegates to the library.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{ArgAction, Parser};
use tracing::{info, warn};

use crate::api::{SpaceliftClient, TfcClient};
use crate::config::Config;
use crate::document::{self, StackDocument, TfcDocument};
use crate::execution::DockerClient;
use crate::filter::{drop_aws_access_keys, StackType};
use crate::generator::{ExtraVars, Generator, JENKINS_TEMPLATE};
use crate::migration::TfvarsMigration;
use crate::recovery::SensitiveVariableRecovery;
use crate::upload::{list_state_files, upload_state_files, S3ObjectStore, STATE_FILES_FOLDER};

/// Default configuration file.
const DEFAULT_CONFIG_FILE: &str = "config.yml";

/// Custom commands and exporter hooks for migrating from TFC/TFE to Spacelift.
#[derive(Parser)]
#[command(name = "spacemk-custom")]
#[command(about = "Custom commands for migrating from Terraform Cloud/Enterprise to Spacelift")]
#[command(version)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,

    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE, global = true)]
    pub config: PathBuf,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Generate Terraform code to manage Spacelift entities.
    #[command(alias = "gen")]
    Generate(GenerateArgs),

    /// Generate Terraform code for Jenkins stacks only.
    GenerateJenkinsStacks(GenerateJenkinsStacksArgs),

    /// Make old tfvars files editable on every stack.
    MakeOldTfvarsEditable(MakeOldTfvarsEditableArgs),

    /// Upload state files to S3.
    UploadStateFiles,

    /// Drop AWS access keys and recover sensitive variable values in an exported document.
    Export(ExportArgs),
}

/// Arguments for `spacemk-custom generate`.
#[derive(Parser, Debug)]
pub struct GenerateArgs {
    /// Type of stacks to generate code for.
    #[arg(long, value_enum, default_value_t = StackType::All)]
    pub stack_type: StackType,

    /// Ignore branch changes on generated stacks.
    #[arg(long)]
    pub ignore_branch_changes: bool,

    /// Directory holding the templates (overrides the configuration).
    #[arg(long)]
    pub templates_dir: Option<PathBuf>,

    /// Output directory (overrides the configuration).
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Arguments for `spacemk-custom generate-jenkins-stacks`.
#[derive(Parser, Debug)]
pub struct GenerateJenkinsStacksArgs {
    /// Directory holding the templates (overrides the configuration).
    #[arg(long)]
    pub templates_dir: Option<PathBuf>,

    /// Output directory (overrides the configuration).
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Arguments for `spacemk-custom make-old-tfvars-editable`.
#[derive(Parser, Debug)]
pub struct MakeOldTfvarsEditableArgs {
    /// Only report what would change.
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub dry_run: bool,

    /// Maximum number of stacks to update.
    #[arg(long, default_value_t = 1)]
    pub limit: usize,
}

/// Arguments for `spacemk-custom export`.
#[derive(Parser, Debug)]
pub struct ExportArgs {
    /// Exported document to read (defaults to `{tmp}/data.json`).
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Where to write the result (defaults to the input path).
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Parse CLI arguments and return the Cli struct.
///
/// This allows main.rs to access CLI arguments (like log_level) before running commands.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;

    match cli.command {
        Commands::Generate(args) => run_generate_command(&config, args),
        Commands::GenerateJenkinsStacks(args) => run_generate_jenkins_stacks_command(&config, args),
        Commands::MakeOldTfvarsEditable(args) => {
            run_make_old_tfvars_editable_command(&config, args).await
        }
        Commands::UploadStateFiles => run_upload_state_files_command(&config).await,
        Commands::Export(args) => run_export_command(&config, args).await,
    }
}

fn build_generator(
    config: &Config,
    templates_dir: Option<PathBuf>,
    output: Option<PathBuf>,
) -> anyhow::Result<Generator> {
    let templates_dir = templates_dir.unwrap_or_else(|| config.generator.templates_dir.clone());
    let output_dir = output.unwrap_or_else(|| config.generator.output_dir.clone());

    Generator::new(&templates_dir, output_dir).with_context(|| {
        format!(
            "Failed to load templates from {}",
            templates_dir.display()
        )
    })
}

fn run_generate_command(config: &Config, args: GenerateArgs) -> anyhow::Result<()> {
    let generator = build_generator(config, args.templates_dir, args.output)?;
    let extra_vars = ExtraVars {
        ignore_branch_changes: args.ignore_branch_changes,
    };

    let path = generator
        .generate(&config.tmp_folder(), args.stack_type, &extra_vars)
        .context("Failed to generate Terraform code")?;

    info!(path = %path.display(), stack_type = %args.stack_type, "Terraform code generated");
    Ok(())
}

fn run_generate_jenkins_stacks_command(
    config: &Config,
    args: GenerateJenkinsStacksArgs,
) -> anyhow::Result<()> {
    let generator = build_generator(config, args.templates_dir, args.output)?;

    let path = generator
        .generate_with_template(&config.tmp_folder(), JENKINS_TEMPLATE)
        .context("Failed to generate Terraform code for Jenkins stacks")?;

    info!(path = %path.display(), "Terraform code for Jenkins stacks generated");
    Ok(())
}

async fn run_make_old_tfvars_editable_command(
    config: &Config,
    args: MakeOldTfvarsEditableArgs,
) -> anyhow::Result<()> {
    let (endpoint, key_id, key_secret) = config.spacelift_credentials()?;
    let client = SpaceliftClient::new(endpoint, key_id, key_secret)
        .context("Failed to create Spacelift API client")?;

    let report = TfvarsMigration::new(Arc::new(client))
        .run(args.dry_run, args.limit)
        .await
        .context("Failed to make old tfvars files editable")?;

    info!(
        dry_run = report.dry_run,
        processed = report.processed,
        eligible = report.eligible,
        updated = report.updated,
        "Old tfvars files migration done"
    );
    Ok(())
}

async fn run_upload_state_files_command(config: &Config) -> anyhow::Result<()> {
    let bucket = config.state_bucket()?;
    let tmp_folder = config.tmp_folder();

    let data: StackDocument = document::load(&document::data_file_path(&tmp_folder))
        .context("Failed to load extracted data")?;
    let listing = list_state_files(&data, &tmp_folder.join(STATE_FILES_FOLDER));

    let store = S3ObjectStore::from_env(bucket).await;
    let report = upload_state_files(&store, &listing).await;

    if report.failed > 0 {
        warn!(failed = report.failed, "Some state files were not uploaded");
    }
    Ok(())
}

async fn run_export_command(config: &Config, args: ExportArgs) -> anyhow::Result<()> {
    let input = args
        .input
        .unwrap_or_else(|| document::data_file_path(&config.tmp_folder()));
    let output = args.output.unwrap_or_else(|| input.clone());

    let mut data: TfcDocument =
        document::load(&input).with_context(|| format!("Failed to load {}", input.display()))?;

    drop_aws_access_keys(&mut data);
    recover_sensitive_variables(config, &mut data).await?;

    save_document(&data, &output)
}

async fn recover_sensitive_variables(config: &Config, data: &mut TfcDocument) -> anyhow::Result<()> {
    let tfc = TfcClient::new(&config.tfc.api_endpoint, config.tfc_token()?)
        .context("Failed to create TFC/TFE API client")?;

    let runtime = match DockerClient::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            warn!(error = %e, "Docker is not available. Skipping enriching workspace variables data.");
            return Ok(());
        }
    };

    let report = SensitiveVariableRecovery::with_config(
        Arc::new(tfc),
        Arc::new(runtime),
        &config.recovery,
    )
    .run(data)
    .await
    .context("Failed to recover sensitive workspace variables")?;

    info!(
        organizations = report.organizations,
        workspaces = report.workspaces_planned,
        variables = report.variables_recovered,
        branches = report.branches_backfilled,
        "Sensitive variables recovery done"
    );
    Ok(())
}

fn save_document(data: &TfcDocument, path: &Path) -> anyhow::Result<()> {
    document::save(data, path).with_context(|| format!("Failed to write {}", path.display()))?;
    info!(path = %path.display(), "Exported data saved");
    Ok(())
}
