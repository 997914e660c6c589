//! Configuration for the migration customizations.
//!
//! Configuration is read from a YAML file (`config.yml` by default) and then
//! overridden from environment variables, so that credentials never have to
//! live in the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default TFC/TFE API endpoint.
pub const DEFAULT_TFC_ENDPOINT: &str = "https://app.terraform.io";

/// Default image for the local TFC/TFE agent.
pub const DEFAULT_AGENT_IMAGE: &str = "jmfontaine/tfc-agent:smk-1";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Folder holding `data.json` and the `state-files` subfolder.
    pub tmp_folder: Option<PathBuf>,
    pub tfc: TfcConfig,
    pub spacelift: SpaceliftConfig,
    pub upload_state_files: UploadConfig,
    pub generator: GeneratorConfig,
    pub recovery: RecoveryConfig,
}

/// TFC/TFE API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TfcConfig {
    pub api_endpoint: String,
    pub api_token: Option<String>,
}

impl Default for TfcConfig {
    fn default() -> Self {
        Self {
            api_endpoint: DEFAULT_TFC_ENDPOINT.to_string(),
            api_token: None,
        }
    }
}

/// Spacelift API key settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SpaceliftConfig {
    /// Account URL, e.g. `https://example.app.spacelift.io`.
    pub api_key_endpoint: Option<String>,
    pub api_key_id: Option<String>,
    pub api_key_secret: Option<String>,
}

/// State file upload settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub bucket: Option<String>,
}

/// Terraform code generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub templates_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            templates_dir: PathBuf::from("./templates"),
            output_dir: PathBuf::from("./out"),
        }
    }
}

/// Sensitive variable recovery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    pub agent_image: String,
    /// Wait before the first attempt to read a plan log.
    pub log_initial_delay_secs: u64,
    /// Wait between attempts when the plan log is still empty.
    pub log_poll_interval_secs: u64,
    pub log_poll_attempts: u32,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            agent_image: DEFAULT_AGENT_IMAGE.to_string(),
            log_initial_delay_secs: 30,
            log_poll_interval_secs: 10,
            log_poll_attempts: 6,
        }
    }
}

impl RecoveryConfig {
    pub fn log_initial_delay(&self) -> Duration {
        Duration::from_secs(self.log_initial_delay_secs)
    }

    pub fn log_poll_interval(&self) -> Duration {
        Duration::from_secs(self.log_poll_interval_secs)
    }
}

impl Config {
    /// Loads configuration from a YAML file, then applies environment overrides.
    ///
    /// A missing file is not an error: the defaults plus the environment are used.
    ///
    /// # Environment Variables
    ///
    /// - `TFC_API_TOKEN`, `TFC_API_ENDPOINT`
    /// - `SPACELIFT_API_KEY_ENDPOINT`, `SPACELIFT_API_KEY_ID`, `SPACELIFT_API_KEY_SECRET`
    /// - `SMK_STATE_BUCKET`
    /// - `SMK_TMP_FOLDER`
    /// - `SMK_AGENT_IMAGE`
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.display().to_string(),
                source,
            })?;
            Self::from_yaml(&content)?
        } else {
            tracing::debug!(path = %path.display(), "No configuration file, using defaults");
            Self::default()
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Checks values that have no sensible fallback.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.recovery.agent_image.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "recovery.agent_image".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        if self.recovery.log_poll_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                key: "recovery.log_poll_attempts".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Parses configuration from a YAML string.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// Applies overrides from a key lookup (the process environment in practice).
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("TFC_API_TOKEN") {
            self.tfc.api_token = Some(val);
        }
        if let Some(val) = lookup("TFC_API_ENDPOINT") {
            self.tfc.api_endpoint = val;
        }
        if let Some(val) = lookup("SPACELIFT_API_KEY_ENDPOINT") {
            self.spacelift.api_key_endpoint = Some(val);
        }
        if let Some(val) = lookup("SPACELIFT_API_KEY_ID") {
            self.spacelift.api_key_id = Some(val);
        }
        if let Some(val) = lookup("SPACELIFT_API_KEY_SECRET") {
            self.spacelift.api_key_secret = Some(val);
        }
        if let Some(val) = lookup("SMK_STATE_BUCKET") {
            self.upload_state_files.bucket = Some(val);
        }
        if let Some(val) = lookup("SMK_TMP_FOLDER") {
            self.tmp_folder = Some(PathBuf::from(val));
        }
        if let Some(val) = lookup("SMK_AGENT_IMAGE") {
            self.recovery.agent_image = val;
        }
    }

    /// Folder holding previously extracted data.
    pub fn tmp_folder(&self) -> PathBuf {
        self.tmp_folder
            .clone()
            .unwrap_or_else(|| PathBuf::from("./tmp"))
    }

    pub fn tfc_token(&self) -> Result<&str, ConfigError> {
        require(self.tfc.api_token.as_deref(), "tfc.api_token")
    }

    /// Returns `(endpoint, key id, key secret)` for the Spacelift API.
    pub fn spacelift_credentials(&self) -> Result<(&str, &str, &str), ConfigError> {
        Ok((
            require(
                self.spacelift.api_key_endpoint.as_deref(),
                "spacelift.api_key_endpoint",
            )?,
            require(self.spacelift.api_key_id.as_deref(), "spacelift.api_key_id")?,
            require(
                self.spacelift.api_key_secret.as_deref(),
                "spacelift.api_key_secret",
            )?,
        ))
    }

    pub fn state_bucket(&self) -> Result<&str, ConfigError> {
        require(
            self.upload_state_files.bucket.as_deref(),
            "upload_state_files.bucket",
        )
    }
}

fn require<'a>(value: Option<&'a str>, key: &str) -> Result<&'a str, ConfigError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ConfigError::MissingValue(key.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.tfc.api_endpoint, DEFAULT_TFC_ENDPOINT);
        assert_eq!(config.recovery.agent_image, DEFAULT_AGENT_IMAGE);
        assert_eq!(config.recovery.log_initial_delay(), Duration::from_secs(30));
        assert_eq!(config.tmp_folder(), PathBuf::from("./tmp"));
        assert!(config.tfc_token().is_err());
    }

    #[test]
    fn test_from_yaml_partial_sections() {
        let config = Config::from_yaml(
            r#"
tmp_folder: /var/smk
spacelift:
  api_key_endpoint: https://example.app.spacelift.io
  api_key_id: 01ABC
  api_key_secret: s3cr3t
upload_state_files:
  bucket: my-states
recovery:
  log_poll_attempts: 2
"#,
        )
        .expect("valid yaml");

        assert_eq!(config.tmp_folder(), PathBuf::from("/var/smk"));
        assert_eq!(config.state_bucket().unwrap(), "my-states");
        assert_eq!(config.recovery.log_poll_attempts, 2);
        assert_eq!(config.recovery.log_initial_delay_secs, 30);
        let (endpoint, id, secret) = config.spacelift_credentials().unwrap();
        assert_eq!(endpoint, "https://example.app.spacelift.io");
        assert_eq!(id, "01ABC");
        assert_eq!(secret, "s3cr3t");
    }

    #[test]
    fn test_empty_yaml_is_default() {
        let config = Config::from_yaml("  \n").unwrap();
        assert!(config.upload_state_files.bucket.is_none());
    }

    #[test]
    fn test_overrides_take_precedence() {
        let mut config = Config::from_yaml("tfc:\n  api_token: from-file\n").unwrap();
        let env: HashMap<&str, &str> = [
            ("TFC_API_TOKEN", "from-env"),
            ("SMK_STATE_BUCKET", "bucket-env"),
        ]
        .into_iter()
        .collect();

        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.tfc_token().unwrap(), "from-env");
        assert_eq!(config.state_bucket().unwrap(), "bucket-env");
    }

    #[test]
    fn test_blank_value_is_missing() {
        let mut config = Config::default();
        config.upload_state_files.bucket = Some("   ".to_string());
        assert!(matches!(
            config.state_bucket(),
            Err(ConfigError::MissingValue(key)) if key == "upload_state_files.bucket"
        ));
    }

    #[test]
    fn test_validate_rejects_zero_attempts() {
        let config = Config::from_yaml("recovery:\n  log_poll_attempts: 0\n").unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { key, .. }) if key == "recovery.log_poll_attempts"
        ));
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("absent.yml")).unwrap();
        assert_eq!(config.recovery.log_poll_attempts, 6);
    }
}
