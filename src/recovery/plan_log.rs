//! Plan log retrieval and scanning.
//!
//! A plan run by the local agent echoes its environment as `NAME=value`
//! lines. Those lines are matched against the keys of the variables being
//! recovered.

use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;

use crate::api::TfcApi;
use crate::error::ApiError;

/// Environment variable carrying the branch of a VCS-backed configuration version.
pub const BRANCH_ENV_NAME: &str = "ATLAS_CONFIGURATION_VERSION_GITHUB_BRANCH";

fn env_line_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([^=\s]+)=(.*)$").expect("static regex is valid"))
}

/// Replaces every character of a secret with `*`.
pub fn mask(value: &str) -> String {
    "*".repeat(value.chars().count())
}

/// Values found in a plan log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanLogFindings {
    /// Recovered value per variable id.
    pub values: BTreeMap<String, String>,
    pub branch: Option<String>,
}

/// Scans a plan log for the pending variables (`variable id -> key`).
///
/// When a key appears several times the last line wins. The branch is taken
/// from the first line that sets it to a non-empty value.
pub fn scan(log: &str, pending: &BTreeMap<String, String>) -> PlanLogFindings {
    let mut ids_by_key: HashMap<&str, Vec<&str>> = HashMap::new();
    for (variable_id, key) in pending {
        ids_by_key
            .entry(key.as_str())
            .or_default()
            .push(variable_id.as_str());
    }

    let mut findings = PlanLogFindings::default();
    for line in log.lines() {
        let Some(captures) = env_line_regex().captures(line) else {
            continue;
        };
        let name = &captures[1];
        let value = &captures[2];

        if let Some(variable_ids) = ids_by_key.get(name) {
            tracing::debug!(variable = name, value = %mask(value), "Found sensitive env var");
            for variable_id in variable_ids {
                findings
                    .values
                    .insert((*variable_id).to_string(), value.to_string());
            }
        }

        if name == BRANCH_ENV_NAME && !value.is_empty() && findings.branch.is_none() {
            findings.branch = Some(value.to_string());
        }
    }

    findings
}

/// How long to wait for a plan log to become readable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogWait {
    pub initial_delay: Duration,
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for LogWait {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(30),
            interval: Duration::from_secs(10),
            max_attempts: 6,
        }
    }
}

impl LogWait {
    /// No waiting at all, for tests.
    pub fn immediate() -> Self {
        Self {
            initial_delay: Duration::ZERO,
            interval: Duration::ZERO,
            max_attempts: 1,
        }
    }
}

/// Reads a plan log, polling while the body is still empty.
///
/// The log endpoint answers 200 with an empty body until the log exists.
/// Returns `None` when the log stayed empty for every attempt.
pub async fn wait_for_log(
    api: &dyn TfcApi,
    url: &str,
    wait: &LogWait,
) -> Result<Option<String>, ApiError> {
    tokio::time::sleep(wait.initial_delay).await;

    let attempts = wait.max_attempts.max(1);
    for attempt in 1..=attempts {
        let text = api.download_text(url).await?;
        if !text.trim().is_empty() {
            return Ok(Some(text));
        }

        tracing::debug!(attempt, attempts, "Plan log is still empty");
        if attempt < attempts {
            tokio::time::sleep(wait.interval).await;
        }
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
        entries
            .iter()
            .map(|(id, key)| (id.to_string(), key.to_string()))
            .collect()
    }

    #[test]
    fn test_mask() {
        assert_eq!(mask("hunter2"), "*******");
        assert_eq!(mask(""), "");
        assert_eq!(mask("é"), "*");
    }

    #[test]
    fn test_scan_matches_exact_keys() {
        let log = "Terraform v1.5.0\n\
                   DB_PASSWORD=s3cr3t=with=equals\n\
                   DB_PASSWORD_OLD=nope\n\
                   API_KEY=abc\r\n\
                   ATLAS_CONFIGURATION_VERSION_GITHUB_BRANCH=release\n";
        let findings = scan(
            log,
            &pending(&[("var-1", "DB_PASSWORD"), ("var-2", "API_KEY"), ("var-3", "MISSING")]),
        );

        assert_eq!(findings.values.get("var-1").map(String::as_str), Some("s3cr3t=with=equals"));
        assert_eq!(findings.values.get("var-2").map(String::as_str), Some("abc"));
        assert!(!findings.values.contains_key("var-3"));
        assert_eq!(findings.branch.as_deref(), Some("release"));
    }

    #[test]
    fn test_scan_last_value_wins_and_empty_branch_ignored() {
        let log = "TOKEN=first\nTOKEN=second\nATLAS_CONFIGURATION_VERSION_GITHUB_BRANCH=\n";
        let findings = scan(log, &pending(&[("var-1", "TOKEN")]));

        assert_eq!(findings.values.get("var-1").map(String::as_str), Some("second"));
        assert_eq!(findings.branch, None);
    }

    #[test]
    fn test_scan_keeps_first_non_empty_branch() {
        let log = "ATLAS_CONFIGURATION_VERSION_GITHUB_BRANCH=\n\
                   ATLAS_CONFIGURATION_VERSION_GITHUB_BRANCH=main\n\
                   ATLAS_CONFIGURATION_VERSION_GITHUB_BRANCH=feature/x\n";
        let findings = scan(log, &BTreeMap::new());

        assert_eq!(findings.branch.as_deref(), Some("main"));
    }

    #[test]
    fn test_scan_ignores_indented_lines() {
        let findings = scan("  TOKEN=value\n", &pending(&[("var-1", "TOKEN")]));
        assert!(findings.values.is_empty());
    }
}
