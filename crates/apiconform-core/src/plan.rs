//! Plan types and config validation
//!
//! Describes what a run *would* do without sending any requests.
//! Used for pre-flight validation and CI previews.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::Config;
use crate::target::SchemaSource;

// ── Plan types ──

/// Complete plan: operations, case counts, and config validations.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DryRunPlan {
    pub base_url: String,
    pub schema: String,
    /// Per-operation generation plan
    pub operations: Vec<OperationPlan>,
    /// Total cases that would be executed
    pub total_cases: u64,
    /// Config validation results
    pub validations: Vec<Validation>,
}

/// Generation plan for a single operation.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct OperationPlan {
    /// Operation label, e.g. "GET /nodes/{node_id}"
    pub operation: String,
    pub method: String,
    /// Path template
    pub path: String,
    /// Number of cases that would be generated
    pub cases: u32,
    /// Documented response statuses ("200", "4XX", "default")
    pub declared_statuses: Vec<String>,
    /// Parameters as "location:name", required ones marked with '*'
    pub parameters: Vec<String>,
    /// Why no case can be generated, if so
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skipped: Option<String>,
}

/// A validation check result.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Validation {
    pub check: String,
    pub status: ValidationStatus,
    pub message: String,
}

/// Status of a validation check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Ok,
    Warning,
    Error,
}

impl std::fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ok => write!(f, "OK"),
            Self::Warning => write!(f, "WARNING"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

impl Validation {
    #[must_use]
    pub fn new(check: &str, status: ValidationStatus, message: impl Into<String>) -> Self {
        Self {
            check: check.into(),
            status,
            message: message.into(),
        }
    }
}

// ── Config validation ──

/// Header values that look copied from a template rather than real.
const PLACEHOLDERS: &[&str] = &[
    "your-token",
    "your_token",
    "your-api-key",
    "your_api_key",
    "changeme",
    "placeholder",
    "replace-me",
    "replace_me",
];

/// Placeholder found in a header value, if any.
fn placeholder_in(value: &str) -> Option<String> {
    if let (Some(open), Some(close)) = (value.find('<'), value.rfind('>')) {
        if open < close {
            return Some(value[open..=close].to_string());
        }
    }
    let lower = value.to_ascii_lowercase();
    PLACEHOLDERS
        .iter()
        .find(|p| lower.contains(*p))
        .map(|p| (*p).to_string())
}

/// Validate config and produce validation results.
#[must_use]
pub fn validate_config(config: &Config) -> Vec<Validation> {
    let mut checks = Vec::new();

    match config.resolve() {
        Ok(resolved) => {
            checks.push(Validation::new(
                "base_url",
                ValidationStatus::Ok,
                format!("base_url: {}", resolved.base_url),
            ));
            checks.push(match &resolved.schema {
                SchemaSource::File(path) if !path.exists() => Validation::new(
                    "schema",
                    ValidationStatus::Error,
                    format!("schema: {} (not found)", path.display()),
                ),
                SchemaSource::File(path) => Validation::new(
                    "schema",
                    ValidationStatus::Ok,
                    format!("schema: {} (exists)", path.display()),
                ),
                SchemaSource::Url(url) => Validation::new(
                    "schema",
                    ValidationStatus::Ok,
                    format!("schema: {url} (remote)"),
                ),
            });
        }
        Err(e) => checks.push(Validation::new("target", ValidationStatus::Error, e.to_string())),
    }

    if let Err(e) = config.validate() {
        checks.push(Validation::new("settings", ValidationStatus::Error, e.to_string()));
    }

    let mut names: Vec<_> = config.headers.keys().collect();
    names.sort_unstable();
    let suspicious: Vec<_> = names
        .iter()
        .filter_map(|name| placeholder_in(&config.headers[*name]).map(|p| (name, p)))
        .collect();
    for (name, found) in &suspicious {
        checks.push(Validation::new(
            "headers",
            ValidationStatus::Warning,
            format!("{name}: value contains '{found}', looks like a placeholder"),
        ));
    }
    if suspicious.is_empty() {
        checks.push(Validation::new(
            "headers",
            ValidationStatus::Ok,
            format!("headers: {} configured", names.len()),
        ));
    }

    match config.run_timeout {
        Some(t) if t == 0.0 => checks.push(Validation::new(
            "run_timeout",
            ValidationStatus::Warning,
            "run_timeout: 0s, every case will be inconclusive",
        )),
        Some(t) => checks.push(Validation::new(
            "run_timeout",
            ValidationStatus::Ok,
            format!("run_timeout: {t}s"),
        )),
        None => {}
    }

    if config.seed.is_none() {
        checks.push(Validation::new(
            "seed",
            ValidationStatus::Ok,
            "seed: random, recorded in the report",
        ));
    }

    if !config.path_params.is_empty() {
        let mut names: Vec<_> = config.path_params.keys().map(String::as_str).collect();
        names.sort_unstable();
        checks.push(Validation::new(
            "path_params",
            ValidationStatus::Ok,
            format!("path_params: {}", names.join(", ")),
        ));
    }

    let names: Vec<_> = config.checks.iter().map(|c| c.as_str()).collect();
    checks.push(Validation::new(
        "checks",
        if names.is_empty() {
            ValidationStatus::Error
        } else {
            ValidationStatus::Ok
        },
        format!("checks: {}", names.join(", ")),
    ));

    checks
}

// ── Display helpers ──

impl DryRunPlan {
    /// Format as human-readable terminal output.
    #[must_use]
    pub fn to_terminal(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!(
            "Plan: {} operations, {} cases against {} (schema: {})\n",
            self.operations.len(),
            self.total_cases,
            self.base_url,
            self.schema,
        ));

        for op in &self.operations {
            lines.push(format!("{} ({} cases):", op.operation, op.cases));
            if let Some(reason) = &op.skipped {
                lines.push(format!("  Skipped: {reason}"));
            }
            if !op.declared_statuses.is_empty() {
                lines.push(format!("  Statuses: {}", op.declared_statuses.join(", ")));
            }
            if !op.parameters.is_empty() {
                lines.push(format!("  Parameters: {}", op.parameters.join(", ")));
            }
            lines.push(String::new());
        }

        lines.push("Config validation:".into());
        for v in &self.validations {
            lines.push(format!("  [{}] {}", v.status, v.message));
        }

        lines.join("\n")
    }

    /// Returns true if any validation has Error status.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.validations
            .iter()
            .any(|v| v.status == ValidationStatus::Error)
    }

    /// Returns true if any validation has Warning status.
    #[must_use]
    pub fn has_warnings(&self) -> bool {
        self.validations
            .iter()
            .any(|v| v.status == ValidationStatus::Warning)
    }
}
