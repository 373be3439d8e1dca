//! Run configuration

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::check::CheckName;
use crate::target::{SchemaSource, Target};

/// Project configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Named network target; supplies base URL and schema location
    #[serde(default)]
    pub target: Option<Target>,

    /// Schema location (URL or file path); overrides the target's
    #[serde(default)]
    pub schema: Option<String>,

    /// Base URL of the service under test; overrides the target's
    #[serde(default)]
    pub base_url: Option<String>,

    /// Static HTTP headers sent with every request
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Fixed path parameter values (entity IDs, etc.)
    #[serde(default)]
    pub path_params: HashMap<String, String>,

    /// Maximum number of requests in flight
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout: f64,

    /// Overall run timeout in seconds (disabled by default)
    #[serde(default)]
    pub run_timeout: Option<f64>,

    /// Cap on generated cases per operation (never below the number of documented statuses)
    #[serde(default)]
    pub max_cases: Option<u32>,

    /// Extra randomly filled cases per operation
    #[serde(default = "default_random_cases")]
    pub random_cases: u32,

    /// Seed for value generation; a fixed seed reproduces the same cases
    #[serde(default)]
    pub seed: Option<u64>,

    /// Checks to run
    #[serde(default = "CheckName::all")]
    pub checks: Vec<CheckName>,
}

const fn default_concurrency() -> usize {
    4
}

const fn default_request_timeout() -> f64 {
    10.0
}

const fn default_random_cases() -> u32 {
    2
}

impl Default for Config {
    fn default() -> Self {
        Self {
            target: None,
            schema: None,
            base_url: None,
            headers: HashMap::new(),
            path_params: HashMap::new(),
            concurrency: default_concurrency(),
            request_timeout: default_request_timeout(),
            run_timeout: None,
            max_cases: None,
            random_cases: default_random_cases(),
            seed: None,
            checks: CheckName::all(),
        }
    }
}

/// Base URL and schema location after applying target presets and overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    pub base_url: String,
    pub schema: SchemaSource,
}

impl Config {
    /// Load config from file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e.to_string()))?;

        if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
        } else {
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
        }
    }

    /// Load from default location (.apiconform.toml)
    pub fn load_default() -> Result<Self, ConfigError> {
        let candidates = [".apiconform.toml", ".apiconform.json", "apiconform.toml"];

        for name in candidates {
            let path = Path::new(name);
            if path.exists() {
                return Self::load(path);
            }
        }

        Ok(Self::default())
    }

    /// Resolve base URL and schema location.
    ///
    /// Explicit `base_url` / `schema` win over the target preset. Without a
    /// target, both must be given.
    ///
    /// # Errors
    ///
    /// Returns error if either value is missing or the base URL is not HTTP(S).
    pub fn resolve(&self) -> Result<ResolvedTarget, ConfigError> {
        let base_url = self
            .base_url
            .clone()
            .or_else(|| self.target.map(Target::base_url))
            .ok_or(ConfigError::Missing("base_url"))?;
        let schema = self
            .schema
            .as_deref()
            .map(SchemaSource::parse)
            .or_else(|| self.target.map(Target::schema_source))
            .ok_or(ConfigError::Missing("schema"))?;

        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ConfigError::InvalidBaseUrl(base_url));
        }

        Ok(ResolvedTarget {
            base_url: base_url.trim_end_matches('/').to_string(),
            schema,
        })
    }

    /// Check numeric limits and the check list.
    ///
    /// # Errors
    ///
    /// Returns the first invalid setting found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::Invalid("concurrency must be at least 1".into()));
        }
        if !(self.request_timeout.is_finite() && self.request_timeout > 0.0) {
            return Err(ConfigError::Invalid(
                "request_timeout must be a positive number of seconds".into(),
            ));
        }
        if let Some(t) = self.run_timeout {
            if !(t.is_finite() && t >= 0.0) {
                return Err(ConfigError::Invalid(
                    "run_timeout must be a non-negative number of seconds".into(),
                ));
            }
        }
        if self.checks.is_empty() {
            return Err(ConfigError::Invalid("at least one check must be enabled".into()));
        }
        Ok(())
    }

    /// Create example config file
    pub fn example() -> &'static str {
        r#"# apiconform configuration

# Named target: main, dev, qa, test or local.
# Supplies both the base URL and the schema location.
target = "local"

# Or point at a schema and a server explicitly (these override the target)
# schema = "docs/swagger.json"
# base_url = "http://localhost:8080"

# Static HTTP headers
# [headers]
# X-API-Key = "your-api-key"

# Fixed path parameters (entity IDs known to exist)
# [path_params]
# node_id = "1"

# Requests in flight at once
concurrency = 4

# Per-request timeout in seconds
request_timeout = 10.0

# Overall run timeout in seconds; unfinished cases are reported inconclusive
# run_timeout = 300.0

# Generation
# max_cases = 50
random_cases = 2
# seed = 42

# Checks to run (default: all)
# checks = ["not_a_server_error", "status_code_conformance", "content_type_conformance", "response_schema_conformance", "response_headers_conformance"]
"#
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot read {0}: {1}")]
    Io(PathBuf, String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Unknown target '{0}' (expected one of: main, dev, qa, test, local)")]
    UnknownTarget(String),
    #[error("Unknown check '{0}'")]
    UnknownCheck(String),
    #[error("No {0} configured: pass a target or set it explicitly")]
    Missing(&'static str),
    #[error("Base URL must start with http:// or https://, got '{0}'")]
    InvalidBaseUrl(String),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
