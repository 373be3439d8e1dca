//! Conformance check names and per-check results

use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::verdict::Severity;

/// Built-in conformance checks.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum CheckName {
    /// Status must be below 500
    NotAServerError,
    /// Status must be documented for the operation
    StatusCodeConformance,
    /// Content-Type must be documented for the status
    ContentTypeConformance,
    /// Body must validate against the documented schema
    ResponseSchemaConformance,
    /// Documented required headers must be present and well-formed
    ResponseHeadersConformance,
}

impl CheckName {
    pub const ALL: [Self; 5] = [
        Self::NotAServerError,
        Self::StatusCodeConformance,
        Self::ContentTypeConformance,
        Self::ResponseSchemaConformance,
        Self::ResponseHeadersConformance,
    ];

    #[must_use]
    pub fn all() -> Vec<Self> {
        Self::ALL.to_vec()
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotAServerError => "not_a_server_error",
            Self::StatusCodeConformance => "status_code_conformance",
            Self::ContentTypeConformance => "content_type_conformance",
            Self::ResponseSchemaConformance => "response_schema_conformance",
            Self::ResponseHeadersConformance => "response_headers_conformance",
        }
    }

    /// Severity of a failure of this check. Determines the exit code.
    #[must_use]
    pub const fn default_severity(self) -> Severity {
        match self {
            Self::NotAServerError => Severity::Critical,
            Self::StatusCodeConformance
            | Self::ContentTypeConformance
            | Self::ResponseSchemaConformance
            | Self::ResponseHeadersConformance => Severity::Error,
        }
    }

    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::NotAServerError => "Server returned a 5xx status",
            Self::StatusCodeConformance => "Status code not documented for the operation",
            Self::ContentTypeConformance => "Content-Type not documented for the status",
            Self::ResponseSchemaConformance => "Response body does not match the documented schema",
            Self::ResponseHeadersConformance => "Documented response headers missing or malformed",
        }
    }
}

impl fmt::Display for CheckName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CheckName {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == normalized)
            .ok_or_else(|| ConfigError::UnknownCheck(s.trim().to_string()))
    }
}

/// Outcome of one check against one response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CheckResult {
    pub check: CheckName,
    pub passed: bool,
    /// Diagnostic for failures
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CheckResult {
    #[must_use]
    pub fn pass(check: CheckName) -> Self {
        Self {
            check,
            passed: true,
            message: None,
        }
    }

    #[must_use]
    pub fn fail(check: CheckName, message: impl Into<String>) -> Self {
        Self {
            check,
            passed: false,
            message: Some(message.into()),
        }
    }
}
