//! How bad an observed problem is
//!
//! Ranked least to most severe. The worst severity seen in a run picks the
//! process exit code.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// The case could not be judged (run timeout)
    Warning,
    /// The response contradicts the document
    Error,
    /// The server itself failed (5xx)
    Critical,
}

impl Severity {
    /// Exit code for a run whose worst problem has this severity.
    /// Warnings only fail the run in strict mode.
    #[must_use]
    pub const fn exit_code(self, strict: bool) -> i32 {
        match (self, strict) {
            (Self::Warning, false) => 0,
            (Self::Warning, true) | (Self::Error, _) => 1,
            (Self::Critical, _) => 2,
        }
    }

    /// Highest severity in `items`, `None` when empty.
    pub fn worst(items: impl IntoIterator<Item = Self>) -> Option<Self> {
        items.into_iter().max()
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
