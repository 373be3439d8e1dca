//! Verdict policy - turns a run report into PASS/FAIL and an exit code

use super::Severity;
use crate::report::{FailureEntry, RunReport};

/// Exit code for tool-level problems: nothing executed, or network errors.
pub const TOOL_ERROR_EXIT: i32 = 3;

/// Policy for judging a run
#[derive(Debug, Clone)]
pub struct VerdictPolicy {
    /// Strict mode: inconclusive cases fail the run
    pub strict: bool,
}

impl Default for VerdictPolicy {
    fn default() -> Self {
        Self { strict: true }
    }
}

impl VerdictPolicy {
    /// Create a lenient policy (inconclusive cases don't fail)
    #[must_use]
    pub fn lenient() -> Self {
        Self { strict: false }
    }

    /// Determine final exit code.
    ///
    /// The highest severity among failed checks wins. Without check
    /// failures, execution errors give 3 and inconclusive outcomes are
    /// judged as warnings.
    #[must_use]
    pub fn exit_code(&self, failures: &[FailureEntry], errors: u64, inconclusive: u64) -> i32 {
        let failure_code = Severity::worst(failures.iter().map(|f| f.severity))
            .map_or(0, |s| s.exit_code(self.strict));

        if failure_code > 0 {
            return failure_code;
        }
        if errors > 0 {
            return TOOL_ERROR_EXIT;
        }
        if inconclusive > 0 {
            return Severity::Warning.exit_code(self.strict);
        }
        0
    }

    /// Determine verdict for a finished run.
    ///
    /// PASS iff the exit code is 0. A run where no case received a
    /// response is always a FAIL with exit code 3.
    #[must_use]
    pub fn verdict(&self, report: &RunReport) -> Verdict {
        let summary = report.summary();
        let failures = report.failures();
        let checked = summary.passed + summary.failed;
        let inconclusive = summary.inconclusive + summary.skipped_operations;

        if checked == 0 {
            let reason = if summary.cases == 0 {
                "No cases were generated".to_string()
            } else {
                format!(
                    "No cases were executed ({} errors, {} inconclusive)",
                    summary.errors, summary.inconclusive
                )
            };
            return Verdict {
                status: VerdictStatus::Fail,
                exit_code: TOOL_ERROR_EXIT,
                reason,
            };
        }

        let exit_code = self.exit_code(&failures, summary.errors, inconclusive);
        let status = if exit_code == 0 {
            VerdictStatus::Pass
        } else {
            VerdictStatus::Fail
        };

        let mut parts = Vec::new();
        if !failures.is_empty() {
            let critical = failures
                .iter()
                .filter(|f| f.severity == Severity::Critical)
                .count();
            let error = failures.len() - critical;
            parts.push(format!(
                "{} check failures in {} cases ({} critical, {} error)",
                failures.len(),
                summary.failed,
                critical,
                error
            ));
        }
        if summary.errors > 0 {
            parts.push(format!(
                "{} execution errors (connection/timeout)",
                summary.errors
            ));
        }
        if inconclusive > 0 {
            parts.push(format!("{inconclusive} inconclusive"));
        }
        let reason = if parts.is_empty() {
            format!("All {checked} cases conform")
        } else {
            parts.join("; ")
        };

        Verdict {
            status,
            exit_code,
            reason,
        }
    }
}

/// Final verdict
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub status: VerdictStatus,
    pub exit_code: i32,
    pub reason: String,
}

/// Pass or fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerdictStatus {
    Pass,
    Fail,
}

impl std::fmt::Display for VerdictStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pass => write!(f, "PASS"),
            Self::Fail => write!(f, "FAIL"),
        }
    }
}
