//! apiconform-core: configuration, targets and report types for API conformance testing
//!
//! This crate holds everything that is independent of HTTP and schema parsing:
//! the run configuration, the closed set of named network targets, the names of
//! the conformance checks, and the report / verdict types produced by a run.

pub mod check;
pub mod config;
pub mod plan;
pub mod report;
pub mod target;
pub mod verdict;

pub use check::{CheckName, CheckResult};
pub use config::{Config, ConfigError, ResolvedTarget};
pub use plan::{DryRunPlan, OperationPlan, Validation, ValidationStatus, validate_config};
pub use report::{
    CaseOutcome, CaseReport, CheckTally, FailureEntry, OperationSummary, RequestSnapshot,
    ResponseSnapshot, RunReport, RunSummary, SkippedOperation,
};
pub use target::{SchemaSource, Target};
pub use verdict::{Severity, TOOL_ERROR_EXIT, Verdict, VerdictPolicy, VerdictStatus};
