//! Verdict module - severity and pass/fail policy

mod policy;
mod severity;

pub use policy::{TOOL_ERROR_EXIT, Verdict, VerdictPolicy, VerdictStatus};
pub use severity::Severity;
