//! Run report: per-case records and per-operation / per-check aggregation
//!
//! A [`RunReport`] is plain data produced by the runner. Aggregation and
//! terminal rendering live here so the CLI only decides where output goes.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::check::{CheckName, CheckResult};
use crate::verdict::{Severity, Verdict};

/// Unique diagnostics kept per operation and check.
const MAX_DIAGNOSTICS: usize = 3;

/// Snapshot of the HTTP request sent for a case
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RequestSnapshot {
    pub method: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

/// Snapshot of the HTTP response received for a case
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ResponseSnapshot {
    pub status_code: u16,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    /// Response body (truncated for large responses)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default)]
    pub elapsed_ms: u64,
}

/// What happened to a single generated case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CaseOutcome {
    /// A response was received and checked
    Checked {
        response: ResponseSnapshot,
        results: Vec<CheckResult>,
    },
    /// Network-level failure: timeout, refused connection, DNS, ...
    ExecutionError { message: String },
    /// Not executed, or abandoned at the run timeout
    Inconclusive { reason: String },
}

impl CaseOutcome {
    /// Failed check results, empty unless the case was checked.
    pub fn failed_checks(&self) -> impl Iterator<Item = &CheckResult> {
        let results: &[CheckResult] = match self {
            Self::Checked { results, .. } => results,
            _ => &[],
        };
        results.iter().filter(|r| !r.passed)
    }

    #[must_use]
    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Checked { results, .. } if results.iter().all(|r| r.passed))
    }
}

/// One generated case and its outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CaseReport {
    /// Case ID for reproduction
    pub id: String,
    /// Operation label: "GET /nodes"
    pub operation: String,
    /// Position of the case in the operation's case sequence
    pub index: u32,
    /// Documented status this case was generated for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_status: Option<String>,
    pub request: RequestSnapshot,
    pub outcome: CaseOutcome,
}

/// Operation for which no case could be generated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SkippedOperation {
    pub operation: String,
    pub reason: String,
}

/// Complete result of a conformance run.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RunReport {
    pub base_url: String,
    /// Schema location the run was generated from
    pub schema: String,
    /// Checks that were applied to every response
    pub checks: Vec<CheckName>,
    /// Operation labels in schema order
    pub operations: Vec<String>,
    pub cases: Vec<CaseReport>,
    #[serde(default)]
    pub skipped: Vec<SkippedOperation>,
    pub duration_secs: f64,
    /// Generation seed; rerunning with it reproduces every case
    #[serde(default)]
    pub seed: u64,
    /// The overall run timeout expired
    #[serde(default)]
    pub timed_out: bool,
}

/// Case counts for a whole run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RunSummary {
    pub operations: u64,
    pub cases: u64,
    /// Checked, every check passed
    pub passed: u64,
    /// Checked, at least one check failed
    pub failed: u64,
    /// Execution errors
    pub errors: u64,
    pub inconclusive: u64,
    pub skipped_operations: u64,
}

/// Counts for one check within one operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CheckTally {
    pub check: CheckName,
    pub passed: u64,
    pub failed: u64,
    pub inconclusive: u64,
    /// First few distinct failure diagnostics
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<String>,
}

impl CheckTally {
    fn new(check: CheckName) -> Self {
        Self {
            check,
            passed: 0,
            failed: 0,
            inconclusive: 0,
            diagnostics: Vec::new(),
        }
    }

    fn record(&mut self, result: &CheckResult) {
        if result.passed {
            self.passed += 1;
            return;
        }
        self.failed += 1;
        if let Some(msg) = &result.message {
            push_unique(&mut self.diagnostics, msg);
        }
    }
}

/// Per-operation aggregation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct OperationSummary {
    pub operation: String,
    pub cases: u64,
    pub checks: Vec<CheckTally>,
    /// First few distinct execution errors
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    /// Why the operation produced no cases
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skipped: Option<String>,
}

/// One failed check, flattened for listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FailureEntry {
    pub case_id: String,
    pub operation: String,
    pub check: CheckName,
    pub severity: Severity,
    pub status_code: u16,
    pub message: String,
    pub request: RequestSnapshot,
}

impl RunReport {
    #[must_use]
    pub fn summary(&self) -> RunSummary {
        let mut summary = RunSummary {
            operations: self.operations.len() as u64,
            cases: self.cases.len() as u64,
            skipped_operations: self.skipped.len() as u64,
            ..RunSummary::default()
        };
        for case in &self.cases {
            match &case.outcome {
                CaseOutcome::Checked { results, .. } => {
                    if results.iter().all(|r| r.passed) {
                        summary.passed += 1;
                    } else {
                        summary.failed += 1;
                    }
                }
                CaseOutcome::ExecutionError { .. } => summary.errors += 1,
                CaseOutcome::Inconclusive { .. } => summary.inconclusive += 1,
            }
        }
        summary
    }

    /// Per operation and per check: passed / failed / inconclusive counts.
    ///
    /// Cases that were not checked (execution errors, inconclusive cases)
    /// and skipped operations count as inconclusive for every check.
    #[must_use]
    pub fn operation_summaries(&self) -> Vec<OperationSummary> {
        self.operations
            .iter()
            .map(|label| {
                let mut tallies: Vec<CheckTally> =
                    self.checks.iter().copied().map(CheckTally::new).collect();
                let mut errors = Vec::new();
                let mut cases = 0;

                for case in self.cases.iter().filter(|c| &c.operation == label) {
                    cases += 1;
                    match &case.outcome {
                        CaseOutcome::Checked { results, .. } => {
                            for result in results {
                                if let Some(t) = tallies.iter_mut().find(|t| t.check == result.check)
                                {
                                    t.record(result);
                                }
                            }
                        }
                        CaseOutcome::ExecutionError { message } => {
                            push_unique(&mut errors, message);
                            tallies.iter_mut().for_each(|t| t.inconclusive += 1);
                        }
                        CaseOutcome::Inconclusive { .. } => {
                            tallies.iter_mut().for_each(|t| t.inconclusive += 1);
                        }
                    }
                }

                let skipped = self
                    .skipped
                    .iter()
                    .find(|s| &s.operation == label)
                    .map(|s| s.reason.clone());
                if skipped.is_some() {
                    tallies.iter_mut().for_each(|t| t.inconclusive += 1);
                }

                OperationSummary {
                    operation: label.clone(),
                    cases,
                    checks: tallies,
                    errors,
                    skipped,
                }
            })
            .collect()
    }

    /// Every failed check across all cases, in case order.
    #[must_use]
    pub fn failures(&self) -> Vec<FailureEntry> {
        let mut out = Vec::new();
        for case in &self.cases {
            let CaseOutcome::Checked { response, results } = &case.outcome else {
                continue;
            };
            for result in results.iter().filter(|r| !r.passed) {
                out.push(FailureEntry {
                    case_id: case.id.clone(),
                    operation: case.operation.clone(),
                    check: result.check,
                    severity: result.check.default_severity(),
                    status_code: response.status_code,
                    message: result.message.clone().unwrap_or_default(),
                    request: case.request.clone(),
                });
            }
        }
        out
    }

    /// Format as human-readable terminal output.
    #[must_use]
    pub fn to_terminal(&self, verdict: &Verdict) -> String {
        let summary = self.summary();
        let mut lines = Vec::new();

        lines.push(format!("{}: {}", verdict.status, verdict.reason));
        lines.push(format!(
            "  Cases: {} total, {} passed, {} failed, {} errors, {} inconclusive",
            summary.cases, summary.passed, summary.failed, summary.errors, summary.inconclusive
        ));
        lines.push(format!(
            "  Target: {} (schema: {})",
            self.base_url, self.schema
        ));
        lines.push(format!(
            "  Duration: {:.1}s (seed: {})",
            self.duration_secs, self.seed
        ));
        if self.timed_out {
            lines.push("  Run timeout expired; unfinished cases are inconclusive".into());
        }
        lines.push(String::new());

        lines.push("Operations:".into());
        for op in self.operation_summaries() {
            lines.push(format!("  {} ({} cases)", op.operation, op.cases));
            if let Some(reason) = &op.skipped {
                lines.push(format!("    skipped: {reason}"));
            }
            for tally in &op.checks {
                lines.push(format!("    {}", tally_line(tally)));
                for diag in &tally.diagnostics {
                    lines.push(format!("           - {diag}"));
                }
            }
            for err in &op.errors {
                lines.push(format!("    error: {err}"));
            }
        }

        let failures = self.failures();
        if !failures.is_empty() {
            lines.push(String::new());
            lines.push(format!("Failures ({}):", failures.len()));
            for f in &failures {
                lines.push(format!(
                    "  [{}] {} -> {} ({}) case {}",
                    f.severity, f.operation, f.status_code, f.check, f.case_id
                ));
                lines.push(format!("         {} {}", f.request.method, f.request.url));
                if !f.message.is_empty() {
                    lines.push(format!("         {}", f.message));
                }
            }
        }

        lines.push(String::new());
        lines.push(format!("Exit code: {}", verdict.exit_code));
        lines.join("\n")
    }
}

fn tally_line(tally: &CheckTally) -> String {
    let icon = if tally.failed > 0 {
        "FAIL"
    } else if tally.passed > 0 {
        "PASS"
    } else {
        "SKIP"
    };
    let mut counts = Vec::new();
    if tally.passed > 0 {
        counts.push(format!("{} passed", tally.passed));
    }
    if tally.failed > 0 {
        counts.push(format!("{} failed", tally.failed));
    }
    if tally.inconclusive > 0 {
        counts.push(format!("{} inconclusive", tally.inconclusive));
    }
    format!("[{icon}] {:<28} {}", tally.check.as_str(), counts.join(", "))
}

fn push_unique(list: &mut Vec<String>, msg: &str) {
    if list.len() < MAX_DIAGNOSTICS && !list.iter().any(|m| m == msg) {
        list.push(msg.to_string());
    }
}

/// Generate JSON Schema for the report format.
#[must_use]
pub fn generate_schema() -> String {
    let schema = schemars::schema_for!(RunReport);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn request() -> RequestSnapshot {
        RequestSnapshot {
            method: "GET".into(),
            url: "http://localhost:8080/nodes".into(),
            headers: BTreeMap::new(),
            body: None,
        }
    }

    pub(crate) fn checked(id: &str, op: &str, status: u16, results: Vec<CheckResult>) -> CaseReport {
        CaseReport {
            id: id.into(),
            operation: op.into(),
            index: 0,
            target_status: Some("200".into()),
            request: request(),
            outcome: CaseOutcome::Checked {
                response: ResponseSnapshot {
                    status_code: status,
                    headers: BTreeMap::new(),
                    body: None,
                    elapsed_ms: 3,
                },
                results,
            },
        }
    }

    pub(crate) fn report(cases: Vec<CaseReport>) -> RunReport {
        RunReport {
            base_url: "http://localhost:8080".into(),
            schema: "docs/swagger.json".into(),
            checks: vec![CheckName::NotAServerError, CheckName::StatusCodeConformance],
            operations: vec!["GET /nodes".into(), "GET /farms".into()],
            cases,
            skipped: vec![],
            duration_secs: 0.5,
            seed: 42,
            timed_out: false,
        }
    }

    fn all_pass() -> Vec<CheckResult> {
        vec![
            CheckResult::pass(CheckName::NotAServerError),
            CheckResult::pass(CheckName::StatusCodeConformance),
        ]
    }

    #[test]
    fn summary_counts_each_outcome() {
        let mut error_case = checked("e", "GET /farms", 0, vec![]);
        error_case.outcome = CaseOutcome::ExecutionError {
            message: "connection refused".into(),
        };
        let mut late_case = checked("l", "GET /farms", 0, vec![]);
        late_case.outcome = CaseOutcome::Inconclusive {
            reason: "run timeout".into(),
        };
        let r = report(vec![
            checked("a", "GET /nodes", 200, all_pass()),
            checked(
                "b",
                "GET /nodes",
                500,
                vec![
                    CheckResult::fail(CheckName::NotAServerError, "500"),
                    CheckResult::fail(CheckName::StatusCodeConformance, "undocumented"),
                ],
            ),
            error_case,
            late_case,
        ]);

        let s = r.summary();
        assert_eq!(s.cases, 4);
        assert_eq!(s.passed, 1);
        assert_eq!(s.failed, 1);
        assert_eq!(s.errors, 1);
        assert_eq!(s.inconclusive, 1);
        assert_eq!(s.operations, 2);
    }

    #[test]
    fn operation_summaries_tally_per_check() {
        let mut error_case = checked("e", "GET /farms", 0, vec![]);
        error_case.outcome = CaseOutcome::ExecutionError {
            message: "connection refused".into(),
        };
        let r = report(vec![
            checked("a", "GET /nodes", 200, all_pass()),
            checked(
                "b",
                "GET /nodes",
                418,
                vec![
                    CheckResult::pass(CheckName::NotAServerError),
                    CheckResult::fail(CheckName::StatusCodeConformance, "418 undocumented"),
                ],
            ),
            error_case,
        ]);

        let ops = r.operation_summaries();
        assert_eq!(ops.len(), 2);

        let nodes = &ops[0];
        assert_eq!(nodes.operation, "GET /nodes");
        assert_eq!(nodes.cases, 2);
        assert_eq!(nodes.checks[0].passed, 2);
        assert_eq!(nodes.checks[1].passed, 1);
        assert_eq!(nodes.checks[1].failed, 1);
        assert_eq!(nodes.checks[1].diagnostics, vec!["418 undocumented"]);

        let farms = &ops[1];
        assert_eq!(farms.errors, vec!["connection refused"]);
        assert!(farms.checks.iter().all(|t| t.inconclusive == 1));
    }

    #[test]
    fn skipped_operation_is_inconclusive() {
        let mut r = report(vec![]);
        r.skipped.push(SkippedOperation {
            operation: "GET /farms".into(),
            reason: "required parameter 'id' cannot be generated".into(),
        });
        let ops = r.operation_summaries();
        assert_eq!(ops[1].skipped.as_deref(), Some("required parameter 'id' cannot be generated"));
        assert!(ops[1].checks.iter().all(|t| t.inconclusive == 1));
        assert_eq!(r.summary().skipped_operations, 1);
    }

    #[test]
    fn failures_are_flattened_with_severity() {
        let r = report(vec![checked(
            "b",
            "GET /nodes",
            503,
            vec![
                CheckResult::fail(CheckName::NotAServerError, "503 on /nodes"),
                CheckResult::pass(CheckName::StatusCodeConformance),
            ],
        )]);
        let failures = r.failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].severity, Severity::Critical);
        assert_eq!(failures[0].status_code, 503);
        assert_eq!(failures[0].case_id, "b");
    }

    #[test]
    fn diagnostics_are_deduplicated_and_capped() {
        let mut tally = CheckTally::new(CheckName::StatusCodeConformance);
        for msg in ["a", "a", "b", "c", "d"] {
            tally.record(&CheckResult::fail(CheckName::StatusCodeConformance, msg));
        }
        assert_eq!(tally.failed, 5);
        assert_eq!(tally.diagnostics, vec!["a", "b", "c"]);
    }

    #[test]
    fn tally_line_format() {
        let tally = CheckTally {
            check: CheckName::StatusCodeConformance,
            passed: 3,
            failed: 1,
            inconclusive: 0,
            diagnostics: vec![],
        };
        insta::assert_snapshot!(tally_line(&tally), @"[FAIL] status_code_conformance      3 passed, 1 failed");
    }

    #[test]
    fn terminal_output_ends_with_single_exit_code() {
        let r = report(vec![checked("a", "GET /nodes", 200, all_pass())]);
        let verdict = crate::verdict::VerdictPolicy::default().verdict(&r);
        let text = r.to_terminal(&verdict);
        assert_eq!(text.matches("Exit code").count(), 1, "{text}");
        assert!(text.ends_with(&format!("Exit code: {}", verdict.exit_code)), "{text}");
    }

    #[test]
    fn case_outcome_serializes_with_kind_tag() {
        let outcome = CaseOutcome::ExecutionError {
            message: "timeout".into(),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["kind"], "execution_error");
        assert_eq!(json["message"], "timeout");
    }

    #[test]
    fn schema_generation_produces_valid_json() {
        let schema = generate_schema();
        let parsed: serde_json::Value = serde_json::from_str(&schema).unwrap();
        assert_eq!(
            parsed.get("title").and_then(|v| v.as_str()),
            Some("RunReport")
        );
    }
}
