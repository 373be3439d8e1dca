//! Run orchestration: generate, execute and check every operation
//!
//! Cases run on a dedicated rayon pool sized by `concurrency`. The only
//! shared state is the read-only [`Schema`]; each case owns its values.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use apiconform_core::{
    CaseOutcome, CaseReport, CheckName, Config, ConfigError, DryRunPlan, OperationPlan,
    RequestSnapshot, RunReport, SkippedOperation, Validation, ValidationStatus, validate_config,
};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::cases::{CaseGenerator, GeneratedCase, GenerationSettings};
use crate::checks::run_checks;
use crate::executor::{ExecutionError, Executor};
use crate::loader::{self, LoadError};
use crate::model::Schema;

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("cannot build HTTP client: {0}")]
    Client(#[source] ExecutionError),
    #[error("cannot start worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Resolved run settings.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub concurrency: usize,
    pub request_timeout: Duration,
    pub run_timeout: Option<Duration>,
    pub checks: Vec<CheckName>,
    pub headers: HashMap<String, String>,
    pub generation: GenerationSettings,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            concurrency: 4,
            request_timeout: Duration::from_secs(10),
            run_timeout: None,
            checks: CheckName::all(),
            headers: HashMap::new(),
            generation: GenerationSettings::default(),
        }
    }
}

impl RunSettings {
    /// Settings from a validated config. Without a configured seed a random
    /// one is drawn; it is recorded in the report.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            concurrency: config.concurrency.max(1),
            request_timeout: Duration::from_secs_f64(config.request_timeout),
            run_timeout: config.run_timeout.map(Duration::from_secs_f64),
            checks: config.checks.clone(),
            headers: config.headers.clone(),
            generation: GenerationSettings {
                seed: config.seed.unwrap_or_else(rand::random),
                max_cases: config.max_cases,
                random_cases: config.random_cases,
                path_params: config.path_params.clone(),
            },
        }
    }
}

/// Conformance runner for one schema and one base URL.
#[derive(Debug)]
pub struct Runner {
    base_url: String,
    schema_location: String,
    schema: Schema,
    settings: RunSettings,
}

impl Runner {
    #[must_use]
    pub fn new(
        base_url: impl Into<String>,
        schema_location: impl Into<String>,
        schema: Schema,
        settings: RunSettings,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            schema_location: schema_location.into(),
            schema,
            settings,
        }
    }

    /// Validate the config, resolve the target and load the schema.
    ///
    /// # Errors
    ///
    /// Returns [`RunError::Config`] for invalid settings or an unresolvable
    /// target, [`RunError::Load`] if the schema cannot be fetched or parsed.
    pub fn from_config(config: &Config) -> Result<Self, RunError> {
        config.validate()?;
        let resolved = config.resolve()?;
        let settings = RunSettings::from_config(config);
        let schema = loader::load(&resolved.schema, settings.request_timeout)?;
        info!(
            schema = %resolved.schema,
            title = %schema.title,
            version = %schema.version,
            operations = schema.len(),
            "schema loaded"
        );
        Ok(Self::new(
            resolved.base_url,
            resolved.schema.to_string(),
            schema,
            settings,
        ))
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Where the schema was loaded from
    #[must_use]
    pub fn schema_location(&self) -> &str {
        &self.schema_location
    }

    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    #[must_use]
    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    /// Describe what [`Runner::run`] would do. No requests are sent.
    #[must_use]
    pub fn plan(&self, config: &Config) -> DryRunPlan {
        let mut operations = Vec::new();
        let mut total_cases: u64 = 0;

        for op in self.schema.operations() {
            let (cases, skipped) = match &op.unsupported {
                Some(reason) => (0, Some(reason.clone())),
                None => {
                    let generator = CaseGenerator::new(Arc::clone(op), &self.settings.generation);
                    (
                        u32::try_from(generator.len()).unwrap_or(u32::MAX),
                        generator.unsatisfiable().map(String::from),
                    )
                }
            };
            total_cases += u64::from(cases);

            operations.push(OperationPlan {
                operation: op.label(),
                method: op.method.clone(),
                path: op.path.clone(),
                cases,
                declared_statuses: op.declared_statuses().iter().map(ToString::to_string).collect(),
                parameters: op
                    .parameters
                    .iter()
                    .map(|p| format!("{}:{}{}", p.location, p.name, if p.required { "*" } else { "" }))
                    .collect(),
                skipped,
            });
        }

        let mut validations = validate_config(config);
        validations.push(Validation::new(
            "schema_parse",
            if self.schema.is_empty() {
                ValidationStatus::Error
            } else {
                ValidationStatus::Ok
            },
            format!(
                "schema parsed: {} ({}), {} operations",
                self.schema.title,
                self.schema.dialect,
                self.schema.len()
            ),
        ));

        DryRunPlan {
            base_url: self.base_url.clone(),
            schema: self.schema_location.clone(),
            operations,
            total_cases,
            validations,
        }
    }

    /// Execute every case and check every response.
    ///
    /// Per-case network failures are recorded in the report; they never
    /// abort the run.
    ///
    /// # Errors
    ///
    /// Returns [`RunError::Client`] if the HTTP client cannot be built and
    /// [`RunError::ThreadPool`] if the worker pool cannot start.
    pub fn run(&self) -> Result<RunReport, RunError> {
        let start = Instant::now();
        let deadline = self.settings.run_timeout.map(|t| start + t);
        let executor = Executor::new(
            &self.base_url,
            &self.settings.headers,
            self.settings.request_timeout,
        )
        .map_err(RunError::Client)?;

        let mut generators = Vec::new();
        let mut skipped = Vec::new();
        for op in self.schema.operations() {
            let label = op.label();
            if let Some(reason) = &op.unsupported {
                warn!(operation = %label, %reason, "operation skipped");
                skipped.push(SkippedOperation {
                    operation: label,
                    reason: reason.clone(),
                });
                continue;
            }
            let generator = CaseGenerator::new(Arc::clone(op), &self.settings.generation);
            if let Some(reason) = generator.unsatisfiable() {
                warn!(operation = %label, %reason, "operation skipped");
                skipped.push(SkippedOperation {
                    operation: label,
                    reason: reason.to_string(),
                });
                continue;
            }
            debug!(operation = %label, cases = generator.len(), "cases planned");
            generators.push(generator);
        }

        let cases: Vec<GeneratedCase> = generators.iter().flat_map(CaseGenerator::cases).collect();
        info!(
            operations = self.schema.len(),
            cases = cases.len(),
            concurrency = self.settings.concurrency,
            seed = self.settings.generation.seed,
            "running"
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.settings.concurrency)
            .build()?;
        let reports: Vec<CaseReport> = pool.install(|| {
            cases
                .par_iter()
                .map(|case| self.run_case(&executor, case, deadline))
                .collect()
        });

        let timed_out = deadline.is_some_and(|d| Instant::now() >= d)
            || reports
                .iter()
                .any(|r| matches!(r.outcome, CaseOutcome::Inconclusive { .. }));

        let report = RunReport {
            base_url: self.base_url.clone(),
            schema: self.schema_location.clone(),
            checks: self.settings.checks.clone(),
            operations: self.schema.operations().iter().map(|op| op.label()).collect(),
            cases: reports,
            skipped,
            duration_secs: start.elapsed().as_secs_f64(),
            seed: self.settings.generation.seed,
            timed_out,
        };

        for op in report.operation_summaries() {
            let failed: u64 = op.checks.iter().map(|t| t.failed).sum();
            let inconclusive = op.checks.iter().map(|t| t.inconclusive).max().unwrap_or(0);
            info!(
                operation = %op.operation,
                cases = op.cases,
                failed_checks = failed,
                errors = op.errors.len(),
                inconclusive,
                "operation finished"
            );
        }

        Ok(report)
    }

    fn run_case(
        &self,
        executor: &Executor,
        case: &GeneratedCase,
        deadline: Option<Instant>,
    ) -> CaseReport {
        let op = case.operation();
        let report = |request: RequestSnapshot, outcome: CaseOutcome| CaseReport {
            id: case.id().to_string(),
            operation: op.label(),
            index: case.index(),
            target_status: case.target_status().map(|s| s.to_string()),
            request,
            outcome,
        };

        let request = match executor.prepare(case) {
            Ok(request) => request,
            Err(e) => {
                let snapshot = RequestSnapshot {
                    method: op.method.clone(),
                    url: format!("{}{}", self.base_url, op.path),
                    headers: Default::default(),
                    body: None,
                };
                return report(snapshot, CaseOutcome::ExecutionError { message: e.to_string() });
            }
        };
        let snapshot = request.snapshot();

        let (timeout, clipped) = match deadline {
            Some(d) => {
                let remaining = d.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    return report(
                        snapshot,
                        CaseOutcome::Inconclusive {
                            reason: "run timeout expired before the case started".into(),
                        },
                    );
                }
                (
                    remaining.min(self.settings.request_timeout),
                    remaining < self.settings.request_timeout,
                )
            }
            None => (self.settings.request_timeout, false),
        };

        let outcome = match executor.send(case, &request, timeout) {
            Ok(resp) => {
                let results = run_checks(&self.settings.checks, &resp);
                CaseOutcome::Checked {
                    response: resp.snapshot(),
                    results,
                }
            }
            Err(e) if e.is_timeout() && clipped => CaseOutcome::Inconclusive {
                reason: "run timeout expired while the request was in flight".into(),
            },
            Err(e) => CaseOutcome::ExecutionError {
                message: e.to_string(),
            },
        };

        debug!(
            case = case.id(),
            operation = %op.label(),
            kind = %case.kind(),
            outcome = outcome_label(&outcome),
            "case finished"
        );
        report(snapshot, outcome)
    }
}

const fn outcome_label(outcome: &CaseOutcome) -> &'static str {
    match outcome {
        CaseOutcome::Checked { .. } => "checked",
        CaseOutcome::ExecutionError { .. } => "execution_error",
        CaseOutcome::Inconclusive { .. } => "inconclusive",
    }
}
