//! apiconform CLI - check a running API against its OpenAPI / Swagger document

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use tracing::level_filters::LevelFilter;

use apiconform_core::{CheckName, Config, TOOL_ERROR_EXIT, Target, VerdictPolicy};
use apiconform_runner::Runner;

const CONFIG_FILE: &str = ".apiconform.toml";

#[derive(Parser)]
#[command(name = "apiconform")]
#[command(about = "Check a running API against its OpenAPI / Swagger document")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, global = true, default_value = "terminal")]
    output: OutputFormat,

    /// Strict mode (inconclusive cases fail the run). Use --strict false to disable.
    #[arg(long, global = true, default_value_t = true, action = ArgAction::Set)]
    strict: bool,

    /// Log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Disable logging
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate cases, send them and check every response
    Run {
        #[command(flatten)]
        target: TargetArgs,

        /// Write the full JSON report to this file
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Show operations and case counts without sending requests
    Plan {
        #[command(flatten)]
        target: TargetArgs,
    },

    /// List named targets
    Targets,

    /// Initialize config file
    Init,

    /// Export JSON Schema for the report format
    Schema,
}

/// Settings shared by `run` and `plan`; each overrides the config file.
#[derive(Args, Debug, Default)]
struct TargetArgs {
    /// Named target: main, dev, qa, test or local
    #[arg(short, long, env = "NETWORK")]
    target: Option<String>,

    /// Schema location (file path or http(s) URL)
    #[arg(short, long)]
    schema: Option<String>,

    /// Base URL of the service under test
    #[arg(short, long)]
    base_url: Option<String>,

    /// Config file (default: .apiconform.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Extra request header, "Name: value" (repeatable)
    #[arg(short = 'H', long = "header")]
    headers: Vec<String>,

    /// Parallel requests
    #[arg(long)]
    concurrency: Option<usize>,

    /// Per-request timeout in seconds
    #[arg(long)]
    request_timeout: Option<f64>,

    /// Whole-run timeout in seconds
    #[arg(long)]
    run_timeout: Option<f64>,

    /// Checks to run, comma separated (default: all)
    #[arg(long, value_delimiter = ',')]
    checks: Option<Vec<String>>,

    /// Max cases per operation
    #[arg(long)]
    max_cases: Option<u32>,

    /// Random cases per operation
    #[arg(long)]
    random_cases: Option<u32>,

    /// Seed for case generation
    #[arg(long)]
    seed: Option<u64>,
}

impl TargetArgs {
    /// Config file values with command line overrides applied.
    fn config(&self) -> Result<Config> {
        let mut cfg = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::load_default()?,
        };
        self.apply(&mut cfg)?;
        Ok(cfg)
    }

    fn apply(&self, cfg: &mut Config) -> Result<()> {
        if let Some(target) = &self.target {
            cfg.target = Some(target.parse()?);
        }
        if let Some(schema) = &self.schema {
            cfg.schema = Some(schema.clone());
        }
        if let Some(base_url) = &self.base_url {
            cfg.base_url = Some(base_url.clone());
        }
        for header in &self.headers {
            let Some((name, value)) = header.split_once(':') else {
                bail!("invalid header '{header}', expected \"Name: value\"");
            };
            cfg.headers
                .insert(name.trim().to_string(), value.trim().to_string());
        }
        if let Some(n) = self.concurrency {
            cfg.concurrency = n;
        }
        if let Some(t) = self.request_timeout {
            cfg.request_timeout = t;
        }
        if let Some(t) = self.run_timeout {
            cfg.run_timeout = Some(t);
        }
        if let Some(checks) = &self.checks {
            cfg.checks = checks
                .iter()
                .map(|c| c.parse::<CheckName>())
                .collect::<Result<_, _>>()?;
        }
        if let Some(n) = self.max_cases {
            cfg.max_cases = Some(n);
        }
        if let Some(n) = self.random_cases {
            cfg.random_cases = n;
        }
        if let Some(seed) = self.seed {
            cfg.seed = Some(seed);
        }
        Ok(())
    }
}

#[derive(Clone, Copy, ValueEnum, PartialEq, Eq)]
enum OutputFormat {
    Terminal,
    Json,
    Silent,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match run(cli) {
        Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(TOOL_ERROR_EXIT as u8)
        }
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        LevelFilter::OFF
    } else {
        match verbose {
            0 => LevelFilter::WARN,
            1 => LevelFilter::INFO,
            2 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Commands::Run { target, report } => {
            let cfg = target.config()?;
            let runner = Runner::from_config(&cfg).context("cannot prepare run")?;

            if cli.output != OutputFormat::Silent {
                eprintln!("Config:");
                eprintln!("  base_url:    {}", runner.base_url());
                eprintln!("  schema:      {}", runner.schema_location());
                eprintln!("  operations:  {}", runner.schema().len());
                eprintln!("  concurrency: {}", runner.settings().concurrency);
                if !cfg.headers.is_empty() {
                    eprintln!("  headers:     {} configured", cfg.headers.len());
                }
                eprintln!("  seed:        {}", runner.settings().generation.seed);
                eprintln!();
            }

            let result = runner.run()?;

            let policy = if cli.strict {
                VerdictPolicy::default()
            } else {
                VerdictPolicy::lenient()
            };
            let verdict = policy.verdict(&result);

            match cli.output {
                OutputFormat::Terminal => {
                    println!("{}", result.to_terminal(&verdict));
                }
                OutputFormat::Json => {
                    let json_output = serde_json::json!({
                        "verdict": {
                            "status": verdict.status.to_string(),
                            "exit_code": verdict.exit_code,
                            "reason": verdict.reason,
                        },
                        "seed": result.seed,
                        "timed_out": result.timed_out,
                        "summary": result.summary(),
                        "operations": result.operation_summaries(),
                        "skipped": result.skipped,
                        "failures": result.failures(),
                    });
                    println!("{}", serde_json::to_string_pretty(&json_output)?);
                }
                OutputFormat::Silent => {}
            }

            if let Some(path) = report {
                write_report(&path, &serde_json::to_string_pretty(&result)?)?;
                if cli.output != OutputFormat::Silent {
                    eprintln!("Report saved: {}", path.display());
                }
            }

            Ok(verdict.exit_code)
        }

        Commands::Plan { target } => {
            let cfg = target.config()?;
            let runner = Runner::from_config(&cfg).context("cannot prepare plan")?;
            let plan = runner.plan(&cfg);
            match cli.output {
                OutputFormat::Terminal => {
                    println!("{}", plan.to_terminal());
                }
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&plan)?);
                }
                OutputFormat::Silent => {}
            }
            Ok(if plan.has_errors() { 1 } else { 0 })
        }

        Commands::Targets => {
            match cli.output {
                OutputFormat::Terminal => {
                    for t in Target::ALL {
                        println!(
                            "{:<6} {} (schema: {})",
                            t.to_string(),
                            t.base_url(),
                            t.schema_source()
                        );
                    }
                }
                OutputFormat::Json => {
                    let list: Vec<_> = Target::ALL
                        .iter()
                        .map(|t| {
                            serde_json::json!({
                                "name": t.to_string(),
                                "base_url": t.base_url(),
                                "schema": t.schema_source().to_string(),
                            })
                        })
                        .collect();
                    println!("{}", serde_json::to_string_pretty(&list)?);
                }
                OutputFormat::Silent => {}
            }
            Ok(0)
        }

        Commands::Init => {
            if Path::new(CONFIG_FILE).exists() {
                eprintln!("{CONFIG_FILE} already exists");
                return Ok(1);
            }

            std::fs::write(CONFIG_FILE, Config::example())
                .with_context(|| format!("cannot write {CONFIG_FILE}"))?;
            println!("Created {CONFIG_FILE}");
            println!("\nEdit the file to configure:");
            println!("  - target: named environment, or");
            println!("  - schema + base_url: document location and service to test");
            println!("  - headers: auth tokens, API keys");
            println!("  - path_params: entity IDs that exist on the server");
            Ok(0)
        }

        Commands::Schema => {
            let schema = apiconform_core::report::generate_schema();
            println!("{schema}");
            Ok(0)
        }
    }
}

fn write_report(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("cannot create {}", parent.display()))?;
    }
    std::fs::write(path, content).with_context(|| format!("cannot write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("apiconform").chain(args.iter().copied())).unwrap()
    }

    fn target_args(cli: Cli) -> TargetArgs {
        match cli.command {
            Commands::Run { target, .. } | Commands::Plan { target } => target,
            _ => panic!("not a run/plan command"),
        }
    }

    #[test]
    fn flags_override_config() {
        let cli = parse(&[
            "run",
            "--target",
            "qa",
            "--base-url",
            "http://localhost:9000",
            "-H",
            "Authorization: Bearer x",
            "--checks",
            "not_a_server_error,status-code-conformance",
            "--concurrency",
            "8",
            "--run-timeout",
            "60",
            "--seed",
            "9",
        ]);
        let args = target_args(cli);
        let mut cfg = Config::default();
        args.apply(&mut cfg).unwrap();

        assert_eq!(cfg.target, Some(Target::Qa));
        assert_eq!(cfg.base_url.as_deref(), Some("http://localhost:9000"));
        assert_eq!(cfg.headers["Authorization"], "Bearer x");
        assert_eq!(
            cfg.checks,
            vec![CheckName::NotAServerError, CheckName::StatusCodeConformance]
        );
        assert_eq!(cfg.concurrency, 8);
        assert_eq!(cfg.run_timeout, Some(60.0));
        assert_eq!(cfg.seed, Some(9));
    }

    #[test]
    fn unknown_check_is_rejected() {
        let args = target_args(parse(&["plan", "--checks", "everything"]));
        let err = args.apply(&mut Config::default()).unwrap_err();
        assert!(err.to_string().contains("everything"));
    }

    #[test]
    fn malformed_header_is_rejected() {
        let args = target_args(parse(&["run", "-H", "no-colon"]));
        assert!(args.apply(&mut Config::default()).is_err());
    }

    #[test]
    fn strict_defaults_on() {
        assert!(parse(&["targets"]).strict);
        assert!(!parse(&["--strict", "false", "targets"]).strict);
        assert_eq!(parse(&["-vv", "targets"]).verbose, 2);
    }
}
