//! pgcomply - declarative compliance-check runner for PostgreSQL
//!
//! This is the main entry point for the command line:
//! - `pgcomply run` evaluates a control catalog against a target
//! - `pgcomply catalog list` / `catalog lint` inspect the catalog offline

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use pgcomply_catalog::{load_catalog_from_dir, ControlCatalog, Selection};
use pgcomply_core::{OutcomeKind, Severity};
use pgcomply_probe::PgProbe;
use pgcomply_runner::{
    env_overrides, ControlRunner, InputProfile, InputResolver, RunReport, RunnerSettings,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// pgcomply compliance runner
#[derive(Parser, Debug)]
#[command(name = "pgcomply")]
#[command(version)]
#[command(about = "Declarative compliance-check runner for PostgreSQL", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log format (pretty, json, compact)
    #[arg(long, default_value = "pretty")]
    log_format: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Evaluate the catalog against a target database
    Run(RunArgs),

    /// Inspect a control catalog without a target
    Catalog {
        #[command(subcommand)]
        command: CatalogCommand,
    },
}

#[derive(Subcommand, Debug)]
enum CatalogCommand {
    /// List the controls in a catalog
    List {
        /// Catalog directory
        #[arg(long, default_value = "catalog")]
        catalog: String,
    },

    /// Load and statically validate a catalog
    Lint {
        /// Catalog directory
        #[arg(long, default_value = "catalog")]
        catalog: String,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Catalog directory
    #[arg(long, default_value = "catalog")]
    catalog: String,

    /// Input profile file (YAML mapping of input name to value)
    #[arg(long)]
    inputs: Option<String>,

    /// Input override (repeatable)
    #[arg(long = "set", value_name = "NAME=VALUE")]
    set: Vec<String>,

    /// Select a control by id (repeatable; default: all)
    #[arg(long = "control", value_name = "ID")]
    controls: Vec<String>,

    /// Select controls by tag (repeatable)
    #[arg(long = "tag", value_name = "KEY=VALUE")]
    tags: Vec<String>,

    /// Minimum control severity (low, medium, high)
    #[arg(long)]
    min_severity: Option<Severity>,

    /// Target host (overrides config)
    #[arg(long)]
    host: Option<String>,

    /// Target port (overrides config)
    #[arg(long)]
    port: Option<u16>,

    /// Target database name (overrides config)
    #[arg(long)]
    dbname: Option<String>,

    /// Target user (overrides config; password comes from
    /// PGCOMPLY_TARGET_PASSWORD or the config file)
    #[arg(long)]
    user: Option<String>,

    /// Report output path (stdout when omitted)
    #[arg(short, long)]
    output: Option<String>,

    /// Output format (text, json)
    #[arg(long, default_value = "text")]
    format: String,

    /// Only show failed and errored outcomes in text output
    #[arg(long)]
    failures_only: bool,

    /// Run deadline in seconds (overrides config)
    #[arg(long)]
    deadline: Option<u64>,

    /// Which outcomes make the exit code non-zero (fail, error, never)
    #[arg(long, default_value = "fail")]
    fail_on: String,
}

fn default_config_path() -> String {
    String::from("/etc/pgcomply/config.toml")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = pgcomply_common::LogConfig::new()
        .level(&cli.log_level)
        .format(pgcomply_common::LogFormat::parse(&cli.log_format));
    pgcomply_common::init_logging_with_config(log_config);

    // Load configuration
    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let config = if std::path::Path::new(&config_path).exists() {
        info!("Loading config from: {}", config_path);
        pgcomply_common::Config::from_file(&config_path)?
    } else {
        debug!("Config file not found, using defaults");
        pgcomply_common::Config::default()
    };
    let config = config.merge_env();

    match cli.command {
        Command::Run(args) => {
            let exit_code = run(config, args).await?;
            std::process::exit(exit_code);
        }
        Command::Catalog { command } => match command {
            CatalogCommand::List { catalog } => {
                let catalog = load_catalog_from_dir(&catalog)?;
                print_catalog(&catalog);
            }
            CatalogCommand::Lint { catalog } => {
                // load_catalog_from_dir runs the full validation pass
                let catalog = load_catalog_from_dir(&catalog)?;
                println!(
                    "catalog ok: {} controls, {} input declarations",
                    catalog.len(),
                    catalog.input_specs().count()
                );
            }
        },
    }

    Ok(())
}

async fn run(mut config: pgcomply_common::Config, args: RunArgs) -> Result<i32> {
    // CLI target overrides beat config and environment
    if let Some(host) = args.host {
        config.target.host = host;
    }
    if let Some(port) = args.port {
        config.target.port = port;
    }
    if let Some(dbname) = args.dbname {
        config.target.dbname = dbname;
    }
    if let Some(user) = args.user {
        config.target.user = user;
    }
    if let Some(deadline) = args.deadline {
        config.runner.deadline_secs = Some(deadline);
    }

    // Catalog and input-profile load errors are fatal before any control runs
    let catalog = load_catalog_from_dir(&args.catalog)?;
    let profile = match &args.inputs {
        Some(path) => InputProfile::from_file(path)?,
        None => InputProfile::empty(),
    };

    // Explicit --set beats PGCOMPLY_INPUT_* environment overrides
    let mut overrides = env_overrides();
    for entry in &args.set {
        let (name, value) = split_pair(entry).context("--set expects NAME=VALUE")?;
        overrides.insert(name, value);
    }

    let mut selection = Selection {
        ids: args.controls.clone(),
        min_severity: args.min_severity,
        ..Selection::default()
    };
    for entry in &args.tags {
        selection
            .tags
            .push(split_pair(entry).context("--tag expects KEY=VALUE")?);
    }

    let selected: Vec<_> = catalog
        .select(&selection)
        .into_iter()
        .cloned()
        .collect();
    if selected.is_empty() {
        anyhow::bail!("selection matches no controls in {}", args.catalog);
    }
    info!("Selected {} of {} controls", selected.len(), catalog.len());

    let resolver = Arc::new(InputResolver::new(
        catalog.input_specs(),
        profile,
        overrides,
    ));
    let target_label = config.target.label();
    let probe = Arc::new(
        PgProbe::new(config.target.clone())
            .with_exec_timeout(std::time::Duration::from_secs(config.runner.exec_timeout_secs)),
    );

    let settings = RunnerSettings {
        max_concurrent_sessions: config.runner.max_concurrent_sessions,
        exec_timeout_secs: config.runner.exec_timeout_secs,
        deadline_secs: config.runner.deadline_secs,
    };
    let runner = ControlRunner::new(probe, resolver).with_settings(settings);
    let report = runner.run(&selected, &target_label).await;

    let rendered = match args.format.as_str() {
        "json" => report.to_json()?,
        _ => render_text(&report, args.failures_only),
    };
    match &args.output {
        Some(path) => {
            std::fs::write(path, rendered.as_bytes())
                .with_context(|| format!("cannot write report to {}", path))?;
            info!("Report written to {}", path);
        }
        None => println!("{}", rendered),
    }

    Ok(exit_code(&report, &args.fail_on))
}

/// Exit-code policy: `fail` (default) flags failures and errors, `error`
/// flags only errors, `never` always exits zero.
fn exit_code(report: &RunReport, fail_on: &str) -> i32 {
    match fail_on {
        "never" => 0,
        "error" => {
            if report.has_errors() {
                1
            } else {
                0
            }
        }
        _ => {
            if report.has_failures() || report.has_errors() {
                1
            } else {
                0
            }
        }
    }
}

fn split_pair(entry: &str) -> Option<(String, String)> {
    entry
        .split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
}

fn print_catalog(catalog: &ControlCatalog) {
    for control in catalog.controls() {
        let marker = if control.skip.is_some() { " (manual)" } else { "" };
        println!(
            "{:<12} {:<8} {}{}",
            control.id, control.severity, control.title, marker
        );
    }
    println!("{} controls", catalog.len());
}

fn render_text(report: &RunReport, failures_only: bool) -> String {
    use std::fmt::Write;

    let mut out = String::new();
    let _ = writeln!(out, "target: {}  run: {}", report.target, report.run_id);

    for outcome in report.outcomes() {
        if failures_only && !matches!(outcome.kind, OutcomeKind::Fail | OutcomeKind::Error) {
            continue;
        }
        let tag = outcome.kind.as_str().to_uppercase();
        let detail = match outcome.kind {
            OutcomeKind::Pass => format!("got {}", outcome.actual),
            OutcomeKind::Fail => {
                format!("expected {}, got {}", outcome.expected, outcome.actual)
            }
            OutcomeKind::Skip | OutcomeKind::Error => {
                outcome.reason.clone().unwrap_or_default()
            }
        };
        let _ = writeln!(
            out,
            "[{:<5}] {:<12} {:<6} {} - {}",
            tag, outcome.control_id, outcome.severity, outcome.description, detail
        );
    }

    let s = &report.summary;
    let _ = writeln!(
        out,
        "{} controls: {} passed, {} failed, {} skipped, {} errors (failed by severity: {} high, {} medium, {} low)",
        s.total_controls,
        s.passed,
        s.failed,
        s.skipped,
        s.errored,
        s.failed_by_severity.high,
        s.failed_by_severity.medium,
        s.failed_by_severity.low
    );
    out
}
