//! mend - self-validation and recovery CLI
//!
//! Replays recorded scenarios through the recovery pipeline and inspects the
//! category registry and classifier.
//!
//! ## Commands
//!
//! - `run`: validate, recover and verify a scenario
//! - `validate`: print the validation snapshot of a scenario
//! - `categories`: list the error categories in processing order
//! - `classify`: show which category an issue description maps to

mod scenario;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, Level};

use mend_core::{
    CategoryRegistry, Issue, IssueClassifier, MendConfig, PipelineReport, Severity,
    ValidationSnapshot,
};

use crate::scenario::Scenario;

#[derive(Parser)]
#[command(name = "mend")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Self-validation and recovery pipeline", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON log lines and JSON reports
    #[arg(long, global = true)]
    json: bool,

    /// Pipeline configuration file (TOML)
    #[arg(short, long, global = true, env = "MEND_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run validation, recovery and verification on a scenario
    Run {
        /// Scenario file (TOML)
        #[arg(short, long)]
        scenario: PathBuf,

        /// Also write the JSON report to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the validation snapshot of a scenario
    Validate {
        /// Scenario file (TOML)
        #[arg(short, long)]
        scenario: PathBuf,
    },

    /// List error categories in processing order
    Categories,

    /// Show the category an issue description is classified into
    Classify {
        /// Issue description
        text: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    mend_core::init_tracing(cli.json, level);

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Run { scenario, output } => {
            cmd_run(config, &scenario, output.as_deref(), cli.json).await
        }
        Commands::Validate { scenario } => cmd_validate(config, &scenario, cli.json).await,
        Commands::Categories => cmd_categories(cli.json),
        Commands::Classify { text } => cmd_classify(&config, &text, cli.json),
    }
}

fn load_config(path: Option<&Path>) -> Result<MendConfig> {
    match path {
        Some(path) => {
            MendConfig::load(path).with_context(|| format!("Failed to load config: {:?}", path))
        }
        None => Ok(MendConfig::default()),
    }
}

/// Full pipeline on a scenario. Fails when the target ends up unhealthy.
async fn cmd_run(
    config: MendConfig,
    scenario_path: &Path,
    output: Option<&Path>,
    json: bool,
) -> Result<()> {
    let scenario = Scenario::load(scenario_path)?;
    let service = scenario.build_service(config)?;
    info!(target_id = %scenario.target, "running pipeline");

    let report = service
        .run_pipeline(&scenario.context())
        .await
        .with_context(|| format!("Pipeline failed for target {}", scenario.target))?;

    let report_json = serde_json::to_string_pretty(&report)?;
    if let Some(path) = output {
        std::fs::write(path, &report_json)
            .with_context(|| format!("Failed to write report to {:?}", path))?;
    }

    if json {
        println!("{}", report_json);
    } else {
        print_report(&report);
    }

    if !report.healthy() {
        anyhow::bail!("target {} is not healthy after recovery", report.target_id);
    }
    Ok(())
}

async fn cmd_validate(config: MendConfig, scenario_path: &Path, json: bool) -> Result<()> {
    let scenario = Scenario::load(scenario_path)?;
    let service = scenario.build_service(config)?;
    let snapshot = service
        .run_comprehensive_validation(&scenario.target_id())
        .await
        .with_context(|| format!("Validation failed for target {}", scenario.target))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        print_snapshot(&snapshot);
    }
    Ok(())
}

fn cmd_categories(json: bool) -> Result<()> {
    let registry = CategoryRegistry::standard();
    let ordered = registry.processing_order();

    if json {
        let rows: Vec<serde_json::Value> = ordered
            .iter()
            .map(|c| {
                serde_json::json!({
                    "name": c.name,
                    "severity": c.severity,
                    "recovery_priority": c.recovery_priority,
                    "recovery_strategies": c.recovery_strategies,
                    "fallback_strategies": c.fallback_strategies,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    for category in ordered {
        println!(
            "{:>2}  {:<22} {}",
            category.recovery_priority, category.name, category.severity
        );
        println!("      strategies: {}", category.recovery_strategies.join(", "));
        println!("      fallbacks:  {}", category.fallback_strategies.join(", "));
    }
    Ok(())
}

fn cmd_classify(config: &MendConfig, text: &str, json: bool) -> Result<()> {
    let registry = CategoryRegistry::standard();
    let classifier = IssueClassifier::new(&config.classifier, &registry)?;
    let category = classifier.classify(&Issue::new("cli", text, Severity::Error));

    if json {
        println!(
            "{}",
            serde_json::json!({ "description": text, "category": category })
        );
    } else {
        println!("{}", category);
    }
    Ok(())
}

fn print_snapshot(snapshot: &ValidationSnapshot) {
    let verdict = if snapshot.success() { "valid" } else { "invalid" };
    println!("Target:   {}", snapshot.target_id);
    println!("Status:   {}", verdict);
    println!(
        "Startup:  domain consistent={} registration available={}",
        snapshot.startup.domain_consistent, snapshot.startup.registration_available
    );
    for (kind, report) in &snapshot.comprehensive.reports {
        let mark = if report.passed { "ok" } else { "FAIL" };
        println!("  [{:<4}] {}", mark, kind);
    }
    println!(
        "Issues:   {}  Warnings: {}",
        snapshot.issue_count(),
        snapshot.warning_count()
    );
    for issue in snapshot
        .startup
        .issues
        .iter()
        .chain(snapshot.comprehensive.issues())
    {
        println!("  - {} ({}): {}", issue.source, issue.severity, issue.description);
    }
}

fn print_report(report: &PipelineReport) {
    print_snapshot(&report.pre_validation);

    match &report.recovery {
        None => println!("\nNo recovery needed."),
        Some(recovery) => {
            println!(
                "\nRecovery: {} ({} of {} issues resolved, {} ms)",
                recovery.overall_status,
                recovery.recovered_issues,
                recovery.total_issues,
                recovery.duration_ms
            );
            for step in &recovery.recovery_steps {
                let mark = if step.success { "ok" } else { "FAIL" };
                println!("  [{:<4}] {}.{}", mark, step.category, step.strategy);
            }
            if recovery.emergency_mode {
                println!("  Emergency mode is active.");
            }
        }
    }

    if let Some(verification) = &report.verification {
        println!(
            "\nVerification: {} ({} of {} tests passed)",
            verification.overall_status, verification.tests_passed, verification.tests_run
        );
        for test in verification.verification_tests.iter().filter(|t| !t.success) {
            println!("  [FAIL] {}: {}", test.name, test.errors.join("; "));
        }
    }

    if !report.recommendations.is_empty() {
        println!("\nRecommendations:");
        for line in &report.recommendations {
            println!("  - {}", line);
        }
    }
}
