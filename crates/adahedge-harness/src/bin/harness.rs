//! CLI entrypoint for the adahedge harness.

use std::path::PathBuf;

use adahedge_core::trace_level;
use adahedge_harness::structured_log::{LogEmitter, LogEntry, LogLevel, Outcome, validate_log_file};
use adahedge_harness::{
    FixtureSet, HarnessError, LossInput, RunOutput, determinism, run_table, verify_fixture_set,
};
use clap::{Parser, Subcommand};

/// Conformance tooling for adahedge.
#[derive(Debug, Parser)]
#[command(name = "adahedge-harness")]
#[command(about = "Run, verify and audit the AdaHedge forecaster")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Forecast a loss table and print the outputs as JSON.
    Run {
        /// Loss table JSON: `[[f64]]` or `{"experts": K, "losses": [[f64]]}`.
        #[arg(long)]
        losses: PathBuf,
        /// Output JSON path (if omitted, prints to stdout).
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Verify forecasts against a fixture file.
    Verify {
        /// Fixture JSON file.
        #[arg(long)]
        fixture: PathBuf,
        /// Output report path (markdown).
        #[arg(long)]
        report: Option<PathBuf>,
        /// Structured JSONL log path.
        #[arg(long)]
        log: Option<PathBuf>,
    },
    /// Run the determinism and invariant gate.
    Determinism {
        /// Fixture JSON file contributing scenarios.
        #[arg(long)]
        fixture: PathBuf,
        /// Output JSON report path.
        #[arg(long)]
        report: PathBuf,
        /// Structured JSONL log path.
        #[arg(long)]
        log: PathBuf,
    },
    /// Validate a structured JSONL log.
    ValidateLog {
        #[arg(long)]
        log: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run { losses, output } => {
            let table = LossInput::from_file(&losses)?.into_table()?;
            let mut emitter = LogEmitter::to_stderr("run");
            let case = losses.display().to_string();
            let run = run_table(&table, &case, trace_level(), &mut emitter)?;
            let json = serde_json::to_string_pretty(&RunOutput::from_forecast(&run))?;
            match output {
                Some(path) => std::fs::write(&path, json)?,
                None => println!("{json}"),
            }
        }
        Command::Verify {
            fixture,
            report,
            log,
        } => {
            eprintln!("Verifying against {}", fixture.display());
            let set = FixtureSet::from_file(&fixture)?;
            let summary = verify_fixture_set(&set);

            if let Some(path) = log {
                let mut emitter = LogEmitter::to_file(&path, "verify")?;
                for case in &summary.results {
                    emitter.emit_entry(
                        LogEntry::new(
                            "",
                            if case.passed { LogLevel::Info } else { LogLevel::Error },
                            "verify.case",
                        )
                        .with_gate("verify")
                        .with_case(&case.name)
                        .with_outcome(Outcome::from_ok(case.passed))
                        .with_details(serde_json::json!({
                            "max_abs_error": case.max_abs_error,
                            "detail": case.detail,
                            "digest": case.digest,
                        })),
                    )?;
                }
                emitter.flush()?;
            }

            let md = summary.render_markdown();
            match report {
                Some(path) => std::fs::write(&path, &md)?,
                None => print!("{md}"),
            }
            eprintln!(
                "{} of {} cases passed ({})",
                summary.passed, summary.total, summary.family
            );
            if !summary.all_passed() {
                return Err(HarnessError::Failed {
                    gate: "verify",
                    failed: summary.failed,
                    total: summary.total,
                }
                .into());
            }
        }
        Command::Determinism {
            fixture,
            report,
            log,
        } => {
            let set = FixtureSet::from_file(&fixture)?;
            let result = determinism::run_and_write(&set, &log, &report)?;
            eprintln!(
                "determinism: {} of {} scenarios passed, report at {}",
                result.summary.passed,
                result.summary.scenarios,
                report.display()
            );
            if !result.all_passed() {
                return Err(HarnessError::Failed {
                    gate: "determinism",
                    failed: result.summary.failed,
                    total: result.summary.scenarios,
                }
                .into());
            }
        }
        Command::ValidateLog { log } => match validate_log_file(&log) {
            Ok(count) => eprintln!("{}: {count} valid entries", log.display()),
            Err(errors) => {
                for err in &errors {
                    eprintln!("{err}");
                }
                let count = errors.len();
                return Err(format!("{count} validation errors in {}", log.display()).into());
            }
        },
    }

    Ok(())
}
