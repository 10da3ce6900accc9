//! CLI entrypoint for the `rcu-core` stress harness.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use rcu_harness::scenarios::{run_scenario, Scenario};
use rcu_harness::structured_log::{LogEmitter, LogEntry, LogLevel, Outcome};

/// Stress-test harness for `rcu-core`.
#[derive(Debug, Parser)]
#[command(name = "rcu-stress")]
#[command(about = "Multi-threaded stress scenarios for rcu-core")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run every scenario in the catalog once and report pass/fail.
    Run {
        /// Structured JSONL log output path. Prints to stdout if omitted.
        #[arg(long)]
        log: Option<PathBuf>,
        /// Run ID used to namespace trace ids in the log output.
        #[arg(long, default_value = "run")]
        run_id: String,
    },
    /// List the available scenario names.
    List,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Command::List => {
            for scenario in Scenario::all() {
                println!("{}", scenario.name());
            }
        }
        Command::Run { log, run_id } => {
            let mut emitter = match &log {
                Some(path) => LogEmitter::to_file(path, &run_id)?,
                None => LogEmitter::to_buffer(&run_id),
            };

            let mut failures = 0;
            for &scenario in Scenario::all() {
                let report = run_scenario(scenario);
                let outcome = if report.passed {
                    Outcome::Pass
                } else {
                    failures += 1;
                    Outcome::Fail
                };
                let level = if report.passed {
                    LogLevel::Info
                } else {
                    LogLevel::Error
                };
                eprintln!(
                    "[{}] {} ({:?}) - {}",
                    if report.passed { "PASS" } else { "FAIL" },
                    scenario.name(),
                    report.elapsed,
                    report.detail,
                );
                emitter.emit(
                    LogEntry::new("", level, "scenario_complete")
                        .with_scenario(scenario.name())
                        .with_outcome(outcome)
                        .with_latency_ns(report.elapsed.as_nanos() as u64)
                        .with_details(serde_json::json!({ "detail": report.detail })),
                )?;
            }
            emitter.flush()?;

            if failures > 0 {
                return Err(format!("{failures} scenario(s) failed").into());
            }
            eprintln!("all scenarios passed");
        }
    }

    Ok(())
}
