// Ledger TCK runner
//
// Loads YAML conformance scenarios, runs them against a live SUT and writes
// reports.
//
// Usage:
//   ledger-tck run specs/ --junit target/tck.xml --concurrency 4
//   ledger-tck check specs/

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{error, info, warn};

use ledger_tck::conformance::ConformanceRunner;
use ledger_tck::{SuiteContext, TckConfig};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "ledger-tck")]
#[command(about = "Conformance suite for ledger JSON-RPC implementations", long_about = None)]
struct Args {
    /// Enable verbose logging
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run every scenario under a directory against the configured SUT
    Run {
        /// Directory holding YAML scenarios
        dir: PathBuf,

        /// Only run scenarios whose name contains this text
        #[arg(short, long)]
        filter: Option<String>,

        /// Scenarios in flight at once
        #[arg(short, long, default_value_t = 1)]
        concurrency: usize,

        /// Write a JUnit XML report here
        #[arg(long)]
        junit: Option<PathBuf>,

        /// Write a JSON report here
        #[arg(long)]
        json: Option<PathBuf>,
    },
    /// Parse and validate scenarios without contacting the SUT
    Check {
        /// Directory holding YAML scenarios
        dir: PathBuf,
    },
}

async fn run(
    dir: PathBuf,
    filter: Option<String>,
    concurrency: usize,
    junit: Option<PathBuf>,
    json: Option<PathBuf>,
) -> Result<bool> {
    let config = TckConfig::from_env().context("loading configuration")?;
    let mut runner = ConformanceRunner::load_from_dir(&dir)
        .with_context(|| format!("loading scenarios from {}", dir.display()))?;
    if let Some(pattern) = filter.as_deref() {
        runner = runner.filter_name(pattern);
    }
    if runner.spec_count() == 0 {
        warn!("no scenarios selected under {}", dir.display());
    }

    info!("Ledger TCK {}", ledger_tck::VERSION);
    info!("  SUT:          {}", config.json_rpc_server_url);
    info!("  Consensus:    {}", config.consensus_url());
    info!("  Mirror:       {}", config.mirror_node_rest_url);
    info!("  Scenarios:    {}", runner.spec_count());
    info!("  Concurrency:  {}", concurrency);

    let ctx = SuiteContext::connect(config)
        .await
        .context("setting up the operator session")?;
    let report = runner.run_concurrent(&ctx, concurrency.max(1)).await;
    if let Err(e) = ctx.reset().await {
        warn!("reset after run failed: {}", e);
    }

    report.print_summary();
    if let Some(path) = junit {
        std::fs::write(&path, report.to_junit_xml())
            .with_context(|| format!("writing {}", path.display()))?;
        info!("JUnit report written to {}", path.display());
    }
    if let Some(path) = json {
        std::fs::write(&path, report.to_json())
            .with_context(|| format!("writing {}", path.display()))?;
        info!("JSON report written to {}", path.display());
    }
    Ok(report.all_passed())
}

fn check(dir: PathBuf) -> Result<bool> {
    let runner = ConformanceRunner::load_from_dir(&dir)
        .with_context(|| format!("loading scenarios from {}", dir.display()))?;
    info!("{} scenarios valid", runner.spec_count());
    Ok(true)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let log_level = if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .format_timestamp_millis()
        .init();

    let result = match args.command {
        Command::Run {
            dir,
            filter,
            concurrency,
            junit,
            json,
        } => run(dir, filter, concurrency, junit, json).await,
        Command::Check { dir } => check(dir),
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(2)
        }
    }
}
