//! TrapTune operator CLI: runs a trap optimization against an external
//! solver process and inspects the trial logs and sweep exports it leaves
//! behind.
//!
//! Usage:
//!   traptune optimize --config trap.json --solver ./solver-bridge
//!   traptune summary --log optimization_log.csv
//!   traptune sweep --dir results/
//!
//! Set `RUST_LOG=info` (or `debug`) to follow individual trials.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::info;
use tt_optimizer::{
    load_sweep_dir, read_trial_log, OptimizationConfig, OptimizationRun, Optimizer,
    ProcessBackend, RunState, TrialLogger, OUTCOME_COLUMN,
};

#[derive(Parser, Debug)]
#[command(name = "traptune")]
#[command(about = "Derivative-free parameter search for RF ion-trap designs")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a Nelder-Mead search, one solver evaluation per trial
    Optimize {
        /// JSON run configuration
        #[arg(long)]
        config: PathBuf,
        /// Solver bridge executable speaking the JSON-lines oracle protocol
        #[arg(long)]
        solver: String,
        /// Extra argument for the solver (repeatable)
        #[arg(long = "solver-arg", allow_hyphen_values = true)]
        solver_args: Vec<String>,
        /// Working directory for the solver process
        #[arg(long)]
        solver_dir: Option<PathBuf>,
        /// Trial log written row by row during the run
        #[arg(long, default_value = "optimization_log.csv")]
        log: PathBuf,
        /// Override the configured iteration cap
        #[arg(long)]
        max_iterations: Option<usize>,
        /// Write the full run (config, trials, best) as JSON
        #[arg(long)]
        summary_json: Option<PathBuf>,
    },
    /// Summarize a trial log: best row and per-column statistics
    Summary {
        #[arg(long, default_value = "optimization_log.csv")]
        log: PathBuf,
    },
    /// List `<parameter>_<value>.txt` sweep exports in a directory
    Sweep {
        #[arg(long)]
        dir: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    match Cli::parse().command {
        Commands::Optimize {
            config,
            solver,
            solver_args,
            solver_dir,
            log,
            max_iterations,
            summary_json,
        } => {
            let mut run_config = OptimizationConfig::from_json_file(&config)
                .with_context(|| format!("loading run configuration {}", config.display()))?;
            if let Some(n) = max_iterations {
                run_config = run_config.with_max_iterations(n);
            }
            let optimizer = Optimizer::new(run_config).context("invalid run configuration")?;

            let mut backend = ProcessBackend::new(solver).with_args(solver_args);
            if let Some(dir) = solver_dir {
                backend = backend.with_working_dir(dir);
            }
            let mut logger = TrialLogger::create(&log, optimizer.config().parameters.names())
                .with_context(|| format!("creating trial log {}", log.display()))?;

            let run = optimizer
                .run(&mut backend, Some(&mut logger))
                .context("optimization run failed")?;
            print_run(&run, &log);

            if let Some(path) = summary_json {
                write_summary(&run, &path)?;
                println!("Run summary written to {}", path.display());
            }
            if run.state == RunState::Aborted {
                bail!(
                    "run aborted: {}",
                    run.error.as_deref().unwrap_or("no reason recorded")
                );
            }
        }
        Commands::Summary { log } => summarize_log(&log)?,
        Commands::Sweep { dir } => list_sweeps(&dir)?,
    }
    Ok(())
}

fn print_run(run: &OptimizationRun, log: &Path) {
    println!();
    println!("=== OPTIMIZATION {} ===", run.state.to_string().to_uppercase());
    println!("  Run:        {}", run.id);
    println!("  Trials:     {}", run.trial_count());
    println!("  Log:        {}", log.display());
    if run.log_failures > 0 {
        println!("  Unlogged:   {} trials", run.log_failures);
    }

    let Some(best) = run.best_trial() else {
        println!("  No trials were evaluated");
        return;
    };
    println!();
    println!("Best configuration (trial #{}):", best.number);
    for (name, value) in best.parameters.iter() {
        println!("  {name:<16} {value}");
    }
    if let Some(m) = best.outcome.metrics() {
        println!("  depth_eV         {}", m.depth_ev);
        println!("  offset_mm        {}", m.offset_mm);
        println!("  P_est_mW         {}", m.power_mw);
    }
    println!("  score            {}", best.score);
    if best.is_penalty() {
        println!("  (every trial was penalized; no confining geometry found)");
    }
}

fn write_summary(run: &OptimizationRun, path: &Path) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("creating summary {}", path.display()))?;
    serde_json::to_writer_pretty(file, run)
        .with_context(|| format!("writing summary {}", path.display()))?;
    info!("Run summary saved to {}", path.display());
    Ok(())
}

fn summarize_log(path: &Path) -> Result<()> {
    let table =
        read_trial_log(path).with_context(|| format!("reading trial log {}", path.display()))?;
    println!("{}: {} trials", path.display(), table.rows.len());

    if let Some(row) = table.best_row()? {
        println!();
        println!("Best row (trial #{}):", row + 1);
        for (name, cell) in table.headers.iter().zip(&table.rows[row]) {
            if name == OUTCOME_COLUMN {
                continue;
            }
            match cell {
                Some(v) => println!("  {name:<16} {v}"),
                None => println!("  {name:<16} -"),
            }
        }
    }

    let failed = table
        .outcomes
        .iter()
        .filter(|o| o.as_deref().is_some_and(|o| o != "ok"))
        .count();
    if failed > 0 {
        println!("  ({failed} penalized trials)");
    }

    println!();
    println!(
        "{:<16} {:>6} {:>14} {:>14} {:>14}",
        "column", "count", "min", "max", "mean"
    );
    for stats in table.column_stats() {
        println!(
            "{:<16} {:>6} {:>14.6} {:>14.6} {:>14.6}",
            stats.name, stats.count, stats.min, stats.max, stats.mean
        );
    }
    Ok(())
}

fn list_sweeps(dir: &Path) -> Result<()> {
    let files =
        load_sweep_dir(dir).with_context(|| format!("loading sweep files from {}", dir.display()))?;
    if files.is_empty() {
        println!("No <parameter>_<value>.txt files in {}", dir.display());
        return Ok(());
    }
    println!(
        "{:<16} {:>14} {:>8} {:>8}  file",
        "parameter", "value", "rows", "columns"
    );
    for file in &files {
        println!(
            "{:<16} {:>14} {:>8} {:>8}  {}",
            file.parameter,
            file.value,
            file.rows.len(),
            file.columns(),
            file.path.display()
        );
    }
    Ok(())
}
