use clap::{Parser, Subcommand};
use rmpc_app::{AppResult, RunOptions, RunRequest, load_yaml, run_service};
use rmpc_results::{LogEntry, RunManifest, RunOutcome, TrajectoryLog};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rmpc")]
#[command(about = "Robust multi-stage MPC - closed-loop runs on demo plants", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a run config file
    Validate {
        /// Path to the run YAML file
        config_path: PathBuf,
    },
    /// Run the closed loop described by a run config
    Run {
        /// Path to the run YAML file
        config_path: PathBuf,
        /// Skip cache and force re-run
        #[arg(long)]
        no_cache: bool,
    },
    /// List stored runs in an output directory
    Runs {
        /// Output directory of the runs
        output_dir: PathBuf,
    },
    /// Replay a stored run without re-solving
    Show {
        /// Output directory of the run
        output_dir: PathBuf,
        /// Run ID to display
        run_id: String,
    },
}

fn main() -> AppResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { config_path } => cmd_validate(&config_path),
        Commands::Run {
            config_path,
            no_cache,
        } => cmd_run(&config_path, !no_cache),
        Commands::Runs { output_dir } => cmd_runs(&output_dir),
        Commands::Show { output_dir, run_id } => cmd_show(&output_dir, &run_id),
    }
}

fn cmd_validate(config_path: &Path) -> AppResult<()> {
    println!("Validating run config: {}", config_path.display());
    let config = load_yaml(config_path)?;
    println!("✓ Run config is valid");
    println!("  Model: {}", config.model.label());
    println!(
        "  Horizon: {} (robust {}), t_step = {}",
        config.controller.n_horizon, config.controller.n_robust, config.controller.t_step
    );
    let scenarios: usize = if config.controller.n_robust == 0 {
        1
    } else {
        config
            .uncertainty
            .iter()
            .map(|u| u.values.len())
            .product::<usize>()
            .saturating_pow(config.controller.n_robust as u32)
    };
    println!("  Scenarios: {scenarios}");
    Ok(())
}

fn cmd_run(config_path: &Path, use_cache: bool) -> AppResult<()> {
    let config = load_yaml(config_path)?;
    info!(
        config = %config_path.display(),
        model = config.model.label(),
        use_cache,
        "starting closed-loop run"
    );
    println!(
        "Running closed loop '{}' on {} for {} steps",
        config.name,
        config.model.label(),
        config.n_steps
    );

    let request = RunRequest {
        config: &config,
        options: RunOptions {
            use_cache,
            ..RunOptions::default()
        },
    };

    print_table_header(config.model.state_names());
    let response = run_service::ensure_run_with_progress(
        &request,
        Some(&mut |entry: &LogEntry| print_table_row(entry)),
    )?;

    if response.loaded_from_cache {
        for entry in response.log.entries() {
            print_table_row(entry);
        }
        println!("✓ Loaded from cache: {}", response.run_id);
    } else {
        println!("✓ Run stored: {}", response.run_id);
    }
    if let RunOutcome::Halted { step, reason } = &response.manifest.outcome {
        warn!(run_id = %response.run_id, step, reason = %reason, "closed loop halted");
    }
    print_outcome(&response.manifest);
    println!("  Elapsed: {:.3} s", response.elapsed_s);
    Ok(())
}

fn cmd_runs(output_dir: &Path) -> AppResult<()> {
    let runs = run_service::list_runs(output_dir)?;
    if runs.is_empty() {
        println!("No runs found in {}", output_dir.display());
    } else {
        println!("Runs in {}:", output_dir.display());
        for run in runs {
            println!(
                "  {} - {} ({}/{} steps, {})",
                run.run_id,
                run.model,
                run.completed_steps,
                run.requested_steps,
                run.timestamp
            );
        }
    }
    Ok(())
}

fn cmd_show(output_dir: &Path, run_id: &str) -> AppResult<()> {
    let (manifest, log) = run_service::load_run(output_dir, run_id)?;
    println!("Run: {}", manifest.run_id);
    println!("  Model: {}", manifest.model);
    println!("  Timestamp: {}", manifest.timestamp);
    println!("  Solver: {}", manifest.solver_version);
    print_log(&log);
    print_outcome(&manifest);
    Ok(())
}

fn print_log(log: &TrajectoryLog) {
    let n_x = log.entries().first().map_or(0, |e| e.state.len());
    let names: Vec<String> = (0..n_x).map(|i| format!("x{i}")).collect();
    let names: Vec<&str> = names.iter().map(String::as_str).collect();
    print_table_header(&names);
    for entry in log.entries() {
        print_table_row(entry);
    }
}

fn print_table_header(state_names: &[&str]) {
    let mut line = format!("{:>5} {:>10}", "step", "time");
    for name in state_names {
        line.push_str(&format!(" {:>12}", name));
    }
    line.push_str(&format!(" {:>12} {:>16}", "u[0]", "status"));
    println!("{line}");
}

fn print_table_row(entry: &LogEntry) {
    let mut line = format!("{:>5} {:>10.4}", entry.step, entry.time);
    for v in &entry.state {
        line.push_str(&format!(" {:>12.6}", v));
    }
    let u0 = entry.input.first().copied().unwrap_or(f64::NAN);
    let status = if entry.fallback {
        format!("{} (held)", entry.status)
    } else {
        entry.status.to_string()
    };
    line.push_str(&format!(" {:>12.6} {:>16}", u0, status));
    println!("{line}");
}

fn print_outcome(manifest: &RunManifest) {
    match &manifest.outcome {
        RunOutcome::Completed => println!(
            "  Outcome: completed {}/{} steps",
            manifest.completed_steps, manifest.requested_steps
        ),
        RunOutcome::Halted { step, reason } => {
            println!("  Outcome: halted at step {step}: {reason}")
        }
    }
}
