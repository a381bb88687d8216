//! Run execution and caching service.

use std::path::Path;
use std::time::Instant;

use rmpc_control::MpcController;
use rmpc_results::{LogEntry, RunManifest, RunOutcome, RunStore, TrajectoryLog};
use rmpc_sim::{Simulator, StateFeedback};
use rmpc_solver::AugLagSolver;
use tracing::info;

use crate::config::{RunConfig, validate_config};
use crate::demos::DemoProblem;
use crate::driver::ClosedLoopDriver;
use crate::error::{AppError, AppResult};
use crate::plant::PlantSchedule;

/// Version tag mixed into run ids.
pub const SOLVER_VERSION: &str = concat!("rmpc-", env!("CARGO_PKG_VERSION"));

/// Options for running closed loops.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub use_cache: bool,
    pub solver_version: String,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            use_cache: true,
            solver_version: SOLVER_VERSION.to_string(),
        }
    }
}

/// Request to execute a run.
pub struct RunRequest<'a> {
    pub config: &'a RunConfig,
    pub options: RunOptions,
}

/// Response from a run execution.
#[derive(Debug, Clone)]
pub struct RunResponse {
    pub run_id: String,
    pub manifest: RunManifest,
    pub log: TrajectoryLog,
    pub loaded_from_cache: bool,
    pub elapsed_s: f64,
}

/// Execute or load a run based on request.
pub fn ensure_run(request: &RunRequest) -> AppResult<RunResponse> {
    ensure_run_with_progress(request, None)
}

/// Execute or load a run, reporting every logged step to `on_step`.
///
/// A loop halt is not an error: the partial log is stored and the manifest
/// records the step and cause.
pub fn ensure_run_with_progress(
    request: &RunRequest,
    mut on_step: Option<&mut dyn FnMut(&LogEntry)>,
) -> AppResult<RunResponse> {
    let started = Instant::now();
    let config = request.config;
    validate_config(config)?;

    let run_id = rmpc_results::compute_run_id(config, &request.options.solver_version)?;
    let store = RunStore::new(config.output_dir.clone())?;

    if request.options.use_cache && store.has_run(&run_id) {
        let manifest = store.load_manifest(&run_id)?;
        let log = store.load_log(&run_id)?;
        info!(run_id = %run_id, "loaded cached run");
        return Ok(RunResponse {
            run_id,
            manifest,
            log,
            loaded_from_cache: true,
            elapsed_s: started.elapsed().as_secs_f64(),
        });
    }

    let mut driver = build_driver(config)?;
    let result = driver.run(config.n_steps, |entry| {
        if let Some(cb) = on_step.as_deref_mut() {
            cb(entry);
        }
    });
    let outcome = match result {
        Ok(()) => RunOutcome::Completed,
        Err(halt) => RunOutcome::Halted {
            step: halt.step,
            reason: halt.cause.to_string(),
        },
    };
    let log = driver.into_log();

    let manifest = RunManifest {
        run_id: run_id.clone(),
        model: config.model.label().to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        requested_steps: config.n_steps,
        completed_steps: log.len(),
        outcome,
        solver_version: request.options.solver_version.clone(),
    };
    store.save_run(&manifest, &log)?;
    info!(
        run_id = %run_id,
        completed = manifest.completed_steps,
        requested = manifest.requested_steps,
        "run saved"
    );

    Ok(RunResponse {
        run_id,
        manifest,
        log,
        loaded_from_cache: false,
        elapsed_s: started.elapsed().as_secs_f64(),
    })
}

/// Configure and set up the controller for `problem` from `config`.
pub fn build_controller(config: &RunConfig, problem: &DemoProblem) -> AppResult<MpcController> {
    let model = problem.model.clone();
    let mut controller = MpcController::new(
        model.clone(),
        config.controller.clone(),
        Box::new(AugLagSolver::new(config.solver.clone())),
    );

    for def in &config.uncertainty {
        let handle = model.parameter_handle(&def.name).ok_or_else(|| {
            AppError::InvalidInput(format!("model has no parameter '{}'", def.name))
        })?;
        match &def.probabilities {
            Some(probs) => {
                controller.set_param_weighted(handle, def.values.clone(), probs.clone())?
            }
            None => controller.set_param(handle, def.values.clone())?,
        }
    }
    controller.set_objective(problem.lterm.clone(), problem.mterm.clone())?;
    for (input, weight) in &problem.rterm {
        controller.set_rterm(*input, *weight)?;
    }
    for (name, expr, upper) in &problem.constraints {
        controller.set_nl_cons(name, expr.clone(), *upper)?;
    }
    controller.setup()?;
    Ok(controller)
}

/// Build the controller, plant simulator, full-state estimator and plant
/// schedule for a validated config.
pub fn build_driver(config: &RunConfig) -> AppResult<ClosedLoopDriver> {
    let problem = config.model.build()?;
    let controller = build_controller(config, &problem)?;
    let simulator = Simulator::new(problem.model.clone(), config.simulator.clone())?;
    let estimator = StateFeedback::new(problem.model.n_x());
    let schedule = PlantSchedule::from_config(config);

    let driver = ClosedLoopDriver::new(
        controller,
        simulator,
        Box::new(estimator),
        Box::new(move |t| schedule.values_at(t)),
        config.initial_state.clone(),
    )?;
    Ok(driver.with_snapshots(config.record_snapshots))
}

/// Load a persisted run without re-solving.
pub fn load_run(output_dir: &Path, run_id: &str) -> AppResult<(RunManifest, TrajectoryLog)> {
    let store = RunStore::new(output_dir.to_path_buf())?;
    let manifest = store.load_manifest(run_id)?;
    let log = store.load_log(run_id)?;
    Ok((manifest, log))
}

pub fn list_runs(output_dir: &Path) -> AppResult<Vec<RunManifest>> {
    let store = RunStore::new(output_dir.to_path_buf())?;
    Ok(store.list_runs()?)
}
