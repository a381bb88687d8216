use rmpc_app::{DemoModel, RunConfig, RunOptions, RunRequest, run_service};
use rmpc_results::RunOutcome;
use rmpc_solver::SolveStatus;
use std::path::PathBuf;

fn temp_output(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("rmpc_app_{tag}_{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

#[test]
fn integrator_run_is_persisted_and_replayed() {
    let mut config = RunConfig::demo(DemoModel::Integrator);
    config.n_steps = 3;
    config.record_snapshots = true;
    config.output_dir = temp_output("integrator");

    let mut streamed = 0;
    let mut count = |_: &rmpc_results::LogEntry| streamed += 1;
    let request = RunRequest {
        config: &config,
        options: RunOptions::default(),
    };
    let response = run_service::ensure_run_with_progress(&request, Some(&mut count)).unwrap();
    assert_eq!(streamed, 3);
    assert!(!response.loaded_from_cache);
    assert_eq!(response.manifest.outcome, RunOutcome::Completed);
    assert_eq!(response.manifest.completed_steps, 3);
    assert_eq!(response.manifest.model, "integrator");

    let entries = response.log.entries();
    for (k, e) in entries.iter().enumerate() {
        assert_eq!(e.status, SolveStatus::Solved);
        assert_eq!(e.input, vec![1.0]);
        assert!((e.state[0] - k as f64).abs() < 1e-8);
        let snap = e.snapshot.as_ref().unwrap();
        assert_eq!(snap.first_input, vec![1.0]);
    }

    let (manifest, log) = run_service::load_run(&config.output_dir, &response.run_id).unwrap();
    assert_eq!(manifest, response.manifest);
    assert_eq!(log, response.log);

    let cached = run_service::ensure_run(&request).unwrap();
    assert!(cached.loaded_from_cache);
    assert_eq!(cached.run_id, response.run_id);
    assert_eq!(cached.log, response.log);

    let runs = run_service::list_runs(&config.output_dir).unwrap();
    assert_eq!(runs.len(), 1);

    std::fs::remove_dir_all(&config.output_dir).ok();
}

#[test]
fn mass_spring_damper_run_solves_every_step_within_input_bounds() {
    let mut config = RunConfig::demo(DemoModel::MassSpringDamper);
    config.controller.n_horizon = 3;
    config.n_steps = 2;
    config.output_dir = temp_output("msd");

    let response = run_service::ensure_run(&RunRequest {
        config: &config,
        options: RunOptions {
            use_cache: false,
            ..RunOptions::default()
        },
    })
    .unwrap();

    assert_eq!(response.manifest.outcome, RunOutcome::Completed);
    assert_eq!(response.manifest.completed_steps, 2);
    assert_eq!(response.log.len(), 2);
    for e in response.log.entries() {
        assert_eq!(e.status, SolveStatus::Solved, "step {}", e.step);
        assert!(!e.fallback, "step {}", e.step);
        assert!(e.state.iter().all(|v| v.is_finite()), "step {}", e.step);
        assert!(e.input[0] >= -2.0 && e.input[0] <= 2.0);
    }

    std::fs::remove_dir_all(&config.output_dir).ok();
}

#[test]
fn integrator_run_keeps_solving_after_warm_starts() {
    let mut config = RunConfig::demo(DemoModel::Integrator);
    config.n_steps = 4;
    config.record_snapshots = true;
    config.output_dir = temp_output("integrator_warm");

    let response = run_service::ensure_run(&RunRequest {
        config: &config,
        options: RunOptions {
            use_cache: false,
            ..RunOptions::default()
        },
    })
    .unwrap();

    assert_eq!(response.manifest.outcome, RunOutcome::Completed);
    for e in response.log.entries() {
        assert_eq!(e.status, SolveStatus::Solved, "step {}", e.step);
        assert!(!e.fallback);
        let snap = e.snapshot.as_ref().unwrap();
        assert!(
            snap.scenarios
                .iter()
                .flat_map(|s| s.states.iter().flatten())
                .all(|v| v.is_finite()),
            "step {}",
            e.step
        );
    }

    std::fs::remove_dir_all(&config.output_dir).ok();
}

#[test]
fn invalid_config_is_rejected_before_running() {
    let mut config = RunConfig::demo(DemoModel::MassSpringDamper);
    config.uncertainty.clear();
    config.output_dir = temp_output("invalid");
    let err = run_service::ensure_run(&RunRequest {
        config: &config,
        options: RunOptions::default(),
    })
    .unwrap_err();
    assert!(matches!(err, rmpc_app::AppError::Validation(_)));
    assert!(!config.output_dir.exists());
}

#[test]
fn missing_run_is_reported() {
    let dir = temp_output("missing");
    let err = run_service::load_run(&dir, "nope").unwrap_err();
    assert!(matches!(err, rmpc_app::AppError::RunNotFound(id) if id == "nope"));
    std::fs::remove_dir_all(&dir).ok();
}
