use proptest::prelude::*;
use rmpc_control::{ControlError, MpcController, MpcSettings, Phase, StepOutcome};
use rmpc_core::Bounds;
use rmpc_model::{Expr, Model};
use rmpc_solver::{AugLagSolver, SolveStatus};
use rmpc_tree::TreeError;
use std::sync::Arc;

fn single_integrator() -> Arc<Model> {
    let mut m = Model::continuous();
    let x = m.add_state("x").unwrap();
    let u = m.add_input_bounded("u", Bounds::new(0.0, 1.0)).unwrap();
    m.set_dynamics(x, Expr::new(move |pt| pt.u(u))).unwrap();
    m.finalize().unwrap();
    Arc::new(m)
}

/// Horizon 5, terminal cost `-x`, default solver.
fn integrator_controller() -> MpcController {
    let model = single_integrator();
    let x = model.state_handle("x").unwrap();
    let settings = MpcSettings {
        n_horizon: 5,
        n_robust: 0,
        t_step: 1.0,
        ..MpcSettings::default()
    };
    let mut mpc = MpcController::new(model, settings, Box::new(AugLagSolver::default()));
    mpc.set_objective(None, Some(Expr::new(move |pt| -pt.x(x))))
        .unwrap();
    mpc.setup().unwrap();
    mpc
}

fn assert_finite_prediction(out: &StepOutcome) {
    for scenario in &out.solution.scenarios {
        for v in scenario.states.iter().chain(&scenario.inputs).flatten() {
            assert!(v.is_finite(), "step {}: non-finite prediction", out.step);
        }
    }
}

#[test]
fn warm_started_steps_keep_a_finite_prediction() {
    let mut mpc = integrator_controller();
    // The same measured state twice: the second solve starts from the
    // shifted first solution.
    for _ in 0..2 {
        let out = mpc.make_step(&[0.0]).unwrap();
        assert_eq!(out.status, SolveStatus::Solved);
        assert_eq!(out.action, Some(vec![1.0]));
        assert_finite_prediction(&out);
        assert!((out.solution.scenarios[0].states[5][0] - 5.0).abs() < 1e-5);
    }
    assert_eq!(mpc.phase(), Phase::Feasible);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    #[test]
    fn closed_loop_steps_stay_solved_from_any_start(x0 in -5.0f64..5.0) {
        let mut mpc = integrator_controller();
        let mut state = x0;
        for _ in 0..3 {
            let out = mpc.make_step(&[state]).unwrap();
            prop_assert_eq!(out.status, SolveStatus::Solved);
            prop_assert!(!out.fallback);
            assert_finite_prediction(&out);
            let u = out.action.unwrap()[0];
            prop_assert!((0.0..=1.0).contains(&u));
            state += u;
        }
        prop_assert!((state - (x0 + 3.0)).abs() < 1e-5);
    }
}

#[test]
fn integrator_pushes_input_to_its_upper_bound() {
    let mut mpc = integrator_controller();

    let mut state = 0.0;
    for step in 0..4 {
        let out = mpc.make_step(&[state]).unwrap();
        assert_eq!(out.step, step);
        assert_eq!(out.status, SolveStatus::Solved);
        assert_eq!(out.action, Some(vec![1.0]));
        assert!(!out.fallback);

        let scenario = &out.solution.scenarios[0];
        assert_eq!(scenario.inputs.len(), 5);
        for u in &scenario.inputs {
            assert!((u[0] - 1.0).abs() < 1e-6);
        }
        assert!((scenario.states[5][0] - (state + 5.0)).abs() < 1e-5);
        state += 1.0;
    }
    assert_eq!(mpc.phase(), Phase::Feasible);
}

#[test]
fn empty_realization_set_fails_setup_without_tree() {
    let mut m = Model::continuous();
    let x = m.add_state("x").unwrap();
    let u = m.add_input("u").unwrap();
    let k = m.add_parameter("k").unwrap();
    m.set_dynamics(x, Expr::new(move |pt| pt.p(k) * pt.u(u)))
        .unwrap();
    m.finalize().unwrap();

    let mut mpc = MpcController::new(
        Arc::new(m),
        MpcSettings::default(),
        Box::new(AugLagSolver::default()),
    );
    mpc.set_param(k, Vec::new()).unwrap();
    mpc.set_objective(Some(Expr::new(move |pt| pt.x(x).powi(2))), None)
        .unwrap();

    assert_eq!(
        mpc.setup(),
        Err(ControlError::Tree(TreeError::EmptyUncertaintySet {
            parameter: "k".to_string()
        }))
    );
    assert!(mpc.structure().is_none());
    assert_eq!(mpc.phase(), Phase::Configured);
    assert!(matches!(
        mpc.make_step(&[0.0]),
        Err(ControlError::Configuration { .. })
    ));
}

#[test]
fn repeated_setup_keeps_nlp_layout() {
    let model = single_integrator();
    let x = model.state_handle("x").unwrap();
    let mut mpc = MpcController::new(
        model,
        MpcSettings {
            n_horizon: 4,
            n_robust: 0,
            ..MpcSettings::default()
        },
        Box::new(AugLagSolver::default()),
    );
    mpc.set_objective(Some(Expr::new(move |pt| pt.x(x).powi(2))), None)
        .unwrap();
    mpc.setup().unwrap();
    let first = mpc.structure().unwrap().signature();
    mpc.setup().unwrap();
    assert_eq!(mpc.structure().unwrap().signature(), first);
}
