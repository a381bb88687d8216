use nalgebra::DVector;
use rmpc_app::{ClosedLoopDriver, HaltCause, LoopHalt};
use rmpc_control::{ControlError, InfeasibilityPolicy, MpcController, MpcSettings};
use rmpc_core::{Bounds, Real};
use rmpc_model::{Expr, Model};
use rmpc_sim::{Estimator, SimError, SimResult, Simulator, SimulatorSettings, StateFeedback};
use rmpc_solver::{Nlp, NlpSolver, SolveStatus, SolverOutput, SolverResult};
use std::sync::Arc;
use std::time::Duration;

/// Hands back the initial guess as `Solved` for the first `solved` calls,
/// then reports `Infeasible`.
struct FailsAfter {
    solved: usize,
    calls: usize,
}

impl NlpSolver for FailsAfter {
    fn solve(
        &mut self,
        nlp: &dyn Nlp,
        x0: &DVector<f64>,
        _: Option<&DVector<f64>>,
    ) -> SolverResult<SolverOutput> {
        let status = if self.calls < self.solved {
            SolveStatus::Solved
        } else {
            SolveStatus::Infeasible
        };
        self.calls += 1;
        Ok(SolverOutput {
            x: x0.clone(),
            multipliers: None,
            status,
            objective: nlp.objective(x0)?,
            constraint_violation: 0.0,
            iterations: 1,
            elapsed: Duration::ZERO,
        })
    }
}

fn integrator() -> Arc<Model> {
    let mut m = Model::continuous();
    let x = m.add_state("x").unwrap();
    let u = m.add_input_bounded("u", Bounds::new(0.0, 1.0)).unwrap();
    m.set_dynamics(x, Expr::new(move |pt| pt.u(u))).unwrap();
    m.finalize().unwrap();
    Arc::new(m)
}

fn controller(model: Arc<Model>, solver: Box<dyn NlpSolver>, policy: InfeasibilityPolicy) -> MpcController {
    let x = model.state_handle("x").unwrap();
    let settings = MpcSettings {
        n_horizon: 3,
        n_robust: 0,
        infeasibility_policy: policy,
        ..MpcSettings::default()
    };
    let mut c = MpcController::new(model, settings, solver);
    c.set_objective(None, Some(Expr::new(move |pt| -pt.x(x))))
        .unwrap();
    c.setup().unwrap();
    c
}

fn driver(model: Arc<Model>, solver: Box<dyn NlpSolver>, policy: InfeasibilityPolicy) -> ClosedLoopDriver {
    let sim = Simulator::new(model.clone(), SimulatorSettings::default()).unwrap();
    ClosedLoopDriver::new(
        controller(model, solver, policy),
        sim,
        Box::new(StateFeedback::new(1)),
        Box::new(|_t: Real| Vec::new()),
        vec![0.0],
    )
    .unwrap()
}

#[test]
fn infeasible_step_halts_with_its_index() {
    let k = 3;
    let model = integrator();
    let mut d = driver(
        model,
        Box::new(FailsAfter { solved: k, calls: 0 }),
        InfeasibilityPolicy::Surface,
    );

    let mut seen = Vec::new();
    let halt = d.run(10, |e| seen.push(e.step)).unwrap_err();
    assert_eq!(
        halt,
        LoopHalt {
            step: k,
            cause: HaltCause::NoAction {
                status: SolveStatus::Infeasible
            },
        }
    );
    assert_eq!(d.log().len(), k);
    assert_eq!(seen, vec![0, 1, 2]);
    assert!(d.log().entries().iter().all(|e| e.status == SolveStatus::Solved));
    assert_eq!(d.halted(), Some(&halt));

    // Halted loops stay halted.
    assert_eq!(d.step(), Err(halt));
    assert_eq!(d.log().len(), k);
}

#[test]
fn abort_policy_surfaces_controller_error() {
    let model = integrator();
    let mut d = driver(
        model,
        Box::new(FailsAfter { solved: 1, calls: 0 }),
        InfeasibilityPolicy::Abort,
    );
    let halt = d.run(5, |_| {}).unwrap_err();
    assert_eq!(halt.step, 1);
    assert_eq!(
        halt.cause,
        HaltCause::Controller(ControlError::Infeasible {
            step: 1,
            status: SolveStatus::Infeasible
        })
    );
    assert_eq!(d.log().len(), 1);
}

#[test]
fn hold_last_input_keeps_running_with_flagged_fallback() {
    let model = integrator();
    let mut d = driver(
        model,
        Box::new(FailsAfter { solved: 2, calls: 0 }),
        InfeasibilityPolicy::HoldLastInput,
    );
    d.run(4, |_| {}).unwrap();
    let entries = d.log().entries();
    assert_eq!(entries.len(), 4);
    assert!(!entries[1].fallback);
    assert!(entries[2].fallback && entries[3].fallback);
    assert_eq!(entries[2].status, SolveStatus::Infeasible);
    assert_eq!(entries[2].input, entries[1].input);
}

#[test]
fn log_records_state_seen_and_sampling_times() {
    let model = integrator();
    let mut d = driver(
        model,
        Box::new(FailsAfter {
            solved: usize::MAX,
            calls: 0,
        }),
        InfeasibilityPolicy::Surface,
    );
    d.run(3, |_| {}).unwrap();
    let times: Vec<Real> = d.log().entries().iter().map(|e| e.time).collect();
    assert_eq!(times, vec![0.0, 1.0, 2.0]);
    // The stub leaves the cold-start guess in place, which holds the
    // projected zero input, so the plant never moves.
    for e in d.log().entries() {
        assert_eq!(e.state, vec![0.0]);
        assert_eq!(e.input, vec![0.0]);
        assert!(e.snapshot.is_none());
    }
}

#[test]
fn simulator_failure_halts_before_logging() {
    // dx/dt = x^2 from x = 1 blows up inside the first period
    let mut m = Model::continuous();
    let x = m.add_state("x").unwrap();
    let _u = m.add_input_bounded("u", Bounds::new(0.0, 1.0)).unwrap();
    m.set_dynamics(x, Expr::new(move |pt| pt.x(x).powi(2))).unwrap();
    m.finalize().unwrap();
    let model = Arc::new(m);

    let settings = SimulatorSettings {
        t_step: 2.0,
        max_steps: 2_000,
        ..SimulatorSettings::default()
    };
    let sim = Simulator::new(model.clone(), settings).unwrap();
    let mut d = ClosedLoopDriver::new(
        controller(
            model,
            Box::new(FailsAfter {
                solved: usize::MAX,
                calls: 0,
            }),
            InfeasibilityPolicy::Surface,
        ),
        sim,
        Box::new(StateFeedback::new(1)),
        Box::new(|_t: Real| Vec::new()),
        vec![1.0],
    )
    .unwrap();

    let halt = d.step().unwrap_err();
    assert_eq!(halt.step, 0);
    assert!(matches!(
        halt.cause,
        HaltCause::Simulator(SimError::Integration { .. })
    ));
    assert!(d.log().is_empty());
}

/// Fails on its `n`-th call.
struct FlakyEstimator {
    n: usize,
    calls: usize,
}

impl Estimator for FlakyEstimator {
    fn make_step(&mut self, y: &[Real]) -> SimResult<Vec<Real>> {
        self.calls += 1;
        if self.calls == self.n {
            return Err(SimError::InvalidArg {
                what: "sensor dropout".to_string(),
            });
        }
        Ok(y.to_vec())
    }
}

#[test]
fn estimator_failure_drops_the_step() {
    let model = integrator();
    let sim = Simulator::new(model.clone(), SimulatorSettings::default()).unwrap();
    let mut d = ClosedLoopDriver::new(
        controller(
            model,
            Box::new(FailsAfter {
                solved: usize::MAX,
                calls: 0,
            }),
            InfeasibilityPolicy::Surface,
        ),
        sim,
        Box::new(FlakyEstimator { n: 2, calls: 0 }),
        Box::new(|_t: Real| Vec::new()),
        vec![0.0],
    )
    .unwrap();

    let halt = d.run(5, |_| {}).unwrap_err();
    assert_eq!(halt.step, 1);
    assert!(matches!(halt.cause, HaltCause::Estimator(_)));
    assert_eq!(d.log().len(), 1);
}

#[test]
fn driver_requires_a_set_up_controller() {
    let model = integrator();
    let c = MpcController::new(
        model.clone(),
        MpcSettings::default(),
        Box::new(FailsAfter { solved: 0, calls: 0 }),
    );
    let sim = Simulator::new(model, SimulatorSettings::default()).unwrap();
    assert!(
        ClosedLoopDriver::new(
            c,
            sim,
            Box::new(StateFeedback::new(1)),
            Box::new(|_t: Real| Vec::new()),
            vec![0.0],
        )
        .is_err()
    );
}
