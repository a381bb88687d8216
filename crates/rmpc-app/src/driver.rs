//! Closed-loop driver: controller, plant simulator and estimator in lockstep.
//!
//! ```text
//! u_k     = controller.make_step(x_k)
//! y_k     = simulator.make_step(u_k, p_fun)
//! x_{k+1} = estimator.make_step(y_k)
//! ```
//!
//! A step is logged only after all three calls succeed. The first failure
//! halts the loop with the step index; nothing after it runs.

use crate::error::{AppError, AppResult};
use rmpc_control::{ControlError, MpcController, Phase};
use rmpc_core::Real;
use rmpc_results::{LogEntry, TrajectoryLog};
use rmpc_sim::{Estimator, SimError, Simulator};
use rmpc_solver::SolveStatus;
use tracing::{debug, info, warn};

/// Why the loop stopped.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HaltCause {
    #[error("solver reported {status} and no action is available")]
    NoAction { status: SolveStatus },

    #[error("controller failed: {0}")]
    Controller(ControlError),

    #[error("simulator failed: {0}")]
    Simulator(SimError),

    #[error("estimator failed: {0}")]
    Estimator(SimError),

    #[error("trajectory log rejected entry: {0}")]
    Log(String),
}

/// Failure surfaced by the loop with the step it happened at. The log holds
/// exactly `step` entries when this is returned.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("closed loop halted at step {step}: {cause}")]
pub struct LoopHalt {
    pub step: usize,
    pub cause: HaltCause,
}

/// Parameter realization function the plant is simulated under.
pub type ParamFn = Box<dyn Fn(Real) -> Vec<Real>>;

pub struct ClosedLoopDriver {
    controller: MpcController,
    simulator: Simulator,
    estimator: Box<dyn Estimator>,
    p_fun: ParamFn,
    estimate: Vec<Real>,
    log: TrajectoryLog,
    record_snapshots: bool,
    halted: Option<LoopHalt>,
}

impl ClosedLoopDriver {
    /// `controller` must already be set up. The simulator is reset to `x0`
    /// at time zero and the controller's first state is `x0`.
    pub fn new(
        controller: MpcController,
        mut simulator: Simulator,
        estimator: Box<dyn Estimator>,
        p_fun: ParamFn,
        x0: Vec<Real>,
    ) -> AppResult<Self> {
        if controller.phase() != Phase::Ready {
            return Err(AppError::InvalidInput(format!(
                "controller must be freshly set up before the loop starts (phase {:?})",
                controller.phase()
            )));
        }
        simulator.set_initial_state(x0.clone())?;
        Ok(Self {
            controller,
            simulator,
            estimator,
            p_fun,
            estimate: x0,
            log: TrajectoryLog::new(),
            record_snapshots: false,
            halted: None,
        })
    }

    /// Keep each step's full scenario solution in the log.
    pub fn with_snapshots(mut self, record: bool) -> Self {
        self.record_snapshots = record;
        self
    }

    pub fn log(&self) -> &TrajectoryLog {
        &self.log
    }

    pub fn into_log(self) -> TrajectoryLog {
        self.log
    }

    pub fn controller(&self) -> &MpcController {
        &self.controller
    }

    pub fn simulator(&self) -> &Simulator {
        &self.simulator
    }

    /// State the controller sees at the next step.
    pub fn estimate(&self) -> &[Real] {
        &self.estimate
    }

    pub fn halted(&self) -> Option<&LoopHalt> {
        self.halted.as_ref()
    }

    /// Run one closed-loop step. After a halt every call returns the same
    /// halt without touching any component.
    pub fn step(&mut self) -> Result<(), LoopHalt> {
        if let Some(halt) = &self.halted {
            return Err(halt.clone());
        }
        let step = self.log.len();
        let result = self.advance(step).and_then(|(entry, next)| {
            self.log
                .append(entry)
                .map_err(|e| HaltCause::Log(e.to_string()))?;
            Ok(next)
        });
        match result {
            Ok(next) => {
                self.estimate = next;
                Ok(())
            }
            Err(cause) => {
                warn!(step, %cause, "closed loop halted");
                let halt = LoopHalt { step, cause };
                self.halted = Some(halt.clone());
                Err(halt)
            }
        }
    }

    /// Run `n_steps` steps, calling `on_step` after each logged one.
    pub fn run(
        &mut self,
        n_steps: usize,
        mut on_step: impl FnMut(&LogEntry),
    ) -> Result<(), LoopHalt> {
        for _ in 0..n_steps {
            self.step()?;
            if let Some(entry) = self.log.last() {
                on_step(entry);
            }
        }
        info!(steps = self.log.len(), "closed loop finished");
        Ok(())
    }

    fn advance(&mut self, step: usize) -> Result<(LogEntry, Vec<Real>), HaltCause> {
        let time = self.simulator.time();
        let outcome = self
            .controller
            .make_step(&self.estimate)
            .map_err(HaltCause::Controller)?;
        let Some(input) = outcome.action.clone() else {
            return Err(HaltCause::NoAction {
                status: outcome.status,
            });
        };

        let y = self
            .simulator
            .make_step(&input, self.p_fun.as_ref())
            .map_err(HaltCause::Simulator)?;
        let next = self
            .estimator
            .make_step(&y)
            .map_err(HaltCause::Estimator)?;

        debug!(step, time, ?input, fallback = outcome.fallback, "closed-loop step");
        let entry = LogEntry {
            step,
            time,
            state: self.estimate.clone(),
            input,
            status: outcome.status,
            fallback: outcome.fallback,
            snapshot: self.record_snapshots.then_some(outcome.solution),
        };
        Ok((entry, next))
    }
}
