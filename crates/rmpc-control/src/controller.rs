//! MPC controller state machine.
//!
//! ```text
//! Unconfigured -> Configured -> Ready -> Solving -> Feasible | Infeasible
//!                      ^                               |
//!                      +------ any configuration ------+
//! ```
//!
//! `Feasible` and `Infeasible` accept the next `make_step` like `Ready`.
//! Changing any configuration after `setup` drops the controller back to
//! `Configured` and discards the NLP structure and warm start.

use crate::error::{ControlError, ControlResult};
use crate::settings::{InfeasibilityPolicy, MpcSettings};
use nalgebra::DVector;
use rmpc_core::{Bounds, Real};
use rmpc_model::{Expr, InputHandle, Model, ParamHandle, StateHandle};
use rmpc_nlp::{NlConstraint, NlpSpec, NlpStructure, Objective, SolutionTrajectory};
use rmpc_solver::{NlpSolver, SolveStatus};
use rmpc_tree::{UncertainParameter, build_tree};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Controller lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Unconfigured,
    Configured,
    Ready,
    Solving,
    Feasible,
    Infeasible,
}

/// Result of one control step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    /// Zero-based index of this `make_step` call since `setup`.
    pub step: usize,
    pub status: SolveStatus,
    /// Input to apply. `None` when the solve failed and the policy supplies
    /// nothing.
    pub action: Option<Vec<Real>>,
    /// True when `action` is the held last feasible input, not a fresh one.
    pub fallback: bool,
    pub solution: SolutionTrajectory,
}

impl StepOutcome {
    pub fn is_feasible(&self) -> bool {
        self.status.is_solved()
    }
}

#[derive(Debug, Clone)]
struct Realizations {
    values: Vec<Real>,
    probabilities: Option<Vec<Real>>,
}

/// Robust multi-stage MPC controller.
pub struct MpcController {
    model: Arc<Model>,
    settings: MpcSettings,
    phase: Phase,
    realizations: Vec<Option<Realizations>>,
    lterm: Option<Expr>,
    mterm: Option<Expr>,
    rterm: Vec<Real>,
    state_bounds: Vec<Bounds>,
    input_bounds: Vec<Bounds>,
    constraints: Vec<NlConstraint>,
    initial_input: Option<Vec<Real>>,
    solver: Box<dyn NlpSolver>,
    structure: Option<NlpStructure>,
    /// Shifted primal solution of the last solved step; multipliers are
    /// never carried over.
    warm_start: Option<DVector<Real>>,
    u_prev: Vec<Real>,
    last_feasible: Option<Vec<Real>>,
    last_solution: Option<SolutionTrajectory>,
    step: usize,
}

impl MpcController {
    pub fn new(model: Arc<Model>, settings: MpcSettings, solver: Box<dyn NlpSolver>) -> Self {
        let n_p = model.n_p();
        let n_u = model.n_u();
        Self {
            state_bounds: model.state_bounds(),
            input_bounds: model.input_bounds(),
            model,
            settings,
            phase: Phase::Unconfigured,
            realizations: vec![None; n_p],
            lterm: None,
            mterm: None,
            rterm: vec![0.0; n_u],
            constraints: Vec::new(),
            initial_input: None,
            solver,
            structure: None,
            warm_start: None,
            u_prev: Vec::new(),
            last_feasible: None,
            last_solution: None,
            step: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn settings(&self) -> &MpcSettings {
        &self.settings
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    /// NLP structure built by the last successful `setup`.
    pub fn structure(&self) -> Option<&NlpStructure> {
        self.structure.as_ref()
    }

    pub fn last_solution(&self) -> Option<&SolutionTrajectory> {
        self.last_solution.as_ref()
    }

    pub fn last_feasible_input(&self) -> Option<&[Real]> {
        self.last_feasible.as_deref()
    }

    fn reconfigure(&mut self) {
        if self.structure.take().is_some() {
            debug!("configuration changed after setup; controller needs setup again");
        }
        self.warm_start = None;
        self.phase = Phase::Configured;
    }

    fn param_slot(&self, handle: ParamHandle) -> ControlResult<usize> {
        let idx = handle.index();
        if idx >= self.realizations.len() {
            return Err(ControlError::configuration(format!(
                "parameter handle {idx} does not belong to this model ({} parameters)",
                self.realizations.len()
            )));
        }
        Ok(idx)
    }

    fn state_slot(&self, handle: StateHandle) -> ControlResult<usize> {
        let idx = handle.index();
        if idx >= self.state_bounds.len() {
            return Err(ControlError::configuration(format!(
                "state handle {idx} does not belong to this model"
            )));
        }
        Ok(idx)
    }

    fn input_slot(&self, handle: InputHandle) -> ControlResult<usize> {
        let idx = handle.index();
        if idx >= self.input_bounds.len() {
            return Err(ControlError::configuration(format!(
                "input handle {idx} does not belong to this model"
            )));
        }
        Ok(idx)
    }

    /// Enumerated realizations of one uncertain parameter; the first value
    /// is nominal. Every realization is equally likely.
    pub fn set_param(&mut self, param: ParamHandle, values: Vec<Real>) -> ControlResult<()> {
        let idx = self.param_slot(param)?;
        self.realizations[idx] = Some(Realizations {
            values,
            probabilities: None,
        });
        self.reconfigure();
        Ok(())
    }

    /// Like [`set_param`](Self::set_param) with one probability per value.
    pub fn set_param_weighted(
        &mut self,
        param: ParamHandle,
        values: Vec<Real>,
        probabilities: Vec<Real>,
    ) -> ControlResult<()> {
        let idx = self.param_slot(param)?;
        self.realizations[idx] = Some(Realizations {
            values,
            probabilities: Some(probabilities),
        });
        self.reconfigure();
        Ok(())
    }

    /// Stage cost `lterm(x, u, p)` and terminal cost `mterm(x, u, p)`.
    pub fn set_objective(&mut self, lterm: Option<Expr>, mterm: Option<Expr>) -> ControlResult<()> {
        if lterm.is_none() && mterm.is_none() {
            return Err(ControlError::configuration(
                "objective needs a stage or a terminal term",
            ));
        }
        self.lterm = lterm;
        self.mterm = mterm;
        self.reconfigure();
        Ok(())
    }

    /// Weight of `(u_k - u_{k-1})^2` for one input.
    pub fn set_rterm(&mut self, input: InputHandle, weight: Real) -> ControlResult<()> {
        let idx = self.input_slot(input)?;
        if !weight.is_finite() || weight < 0.0 {
            return Err(ControlError::configuration(format!(
                "rterm weight must be finite and non-negative, got {weight}"
            )));
        }
        self.rterm[idx] = weight;
        self.reconfigure();
        Ok(())
    }

    pub fn set_state_bounds(&mut self, state: StateHandle, bounds: Bounds) -> ControlResult<()> {
        let idx = self.state_slot(state)?;
        self.state_bounds[idx] = bounds;
        self.reconfigure();
        Ok(())
    }

    pub fn set_input_bounds(&mut self, input: InputHandle, bounds: Bounds) -> ControlResult<()> {
        let idx = self.input_slot(input)?;
        self.input_bounds[idx] = bounds;
        self.reconfigure();
        Ok(())
    }

    /// Path constraint `expr(x, u, p) <= upper` at every predicted stage.
    pub fn set_nl_cons(&mut self, name: &str, expr: Expr, upper: Real) -> ControlResult<()> {
        if self.constraints.iter().any(|c| c.name == name) {
            return Err(ControlError::configuration(format!(
                "constraint '{name}' already defined"
            )));
        }
        self.constraints.push(NlConstraint::new(name, expr, upper));
        self.reconfigure();
        Ok(())
    }

    pub fn set_infeasibility_policy(&mut self, policy: InfeasibilityPolicy) {
        self.settings.infeasibility_policy = policy;
    }

    /// Input assumed applied before the first step (rate penalty reference
    /// and cold-start guess). Defaults to zero projected onto the bounds.
    pub fn set_initial_input(&mut self, u0: Vec<Real>) -> ControlResult<()> {
        if u0.len() != self.model.n_u() {
            return Err(ControlError::configuration(format!(
                "initial input has {} entries, model has {} inputs",
                u0.len(),
                self.model.n_u()
            )));
        }
        self.initial_input = Some(u0);
        self.reconfigure();
        Ok(())
    }

    /// Build the scenario tree and NLP structure.
    ///
    /// All checks run before anything is stored; on error the controller
    /// stays `Configured` with no tree or NLP.
    pub fn setup(&mut self) -> ControlResult<()> {
        self.structure = None;
        self.warm_start = None;
        if self.phase == Phase::Unconfigured {
            self.phase = Phase::Configured;
        }

        if !self.model.is_finalized() {
            return Err(ControlError::configuration("model is not finalized"));
        }
        if self.lterm.is_none() && self.mterm.is_none() {
            return Err(ControlError::configuration("objective is not set"));
        }
        let s = &self.settings;
        if !(s.t_step.is_finite() && s.t_step > 0.0) {
            return Err(ControlError::configuration(format!(
                "t_step must be positive, got {}",
                s.t_step
            )));
        }

        let mut params = Vec::with_capacity(self.realizations.len());
        for (name, slot) in self.model.parameter_names().iter().zip(&self.realizations) {
            let Some(r) = slot else {
                return Err(ControlError::configuration(format!(
                    "no realizations given for uncertain parameter '{name}'"
                )));
            };
            let mut p = UncertainParameter::new(name.clone(), r.values.clone());
            if let Some(probs) = &r.probabilities {
                p = p.with_probabilities(probs.clone());
            }
            params.push(p);
        }

        let tree = build_tree(&params, s.n_horizon, s.n_robust)?;
        let structure = NlpStructure::assemble(NlpSpec {
            model: self.model.clone(),
            tree: Arc::new(tree),
            collocation: s.collocation,
            t_step: s.t_step,
            objective: Objective {
                lterm: self.lterm.clone(),
                mterm: self.mterm.clone(),
                rterm: self.rterm.clone(),
            },
            constraints: self.constraints.clone(),
            state_bounds: self.state_bounds.clone(),
            input_bounds: self.input_bounds.clone(),
        })?;

        let u_prev = match &self.initial_input {
            Some(u0) => u0.clone(),
            None => self.input_bounds.iter().map(|b| b.project(0.0)).collect(),
        };

        info!(
            n_vars = structure.n_vars(),
            n_cons = structure.n_cons(),
            scenarios = structure.tree().n_scenarios(),
            n_horizon = s.n_horizon,
            n_robust = s.n_robust,
            "controller setup complete"
        );

        self.structure = Some(structure);
        self.u_prev = u_prev;
        self.last_feasible = None;
        self.last_solution = None;
        self.step = 0;
        self.phase = Phase::Ready;
        Ok(())
    }

    /// Solve from the current state and return the first-stage input.
    pub fn make_step(&mut self, x: &[Real]) -> ControlResult<StepOutcome> {
        if !matches!(self.phase, Phase::Ready | Phase::Feasible | Phase::Infeasible) {
            return Err(ControlError::configuration(
                "setup() must succeed before make_step()",
            ));
        }
        let Some(structure) = self.structure.as_ref() else {
            return Err(ControlError::configuration(
                "setup() must succeed before make_step()",
            ));
        };

        let nlp = structure.instance(x, &self.u_prev)?;
        let guess = match &self.warm_start {
            Some(z) => z.clone(),
            None => structure.initial_guess(x, &self.u_prev)?,
        };

        self.phase = Phase::Solving;
        let output = match self.solver.solve(&nlp, &guess, None) {
            Ok(out) => out,
            Err(e) => {
                self.phase = Phase::Infeasible;
                return Err(e.into());
            }
        };

        let step = self.step;
        self.step += 1;
        let solution =
            SolutionTrajectory::extract(structure, &output.x, output.status, output.objective);

        if output.status.is_solved() {
            let warm = structure.shift(&output.x)?;
            let action = structure.first_input(&output.x);
            info!(
                step,
                objective = output.objective,
                iterations = output.iterations,
                elapsed_ms = output.elapsed.as_secs_f64() * 1e3,
                "control step solved"
            );
            self.warm_start = Some(warm);
            self.u_prev = action.clone();
            self.last_feasible = Some(action.clone());
            self.last_solution = Some(solution.clone());
            self.phase = Phase::Feasible;
            return Ok(StepOutcome {
                step,
                status: output.status,
                action: Some(action),
                fallback: false,
                solution,
            });
        }

        warn!(
            step,
            status = %output.status,
            violation = output.constraint_violation,
            iterations = output.iterations,
            "control step not solved"
        );
        self.warm_start = None;
        self.last_solution = Some(solution.clone());
        self.phase = Phase::Infeasible;

        match self.settings.infeasibility_policy {
            InfeasibilityPolicy::Abort => Err(ControlError::Infeasible {
                step,
                status: output.status,
            }),
            InfeasibilityPolicy::Surface => Ok(StepOutcome {
                step,
                status: output.status,
                action: None,
                fallback: false,
                solution,
            }),
            InfeasibilityPolicy::HoldLastInput => {
                let action = self.last_feasible.clone();
                Ok(StepOutcome {
                    step,
                    status: output.status,
                    fallback: action.is_some(),
                    action,
                    solution,
                })
            }
        }
    }
}
