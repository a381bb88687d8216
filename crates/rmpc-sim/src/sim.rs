//! Plant simulator: one sampling period per call.

use crate::error::{SimError, SimResult};
use crate::integrator::{Dopri5, ForwardEuler, Integrator, RK4};
use crate::model::ModelRhs;
use rmpc_core::Real;
use rmpc_model::{Model, ModelKind};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{trace, warn};

/// Integrator selection for the simulator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegratorType {
    /// Adaptive Dormand-Prince 5(4) (default).
    #[default]
    Dopri5,
    /// 4th-order Runge-Kutta with fixed sub-steps.
    Rk4,
    /// Forward Euler with fixed sub-steps.
    ForwardEuler,
}

/// Options for the simulator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorSettings {
    /// Sampling period (seconds)
    pub t_step: Real,
    pub integrator: IntegratorType,
    /// Absolute tolerance (adaptive integrator)
    pub abs_tol: Real,
    /// Relative tolerance (adaptive integrator)
    pub rel_tol: Real,
    /// Fixed sub-steps per sampling period (RK4, forward Euler)
    pub substeps: usize,
    /// Maximum adaptive steps per sampling period (safety limit)
    pub max_steps: usize,
}

impl Default for SimulatorSettings {
    fn default() -> Self {
        Self {
            t_step: 1.0,
            integrator: IntegratorType::default(),
            abs_tol: 1e-10,
            rel_tol: 1e-8,
            substeps: 10,
            max_steps: 100_000,
        }
    }
}

impl SimulatorSettings {
    pub fn validate(&self) -> SimResult<()> {
        let invalid = |what: &str| {
            Err(SimError::InvalidArg {
                what: what.to_string(),
            })
        };
        if !(self.t_step.is_finite() && self.t_step > 0.0) {
            return invalid("t_step must be positive");
        }
        if !(self.abs_tol > 0.0 && self.rel_tol >= 0.0) {
            return invalid("tolerances must be positive");
        }
        if self.substeps == 0 {
            return invalid("substeps must be positive");
        }
        if self.max_steps == 0 {
            return invalid("max_steps must be positive");
        }
        Ok(())
    }
}

/// Simulates the true plant under a chosen parameter realization.
pub struct Simulator {
    model: Arc<Model>,
    settings: SimulatorSettings,
    t: Real,
    x: Option<Vec<Real>>,
}

impl Simulator {
    pub fn new(model: Arc<Model>, settings: SimulatorSettings) -> SimResult<Self> {
        if !model.is_finalized() {
            return Err(SimError::InvalidArg {
                what: "simulator needs a finalized model".to_string(),
            });
        }
        settings.validate()?;
        Ok(Self {
            model,
            settings,
            t: 0.0,
            x: None,
        })
    }

    pub fn settings(&self) -> &SimulatorSettings {
        &self.settings
    }

    /// Set the state and reset the clock to zero.
    pub fn set_initial_state(&mut self, x0: Vec<Real>) -> SimResult<()> {
        if x0.len() != self.model.n_x() {
            return Err(SimError::InvalidArg {
                what: format!(
                    "initial state has {} entries, model has {} states",
                    x0.len(),
                    self.model.n_x()
                ),
            });
        }
        if x0.iter().any(|v| !v.is_finite()) {
            return Err(SimError::InvalidArg {
                what: "initial state must be finite".to_string(),
            });
        }
        self.t = 0.0;
        self.x = Some(x0);
        Ok(())
    }

    pub fn time(&self) -> Real {
        self.t
    }

    pub fn state(&self) -> Option<&[Real]> {
        self.x.as_deref()
    }

    /// Advance one sampling period with input `u` held constant and
    /// parameters `p_fun(t_now)`, evaluated once at the start of the period.
    ///
    /// Returns the measured output (the full state).
    pub fn make_step(&mut self, u: &[Real], p_fun: &dyn Fn(Real) -> Vec<Real>) -> SimResult<Vec<Real>> {
        let x = self.x.as_deref().ok_or(SimError::NotInitialized)?;
        let p = p_fun(self.t);
        if p.len() != self.model.n_p() {
            return Err(SimError::InvalidArg {
                what: format!(
                    "p_fun returned {} values, model has {} parameters",
                    p.len(),
                    self.model.n_p()
                ),
            });
        }

        let s = &self.settings;
        let next = match self.model.kind() {
            ModelKind::Discrete => self.model.rhs(x, u, &p)?,
            ModelKind::Continuous => {
                let mut rhs = ModelRhs {
                    model: &self.model,
                    u,
                    p: &p,
                };
                match s.integrator {
                    IntegratorType::Dopri5 => Dopri5 {
                        abs_tol: s.abs_tol,
                        rel_tol: s.rel_tol,
                        max_steps: s.max_steps,
                        ..Dopri5::default()
                    }
                    .integrate(&mut rhs, self.t, x, s.t_step)?,
                    IntegratorType::Rk4 => fixed_steps(&RK4, &mut rhs, self.t, x, s)?,
                    IntegratorType::ForwardEuler => {
                        fixed_steps(&ForwardEuler, &mut rhs, self.t, x, s)?
                    }
                }
            }
        };

        if next.iter().any(|v| !v.is_finite()) {
            warn!(t = self.t, "plant state became non-finite");
            return Err(SimError::Integration {
                t: self.t,
                what: "non-finite state".to_string(),
            });
        }
        self.t += self.settings.t_step;
        trace!(t = self.t, "plant advanced");
        self.x = Some(next.clone());
        Ok(next)
    }
}

fn fixed_steps<I: Integrator>(
    integrator: &I,
    rhs: &mut ModelRhs<'_>,
    t0: Real,
    x0: &[Real],
    s: &SimulatorSettings,
) -> SimResult<Vec<Real>> {
    let dt = s.t_step / s.substeps as Real;
    let mut x = x0.to_vec();
    for i in 0..s.substeps {
        x = integrator.step(rhs, t0 + i as Real * dt, &x, dt)?;
    }
    Ok(x)
}
