//! Controller settings.

use rmpc_core::Real;
use rmpc_nlp::CollocationSettings;
use serde::{Deserialize, Serialize};

/// What [`make_step`](crate::MpcController::make_step) does when the solver
/// does not report an accepted solution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InfeasibilityPolicy {
    /// Return the outcome without an action.
    #[default]
    Surface,
    /// Return the last feasible action, flagged as a fallback.
    HoldLastInput,
    /// Return [`ControlError::Infeasible`](crate::ControlError::Infeasible).
    Abort,
}

/// Horizon and discretization settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MpcSettings {
    /// Prediction horizon in control intervals.
    pub n_horizon: usize,
    /// Number of leading intervals over which the scenario tree branches.
    pub n_robust: usize,
    /// Control interval length.
    pub t_step: Real,
    pub collocation: CollocationSettings,
    pub infeasibility_policy: InfeasibilityPolicy,
}

impl Default for MpcSettings {
    fn default() -> Self {
        Self {
            n_horizon: 10,
            n_robust: 1,
            t_step: 1.0,
            collocation: CollocationSettings::default(),
            infeasibility_policy: InfeasibilityPolicy::Surface,
        }
    }
}
