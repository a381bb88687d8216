//! Receding-horizon robust MPC controller.
//!
//! [`MpcController`] is configured (uncertain realizations, objective,
//! bounds, path constraints), then [`setup`](MpcController::setup) builds
//! the scenario tree and NLP structure once. Every
//! [`make_step`](MpcController::make_step) solves the NLP from the current
//! state with a shifted warm start and returns the first-stage input, or
//! surfaces infeasibility according to the configured
//! [`InfeasibilityPolicy`].

pub mod controller;
pub mod error;
pub mod settings;

pub use controller::{MpcController, Phase, StepOutcome};
pub use error::{ControlError, ControlResult};
pub use settings::{InfeasibilityPolicy, MpcSettings};
