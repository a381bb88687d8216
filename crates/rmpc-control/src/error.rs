//! Error types for controller configuration and stepping.

use rmpc_model::ModelError;
use rmpc_nlp::NlpError;
use rmpc_solver::{SolveStatus, SolverError};
use rmpc_tree::TreeError;
use thiserror::Error;

/// Result type for controller operations.
pub type ControlResult<T> = Result<T, ControlError>;

/// Errors raised by the MPC controller.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ControlError {
    /// Missing or inconsistent configuration; the caller must reconfigure.
    #[error("Configuration error: {what}")]
    Configuration { what: String },

    /// The solve did not produce an accepted solution and the policy is
    /// [`Abort`](crate::InfeasibilityPolicy::Abort).
    #[error("Solver reported {status} at control step {step}")]
    Infeasible { step: usize, status: SolveStatus },

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error(transparent)]
    Nlp(#[from] NlpError),

    #[error(transparent)]
    Solver(#[from] SolverError),

    #[error(transparent)]
    Model(#[from] ModelError),
}

impl ControlError {
    pub(crate) fn configuration(what: impl Into<String>) -> Self {
        Self::Configuration { what: what.into() }
    }
}
