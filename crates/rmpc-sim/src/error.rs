//! Error types for simulation operations.

use rmpc_model::ModelError;
use thiserror::Error;

/// Errors encountered while simulating the plant.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimError {
    #[error("Invalid argument: {what}")]
    InvalidArg { what: String },

    #[error("Integration failed at t={t}: {what}")]
    Integration { t: f64, what: String },

    #[error("Simulator has no initial state")]
    NotInitialized,

    #[error("Model error: {0}")]
    Model(#[from] ModelError),
}

pub type SimResult<T> = Result<T, SimError>;
