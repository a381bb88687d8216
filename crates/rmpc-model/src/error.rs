//! Error types for model construction.

use rmpc_core::CoreError;
use thiserror::Error;

/// Errors raised while building or evaluating a dynamics model.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("Model is frozen: cannot {operation} after finalize")]
    FrozenModel { operation: &'static str },

    #[error("Model is incomplete: {what}")]
    IncompleteModel { what: String },

    #[error("Model is not finalized")]
    NotFinalized,

    #[error("Duplicate variable name: {name}")]
    DuplicateName { name: String },

    #[error("Dynamics already assigned for state {state}")]
    DuplicateDynamics { state: String },

    #[error("Unknown {what} handle (index={index}, len={len})")]
    UnknownHandle {
        what: &'static str,
        index: usize,
        len: usize,
    },

    #[error(transparent)]
    Core(#[from] CoreError),
}

pub type ModelResult<T> = Result<T, ModelError>;
