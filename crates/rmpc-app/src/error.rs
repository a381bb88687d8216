//! Error types for the rmpc-app service layer.

use std::path::PathBuf;

use crate::config::ValidationError;

/// Application error type wrapping the backend crates' errors for the CLI.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Failed to read run config: {path}")]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write run config: {path}")]
    ConfigWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Run config could not be parsed: {0}")]
    ConfigParse(String),

    #[error("Run config validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Controller error: {0}")]
    Control(String),

    #[error("Simulation error: {0}")]
    Simulation(String),

    #[error("Results error: {0}")]
    Results(String),

    #[error("Run not found: {0}")]
    RunNotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for rmpc-app operations.
pub type AppResult<T> = Result<T, AppError>;

// Conversions from backend error types
impl From<rmpc_model::ModelError> for AppError {
    fn from(err: rmpc_model::ModelError) -> Self {
        AppError::Model(err.to_string())
    }
}

impl From<rmpc_control::ControlError> for AppError {
    fn from(err: rmpc_control::ControlError) -> Self {
        AppError::Control(err.to_string())
    }
}

impl From<rmpc_sim::SimError> for AppError {
    fn from(err: rmpc_sim::SimError) -> Self {
        AppError::Simulation(err.to_string())
    }
}

impl From<rmpc_results::ResultsError> for AppError {
    fn from(err: rmpc_results::ResultsError) -> Self {
        match err {
            rmpc_results::ResultsError::RunNotFound { run_id } => AppError::RunNotFound(run_id),
            other => AppError::Results(other.to_string()),
        }
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::ConfigParse(err.to_string())
    }
}
