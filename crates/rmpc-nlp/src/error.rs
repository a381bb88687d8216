use rmpc_model::ModelError;
use rmpc_solver::SolverError;
use thiserror::Error;

/// Errors raised while discretizing or assembling the NLP.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NlpError {
    #[error("Invalid discretization: {what}")]
    InvalidDiscretization { what: String },

    #[error("Invalid NLP configuration: {what}")]
    Configuration { what: String },

    #[error("Dimension mismatch for {what}: expected {expected}, got {actual}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Solver error: {0}")]
    Solver(#[from] SolverError),
}

pub type NlpResult<T> = Result<T, NlpError>;

impl From<NlpError> for SolverError {
    fn from(e: NlpError) -> Self {
        match e {
            NlpError::Solver(inner) => inner,
            other => SolverError::Evaluation {
                what: other.to_string(),
            },
        }
    }
}
