use thiserror::Error;

/// Errors raised while building a scenario tree.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TreeError {
    #[error("Empty uncertainty set for parameter {parameter}")]
    EmptyUncertaintySet { parameter: String },

    #[error("Invalid horizon: n_horizon={n_horizon}, n_robust={n_robust}")]
    InvalidHorizon { n_horizon: usize, n_robust: usize },

    #[error("Invalid probabilities for parameter {parameter}: {what}")]
    InvalidProbabilities { parameter: String, what: String },

    #[error("Non-finite realization for parameter {parameter}")]
    NonFiniteRealization { parameter: String },

    #[error("Scenario tree too large: {nodes} nodes exceeds limit {limit}")]
    TooLarge { nodes: u128, limit: usize },
}

pub type TreeResult<T> = Result<T, TreeError>;
