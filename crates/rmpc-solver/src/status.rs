//! Solve outcomes.

use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Terminal status of one NLP solve.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SolveStatus {
    Solved,
    Infeasible,
    IterationLimit,
    Error,
}

impl SolveStatus {
    pub fn is_solved(self) -> bool {
        matches!(self, SolveStatus::Solved)
    }
}

impl fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SolveStatus::Solved => "SOLVED",
            SolveStatus::Infeasible => "INFEASIBLE",
            SolveStatus::IterationLimit => "ITERATION_LIMIT",
            SolveStatus::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// What a solver hands back: primal point, optional multipliers, status.
#[derive(Clone, Debug)]
pub struct SolverOutput {
    pub x: DVector<f64>,
    pub multipliers: Option<DVector<f64>>,
    pub status: SolveStatus,
    pub objective: f64,
    pub constraint_violation: f64,
    pub iterations: usize,
    pub elapsed: Duration,
}
