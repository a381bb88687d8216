//! Result data types.

use rmpc_nlp::SolutionTrajectory;
use rmpc_solver::SolveStatus;
use serde::{Deserialize, Serialize};

pub type RunId = String;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub run_id: RunId,
    /// Model the run was made with.
    pub model: String,
    pub timestamp: String,
    pub requested_steps: usize,
    /// Entries in the log.
    pub completed_steps: usize,
    pub outcome: RunOutcome,
    pub solver_version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RunOutcome {
    Completed,
    Halted { step: usize, reason: String },
}

/// One closed-loop step: the state the controller saw, the input applied
/// and the solve that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub step: usize,
    pub time: f64,
    pub state: Vec<f64>,
    pub input: Vec<f64>,
    pub status: SolveStatus,
    /// Input is the held last feasible action, not a fresh solution.
    #[serde(default)]
    pub fallback: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<SolutionTrajectory>,
}
