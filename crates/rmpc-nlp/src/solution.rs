//! Per-scenario trajectories read back from a primal vector.

use crate::assembler::NlpStructure;
use nalgebra::DVector;
use rmpc_core::Real;
use rmpc_solver::SolveStatus;
use serde::{Deserialize, Serialize};

/// One root-to-leaf path of the scenario tree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScenarioTrajectory {
    /// Arena index of the leaf.
    pub leaf: usize,
    pub weight: Real,
    /// Stage states `x_0 .. x_N`.
    pub states: Vec<Vec<Real>>,
    /// Stage inputs `u_0 .. u_{N-1}`.
    pub inputs: Vec<Vec<Real>>,
    /// Parameter values acting on each transition `k -> k+1`.
    pub parameters: Vec<Vec<Real>>,
}

/// Snapshot of one solve: status, cost and every scenario's trajectory.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SolutionTrajectory {
    pub status: SolveStatus,
    pub objective: Real,
    pub first_input: Vec<Real>,
    pub scenarios: Vec<ScenarioTrajectory>,
}

impl SolutionTrajectory {
    pub fn extract(
        structure: &NlpStructure,
        z: &DVector<Real>,
        status: SolveStatus,
        objective: Real,
    ) -> Self {
        let tree = structure.tree();
        let scenarios = tree
            .leaves()
            .iter()
            .map(|&leaf| {
                let path = tree.path(leaf);
                ScenarioTrajectory {
                    leaf: leaf.index(),
                    weight: tree.node(leaf).weight,
                    states: path
                        .iter()
                        .map(|id| structure.node_state(z, id.index()).to_vec())
                        .collect(),
                    inputs: path
                        .iter()
                        .filter_map(|id| structure.node_input(z, id.index()))
                        .map(<[Real]>::to_vec)
                        .collect(),
                    parameters: path[1..]
                        .iter()
                        .map(|&id| tree.realization(id).to_vec())
                        .collect(),
                }
            })
            .collect();

        Self {
            status,
            objective,
            first_input: structure.first_input(z),
            scenarios,
        }
    }

    /// Scenario-weighted mean of the predicted states at every stage.
    pub fn expected_states(&self) -> Vec<Vec<Real>> {
        let Some(first) = self.scenarios.first() else {
            return Vec::new();
        };
        let mut mean: Vec<Vec<Real>> = first.states.iter().map(|x| vec![0.0; x.len()]).collect();
        for s in &self.scenarios {
            for (acc, x) in mean.iter_mut().zip(&s.states) {
                for (a, v) in acc.iter_mut().zip(x) {
                    *a += s.weight * v;
                }
            }
        }
        mean
    }
}
