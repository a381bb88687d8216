//! Scenario tree construction.

use crate::error::{TreeError, TreeResult};
use crate::tree::{ScenarioTree, TreeNode};
use rmpc_core::{NodeId, Real};
use tracing::debug;

/// Upper bound on arena size; larger trees are rejected before allocation.
pub const MAX_TREE_NODES: usize = 1_000_000;

const PROBABILITY_TOL: Real = 1e-9;

/// Enumerated realizations of one uncertain parameter.
///
/// The first value is the nominal realization.
#[derive(Clone, Debug, PartialEq)]
pub struct UncertainParameter {
    pub name: String,
    pub values: Vec<Real>,
    /// Optional probability per value (non-negative, summing to one).
    pub probabilities: Option<Vec<Real>>,
}

impl UncertainParameter {
    pub fn new(name: impl Into<String>, values: Vec<Real>) -> Self {
        Self {
            name: name.into(),
            values,
            probabilities: None,
        }
    }

    pub fn with_probabilities(mut self, probabilities: Vec<Real>) -> Self {
        self.probabilities = Some(probabilities);
        self
    }

    fn validate(&self) -> TreeResult<()> {
        if self.values.is_empty() {
            return Err(TreeError::EmptyUncertaintySet {
                parameter: self.name.clone(),
            });
        }
        if self.values.iter().any(|v| !v.is_finite()) {
            return Err(TreeError::NonFiniteRealization {
                parameter: self.name.clone(),
            });
        }
        if let Some(probs) = &self.probabilities {
            let invalid = |what: String| TreeError::InvalidProbabilities {
                parameter: self.name.clone(),
                what,
            };
            if probs.len() != self.values.len() {
                return Err(invalid(format!(
                    "{} probabilities for {} realizations",
                    probs.len(),
                    self.values.len()
                )));
            }
            if probs.iter().any(|p| !p.is_finite() || *p < 0.0) {
                return Err(invalid("negative or non-finite entry".to_string()));
            }
            let total: Real = probs.iter().sum();
            if (total - 1.0).abs() > PROBABILITY_TOL {
                return Err(invalid(format!("probabilities sum to {total}")));
            }
        }
        Ok(())
    }

    fn probability(&self, index: usize) -> Real {
        match &self.probabilities {
            Some(p) => p[index],
            None => 1.0 / self.values.len() as Real,
        }
    }
}

/// Build the scenario tree for `params` over `n_horizon` stages, branching
/// for the first `n_robust` of them.
///
/// Every parameter set is validated before any node is created, so a failure
/// never leaves a partial tree behind.
pub fn build_tree(
    params: &[UncertainParameter],
    n_horizon: usize,
    n_robust: usize,
) -> TreeResult<ScenarioTree> {
    if n_horizon == 0 || n_robust > n_horizon {
        return Err(TreeError::InvalidHorizon {
            n_horizon,
            n_robust,
        });
    }
    for p in params {
        p.validate()?;
    }

    // Size the tree from the realization counts alone; no tuple exists yet.
    let n_comb = if n_robust == 0 {
        1
    } else {
        params
            .iter()
            .try_fold(1usize, |acc, p| acc.checked_mul(p.values.len()))
            .ok_or(TreeError::TooLarge {
                nodes: u128::MAX,
                limit: MAX_TREE_NODES,
            })?
    };

    let total = expected_node_count(n_comb, n_horizon, n_robust);
    if total > MAX_TREE_NODES as u128 {
        return Err(TreeError::TooLarge {
            nodes: total,
            limit: MAX_TREE_NODES,
        });
    }

    let combinations = if n_robust == 0 {
        vec![vec![0; params.len()]]
    } else {
        cartesian_product(params)
    };

    let combination_values: Vec<Vec<Real>> = combinations
        .iter()
        .map(|tuple| {
            tuple
                .iter()
                .zip(params)
                .map(|(&r, p)| p.values[r])
                .collect()
        })
        .collect();
    let combination_weights: Vec<Real> = combinations
        .iter()
        .map(|tuple| {
            tuple
                .iter()
                .zip(params)
                .map(|(&r, p)| p.probability(r))
                .product()
        })
        .collect();

    let mut nodes = Vec::with_capacity(total as usize);
    nodes.push(TreeNode {
        id: NodeId::from_index(0),
        depth: 0,
        parent: None,
        combination: None,
        children: Vec::new(),
        weight: 1.0,
    });
    let mut levels = vec![vec![NodeId::from_index(0)]];

    for depth in 0..n_horizon {
        let branching = depth < n_robust;
        let mut next_level = Vec::new();

        for &parent in &levels[depth] {
            let parent_node = &nodes[parent.index()];
            let parent_weight = parent_node.weight;
            let children: Vec<(usize, Real)> = if branching {
                (0..n_comb)
                    .map(|c| (c, parent_weight * combination_weights[c]))
                    .collect()
            } else {
                // frozen: carry the parent's realization (nominal below a root)
                vec![(parent_node.combination.unwrap_or(0), parent_weight)]
            };

            for (combination, weight) in children {
                let id = NodeId::from_index(nodes.len());
                nodes.push(TreeNode {
                    id,
                    depth: depth + 1,
                    parent: Some(parent),
                    combination: Some(combination),
                    children: Vec::new(),
                    weight,
                });
                nodes[parent.index()].children.push(id);
                next_level.push(id);
            }
        }
        levels.push(next_level);
    }

    debug!(
        nodes = nodes.len(),
        scenarios = levels[n_horizon].len(),
        combinations = n_comb,
        n_horizon,
        n_robust,
        "scenario tree built"
    );

    Ok(ScenarioTree {
        nodes,
        levels,
        combinations,
        combination_values,
        n_horizon,
        n_robust,
    })
}

/// Number of nodes a tree with `n_comb` combinations per branching step has.
pub fn expected_node_count(n_comb: usize, n_horizon: usize, n_robust: usize) -> u128 {
    (0..=n_horizon)
        .map(|d| (n_comb as u128).saturating_pow(d.min(n_robust) as u32))
        .fold(0u128, u128::saturating_add)
}

/// All realization index tuples, last parameter varying fastest.
///
/// No parameters yields exactly one (empty) combination.
fn cartesian_product(params: &[UncertainParameter]) -> Vec<Vec<usize>> {
    let mut out: Vec<Vec<usize>> = vec![Vec::new()];
    for p in params {
        let mut next = Vec::with_capacity(out.len() * p.values.len());
        for prefix in &out {
            for r in 0..p.values.len() {
                let mut tuple = prefix.clone();
                tuple.push(r);
                next.push(tuple);
            }
        }
        out = next;
    }
    out
}
