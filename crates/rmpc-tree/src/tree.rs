//! Arena representation of a built scenario tree.

use rmpc_core::{NodeId, Real};

/// One node of the scenario tree.
///
/// A node at depth `d >= 1` stands for the transition from its parent's stage
/// `d - 1` to stage `d` under one parameter combination. The root is the
/// current state and carries no combination of its own.
#[derive(Clone, Debug, PartialEq)]
pub struct TreeNode {
    pub id: NodeId,
    pub depth: usize,
    pub parent: Option<NodeId>,
    /// Index into [`ScenarioTree::combinations`]; `None` for the root.
    pub combination: Option<usize>,
    pub children: Vec<NodeId>,
    /// Probability mass of all scenarios passing through this node.
    pub weight: Real,
}

/// Scenario tree built by [`build_tree`](crate::build_tree).
#[derive(Clone, Debug, PartialEq)]
pub struct ScenarioTree {
    pub(crate) nodes: Vec<TreeNode>,
    pub(crate) levels: Vec<Vec<NodeId>>,
    pub(crate) combinations: Vec<Vec<usize>>,
    pub(crate) combination_values: Vec<Vec<Real>>,
    pub(crate) n_horizon: usize,
    pub(crate) n_robust: usize,
}

impl ScenarioTree {
    pub fn nodes(&self) -> &[TreeNode] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> &TreeNode {
        &self.nodes[id.index()]
    }

    pub fn root(&self) -> NodeId {
        NodeId::from_index(0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn n_horizon(&self) -> usize {
        self.n_horizon
    }

    pub fn n_robust(&self) -> usize {
        self.n_robust
    }

    /// Nodes at `depth` in enumeration order.
    pub fn level(&self, depth: usize) -> &[NodeId] {
        self.levels.get(depth).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Leaves (depth `n_horizon`), one per scenario.
    pub fn leaves(&self) -> &[NodeId] {
        self.level(self.n_horizon)
    }

    pub fn n_scenarios(&self) -> usize {
        self.leaves().len()
    }

    /// Realization index tuples in lexicographic order (last parameter fastest).
    ///
    /// A tree that never branches holds only the nominal tuple.
    pub fn combinations(&self) -> &[Vec<usize>] {
        &self.combinations
    }

    /// Parameter values of one combination, in parameter declaration order.
    pub fn combination_values(&self, combination: usize) -> &[Real] {
        &self.combination_values[combination]
    }

    /// Parameter values acting on the node's incoming transition.
    ///
    /// The root reads the nominal combination (first realization of every
    /// parameter).
    pub fn realization(&self, id: NodeId) -> &[Real] {
        let combination = self.node(id).combination.unwrap_or(0);
        self.combination_values(combination)
    }

    /// Node ids from the root down to `id`, inclusive.
    pub fn path(&self, id: NodeId) -> Vec<NodeId> {
        let mut path = vec![id];
        let mut cur = self.node(id).parent;
        while let Some(p) = cur {
            path.push(p);
            cur = self.node(p).parent;
        }
        path.reverse();
        path
    }

    /// The child that continues this node's realization one stage later.
    ///
    /// For the root this is the first child. Leaves have no successor.
    pub fn successor(&self, id: NodeId) -> Option<NodeId> {
        let node = self.node(id);
        match node.combination {
            None => node.children.first().copied(),
            Some(c) => node
                .children
                .iter()
                .copied()
                .find(|&child| self.node(child).combination == Some(c))
                .or_else(|| node.children.first().copied()),
        }
    }

    /// True when `a` and `b` have the same ancestor at `depth`.
    pub fn share_history(&self, a: NodeId, b: NodeId, depth: usize) -> bool {
        let pa = self.path(a);
        let pb = self.path(b);
        match (pa.get(depth), pb.get(depth)) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        }
    }
}
