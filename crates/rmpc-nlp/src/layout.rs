//! Decision-variable and constraint layout over the scenario tree.
//!
//! Nodes are laid out in arena (breadth-first) order. Within a non-root node
//! of a continuous model the variables are, per finite element, the element
//! start (from the second element on) followed by the collocation states;
//! then the stage state, the input (if the node is above the leaves) and the
//! path-constraint slacks. The root holds its state, fixed to the measured
//! state, and its input. Constraint rows follow the same node order.

use std::ops::Range;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ElementLayout {
    /// Offset of the element start; `None` when the element starts at the
    /// parent's stage state.
    pub start: Option<usize>,
    /// Offset of the `degree * n_x` collocation states.
    pub colloc: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeLayout {
    pub depth: usize,
    /// Arena index of the parent.
    pub parent: Option<usize>,
    pub elements: Vec<ElementLayout>,
    pub state: usize,
    pub input: Option<usize>,
    pub slack: Option<usize>,
    /// Range of every variable owned by this node.
    pub vars: Range<usize>,
    /// Range of constraint rows owned by this node.
    pub rows: Range<usize>,
}

/// Comparable summary of a layout: two setups of the same configuration
/// produce equal signatures.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LayoutSignature {
    pub n_vars: usize,
    pub n_cons: usize,
    pub nodes: Vec<NodeLayout>,
}

pub(crate) struct LayoutDims {
    pub n_x: usize,
    pub n_u: usize,
    pub n_nl: usize,
    /// `(degree, finite_elements)`; `None` for discrete models.
    pub collocation: Option<(usize, usize)>,
}

pub(crate) fn build_layout(
    parents: &[Option<usize>],
    depths: &[usize],
    n_horizon: usize,
    dims: &LayoutDims,
) -> (Vec<NodeLayout>, usize, usize) {
    let mut nodes = Vec::with_capacity(parents.len());
    let mut var = 0;
    let mut row = 0;

    for (&parent, &depth) in parents.iter().zip(depths) {
        let var_start = var;
        let row_start = row;
        let mut elements = Vec::new();

        if parent.is_some() {
            match dims.collocation {
                Some((degree, n_fe)) => {
                    for e in 0..n_fe {
                        let start = if e == 0 {
                            None
                        } else {
                            let off = var;
                            var += dims.n_x;
                            row += dims.n_x;
                            Some(off)
                        };
                        elements.push(ElementLayout { start, colloc: var });
                        var += degree * dims.n_x;
                        row += degree * dims.n_x;
                    }
                    // stage continuity
                    row += dims.n_x;
                }
                None => row += dims.n_x,
            }
        }

        let state = var;
        var += dims.n_x;
        let input = (depth < n_horizon).then(|| {
            let off = var;
            var += dims.n_u;
            off
        });
        let slack = (parent.is_some() && dims.n_nl > 0).then(|| {
            let off = var;
            var += dims.n_nl;
            row += dims.n_nl;
            off
        });

        nodes.push(NodeLayout {
            depth,
            parent,
            elements,
            state,
            input,
            slack,
            vars: var_start..var,
            rows: row_start..row,
        });
    }
    (nodes, var, row)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_layout_offsets() {
        // root -> a -> b, two states, one input, degree 2, two elements
        let dims = LayoutDims {
            n_x: 2,
            n_u: 1,
            n_nl: 1,
            collocation: Some((2, 2)),
        };
        let (nodes, n_vars, n_cons) = build_layout(&[None, Some(0), Some(1)], &[0, 1, 2], 2, &dims);

        assert_eq!(nodes[0].state, 0);
        assert_eq!(nodes[0].input, Some(2));
        assert_eq!(nodes[0].slack, None);
        assert!(nodes[0].rows.is_empty());

        let a = &nodes[1];
        assert_eq!(a.elements[0], ElementLayout { start: None, colloc: 3 });
        assert_eq!(a.elements[1], ElementLayout { start: Some(7), colloc: 9 });
        assert_eq!(a.state, 13);
        assert_eq!(a.input, Some(15));
        assert_eq!(a.slack, Some(16));
        // 4 + 2 + 4 colloc/continuity, 2 stage continuity, 1 path constraint
        assert_eq!(a.rows, 0..13);

        let b = &nodes[2];
        assert_eq!(b.input, None);
        assert_eq!(n_vars, b.vars.end);
        assert_eq!(n_cons, 26);
    }

    #[test]
    fn discrete_layout_has_one_transition_per_node() {
        let dims = LayoutDims {
            n_x: 3,
            n_u: 2,
            n_nl: 0,
            collocation: None,
        };
        let (nodes, n_vars, n_cons) = build_layout(&[None, Some(0), Some(0)], &[0, 1, 1], 1, &dims);
        assert!(nodes[1].elements.is_empty());
        assert_eq!(nodes[1].rows, 0..3);
        assert_eq!(nodes[2].rows, 3..6);
        assert_eq!(n_vars, 5 + 3 + 3);
        assert_eq!(n_cons, 6);
    }
}
