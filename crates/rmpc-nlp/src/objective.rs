//! Cost terms and nonlinear path constraints.

use rmpc_core::Real;
use rmpc_model::Expr;

/// Stage, terminal and input-rate cost.
///
/// Per scenario the cost is `mterm(x_N, u_{N-1}, p)` plus, for every stage
/// `k < N`, `lterm(x_k, u_k, p) + sum_i rterm[i] * (u_k[i] - u_{k-1}[i])^2`.
/// At `k = 0` the rate term compares against the previously applied input.
#[derive(Clone, Debug, Default)]
pub struct Objective {
    pub lterm: Option<Expr>,
    pub mterm: Option<Expr>,
    /// Per-input rate weights; empty means no rate penalty.
    pub rterm: Vec<Real>,
}

impl Objective {
    pub fn new(lterm: Option<Expr>, mterm: Option<Expr>) -> Self {
        Self {
            lterm,
            mterm,
            rterm: Vec::new(),
        }
    }

    pub fn is_set(&self) -> bool {
        self.lterm.is_some() || self.mterm.is_some()
    }
}

/// Path constraint `expr(x_k, u_{k-1}, p) <= upper`, enforced at every
/// non-root node.
#[derive(Clone, Debug)]
pub struct NlConstraint {
    pub name: String,
    pub expr: Expr,
    pub upper: Real,
}

impl NlConstraint {
    pub fn new(name: impl Into<String>, expr: Expr, upper: Real) -> Self {
        Self {
            name: name.into(),
            expr,
            upper,
        }
    }
}
