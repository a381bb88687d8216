//! Solver-facing problem definition.

use crate::error::SolverResult;
use crate::jacobian::{
    GRADIENT_EPS, HESSIAN_EPS, JACOBIAN_EPS, central_difference_gradient,
    finite_difference_hessian, finite_difference_jacobian,
};
use crate::status::SolverOutput;
use nalgebra::{DMatrix, DVector};

/// Nonlinear program
///
/// ```text
/// min f(x)   s.t.   c(x) = 0,   lower <= x <= upper
/// ```
///
/// Variable and constraint order is fixed by the implementor; solvers never
/// reorder. Derivatives default to finite differences over the whole vector;
/// implementors with known sparsity should override them.
pub trait Nlp {
    fn n_vars(&self) -> usize;

    fn n_cons(&self) -> usize;

    fn lower_bounds(&self) -> &DVector<f64>;

    fn upper_bounds(&self) -> &DVector<f64>;

    fn objective(&self, x: &DVector<f64>) -> SolverResult<f64>;

    fn constraints(&self, x: &DVector<f64>) -> SolverResult<DVector<f64>>;

    fn gradient(&self, x: &DVector<f64>) -> SolverResult<DVector<f64>> {
        central_difference_gradient(x, |x| self.objective(x), GRADIENT_EPS)
    }

    /// Hessian of the objective only.
    fn hessian(&self, x: &DVector<f64>) -> SolverResult<DMatrix<f64>> {
        finite_difference_hessian(x, |x| self.objective(x), HESSIAN_EPS)
    }

    fn jacobian(&self, x: &DVector<f64>) -> SolverResult<DMatrix<f64>> {
        finite_difference_jacobian(x, |x| self.constraints(x), JACOBIAN_EPS)
    }
}

/// Opaque numerical NLP solver.
///
/// Structural problems (dimension mismatches, failing evaluations) are
/// `Err`; numerical outcomes, including infeasibility, are reported through
/// [`SolverOutput::status`].
pub trait NlpSolver: Send {
    fn solve(
        &mut self,
        nlp: &dyn Nlp,
        x0: &DVector<f64>,
        multipliers0: Option<&DVector<f64>>,
    ) -> SolverResult<SolverOutput>;
}
