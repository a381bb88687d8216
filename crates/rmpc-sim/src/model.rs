//! Right-hand sides seen by the integrators.

use crate::error::SimResult;
use rmpc_core::Real;
use rmpc_model::Model;

/// Time-dependent ODE right-hand side `dx/dt = f(t, x)`.
pub trait OdeRhs {
    /// Takes `&mut self` so implementors may cache between calls.
    fn rhs(&mut self, t: Real, x: &[Real]) -> SimResult<Vec<Real>>;
}

/// A finalized continuous model with input and parameters held constant.
pub struct ModelRhs<'a> {
    pub model: &'a Model,
    pub u: &'a [Real],
    pub p: &'a [Real],
}

impl OdeRhs for ModelRhs<'_> {
    fn rhs(&mut self, _t: Real, x: &[Real]) -> SimResult<Vec<Real>> {
        Ok(self.model.rhs(x, self.u, self.p)?)
    }
}

impl<F> OdeRhs for F
where
    F: FnMut(Real, &[Real]) -> Vec<Real>,
{
    fn rhs(&mut self, t: Real, x: &[Real]) -> SimResult<Vec<Real>> {
        Ok(self(t, x))
    }
}
