//! Evaluable expressions over (state, input, parameter) values.
//!
//! Symbolic construction is out of scope here: an expression is any pure,
//! deterministic closure reading the current evaluation [`Point`].

use crate::model::{InputHandle, ParamHandle, StateHandle};
use rmpc_core::Real;
use std::fmt;
use std::sync::Arc;

/// Values a single expression evaluation may read.
#[derive(Clone, Copy, Debug)]
pub struct Point<'a> {
    pub x: &'a [Real],
    pub u: &'a [Real],
    pub p: &'a [Real],
}

impl<'a> Point<'a> {
    pub fn new(x: &'a [Real], u: &'a [Real], p: &'a [Real]) -> Self {
        Self { x, u, p }
    }

    /// State value. Handles from a different model read as NaN.
    pub fn x(&self, h: StateHandle) -> Real {
        self.x.get(h.index()).copied().unwrap_or(Real::NAN)
    }

    pub fn u(&self, h: InputHandle) -> Real {
        self.u.get(h.index()).copied().unwrap_or(Real::NAN)
    }

    pub fn p(&self, h: ParamHandle) -> Real {
        self.p.get(h.index()).copied().unwrap_or(Real::NAN)
    }
}

/// Shared, side-effect-free scalar function of a [`Point`].
#[derive(Clone)]
pub struct Expr(Arc<dyn Fn(&Point<'_>) -> Real + Send + Sync>);

impl Expr {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Point<'_>) -> Real + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn constant(value: Real) -> Self {
        Self::new(move |_| value)
    }

    pub fn eval(&self, pt: &Point<'_>) -> Real {
        (self.0)(pt)
    }
}

impl fmt::Debug for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Expr(<fn>)")
    }
}
