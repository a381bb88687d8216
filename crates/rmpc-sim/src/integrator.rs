//! Time integrators over plain state vectors.

use crate::error::{SimError, SimResult};
use crate::model::OdeRhs;
use rmpc_core::Real;
use tracing::trace;

/// One integration step of length `dt`.
pub trait Integrator {
    fn step<M: OdeRhs>(&self, model: &mut M, t: Real, x: &[Real], dt: Real) -> SimResult<Vec<Real>>;
}

fn axpy(x: &[Real], a: Real, k: &[Real]) -> Vec<Real> {
    x.iter().zip(k).map(|(xi, ki)| xi + a * ki).collect()
}

fn combine(x: &[Real], dt: Real, terms: &[(Real, &[Real])]) -> Vec<Real> {
    let mut out = x.to_vec();
    for (c, k) in terms {
        if *c != 0.0 {
            for (o, ki) in out.iter_mut().zip(k.iter()) {
                *o += dt * c * ki;
            }
        }
    }
    out
}

/// Classical RK4 (Runge-Kutta 4th order) integrator.
#[derive(Clone, Debug)]
pub struct RK4;

impl Integrator for RK4 {
    fn step<M: OdeRhs>(&self, model: &mut M, t: Real, x: &[Real], dt: Real) -> SimResult<Vec<Real>> {
        let k1 = model.rhs(t, x)?;
        let k2 = model.rhs(t + 0.5 * dt, &axpy(x, 0.5 * dt, &k1))?;
        let k3 = model.rhs(t + 0.5 * dt, &axpy(x, 0.5 * dt, &k2))?;
        let k4 = model.rhs(t + dt, &axpy(x, dt, &k3))?;

        // x_new = x + (dt/6) * (k1 + 2*k2 + 2*k3 + k4)
        Ok(combine(
            x,
            dt / 6.0,
            &[
                (1.0, k1.as_slice()),
                (2.0, k2.as_slice()),
                (2.0, k3.as_slice()),
                (1.0, k4.as_slice()),
            ],
        ))
    }
}

/// Forward Euler (explicit, 1st order).
/// Calls rhs() once per step instead of 4 times (RK4).
#[derive(Clone, Debug)]
pub struct ForwardEuler;

impl Integrator for ForwardEuler {
    fn step<M: OdeRhs>(&self, model: &mut M, t: Real, x: &[Real], dt: Real) -> SimResult<Vec<Real>> {
        let xdot = model.rhs(t, x)?;
        Ok(axpy(x, dt, &xdot))
    }
}

// Dormand-Prince 5(4) tableau
const C: [Real; 7] = [0.0, 1.0 / 5.0, 3.0 / 10.0, 4.0 / 5.0, 8.0 / 9.0, 1.0, 1.0];
const A: [[Real; 6]; 7] = [
    [0.0; 6],
    [1.0 / 5.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    [3.0 / 40.0, 9.0 / 40.0, 0.0, 0.0, 0.0, 0.0],
    [44.0 / 45.0, -56.0 / 15.0, 32.0 / 9.0, 0.0, 0.0, 0.0],
    [
        19372.0 / 6561.0,
        -25360.0 / 2187.0,
        64448.0 / 6561.0,
        -212.0 / 729.0,
        0.0,
        0.0,
    ],
    [
        9017.0 / 3168.0,
        -355.0 / 33.0,
        46732.0 / 5247.0,
        49.0 / 176.0,
        -5103.0 / 18656.0,
        0.0,
    ],
    [
        35.0 / 384.0,
        0.0,
        500.0 / 1113.0,
        125.0 / 192.0,
        -2187.0 / 6784.0,
        11.0 / 84.0,
    ],
];
/// Fifth-order weights (first same as last: equal to the last row of `A`).
const B5: [Real; 7] = [
    35.0 / 384.0,
    0.0,
    500.0 / 1113.0,
    125.0 / 192.0,
    -2187.0 / 6784.0,
    11.0 / 84.0,
    0.0,
];
const B4: [Real; 7] = [
    5179.0 / 57600.0,
    0.0,
    7571.0 / 16695.0,
    393.0 / 640.0,
    -92097.0 / 339200.0,
    187.0 / 2100.0,
    1.0 / 40.0,
];

/// Adaptive Dormand-Prince 5(4) with mixed absolute/relative error control.
#[derive(Clone, Debug)]
pub struct Dopri5 {
    pub abs_tol: Real,
    pub rel_tol: Real,
    /// Accepted plus rejected steps allowed per call.
    pub max_steps: usize,
    pub min_step: Real,
}

impl Default for Dopri5 {
    fn default() -> Self {
        Self {
            abs_tol: 1e-10,
            rel_tol: 1e-8,
            max_steps: 100_000,
            min_step: 1e-14,
        }
    }
}

/// Result of one embedded step: 5th-order solution and scaled error norm.
struct Trial {
    x: Vec<Real>,
    err: Real,
}

impl Dopri5 {
    fn trial<M: OdeRhs>(&self, model: &mut M, t: Real, x: &[Real], k1: &[Real], h: Real) -> SimResult<Trial> {
        let mut k: Vec<Vec<Real>> = Vec::with_capacity(7);
        k.push(k1.to_vec());
        for s in 1..7 {
            let terms: Vec<(Real, &[Real])> =
                (0..s).map(|j| (A[s][j], k[j].as_slice())).collect();
            let xs = combine(x, h, &terms);
            k.push(model.rhs(t + C[s] * h, &xs)?);
        }
        let x5 = combine(
            x,
            h,
            &B5.iter().zip(&k).map(|(b, ki)| (*b, ki.as_slice())).collect::<Vec<_>>(),
        );
        let x4 = combine(
            x,
            h,
            &B4.iter().zip(&k).map(|(b, ki)| (*b, ki.as_slice())).collect::<Vec<_>>(),
        );

        let n = x.len().max(1) as Real;
        let sum: Real = x
            .iter()
            .zip(&x5)
            .zip(&x4)
            .map(|((x0, a), b)| {
                let sc = self.abs_tol + self.rel_tol * x0.abs().max(a.abs());
                ((a - b) / sc).powi(2)
            })
            .sum();
        Ok(Trial {
            x: x5,
            err: (sum / n).sqrt(),
        })
    }

    /// Integrate from `t0` over `span` with adaptive steps.
    pub fn integrate<M: OdeRhs>(&self, model: &mut M, t0: Real, x0: &[Real], span: Real) -> SimResult<Vec<Real>> {
        let t_end = t0 + span;
        let mut t = t0;
        let mut x = x0.to_vec();
        let mut h = initial_step(span);
        let mut steps = 0;

        while t < t_end {
            if steps >= self.max_steps {
                return Err(SimError::Integration {
                    t,
                    what: format!("step budget of {} exhausted", self.max_steps),
                });
            }
            steps += 1;
            let last = t + h >= t_end;
            if last {
                h = t_end - t;
            }

            let k1 = model.rhs(t, &x)?;
            let trial = self.trial(model, t, &x, &k1, h)?;
            if !trial.err.is_finite() || trial.x.iter().any(|v| !v.is_finite()) {
                h *= 0.2;
                trace!(t, h, "non-finite trial step, shrinking");
            } else if trial.err <= 1.0 {
                t = if last { t_end } else { t + h };
                x = trial.x;
                let factor = if trial.err == 0.0 {
                    5.0
                } else {
                    (0.9 * trial.err.powf(-0.2)).clamp(0.2, 5.0)
                };
                h *= factor;
                continue;
            } else {
                let factor = (0.9 * trial.err.powf(-0.2)).clamp(0.2, 1.0);
                trace!(t, h, err = trial.err, "step rejected");
                h *= factor;
            }
            if h < self.min_step * t_end.abs().max(1.0) {
                return Err(SimError::Integration {
                    t,
                    what: format!("step size underflow (h = {h:e})"),
                });
            }
        }
        Ok(x)
    }
}

impl Integrator for Dopri5 {
    fn step<M: OdeRhs>(&self, model: &mut M, t: Real, x: &[Real], dt: Real) -> SimResult<Vec<Real>> {
        self.integrate(model, t, x, dt)
    }
}

fn initial_step(span: Real) -> Real {
    (span / 100.0).max(Real::EPSILON)
}
