//! Bound-constrained minimization by a projected Newton method.
//!
//! Variables at a bound whose gradient pushes outward are held there
//! exactly; the remaining (free) variables take a regularized Newton step.
//! The step is accepted along the projection arc `P(x + a d)` with an
//! Armijo test.

use crate::error::SolverResult;
use nalgebra::{DMatrix, DVector};
use std::time::Instant;

/// Objective over a box, as seen by the inner solver.
pub(crate) trait BoxObjective {
    fn value(&self, x: &DVector<f64>) -> SolverResult<f64>;

    /// Value, gradient and a symmetric curvature approximation.
    fn derivatives(&self, x: &DVector<f64>) -> SolverResult<(f64, DVector<f64>, DMatrix<f64>)>;
}

#[derive(Clone, Debug)]
pub(crate) struct InnerConfig {
    pub max_iterations: usize,
    pub tolerance: f64,
    pub armijo: f64,
    pub backtrack: f64,
    pub max_line_search_iters: usize,
    pub deadline: Option<Instant>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum InnerStatus {
    Converged,
    IterationLimit,
    Stalled,
    NonFinite,
    TimedOut,
}

#[derive(Clone, Debug)]
pub(crate) struct InnerOutcome {
    pub status: InnerStatus,
    pub iterations: usize,
    pub projected_gradient: f64,
}

/// Largest activity margin for bound identification.
const ACTIVE_EPS: f64 = 1e-3;

pub(crate) fn project(x: &DVector<f64>, lo: &DVector<f64>, hi: &DVector<f64>) -> DVector<f64> {
    DVector::from_iterator(
        x.len(),
        x.iter()
            .zip(lo.iter().zip(hi.iter()))
            .map(|(&v, (&l, &h))| v.max(l).min(h)),
    )
}

/// `max_i |x_i - P(x_i - g_i)|`, zero exactly at box-constrained stationarity.
pub(crate) fn projected_gradient_norm(
    x: &DVector<f64>,
    g: &DVector<f64>,
    lo: &DVector<f64>,
    hi: &DVector<f64>,
) -> f64 {
    (0..x.len()).fold(0.0, |acc, i| {
        let moved = (x[i] - g[i]).max(lo[i]).min(hi[i]);
        acc.max((x[i] - moved).abs())
    })
}

pub(crate) fn minimize_in_box<O: BoxObjective + ?Sized>(
    obj: &O,
    x: &mut DVector<f64>,
    lo: &DVector<f64>,
    hi: &DVector<f64>,
    cfg: &InnerConfig,
) -> SolverResult<InnerOutcome> {
    let n = x.len();
    let mut pg = f64::INFINITY;

    for iter in 0..cfg.max_iterations {
        let (phi, g, h) = obj.derivatives(x)?;
        if !phi.is_finite() || g.iter().any(|v| !v.is_finite()) {
            return Ok(InnerOutcome {
                status: InnerStatus::NonFinite,
                iterations: iter,
                projected_gradient: pg,
            });
        }

        pg = projected_gradient_norm(x, &g, lo, hi);
        if pg <= cfg.tolerance {
            return Ok(InnerOutcome {
                status: InnerStatus::Converged,
                iterations: iter,
                projected_gradient: pg,
            });
        }
        if cfg.deadline.is_some_and(|d| Instant::now() >= d) {
            return Ok(InnerOutcome {
                status: InnerStatus::TimedOut,
                iterations: iter,
                projected_gradient: pg,
            });
        }

        let eps = pg.min(ACTIVE_EPS);
        let active: Vec<bool> = (0..n)
            .map(|i| {
                lo[i] == hi[i]
                    || (x[i] <= lo[i] + eps && g[i] > 0.0)
                    || (x[i] >= hi[i] - eps && g[i] < 0.0)
            })
            .collect();
        let free: Vec<usize> = (0..n).filter(|&i| !active[i]).collect();

        let mut d = -g.clone();
        if !free.is_empty() {
            let h_ff = DMatrix::from_fn(free.len(), free.len(), |a, b| h[(free[a], free[b])]);
            let g_f = DVector::from_fn(free.len(), |a, _| g[free[a]]);
            let step = regularized_newton_step(h_ff, &g_f);
            for (a, &i) in free.iter().enumerate() {
                d[i] = step[a];
            }
        }

        let accepted = match line_search(obj, x, phi, &g, &d, &active, lo, hi, cfg)? {
            Some(next) => Some(next),
            None => line_search(obj, x, phi, &g, &(-g.clone()), &active, lo, hi, cfg)?,
        };

        match accepted {
            Some(next) => *x = next,
            None => {
                return Ok(InnerOutcome {
                    status: InnerStatus::Stalled,
                    iterations: iter + 1,
                    projected_gradient: pg,
                });
            }
        }
    }

    Ok(InnerOutcome {
        status: InnerStatus::IterationLimit,
        iterations: cfg.max_iterations,
        projected_gradient: pg,
    })
}

/// Backtracking along the projection arc. Returns the accepted point.
#[allow(clippy::too_many_arguments)]
fn line_search<O: BoxObjective + ?Sized>(
    obj: &O,
    x: &DVector<f64>,
    phi: f64,
    g: &DVector<f64>,
    d: &DVector<f64>,
    active: &[bool],
    lo: &DVector<f64>,
    hi: &DVector<f64>,
    cfg: &InnerConfig,
) -> SolverResult<Option<DVector<f64>>> {
    let mut alpha = 1.0;
    for _ in 0..cfg.max_line_search_iters {
        let trial = project(&(x + alpha * d), lo, hi);
        let phi_trial = obj.value(&trial)?;

        // Bertsekas: linear decrease on free variables, actual move on active ones
        let predicted: f64 = (0..x.len())
            .map(|i| {
                if active[i] {
                    g[i] * (x[i] - trial[i])
                } else {
                    -alpha * g[i] * d[i]
                }
            })
            .sum();

        if trial == *x {
            return Ok(None);
        }
        if phi_trial.is_finite() && phi - phi_trial >= cfg.armijo * predicted.max(0.0) {
            return Ok(Some(trial));
        }
        alpha *= cfg.backtrack;
    }
    Ok(None)
}

/// Solve `(H + delta I) s = -g`, raising `delta` until the matrix is
/// positive definite. Falls back to steepest descent.
fn regularized_newton_step(h: DMatrix<f64>, g: &DVector<f64>) -> DVector<f64> {
    let scale = h.diagonal().iter().fold(1.0_f64, |acc, v| acc.max(v.abs()));
    let mut delta = 0.0;
    for _ in 0..24 {
        let mut hr = h.clone();
        for i in 0..hr.nrows() {
            hr[(i, i)] += delta;
        }
        if let Some(chol) = hr.cholesky() {
            let step = chol.solve(&(-g.clone()));
            if step.iter().all(|v| v.is_finite()) {
                return step;
            }
        }
        delta = if delta == 0.0 { 1e-10 * scale } else { delta * 10.0 };
    }
    -g.clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// f = (x0 - 2)^2 + (x1 + 1)^2 + x0 x1
    struct Bowl;

    impl BoxObjective for Bowl {
        fn value(&self, x: &DVector<f64>) -> SolverResult<f64> {
            Ok((x[0] - 2.0).powi(2) + (x[1] + 1.0).powi(2) + x[0] * x[1])
        }

        fn derivatives(
            &self,
            x: &DVector<f64>,
        ) -> SolverResult<(f64, DVector<f64>, DMatrix<f64>)> {
            let g = DVector::from_vec(vec![
                2.0 * (x[0] - 2.0) + x[1],
                2.0 * (x[1] + 1.0) + x[0],
            ]);
            let h = DMatrix::from_row_slice(2, 2, &[2.0, 1.0, 1.0, 2.0]);
            Ok((self.value(x)?, g, h))
        }
    }

    fn cfg() -> InnerConfig {
        InnerConfig {
            max_iterations: 50,
            tolerance: 1e-10,
            armijo: 1e-4,
            backtrack: 0.5,
            max_line_search_iters: 40,
            deadline: None,
        }
    }

    #[test]
    fn unconstrained_minimum() {
        let lo = DVector::from_element(2, f64::NEG_INFINITY);
        let hi = DVector::from_element(2, f64::INFINITY);
        let mut x = DVector::zeros(2);
        let out = minimize_in_box(&Bowl, &mut x, &lo, &hi, &cfg()).unwrap();
        assert_eq!(out.status, InnerStatus::Converged);
        // grad = 0: 2x0 + x1 = 4, x0 + 2x1 = -2
        assert!((x[0] - 10.0 / 3.0).abs() < 1e-8);
        assert!((x[1] + 8.0 / 3.0).abs() < 1e-8);
    }

    #[test]
    fn active_bound_held_exactly() {
        let lo = DVector::from_vec(vec![0.0, 0.0]);
        let hi = DVector::from_vec(vec![1.0, 1.0]);
        let mut x = DVector::from_vec(vec![0.5, 0.5]);
        let out = minimize_in_box(&Bowl, &mut x, &lo, &hi, &cfg()).unwrap();
        assert_eq!(out.status, InnerStatus::Converged);
        // x0 pushes up to 1, x1 pushes down to 0
        assert_eq!(x[0], 1.0);
        assert_eq!(x[1], 0.0);
    }

    #[test]
    fn indefinite_curvature_still_descends() {
        let h = DMatrix::from_row_slice(2, 2, &[-1.0, 0.0, 0.0, 1.0]);
        let g = DVector::from_vec(vec![1.0, 1.0]);
        let s = regularized_newton_step(h, &g);
        assert!(g.dot(&s) < 0.0);
    }
}
