//! Augmented Lagrangian NLP solver.
//!
//! Outer loop (method of multipliers):
//!
//! ```text
//! x   <- argmin_{lower <= x <= upper}  f(x) + lambda'c(x) + rho/2 |c(x)|^2
//! lambda <- lambda + rho c(x)
//! rho <- growth * rho   when |c|_inf did not shrink enough
//! ```
//!
//! The subproblem uses Gauss-Newton curvature `H_f + rho J'J`; constraint
//! second derivatives are left out.

use crate::error::{SolverError, SolverResult};
use crate::problem::{Nlp, NlpSolver};
use crate::projected_newton::{BoxObjective, InnerConfig, InnerStatus, minimize_in_box, project};
use crate::status::{SolveStatus, SolverOutput};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Augmented Lagrangian solver configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AugLagConfig {
    /// Maximum multiplier updates
    pub max_outer_iterations: usize,
    /// Maximum projected Newton iterations per subproblem
    pub max_inner_iterations: usize,
    /// Projected-gradient tolerance on the Lagrangian
    pub optimality_tol: f64,
    /// Max-norm tolerance on equality constraints
    pub constraint_tol: f64,
    /// Penalty parameter at the first outer iteration
    pub initial_penalty: f64,
    /// Penalty growth factor
    pub penalty_growth: f64,
    /// Penalty cap; stalling at the cap is reported as infeasible
    pub max_penalty: f64,
    /// Required violation ratio between outer iterations before growing the penalty
    pub violation_decrease: f64,
    /// Armijo sufficient-decrease constant
    pub armijo: f64,
    /// Line search backtracking factor
    pub backtrack: f64,
    /// Maximum line search iterations
    pub max_line_search_iters: usize,
    /// Wall-clock budget for one solve, in seconds
    pub max_wall_time_s: Option<f64>,
    /// Variables this close (relative) to a bound are reported on the bound
    pub bound_snap_tol: f64,
}

impl Default for AugLagConfig {
    fn default() -> Self {
        Self {
            max_outer_iterations: 40,
            max_inner_iterations: 200,
            optimality_tol: 1e-6,
            constraint_tol: 1e-7,
            initial_penalty: 10.0,
            penalty_growth: 10.0,
            max_penalty: 1e10,
            violation_decrease: 0.25,
            armijo: 1e-4,
            backtrack: 0.5,
            max_line_search_iters: 50,
            max_wall_time_s: None,
            bound_snap_tol: 1e-7,
        }
    }
}

/// Default dense solver behind the [`NlpSolver`] boundary.
#[derive(Clone, Debug, Default)]
pub struct AugLagSolver {
    pub config: AugLagConfig,
}

impl AugLagSolver {
    pub fn new(config: AugLagConfig) -> Self {
        Self { config }
    }
}

struct AugmentedLagrangian<'a> {
    nlp: &'a dyn Nlp,
    lambda: &'a DVector<f64>,
    rho: f64,
}

impl BoxObjective for AugmentedLagrangian<'_> {
    fn value(&self, x: &DVector<f64>) -> SolverResult<f64> {
        let f = self.nlp.objective(x)?;
        let c = self.nlp.constraints(x)?;
        Ok(f + self.lambda.dot(&c) + 0.5 * self.rho * c.norm_squared())
    }

    fn derivatives(&self, x: &DVector<f64>) -> SolverResult<(f64, DVector<f64>, DMatrix<f64>)> {
        let f = self.nlp.objective(x)?;
        let c = self.nlp.constraints(x)?;
        let value = f + self.lambda.dot(&c) + 0.5 * self.rho * c.norm_squared();

        let jac = self.nlp.jacobian(x)?;
        let shifted = self.lambda + self.rho * &c;
        let grad = self.nlp.gradient(x)? + jac.tr_mul(&shifted);

        let mut hess = self.nlp.hessian(x)? + self.rho * jac.tr_mul(&jac);
        // keep the curvature exactly symmetric for the Cholesky factorization
        hess = 0.5 * (&hess + hess.transpose());

        Ok((value, grad, hess))
    }
}

/// Move near-active variables onto their bound. Infinite ends are never
/// snapped to.
fn snap_to_bounds(x: &mut DVector<f64>, lo: &DVector<f64>, hi: &DVector<f64>, tol: f64) {
    for i in 0..x.len() {
        if lo[i].is_finite() && (x[i] - lo[i]).abs() <= tol * lo[i].abs().max(1.0) {
            x[i] = lo[i];
        } else if hi[i].is_finite() && (hi[i] - x[i]).abs() <= tol * hi[i].abs().max(1.0) {
            x[i] = hi[i];
        }
    }
}

fn inf_norm(v: &DVector<f64>) -> f64 {
    v.iter().fold(0.0, |acc, x| acc.max(x.abs()))
}

fn check_len(what: &'static str, expected: usize, actual: usize) -> SolverResult<()> {
    if expected != actual {
        return Err(SolverError::DimensionMismatch {
            what,
            expected,
            actual,
        });
    }
    Ok(())
}

impl NlpSolver for AugLagSolver {
    fn solve(
        &mut self,
        nlp: &dyn Nlp,
        x0: &DVector<f64>,
        multipliers0: Option<&DVector<f64>>,
    ) -> SolverResult<SolverOutput> {
        let cfg = &self.config;
        let start = Instant::now();
        let deadline = cfg
            .max_wall_time_s
            .and_then(|s| Duration::try_from_secs_f64(s).ok())
            .map(|d| start + d);

        let n = nlp.n_vars();
        let m = nlp.n_cons();
        check_len("initial guess", n, x0.len())?;
        check_len("lower bounds", n, nlp.lower_bounds().len())?;
        check_len("upper bounds", n, nlp.upper_bounds().len())?;
        if let Some(l0) = multipliers0 {
            check_len("initial multipliers", m, l0.len())?;
        }

        let lo = nlp.lower_bounds();
        let hi = nlp.upper_bounds();

        let finish = |mut x: DVector<f64>,
                      lambda: Option<DVector<f64>>,
                      status: SolveStatus,
                      violation: f64,
                      iterations: usize|
         -> SolverResult<SolverOutput> {
            if status != SolveStatus::Infeasible || violation.is_finite() {
                snap_to_bounds(&mut x, lo, hi, cfg.bound_snap_tol);
            }
            let objective = nlp.objective(&x).unwrap_or(f64::NAN);
            Ok(SolverOutput {
                x,
                multipliers: lambda,
                status,
                objective,
                constraint_violation: violation,
                iterations,
                elapsed: start.elapsed(),
            })
        };

        if (0..n).any(|i| lo[i].is_nan() || hi[i].is_nan() || lo[i] > hi[i]) {
            warn!("inconsistent variable bounds");
            return finish(x0.clone(), None, SolveStatus::Infeasible, f64::INFINITY, 0);
        }

        let mut x = project(x0, lo, hi);
        let mut lambda = multipliers0.cloned().unwrap_or_else(|| DVector::zeros(m));
        let mut rho = cfg.initial_penalty;
        let mut iterations = 0;

        let c = nlp.constraints(&x)?;
        check_len("constraint vector", m, c.len())?;
        let mut violation = inf_norm(&c);
        if !violation.is_finite() {
            return finish(x, None, SolveStatus::Error, violation, 0);
        }

        let inner_cfg = InnerConfig {
            max_iterations: cfg.max_inner_iterations,
            tolerance: cfg.optimality_tol,
            armijo: cfg.armijo,
            backtrack: cfg.backtrack,
            max_line_search_iters: cfg.max_line_search_iters,
            deadline,
        };

        for outer in 0..cfg.max_outer_iterations {
            let al = AugmentedLagrangian {
                nlp,
                lambda: &lambda,
                rho,
            };
            let inner = minimize_in_box(&al, &mut x, lo, hi, &inner_cfg)?;
            iterations += inner.iterations;

            if inner.status == InnerStatus::NonFinite {
                warn!(outer, "non-finite evaluation in subproblem");
                return finish(x, Some(lambda), SolveStatus::Error, violation, iterations);
            }

            let c = nlp.constraints(&x)?;
            let new_violation = inf_norm(&c);
            if !new_violation.is_finite() {
                return finish(x, Some(lambda), SolveStatus::Error, new_violation, iterations);
            }
            lambda += rho * &c;

            debug!(
                outer,
                rho,
                violation = new_violation,
                projected_gradient = inner.projected_gradient,
                inner_iterations = inner.iterations,
                inner_status = ?inner.status,
                "augmented Lagrangian iteration"
            );

            if new_violation <= cfg.constraint_tol && inner.projected_gradient <= cfg.optimality_tol
            {
                return finish(x, Some(lambda), SolveStatus::Solved, new_violation, iterations);
            }

            if inner.status == InnerStatus::TimedOut
                || deadline.is_some_and(|d| Instant::now() >= d)
            {
                warn!(outer, "wall-clock limit reached");
                return finish(
                    x,
                    Some(lambda),
                    SolveStatus::IterationLimit,
                    new_violation,
                    iterations,
                );
            }

            if new_violation > cfg.constraint_tol
                && new_violation > cfg.violation_decrease * violation
            {
                if rho >= cfg.max_penalty && new_violation > 0.99 * violation {
                    warn!(
                        outer,
                        violation = new_violation,
                        "penalty saturated without reducing constraint violation"
                    );
                    return finish(
                        x,
                        Some(lambda),
                        SolveStatus::Infeasible,
                        new_violation,
                        iterations,
                    );
                }
                rho = (rho * cfg.penalty_growth).min(cfg.max_penalty);
            }
            violation = new_violation;
        }

        warn!(
            max_outer = cfg.max_outer_iterations,
            violation, "outer iteration limit reached"
        );
        finish(
            x,
            Some(lambda),
            SolveStatus::IterationLimit,
            violation,
            iterations,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// min (x0-1)^2 + (x1-2)^2  s.t. x0 + x1 = 1, optional box.
    struct LineProblem {
        lo: DVector<f64>,
        hi: DVector<f64>,
        rhs: f64,
    }

    impl LineProblem {
        fn free(rhs: f64) -> Self {
            Self {
                lo: DVector::from_element(2, f64::NEG_INFINITY),
                hi: DVector::from_element(2, f64::INFINITY),
                rhs,
            }
        }
    }

    impl Nlp for LineProblem {
        fn n_vars(&self) -> usize {
            2
        }
        fn n_cons(&self) -> usize {
            1
        }
        fn lower_bounds(&self) -> &DVector<f64> {
            &self.lo
        }
        fn upper_bounds(&self) -> &DVector<f64> {
            &self.hi
        }
        fn objective(&self, x: &DVector<f64>) -> SolverResult<f64> {
            Ok((x[0] - 1.0).powi(2) + (x[1] - 2.0).powi(2))
        }
        fn constraints(&self, x: &DVector<f64>) -> SolverResult<DVector<f64>> {
            Ok(DVector::from_element(1, x[0] + x[1] - self.rhs))
        }
    }

    #[test]
    fn equality_constrained_quadratic() {
        let mut solver = AugLagSolver::default();
        let out = solver
            .solve(&LineProblem::free(1.0), &DVector::zeros(2), None)
            .unwrap();
        assert_eq!(out.status, SolveStatus::Solved);
        // projection of (1, 2) onto x0 + x1 = 1
        assert!((out.x[0] - 0.0).abs() < 1e-5);
        assert!((out.x[1] - 1.0).abs() < 1e-5);
        assert!(out.x.iter().all(|v| v.is_finite()));
        let lambda = out.multipliers.unwrap();
        assert!((lambda[0] - 2.0).abs() < 1e-3);
    }

    /// min (x-3)^2 with no constraints.
    struct Bowl {
        lo: DVector<f64>,
        hi: DVector<f64>,
    }

    impl Nlp for Bowl {
        fn n_vars(&self) -> usize {
            1
        }
        fn n_cons(&self) -> usize {
            0
        }
        fn lower_bounds(&self) -> &DVector<f64> {
            &self.lo
        }
        fn upper_bounds(&self) -> &DVector<f64> {
            &self.hi
        }
        fn objective(&self, x: &DVector<f64>) -> SolverResult<f64> {
            Ok((x[0] - 3.0).powi(2))
        }
        fn constraints(&self, _: &DVector<f64>) -> SolverResult<DVector<f64>> {
            Ok(DVector::zeros(0))
        }
    }

    #[test]
    fn unbounded_variable_stays_finite() {
        let p = Bowl {
            lo: DVector::from_element(1, f64::NEG_INFINITY),
            hi: DVector::from_element(1, f64::INFINITY),
        };
        let mut solver = AugLagSolver::default();
        let out = solver.solve(&p, &DVector::zeros(1), None).unwrap();
        assert_eq!(out.status, SolveStatus::Solved);
        assert!(out.x[0].is_finite());
        assert!((out.x[0] - 3.0).abs() < 1e-5);

        // re-solving from the previous answer must not drift to an infinite end
        let again = solver.solve(&p, &out.x, None).unwrap();
        assert_eq!(again.status, SolveStatus::Solved);
        assert!((again.x[0] - 3.0).abs() < 1e-5);
    }

    #[test]
    fn half_bounded_variable_snaps_only_to_its_finite_end() {
        let p = Bowl {
            lo: DVector::from_element(1, 5.0),
            hi: DVector::from_element(1, f64::INFINITY),
        };
        let out = AugLagSolver::default()
            .solve(&p, &DVector::from_element(1, 8.0), None)
            .unwrap();
        assert_eq!(out.status, SolveStatus::Solved);
        assert_eq!(out.x[0], 5.0);
    }

    #[test]
    fn wall_time_budget_in_seconds_is_honoured() {
        let cfg = AugLagConfig {
            max_wall_time_s: Some(30.0),
            ..AugLagConfig::default()
        };
        let out = AugLagSolver::new(cfg)
            .solve(&LineProblem::free(1.0), &DVector::zeros(2), None)
            .unwrap();
        assert_eq!(out.status, SolveStatus::Solved);
    }

    #[test]
    fn bounds_bind_exactly() {
        let mut p = LineProblem::free(1.0);
        p.hi[1] = 0.25;
        let mut solver = AugLagSolver::default();
        let out = solver.solve(&p, &DVector::zeros(2), None).unwrap();
        assert_eq!(out.status, SolveStatus::Solved);
        assert_eq!(out.x[1], 0.25);
        assert!((out.x[0] - 0.75).abs() < 1e-6);
    }

    #[test]
    fn unreachable_equality_is_infeasible() {
        let mut p = LineProblem::free(10.0);
        p.lo = DVector::from_element(2, 0.0);
        p.hi = DVector::from_element(2, 1.0);
        let mut solver = AugLagSolver::default();
        let out = solver.solve(&p, &DVector::zeros(2), None).unwrap();
        assert_eq!(out.status, SolveStatus::Infeasible);
        assert!(out.constraint_violation > 7.9);
    }

    #[test]
    fn crossed_bounds_are_infeasible() {
        let mut p = LineProblem::free(1.0);
        p.lo[0] = 2.0;
        p.hi[0] = 1.0;
        let out = AugLagSolver::default()
            .solve(&p, &DVector::zeros(2), None)
            .unwrap();
        assert_eq!(out.status, SolveStatus::Infeasible);
    }

    #[test]
    fn iteration_cap_reported() {
        let cfg = AugLagConfig {
            max_outer_iterations: 1,
            max_inner_iterations: 1,
            ..AugLagConfig::default()
        };
        let out = AugLagSolver::new(cfg)
            .solve(&LineProblem::free(1.0), &DVector::from_element(2, 50.0), None)
            .unwrap();
        assert_eq!(out.status, SolveStatus::IterationLimit);
    }

    #[test]
    fn wrong_guess_length_is_an_error() {
        let err = AugLagSolver::default()
            .solve(&LineProblem::free(1.0), &DVector::zeros(3), None)
            .unwrap_err();
        assert!(matches!(err, SolverError::DimensionMismatch { .. }));
    }
}
