//! Orthogonal collocation on finite elements.
//!
//! One control interval of length `t_step` is split into `finite_elements`
//! equal elements. Inside each element the state is the Lagrange polynomial
//! through the element start `tau_0 = 0` and `degree` collocation points
//! `tau_1 .. tau_d` on the unit interval. The residual at point `j` is
//!
//! ```text
//! sum_r D[j][r] * x_r  -  h * f(x_j)  =  0
//! ```
//!
//! where `D[j][r] = l_r'(tau_j)` and `h` is the element length. The value at
//! the end of the element is `sum_r e[r] * x_r` with `e[r] = l_r(1)`.

use crate::error::{NlpError, NlpResult};
use nalgebra::{DMatrix, DVector};
use rmpc_core::Real;
use rmpc_solver::jacobian::{JACOBIAN_EPS, finite_difference_jacobian};
use rmpc_solver::{NewtonConfig, SolverError, newton_solve};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Highest supported polynomial degree.
pub const MAX_DEGREE: usize = 9;

const ROOT_SCAN_POINTS_PER_DEGREE: usize = 400;
const BISECTION_ITERS: usize = 200;

/// Collocation point family.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollocationFamily {
    /// Radau IIA points. The last point coincides with the element end.
    #[default]
    Radau,
    /// Gauss-Legendre points, all strictly inside the element.
    Legendre,
}

/// Discretization settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollocationSettings {
    pub degree: usize,
    pub family: CollocationFamily,
    pub finite_elements: usize,
}

impl Default for CollocationSettings {
    fn default() -> Self {
        Self {
            degree: 2,
            family: CollocationFamily::Radau,
            finite_elements: 1,
        }
    }
}

impl CollocationSettings {
    pub fn validate(&self) -> NlpResult<()> {
        if self.degree == 0 || self.degree > MAX_DEGREE {
            return Err(NlpError::InvalidDiscretization {
                what: format!(
                    "collocation degree {} outside 1..={MAX_DEGREE}",
                    self.degree
                ),
            });
        }
        if self.finite_elements == 0 {
            return Err(NlpError::InvalidDiscretization {
                what: "at least one finite element per interval is required".to_string(),
            });
        }
        Ok(())
    }
}

/// Precomputed collocation tables for one settings value.
#[derive(Clone, Debug, PartialEq)]
pub struct Collocation {
    settings: CollocationSettings,
    /// `[0, tau_1, .., tau_d]`
    tau: Vec<Real>,
    /// `(d+1) x (d+1)`, row = evaluation point, column = basis polynomial.
    diff: DMatrix<Real>,
    /// `l_r(1)` for every basis polynomial.
    end: Vec<Real>,
}

/// States at every collocation node of one integrated interval.
#[derive(Clone, Debug, PartialEq)]
pub struct IntervalSolution {
    /// Per element: the start state followed by the `degree` collocation
    /// states.
    pub elements: Vec<Vec<Vec<Real>>>,
    /// State at the end of the interval.
    pub end: Vec<Real>,
}

impl Collocation {
    pub fn new(settings: CollocationSettings) -> NlpResult<Self> {
        settings.validate()?;
        let mut tau = vec![0.0];
        tau.extend(collocation_points(settings.degree, settings.family)?);

        let weights = barycentric_weights(&tau);
        let n = tau.len();
        let mut diff = DMatrix::zeros(n, n);
        for j in 0..n {
            let mut diag = 0.0;
            for r in 0..n {
                if r != j {
                    let v = (weights[r] / weights[j]) / (tau[j] - tau[r]);
                    diff[(j, r)] = v;
                    diag -= v;
                }
            }
            diff[(j, j)] = diag;
        }

        let end = (0..n)
            .map(|r| {
                (0..n)
                    .filter(|&m| m != r)
                    .map(|m| (1.0 - tau[m]) / (tau[r] - tau[m]))
                    .product()
            })
            .collect();

        Ok(Self {
            settings,
            tau,
            diff,
            end,
        })
    }

    pub fn settings(&self) -> CollocationSettings {
        self.settings
    }

    pub fn degree(&self) -> usize {
        self.settings.degree
    }

    pub fn finite_elements(&self) -> usize {
        self.settings.finite_elements
    }

    /// `[0, tau_1, .., tau_d]` on the unit interval.
    pub fn points(&self) -> &[Real] {
        &self.tau
    }

    pub fn differentiation_matrix(&self) -> &DMatrix<Real> {
        &self.diff
    }

    pub fn continuity_coefficients(&self) -> &[Real] {
        &self.end
    }

    /// Collocation residuals of one element.
    ///
    /// `colloc` holds the `degree` collocation states back to back and
    /// `out` receives `degree * n_x` residuals in the same layout.
    pub fn element_residuals<F>(
        &self,
        start: &[Real],
        colloc: &[Real],
        h: Real,
        mut rhs: F,
        out: &mut [Real],
    ) -> NlpResult<()>
    where
        F: FnMut(&[Real]) -> NlpResult<Vec<Real>>,
    {
        let n_x = start.len();
        let d = self.degree();
        check_len("collocation states", d * n_x, colloc.len())?;
        check_len("collocation residuals", d * n_x, out.len())?;

        let nodes: Vec<&[Real]> = std::iter::once(start)
            .chain(colloc.chunks(n_x.max(1)))
            .collect();

        for j in 1..=d {
            let f = rhs(nodes[j])?;
            check_len("right-hand side", n_x, f.len())?;
            let row = &mut out[(j - 1) * n_x..j * n_x];
            for (i, slot) in row.iter_mut().enumerate() {
                let mut acc = -h * f[i];
                for (r, xr) in nodes.iter().enumerate() {
                    acc += self.diff[(j, r)] * xr[i];
                }
                *slot = acc;
            }
        }
        Ok(())
    }

    /// State at the end of an element.
    pub fn element_end(&self, start: &[Real], colloc: &[Real]) -> Vec<Real> {
        let n_x = start.len();
        let mut out: Vec<Real> = start.iter().map(|v| v * self.end[0]).collect();
        for (r, chunk) in colloc.chunks(n_x.max(1)).enumerate() {
            for (slot, v) in out.iter_mut().zip(chunk) {
                *slot += self.end[r + 1] * v;
            }
        }
        out
    }

    /// Integrate `dx/dt = rhs(x)` over one interval of length `t_step` by
    /// solving the collocation equations element by element.
    pub fn integrate_interval<F>(
        &self,
        rhs: F,
        x0: &[Real],
        t_step: Real,
    ) -> NlpResult<IntervalSolution>
    where
        F: Fn(&[Real]) -> NlpResult<Vec<Real>>,
    {
        if !(t_step.is_finite() && t_step > 0.0) {
            return Err(NlpError::InvalidDiscretization {
                what: format!("interval length must be positive, got {t_step}"),
            });
        }
        let n_x = x0.len();
        let d = self.degree();
        let h = t_step / self.finite_elements() as Real;
        let config = NewtonConfig::default();

        let mut start = x0.to_vec();
        let mut elements = Vec::with_capacity(self.finite_elements());

        for e in 0..self.finite_elements() {
            let guess = DVector::from_iterator(d * n_x, start.iter().copied().cycle().take(d * n_x));
            let residual = |z: &DVector<Real>| -> Result<DVector<Real>, SolverError> {
                let mut out = vec![0.0; d * n_x];
                self.element_residuals(&start, z.as_slice(), h, &rhs, &mut out)?;
                Ok(DVector::from_vec(out))
            };
            let jacobian =
                |z: &DVector<Real>| finite_difference_jacobian(z, &residual, JACOBIAN_EPS);
            let result = newton_solve(guess, &residual, jacobian, &config)?;
            if !result.converged {
                return Err(NlpError::Solver(SolverError::ConvergenceFailed {
                    what: format!(
                        "collocation element {e} residual {:.3e} after {} iterations",
                        result.residual_norm, result.iterations
                    ),
                }));
            }
            trace!(element = e, iterations = result.iterations, "element integrated");

            let colloc = result.x.as_slice();
            let mut nodes = vec![start.clone()];
            nodes.extend(colloc.chunks(n_x.max(1)).map(<[Real]>::to_vec));
            let next = self.element_end(&start, colloc);
            elements.push(nodes);
            start = next;
        }

        Ok(IntervalSolution {
            elements,
            end: start,
        })
    }
}

fn check_len(what: &'static str, expected: usize, actual: usize) -> NlpResult<()> {
    if expected != actual {
        return Err(NlpError::DimensionMismatch {
            what,
            expected,
            actual,
        });
    }
    Ok(())
}

fn barycentric_weights(nodes: &[Real]) -> Vec<Real> {
    nodes
        .iter()
        .enumerate()
        .map(|(r, &tr)| {
            let prod: Real = nodes
                .iter()
                .enumerate()
                .filter(|&(m, _)| m != r)
                .map(|(_, &tm)| tr - tm)
                .product();
            1.0 / prod
        })
        .collect()
}

/// `(P_n(x), P_{n-1}(x))` by the three-term recurrence.
fn legendre(n: usize, x: Real) -> (Real, Real) {
    let mut prev = 1.0;
    if n == 0 {
        return (prev, 0.0);
    }
    let mut cur = x;
    for k in 1..n {
        let k = k as Real;
        let next = ((2.0 * k + 1.0) * x * cur - k * prev) / (k + 1.0);
        prev = cur;
        cur = next;
    }
    (cur, prev)
}

/// Collocation points on `(0, 1]`, ascending.
///
/// Legendre: roots of `P_d`. Radau IIA: roots of `P_d - P_{d-1}` (which
/// include `x = 1`), mapped from `[-1, 1]`.
pub fn collocation_points(degree: usize, family: CollocationFamily) -> NlpResult<Vec<Real>> {
    if degree == 0 || degree > MAX_DEGREE {
        return Err(NlpError::InvalidDiscretization {
            what: format!("collocation degree {degree} outside 1..={MAX_DEGREE}"),
        });
    }
    let poly = |x: Real| -> Real {
        let (pd, pd1) = legendre(degree, x);
        match family {
            CollocationFamily::Legendre => pd,
            CollocationFamily::Radau => pd - pd1,
        }
    };
    let expected_interior = match family {
        CollocationFamily::Legendre => degree,
        CollocationFamily::Radau => degree - 1,
    };

    let samples = ROOT_SCAN_POINTS_PER_DEGREE * degree;
    let grid = |i: usize| -1.0 + 2.0 * i as Real / samples as Real;
    let mut roots = Vec::with_capacity(degree);
    // scan the open interval; x = 1 is added explicitly for Radau
    let mut i = 0;
    while i + 1 < samples {
        let (a, b) = (grid(i), grid(i + 1));
        let (fa, fb) = (poly(a), poly(b));
        if fa == 0.0 {
            if i > 0 {
                roots.push(a);
            }
            i += 1;
            continue;
        }
        if fa * fb < 0.0 {
            roots.push(bisect(&poly, a, b, fa));
        }
        i += 1;
    }

    if roots.len() != expected_interior {
        return Err(NlpError::InvalidDiscretization {
            what: format!(
                "found {} collocation roots for degree {degree}, expected {expected_interior}",
                roots.len()
            ),
        });
    }
    if family == CollocationFamily::Radau {
        roots.push(1.0);
    }
    Ok(roots.into_iter().map(|x| 0.5 * (x + 1.0)).collect())
}

fn bisect<F: Fn(Real) -> Real>(f: &F, mut a: Real, mut b: Real, mut fa: Real) -> Real {
    for _ in 0..BISECTION_ITERS {
        let m = 0.5 * (a + b);
        let fm = f(m);
        if fm == 0.0 || (b - a) < 4.0 * Real::EPSILON {
            return m;
        }
        if fa * fm < 0.0 {
            b = m;
        } else {
            a = m;
            fa = fm;
        }
    }
    0.5 * (a + b)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(degree: usize, family: CollocationFamily, finite_elements: usize) -> CollocationSettings {
        CollocationSettings {
            degree,
            family,
            finite_elements,
        }
    }

    #[test]
    fn radau_three_points_match_tables() {
        let tau = collocation_points(3, CollocationFamily::Radau).unwrap();
        let expected = [0.155_051_025_721_682_2, 0.644_948_974_278_317_8, 1.0];
        for (a, b) in tau.iter().zip(expected) {
            assert!((a - b).abs() < 1e-12, "{a} vs {b}");
        }
    }

    #[test]
    fn legendre_three_points_match_tables() {
        let tau = collocation_points(3, CollocationFamily::Legendre).unwrap();
        let expected = [0.112_701_665_379_258_3, 0.5, 0.887_298_334_620_741_7];
        for (a, b) in tau.iter().zip(expected) {
            assert!((a - b).abs() < 1e-12, "{a} vs {b}");
        }
    }

    #[test]
    fn every_supported_degree_has_its_roots() {
        for degree in 1..=MAX_DEGREE {
            for family in [CollocationFamily::Radau, CollocationFamily::Legendre] {
                let tau = collocation_points(degree, family).unwrap();
                assert_eq!(tau.len(), degree);
                assert!(tau.windows(2).all(|w| w[0] < w[1]));
                assert!(tau[0] > 0.0 && tau[degree - 1] <= 1.0);
            }
        }
        assert_eq!(collocation_points(1, CollocationFamily::Radau).unwrap(), vec![1.0]);
        assert_eq!(
            collocation_points(1, CollocationFamily::Legendre).unwrap(),
            vec![0.5]
        );
    }

    #[test]
    fn invalid_discretization_rejected() {
        for bad in [
            settings(0, CollocationFamily::Radau, 1),
            settings(MAX_DEGREE + 1, CollocationFamily::Legendre, 1),
            settings(3, CollocationFamily::Radau, 0),
        ] {
            assert!(matches!(
                Collocation::new(bad),
                Err(NlpError::InvalidDiscretization { .. })
            ));
        }
    }

    #[test]
    fn differentiation_matrix_is_exact_for_polynomials() {
        let c = Collocation::new(settings(3, CollocationFamily::Radau, 1)).unwrap();
        let tau = c.points();
        // p(t) = t^3 - 2t, p'(t) = 3t^2 - 2
        let values = DVector::from_iterator(tau.len(), tau.iter().map(|t| t.powi(3) - 2.0 * t));
        let deriv = c.differentiation_matrix() * values;
        for (j, t) in tau.iter().enumerate() {
            assert!((deriv[j] - (3.0 * t * t - 2.0)).abs() < 1e-10);
        }
        // rows annihilate constants
        for j in 0..tau.len() {
            let s: Real = c.differentiation_matrix().row(j).iter().sum();
            assert!(s.abs() < 1e-12);
        }
    }

    #[test]
    fn radau_end_weight_selects_last_point() {
        let c = Collocation::new(settings(3, CollocationFamily::Radau, 1)).unwrap();
        let e = c.continuity_coefficients();
        assert!((e[3] - 1.0).abs() < 1e-12);
        assert!(e[..3].iter().all(|v| v.abs() < 1e-12));
    }

    #[test]
    fn steady_state_round_trip() {
        let c = Collocation::new(settings(3, CollocationFamily::Radau, 2)).unwrap();
        let x0 = [1.5, -0.25];
        let sol = c
            .integrate_interval(|x| Ok(vec![0.0; x.len()]), &x0, 0.7)
            .unwrap();
        assert_eq!(sol.elements.len(), 2);
        for element in &sol.elements {
            assert_eq!(element.len(), 4);
            for node in element {
                for (a, b) in node.iter().zip(&x0) {
                    assert!((a - b).abs() < 1e-12);
                }
            }
        }
        for (a, b) in sol.end.iter().zip(&x0) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn decay_is_integrated_accurately() {
        for family in [CollocationFamily::Radau, CollocationFamily::Legendre] {
            let c = Collocation::new(settings(3, family, 2)).unwrap();
            let sol = c.integrate_interval(|x| Ok(vec![-x[0]]), &[1.0], 1.0).unwrap();
            assert!(
                (sol.end[0] - (-1.0_f64).exp()).abs() < 1e-5,
                "{family:?}: {}",
                sol.end[0]
            );
        }
    }

    #[test]
    fn non_positive_interval_rejected() {
        let c = Collocation::new(CollocationSettings::default()).unwrap();
        assert!(c.integrate_interval(|x| Ok(x.to_vec()), &[1.0], 0.0).is_err());
    }
}
