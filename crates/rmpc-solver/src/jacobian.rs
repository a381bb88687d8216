//! Finite difference derivatives.

use crate::error::SolverResult;
use nalgebra::{DMatrix, DVector};

/// Default relative step for forward-difference Jacobians.
pub const JACOBIAN_EPS: f64 = 1e-7;
/// Default relative step for central-difference gradients.
pub const GRADIENT_EPS: f64 = 1e-6;
/// Default relative step for second differences.
pub const HESSIAN_EPS: f64 = 1e-4;

fn step(x: f64, epsilon: f64) -> f64 {
    epsilon * x.abs().max(1.0)
}

/// Compute Jacobian using forward finite differences.
///
/// For each column j, perturbs x[j] by epsilon and computes (f(x+e) - f(x))/epsilon.
pub fn finite_difference_jacobian<F>(
    x: &DVector<f64>,
    f: F,
    epsilon: f64,
) -> SolverResult<DMatrix<f64>>
where
    F: Fn(&DVector<f64>) -> SolverResult<DVector<f64>>,
{
    let n = x.len();
    let f_x = f(x)?;
    let m = f_x.len();

    let mut jac = DMatrix::zeros(m, n);
    let mut x_perturbed = x.clone();

    for j in 0..n {
        let dx = step(x[j], epsilon);
        x_perturbed[j] = x[j] + dx;

        let f_perturbed = f(&x_perturbed)?;
        jac.set_column(j, &((f_perturbed - &f_x) / dx));

        x_perturbed[j] = x[j];
    }

    Ok(jac)
}

/// Compute Jacobian using central finite differences (more accurate but 2x cost).
pub fn central_difference_jacobian<F>(
    x: &DVector<f64>,
    f: F,
    epsilon: f64,
) -> SolverResult<DMatrix<f64>>
where
    F: Fn(&DVector<f64>) -> SolverResult<DVector<f64>>,
{
    let n = x.len();
    let m = f(x)?.len();

    let mut jac = DMatrix::zeros(m, n);
    let mut xp = x.clone();

    for j in 0..n {
        let dx = step(x[j], epsilon);

        xp[j] = x[j] + dx;
        let f_plus = f(&xp)?;
        xp[j] = x[j] - dx;
        let f_minus = f(&xp)?;
        xp[j] = x[j];

        jac.set_column(j, &((f_plus - f_minus) / (2.0 * dx)));
    }

    Ok(jac)
}

/// Gradient of a scalar function by central differences.
pub fn central_difference_gradient<F>(
    x: &DVector<f64>,
    f: F,
    epsilon: f64,
) -> SolverResult<DVector<f64>>
where
    F: Fn(&DVector<f64>) -> SolverResult<f64>,
{
    let n = x.len();
    let mut grad = DVector::zeros(n);
    let mut xp = x.clone();

    for j in 0..n {
        let dx = step(x[j], epsilon);
        xp[j] = x[j] + dx;
        let f_plus = f(&xp)?;
        xp[j] = x[j] - dx;
        let f_minus = f(&xp)?;
        xp[j] = x[j];
        grad[j] = (f_plus - f_minus) / (2.0 * dx);
    }

    Ok(grad)
}

/// Symmetric Hessian of a scalar function by second differences.
pub fn finite_difference_hessian<F>(
    x: &DVector<f64>,
    f: F,
    epsilon: f64,
) -> SolverResult<DMatrix<f64>>
where
    F: Fn(&DVector<f64>) -> SolverResult<f64>,
{
    let n = x.len();
    let f0 = f(x)?;
    let h: Vec<f64> = x.iter().map(|&xi| step(xi, epsilon)).collect();
    let mut hess = DMatrix::zeros(n, n);
    let mut xp = x.clone();

    for i in 0..n {
        xp[i] = x[i] + h[i];
        let f_plus = f(&xp)?;
        xp[i] = x[i] - h[i];
        let f_minus = f(&xp)?;
        xp[i] = x[i];
        hess[(i, i)] = (f_plus - 2.0 * f0 + f_minus) / (h[i] * h[i]);

        for j in (i + 1)..n {
            let mut corner = |si: f64, sj: f64| -> SolverResult<f64> {
                xp[i] = x[i] + si * h[i];
                xp[j] = x[j] + sj * h[j];
                let v = f(&xp)?;
                xp[i] = x[i];
                xp[j] = x[j];
                Ok(v)
            };
            let fpp = corner(1.0, 1.0)?;
            let fpm = corner(1.0, -1.0)?;
            let fmp = corner(-1.0, 1.0)?;
            let fmm = corner(-1.0, -1.0)?;
            let v = (fpp - fpm - fmp + fmm) / (4.0 * h[i] * h[j]);
            hess[(i, j)] = v;
            hess[(j, i)] = v;
        }
    }

    Ok(hess)
}
