//! Long-only, capped, fully invested mean-variance QP.
//!
//! `max mu'w - lambda * w'Sw` is handed to clarabel in its standard form
//! `min 1/2 w'Pw + q'w` subject to `Aw + s = b`, `s` in a product cone:
//!
//! ```text
//! P = 2 * lambda * S (upper triangle)     q = -mu
//! A = [ 1' ]   b = [ 1   ]   ZeroCone(1)          sum(w) = 1
//!     [ -I ]       [ 0   ]   NonnegativeCone(2n)  w >= 0
//!     [  I ]       [ cap ]                        w <= cap
//! ```

use super::SolverSettings;
use clarabel::algebra::CscMatrix;
use ndarray::{Array1, Array2};
use thiserror::Error;

#[derive(Debug, Error)]
pub(crate) enum QpError {
    #[error("expected returns or covariance contain non-finite values")]
    NonFiniteInput,
    #[error("invalid solver settings: {0}")]
    Settings(String),
    #[error("solver setup failed: {0}")]
    Setup(String),
    #[error("solver stopped with status {0}")]
    Status(String),
}

/// Solve the QP. The caller guarantees `mean.len() * cap >= 1`.
pub(crate) fn solve(
    mean: &Array1<f64>,
    covariance: &Array2<f64>,
    risk_aversion: f64,
    cap: f64,
    settings: &SolverSettings,
) -> Result<Array1<f64>, QpError> {
    use clarabel::solver::*;

    if mean.iter().chain(covariance.iter()).any(|v| !v.is_finite()) {
        return Err(QpError::NonFiniteInput);
    }

    let n = mean.len();
    let p = quadratic_term(covariance, 2.0 * risk_aversion);
    let q: Vec<f64> = mean.iter().map(|m| -m).collect();
    let a = constraint_matrix(n);

    let mut b = Vec::with_capacity(1 + 2 * n);
    b.push(1.0);
    b.extend(std::iter::repeat_n(0.0, n));
    b.extend(std::iter::repeat_n(cap, n));

    let cones: [SupportedConeT<f64>; 2] = [ZeroConeT(1), NonnegativeConeT(2 * n)];

    let solver_settings = DefaultSettingsBuilder::default()
        .max_iter(settings.max_iterations)
        .tol_gap_abs(settings.tolerance)
        .tol_gap_rel(settings.tolerance)
        .tol_feas(settings.tolerance)
        .verbose(false)
        .build()
        .map_err(|e| QpError::Settings(e.to_string()))?;

    let mut solver = DefaultSolver::new(&p, &q, &a, &b, &cones, solver_settings)
        .map_err(|e| QpError::Setup(format!("{e:?}")))?;
    solver.solve();

    match solver.solution.status {
        SolverStatus::Solved | SolverStatus::AlmostSolved => {}
        status => return Err(QpError::Status(format!("{status:?}"))),
    }

    let weights = Array1::from(solver.solution.x.clone());
    if weights.iter().any(|w| !w.is_finite()) {
        return Err(QpError::Status("non-finite solution".to_string()));
    }
    Ok(weights)
}

/// Upper triangle of `scale * covariance` in column-major CSC form.
fn quadratic_term(covariance: &Array2<f64>, scale: f64) -> CscMatrix<f64> {
    let n = covariance.nrows();
    let mut colptr = Vec::with_capacity(n + 1);
    let mut rowval = Vec::new();
    let mut nzval = Vec::new();

    colptr.push(0);
    for j in 0..n {
        for i in 0..=j {
            let value = scale * covariance[[i, j]];
            if value != 0.0 {
                rowval.push(i);
                nzval.push(value);
            }
        }
        colptr.push(nzval.len());
    }
    CscMatrix::new(n, n, colptr, rowval, nzval)
}

/// `[1'; -I; I]` in CSC form: three entries per column.
fn constraint_matrix(n: usize) -> CscMatrix<f64> {
    let mut colptr = Vec::with_capacity(n + 1);
    let mut rowval = Vec::with_capacity(3 * n);
    let mut nzval = Vec::with_capacity(3 * n);

    colptr.push(0);
    for j in 0..n {
        rowval.extend([0, 1 + j, 1 + n + j]);
        nzval.extend([1.0, -1.0, 1.0]);
        colptr.push(nzval.len());
    }
    CscMatrix::new(1 + 2 * n, n, colptr, rowval, nzval)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_quadratic_term_keeps_upper_triangle() {
        let cov = array![[0.04, 0.01], [0.01, 0.09]];
        let p = quadratic_term(&cov, 2.0);
        assert_eq!(p.colptr, vec![0, 1, 3]);
        assert_eq!(p.rowval, vec![0, 0, 1]);
        assert_relative_eq!(p.nzval[0], 0.08);
        assert_relative_eq!(p.nzval[1], 0.02);
        assert_relative_eq!(p.nzval[2], 0.18);
    }

    #[test]
    fn test_constraint_matrix_layout() {
        let a = constraint_matrix(2);
        assert_eq!((a.m, a.n), (5, 2));
        assert_eq!(a.colptr, vec![0, 3, 6]);
        assert_eq!(a.rowval, vec![0, 1, 3, 0, 2, 4]);
    }

    #[test]
    fn test_fills_highest_means_when_linear() {
        let mean = array![0.01, 0.03, 0.02, 0.04];
        let cov = Array2::zeros((4, 4));
        let w = solve(&mean, &cov, 0.0, 0.4, &SolverSettings::default()).unwrap();
        assert_relative_eq!(w[3], 0.4, epsilon = 1e-6);
        assert_relative_eq!(w[1], 0.4, epsilon = 1e-6);
        assert_relative_eq!(w[2], 0.2, epsilon = 1e-6);
        assert_relative_eq!(w[0], 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_two_asset_closed_form() {
        let mean = array![0.02, 0.01];
        let cov = array![[0.01, 0.0], [0.0, 0.01]];
        let w = solve(&mean, &cov, 1.0, 1.0, &SolverSettings::default()).unwrap();
        // Stationarity: 2 * 0.01 * w1 - 0.02 = 2 * 0.01 * w2 - 0.01
        assert_relative_eq!(w[0] - w[1], 0.5, epsilon = 1e-6);
        assert_relative_eq!(w.sum(), 1.0, epsilon = 1e-7);
    }

    #[test]
    fn test_cap_binds() {
        let mean = array![0.10, 0.01, 0.01];
        let cov = Array2::eye(3) * 0.01;
        let w = solve(&mean, &cov, 0.5, 0.5, &SolverSettings::default()).unwrap();
        assert_relative_eq!(w[0], 0.5, epsilon = 1e-6);
        assert_relative_eq!(w[1], 0.25, epsilon = 1e-6);
        assert_relative_eq!(w[2], 0.25, epsilon = 1e-6);
    }

    #[test]
    fn test_rejects_non_finite_input() {
        let mean = array![0.01, f64::NAN];
        let cov = Array2::eye(2);
        assert!(matches!(
            solve(&mean, &cov, 1.0, 1.0, &SolverSettings::default()),
            Err(QpError::NonFiniteInput)
        ));
    }

    #[test]
    fn test_reports_iteration_limit() {
        let mean = array![0.05, 0.01, 0.02];
        let cov = array![[0.04, 0.01, 0.0], [0.01, 0.02, 0.0], [0.0, 0.0, 0.03]];
        let settings = SolverSettings {
            max_iterations: 1,
            ..SolverSettings::default()
        };
        assert!(matches!(
            solve(&mean, &cov, 3.0, 1.0, &settings),
            Err(QpError::Status(_))
        ));
    }
}
