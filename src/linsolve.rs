//! Linear solvers for the augmented mixed system.
//!
//! The system is symmetric but indefinite,
//! so the choices are a sparse LU factorization (the default),
//! a dense LU factorization as a fallback for small systems,
//! and the MINRES iteration of Paige & Saunders (1975),
//! which only needs matrix-vector products.

use nalgebra as na;
use nalgebra_sparse as nas;

use std::str::FromStr;

use crate::element::ConfigError;

/// Largest relative residual accepted from a direct solve.
const DIRECT_RESIDUAL_TOLERANCE: f64 = 1e-8;

/// Error in solving a linear system.
///
/// A solve never silently returns a degenerate solution;
/// every way it can go wrong is reported here.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum LinearSolveError {
    /// The matrix is singular to working precision.
    #[error("Matrix is singular to working precision (pivot {pivot:e} at row {row})")]
    Singular {
        /// Row of the smallest pivot.
        row: usize,
        /// Value of the smallest pivot relative to the largest.
        pivot: f64,
    },
    /// The solution doesn't satisfy the system to the expected accuracy.
    #[error("Solution has relative residual {0:e}")]
    Inaccurate(f64),
    /// An iterative solver ran out of iterations.
    #[error("Solver did not converge in {iterations} iterations (relative residual {residual:e})")]
    NotConverged {
        /// Iterations performed.
        iterations: usize,
        /// Relative residual estimate at the end.
        residual: f64,
    },
    /// The system couldn't be set up or factorized at all.
    #[error("Factorization failed: {0}")]
    Factorization(String),
}

/// Parameters of the MINRES solver.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MinresConfig {
    /// Stop when the residual norm falls below this times the norm of the right-hand side.
    pub rel_tol: f64,
    /// Iteration limit, `5 n` if not given.
    pub max_iter: Option<usize>,
}

impl Default for MinresConfig {
    fn default() -> Self {
        Self {
            rel_tol: 1e-10,
            max_iter: None,
        }
    }
}

/// Choice of linear solver.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LinearSolver {
    /// Sparse LU factorization with fill-reducing ordering.
    #[default]
    SparseLu,
    /// Dense LU factorization with partial pivoting.
    /// Robust but `O(n³)`, so only suitable for small meshes.
    DenseLu,
    /// MINRES iteration for symmetric systems.
    Minres(MinresConfig),
}

impl FromStr for LinearSolver {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lu" | "sparse-lu" => Ok(Self::SparseLu),
            "dense-lu" => Ok(Self::DenseLu),
            "minres" => Ok(Self::Minres(MinresConfig::default())),
            _ => Err(ConfigError::UnknownLinearSolver(s.to_string())),
        }
    }
}

impl LinearSolver {
    /// Solve `A x = b`.
    pub fn solve(
        &self,
        matrix: &nas::CsrMatrix<f64>,
        rhs: &na::DVector<f64>,
    ) -> Result<na::DVector<f64>, LinearSolveError> {
        if matrix.nrows() != matrix.ncols() || matrix.nrows() != rhs.len() {
            return Err(LinearSolveError::Factorization(format!(
                "cannot solve a {}x{} system with a right-hand side of length {}",
                matrix.nrows(),
                matrix.ncols(),
                rhs.len()
            )));
        }
        if matrix.values().iter().chain(rhs.iter()).any(|v| !v.is_finite()) {
            return Err(LinearSolveError::Factorization(
                "system has non-finite entries".to_string(),
            ));
        }
        match self {
            Self::SparseLu => sparse_lu(matrix, rhs),
            Self::DenseLu => dense_lu(matrix, rhs),
            Self::Minres(config) => minres(matrix, rhs, config),
        }
    }
}

fn relative_residual(
    matrix: &nas::CsrMatrix<f64>,
    x: &na::DVector<f64>,
    rhs: &na::DVector<f64>,
) -> f64 {
    let residual = (matrix * x - rhs).norm();
    let rhs_norm = rhs.norm();
    if rhs_norm > 0.0 {
        residual / rhs_norm
    } else {
        residual
    }
}

fn sparse_lu(
    matrix: &nas::CsrMatrix<f64>,
    rhs: &na::DVector<f64>,
) -> Result<na::DVector<f64>, LinearSolveError> {
    use faer::prelude::Solve;
    use faer::sparse::{linalg::LuError, SparseColMat, Triplet};

    let n = matrix.nrows();
    let triplets: Vec<Triplet<usize, usize, f64>> = matrix
        .triplet_iter()
        .map(|(row, col, val)| Triplet::new(row, col, *val))
        .collect();
    let faer_matrix = SparseColMat::<usize, f64>::try_new_from_triplets(n, n, &triplets)
        .map_err(|e| LinearSolveError::Factorization(format!("{e:?}")))?;
    let lu = faer_matrix.as_ref().sp_lu().map_err(|e| match e {
        LuError::SymbolicSingular { index } => LinearSolveError::Singular {
            row: index,
            pivot: 0.0,
        },
        other => LinearSolveError::Factorization(format!("{other:?}")),
    })?;

    let b = faer::Mat::from_fn(n, 1, |i, _| rhs[i]);
    let solution = lu.solve(&b);
    let x = na::DVector::from_fn(n, |i, _| solution[(i, 0)]);
    // a numerically zero pivot shows up as infinities in the solution
    if let Some(row) = x.iter().position(|v| !v.is_finite()) {
        return Err(LinearSolveError::Singular { row, pivot: 0.0 });
    }

    let residual = relative_residual(matrix, &x, rhs);
    log::debug!(
        "Sparse LU solve of {n} unknowns with {} nonzeros: relative residual {residual:e}",
        matrix.nnz()
    );
    if !(residual <= DIRECT_RESIDUAL_TOLERANCE) {
        return Err(LinearSolveError::Inaccurate(residual));
    }
    Ok(x)
}

fn dense_lu(
    matrix: &nas::CsrMatrix<f64>,
    rhs: &na::DVector<f64>,
) -> Result<na::DVector<f64>, LinearSolveError> {
    let n = matrix.nrows();
    let lu = na::DMatrix::from(matrix).lu();

    let u = lu.u();
    let pivots = u.diagonal().map(f64::abs);
    let largest = pivots.max();
    let (row, smallest) = pivots.argmin();
    let pivot = if largest > 0.0 { smallest / largest } else { 0.0 };
    if pivot < n as f64 * f64::EPSILON {
        return Err(LinearSolveError::Singular { row, pivot });
    }

    let x = lu
        .solve(rhs)
        .ok_or(LinearSolveError::Singular { row, pivot })?;
    let residual = relative_residual(matrix, &x, rhs);
    log::debug!(
        "LU solve of {n} unknowns: smallest relative pivot {pivot:e}, relative residual {residual:e}"
    );
    if !(residual <= DIRECT_RESIDUAL_TOLERANCE) {
        return Err(LinearSolveError::Inaccurate(residual));
    }
    Ok(x)
}

/// Unpreconditioned MINRES, following the recurrences of
/// Paige & Saunders (1975). Solution of sparse indefinite systems of linear equations.
fn minres(
    matrix: &nas::CsrMatrix<f64>,
    rhs: &na::DVector<f64>,
    config: &MinresConfig,
) -> Result<na::DVector<f64>, LinearSolveError> {
    let n = rhs.len();
    let max_iter = config.max_iter.unwrap_or(5 * n);
    let mut x = na::DVector::zeros(n);

    let beta1 = rhs.norm();
    if beta1 == 0.0 {
        return Ok(x);
    }

    // Lanczos vectors
    let mut r1 = rhs.clone();
    let mut r2 = rhs.clone();
    let mut y = rhs.clone();
    let mut beta = beta1;
    let mut old_beta = 0.0;

    // QR factorization of the tridiagonal Lanczos matrix
    let mut cs = -1.0;
    let mut sn = 0.0;
    let mut dbar = 0.0;
    let mut epsln = 0.0;
    let mut phibar = beta1;

    // search directions
    let mut w = na::DVector::zeros(n);
    let mut w2 = na::DVector::zeros(n);

    let mut iterations = 0;
    while iterations < max_iter {
        iterations += 1;

        let v = &y / beta;
        y = matrix * &v;
        if iterations >= 2 {
            y.axpy(-beta / old_beta, &r1, 1.0);
        }
        let alpha = v.dot(&y);
        y.axpy(-alpha / beta, &r2, 1.0);
        r1 = std::mem::replace(&mut r2, y.clone());
        old_beta = beta;
        beta = r2.norm();

        // apply the previous rotation and compute the next one
        let old_epsln = epsln;
        let delta = cs * dbar + sn * alpha;
        let gbar = sn * dbar - cs * alpha;
        epsln = sn * beta;
        dbar = -cs * beta;
        let gamma = f64::hypot(gbar, beta).max(f64::EPSILON);
        cs = gbar / gamma;
        sn = beta / gamma;
        let phi = cs * phibar;
        phibar *= sn;

        let w1 = std::mem::replace(&mut w2, w);
        w = (&v - old_epsln * &w1 - delta * &w2) / gamma;
        x.axpy(phi, &w, 1.0);

        let residual = phibar.abs() / beta1;
        log::trace!("MINRES iteration {iterations}: residual estimate {residual:e}");
        if residual <= config.rel_tol {
            log::debug!("MINRES converged in {iterations} iterations");
            return Ok(x);
        }
        if !residual.is_finite() {
            return Err(LinearSolveError::Factorization(
                "MINRES produced non-finite values".to_string(),
            ));
        }
        if beta == 0.0 {
            // the Krylov space is invariant, so the estimate won't improve
            break;
        }
    }

    Err(LinearSolveError::NotConverged {
        iterations,
        residual: phibar.abs() / beta1,
    })
}
