//! Shift-invert Lanczos iteration on the normal operator.
//!
//! The null vectors of `A` are the eigenvectors of `AᵀA` with eigenvalue zero,
//! which become the largest eigenvalues `1 / (0 - σ)` of `(AᵀA - σI)⁻¹`
//! for a negative shift `σ`. The shifted normal operator is symmetric positive definite,
//! so it's factorized once with a sparse Cholesky decomposition
//! and applied by solving against the factor.
//!
//! The largest eigenpairs are found with a thick-restart Lanczos process
//! with full reorthogonalization: the Krylov basis is extended to `ncv` vectors,
//! Ritz pairs are extracted by Rayleigh-Ritz projection,
//! and the best Ritz vectors are kept over a restart.
//! See Wu & Simon (2000). Thick-restart Lanczos method for large symmetric eigenvalue problems.

use nalgebra as na;
use nalgebra_sparse as nas;

use super::{Candidate, IterativeTuning, NullSpaceError, NullSpaceStrategy, SearchRequest};

const STRATEGY_NAME: &str = "iterative";

fn internal(reason: String) -> NullSpaceError {
    NullSpaceError::SolverInternal {
        strategy: STRATEGY_NAME,
        reason,
    }
}

/// Null space from the eigenvectors of `(AᵀA - σI)⁻¹` with the largest eigenvalues.
///
/// Eigenvalues are reported as the Rayleigh quotient `‖A y‖²` of the normal operator.
#[derive(Clone, Copy, Debug)]
pub struct ShiftInvertLanczos<'a> {
    /// Tuning parameters.
    pub tuning: &'a IterativeTuning,
}

impl NullSpaceStrategy for ShiftInvertLanczos<'_> {
    fn name(&self) -> &'static str {
        STRATEGY_NAME
    }

    fn compute(
        &self,
        matrix: &nas::CsrMatrix<f64>,
        request: &SearchRequest,
    ) -> Result<Vec<Candidate>, NullSpaceError> {
        let n = matrix.ncols();
        let nev = request.expected.min(n);
        let subspace = request.subspace.ok_or_else(|| {
            internal("no subspace size given for the iterative strategy".to_string())
        })?;
        let ncv = subspace.ncv.min(n);
        if ncv <= nev && ncv < n {
            return Err(internal(format!(
                "subspace of {ncv} vectors is too small for {nev} eigenpairs"
            )));
        }

        let factor = shifted_normal_factor(matrix, self.tuning.shift)?;
        let apply = |x: &na::DVector<f64>| -> na::DVector<f64> {
            let rhs = na::DMatrix::from_column_slice(n, 1, x.as_slice());
            let solution = factor.solve(&rhs);
            na::DVector::from_column_slice(solution.as_slice())
        };

        let params = LanczosParams {
            nev,
            ncv,
            mpd: subspace.mpd.max(1),
            tol: self.tuning.eigs_tol,
            max_restarts: self.tuning.max_restarts,
        };
        let result = thick_restart_lanczos(apply, n, &params)?;
        log::trace!(
            "Lanczos with ncv {ncv}: {} of {nev} pairs converged after {} restarts",
            result.converged.len(),
            result.restarts
        );
        if result.converged.len() < nev {
            return Err(internal(format!(
                "only {} of {nev} eigenpairs converged in {} restarts",
                result.converged.len(),
                result.restarts
            )));
        }

        let mut candidates: Vec<Candidate> = result
            .converged
            .into_iter()
            .map(|(_, vector)| Candidate {
                value: (matrix * &vector).norm_squared(),
                vector,
            })
            .collect();
        candidates.sort_by(|a, b| a.value.total_cmp(&b.value));
        Ok(candidates)
    }
}

/// Cholesky factor of `AᵀA - shift * I`.
fn shifted_normal_factor(
    matrix: &nas::CsrMatrix<f64>,
    shift: f64,
) -> Result<nas::factorization::CscCholesky<f64>, NullSpaceError> {
    let n = matrix.ncols();
    let normal = &matrix.transpose() * matrix;
    let mut coo = nas::CooMatrix::new(n, n);
    for (row, col, val) in normal.triplet_iter() {
        coo.push(row, col, *val);
    }
    for i in 0..n {
        coo.push(i, i, -shift);
    }
    let shifted = nas::CscMatrix::from(&coo);
    nas::factorization::CscCholesky::factor(&shifted).map_err(|e| {
        internal(format!(
            "Cholesky factorization of the shifted normal operator failed: {e:?}"
        ))
    })
}

struct LanczosParams {
    nev: usize,
    ncv: usize,
    mpd: usize,
    tol: f64,
    max_restarts: usize,
}

struct LanczosResult {
    /// converged Ritz pairs in descending order of eigenvalue
    converged: Vec<(f64, na::DVector<f64>)>,
    restarts: usize,
}

/// A deterministic start vector without special structure,
/// so that it isn't orthogonal to any eigenvector by accident.
fn start_vector(n: usize) -> na::DVector<f64> {
    const GOLDEN: f64 = 0.618_033_988_749_895;
    let v = na::DVector::from_fn(n, |i, _| 0.5 + ((i + 1) as f64 * GOLDEN).fract());
    let norm = v.norm();
    v / norm
}

/// Orthogonalize `v` against an orthonormal basis, twice for stability,
/// and normalize it. Returns None if nothing is left of it.
fn orthonormalize_against(
    basis: &[na::DVector<f64>],
    mut v: na::DVector<f64>,
) -> Option<na::DVector<f64>> {
    let initial_norm = v.norm();
    if !(initial_norm > 0.0) {
        return None;
    }
    for _ in 0..2 {
        for b in basis {
            let c = b.dot(&v);
            v.axpy(-c, b, 1.0);
        }
    }
    let norm = v.norm();
    (norm > 1e-12 * initial_norm).then(|| v / norm)
}

/// A new direction orthogonal to the basis,
/// used when the Krylov space has become invariant.
fn fresh_direction(basis: &[na::DVector<f64>], n: usize) -> Option<na::DVector<f64>> {
    (0..n).find_map(|i| {
        let e_i = na::DVector::from_fn(n, |j, _| if i == j { 1.0 } else { 0.0 });
        orthonormalize_against(basis, e_i)
    })
}

fn thick_restart_lanczos(
    apply: impl Fn(&na::DVector<f64>) -> na::DVector<f64>,
    n: usize,
    params: &LanczosParams,
) -> Result<LanczosResult, NullSpaceError> {
    // orthonormal basis and the operator applied to it
    let mut basis: Vec<na::DVector<f64>> = Vec::with_capacity(params.ncv);
    let mut images: Vec<na::DVector<f64>> = Vec::with_capacity(params.ncv);
    let mut next = start_vector(n);

    for restart in 0..=params.max_restarts {
        while basis.len() < params.ncv {
            let v = match orthonormalize_against(&basis, next) {
                Some(v) => v,
                None => match fresh_direction(&basis, n) {
                    Some(v) => v,
                    // the basis spans the whole space
                    None => break,
                },
            };
            let w = apply(&v);
            if w.iter().any(|x| !x.is_finite()) {
                return Err(internal("operator produced non-finite values".to_string()));
            }
            next = w.clone();
            basis.push(v);
            images.push(w);
        }
        let m = basis.len();

        // Rayleigh-Ritz projection
        let v_mat = na::DMatrix::from_columns(&basis);
        let w_mat = na::DMatrix::from_columns(&images);
        let projected = v_mat.tr_mul(&w_mat);
        let projected = (&projected + projected.transpose()) * 0.5;
        let eigen = na::SymmetricEigen::try_new(projected, f64::EPSILON, 0)
            .ok_or_else(|| internal("projected eigenproblem did not converge".to_string()))?;
        let mut order: Vec<usize> = (0..m).collect();
        order.sort_by(|&a, &b| eigen.eigenvalues[b].total_cmp(&eigen.eigenvalues[a]));

        let wanted = params.nev.min(m);
        let spans_everything = m == n;
        let mut converged = Vec::with_capacity(wanted);
        let mut first_residual = None;
        for &i in &order[..wanted] {
            let theta = eigen.eigenvalues[i];
            let s = eigen.eigenvectors.column(i);
            let ritz_vector = &v_mat * &s;
            let residual = &w_mat * &s - theta * &ritz_vector;
            if spans_everything || residual.norm() <= params.tol * theta.abs() {
                converged.push((theta, ritz_vector));
            } else if first_residual.is_none() {
                first_residual = Some(residual);
            }
        }

        let Some(residual) = first_residual else {
            return Ok(LanczosResult { converged, restarts: restart });
        };
        if restart == params.max_restarts {
            return Ok(LanczosResult { converged, restarts: restart });
        }

        // keep the best Ritz vectors and continue from the residual direction,
        // which is where the Krylov space would have grown next
        let keep = params
            .mpd
            .min(usize::max(params.nev, (params.nev + m) / 2))
            .min(m - 1)
            .max(1);
        let kept: Vec<na::DVector<f64>> = order[..keep]
            .iter()
            .map(|&i| eigen.eigenvectors.column(i).into_owned())
            .collect();
        let s_keep = na::DMatrix::from_columns(&kept);
        let new_basis = &v_mat * &s_keep;
        let new_images = &w_mat * &s_keep;
        basis = new_basis.column_iter().map(|c| c.into_owned()).collect();
        images = new_images.column_iter().map(|c| c.into_owned()).collect();
        next = residual;
    }

    unreachable!("the last restart always returns")
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::relative_eq;

    #[test]
    fn finds_largest_eigenvalues() {
        let n = 60;
        // diagonal operator with known spectrum 1, 1/2, 1/3, ...
        let apply = |x: &na::DVector<f64>| {
            na::DVector::from_fn(n, |i, _| x[i] / (i + 1) as f64)
        };
        let params = LanczosParams {
            nev: 3,
            ncv: 12,
            mpd: 12,
            tol: 1e-10,
            max_restarts: 100,
        };
        let result = thick_restart_lanczos(apply, n, &params).unwrap();
        assert_eq!(result.converged.len(), 3);
        for (i, (theta, vector)) in result.converged.iter().enumerate() {
            let expected = 1.0 / (i + 1) as f64;
            assert!(
                relative_eq!(*theta, expected, epsilon = 1e-8),
                "eigenvalue {i}: expected {expected}, got {theta}"
            );
            assert!(relative_eq!(vector[i].abs(), 1.0, epsilon = 1e-6));
        }
    }

    #[test]
    fn finds_null_vector_of_sparse_matrix() {
        // path graph Laplacian, null vector is constant
        let n = 30;
        let mut coo = nas::CooMatrix::new(n, n);
        for i in 0..n - 1 {
            coo.push(i, i, 1.0);
            coo.push(i + 1, i + 1, 1.0);
            coo.push(i, i + 1, -1.0);
            coo.push(i + 1, i, -1.0);
        }
        let matrix = nas::CsrMatrix::from(&coo);
        let tuning = IterativeTuning {
            eigs_tol: 1e-9,
            // the smallest nonzero eigenvalue of L² is about 1e-4
            shift: -1e-4,
            ..Default::default()
        };
        let request = SearchRequest {
            expected: 1,
            threshold: 1e-10,
            subspace: Some(super::super::Subspace { ncv: 16, mpd: 16 }),
        };
        let candidates = ShiftInvertLanczos { tuning: &tuning }
            .compute(&matrix, &request)
            .unwrap();
        assert_eq!(candidates.len(), 1);
        assert!(candidates[0].value < 1e-12, "got {}", candidates[0].value);
        let v = &candidates[0].vector;
        let constant = v[0];
        assert!(v.iter().all(|x| relative_eq!(*x, constant, epsilon = 1e-6)));
    }
}
