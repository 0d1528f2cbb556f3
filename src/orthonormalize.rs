//! Gram-Schmidt orthonormalization of raw null vectors
//! under the mass-matrix inner product of the harmonic subspace.

use nalgebra as na;
use nalgebra_sparse as nas;

use crate::harmonic::HarmonicForm;

/// Relative norm below which a candidate is considered
/// linearly dependent on the ones before it.
const DEGENERACY_TOLERANCE: f64 = 1e-8;

/// Error in orthonormalizing candidate vectors.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum OrthonormalizeError {
    /// A candidate vanished after projecting out the previous ones,
    /// or was zero on the harmonic subspace to begin with.
    #[error(
        "Null space candidate {index} is degenerate \
         (relative norm {relative_norm:e} after orthogonalization)"
    )]
    DegenerateCandidate {
        /// Position of the candidate in the order given.
        index: usize,
        /// Norm after orthogonalization relative to the norm before,
        /// zero if the candidate was zero.
        relative_norm: f64,
    },
}

/// Orthonormalize `raw` vectors with modified Gram-Schmidt
/// under the inner product `⟨x, y⟩ = xᵀ M y`.
///
/// Each vector is first mapped through `restrict`,
/// typically the restriction of a mixed-space vector to the harmonic subspace.
/// Vectors are processed in the order given.
/// A degenerate candidate is an error rather than being skipped,
/// since it means the null space search returned fewer independent vectors
/// than it claimed.
pub fn orthonormalize(
    raw: &[na::DVector<f64>],
    restrict: impl Fn(&na::DVector<f64>) -> na::DVector<f64>,
    inner_product: &nas::CsrMatrix<f64>,
) -> Result<Vec<HarmonicForm>, OrthonormalizeError> {
    let inner = |x: &na::DVector<f64>, y: &na::DVector<f64>| x.dot(&(inner_product * y));

    let mut accepted: Vec<na::DVector<f64>> = Vec::with_capacity(raw.len());
    for (index, candidate) in raw.iter().enumerate() {
        let mut v = restrict(candidate);
        let initial_norm = inner(&v, &v).max(0.0).sqrt();
        for q in &accepted {
            let c = inner(q, &v);
            v.axpy(-c, q, 1.0);
        }
        let norm = inner(&v, &v).max(0.0).sqrt();

        let relative_norm = if initial_norm > 0.0 {
            norm / initial_norm
        } else {
            0.0
        };
        if !(relative_norm >= DEGENERACY_TOLERANCE) {
            return Err(OrthonormalizeError::DegenerateCandidate {
                index,
                relative_norm,
            });
        }
        log::trace!("candidate {index} kept {relative_norm:.3e} of its norm");
        accepted.push(v / norm);
    }

    Ok(accepted.into_iter().map(HarmonicForm::new).collect())
}
