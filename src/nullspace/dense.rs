//! Dense singular value decomposition.

use nalgebra as na;
use nalgebra_sparse as nas;

use super::{Candidate, NullSpaceError, NullSpaceStrategy, SearchRequest};

/// Null space from the right singular vectors of a full dense SVD.
///
/// Takes `O(n³)` time and `O(n²)` memory,
/// so this is mostly useful for small meshes and as a reference.
#[derive(Clone, Copy, Debug, Default)]
pub struct DenseSvd;

impl NullSpaceStrategy for DenseSvd {
    fn name(&self) -> &'static str {
        "dense"
    }

    fn compute(
        &self,
        matrix: &nas::CsrMatrix<f64>,
        request: &SearchRequest,
    ) -> Result<Vec<Candidate>, NullSpaceError> {
        let internal = |reason: &str| NullSpaceError::SolverInternal {
            strategy: self.name(),
            reason: reason.to_string(),
        };

        let dense = na::DMatrix::from(matrix);
        let svd = dense
            .try_svd(false, true, f64::EPSILON, 0)
            .ok_or_else(|| internal("SVD did not converge"))?;
        let v_t = svd
            .v_t
            .ok_or_else(|| internal("SVD did not produce right singular vectors"))?;
        let values = svd.singular_values;
        if values.iter().any(|v| !v.is_finite()) {
            return Err(internal("SVD produced non-finite singular values"));
        }

        // ascending, with one value above the threshold kept for diagnostics
        let mut order: Vec<usize> = (0..values.len()).collect();
        order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
        let below = order
            .iter()
            .take_while(|&&i| values[i] < request.threshold)
            .count();

        Ok(order
            .iter()
            .take(below + 1)
            .map(|&i| Candidate {
                value: values[i],
                vector: v_t.row(i).transpose(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::relative_eq;

    #[test]
    fn finds_known_null_space() {
        // rank 2 with null vector (1, -1, 1) / sqrt(3)
        #[rustfmt::skip]
        let dense = na::DMatrix::from_row_slice(3, 3, &[
            1.0, 1.0, 0.0,
            0.0, 1.0, 1.0,
            1.0, 2.0, 1.0,
        ]);
        let matrix = nas::CsrMatrix::from(&dense);
        let request = SearchRequest {
            expected: 1,
            threshold: 1e-10,
            subspace: None,
        };
        let candidates = DenseSvd.compute(&matrix, &request).unwrap();
        assert_eq!(candidates.len(), 2);
        assert!(candidates[0].value < 1e-12);
        assert!(candidates[1].value > 0.1);

        let v = &candidates[0].vector;
        let expected = na::DVector::from_vec(vec![1.0, -1.0, 1.0]) / f64::sqrt(3.0);
        let aligned = v.dot(&expected).abs();
        assert!(relative_eq!(aligned, 1.0, epsilon = 1e-10), "got {v}");
    }
}
