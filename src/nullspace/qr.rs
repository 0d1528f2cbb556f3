//! Rank-revealing sparse QR factorization.
//!
//! The range of `Aᵀ` is the orthogonal complement of the null space of `A`,
//! so after a factorization `Aᵀ = Q R` of numerical rank `r`,
//! the columns `Q e_j` for `j >= r` span the null space.
//!
//! The factorization is a left-looking sparse Householder QR.
//! Columns of `Aᵀ` are rows of `A`, so they're read directly from CSR storage,
//! and Householder vectors are kept sparse.
//! Rows and columns are first put in reverse Cuthill-McKee order
//! to keep the fill of the reflectors low.
//! Rank is revealed without column pivoting, following
//! Heath (1982). Some applications of Householder transformations
//! to sparse least squares problems:
//! a column whose remaining part is below the rank tolerance
//! is marked dead and produces no reflector,
//! so the trailing columns of `Q` are left for the null space.

use fixedbitset as fb;
use nalgebra as na;
use nalgebra_sparse as nas;

use std::collections::{BTreeSet, VecDeque};

use super::{Candidate, NullSpaceError, NullSpaceStrategy, QrTuning, SearchRequest};

/// Null space from a sparse Householder QR factorization of `Aᵀ`.
///
/// Values of the candidates are `|R_kk|` within the numerical rank,
/// and beyond it the residual `‖A Q e_j‖`.
#[derive(Clone, Copy, Debug)]
pub struct SparseQr<'a> {
    /// Tuning parameters.
    pub tuning: &'a QrTuning,
}

impl NullSpaceStrategy for SparseQr<'_> {
    fn name(&self) -> &'static str {
        "qr"
    }

    fn compute(
        &self,
        matrix: &nas::CsrMatrix<f64>,
        request: &SearchRequest,
    ) -> Result<Vec<Candidate>, NullSpaceError> {
        if matrix.values().iter().any(|x| !x.is_finite()) {
            return Err(NullSpaceError::SolverInternal {
                strategy: self.name(),
                reason: "matrix has non-finite entries".to_string(),
            });
        }
        let qr = SparseHouseholderQr::factor(matrix, self.tuning.rank_tolerance);
        log::debug!(
            "QR of a {}x{} matrix has numerical rank {} with tolerance {:e} \
             ({} dead columns, {} reflector nonzeros)",
            matrix.nrows(),
            matrix.ncols(),
            qr.rank(),
            qr.tolerance,
            qr.dead_columns,
            qr.reflector_nnz(),
        );

        // trailing columns have their vectors computed up front for the residual,
        // live ones only once they're selected
        let mut values: Vec<(f64, Option<na::DVector<f64>>)> =
            qr.diagonal.iter().map(|d| (d.abs(), None)).collect();
        for j in qr.rank()..qr.dim() {
            let vector = qr.q_column(j);
            values.push(((matrix * &vector).norm(), Some(vector)));
        }

        let mut order: Vec<usize> = (0..values.len()).collect();
        order.sort_by(|&a, &b| values[a].0.total_cmp(&values[b].0));
        let below = order
            .iter()
            .take_while(|&&j| values[j].0 < request.threshold)
            .count();

        Ok(order
            .iter()
            .take(below + 1)
            .map(|&j| {
                let (value, vector) = &mut values[j];
                Candidate {
                    value: *value,
                    vector: vector.take().unwrap_or_else(|| qr.q_column(j)),
                }
            })
            .collect())
    }
}

/// Householder reflector `I - β v vᵀ` with sparse `v`.
#[derive(Clone, Debug)]
struct Reflector {
    /// Permuted row positions of the nonzeros of `v`.
    rows: Vec<usize>,
    values: Vec<f64>,
    beta: f64,
}

impl Reflector {
    fn apply(&self, work: &mut [f64]) -> f64 {
        let projection: f64 = self
            .rows
            .iter()
            .zip(&self.values)
            .map(|(&r, v)| v * work[r])
            .sum();
        let scale = self.beta * projection;
        if scale != 0.0 {
            for (&r, v) in self.rows.iter().zip(&self.values) {
                work[r] -= scale * v;
            }
        }
        scale
    }
}

/// Dense work column with a list of the rows it touches.
struct WorkColumn {
    values: Vec<f64>,
    touched: fb::FixedBitSet,
    support: Vec<usize>,
}

impl WorkColumn {
    fn new(len: usize) -> Self {
        Self {
            values: vec![0.0; len],
            touched: fb::FixedBitSet::with_capacity(len),
            support: Vec::new(),
        }
    }

    /// Mark a row as part of the support, returning whether it's new.
    fn touch(&mut self, row: usize) -> bool {
        let new = !self.touched.put(row);
        if new {
            self.support.push(row);
        }
        new
    }

    fn clear(&mut self) {
        for &row in &self.support {
            self.values[row] = 0.0;
            self.touched.set(row, false);
        }
        self.support.clear();
    }
}

struct SparseHouseholderQr {
    /// Reflector `k` has its pivot at permuted row `k`
    /// and only touches rows from `k` on.
    reflectors: Vec<Reflector>,
    /// `R_kk` for every reflector.
    diagonal: Vec<f64>,
    /// Permuted position of every original row of `Aᵀ`.
    position: Vec<usize>,
    dead_columns: usize,
    tolerance: f64,
}

impl SparseHouseholderQr {
    /// Factorize `Aᵀ` for the given `A`.
    fn factor(matrix: &nas::CsrMatrix<f64>, rank_tolerance: Option<f64>) -> Self {
        let dim = matrix.ncols();
        let count = matrix.nrows();

        let order = if dim == count {
            reverse_cuthill_mckee(matrix)
        } else {
            (0..dim).collect()
        };
        let mut position = vec![0; dim];
        for (pos, &orig) in order.iter().enumerate() {
            position[orig] = pos;
        }
        let columns: Vec<usize> = if dim == count {
            order
        } else {
            (0..count).collect()
        };

        let max_norm = (0..count)
            .map(|i| matrix.row(i).values().iter().map(|v| v * v).sum::<f64>().sqrt())
            .fold(0.0, f64::max);
        let tolerance = rank_tolerance
            .unwrap_or(20.0 * (dim + count) as f64 * f64::EPSILON * max_norm);

        let mut reflectors: Vec<Reflector> = Vec::new();
        let mut diagonal = Vec::new();
        let mut row_reflectors: Vec<Vec<usize>> = vec![Vec::new(); dim];
        let mut dead_columns = 0;
        let mut work = WorkColumn::new(dim);
        let mut pending = BTreeSet::new();

        for &col in &columns {
            let row = matrix.row(col);
            for (&c, &v) in row.col_indices().iter().zip(row.values()) {
                let pos = position[c];
                work.touch(pos);
                work.values[pos] += v;
                pending.extend(row_reflectors[pos].iter().copied());
            }

            // apply earlier reflectors in order, following fill into new rows
            while let Some(id) = pending.pop_first() {
                let reflector = &reflectors[id];
                if reflector.apply(&mut work.values) == 0.0 {
                    continue;
                }
                for &r in &reflector.rows {
                    if work.touch(r) {
                        pending.extend(row_reflectors[r].iter().copied().filter(|&i| i > id));
                    }
                }
            }

            let k = reflectors.len();
            let mut tail: Vec<usize> = work.support.iter().copied().filter(|&r| r >= k).collect();
            let norm = tail
                .iter()
                .map(|&r| work.values[r] * work.values[r])
                .sum::<f64>()
                .sqrt();
            if norm <= tolerance {
                dead_columns += 1;
                log::trace!("QR column {col} is dead with remaining norm {norm:e}");
                work.clear();
                continue;
            }

            if !tail.contains(&k) {
                tail.push(k);
            }
            tail.sort_unstable();
            let alpha = work.values[k];
            let sign = if alpha < 0.0 { -1.0 } else { 1.0 };
            let values: Vec<f64> = tail
                .iter()
                .map(|&r| {
                    if r == k {
                        alpha + sign * norm
                    } else {
                        work.values[r]
                    }
                })
                .collect();
            let beta = 2.0 / values.iter().map(|v| v * v).sum::<f64>();

            for &r in &tail {
                row_reflectors[r].push(k);
            }
            reflectors.push(Reflector {
                rows: tail,
                values,
                beta,
            });
            diagonal.push(-sign * norm);
            work.clear();
        }

        Self {
            reflectors,
            diagonal,
            position,
            dead_columns,
            tolerance,
        }
    }

    #[inline]
    fn rank(&self) -> usize {
        self.reflectors.len()
    }

    #[inline]
    fn dim(&self) -> usize {
        self.position.len()
    }

    fn reflector_nnz(&self) -> usize {
        self.reflectors.iter().map(|r| r.rows.len()).sum()
    }

    /// Column `j` of the orthogonal factor in the original row order.
    fn q_column(&self, j: usize) -> na::DVector<f64> {
        let mut y = vec![0.0; self.dim()];
        y[j] = 1.0;
        for reflector in self.reflectors.iter().rev() {
            reflector.apply(&mut y);
        }
        na::DVector::from_iterator(self.dim(), self.position.iter().map(|&p| y[p]))
    }
}

/// Reverse Cuthill-McKee ordering of the symmetrized sparsity pattern.
///
/// Vertices of very high degree (like a gauge row coupled to every vertex)
/// would make every level set of the search wide,
/// so they're left out of the search and placed last.
/// The result maps positions to original indices.
fn reverse_cuthill_mckee(matrix: &nas::CsrMatrix<f64>) -> Vec<usize> {
    let n = matrix.nrows();
    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (i, j, _) in matrix.triplet_iter() {
        if i != j {
            adjacency[i].push(j);
            adjacency[j].push(i);
        }
    }
    for neighbors in &mut adjacency {
        neighbors.sort_unstable();
        neighbors.dedup();
    }
    let degree: Vec<usize> = adjacency.iter().map(Vec::len).collect();

    let dense_limit = 16usize.max((10.0 * (n as f64).sqrt()) as usize);
    let (dense, mut starts): (Vec<usize>, Vec<usize>) =
        (0..n).partition(|&v| degree[v] > dense_limit);
    starts.sort_by_key(|&v| degree[v]);

    let mut visited = fb::FixedBitSet::with_capacity(n);
    for &v in &dense {
        visited.insert(v);
    }
    let mut order = Vec::with_capacity(n);
    let mut queue = VecDeque::new();
    for &start in &starts {
        if visited.put(start) {
            continue;
        }
        queue.push_back(start);
        while let Some(v) = queue.pop_front() {
            order.push(v);
            let mut next: Vec<usize> = adjacency[v]
                .iter()
                .copied()
                .filter(|&w| !visited.contains(w))
                .collect();
            next.sort_by_key(|&w| degree[w]);
            for w in next {
                visited.insert(w);
                queue.push_back(w);
            }
        }
    }
    order.reverse();
    order.extend(dense);
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::relative_eq;

    fn request() -> SearchRequest {
        SearchRequest {
            expected: 1,
            threshold: 1e-10,
            subspace: None,
        }
    }

    /// Graph Laplacian of a path, singular with the constants as its null space.
    fn path_laplacian(n: usize) -> nas::CsrMatrix<f64> {
        let mut coo = nas::CooMatrix::new(n, n);
        for i in 0..n {
            let degree = if i == 0 || i == n - 1 { 1.0 } else { 2.0 };
            coo.push(i, i, degree);
            if i + 1 < n {
                coo.push(i, i + 1, -1.0);
                coo.push(i + 1, i, -1.0);
            }
        }
        nas::CsrMatrix::from(&coo)
    }

    #[test]
    fn finds_known_null_space() {
        #[rustfmt::skip]
        let dense = na::DMatrix::from_row_slice(3, 3, &[
            1.0, 1.0, 0.0,
            0.0, 1.0, 1.0,
            1.0, 2.0, 1.0,
        ]);
        let matrix = nas::CsrMatrix::from(&dense);
        let tuning = QrTuning::default();
        let candidates = SparseQr { tuning: &tuning }
            .compute(&matrix, &request())
            .unwrap();
        assert_eq!(candidates.len(), 2);
        assert!(candidates[0].value < 1e-12, "got {}", candidates[0].value);
        assert!(candidates[1].value > 0.1);

        let v = &candidates[0].vector;
        let expected = na::DVector::from_vec(vec![1.0, -1.0, 1.0]) / f64::sqrt(3.0);
        assert!(
            relative_eq!(v.dot(&expected).abs(), 1.0, epsilon = 1e-10),
            "got {v}"
        );
    }

    #[test]
    fn orthogonal_factor_is_orthonormal() {
        #[rustfmt::skip]
        let dense = na::DMatrix::from_row_slice(4, 3, &[
            2.0, -1.0, 0.0,
            1.0, 3.0, 1.0,
            0.0, 1.0, -2.0,
            4.0, 0.0, 1.0,
        ]);
        let qr = SparseHouseholderQr::factor(&nas::CsrMatrix::from(&dense), None);
        assert_eq!(qr.rank(), 3);
        assert_eq!(qr.dead_columns, 1);
        let q = na::DMatrix::from_columns(&(0..3).map(|j| qr.q_column(j)).collect::<Vec<_>>());
        let gram = q.tr_mul(&q);
        assert!(
            relative_eq!(gram, na::DMatrix::identity(3, 3), epsilon = 1e-12),
            "got {gram}"
        );
    }

    #[test]
    fn rank_tolerance_cuts_small_directions() {
        let dense = na::DMatrix::from_diagonal(&na::DVector::from_vec(vec![1.0, 1e-6, 1.0]));
        let matrix = nas::CsrMatrix::from(&dense);
        let request = SearchRequest {
            threshold: 1e-5,
            ..request()
        };

        // the small direction is found with its size either way
        for rank_tolerance in [None, Some(1e-3)] {
            let tuning = QrTuning { rank_tolerance };
            let candidates = SparseQr { tuning: &tuning }
                .compute(&matrix, &request)
                .unwrap();
            assert_eq!(candidates.len(), 2, "with {rank_tolerance:?}");
            assert!(relative_eq!(candidates[0].value, 1e-6, epsilon = 1e-12));
            assert!(relative_eq!(candidates[0].vector[1].abs(), 1.0, epsilon = 1e-12));
        }

        let qr = SparseHouseholderQr::factor(&matrix, Some(1e-3));
        assert_eq!(qr.rank(), 2);
        assert_eq!(qr.dead_columns, 1);
        let qr = SparseHouseholderQr::factor(&matrix, None);
        assert_eq!(qr.rank(), 3);
    }

    /// A banded matrix keeps its reflectors banded,
    /// so storage grows linearly with the size.
    #[test]
    fn reflectors_stay_sparse() {
        let n = 400;
        let matrix = path_laplacian(n);
        let qr = SparseHouseholderQr::factor(&matrix, None);
        assert_eq!(qr.rank(), n - 1);
        assert!(qr.reflector_nnz() <= 3 * n, "{} nonzeros", qr.reflector_nnz());

        let tuning = QrTuning::default();
        let request = SearchRequest {
            threshold: 1e-8,
            ..request()
        };
        let candidates = SparseQr { tuning: &tuning }
            .compute(&matrix, &request)
            .unwrap();
        assert!(candidates[0].value < 1e-10, "got {}", candidates[0].value);
        let constant = na::DVector::from_element(n, 1.0 / (n as f64).sqrt());
        let overlap = candidates[0].vector.dot(&constant).abs();
        assert!(relative_eq!(overlap, 1.0, epsilon = 1e-8), "overlap {overlap}");
    }

    #[test]
    fn ordering_is_a_permutation_with_dense_rows_last() {
        // a path with one extra vertex coupled to all others
        let n = 300;
        let mut coo = nas::CooMatrix::new(n + 1, n + 1);
        for i in 0..n {
            coo.push(i, i, 2.0);
            if i + 1 < n {
                coo.push(i, i + 1, -1.0);
                coo.push(i + 1, i, -1.0);
            }
            coo.push(i, n, 1.0);
            coo.push(n, i, 1.0);
        }
        let order = reverse_cuthill_mckee(&nas::CsrMatrix::from(&coo));
        assert_eq!(order.last(), Some(&n));
        let mut sorted = order.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..=n).collect::<Vec<_>>());
        // path neighbors stay close together
        let mut position = vec![0; n + 1];
        for (pos, &v) in order.iter().enumerate() {
            position[v] = pos;
        }
        for i in 0..n - 1 {
            assert!(position[i].abs_diff(position[i + 1]) <= 2);
        }
    }
}
