//! Search for the near null space of the mixed operator.
//!
//! The null space of the operator without harmonic multipliers
//! is spanned by the discrete harmonic forms of the domain,
//! so its dimension is a topological invariant
//! (number of holes in 2D, tunnels plus voids in 3D)
//! that the caller is expected to know in advance.
//!
//! Three interchangeable strategies implement [`NullSpaceStrategy`]:
//!
//! - [`dense::DenseSvd`]: full dense singular value decomposition.
//!   Exact but only viable for small systems.
//! - [`lanczos::ShiftInvertLanczos`] (default): thick-restart Lanczos iteration
//!   on `(AᵀA - σI)⁻¹` with a sparse Cholesky factorization.
//! - [`qr::SparseQr`]: rank-revealing sparse Householder QR of `Aᵀ`.
//!
//! The retry and escalation policy is shared between them
//! and implemented once in [`find_near_null_space`].

pub mod dense;
pub mod lanczos;
pub mod qr;

use nalgebra as na;
use nalgebra_sparse as nas;

use crate::element::ConfigError;

/// Error in searching for the null space.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum NullSpaceError {
    /// Automatic subspace escalation reached its cap without converging.
    ///
    /// This is fatal; the search shouldn't be retried on the same operator
    /// with the same tuning.
    #[error("Null space search did not converge with subspace sizes {attempts:?}: {reason}")]
    ConvergenceFailure {
        /// Subspace sizes tried, in order.
        attempts: Vec<usize>,
        /// What went wrong in the last attempt.
        reason: String,
    },
    /// A numerical back-end failed.
    #[error("{strategy} null space solver failed: {reason}")]
    SolverInternal {
        /// Name of the strategy.
        strategy: &'static str,
        /// Description of the failure.
        reason: String,
    },
    /// The search was configured incorrectly.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Size of the Krylov subspace of the iterative strategy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SubspaceSize {
    /// Start from `max(16, 2 * expected)` vectors
    /// and grow by 10 on every failed attempt up to `max_auto_ncv`.
    #[default]
    Auto,
    /// A single attempt with exactly these sizes.
    Fixed {
        /// Number of basis vectors in the subspace.
        ncv: usize,
        /// Maximum number of vectors kept over a restart.
        mpd: usize,
    },
}

/// A subspace size chosen for one attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Subspace {
    /// Number of basis vectors.
    pub ncv: usize,
    /// Maximum number of vectors kept over a restart.
    pub mpd: usize,
}

/// Tuning of the iterative strategy.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IterativeTuning {
    /// Subspace size, automatic or fixed.
    pub subspace: SubspaceSize,
    /// Upper limit of automatic subspace escalation.
    pub max_auto_ncv: usize,
    /// Relative residual tolerance of converged eigenpairs.
    pub eigs_tol: f64,
    /// Target shift of the shift-invert transform. Must be negative
    /// so that `AᵀA - shift * I` is positive definite.
    pub shift: f64,
    /// Maximum number of restarts per attempt.
    pub max_restarts: usize,
}

impl Default for IterativeTuning {
    fn default() -> Self {
        Self {
            subspace: SubspaceSize::Auto,
            max_auto_ncv: 200,
            eigs_tol: 1e-10,
            shift: -0.1,
            max_restarts: 300,
        }
    }
}

/// Tuning of the QR strategy.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct QrTuning {
    /// Tolerance on the remaining norm of a column of `Aᵀ`
    /// below which it's taken as dependent on the previous ones.
    /// Defaults to `20 (m + n) ε max_j ‖a_j‖`.
    pub rank_tolerance: Option<f64>,
}

/// Choice of null space strategy with its tuning.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SolverTuning {
    /// Dense singular value decomposition.
    Dense,
    /// Shift-invert Lanczos iteration.
    Iterative(IterativeTuning),
    /// Rank-revealing QR factorization.
    Qr(QrTuning),
}

impl Default for SolverTuning {
    fn default() -> Self {
        Self::Iterative(IterativeTuning::default())
    }
}

impl SolverTuning {
    /// Check that every parameter is in range.
    pub fn validate(&self, expected: usize) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::InvalidTuning(msg));
        match self {
            Self::Dense => Ok(()),
            Self::Iterative(t) => {
                if !(t.eigs_tol > 0.0 && t.eigs_tol.is_finite()) {
                    return invalid(format!("eigs_tol must be positive, got {}", t.eigs_tol));
                }
                if !(t.shift < 0.0 && t.shift.is_finite()) {
                    return invalid(format!("shift must be negative, got {}", t.shift));
                }
                if t.max_restarts == 0 {
                    return invalid("max_restarts must be positive".to_string());
                }
                match t.subspace {
                    SubspaceSize::Auto if t.max_auto_ncv <= expected => invalid(format!(
                        "max_auto_ncv {} must exceed the expected dimension {expected}",
                        t.max_auto_ncv
                    )),
                    SubspaceSize::Fixed { ncv, mpd } if ncv <= expected || mpd == 0 || mpd > ncv => {
                        invalid(format!(
                            "need expected < ncv and 0 < mpd <= ncv, got expected {expected}, ncv {ncv}, mpd {mpd}"
                        ))
                    }
                    _ => Ok(()),
                }
            }
            Self::Qr(t) => match t.rank_tolerance {
                Some(tol) if !(tol > 0.0 && tol.is_finite()) => {
                    invalid(format!("rank_tolerance must be positive, got {tol}"))
                }
                _ => Ok(()),
            },
        }
    }

    /// The subspace sizes attempted in order.
    /// A single `None` for strategies without a subspace.
    pub fn schedule(&self, expected: usize) -> Vec<Option<Subspace>> {
        let Self::Iterative(tuning) = self else {
            return vec![None];
        };
        match tuning.subspace {
            SubspaceSize::Fixed { ncv, mpd } => vec![Some(Subspace { ncv, mpd })],
            SubspaceSize::Auto => {
                let mut ncv = usize::max(16, 2 * expected);
                let mut schedule = vec![Some(Subspace { ncv, mpd: ncv })];
                while ncv < tuning.max_auto_ncv {
                    ncv = usize::min(ncv + 10, tuning.max_auto_ncv);
                    schedule.push(Some(Subspace { ncv, mpd: ncv }));
                }
                schedule
            }
        }
    }

    fn strategy(&self) -> Box<dyn NullSpaceStrategy + '_> {
        match self {
            Self::Dense => Box::new(dense::DenseSvd),
            Self::Iterative(tuning) => Box::new(lanczos::ShiftInvertLanczos { tuning }),
            Self::Qr(tuning) => Box::new(qr::SparseQr { tuning }),
        }
    }
}

/// Parameters of a harmonic basis search.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HarmonicSearch {
    /// Expected dimension of the null space.
    pub expected: usize,
    /// Values below this are treated as zero.
    pub threshold: f64,
    /// Log every computed value at info level instead of debug.
    pub print_values: bool,
    /// Strategy and its tuning.
    pub tuning: SolverTuning,
}

impl HarmonicSearch {
    /// Search for `expected` harmonic forms with default settings.
    pub fn new(expected: usize) -> Self {
        Self {
            expected,
            threshold: 1e-10,
            print_values: false,
            tuning: SolverTuning::default(),
        }
    }

    /// Set the threshold below which values count as zero.
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Set the null space strategy.
    pub fn with_tuning(mut self, tuning: SolverTuning) -> Self {
        self.tuning = tuning;
        self
    }

    /// Log every computed value at info level.
    pub fn print_values(mut self, print: bool) -> Self {
        self.print_values = print;
        self
    }

    /// Check the parameters before doing any work.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.threshold > 0.0 && self.threshold.is_finite()) {
            return Err(ConfigError::InvalidTuning(format!(
                "threshold must be positive, got {}",
                self.threshold
            )));
        }
        self.tuning.validate(self.expected)
    }
}

/// What one attempt of a strategy is asked to compute.
#[derive(Clone, Copy, Debug)]
pub struct SearchRequest {
    /// Expected dimension of the null space.
    pub expected: usize,
    /// Values below this are treated as zero.
    pub threshold: f64,
    /// Subspace size for strategies that have one.
    pub subspace: Option<Subspace>,
}

/// A candidate null vector with the value that measures it.
#[derive(Clone, Debug, PartialEq)]
pub struct Candidate {
    /// How close to zero `A v` is, compared against the threshold:
    /// a singular value, the diagonal of `R` in QR,
    /// or the Rayleigh quotient `‖A v‖²` of the normal operator.
    pub value: f64,
    /// The vector in the mixed numbering.
    pub vector: na::DVector<f64>,
}

/// A method of finding vectors in the near null space of a matrix.
pub trait NullSpaceStrategy {
    /// Name used in log messages and errors.
    fn name(&self) -> &'static str;

    /// Compute candidates for null vectors in the order the method produces them.
    ///
    /// All candidates with values below the request's threshold must be included;
    /// a few more may be included for diagnostics.
    fn compute(
        &self,
        matrix: &nas::CsrMatrix<f64>,
        request: &SearchRequest,
    ) -> Result<Vec<Candidate>, NullSpaceError>;
}

/// Result of a null space search.
#[derive(Clone, Debug)]
pub struct NullSpace {
    /// Every value computed in the successful attempt, for diagnostics.
    pub values: Vec<f64>,
    /// Vectors whose values fell below the threshold, in the strategy's order.
    pub vectors: Vec<na::DVector<f64>>,
    /// Number of values below the threshold.
    pub dimension_found: usize,
    /// Number of null vectors the caller expected.
    pub expected: usize,
    /// Subspace sizes tried, zero for strategies without one.
    pub attempts: Vec<usize>,
}

impl NullSpace {
    fn empty(expected: usize) -> Self {
        Self {
            values: Vec::new(),
            vectors: Vec::new(),
            dimension_found: 0,
            expected,
            attempts: Vec::new(),
        }
    }

    /// Whether the found dimension matches the expected one.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.dimension_found == self.expected
    }
}

/// Find the near null space of a matrix with the strategy chosen in `search`.
///
/// With an automatic subspace size, the iterative strategy is retried
/// with a growing subspace until enough values below the threshold converge.
/// Other strategies make exactly one attempt
/// and surface back-end errors immediately.
///
/// A found dimension different from the expected one
/// is logged as a warning but not treated as an error.
pub fn find_near_null_space(
    matrix: &nas::CsrMatrix<f64>,
    search: &HarmonicSearch,
) -> Result<NullSpace, NullSpaceError> {
    search.validate()?;
    let expected = search.expected;
    if expected == 0 {
        return Ok(NullSpace::empty(0));
    }

    let strategy = search.tuning.strategy();
    let schedule = search.tuning.schedule(expected);
    let escalating = schedule.len() > 1;
    log::info!(
        "Searching for {expected} null vectors of a {}x{} matrix with the {} strategy",
        matrix.nrows(),
        matrix.ncols(),
        strategy.name(),
    );

    let mut attempts = Vec::with_capacity(schedule.len());
    for (attempt_idx, subspace) in schedule.iter().enumerate() {
        let is_last = attempt_idx + 1 == schedule.len();
        attempts.push(subspace.map_or(0, |s| s.ncv));
        let request = SearchRequest {
            expected,
            threshold: search.threshold,
            subspace: *subspace,
        };
        log::debug!("Null space attempt {} with {subspace:?}", attempt_idx + 1);

        let candidates = match strategy.compute(matrix, &request) {
            Ok(candidates) => candidates,
            Err(err) if !escalating => return Err(err),
            Err(err) if is_last => {
                return Err(NullSpaceError::ConvergenceFailure {
                    attempts,
                    reason: err.to_string(),
                })
            }
            Err(err) => {
                log::warn!("{err}, retrying with a larger subspace");
                continue;
            }
        };

        let found = candidates
            .iter()
            .filter(|c| c.value < search.threshold)
            .count();
        if found < expected && escalating && !is_last {
            log::warn!(
                "Found {found} of {expected} null vectors with {subspace:?}, retrying with a larger subspace"
            );
            continue;
        }

        let values: Vec<f64> = candidates.iter().map(|c| c.value).collect();
        for (i, value) in values.iter().enumerate() {
            if search.print_values {
                log::info!("value {i}: {value:e}");
            } else {
                log::debug!("value {i}: {value:e}");
            }
        }
        let vectors: Vec<_> = candidates
            .into_iter()
            .filter(|c| c.value < search.threshold)
            .map(|c| c.vector)
            .collect();

        let null_space = NullSpace {
            values,
            vectors,
            dimension_found: found,
            expected,
            attempts,
        };
        if null_space.is_complete() {
            log::info!("Found {found} null vectors");
        } else {
            log::warn!(
                "Found {found} null vectors but expected {expected}. \
                 The threshold {:e} may be too high or too low; \
                 inspect the values with print_values",
                search.threshold
            );
        }
        return Ok(null_space);
    }

    // the schedule is never empty and the last attempt always returns
    unreachable!("null space schedule ended without a result")
}
