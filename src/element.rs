//! Choice of finite element family and polynomial degree for each form degree.
//!
//! Every supported choice resolves to the lowest-order Whitney space
//! of its form degree, where the exterior derivative is exactly the
//! coboundary matrix of the mesh:
//!
//! | family    | degree | form degrees | space       |
//! |-----------|--------|--------------|-------------|
//! | `Trimmed` | 1      | all          | `P1⁻Λᵏ`     |
//! | `Full`    | 1      | 0            | `P1Λ⁰ = P1⁻Λ⁰` |
//! | `Full`    | 0      | top          | `P0Λᴰ = P1⁻Λᴰ` |
//!
//! Anything else is rejected when the configuration is built.

use std::fmt;

/// Polynomial family of a finite element space of differential forms.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ElementFamily {
    /// Trimmed polynomial forms `Pr⁻Λᵏ` (Whitney / Nédélec first kind / Raviart-Thomas).
    Trimmed,
    /// Full polynomial forms `PrΛᵏ`.
    Full,
}

impl fmt::Display for ElementFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Trimmed => write!(f, "P-"),
            Self::Full => write!(f, "P"),
        }
    }
}

/// The element chosen for one form degree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ElementSpec {
    /// Degree of the differential forms this element represents.
    pub form_degree: usize,
    /// Polynomial family.
    pub family: ElementFamily,
    /// Polynomial degree.
    pub degree: usize,
}

impl ElementSpec {
    /// The lowest-order trimmed element for the given form degree.
    pub const fn whitney(form_degree: usize) -> Self {
        Self {
            form_degree,
            family: ElementFamily::Trimmed,
            degree: 1,
        }
    }

    /// Whether this element is the lowest-order Whitney space
    /// on a mesh of dimension `mesh_dim`.
    fn is_whitney(&self, mesh_dim: usize) -> bool {
        match (self.family, self.degree) {
            (ElementFamily::Trimmed, 1) => true,
            (ElementFamily::Full, 1) => self.form_degree == 0,
            (ElementFamily::Full, 0) => self.form_degree == mesh_dim,
            _ => false,
        }
    }
}

impl fmt::Display for ElementSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}Λ{}", self.family, self.degree, self.form_degree)
    }
}

/// Error in configuring the solver.
///
/// These are raised before any expensive work is done.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Only 2D and 3D meshes are supported.
    #[error("Unsupported mesh dimension {0}, expected 2 or 3")]
    UnsupportedDimension(usize),
    /// There must be exactly one element per form degree.
    #[error("Expected {expected} element specs (one per form degree), got {found}")]
    SpecCount {
        /// `dim + 1`
        expected: usize,
        /// Number of specs given.
        found: usize,
    },
    /// The specs must be given in order of form degree.
    #[error("Element spec at position {position} is for form degree {found}")]
    FormDegreeOrder {
        /// Position in the list of specs.
        position: usize,
        /// Form degree of the spec found there.
        found: usize,
    },
    /// The element family and degree combination isn't available.
    /// Only elements equal to the lowest-order Whitney space are.
    #[error("Unsupported element {0}: only lowest-order Whitney elements are available (P-1 for every form degree, P1 for 0-forms, P0 for top forms)")]
    UnsupportedElement(ElementSpec),
    /// Configuration built for a different mesh dimension.
    #[error("Configuration is for dimension {config}, but the mesh has dimension {mesh}")]
    DimensionMismatch {
        /// Dimension of the configuration.
        config: usize,
        /// Dimension of the mesh.
        mesh: usize,
    },
    /// Invalid null-space solver tuning.
    #[error("Invalid solver tuning: {0}")]
    InvalidTuning(String),
    /// A harmonic basis doesn't fit the harmonic subspace of the mesh.
    #[error("Harmonic basis function {index} has {found} values, expected {expected}")]
    BasisShape {
        /// Index of the offending basis function.
        index: usize,
        /// Expected number of values.
        expected: usize,
        /// Number of values found.
        found: usize,
    },
    /// An imported basis claims a different count than it contains.
    #[error("Imported harmonic basis has count {count} but {found} functions")]
    ImportedBasisCount {
        /// Declared count.
        count: usize,
        /// Number of functions present.
        found: usize,
    },
    /// Source data doesn't match the mesh.
    #[error("Source of degree {degree} has {found} values, expected {expected}")]
    SourceShape {
        /// Form degree of the source.
        degree: usize,
        /// Number of simplices of that degree in the mesh.
        expected: usize,
        /// Number of values given.
        found: usize,
    },
    /// No linear solver with the given name.
    #[error("Unknown linear solver {0:?}, expected one of \"lu\", \"sparse-lu\", \"dense-lu\", \"minres\"")]
    UnknownLinearSolver(String),
}

/// The finite element choice for every form degree `0..=dim` of a mesh.
///
/// Only lowest-order elements are supported,
/// so every valid configuration describes the same Whitney complex.
/// The `Full` family is accepted only where it coincides with it
/// (degree 1 for 0-forms, degree 0 for top forms);
/// higher degrees are rejected with [`ConfigError::UnsupportedElement`].
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ElementConfig {
    dim: usize,
    specs: Vec<ElementSpec>,
}

impl ElementConfig {
    /// Validate and build a configuration for a mesh of dimension `dim`.
    ///
    /// `specs` must contain one element per form degree, in order.
    pub fn new(dim: usize, specs: Vec<ElementSpec>) -> Result<Self, ConfigError> {
        if !(2..=3).contains(&dim) {
            return Err(ConfigError::UnsupportedDimension(dim));
        }
        if specs.len() != dim + 1 {
            return Err(ConfigError::SpecCount {
                expected: dim + 1,
                found: specs.len(),
            });
        }
        for (position, spec) in specs.iter().enumerate() {
            if spec.form_degree != position {
                return Err(ConfigError::FormDegreeOrder {
                    position,
                    found: spec.form_degree,
                });
            }
            if !spec.is_whitney(dim) {
                return Err(ConfigError::UnsupportedElement(*spec));
            }
        }
        Ok(Self { dim, specs })
    }

    /// Lowest-order trimmed elements for every form degree.
    pub fn whitney(dim: usize) -> Result<Self, ConfigError> {
        Self::new(dim, (0..=dim).map(ElementSpec::whitney).collect())
    }

    /// Mesh dimension this configuration is for.
    #[inline]
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// The element for each form degree, in order.
    #[inline]
    pub fn specs(&self) -> &[ElementSpec] {
        &self.specs
    }
}
