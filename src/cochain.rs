//! Cochains, i.e. values assigned to the simplices of a mesh.
//!
//! With lowest-order Whitney elements a cochain is also
//! the coefficient vector of a discrete differential form,
//! one coefficient per simplex of the form's degree.

use nalgebra as na;

/// A vector of values corresponding to the `k`-simplices of a mesh,
/// where `k` is the degree of the cochain.
///
/// Cochains can be constructed using
/// [`SimplicialMesh::new_zero_cochain`][crate::SimplicialMesh::new_zero_cochain]
/// and [`SimplicialMesh::integrate_cochain`][crate::SimplicialMesh::integrate_cochain],
/// and are extracted from solutions of the mixed system.
#[derive(Clone)]
pub struct Cochain {
    degree: usize,
    /// The underlying vector of real values, exposed for convenience.
    ///
    /// Changing the length of this vector will cause a dimension mismatch
    /// with the matrices of the mesh it came from. Use with caution.
    pub values: na::DVector<f64>,
}

impl Cochain {
    // constructors only exposed to crate
    // because cochains are always based on a mesh

    #[inline]
    pub(crate) fn from_values(degree: usize, values: na::DVector<f64>) -> Self {
        Self { degree, values }
    }

    #[inline]
    pub(crate) fn zeros(degree: usize, len: usize) -> Self {
        Self::from_values(degree, na::DVector::zeros(len))
    }

    /// The degree of the form this cochain represents.
    #[inline]
    pub fn degree(&self) -> usize {
        self.degree
    }

    /// Number of values in the cochain.
    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the cochain has no values at all.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl std::fmt::Debug for Cochain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-cochain, values {:?}", self.degree, self.values)
    }
}

impl PartialEq for Cochain {
    fn eq(&self, other: &Self) -> bool {
        self.degree == other.degree && self.values == other.values
    }
}
