//! Discrete harmonic forms of a mesh and their persistence.
//!
//! A harmonic basis is found once per mesh and configuration
//! by searching the null space of the mixed operator
//! and orthonormalizing what was found.
//! It can be exported and imported to skip the search on later runs
//! with the same mesh, elements and boundary mode.

use nalgebra as na;

use crate::{
    context::MeshContext,
    element::ConfigError,
    nullspace::{find_near_null_space, HarmonicSearch, NullSpace},
    orthonormalize::orthonormalize,
    solver::HodgeError,
    Cochain,
};

/// One harmonic form, given by its coefficients
/// over the harmonic subspace (form degrees `1..dim` in order).
#[derive(Clone, Debug, PartialEq)]
pub struct HarmonicForm {
    coefficients: na::DVector<f64>,
}

impl HarmonicForm {
    #[inline]
    pub(crate) fn new(coefficients: na::DVector<f64>) -> Self {
        Self { coefficients }
    }

    /// Coefficients over the harmonic subspace.
    #[inline]
    pub fn coefficients(&self) -> &na::DVector<f64> {
        &self.coefficients
    }

    /// Split into one cochain per form degree of the harmonic subspace.
    pub fn components<const D: usize>(&self, context: &MeshContext<'_, D>) -> Vec<Cochain> {
        context.harmonic_components(&self.coefficients)
    }
}

/// An orthonormal basis of discrete harmonic forms.
///
/// Orthonormality is with respect to the Whitney mass matrices
/// of the harmonic subspace, [`MeshContext::harmonic_mass`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HarmonicBasis {
    forms: Vec<HarmonicForm>,
}

impl HarmonicBasis {
    /// A basis with no forms, for simply connected domains
    /// or when the search is skipped.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of basis forms.
    #[inline]
    pub fn len(&self) -> usize {
        self.forms.len()
    }

    /// Whether there are no basis forms.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.forms.is_empty()
    }

    /// Iterate over the basis forms.
    pub fn iter(&self) -> std::slice::Iter<'_, HarmonicForm> {
        self.forms.iter()
    }

    /// Search the null space of the mixed operator without harmonic constraints
    /// and orthonormalize the vectors found.
    ///
    /// Also returns the null space for inspecting the computed values.
    /// Finding fewer or more forms than expected is not an error,
    /// but is logged as a warning during the search.
    pub fn search<const D: usize>(
        context: &MeshContext<'_, D>,
        search: &HarmonicSearch,
    ) -> Result<(Self, NullSpace), HodgeError> {
        search.validate()?;
        let operator = context.assemble_operator(&Self::empty());
        let null_space = find_near_null_space(operator.matrix(), search)?;
        let forms = orthonormalize(
            &null_space.vectors,
            |v| context.restrict_to_harmonic(v),
            context.harmonic_mass(),
        )?;
        log::info!("Harmonic basis has {} forms", forms.len());
        Ok((Self { forms }, null_space))
    }

    /// Restore a previously exported basis.
    ///
    /// The export must come from the same mesh, elements and boundary mode.
    /// Only the sizes are checked; a basis from a different mesh
    /// of the same size is accepted and gives meaningless results.
    pub fn from_export<const D: usize>(
        context: &MeshContext<'_, D>,
        export: &HarmonicBasisExport,
    ) -> Result<Self, ConfigError> {
        if export.count != export.basis_functions.len() {
            return Err(ConfigError::ImportedBasisCount {
                count: export.count,
                found: export.basis_functions.len(),
            });
        }
        let basis = Self {
            forms: export
                .basis_functions
                .iter()
                .map(|values| HarmonicForm::new(na::DVector::from_column_slice(values)))
                .collect(),
        };
        basis.check_shape(context)?;
        Ok(basis)
    }

    /// Check that every form has one coefficient
    /// per degree of freedom of the harmonic subspace of `context`.
    pub fn check_shape<const D: usize>(
        &self,
        context: &MeshContext<'_, D>,
    ) -> Result<(), ConfigError> {
        let expected = context.layout().harmonic_range().len();
        match self.forms.iter().position(|f| f.coefficients.len() != expected) {
            Some(index) => Err(ConfigError::BasisShape {
                index,
                expected,
                found: self.forms[index].coefficients.len(),
            }),
            None => Ok(()),
        }
    }

    /// Export the basis for importing later with [`from_export`][Self::from_export].
    pub fn export(&self) -> HarmonicBasisExport {
        HarmonicBasisExport {
            count: self.len(),
            basis_functions: self
                .forms
                .iter()
                .map(|f| f.coefficients.as_slice().to_vec())
                .collect(),
        }
    }
}

impl<'a> IntoIterator for &'a HarmonicBasis {
    type Item = &'a HarmonicForm;
    type IntoIter = std::slice::Iter<'a, HarmonicForm>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Persisted form of a harmonic basis.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HarmonicBasisExport {
    /// Number of basis functions.
    pub count: usize,
    /// Coefficients of each basis function over the harmonic subspace.
    pub basis_functions: Vec<Vec<f64>>,
}
