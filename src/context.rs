//! The explicit binding of a mesh to an element configuration and boundary mode.
//!
//! A [`MeshContext`] holds everything derived from the mesh
//! that later stages need: exterior derivative and mass matrices,
//! the gauge coupling and the constrained degrees of freedom.
//! It's built once per mesh and passed to every later stage,
//! so nothing can silently refer to a different mesh.

use fixedbitset as fb;
use nalgebra as na;
use nalgebra_sparse as nas;

use std::ops::Range;

use crate::{
    assembly::MixedLayout,
    element::{ConfigError, ElementConfig},
    whitney, Cochain, SimplicialMesh,
};

/// How the boundary of the domain is treated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BoundaryMode {
    /// No essential constraints.
    /// The gauge multiplier pairs with the 0-form.
    #[default]
    Natural,
    /// Zero Dirichlet conditions on the traces of all forms
    /// below the top degree on the whole boundary.
    /// The gauge multiplier pairs with the top form instead.
    Essential,
}

/// Matrices and boundary data derived from a mesh,
/// bound to an element configuration and boundary mode.
#[derive(Clone, Debug)]
pub struct MeshContext<'m, const D: usize> {
    mesh: &'m SimplicialMesh<D>,
    elements: ElementConfig,
    boundary: BoundaryMode,
    /// coboundary matrices `D_k` for `k < D`
    derivatives: Vec<nas::CsrMatrix<f64>>,
    /// Whitney mass matrices `M_k` for `k <= D`
    masses: Vec<nas::CsrMatrix<f64>>,
    /// `blockdiag(M_1, ..., M_{D-1})`
    harmonic_mass: nas::CsrMatrix<f64>,
    gauge_degree: usize,
    gauge: na::DVector<f64>,
    layout: MixedLayout,
    /// constrained degrees of freedom in the mixed numbering
    essential: fb::FixedBitSet,
}

impl<'m, const D: usize> MeshContext<'m, D> {
    /// Bind a mesh to an element configuration and boundary mode,
    /// computing the matrices every later stage needs.
    pub fn bind(
        mesh: &'m SimplicialMesh<D>,
        elements: &ElementConfig,
        boundary: BoundaryMode,
    ) -> Result<Self, ConfigError> {
        if !(2..=3).contains(&D) {
            return Err(ConfigError::UnsupportedDimension(D));
        }
        if elements.dim() != D {
            return Err(ConfigError::DimensionMismatch {
                config: elements.dim(),
                mesh: D,
            });
        }

        let derivatives: Vec<_> = (0..D).map(|k| mesh.d(k)).collect();
        let masses: Vec<_> = (0..=D).map(|k| whitney::mass_matrix(mesh, k)).collect();
        let harmonic_mass = block_diagonal(&masses[1..D]);

        let gauge_degree = match boundary {
            BoundaryMode::Natural => 0,
            BoundaryMode::Essential => D,
        };
        let gauge = whitney::basis_integrals(mesh, gauge_degree);

        let layout = MixedLayout::new((0..=D).map(|k| mesh.simplex_count(k)).collect());

        let mut essential = fb::FixedBitSet::with_capacity(layout.form_dofs());
        if boundary == BoundaryMode::Essential {
            for k in 0..D {
                let start = layout.block(k).start;
                for idx in mesh.boundary(k).ones() {
                    essential.insert(start + idx);
                }
            }
        }

        log::info!(
            "Bound {D}D mesh: {} form degrees of freedom ({:?}), {:?} boundary, {} constrained",
            layout.form_dofs(),
            (0..=D).map(|k| mesh.simplex_count(k)).collect::<Vec<_>>(),
            boundary,
            essential.count_ones(..),
        );

        Ok(Self {
            mesh,
            elements: elements.clone(),
            boundary,
            derivatives,
            masses,
            harmonic_mass,
            gauge_degree,
            gauge,
            layout,
            essential,
        })
    }

    /// The mesh this context is bound to.
    #[inline]
    pub fn mesh(&self) -> &'m SimplicialMesh<D> {
        self.mesh
    }

    /// The element configuration.
    #[inline]
    pub fn elements(&self) -> &ElementConfig {
        &self.elements
    }

    /// The boundary mode.
    #[inline]
    pub fn boundary_mode(&self) -> BoundaryMode {
        self.boundary
    }

    /// Exterior derivative from `degree`-forms to `degree + 1`-forms.
    #[inline]
    pub fn derivative(&self, degree: usize) -> &nas::CsrMatrix<f64> {
        &self.derivatives[degree]
    }

    /// Mass matrix of `degree`-forms.
    #[inline]
    pub fn mass(&self, degree: usize) -> &nas::CsrMatrix<f64> {
        &self.masses[degree]
    }

    /// The l1 norm (largest absolute column sum) of the 1-form mass matrix.
    ///
    /// An unusually large value flags a mesh on which the mixed system blows up.
    /// Slightly enlarging the domain is usually enough to fix such a mesh.
    pub fn mass_l1_norm(&self) -> f64 {
        let mass = self.mass(1);
        let mut column_sums = vec![0.0; mass.ncols()];
        for (_, col, val) in mass.triplet_iter() {
            column_sums[col] += val.abs();
        }
        column_sums.into_iter().fold(0.0, f64::max)
    }

    /// The inner product matrix on the harmonic subspace,
    /// i.e. the mass matrices of form degrees `1..D` on the diagonal.
    #[inline]
    pub fn harmonic_mass(&self) -> &nas::CsrMatrix<f64> {
        &self.harmonic_mass
    }

    /// Form degrees that carry harmonic forms: 1 in 2D, 1 and 2 in 3D.
    #[inline]
    pub fn harmonic_degrees(&self) -> Range<usize> {
        1..D
    }

    /// Form degree the gauge multiplier pairs with.
    #[inline]
    pub fn gauge_degree(&self) -> usize {
        self.gauge_degree
    }

    /// Coupling vector of the gauge multiplier,
    /// the basis integrals of the gauge degree.
    #[inline]
    pub fn gauge(&self) -> &na::DVector<f64> {
        &self.gauge
    }

    /// Layout of the mixed space without harmonic multipliers.
    #[inline]
    pub fn layout(&self) -> &MixedLayout {
        &self.layout
    }

    /// Constrained degrees of freedom in the mixed numbering.
    /// Empty unless the boundary mode is [`Essential`][BoundaryMode::Essential].
    #[inline]
    pub fn essential(&self) -> &fb::FixedBitSet {
        &self.essential
    }

    #[inline]
    pub(crate) fn is_essential(&self, dof: usize) -> bool {
        dof < self.essential.len() && self.essential.contains(dof)
    }

    /// Restrict a vector in the mixed numbering to the harmonic subspace.
    pub fn restrict_to_harmonic(&self, mixed: &na::DVector<f64>) -> na::DVector<f64> {
        let range = self.layout.harmonic_range();
        mixed.rows(range.start, range.len()).into_owned()
    }

    /// Split a vector over the harmonic subspace into a cochain per form degree.
    pub fn harmonic_components(&self, coefficients: &na::DVector<f64>) -> Vec<Cochain> {
        let offset = self.layout.harmonic_range().start;
        self.harmonic_degrees()
            .map(|k| {
                let block = self.layout.block(k);
                let values = coefficients
                    .rows(block.start - offset, block.len())
                    .into_owned();
                Cochain::from_values(k, values)
            })
            .collect()
    }
}

/// Place square matrices along the diagonal of a larger one.
fn block_diagonal(blocks: &[nas::CsrMatrix<f64>]) -> nas::CsrMatrix<f64> {
    let size = blocks.iter().map(|b| b.nrows()).sum();
    let mut coo = nas::CooMatrix::new(size, size);
    let mut offset = 0;
    for block in blocks {
        for (row, col, val) in block.triplet_iter() {
            coo.push(offset + row, offset + col, *val);
        }
        offset += block.nrows();
    }
    nas::CsrMatrix::from(&coo)
}
