//! Assembly of the mixed saddle-point system.
//!
//! The mixed space is the direct sum of the Whitney spaces of every form degree,
//! a scalar gauge multiplier and one scalar per harmonic basis function.
//! For a 2D mesh the operator has the block structure
//!
//! ```text
//! ┌                                        ┐
//! │ 0        D₀ᵀM₁    0        g₀   0     │
//! │ M₁D₀     0        D₁ᵀM₂    0    M₁h   │
//! │ 0        M₂D₁     0        g₂   0     │
//! │ g₀ᵀ      0        g₂ᵀ      0    0     │
//! │ 0        (M₁h)ᵀ   0        0    0     │
//! └                                        ┘
//! ```
//!
//! where exactly one of the gauge couplings `g₀` (natural boundary)
//! or `g₂` (essential boundary) is present.
//! The 3D operator continues the pattern with the divergence block `M₃D₂`
//! and couples harmonic forms to both 1-forms and 2-forms.

use nalgebra as na;
use nalgebra_sparse as nas;

use std::ops::Range;

use crate::{
    context::MeshContext, element::ConfigError, harmonic::HarmonicBasis, sources::FormSources,
};

/// Numbering of the degrees of freedom of the mixed space:
/// one contiguous block per form degree, then the gauge multiplier,
/// then one multiplier per harmonic basis function.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MixedLayout {
    /// start of every form block, plus the end of the last one
    offsets: Vec<usize>,
    harmonic_count: usize,
}

impl MixedLayout {
    pub(crate) fn new(block_sizes: Vec<usize>) -> Self {
        let mut offsets = Vec::with_capacity(block_sizes.len() + 1);
        offsets.push(0);
        for size in block_sizes {
            offsets.push(offsets[offsets.len() - 1] + size);
        }
        Self {
            offsets,
            harmonic_count: 0,
        }
    }

    /// The same layout with multipliers for the given number of harmonic forms.
    pub fn with_harmonics(&self, harmonic_count: usize) -> Self {
        Self {
            offsets: self.offsets.clone(),
            harmonic_count,
        }
    }

    /// Highest form degree in the layout.
    #[inline]
    pub fn dim(&self) -> usize {
        self.offsets.len() - 2
    }

    /// Degrees of freedom of the `degree`-form block.
    #[inline]
    pub fn block(&self, degree: usize) -> Range<usize> {
        self.offsets[degree]..self.offsets[degree + 1]
    }

    /// Number of form degrees of freedom, excluding all multipliers.
    #[inline]
    pub fn form_dofs(&self) -> usize {
        self.offsets[self.offsets.len() - 1]
    }

    /// Index of the gauge multiplier.
    #[inline]
    pub fn gauge_index(&self) -> usize {
        self.form_dofs()
    }

    /// Number of harmonic multipliers.
    #[inline]
    pub fn harmonic_count(&self) -> usize {
        self.harmonic_count
    }

    /// Index of the multiplier of the `i`th harmonic basis function.
    #[inline]
    pub fn harmonic_index(&self, i: usize) -> usize {
        self.gauge_index() + 1 + i
    }

    /// The degrees of freedom that carry harmonic forms,
    /// i.e. every form block except the lowest and highest degree.
    #[inline]
    pub fn harmonic_range(&self) -> Range<usize> {
        self.offsets[1]..self.offsets[self.dim()]
    }

    /// Total size of the mixed space.
    #[inline]
    pub fn size(&self) -> usize {
        self.form_dofs() + 1 + self.harmonic_count
    }
}

/// The assembled bilinear form of the mixed system.
#[derive(Clone, Debug)]
pub struct MixedOperator {
    pub(crate) matrix: nas::CsrMatrix<f64>,
    pub(crate) layout: MixedLayout,
}

impl MixedOperator {
    /// The assembled sparse matrix.
    #[inline]
    pub fn matrix(&self) -> &nas::CsrMatrix<f64> {
        &self.matrix
    }

    /// Numbering of the degrees of freedom.
    #[inline]
    pub fn layout(&self) -> &MixedLayout {
        &self.layout
    }

    /// Number of rows (and columns).
    #[inline]
    pub fn size(&self) -> usize {
        self.matrix.nrows()
    }
}

impl<'m, const D: usize> MeshContext<'m, D> {
    /// Assemble the mixed operator, with a multiplier for each harmonic basis function.
    ///
    /// Essential constraints are applied symmetrically:
    /// the rows and columns of constrained degrees of freedom are cleared
    /// and their diagonal set to one.
    pub fn assemble_operator(&self, harmonics: &HarmonicBasis) -> MixedOperator {
        let layout = self.layout().with_harmonics(harmonics.len());
        let mut coo = nas::CooMatrix::new(layout.size(), layout.size());
        let mut push_symmetric = |row: usize, col: usize, val: f64| {
            if self.is_essential(row) || self.is_essential(col) {
                return;
            }
            coo.push(row, col, val);
            coo.push(col, row, val);
        };

        // exterior derivative blocks: gradient, curl, divergence
        for k in 0..D {
            let coupling = self.mass(k + 1) * self.derivative(k);
            let row_start = layout.block(k + 1).start;
            let col_start = layout.block(k).start;
            for (row, col, val) in coupling.triplet_iter() {
                push_symmetric(row_start + row, col_start + col, *val);
            }
        }

        let gauge_index = layout.gauge_index();
        let gauge_start = layout.block(self.gauge_degree()).start;
        for (i, val) in self.gauge().iter().enumerate() {
            push_symmetric(gauge_start + i, gauge_index, *val);
        }

        let harmonic_start = layout.harmonic_range().start;
        for (i, form) in harmonics.iter().enumerate() {
            let coupling = self.harmonic_mass() * form.coefficients();
            let multiplier = layout.harmonic_index(i);
            for (j, val) in coupling.iter().enumerate() {
                if *val != 0.0 {
                    push_symmetric(harmonic_start + j, multiplier, *val);
                }
            }
        }

        for dof in self.essential().ones() {
            coo.push(dof, dof, 1.0);
        }

        let matrix = nas::CsrMatrix::from(&coo);
        log::debug!(
            "Assembled mixed operator of size {} with {} nonzeros",
            matrix.nrows(),
            matrix.nnz()
        );
        MixedOperator { matrix, layout }
    }

    /// Assemble the right-hand side `M_k f_k` for every form degree `k`,
    /// with zeros on multiplier rows and constrained degrees of freedom.
    pub fn assemble_rhs(
        &self,
        sources: &FormSources,
        harmonic_count: usize,
    ) -> Result<na::DVector<f64>, ConfigError> {
        if sources.dim() != D {
            return Err(ConfigError::DimensionMismatch {
                config: sources.dim(),
                mesh: D,
            });
        }
        let layout = self.layout().with_harmonics(harmonic_count);
        let mut rhs = na::DVector::zeros(layout.size());
        for k in 0..=D {
            let source = sources.component(k);
            let block = layout.block(k);
            if source.len() != block.len() {
                return Err(ConfigError::SourceShape {
                    degree: k,
                    expected: block.len(),
                    found: source.len(),
                });
            }
            let weighted = self.mass(k) * &source.values;
            rhs.rows_mut(block.start, block.len()).copy_from(&weighted);
        }
        for dof in self.essential().ones() {
            rhs[dof] = 0.0;
        }
        Ok(rhs)
    }

    /// Assemble both the operator and the right-hand side.
    pub fn assemble(
        &self,
        harmonics: &HarmonicBasis,
        sources: &FormSources,
    ) -> Result<(MixedOperator, na::DVector<f64>), ConfigError> {
        let rhs = self.assemble_rhs(sources, harmonics.len())?;
        Ok((self.assemble_operator(harmonics), rhs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        context::BoundaryMode,
        element::ElementConfig,
        mesh::{square_grid_2d, tiny_mesh_3d},
    };
    use approx::relative_eq;

    fn is_symmetric(m: &nas::CsrMatrix<f64>) -> bool {
        let dense = na::DMatrix::from(m);
        relative_eq!(dense, dense.transpose(), epsilon = 1e-12)
    }

    #[test]
    fn layout_numbering() {
        let layout = MixedLayout::new(vec![4, 9, 6]).with_harmonics(2);
        assert_eq!(layout.dim(), 2);
        assert_eq!(layout.block(1), 4..13);
        assert_eq!(layout.gauge_index(), 19);
        assert_eq!(layout.harmonic_index(1), 21);
        assert_eq!(layout.harmonic_range(), 4..13);
        assert_eq!(layout.size(), 22);
    }

    #[test]
    fn operators_are_symmetric() {
        let mesh_2d = square_grid_2d(3, Some(1..2));
        let elements = ElementConfig::whitney(2).unwrap();
        for mode in [BoundaryMode::Natural, BoundaryMode::Essential] {
            let ctx = MeshContext::bind(&mesh_2d, &elements, mode).unwrap();
            let op = ctx.assemble_operator(&HarmonicBasis::empty());
            assert_eq!(op.size(), ctx.layout().form_dofs() + 1);
            assert!(is_symmetric(op.matrix()), "{mode:?} operator should be symmetric");
        }

        let mesh_3d = tiny_mesh_3d();
        let elements = ElementConfig::whitney(3).unwrap();
        let ctx = MeshContext::bind(&mesh_3d, &elements, BoundaryMode::Natural).unwrap();
        let op = ctx.assemble_operator(&HarmonicBasis::empty());
        assert!(is_symmetric(op.matrix()));
    }

    /// Constrained rows only contain their unit diagonal.
    #[test]
    fn essential_rows_are_identity() {
        let mesh = square_grid_2d(3, None);
        let elements = ElementConfig::whitney(2).unwrap();
        let ctx = MeshContext::bind(&mesh, &elements, BoundaryMode::Essential).unwrap();
        let op = ctx.assemble_operator(&HarmonicBasis::empty());
        for dof in ctx.essential().ones() {
            let row = op.matrix().row(dof);
            assert_eq!(row.col_indices(), &[dof]);
            assert_eq!(row.values(), &[1.0]);
        }
    }

    /// The gauge row pairs with the basis integrals of the gauge degree.
    #[test]
    fn gauge_row_integrates() {
        let mesh = square_grid_2d(2, None);
        let elements = ElementConfig::whitney(2).unwrap();
        let ctx = MeshContext::bind(&mesh, &elements, BoundaryMode::Natural).unwrap();
        let op = ctx.assemble_operator(&HarmonicBasis::empty());
        let layout = op.layout();

        // constant 0-form of value 1 is integrated to the area of the domain
        let mut x = na::DVector::zeros(layout.size());
        x.rows_mut(0, layout.block(0).len()).fill(1.0);
        let y = op.matrix() * &x;
        assert!(relative_eq!(y[layout.gauge_index()], 1.0, epsilon = 1e-12));
        // and has zero gradient
        for dof in layout.block(1) {
            assert!(y[dof].abs() < 1e-12);
        }
    }

    #[test]
    fn rhs_is_mass_weighted() {
        let mesh = square_grid_2d(2, None);
        let elements = ElementConfig::whitney(2).unwrap();
        let ctx = MeshContext::bind(&mesh, &elements, BoundaryMode::Natural).unwrap();
        let mut sources = FormSources::zeros(&mesh);
        let mut density = mesh.new_zero_cochain(2);
        density.values.fill(2.0);
        sources.set(density.clone());

        let rhs = ctx.assemble_rhs(&sources, 0).unwrap();
        let block = ctx.layout().block(2);
        let expected = ctx.mass(2) * &density.values;
        assert!(relative_eq!(
            rhs.rows(block.start, block.len()).into_owned(),
            expected,
            epsilon = 1e-12
        ));
        assert_eq!(rhs[ctx.layout().gauge_index()], 0.0);

        let wrong_mesh = square_grid_2d(3, None);
        let err = ctx.assemble_rhs(&FormSources::zeros(&wrong_mesh), 0).unwrap_err();
        assert!(matches!(err, ConfigError::SourceShape { degree: 0, .. }));
    }
}
