//! The augmented mixed solver: binds a mesh and configuration,
//! finds (or imports) the harmonic basis once,
//! and then solves the mixed system for any number of sources.
//!
//! # Example
//!
//! ```
//! # use hodge_harmonic::{mesh::square_grid_2d, sources, *};
//! # fn run() -> Result<(), HodgeError> {
//! // a unit square with a square hole in the middle
//! let mesh = square_grid_2d(5, Some(2..3));
//! let config = HodgeConfig::whitney(2)?
//!     .with_harmonics(HarmonicSource::Search(
//!         HarmonicSearch::new(1).with_tuning(SolverTuning::Dense),
//!     ));
//! let solver = HodgeSolver::init_mesh(&mesh, &config)?;
//! assert_eq!(solver.harmonic_basis().len(), 1);
//!
//! let current = sources::densities_2d(&mesh, |p| p.x * p.y);
//! let sources = FormSources::zeros(&mesh).with(current);
//! let field = solver.solve_dual_field(&sources)?;
//! assert_eq!(field.barycenter_values.len(), mesh.simplex_count(2));
//! # Ok(())
//! # }
//! # run().expect("solve failed");
//! ```

use nalgebra as na;
use nalgebra_sparse as nas;

use crate::{
    assembly::{MixedLayout, MixedOperator},
    context::{BoundaryMode, MeshContext},
    element::{ConfigError, ElementConfig},
    gmsh::GmshError,
    harmonic::{HarmonicBasis, HarmonicBasisExport},
    linsolve::{LinearSolveError, LinearSolver},
    mesh::MeshError,
    nullspace::{HarmonicSearch, NullSpace, NullSpaceError},
    orthonormalize::OrthonormalizeError,
    sources::FormSources,
    whitney, Cochain, SimplicialMesh,
};

/// Any error that can happen while setting up or running the solver.
#[derive(thiserror::Error, Debug)]
pub enum HodgeError {
    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Invalid mesh.
    #[error(transparent)]
    Mesh(#[from] MeshError),
    /// Failure loading a mesh file.
    #[error(transparent)]
    Gmsh(#[from] GmshError),
    /// The harmonic search failed.
    #[error(transparent)]
    NullSpace(#[from] NullSpaceError),
    /// The harmonic search returned dependent vectors.
    #[error(transparent)]
    Orthonormalize(#[from] OrthonormalizeError),
    /// The mixed system couldn't be solved.
    #[error(transparent)]
    LinearSolve(#[from] LinearSolveError),
}

/// Where the harmonic basis comes from.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum HarmonicSource {
    /// No harmonic forms, for simply connected domains.
    #[default]
    None,
    /// Search the null space of the mixed operator.
    Search(HarmonicSearch),
    /// Restore a basis exported from an earlier run
    /// with the same mesh, elements and boundary mode.
    Imported(HarmonicBasisExport),
}

/// Everything that configures a [`HodgeSolver`].
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HodgeConfig {
    /// Finite elements of every form degree.
    pub elements: ElementConfig,
    /// Boundary conditions.
    pub boundary: BoundaryMode,
    /// Source of the harmonic basis.
    pub harmonics: HarmonicSource,
    /// Solver for the augmented system.
    pub linear_solver: LinearSolver,
}

impl HodgeConfig {
    /// Natural boundary conditions, no harmonic forms and a sparse LU solver.
    pub fn new(elements: ElementConfig) -> Self {
        Self {
            elements,
            boundary: BoundaryMode::default(),
            harmonics: HarmonicSource::default(),
            linear_solver: LinearSolver::default(),
        }
    }

    /// Default configuration with Whitney elements of every form degree.
    pub fn whitney(dim: usize) -> Result<Self, ConfigError> {
        Ok(Self::new(ElementConfig::whitney(dim)?))
    }

    /// Set the boundary conditions.
    pub fn with_boundary(mut self, boundary: BoundaryMode) -> Self {
        self.boundary = boundary;
        self
    }

    /// Set the source of the harmonic basis.
    pub fn with_harmonics(mut self, harmonics: HarmonicSource) -> Self {
        self.harmonics = harmonics;
        self
    }

    /// Set the linear solver.
    pub fn with_linear_solver(mut self, linear_solver: LinearSolver) -> Self {
        self.linear_solver = linear_solver;
        self
    }
}

/// Solution of the mixed system.
#[derive(Clone, Debug)]
pub struct MixedSolution {
    values: na::DVector<f64>,
    layout: MixedLayout,
}

impl MixedSolution {
    /// The form component of the given degree.
    ///
    /// # Panics
    ///
    /// If the degree is higher than the dimension of the mesh.
    pub fn component(&self, degree: usize) -> Cochain {
        assert!(
            degree <= self.layout.dim(),
            "No {degree}-form component on a {}-dimensional mesh",
            self.layout.dim()
        );
        let block = self.layout.block(degree);
        Cochain::from_values(degree, self.values.rows(block.start, block.len()).into_owned())
    }

    /// Value of the gauge multiplier.
    #[inline]
    pub fn gauge(&self) -> f64 {
        self.values[self.layout.gauge_index()]
    }

    /// Values of the harmonic multipliers, one per basis form.
    pub fn harmonic_coefficients(&self) -> na::DVector<f64> {
        let start = self.layout.gauge_index() + 1;
        self.values
            .rows(start, self.layout.harmonic_count())
            .into_owned()
    }

    /// The whole solution vector in the mixed numbering.
    #[inline]
    pub fn values(&self) -> &na::DVector<f64> {
        &self.values
    }

    /// Numbering of the solution vector.
    #[inline]
    pub fn layout(&self) -> &MixedLayout {
        &self.layout
    }
}

/// The 2D dual field, the 1-form solution rotated by 90 degrees.
#[derive(Clone, Debug)]
pub struct DualField {
    /// L2 projection of the rotated field onto Whitney 1-forms.
    pub cochain: Cochain,
    /// The projected field evaluated at the barycenter of every triangle.
    pub barycenter_values: Vec<na::Vector2<f64>>,
}

/// Solver of the mixed Hodge system augmented with a harmonic basis.
///
/// The operator is assembled once when the solver is created
/// and reused for every call to [`solve`][Self::solve].
#[derive(Debug)]
pub struct HodgeSolver<'m, const D: usize> {
    context: MeshContext<'m, D>,
    basis: HarmonicBasis,
    null_space: Option<NullSpace>,
    operator: MixedOperator,
    linear_solver: LinearSolver,
}

impl<'m, const D: usize> HodgeSolver<'m, D> {
    /// Bind a mesh and set up the harmonic basis as configured.
    ///
    /// This is where the expensive null space search happens, if any.
    pub fn init_mesh(mesh: &'m SimplicialMesh<D>, config: &HodgeConfig) -> Result<Self, HodgeError> {
        let context = MeshContext::bind(mesh, &config.elements, config.boundary)?;

        let (basis, null_space) = match &config.harmonics {
            HarmonicSource::None => (HarmonicBasis::empty(), None),
            HarmonicSource::Search(search) => {
                let (basis, null_space) = HarmonicBasis::search(&context, search)?;
                (basis, Some(null_space))
            }
            HarmonicSource::Imported(export) => {
                let basis = HarmonicBasis::from_export(&context, export)?;
                log::info!("Imported a harmonic basis of {} forms", basis.len());
                (basis, None)
            }
        };

        let mut solver = Self::with_basis(context, basis, config.linear_solver)?;
        solver.null_space = null_space;
        Ok(solver)
    }

    /// Create a solver from an already bound mesh and a known basis.
    ///
    /// Fails if any form of the basis doesn't match the sizes of the mesh.
    pub fn with_basis(
        context: MeshContext<'m, D>,
        basis: HarmonicBasis,
        linear_solver: LinearSolver,
    ) -> Result<Self, ConfigError> {
        basis.check_shape(&context)?;
        log::debug!("1-form mass matrix has l1 norm {:e}", context.mass_l1_norm());
        let operator = context.assemble_operator(&basis);
        log::info!(
            "Mixed system has {} unknowns with {} harmonic forms",
            operator.size(),
            basis.len()
        );
        Ok(Self {
            context,
            basis,
            null_space: None,
            operator,
            linear_solver,
        })
    }

    /// Solve the augmented system for the given sources.
    pub fn solve(&self, sources: &FormSources) -> Result<MixedSolution, HodgeError> {
        let rhs = self.context.assemble_rhs(sources, self.basis.len())?;
        let values = self.linear_solver.solve(self.operator.matrix(), &rhs)?;
        Ok(MixedSolution {
            values,
            layout: self.operator.layout().clone(),
        })
    }

    /// Export the harmonic basis for later runs with the same mesh and configuration.
    pub fn export_harmonic_basis(&self) -> HarmonicBasisExport {
        self.basis.export()
    }

    /// The harmonic basis in use.
    #[inline]
    pub fn harmonic_basis(&self) -> &HarmonicBasis {
        &self.basis
    }

    /// Result of the null space search, if one was made.
    #[inline]
    pub fn null_space(&self) -> Option<&NullSpace> {
        self.null_space.as_ref()
    }

    /// The mesh binding with its matrices.
    #[inline]
    pub fn context(&self) -> &MeshContext<'m, D> {
        &self.context
    }

    /// The assembled augmented operator.
    #[inline]
    pub fn operator(&self) -> &MixedOperator {
        &self.operator
    }
}

impl HodgeSolver<'_, 2> {
    /// Rotate the 1-form component of a solution by 90 degrees
    /// and project it back onto Whitney 1-forms.
    pub fn dual_field(&self, solution: &MixedSolution) -> Result<DualField, HodgeError> {
        let mesh = self.context.mesh();
        let u = solution.component(1);
        let rotated = &whitney::rotation_matrix(mesh) * &u.values;

        let mass = nas::CscMatrix::from(self.context.mass(1));
        let factor = nas::factorization::CscCholesky::factor(&mass).map_err(|e| {
            LinearSolveError::Factorization(format!("1-form mass matrix: {e:?}"))
        })?;
        let rhs = na::DMatrix::from_column_slice(rotated.len(), 1, rotated.as_slice());
        let projected = factor.solve(&rhs);
        let cochain = Cochain::from_values(1, na::DVector::from_column_slice(projected.as_slice()));

        let barycenter_values = whitney::barycenter_values(mesh, &cochain);
        Ok(DualField {
            cochain,
            barycenter_values,
        })
    }

    /// [`solve`][Self::solve] followed by [`dual_field`][Self::dual_field].
    pub fn solve_dual_field(&self, sources: &FormSources) -> Result<DualField, HodgeError> {
        let solution = self.solve(sources)?;
        self.dual_field(&solution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        linsolve::MinresConfig,
        mesh::{cube_grid_3d, hollow_cube_3d, square_grid_2d},
        nullspace::{QrTuning, SolverTuning},
        sources::{circulations, densities_2d, fluxes},
    };
    use approx::relative_eq;

    fn dense_search(expected: usize) -> HarmonicSource {
        HarmonicSource::Search(
            HarmonicSearch::new(expected)
                .with_threshold(1e-8)
                .with_tuning(SolverTuning::Dense),
        )
    }

    fn residual(solver: &HodgeSolver<'_, 2>, sources: &FormSources, x: &MixedSolution) -> f64 {
        let rhs = solver
            .context()
            .assemble_rhs(sources, solver.harmonic_basis().len())
            .unwrap();
        (solver.operator().matrix() * x.values() - &rhs).norm() / rhs.norm()
    }

    /// With essential boundary conditions on a simply connected domain,
    /// the interior equations of a 1-form source hold
    /// and the constrained values vanish.
    #[test]
    fn essential_solve_satisfies_interior_equations() {
        let mesh = square_grid_2d(4, None);
        let config = HodgeConfig::whitney(2)
            .unwrap()
            .with_boundary(BoundaryMode::Essential);
        let solver = HodgeSolver::init_mesh(&mesh, &config).unwrap();
        assert!(solver.harmonic_basis().is_empty());
        assert!(solver.null_space().is_none());

        // neither curl-free nor divergence-free
        let f = circulations(&mesh, |p| na::Vector2::new(p.x * p.x, p.x * p.y));
        let sources = FormSources::zeros(&mesh).with(f.clone());
        let solution = solver.solve(&sources).unwrap();
        let ctx = solver.context();
        let (u0, u1, u2) = (
            solution.component(0),
            solution.component(1),
            solution.component(2),
        );

        let m1 = ctx.mass(1);
        let m2 = ctx.mass(2);
        let d0 = ctx.derivative(0);
        let d1 = ctx.derivative(1);
        let edge_eq = m1 * &(d0 * &u0.values) + &d1.transpose() * &(m2 * &u2.values)
            - m1 * &f.values;
        let vertex_eq = &d0.transpose() * &(m1 * &u1.values);

        let edges = ctx.layout().block(1);
        let boundary_edges = mesh.boundary(1);
        for (i, val) in edge_eq.iter().enumerate() {
            if boundary_edges.contains(i) {
                assert!(u1.values[i].abs() < 1e-12, "boundary edge {i} has {}", u1.values[i]);
            } else {
                assert!(val.abs() < 1e-9, "edge equation {i} has residual {val}");
            }
            assert!(ctx.is_essential(edges.start + i) == boundary_edges.contains(i));
        }
        let boundary_verts = mesh.boundary(0);
        for (i, val) in vertex_eq.iter().enumerate() {
            if boundary_verts.contains(i) {
                assert!(u0.values[i].abs() < 1e-12, "boundary vertex {i} has {}", u0.values[i]);
            } else {
                assert!(val.abs() < 1e-9, "vertex equation {i} has residual {val}");
            }
        }
        assert!(u0.values.norm() > 1e-3, "gradient part should be nontrivial");
        assert!(u2.values.norm() > 1e-3, "curl part should be nontrivial");
    }

    /// On an annulus the solution is orthogonal to the harmonic form,
    /// and a re-imported basis reproduces it.
    #[test]
    fn harmonic_constraint_and_reimport() {
        let mesh = square_grid_2d(5, Some(2..3));
        let config = HodgeConfig::whitney(2)
            .unwrap()
            .with_harmonics(dense_search(1));
        let solver = HodgeSolver::init_mesh(&mesh, &config).unwrap();
        assert_eq!(solver.harmonic_basis().len(), 1);
        assert!(solver.null_space().is_some_and(|ns| ns.is_complete()));

        // a field circulating around the hole has a harmonic part
        let swirl = |p: na::Vector2<f64>| na::Vector2::new(0.5 - p.y, p.x - 0.5);
        let sources = FormSources::zeros(&mesh)
            .with(circulations(&mesh, swirl))
            .with(densities_2d(&mesh, |p| p.x - p.y));
        let solution = solver.solve(&sources).unwrap();
        assert!(residual(&solver, &sources, &solution) < 1e-10);
        assert_eq!(solution.harmonic_coefficients().len(), 1);

        let ctx = solver.context();
        let h = solver.harmonic_basis().iter().next().unwrap();
        let u_h = ctx.restrict_to_harmonic(solution.values());
        let overlap = h.coefficients().dot(&(ctx.harmonic_mass() * &u_h));
        assert!(overlap.abs() < 1e-10, "overlap with harmonic form {overlap}");

        let export = solver.export_harmonic_basis();
        let config = config.with_harmonics(HarmonicSource::Imported(export));
        let reimported = HodgeSolver::init_mesh(&mesh, &config).unwrap();
        assert!(reimported.null_space().is_none());
        let again = reimported.solve(&sources).unwrap();
        assert!(
            relative_eq!(again.values(), solution.values(), epsilon = 1e-12),
            "re-imported basis gave a different solution"
        );
    }

    #[test]
    fn minres_matches_lu() {
        let mesh = square_grid_2d(3, None);
        let config = HodgeConfig::whitney(2).unwrap();
        let sources = FormSources::zeros(&mesh)
            .with(circulations(&mesh, |p| na::Vector2::new(p.x * p.y, -p.x)))
            .with(densities_2d(&mesh, |p| 1.0 + p.y));

        let lu = HodgeSolver::init_mesh(&mesh, &config)
            .unwrap()
            .solve(&sources)
            .unwrap();
        let minres_config = config.with_linear_solver(LinearSolver::Minres(MinresConfig {
            rel_tol: 1e-13,
            max_iter: Some(10_000),
        }));
        let minres = HodgeSolver::init_mesh(&mesh, &minres_config)
            .unwrap()
            .solve(&sources)
            .unwrap();

        let diff = (lu.values() - minres.values()).norm() / lu.values().norm();
        assert!(diff < 1e-7, "relative difference {diff:e}");
    }

    /// A constant 1-form rotates into a constant 1-form.
    #[test]
    fn dual_field_of_constant_is_exact() {
        let mesh = square_grid_2d(3, None);
        let solver = HodgeSolver::init_mesh(&mesh, &HodgeConfig::whitney(2).unwrap()).unwrap();

        let u = circulations(&mesh, |_| na::Vector2::new(1.0, 2.0));
        let mut values = na::DVector::zeros(solver.operator().size());
        let block = solver.context().layout().block(1);
        values.rows_mut(block.start, block.len()).copy_from(&u.values);
        let solution = MixedSolution {
            values,
            layout: solver.operator().layout().clone(),
        };

        let dual = solver.dual_field(&solution).unwrap();
        let expected = circulations(&mesh, |_| na::Vector2::new(2.0, -1.0));
        assert!(
            relative_eq!(dual.cochain.values, expected.values, epsilon = 1e-10),
            "expected {:?}, got {:?}",
            expected,
            dual.cochain
        );
        assert_eq!(dual.barycenter_values.len(), mesh.simplex_count(2));
        for b in &dual.barycenter_values {
            assert!(relative_eq!(*b, na::Vector2::new(2.0, -1.0), epsilon = 1e-10));
        }
    }

    /// A solid torus has one harmonic 1-form,
    /// and the 3D system couples it to 1-forms.
    #[test]
    fn ring_solve_3d() {
        let mesh = cube_grid_3d([3, 3, 1], Some((1..2, 1..2)));
        let config = HodgeConfig::whitney(3)
            .unwrap()
            .with_harmonics(dense_search(1));
        let solver = HodgeSolver::init_mesh(&mesh, &config).unwrap();
        assert_eq!(solver.harmonic_basis().len(), 1);

        let field = |p: na::Vector3<f64>| na::Vector3::new(p.z, -p.x * p.y, 1.0);
        let sources = FormSources::zeros(&mesh)
            .with(circulations(&mesh, field))
            .with(fluxes(&mesh, field));
        let solution = solver.solve(&sources).unwrap();

        let rhs = solver.context().assemble_rhs(&sources, 1).unwrap();
        let residual =
            (solver.operator().matrix() * solution.values() - &rhs).norm() / rhs.norm();
        assert!(residual < 1e-10, "residual {residual:e}");
        assert_eq!(solution.component(2).len(), mesh.simplex_count(2));
    }

    /// A cube with a closed void has a harmonic 2-form and no harmonic 1-form.
    /// The basis survives export and the solution is orthogonal to it.
    #[test]
    fn hollow_cube_solve_3d() {
        let mesh = hollow_cube_3d(3, 1..2);
        let config = HodgeConfig::whitney(3).unwrap().with_harmonics(HarmonicSource::Search(
            HarmonicSearch::new(1)
                .with_threshold(1e-8)
                .with_tuning(SolverTuning::Qr(QrTuning::default())),
        ));
        let solver = HodgeSolver::init_mesh(&mesh, &config).unwrap();
        assert_eq!(solver.harmonic_basis().len(), 1);

        let ctx = solver.context();
        let h = solver.harmonic_basis().iter().next().unwrap();
        let components = h.components(ctx);
        assert_eq!(components.len(), 2);
        let (h1, h2) = (&components[0], &components[1]);
        assert_eq!(h1.degree(), 1);
        assert_eq!(h2.degree(), 2);
        assert!(h1.values.norm() < 1e-6, "1-form part has norm {}", h1.values.norm());
        let h2_norm = h2.values.dot(&(ctx.mass(2) * &h2.values)).sqrt();
        assert!(relative_eq!(h2_norm, 1.0, epsilon = 1e-8), "2-form norm {h2_norm}");

        let export = solver.export_harmonic_basis();
        let reimported = HarmonicBasis::from_export(ctx, &export).unwrap();
        assert_eq!(&reimported, solver.harmonic_basis());

        // flux out of the void gives the source a harmonic part
        let outward = |p: na::Vector3<f64>| p - na::Vector3::repeat(0.5);
        let sources = FormSources::zeros(&mesh)
            .with(circulations(&mesh, |p| na::Vector3::new(p.y, p.z * p.x, 1.0)))
            .with(fluxes(&mesh, outward));
        let solution = solver.solve(&sources).unwrap();
        let rhs = ctx.assemble_rhs(&sources, 1).unwrap();
        let residual =
            (solver.operator().matrix() * solution.values() - &rhs).norm() / rhs.norm();
        assert!(residual < 1e-10, "residual {residual:e}");

        let u_h = ctx.restrict_to_harmonic(solution.values());
        let overlap = h.coefficients().dot(&(ctx.harmonic_mass() * &u_h));
        assert!(overlap.abs() < 1e-10, "overlap with harmonic form {overlap}");
    }

    #[test]
    fn basis_from_another_mesh_is_rejected() {
        let annulus = square_grid_2d(5, Some(2..3));
        let config = HodgeConfig::whitney(2)
            .unwrap()
            .with_harmonics(dense_search(1));
        let basis = HodgeSolver::init_mesh(&annulus, &config)
            .unwrap()
            .harmonic_basis()
            .clone();

        let mesh = square_grid_2d(3, None);
        let elements = ElementConfig::whitney(2).unwrap();
        let context = MeshContext::bind(&mesh, &elements, BoundaryMode::Natural).unwrap();
        let edges = mesh.simplex_count(1);
        let result = HodgeSolver::with_basis(context, basis, LinearSolver::default());
        assert!(
            matches!(
                result,
                Err(ConfigError::BasisShape { index: 0, expected, .. }) if expected == edges
            ),
            "{result:?}"
        );
    }

    #[test]
    fn errors_are_reported() {
        let mesh = square_grid_2d(3, None);

        let config = HodgeConfig::whitney(3).unwrap();
        assert!(matches!(
            HodgeSolver::init_mesh(&mesh, &config),
            Err(HodgeError::Config(ConfigError::DimensionMismatch { .. }))
        ));

        let config = HodgeConfig::whitney(2)
            .unwrap()
            .with_harmonics(HarmonicSource::Search(
                HarmonicSearch::new(1).with_threshold(-1.0),
            ));
        assert!(matches!(
            HodgeSolver::init_mesh(&mesh, &config),
            Err(HodgeError::Config(ConfigError::InvalidTuning(_)))
        ));

        // a zero harmonic form leaves its multiplier unconstrained
        let degenerate = HarmonicBasisExport {
            count: 1,
            basis_functions: vec![vec![0.0; mesh.simplex_count(1)]],
        };
        let config = HodgeConfig::whitney(2)
            .unwrap()
            .with_harmonics(HarmonicSource::Imported(degenerate));
        let solver = HodgeSolver::init_mesh(&mesh, &config).unwrap();
        let sources = FormSources::zeros(&mesh).with(densities_2d(&mesh, |_| 1.0));
        assert!(matches!(
            solver.solve(&sources),
            Err(HodgeError::LinearSolve(
                LinearSolveError::Singular { .. } | LinearSolveError::Inaccurate(_)
            ))
        ));
    }
}
