//! Discrete Hodge decomposition with harmonic forms on simplicial meshes.
//!
//! The mixed formulation of the Hodge Laplacian with lowest-order Whitney forms
//! is assembled on a 2D or 3D mesh, its near null space is searched
//! for discrete harmonic forms, and the system augmented with
//! one multiplier per harmonic form is solved for given sources.
//! In 2D the 1-form part of the solution can be rotated into the dual field
//! (the Biot-Savart field of a current density).
//!
//! The entry point is [`HodgeSolver`], configured with [`HodgeConfig`].

#![warn(missing_docs)]

pub mod mesh;
#[doc(inline)]
pub use mesh::{MeshError, SimplicialMesh};

pub mod cochain;
#[doc(inline)]
pub use cochain::Cochain;

pub mod gmsh;

pub mod quadrature;

pub mod sources;
#[doc(inline)]
pub use sources::FormSources;

pub mod element;
#[doc(inline)]
pub use element::{ConfigError, ElementConfig, ElementFamily, ElementSpec};

pub mod whitney;

pub mod context;
#[doc(inline)]
pub use context::{BoundaryMode, MeshContext};

pub mod assembly;
#[doc(inline)]
pub use assembly::{MixedLayout, MixedOperator};

pub mod nullspace;
#[doc(inline)]
pub use nullspace::{
    find_near_null_space, HarmonicSearch, IterativeTuning, NullSpace, NullSpaceError, QrTuning,
    SolverTuning, SubspaceSize,
};

pub mod orthonormalize;
#[doc(inline)]
pub use orthonormalize::{orthonormalize, OrthonormalizeError};

pub mod harmonic;
#[doc(inline)]
pub use harmonic::{HarmonicBasis, HarmonicBasisExport, HarmonicForm};

pub mod linsolve;
#[doc(inline)]
pub use linsolve::{LinearSolveError, LinearSolver, MinresConfig};

pub mod solver;
#[doc(inline)]
pub use solver::{DualField, HarmonicSource, HodgeConfig, HodgeError, HodgeSolver, MixedSolution};

// nalgebra re-exports of common types for convenience

pub use nalgebra as na;
/// Type alias for a 2D `nalgebra` vector.
pub type Vec2 = na::Vector2<f64>;
/// Type alias for a 3D `nalgebra` vector.
pub type Vec3 = na::Vector3<f64>;
