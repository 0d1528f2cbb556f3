//! The simplicial mesh that all discrete forms live on.

/// Low-level mesh construction, test meshes and corresponding tests.
mod mesh_construction;
/// re-export the testing meshes for use in other modules' tests
/// (pub because doctests and downstream tests need a mesh instance
/// and mesh generation is out of scope for this crate)
#[doc(hidden)]
pub use mesh_construction::{
    cube_grid_3d, hollow_cube_3d, square_grid_2d, tiny_mesh_2d, tiny_mesh_3d,
};

//

use fixedbitset as fb;
use nalgebra as na;
use nalgebra_sparse as nas;

use itertools::izip;
use std::{cell::OnceCell, collections::HashMap};

use crate::{quadrature::Quadrature, Cochain};

/// Error in constructing a mesh from raw vertices and indices.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum MeshError {
    /// The index array isn't a whole number of simplices.
    #[error("{len} indices can't be split into simplices of {simplex_size} vertices")]
    IndexCount {
        /// Length of the index array.
        len: usize,
        /// Number of vertices per top-dimensional simplex.
        simplex_size: usize,
    },
    /// A simplex refers to a vertex that doesn't exist.
    #[error("Vertex index {index} out of range for {vertex_count} vertices")]
    VertexOutOfRange {
        /// The offending index.
        index: usize,
        /// Number of vertices in the mesh.
        vertex_count: usize,
    },
    /// A top-dimensional simplex has zero volume.
    #[error("Top-dimensional simplex {0} is degenerate")]
    DegenerateSimplex(usize),
    /// The mesh has no simplices at all.
    #[error("Mesh has no simplices")]
    Empty,
}

/// A mesh where all cells are simplices
/// (points, line segments, triangles, tetrahedra).
///
/// Simplices of every dimension are stored with their vertex indices
/// in ascending order, which also fixes their orientation.
/// Top-dimensional simplices additionally carry their orientation
/// relative to the ambient space (see [`orientations`][Self::orientations]).
#[derive(Clone, Debug)]
pub struct SimplicialMesh<const D: usize> {
    vertices: Vec<na::SVector<f64, D>>,
    /// Storage for each dimension of simplex in the mesh.
    pub(crate) simplices: Vec<SimplexCollection<D>>,
    /// sign of the determinant of the edge matrix of each top simplex
    orientations: Vec<f64>,
    /// gradients of the barycentric coordinate functions of each top simplex,
    /// `D + 1` vectors per simplex
    barycentric_differentials: Vec<na::SVector<f64, D>>,
}

#[derive(Clone, Debug)]
pub(crate) struct SimplexCollection<const D: usize> {
    /// points per simplex in the storage Vec
    simplex_size: usize,
    /// indices stored in a flat Vec to avoid generics for dimension
    pub indices: Vec<usize>,
    /// map from the vertex indices of a simplex to its index in this collection.
    /// constructed lazily in `SimplicialMesh::find_simplex_index`.
    index_map: OnceCell<HashMap<Vec<usize>, usize>>,
    /// matrix where the rows correspond to DIM-simplices,
    /// the columns to (DIM-1) simplices,
    /// and the values of -1 or 1 to the relative orientation of the boundary.
    boundary_map: nas::CsrMatrix<i8>,
    /// transpose of the DIM+1-dimensional collection's `boundary_map`
    coboundary_map: nas::CsrMatrix<i8>,
    /// simplices on the boundary of the mesh.
    mesh_boundary: fb::FixedBitSet,
    barycenters: Vec<na::SVector<f64, D>>,
    /// unsigned volumes of the simplices
    volumes: Vec<f64>,
}

impl<const D: usize> Default for SimplexCollection<D> {
    fn default() -> Self {
        Self {
            simplex_size: 0,
            indices: Vec::new(),
            index_map: OnceCell::new(),
            boundary_map: nas::CsrMatrix::zeros(0, 0),
            coboundary_map: nas::CsrMatrix::zeros(0, 0),
            mesh_boundary: fb::FixedBitSet::default(),
            barycenters: Vec::new(),
            volumes: Vec::new(),
        }
    }
}

impl<const D: usize> SimplexCollection<D> {
    /// Get the number of simplices in the collection.
    #[inline]
    fn len(&self) -> usize {
        self.indices.len() / self.simplex_size
    }
}

impl<const D: usize> SimplicialMesh<D> {
    /// Construct a mesh from raw vertices and indices.
    ///
    /// The indices are given as a flat array,
    /// where every `D + 1` indices correspond to one `D`-simplex.
    ///
    /// # Panics
    ///
    /// If the indices don't describe a valid mesh.
    /// Use [`try_new`][Self::try_new] to handle this case.
    #[inline]
    pub fn new(vertices: Vec<na::SVector<f64, D>>, indices: Vec<usize>) -> Self {
        match Self::try_new(vertices, indices) {
            Ok(mesh) => mesh,
            Err(e) => panic!("Invalid mesh: {e}"),
        }
    }

    /// Construct a mesh from raw vertices and indices,
    /// returning an error if they don't describe a valid mesh.
    pub fn try_new(
        vertices: Vec<na::SVector<f64, D>>,
        indices: Vec<usize>,
    ) -> Result<Self, MeshError> {
        mesh_construction::build_mesh(vertices, indices)
    }

    /// The dimension of the mesh, i.e. of its top-dimensional simplices.
    #[inline]
    pub const fn dim(&self) -> usize {
        D
    }

    /// Get a slice of all vertices in the mesh.
    #[inline]
    pub fn vertices(&self) -> &[na::SVector<f64, D>] {
        &self.vertices
    }

    /// Get the number of `dim`-simplices in the mesh.
    #[inline]
    pub fn simplex_count(&self, dim: usize) -> usize {
        self.simplices[dim].len()
    }

    /// Access the vertex indices for the given dimension of simplex
    /// as a chunked iterator where each element is a `dim + 1`-length slice
    /// containing the indices of one simplex.
    #[inline]
    pub fn indices(&self, dim: usize) -> std::slice::ChunksExact<'_, usize> {
        self.simplices[dim].indices.chunks_exact(dim + 1)
    }

    /// Get a slice of `dim`-simplex barycenters.
    #[inline]
    pub fn barycenters(&self, dim: usize) -> &[na::SVector<f64, D>] {
        &self.simplices[dim].barycenters
    }

    /// Get the unsigned volumes of `dim`-simplices.
    /// Vertices have a volume of 1.
    #[inline]
    pub fn volumes(&self, dim: usize) -> &[f64] {
        &self.simplices[dim].volumes
    }

    /// Get the set of `dim`-simplices on the mesh boundary.
    ///
    /// This is always empty for the highest-dimensional simplices.
    #[inline]
    pub fn boundary(&self, dim: usize) -> &fb::FixedBitSet {
        &self.simplices[dim].mesh_boundary
    }

    /// Orientation of each top-dimensional simplex
    /// (with its vertices in ascending order)
    /// relative to the standard orientation of space, as `1.0` or `-1.0`.
    #[inline]
    pub fn orientations(&self) -> &[f64] {
        &self.orientations
    }

    /// Get an iterator over barycentric differentials of each top-dimensional simplex.
    /// These are the building blocks of Whitney forms.
    ///
    /// The returned iterator yields slices of `D + 1` vectors,
    /// in the same order as the vertices of the simplex.
    #[inline]
    pub fn barycentric_differentials(&self) -> std::slice::ChunksExact<'_, na::SVector<f64, D>> {
        self.barycentric_differentials.chunks_exact(D + 1)
    }

    /// Find the index of a simplex in its collection given its vertex indices
    /// (in ascending order).
    ///
    /// Returns None if no `dim`-simplex with the given indices exists.
    pub fn find_simplex_index(&self, dim: usize, indices: &[usize]) -> Option<usize> {
        let simplices = self.simplices.get(dim)?;
        let index_map = simplices.index_map.get_or_init(|| {
            simplices
                .indices
                .chunks_exact(simplices.simplex_size)
                .enumerate()
                .map(|(i, vert_is)| (Vec::from(vert_is), i))
                .collect()
        });
        index_map.get(indices).copied()
    }

    /// Construct the coboundary matrix mapping `dim`-cochains to `dim + 1`-cochains.
    ///
    /// Rows correspond to `dim + 1`-simplices and columns to `dim`-simplices.
    /// This is the exterior derivative on Whitney forms,
    /// since `d` maps each lowest-order Whitney space exactly into the next.
    pub fn d(&self, dim: usize) -> nas::CsrMatrix<f64> {
        assert!(dim < D, "No exterior derivative for top-dimensional forms");
        let orientation_mat = &self.simplices[dim + 1].boundary_map;
        // same matrix with orientations converted to floats
        nas::CsrMatrix::try_from_pattern_and_values(
            orientation_mat.pattern().clone(),
            orientation_mat
                .values()
                .iter()
                .map(|o| *o as f64)
                .collect(),
        )
        .expect("pattern and values come from the same matrix")
    }

    /// Create a new cochain with a value of zero
    /// for each `dim`-simplex in the mesh.
    pub fn new_zero_cochain(&self, dim: usize) -> Cochain {
        Cochain::zeros(dim, self.simplex_count(dim))
    }

    /// Create a cochain by integrating a function over each `DIM`-simplex
    /// using the given quadrature.
    ///
    /// The vertices are passed to the quadrature in ascending index order,
    /// which is the orientation of the simplex.
    /// See the [`quadrature`][crate::quadrature] module for available quadratures.
    pub fn integrate_cochain<const DIM: usize>(
        &self,
        quadrature: impl Quadrature<DIM, D>,
    ) -> Cochain {
        let mut c = self.new_zero_cochain(DIM);
        // buffer for the vertices of the current simplex
        // (their placement in the source data is generally not contiguous)
        let mut vertices = Vec::with_capacity(DIM + 1);
        for (indices, c_val) in izip!(self.indices(DIM), c.values.iter_mut()) {
            vertices.clear();
            vertices.extend(indices.iter().map(|&i| self.vertices[i]));
            *c_val = quadrature.compute(&vertices);
        }
        c
    }
}
