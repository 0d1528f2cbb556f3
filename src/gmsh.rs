//! Utilities for loading meshes generated with [`gmsh`](https://www.gmsh.info/).
//!
//! Only version 4.1 of the MSH format is supported,
//! as per the [`mshio`] library.

use nalgebra as na;

use crate::{mesh::MeshError, SimplicialMesh};

/// Error in loading a mesh from a Gmsh .msh file.
#[derive(thiserror::Error, Debug)]
pub enum GmshError {
    /// Error parsing the .msh file.
    ///
    /// (Implementation note: parser error converted to string
    /// to avoid lifetime issues with the byte slices it contains)
    #[error("Parsing the .msh data failed: {0}")]
    ParseError(String),
    /// The given .msh file contains no nodes.
    #[error("Invalid .msh data: no nodes")]
    MissingNodes,
    /// The given .msh file contains no elements of the supported type.
    #[error("Invalid .msh data: no elements of the correct type")]
    MissingElements,
    /// The elements don't form a valid simplicial mesh.
    #[error("Invalid mesh in .msh data")]
    Mesh(#[from] MeshError),
}

/// Load a 2D triangle mesh from a `.msh` file.
///
/// First-order triangle elements in the file are interpreted as the triangles of the mesh.
/// These must be of type `Tri3` (see [`ElementType`][mshio::ElementType]).
/// The `z` coordinate of vertices is dropped to project the mesh to 2D space.
///
/// ```
/// # use hodge_harmonic::gmsh::{load_trimesh_2d, GmshError};
/// # fn load(msh_path: &str) -> Result<(), Box<dyn std::error::Error>> {
/// let msh_bytes = std::fs::read(msh_path)?;
/// let mesh = load_trimesh_2d(&msh_bytes)?;
/// # Ok(())
/// # }
/// ```
pub fn load_trimesh_2d(bytes: &[u8]) -> Result<SimplicialMesh<2>, GmshError> {
    load_mesh(bytes, mshio::ElementType::Tri3, |x, y, _| na::Vector2::new(x, y))
}

/// Load a 3D tetrahedral mesh from a `.msh` file.
///
/// First-order tetrahedron elements in the file are interpreted as the tetrahedra of the mesh.
/// These must be of type `Tet4` (see [`ElementType`][mshio::ElementType]).
pub fn load_tetmesh_3d(bytes: &[u8]) -> Result<SimplicialMesh<3>, GmshError> {
    load_mesh(bytes, mshio::ElementType::Tet4, na::Vector3::new)
}

fn load_mesh<const D: usize>(
    bytes: &[u8],
    element_type: mshio::ElementType,
    project: impl Fn(f64, f64, f64) -> na::SVector<f64, D>,
) -> Result<SimplicialMesh<D>, GmshError> {
    let msh = mshio::parse_msh_bytes(bytes).map_err(|e| GmshError::ParseError(format!("{}", e)))?;
    let nodes = msh.data.nodes.ok_or(GmshError::MissingNodes)?;
    let elements = msh.data.elements.ok_or(GmshError::MissingElements)?;

    let vertices: Vec<na::SVector<f64, D>> = nodes
        .node_blocks
        .iter()
        .flat_map(|block| block.nodes.iter())
        .map(|node| project(node.x, node.y, node.z))
        .collect();
    if vertices.is_empty() {
        return Err(GmshError::MissingNodes);
    }

    let indices: Vec<usize> = elements
        .element_blocks
        .iter()
        .filter(|block| block.element_type == element_type)
        .flat_map(|block| block.elements.iter())
        .flat_map(|el| el.nodes.iter())
        // gmsh tags start at 1, subtract 1 to get the index in the array.
        // (this assumes tags are sequential and in order,
        // out-of-range tags are caught by mesh validation)
        .map(|node_tag| (*node_tag as usize).wrapping_sub(1))
        .collect();
    if indices.is_empty() {
        return Err(GmshError::MissingElements);
    }

    log::info!(
        "Loaded {} vertices and {} elements of type {element_type:?}",
        vertices.len(),
        indices.len() / (D + 1)
    );
    Ok(SimplicialMesh::try_new(vertices, indices)?)
}
