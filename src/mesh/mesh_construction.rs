use nalgebra as na;
use nalgebra_sparse as nas;

use itertools::{iproduct, izip, Itertools};
use std::ops::Range;

use super::{MeshError, SimplexCollection, SimplicialMesh};

/// Construct a mesh from raw vertices and indices.
///
/// The indices are given as a flat array,
/// where every `D + 1` indices correspond to one `D`-simplex.
pub fn build_mesh<const D: usize>(
    vertices: Vec<na::SVector<f64, D>>,
    indices: Vec<usize>,
) -> Result<SimplicialMesh<D>, MeshError> {
    let top_size = D + 1;
    if indices.is_empty() {
        return Err(MeshError::Empty);
    }
    if indices.len() % top_size != 0 {
        return Err(MeshError::IndexCount {
            len: indices.len(),
            simplex_size: top_size,
        });
    }
    if let Some(&index) = indices.iter().find(|&&i| i >= vertices.len()) {
        return Err(MeshError::VertexOutOfRange {
            index,
            vertex_count: vertices.len(),
        });
    }

    // collection for every dimension of simplex, including 0
    // (even though those are just the vertices),
    // for unified storage and iteration
    let mut simplices: Vec<SimplexCollection<D>> = (0..=D)
        .map(|i| SimplexCollection {
            simplex_size: i + 1,
            ..Default::default()
        })
        .collect();

    // the collection of 0-simplices is just the vertices in order
    // with volume 1
    simplices[0].indices = (0..vertices.len()).collect();
    simplices[0].barycenters = vertices.clone();
    simplices[0].volumes.resize(vertices.len(), 1.0);

    //
    // compute sub-simplices
    //

    // highest dimension simplices have the indices given as parameter
    simplices[D].indices = indices;
    // by convention, sort simplices to have their indices in ascending order.
    // this gives a consistent way to identify a simplex with its vertices,
    // and every face of a sorted simplex is sorted too
    for simplex in simplices[D].indices.chunks_exact_mut(top_size) {
        simplex.sort_unstable();
    }

    // rest of the levels are inferred
    // from boundaries of the top-level simplices
    let mut level_iter = simplices.iter_mut().rev().peekable();
    while let Some(upper_simplices) = level_iter.next() {
        let Some(lower_simplices) = level_iter.peek_mut() else {
            // only reachable for a 0-dimensional mesh
            break;
        };

        if lower_simplices.simplex_size == 1 {
            // 1-simplex level, where boundary simplices are vertices.
            // no deduplication needed here, a COO matrix does the job
            let mut boundary_coo = nas::CooMatrix::new(upper_simplices.len(), vertices.len());
            for (simplex_idx, indices) in upper_simplices.indices.chunks_exact(2).enumerate() {
                boundary_coo.push(simplex_idx, indices[0], -1);
                boundary_coo.push(simplex_idx, indices[1], 1);
            }
            let boundary_map = nas::CsrMatrix::from(&boundary_coo);
            lower_simplices.coboundary_map = boundary_map.transpose();
            upper_simplices.boundary_map = boundary_map;

            break;
        };

        // buffer to hold the simplex currently being processed
        let mut curr_simplex: Vec<usize> = Vec::with_capacity(lower_simplices.simplex_size);
        // vertex indices, orientations and corresponding upper-level simplices
        // of every boundary simplex, duplicates included
        // (the matrix S++ in the PyDEC paper section 7)
        let boundary_count = upper_simplices.len() * upper_simplices.simplex_size;
        let mut boundary_vert_indices: Vec<usize> =
            Vec::with_capacity(boundary_count * lower_simplices.simplex_size);
        let mut boundary_orientations: Vec<i8> = Vec::with_capacity(boundary_count);
        let mut coboundary_indices: Vec<usize> = Vec::with_capacity(boundary_count);

        for (simplex_idx, indices) in upper_simplices
            .indices
            .chunks_exact(upper_simplices.simplex_size)
            .enumerate()
        {
            for exclude_idx in 0..upper_simplices.simplex_size {
                curr_simplex.clear();
                for (i, vert_id) in indices.iter().enumerate() {
                    if i != exclude_idx {
                        curr_simplex.push(*vert_id);
                    }
                }

                // boundary orientations alternate between forward and backward
                // when defined in this order.
                // see Discrete Differential Forms for Computational Modeling by Desbrun et al. (2006)
                let orientation = if exclude_idx % 2 == 0 { 1 } else { -1 };

                boundary_vert_indices.extend_from_slice(&curr_simplex);
                boundary_orientations.push(orientation);
                coboundary_indices.push(simplex_idx);
            }
        }

        // sort in lexicographic order by vertex indices to group duplicates

        let mut sorted_boundary_indices = Vec::with_capacity(boundary_vert_indices.len());
        let mut sorted_boundary_orientations = Vec::with_capacity(boundary_orientations.len());
        let mut sorted_coboundary_indices = Vec::with_capacity(coboundary_indices.len());
        for (sorted_indices, sorted_ori, sorted_cob) in izip!(
            boundary_vert_indices.chunks_exact(lower_simplices.simplex_size),
            &boundary_orientations,
            &coboundary_indices,
        )
        .sorted_unstable_by_key(|(indices, _, _)| *indices)
        {
            sorted_boundary_indices.extend_from_slice(sorted_indices);
            sorted_boundary_orientations.push(*sorted_ori);
            sorted_coboundary_indices.push(*sorted_cob);
        }

        // only the row offsets need to be constructed;
        // column indices and values are `sorted_coboundary_indices`
        // and `sorted_boundary_orientations` respectively
        let mut row_offsets: Vec<usize> = vec![0];

        let mut boundary_iter = sorted_boundary_indices
            .chunks_exact(lower_simplices.simplex_size)
            .enumerate()
            .peekable();
        while let Some((simplex_idx, indices)) = boundary_iter.next() {
            // a duplicate stays on the same row,
            // meaning the simplex bounds multiple upper simplices
            if matches!(boundary_iter.peek(), Some((_, next_indices)) if *next_indices == indices) {
                continue;
            }
            row_offsets.push(simplex_idx + 1);
            lower_simplices.indices.extend_from_slice(indices);
        }

        let col_count = upper_simplices.len();
        let row_count = lower_simplices.len();

        let coboundary_map = nas::CsrMatrix::try_from_unsorted_csr_data(
            row_count,
            col_count,
            row_offsets,
            sorted_coboundary_indices,
            sorted_boundary_orientations,
        )
        .expect("Error in coboundary matrix construction. This is a bug in hodge-harmonic");

        upper_simplices.boundary_map = coboundary_map.transpose();
        lower_simplices.coboundary_map = coboundary_map;
    }

    // set dimensions of the empty 0-boundary and D-coboundary matrices
    // so that row indexing works on them too
    simplices[0].boundary_map = nas::CsrMatrix::zeros(simplices[0].len(), 0);
    simplices[D].coboundary_map = nas::CsrMatrix::zeros(simplices[D].len(), 0);

    //
    // identify mesh boundary
    //

    for simplices in &mut simplices {
        simplices.mesh_boundary.grow(simplices.len());
    }

    // if a codimension 1 simplex is only on the boundary of one codimension 0 simplex,
    // then it is on the boundary of the mesh
    let cod_1_simplices = &mut simplices[D - 1];
    let coboundary_map = &cod_1_simplices.coboundary_map;
    let mesh_boundary = &mut cod_1_simplices.mesh_boundary;
    for (row_idx, cod_1_coboundary) in coboundary_map.row_iter().enumerate() {
        if cod_1_coboundary.nnz() == 1 {
            mesh_boundary.insert(row_idx);
        }
    }

    // lower-dimensional faces of boundary simplices are on the boundary too
    let mut level_iter = simplices.iter_mut().rev().skip(1).peekable();
    while let Some(upper_simplices) = level_iter.next() {
        let Some(lower_simplices) = level_iter.peek_mut() else {
            break;
        };
        for simplex_idx in upper_simplices.mesh_boundary.ones() {
            for boundary_simplex_idx in upper_simplices.boundary_map.row(simplex_idx).col_indices()
            {
                lower_simplices.mesh_boundary.insert(*boundary_simplex_idx);
            }
        }
    }

    //
    // compute barycenters
    //

    for simplices in &mut simplices[1..] {
        simplices.barycenters = simplices
            .indices
            .chunks_exact(simplices.simplex_size)
            .map(|indices| {
                indices
                    .iter()
                    .fold(na::SVector::zeros(), |acc, i| acc + vertices[*i])
                    / simplices.simplex_size as f64
            })
            .collect();
    }

    //
    // compute primal volumes
    //

    // simplified special case for line segments
    let simplices_1 = &mut simplices[1];
    for indices in simplices_1.indices.chunks_exact(2) {
        let verts = [vertices[indices[0]], vertices[indices[1]]];
        simplices_1.volumes.push((verts[1] - verts[0]).magnitude());
    }

    // for the rest, vol = sqrt(det(V^T V)) / p!
    // (see the PyDEC paper section 10.1)
    for simplices in &mut simplices[2..] {
        let edge_count = simplices.simplex_size - 1;
        let edge_count_factorial: usize = (1..=edge_count).product();
        // reusing a matrix allocation for V^T V
        let mut det_mat = na::DMatrix::zeros(edge_count, edge_count);
        let mut edges: Vec<na::SVector<f64, D>> = vec![na::SVector::zeros(); edge_count];

        for indices in simplices.indices.chunks_exact(simplices.simplex_size) {
            for edge_idx in 0..edge_count {
                edges[edge_idx] = vertices[indices[edge_idx + 1]] - vertices[indices[0]];
            }
            for (row, col) in iproduct!(0..edge_count, 0..edge_count) {
                det_mat[(row, col)] = edges[row].dot(&edges[col]);
            }
            let vol = f64::sqrt(det_mat.determinant()) / edge_count_factorial as f64;
            simplices.volumes.push(vol);
        }
    }

    //
    // orientations and barycentric differentials of top simplices
    //

    let top_count = simplices[D].len();
    let mut orientations = Vec::with_capacity(top_count);
    let mut barycentric_differentials = Vec::with_capacity(top_count * top_size);
    // the square edge matrix J with columns x_i - x_0.
    // barycentric coordinate i > 0 is row i-1 of J^-1 applied to x - x_0,
    // and the coordinates sum to one which gives the gradient of coordinate 0
    let mut edge_mat = na::DMatrix::zeros(D, D);
    for (simplex_idx, indices) in simplices[D]
        .indices
        .chunks_exact(top_size)
        .enumerate()
    {
        for col in 0..D {
            let edge = vertices[indices[col + 1]] - vertices[indices[0]];
            edge_mat.set_column(col, &edge);
        }
        let det = edge_mat.determinant();
        // determinant relative to the edge lengths, zero for a flat simplex
        let scale: f64 = edge_mat.column_iter().map(|c| c.norm()).product();
        if !(det.abs() > 1e-12 * scale) {
            return Err(MeshError::DegenerateSimplex(simplex_idx));
        }
        let inverse = edge_mat
            .clone()
            .try_inverse()
            .ok_or(MeshError::DegenerateSimplex(simplex_idx))?;
        orientations.push(det.signum());

        let grads: Vec<na::SVector<f64, D>> = (0..D)
            .map(|row| na::SVector::from_fn(|i, _| inverse[(row, i)]))
            .collect();
        let grad_0 = -grads
            .iter()
            .fold(na::SVector::<f64, D>::zeros(), |acc, g| acc + g);
        barycentric_differentials.push(grad_0);
        barycentric_differentials.extend(grads);
    }

    Ok(SimplicialMesh {
        vertices,
        simplices,
        orientations,
        barycentric_differentials,
    })
}

//
// test meshes
//

type Vec2 = na::SVector<f64, 2>;
type Vec3 = na::SVector<f64, 3>;

/// A small hexagon-shaped 2D mesh for testing basic functionality.
/// Shaped somewhat like this:
///    ____
///   /\  /\
///  /__\/__\
///  \  /\  /
///   \/__\/
///
/// with vertices and triangles ordered left to right, top to bottom.
#[doc(hidden)]
pub fn tiny_mesh_2d() -> SimplicialMesh<2> {
    let vertices = vec![
        Vec2::new(-0.5, 1.0),
        Vec2::new(0.5, 1.0),
        Vec2::new(-1.0, 0.0),
        Vec2::new(0.0, 0.0),
        Vec2::new(1.0, 0.0),
        Vec2::new(-0.5, -1.0),
        Vec2::new(0.5, -1.0),
    ];
    #[rustfmt::skip]
    let indices = vec![
        0, 2, 3,
        0, 1, 3,
        1, 3, 4,
        2, 3, 5,
        3, 5, 6,
        3, 4, 6,
    ];
    SimplicialMesh::new(vertices, indices)
}

/// A small 3D mesh for testing basic functionality.
/// Four tetrahedra arranged into a diamond shape,
/// split like this down the x,y plane:
///
///    /\
///   /__\
///   \  /
///    \/
///
/// and with a single point both up and down the z-axis.
#[doc(hidden)]
pub fn tiny_mesh_3d() -> SimplicialMesh<3> {
    let vertices = vec![
        Vec3::new(0.0, 1.0, 0.0),
        Vec3::new(-0.5, 0.0, 0.0),
        Vec3::new(0.5, 0.0, 0.0),
        Vec3::new(0.0, -1.0, 0.0),
        Vec3::new(0.0, 0.0, -1.0),
        Vec3::new(0.0, 0.0, 1.0),
    ];
    #[rustfmt::skip]
    let indices = vec![
        0, 1, 2, 4,
        0, 1, 2, 5,
        1, 2, 3, 4,
        1, 2, 3, 5,
    ];

    SimplicialMesh::new(vertices, indices)
}

/// Drop vertices that no simplex refers to and renumber the rest,
/// so that removing cells from a grid doesn't leave isolated vertices behind.
fn compact_vertices<const D: usize>(
    vertices: Vec<na::SVector<f64, D>>,
    mut indices: Vec<usize>,
) -> SimplicialMesh<D> {
    let mut new_index: Vec<Option<usize>> = vec![None; vertices.len()];
    let mut kept = Vec::new();
    for i in &mut indices {
        let old = *i;
        *i = *new_index[old].get_or_insert_with(|| {
            kept.push(vertices[old]);
            kept.len() - 1
        });
    }
    SimplicialMesh::new(kept, indices)
}

/// The unit square divided into `cells` x `cells` squares,
/// each split into two triangles along the diagonal.
/// Squares whose row and column both fall in `hole` are left out,
/// which punches a square hole through the domain.
#[doc(hidden)]
pub fn square_grid_2d(cells: usize, hole: Option<Range<usize>>) -> SimplicialMesh<2> {
    let h = 1.0 / cells as f64;
    let row = cells + 1;
    let vertices: Vec<Vec2> = iproduct!(0..=cells, 0..=cells)
        .map(|(j, i)| Vec2::new(i as f64 * h, j as f64 * h))
        .collect();

    let in_hole = |i: usize, j: usize| matches!(&hole, Some(r) if r.contains(&i) && r.contains(&j));
    let mut indices = Vec::new();
    for (j, i) in iproduct!(0..cells, 0..cells) {
        if in_hole(i, j) {
            continue;
        }
        let a = i + j * row;
        let b = a + 1;
        let c = a + row;
        let d = c + 1;
        indices.extend_from_slice(&[a, b, d, a, d, c]);
    }
    compact_vertices(vertices, indices)
}

/// A box of `cells[0]` x `cells[1]` x `cells[2]` cubes with edge length
/// `1 / max(cells)`, each cube split into six tetrahedra around its main diagonal.
/// Cube columns whose x and y cell index fall in `hole` are left out,
/// which drills a tunnel through the box along the z axis.
#[doc(hidden)]
pub fn cube_grid_3d(
    cells: [usize; 3],
    hole: Option<(Range<usize>, Range<usize>)>,
) -> SimplicialMesh<3> {
    kuhn_grid_3d(cells, |i, j, _| {
        matches!(&hole, Some((rx, ry)) if rx.contains(&i) && ry.contains(&j))
    })
}

/// A cube of `cells`^3 smaller cubes with the cubes
/// whose every cell index falls in `cavity` left out,
/// leaving a closed void inside.
#[doc(hidden)]
pub fn hollow_cube_3d(cells: usize, cavity: Range<usize>) -> SimplicialMesh<3> {
    kuhn_grid_3d([cells; 3], |i, j, k| {
        [i, j, k].iter().all(|idx| cavity.contains(idx))
    })
}

fn kuhn_grid_3d(
    cells: [usize; 3],
    is_removed: impl Fn(usize, usize, usize) -> bool,
) -> SimplicialMesh<3> {
    let h = 1.0 / cells.iter().copied().max().unwrap_or(1) as f64;
    let [nx, ny, nz] = cells;
    let vert_idx = |i: usize, j: usize, k: usize| i + (nx + 1) * (j + (ny + 1) * k);
    let vertices: Vec<Vec3> = iproduct!(0..=nz, 0..=ny, 0..=nx)
        .map(|(k, j, i)| Vec3::new(i as f64 * h, j as f64 * h, k as f64 * h))
        .collect();

    // Kuhn subdivision: one tetrahedron per ordering of the axes.
    // every cube is split the same way so faces match up between neighbors
    let axis_orders = [
        [0, 1, 2],
        [0, 2, 1],
        [1, 0, 2],
        [1, 2, 0],
        [2, 0, 1],
        [2, 1, 0],
    ];
    let mut indices = Vec::new();
    for (k, j, i) in iproduct!(0..nz, 0..ny, 0..nx) {
        if is_removed(i, j, k) {
            continue;
        }
        for order in &axis_orders {
            let mut corner = [i, j, k];
            indices.push(vert_idx(corner[0], corner[1], corner[2]));
            for &axis in order {
                corner[axis] += 1;
                indices.push(vert_idx(corner[0], corner[1], corner[2]));
            }
        }
    }
    compact_vertices(vertices, indices)
}

// Tests here are concerned with the mesh structure being constructed correctly.
#[cfg(test)]
mod tests {
    use super::*;
    use approx::relative_eq;

    /// Checks that hold for any mesh built from a valid triangulation,
    /// plus the expected simplex counts in the mesh and on its boundary.
    fn check_complex<const D: usize>(
        mesh: &SimplicialMesh<D>,
        counts: &[usize],
        boundary_counts: &[usize],
        total_volume: f64,
    ) {
        for dim in 0..=D {
            assert_eq!(
                mesh.simplex_count(dim),
                counts[dim],
                "wrong number of {dim}-simplices"
            );
            assert_eq!(
                mesh.boundary(dim).count_ones(..),
                boundary_counts[dim],
                "wrong number of {dim}-simplices on the boundary"
            );
            for indices in mesh.indices(dim) {
                assert!(
                    indices.windows(2).all(|w| w[0] < w[1]),
                    "{dim}-simplex {indices:?} is not sorted"
                );
            }
        }

        // a (k+1)-simplex has k+2 faces with unit incidence
        for dim in 0..D {
            for row in mesh.d(dim).row_iter() {
                assert_eq!(row.nnz(), dim + 2);
                assert!(row.values().iter().all(|v| v.abs() == 1.0));
            }
        }
        for dim in 0..D - 1 {
            let dd = &mesh.d(dim + 1) * &mesh.d(dim);
            assert!(
                dd.values().iter().all(|v| *v == 0.0),
                "d{} d{dim} is not zero",
                dim + 1
            );
        }

        // boundary faces are exactly those with a single coface
        let cofaces = mesh.d(D - 1).transpose();
        for (face, row) in cofaces.row_iter().enumerate() {
            assert_eq!(
                mesh.boundary(D - 1).contains(face),
                row.nnz() == 1,
                "face {face} has {} cofaces",
                row.nnz()
            );
        }

        for (indices, bary) in izip!(mesh.indices(D), mesh.barycenters(D)) {
            let mean = indices
                .iter()
                .fold(na::SVector::<f64, D>::zeros(), |acc, &i| acc + mesh.vertices()[i])
                / (D + 1) as f64;
            assert!(relative_eq!(mean, *bary, epsilon = 1e-12));
        }
        let volume: f64 = mesh.volumes(D).iter().sum();
        assert!(
            relative_eq!(volume, total_volume, epsilon = 1e-12),
            "expected total volume {total_volume}, got {volume}"
        );
    }

    #[test]
    fn tiny_meshes_are_consistent() {
        let mesh_2d = tiny_mesh_2d();
        check_complex(&mesh_2d, &[7, 12, 6], &[6, 6, 0], 3.0);
        // all triangles have base 1 and height 1
        assert!(mesh_2d.volumes(2).iter().all(|&v| v == 0.5));
        assert_eq!(mesh_2d.find_simplex_index(1, &[0, 3]), Some(2));

        let mesh_3d = tiny_mesh_3d();
        check_complex(&mesh_3d, &[6, 13, 12, 4], &[6, 12, 8, 0], 4.0 / 6.0);
        assert!(!mesh_3d.boundary(1).contains(4), "the central edge is interior");
    }

    /// Barycentric differentials are dual to the edge vectors of each simplex,
    /// and the orientation agrees with the signed volume.
    #[test]
    fn barycentric_differentials_are_correct() {
        fn check<const D: usize>(mesh: &SimplicialMesh<D>) {
            for (indices, grads, &ori, &vol) in izip!(
                mesh.indices(D),
                mesh.barycentric_differentials(),
                mesh.orientations(),
                mesh.volumes(D),
            ) {
                let x0 = mesh.vertices()[indices[0]];
                for (i, grad) in grads.iter().enumerate() {
                    for (j, &vert) in indices.iter().enumerate().skip(1) {
                        // λ_i(x_j) - λ_i(x_0)
                        let expected = (i == j) as u8 as f64 - (i == 0) as u8 as f64;
                        let actual = grad.dot(&(mesh.vertices()[vert] - x0));
                        assert!(
                            relative_eq!(expected, actual, epsilon = 1e-12),
                            "gradient {i} against edge {j}: expected {expected}, got {actual}"
                        );
                    }
                }

                let mut edge_mat = na::DMatrix::zeros(D, D);
                for col in 0..D {
                    edge_mat.set_column(col, &(mesh.vertices()[indices[col + 1]] - x0));
                }
                let factorial: usize = (1..=D).product();
                let signed = edge_mat.determinant() / factorial as f64;
                assert!(
                    relative_eq!(signed, ori * vol, epsilon = 1e-12),
                    "signed volume {signed} doesn't match orientation {ori} and volume {vol}"
                );
            }
        }
        check(&tiny_mesh_2d());
        check(&tiny_mesh_3d());
        check(&square_grid_2d(3, Some(1..2)));
        check(&cube_grid_3d([2, 2, 1], None));
    }

    /// Invalid input is reported as an error rather than a broken mesh.
    #[test]
    fn invalid_meshes_are_rejected() {
        let verts = vec![Vec2::new(0., 0.), Vec2::new(1., 0.), Vec2::new(2., 0.)];
        assert_eq!(
            SimplicialMesh::try_new(verts.clone(), vec![0, 1, 2]).unwrap_err(),
            MeshError::DegenerateSimplex(0)
        );
        assert_eq!(
            SimplicialMesh::try_new(verts.clone(), vec![0, 1, 5]).unwrap_err(),
            MeshError::VertexOutOfRange {
                index: 5,
                vertex_count: 3
            }
        );
        assert_eq!(
            SimplicialMesh::try_new(verts.clone(), vec![0, 1]).unwrap_err(),
            MeshError::IndexCount {
                len: 2,
                simplex_size: 3
            }
        );
        assert_eq!(
            SimplicialMesh::<2>::try_new(verts, vec![]).unwrap_err(),
            MeshError::Empty
        );
    }

    /// Grid meshes have the expected sizes and topology.
    #[test]
    fn grid_meshes_have_expected_topology() {
        let annulus = square_grid_2d(5, Some(2..3));
        assert_eq!(annulus.simplex_count(0), 36);
        assert_eq!(annulus.simplex_count(1), 84);
        assert_eq!(annulus.simplex_count(2), 48);
        // outer and inner boundary loops
        assert_eq!(annulus.boundary(1).count_ones(..), 24);

        // removing a 2x2 block leaves the center vertex unused
        let wide_hole = square_grid_2d(4, Some(1..3));
        assert_eq!(wide_hole.simplex_count(0), 24);

        let euler_3d = |mesh: &SimplicialMesh<3>| {
            (0..=3)
                .map(|dim| {
                    let sign = if dim % 2 == 0 { 1 } else { -1 };
                    sign * mesh.simplex_count(dim) as isize
                })
                .sum::<isize>()
        };
        let ring = cube_grid_3d([3, 3, 1], Some((1..2, 1..2)));
        assert_eq!(ring.simplex_count(0), 32);
        assert_eq!(ring.simplex_count(3), 48);
        assert_eq!(euler_3d(&ring), 0, "a solid torus has Euler characteristic 0");

        let block = cube_grid_3d([2, 2, 2], None);
        assert_eq!(euler_3d(&block), 1, "a ball has Euler characteristic 1");
        let total_volume: f64 = block.volumes(3).iter().sum();
        assert!(relative_eq!(total_volume, 1.0, epsilon = 1e-12));

        // outer surface and the surface of the void are both boundary
        let hollow = hollow_cube_3d(3, 1..2);
        check_complex(&hollow, &[64, 278, 372, 156], &[64, 180, 120, 0], 26.0 / 27.0);
        assert_eq!(euler_3d(&hollow), 2, "a shell has Euler characteristic 2");
    }
}
