//! Lowest-order Whitney forms `P1⁻Λᵏ`.
//!
//! The Whitney `k`-form of a `k`-simplex `σ = [σ_0, ..., σ_k]` is
//!
//! `w_σ = k! Σ_i (-1)^i λ_{σ_i} dλ_{σ_0} ∧ ... (omit i) ... ∧ dλ_{σ_k}`
//!
//! where the `λ` are barycentric coordinate functions.
//! On each top-dimensional simplex these are polynomials of degree one
//! whose coefficients only depend on the barycentric differentials,
//! so their L2 inner products have a closed form.
//! See Arnold, Falk & Winther (2006). Finite element exterior calculus,
//! homological techniques, and applications. Section 4.

use itertools::{iproduct, izip, Itertools};
use nalgebra as na;
use nalgebra_sparse as nas;

use crate::{Cochain, SimplicialMesh};

fn factorial(n: usize) -> f64 {
    (1..=n).product::<usize>() as f64
}

/// The `degree`-dimensional faces of a `mesh_dim`-simplex
/// as lists of local vertex positions, in lexicographic order.
pub(crate) fn local_faces(mesh_dim: usize, degree: usize) -> Vec<Vec<usize>> {
    (0..=mesh_dim).combinations(degree + 1).collect()
}

/// Global indices of the `degree`-faces of every top-dimensional simplex,
/// in the order given by [`local_faces`], as a flat array.
pub(crate) fn face_indices<const D: usize>(mesh: &SimplicialMesh<D>, degree: usize) -> Vec<usize> {
    let faces = local_faces(D, degree);
    let mut face_verts = Vec::with_capacity(degree + 1);
    let mut indices = Vec::with_capacity(faces.len() * mesh.simplex_count(D));
    for simplex in mesh.indices(D) {
        for face in &faces {
            face_verts.clear();
            face_verts.extend(face.iter().map(|&p| simplex[p]));
            // faces of sorted simplices are sorted and always exist in the mesh
            let idx = mesh
                .find_simplex_index(degree, &face_verts)
                .expect("every face of a mesh simplex is in the mesh");
            indices.push(idx);
        }
    }
    indices
}

/// `∫ λ_a λ_b` over an `mesh_dim`-simplex of the given volume.
#[inline]
fn barycentric_product_integral(volume: f64, mesh_dim: usize, a: usize, b: usize) -> f64 {
    let n = mesh_dim as f64;
    let coincident = if a == b { 2.0 } else { 1.0 };
    volume * coincident / ((n + 1.0) * (n + 2.0))
}

/// Pointwise inner product of `dλ_{left_0} ∧ ... ∧ dλ_{left_k}`
/// and `dλ_{right_0} ∧ ... ∧ dλ_{right_k}`.
fn wedge_inner<const D: usize>(
    grads: &[na::SVector<f64, D>],
    left: &[usize],
    right: &[usize],
) -> f64 {
    let k = left.len();
    if k == 0 {
        return 1.0;
    }
    na::DMatrix::from_fn(k, k, |p, q| grads[left[p]].dot(&grads[right[q]])).determinant()
}

/// The face with its `i`th vertex removed.
fn omit(face: &[usize], i: usize) -> Vec<usize> {
    face.iter()
        .enumerate()
        .filter(|(p, _)| *p != i)
        .map(|(_, v)| *v)
        .collect()
}

/// Mass matrix of the Whitney `degree`-forms on a single top-dimensional simplex,
/// given its barycentric differentials and volume.
///
/// Rows and columns follow the lexicographic order of local faces.
pub fn local_mass<const D: usize>(
    degree: usize,
    grads: &[na::SVector<f64, D>],
    volume: f64,
) -> na::DMatrix<f64> {
    let faces = local_faces(D, degree);
    let scale = factorial(degree).powi(2);
    let mut mass = na::DMatrix::zeros(faces.len(), faces.len());
    for (row, sigma) in faces.iter().enumerate() {
        for (col, tau) in faces.iter().enumerate().skip(row) {
            let mut entry = 0.0;
            for (i, j) in iproduct!(0..=degree, 0..=degree) {
                let sign = if (i + j) % 2 == 0 { 1.0 } else { -1.0 };
                entry += sign
                    * barycentric_product_integral(volume, D, sigma[i], tau[j])
                    * wedge_inner(grads, &omit(sigma, i), &omit(tau, j));
            }
            mass[(row, col)] = scale * entry;
            mass[(col, row)] = scale * entry;
        }
    }
    mass
}

/// Assemble the global mass matrix of Whitney `degree`-forms,
/// i.e. the Gram matrix of the basis under the L2 inner product.
pub fn mass_matrix<const D: usize>(mesh: &SimplicialMesh<D>, degree: usize) -> nas::CsrMatrix<f64> {
    let size = mesh.simplex_count(degree);
    let face_count = local_faces(D, degree).len();
    let face_indices = face_indices(mesh, degree);
    let mut coo = nas::CooMatrix::new(size, size);
    for (globals, grads, &volume) in izip!(
        face_indices.chunks_exact(face_count),
        mesh.barycentric_differentials(),
        mesh.volumes(D),
    ) {
        let local = local_mass(degree, grads, volume);
        for (row, col) in iproduct!(0..face_count, 0..face_count) {
            coo.push(globals[row], globals[col], local[(row, col)]);
        }
    }
    nas::CsrMatrix::from(&coo)
}

/// Integrals of the basis functions over the whole mesh.
///
/// Only defined for 0-forms (hat functions, `∫ λ_v`)
/// and top-dimensional forms (`±1`, the orientation of each simplex).
///
/// # Panics
///
/// If `degree` is neither 0 nor the mesh dimension.
pub fn basis_integrals<const D: usize>(mesh: &SimplicialMesh<D>, degree: usize) -> na::DVector<f64> {
    let mut integrals = na::DVector::zeros(mesh.simplex_count(degree));
    if degree == D {
        for (integral, ori) in izip!(integrals.iter_mut(), mesh.orientations()) {
            *integral = *ori;
        }
    } else if degree == 0 {
        let vert_share = 1.0 / (D + 1) as f64;
        for (simplex, volume) in izip!(mesh.indices(D), mesh.volumes(D)) {
            for &vert in simplex {
                integrals[vert] += vert_share * volume;
            }
        }
    } else {
        panic!("Basis integrals are only available for 0-forms and top forms");
    }
    integrals
}

/// Vector proxy of the Whitney 1-form of the local edge `[a, b]`
/// at a point given in barycentric coordinates.
#[inline]
pub fn one_form_proxy<const D: usize>(
    grads: &[na::SVector<f64, D>],
    bary: &[f64],
    edge: [usize; 2],
) -> na::SVector<f64, D> {
    let [a, b] = edge;
    bary[a] * grads[b] - bary[b] * grads[a]
}

/// Evaluate the vector proxy of a 1-form at the barycenter
/// of every top-dimensional simplex.
///
/// # Panics
///
/// If the cochain isn't a 1-cochain on this mesh.
pub fn barycenter_values<const D: usize>(
    mesh: &SimplicialMesh<D>,
    cochain: &Cochain,
) -> Vec<na::SVector<f64, D>> {
    assert_eq!(cochain.degree(), 1, "Barycenter values are only defined for 1-forms");
    assert_eq!(cochain.len(), mesh.simplex_count(1), "Cochain doesn't match the mesh");

    let edges = local_faces(D, 1);
    let edge_indices = face_indices(mesh, 1);
    let bary = vec![1.0 / (D + 1) as f64; D + 1];
    izip!(
        edge_indices.chunks_exact(edges.len()),
        mesh.barycentric_differentials()
    )
    .map(|(globals, grads)| {
        izip!(globals, &edges).fold(na::SVector::zeros(), |acc, (&global, edge)| {
            acc + cochain.values[global] * one_form_proxy(grads, &bary, [edge[0], edge[1]])
        })
    })
    .collect()
}

/// 90 degree clockwise rotation `(u_x, u_y) -> (u_y, -u_x)`.
#[inline]
fn rotate(v: &na::Vector2<f64>) -> na::Vector2<f64> {
    na::Vector2::new(v.y, -v.x)
}

/// The matrix of `∫ w_τ · R(w_σ)` over Whitney 1-forms `σ` (columns) and `τ` (rows),
/// where `R` rotates vectors by 90 degrees clockwise.
///
/// Solving `M_1 b = R u` with the 1-form mass matrix `M_1`
/// gives the L2 projection of the rotated field back onto Whitney 1-forms.
pub fn rotation_matrix(mesh: &SimplicialMesh<2>) -> nas::CsrMatrix<f64> {
    let size = mesh.simplex_count(1);
    let edges = local_faces(2, 1);
    let edge_indices = face_indices(mesh, 1);
    let mut coo = nas::CooMatrix::new(size, size);
    for (globals, grads, &volume) in izip!(
        edge_indices.chunks_exact(edges.len()),
        mesh.barycentric_differentials(),
        mesh.volumes(2),
    ) {
        for ((row, tau), (col, sigma)) in
            iproduct!(edges.iter().enumerate(), edges.iter().enumerate())
        {
            // w_σ = λ_{σ_0} ∇λ_{σ_1} - λ_{σ_1} ∇λ_{σ_0}
            let mut entry = 0.0;
            for (i, j) in iproduct!(0..2, 0..2) {
                let sign = if (i + j) % 2 == 0 { 1.0 } else { -1.0 };
                entry += sign
                    * barycentric_product_integral(volume, 2, sigma[i], tau[j])
                    * rotate(&grads[sigma[1 - i]]).dot(&grads[tau[1 - j]]);
            }
            coo.push(globals[row], globals[col], entry);
        }
    }
    nas::CsrMatrix::from(&coo)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        mesh::{tiny_mesh_2d, tiny_mesh_3d},
        quadrature::{GaussLegendre3, Pointwise},
    };
    use approx::relative_eq;

    /// `cᵀ M c` for a cochain `c`.
    fn mass_norm_sq(mass: &nas::CsrMatrix<f64>, c: &na::DVector<f64>) -> f64 {
        let mc = mass * c;
        c.dot(&mc)
    }

    #[test]
    fn top_form_mass_is_inverse_volume() {
        let mesh = tiny_mesh_3d();
        let mass = mass_matrix(&mesh, 3);
        let mass = na::DMatrix::from(&mass);
        for (i, vol) in mesh.volumes(3).iter().enumerate() {
            assert!(
                relative_eq!(mass[(i, i)], 1.0 / vol, epsilon = 1e-12),
                "expected {}, got {}",
                1.0 / vol,
                mass[(i, i)]
            );
        }
        assert_eq!(mass.nrows(), 4);
    }

    /// Whitney forms reproduce constant fields exactly,
    /// so their mass norm is the exact L2 norm.
    #[test]
    fn constant_fields_have_exact_norms() {
        let mesh = tiny_mesh_2d();
        let area: f64 = mesh.volumes(2).iter().sum();

        let ones: Cochain = mesh.integrate_cochain(Pointwise(|_| 1.0));
        let norm_0 = mass_norm_sq(&mass_matrix(&mesh, 0), &ones.values);
        assert!(relative_eq!(norm_0, area, epsilon = 1e-12), "got {norm_0}");

        let u = na::Vector2::new(0.3, -1.2);
        let c1: Cochain = mesh.integrate_cochain(GaussLegendre3(|_, dir| u.dot(&dir)));
        let norm_1 = mass_norm_sq(&mass_matrix(&mesh, 1), &c1.values);
        assert!(
            relative_eq!(norm_1, u.norm_squared() * area, epsilon = 1e-12),
            "got {norm_1}"
        );

        // fluxes of a constant field through the triangles of a 3D mesh
        let mesh = tiny_mesh_3d();
        let volume: f64 = mesh.volumes(3).iter().sum();
        let u = na::Vector3::new(1.0, 0.5, -2.0);
        let fluxes = na::DVector::from_iterator(
            mesh.simplex_count(2),
            mesh.indices(2).map(|tri| {
                let [p0, p1, p2] = [0, 1, 2].map(|i| mesh.vertices()[tri[i]]);
                u.dot(&(p1 - p0).cross(&(p2 - p0))) / 2.0
            }),
        );
        let norm_2 = mass_norm_sq(&mass_matrix(&mesh, 2), &fluxes);
        assert!(
            relative_eq!(norm_2, u.norm_squared() * volume, epsilon = 1e-12),
            "got {norm_2}"
        );
    }

    /// The rows of the 0-form mass matrix add up to the hat function integrals.
    #[test]
    fn partition_of_unity() {
        let mesh = tiny_mesh_3d();
        let mass = mass_matrix(&mesh, 0);
        let row_sums = &mass * &na::DVector::from_element(mesh.simplex_count(0), 1.0);
        let integrals = basis_integrals(&mesh, 0);
        assert!(
            relative_eq!(row_sums, integrals, epsilon = 1e-12),
            "row sums {row_sums:?}, integrals {integrals:?}"
        );
        let total: f64 = integrals.iter().sum();
        let volume: f64 = mesh.volumes(3).iter().sum();
        assert!(relative_eq!(total, volume, epsilon = 1e-12));
    }

    #[test]
    fn local_mass_is_symmetric_positive_definite() {
        let mesh = tiny_mesh_3d();
        let grads = mesh.barycentric_differentials().next().unwrap();
        let vol = mesh.volumes(3)[0];
        for degree in 0..=3 {
            let local = local_mass(degree, grads, vol);
            assert!(relative_eq!(local, local.transpose(), epsilon = 1e-14));
            let eigen = local.symmetric_eigen();
            assert!(
                eigen.eigenvalues.iter().all(|e| *e > 0.0),
                "{degree}-form mass has eigenvalues {:?}",
                eigen.eigenvalues
            );
        }
    }

    #[test]
    fn constant_field_at_barycenters() {
        let mesh = tiny_mesh_2d();
        let u = na::Vector2::new(-0.7, 2.0);
        let c1: Cochain = mesh.integrate_cochain(GaussLegendre3(|_, dir| u.dot(&dir)));
        for value in barycenter_values(&mesh, &c1) {
            assert!(relative_eq!(value, u, epsilon = 1e-12), "expected {u}, got {value}");
        }
    }

    /// Rotating a constant field and projecting back is exact.
    #[test]
    fn rotation_of_constant_is_exact() {
        let mesh = tiny_mesh_2d();
        let u = na::Vector2::new(1.0, 0.0);
        let rotated = rotate(&u);
        let c_u: Cochain = mesh.integrate_cochain(GaussLegendre3(|_, dir| u.dot(&dir)));
        let c_rot: Cochain = mesh.integrate_cochain(GaussLegendre3(|_, dir| rotated.dot(&dir)));

        let rhs = &rotation_matrix(&mesh) * &c_u.values;
        let mass = nas::CscMatrix::from(&mass_matrix(&mesh, 1));
        let chol = nas::factorization::CscCholesky::factor(&mass).unwrap();
        let projected = chol.solve(&na::DMatrix::from_column_slice(rhs.len(), 1, rhs.as_slice()));

        for (p, e) in izip!(projected.iter(), c_rot.values.iter()) {
            assert!(relative_eq!(p, e, epsilon = 1e-10), "expected {c_rot:?}, got {projected}");
        }
        assert_eq!(rotated, na::Vector2::new(0.0, -1.0));
    }
}
