//! Source data for the mixed system,
//! and interpolation of user-supplied fields into each form space.
//!
//! Interpolation is the de Rham map onto Whitney forms:
//! a `k`-form is represented by its integrals over the oriented `k`-simplices.
//!
//! - 0-forms: values at vertices ([`point_values`])
//! - 1-forms: line integrals of a vector field along edges ([`circulations`])
//! - 2-forms in 3D: fluxes of a vector field through triangles ([`fluxes`])
//! - top forms: signed integrals of a scalar density
//!   ([`densities_2d`], [`densities_3d`])

use nalgebra as na;

use itertools::izip;

use crate::{
    quadrature::{Dunavant6, GaussLegendre6, Keast4, Pointwise, Quadrature},
    Cochain, SimplicialMesh,
};

/// Interpolated source data, one cochain per form degree `0..=dim`.
///
/// Components that aren't set are zero.
#[derive(Clone, Debug, PartialEq)]
pub struct FormSources {
    components: Vec<Cochain>,
}

impl FormSources {
    /// Zero sources for every form degree of the mesh.
    pub fn zeros<const D: usize>(mesh: &SimplicialMesh<D>) -> Self {
        Self {
            components: (0..=D).map(|k| mesh.new_zero_cochain(k)).collect(),
        }
    }

    /// Replace the component of the cochain's degree.
    ///
    /// # Panics
    ///
    /// If the cochain's degree is higher than the dimension of the mesh.
    pub fn set(&mut self, cochain: Cochain) -> &mut Self {
        let degree = cochain.degree();
        assert!(
            degree < self.components.len(),
            "No {degree}-form component on a {}-dimensional mesh",
            self.dim()
        );
        self.components[degree] = cochain;
        self
    }

    /// Builder-style version of [`set`][Self::set].
    pub fn with(mut self, cochain: Cochain) -> Self {
        self.set(cochain);
        self
    }

    /// The source of the given form degree.
    #[inline]
    pub fn component(&self, degree: usize) -> &Cochain {
        &self.components[degree]
    }

    /// Dimension of the mesh these sources were created for.
    #[inline]
    pub fn dim(&self) -> usize {
        self.components.len() - 1
    }
}

/// Interpolate a scalar field into 0-forms by evaluating it at vertices.
pub fn point_values<const D: usize>(
    mesh: &SimplicialMesh<D>,
    f: impl Fn(na::SVector<f64, D>) -> f64,
) -> Cochain {
    mesh.integrate_cochain(Pointwise(f))
}

/// Interpolate a vector field into 1-forms
/// by integrating its tangential component along each edge.
pub fn circulations<const D: usize>(
    mesh: &SimplicialMesh<D>,
    f: impl Fn(na::SVector<f64, D>) -> na::SVector<f64, D>,
) -> Cochain {
    mesh.integrate_cochain(GaussLegendre6(|pos, dir: na::Unit<na::SVector<f64, D>>| {
        f(pos).dot(&dir)
    }))
}

/// Interpolate a vector field into 2-forms on a 3D mesh
/// by integrating its flux through each triangle.
///
/// The normal of a triangle `[p0, p1, p2]` is `(p1 - p0) × (p2 - p0)`.
pub fn fluxes(mesh: &SimplicialMesh<3>, f: impl Fn(na::Vector3<f64>) -> na::Vector3<f64>) -> Cochain {
    let mut c = mesh.new_zero_cochain(2);
    for (tri, c_val) in izip!(mesh.indices(2), c.values.iter_mut()) {
        let verts = [0, 1, 2].map(|i| mesh.vertices()[tri[i]]);
        let normal = (verts[1] - verts[0]).cross(&(verts[2] - verts[0])).normalize();
        *c_val = Dunavant6(|pos: na::Vector3<f64>| f(pos).dot(&normal)).compute(&verts);
    }
    c
}

/// Interpolate a scalar density into top forms of a 2D mesh,
/// integrating over each triangle with its orientation.
pub fn densities_2d(mesh: &SimplicialMesh<2>, f: impl Fn(na::Vector2<f64>) -> f64) -> Cochain {
    let mut c = mesh.integrate_cochain(Dunavant6(f));
    orient(mesh, &mut c);
    c
}

/// Interpolate a scalar density into top forms of a 3D mesh,
/// integrating over each tetrahedron with its orientation.
pub fn densities_3d(mesh: &SimplicialMesh<3>, f: impl Fn(na::Vector3<f64>) -> f64) -> Cochain {
    let mut c = mesh.integrate_cochain(Keast4(f));
    orient(mesh, &mut c);
    c
}

fn orient<const D: usize>(mesh: &SimplicialMesh<D>, c: &mut Cochain) {
    for (val, ori) in izip!(c.values.iter_mut(), mesh.orientations()) {
        *val *= ori;
    }
}
