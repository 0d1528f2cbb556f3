//! Operations for integrating functions over simplices.
//!
//! These are used with
//! [`SimplicialMesh::integrate_cochain`][crate::SimplicialMesh::integrate_cochain]
//! and by the [`sources`][crate::sources] module
//! to interpolate fields into cochains (the de Rham map).
//!
//! - 0-dimensional "integration" is [`Pointwise`] evaluation.
//! - Line integrals use Gauss-Legendre quadratures
//!   ([`GaussLegendre3`], [`GaussLegendre6`]),
//!   which are exact for polynomials of order `2n-1` or less.
//! - Triangles use the six-point rule [`Dunavant6`] (exact up to degree 4)
//!   and tetrahedra the four-point rule [`Keast4`] (exact up to degree 2).
//!
//! The triangle and tetrahedron rules integrate a scalar function
//! against the unsigned measure of the simplex;
//! orientation is applied by the caller.
//!
//! # Examples
//!
//! ```
//! # use hodge_harmonic::{mesh::tiny_mesh_2d, quadrature::{Pointwise, GaussLegendre3, Dunavant6}, Cochain};
//! # let mesh = tiny_mesh_2d();
//! let my_scalar_field = |pos: nalgebra::Vector2<f64>| 2. * pos.x.powi(3) + pos.y;
//! let my_vector_field = |pos: nalgebra::Vector2<f64>| nalgebra::Vector2::new(pos.x * pos.y, 2. * pos.x);
//! // a 0-cochain by evaluating a scalar field at vertices
//! let c0: Cochain = mesh.integrate_cochain(Pointwise(my_scalar_field));
//! // a 1-cochain by integrating a vector field along line segments
//! let c1: Cochain = mesh.integrate_cochain(GaussLegendre3(
//!     |pos, dir| my_vector_field(pos).dot(&dir)
//! ));
//! // unsigned integrals of a scalar field over triangles
//! let c2: Cochain = mesh.integrate_cochain(Dunavant6(my_scalar_field));
//! ```

use nalgebra as na;

/// An algorithm for computing the integral of a function over a simplex.
pub trait Quadrature<const DIM: usize, const D: usize> {
    /// Compute the approximate integral given the vertices of a simplex.
    fn compute(&self, vertices: &[na::SVector<f64, D>]) -> f64;
}

/// "Integrate" over 0-simplices by evaluating the function at each vertex.
#[derive(Clone)]
pub struct Pointwise<const D: usize, IntgFn>(pub IntgFn)
where
    IntgFn: Fn(na::SVector<f64, D>) -> f64;

impl<const D: usize, IntgFn> Quadrature<0, D> for Pointwise<D, IntgFn>
where
    IntgFn: Fn(na::SVector<f64, D>) -> f64,
{
    fn compute(&self, vertices: &[na::SVector<f64, D>]) -> f64 {
        assert!(vertices.len() == 1, "Mismatched quadrature dimension");
        self.0(vertices[0])
    }
}

// Gauss-Legendre quadratures for 1D simplices.
// a few hardcoded orders are enough here
//
// source for the weights:
// https://pomax.github.io/bezierinfo/legendre-gauss.html

#[derive(Clone, Copy)]
struct GLPoint {
    weight: f64,
    abscissa: f64,
}

const WEIGHTS_GL_3: [GLPoint; 3] = [
    GLPoint {
        weight: 0.8888888888888888,
        abscissa: 0.0000000000000000,
    },
    GLPoint {
        weight: 0.5555555555555556,
        abscissa: -0.7745966692414834,
    },
    GLPoint {
        weight: 0.5555555555555556,
        abscissa: 0.7745966692414834,
    },
];

const WEIGHTS_GL_6: [GLPoint; 6] = [
    GLPoint {
        weight: 0.3607615730481386,
        abscissa: 0.6612093864662645,
    },
    GLPoint {
        weight: 0.3607615730481386,
        abscissa: -0.6612093864662645,
    },
    GLPoint {
        weight: 0.467913934572691,
        abscissa: -0.2386191860831969,
    },
    GLPoint {
        weight: 0.467913934572691,
        abscissa: 0.2386191860831969,
    },
    GLPoint {
        weight: 0.1713244923791704,
        abscissa: -0.932469514203152,
    },
    GLPoint {
        weight: 0.1713244923791704,
        abscissa: 0.932469514203152,
    },
];

fn gauss_legendre<const D: usize>(
    start: na::SVector<f64, D>,
    end: na::SVector<f64, D>,
    weights: &[GLPoint],
    f: impl Fn(na::SVector<f64, D>, na::Unit<na::SVector<f64, D>>) -> f64,
) -> f64 {
    let center = (start + end) / 2.;
    let half_segment = (end - start) / 2.;
    let half_length = half_segment.magnitude();
    let dir = na::Unit::new_unchecked(half_segment / half_length);
    weights
        .iter()
        .map(|p| p.weight * f(center + p.abscissa * half_segment, dir))
        .sum::<f64>()
        * half_length
}

/// Third-order Gauss-Legendre quadrature for integrating a function over a line segment.
///
/// This is exact for polynomials up to degree 5.
/// The parameters for the function are a position in space
/// and the direction of the line segment, pointing from its first vertex to its last.
#[derive(Clone)]
pub struct GaussLegendre3<const D: usize, IntgFn>(pub IntgFn)
where
    IntgFn: Fn(na::SVector<f64, D>, na::Unit<na::SVector<f64, D>>) -> f64;

impl<const D: usize, IntgFn> Quadrature<1, D> for GaussLegendre3<D, IntgFn>
where
    IntgFn: Fn(na::SVector<f64, D>, na::Unit<na::SVector<f64, D>>) -> f64,
{
    fn compute(&self, vertices: &[na::SVector<f64, D>]) -> f64 {
        assert!(vertices.len() == 2, "Mismatched quadrature dimension");
        gauss_legendre(vertices[0], vertices[1], &WEIGHTS_GL_3, &self.0)
    }
}

/// Sixth-order Gauss-Legendre quadrature for integrating a function over a line segment.
///
/// This is exact for polynomials up to degree 11.
/// Parameters are as in [`GaussLegendre3`].
#[derive(Clone)]
pub struct GaussLegendre6<const D: usize, IntgFn>(pub IntgFn)
where
    IntgFn: Fn(na::SVector<f64, D>, na::Unit<na::SVector<f64, D>>) -> f64;

impl<const D: usize, IntgFn> Quadrature<1, D> for GaussLegendre6<D, IntgFn>
where
    IntgFn: Fn(na::SVector<f64, D>, na::Unit<na::SVector<f64, D>>) -> f64,
{
    fn compute(&self, vertices: &[na::SVector<f64, D>]) -> f64 {
        assert!(vertices.len() == 2, "Mismatched quadrature dimension");
        gauss_legendre(vertices[0], vertices[1], &WEIGHTS_GL_6, &self.0)
    }
}

// symmetric rules on simplices, given in barycentric coordinates
// with weights normalized to sum to one

/// A quadrature point as barycentric coordinates and a weight.
#[derive(Clone, Copy)]
struct SimplexPoint<const N: usize> {
    weight: f64,
    bary: [f64; N],
}

/// Unsigned volume of a simplex embedded in a possibly higher-dimensional space,
/// `sqrt(det(V^T V)) / k!` like in mesh construction.
pub(crate) fn simplex_volume<const D: usize>(vertices: &[na::SVector<f64, D>]) -> f64 {
    let edge_count = vertices.len() - 1;
    let factorial: usize = (1..=edge_count).product();
    let gram = na::DMatrix::from_fn(edge_count, edge_count, |r, c| {
        (vertices[r + 1] - vertices[0]).dot(&(vertices[c + 1] - vertices[0]))
    });
    f64::sqrt(gram.determinant().max(0.0)) / factorial as f64
}

fn simplex_rule<const N: usize, const D: usize>(
    vertices: &[na::SVector<f64, D>],
    points: &[SimplexPoint<N>],
    f: impl Fn(na::SVector<f64, D>) -> f64,
) -> f64 {
    assert!(vertices.len() == N, "Mismatched quadrature dimension");
    let sum: f64 = points
        .iter()
        .map(|p| {
            let pos = p
                .bary
                .iter()
                .zip(vertices)
                .fold(na::SVector::zeros(), |acc, (b, v)| acc + *b * v);
            p.weight * f(pos)
        })
        .sum();
    sum * simplex_volume(vertices)
}

// Dunavant (1985), High degree efficient symmetrical Gaussian quadrature rules
// for the triangle, degree 4 rule
const DUNAVANT_A1: f64 = 0.445948490915965;
const DUNAVANT_B1: f64 = 0.108103018168070;
const DUNAVANT_W1: f64 = 0.223381589678011;
const DUNAVANT_A2: f64 = 0.091576213509771;
const DUNAVANT_B2: f64 = 0.816847572980459;
const DUNAVANT_W2: f64 = 0.109951743655322;

#[rustfmt::skip]
const WEIGHTS_DUNAVANT_6: [SimplexPoint<3>; 6] = [
    SimplexPoint { weight: DUNAVANT_W1, bary: [DUNAVANT_B1, DUNAVANT_A1, DUNAVANT_A1] },
    SimplexPoint { weight: DUNAVANT_W1, bary: [DUNAVANT_A1, DUNAVANT_B1, DUNAVANT_A1] },
    SimplexPoint { weight: DUNAVANT_W1, bary: [DUNAVANT_A1, DUNAVANT_A1, DUNAVANT_B1] },
    SimplexPoint { weight: DUNAVANT_W2, bary: [DUNAVANT_B2, DUNAVANT_A2, DUNAVANT_A2] },
    SimplexPoint { weight: DUNAVANT_W2, bary: [DUNAVANT_A2, DUNAVANT_B2, DUNAVANT_A2] },
    SimplexPoint { weight: DUNAVANT_W2, bary: [DUNAVANT_A2, DUNAVANT_A2, DUNAVANT_B2] },
];

/// Six-point quadrature for integrating a scalar function over a triangle.
///
/// This is exact for polynomials up to degree 4.
/// The triangle may be embedded in 2D or 3D space.
#[derive(Clone)]
pub struct Dunavant6<const D: usize, IntgFn>(pub IntgFn)
where
    IntgFn: Fn(na::SVector<f64, D>) -> f64;

impl<const D: usize, IntgFn> Quadrature<2, D> for Dunavant6<D, IntgFn>
where
    IntgFn: Fn(na::SVector<f64, D>) -> f64,
{
    fn compute(&self, vertices: &[na::SVector<f64, D>]) -> f64 {
        simplex_rule(vertices, &WEIGHTS_DUNAVANT_6, &self.0)
    }
}

// Keast (1986), Moderate-degree tetrahedral quadrature formulas, degree 2 rule.
// the coordinates are (5 - sqrt 5) / 20 and (5 + 3 sqrt 5) / 20
const KEAST_B: f64 = 0.1381966011250105;
const KEAST_A: f64 = 0.5854101966249685;

const WEIGHTS_KEAST_4: [SimplexPoint<4>; 4] = [
    SimplexPoint {
        weight: 0.25,
        bary: [KEAST_A, KEAST_B, KEAST_B, KEAST_B],
    },
    SimplexPoint {
        weight: 0.25,
        bary: [KEAST_B, KEAST_A, KEAST_B, KEAST_B],
    },
    SimplexPoint {
        weight: 0.25,
        bary: [KEAST_B, KEAST_B, KEAST_A, KEAST_B],
    },
    SimplexPoint {
        weight: 0.25,
        bary: [KEAST_B, KEAST_B, KEAST_B, KEAST_A],
    },
];

/// Four-point quadrature for integrating a scalar function over a tetrahedron.
///
/// This is exact for polynomials up to degree 2.
#[derive(Clone)]
pub struct Keast4<const D: usize, IntgFn>(pub IntgFn)
where
    IntgFn: Fn(na::SVector<f64, D>) -> f64;

impl<const D: usize, IntgFn> Quadrature<3, D> for Keast4<D, IntgFn>
where
    IntgFn: Fn(na::SVector<f64, D>) -> f64,
{
    fn compute(&self, vertices: &[na::SVector<f64, D>]) -> f64 {
        simplex_rule(vertices, &WEIGHTS_KEAST_4, &self.0)
    }
}
