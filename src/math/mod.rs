//! Vector helpers and dense linear algebra for the line solver

pub mod sag;

use nalgebra::{DMatrix, DVector, Vector3};

pub use sag::{SagCurve, SagLine, SagMatrix};

pub type Mat = DMatrix<f64>;
pub type Vec = DVector<f64>;
pub type Vec3 = Vector3<f64>;

/// Relative tolerance below which a load is considered perpendicular to a line
pub const PROJECTION_TOLERANCE: f64 = 1e-6;

/// Project a force onto a (normalized) line direction.
///
/// Returns `None` when the force vanishes or is (nearly) perpendicular to the
/// line, in which case the line force is not defined by the projection.
pub fn proj_force(force: &Vec3, direction: &Vec3) -> Option<f64> {
    let magnitude = force.norm();
    if magnitude < 1e-12 {
        return None;
    }
    let proj = force.dot(direction);
    if proj.abs() < PROJECTION_TOLERANCE * magnitude {
        return None;
    }
    Some(proj)
}

/// Component of `v` perpendicular to the unit vector `direction`
pub fn perpendicular(v: &Vec3, direction: &Vec3) -> Vec3 {
    v - direction * v.dot(direction)
}

/// Composite Simpson integration of `f` over `[a, b]` with `n` (even) intervals
pub fn simpson<F: Fn(f64) -> f64>(f: F, a: f64, b: f64, n: usize) -> f64 {
    let n = if n % 2 == 1 { n + 1 } else { n.max(2) };
    let h = (b - a) / n as f64;
    let mut sum = f(a) + f(b);
    for i in 1..n {
        let weight = if i % 2 == 1 { 4.0 } else { 2.0 };
        sum += weight * f(a + h * i as f64);
    }
    sum * h / 3.0
}
