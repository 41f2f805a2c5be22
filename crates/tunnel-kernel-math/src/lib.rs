#![warn(missing_docs)]

//! Math types for the tunnel discretizer kernel.
//!
//! Thin wrappers around nalgebra providing the point, vector and direction
//! aliases used throughout the workspace, a Rodrigues axis rotation, frame
//! construction helpers and the shared tolerance constants.

use nalgebra::{Matrix3, Unit, Vector2, Vector3};

/// A point in 3D space.
pub type Point3 = nalgebra::Point3<f64>;

/// A vector in 3D space.
pub type Vec3 = Vector3<f64>;

/// A unit (normalized) direction vector in 3D space.
pub type Dir3 = Unit<Vector3<f64>>;

/// A point in 2D in-plane coordinates.
pub type Point2 = nalgebra::Point2<f64>;

/// A vector in 2D space.
pub type Vec2 = Vector2<f64>;

/// Squared norm below which a vector is treated as having no direction.
const DIRECTION_EPSILON: f64 = 1e-24;

/// A rotation about an axis through the origin.
#[derive(Debug, Clone, PartialEq)]
pub struct Rotation {
    /// The underlying 3x3 matrix.
    pub matrix: Matrix3<f64>,
}

impl Rotation {
    /// Rotation about `axis` by `angle` radians (Rodrigues' formula).
    pub fn about_axis(axis: &Dir3, angle: f64) -> Self {
        let (s, c) = angle.sin_cos();
        let t = 1.0 - c;
        let (x, y, z) = (axis.x, axis.y, axis.z);
        let matrix = Matrix3::new(
            t * x * x + c,
            t * x * y - s * z,
            t * x * z + s * y,
            t * x * y + s * z,
            t * y * y + c,
            t * y * z - s * x,
            t * x * z - s * y,
            t * y * z + s * x,
            t * z * z + c,
        );
        Self { matrix }
    }

    /// Rotate a vector.
    pub fn apply(&self, v: &Vec3) -> Vec3 {
        self.matrix * v
    }
}

/// Normalize `v`, or `None` if it has no usable length.
pub fn try_direction(v: &Vec3) -> Option<Dir3> {
    if v.norm_squared() <= DIRECTION_EPSILON || !v.iter().all(|c| c.is_finite()) {
        return None;
    }
    Some(Dir3::new_normalize(*v))
}

/// Two unit vectors spanning the plane orthogonal to `normal`.
///
/// `(u, v, normal)` is a right-handed orthonormal frame. The choice of `u`
/// is arbitrary but deterministic for a given normal.
pub fn orthogonal_complement(normal: &Dir3) -> (Dir3, Dir3) {
    let arbitrary = if normal.x.abs() < 0.9 {
        Vec3::x()
    } else {
        Vec3::y()
    };
    let u = Dir3::new_normalize(arbitrary.cross(normal.as_ref()));
    let v = Dir3::new_normalize(normal.cross(u.as_ref()));
    (u, v)
}

/// Any unit vector perpendicular to `normal`.
pub fn any_perpendicular(normal: &Dir3) -> Dir3 {
    orthogonal_complement(normal).0
}

/// The component of `reference` perpendicular to `axis`, normalized.
///
/// This is the unit vector orthogonal to `axis` lying in the plane spanned
/// by `axis` and `reference`, oriented towards `reference`. Returns `None`
/// when `axis` has no length or `reference` is parallel to it.
pub fn normal_in_plane(reference: &Vec3, axis: &Vec3) -> Option<Dir3> {
    let len2 = axis.norm_squared();
    if len2 <= DIRECTION_EPSILON {
        return try_direction(reference);
    }
    let projected = reference - axis * (reference.dot(axis) / len2);
    try_direction(&projected)
}

/// A direction tilted `theta` radians away from `axis`, swept `phi` radians
/// around it.
///
/// `phi = 0` tilts towards the first vector of [`orthogonal_complement`].
pub fn cone_direction(axis: &Dir3, theta: f64, phi: f64) -> Dir3 {
    let (u, v) = orthogonal_complement(axis);
    let (sp, cp) = phi.sin_cos();
    // Tilting about this in-plane axis moves `axis` towards cos(phi)·u + sin(phi)·v.
    let hinge = Dir3::new_normalize(v.into_inner() * cp - u.into_inner() * sp);
    Dir3::new_normalize(Rotation::about_axis(&hinge, theta).apply(axis.as_ref()))
}

/// Default linear tolerance for geometric comparisons.
pub const LINEAR_TOLERANCE: f64 = 1e-7;

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn test_rotation_about_z() {
        let r = Rotation::about_axis(&Vec3::z_axis(), PI / 2.0);
        let v = r.apply(&Vec3::x());
        assert!(v.x.abs() < 1e-12);
        assert!((v.y - 1.0).abs() < 1e-12);
        assert!(v.z.abs() < 1e-12);
    }

    #[test]
    fn test_rotation_about_y() {
        let r = Rotation::about_axis(&Vec3::y_axis(), PI / 2.0);
        let v = r.apply(&Vec3::z());
        assert!((v.x - 1.0).abs() < 1e-12);
        assert!(v.z.abs() < 1e-12);
    }

    #[test]
    fn test_orthogonal_complement_is_right_handed() {
        for n in [
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 0.0, -1.0),
            Vec3::new(0.3, -0.4, 0.8),
        ] {
            let n = Dir3::new_normalize(n);
            let (u, v) = orthogonal_complement(&n);
            assert!(u.dot(n.as_ref()).abs() < 1e-12);
            assert!(v.dot(n.as_ref()).abs() < 1e-12);
            assert!(u.dot(v.as_ref()).abs() < 1e-12);
            assert!((u.cross(v.as_ref()) - n.into_inner()).norm() < 1e-12);
        }
    }

    #[test]
    fn test_normal_in_plane() {
        let n = normal_in_plane(&Vec3::new(1.0, 1.0, 0.0), &Vec3::new(0.0, 2.0, 0.0)).unwrap();
        assert!((n.x - 1.0).abs() < 1e-12);
        assert!(n.y.abs() < 1e-12);
        assert!(normal_in_plane(&Vec3::y(), &Vec3::y()).is_none());
    }

    #[test]
    fn test_cone_direction_angle() {
        let axis = Dir3::new_normalize(Vec3::new(1.0, 2.0, 3.0));
        for k in 0..8 {
            let phi = k as f64 * PI / 4.0;
            let d = cone_direction(&axis, 0.3, phi);
            assert!((d.dot(axis.as_ref()) - 0.3f64.cos()).abs() < 1e-12);
        }
        let (u, _) = orthogonal_complement(&axis);
        let tilted = cone_direction(&axis, PI / 2.0, 0.0);
        assert!((tilted.dot(u.as_ref()) - 1.0).abs() < 1e-12);
        let same = cone_direction(&axis, 0.0, 1.0);
        approx::assert_relative_eq!(same.into_inner(), axis.into_inner(), epsilon = 1e-12);
    }

    #[test]
    fn test_try_direction_rejects_zero() {
        assert!(try_direction(&Vec3::zeros()).is_none());
        assert!(try_direction(&Vec3::new(f64::NAN, 0.0, 1.0)).is_none());
        let d = try_direction(&Vec3::new(0.0, 3.0, 4.0)).unwrap();
        assert!((d.norm() - 1.0).abs() < 1e-15);
    }
}
