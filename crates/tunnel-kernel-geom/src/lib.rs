#![warn(missing_docs)]

//! Geometry primitives for the tunnel discretizer.
//!
//! Spheres describe the tunnel, planes and 2D circles describe its cross
//! sections, and oriented disks are the discretized result. The crate also
//! provides the closed-form intersections between these types and the
//! minimal enclosing circle of a set of circles ([`min_enclosing_circle`]).

use std::cell::OnceCell;

use nalgebra::Matrix2x3;
use thiserror::Error;
use tunnel_kernel_math::{
    normal_in_plane, orthogonal_complement, try_direction, Dir3, Point2, Point3, Vec3,
};

mod enclosing;

pub use enclosing::min_enclosing_circle;

/// Errors from geometric constructions.
#[derive(Debug, Clone, Error)]
pub enum GeomError {
    /// The construction has no well-defined result for its input.
    #[error("degenerate geometry: {0}")]
    Degenerate(String),
}

/// Result type for geometry operations.
pub type Result<T> = std::result::Result<T, GeomError>;

// =============================================================================
// Sphere
// =============================================================================

/// A ball of free space: center and radius.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sphere {
    /// Center point.
    pub center: Point3,
    /// Radius (non-negative).
    pub radius: f64,
}

impl Sphere {
    /// Create a sphere.
    pub fn new(center: Point3, radius: f64) -> Self {
        Self { center, radius }
    }

    /// Whether the closed ball contains `p`, within `tol`.
    pub fn contains_point(&self, p: &Point3, tol: f64) -> bool {
        (p - self.center).norm() <= self.radius + tol
    }

    /// Whether `other` lies strictly inside this ball.
    ///
    /// Identical spheres do not strictly contain each other.
    pub fn strictly_contains(&self, other: &Sphere, tol: f64) -> bool {
        (other.center - self.center).norm() + other.radius < self.radius - tol
    }

    /// Cross-section of this ball with `plane`, in the plane's coordinates.
    pub fn intersect_plane(&self, plane: &Plane) -> Option<Circle2d> {
        plane.intersect_sphere(self)
    }
}

// =============================================================================
// Plane
// =============================================================================

#[derive(Debug, Clone)]
struct PlaneFrame {
    u: Dir3,
    v: Dir3,
    // Pseudo-inverse of the 3x2 basis matrix [u v]; rows are u and v.
    projector: Matrix2x3<f64>,
}

/// An infinite plane through `point` with unit `normal`.
///
/// Parameterization: `P(s, t) = point + s * u + t * v`, where `(u, v, normal)`
/// is a right-handed orthonormal frame built on first use and then reused
/// for every projection.
#[derive(Debug, Clone)]
pub struct Plane {
    /// A point on the plane; origin of the in-plane coordinates.
    pub point: Point3,
    /// Unit normal.
    pub normal: Dir3,
    frame: OnceCell<PlaneFrame>,
}

impl Plane {
    /// Create a plane from a point and a (not necessarily unit) normal.
    pub fn new(point: Point3, normal: Vec3) -> Result<Self> {
        let normal = try_direction(&normal)
            .ok_or_else(|| GeomError::Degenerate("plane normal has zero length".into()))?;
        Ok(Self::from_dir(point, normal))
    }

    /// Create a plane from a point and a unit normal.
    pub fn from_dir(point: Point3, normal: Dir3) -> Self {
        Self {
            point,
            normal,
            frame: OnceCell::new(),
        }
    }

    fn frame(&self) -> &PlaneFrame {
        self.frame.get_or_init(|| {
            let (u, v) = orthogonal_complement(&self.normal);
            let projector = Matrix2x3::from_rows(&[u.transpose(), v.transpose()]);
            PlaneFrame { u, v, projector }
        })
    }

    /// In-plane basis `(u, v)`.
    pub fn basis(&self) -> (Dir3, Dir3) {
        let frame = self.frame();
        (frame.u, frame.v)
    }

    /// Project a 3D point to in-plane coordinates.
    pub fn project(&self, p: &Point3) -> Point2 {
        Point2::from(self.frame().projector * (p - self.point))
    }

    /// Map in-plane coordinates back to a 3D point on the plane.
    pub fn evaluate(&self, uv: &Point2) -> Point3 {
        let frame = self.frame();
        self.point + frame.u.as_ref() * uv.x + frame.v.as_ref() * uv.y
    }

    /// Signed distance from `p` to the plane (positive on the normal side).
    pub fn signed_distance(&self, p: &Point3) -> f64 {
        (p - self.point).dot(self.normal.as_ref())
    }

    /// Foot of the perpendicular from `p`.
    pub fn orthogonal_projection(&self, p: &Point3) -> Point3 {
        p - self.normal.as_ref() * self.signed_distance(p)
    }

    /// Whether `p` lies on the plane within `tol`.
    pub fn contains_point(&self, p: &Point3, tol: f64) -> bool {
        self.signed_distance(p).abs() <= tol
    }

    /// Circle cut from `sphere`, or `None` if the ball does not reach the plane.
    ///
    /// A ball that just touches the plane yields a circle of radius zero.
    pub fn intersect_sphere(&self, sphere: &Sphere) -> Option<Circle2d> {
        let d = self.signed_distance(&sphere.center);
        if d.abs() > sphere.radius {
            return None;
        }
        let radius = (sphere.radius * sphere.radius - d * d).max(0.0).sqrt();
        Some(Circle2d::new(self.project(&sphere.center), radius))
    }

    /// Intersection point with `line`, or `None` if they are parallel.
    pub fn intersect_line(&self, line: &Line3d) -> Option<Point3> {
        line.intersect_plane(self).map(|t| line.point_at(t))
    }
}

// =============================================================================
// Lines and segments
// =============================================================================

/// Intersection of a line with a sphere, as line parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LineSphereHit {
    /// The line misses the ball (negative discriminant).
    Miss,
    /// The line touches the sphere at one parameter.
    Tangent(f64),
    /// The line enters and leaves the ball; parameters in increasing order.
    Secant(f64, f64),
}

/// An infinite line through `origin` along a unit direction.
///
/// Parameterization: `P(t) = origin + t * direction`, so `t` is arclength.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Line3d {
    /// A point on the line.
    pub origin: Point3,
    /// Unit direction.
    pub direction: Dir3,
}

impl Line3d {
    /// Create a line from a point and a direction vector.
    pub fn new(origin: Point3, direction: Vec3) -> Result<Self> {
        let direction = try_direction(&direction)
            .ok_or_else(|| GeomError::Degenerate("line direction has zero length".into()))?;
        Ok(Self { origin, direction })
    }

    /// Line through two distinct points, parameterized from `start`.
    pub fn from_points(start: Point3, end: Point3) -> Result<Self> {
        Self::new(start, end - start)
    }

    /// Point at parameter `t`.
    pub fn point_at(&self, t: f64) -> Point3 {
        self.origin + self.direction.as_ref() * t
    }

    /// Parameter of the foot of the perpendicular from `p`.
    pub fn parameter_of(&self, p: &Point3) -> f64 {
        (p - self.origin).dot(self.direction.as_ref())
    }

    /// Parameter where the line crosses `plane`, or `None` if parallel.
    pub fn intersect_plane(&self, plane: &Plane) -> Option<f64> {
        let denom = self.direction.dot(plane.normal.as_ref());
        if denom.abs() < 1e-12 {
            return None;
        }
        Some(-plane.signed_distance(&self.origin) / denom)
    }

    /// Closed-form intersection with a sphere.
    pub fn intersect_sphere(&self, sphere: &Sphere) -> LineSphereHit {
        let oc = self.origin - sphere.center;
        let b = self.direction.dot(&oc);
        let c = oc.norm_squared() - sphere.radius * sphere.radius;
        let disc = b * b - c;
        if disc < 0.0 {
            LineSphereHit::Miss
        } else if disc == 0.0 {
            LineSphereHit::Tangent(-b)
        } else {
            let root = disc.sqrt();
            LineSphereHit::Secant(-b - root, -b + root)
        }
    }
}

/// A straight segment between two points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment3d {
    /// Start point.
    pub start: Point3,
    /// End point.
    pub end: Point3,
}

impl Segment3d {
    /// Create a segment.
    pub fn new(start: Point3, end: Point3) -> Self {
        Self { start, end }
    }

    /// Euclidean length.
    pub fn length(&self) -> f64 {
        (self.end - self.start).norm()
    }

    /// Unit direction from start to end, if the segment has length.
    pub fn direction(&self) -> Option<Dir3> {
        try_direction(&(self.end - self.start))
    }

    /// Supporting line, parameterized by arclength from `start`.
    pub fn line(&self) -> Result<Line3d> {
        Line3d::from_points(self.start, self.end)
    }

    /// Point where the segment crosses `plane`, if it does.
    pub fn intersect_plane(&self, plane: &Plane) -> Option<Point3> {
        let da = plane.signed_distance(&self.start);
        let db = plane.signed_distance(&self.end);
        if da * db > 0.0 || da == db {
            return None;
        }
        let t = da / (da - db);
        Some(self.start + (self.end - self.start) * t)
    }
}

// =============================================================================
// Circle2d
// =============================================================================

/// A circle in a plane's 2D coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Circle2d {
    /// Center.
    pub center: Point2,
    /// Radius.
    pub radius: f64,
}

impl Circle2d {
    /// Create a circle.
    pub fn new(center: Point2, radius: f64) -> Self {
        Self { center, radius }
    }

    /// Whether the closed circle region contains `p`, within `tol`.
    pub fn contains_point(&self, p: &Point2, tol: f64) -> bool {
        (p - self.center).norm() <= self.radius + tol
    }

    /// Whether the two circle regions overlap or touch.
    pub fn intersects(&self, other: &Circle2d) -> bool {
        (other.center - self.center).norm() <= self.radius + other.radius
    }

    /// Whether `other` lies inside this circle, within `tol`.
    pub fn encloses(&self, other: &Circle2d, tol: f64) -> bool {
        (other.center - self.center).norm() + other.radius <= self.radius + tol
    }
}

// =============================================================================
// Disk
// =============================================================================

/// An oriented circular region in 3D.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Disk {
    /// Center point.
    pub center: Point3,
    /// Unit normal.
    pub normal: Dir3,
    /// Radius.
    pub radius: f64,
}

impl Disk {
    /// Create a disk; the normal is normalized.
    pub fn new(center: Point3, normal: Vec3, radius: f64) -> Result<Self> {
        let normal = try_direction(&normal)
            .ok_or_else(|| GeomError::Degenerate("disk normal has zero length".into()))?;
        Ok(Self::from_dir(center, normal, radius))
    }

    /// Create a disk from a unit normal.
    pub fn from_dir(center: Point3, normal: Dir3, radius: f64) -> Self {
        Self {
            center,
            normal,
            radius,
        }
    }

    /// Disk whose diameter spans `a` and `b`.
    ///
    /// The normal is perpendicular to the diameter and lies in the plane of
    /// the diameter and `reference`, on the same side as `reference`.
    pub fn from_diameter(a: &Point3, b: &Point3, reference: &Vec3) -> Result<Self> {
        let axis = b - a;
        let normal = normal_in_plane(reference, &axis).ok_or_else(|| {
            GeomError::Degenerate("diameter is parallel to the reference normal".into())
        })?;
        Ok(Self::from_dir(
            nalgebra::center(a, b),
            normal,
            axis.norm() * 0.5,
        ))
    }

    /// Supporting plane.
    pub fn plane(&self) -> Plane {
        Plane::from_dir(self.center, self.normal)
    }

    /// Whether `p` lies on the disk (on its plane and within its radius).
    pub fn contains_point(&self, p: &Point3, tol: f64) -> bool {
        let offset = p - self.center;
        let height = offset.dot(self.normal.as_ref());
        if height.abs() > tol {
            return false;
        }
        (offset - self.normal.as_ref() * height).norm() <= self.radius + tol
    }

    /// Signed height of `p` above the disk plane, along the normal.
    pub fn height_of(&self, p: &Point3) -> f64 {
        (p - self.center).dot(self.normal.as_ref())
    }

    /// The two diameter endpoints along the in-plane unit vector `along`.
    pub fn endpoints(&self, along: &Vec3) -> (Point3, Point3) {
        let r = along * self.radius;
        (self.center + r, self.center - r)
    }

    /// This disk with its normal flipped, if needed, to agree with `reference`.
    pub fn oriented_like(self, reference: &Vec3) -> Self {
        if self.normal.dot(reference) < 0.0 {
            Self {
                normal: Dir3::new_unchecked(-self.normal.into_inner()),
                ..self
            }
        } else {
            self
        }
    }
}
