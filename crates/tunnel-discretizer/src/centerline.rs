//! Polyline through the sphere centers, parameterized by arclength.

use tunnel_kernel_geom::{Disk, Segment3d};
use tunnel_kernel_math::Point3;

/// The raw tunnel path.
#[derive(Debug, Clone)]
pub struct Centerline {
    points: Vec<Point3>,
    offsets: Vec<f64>,
}

impl Centerline {
    /// Build from vertices in path order.
    pub fn new(points: Vec<Point3>) -> Self {
        let mut offsets = Vec::with_capacity(points.len());
        let mut total = 0.0;
        for (i, p) in points.iter().enumerate() {
            if i > 0 {
                total += (p - points[i - 1]).norm();
            }
            offsets.push(total);
        }
        Self { points, offsets }
    }

    /// Vertices.
    pub fn points(&self) -> &[Point3] {
        &self.points
    }

    /// Number of segments.
    pub fn segment_count(&self) -> usize {
        self.points.len().saturating_sub(1)
    }

    /// Segment `i`, from vertex `i` to vertex `i + 1`.
    pub fn segment(&self, i: usize) -> Segment3d {
        Segment3d::new(self.points[i], self.points[i + 1])
    }

    /// Arclength of vertex `i` from the start.
    pub fn offset(&self, i: usize) -> f64 {
        self.offsets[i]
    }

    /// Arclength of every vertex.
    pub fn offsets(&self) -> &[f64] {
        &self.offsets
    }

    /// Total length.
    pub fn length(&self) -> f64 {
        self.offsets.last().copied().unwrap_or(0.0)
    }

    /// Whether the path threads through `disk` consistently.
    ///
    /// Every place where the path changes sides of the disk plane inside the
    /// disk is a crossing; all crossings must go the same way and there must
    /// be at least one. Vertices on the plane are resolved by their
    /// neighbours, so passing through a vertex counts once and touching the
    /// plane without changing sides does not count.
    pub fn passes_through_disk(&self, disk: &Disk, tol: f64) -> bool {
        let mut last_off_plane: Option<(usize, f64)> = None;
        let mut direction: Option<bool> = None;

        for (i, p) in self.points.iter().enumerate() {
            let h = disk.height_of(p);
            if h.abs() <= tol {
                continue;
            }
            if let Some((j, hj)) = last_off_plane {
                if (hj > 0.0) != (h > 0.0) {
                    let hit = if i == j + 1 {
                        self.points[j] + (p - self.points[j]) * (hj / (hj - h))
                    } else {
                        self.points[j + 1]
                    };
                    if disk.contains_point(&hit, tol.max(1e-9 * disk.radius)) {
                        let forward = h > 0.0;
                        match direction {
                            None => direction = Some(forward),
                            Some(d) if d != forward => return false,
                            Some(_) => {}
                        }
                    }
                }
            }
            last_off_plane = Some((i, h));
        }
        direction.is_some()
    }
}
