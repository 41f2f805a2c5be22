//! The sphere chain and its cross-section queries.

use tunnel_kernel_geom::{Circle2d, Disk, Plane, Sphere};
use tunnel_kernel_math::{Point2, Point3, LINEAR_TOLERANCE};

use crate::centerline::Centerline;
use crate::error::{DiscretizeError, Result};

/// An immutable, validated chain of spheres.
#[derive(Debug, Clone)]
pub struct Tunnel {
    spheres: Vec<Sphere>,
    tolerance: f64,
}

impl Tunnel {
    /// Build a tunnel with the default linear tolerance.
    pub fn new(spheres: Vec<Sphere>) -> Result<Self> {
        Self::with_tolerance(spheres, LINEAR_TOLERANCE)
    }

    /// Build a tunnel, checking its preconditions once.
    ///
    /// Rejects fewer than two spheres, non-finite values, negative radii,
    /// consecutive coincident centers, and any sphere strictly containing
    /// another.
    pub fn with_tolerance(spheres: Vec<Sphere>, tolerance: f64) -> Result<Self> {
        if spheres.len() < 2 {
            return Err(DiscretizeError::InputInvalid(format!(
                "a tunnel needs at least two spheres, got {}",
                spheres.len()
            )));
        }
        for (i, s) in spheres.iter().enumerate() {
            let finite = s.center.iter().all(|c| c.is_finite()) && s.radius.is_finite();
            if !finite || s.radius < 0.0 {
                return Err(DiscretizeError::InputInvalid(format!(
                    "sphere {i} has an invalid center or radius"
                )));
            }
        }
        for (i, pair) in spheres.windows(2).enumerate() {
            if (pair[1].center - pair[0].center).norm() <= tolerance {
                return Err(DiscretizeError::InputInvalid(format!(
                    "spheres {i} and {} share a center",
                    i + 1
                )));
            }
        }
        for (i, outer) in spheres.iter().enumerate() {
            for (j, inner) in spheres.iter().enumerate() {
                if i != j && outer.strictly_contains(inner, tolerance) {
                    return Err(DiscretizeError::InputInvalid(format!(
                        "sphere {i} strictly contains sphere {j}"
                    )));
                }
            }
        }
        Ok(Self { spheres, tolerance })
    }

    /// The spheres, in path order.
    pub fn spheres(&self) -> &[Sphere] {
        &self.spheres
    }

    /// Number of spheres.
    pub fn len(&self) -> usize {
        self.spheres.len()
    }

    /// Always false for a validated tunnel.
    pub fn is_empty(&self) -> bool {
        self.spheres.is_empty()
    }

    /// Linear tolerance used by containment tests.
    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Polyline through the sphere centers.
    pub fn centerline(&self) -> Centerline {
        Centerline::new(self.spheres.iter().map(|s| s.center).collect())
    }

    /// All spheres whose ball contains `point`.
    pub fn spheres_containing(&self, point: &Point3) -> Vec<&Sphere> {
        self.spheres
            .iter()
            .filter(|s| s.contains_point(point, self.tolerance))
            .collect()
    }

    /// Indices of the spheres whose cuts with `plane` form the connected
    /// cross-section around `seed_point`.
    ///
    /// Flood fill: the spheres containing `seed_point` are accepted first,
    /// then any sphere whose cut overlaps an accepted cut joins, until no
    /// more do. Indices are returned in ascending order.
    pub fn spheres_intersecting_plane(&self, plane: &Plane, seed_point: &Point3) -> Vec<usize> {
        let cuts = self.cuts(plane);
        let seeds = self
            .spheres
            .iter()
            .enumerate()
            .filter(|(i, s)| cuts[*i].is_some() && s.contains_point(seed_point, self.tolerance))
            .map(|(i, _)| i)
            .collect();
        flood(&cuts, seeds)
    }

    /// Like [`Tunnel::spheres_intersecting_plane`], but seeded by the cut
    /// whose boundary passes closest to `point` when no sphere contains it.
    ///
    /// Empty only when the plane reaches no sphere at all.
    pub fn spheres_near_plane_point(&self, plane: &Plane, point: &Point3) -> Vec<usize> {
        let contained = self.spheres_intersecting_plane(plane, point);
        if !contained.is_empty() {
            return contained;
        }
        let cuts = self.cuts(plane);
        let target = plane.project(point);
        let nearest = cuts
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.map(|c| (i, (c.center - target).norm() - c.radius)))
            .min_by(|a, b| a.1.total_cmp(&b.1));
        match nearest {
            Some((i, _)) => flood(&cuts, vec![i]),
            None => Vec::new(),
        }
    }

    fn cuts(&self, plane: &Plane) -> Vec<Option<Circle2d>> {
        self.spheres.iter().map(|s| plane.intersect_sphere(s)).collect()
    }

    /// The connected cross-section circles, in `plane`'s coordinates.
    pub fn cross_section(&self, plane: &Plane, seed_point: &Point3) -> Vec<Circle2d> {
        self.circles_of(plane, self.spheres_intersecting_plane(plane, seed_point))
    }

    /// Cross-section circles seeded as in [`Tunnel::spheres_near_plane_point`].
    pub fn cross_section_near(&self, plane: &Plane, point: &Point3) -> Vec<Circle2d> {
        self.circles_of(plane, self.spheres_near_plane_point(plane, point))
    }

    fn circles_of(&self, plane: &Plane, indices: Vec<usize>) -> Vec<Circle2d> {
        indices
            .into_iter()
            .filter_map(|i| plane.intersect_sphere(&self.spheres[i]))
            .collect()
    }

    /// Whether `disk` covers the connected cross-section at its own plane,
    /// seeded as the fitter seeds it.
    pub fn is_enclosing_disk(&self, disk: &Disk) -> bool {
        let plane = disk.plane();
        let cuts = self.cross_section_near(&plane, &disk.center);
        let bound = Circle2d::new(Point2::origin(), disk.radius);
        !cuts.is_empty() && cuts.iter().all(|c| bound.encloses(c, self.tolerance))
    }
}

/// Grow `seeds` over overlapping cuts to a fixed point; ascending indices.
fn flood(cuts: &[Option<Circle2d>], seeds: Vec<usize>) -> Vec<usize> {
    let mut accepted = vec![false; cuts.len()];
    for &i in &seeds {
        accepted[i] = true;
    }
    let mut frontier = seeds;
    while let Some(i) = frontier.pop() {
        let Some(cut) = cuts[i] else { continue };
        for (j, other) in cuts.iter().enumerate() {
            if !accepted[j] && other.is_some_and(|c| c.intersects(&cut)) {
                accepted[j] = true;
                frontier.push(j);
            }
        }
    }
    accepted
        .iter()
        .enumerate()
        .filter_map(|(i, &a)| a.then_some(i))
        .collect()
}
