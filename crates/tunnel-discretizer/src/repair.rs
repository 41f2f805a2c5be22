//! Spacing and ordering between consecutive disks, and their repair.
//!
//! Two disks are compared through one diameter each, chosen in a common
//! projection plane. The paired endpoint distances give the spacing
//! measure; the heights of the next disk's endpoints over the previous
//! disk give the follower test.

use log::trace;
use tunnel_kernel_geom::Disk;
use tunnel_kernel_math::{any_perpendicular, try_direction, Dir3, Point3, Vec3};

use crate::error::{DiscretizeError, Result};
use crate::fit::CrossSectionFitter;
use crate::DiscretizeSettings;

/// How the endpoints of two diameters are matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pairing {
    /// Pair to minimize the total endpoint distance.
    Nearest,
    /// Pair same side with same side: the diameters are oriented so their
    /// radius vectors point into the same half of the projection plane.
    /// The rule is symmetric in the two disks. Used through sharp turns,
    /// where nearest pairing would cross the diameters over.
    RadiusTrend,
}

/// Radius-length vectors of `a` and `b` that span their diameters in a
/// shared projection plane.
///
/// With `plane_normal` set, each vector is the radius along the line where
/// the disk plane meets that projection plane. Otherwise the projection
/// plane is spanned by the two normals; parallel normals use the offset
/// between the centers instead, and coaxial disks any common perpendicular.
pub fn radius_vectors(a: &Disk, b: &Disk, plane_normal: Option<&Dir3>) -> (Vec3, Vec3) {
    let m = match plane_normal {
        Some(m) => *m,
        None => projection_normal(a, b),
    };
    (radius_along(a, &m), radius_along(b, &m))
}

fn projection_normal(a: &Disk, b: &Disk) -> Dir3 {
    if let Some(m) = try_direction(&a.normal.cross(b.normal.as_ref())) {
        return m;
    }
    let offset = b.center - a.center;
    let lateral = offset - a.normal.as_ref() * offset.dot(a.normal.as_ref());
    try_direction(&lateral)
        .and_then(|t| try_direction(&a.normal.cross(t.as_ref())))
        .unwrap_or_else(|| any_perpendicular(&a.normal))
}

fn radius_along(disk: &Disk, m: &Dir3) -> Vec3 {
    let along = try_direction(&disk.normal.cross(m.as_ref()))
        .unwrap_or_else(|| any_perpendicular(&disk.normal));
    along.into_inner() * disk.radius
}

/// Diameter endpoints of two disks, matched index by index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairedEndpoints {
    /// Endpoints of the earlier disk.
    pub prev: [Point3; 2],
    /// Endpoints of the later disk; `next[k]` is paired with `prev[k]`.
    pub next: [Point3; 2],
}

impl PairedEndpoints {
    /// Match the diameters of `prev` and `next` in the given projection.
    pub fn compute(
        prev: &Disk,
        next: &Disk,
        plane_normal: Option<&Dir3>,
        pairing: Pairing,
    ) -> Self {
        let (ra, rb) = radius_vectors(prev, next, plane_normal);
        let (p1, p2) = (prev.center + ra, prev.center - ra);
        let (n1, n2) = (next.center + rb, next.center - rb);
        let swap = match pairing {
            Pairing::Nearest => {
                (p1 - n2).norm() + (p2 - n1).norm() < (p1 - n1).norm() + (p2 - n2).norm()
            }
            Pairing::RadiusTrend => ra.dot(&rb) < 0.0,
        };
        let next = if swap { [n2, n1] } else { [n1, n2] };
        Self {
            prev: [p1, p2],
            next,
        }
    }

    /// Distance between each matched pair.
    pub fn separations(&self) -> [f64; 2] {
        [
            (self.next[0] - self.prev[0]).norm(),
            (self.next[1] - self.prev[1]).norm(),
        ]
    }

    /// The larger matched distance.
    pub fn spacing(&self) -> f64 {
        let [d1, d2] = self.separations();
        d1.max(d2)
    }
}

/// Spacing between two disks: the larger paired endpoint distance, with
/// nearest pairing in the plane spanned by their normals.
pub fn disk_dist(a: &Disk, b: &Disk) -> f64 {
    disk_dist_in(a, b, None)
}

/// [`disk_dist`] in an explicit projection plane.
pub fn disk_dist_in(a: &Disk, b: &Disk, plane_normal: Option<&Dir3>) -> f64 {
    PairedEndpoints::compute(a, b, plane_normal, Pairing::Nearest).spacing()
}

/// Whether `next` lies entirely on the forward side of `prev`.
///
/// Both diameter endpoints of `next`, taken in the plane spanned by the two
/// normals, must be on or in front of `prev`'s plane.
pub fn is_follower(prev: &Disk, next: &Disk, tol: f64) -> bool {
    let (_, rb) = radius_vectors(prev, next, None);
    prev.height_of(&(next.center + rb)) >= -tol && prev.height_of(&(next.center - rb)) >= -tol
}

/// A disk accepted by [`ContinuityRepair`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Repaired {
    /// The disk satisfying both invariants against its predecessor.
    pub disk: Disk,
    /// Rebuilds needed; zero if the candidate was already valid.
    pub iterations: usize,
}

/// Rebuilds candidate disks until they follow their predecessor within the
/// spacing bound.
#[derive(Debug, Clone, Copy)]
pub struct ContinuityRepair<'f, 'a> {
    fitter: &'f CrossSectionFitter<'a>,
    delta: f64,
    clamp: f64,
    nudge: f64,
    max_iterations: usize,
    tolerance: f64,
}

impl<'f, 'a> ContinuityRepair<'f, 'a> {
    /// Repair with the spacing and iteration limits from `settings`.
    pub fn new(fitter: &'f CrossSectionFitter<'a>, settings: &DiscretizeSettings) -> Self {
        Self {
            fitter,
            delta: settings.delta,
            clamp: settings.delta * settings.clamp_ratio,
            nudge: settings.nudge(),
            max_iterations: settings.max_repair_iterations,
            tolerance: settings.tolerance,
        }
    }

    /// Whether `next` may follow `prev` in the chain.
    pub fn satisfied(&self, prev: &Disk, next: &Disk) -> bool {
        is_follower(prev, next, self.tolerance)
            && disk_dist(prev, next) <= self.delta + self.tolerance
    }

    /// One geometric rebuild of `next` against `prev`, before re-fitting.
    ///
    /// Endpoints behind `prev` move just in front of their partners;
    /// endpoints farther than the spacing bound are pulled back inside it.
    pub fn propose(
        &self,
        prev: &Disk,
        next: &Disk,
        pairing: Pairing,
        plane_normal: Option<&Dir3>,
    ) -> Result<Disk> {
        let ends = PairedEndpoints::compute(prev, next, plane_normal, pairing);
        let lift = prev.normal.into_inner() * self.nudge;
        let [p1, p2] = ends.prev;
        let [mut a, mut b] = ends.next;

        if prev.height_of(&a) < -self.tolerance {
            a = p1 + lift;
        }
        if prev.height_of(&b) < -self.tolerance {
            b = p2 + lift;
        }
        let a = self.clamp_to(&p1, a);
        let b = self.clamp_to(&p2, b);
        Ok(Disk::from_diameter(&a, &b, prev.normal.as_ref())?)
    }

    fn clamp_to(&self, anchor: &Point3, p: Point3) -> Point3 {
        let offset = p - anchor;
        let d = offset.norm();
        if d > self.delta {
            anchor + offset * (self.clamp / d)
        } else {
            p
        }
    }

    /// Rebuild and re-fit `candidate` until it satisfies both invariants
    /// against `prev`.
    ///
    /// Fails with [`DiscretizeError::InvariantUnsatisfiable`] after the
    /// iteration cap; geometry failures while re-fitting are passed on.
    pub fn repair(
        &self,
        prev: &Disk,
        candidate: Disk,
        pairing: Pairing,
        plane_normal: Option<&Dir3>,
    ) -> Result<Repaired> {
        let mut disk = candidate;
        for iteration in 0..self.max_iterations {
            if self.satisfied(prev, &disk) {
                return Ok(Repaired {
                    disk,
                    iterations: iteration,
                });
            }
            let proposal = self.propose(prev, &disk, pairing, plane_normal)?;
            disk = self.fitter.refit(&proposal)?;
            trace!(
                "repair {iteration}: spacing {:.6}, radius {:.6}",
                disk_dist(prev, &disk),
                disk.radius
            );
        }
        if self.satisfied(prev, &disk) {
            return Ok(Repaired {
                disk,
                iterations: self.max_iterations,
            });
        }
        Err(DiscretizeError::InvariantUnsatisfiable {
            iterations: self.max_iterations,
            spacing: disk_dist(prev, &disk),
        })
    }
}
