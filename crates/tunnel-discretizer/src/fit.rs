//! Cross-section fitting: the smallest disk covering a planar tunnel cut.

use tunnel_kernel_geom::{min_enclosing_circle, Disk, Plane};
use tunnel_kernel_math::{Point3, Vec3};

use crate::error::{DiscretizeError, Result};
use crate::tunnel::Tunnel;

/// Fits disks to the tunnel's connected cross-sections.
#[derive(Debug, Clone, Copy)]
pub struct CrossSectionFitter<'a> {
    tunnel: &'a Tunnel,
    seed: u64,
}

impl<'a> CrossSectionFitter<'a> {
    /// Fitter over `tunnel`; `seed` fixes the enclosing-circle shuffle.
    pub fn new(tunnel: &'a Tunnel, seed: u64) -> Self {
        Self { tunnel, seed }
    }

    /// The tunnel being fitted.
    pub fn tunnel(&self) -> &'a Tunnel {
        self.tunnel
    }

    /// Smallest disk in the plane through `point` with normal `direction`
    /// that covers the connected cross-section around `point`.
    ///
    /// The returned disk's normal equals `direction` normalized, and its
    /// center lies on the plane. Fails with
    /// [`DiscretizeError::GeometryDegenerate`] when the plane cuts no
    /// sphere or `direction` has no length.
    pub fn fit(&self, direction: &Vec3, point: &Point3) -> Result<Disk> {
        let plane = Plane::new(*point, *direction)?;
        let cuts = self.tunnel.cross_section_near(&plane, point);
        if cuts.is_empty() {
            return Err(DiscretizeError::GeometryDegenerate(format!(
                "no sphere reaches the cross-section at ({:.4}, {:.4}, {:.4})",
                point.x, point.y, point.z
            )));
        }
        let circle = min_enclosing_circle(&cuts, self.seed)?;
        Ok(Disk::from_dir(
            plane.evaluate(&circle.center),
            plane.normal,
            circle.radius,
        ))
    }

    /// Fit again at the disk's own center and normal.
    pub fn refit(&self, disk: &Disk) -> Result<Disk> {
        self.fit(disk.normal.as_ref(), &disk.center)
    }
}
