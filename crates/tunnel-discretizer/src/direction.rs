//! The tunnel direction field.
//!
//! Every sphere center gets a seed direction: the normal of the smallest
//! cross-section disk at that center which the centerline still threads.
//! Between seeds the direction is blended by arclength.

use std::f64::consts::{FRAC_PI_3, TAU};

use log::{debug, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tunnel_kernel_geom::Disk;
use tunnel_kernel_math::{cone_direction, try_direction, Dir3, Point3, Vec3};

use crate::cache::{DirectionStore, GeometryKey};
use crate::centerline::Centerline;
use crate::error::{DiscretizeError, Result};
use crate::fit::CrossSectionFitter;
use crate::tunnel::Tunnel;
use crate::DiscretizeSettings;

/// Relative distance to a seed below which its direction is used as is.
const SEED_SNAP: f64 = 1e-12;

/// How seed directions are blended between seed positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DirectionBlend {
    /// Normalized sum of seed directions weighted by `(window - distance)^3`,
    /// divided by `distance^2` when the window is fixed.
    #[default]
    Kernel,
    /// Smoothstep between the two bracketing seeds.
    Cubic,
}

/// Seed search and blending parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectionSettings {
    /// Half-angle of the first search cone (radians).
    pub initial_cone: f64,
    /// Number of refinement rounds; each halves the cone.
    pub rounds: u32,
    /// Azimuth step of the first round (radians); grows linearly per round.
    pub phi_step: f64,
    /// Cap on improving passes within one round.
    pub max_passes: u32,
    /// Interpolation between seeds.
    pub blend: DirectionBlend,
    /// Fixed kernel window (arclength). `None` uses the bracketing interval.
    pub window: Option<f64>,
}

impl Default for DirectionSettings {
    fn default() -> Self {
        Self {
            initial_cone: FRAC_PI_3,
            rounds: 5,
            phi_step: 0.1,
            max_passes: 16,
            blend: DirectionBlend::Kernel,
            window: None,
        }
    }
}

impl DirectionSettings {
    /// Validate settings.
    pub fn validate(&self) -> Result<()> {
        if !(self.initial_cone > 0.0 && self.initial_cone <= std::f64::consts::FRAC_PI_2) {
            return Err(DiscretizeError::InvalidSettings(
                "initial_cone must be in (0, pi/2]".into(),
            ));
        }
        if !(self.phi_step > 0.0 && self.phi_step.is_finite()) {
            return Err(DiscretizeError::InvalidSettings(
                "phi_step must be positive".into(),
            ));
        }
        if matches!(self.window, Some(w) if !(w > 0.0 && w.is_finite())) {
            return Err(DiscretizeError::InvalidSettings(
                "window must be positive when set".into(),
            ));
        }
        Ok(())
    }
}

/// The chosen direction at one sphere center.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeedDirection {
    /// Arclength of the sphere center along the centerline.
    pub offset: f64,
    /// Seed direction, oriented along the path.
    pub direction: Dir3,
    /// The minimal disk found at the center.
    pub disk: Disk,
}

/// Seed directions plus the rule for blending them.
#[derive(Debug, Clone)]
pub struct DirectionField {
    seeds: Vec<SeedDirection>,
    blend: DirectionBlend,
    window: Option<f64>,
}

impl DirectionField {
    /// Field from precomputed seeds, sorted by offset.
    pub fn from_seeds(seeds: Vec<SeedDirection>, settings: &DirectionSettings) -> Result<Self> {
        if seeds.is_empty() {
            return Err(DiscretizeError::InputInvalid(
                "direction field needs at least one seed".into(),
            ));
        }
        if seeds.windows(2).any(|w| w[1].offset < w[0].offset) {
            return Err(DiscretizeError::InputInvalid(
                "seed offsets must be non-decreasing".into(),
            ));
        }
        Ok(Self {
            seeds,
            blend: settings.blend,
            window: settings.window,
        })
    }

    /// Search the seed direction at every sphere center, in parallel.
    pub fn compute(tunnel: &Tunnel, settings: &DiscretizeSettings) -> Result<Self> {
        let centerline = tunnel.centerline();
        let fitter = CrossSectionFitter::new(tunnel, settings.shuffle_seed);
        let search = SeedSearch {
            fitter: &fitter,
            centerline: &centerline,
            settings: &settings.direction,
            tolerance: settings.tolerance,
        };

        let seeds = (0..centerline.points().len())
            .into_par_iter()
            .map(|i| -> Result<SeedDirection> {
                let initial = initial_direction(centerline.points(), i)?;
                let disk = search.run(centerline.points()[i], initial)?;
                Ok(SeedDirection {
                    offset: centerline.offset(i),
                    direction: disk.normal,
                    disk,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        info!(
            "direction field: {} seeds over arclength {:.4}",
            seeds.len(),
            centerline.length()
        );
        Self::from_seeds(seeds, &settings.direction)
    }

    /// Like [`DirectionField::compute`], reusing seeds from `store` when the
    /// tunnel and settings hash to a stored key.
    ///
    /// Store failures are logged and never fail the computation.
    pub fn compute_cached(
        tunnel: &Tunnel,
        settings: &DiscretizeSettings,
        store: &dyn DirectionStore,
    ) -> Result<Self> {
        let key = GeometryKey::of(tunnel, settings);
        match store.load(&key) {
            Ok(Some(seeds)) if seeds.len() == tunnel.len() => {
                debug!("direction field cache hit for {key}");
                return Self::from_seeds(seeds, &settings.direction);
            }
            Ok(Some(seeds)) => warn!(
                "direction cache entry {key} has {} seeds, expected {}; recomputing",
                seeds.len(),
                tunnel.len()
            ),
            Ok(None) => debug!("direction field cache miss for {key}"),
            Err(e) => warn!("direction cache load failed for {key}: {e}"),
        }

        let field = Self::compute(tunnel, settings)?;
        if let Err(e) = store.store(&key, field.seeds()) {
            warn!("direction cache store failed for {key}: {e}");
        }
        Ok(field)
    }

    /// Seeds in arclength order.
    pub fn seeds(&self) -> &[SeedDirection] {
        &self.seeds
    }

    /// Blend mode.
    pub fn blend(&self) -> DirectionBlend {
        self.blend
    }

    /// Unit direction at arclength `t`, clamped to the seeded range.
    ///
    /// Returns the seed direction exactly at a seed's offset.
    pub fn direction_at(&self, t: f64) -> Dir3 {
        let (first, last) = match (self.seeds.first(), self.seeds.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return Vec3::x_axis(),
        };
        let t = t.clamp(first.offset, last.offset);
        let j = self.seeds.partition_point(|s| s.offset <= t).saturating_sub(1);
        if j + 1 >= self.seeds.len() {
            return self.seeds[j].direction;
        }

        let blended = match self.blend {
            DirectionBlend::Kernel => self.kernel_sum(t, j),
            DirectionBlend::Cubic => self.smoothstep(t, j),
        };
        try_direction(&blended).unwrap_or_else(|| self.nearest(t).direction)
    }

    fn kernel_sum(&self, t: f64, j: usize) -> Vec3 {
        let Some(window) = self.window else {
            let (lo, hi) = (&self.seeds[j], &self.seeds[j + 1]);
            let window = hi.offset - lo.offset;
            let cubed = |d: f64| {
                let w = (window - d).max(0.0);
                w * w * w
            };
            return lo.direction.into_inner() * cubed(t - lo.offset)
                + hi.direction.into_inner() * cubed(hi.offset - t);
        };

        // Inverse-square scaling makes every seed inside the window dominate
        // its own neighborhood, so the field is continuous through seeds.
        let mut sum = Vec3::zeros();
        for s in &self.seeds {
            let d = (s.offset - t).abs();
            if d <= SEED_SNAP * window {
                return s.direction.into_inner();
            }
            if d < window {
                let w = window - d;
                sum += s.direction.into_inner() * (w * w * w / (d * d));
            }
        }
        sum
    }

    fn smoothstep(&self, t: f64, j: usize) -> Vec3 {
        let (lo, hi) = (&self.seeds[j], &self.seeds[j + 1]);
        let span = hi.offset - lo.offset;
        let x = if span > 0.0 { (t - lo.offset) / span } else { 0.0 };
        let h = x * x * (3.0 - 2.0 * x);
        lo.direction.into_inner() * (1.0 - h) + hi.direction.into_inner() * h
    }

    fn nearest(&self, t: f64) -> &SeedDirection {
        self.seeds
            .iter()
            .min_by(|a, b| (a.offset - t).abs().total_cmp(&(b.offset - t).abs()))
            .unwrap_or(&self.seeds[0])
    }
}

/// Direction towards the next center; the last center continues the last
/// segment.
fn initial_direction(points: &[Point3], i: usize) -> Result<Dir3> {
    let step = match (points.get(i + 1), i.checked_sub(1).and_then(|k| points.get(k))) {
        (Some(next), _) => *next - points[i],
        (None, Some(prev)) => points[i] - *prev,
        (None, None) => Vec3::zeros(),
    };
    try_direction(&step).ok_or_else(|| {
        DiscretizeError::InputInvalid(format!("no path direction at sphere {i}"))
    })
}

/// Coarse-to-fine cone search for the minimal threaded disk at one center.
struct SeedSearch<'s, 'a> {
    fitter: &'s CrossSectionFitter<'a>,
    centerline: &'s Centerline,
    settings: &'s DirectionSettings,
    tolerance: f64,
}

impl SeedSearch<'_, '_> {
    fn run(&self, center: Point3, initial: Dir3) -> Result<Disk> {
        let mut best = self.fitter.fit(initial.as_ref(), &center)?;

        for round in 0..self.settings.rounds {
            let theta = self.settings.initial_cone / f64::from(1u32 << round.min(30));
            let step = self.settings.phi_step * f64::from(round + 1);
            let samples = ((TAU / step).ceil() as usize).max(1);

            for _ in 0..self.settings.max_passes {
                let base = best.normal;
                let mut improved = false;
                for k in 0..samples {
                    let candidate = cone_direction(&base, theta, k as f64 * step);
                    let Ok(disk) = self.fitter.fit(candidate.as_ref(), &center) else {
                        continue;
                    };
                    if disk.radius < best.radius - self.tolerance
                        && self.centerline.passes_through_disk(&disk, self.tolerance)
                    {
                        best = disk.oriented_like(initial.as_ref());
                        improved = true;
                    }
                }
                if !improved {
                    break;
                }
            }
        }

        debug!(
            "seed at ({:.3}, {:.3}, {:.3}): radius {:.6}",
            center.x, center.y, center.z, best.radius
        );
        Ok(best.oriented_like(initial.as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tunnel_kernel_geom::Sphere;

    fn seed(offset: f64, direction: Vec3) -> SeedDirection {
        let direction = Dir3::new_normalize(direction);
        SeedDirection {
            offset,
            direction,
            disk: Disk::from_dir(Point3::new(offset, 0.0, 0.0), direction, 1.0),
        }
    }

    fn field(blend: DirectionBlend, window: Option<f64>) -> DirectionField {
        let settings = DirectionSettings {
            blend,
            window,
            ..Default::default()
        };
        DirectionField::from_seeds(
            vec![
                seed(0.0, Vec3::x()),
                seed(2.0, Vec3::y()),
                seed(3.0, Vec3::new(0.0, 1.0, 1.0)),
            ],
            &settings,
        )
        .unwrap()
    }

    #[test]
    fn test_initial_direction_extrapolates_at_end() {
        let points = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 2.0, 0.0),
        ];
        let first = initial_direction(&points, 0).unwrap();
        assert!((first.x - 1.0).abs() < 1e-12);
        let last = initial_direction(&points, 2).unwrap();
        assert!((last.y - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_blends_are_exact_at_seeds() {
        for (blend, window) in [
            (DirectionBlend::Kernel, None),
            (DirectionBlend::Cubic, None),
            (DirectionBlend::Kernel, Some(0.5)),
        ] {
            let f = field(blend, window);
            for s in f.seeds() {
                let d = f.direction_at(s.offset);
                assert!((d.into_inner() - s.direction.into_inner()).norm() < 1e-12);
            }
        }
    }

    #[test]
    fn test_blend_midpoint_and_clamp() {
        let f = field(DirectionBlend::Kernel, None);
        let mid = f.direction_at(1.0);
        let expected = Vec3::new(1.0, 1.0, 0.0).normalize();
        assert!((mid.into_inner() - expected).norm() < 1e-12);
        assert!((f.direction_at(-5.0).x - 1.0).abs() < 1e-12);
        assert!((f.direction_at(50.0).into_inner() - f.seeds()[2].direction.into_inner()).norm() < 1e-12);

        let cubic = field(DirectionBlend::Cubic, None);
        let quarter = cubic.direction_at(0.5);
        // smoothstep(0.25) = 0.15625
        let expected = Vec3::new(0.84375, 0.15625, 0.0).normalize();
        assert!((quarter.into_inner() - expected).norm() < 1e-12);
    }

    #[test]
    fn test_fixed_window_uses_every_seed_in_range() {
        let f = field(DirectionBlend::Kernel, Some(3.0));
        let d = f.direction_at(1.0);
        // All three seeds lie within the window and pull towards +z.
        assert!(d.z > 0.0);
        assert!((d.norm() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_fixed_window_is_continuous_through_seeds() {
        let f = field(DirectionBlend::Kernel, Some(3.0));
        for s in f.seeds() {
            let at = f.direction_at(s.offset);
            assert!((at.into_inner() - s.direction.into_inner()).norm() < 1e-12);
            for t in [s.offset - 1e-9, s.offset + 1e-9] {
                let near = f.direction_at(t);
                assert!((near.into_inner() - at.into_inner()).norm() < 1e-6, "jump at {t}");
            }
        }
        // Still a blend away from the seeds.
        let d = f.direction_at(2.5);
        assert!(d.y > 0.0 && d.z > 0.0 && d.z < 1.0 / 2.0f64.sqrt());
    }

    #[test]
    fn test_empty_window_falls_back_to_nearest() {
        let f = field(DirectionBlend::Kernel, Some(0.1));
        let d = f.direction_at(0.6);
        assert!((d.x - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_from_seeds_rejects_unsorted() {
        let settings = DirectionSettings::default();
        assert!(DirectionField::from_seeds(Vec::new(), &settings).is_err());
        let unsorted = vec![seed(1.0, Vec3::x()), seed(0.0, Vec3::x())];
        assert!(DirectionField::from_seeds(unsorted, &settings).is_err());
    }

    #[test]
    fn test_search_recovers_from_tilted_start() {
        let tunnel = Tunnel::new(
            (0..5)
                .map(|i| Sphere::new(Point3::new(1.5 * i as f64, 0.0, 0.0), 1.0))
                .collect(),
        )
        .unwrap();
        let centerline = tunnel.centerline();
        let fitter = CrossSectionFitter::new(&tunnel, 11);
        let settings = DirectionSettings::default();
        let search = SeedSearch {
            fitter: &fitter,
            centerline: &centerline,
            settings: &settings,
            tolerance: 1e-7,
        };
        // One radian off the axis the neighbours join the cut; the search
        // must tilt back until only the center sphere remains.
        let tilted = Dir3::new_normalize(Vec3::new(1.0f64.cos(), 1.0f64.sin(), 0.0));
        let start = fitter.fit(tilted.as_ref(), &Point3::new(3.0, 0.0, 0.0)).unwrap();
        assert!(start.radius > 1.2);

        let best = search.run(Point3::new(3.0, 0.0, 0.0), tilted).unwrap();
        assert!((best.radius - 1.0).abs() < 1e-6);
        assert!(best.normal.x > 2.0 / 3.0);
        assert!(best.normal.dot(tilted.as_ref()) > 0.0);
    }

    #[test]
    fn test_straight_tunnel_seeds_follow_axis() {
        let tunnel = Tunnel::new(
            (0..4)
                .map(|i| Sphere::new(Point3::new(2.5 * i as f64, 0.0, 0.0), 2.0))
                .collect(),
        )
        .unwrap();
        let f = DirectionField::compute(&tunnel, &DiscretizeSettings::default()).unwrap();
        assert_eq!(f.seeds().len(), 4);
        for (i, s) in f.seeds().iter().enumerate() {
            assert!((s.offset - 2.5 * i as f64).abs() < 1e-12);
            assert!(s.direction.x > 0.999);
            assert!((s.disk.radius - 2.0).abs() < 1e-6);
        }
    }
}
