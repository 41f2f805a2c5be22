#![warn(missing_docs)]

//! Tunnel discretizer.
//!
//! Turns a tunnel, given as a chain of overlapping spheres, into an ordered
//! chain of oriented disks. Each disk is the smallest one covering the
//! connected cross-section of the tunnel at its plane, consecutive disks
//! are at most `delta` apart, and each disk lies entirely in front of its
//! predecessor.
//!
//! # Example
//!
//! ```ignore
//! use tunnel_discretizer::{discretize, read_pdb_spheres, DiscretizeSettings, Tunnel};
//!
//! let spheres = read_pdb_spheres(std::fs::File::open("tunnel.pdb")?)?;
//! let tunnel = Tunnel::new(spheres)?;
//! let result = discretize(&tunnel, &DiscretizeSettings::default())?;
//!
//! println!("Disks: {}", result.disks.len());
//! ```

pub mod advance;
pub mod cache;
pub mod centerline;
pub mod direction;
pub mod error;
pub mod fit;
pub mod io;
pub mod repair;
pub mod tunnel;
pub mod turn;

pub use advance::{
    decide_update, AdvanceStats, Advancer, ChainUpdate, Discretization, Termination,
};
pub use cache::{DirectionStore, GeometryKey, JsonFileStore, MemoryStore};
pub use centerline::Centerline;
pub use direction::{DirectionBlend, DirectionField, DirectionSettings, SeedDirection};
pub use error::{DiscretizeError, Result};
pub use fit::CrossSectionFitter;
pub use io::{read_disks, read_pdb_spheres, read_sphere_table, write_disks};
pub use repair::{
    disk_dist, disk_dist_in, is_follower, radius_vectors, ContinuityRepair, PairedEndpoints,
    Pairing, Repaired,
};
pub use tunnel::Tunnel;
pub use turn::{asymmetry, SharpTurn, SharpTurnDetector};

use serde::{Deserialize, Serialize};
use tunnel_kernel_math::LINEAR_TOLERANCE;

/// Discretization parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscretizeSettings {
    /// Maximum spacing between consecutive disks.
    pub delta: f64,
    /// Step size along a segment, as a fraction of `delta`.
    pub step_ratio: f64,
    /// Sharp-turn look-ahead distance, as a multiple of `delta`.
    pub look_ahead_ratio: f64,
    /// Endpoint separation asymmetry above which a turn counts as sharp.
    pub sharp_turn_threshold: f64,
    /// Projection planes sampled by the sharp-turn search.
    pub turn_search_steps: usize,
    /// Fraction of `delta` an over-long endpoint is pulled back to.
    pub clamp_ratio: f64,
    /// Offset in front of the previous disk for endpoints that fell
    /// behind it, as a fraction of `delta`.
    pub nudge_ratio: f64,
    /// Repair rebuilds before a step is given up.
    pub max_repair_iterations: usize,
    /// Coarser retries of a failed step before the last disk is pivoted.
    pub max_step_retries: u32,
    /// Seed for the enclosing-circle shuffle.
    pub shuffle_seed: u64,
    /// Linear tolerance for the follower and spacing checks.
    pub tolerance: f64,
    /// Direction field search and blending.
    pub direction: DirectionSettings,
}

impl Default for DiscretizeSettings {
    fn default() -> Self {
        Self {
            delta: 0.3,
            step_ratio: 0.1,
            look_ahead_ratio: 2.0,
            sharp_turn_threshold: 0.35,
            turn_search_steps: 64,
            clamp_ratio: 0.97,
            nudge_ratio: 0.01,
            max_repair_iterations: 32,
            max_step_retries: 4,
            shuffle_seed: 0x5eed,
            tolerance: LINEAR_TOLERANCE,
            direction: DirectionSettings::default(),
        }
    }
}

impl DiscretizeSettings {
    /// Validate settings.
    pub fn validate(&self) -> Result<()> {
        if !(self.delta > 0.0 && self.delta.is_finite()) {
            return Err(DiscretizeError::InvalidSettings(
                "delta must be positive".into(),
            ));
        }
        if !(self.step_ratio > 0.0 && self.step_ratio <= 1.0) {
            return Err(DiscretizeError::InvalidSettings(
                "step_ratio must be in (0, 1]".into(),
            ));
        }
        if !(self.look_ahead_ratio > 0.0 && self.look_ahead_ratio.is_finite()) {
            return Err(DiscretizeError::InvalidSettings(
                "look_ahead_ratio must be positive".into(),
            ));
        }
        if !(self.sharp_turn_threshold > 0.0) {
            return Err(DiscretizeError::InvalidSettings(
                "sharp_turn_threshold must be positive".into(),
            ));
        }
        if self.turn_search_steps == 0 {
            return Err(DiscretizeError::InvalidSettings(
                "turn_search_steps must be at least 1".into(),
            ));
        }
        if !(0.95..=0.99).contains(&self.clamp_ratio) {
            return Err(DiscretizeError::InvalidSettings(
                "clamp_ratio must be between 0.95 and 0.99".into(),
            ));
        }
        if !(self.nudge_ratio > 0.0 && self.nudge_ratio < 1.0) {
            return Err(DiscretizeError::InvalidSettings(
                "nudge_ratio must be in (0, 1)".into(),
            ));
        }
        if self.max_repair_iterations == 0 {
            return Err(DiscretizeError::InvalidSettings(
                "max_repair_iterations must be at least 1".into(),
            ));
        }
        if !(self.tolerance > 0.0 && self.tolerance < self.delta) {
            return Err(DiscretizeError::InvalidSettings(
                "tolerance must be positive and below delta".into(),
            ));
        }
        self.direction.validate()
    }

    /// Parse settings from TOML; missing keys keep their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let settings: Self =
            toml::from_str(text).map_err(|e| DiscretizeError::InvalidSettings(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Step size along a segment.
    pub fn step(&self) -> f64 {
        self.delta * self.step_ratio
    }

    /// Sharp-turn look-ahead distance.
    pub fn look_ahead(&self) -> f64 {
        self.delta * self.look_ahead_ratio
    }

    /// Offset in front of the previous disk used by repair.
    pub fn nudge(&self) -> f64 {
        self.delta * self.nudge_ratio
    }
}

/// Discretize a tunnel with the given settings.
///
/// This is the main entry point. It:
/// 1. Validates the settings
/// 2. Searches a seed direction at every sphere center
/// 3. Walks the centerline, placing and repairing disks
///
/// A walk that stops early still returns the valid chain built so far,
/// with the cause in [`Discretization::termination`].
pub fn discretize(tunnel: &Tunnel, settings: &DiscretizeSettings) -> Result<Discretization> {
    settings.validate()?;
    let field = DirectionField::compute(tunnel, settings)?;
    Ok(Advancer::new(tunnel, &field, settings)?.run())
}

/// [`discretize`], reusing seed directions from `store` where possible.
pub fn discretize_cached(
    tunnel: &Tunnel,
    settings: &DiscretizeSettings,
    store: &dyn DirectionStore,
) -> Result<Discretization> {
    settings.validate()?;
    let field = DirectionField::compute_cached(tunnel, settings, store)?;
    Ok(Advancer::new(tunnel, &field, settings)?.run())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tunnel_kernel_geom::{Disk, Sphere};
    use tunnel_kernel_math::{Point3, Vec3};

    fn row(xs: &[f64], r: f64) -> Tunnel {
        Tunnel::new(
            xs.iter()
                .map(|&x| Sphere::new(Point3::new(x, 0.0, 0.0), r))
                .collect(),
        )
        .unwrap()
    }

    fn settings(delta: f64) -> DiscretizeSettings {
        DiscretizeSettings {
            delta,
            ..Default::default()
        }
    }

    fn assert_chain_invariants(disks: &[Disk], settings: &DiscretizeSettings) {
        for pair in disks.windows(2) {
            let d = disk_dist(&pair[0], &pair[1]);
            assert!(d <= settings.delta * (1.0 + 1e-6), "spacing {d}");
            assert!(is_follower(&pair[0], &pair[1], settings.tolerance));
        }
        for disk in disks {
            assert!((disk.normal.norm() - 1.0).abs() < 1e-9);
            assert!(disk.radius >= 0.0);
        }
    }

    #[test]
    fn test_default_settings_validate() {
        DiscretizeSettings::default().validate().unwrap();
    }

    #[test]
    fn test_invalid_settings() {
        for bad in [
            DiscretizeSettings { delta: 0.0, ..Default::default() },
            DiscretizeSettings { delta: f64::NAN, ..Default::default() },
            DiscretizeSettings { clamp_ratio: 0.9, ..Default::default() },
            DiscretizeSettings { max_repair_iterations: 0, ..Default::default() },
            DiscretizeSettings { step_ratio: 1.5, ..Default::default() },
        ] {
            assert!(matches!(bad.validate(), Err(DiscretizeError::InvalidSettings(_))));
        }
    }

    #[test]
    fn test_settings_from_toml() {
        let settings = DiscretizeSettings::from_toml_str(
            r#"
            delta = 0.5
            shuffle_seed = 9

            [direction]
            blend = "cubic"
            window = 2.0
            "#,
        )
        .unwrap();
        assert!((settings.delta - 0.5).abs() < 1e-15);
        assert_eq!(settings.shuffle_seed, 9);
        assert_eq!(settings.direction.blend, DirectionBlend::Cubic);
        assert_eq!(settings.direction.window, Some(2.0));
        assert_eq!(settings.direction.rounds, 5);
        assert!((settings.clamp_ratio - 0.97).abs() < 1e-15);

        assert!(DiscretizeSettings::from_toml_str("delta = -1.0").is_err());
        assert!(DiscretizeSettings::from_toml_str("delta = \"wide\"").is_err());
    }

    #[test]
    fn test_straight_tunnel() {
        let tunnel = row(&[0.0, 2.5, 5.0], 2.0);
        let settings = settings(1.0);
        let result = discretize(&tunnel, &settings).unwrap();
        assert!(result.is_complete());
        let disks = &result.disks;
        assert!(disks.len() >= 5);

        let first = disks[0];
        approx::assert_relative_eq!(first.center, Point3::origin(), epsilon = 1e-9);
        assert!((first.normal.x - 1.0).abs() < 1e-9);
        assert!((first.radius - 2.0).abs() < 1e-9);

        let last = disks[disks.len() - 1];
        assert!(last.center.x >= 4.8 && last.center.x <= 5.0 + 1e-9);
        for pair in disks.windows(2) {
            assert!(pair[1].center.x > pair[0].center.x);
        }
        assert_chain_invariants(disks, &settings);
        assert!(disks.iter().all(|d| tunnel.is_enclosing_disk(d)));
    }

    #[test]
    fn test_straight_tunnel_normals_follow_axis() {
        let tunnel = row(&[0.0, 3.0, 6.0], 2.0);
        let settings = settings(1.0);
        let result = discretize(&tunnel, &settings).unwrap();
        assert!(result.is_complete());
        assert_eq!(result.stats.sharp_turns, 0);
        for disk in &result.disks {
            assert!(disk.normal.x > 1.0 - 1e-6);
            assert!(disk.center.y.abs() < 1e-6 && disk.center.z.abs() < 1e-6);
        }
        assert_chain_invariants(&result.disks, &settings);
        assert!(result.disks.iter().all(|d| tunnel.is_enclosing_disk(d)));
    }

    /// Largest radius among the spheres containing `point`.
    fn local_radius(tunnel: &Tunnel, point: &Point3) -> f64 {
        tunnel
            .spheres_containing(point)
            .iter()
            .map(|s| s.radius)
            .fold(0.0, f64::max)
    }

    #[test]
    fn test_right_angle_turn() {
        let tunnel = Tunnel::new(vec![
            Sphere::new(Point3::new(0.0, 0.0, 0.0), 1.5),
            Sphere::new(Point3::new(2.0, 0.0, 0.0), 1.5),
            Sphere::new(Point3::new(4.0, 0.0, 0.0), 1.5),
            Sphere::new(Point3::new(6.0, 0.0, 0.0), 3.0),
            Sphere::new(Point3::new(6.0, 2.0, 0.0), 1.5),
            Sphere::new(Point3::new(6.0, 4.0, 0.0), 1.5),
        ])
        .unwrap();
        let settings = settings(1.0);
        let result = discretize(&tunnel, &settings).unwrap();
        assert!(result.is_complete());
        assert!(result.stats.sharp_turns >= 1);
        assert_chain_invariants(&result.disks, &settings);

        // The walk reaches the end of the last segment.
        let last = result.disks[result.disks.len() - 1];
        let end = Point3::new(6.0, 4.0, 0.0);
        assert!(last.height_of(&end).abs() <= settings.delta);

        for disk in &result.disks {
            let local = local_radius(&tunnel, &disk.center);
            assert!(local > 0.0, "disk at {} left the tunnel", disk.center);
            assert!(disk.radius <= 1.5 * local, "radius {} near {local}", disk.radius);
            assert!(tunnel.is_enclosing_disk(disk));
        }

        // The detector stays quiet on the straight run and fires at the bend.
        let fitter = CrossSectionFitter::new(&tunnel, settings.shuffle_seed);
        let detector = SharpTurnDetector::new(&fitter, &settings);
        for disk in result.disks.iter().filter(|d| d.center.x < 2.5) {
            assert!(detector.detect(disk).is_none(), "turn at {}", disk.center);
        }
        assert!(result
            .disks
            .iter()
            .filter(|d| d.center.x >= 2.5 && d.center.y.abs() < 1.0)
            .any(|d| detector.detect(d).is_some()));
    }

    /// Five unit-spaced spheres along +x, then four more heading off at
    /// `degrees` from the last one.
    fn bend(degrees: f64, radius: f64) -> Tunnel {
        let heading = degrees.to_radians();
        let corner = Point3::new(4.0, 0.0, 0.0);
        let straight = (0..5).map(|i| Point3::new(f64::from(i), 0.0, 0.0));
        let turned = (1..5).map(|k| {
            let k = f64::from(k);
            corner + Vec3::new(heading.cos(), heading.sin(), 0.0) * k
        });
        Tunnel::new(
            straight
                .chain(turned)
                .map(|c| Sphere::new(c, radius))
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_tight_bend_completes() {
        let tunnel = bend(120.0, 0.9);
        let settings = settings(0.3);
        let result = discretize(&tunnel, &settings).unwrap();
        assert!(result.is_complete(), "{:?}", result.termination);
        assert!(result.stats.retries > 0);
        assert!(result.stats.pivots >= 1);
        assert_chain_invariants(&result.disks, &settings);
        assert!(result.disks.iter().all(|d| tunnel.is_enclosing_disk(d)));

        let last = result.disks[result.disks.len() - 1];
        let end = tunnel.spheres()[tunnel.len() - 1].center;
        assert!((last.center - end).norm() < 0.5, "ended at {}", last.center);
    }

    #[test]
    fn test_gap_aborts_with_partial_chain() {
        let tunnel = row(&[0.0, 5.0], 1.0);
        let settings = settings(0.3);
        let result = discretize(&tunnel, &settings).unwrap();
        assert!(!result.is_complete());
        assert!(matches!(
            result.termination,
            Termination::Aborted(DiscretizeError::GeometryDegenerate(_))
        ));
        assert!(result.disks.len() >= 2);
        assert_chain_invariants(&result.disks, &settings);
        let last = result.disks[result.disks.len() - 1];
        assert!(last.center.x <= 1.0 + 1e-6);
        assert!(result.disks.iter().all(|d| tunnel.is_enclosing_disk(d)));
    }

    #[test]
    fn test_advancer_rejects_invalid_settings() {
        let tunnel = row(&[0.0, 2.5, 5.0], 2.0);
        let field = DirectionField::compute(&tunnel, &DiscretizeSettings::default()).unwrap();
        let stalled = DiscretizeSettings {
            step_ratio: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            Advancer::new(&tunnel, &field, &stalled),
            Err(DiscretizeError::InvalidSettings(_))
        ));
        assert!(matches!(
            discretize(&tunnel, &stalled),
            Err(DiscretizeError::InvalidSettings(_))
        ));
    }

    #[test]
    fn test_cached_run_matches_fresh_run() {
        let tunnel = row(&[0.0, 2.5, 5.0], 2.0);
        let settings = settings(1.0);
        let store = MemoryStore::new();
        let fresh = discretize_cached(&tunnel, &settings, &store).unwrap();
        assert_eq!(store.len(), 1);
        let cached = discretize_cached(&tunnel, &settings, &store).unwrap();
        assert_eq!(fresh.disks, cached.disks);
        assert_eq!(fresh.stats, cached.stats);
    }
}
