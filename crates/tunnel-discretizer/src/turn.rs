//! Sharp-turn detection.
//!
//! Ahead of a bend the cross-section swings away from the current disk
//! much faster on the outside of the bend than on the inside. The detector
//! fits a look-ahead disk and searches for the projection plane in which
//! the two diameter sides separate most unevenly.

use std::f64::consts::PI;

use log::debug;
use tunnel_kernel_geom::Disk;
use tunnel_kernel_math::{orthogonal_complement, Dir3};

use crate::fit::CrossSectionFitter;
use crate::repair::{Pairing, PairedEndpoints};
use crate::DiscretizeSettings;

/// A detected sharp turn ahead of a disk.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SharpTurn {
    /// Disk fitted ahead of the current one, in its plane direction.
    pub look_ahead: Disk,
    /// Normal of the projection plane showing the largest separation.
    pub plane_normal: Dir3,
    /// Paired endpoint distances in that plane.
    pub separations: [f64; 2],
    /// `|d1 - d2| / mean(d1, d2)`.
    pub asymmetry: f64,
}

/// Relative imbalance of two separations; zero when both vanish.
pub fn asymmetry(d1: f64, d2: f64) -> f64 {
    let mean = 0.5 * (d1 + d2);
    if mean <= f64::EPSILON {
        0.0
    } else {
        (d1 - d2).abs() / mean
    }
}

/// Looks ahead of a disk for a sharp bend.
#[derive(Debug, Clone, Copy)]
pub struct SharpTurnDetector<'f, 'a> {
    fitter: &'f CrossSectionFitter<'a>,
    distance: f64,
    threshold: f64,
    steps: usize,
}

impl<'f, 'a> SharpTurnDetector<'f, 'a> {
    /// Detector with look-ahead distance and threshold from `settings`.
    pub fn new(fitter: &'f CrossSectionFitter<'a>, settings: &DiscretizeSettings) -> Self {
        Self {
            fitter,
            distance: settings.look_ahead(),
            threshold: settings.sharp_turn_threshold,
            steps: settings.turn_search_steps.max(1),
        }
    }

    /// The sharp turn ahead of `prev`, if any.
    ///
    /// A look-ahead position outside the tunnel means there is nothing to
    /// turn into, and is reported as no turn.
    pub fn detect(&self, prev: &Disk) -> Option<SharpTurn> {
        let point = prev.center + prev.normal.as_ref() * self.distance;
        let look_ahead = match self.fitter.fit(prev.normal.as_ref(), &point) {
            Ok(disk) => disk,
            Err(e) => {
                debug!("no look-ahead disk: {e}");
                return None;
            }
        };
        let turn = self.measure(prev, look_ahead);
        (turn.asymmetry > self.threshold).then_some(turn)
    }

    /// Find the projection plane, among those containing `prev`'s normal,
    /// with the largest endpoint separation between `prev` and `ahead`.
    pub fn measure(&self, prev: &Disk, ahead: Disk) -> SharpTurn {
        let (u, v) = orthogonal_complement(&prev.normal);
        let mut best: Option<(Dir3, PairedEndpoints, f64)> = None;

        for k in 0..self.steps {
            let alpha = PI * k as f64 / self.steps as f64;
            let (s, c) = alpha.sin_cos();
            let m = Dir3::new_normalize(u.into_inner() * c + v.into_inner() * s);
            let ends = PairedEndpoints::compute(prev, &ahead, Some(&m), Pairing::Nearest);
            let spacing = ends.spacing();
            if best.as_ref().map_or(true, |(_, _, top)| spacing > *top) {
                best = Some((m, ends, spacing));
            }
        }

        let (plane_normal, ends) = match best {
            Some((m, ends, _)) => (m, ends),
            None => (u, PairedEndpoints::compute(prev, &ahead, Some(&u), Pairing::Nearest)),
        };
        let separations = ends.separations();
        SharpTurn {
            look_ahead: ahead,
            plane_normal,
            separations,
            asymmetry: asymmetry(separations[0], separations[1]),
        }
    }
}
