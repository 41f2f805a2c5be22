//! The advancing front that builds the disk chain.
//!
//! Disks are placed segment by segment along the centerline. Each step
//! starts just beyond the plane of the last disk, tries the sharp-turn
//! path first and otherwise fits a disk along the blended direction field,
//! then repairs the candidate against the last disk until it follows it
//! within the spacing bound. A step that keeps failing is retried with a
//! coarser stride, and finally by tilting the last disk towards the
//! direction ahead.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tunnel_kernel_geom::Disk;
use tunnel_kernel_math::{try_direction, Point3, Rotation};

use crate::centerline::Centerline;
use crate::direction::DirectionField;
use crate::error::{DiscretizeError, Result};
use crate::fit::CrossSectionFitter;
use crate::repair::{disk_dist, is_follower, ContinuityRepair, Pairing, Repaired};
use crate::tunnel::Tunnel;
use crate::turn::SharpTurnDetector;
use crate::DiscretizeSettings;

/// Minimum progress per step along a segment, relative to the step size.
const MIN_PROGRESS: f64 = 0.1;

/// Smallest cosine between the segment and the last disk normal for which
/// the disk plane measures progress along the segment.
const MIN_ALIGNMENT: f64 = 0.5;

/// What to do with an accepted disk.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChainUpdate {
    /// Push it onto the chain.
    Append(Disk),
    /// Overwrite the last disk, which the new one makes redundant.
    Replace(Disk),
}

impl ChainUpdate {
    /// Apply the update.
    pub fn apply(self, chain: &mut Vec<Disk>) {
        match self {
            Self::Append(disk) => chain.push(disk),
            Self::Replace(disk) => {
                if let Some(last) = chain.last_mut() {
                    *last = disk;
                } else {
                    chain.push(disk);
                }
            }
        }
    }
}

/// Decide whether `disk` extends `chain` or replaces its last disk.
///
/// The last disk is redundant when `disk` already follows the one before
/// it within `delta`.
pub fn decide_update(chain: &[Disk], disk: Disk, delta: f64, tol: f64) -> ChainUpdate {
    if let [.., before, _] = chain {
        if disk_dist(before, &disk) <= delta && is_follower(before, &disk, tol) {
            return ChainUpdate::Replace(disk);
        }
    }
    ChainUpdate::Append(disk)
}

/// Counters collected while advancing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvanceStats {
    /// Disks pushed onto the chain.
    pub appended: usize,
    /// Disks that replaced the previous last disk.
    pub replaced: usize,
    /// Steps where a sharp turn was detected.
    pub sharp_turns: usize,
    /// Total repair rebuilds.
    pub repair_iterations: usize,
    /// Steps retried with a coarser stride.
    pub retries: usize,
    /// Disks obtained by pivoting the last disk after the retries ran out.
    pub pivots: usize,
}

/// How the construction ended.
#[derive(Debug)]
pub enum Termination {
    /// Every segment was walked.
    Completed,
    /// Stopped early; the chain built so far is still valid.
    Aborted(DiscretizeError),
}

/// The disk chain and how it was obtained.
#[derive(Debug)]
pub struct Discretization {
    /// Disks in path order.
    pub disks: Vec<Disk>,
    /// Construction counters.
    pub stats: AdvanceStats,
    /// Completion status.
    pub termination: Termination,
}

impl Discretization {
    /// Whether every segment was walked.
    pub fn is_complete(&self) -> bool {
        matches!(self.termination, Termination::Completed)
    }
}

/// Builds the disk chain for one tunnel.
pub struct Advancer<'a> {
    tunnel: &'a Tunnel,
    field: &'a DirectionField,
    settings: &'a DiscretizeSettings,
}

/// Per-run collaborators, borrowed for the whole walk.
struct Walk<'s, 'a> {
    centerline: &'s Centerline,
    fitter: &'s CrossSectionFitter<'a>,
    repair: ContinuityRepair<'s, 'a>,
    detector: SharpTurnDetector<'s, 'a>,
}

impl<'a> Advancer<'a> {
    /// Advancer over `tunnel` guided by `field`.
    ///
    /// Fails with [`DiscretizeError::InvalidSettings`] if `settings` do not
    /// validate.
    pub fn new(
        tunnel: &'a Tunnel,
        field: &'a DirectionField,
        settings: &'a DiscretizeSettings,
    ) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            tunnel,
            field,
            settings,
        })
    }

    /// Walk the whole centerline.
    ///
    /// Never fails: an unrecoverable error ends the walk and is reported
    /// in [`Discretization::termination`] alongside the disks built so far.
    pub fn run(&self) -> Discretization {
        let centerline = self.tunnel.centerline();
        let fitter = CrossSectionFitter::new(self.tunnel, self.settings.shuffle_seed);
        let walk = Walk {
            centerline: &centerline,
            fitter: &fitter,
            repair: ContinuityRepair::new(&fitter, self.settings),
            detector: SharpTurnDetector::new(&fitter, self.settings),
        };

        let mut chain = Vec::new();
        let mut stats = AdvanceStats::default();
        let termination = match self.walk(&walk, &mut chain, &mut stats) {
            Ok(()) => {
                info!(
                    "discretized {} segments into {} disks ({} replaced, {} sharp turns)",
                    centerline.segment_count(),
                    chain.len(),
                    stats.replaced,
                    stats.sharp_turns
                );
                Termination::Completed
            }
            Err(e) => {
                warn!("discretization stopped after {} disks: {e}", chain.len());
                Termination::Aborted(e)
            }
        };
        Discretization {
            disks: chain,
            stats,
            termination,
        }
    }

    fn walk(
        &self,
        walk: &Walk<'_, '_>,
        chain: &mut Vec<Disk>,
        stats: &mut AdvanceStats,
    ) -> Result<()> {
        let start = walk.centerline.points()[0];
        let first = walk.fitter.fit(self.field.direction_at(0.0).as_ref(), &start)?;
        chain.push(first);
        stats.appended += 1;

        for i in 0..walk.centerline.segment_count() {
            self.walk_segment(walk, i, chain, stats)?;
        }
        Ok(())
    }

    fn walk_segment(
        &self,
        walk: &Walk<'_, '_>,
        i: usize,
        chain: &mut Vec<Disk>,
        stats: &mut AdvanceStats,
    ) -> Result<()> {
        let segment = walk.centerline.segment(i);
        let line = segment.line()?;
        let length = segment.length();
        let offset = walk.centerline.offset(i);
        let eps = self.settings.step();

        let mut size: f64 = 0.0;
        let mut retries = 0u32;
        loop {
            let Some(&last) = chain.last() else {
                return Err(DiscretizeError::GeometryDegenerate("empty disk chain".into()));
            };
            // A disk facing away from the segment crosses it far ahead of
            // its center, so fall back to the projected center.
            let measured = if line.direction.dot(last.normal.as_ref()) >= MIN_ALIGNMENT {
                line.intersect_plane(&last.plane())
                    .filter(|t| t.is_finite())
                    .unwrap_or(size)
            } else {
                line.parameter_of(&last.center)
            };
            size = (measured + eps).max(size + eps * MIN_PROGRESS);
            if retries > 0 {
                size += eps * f64::from(1u32 << retries.min(30));
            }
            if size > length {
                return Ok(());
            }

            let point = line.point_at(size);
            let t = offset + size;
            let outcome = match self.step(walk, &last, point, t, stats) {
                Err(e) if e.is_recoverable() && retries < self.settings.max_step_retries => {
                    retries += 1;
                    stats.retries += 1;
                    debug!("segment {i} at {size:.4}: {e}; retrying with a coarser step");
                    continue;
                }
                Err(e) if e.is_recoverable() => {
                    debug!("segment {i} at {size:.4}: {e}; pivoting the last disk");
                    let pivoted = self.pivot(walk, &last, t, e);
                    if pivoted.is_ok() {
                        stats.pivots += 1;
                    }
                    pivoted
                }
                other => other,
            };
            match outcome {
                Ok(repaired) => {
                    retries = 0;
                    stats.repair_iterations += repaired.iterations;
                    let update = decide_update(
                        chain,
                        repaired.disk,
                        self.settings.delta,
                        self.settings.tolerance,
                    );
                    match update {
                        ChainUpdate::Append(_) => stats.appended += 1,
                        ChainUpdate::Replace(_) => stats.replaced += 1,
                    }
                    debug!(
                        "segment {i} at {size:.4}: {update:?} after {} repairs",
                        repaired.iterations
                    );
                    update.apply(chain);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Tilt `prev` about its inner rim point towards the direction ahead.
    ///
    /// The tilt is capped so the outer rim moves at most the clamp distance,
    /// and halved after every failed repair. `err` is returned if no tilt
    /// axis exists.
    fn pivot(
        &self,
        walk: &Walk<'_, '_>,
        prev: &Disk,
        t: f64,
        err: DiscretizeError,
    ) -> Result<Repaired> {
        let target = self.field.direction_at(t + self.settings.look_ahead());
        let Some(axis) = try_direction(&prev.normal.cross(target.as_ref())) else {
            return Err(err);
        };
        let hinge = prev.center + axis.cross(prev.normal.as_ref()) * prev.radius;
        let full = prev.normal.dot(target.as_ref()).clamp(-1.0, 1.0).acos();
        let clamp = self.settings.delta * self.settings.clamp_ratio;
        // The outer rim sits one diameter away from the hinge.
        let cap = 2.0 * (clamp / (4.0 * prev.radius)).min(1.0).asin();
        let angle = full.min(cap);

        let mut last_err = err;
        for k in 0..=self.settings.max_step_retries {
            let rotation = Rotation::about_axis(&axis, angle / f64::from(1u32 << k.min(30)));
            let proposal = Disk::new(
                hinge + rotation.apply(&(prev.center - hinge)),
                rotation.apply(prev.normal.as_ref()),
                prev.radius,
            )?;
            let refit = walk.fitter.refit(&proposal)?;
            match walk.repair.repair(prev, refit, Pairing::Nearest, None) {
                Ok(repaired) => return Ok(repaired),
                Err(e) if e.is_recoverable() => last_err = e,
                Err(e) => return Err(e),
            }
        }
        Err(last_err)
    }

    /// One accepted disk after `prev`.
    fn step(
        &self,
        walk: &Walk<'_, '_>,
        prev: &Disk,
        point: Point3,
        t: f64,
        stats: &mut AdvanceStats,
    ) -> Result<Repaired> {
        if let Some(turn) = walk.detector.detect(prev) {
            stats.sharp_turns += 1;
            debug!("sharp turn at t = {t:.4} (asymmetry {:.3})", turn.asymmetry);
            match walk.repair.repair(
                prev,
                turn.look_ahead,
                Pairing::RadiusTrend,
                Some(&turn.plane_normal),
            ) {
                Ok(repaired) => return Ok(repaired),
                Err(e) if e.is_recoverable() => {
                    debug!("sharp-turn repair failed ({e}); using the direction field");
                }
                Err(e) => return Err(e),
            }
        }

        let direction = self.field.direction_at(t);
        let candidate = walk.fitter.fit(direction.as_ref(), &point)?;
        walk.repair.repair(prev, candidate, Pairing::Nearest, None)
    }
}
