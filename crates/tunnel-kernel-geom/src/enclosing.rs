//! Minimal enclosing circle of a set of circles.
//!
//! Randomized incremental construction in the style of Welzl's algorithm:
//! circles are inserted in a seeded random order, and whenever an inserted
//! circle sticks out of the current solution the solution is rebuilt with
//! that circle forced onto the boundary. Sub-problems of at most three
//! circles are solved exactly, so every intermediate circle is the true
//! minimum of its support set. The incremental pass is then verified; if
//! verification fails (the boundary lemma behind the point version does not
//! hold for every circle configuration) a bounded support-set improvement
//! loop runs, and an exhaustive search is the last resort.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tunnel_kernel_math::{Point2, Vec2};

use crate::{Circle2d, GeomError, Result};

/// Relative tolerance for enclosure checks inside the solver.
const RELATIVE_EPS: f64 = 1e-10;

/// Smallest circle enclosing every circle in `circles`.
///
/// For every input `c`, the result `e` satisfies
/// `|e.center - c.center| + c.radius <= e.radius` up to rounding. The input
/// order is shuffled with `seed`, so the same seed always gives the same
/// result.
pub fn min_enclosing_circle(circles: &[Circle2d], seed: u64) -> Result<Circle2d> {
    if circles.is_empty() {
        return Err(GeomError::Degenerate(
            "cannot enclose an empty set of circles".into(),
        ));
    }
    if circles
        .iter()
        .any(|c| !(c.center.x.is_finite() && c.center.y.is_finite() && c.radius >= 0.0))
    {
        return Err(GeomError::Degenerate(
            "circle with non-finite center or negative radius".into(),
        ));
    }

    let tol = tolerance_for(circles);
    let mut order = circles.to_vec();
    order.shuffle(&mut StdRng::seed_from_u64(seed));

    let candidate = incremental(&order, tol);
    if order.iter().all(|c| candidate.encloses(c, tol)) {
        return Ok(candidate);
    }
    Ok(improve_support(&order, candidate, tol))
}

fn tolerance_for(circles: &[Circle2d]) -> f64 {
    let extent = circles
        .iter()
        .map(|c| c.center.coords.abs().max() + c.radius)
        .fold(1.0, f64::max);
    RELATIVE_EPS * extent
}

fn incremental(order: &[Circle2d], tol: f64) -> Circle2d {
    let mut enclosing = order[0];
    for i in 1..order.len() {
        if !enclosing.encloses(&order[i], tol) {
            enclosing = with_one(&order[..i], order[i], tol);
        }
    }
    enclosing
}

fn with_one(prefix: &[Circle2d], p: Circle2d, tol: f64) -> Circle2d {
    let mut enclosing = p;
    for j in 0..prefix.len() {
        if !enclosing.encloses(&prefix[j], tol) {
            enclosing = with_two(&prefix[..j], p, prefix[j], tol);
        }
    }
    enclosing
}

fn with_two(prefix: &[Circle2d], p: Circle2d, q: Circle2d, tol: f64) -> Circle2d {
    let mut enclosing = exhaustive(&[p, q], tol);
    for r in prefix {
        if !enclosing.encloses(r, tol) {
            enclosing = exhaustive(&[p, q, *r], tol);
        }
    }
    enclosing
}

/// Grow a support set until nothing sticks out.
///
/// Each round adds one violating circle and keeps only the circles touching
/// the new optimum; the radius strictly increases, so the loop cannot cycle.
fn improve_support(order: &[Circle2d], start: Circle2d, tol: f64) -> Circle2d {
    let mut support = touching(order, &start, tol);
    let deadline = 8 * order.len() + 32;
    for _ in 0..deadline {
        let current = exhaustive(&support, tol);
        let Some(violator) = order.iter().find(|c| !current.encloses(c, tol)) else {
            return current;
        };
        support.push(*violator);
        let grown = exhaustive(&support, tol);
        support = touching(&support, &grown, tol);
        if !support.contains(violator) {
            support.push(*violator);
        }
    }
    exhaustive(order, tol)
}

/// Up to three circles internally tangent to `enclosing`, tightest first.
fn touching(circles: &[Circle2d], enclosing: &Circle2d, tol: f64) -> Vec<Circle2d> {
    let mut slack: Vec<(f64, Circle2d)> = circles
        .iter()
        .map(|c| {
            let gap = enclosing.radius - (c.center - enclosing.center).norm() - c.radius;
            (gap, *c)
        })
        .filter(|(gap, _)| *gap <= tol.max(1e-6 * enclosing.radius))
        .collect();
    slack.sort_by(|a, b| a.0.total_cmp(&b.0));
    slack.into_iter().take(3).map(|(_, c)| c).collect()
}

/// Exact minimum over all 1-, 2- and 3-circle support sets.
///
/// Quartic in the number of circles; used directly only for tiny sets.
fn exhaustive(circles: &[Circle2d], tol: f64) -> Circle2d {
    let mut best: Option<Circle2d> = None;
    let n = circles.len();
    for i in 0..n {
        keep_if_smaller(&mut best, circles[i], circles, tol);
        for j in (i + 1)..n {
            keep_if_smaller(&mut best, pair_circle(&circles[i], &circles[j]), circles, tol);
            for k in (j + 1)..n {
                for candidate in triple_circles(&circles[i], &circles[j], &circles[k]) {
                    keep_if_smaller(&mut best, candidate, circles, tol);
                }
            }
        }
    }
    best.unwrap_or_else(|| bounding_circle(circles))
}

fn keep_if_smaller(best: &mut Option<Circle2d>, candidate: Circle2d, all: &[Circle2d], tol: f64) {
    if !candidate.radius.is_finite() {
        return;
    }
    if best.is_some_and(|b| b.radius <= candidate.radius) {
        return;
    }
    if all.iter().all(|c| candidate.encloses(c, tol)) {
        *best = Some(candidate);
    }
}

/// Centroid-based circle enclosing everything; never minimal in general.
fn bounding_circle(circles: &[Circle2d]) -> Circle2d {
    let sum: Vec2 = circles.iter().map(|c| c.center.coords).sum();
    let center = Point2::from(sum / circles.len().max(1) as f64);
    let radius = circles
        .iter()
        .map(|c| (c.center - center).norm() + c.radius)
        .fold(0.0, f64::max);
    Circle2d::new(center, radius)
}

/// Smallest circle enclosing two circles.
fn pair_circle(a: &Circle2d, b: &Circle2d) -> Circle2d {
    let offset = b.center - a.center;
    let d = offset.norm();
    if d + b.radius <= a.radius {
        return *a;
    }
    if d + a.radius <= b.radius {
        return *b;
    }
    let radius = (d + a.radius + b.radius) * 0.5;
    Circle2d::new(a.center + offset * ((radius - a.radius) / d), radius)
}

/// Circles internally tangent to all three inputs (Apollonius problem).
///
/// Subtracting the tangency equations pairwise leaves a linear system for the
/// center as a function of the radius; substituting back gives a quadratic
/// in the radius. Collinear centers return nothing: the optimum is then
/// always supported by two of the circles.
fn triple_circles(a: &Circle2d, b: &Circle2d, c: &Circle2d) -> Vec<Circle2d> {
    let (x1, y1, r1) = (a.center.x, a.center.y, a.radius);
    let (x2, y2, r2) = (b.center.x, b.center.y, b.radius);
    let (x3, y3, r3) = (c.center.x, c.center.y, c.radius);

    let a11 = 2.0 * (x2 - x1);
    let a12 = 2.0 * (y2 - y1);
    let a21 = 2.0 * (x3 - x1);
    let a22 = 2.0 * (y3 - y1);
    let det = a11 * a22 - a12 * a21;
    let scale = (a11.abs() + a12.abs()) * (a21.abs() + a22.abs());
    if det.abs() <= 1e-12 * scale || scale == 0.0 {
        return Vec::new();
    }

    let power = |x: f64, y: f64, r: f64| x * x + y * y - r * r;
    let k2 = power(x2, y2, r2) - power(x1, y1, r1);
    let k3 = power(x3, y3, r3) - power(x1, y1, r1);
    let c2 = 2.0 * (r2 - r1);
    let c3 = 2.0 * (r3 - r1);

    // center = (x0 + xr * R, y0 + yr * R)
    let x0 = (a22 * k2 - a12 * k3) / det;
    let xr = (a22 * c2 - a12 * c3) / det;
    let y0 = (a11 * k3 - a21 * k2) / det;
    let yr = (a11 * c3 - a21 * c2) / det;

    let dx = x0 - x1;
    let dy = y0 - y1;
    let qa = xr * xr + yr * yr - 1.0;
    let qb = 2.0 * (dx * xr + dy * yr + r1);
    let qc = dx * dx + dy * dy - r1 * r1;

    let mut radii = Vec::with_capacity(2);
    if qa.abs() < 1e-12 {
        if qb.abs() > 1e-12 {
            radii.push(-qc / qb);
        }
    } else {
        let disc = qb * qb - 4.0 * qa * qc;
        if disc >= 0.0 {
            let root = disc.sqrt();
            radii.push((-qb - root) / (2.0 * qa));
            radii.push((-qb + root) / (2.0 * qa));
        }
    }

    let floor = r1.max(r2).max(r3);
    radii
        .into_iter()
        .filter(|r| r.is_finite() && *r >= floor)
        .map(|r| Circle2d::new(Point2::new(x0 + xr * r, y0 + yr * r), r))
        .collect()
}
