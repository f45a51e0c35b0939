//! Geometry primitives: points, edges, polylines and the planar predicates
//! used by routing and validation.

mod edge;
mod point3;
pub mod polyline;

pub use edge::Edge;
pub use point3::{CoordKey, Point3};

use rstar::AABB;

/// Planar distance below which two positions are treated as touching.
pub const TOLERANCE: f64 = 1e-7;

pub(crate) fn subtract(a: Point3, b: Point3) -> Point3 {
    Point3::new(a.x - b.x, a.y - b.y, a.z - b.z)
}

pub(crate) fn cross(a: Point3, b: Point3) -> Point3 {
    Point3 {
        x: a.y * b.z - a.z * b.y,
        y: a.z * b.x - a.x * b.z,
        z: a.x * b.y - a.y * b.x,
    }
}

pub(crate) fn dot(a: Point3, b: Point3) -> f64 {
    a.x * b.x + a.y * b.y + a.z * b.z
}

pub(crate) fn norm(a: Point3) -> f64 {
    dot(a, a).sqrt()
}

/// Normalises an angle in degrees to `[0, 360)`.
pub fn normalize_degrees(deg: f64) -> f64 {
    let r = deg.rem_euclid(360.0);
    if r >= 360.0 {
        0.0
    } else {
        r
    }
}

/// Compass bearing (0 = north, clockwise) of a planar direction.
pub fn compass_bearing(dx: f64, dy: f64) -> f64 {
    normalize_degrees(dx.atan2(dy).to_degrees())
}

/// Twice the signed area of the planar triangle `a b c`. Positive when the
/// points turn counter-clockwise.
pub fn orientation(a: &Point3, b: &Point3, c: &Point3) -> f64 {
    (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
}

/// Planar distance from `p` to the segment `a b`.
pub fn distance_to_segment(p: &Point3, a: &Point3, b: &Point3) -> f64 {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let len2 = dx * dx + dy * dy;
    if len2 == 0.0 {
        return p.distance_2d(a);
    }
    let t = (((p.x - a.x) * dx + (p.y - a.y) * dy) / len2).clamp(0.0, 1.0);
    (p.x - (a.x + t * dx)).hypot(p.y - (a.y + t * dy))
}

/// Returns `true` if `p` lies on the segment `a b` (endpoints included).
pub fn point_on_segment(p: &Point3, a: &Point3, b: &Point3) -> bool {
    distance_to_segment(p, a, b) <= TOLERANCE
}

/// How two planar segments meet.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SegmentIntersection {
    Disjoint,
    /// The segments share exactly one point. Points within tolerance of an
    /// input endpoint are snapped to that endpoint.
    Point(Point3),
    /// The segments are collinear and share a stretch of positive length.
    Overlap,
}

/// Classifies the intersection of segments `a b` and `c d`.
pub fn segment_intersection(a: &Point3, b: &Point3, c: &Point3, d: &Point3) -> SegmentIntersection {
    if a.same_xy(b) {
        return if point_on_segment(a, c, d) {
            SegmentIntersection::Point(*a)
        } else {
            SegmentIntersection::Disjoint
        };
    }
    if c.same_xy(d) {
        return if point_on_segment(c, a, b) {
            SegmentIntersection::Point(*c)
        } else {
            SegmentIntersection::Disjoint
        };
    }

    let len_ab = a.distance_2d(b);
    let c_off = orientation(a, b, c) / len_ab;
    let d_off = orientation(a, b, d) / len_ab;
    if c_off.abs() <= TOLERANCE && d_off.abs() <= TOLERANCE {
        return collinear_intersection(a, b, c, d);
    }

    let r = (b.x - a.x, b.y - a.y);
    let s = (d.x - c.x, d.y - c.y);
    let denom = r.0 * s.1 - r.1 * s.0;
    if denom == 0.0 {
        return SegmentIntersection::Disjoint;
    }
    let qp = (c.x - a.x, c.y - a.y);
    let t = (qp.0 * s.1 - qp.1 * s.0) / denom;
    let u = (qp.0 * r.1 - qp.1 * r.0) / denom;
    let t_tol = TOLERANCE / len_ab;
    let u_tol = TOLERANCE / c.distance_2d(d);
    if t < -t_tol || t > 1.0 + t_tol || u < -u_tol || u > 1.0 + u_tol {
        return SegmentIntersection::Disjoint;
    }
    let hit = Point3::new(a.x + t * r.0, a.y + t * r.1, f64::NAN);
    SegmentIntersection::Point(snap_to_endpoint(hit, [a, b, c, d]))
}

fn collinear_intersection(a: &Point3, b: &Point3, c: &Point3, d: &Point3) -> SegmentIntersection {
    let len = a.distance_2d(b);
    let (ux, uy) = ((b.x - a.x) / len, (b.y - a.y) / len);
    let project = |p: &Point3| (p.x - a.x) * ux + (p.y - a.y) * uy;
    let (tc, td) = (project(c), project(d));
    let lo = tc.min(td).max(0.0);
    let hi = tc.max(td).min(len);
    if hi - lo > TOLERANCE {
        SegmentIntersection::Overlap
    } else if hi - lo >= -TOLERANCE {
        let hit = Point3::new(a.x + lo * ux, a.y + lo * uy, f64::NAN);
        SegmentIntersection::Point(snap_to_endpoint(hit, [a, b, c, d]))
    } else {
        SegmentIntersection::Disjoint
    }
}

fn snap_to_endpoint(p: Point3, ends: [&Point3; 4]) -> Point3 {
    ends.into_iter()
        .find(|e| e.distance_2d(&p) <= TOLERANCE)
        .copied()
        .unwrap_or(p)
}

/// Envelope of a segment grown by `pad` on every side.
pub(crate) fn segment_envelope(a: &Point3, b: &Point3, pad: f64) -> AABB<[f64; 2]> {
    AABB::from_corners(
        [a.x.min(b.x) - pad, a.y.min(b.y) - pad],
        [a.x.max(b.x) + pad, a.y.max(b.y) + pad],
    )
}
