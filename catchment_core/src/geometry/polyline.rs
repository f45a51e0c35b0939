//! Helpers over polylines represented as slices of [`Point3`].

use super::{distance_to_segment, segment_intersection, Point3, SegmentIntersection};

/// Consecutive vertex pairs of a polyline.
pub fn segments(route: &[Point3]) -> impl Iterator<Item = (&Point3, &Point3)> {
    route.windows(2).map(|w| (&w[0], &w[1]))
}

/// Planar length of a polyline.
pub fn length(route: &[Point3]) -> f64 {
    segments(route).map(|(a, b)| a.distance_2d(b)).sum()
}

/// Index of the first vertex sharing the planar position of `p`.
pub fn index_of(route: &[Point3], p: &Point3) -> Option<usize> {
    route.iter().position(|c| c.same_xy(p))
}

pub fn contains(route: &[Point3], p: &Point3) -> bool {
    index_of(route, p).is_some()
}

/// Returns `true` if `p` is the first or last vertex of the polyline.
pub fn is_endpoint(route: &[Point3], p: &Point3) -> bool {
    matches!(route.first(), Some(f) if f.same_xy(p)) || matches!(route.last(), Some(l) if l.same_xy(p))
}

/// Drops vertices that repeat the previous vertex's position.
pub fn dedup_consecutive(mut route: Vec<Point3>) -> Vec<Point3> {
    route.dedup_by(|b, a| a.same_xy(b));
    route
}

/// Planar vertex-by-vertex equality.
pub fn same_route(a: &[Point3], b: &[Point3]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(p, q)| p.same_xy(q))
}

/// Planar distance from `p` to the nearest point of the polyline.
pub fn distance_to(route: &[Point3], p: &Point3) -> f64 {
    match route {
        [] => f64::INFINITY,
        [only] => only.distance_2d(p),
        _ => segments(route)
            .map(|(a, b)| distance_to_segment(p, a, b))
            .fold(f64::INFINITY, f64::min),
    }
}

/// Returns `true` if the polyline never revisits a position and no two of
/// its segments touch other than consecutive segments at their shared vertex.
pub fn is_simple(route: &[Point3]) -> bool {
    for (i, p) in route.iter().enumerate() {
        if route[i + 1..].iter().any(|q| q.same_xy(p)) {
            return false;
        }
    }
    let segs: Vec<_> = segments(route).collect();
    for i in 0..segs.len() {
        for j in i + 1..segs.len() {
            let (a, b) = segs[i];
            let (c, d) = segs[j];
            match segment_intersection(a, b, c, d) {
                SegmentIntersection::Disjoint => {}
                SegmentIntersection::Overlap => return false,
                SegmentIntersection::Point(hit) => {
                    if j != i + 1 || !hit.same_xy(b) {
                        return false;
                    }
                }
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(coords: &[(f64, f64)]) -> Vec<Point3> {
        coords.iter().map(|&(x, y)| Point3::new(x, y, 0.0)).collect()
    }

    #[test]
    fn length_and_lookup() {
        let r = route(&[(0.0, 0.0), (3.0, 4.0), (3.0, 6.0)]);
        assert!((length(&r) - 7.0).abs() < 1e-12);
        assert_eq!(index_of(&r, &Point3::new(3.0, 4.0, 99.0)), Some(1));
        assert!(is_endpoint(&r, &Point3::new(3.0, 6.0, 0.0)));
        assert!(!is_endpoint(&r, &Point3::new(3.0, 4.0, 0.0)));
    }

    #[test]
    fn consecutive_duplicates_are_removed() {
        let r = route(&[(0.0, 0.0), (1.0, 0.0), (1.0, 0.0), (2.0, 0.0), (1.0, 0.0)]);
        assert_eq!(dedup_consecutive(r).len(), 4);
    }

    #[test]
    fn simplicity() {
        assert!(is_simple(&route(&[(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)])));
        // figure eight
        assert!(!is_simple(&route(&[(0.0, 0.0), (2.0, 2.0), (2.0, 0.0), (0.0, 2.0)])));
        // revisits a vertex
        assert!(!is_simple(&route(&[(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (1.0, 0.0)])));
        // doubles back along itself
        assert!(!is_simple(&route(&[(0.0, 0.0), (2.0, 0.0), (1.0, 0.0)])));
    }

    #[test]
    fn distance_to_polyline() {
        let r = route(&[(0.0, 0.0), (4.0, 0.0)]);
        assert!((distance_to(&r, &Point3::new(2.0, 3.0, 0.0)) - 3.0).abs() < 1e-12);
        assert!((distance_to(&r, &Point3::new(7.0, 4.0, 0.0)) - 5.0).abs() < 1e-12);
    }
}
