//! Hard validity rules for boundary routes.
//!
//! A route is valid with respect to water when none of its segments runs
//! along a water segment and none of its vertices other than confluences
//! lies on water. It is valid with respect to the other catchment lines when
//! every point it shares with them is an endpoint of both.

use std::rc::Rc;

use log::trace;

use crate::dataset::{CatchmentLines, Section};
use crate::geometry::{polyline, segment_intersection, Point3, SegmentIntersection};
use crate::water::WaterNetwork;

pub struct ValidityChecker {
    water: Rc<WaterNetwork>,
}

impl ValidityChecker {
    pub fn new(water: Rc<WaterNetwork>) -> Self {
        Self { water }
    }

    pub fn water(&self) -> &Rc<WaterNetwork> {
        &self.water
    }

    pub fn route_valid_wrt_water(&self, route: &[Point3]) -> bool {
        if let Some((a, b)) = polyline::segments(route).find(|(a, b)| self.water.overlaps_segment(a, b)) {
            trace!("segment ({}, {})-({}, {}) runs along water", a.x, a.y, b.x, b.y);
            return false;
        }
        if let Some(p) = route
            .iter()
            .find(|p| self.water.is_on_water(p) && !self.water.is_confluence(p))
        {
            trace!("vertex ({}, {}) touches water", p.x, p.y);
            return false;
        }
        true
    }

    pub fn sections_valid_wrt_water(&self, sections: &[Section]) -> bool {
        sections.iter().all(|s| self.route_valid_wrt_water(&s.coords))
    }

    /// Checks `route` against the latest sections in `lines`, skipping the
    /// sections whose id is in `ignore_ids`.
    pub fn route_valid_wrt_catchments(&self, route: &[Point3], lines: &CatchmentLines, ignore_ids: &[&str]) -> bool {
        for (a, b) in polyline::segments(route) {
            for (other, c, d) in lines.segments_near(a, b) {
                if ignore_ids.contains(&other.id.as_str()) {
                    continue;
                }
                if !meets_properly(route, a, b, &other.coords, &c, &d) {
                    trace!("route conflicts with section {}", other.id);
                    return false;
                }
            }
        }
        true
    }

    /// Checks a batch of sections that change together: each against the
    /// rest of `lines`, and against each other.
    pub fn sections_valid_wrt_catchments(&self, sections: &[Section], lines: &CatchmentLines) -> bool {
        let ids: Vec<&str> = sections.iter().map(|s| s.id.as_str()).collect();
        if !sections
            .iter()
            .all(|s| self.route_valid_wrt_catchments(&s.coords, lines, &ids))
        {
            return false;
        }
        sections.iter().enumerate().all(|(i, s)| {
            sections[i + 1..]
                .iter()
                .all(|t| routes_meet_properly(&s.coords, &t.coords))
        })
    }
}

/// Returns `true` if the segments `a b` of `route` and `c d` of `other` are
/// disjoint or only share a point that is an endpoint of both polylines.
fn meets_properly(route: &[Point3], a: &Point3, b: &Point3, other: &[Point3], c: &Point3, d: &Point3) -> bool {
    match segment_intersection(a, b, c, d) {
        SegmentIntersection::Disjoint => true,
        SegmentIntersection::Overlap => false,
        SegmentIntersection::Point(hit) => polyline::is_endpoint(route, &hit) && polyline::is_endpoint(other, &hit),
    }
}

/// Pairwise form of the catchment rule for two polylines.
pub fn routes_meet_properly(first: &[Point3], second: &[Point3]) -> bool {
    polyline::segments(first).all(|(a, b)| {
        polyline::segments(second).all(|(c, d)| meets_properly(first, a, b, second, c, d))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pts(coords: &[(f64, f64)]) -> Vec<Point3> {
        coords.iter().map(|&(x, y)| Point3::new(x, y, 1.0)).collect()
    }

    fn checker() -> ValidityChecker {
        // three lines meeting at (5, 5), one running on to (5, 0)
        let water = WaterNetwork::new(vec![
            pts(&[(0.0, 5.0), (5.0, 5.0)]),
            pts(&[(10.0, 5.0), (5.0, 5.0)]),
            pts(&[(5.0, 5.0), (5.0, 2.0), (5.0, 0.0)]),
        ])
        .unwrap();
        ValidityChecker::new(Rc::new(water))
    }

    fn lines() -> CatchmentLines {
        CatchmentLines::new(vec![
            Section::new("a", pts(&[(5.0, 5.0), (5.0, 8.0), (5.0, 10.0)])),
            Section::new("b", pts(&[(5.0, 10.0), (0.0, 10.0)])),
            Section::new("c", pts(&[(5.0, 10.0), (10.0, 10.0)])),
        ])
        .unwrap()
    }

    #[test]
    fn confluence_endpoint_may_touch_water() {
        let c = checker();
        assert!(c.route_valid_wrt_water(&pts(&[(5.0, 5.0), (6.0, 7.0)])));
    }

    #[test]
    fn non_confluence_vertex_may_not_touch_water() {
        let c = checker();
        // water line end that is not a confluence
        assert!(!c.route_valid_wrt_water(&pts(&[(0.0, 5.0), (1.0, 7.0)])));
        // interior vertex of a water line
        assert!(!c.route_valid_wrt_water(&pts(&[(4.0, 1.0), (5.0, 2.0), (6.0, 1.0)])));
        // point on a water segment between vertices
        assert!(!c.route_valid_wrt_water(&pts(&[(2.0, 5.0), (2.0, 8.0)])));
    }

    #[test]
    fn segment_along_water_is_invalid() {
        let c = checker();
        assert!(!c.route_valid_wrt_water(&pts(&[(5.0, 5.0), (5.0, 2.0)])));
    }

    #[test]
    fn crossing_between_vertices_is_not_a_water_touch() {
        let c = checker();
        assert!(c.route_valid_wrt_water(&pts(&[(4.0, 3.0), (6.0, 3.0)])));
    }

    #[test]
    fn checks_are_idempotent() {
        let c = checker();
        let route = pts(&[(4.0, 1.0), (5.0, 2.0), (6.0, 1.0)]);
        let first = c.route_valid_wrt_water(&route);
        assert_eq!(first, c.route_valid_wrt_water(&route));
        let lines = lines();
        let other = pts(&[(0.0, 8.0), (10.0, 8.0)]);
        let first = c.route_valid_wrt_catchments(&other, &lines, &[]);
        assert_eq!(first, c.route_valid_wrt_catchments(&other, &lines, &[]));
    }

    #[test]
    fn sharing_only_an_endpoint_is_valid() {
        let c = checker();
        let lines = lines();
        assert!(c.route_valid_wrt_catchments(&pts(&[(5.0, 10.0), (5.0, 12.0)]), &lines, &[]));
        assert!(c.route_valid_wrt_catchments(&pts(&[(4.0, 11.0), (5.0, 10.0)]), &lines, &[]));
    }

    #[test]
    fn interior_crossing_is_invalid() {
        let c = checker();
        let lines = lines();
        let crossing = pts(&[(0.0, 8.0), (10.0, 8.0)]);
        assert!(!c.route_valid_wrt_catchments(&crossing, &lines, &[]));
        // ignoring the crossed section makes it valid
        assert!(c.route_valid_wrt_catchments(&crossing, &lines, &["a"]));
    }

    #[test]
    fn touching_an_interior_vertex_is_invalid() {
        let c = checker();
        let lines = lines();
        assert!(!c.route_valid_wrt_catchments(&pts(&[(3.0, 8.0), (5.0, 8.0)]), &lines, &[]));
    }

    #[test]
    fn overlapping_sections_are_invalid() {
        let c = checker();
        let lines = lines();
        assert!(!c.route_valid_wrt_catchments(&pts(&[(2.0, 10.0), (4.0, 10.0)]), &lines, &[]));
    }

    #[test]
    fn batch_checks() {
        let c = checker();
        let lines = lines();
        let moved = vec![
            Section::new("b", pts(&[(5.0, 10.0), (3.0, 12.0), (0.0, 10.0)])),
            Section::new("c", pts(&[(5.0, 10.0), (7.0, 12.0), (10.0, 10.0)])),
        ];
        assert!(c.sections_valid_wrt_water(&moved));
        assert!(c.sections_valid_wrt_catchments(&moved, &lines));

        let crossing = vec![
            Section::new("b", pts(&[(5.0, 10.0), (8.0, 12.0), (0.0, 12.0)])),
            Section::new("c", pts(&[(5.0, 10.0), (2.0, 12.5), (10.0, 10.0)])),
        ];
        assert!(!c.sections_valid_wrt_catchments(&crossing, &lines));
        assert!(routes_meet_properly(&moved[0].coords, &moved[1].coords));
    }
}
