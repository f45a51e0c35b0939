//! Mesh-constrained routing of boundary polylines.
//!
//! Every route produced here walks mesh edges only. Between consecutive
//! required points the router greedily steps to the connected vertex with
//! the best [`RouteFitness`] score until it reaches the goal.

mod water_aware;

pub use water_aware::WaterAwareRouter;

use std::collections::HashSet;
use std::rc::Rc;

use log::trace;

use crate::error::{CatchmentError, Result};
use crate::geometry::{polyline, segment_intersection, CoordKey, Point3, SegmentIntersection};
use crate::tin::Tin;

/// Scores a candidate next vertex while walking towards `goal`.
pub trait RouteFitness {
    fn score(&self, candidate: &Point3, goal: &Point3, route: &[Point3]) -> f64;
}

/// Prefers the candidate closest to the goal in plan view.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShortestDistanceRouteFitness;

impl RouteFitness for ShortestDistanceRouteFitness {
    fn score(&self, candidate: &Point3, goal: &Point3, _route: &[Point3]) -> f64 {
        -candidate.distance_2d(goal)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RouterOptions {
    pub allow_self_intersection: bool,
    pub allow_repeated_coords: bool,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            allow_self_intersection: true,
            allow_repeated_coords: false,
        }
    }
}

/// Builds routes along mesh edges.
pub struct Router {
    tin: Rc<Tin>,
    route_fitness: Box<dyn RouteFitness>,
    options: RouterOptions,
}

impl Router {
    pub fn new(tin: Rc<Tin>) -> Self {
        Self::with_options(tin, RouterOptions::default())
    }

    pub fn with_options(tin: Rc<Tin>, options: RouterOptions) -> Self {
        Self {
            tin,
            route_fitness: Box::new(ShortestDistanceRouteFitness),
            options,
        }
    }

    pub fn with_route_fitness(mut self, route_fitness: Box<dyn RouteFitness>) -> Self {
        self.route_fitness = route_fitness;
        self
    }

    pub fn tin(&self) -> &Rc<Tin> {
        &self.tin
    }

    pub fn options(&self) -> RouterOptions {
        self.options
    }

    /// Mesh neighbours of `p`.
    pub fn connected(&self, p: &Point3) -> Result<Vec<Point3>> {
        self.tin.connected(p)
    }

    pub fn follows_mesh(&self, route: &[Point3]) -> bool {
        self.tin.follows_mesh(route)
    }

    /// Routes through every point of `required` in order, never stepping on
    /// a vertex listed in `excluded` (required points themselves are always
    /// allowed).
    pub fn make_route(&self, required: &[Point3], excluded: &[Point3]) -> Result<Vec<Point3>> {
        let excluded: HashSet<CoordKey> = excluded.iter().map(Point3::key).collect();
        self.make_route_avoiding(required, &excluded)
    }

    pub(crate) fn make_route_avoiding(
        &self,
        required: &[Point3],
        excluded: &HashSet<CoordKey>,
    ) -> Result<Vec<Point3>> {
        if required.len() < 2 {
            return Err(CatchmentError::invalid("a route needs at least two required points"));
        }
        let stops = required
            .iter()
            .map(|p| self.tin.vertex(p))
            .collect::<Result<Vec<_>>>()?;
        let mut route = vec![stops[0]];
        let mut visited = HashSet::from([stops[0].key()]);
        for (i, goal) in stops.iter().enumerate().skip(1) {
            // later stops stay free until their own leg
            let ahead: HashSet<CoordKey> = stops[i + 1..]
                .iter()
                .filter(|p| !p.same_xy(goal))
                .map(Point3::key)
                .collect();
            self.route_leg(&mut route, &mut visited, goal, excluded, &ahead)?;
        }
        Ok(polyline::dedup_consecutive(route))
    }

    fn route_leg(
        &self,
        route: &mut Vec<Point3>,
        visited: &mut HashSet<CoordKey>,
        goal: &Point3,
        excluded: &HashSet<CoordKey>,
        ahead: &HashSet<CoordKey>,
    ) -> Result<()> {
        let leg_start = route.len() - 1;
        let mut current = route[leg_start];
        let mut steps = 0;
        while !current.same_xy(goal) {
            let mut best: Option<(f64, Point3)> = None;
            for candidate in self.tin.connected(&current)? {
                let is_goal = candidate.same_xy(goal);
                let key = candidate.key();
                if !is_goal && (excluded.contains(&key) || ahead.contains(&key)) {
                    continue;
                }
                if !is_goal && !self.options.allow_repeated_coords && visited.contains(&key) {
                    continue;
                }
                if !self.options.allow_self_intersection && creates_crossing(route, &candidate) {
                    continue;
                }
                let score = self.route_fitness.score(&candidate, goal, route);
                if best.map_or(true, |(s, _)| score > s) {
                    best = Some((score, candidate));
                }
            }
            let Some((_, next)) = best else {
                return Err(CatchmentError::routing(format!(
                    "no valid step from ({}, {}) towards ({}, {})",
                    current.x, current.y, goal.x, goal.y
                )));
            };
            if polyline::contains(&route[leg_start..], &next) {
                return Err(CatchmentError::routing(format!(
                    "route loops back to ({}, {})",
                    next.x, next.y
                )));
            }
            steps += 1;
            if steps > self.tin.vertices().len() {
                return Err(CatchmentError::routing("route exceeds the mesh size"));
            }
            route.push(next);
            visited.insert(next.key());
            current = next;
        }
        Ok(())
    }

    /// One alternative route per mesh neighbour of `excluded`, each avoiding
    /// `excluded`. Neighbours already on the route and failed reroutes are
    /// skipped.
    pub fn alternative_routes(&self, route: &[Point3], excluded: &Point3) -> Result<Vec<Vec<Point3>>> {
        if polyline::is_endpoint(route, excluded) {
            return Err(CatchmentError::invalid("cannot exclude a route endpoint"));
        }
        if !polyline::contains(route, excluded) {
            return Err(CatchmentError::invalid("excluded point is not on the route"));
        }
        let mut alternatives: Vec<Vec<Point3>> = Vec::new();
        for neighbour in self.tin.connected(excluded)? {
            if polyline::contains(route, &neighbour) {
                continue;
            }
            match self.replace_coordinate(route, excluded, &neighbour) {
                Ok(alt) => {
                    if !polyline::same_route(&alt, route)
                        && !alternatives.iter().any(|a| polyline::same_route(a, &alt))
                    {
                        alternatives.push(alt);
                    }
                }
                Err(e) if e.is_recoverable() => trace!("no alternative via ({}, {}): {}", neighbour.x, neighbour.y, e),
                Err(e) => return Err(e),
            }
        }
        Ok(alternatives)
    }

    /// Replaces `old` by `new`, rerouting only the segments next to it.
    pub fn replace_coordinate(&self, route: &[Point3], old: &Point3, new: &Point3) -> Result<Vec<Point3>> {
        if polyline::contains(route, new) {
            return Err(CatchmentError::routing(format!(
                "({}, {}) is already part of the route",
                new.x, new.y
            )));
        }
        let idx = polyline::index_of(route, old)
            .ok_or_else(|| CatchmentError::invalid("replaced point is not on the route"))?;
        if route.len() < 2 {
            return Err(CatchmentError::invalid("a route needs at least two points"));
        }
        let n = route.len();
        let blacklist = [*old];
        let mut result = Vec::with_capacity(n + 2);
        if idx == 0 {
            result.extend(self.make_route(&[*new, route[1]], &blacklist)?);
            result.extend_from_slice(&route[2..]);
        } else if idx == n - 1 {
            result.extend_from_slice(&route[..n - 2]);
            result.extend(self.make_route(&[route[n - 2], *new], &blacklist)?);
        } else {
            result.extend_from_slice(&route[..idx - 1]);
            result.extend(self.make_route(&[route[idx - 1], *new, route[idx + 1]], &blacklist)?);
            result.extend_from_slice(&route[idx + 2..]);
        }
        Ok(polyline::dedup_consecutive(result))
    }

    /// Moves the endpoint `old` shared by `routes` to `new`. Up to `loose`
    /// vertices next to the old endpoint are released and the routes are
    /// rebuilt to reach `new`.
    pub fn move_junction(
        &self,
        routes: &[Vec<Point3>],
        old: &Point3,
        new: &Point3,
        loose: usize,
    ) -> Result<Vec<Vec<Point3>>> {
        if loose == 0 {
            return Err(CatchmentError::invalid("at least one vertex must be released"));
        }
        let mut moved = Vec::with_capacity(routes.len());
        for route in routes {
            let at_start = route.first().map_or(false, |p| p.same_xy(old));
            let n = loose.min(route.len().saturating_sub(1));
            let mut required = truncate(route, old, n)?;
            if polyline::contains(&required, new) {
                return Err(CatchmentError::routing(format!(
                    "({}, {}) is already part of a moved route",
                    new.x, new.y
                )));
            }
            if at_start {
                required.insert(0, *new);
            } else {
                required.push(*new);
            }
            moved.push(self.make_route(&required, &[])?);
        }
        if routes_overlap(&moved) {
            return Err(CatchmentError::routing("moved junction makes routes overlap"));
        }
        Ok(moved)
    }
}

/// Removes `n` vertices from the end of `route` at `endpoint`.
pub fn truncate(route: &[Point3], endpoint: &Point3, n: usize) -> Result<Vec<Point3>> {
    if n >= route.len() {
        return Err(CatchmentError::invalid(format!(
            "cannot remove {} of {} vertices",
            n,
            route.len()
        )));
    }
    if route.first().map_or(false, |p| p.same_xy(endpoint)) {
        Ok(route[n..].to_vec())
    } else if route.last().map_or(false, |p| p.same_xy(endpoint)) {
        Ok(route[..route.len() - n].to_vec())
    } else {
        Err(CatchmentError::invalid("truncation point is not a route endpoint"))
    }
}

/// Returns `true` if any two routes share a stretch of segment, or a vertex
/// that is not an endpoint of both.
pub fn routes_overlap(routes: &[Vec<Point3>]) -> bool {
    for (i, a) in routes.iter().enumerate() {
        for b in &routes[i + 1..] {
            let shared_vertex = a.iter().any(|p| {
                polyline::contains(b, p) && !(polyline::is_endpoint(a, p) && polyline::is_endpoint(b, p))
            });
            if shared_vertex {
                return true;
            }
            for (p, q) in polyline::segments(a) {
                for (r, s) in polyline::segments(b) {
                    if segment_intersection(p, q, r, s) == SegmentIntersection::Overlap {
                        return true;
                    }
                }
            }
        }
    }
    false
}

/// Returns `true` if stepping from the end of `route` to `candidate` would
/// cross or run along an earlier part of the route.
fn creates_crossing(route: &[Point3], candidate: &Point3) -> bool {
    let Some(last) = route.last() else {
        return false;
    };
    let n = route.len();
    for (i, (p, q)) in polyline::segments(route).enumerate() {
        match segment_intersection(last, candidate, p, q) {
            SegmentIntersection::Disjoint => {}
            SegmentIntersection::Overlap => return true,
            // the previous segment always touches at `last`
            SegmentIntersection::Point(hit) => {
                if !(i + 2 == n && hit.same_xy(last)) {
                    return true;
                }
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic;

    fn router() -> Router {
        Router::new(Rc::new(synthetic::diagonal_grid(5, 5, |_, _| 10.0).unwrap()))
    }

    fn p(x: f64, y: f64) -> Point3 {
        Point3::new(x, y, 10.0)
    }

    #[test]
    fn straight_route_along_a_row() {
        let route = router().make_route(&[p(0.0, 0.0), p(4.0, 0.0)], &[]).unwrap();
        assert_eq!(route.len(), 5);
        assert!(route.iter().all(|c| c.y == 0.0));
    }

    #[test]
    fn route_takes_mesh_elevation() {
        let route = router()
            .make_route(&[Point3::new(0.0, 0.0, f64::NAN), Point3::new(2.0, 2.0, f64::NAN)], &[])
            .unwrap();
        assert!(route.iter().all(|c| c.z == 10.0));
        assert_eq!(route.len(), 3);
    }

    #[test]
    fn excluded_vertices_are_avoided() {
        let r = router();
        let route = r.make_route(&[p(0.0, 0.0), p(4.0, 0.0)], &[p(2.0, 0.0)]).unwrap();
        assert!(!polyline::contains(&route, &p(2.0, 0.0)));
        assert!(r.follows_mesh(&route));
    }

    #[test]
    fn multi_leg_routes_visit_every_required_point() {
        let r = router();
        let required = [p(0.0, 0.0), p(2.0, 3.0), p(4.0, 0.0)];
        let route = r.make_route(&required, &[]).unwrap();
        for q in &required {
            assert!(polyline::contains(&route, q));
        }
        assert!(r.follows_mesh(&route));
        assert!(route.windows(2).all(|w| !w[0].same_xy(&w[1])));
    }

    #[test]
    fn earlier_legs_leave_later_stops_free() {
        let r = router();
        // the direct walk from (0, 0) to (2, 2) runs through (1, 1)
        let stop = p(1.0, 1.0);
        let route = r.make_route(&[p(0.0, 0.0), p(2.0, 2.0), stop], &[]).unwrap();
        assert_eq!(route.len(), 5);
        assert!(route.last().unwrap().same_xy(&stop));
        assert_eq!(route.iter().filter(|q| q.same_xy(&stop)).count(), 1);
        assert!(route[3].same_xy(&p(2.0, 2.0)));
        assert!(r.follows_mesh(&route));
    }

    #[test]
    fn contract_violations() {
        let r = router();
        assert!(matches!(r.make_route(&[p(0.0, 0.0)], &[]), Err(CatchmentError::InvalidInput(_))));
        assert!(matches!(
            r.make_route(&[p(0.0, 0.0), p(0.5, 0.5)], &[]),
            Err(CatchmentError::DataInconsistency(_))
        ));
    }

    #[test]
    fn enclosed_goal_is_a_routing_failure() {
        let r = router();
        let goal = p(2.0, 2.0);
        let fence = r.connected(&goal).unwrap();
        let err = r.make_route(&[p(0.0, 0.0), goal], &fence).unwrap_err();
        // the goal is still allowed but every way into it is blocked
        assert!(err.is_recoverable());
    }

    #[test]
    fn replace_coordinate_in_the_middle() {
        let r = router();
        let route = r.make_route(&[p(0.0, 0.0), p(4.0, 0.0)], &[]).unwrap();
        let replaced = r.replace_coordinate(&route, &p(2.0, 0.0), &p(2.0, 1.0)).unwrap();
        assert!(polyline::contains(&replaced, &p(2.0, 1.0)));
        assert!(!polyline::contains(&replaced, &p(2.0, 0.0)));
        assert!(replaced.first().unwrap().same_xy(&p(0.0, 0.0)));
        assert!(replaced.last().unwrap().same_xy(&p(4.0, 0.0)));
        assert!(r.follows_mesh(&replaced));
    }

    #[test]
    fn replace_coordinate_at_the_ends() {
        let r = router();
        let route = r.make_route(&[p(1.0, 1.0), p(3.0, 1.0)], &[]).unwrap();
        let start = r.replace_coordinate(&route, &p(1.0, 1.0), &p(1.0, 2.0)).unwrap();
        assert!(start[0].same_xy(&p(1.0, 2.0)));
        let end = r.replace_coordinate(&route, &p(3.0, 1.0), &p(3.0, 0.0)).unwrap();
        assert!(end.last().unwrap().same_xy(&p(3.0, 0.0)));
        assert!(r.follows_mesh(&start) && r.follows_mesh(&end));

        let err = r.replace_coordinate(&route, &p(1.0, 1.0), &p(2.0, 1.0)).unwrap_err();
        assert!(err.is_recoverable());
        let err = r.replace_coordinate(&route, &p(4.0, 4.0), &p(0.0, 4.0)).unwrap_err();
        assert!(matches!(err, CatchmentError::InvalidInput(_)));
    }

    #[test]
    fn alternatives_avoid_the_excluded_point() {
        let r = router();
        let route = r.make_route(&[p(0.0, 2.0), p(4.0, 2.0)], &[]).unwrap();
        let excluded = p(2.0, 2.0);
        let alternatives = r.alternative_routes(&route, &excluded).unwrap();
        assert!(!alternatives.is_empty());
        for alt in &alternatives {
            assert!(!polyline::contains(alt, &excluded));
            assert!(r.follows_mesh(alt));
        }
        assert!(r.alternative_routes(&route, &p(0.0, 2.0)).is_err());
    }

    #[test]
    fn truncation() {
        let route = vec![p(0.0, 0.0), p(1.0, 0.0), p(2.0, 0.0), p(3.0, 0.0)];
        assert_eq!(truncate(&route, &p(0.0, 0.0), 2).unwrap(), route[2..].to_vec());
        assert_eq!(truncate(&route, &p(3.0, 0.0), 1).unwrap(), route[..3].to_vec());
        assert!(truncate(&route, &p(1.0, 0.0), 1).is_err());
        assert!(truncate(&route, &p(0.0, 0.0), 4).is_err());
    }

    #[test]
    fn move_junction_rebuilds_every_route() {
        let r = router();
        let junction = p(2.0, 2.0);
        let routes = vec![
            r.make_route(&[junction, p(0.0, 2.0)], &[]).unwrap(),
            r.make_route(&[junction, p(4.0, 2.0)], &[]).unwrap(),
            r.make_route(&[p(2.0, 4.0), junction], &[]).unwrap(),
        ];
        let new = p(2.0, 1.0);
        let moved = r.move_junction(&routes, &junction, &new, 1).unwrap();
        assert_eq!(moved.len(), 3);
        assert!(moved[0][0].same_xy(&new));
        assert!(moved[1][0].same_xy(&new));
        assert!(moved[2].last().unwrap().same_xy(&new));
        assert!(moved.iter().all(|m| r.follows_mesh(m)));
        assert!(!routes_overlap(&moved));
    }

    #[test]
    fn junction_cannot_move_onto_a_far_end() {
        let r = router();
        let junction = p(2.0, 2.0);
        let routes = vec![
            vec![junction, p(3.0, 2.0)],
            r.make_route(&[junction, p(0.0, 2.0)], &[]).unwrap(),
        ];
        let err = r.move_junction(&routes, &junction, &p(3.0, 2.0), 1).unwrap_err();
        assert!(err.is_recoverable());
    }

    #[test]
    fn overlap_detection() {
        let a = vec![p(0.0, 0.0), p(1.0, 0.0), p(2.0, 0.0)];
        let b = vec![p(2.0, 0.0), p(2.0, 1.0)];
        let c = vec![p(1.0, 0.0), p(1.0, 1.0)];
        let d = vec![p(0.5, 0.0), p(1.5, 0.0)];
        assert!(!routes_overlap(&[a.clone(), b]));
        assert!(routes_overlap(&[a.clone(), c]));
        assert!(routes_overlap(&[a, d]));
    }

    #[test]
    fn self_intersection_can_be_forbidden() {
        let tin = Rc::new(synthetic::diagonal_grid(5, 5, |_, _| 10.0).unwrap());
        let options = RouterOptions {
            allow_self_intersection: false,
            allow_repeated_coords: false,
        };
        let r = Router::with_options(tin, options);
        let route = r
            .make_route(&[p(0.0, 0.0), p(4.0, 4.0), p(4.0, 0.0), p(0.0, 4.0)], &[])
            .map(|route| polyline::is_simple(&route));
        // either a simple route or a routing failure, never a crossing route
        match route {
            Ok(simple) => assert!(simple),
            Err(e) => assert!(e.is_recoverable()),
        }
    }
}
