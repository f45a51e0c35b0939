use std::collections::HashSet;
use std::rc::Rc;

use log::trace;

use crate::error::{CatchmentError, Result};
use crate::geometry::{polyline, CoordKey, Point3};
use crate::validity::ValidityChecker;
use crate::water::WaterNetwork;

use super::{routes_overlap, Router};

/// Router that keeps boundaries off the water network.
///
/// Routes never step on a water vertex other than a confluence, never run
/// along a water segment, and vertices at or next to a confluence are never
/// moved.
pub struct WaterAwareRouter {
    router: Router,
    water: Rc<WaterNetwork>,
    checker: ValidityChecker,
    blocked: HashSet<CoordKey>,
}

impl WaterAwareRouter {
    pub fn new(router: Router, water: Rc<WaterNetwork>) -> Self {
        let blocked = router
            .tin()
            .vertices()
            .iter()
            .filter(|v| water.is_on_water(v) && !water.is_confluence(v))
            .map(Point3::key)
            .collect();
        let checker = ValidityChecker::new(Rc::clone(&water));
        Self {
            router,
            water,
            checker,
            blocked,
        }
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn water(&self) -> &Rc<WaterNetwork> {
        &self.water
    }

    /// Routes through `required` while staying off the water network.
    pub fn make_route(&self, required: &[Point3]) -> Result<Vec<Point3>> {
        let route = self.router.make_route_avoiding(required, &self.blocked)?;
        if !self.checker.route_valid_wrt_water(&route) {
            return Err(CatchmentError::routing("route touches the water network"));
        }
        Ok(route)
    }

    /// Returns `false` for vertices that must stay where they are: route
    /// endpoints (unless `endpoint_movable`) and any vertex that is, or is
    /// next to, a confluence.
    pub fn is_coordinate_movable(&self, index: usize, route: &[Point3], endpoint_movable: bool) -> bool {
        let n = route.len();
        if index >= n {
            return false;
        }
        if (index == 0 || index == n - 1) && !endpoint_movable {
            return false;
        }
        let lo = index.saturating_sub(1);
        let hi = (index + 1).min(n - 1);
        !route[lo..=hi].iter().any(|p| self.water.is_confluence(p))
    }

    /// Moves `old` to `new`, releasing up to `freedom` movable vertices on
    /// each side of it, and reroutes through what remains.
    pub fn reroute(
        &self,
        route: &[Point3],
        old: &Point3,
        new: &Point3,
        freedom: usize,
        endpoint_movable: bool,
    ) -> Result<Vec<Point3>> {
        let pivot = polyline::index_of(route, old)
            .ok_or_else(|| CatchmentError::invalid("rerouted point is not on the route"))?;
        if !self.is_coordinate_movable(pivot, route, endpoint_movable) {
            return Err(CatchmentError::routing(format!(
                "({}, {}) cannot be moved",
                old.x, old.y
            )));
        }
        let last = route.len() - 1;
        let released = |i: usize| {
            let dist = i.abs_diff(pivot);
            dist > 0 && dist <= freedom && i != 0 && i != last && self.is_coordinate_movable(i, route, endpoint_movable)
        };
        if route
            .iter()
            .enumerate()
            .any(|(i, c)| i != pivot && !released(i) && c.same_xy(new))
        {
            return Err(CatchmentError::routing(format!(
                "({}, {}) is a fixed vertex of the route",
                new.x, new.y
            )));
        }
        let mut included: Vec<Point3> = Vec::with_capacity(route.len());
        for (i, c) in route.iter().enumerate() {
            if released(i) {
                continue;
            }
            let keep = if i == pivot { *new } else { *c };
            if !polyline::contains(&included, &keep) {
                included.push(keep);
            }
        }
        if included.len() < 2 {
            return Err(CatchmentError::routing("nothing left to route between"));
        }
        trace!(
            "rerouting {} vertices through {} fixed points",
            route.len(),
            included.len()
        );
        self.make_route(&included)
    }

    /// Moves the endpoint `old` shared by `routes` to `new`, rerouting each
    /// with the given freedom.
    pub fn reroute_all(
        &self,
        routes: &[Vec<Point3>],
        old: &Point3,
        new: &Point3,
        freedom: usize,
    ) -> Result<Vec<Vec<Point3>>> {
        let moved = routes
            .iter()
            .map(|r| self.reroute(r, old, new, freedom, true))
            .collect::<Result<Vec<_>>>()?;
        if routes_overlap(&moved) {
            return Err(CatchmentError::routing("rerouted junction makes routes overlap"));
        }
        Ok(moved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic;

    fn at(x: f64, y: f64) -> Point3 {
        Point3::new(x, y, f64::NAN)
    }

    #[test]
    fn reroute_onto_a_fixed_end_is_recoverable() {
        let s = synthetic::spur().unwrap();
        let router = WaterAwareRouter::new(Router::new(Rc::clone(&s.tin)), Rc::clone(&s.water));
        let short = &s.lines.latest("short").unwrap().coords;
        let err = router.reroute(short, &at(3.0, 3.0), &at(4.0, 3.0), 5, true).unwrap_err();
        assert!(err.is_recoverable());

        let west = &s.lines.latest("west").unwrap().coords;
        let err = router.reroute(west, &at(3.0, 3.0), &at(1.0, 3.0), 5, true).unwrap_err();
        assert!(err.is_recoverable());
    }

    #[test]
    fn reroute_through_a_released_vertex() {
        let s = synthetic::spur().unwrap();
        let router = WaterAwareRouter::new(Router::new(Rc::clone(&s.tin)), Rc::clone(&s.water));
        let west = &s.lines.latest("west").unwrap().coords;
        let moved = router.reroute(west, &at(3.0, 3.0), &at(2.0, 3.0), 5, true).unwrap();
        assert!(moved[0].same_xy(&at(2.0, 3.0)));
        assert!(moved.last().unwrap().same_xy(&at(1.0, 3.0)));
        assert!(s.tin.follows_mesh(&moved));
    }

    #[test]
    fn pinned_endpoints_do_not_move() {
        let s = synthetic::spur().unwrap();
        let router = WaterAwareRouter::new(Router::new(Rc::clone(&s.tin)), Rc::clone(&s.water));
        let north = &s.lines.latest("north").unwrap().coords;
        assert!(!router.is_coordinate_movable(0, north, false));
        assert!(router.is_coordinate_movable(0, north, true));
        assert!(router.is_coordinate_movable(1, north, false));
        let err = router.reroute(north, &at(3.0, 3.0), &at(2.0, 2.0), 1, false).unwrap_err();
        assert!(err.is_recoverable());
    }
}
