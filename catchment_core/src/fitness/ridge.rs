use std::rc::Rc;

use crate::error::{CatchmentError, Result};
use crate::geometry::{Edge, Point3};
use crate::tin::{Tin, Triangle};

use super::{require_elevation, SectionFitness};

/// Weight applied to a triangle's slope relative to its aspect alignment.
const SLOPE_WEIGHT: f64 = 0.1;
const SCALE_FACTOR: f64 = 100.0;
/// Cosines smaller than this are treated as exactly perpendicular.
const COS_EPSILON: f64 = 1e-9;

/// Scores how well a segment follows a ridge.
///
/// Each of the two triangles sharing the segment contributes
/// `cos(a) * 2^(-cos(a)) * 0.1 * slope`, where `a` is the angle between the
/// triangle's aspect and the direction pointing away from the segment. The
/// segment scores the product of both contributions and their maximum,
/// scaled by its length. The result is positive only when both sides fall
/// away from the segment.
pub struct RidgeFitness {
    tin: Rc<Tin>,
}

impl RidgeFitness {
    pub fn new(tin: Rc<Tin>) -> Self {
        Self { tin }
    }

    fn side_weight(triangle: &Triangle, base: &Edge) -> Result<f64> {
        let spine = triangle.spine_edge(base)?;
        let offset = (triangle.aspect() - spine.bearing()).to_radians();
        let mut c = offset.cos();
        if c.abs() < COS_EPSILON {
            c = 0.0;
        }
        Ok(c * 2f64.powf(-c) * SLOPE_WEIGHT * triangle.slope())
    }
}

impl SectionFitness for RidgeFitness {
    fn segment_fitness(&self, a: &Point3, b: &Point3) -> Result<f64> {
        require_elevation(a)?;
        require_elevation(b)?;
        let triangles = self.tin.triangles_on_edge(a, b);
        if triangles.len() != 2 {
            return Err(CatchmentError::inconsistent(format!(
                "segment ({}, {})-({}, {}) has {} adjacent triangles, expected 2",
                a.x,
                a.y,
                b.x,
                b.y,
                triangles.len()
            )));
        }
        let base = Edge::new(*a, *b);
        let b1 = Self::side_weight(triangles[0], &base)?;
        let b2 = Self::side_weight(triangles[1], &base)?;
        let fitness = b1 * b2 * b1.max(b2) * SCALE_FACTOR * base.length();
        Ok(if fitness == 0.0 { 0.0 } else { fitness })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two triangles sharing the edge (0,0)-(2,0), apexes north and south.
    fn hinge(z_north: f64, z_south: f64) -> Rc<Tin> {
        let vertices = vec![
            Point3::new(0.0, 0.0, 10.0),
            Point3::new(2.0, 0.0, 10.0),
            Point3::new(1.0, 1.0, z_north),
            Point3::new(1.0, -1.0, z_south),
        ];
        Rc::new(Tin::new(vertices, vec![[0, 1, 2], [0, 1, 3]]).unwrap())
    }

    fn shared_edge_fitness(tin: Rc<Tin>) -> f64 {
        let a = tin.vertex(&Point3::new(0.0, 0.0, 0.0)).unwrap();
        let b = tin.vertex(&Point3::new(2.0, 0.0, 0.0)).unwrap();
        RidgeFitness::new(tin).segment_fitness(&a, &b).unwrap()
    }

    #[test]
    fn ridge_is_positive() {
        assert!(shared_edge_fitness(hinge(9.0, 9.0)) > 0.0);
    }

    #[test]
    fn trough_is_negative() {
        assert!(shared_edge_fitness(hinge(11.0, 11.0)) < 0.0);
    }

    #[test]
    fn mid_slope_is_negative() {
        assert!(shared_edge_fitness(hinge(11.0, 9.0)) < 0.0);
        assert!(shared_edge_fitness(hinge(9.0, 11.0)) < 0.0);
    }

    #[test]
    fn aspect_parallel_to_segment_scores_zero() {
        // one plane falling to the east on both sides of the edge
        let vertices = vec![
            Point3::new(0.0, 0.0, 10.0),
            Point3::new(2.0, 0.0, 8.0),
            Point3::new(1.0, 1.0, 9.0),
            Point3::new(1.0, -1.0, 9.0),
        ];
        let tin = Rc::new(Tin::new(vertices, vec![[0, 1, 2], [0, 1, 3]]).unwrap());
        assert_eq!(shared_edge_fitness(tin), 0.0);
    }

    #[test]
    fn steeper_ridge_scores_higher() {
        assert!(shared_edge_fitness(hinge(5.0, 5.0)) > shared_edge_fitness(hinge(9.0, 9.0)));
    }

    #[test]
    fn boundary_segment_is_inconsistent() {
        let tin = hinge(9.0, 9.0);
        let a = tin.vertex(&Point3::new(0.0, 0.0, 0.0)).unwrap();
        let b = tin.vertex(&Point3::new(1.0, 1.0, 0.0)).unwrap();
        let err = RidgeFitness::new(tin).segment_fitness(&a, &b).unwrap_err();
        assert!(matches!(err, CatchmentError::DataInconsistency(_)));
    }

    #[test]
    fn nan_elevation_fails_fast() {
        let tin = hinge(9.0, 9.0);
        let a = Point3::new(0.0, 0.0, f64::NAN);
        let b = Point3::new(2.0, 0.0, 10.0);
        let err = RidgeFitness::new(tin).segment_fitness(&a, &b).unwrap_err();
        assert!(matches!(err, CatchmentError::InvalidInput(_)));
    }
}
