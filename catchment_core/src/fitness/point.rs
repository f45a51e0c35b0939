use crate::error::Result;
use crate::geometry::{polyline, Point3};

use super::require_elevation;

/// Scores a single candidate position.
pub trait PointFitness {
    fn fitness(&self, p: &Point3) -> Result<f64>;
}

/// Higher ground scores higher.
#[derive(Debug, Clone, Copy, Default)]
pub struct ElevationPointFitness;

impl PointFitness for ElevationPointFitness {
    fn fitness(&self, p: &Point3) -> Result<f64> {
        require_elevation(p)?;
        Ok(p.z)
    }
}

/// Scores `1 / |d1 - d2|` where `d1` and `d2` are the planar distances to
/// two reference polylines, so points midway between them score highest.
#[derive(Debug, Clone)]
pub struct EquidistantPointFitness {
    first: Vec<Point3>,
    second: Vec<Point3>,
}

impl EquidistantPointFitness {
    pub fn new(first: Vec<Point3>, second: Vec<Point3>) -> Self {
        Self { first, second }
    }
}

impl PointFitness for EquidistantPointFitness {
    fn fitness(&self, p: &Point3) -> Result<f64> {
        let imbalance =
            (polyline::distance_to(&self.first, p) - polyline::distance_to(&self.second, p)).abs();
        Ok(1.0 / imbalance)
    }
}

/// Orders points from highest to lowest fitness. Ties keep their input
/// order.
pub fn rank_by_fitness(points: Vec<Point3>, fitness: &dyn PointFitness) -> Result<Vec<Point3>> {
    let mut scored = points
        .into_iter()
        .map(|p| fitness.fitness(&p).map(|f| (f, p)))
        .collect::<Result<Vec<_>>>()?;
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));
    Ok(scored.into_iter().map(|(_, p)| p).collect())
}
