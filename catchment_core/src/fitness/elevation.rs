use crate::error::{CatchmentError, Result};
use crate::geometry::{polyline, Point3};

use super::{require_elevation, require_elevations, SectionFitness};

/// Favours high ground: a segment scores the sum of its endpoint
/// elevations, a section the sum of all its vertex elevations.
#[derive(Debug, Clone, Copy, Default)]
pub struct ElevationFitness;

impl SectionFitness for ElevationFitness {
    fn segment_fitness(&self, a: &Point3, b: &Point3) -> Result<f64> {
        require_elevation(a)?;
        require_elevation(b)?;
        Ok(a.z + b.z)
    }

    fn fitness(&self, route: &[Point3]) -> Result<f64> {
        require_elevations(route)?;
        Ok(route.iter().map(|p| p.z).sum())
    }
}

fn nonzero_length(route: &[Point3]) -> Result<f64> {
    let len = polyline::length(route);
    if len > 0.0 {
        Ok(len)
    } else {
        Err(CatchmentError::invalid("cannot score a zero-length route"))
    }
}

/// Summed vertex elevation divided by the planar route length.
#[derive(Debug, Clone, Copy, Default)]
pub struct ElevationLengthPenaltyFitness;

impl SectionFitness for ElevationLengthPenaltyFitness {
    fn segment_fitness(&self, a: &Point3, b: &Point3) -> Result<f64> {
        self.fitness(&[*a, *b])
    }

    fn fitness(&self, route: &[Point3]) -> Result<f64> {
        require_elevations(route)?;
        let len = nonzero_length(route)?;
        Ok(route.iter().map(|p| p.z).sum::<f64>() / len)
    }
}

/// Average vertex elevation scaled down logarithmically as the route grows
/// towards `max_length`.
#[derive(Debug, Clone, Copy)]
pub struct AvgElevationLengthPenaltyFitness {
    max_length: f64,
}

impl AvgElevationLengthPenaltyFitness {
    pub const DEFAULT_MAX_LENGTH: f64 = 1500.0;

    pub fn new(max_length: f64) -> Result<Self> {
        if !(max_length.is_finite() && max_length > 0.0) {
            return Err(CatchmentError::invalid("max length must be positive"));
        }
        Ok(Self { max_length })
    }
}

impl Default for AvgElevationLengthPenaltyFitness {
    fn default() -> Self {
        Self {
            max_length: Self::DEFAULT_MAX_LENGTH,
        }
    }
}

impl SectionFitness for AvgElevationLengthPenaltyFitness {
    fn segment_fitness(&self, a: &Point3, b: &Point3) -> Result<f64> {
        self.fitness(&[*a, *b])
    }

    fn fitness(&self, route: &[Point3]) -> Result<f64> {
        require_elevations(route)?;
        let len = nonzero_length(route)?;
        let avg = route.iter().map(|p| p.z).sum::<f64>() / route.len() as f64;
        let penalty = (1.0 + (len / self.max_length).min(1.0)).ln();
        Ok(avg * (1.0 - penalty))
    }
}
