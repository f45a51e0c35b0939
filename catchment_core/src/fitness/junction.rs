use std::rc::Rc;

use crate::dataset::Junction;
use crate::error::{CatchmentError, Result};
use crate::geometry::Point3;

use super::{require_elevation, SectionFitness};

/// Scores a junction and the sections meeting at it.
pub trait JunctionFitness {
    fn fitness(&self, junction: &Junction) -> Result<f64>;
}

/// The junction's own elevation.
#[derive(Debug, Clone, Copy, Default)]
pub struct ElevationJunctionFitness;

impl JunctionFitness for ElevationJunctionFitness {
    fn fitness(&self, junction: &Junction) -> Result<f64> {
        require_elevation(junction.point())?;
        Ok(junction.point().z)
    }
}

/// Sum of the fitness of every touching section.
pub struct SumTouchingJunctionFitness {
    section: Rc<dyn SectionFitness>,
}

impl SumTouchingJunctionFitness {
    pub fn new(section: Rc<dyn SectionFitness>) -> Self {
        Self { section }
    }
}

impl JunctionFitness for SumTouchingJunctionFitness {
    fn fitness(&self, junction: &Junction) -> Result<f64> {
        self.section.sum_fitness(junction.touching_sections())
    }
}

/// Like [`SumTouchingJunctionFitness`] but each section only contributes its
/// `k` vertices nearest the junction.
pub struct PartialSumTouchingJunctionFitness {
    section: Rc<dyn SectionFitness>,
    k: usize,
}

impl PartialSumTouchingJunctionFitness {
    pub const DEFAULT_K: usize = 3;

    pub fn new(section: Rc<dyn SectionFitness>, k: usize) -> Result<Self> {
        if k == 0 {
            return Err(CatchmentError::invalid("partial sum needs at least one vertex"));
        }
        Ok(Self { section, k })
    }

    /// The first `k` vertices of `route` counted from the end at `junction`.
    pub fn partial_route(&self, route: &[Point3], junction: &Point3) -> Result<Vec<Point3>> {
        let n = route.len();
        let starts = route.first().map_or(false, |p| p.same_xy(junction));
        let ends = route.last().map_or(false, |p| p.same_xy(junction));
        if !starts && !ends {
            return Err(CatchmentError::invalid(format!(
                "section does not end at junction ({}, {})",
                junction.x, junction.y
            )));
        }
        if n <= self.k {
            return Ok(route.to_vec());
        }
        if starts {
            Ok(route[..self.k].to_vec())
        } else {
            Ok(route[n - self.k..].to_vec())
        }
    }
}

impl JunctionFitness for PartialSumTouchingJunctionFitness {
    fn fitness(&self, junction: &Junction) -> Result<f64> {
        let mut sum = 0.0;
        for s in junction.touching_sections() {
            sum += self.section.fitness(&self.partial_route(&s.coords, junction.point())?)?;
        }
        Ok(sum)
    }
}
