//! Fitness strategies scoring boundary segments, sections, points and
//! junctions. Higher is better; the meaning of a value depends on the
//! strategy.

mod cedar;
mod elevation;
mod junction;
mod point;
mod ridge;
mod sondheim;

pub use cedar::CedarFitness;
pub use elevation::{AvgElevationLengthPenaltyFitness, ElevationFitness, ElevationLengthPenaltyFitness};
pub use junction::{
    ElevationJunctionFitness, JunctionFitness, PartialSumTouchingJunctionFitness,
    SumTouchingJunctionFitness,
};
pub use point::{rank_by_fitness, ElevationPointFitness, EquidistantPointFitness, PointFitness};
pub use ridge::RidgeFitness;
pub use sondheim::{SondheimConstants, SondheimFitness};

use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::ImproverConfig;
use crate::dataset::Section;
use crate::error::{CatchmentError, Result};
use crate::geometry::{polyline, Point3};
use crate::tin::Tin;

/// Scores a boundary polyline as the sum of its segment scores.
pub trait SectionFitness {
    fn segment_fitness(&self, a: &Point3, b: &Point3) -> Result<f64>;

    fn fitness(&self, route: &[Point3]) -> Result<f64> {
        require_elevations(route)?;
        let mut total = 0.0;
        for (a, b) in polyline::segments(route) {
            total += self.segment_fitness(a, b)?;
        }
        Ok(total)
    }

    fn section_fitness(&self, section: &Section) -> Result<f64> {
        self.fitness(&section.coords)
    }

    fn sum_fitness(&self, sections: &[Section]) -> Result<f64> {
        let mut total = 0.0;
        for s in sections {
            total += self.section_fitness(s)?;
        }
        Ok(total)
    }

    /// Mean section fitness; 0 for an empty set.
    fn avg_fitness(&self, sections: &[Section]) -> Result<f64> {
        if sections.is_empty() {
            return Ok(0.0);
        }
        Ok(self.sum_fitness(sections)? / sections.len() as f64)
    }
}

pub(crate) fn require_elevation(p: &Point3) -> Result<()> {
    if p.has_elevation() {
        Ok(())
    } else {
        Err(CatchmentError::invalid(format!(
            "({}, {}) has no elevation",
            p.x, p.y
        )))
    }
}

pub(crate) fn require_elevations(route: &[Point3]) -> Result<()> {
    route.iter().try_for_each(require_elevation)
}

/// Section fitness strategies selectable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitnessKind {
    Elevation,
    ElevationLengthPenalty,
    #[default]
    AvgElevationLengthPenalty,
    Ridge,
    Sondheim,
    Cedar,
}

impl FitnessKind {
    pub fn name(&self) -> &'static str {
        match self {
            FitnessKind::Elevation => "elevation",
            FitnessKind::ElevationLengthPenalty => "elevation_length_penalty",
            FitnessKind::AvgElevationLengthPenalty => "avg_elevation_length_penalty",
            FitnessKind::Ridge => "ridge",
            FitnessKind::Sondheim => "sondheim",
            FitnessKind::Cedar => "cedar",
        }
    }
}

impl fmt::Display for FitnessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FitnessKind {
    type Err = CatchmentError;

    fn from_str(s: &str) -> Result<Self> {
        let kind = match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "elevation" => FitnessKind::Elevation,
            "elevation_length_penalty" => FitnessKind::ElevationLengthPenalty,
            "avg_elevation_length_penalty" => FitnessKind::AvgElevationLengthPenalty,
            "ridge" => FitnessKind::Ridge,
            "sondheim" => FitnessKind::Sondheim,
            "cedar" => FitnessKind::Cedar,
            other => return Err(CatchmentError::invalid(format!("unknown fitness '{}'", other))),
        };
        Ok(kind)
    }
}

/// Builds the section fitness named by `config.fitness`.
pub fn section_fitness(tin: &Rc<Tin>, config: &ImproverConfig) -> Rc<dyn SectionFitness> {
    match config.fitness {
        FitnessKind::Elevation => Rc::new(ElevationFitness),
        FitnessKind::ElevationLengthPenalty => Rc::new(ElevationLengthPenaltyFitness),
        FitnessKind::AvgElevationLengthPenalty => Rc::new(AvgElevationLengthPenaltyFitness::default()),
        FitnessKind::Ridge => Rc::new(RidgeFitness::new(Rc::clone(tin))),
        FitnessKind::Sondheim => Rc::new(SondheimFitness::with_constants(Rc::clone(tin), config.sondheim)),
        FitnessKind::Cedar => Rc::new(CedarFitness::with_cache_capacity(
            Rc::clone(tin),
            config.cedar_cache_capacity,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fitness_names_round_trip() {
        for kind in [
            FitnessKind::Elevation,
            FitnessKind::ElevationLengthPenalty,
            FitnessKind::AvgElevationLengthPenalty,
            FitnessKind::Ridge,
            FitnessKind::Sondheim,
            FitnessKind::Cedar,
        ] {
            assert_eq!(kind.name().parse::<FitnessKind>().unwrap(), kind);
        }
        assert_eq!("Avg-Elevation-Length-Penalty".parse::<FitnessKind>().unwrap(), FitnessKind::AvgElevationLengthPenalty);
        assert!("steepest".parse::<FitnessKind>().is_err());
    }

    #[test]
    fn set_fitness_sums_and_averages() {
        let sections = vec![
            Section::new("a", vec![Point3::new(0.0, 0.0, 1.0), Point3::new(1.0, 0.0, 2.0)]),
            Section::new("b", vec![Point3::new(0.0, 1.0, 3.0), Point3::new(1.0, 1.0, 4.0)]),
        ];
        let f = ElevationFitness;
        assert_eq!(f.sum_fitness(&sections).unwrap(), 10.0);
        assert_eq!(f.avg_fitness(&sections).unwrap(), 5.0);
        assert_eq!(f.avg_fitness(&[]).unwrap(), 0.0);
    }
}
