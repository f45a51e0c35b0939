//! Local-search drivers that move boundary vertices and junctions to raise
//! section fitness while keeping every boundary valid.
//!
//! Section and junction improvers work on one target against the current
//! [`CatchmentLines`]; set improvers run them over a whole dataset and
//! return the improved copy. Routing failures and invalid candidates are
//! skipped, every other error aborts the run.

mod annealing;
mod best_in_radius;
mod best_of_n;
mod cancel;
mod coverage;
mod evolution;
mod metrics;
mod modification;
mod radius;

pub use annealing::{
    accept_probability, temperature, SimulatedAnnealingJunctionImprover,
    SimulatedAnnealingSectionImprover, MAX_TEMPERATURE,
};
pub use best_in_radius::BestInRadiusJunctionImprover;
pub use best_of_n::BestOfNSetImprover;
pub use cancel::CancellationToken;
pub use coverage::{CoverageItem, ImprovementCoverage};
pub use evolution::EvolutionSetImprover;
pub use metrics::ImprovementMetrics;
pub use modification::{JunctionModification, SectionModification};
pub use radius::{RadiusJunctionImprover, RadiusSectionImprover, RadiusSetImprover};

use std::rc::Rc;

use crate::config::ImproverConfig;
use crate::dataset::{CatchmentLines, Junction, Section};
use crate::error::Result;
use crate::fitness::{self, JunctionFitness, PartialSumTouchingJunctionFitness, SectionFitness};
use crate::route::{Router, WaterAwareRouter};
use crate::tin::Tin;
use crate::validity::ValidityChecker;
use crate::water::WaterNetwork;

/// Terrain, water and scoring shared by every improver of a run.
#[derive(Clone)]
pub struct ImprovementContext {
    pub tin: Rc<Tin>,
    pub water: Rc<WaterNetwork>,
    pub router: Rc<WaterAwareRouter>,
    pub checker: Rc<ValidityChecker>,
    pub fitness: Rc<dyn SectionFitness>,
}

impl ImprovementContext {
    pub fn new(tin: Rc<Tin>, water: Rc<WaterNetwork>, fitness: Rc<dyn SectionFitness>) -> Self {
        let router = WaterAwareRouter::new(Router::new(Rc::clone(&tin)), Rc::clone(&water));
        Self {
            checker: Rc::new(ValidityChecker::new(Rc::clone(&water))),
            router: Rc::new(router),
            tin,
            water,
            fitness,
        }
    }

    /// Context scoring sections with the strategy named in `config`.
    pub fn from_config(tin: Rc<Tin>, water: Rc<WaterNetwork>, config: &ImproverConfig) -> Self {
        let fitness = fitness::section_fitness(&tin, config);
        Self::new(tin, water, fitness)
    }

    /// Junction fitness over the `k` section vertices nearest each junction.
    pub fn partial_sum_junction_fitness(&self, k: usize) -> Result<Rc<dyn JunctionFitness>> {
        Ok(Rc::new(PartialSumTouchingJunctionFitness::new(Rc::clone(&self.fitness), k)?))
    }
}

/// Improves one section at a time.
pub trait SectionImprover {
    fn improve_section(&mut self, section: &Section, lines: &CatchmentLines) -> Result<SectionModification>;

    fn section_fitness(&self) -> Rc<dyn SectionFitness>;

    /// Sets the number of candidates tried per section, where applicable.
    fn set_step_budget(&mut self, _steps: usize) {}

    fn reseed(&mut self, _seed: u64) {}

    fn coverage(&self) -> Option<&ImprovementCoverage> {
        None
    }
}

/// Improves one junction at a time, moving every touching section with it.
pub trait JunctionImprover {
    fn improve_junction(&mut self, junction: &Junction, lines: &CatchmentLines) -> Result<JunctionModification>;

    fn set_step_budget(&mut self, _steps: usize) {}

    fn reseed(&mut self, _seed: u64) {}

    fn coverage(&self) -> Option<&ImprovementCoverage> {
        None
    }
}

/// Improves a whole dataset.
pub trait SetImprover {
    fn improve(&mut self, lines: &CatchmentLines) -> Result<CatchmentLines>;

    /// Fitness whose set average measures a run's progress.
    fn global_fitness(&self) -> Rc<dyn SectionFitness>;
}

/// Validated candidates of one target ranked by fitness.
#[derive(Debug, Clone)]
pub(crate) struct CandidatePool<T> {
    ranked: Vec<(f64, T)>,
}

impl<T> CandidatePool<T> {
    pub(crate) fn new() -> Self {
        Self { ranked: Vec::new() }
    }

    /// Adds a candidate; among equal fitness the earliest stays first.
    pub(crate) fn insert(&mut self, fitness: f64, candidate: T) {
        let at = self.ranked.partition_point(|(f, _)| *f >= fitness);
        self.ranked.insert(at, (fitness, candidate));
    }

    pub(crate) fn best(&self) -> Option<(f64, &T)> {
        self.ranked.first().map(|(f, c)| (*f, c))
    }

    pub(crate) fn into_best(self) -> Option<(f64, T)> {
        self.ranked.into_iter().next()
    }

    pub(crate) fn len(&self) -> usize {
        self.ranked.len()
    }
}

/// Best-of-N over simulated annealing section and junction improvers, as
/// configured.
pub fn annealing_best_of_n(context: &ImprovementContext, config: &ImproverConfig, seed: u64) -> Result<BestOfNSetImprover> {
    config.validate()?;
    let sections = SimulatedAnnealingSectionImprover::new(context.clone(), config.radius, config.max_tests_per_section, seed)?;
    let junctions = SimulatedAnnealingJunctionImprover::new(
        context.clone(),
        context.partial_sum_junction_fitness(config.partial_sum_k)?,
        config.radius,
        config.tests_per_junction,
        seed.wrapping_add(1),
    )?
    .with_first_improvement(config.first_improvement);
    Ok(BestOfNSetImprover::new(
        Rc::clone(&context.water),
        Box::new(sections),
        Box::new(junctions),
        config,
        seed,
    ))
}
