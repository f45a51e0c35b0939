use std::collections::HashSet;
use std::rc::Rc;
use std::time::Instant;

use log::{debug, trace};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::dataset::{CatchmentLines, Junction, Section};
use crate::error::{CatchmentError, Result};
use crate::fitness::{JunctionFitness, SectionFitness};
use crate::geometry::{polyline, Point3};

use super::{
    CancellationToken, CandidatePool, ImprovementContext, ImprovementCoverage, ImprovementMetrics,
    JunctionImprover, JunctionModification, SectionImprover, SectionModification,
};

pub const MAX_TEMPERATURE: f64 = 100.0;

/// Attempts at building a random neighbour route before giving up.
const NEIGHBOUR_TRIES: usize = 10;

/// Linear cooling from [`MAX_TEMPERATURE`] to 0 over `max_steps` steps.
pub fn temperature(step: usize, max_steps: usize) -> f64 {
    if max_steps == 0 {
        return 0.0;
    }
    let elapsed = ((step + 1) as f64 / max_steps as f64).min(1.0);
    MAX_TEMPERATURE * (1.0 - elapsed)
}

/// Probability of moving from a candidate scoring `current` to one scoring
/// `proposed` at temperature `t`.
pub fn accept_probability(current: f64, proposed: f64, t: f64) -> f64 {
    if proposed >= current {
        1.0
    } else if t <= 0.0 {
        0.0
    } else {
        ((proposed - current) / t).exp()
    }
}

fn accepts(rng: &mut ChaCha8Rng, current: f64, proposed: f64, step: usize, steps: usize) -> bool {
    let p = accept_probability(current, proposed, temperature(step, steps));
    p > rng.gen::<f64>()
}

fn check_search(radius: f64, steps: usize) -> Result<()> {
    if !(radius.is_finite() && radius > 0.0) {
        return Err(CatchmentError::invalid(format!("radius must be positive, got {}", radius)));
    }
    if steps == 0 {
        return Err(CatchmentError::invalid("annealing needs at least one step"));
    }
    Ok(())
}

/// Simulated annealing over the interior vertices of a section.
///
/// Each step moves a random vertex to a random mesh vertex within the
/// radius and reroutes a random window around it. Better candidates are
/// always accepted, worse ones with a probability that falls as the run
/// cools. Only accepted candidates are checked for validity, and the result
/// is the fittest candidate that passed.
pub struct SimulatedAnnealingSectionImprover {
    context: ImprovementContext,
    radius: f64,
    steps: usize,
    rng: ChaCha8Rng,
    coverage: ImprovementCoverage,
    cancel: CancellationToken,
}

impl SimulatedAnnealingSectionImprover {
    pub fn new(context: ImprovementContext, radius: f64, steps: usize, seed: u64) -> Result<Self> {
        check_search(radius, steps)?;
        let coverage = ImprovementCoverage::from_vertices(context.tin.vertices());
        Ok(Self {
            context,
            radius,
            steps,
            rng: ChaCha8Rng::seed_from_u64(seed),
            coverage,
            cancel: CancellationToken::default(),
        })
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_coverage(mut self, coverage: ImprovementCoverage) -> Self {
        self.coverage = coverage;
        self
    }

    fn random_neighbour(&mut self, route: &[Point3]) -> Result<Vec<Point3>> {
        let n = route.len();
        for _ in 0..NEIGHBOUR_TRIES {
            let pivot = self.rng.gen_range(0..n);
            let old = route[pivot];
            let new = match self
                .context
                .tin
                .random_vertex_in_radius(&old, self.radius, route, &mut self.rng)
            {
                Ok(p) => p,
                Err(e) if e.is_recoverable() => continue,
                Err(e) => return Err(e),
            };
            let freedom = self.rng.gen_range(0..(n / 2).max(1));
            match self.context.router.reroute(route, &old, &new, freedom, false) {
                Ok(neighbour) => return Ok(neighbour),
                Err(e) if e.is_recoverable() => trace!("no neighbour via ({}, {}): {}", new.x, new.y, e),
                Err(e) => return Err(e),
            }
        }
        Err(CatchmentError::routing("unable to find a neighbour route"))
    }
}

impl SectionImprover for SimulatedAnnealingSectionImprover {
    fn improve_section(&mut self, section: &Section, lines: &CatchmentLines) -> Result<SectionModification> {
        let start = Instant::now();
        let mut metrics = ImprovementMetrics::request();
        let fitness = Rc::clone(&self.context.fitness);
        let checker = Rc::clone(&self.context.checker);

        let original_fit = fitness.fitness(&section.coords)?;
        let mut favoured = section.coords.clone();
        let mut favoured_fit = original_fit;
        let mut validated = CandidatePool::new();
        validated.insert(original_fit, section.coords.clone());

        for step in 0..self.steps {
            self.cancel.check()?;
            metrics.alternatives_tested += 1;
            let neighbour = match self.random_neighbour(&favoured) {
                Ok(route) => route,
                Err(e) if e.is_recoverable() => continue,
                Err(e) => return Err(e),
            };
            self.coverage.increment_total_route(&neighbour, Some(&section.id));

            let fit = fitness.fitness(&neighbour)?;
            let improved = fit > favoured_fit;
            if !improved && !accepts(&mut self.rng, favoured_fit, fit, step, self.steps) {
                trace!("section {}: rejected {} after {}", section.id, fit, favoured_fit);
                continue;
            }
            if !checker.route_valid_wrt_water(&neighbour) {
                trace!("section {}: candidate touches water", section.id);
                continue;
            }
            if !checker.route_valid_wrt_catchments(&neighbour, lines, &[section.id.as_str()]) {
                trace!("section {}: candidate crosses another section", section.id);
                continue;
            }
            self.coverage.increment_valid_route(&neighbour, Some(&section.id));
            metrics.valid_alternatives_tested += 1;

            if improved {
                validated.insert(fit, neighbour.clone());
            }
            favoured = neighbour;
            favoured_fit = fit;
        }

        let mut modification = SectionModification::new(section.clone());
        if let Some((best_fit, best)) = validated.into_best() {
            if !polyline::same_route(&best, &section.coords) {
                debug!("section {} improved from {} to {}", section.id, original_fit, best_fit);
                modification.set_modified(section.with_coords(best))?;
                metrics.improved += 1;
            }
        }
        metrics.stop_clock(start);
        modification.set_metrics(metrics);
        Ok(modification)
    }

    fn section_fitness(&self) -> Rc<dyn SectionFitness> {
        Rc::clone(&self.context.fitness)
    }

    fn set_step_budget(&mut self, steps: usize) {
        self.steps = steps.max(1);
    }

    fn reseed(&mut self, seed: u64) {
        self.rng = ChaCha8Rng::seed_from_u64(seed);
    }

    fn coverage(&self) -> Option<&ImprovementCoverage> {
        Some(&self.coverage)
    }
}

/// Simulated annealing over the position of a junction of degree three or
/// more. Each step moves the junction to a random untested vertex within the
/// radius and reroutes every touching section with a random freedom of five
/// to nine vertices.
pub struct SimulatedAnnealingJunctionImprover {
    context: ImprovementContext,
    junction_fitness: Rc<dyn JunctionFitness>,
    radius: f64,
    steps: usize,
    first_improvement: bool,
    rng: ChaCha8Rng,
    coverage: ImprovementCoverage,
    cancel: CancellationToken,
}

impl SimulatedAnnealingJunctionImprover {
    pub fn new(
        context: ImprovementContext,
        junction_fitness: Rc<dyn JunctionFitness>,
        radius: f64,
        steps: usize,
        seed: u64,
    ) -> Result<Self> {
        check_search(radius, steps)?;
        let coverage = ImprovementCoverage::from_vertices(context.tin.vertices());
        Ok(Self {
            context,
            junction_fitness,
            radius,
            steps,
            first_improvement: false,
            rng: ChaCha8Rng::seed_from_u64(seed),
            coverage,
            cancel: CancellationToken::default(),
        })
    }

    /// Stop at the first validated candidate that beats the original.
    pub fn with_first_improvement(mut self, first_improvement: bool) -> Self {
        self.first_improvement = first_improvement;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_coverage(mut self, coverage: ImprovementCoverage) -> Self {
        self.coverage = coverage;
        self
    }
}

impl JunctionImprover for SimulatedAnnealingJunctionImprover {
    fn improve_junction(&mut self, junction: &Junction, lines: &CatchmentLines) -> Result<JunctionModification> {
        let start = Instant::now();
        let mut metrics = ImprovementMetrics::request();
        let mut modification = JunctionModification::new(junction.clone());
        if junction.degree() < 3 {
            trace!("{} has degree {}, skipped", junction, junction.degree());
            metrics.stop_clock(start);
            modification.set_metrics(metrics);
            return Ok(modification);
        }
        let checker = Rc::clone(&self.context.checker);

        let original_fit = self.junction_fitness.fitness(junction)?;
        let mut favoured = junction.clone();
        let mut favoured_fit = original_fit;
        let mut validated = CandidatePool::new();
        validated.insert(original_fit, junction.clone());
        let mut tested = HashSet::from([junction.point().key()]);

        for step in 0..self.steps {
            self.cancel.check()?;
            metrics.alternatives_tested += 1;
            let centre = *favoured.point();
            let mut exclude = favoured.far_endpoints();
            exclude.push(centre);
            let candidate = match self
                .context
                .tin
                .random_vertex_in_radius(&centre, self.radius, &exclude, &mut self.rng)
            {
                Ok(p) => p,
                Err(e) if e.is_recoverable() => continue,
                Err(e) => return Err(e),
            };
            if !tested.insert(candidate.key()) {
                continue;
            }
            self.coverage.increment_total(&candidate, None);

            let freedom = self.rng.gen_range(5..10);
            let routes: Vec<Vec<Point3>> = favoured
                .touching_sections()
                .iter()
                .map(|s| s.coords.clone())
                .collect();
            let moved = match self.context.router.reroute_all(&routes, &centre, &candidate, freedom) {
                Ok(moved) => moved,
                Err(e) if e.is_recoverable() => {
                    trace!("{}: cannot move to ({}, {}): {}", junction, candidate.x, candidate.y, e);
                    continue;
                }
                Err(e) => return Err(e),
            };
            self.coverage.increment_valid(&candidate, None);
            let sections = favoured
                .touching_sections()
                .iter()
                .zip(moved)
                .map(|(s, route)| s.with_coords(route))
                .collect();
            let neighbour = Junction::new(candidate, sections);

            let fit = self.junction_fitness.fitness(&neighbour)?;
            let improved = fit > favoured_fit;
            if !improved && !accepts(&mut self.rng, favoured_fit, fit, step, self.steps) {
                continue;
            }
            if !checker.sections_valid_wrt_water(neighbour.touching_sections())
                || !checker.sections_valid_wrt_catchments(neighbour.touching_sections(), lines)
            {
                trace!("{}: candidate at ({}, {}) is invalid", junction, candidate.x, candidate.y);
                continue;
            }
            metrics.valid_alternatives_tested += 1;

            let done = improved && self.first_improvement && fit > original_fit;
            if improved {
                validated.insert(fit, neighbour.clone());
            }
            favoured = neighbour;
            favoured_fit = fit;
            if done {
                break;
            }
        }

        if let Some((best_fit, best)) = validated.into_best() {
            if best != *junction {
                debug!("{} improved from {} to {}", junction, original_fit, best_fit);
                modification.set_modified(best)?;
                metrics.improved += 1;
            }
        }
        metrics.stop_clock(start);
        modification.set_metrics(metrics);
        Ok(modification)
    }

    fn set_step_budget(&mut self, steps: usize) {
        self.steps = steps.max(1);
    }

    fn reseed(&mut self, seed: u64) {
        self.rng = ChaCha8Rng::seed_from_u64(seed);
    }

    fn coverage(&self) -> Option<&ImprovementCoverage> {
        Some(&self.coverage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fitness::{AvgElevationLengthPenaltyFitness, SumTouchingJunctionFitness};
    use crate::synthetic;

    #[test]
    fn temperature_cools_linearly() {
        assert_eq!(temperature(0, 4), 75.0);
        assert_eq!(temperature(1, 4), 50.0);
        assert_eq!(temperature(3, 4), 0.0);
        assert_eq!(temperature(9, 4), 0.0);
        assert_eq!(temperature(0, 0), 0.0);
    }

    #[test]
    fn acceptance_probability() {
        assert_eq!(accept_probability(5.0, 6.0, 50.0), 1.0);
        assert_eq!(accept_probability(5.0, 5.0, 0.0), 1.0);
        let p = accept_probability(5.0, 4.0, 10.0);
        assert!(p > 0.0 && p < 1.0);
        assert!((p - (-0.1f64).exp()).abs() < 1e-12);
        assert_eq!(accept_probability(5.0, 4.0, 0.0), 0.0);
        // colder runs accept less
        assert!(accept_probability(5.0, 4.0, 1.0) < p);
        assert!(accept_probability(5.0, 4.0, 1e-3) < 1e-100);
    }

    fn context() -> (ImprovementContext, CatchmentLines) {
        let s = synthetic::ridge_valley().unwrap();
        let fitness: Rc<dyn SectionFitness> = Rc::new(AvgElevationLengthPenaltyFitness::default());
        (ImprovementContext::new(s.tin, s.water, fitness), s.lines)
    }

    #[test]
    fn contract_violations() {
        let (ctx, _) = context();
        assert!(SimulatedAnnealingSectionImprover::new(ctx.clone(), 0.0, 10, 1).is_err());
        assert!(SimulatedAnnealingSectionImprover::new(ctx, 2.0, 0, 1).is_err());
    }

    #[test]
    fn section_result_is_valid_and_no_worse() {
        let (ctx, lines) = context();
        let mut improver = SimulatedAnnealingSectionImprover::new(ctx.clone(), 2.0, 40, 7).unwrap();
        for section in lines.sections() {
            let m = improver.improve_section(section, &lines).unwrap();
            let modified = m.modified();
            assert_eq!(modified.id, section.id);
            assert!(ctx.tin.follows_mesh(&modified.coords));
            assert!(ctx.checker.route_valid_wrt_water(&modified.coords));
            assert!(ctx.checker.route_valid_wrt_catchments(&modified.coords, &lines, &[section.id.as_str()]));
            assert!(modified.has_endpoint(section.first().unwrap()));
            assert!(modified.has_endpoint(section.last().unwrap()));
            let before = ctx.fitness.section_fitness(section).unwrap();
            let after = ctx.fitness.section_fitness(modified).unwrap();
            assert!(after >= before);
            assert_eq!(m.is_modified(), m.metrics().improved == 1);
            assert_eq!(m.metrics().alternatives_tested, 40);
        }
        assert!(improver.coverage().unwrap().total_coverage_fraction() > 0.0);
    }

    #[test]
    fn same_seed_same_result() {
        let (ctx, lines) = context();
        let section = lines.latest("4").unwrap().clone();
        let run = |seed| {
            let mut improver = SimulatedAnnealingSectionImprover::new(ctx.clone(), 2.0, 25, seed).unwrap();
            improver.improve_section(&section, &lines).unwrap().modified().clone()
        };
        assert_eq!(run(3), run(3));
    }

    #[test]
    fn low_degree_junctions_are_left_alone() {
        let (ctx, lines) = context();
        let jf: Rc<dyn JunctionFitness> = Rc::new(SumTouchingJunctionFitness::new(Rc::clone(&ctx.fitness)));
        let mut improver = SimulatedAnnealingJunctionImprover::new(ctx, jf, 2.0, 20, 1).unwrap();
        let end = Point3::new(2.0, 10.0, 0.0);
        let junction = Junction::new(end, lines.sections_touching(&end));
        let m = improver.improve_junction(&junction, &lines).unwrap();
        assert!(!m.is_modified());
        assert_eq!(m.metrics().alternatives_tested, 0);
    }

    #[test]
    fn junction_result_is_valid_and_no_worse() {
        let (ctx, lines) = context();
        let jf: Rc<dyn JunctionFitness> = Rc::new(SumTouchingJunctionFitness::new(Rc::clone(&ctx.fitness)));
        let mut improver = SimulatedAnnealingJunctionImprover::new(ctx.clone(), Rc::clone(&jf), 2.0, 30, 11).unwrap();
        let point = ctx.tin.vertex(&Point3::new(6.0, 10.0, f64::NAN)).unwrap();
        let junction = Junction::new(point, lines.sections_touching(&point));
        assert_eq!(junction.degree(), 3);

        let m = improver.improve_junction(&junction, &lines).unwrap();
        let moved = m.modified();
        assert_eq!(moved.degree(), 3);
        assert!(jf.fitness(moved).unwrap() >= jf.fitness(&junction).unwrap());
        assert!(ctx.checker.sections_valid_wrt_water(moved.touching_sections()));
        assert!(ctx.checker.sections_valid_wrt_catchments(moved.touching_sections(), &lines));
        for s in moved.touching_sections() {
            assert!(s.has_endpoint(moved.point()));
            assert!(ctx.tin.follows_mesh(&s.coords));
        }
    }

    #[test]
    fn junction_next_to_a_short_section() {
        let s = synthetic::spur().unwrap();
        let fitness: Rc<dyn SectionFitness> = Rc::new(AvgElevationLengthPenaltyFitness::default());
        let ctx = ImprovementContext::new(s.tin, s.water, fitness);
        let jf: Rc<dyn JunctionFitness> = Rc::new(SumTouchingJunctionFitness::new(Rc::clone(&ctx.fitness)));
        let point = ctx.tin.vertex(&Point3::new(3.0, 3.0, f64::NAN)).unwrap();
        let junction = Junction::new(point, s.lines.sections_touching(&point));
        let far = Point3::new(4.0, 3.0, 0.0);
        for seed in 0..8 {
            let mut improver =
                SimulatedAnnealingJunctionImprover::new(ctx.clone(), Rc::clone(&jf), 1.5, 40, seed).unwrap();
            let m = improver.improve_junction(&junction, &s.lines).unwrap();
            let moved = m.modified();
            assert!(!moved.point().same_xy(&far));
            assert_eq!(moved.degree(), 3);
            assert!(moved.touching_sections().iter().all(|t| t.coords.len() >= 2));
            assert!(ctx.checker.sections_valid_wrt_water(moved.touching_sections()));
        }
    }

    #[test]
    fn cancelled_runs_stop() {
        let (ctx, lines) = context();
        let token = CancellationToken::new();
        token.cancel();
        let mut improver = SimulatedAnnealingSectionImprover::new(ctx, 2.0, 10, 1)
            .unwrap()
            .with_cancellation(token);
        let err = improver.improve_section(&lines.sections()[0], &lines).unwrap_err();
        assert!(matches!(err, CatchmentError::Cancelled));
    }
}
