use std::collections::HashMap;
use std::rc::Rc;
use std::time::Instant;

use log::{debug, info};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::config::ImproverConfig;
use crate::dataset::{CatchmentLines, Junction};
use crate::error::{CatchmentError, Result};
use crate::fitness::SectionFitness;
use crate::geometry::CoordKey;
use crate::water::WaterNetwork;

use super::{CancellationToken, ImprovementMetrics, JunctionImprover, SectionImprover, SetImprover};

/// The first rounds use a growing step budget.
const WARMUP_ROUNDS: usize = 4;

/// Runs N independent improvement trials over a dataset and keeps the
/// fittest result, along with one trial picked at random.
///
/// A trial alternates junction rounds and section rounds. Targets that fail
/// to improve in `no_improvement_threshold` consecutive rounds are skipped
/// for the rest of the trial.
pub struct BestOfNSetImprover {
    water: Rc<WaterNetwork>,
    sections: Box<dyn SectionImprover>,
    junctions: Box<dyn JunctionImprover>,
    trials: usize,
    junction_iterations: usize,
    section_iterations: usize,
    tests_per_junction: usize,
    min_tests_per_section: usize,
    max_tests_per_section: usize,
    no_improvement_threshold: usize,
    rng: ChaCha8Rng,
    cancel: CancellationToken,
    best: Option<CatchmentLines>,
    random: Option<CatchmentLines>,
    metrics: ImprovementMetrics,
}

impl BestOfNSetImprover {
    pub fn new(
        water: Rc<WaterNetwork>,
        sections: Box<dyn SectionImprover>,
        junctions: Box<dyn JunctionImprover>,
        config: &ImproverConfig,
        seed: u64,
    ) -> Self {
        Self {
            water,
            sections,
            junctions,
            trials: config.best_of_n.max(1),
            junction_iterations: config.junction_iterations,
            section_iterations: config.section_iterations,
            tests_per_junction: config.tests_per_junction,
            min_tests_per_section: config.min_tests_per_section,
            max_tests_per_section: config.max_tests_per_section,
            no_improvement_threshold: config.no_improvement_threshold.max(1),
            rng: ChaCha8Rng::seed_from_u64(seed),
            cancel: CancellationToken::default(),
            best: None,
            random: None,
            metrics: ImprovementMetrics::default(),
        }
    }

    pub fn set_trials(&mut self, trials: usize) {
        self.trials = trials.max(1);
    }

    pub fn trials(&self) -> usize {
        self.trials
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Fittest result of the last run, or `None` if no trial beat the input.
    pub fn best_set(&self) -> Option<&CatchmentLines> {
        self.best.as_ref()
    }

    /// The randomly picked trial of the last run.
    pub fn random_set(&self) -> Option<&CatchmentLines> {
        self.random.as_ref()
    }

    /// Metrics merged over every trial run so far.
    pub fn metrics(&self) -> &ImprovementMetrics {
        &self.metrics
    }

    fn section_steps(&self, iteration: usize) -> usize {
        if iteration < WARMUP_ROUNDS {
            (self.min_tests_per_section * (iteration + 1))
                .min(self.max_tests_per_section)
                .max(1)
        } else {
            self.max_tests_per_section
        }
    }

    fn trial(&mut self, lines: &CatchmentLines) -> Result<CatchmentLines> {
        let mut working = lines.copy();
        let mut junction_failures: HashMap<CoordKey, usize> = HashMap::new();
        let mut section_failures: HashMap<String, usize> = HashMap::new();

        self.junctions.set_step_budget(self.tests_per_junction);
        for iteration in 0..self.junction_iterations {
            let mut requests = 0;
            let mut improved = 0;
            for p in working.junctions(&self.water) {
                self.cancel.check()?;
                let failures = junction_failures.entry(p.key()).or_insert(0);
                if *failures >= self.no_improvement_threshold {
                    continue;
                }
                let junction = Junction::new(p, working.sections_touching(&p));
                let m = self.junctions.improve_junction(&junction, &working)?;
                self.metrics.merge(m.metrics());
                requests += 1;
                if m.is_modified() {
                    improved += 1;
                    for s in m.modified().touching_sections() {
                        working.add_or_update(s.clone())?;
                    }
                    // the junction now lives at a new key
                    junction_failures.insert(m.modified().point().key(), 0);
                } else {
                    *failures += 1;
                }
            }
            debug!("junction round {}: {} of {} improved", iteration, improved, requests);
            if requests == 0 || improved == 0 {
                break;
            }
        }

        let ids: Vec<String> = working.originals().iter().map(|s| s.id.clone()).collect();
        for iteration in 0..self.section_iterations {
            self.sections.set_step_budget(self.section_steps(iteration));
            let mut requests = 0;
            let mut improved = 0;
            for id in &ids {
                self.cancel.check()?;
                let failures = section_failures.entry(id.clone()).or_insert(0);
                if *failures >= self.no_improvement_threshold {
                    continue;
                }
                let section = working
                    .latest(id)
                    .cloned()
                    .ok_or_else(|| CatchmentError::inconsistent(format!("section {} disappeared", id)))?;
                let m = self.sections.improve_section(&section, &working)?;
                self.metrics.merge(m.metrics());
                requests += 1;
                if m.is_modified() {
                    improved += 1;
                    *failures = 0;
                    working.add_or_update(m.modified().clone())?;
                } else {
                    *failures += 1;
                }
            }
            debug!("section round {}: {} of {} improved", iteration, improved, requests);
            if requests == 0 || improved == 0 {
                break;
            }
        }
        Ok(working)
    }
}

impl SetImprover for BestOfNSetImprover {
    fn improve(&mut self, lines: &CatchmentLines) -> Result<CatchmentLines> {
        let start = Instant::now();
        let fitness = self.global_fitness();
        let initial = fitness.avg_fitness(lines.sections())?;
        let random_idx = self.rng.gen_range(0..self.trials);
        self.best = None;
        self.random = None;

        let mut best_fit = initial;
        for n in 0..self.trials {
            self.sections.reseed(self.rng.gen());
            self.junctions.reseed(self.rng.gen());
            let result = self.trial(lines)?;
            let fit = fitness.avg_fitness(result.sections())?;
            debug!("trial {} of {}: fitness {}", n + 1, self.trials, fit);
            if fit > best_fit {
                best_fit = fit;
                self.best = Some(result.copy());
            }
            if n == random_idx {
                self.random = Some(result);
            }
        }
        info!(
            "best of {}: fitness {} -> {} in {} ms",
            self.trials,
            initial,
            best_fit,
            start.elapsed().as_millis()
        );
        Ok(match &self.best {
            Some(best) => best.copy(),
            None => lines.copy(),
        })
    }

    fn global_fitness(&self) -> Rc<dyn SectionFitness> {
        self.sections.section_fitness()
    }
}
