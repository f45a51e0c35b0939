use std::rc::Rc;

use log::{debug, info};

use crate::config::ImproverConfig;
use crate::dataset::CatchmentLines;
use crate::error::{CatchmentError, Result};
use crate::fitness::SectionFitness;

use super::{BestOfNSetImprover, ImprovementMetrics, SetImprover};

/// Two-parent evolution over best-of-N broods.
///
/// Each generation both parents raise a brood of `children / 2` trials. The
/// fittest child of either brood becomes the first parent of the next
/// generation and a random child of the other brood the second, so the
/// search keeps some diversity while the first parent never gets worse.
pub struct EvolutionSetImprover {
    first: BestOfNSetImprover,
    second: BestOfNSetImprover,
    generations: usize,
    stop_early: bool,
    history: Vec<f64>,
}

impl EvolutionSetImprover {
    pub fn new(mut first: BestOfNSetImprover, mut second: BestOfNSetImprover, config: &ImproverConfig) -> Result<Self> {
        let children = config.children_per_generation;
        if children < 2 || children % 2 != 0 {
            return Err(CatchmentError::invalid(format!(
                "children per generation must be even and at least 2, got {}",
                children
            )));
        }
        first.set_trials(children / 2);
        second.set_trials(children / 2);
        Ok(Self {
            first,
            second,
            generations: config.generations,
            stop_early: config.stop_early,
            history: Vec::new(),
        })
    }

    /// Fitness of the first parent after each completed generation.
    pub fn history(&self) -> &[f64] {
        &self.history
    }

    /// Metrics of both broods merged.
    pub fn metrics(&self) -> ImprovementMetrics {
        let mut metrics = *self.first.metrics();
        metrics.merge(self.second.metrics());
        metrics
    }
}

impl SetImprover for EvolutionSetImprover {
    fn improve(&mut self, lines: &CatchmentLines) -> Result<CatchmentLines> {
        let fitness = self.global_fitness();
        let mut parent1 = lines.copy();
        let mut parent2 = lines.copy();
        self.history.clear();

        for generation in 0..self.generations {
            let child1 = self.first.improve(&parent1)?;
            let child2 = self.second.improve(&parent2)?;
            if self.first.best_set().is_none() && self.second.best_set().is_none() {
                debug!("generation {}: no child beat its parent", generation);
                if self.stop_early {
                    break;
                }
                continue;
            }

            let fit1 = fitness.avg_fitness(child1.sections())?;
            let fit2 = fitness.avg_fitness(child2.sections())?;
            let (best, other_random) = if fit1 >= fit2 {
                (child1, self.second.random_set())
            } else {
                (child2, self.first.random_set())
            };
            parent2 = match other_random {
                Some(random) => random.copy(),
                None => parent2,
            };
            parent1 = best;
            let fit = fit1.max(fit2);
            self.history.push(fit);
            debug!("generation {}: best fitness {}", generation, fit);
        }

        info!(
            "evolution finished after {} improving generations",
            self.history.len()
        );
        Ok(parent1)
    }

    fn global_fitness(&self) -> Rc<dyn SectionFitness> {
        self.first.global_fitness()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::improvement::{annealing_best_of_n, ImprovementContext};
    use crate::synthetic;

    fn config() -> ImproverConfig {
        ImproverConfig {
            children_per_generation: 2,
            generations: 2,
            section_iterations: 2,
            max_tests_per_section: 6,
            tests_per_junction: 6,
            ..ImproverConfig::default()
        }
    }

    fn evolution(ctx: &ImprovementContext, config: &ImproverConfig) -> Result<EvolutionSetImprover> {
        EvolutionSetImprover::new(
            annealing_best_of_n(ctx, config, config.seed)?,
            annealing_best_of_n(ctx, config, config.seed.wrapping_add(100))?,
            config,
        )
    }

    #[test]
    fn odd_brood_sizes_are_rejected() {
        let s = synthetic::crest().unwrap();
        let config = config();
        let ctx = ImprovementContext::from_config(Rc::clone(&s.tin), Rc::clone(&s.water), &config);
        let bad = ImproverConfig {
            children_per_generation: 3,
            ..config.clone()
        };
        let result = EvolutionSetImprover::new(
            annealing_best_of_n(&ctx, &config, 1).unwrap(),
            annealing_best_of_n(&ctx, &config, 2).unwrap(),
            &bad,
        );
        assert!(matches!(result, Err(CatchmentError::InvalidInput(_))));
    }

    #[test]
    fn broods_are_split_evenly() {
        let s = synthetic::crest().unwrap();
        let config = ImproverConfig {
            children_per_generation: 6,
            ..config()
        };
        let ctx = ImprovementContext::from_config(Rc::clone(&s.tin), Rc::clone(&s.water), &config);
        let evolution = evolution(&ctx, &config).unwrap();
        assert_eq!(evolution.first.trials(), 3);
        assert_eq!(evolution.second.trials(), 3);
    }

    #[test]
    fn first_parent_never_gets_worse() {
        let s = synthetic::ridge_valley().unwrap();
        let config = config();
        let ctx = ImprovementContext::from_config(Rc::clone(&s.tin), Rc::clone(&s.water), &config);
        let mut evolution = evolution(&ctx, &config).unwrap();
        let result = evolution.improve(&s.lines).unwrap();

        let fitness = evolution.global_fitness();
        let before = fitness.avg_fitness(s.lines.sections()).unwrap();
        assert!(fitness.avg_fitness(result.sections()).unwrap() >= before);
        assert!(evolution.history().windows(2).all(|w| w[1] >= w[0]));
        assert!(ctx.checker.sections_valid_wrt_water(result.sections()));
        assert!(ctx.checker.sections_valid_wrt_catchments(result.sections(), &result));
        assert!(evolution.metrics().improvement_requests > 0);
    }

    #[test]
    fn optimal_input_stops_early() {
        let s = synthetic::crest().unwrap();
        let config = config();
        let ctx = ImprovementContext::from_config(Rc::clone(&s.tin), Rc::clone(&s.water), &config);
        let mut evolution = evolution(&ctx, &config).unwrap();
        let result = evolution.improve(&s.lines).unwrap();
        assert_eq!(result.sections(), s.lines.sections());
        assert!(evolution.history().is_empty());
    }
}
