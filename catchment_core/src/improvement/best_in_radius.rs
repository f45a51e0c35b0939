use std::rc::Rc;
use std::time::Instant;

use log::{debug, trace};

use crate::dataset::{CatchmentLines, Junction};
use crate::error::{CatchmentError, Result};
use crate::fitness::JunctionFitness;
use crate::geometry::polyline;

use super::{
    CancellationToken, ImprovementContext, ImprovementMetrics, JunctionImprover, JunctionModification,
};

/// Rerouting freedoms tried for every candidate position.
const FREEDOMS: [usize; 5] = [1, 3, 5, 7, 9];

/// Exhaustive junction search: every mesh vertex within the radius is tried
/// with every freedom and the fittest valid placement wins.
pub struct BestInRadiusJunctionImprover {
    context: ImprovementContext,
    junction_fitness: Rc<dyn JunctionFitness>,
    radius: f64,
    cancel: CancellationToken,
}

impl BestInRadiusJunctionImprover {
    pub fn new(context: ImprovementContext, junction_fitness: Rc<dyn JunctionFitness>, radius: f64) -> Result<Self> {
        if !(radius.is_finite() && radius > 0.0) {
            return Err(CatchmentError::invalid(format!("radius must be positive, got {}", radius)));
        }
        Ok(Self {
            context,
            junction_fitness,
            radius,
            cancel: CancellationToken::default(),
        })
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

impl JunctionImprover for BestInRadiusJunctionImprover {
    fn improve_junction(&mut self, junction: &Junction, lines: &CatchmentLines) -> Result<JunctionModification> {
        let start = Instant::now();
        let mut metrics = ImprovementMetrics::request();
        let mut modification = JunctionModification::new(junction.clone());
        if junction.degree() == 0 {
            metrics.stop_clock(start);
            modification.set_metrics(metrics);
            return Ok(modification);
        }

        let point = *junction.point();
        let far = junction.far_endpoints();
        let routes: Vec<_> = junction.touching_sections().iter().map(|s| s.coords.clone()).collect();
        let candidates: Vec<_> = self
            .context
            .tin
            .vertices_in_radius(&point, self.radius)?
            .into_iter()
            .filter(|v| !v.same_xy(&point) && !polyline::contains(&far, v))
            .collect();

        let mut best_fit = self.junction_fitness.fitness(junction)?;
        let mut best: Option<Junction> = None;
        for freedom in FREEDOMS {
            for candidate in &candidates {
                self.cancel.check()?;
                metrics.alternatives_tested += 1;
                let moved = match self.context.router.reroute_all(&routes, &point, candidate, freedom) {
                    Ok(moved) => moved,
                    Err(e) if e.is_recoverable() => continue,
                    Err(e) => return Err(e),
                };
                let sections = junction
                    .touching_sections()
                    .iter()
                    .zip(moved)
                    .map(|(s, route)| s.with_coords(route))
                    .collect();
                let alternative = Junction::new(*candidate, sections);
                let fit = self.junction_fitness.fitness(&alternative)?;
                if fit <= best_fit {
                    continue;
                }
                if !self.context.checker.sections_valid_wrt_water(alternative.touching_sections())
                    || !self
                        .context
                        .checker
                        .sections_valid_wrt_catchments(alternative.touching_sections(), lines)
                {
                    trace!("{}: ({}, {}) is invalid", junction, candidate.x, candidate.y);
                    continue;
                }
                metrics.valid_alternatives_tested += 1;
                best_fit = fit;
                best = Some(alternative);
            }
        }

        if let Some(best) = best {
            debug!("{} moved to ({}, {}), fitness {}", junction, best.point().x, best.point().y, best_fit);
            modification.set_modified(best)?;
            metrics.improved += 1;
        }
        metrics.stop_clock(start);
        modification.set_metrics(metrics);
        Ok(modification)
    }
}
