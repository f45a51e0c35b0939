use std::cmp::Ordering;
use std::rc::Rc;
use std::time::Instant;

use log::{debug, info, trace};

use crate::dataset::{CatchmentLines, Junction, Section};
use crate::error::{CatchmentError, Result};
use crate::fitness::SectionFitness;
use crate::geometry::{polyline, Point3};

use super::{
    ImprovementContext, ImprovementMetrics, JunctionImprover, JunctionModification, SectionImprover,
    SectionModification, SetImprover,
};

fn check_radius(radius: f64) -> Result<()> {
    if radius.is_finite() && radius > 0.0 {
        Ok(())
    } else {
        Err(CatchmentError::invalid(format!("radius must be positive, got {}", radius)))
    }
}

fn by_descending_elevation(a: &Point3, b: &Point3) -> Ordering {
    b.z.partial_cmp(&a.z).unwrap_or(Ordering::Equal)
}

/// Greedy uphill walk along a section.
///
/// Vertices are visited from the confluence end. Each movable vertex is
/// replaced by the highest vertex within the radius that can still be
/// reached from the route built so far, provided it is no closer to a later
/// vertex than to the one it replaces.
pub struct RadiusSectionImprover {
    context: ImprovementContext,
    radius: f64,
}

impl RadiusSectionImprover {
    pub fn new(context: ImprovementContext, radius: f64) -> Result<Self> {
        check_radius(radius)?;
        Ok(Self { context, radius })
    }

    fn is_fixed(&self, route: &[Point3], i: usize) -> bool {
        let water = self.context.router.water();
        let lo = i.saturating_sub(1);
        let hi = (i + 1).min(route.len() - 1);
        i == 0 || i == route.len() - 1 || route[lo..=hi].iter().any(|p| water.is_confluence(p))
    }

    /// Higher vertices around `route[i]`, highest first.
    fn alternatives(&self, route: &[Point3], i: usize) -> Result<Vec<Point3>> {
        let current = route[i];
        let uninspected = &route[i + 1..];
        let mut found: Vec<Point3> = self
            .context
            .tin
            .vertices_in_radius(&current, self.radius)?
            .into_iter()
            .filter(|v| v.z > current.z)
            .filter(|v| {
                let d = v.distance_2d(&current);
                uninspected.iter().all(|c| v.distance_2d(c) >= d)
            })
            .collect();
        found.sort_by(by_descending_elevation);
        Ok(found)
    }

    fn climb(&self, route: &[Point3], metrics: &mut ImprovementMetrics) -> Result<Vec<Point3>> {
        let router = &self.context.router;
        let mut picked: Vec<Point3> = Vec::with_capacity(route.len());
        for i in 0..route.len() {
            let mut keep = route[i];
            if !self.is_fixed(route, i) {
                for alt in self.alternatives(route, i)? {
                    if polyline::contains(&picked, &alt) {
                        continue;
                    }
                    metrics.alternatives_tested += 1;
                    let mut required = picked.clone();
                    required.push(alt);
                    match router.make_route(&required) {
                        Ok(_) => {
                            metrics.valid_alternatives_tested += 1;
                            keep = alt;
                            break;
                        }
                        Err(e) if e.is_recoverable() => continue,
                        Err(e) => return Err(e),
                    }
                }
            }
            if picked.last().map_or(true, |last| !last.same_xy(&keep)) {
                picked.push(keep);
            }
        }
        router.make_route(&picked)
    }
}

impl SectionImprover for RadiusSectionImprover {
    fn improve_section(&mut self, section: &Section, lines: &CatchmentLines) -> Result<SectionModification> {
        let start = Instant::now();
        let mut metrics = ImprovementMetrics::request();
        let mut modification = SectionModification::new(section.clone());

        let mut route = section.coords.clone();
        let reversed = route
            .first()
            .map_or(false, |p| !self.context.water.is_confluence(p));
        if reversed {
            route.reverse();
        }
        let climbed = match self.climb(&route, &mut metrics) {
            Ok(climbed) => Some(climbed),
            Err(e) if e.is_recoverable() => {
                trace!("section {}: {}", section.id, e);
                None
            }
            Err(e) => return Err(e),
        };

        if let Some(mut climbed) = climbed {
            if reversed {
                climbed.reverse();
            }
            let valid = self
                .context
                .checker
                .route_valid_wrt_catchments(&climbed, lines, &[section.id.as_str()]);
            if valid && !polyline::same_route(&climbed, &section.coords) {
                let before = self.context.fitness.section_fitness(section)?;
                let after = self.context.fitness.fitness(&climbed)?;
                if after > before {
                    debug!("section {} climbed from {} to {}", section.id, before, after);
                    modification.set_modified(section.with_coords(climbed))?;
                    metrics.improved += 1;
                }
            }
        }
        metrics.stop_clock(start);
        modification.set_metrics(metrics);
        Ok(modification)
    }

    fn section_fitness(&self) -> Rc<dyn SectionFitness> {
        Rc::clone(&self.context.fitness)
    }
}

/// Moves a junction to the higher vertex within the radius that gives the
/// touching sections the largest summed fitness.
pub struct RadiusJunctionImprover {
    context: ImprovementContext,
    radius: f64,
}

impl RadiusJunctionImprover {
    pub fn new(context: ImprovementContext, radius: f64) -> Result<Self> {
        check_radius(radius)?;
        Ok(Self { context, radius })
    }
}

impl JunctionImprover for RadiusJunctionImprover {
    fn improve_junction(&mut self, junction: &Junction, lines: &CatchmentLines) -> Result<JunctionModification> {
        let start = Instant::now();
        let mut metrics = ImprovementMetrics::request();
        let mut modification = JunctionModification::new(junction.clone());

        let point = *junction.point();
        let far = junction.far_endpoints();
        let routes: Vec<_> = junction.touching_sections().iter().map(|s| s.coords.clone()).collect();
        let mut candidates: Vec<Point3> = self
            .context
            .tin
            .vertices_in_radius(&point, self.radius)?
            .into_iter()
            .filter(|v| v.z > point.z && !polyline::contains(&far, v))
            .collect();
        candidates.sort_by(by_descending_elevation);

        let fitness = &self.context.fitness;
        let checker = &self.context.checker;
        let mut best_score = fitness.sum_fitness(junction.touching_sections())?;
        let mut best: Option<Junction> = None;
        for candidate in candidates {
            metrics.alternatives_tested += 1;
            let moved = match self.context.router.router().move_junction(&routes, &point, &candidate, 1) {
                Ok(moved) => moved,
                Err(e) if e.is_recoverable() => continue,
                Err(e) => return Err(e),
            };
            let sections: Vec<Section> = junction
                .touching_sections()
                .iter()
                .zip(moved)
                .map(|(s, route)| s.with_coords(route))
                .collect();
            if !checker.sections_valid_wrt_water(&sections) || !checker.sections_valid_wrt_catchments(&sections, lines) {
                continue;
            }
            metrics.valid_alternatives_tested += 1;
            let score = fitness.sum_fitness(&sections)?;
            if score > best_score {
                best_score = score;
                best = Some(Junction::new(candidate, sections));
            }
        }

        if let Some(best) = best {
            debug!("{} moved uphill, fitness {}", junction, best_score);
            modification.set_modified(best)?;
            metrics.improved += 1;
        }
        metrics.stop_clock(start);
        modification.set_metrics(metrics);
        Ok(modification)
    }
}

/// One deterministic uphill pass over a dataset: junctions first when
/// enabled, then sections touching a confluence, then the rest.
pub struct RadiusSetImprover {
    context: ImprovementContext,
    sections: RadiusSectionImprover,
    junctions: RadiusJunctionImprover,
    move_junctions: bool,
    metrics: ImprovementMetrics,
}

impl RadiusSetImprover {
    pub fn new(context: ImprovementContext, radius: f64, move_junctions: bool) -> Result<Self> {
        Ok(Self {
            sections: RadiusSectionImprover::new(context.clone(), radius)?,
            junctions: RadiusJunctionImprover::new(context.clone(), radius)?,
            context,
            move_junctions,
            metrics: ImprovementMetrics::default(),
        })
    }

    /// Section and junction metrics merged over every run so far.
    pub fn metrics(&self) -> &ImprovementMetrics {
        &self.metrics
    }
}

impl SetImprover for RadiusSetImprover {
    fn improve(&mut self, lines: &CatchmentLines) -> Result<CatchmentLines> {
        let mut working = lines.copy();
        let water = Rc::clone(&self.context.water);

        if self.move_junctions {
            for p in working.junctions(&water) {
                let touching = working.sections_touching(&p);
                if touching.len() < 3 {
                    continue;
                }
                let m = self.junctions.improve_junction(&Junction::new(p, touching), &working)?;
                self.metrics.merge(m.metrics());
                if m.is_modified() {
                    for s in m.modified().touching_sections() {
                        working.add_or_update(s.clone())?;
                    }
                }
            }
        }

        let mut ordered = Vec::with_capacity(working.len());
        let mut rest = Vec::new();
        for s in working.sections() {
            if CatchmentLines::ends_touching_confluence(s, &water) > 0 {
                ordered.push(s.id.clone());
            } else {
                rest.push(s.id.clone());
            }
        }
        ordered.extend(rest);

        for id in ordered {
            let Some(section) = working.latest(&id).cloned() else {
                continue;
            };
            let m = self.sections.improve_section(&section, &working)?;
            self.metrics.merge(m.metrics());
            if m.is_modified() {
                working.add_or_update(m.modified().clone())?;
            }
        }
        info!(
            "radius pass: {} of {} requests improved",
            self.metrics.improved, self.metrics.improvement_requests
        );
        Ok(working)
    }

    fn global_fitness(&self) -> Rc<dyn SectionFitness> {
        Rc::clone(&self.context.fitness)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fitness::AvgElevationLengthPenaltyFitness;
    use crate::synthetic::{self, Scenario};

    fn context(s: &Scenario) -> ImprovementContext {
        let fitness: Rc<dyn SectionFitness> = Rc::new(AvgElevationLengthPenaltyFitness::default());
        ImprovementContext::new(Rc::clone(&s.tin), Rc::clone(&s.water), fitness)
    }

    #[test]
    fn crest_has_nowhere_higher_to_go() {
        let s = synthetic::crest().unwrap();
        let mut improver = RadiusSectionImprover::new(context(&s), 2.0).unwrap();
        let m = improver.improve_section(&s.lines.sections()[0], &s.lines).unwrap();
        assert!(!m.is_modified());
        assert_eq!(m.metrics().alternatives_tested, 0);
    }

    #[test]
    fn sections_only_change_when_fitter() {
        let s = synthetic::ridge_valley().unwrap();
        let ctx = context(&s);
        let mut improver = RadiusSectionImprover::new(ctx.clone(), 2.0).unwrap();
        for section in s.lines.sections() {
            let m = improver.improve_section(section, &s.lines).unwrap();
            let modified = m.modified();
            if m.is_modified() {
                assert!(ctx.fitness.section_fitness(modified).unwrap() > ctx.fitness.section_fitness(section).unwrap());
            }
            assert_eq!(modified.first(), section.first());
            assert_eq!(modified.last(), section.last());
            assert!(ctx.tin.follows_mesh(&modified.coords));
            assert!(ctx.checker.route_valid_wrt_water(&modified.coords));
        }
    }

    #[test]
    fn junction_moves_uphill_or_stays() {
        let s = synthetic::ridge_valley().unwrap();
        let ctx = context(&s);
        let point = s.tin.vertex(&Point3::new(6.0, 10.0, f64::NAN)).unwrap();
        let junction = Junction::new(point, s.lines.sections_touching(&point));
        let mut improver = RadiusJunctionImprover::new(ctx.clone(), 2.0).unwrap();
        let m = improver.improve_junction(&junction, &s.lines).unwrap();
        if m.is_modified() {
            assert!(m.modified().point().z > point.z);
            let before = ctx.fitness.sum_fitness(junction.touching_sections()).unwrap();
            let after = ctx.fitness.sum_fitness(m.modified().touching_sections()).unwrap();
            assert!(after > before);
        }
        assert_eq!(m.modified().degree(), 3);
    }

    #[test]
    fn junction_stays_off_the_end_of_a_short_section() {
        let s = synthetic::spur().unwrap();
        let ctx = context(&s);
        let point = s.tin.vertex(&Point3::new(3.0, 3.0, f64::NAN)).unwrap();
        let junction = Junction::new(point, s.lines.sections_touching(&point));
        let mut improver = RadiusJunctionImprover::new(ctx.clone(), 1.5).unwrap();
        let m = improver.improve_junction(&junction, &s.lines).unwrap();
        let moved = m.modified();
        assert!(!moved.point().same_xy(&Point3::new(4.0, 3.0, 0.0)));
        assert!(moved.touching_sections().iter().all(|t| t.coords.len() >= 2));
        assert!(ctx.checker.sections_valid_wrt_catchments(moved.touching_sections(), &s.lines));
    }

    #[test]
    fn set_pass_never_lowers_the_average() {
        let s = synthetic::ridge_valley().unwrap();
        let ctx = context(&s);
        let mut improver = RadiusSetImprover::new(ctx.clone(), 2.0, true).unwrap();
        let improved = improver.improve(&s.lines).unwrap();

        assert_eq!(improved.len(), s.lines.len());
        let before = ctx.fitness.avg_fitness(s.lines.sections()).unwrap();
        let after = ctx.fitness.avg_fitness(improved.sections()).unwrap();
        assert!(after >= before);
        assert!(ctx.checker.sections_valid_wrt_water(improved.sections()));
        assert!(ctx.checker.sections_valid_wrt_catchments(improved.sections(), &improved));
        // the input is left untouched
        assert_eq!(s.lines.sections(), synthetic::ridge_valley().unwrap().lines.sections());
        assert!(improver.metrics().improvement_requests >= 5);
    }

    #[test]
    fn rejects_bad_radius() {
        let s = synthetic::crest().unwrap();
        assert!(RadiusSetImprover::new(context(&s), f64::NAN, false).is_err());
    }
}
