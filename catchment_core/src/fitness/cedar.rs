use std::cell::RefCell;
use std::rc::Rc;

use crate::cache::LruCache;
use crate::error::Result;
use crate::geometry::{polyline, CoordKey, Edge, Point3};
use crate::tin::Tin;

use super::{require_elevation, require_elevations, SectionFitness};

pub const DEFAULT_CACHE_SIZE: usize = 1000;

const COLOR_RIDGE: f64 = 2.0;
const COLOR_PARTIAL_RIDGE: f64 = 1.0;
const COLOR_UNDEFINED: f64 = -100.0;
/// Steepest rise (degrees) away from a segment still counted as a partial
/// ridge.
const PARTIAL_RIDGE_MAX_SLOPE: f64 = 2.5;

/// Colours each segment by the terrain on either side and scores
/// `length * colour`. A section scores its length-weighted mean colour.
///
/// Colours: 2 when both sides fall away (ridge), 1 when neither side rises
/// by more than 2.5 degrees (partial ridge), otherwise the segment's mean
/// elevation as a fraction of the highest mesh elevation. Segments without
/// two adjacent triangles are coloured -100.
pub struct CedarFitness {
    tin: Rc<Tin>,
    cache: RefCell<LruCache<(CoordKey, CoordKey), f64>>,
}

impl CedarFitness {
    pub fn new(tin: Rc<Tin>) -> Self {
        Self::with_cache_capacity(tin, DEFAULT_CACHE_SIZE)
    }

    pub fn with_cache_capacity(tin: Rc<Tin>, capacity: usize) -> Self {
        Self {
            tin,
            cache: RefCell::new(LruCache::new(capacity)),
        }
    }

    fn color(&self, base: &Edge) -> Result<f64> {
        let triangles = self.tin.triangles_on_edge(&base.a, &base.b);
        if triangles.len() != 2 {
            return Ok(COLOR_UNDEFINED);
        }
        let alpha = triangles[0].slope_relative_to_base_edge(base)?;
        let beta = triangles[1].slope_relative_to_base_edge(base)?;
        let max_slope = alpha.max(beta);
        Ok(if max_slope < 0.0 {
            COLOR_RIDGE
        } else if max_slope < PARTIAL_RIDGE_MAX_SLOPE {
            COLOR_PARTIAL_RIDGE
        } else {
            (base.a.z + base.b.z) / 2.0 / self.tin.max_elevation()
        })
    }
}

impl SectionFitness for CedarFitness {
    fn segment_fitness(&self, a: &Point3, b: &Point3) -> Result<f64> {
        require_elevation(a)?;
        require_elevation(b)?;
        let base = Edge::new(*a, *b);
        let key = base.key();
        if let Some(&cached) = self.cache.borrow_mut().get(&key) {
            return Ok(cached);
        }
        let fitness = base.length() * self.color(&base)?;
        self.cache.borrow_mut().put(key, fitness);
        Ok(fitness)
    }

    fn fitness(&self, route: &[Point3]) -> Result<f64> {
        require_elevations(route)?;
        let len = polyline::length(route);
        if len == 0.0 {
            return Ok(0.0);
        }
        let mut total = 0.0;
        for (a, b) in polyline::segments(route) {
            total += self.segment_fitness(a, b)?;
        }
        Ok(total / len)
    }
}
