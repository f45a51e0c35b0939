//! Water-course network and confluence detection.

use std::cell::RefCell;
use std::collections::HashSet;

use rstar::primitives::{GeomWithData, Line};
use rstar::RTree;

use crate::cache::LruCache;
use crate::error::{CatchmentError, Result};
use crate::geometry::{
    point_on_segment, segment_envelope, segment_intersection, CoordKey, Point3,
    SegmentIntersection, TOLERANCE,
};

/// Default number of confluence answers kept in the lookup cache.
pub const DEFAULT_CONFLUENCE_CACHE_SIZE: usize = 1000;

/// A water segment tagged with `(line index, segment index)`.
type IndexedSegment = GeomWithData<Line<[f64; 2]>, (usize, usize)>;

/// Water polylines with a segment index and a cached confluence test.
#[derive(Debug)]
pub struct WaterNetwork {
    lines: Vec<Vec<Point3>>,
    index: RTree<IndexedSegment>,
    confluence_cache: RefCell<LruCache<CoordKey, bool>>,
}

impl WaterNetwork {
    pub fn new(lines: Vec<Vec<Point3>>) -> Result<Self> {
        Self::with_cache_capacity(lines, DEFAULT_CONFLUENCE_CACHE_SIZE)
    }

    pub fn with_cache_capacity(lines: Vec<Vec<Point3>>, capacity: usize) -> Result<Self> {
        let mut segments = Vec::new();
        for (li, line) in lines.iter().enumerate() {
            if line.len() < 2 {
                return Err(CatchmentError::invalid(format!(
                    "water line {} needs at least two coordinates",
                    li
                )));
            }
            for (si, w) in line.windows(2).enumerate() {
                segments.push(GeomWithData::new(Line::new(w[0].xy(), w[1].xy()), (li, si)));
            }
        }
        Ok(Self {
            lines,
            index: RTree::bulk_load(segments),
            confluence_cache: RefCell::new(LruCache::new(capacity)),
        })
    }

    pub fn lines(&self) -> &[Vec<Point3>] {
        &self.lines
    }

    fn segment(&self, (li, si): (usize, usize)) -> (Point3, Point3) {
        (self.lines[li][si], self.lines[li][si + 1])
    }

    fn segments_near(&self, a: &Point3, b: &Point3) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.index
            .locate_in_envelope_intersecting(&segment_envelope(a, b, TOLERANCE))
            .map(|s| s.data)
    }

    /// Water segments passing through `p`.
    pub fn touching_segments(&self, p: &Point3) -> Vec<(Point3, Point3)> {
        self.segments_near(p, p)
            .map(|id| self.segment(id))
            .filter(|(a, b)| point_on_segment(p, a, b))
            .collect()
    }

    /// Returns `true` if `p` lies anywhere on the water network.
    pub fn is_on_water(&self, p: &Point3) -> bool {
        !self.touching_segments(p).is_empty()
    }

    /// Returns `true` if the segment `a b` runs along a water segment for a
    /// stretch of positive length.
    pub fn overlaps_segment(&self, a: &Point3, b: &Point3) -> bool {
        self.segments_near(a, b).any(|id| {
            let (c, d) = self.segment(id);
            segment_intersection(a, b, &c, &d) == SegmentIntersection::Overlap
        })
    }

    /// Returns `true` if at least three water lines start or end at `p`.
    pub fn is_confluence(&self, p: &Point3) -> bool {
        let key = p.key();
        if let Some(&hit) = self.confluence_cache.borrow_mut().get(&key) {
            return hit;
        }
        let lines: HashSet<usize> = self.segments_near(p, p).map(|(li, _)| li).collect();
        let ends = lines
            .into_iter()
            .filter(|&li| {
                let line = &self.lines[li];
                line[0].same_xy(p) || line[line.len() - 1].same_xy(p)
            })
            .count();
        let confluence = ends >= 3;
        self.confluence_cache.borrow_mut().put(key, confluence);
        confluence
    }

    /// Every distinct confluence of the network, in order of first appearance.
    pub fn confluences(&self) -> Vec<Point3> {
        let mut seen = HashSet::new();
        let mut found = Vec::new();
        for line in &self.lines {
            for end in [line[0], line[line.len() - 1]] {
                if seen.insert(end.key()) && self.is_confluence(&end) {
                    found.push(end);
                }
            }
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(coords: &[(f64, f64)]) -> Vec<Point3> {
        coords.iter().map(|&(x, y)| Point3::new(x, y, 10.0)).collect()
    }

    /// Two tributaries joining a main stem at (7, 1).
    fn network() -> WaterNetwork {
        WaterNetwork::new(vec![
            line(&[(7.0, 0.0), (7.0, 1.0)]),
            line(&[(8.0, 0.0), (7.0, 1.0)]),
            line(&[(7.0, 1.0), (7.0, 5.0), (8.0, 9.0)]),
        ])
        .unwrap()
    }

    #[test]
    fn confluence_needs_three_line_ends() {
        let water = network();
        assert!(water.is_confluence(&Point3::new(7.0, 1.0, 0.0)));
        // cached answer
        assert!(water.is_confluence(&Point3::new(7.0, 1.0, 0.0)));
        assert!(!water.is_confluence(&Point3::new(7.0, 5.0, 0.0)));
        assert!(!water.is_confluence(&Point3::new(8.0, 9.0, 0.0)));
        assert!(!water.is_confluence(&Point3::new(3.0, 3.0, 0.0)));
        assert_eq!(water.confluences(), vec![Point3::new(7.0, 1.0, 10.0)]);
    }

    #[test]
    fn points_on_water() {
        let water = network();
        assert!(water.is_on_water(&Point3::new(7.0, 3.0, 0.0)));
        assert!(water.is_on_water(&Point3::new(8.0, 9.0, 0.0)));
        assert!(!water.is_on_water(&Point3::new(6.0, 3.0, 0.0)));
        assert_eq!(water.touching_segments(&Point3::new(7.0, 1.0, 0.0)).len(), 3);
    }

    #[test]
    fn overlapping_segments() {
        let water = network();
        assert!(water.overlaps_segment(&Point3::new(7.0, 2.0, 0.0), &Point3::new(7.0, 4.0, 0.0)));
        // crossing is not running along
        assert!(!water.overlaps_segment(&Point3::new(6.0, 3.0, 0.0), &Point3::new(8.0, 3.0, 0.0)));
    }

    #[test]
    fn short_lines_are_rejected() {
        let err = WaterNetwork::new(vec![line(&[(0.0, 0.0)])]).unwrap_err();
        assert!(matches!(err, CatchmentError::InvalidInput(_)));
    }
}
