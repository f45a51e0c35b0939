//! Boundary sections, junctions and the working set of catchment lines.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use log::trace;
use rstar::primitives::{GeomWithData, Line};
use rstar::RTree;
use serde::{Deserialize, Serialize};

use crate::error::{CatchmentError, Result};
use crate::geometry::{polyline, segment_envelope, Point3, TOLERANCE};
use crate::water::WaterNetwork;

/// One catchment boundary polyline with a stable identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub id: String,
    pub coords: Vec<Point3>,
}

impl Section {
    pub fn new(id: impl Into<String>, coords: Vec<Point3>) -> Self {
        Self {
            id: id.into(),
            coords,
        }
    }

    /// Same section identity with different geometry.
    pub fn with_coords(&self, coords: Vec<Point3>) -> Section {
        Section::new(self.id.clone(), coords)
    }

    pub fn first(&self) -> Option<&Point3> {
        self.coords.first()
    }

    pub fn last(&self) -> Option<&Point3> {
        self.coords.last()
    }

    pub fn has_endpoint(&self, p: &Point3) -> bool {
        polyline::is_endpoint(&self.coords, p)
    }

    pub fn length(&self) -> f64 {
        polyline::length(&self.coords)
    }

    /// Planar geometry comparison, ignoring the id.
    pub fn same_geometry(&self, other: &Section) -> bool {
        polyline::same_route(&self.coords, &other.coords)
    }
}

/// A point where boundary sections meet, with the sections touching it.
#[derive(Debug, Clone)]
pub struct Junction {
    point: Point3,
    sections: Vec<Section>,
}

impl Junction {
    pub fn new(point: Point3, sections: Vec<Section>) -> Self {
        Self { point, sections }
    }

    pub fn point(&self) -> &Point3 {
        &self.point
    }

    pub fn touching_sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn degree(&self) -> usize {
        self.sections.len()
    }

    /// The opposite end of every touching section. A junction can never be
    /// moved onto one of these.
    pub fn far_endpoints(&self) -> Vec<Point3> {
        self.sections
            .iter()
            .filter_map(|s| match (s.first(), s.last()) {
                (Some(a), Some(b)) if a.same_xy(&self.point) => Some(*b),
                (Some(a), Some(_)) => Some(*a),
                _ => None,
            })
            .collect()
    }

    /// Identifier built from the sorted ids of the touching sections, for
    /// example `{1.4.7}`.
    pub fn id(&self) -> String {
        let ids: BTreeSet<&str> = self.sections.iter().map(|s| s.id.as_str()).collect();
        format!("{{{}}}", ids.into_iter().collect::<Vec<_>>().join("."))
    }
}

impl PartialEq for Junction {
    fn eq(&self, other: &Self) -> bool {
        self.point.same_xy(&other.point)
            && self.degree() == other.degree()
            && self
                .sections
                .iter()
                .zip(&other.sections)
                .all(|(a, b)| a.id == b.id && a.same_geometry(b))
    }
}

impl fmt::Display for Junction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "junction {} at ({}, {})", self.id(), self.point.x, self.point.y)
    }
}

/// Section segment tagged with `(slot, segment index)`.
type IndexedSegment = GeomWithData<Line<[f64; 2]>, (usize, usize)>;

/// Working collection of boundary sections.
///
/// The original version of every section is retained while replacement
/// versions are written by the improvers. Lookups by id return the latest
/// version. A segment index over the latest versions backs the catchment
/// validity checks.
#[derive(Debug)]
pub struct CatchmentLines {
    originals: Vec<Section>,
    latest: Vec<Section>,
    slots: HashMap<String, usize>,
    index: RTree<IndexedSegment>,
}

fn section_segments(slot: usize, section: &Section) -> impl Iterator<Item = IndexedSegment> + '_ {
    section
        .coords
        .windows(2)
        .enumerate()
        .map(move |(si, w)| GeomWithData::new(Line::new(w[0].xy(), w[1].xy()), (slot, si)))
}

impl CatchmentLines {
    pub fn new(sections: Vec<Section>) -> Result<Self> {
        let mut slots = HashMap::with_capacity(sections.len());
        for (slot, s) in sections.iter().enumerate() {
            if s.coords.len() < 2 {
                return Err(CatchmentError::invalid(format!(
                    "section {} needs at least two coordinates",
                    s.id
                )));
            }
            if s.coords.iter().any(|c| !c.has_elevation()) {
                return Err(CatchmentError::invalid(format!("section {} has NaN elevation", s.id)));
            }
            if slots.insert(s.id.clone(), slot).is_some() {
                return Err(CatchmentError::invalid(format!("duplicate section id {}", s.id)));
            }
        }
        let index = RTree::bulk_load(
            sections
                .iter()
                .enumerate()
                .flat_map(|(slot, s)| section_segments(slot, s))
                .collect(),
        );
        Ok(Self {
            originals: sections.clone(),
            latest: sections,
            slots,
            index,
        })
    }

    pub fn len(&self) -> usize {
        self.latest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.latest.is_empty()
    }

    /// Sections as they were when this collection was created.
    pub fn originals(&self) -> &[Section] {
        &self.originals
    }

    pub fn original(&self, id: &str) -> Option<&Section> {
        self.slots.get(id).and_then(|&slot| self.originals.get(slot))
    }

    /// Latest version of every section.
    pub fn sections(&self) -> &[Section] {
        &self.latest
    }

    /// Latest version of section `id`, which is the original until a
    /// replacement has been written.
    pub fn latest(&self, id: &str) -> Option<&Section> {
        self.slots.get(id).map(|&slot| &self.latest[slot])
    }

    /// Stores `section` as the latest version of its id, adding the id if it
    /// is new. Writing the same geometry twice has no further effect.
    pub fn add_or_update(&mut self, section: Section) -> Result<()> {
        if section.coords.len() < 2 {
            return Err(CatchmentError::invalid(format!(
                "section {} needs at least two coordinates",
                section.id
            )));
        }
        match self.slots.get(&section.id).copied() {
            Some(slot) => {
                if self.latest[slot] == section {
                    return Ok(());
                }
                for seg in section_segments(slot, &self.latest[slot]).collect::<Vec<_>>() {
                    self.index.remove(&seg);
                }
                for seg in section_segments(slot, &section) {
                    self.index.insert(seg);
                }
                trace!("replaced section {}", section.id);
                self.latest[slot] = section;
            }
            None => {
                let slot = self.latest.len();
                for seg in section_segments(slot, &section) {
                    self.index.insert(seg);
                }
                self.slots.insert(section.id.clone(), slot);
                self.originals.push(section.clone());
                self.latest.push(section);
            }
        }
        Ok(())
    }

    /// Fresh collection whose originals are the latest versions of this one.
    pub fn copy(&self) -> CatchmentLines {
        let latest = self.latest.clone();
        let index = RTree::bulk_load(
            latest
                .iter()
                .enumerate()
                .flat_map(|(slot, s)| section_segments(slot, s))
                .collect(),
        );
        CatchmentLines {
            originals: latest.clone(),
            latest,
            slots: self.slots.clone(),
            index,
        }
    }

    /// Latest sections having `p` as their first or last point.
    pub fn sections_touching(&self, p: &Point3) -> Vec<Section> {
        self.latest
            .iter()
            .filter(|s| s.has_endpoint(p))
            .cloned()
            .collect()
    }

    /// Distinct section endpoints that are not water confluences.
    pub fn junctions(&self, water: &WaterNetwork) -> Vec<Point3> {
        let mut seen = BTreeSet::new();
        let mut found = Vec::new();
        for s in &self.latest {
            for end in [s.coords[0], s.coords[s.coords.len() - 1]] {
                if seen.insert(end.key()) && !water.is_confluence(&end) {
                    found.push(end);
                }
            }
        }
        found
    }

    /// How many of the section's two ends sit on a confluence.
    pub fn ends_touching_confluence(section: &Section, water: &WaterNetwork) -> usize {
        [section.first(), section.last()]
            .into_iter()
            .flatten()
            .filter(|p| water.is_confluence(p))
            .count()
    }

    /// Latest segments whose envelope intersects the segment `a b`, as
    /// `(section, segment start, segment end)`.
    pub fn segments_near(&self, a: &Point3, b: &Point3) -> Vec<(&Section, Point3, Point3)> {
        self.index
            .locate_in_envelope_intersecting(&segment_envelope(a, b, TOLERANCE))
            .map(|seg| {
                let (slot, si) = seg.data;
                let s = &self.latest[slot];
                (s, s.coords[si], s.coords[si + 1])
            })
            .collect()
    }
}
