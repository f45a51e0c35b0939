use std::collections::{BTreeSet, HashMap};

use crate::geometry::{CoordKey, Point3};

/// How often one coordinate appeared in tested and in valid candidates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoverageItem {
    pub count_total: usize,
    pub count_valid: usize,
    /// Sections being improved when the coordinate was tested.
    pub section_ids: BTreeSet<String>,
}

impl CoverageItem {
    fn tag(&mut self, section_id: Option<&str>) {
        if let Some(id) = section_id {
            self.section_ids.insert(id.to_string());
        }
    }
}

/// Records which mesh coordinates the improvers have explored.
#[derive(Debug, Clone, Default)]
pub struct ImprovementCoverage {
    items: HashMap<CoordKey, (Point3, CoverageItem)>,
}

impl ImprovementCoverage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Coverage over `vertices`, all untested.
    pub fn from_vertices(vertices: &[Point3]) -> Self {
        let items = vertices
            .iter()
            .map(|v| (v.key(), (*v, CoverageItem::default())))
            .collect();
        Self { items }
    }

    fn item_mut(&mut self, p: &Point3) -> &mut CoverageItem {
        &mut self
            .items
            .entry(p.key())
            .or_insert_with(|| (*p, CoverageItem::default()))
            .1
    }

    pub fn increment_total(&mut self, p: &Point3, section_id: Option<&str>) {
        let item = self.item_mut(p);
        item.count_total += 1;
        item.tag(section_id);
    }

    pub fn increment_valid(&mut self, p: &Point3, section_id: Option<&str>) {
        let item = self.item_mut(p);
        item.count_valid += 1;
        item.tag(section_id);
    }

    pub fn increment_total_route(&mut self, route: &[Point3], section_id: Option<&str>) {
        for p in route {
            self.increment_total(p, section_id);
        }
    }

    pub fn increment_valid_route(&mut self, route: &[Point3], section_id: Option<&str>) {
        for p in route {
            self.increment_valid(p, section_id);
        }
    }

    pub fn get(&self, p: &Point3) -> Option<&CoverageItem> {
        self.items.get(&p.key()).map(|(_, item)| item)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Point3, &CoverageItem)> {
        self.items.values().map(|(p, item)| (p, item))
    }

    fn fraction(&self, touched: impl Fn(&CoverageItem) -> bool) -> f64 {
        if self.items.is_empty() {
            return 0.0;
        }
        let n = self.items.values().filter(|(_, item)| touched(item)).count();
        n as f64 / self.items.len() as f64
    }

    /// Share of known coordinates tested at least once.
    pub fn total_coverage_fraction(&self) -> f64 {
        self.fraction(|item| item.count_total > 0)
    }

    /// Share of known coordinates seen in at least one valid candidate.
    pub fn valid_coverage_fraction(&self) -> f64 {
        self.fraction(|item| item.count_valid > 0)
    }
}
