use std::collections::BTreeSet;

use crate::dataset::{Junction, Section};
use crate::error::{CatchmentError, Result};

use super::ImprovementMetrics;

/// Outcome of improving one section.
#[derive(Debug, Clone)]
pub struct SectionModification {
    original: Section,
    modified: Section,
    metrics: ImprovementMetrics,
}

impl SectionModification {
    /// An unmodified record for `original`.
    pub fn new(original: Section) -> Self {
        Self {
            modified: original.clone(),
            original,
            metrics: ImprovementMetrics::default(),
        }
    }

    pub fn original(&self) -> &Section {
        &self.original
    }

    pub fn modified(&self) -> &Section {
        &self.modified
    }

    /// Fails if `modified` does not carry the original id.
    pub fn set_modified(&mut self, modified: Section) -> Result<()> {
        if modified.id != self.original.id {
            return Err(CatchmentError::inconsistent(format!(
                "section {} cannot be replaced by section {}",
                self.original.id, modified.id
            )));
        }
        self.modified = modified;
        Ok(())
    }

    pub fn is_modified(&self) -> bool {
        !self.original.same_geometry(&self.modified)
    }

    pub fn metrics(&self) -> &ImprovementMetrics {
        &self.metrics
    }

    pub fn set_metrics(&mut self, metrics: ImprovementMetrics) {
        self.metrics = metrics;
    }
}

/// Outcome of improving one junction, with every touching section.
#[derive(Debug, Clone)]
pub struct JunctionModification {
    original: Junction,
    modified: Junction,
    metrics: ImprovementMetrics,
}

fn section_ids(junction: &Junction) -> BTreeSet<&str> {
    junction
        .touching_sections()
        .iter()
        .map(|s| s.id.as_str())
        .collect()
}

impl JunctionModification {
    pub fn new(original: Junction) -> Self {
        Self {
            modified: original.clone(),
            original,
            metrics: ImprovementMetrics::default(),
        }
    }

    pub fn original(&self) -> &Junction {
        &self.original
    }

    pub fn modified(&self) -> &Junction {
        &self.modified
    }

    /// Fails if `modified` is not touched by the same sections.
    pub fn set_modified(&mut self, modified: Junction) -> Result<()> {
        if section_ids(&modified) != section_ids(&self.original) {
            return Err(CatchmentError::inconsistent(format!(
                "{} cannot be replaced by {}",
                self.original, modified
            )));
        }
        self.modified = modified;
        Ok(())
    }

    pub fn is_modified(&self) -> bool {
        self.original != self.modified
    }

    pub fn metrics(&self) -> &ImprovementMetrics {
        &self.metrics
    }

    pub fn set_metrics(&mut self, metrics: ImprovementMetrics) {
        self.metrics = metrics;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point3;

    fn section(id: &str, ys: &[f64]) -> Section {
        Section::new(id, ys.iter().map(|&y| Point3::new(0.0, y, 1.0)).collect())
    }

    #[test]
    fn section_id_must_not_change() {
        let mut m = SectionModification::new(section("a", &[0.0, 1.0]));
        assert!(!m.is_modified());
        let err = m.set_modified(section("b", &[0.0, 2.0])).unwrap_err();
        assert!(matches!(err, CatchmentError::DataInconsistency(_)));
        assert!(!m.is_modified());
        m.set_modified(section("a", &[0.0, 2.0])).unwrap();
        assert!(m.is_modified());
        assert_eq!(m.original().coords[1].y, 1.0);
    }

    #[test]
    fn junction_changes() {
        let p = Point3::new(0.0, 0.0, 1.0);
        let original = Junction::new(p, vec![section("a", &[0.0, 1.0]), section("b", &[0.0, -1.0])]);
        let mut m = JunctionModification::new(original.clone());
        assert!(!m.is_modified());

        let moved = Junction::new(p, vec![section("a", &[0.0, 2.0]), section("b", &[0.0, -1.0])]);
        m.set_modified(moved).unwrap();
        assert!(m.is_modified());

        let other = Junction::new(p, vec![section("a", &[0.0, 1.0]), section("c", &[0.0, -1.0])]);
        assert!(m.set_modified(other).is_err());
    }
}
