//! Tunable parameters shared by the optimisation drivers.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CatchmentError, Result};
use crate::fitness::{FitnessKind, SondheimConstants};

/// Settings for one improvement run. Every field falls back to its default
/// when missing from a JSON file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImproverConfig {
    /// Search radius around a moved vertex, in map units.
    pub radius: f64,
    pub seed: u64,
    /// Independent trials kept by best-of-N.
    pub best_of_n: usize,
    /// Junction rounds per pass.
    pub junction_iterations: usize,
    /// Upper bound on section rounds per pass.
    pub section_iterations: usize,
    pub tests_per_junction: usize,
    pub min_tests_per_section: usize,
    pub max_tests_per_section: usize,
    /// Consecutive failed rounds after which a target is skipped.
    pub no_improvement_threshold: usize,
    pub children_per_generation: usize,
    pub generations: usize,
    pub stop_early: bool,
    /// Lets the radius driver move junctions as well as section vertices.
    pub move_junctions: bool,
    /// Junction annealing stops at the first validated improvement.
    pub first_improvement: bool,
    pub fitness: FitnessKind,
    pub sondheim: SondheimConstants,
    pub cedar_cache_capacity: usize,
    pub confluence_cache_capacity: usize,
    /// Vertices per touching section scored by the partial-sum junction
    /// fitness.
    pub partial_sum_k: usize,
}

impl Default for ImproverConfig {
    fn default() -> Self {
        Self {
            radius: 2.0,
            seed: 1,
            best_of_n: 3,
            junction_iterations: 1,
            section_iterations: 5,
            tests_per_junction: 30,
            min_tests_per_section: 5,
            max_tests_per_section: 10,
            no_improvement_threshold: 2,
            children_per_generation: 4,
            generations: 3,
            stop_early: true,
            move_junctions: false,
            first_improvement: false,
            fitness: FitnessKind::default(),
            sondheim: SondheimConstants::default(),
            cedar_cache_capacity: 1000,
            confluence_cache_capacity: 1000,
            partial_sum_k: 3,
        }
    }
}

impl ImproverConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json_str(&data)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.radius.is_finite() && self.radius > 0.0) {
            return Err(CatchmentError::invalid(format!(
                "radius must be positive, got {}",
                self.radius
            )));
        }
        if self.tests_per_junction == 0 || self.max_tests_per_section == 0 {
            return Err(CatchmentError::invalid("annealing needs at least one test per target"));
        }
        if self.best_of_n == 0 {
            return Err(CatchmentError::invalid("best_of_n must be at least 1"));
        }
        if self.children_per_generation < 2 || self.children_per_generation % 2 != 0 {
            return Err(CatchmentError::invalid(format!(
                "children_per_generation must be even and at least 2, got {}",
                self.children_per_generation
            )));
        }
        if self.partial_sum_k == 0 {
            return Err(CatchmentError::invalid("partial_sum_k must be at least 1"));
        }
        if self.min_tests_per_section > self.max_tests_per_section {
            return Err(CatchmentError::invalid(
                "min_tests_per_section exceeds max_tests_per_section",
            ));
        }
        if self.cedar_cache_capacity == 0 || self.confluence_cache_capacity == 0 {
            return Err(CatchmentError::invalid("cache capacities must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;

    #[test]
    fn defaults_are_valid() {
        let c = ImproverConfig::default();
        assert!(c.validate().is_ok());
        assert_eq!(c.tests_per_junction, 30);
        assert_eq!(c.no_improvement_threshold, 2);
        assert_eq!(c.sondheim, SondheimConstants { c1: 0.0, c2: 1.0 });
    }

    #[test]
    fn missing_fields_use_defaults() {
        let c = ImproverConfig::from_json_str(r#"{ "radius": 3.5, "fitness": "ridge" }"#).unwrap();
        assert_eq!(c.radius, 3.5);
        assert_eq!(c.fitness, FitnessKind::Ridge);
        assert_eq!(c.max_tests_per_section, ImproverConfig::default().max_tests_per_section);
    }

    #[test]
    fn rejects_bad_values() {
        for json in [
            r#"{ "radius": 0.0 }"#,
            r#"{ "tests_per_junction": 0 }"#,
            r#"{ "min_tests_per_section": 0, "max_tests_per_section": 0 }"#,
            r#"{ "children_per_generation": 3 }"#,
            r#"{ "partial_sum_k": 0 }"#,
        ] {
            let err = ImproverConfig::from_json_str(json).unwrap_err();
            assert!(matches!(err, CatchmentError::InvalidInput(_)), "{}", json);
        }
        assert!(matches!(
            ImproverConfig::from_json_str("{ radius"),
            Err(CatchmentError::Json(_))
        ));
    }

    #[test]
    fn loads_from_file() {
        let file = assert_fs::NamedTempFile::new("config.json").unwrap();
        file.write_str(r#"{ "seed": 42, "best_of_n": 1 }"#).unwrap();
        let c = ImproverConfig::from_json_file(file.path()).unwrap();
        assert_eq!(c.seed, 42);
        assert_eq!(c.best_of_n, 1);
        file.close().unwrap();
    }
}
