use std::time::Instant;

use serde::Serialize;

/// Counters gathered while improving sections or junctions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImprovementMetrics {
    pub alternatives_tested: usize,
    pub valid_alternatives_tested: usize,
    pub improvement_requests: usize,
    pub improved: usize,
    pub runtime_ms: u64,
}

impl ImprovementMetrics {
    /// Metrics for a single improvement request.
    pub fn request() -> Self {
        Self {
            improvement_requests: 1,
            ..Self::default()
        }
    }

    pub fn merge(&mut self, other: &ImprovementMetrics) {
        self.alternatives_tested += other.alternatives_tested;
        self.valid_alternatives_tested += other.valid_alternatives_tested;
        self.improvement_requests += other.improvement_requests;
        self.improved += other.improved;
        self.runtime_ms += other.runtime_ms;
    }

    pub(crate) fn stop_clock(&mut self, start: Instant) {
        self.runtime_ms = start.elapsed().as_millis() as u64;
    }

    pub fn avg_runtime_ms_per_request(&self) -> Option<f64> {
        if self.runtime_ms == 0 || self.improvement_requests == 0 {
            return None;
        }
        Some(self.runtime_ms as f64 / self.improvement_requests as f64)
    }

    pub fn avg_runtime_ms_per_test(&self) -> Option<f64> {
        if self.runtime_ms == 0 || self.alternatives_tested == 0 {
            return None;
        }
        Some(self.runtime_ms as f64 / self.alternatives_tested as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_adds_every_counter() {
        let mut a = ImprovementMetrics {
            alternatives_tested: 10,
            valid_alternatives_tested: 4,
            improvement_requests: 1,
            improved: 1,
            runtime_ms: 20,
        };
        a.merge(&ImprovementMetrics {
            alternatives_tested: 6,
            valid_alternatives_tested: 1,
            improvement_requests: 1,
            improved: 0,
            runtime_ms: 12,
        });
        assert_eq!(a.alternatives_tested, 16);
        assert_eq!(a.valid_alternatives_tested, 5);
        assert_eq!(a.improvement_requests, 2);
        assert_eq!(a.improved, 1);
        assert_eq!(a.avg_runtime_ms_per_request(), Some(16.0));
        assert_eq!(a.avg_runtime_ms_per_test(), Some(2.0));
    }

    #[test]
    fn averages_need_runtime_and_counts() {
        let m = ImprovementMetrics::request();
        assert_eq!(m.avg_runtime_ms_per_request(), None);
        let m = ImprovementMetrics {
            runtime_ms: 5,
            ..ImprovementMetrics::default()
        };
        assert_eq!(m.avg_runtime_ms_per_request(), None);
        assert_eq!(m.avg_runtime_ms_per_test(), None);
    }
}
