use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::error::{CatchmentError, Result};
use crate::geometry::{Edge, Point3};
use crate::tin::Tin;

use super::{require_elevation, SectionFitness};

/// Tuning constants of [`SondheimFitness`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SondheimConstants {
    pub c1: f64,
    pub c2: f64,
}

impl Default for SondheimConstants {
    fn default() -> Self {
        Self { c1: 0.0, c2: 1.0 }
    }
}

/// Ridge score after Sondheim.
///
/// With `v` the segment's mean elevation, `r` the highest mesh elevation,
/// `d` the segment length relative to the longest mesh edge and `s` the
/// smaller of the two downward slopes away from the segment:
///
/// `m = ((c1 + ln(r / v)) / (1 + sin(s)))^c2` and the fitness is `1 / (m d)`.
///
/// Segments without exactly two adjacent triangles score 0.
pub struct SondheimFitness {
    tin: Rc<Tin>,
    constants: SondheimConstants,
}

impl SondheimFitness {
    pub fn new(tin: Rc<Tin>) -> Self {
        Self::with_constants(tin, SondheimConstants::default())
    }

    pub fn with_constants(tin: Rc<Tin>, constants: SondheimConstants) -> Self {
        Self { tin, constants }
    }
}

impl SectionFitness for SondheimFitness {
    fn segment_fitness(&self, a: &Point3, b: &Point3) -> Result<f64> {
        require_elevation(a)?;
        require_elevation(b)?;
        let triangles = self.tin.triangles_on_edge(a, b);
        if triangles.len() != 2 {
            return Ok(0.0);
        }
        let v = (a.z + b.z) / 2.0;
        if v <= 0.0 {
            return Err(CatchmentError::invalid(format!(
                "sondheim fitness needs positive elevations, segment mean is {}",
                v
            )));
        }
        let base = Edge::new(*a, *b);
        // positive when the triangle falls away from the segment
        let alpha = -triangles[0].slope_relative_to_base_edge(&base)?;
        let beta = -triangles[1].slope_relative_to_base_edge(&base)?;
        let d = base.length() / self.tin.max_edge_length();

        let numerator = self.constants.c1 + (self.tin.max_elevation() / v).ln();
        Ok(ridge_score(self.constants, numerator, alpha.min(beta), d))
    }
}

/// `1 / (((c1 + ln(r / v)) / (1 + sin(slope)))^c2 * d)` for a slope in
/// degrees, or 0 where the denominator vanishes.
fn ridge_score(constants: SondheimConstants, numerator: f64, slope: f64, d: f64) -> f64 {
    let denominator = 1.0 + slope.to_radians().sin();
    if denominator <= 0.0 {
        return 0.0;
    }
    let g = (numerator / denominator).powf(constants.c2) * d;
    if g == 0.0 {
        0.0
    } else {
        1.0 / g
    }
}
