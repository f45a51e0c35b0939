//! Basic 3D point type used throughout the crate.

use serde::{Deserialize, Serialize};

/// Representation of a 3D point. `z` carries the terrain elevation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Key identifying the point by its planar position only.
    pub fn key(&self) -> CoordKey {
        CoordKey::from(*self)
    }

    /// Returns `true` when both points share the same planar position.
    pub fn same_xy(&self, other: &Point3) -> bool {
        self.x == other.x && self.y == other.y
    }

    /// Planar distance between two points.
    pub fn distance_2d(&self, other: &Point3) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// Full 3D distance between two points.
    pub fn distance_3d(&self, other: &Point3) -> f64 {
        let dz = self.z - other.z;
        (self.distance_2d(other).powi(2) + dz * dz).sqrt()
    }

    pub fn has_elevation(&self) -> bool {
        !self.z.is_nan()
    }

    pub(crate) fn xy(&self) -> [f64; 2] {
        [self.x, self.y]
    }
}

/// Hashable planar identity of a coordinate.
///
/// Mesh routing treats two points with the same `x`/`y` as the same vertex
/// regardless of elevation, so lookups and caches are keyed on this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CoordKey(u64, u64);

impl From<Point3> for CoordKey {
    fn from(p: Point3) -> Self {
        CoordKey(canonical_bits(p.x), canonical_bits(p.y))
    }
}

impl From<&Point3> for CoordKey {
    fn from(p: &Point3) -> Self {
        CoordKey::from(*p)
    }
}

fn canonical_bits(v: f64) -> u64 {
    // -0.0 and 0.0 compare equal and must hash equal
    if v == 0.0 {
        0.0f64.to_bits()
    } else {
        v.to_bits()
    }
}
