use serde::{Deserialize, Serialize};

use super::{compass_bearing, cross, norm, subtract, CoordKey, Point3};

/// Unordered pair of points. Two edges are equal when they join the same
/// planar positions in either direction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Edge {
    pub a: Point3,
    pub b: Point3,
}

impl Edge {
    pub fn new(a: Point3, b: Point3) -> Self {
        Self { a, b }
    }

    pub fn dx(&self) -> f64 {
        self.b.x - self.a.x
    }

    pub fn dy(&self) -> f64 {
        self.b.y - self.a.y
    }

    pub fn dz(&self) -> f64 {
        self.b.z - self.a.z
    }

    /// Planar length.
    pub fn length(&self) -> f64 {
        self.a.distance_2d(&self.b)
    }

    /// Length of the edge treated as a 3D vector from `a` to `b`.
    pub fn magnitude(&self) -> f64 {
        norm(self.vector())
    }

    /// Compass bearing of the direction `a -> b` in degrees, 0 = north,
    /// 90 = east.
    pub fn bearing(&self) -> f64 {
        compass_bearing(self.dx(), self.dy())
    }

    /// Direction vector `b - a`.
    pub fn vector(&self) -> Point3 {
        subtract(self.b, self.a)
    }

    /// Cross product of the two edge direction vectors.
    pub fn cross(&self, other: &Edge) -> Point3 {
        cross(self.vector(), other.vector())
    }

    /// Unit direction vector, or `None` for a zero-length edge.
    pub fn unit(&self) -> Option<Point3> {
        let m = self.magnitude();
        if m == 0.0 {
            return None;
        }
        let v = self.vector();
        Some(Point3::new(v.x / m, v.y / m, v.z / m))
    }

    /// Same edge walked in the opposite direction.
    pub fn reversed(&self) -> Edge {
        Edge::new(self.b, self.a)
    }

    pub fn midpoint(&self) -> Point3 {
        Point3::new(
            (self.a.x + self.b.x) / 2.0,
            (self.a.y + self.b.y) / 2.0,
            (self.a.z + self.b.z) / 2.0,
        )
    }

    pub fn has_endpoint(&self, p: &Point3) -> bool {
        self.a.same_xy(p) || self.b.same_xy(p)
    }

    /// Orientation independent key of the edge.
    pub fn key(&self) -> (CoordKey, CoordKey) {
        let (ka, kb) = (self.a.key(), self.b.key());
        if ka <= kb {
            (ka, kb)
        } else {
            (kb, ka)
        }
    }
}

impl PartialEq for Edge {
    fn eq(&self, other: &Self) -> bool {
        (self.a.same_xy(&other.a) && self.b.same_xy(&other.b))
            || (self.a.same_xy(&other.b) && self.b.same_xy(&other.a))
    }
}
