//! Terrain triangles and the surface measures derived from them.

use crate::error::{CatchmentError, Result};
use crate::geometry::{compass_bearing, cross, norm, orientation, subtract, Edge, Point3, TOLERANCE};

/// Horizontal normal length below which a triangle counts as flat.
const FLAT_EPSILON: f64 = 1e-12;

/// Incrementally assembles a triangle from its edges.
///
/// Every added edge must connect to the ones already present, and the edge
/// and vertex counts must stay consistent (1 edge with 2 vertices, 2 edges
/// with 3 vertices, 3 edges with 3 vertices).
#[derive(Debug, Clone, Default)]
pub struct TriangleBuilder {
    edges: Vec<Edge>,
    vertices: Vec<Point3>,
}

impl TriangleBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_edge(&mut self, edge: Edge) -> Result<&mut Self> {
        if self.edges.len() == 3 {
            return Err(CatchmentError::inconsistent("a triangle has exactly three edges"));
        }
        if edge.a.same_xy(&edge.b) {
            return Err(CatchmentError::inconsistent("triangle edge has zero length"));
        }
        if self.edges.contains(&edge) {
            return Err(CatchmentError::inconsistent("edge already part of the triangle"));
        }
        if !self.edges.is_empty() && !self.vertices.iter().any(|v| edge.has_endpoint(v)) {
            return Err(CatchmentError::inconsistent("edge is not connected to the triangle"));
        }
        let added = [edge.a, edge.b]
            .iter()
            .filter(|p| !self.vertices.iter().any(|v| v.same_xy(p)))
            .count();
        let edges = self.edges.len() + 1;
        let vertices = self.vertices.len() + added;
        let expected = if edges == 1 { 2 } else { 3 };
        if vertices != expected {
            return Err(CatchmentError::inconsistent(format!(
                "triangle with {} edges cannot have {} vertices",
                edges, vertices
            )));
        }
        self.edges.push(edge);
        for p in [edge.a, edge.b] {
            if !self.vertices.iter().any(|v| v.same_xy(&p)) {
                self.vertices.push(p);
            }
        }
        Ok(self)
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_complete(&self) -> bool {
        self.edges.len() == 3 && self.vertices.len() == 3
    }

    /// Finishes the triangle. Fails unless all three edges are present.
    pub fn build(&self) -> Result<Triangle> {
        if !self.is_complete() {
            return Err(CatchmentError::inconsistent(format!(
                "incomplete triangle: {} edges, {} vertices",
                self.edges.len(),
                self.vertices.len()
            )));
        }
        Triangle::normalized([self.vertices[0], self.vertices[1], self.vertices[2]])
    }
}

/// Triangle of the terrain mesh.
///
/// Vertices are stored clockwise starting from the vertex with the lowest
/// `x` (ties broken by the lowest `y`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triangle {
    vertices: [Point3; 3],
}

impl Triangle {
    pub fn new(a: Point3, b: Point3, c: Point3) -> Result<Self> {
        let mut builder = TriangleBuilder::new();
        builder
            .add_edge(Edge::new(a, b))?
            .add_edge(Edge::new(b, c))?
            .add_edge(Edge::new(c, a))?;
        builder.build()
    }

    fn normalized(mut v: [Point3; 3]) -> Result<Self> {
        let first = (0..3)
            .min_by(|&i, &j| v[i].x.total_cmp(&v[j].x).then(v[i].y.total_cmp(&v[j].y)))
            .unwrap_or(0);
        v.swap(0, first);
        let turn = orientation(&v[0], &v[1], &v[2]);
        if turn == 0.0 {
            return Err(CatchmentError::inconsistent("degenerate triangle: vertices are collinear"));
        }
        if turn > 0.0 {
            v.swap(1, 2);
        }
        Ok(Self { vertices: v })
    }

    pub fn vertices(&self) -> &[Point3; 3] {
        &self.vertices
    }

    pub fn edges(&self) -> [Edge; 3] {
        let [a, b, c] = self.vertices;
        [Edge::new(a, b), Edge::new(b, c), Edge::new(c, a)]
    }

    pub fn has_vertex(&self, p: &Point3) -> bool {
        self.vertices.iter().any(|v| v.same_xy(p))
    }

    pub fn has_edge(&self, edge: &Edge) -> bool {
        self.has_vertex(&edge.a) && self.has_vertex(&edge.b) && !edge.a.same_xy(&edge.b)
    }

    /// The vertex not touched by `edge`.
    pub fn other_vertex(&self, edge: &Edge) -> Result<Point3> {
        if !self.has_edge(edge) {
            return Err(CatchmentError::inconsistent("edge is not part of the triangle"));
        }
        self.vertices
            .iter()
            .find(|v| !edge.has_endpoint(v))
            .copied()
            .ok_or_else(|| CatchmentError::inconsistent("triangle has no vertex opposite the edge"))
    }

    /// Unit surface normal, oriented upward.
    pub fn normal(&self) -> Point3 {
        let [a, b, c] = self.vertices;
        let n = cross(subtract(b, a), subtract(c, a));
        let len = norm(n);
        let sign = if n.z < 0.0 { -1.0 } else { 1.0 };
        Point3::new(sign * n.x / len, sign * n.y / len, sign * n.z / len)
    }

    /// Steepness in degrees, 0 for a flat triangle.
    pub fn slope(&self) -> f64 {
        self.normal().z.abs().min(1.0).acos().to_degrees()
    }

    /// Compass direction the triangle faces downhill, in `[0, 360)` degrees
    /// with 0 = north and 90 = east. Flat triangles report 0.
    pub fn aspect(&self) -> f64 {
        let n = self.normal();
        if n.x.hypot(n.y) < FLAT_EPSILON {
            return 0.0;
        }
        compass_bearing(n.x, n.y)
    }

    pub fn centroid(&self) -> Point3 {
        let [a, b, c] = self.vertices;
        Point3::new(
            (a.x + b.x + c.x) / 3.0,
            (a.y + b.y + c.y) / 3.0,
            (a.z + b.z + c.z) / 3.0,
        )
    }

    /// Returns `true` if `p` lies inside or on the boundary of the triangle
    /// in plan view.
    pub fn contains_2d(&self, p: &Point3) -> bool {
        let [a, b, c] = &self.vertices;
        let tol = TOLERANCE * (a.distance_2d(b) + b.distance_2d(c) + c.distance_2d(a));
        // clockwise storage: every edge has the interior on its right
        orientation(a, b, p) <= tol && orientation(b, c, p) <= tol && orientation(c, a, p) <= tol
    }

    /// Edge from the foot of the perpendicular dropped onto the line through
    /// `base` to the opposite vertex. The foot's elevation is interpolated (or
    /// extrapolated) linearly along `base`.
    pub fn spine_edge(&self, base: &Edge) -> Result<Edge> {
        let apex = self.other_vertex(base)?;
        let (dx, dy) = (base.dx(), base.dy());
        let len2 = dx * dx + dy * dy;
        let t = ((apex.x - base.a.x) * dx + (apex.y - base.a.y) * dy) / len2;
        let foot = Point3::new(
            base.a.x + t * dx,
            base.a.y + t * dy,
            base.a.z + t * base.dz(),
        );
        Ok(Edge::new(foot, apex))
    }

    /// Angle in degrees at which the triangle rises away from `base`:
    /// positive when the opposite vertex is above the base edge, negative
    /// when it is below.
    pub fn slope_relative_to_base_edge(&self, base: &Edge) -> Result<f64> {
        let spine = self.spine_edge(base)?;
        let run = spine.length();
        if run == 0.0 {
            return Err(CatchmentError::inconsistent("degenerate triangle: zero height"));
        }
        Ok((spine.dz() / run).atan().to_degrees())
    }
}
