//! Triangulated Irregular Network describing the terrain surface.

mod triangle;

pub use triangle::{Triangle, TriangleBuilder};

use std::collections::{HashMap, HashSet};

use log::debug;
use rand::seq::SliceRandom;
use rand::Rng;
use rstar::primitives::GeomWithData;
use rstar::{RTree, AABB};

use crate::error::{CatchmentError, Result};
use crate::geometry::{CoordKey, Point3};

type IndexedVertex = GeomWithData<[f64; 2], usize>;

/// Terrain mesh with adjacency tables and a spatial index over its vertices.
///
/// Vertices sharing a planar position are merged on construction, so every
/// coordinate identifies exactly one vertex.
#[derive(Debug)]
pub struct Tin {
    vertices: Vec<Point3>,
    triangles: Vec<[usize; 3]>,
    faces: Vec<Triangle>,
    lookup: HashMap<CoordKey, usize>,
    neighbours: Vec<Vec<usize>>,
    vertex_faces: Vec<Vec<usize>>,
    edge_faces: HashMap<(usize, usize), Vec<usize>>,
    index: RTree<IndexedVertex>,
    max_elevation: f64,
    max_edge_length: f64,
}

fn edge_key(i: usize, j: usize) -> (usize, usize) {
    if i < j {
        (i, j)
    } else {
        (j, i)
    }
}

impl Tin {
    /// Builds a mesh from vertices and triangles given as vertex indices.
    pub fn new(vertices: Vec<Point3>, triangles: Vec<[usize; 3]>) -> Result<Self> {
        if vertices.is_empty() {
            return Err(CatchmentError::invalid("mesh has no vertices"));
        }
        let mut unique: Vec<Point3> = Vec::with_capacity(vertices.len());
        let mut lookup = HashMap::with_capacity(vertices.len());
        let mut remap = Vec::with_capacity(vertices.len());
        for v in &vertices {
            if !v.x.is_finite() || !v.y.is_finite() {
                return Err(CatchmentError::invalid(format!("non-finite mesh vertex {:?}", v)));
            }
            if !v.has_elevation() {
                return Err(CatchmentError::invalid(format!("mesh vertex {:?} has no elevation", v)));
            }
            let idx = *lookup.entry(v.key()).or_insert_with(|| {
                unique.push(*v);
                unique.len() - 1
            });
            remap.push(idx);
        }
        if unique.len() < vertices.len() {
            debug!("merged {} duplicate mesh vertices", vertices.len() - unique.len());
        }

        let mut tris = Vec::with_capacity(triangles.len());
        let mut faces = Vec::with_capacity(triangles.len());
        let mut neighbours = vec![Vec::new(); unique.len()];
        let mut vertex_faces = vec![Vec::new(); unique.len()];
        let mut edge_faces: HashMap<(usize, usize), Vec<usize>> = HashMap::new();
        let mut seen = HashSet::new();
        for t in &triangles {
            let mut idx = [0usize; 3];
            for (slot, &raw) in idx.iter_mut().zip(t.iter()) {
                *slot = *remap.get(raw).ok_or_else(|| {
                    CatchmentError::invalid(format!("triangle refers to missing vertex {}", raw))
                })?;
            }
            let mut sorted = idx;
            sorted.sort_unstable();
            if !seen.insert(sorted) {
                continue;
            }
            let face = Triangle::new(unique[idx[0]], unique[idx[1]], unique[idx[2]])?;
            let face_id = faces.len();
            faces.push(face);
            tris.push(idx);
            for k in 0..3 {
                let (i, j) = (idx[k], idx[(k + 1) % 3]);
                edge_faces.entry(edge_key(i, j)).or_default().push(face_id);
                neighbours[i].push(j);
                neighbours[j].push(i);
                vertex_faces[idx[k]].push(face_id);
            }
        }
        for n in &mut neighbours {
            n.sort_unstable();
            n.dedup();
        }

        let max_elevation = unique.iter().map(|v| v.z).fold(f64::NEG_INFINITY, f64::max);
        let max_edge_length = edge_faces
            .keys()
            .map(|&(i, j)| unique[i].distance_2d(&unique[j]))
            .fold(0.0, f64::max);
        let index = RTree::bulk_load(
            unique
                .iter()
                .enumerate()
                .map(|(i, v)| GeomWithData::new(v.xy(), i))
                .collect(),
        );

        Ok(Self {
            vertices: unique,
            triangles: tris,
            faces,
            lookup,
            neighbours,
            vertex_faces,
            edge_faces,
            index,
            max_elevation,
            max_edge_length,
        })
    }

    /// Builds a Delaunay triangulation of `points`.
    pub fn from_points(points: Vec<Point3>) -> Result<Self> {
        let coords: Vec<delaunator::Point> = points
            .iter()
            .map(|p| delaunator::Point { x: p.x, y: p.y })
            .collect();
        let triangulation = delaunator::triangulate(&coords);
        let triangles = triangulation
            .triangles
            .chunks(3)
            .map(|c| [c[0], c[1], c[2]])
            .collect();
        Self::new(points, triangles)
    }

    pub fn vertices(&self) -> &[Point3] {
        &self.vertices
    }

    /// Triangles as indices into [`Tin::vertices`].
    pub fn triangle_indices(&self) -> &[[usize; 3]] {
        &self.triangles
    }

    pub fn triangles(&self) -> &[Triangle] {
        &self.faces
    }

    pub fn max_elevation(&self) -> f64 {
        self.max_elevation
    }

    /// Planar length of the longest mesh edge.
    pub fn max_edge_length(&self) -> f64 {
        self.max_edge_length
    }

    pub fn contains_vertex(&self, p: &Point3) -> bool {
        self.lookup.contains_key(&p.key())
    }

    fn index_of(&self, p: &Point3) -> Result<usize> {
        self.lookup.get(&p.key()).copied().ok_or_else(|| {
            CatchmentError::inconsistent(format!("({}, {}) is not a mesh vertex", p.x, p.y))
        })
    }

    /// The mesh vertex at the planar position of `p`, carrying the mesh
    /// elevation.
    pub fn vertex(&self, p: &Point3) -> Result<Point3> {
        Ok(self.vertices[self.index_of(p)?])
    }

    /// Vertices joined to `p` by a mesh edge.
    pub fn connected(&self, p: &Point3) -> Result<Vec<Point3>> {
        let idx = self.index_of(p)?;
        Ok(self.neighbours[idx].iter().map(|&n| self.vertices[n]).collect())
    }

    pub fn edge_exists(&self, a: &Point3, b: &Point3) -> bool {
        match (self.lookup.get(&a.key()), self.lookup.get(&b.key())) {
            (Some(&i), Some(&j)) => self.edge_faces.contains_key(&edge_key(i, j)),
            _ => false,
        }
    }

    /// Returns `true` if every vertex of `route` is a mesh vertex and every
    /// consecutive pair is joined by a mesh edge.
    pub fn follows_mesh(&self, route: &[Point3]) -> bool {
        route.iter().all(|p| self.contains_vertex(p))
            && route.windows(2).all(|w| self.edge_exists(&w[0], &w[1]))
    }

    /// Mesh vertices within planar distance `radius` of `p`, in index order.
    pub fn vertices_in_radius(&self, p: &Point3, radius: f64) -> Result<Vec<Point3>> {
        if !(radius.is_finite() && radius > 0.0) {
            return Err(CatchmentError::invalid(format!("radius must be positive, got {}", radius)));
        }
        let envelope = AABB::from_corners([p.x - radius, p.y - radius], [p.x + radius, p.y + radius]);
        let mut found: Vec<usize> = self
            .index
            .locate_in_envelope(&envelope)
            .filter(|v| p.distance_2d(&self.vertices[v.data]) <= radius)
            .map(|v| v.data)
            .collect();
        found.sort_unstable();
        Ok(found.into_iter().map(|i| self.vertices[i]).collect())
    }

    /// Picks a random vertex within `radius` of `p` that is not in `exclude`.
    pub fn random_vertex_in_radius<R: Rng + ?Sized>(
        &self,
        p: &Point3,
        radius: f64,
        exclude: &[Point3],
        rng: &mut R,
    ) -> Result<Point3> {
        let candidates: Vec<Point3> = self
            .vertices_in_radius(p, radius)?
            .into_iter()
            .filter(|c| !exclude.iter().any(|e| e.same_xy(c)))
            .collect();
        candidates.choose(rng).copied().ok_or_else(|| {
            CatchmentError::routing(format!("no free vertex within {} of ({}, {})", radius, p.x, p.y))
        })
    }

    /// Triangles sharing the edge `a b`; two for interior edges, one on the
    /// mesh boundary and none if the edge does not exist.
    pub fn triangles_on_edge(&self, a: &Point3, b: &Point3) -> Vec<&Triangle> {
        match (self.lookup.get(&a.key()), self.lookup.get(&b.key())) {
            (Some(&i), Some(&j)) => self
                .edge_faces
                .get(&edge_key(i, j))
                .map(|ids| ids.iter().map(|&f| &self.faces[f]).collect())
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    /// Triangles having `p` as a vertex.
    pub fn triangles_touching(&self, p: &Point3) -> Vec<&Triangle> {
        match self.lookup.get(&p.key()) {
            Some(&i) => self.vertex_faces[i].iter().map(|&f| &self.faces[f]).collect(),
            None => Vec::new(),
        }
    }
}
