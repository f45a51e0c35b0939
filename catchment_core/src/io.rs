//! Reading and writing projects and boundary sections.

use std::path::Path;
use std::rc::Rc;

use geojson::{Feature, FeatureCollection, GeoJson, Geometry, JsonObject, JsonValue, Value};
use log::info;
use serde::{Deserialize, Serialize};

use crate::dataset::{CatchmentLines, Section};
use crate::error::{CatchmentError, Result};
use crate::geometry::Point3;
use crate::synthetic::Scenario;
use crate::tin::Tin;
use crate::water::WaterNetwork;

/// Terrain surface as vertices and index triangles.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Surface {
    pub vertices: Vec<Point3>,
    pub triangles: Vec<[usize; 3]>,
}

/// Everything an improvement run needs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Project {
    pub surface: Surface,
    pub water: Vec<Vec<Point3>>,
    pub sections: Vec<Section>,
}

impl Project {
    pub fn from_scenario(scenario: &Scenario) -> Self {
        Self {
            surface: Surface {
                vertices: scenario.tin.vertices().to_vec(),
                triangles: scenario.tin.triangle_indices().to_vec(),
            },
            water: scenario.water.lines().to_vec(),
            sections: scenario.lines.sections().to_vec(),
        }
    }

    /// Builds the mesh, water network and dataset. Without triangles the
    /// surface vertices are triangulated.
    pub fn into_scenario(self, confluence_cache_capacity: usize) -> Result<Scenario> {
        let tin = if self.surface.triangles.is_empty() {
            Tin::from_points(self.surface.vertices)?
        } else {
            Tin::new(self.surface.vertices, self.surface.triangles)?
        };
        for s in &self.sections {
            if !tin.follows_mesh(&s.coords) {
                return Err(CatchmentError::inconsistent(format!(
                    "section {} does not follow the mesh",
                    s.id
                )));
            }
        }
        let water = WaterNetwork::with_cache_capacity(self.water, confluence_cache_capacity)?;
        Ok(Scenario {
            tin: Rc::new(tin),
            water: Rc::new(water),
            lines: CatchmentLines::new(self.sections)?,
        })
    }
}

pub fn read_project_json(path: impl AsRef<Path>) -> Result<Project> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    let project: Project = serde_json::from_str(&contents)?;
    info!(
        "read project with {} vertices, {} water lines and {} sections",
        project.surface.vertices.len(),
        project.water.len(),
        project.sections.len()
    );
    Ok(project)
}

pub fn write_project_json(path: impl AsRef<Path>, project: &Project) -> Result<()> {
    let json = serde_json::to_string_pretty(project)?;
    std::fs::write(path, json)?;
    Ok(())
}

/// Sections as a FeatureCollection of 3D LineStrings with an `id` property.
pub fn sections_to_geojson(sections: &[Section]) -> GeoJson {
    let features = sections
        .iter()
        .map(|s| {
            let coords = s.coords.iter().map(|c| vec![c.x, c.y, c.z]).collect();
            let mut properties = JsonObject::new();
            properties.insert("id".to_string(), JsonValue::from(s.id.clone()));
            Feature {
                bbox: None,
                geometry: Some(Geometry::new(Value::LineString(coords))),
                id: None,
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();
    GeoJson::FeatureCollection(FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    })
}

pub fn write_sections_geojson(path: impl AsRef<Path>, sections: &[Section]) -> Result<()> {
    std::fs::write(path, sections_to_geojson(sections).to_string())?;
    Ok(())
}

/// Reads LineString features back into sections. Features without an `id`
/// property are numbered by position; missing elevations become NaN.
pub fn sections_from_geojson(text: &str) -> Result<Vec<Section>> {
    let collection = match text.parse::<GeoJson>()? {
        GeoJson::FeatureCollection(fc) => fc,
        _ => return Err(CatchmentError::invalid("expected a FeatureCollection")),
    };
    let mut sections = Vec::with_capacity(collection.features.len());
    for (i, feature) in collection.features.iter().enumerate() {
        let id = match feature.property("id") {
            Some(JsonValue::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => (i + 1).to_string(),
        };
        let coords = match feature.geometry.as_ref().map(|g| &g.value) {
            Some(Value::LineString(coords)) => coords
                .iter()
                .map(|c| {
                    if c.len() < 2 {
                        return Err(CatchmentError::invalid(format!("section {} has a short position", id)));
                    }
                    Ok(Point3::new(c[0], c[1], c.get(2).copied().unwrap_or(f64::NAN)))
                })
                .collect::<Result<Vec<_>>>()?,
            _ => {
                return Err(CatchmentError::invalid(format!(
                    "feature {} is not a LineString",
                    id
                )))
            }
        };
        sections.push(Section::new(id, coords));
    }
    Ok(sections)
}

pub fn read_sections_geojson(path: impl AsRef<Path>) -> Result<Vec<Section>> {
    let text = std::fs::read_to_string(path)?;
    sections_from_geojson(&text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic;
    use assert_fs::prelude::*;

    #[test]
    fn project_json_round_trip_rebuilds_the_scenario() {
        let scenario = synthetic::crest().unwrap();
        let project = Project::from_scenario(&scenario);
        let dir = assert_fs::TempDir::new().unwrap();
        let file = dir.child("project.json");
        write_project_json(file.path(), &project).unwrap();
        file.assert(predicates::str::contains("\"sections\""));

        let rebuilt = read_project_json(file.path()).unwrap().into_scenario(10).unwrap();
        assert_eq!(rebuilt.tin.vertices().len(), scenario.tin.vertices().len());
        assert_eq!(rebuilt.lines.sections(), scenario.lines.sections());
        dir.close().unwrap();
    }

    #[test]
    fn sections_off_the_mesh_are_rejected() {
        let mut project = Project::from_scenario(&synthetic::crest().unwrap());
        project.sections[0].coords[1].x += 0.25;
        assert!(matches!(
            project.into_scenario(10),
            Err(CatchmentError::DataInconsistency(_))
        ));
    }

    #[test]
    fn geojson_keeps_ids_and_elevations() {
        let sections = vec![
            Section::new("a", vec![Point3::new(0.0, 0.0, 1.0), Point3::new(1.0, 0.0, 2.0)]),
            Section::new("b", vec![Point3::new(1.0, 0.0, 2.0), Point3::new(1.0, 1.0, 3.0)]),
        ];
        let text = sections_to_geojson(&sections).to_string();
        assert!(text.contains("FeatureCollection"));
        assert_eq!(sections_from_geojson(&text).unwrap(), sections);
    }

    #[test]
    fn geojson_rejects_points() {
        let text = r#"{"type":"FeatureCollection","features":[
            {"type":"Feature","properties":{},"geometry":{"type":"Point","coordinates":[1.0,2.0]}}]}"#;
        assert!(matches!(sections_from_geojson(text), Err(CatchmentError::InvalidInput(_))));
    }
}
