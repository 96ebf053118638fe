// Vector geometry model and its GeoJSON form

use crate::core::error::Result;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coord {
    pub x: f64,
    pub y: f64,
    pub z: Option<f64>,
}

impl Coord {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y, z: None }
    }

    pub fn with_z(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z: Some(z) }
    }

    fn to_json(self) -> Value {
        match self.z {
            Some(z) => json!([self.x, self.y, z]),
            None => json!([self.x, self.y]),
        }
    }
}

/// Polygons are lists of rings, the first ring being the exterior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Geometry {
    Point(Coord),
    MultiPoint(Vec<Coord>),
    LineString(Vec<Coord>),
    MultiLineString(Vec<Vec<Coord>>),
    Polygon(Vec<Vec<Coord>>),
    MultiPolygon(Vec<Vec<Vec<Coord>>>),
}

impl Geometry {
    pub fn element_type(&self) -> &'static str {
        match self {
            Geometry::Point(_) => "Point",
            Geometry::MultiPoint(_) => "MultiPoint",
            Geometry::LineString(_) => "LineString",
            Geometry::MultiLineString(_) => "MultiLineString",
            Geometry::Polygon(_) => "Polygon",
            Geometry::MultiPolygon(_) => "MultiPolygon",
        }
    }

    /// Applies `f` to every coordinate in place, stopping at the first error.
    pub fn try_map_coords<F>(&mut self, mut f: F) -> Result<()>
    where
        F: FnMut(&mut Coord) -> Result<()>,
    {
        match self {
            Geometry::Point(c) => f(c),
            Geometry::MultiPoint(cs) | Geometry::LineString(cs) => cs.iter_mut().try_for_each(&mut f),
            Geometry::MultiLineString(lines) | Geometry::Polygon(lines) => lines
                .iter_mut()
                .flatten()
                .try_for_each(&mut f),
            Geometry::MultiPolygon(polygons) => polygons
                .iter_mut()
                .flatten()
                .flatten()
                .try_for_each(&mut f),
        }
    }

    pub fn coords(&self) -> Vec<Coord> {
        match self {
            Geometry::Point(c) => vec![*c],
            Geometry::MultiPoint(cs) | Geometry::LineString(cs) => cs.clone(),
            Geometry::MultiLineString(lines) | Geometry::Polygon(lines) => {
                lines.iter().flatten().copied().collect()
            }
            Geometry::MultiPolygon(polygons) => polygons.iter().flatten().flatten().copied().collect(),
        }
    }

    pub fn to_geojson(&self) -> Value {
        let coordinates = match self {
            Geometry::Point(c) => c.to_json(),
            Geometry::MultiPoint(cs) | Geometry::LineString(cs) => ring_json(cs),
            Geometry::MultiLineString(lines) | Geometry::Polygon(lines) => {
                Value::Array(lines.iter().map(|l| ring_json(l)).collect())
            }
            Geometry::MultiPolygon(polygons) => Value::Array(
                polygons
                    .iter()
                    .map(|p| Value::Array(p.iter().map(|r| ring_json(r)).collect()))
                    .collect(),
            ),
        };
        json!({ "type": self.element_type(), "coordinates": coordinates })
    }
}

fn ring_json(coords: &[Coord]) -> Value {
    Value::Array(coords.iter().map(|c| c.to_json()).collect())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Null,
    Boolean(bool),
    Integer(i64),
    Number(f64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub geometry_id: String,
    pub geometry: Geometry,
    pub attributes: BTreeMap<String, AttributeValue>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::IngestError;

    fn square() -> Geometry {
        Geometry::Polygon(vec![vec![
            Coord::new(0.0, 0.0),
            Coord::new(1.0, 0.0),
            Coord::new(1.0, 1.0),
            Coord::new(0.0, 0.0),
        ]])
    }

    #[test]
    fn test_geojson_polygon() {
        let value = square().to_geojson();
        assert_eq!(value["type"], "Polygon");
        assert_eq!(value["coordinates"][0][2], json!([1.0, 1.0]));
    }

    #[test]
    fn test_geojson_point_with_z() {
        let value = Geometry::Point(Coord::with_z(9.5, 48.1, 310.0)).to_geojson();
        assert_eq!(value, json!({"type": "Point", "coordinates": [9.5, 48.1, 310.0]}));
    }

    #[test]
    fn test_try_map_coords_visits_every_coordinate() {
        let mut geometry = square();
        geometry
            .try_map_coords(|c| {
                c.x += 10.0;
                Ok(())
            })
            .unwrap();
        assert!(geometry.coords().iter().all(|c| c.x >= 10.0));
    }

    #[test]
    fn test_try_map_coords_stops_on_error() {
        let mut geometry = Geometry::LineString(vec![Coord::new(0.0, 0.0), Coord::new(1.0, 1.0)]);
        let mut visited = 0;
        let result = geometry.try_map_coords(|_| {
            visited += 1;
            Err(IngestError::TransformUnavailable("boom".into()))
        });
        assert!(result.is_err());
        assert_eq!(visited, 1);
    }

    #[test]
    fn test_attribute_values_serialize_untagged() {
        let text = serde_json::to_value(AttributeValue::Text("barley".into())).unwrap();
        let null = serde_json::to_value(AttributeValue::Null).unwrap();
        assert_eq!(text, json!("barley"));
        assert_eq!(null, Value::Null);
    }
}
