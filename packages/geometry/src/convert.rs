//! Conversions between [`Geometry`] and the `geojson` crate's types.

use geojson::Value;

use crate::{Geometry, GeometryError};

impl From<&Geometry> for geojson::Geometry {
    fn from(geometry: &Geometry) -> Self {
        let value = match geometry.clone() {
            Geometry::Point { coordinates } => Value::Point(coordinates),
            Geometry::LineString { coordinates } => Value::LineString(coordinates),
            Geometry::Polygon { coordinates } => Value::Polygon(coordinates),
            Geometry::MultiPoint { coordinates } => Value::MultiPoint(coordinates),
            Geometry::MultiLineString { coordinates } => Value::MultiLineString(coordinates),
            Geometry::MultiPolygon { coordinates } => Value::MultiPolygon(coordinates),
        };
        Self::new(value)
    }
}

impl TryFrom<geojson::Geometry> for Geometry {
    type Error = GeometryError;

    /// Converts and validates a `geojson` geometry.
    ///
    /// `GeometryCollection` has no counterpart and is rejected.
    fn try_from(geometry: geojson::Geometry) -> Result<Self, Self::Error> {
        let geometry = match geometry.value {
            Value::Point(coordinates) => Self::Point { coordinates },
            Value::LineString(coordinates) => Self::LineString { coordinates },
            Value::Polygon(coordinates) => Self::Polygon { coordinates },
            Value::MultiPoint(coordinates) => Self::MultiPoint { coordinates },
            Value::MultiLineString(coordinates) => Self::MultiLineString { coordinates },
            Value::MultiPolygon(coordinates) => Self::MultiPolygon { coordinates },
            Value::GeometryCollection(_) => {
                return Err(GeometryError::UnsupportedType {
                    type_name: "GeometryCollection".to_string(),
                });
            }
        };
        geometry.validate()?;
        Ok(geometry)
    }
}
