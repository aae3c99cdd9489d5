//! Well-known binary (WKB) encoding of a [`Geometry`].
//!
//! Output is little-endian. Three-dimensional geometries set the
//! `0x8000_0000` Z flag on every type code, which is the form GEOS (and
//! therefore shapely) writes. Coordinate order is preserved exactly as
//! given; no ring re-orientation or point sorting is performed, so two
//! geometries that differ only in vertex order encode differently.

use crate::{Geometry, GeometryError, Position};

const BYTE_ORDER_LITTLE_ENDIAN: u8 = 1;

const WKB_POINT: u32 = 1;
const WKB_LINE_STRING: u32 = 2;
const WKB_POLYGON: u32 = 3;
const WKB_MULTI_POINT: u32 = 4;
const WKB_MULTI_LINE_STRING: u32 = 5;
const WKB_MULTI_POLYGON: u32 = 6;

const WKB_Z_FLAG: u32 = 0x8000_0000;

/// Encodes a geometry as WKB bytes.
///
/// # Errors
///
/// Returns a [`GeometryError`] if the geometry fails validation or an array
/// is too long for a WKB element count.
pub fn encode(geometry: &Geometry) -> Result<Vec<u8>, GeometryError> {
    geometry.validate()?;

    let mut writer = WkbWriter {
        buf: Vec::with_capacity(64),
        has_z: geometry.dimension() == Some(3),
    };
    writer.geometry(geometry)?;
    Ok(writer.buf)
}

/// Encodes a geometry as an uppercase hex WKB string.
///
/// # Errors
///
/// See [`encode`].
pub fn encode_hex(geometry: &Geometry) -> Result<String, GeometryError> {
    encode(geometry).map(hex::encode_upper)
}

impl Geometry {
    /// Shorthand for [`encode`].
    ///
    /// # Errors
    ///
    /// See [`encode`].
    pub fn to_wkb(&self) -> Result<Vec<u8>, GeometryError> {
        encode(self)
    }

    /// Shorthand for [`encode_hex`].
    ///
    /// # Errors
    ///
    /// See [`encode`].
    pub fn to_wkb_hex(&self) -> Result<String, GeometryError> {
        encode_hex(self)
    }
}

struct WkbWriter {
    buf: Vec<u8>,
    has_z: bool,
}

impl WkbWriter {
    fn geometry(&mut self, geometry: &Geometry) -> Result<(), GeometryError> {
        match geometry {
            Geometry::Point { coordinates } => {
                self.header(WKB_POINT);
                self.position(coordinates);
            }
            Geometry::LineString { coordinates } => {
                self.header(WKB_LINE_STRING);
                self.positions("coordinates", coordinates)?;
            }
            Geometry::Polygon { coordinates } => {
                self.header(WKB_POLYGON);
                self.rings("coordinates", coordinates)?;
            }
            Geometry::MultiPoint { coordinates } => {
                self.header(WKB_MULTI_POINT);
                self.count("coordinates", coordinates.len())?;
                for point in coordinates {
                    self.header(WKB_POINT);
                    self.position(point);
                }
            }
            Geometry::MultiLineString { coordinates } => {
                self.header(WKB_MULTI_LINE_STRING);
                self.count("coordinates", coordinates.len())?;
                for (i, line) in coordinates.iter().enumerate() {
                    self.header(WKB_LINE_STRING);
                    self.positions(&format!("coordinates[{i}]"), line)?;
                }
            }
            Geometry::MultiPolygon { coordinates } => {
                self.header(WKB_MULTI_POLYGON);
                self.count("coordinates", coordinates.len())?;
                for (i, polygon) in coordinates.iter().enumerate() {
                    self.header(WKB_POLYGON);
                    self.rings(&format!("coordinates[{i}]"), polygon)?;
                }
            }
        }
        Ok(())
    }

    fn header(&mut self, type_code: u32) {
        let type_code = if self.has_z {
            type_code | WKB_Z_FLAG
        } else {
            type_code
        };
        self.buf.push(BYTE_ORDER_LITTLE_ENDIAN);
        self.buf.extend_from_slice(&type_code.to_le_bytes());
    }

    fn count(&mut self, path: &str, len: usize) -> Result<(), GeometryError> {
        let n = u32::try_from(len).map_err(|_| GeometryError::TooLarge {
            path: path.to_string(),
            len,
        })?;
        self.buf.extend_from_slice(&n.to_le_bytes());
        Ok(())
    }

    fn position(&mut self, position: &[f64]) {
        for value in position {
            self.buf.extend_from_slice(&value.to_le_bytes());
        }
    }

    fn positions(&mut self, path: &str, positions: &[Position]) -> Result<(), GeometryError> {
        self.count(path, positions.len())?;
        for position in positions {
            self.position(position);
        }
        Ok(())
    }

    fn rings(&mut self, path: &str, rings: &[Vec<Position>]) -> Result<(), GeometryError> {
        self.count(path, rings.len())?;
        for (i, ring) in rings.iter().enumerate() {
            self.positions(&format!("{path}[{i}]"), ring)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_matches_reference_encoding() {
        let hex = Geometry::point(1.0, 2.0).to_wkb_hex().unwrap();
        assert_eq!(hex, "0101000000000000000000F03F0000000000000040");
    }

    #[test]
    fn point_z_sets_flag() {
        let point = Geometry::Point {
            coordinates: vec![1.0, 2.0, 3.0],
        };
        let wkb = point.to_wkb().unwrap();
        assert_eq!(wkb.len(), 1 + 4 + 3 * 8);
        assert_eq!(&wkb[1..5], &(WKB_POINT | WKB_Z_FLAG).to_le_bytes());
    }

    #[test]
    fn line_string_has_count_and_points() {
        let line = Geometry::LineString {
            coordinates: vec![vec![0.0, 0.0], vec![1.0, 1.0], vec![2.0, 0.0]],
        };
        let wkb = line.to_wkb().unwrap();
        assert_eq!(wkb.len(), 1 + 4 + 4 + 3 * 16);
        assert_eq!(&wkb[5..9], &3u32.to_le_bytes());
    }

    #[test]
    fn multi_point_nests_point_headers() {
        let multi = Geometry::MultiPoint {
            coordinates: vec![vec![0.0, 0.0], vec![1.0, 1.0]],
        };
        let wkb = multi.to_wkb().unwrap();
        assert_eq!(wkb.len(), 1 + 4 + 4 + 2 * (1 + 4 + 16));
        assert_eq!(&wkb[9..14], &[1, 1, 0, 0, 0]);
    }

    #[test]
    fn vertex_order_changes_encoding() {
        let a = Geometry::MultiPoint {
            coordinates: vec![vec![0.0, 0.0], vec![1.0, 1.0]],
        };
        let b = Geometry::MultiPoint {
            coordinates: vec![vec![1.0, 1.0], vec![0.0, 0.0]],
        };
        assert_ne!(a.to_wkb().unwrap(), b.to_wkb().unwrap());
    }

    #[test]
    fn invalid_geometry_is_not_encoded() {
        let polygon = Geometry::Polygon {
            coordinates: vec![],
        };
        assert!(matches!(
            polygon.to_wkb(),
            Err(GeometryError::EmptyCoordinates { .. })
        ));
    }
}
