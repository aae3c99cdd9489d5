#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! GeoJSON-style geometry model shared by stations, datasets, permits and
//! plans.
//!
//! A [`Geometry`] is one of the six simple-feature variants, discriminated
//! by the `type` field exactly as in `GeoJSON`. Coordinates are positions of
//! two (lon, lat) or three (lon, lat, altitude) numbers. Every geometry must
//! pass [`Geometry::validate`] before it can be encoded as WKB (see
//! [`wkb`]), which is the canonical byte form used for station ids.

pub mod convert;
pub mod wkb;

use serde::{Deserialize, Serialize};

/// A single coordinate tuple: `[lon, lat]` or `[lon, lat, altitude]`.
pub type Position = Vec<f64>;

/// Errors raised when a geometry cannot be validated or canonically encoded.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GeometryError {
    /// A coordinate array at some nesting level has no elements.
    #[error("{path}: coordinate array is empty")]
    EmptyCoordinates {
        /// Location of the empty array (e.g. `coordinates[0]`).
        path: String,
    },

    /// A position does not have 2 or 3 elements.
    #[error("{path}: position has {len} elements, expected 2 or 3")]
    InvalidPosition {
        /// Location of the offending position.
        path: String,
        /// Number of elements found.
        len: usize,
    },

    /// Positions within one geometry mix 2D and 3D tuples.
    #[error("{path}: position has {found} elements but the geometry is {expected}D")]
    MixedDimensions {
        /// Location of the offending position.
        path: String,
        /// Dimension established by the first position.
        expected: usize,
        /// Dimension of the offending position.
        found: usize,
    },

    /// A coordinate value is NaN or infinite.
    #[error("{path}: coordinate is not a finite number")]
    NonFinite {
        /// Location of the offending value.
        path: String,
    },

    /// An array is too long to be counted in a WKB `u32`.
    #[error("{path}: {len} elements exceed the WKB count limit")]
    TooLarge {
        /// Location of the array.
        path: String,
        /// Number of elements.
        len: usize,
    },

    /// The geometry type has no counterpart in this model.
    #[error("unsupported geometry type: {type_name}")]
    UnsupportedType {
        /// Name of the rejected type.
        type_name: String,
    },
}

/// A validated-on-demand `GeoJSON` geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Geometry {
    /// A single position.
    Point {
        /// The position.
        coordinates: Position,
    },
    /// A line through two or more positions.
    LineString {
        /// The vertices of the line.
        coordinates: Vec<Position>,
    },
    /// A polygon made of an exterior ring followed by interior rings.
    Polygon {
        /// The rings of the polygon.
        coordinates: Vec<Vec<Position>>,
    },
    /// An unordered-in-meaning, ordered-in-encoding set of points.
    MultiPoint {
        /// The points.
        coordinates: Vec<Position>,
    },
    /// Several lines.
    MultiLineString {
        /// The lines.
        coordinates: Vec<Vec<Position>>,
    },
    /// Several polygons.
    MultiPolygon {
        /// The polygons.
        coordinates: Vec<Vec<Vec<Position>>>,
    },
}

impl Geometry {
    /// Creates a 2D point.
    #[must_use]
    pub fn point(lon: f64, lat: f64) -> Self {
        Self::Point {
            coordinates: vec![lon, lat],
        }
    }

    /// Returns the `GeoJSON` type name of this variant.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Point { .. } => "Point",
            Self::LineString { .. } => "LineString",
            Self::Polygon { .. } => "Polygon",
            Self::MultiPoint { .. } => "MultiPoint",
            Self::MultiLineString { .. } => "MultiLineString",
            Self::MultiPolygon { .. } => "MultiPolygon",
        }
    }

    /// Checks the structural invariants of the geometry.
    ///
    /// Every coordinate array must be non-empty, every position must have 2
    /// or 3 finite elements, and all positions must share one dimension.
    ///
    /// # Errors
    ///
    /// Returns the first [`GeometryError`] found, in document order. Use
    /// [`Geometry::errors`] to get all of them.
    pub fn validate(&self) -> Result<(), GeometryError> {
        self.errors().into_iter().next().map_or(Ok(()), Err)
    }

    /// Every structural problem of the geometry, in document order.
    ///
    /// An empty list means the geometry is valid.
    #[must_use]
    pub fn errors(&self) -> Vec<GeometryError> {
        let mut checker = Checker::default();
        let path = "coordinates";
        match self {
            Self::Point { coordinates } => checker.position(path, coordinates),
            Self::LineString { coordinates } | Self::MultiPoint { coordinates } => {
                checker.positions(path, coordinates);
            }
            Self::Polygon { coordinates } | Self::MultiLineString { coordinates } => {
                checker.lines(path, coordinates);
            }
            Self::MultiPolygon { coordinates } => {
                checker.non_empty(path, coordinates);
                for (i, polygon) in coordinates.iter().enumerate() {
                    checker.lines(&format!("{path}[{i}]"), polygon);
                }
            }
        }
        checker.errors
    }

    /// Returns the coordinate dimension (2 or 3) of the first position.
    ///
    /// Returns `None` for a geometry without any position.
    #[must_use]
    pub fn dimension(&self) -> Option<usize> {
        let mut dimension = None;
        self.for_each_position(&mut |position: &[f64]| {
            if dimension.is_none() {
                dimension = Some(position.len());
            }
        });
        dimension
    }

    /// Computes the lon/lat bounding box of every position.
    ///
    /// Returns `None` for a geometry without any position.
    #[must_use]
    pub fn bounds(&self) -> Option<Bounds> {
        let mut bounds: Option<Bounds> = None;
        self.for_each_position(&mut |position: &[f64]| {
            if let [lon, lat, ..] = *position {
                let point = Bounds {
                    min_lon: lon,
                    min_lat: lat,
                    max_lon: lon,
                    max_lat: lat,
                };
                bounds = Some(bounds.map_or(point, |b| b.union(&point)));
            }
        });
        bounds
    }

    fn for_each_position(&self, f: &mut impl FnMut(&[f64])) {
        match self {
            Self::Point { coordinates } => f(coordinates.as_slice()),
            Self::LineString { coordinates } | Self::MultiPoint { coordinates } => {
                coordinates.iter().for_each(|p| f(p.as_slice()));
            }
            Self::Polygon { coordinates } | Self::MultiLineString { coordinates } => {
                coordinates.iter().flatten().for_each(|p| f(p.as_slice()));
            }
            Self::MultiPolygon { coordinates } => {
                coordinates
                    .iter()
                    .flatten()
                    .flatten()
                    .for_each(|p| f(p.as_slice()));
            }
        }
    }
}

/// An axis-aligned lon/lat bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    /// Western edge.
    pub min_lon: f64,
    /// Southern edge.
    pub min_lat: f64,
    /// Eastern edge.
    pub max_lon: f64,
    /// Northern edge.
    pub max_lat: f64,
}

impl Bounds {
    /// Returns the smallest box covering both `self` and `other`.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        Self {
            min_lon: self.min_lon.min(other.min_lon),
            min_lat: self.min_lat.min(other.min_lat),
            max_lon: self.max_lon.max(other.max_lon),
            max_lat: self.max_lat.max(other.max_lat),
        }
    }

    /// Converts the box into a closed rectangular polygon (counter-clockwise
    /// exterior ring starting at the south-west corner).
    #[must_use]
    pub fn to_polygon(&self) -> Geometry {
        Geometry::Polygon {
            coordinates: vec![vec![
                vec![self.min_lon, self.min_lat],
                vec![self.max_lon, self.min_lat],
                vec![self.max_lon, self.max_lat],
                vec![self.min_lon, self.max_lat],
                vec![self.min_lon, self.min_lat],
            ]],
        }
    }
}

/// Collects errors while walking the coordinate arrays.
#[derive(Default)]
struct Checker {
    /// Dimension established by the first well-formed position.
    dimension: Option<usize>,
    errors: Vec<GeometryError>,
}

impl Checker {
    fn non_empty<T>(&mut self, path: &str, items: &[T]) {
        if items.is_empty() {
            self.errors.push(GeometryError::EmptyCoordinates {
                path: path.to_string(),
            });
        }
    }

    fn position(&mut self, path: &str, position: &[f64]) {
        let len = position.len();
        if !(2..=3).contains(&len) {
            self.errors.push(GeometryError::InvalidPosition {
                path: path.to_string(),
                len,
            });
            return;
        }

        for (i, value) in position.iter().enumerate() {
            if !value.is_finite() {
                self.errors.push(GeometryError::NonFinite {
                    path: format!("{path}[{i}]"),
                });
            }
        }

        match self.dimension {
            None => self.dimension = Some(len),
            Some(expected) if expected != len => {
                self.errors.push(GeometryError::MixedDimensions {
                    path: path.to_string(),
                    expected,
                    found: len,
                });
            }
            Some(_) => {}
        }
    }

    fn positions(&mut self, path: &str, positions: &[Position]) {
        self.non_empty(path, positions);
        for (i, position) in positions.iter().enumerate() {
            self.position(&format!("{path}[{i}]"), position);
        }
    }

    fn lines(&mut self, path: &str, lines: &[Vec<Position>]) {
        self.non_empty(path, lines);
        for (i, line) in lines.iter().enumerate() {
            self.positions(&format!("{path}[{i}]"), line);
        }
    }
}
