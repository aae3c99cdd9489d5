//! Result types and the dimensions each one implies.
//!
//! Which optional coordinates a chunk carries, which dimension struct a
//! station uses and whether a dataset may list bands are all answered by
//! one [`DimensionRule`] per [`ResultType`].

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use tethys_identity::ChunkCoords;

use crate::validation::{Rule, Violations};

/// How a dataset's results are structurally stored.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ResultType {
    /// Values over time at fixed geometries.
    TimeSeries,
    /// Values over time on a regular lat/lon grid.
    Grid,
    /// Values along moving geometries.
    Trajectory,
    /// Banded time series.
    TimeSeriesBands,
    /// Banded grid.
    GridBands,
    /// Banded trajectory.
    TrajectoryBands,
}

/// How a result type locates values in space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpatialDims {
    /// A `geometry` dimension indexing station geometries.
    Geometry,
    /// `lat` and `lon` grid dimensions.
    LatLon,
}

/// The dimensions implied by a [`ResultType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DimensionRule {
    /// Has a `time` dimension (and therefore may chunk by day).
    pub time: bool,
    /// Has a `height` dimension.
    pub height: bool,
    /// Has a `band` dimension.
    pub band: bool,
    /// Spatial dimensions.
    pub spatial: SpatialDims,
}

impl ResultType {
    /// Returns all variants of this enum.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::TimeSeries,
            Self::Grid,
            Self::Trajectory,
            Self::TimeSeriesBands,
            Self::GridBands,
            Self::TrajectoryBands,
        ]
    }

    /// The dimension rule of this result type.
    #[must_use]
    pub const fn rule(self) -> DimensionRule {
        let (time, height, band, spatial) = match self {
            Self::TimeSeries => (true, true, false, SpatialDims::Geometry),
            Self::Grid => (true, true, false, SpatialDims::LatLon),
            Self::Trajectory => (false, false, false, SpatialDims::Geometry),
            Self::TimeSeriesBands => (true, true, true, SpatialDims::Geometry),
            Self::GridBands => (true, true, true, SpatialDims::LatLon),
            Self::TrajectoryBands => (false, false, true, SpatialDims::Geometry),
        };
        DimensionRule {
            time,
            height,
            band,
            spatial,
        }
    }
}

impl DimensionRule {
    /// Checks the presence pattern of a chunk's coordinates.
    ///
    /// `height` and `band` must be present exactly when the rule has those
    /// dimensions. `chunk_day` is forbidden without a time dimension; with
    /// one it is required exactly when the dataset chunks time (has a
    /// `time_interval`), and must then be a multiple of that interval.
    pub fn check_chunk(
        &self,
        coords: &ChunkCoords,
        time_interval: Option<i64>,
        violations: &mut Violations,
    ) {
        presence(violations, "height", self.height, coords.height.is_some());
        presence(violations, "band", self.band, coords.band.is_some());

        let chunked = self.time && time_interval.is_some();
        presence(violations, "chunk_day", chunked, coords.chunk_day.is_some());

        if let (Some(day), Some(interval)) = (coords.chunk_day, time_interval)
            && chunked
            && interval > 0
        {
            violations.ensure(
                i64::from(day).rem_euclid(interval) == 0,
                "chunk_day",
                Rule::Misaligned,
                format!("{day} is not a multiple of time_interval {interval}"),
            );
        }
    }
}

fn presence(violations: &mut Violations, field: &str, expected: bool, present: bool) {
    match (expected, present) {
        (true, false) => violations.push(field, Rule::DimensionRequired, "required by result type"),
        (false, true) => {
            violations.push(field, Rule::DimensionForbidden, "not allowed by result type");
        }
        _ => {}
    }
}

/// Dimension sizes of a `time_series` result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimeSeriesDims {
    /// Size of `time`.
    pub time: u64,
    /// Size of `geometry`.
    pub geometry: u64,
    /// Size of `height`.
    pub height: u64,
}

/// Dimension sizes of a `grid` result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GridDims {
    /// Size of `time`.
    pub time: u64,
    /// Size of `lat`.
    pub lat: u64,
    /// Size of `lon`.
    pub lon: u64,
    /// Size of `height`.
    pub height: u64,
}

/// Dimension sizes of a `trajectory` result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrajectoryDims {
    /// Size of `geometry`.
    pub geometry: u64,
}

/// Dimension sizes of a `time_series_bands` result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimeSeriesBandsDims {
    /// Size of `time`.
    pub time: u64,
    /// Size of `geometry`.
    pub geometry: u64,
    /// Size of `height`.
    pub height: u64,
    /// Size of `band`.
    pub band: u64,
}

/// Dimension sizes of a `grid_bands` result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GridBandsDims {
    /// Size of `time`.
    pub time: u64,
    /// Size of `lat`.
    pub lat: u64,
    /// Size of `lon`.
    pub lon: u64,
    /// Size of `height`.
    pub height: u64,
    /// Size of `band`.
    pub band: u64,
}

/// Dimension sizes of a `trajectory_bands` result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrajectoryBandsDims {
    /// Size of `geometry`.
    pub geometry: u64,
    /// Size of `band`.
    pub band: u64,
}

/// The dimension sizes of a station's results; the variant is recognised
/// from the set of keys present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResultDims {
    /// `time_series` dimensions.
    TimeSeries(TimeSeriesDims),
    /// `grid` dimensions.
    Grid(GridDims),
    /// `trajectory` dimensions.
    Trajectory(TrajectoryDims),
    /// `time_series_bands` dimensions.
    TimeSeriesBands(TimeSeriesBandsDims),
    /// `grid_bands` dimensions.
    GridBands(GridBandsDims),
    /// `trajectory_bands` dimensions.
    TrajectoryBands(TrajectoryBandsDims),
}

impl ResultDims {
    /// The result type these dimensions belong to.
    #[must_use]
    pub const fn result_type(&self) -> ResultType {
        match self {
            Self::TimeSeries(_) => ResultType::TimeSeries,
            Self::Grid(_) => ResultType::Grid,
            Self::Trajectory(_) => ResultType::Trajectory,
            Self::TimeSeriesBands(_) => ResultType::TimeSeriesBands,
            Self::GridBands(_) => ResultType::GridBands,
            Self::TrajectoryBands(_) => ResultType::TrajectoryBands,
        }
    }

    /// Size of the `band` dimension, if the result type has one.
    #[must_use]
    pub const fn band_len(&self) -> Option<u64> {
        match self {
            Self::TimeSeriesBands(d) => Some(d.band),
            Self::GridBands(d) => Some(d.band),
            Self::TrajectoryBands(d) => Some(d.band),
            Self::TimeSeries(_) | Self::Grid(_) | Self::Trajectory(_) => None,
        }
    }
}
