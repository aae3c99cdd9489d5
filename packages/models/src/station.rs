//! Stations, on their own and in the context of a dataset's results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use tethys_geometry::Geometry;
use tethys_identity::{IdHasher, IdentityError};

use crate::chunk::ResultChunk;
use crate::dataset::Dataset;
use crate::result_type::ResultDims;
use crate::stats::Stats;
use crate::time::TimeRange;
use crate::validation::{Rule, ValidationError, Violation, Violations};
use crate::{DeriveId, Record};

/// A monitoring location, identified by its geometry.
///
/// `P` is the type of the `properties` payload; free-form JSON by default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station<P = Map<String, Value>> {
    /// Id derived from `geometry`.
    pub station_id: String,
    /// Reference id given by the owner.
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// `OpenStreetMap` id of the feature.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub osm_id: Option<i64>,
    /// Location of the station.
    pub geometry: Geometry,
    /// Altitude in metres.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
    /// Additional station-specific properties.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<P>,
}

impl Station {
    /// Creates a station at `geometry` with a derived `station_id`.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::Encoding`] if the geometry is invalid.
    pub fn new(geometry: Geometry) -> Result<Self, IdentityError> {
        Self::build(geometry, None)
    }
}

impl<P> Station<P> {
    /// Creates a station carrying typed properties.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::Encoding`] if the geometry is invalid.
    pub fn with_properties(geometry: Geometry, properties: P) -> Result<Self, IdentityError> {
        Self::build(geometry, Some(properties))
    }

    fn build(geometry: Geometry, properties: Option<P>) -> Result<Self, IdentityError> {
        Ok(Self {
            station_id: IdHasher::default().station_id(&geometry)?,
            reference: None,
            name: None,
            osm_id: None,
            geometry,
            altitude: None,
            properties,
        })
    }

    pub(crate) fn check(&self, v: &mut Violations) {
        v.not_empty("station_id", &self.station_id);
        v.not_empty_opt("ref", self.reference.as_deref());
        v.not_empty_opt("name", self.name.as_deref());
        if let Some(altitude) = self.altitude {
            v.finite("altitude", altitude);
        }

        match self.derive_id() {
            Ok(derived) => v.ensure(
                derived == self.station_id,
                "station_id",
                Rule::IdMismatch,
                format!("expected {derived}"),
            ),
            Err(e) => {
                let errors = self.geometry.errors();
                if errors.is_empty() {
                    v.push("geometry", Rule::InvalidGeometry, e.to_string());
                }
                for e in errors {
                    v.push("geometry", Rule::InvalidGeometry, e.to_string());
                }
            }
        }
    }
}

impl<P: Serialize + DeserializeOwned> Record for Station<P> {
    const KIND: &'static str = "station";

    fn validate(&self) -> Vec<Violation> {
        let mut v = Violations::new();
        self.check(&mut v);
        v.into_vec()
    }
}

impl<P> DeriveId for Station<P> {
    fn derive_id(&self) -> Result<String, IdentityError> {
        IdHasher::default().station_id(&self.geometry)
    }
}

/// What a newly ingested chunk contributes to its station.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkSummary {
    /// Time span of the values in the chunk.
    pub time_range: TimeRange,
    /// Statistics of the values in the chunk.
    pub stats: Stats,
}

/// A station within one dataset, with the aggregate of its results.
///
/// The per-dataset `stations` list stores these without `results_chunks`
/// (see [`DatasetStation::without_chunks`]); the per-station object keeps
/// them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetStation {
    /// The base station fields.
    #[serde(flatten)]
    pub station: Station,
    /// Owning dataset.
    pub dataset_id: String,
    /// Dimension sizes of the station's results.
    pub dimensions: ResultDims,
    /// Heights present in the results, in metres.
    pub heights: Vec<f64>,
    /// Span of all results.
    pub time_range: TimeRange,
    /// Band indices present in the results.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bands: Option<Vec<i64>>,
    /// Statistics over all results.
    pub stats: Stats,
    /// Time of the last update.
    #[serde(with = "crate::datetime")]
    pub modified_date: DateTime<Utc>,
    /// Stored chunks of the results.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results_chunks: Option<Vec<ResultChunk>>,
}

impl DatasetStation {
    /// Creates a station entry without any chunks.
    #[must_use]
    pub fn new(
        station: Station,
        dataset_id: impl Into<String>,
        dimensions: ResultDims,
        time_range: TimeRange,
        stats: Stats,
        modified_date: DateTime<Utc>,
    ) -> Self {
        Self {
            station,
            dataset_id: dataset_id.into(),
            dimensions,
            heights: Vec::new(),
            time_range: TimeRange::new(time_range.from_date, time_range.to_date),
            bands: None,
            stats,
            modified_date: crate::datetime::truncate(modified_date),
            results_chunks: None,
        }
    }

    /// Creates the entry for a location's first chunk in `dataset`.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] as [`DatasetStation::absorb_chunk`]
    /// does.
    pub fn from_first_chunk(
        station: Station,
        dataset: &Dataset,
        dimensions: ResultDims,
        chunk: ResultChunk,
        summary: &ChunkSummary,
        modified_date: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        let mut entry = Self::new(
            station,
            dataset.dataset_id.clone(),
            dimensions,
            summary.time_range,
            Stats::empty(),
            modified_date,
        );
        entry.absorb_chunk(dataset, chunk, summary, modified_date)?;
        Ok(entry)
    }

    /// The station id.
    #[must_use]
    pub fn station_id(&self) -> &str {
        &self.station.station_id
    }

    /// A copy without `results_chunks`, as stored in the stations list.
    #[must_use]
    pub fn without_chunks(&self) -> Self {
        Self {
            results_chunks: None,
            ..self.clone()
        }
    }

    /// Adds a chunk and its summary to the station.
    ///
    /// Widens `time_range`, adds the chunk's height (converted from
    /// millimetres) and band, merges `stats` and records the chunk. A chunk
    /// with the same `chunk_id` and `version_date` as an existing one
    /// replaces it without merging `stats` again, so re-ingesting a chunk
    /// leaves the aggregate as it was. Timestamps are kept at second
    /// precision.
    ///
    /// The summary's time span must lie inside the chunk's bucket.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] if the updated station would not be
    /// valid for `dataset` (see [`DatasetStation::validate_for`]). The
    /// station is unchanged on error.
    #[allow(clippy::cast_precision_loss)]
    pub fn absorb_chunk(
        &mut self,
        dataset: &Dataset,
        mut chunk: ResultChunk,
        summary: &ChunkSummary,
        modified_date: DateTime<Utc>,
    ) -> Result<(), ValidationError> {
        chunk.version_date = crate::datetime::truncate(chunk.version_date);
        let replacing = self
            .results_chunks
            .iter()
            .flatten()
            .any(|c| c.same_slot(&chunk));

        let mut v = Violations::new();
        summary.time_range.check("summary.time_range", &mut v);
        summary.stats.check("summary.stats", &mut v);
        if let Some(window) = chunk.window(dataset.time_interval()) {
            v.ensure(
                window.contains(&summary.time_range),
                "summary.time_range",
                Rule::NotContained,
                format!("values fall outside chunk day {:?}", chunk.chunk_day),
            );
        }

        let mut next = self.clone();
        next.time_range = next.time_range.union(&summary.time_range);
        if !replacing {
            next.stats = next.stats.merge(&summary.stats);
        }
        next.modified_date = crate::datetime::truncate(modified_date);

        if let Some(height) = chunk.height {
            let height = height as f64 / 1000.0;
            if !next.heights.contains(&height) {
                next.heights.push(height);
                next.heights.sort_by(f64::total_cmp);
            }
        }
        if let Some(band) = chunk.band {
            let bands = next.bands.get_or_insert_with(Vec::new);
            if !bands.contains(&band) {
                bands.push(band);
                bands.sort_unstable();
            }
        }

        let chunks = next.results_chunks.get_or_insert_with(Vec::new);
        if let Some(existing) = chunks.iter_mut().find(|c| c.same_slot(&chunk)) {
            log::debug!(
                "Replacing chunk {} version {} of station {}",
                chunk.chunk_id,
                crate::datetime::format(&chunk.version_date),
                chunk.station_id
            );
            *existing = chunk;
        } else {
            chunks.push(chunk);
        }

        v.nest("", next.validate_for(dataset));
        ValidationError::check(Self::KIND, v.into_vec())?;

        *self = next;
        Ok(())
    }

    /// Validates the station against its dataset.
    ///
    /// On top of [`Record::validate`]: the station must reference the
    /// dataset, use the dimension struct of the dataset's result type, list
    /// bands only for banded types, and have a time range inside the
    /// dataset's (when the dataset has one). Every chunk must be valid for
    /// the dataset and its bucket must overlap the station's time range.
    #[must_use]
    pub fn validate_for(&self, dataset: &Dataset) -> Vec<Violation> {
        let mut v = Violations::new();
        v.nest("", self.validate());
        let rule = dataset.result_type.rule();

        v.ensure(
            self.dataset_id == dataset.dataset_id,
            "dataset_id",
            Rule::Reference,
            format!(
                "station belongs to {}, not {}",
                self.dataset_id, dataset.dataset_id
            ),
        );
        v.ensure(
            self.dimensions.result_type() == dataset.result_type,
            "dimensions",
            Rule::DimensionsMismatch,
            format!(
                "{} dimensions in a {} dataset",
                self.dimensions.result_type(),
                dataset.result_type
            ),
        );
        v.ensure(
            rule.band || self.bands.is_none(),
            "bands",
            Rule::DimensionForbidden,
            format!("{} datasets have no bands", dataset.result_type),
        );

        if let Some(range) = &dataset.time_range
            && self.time_range.is_ordered()
        {
            v.ensure(
                range.contains(&self.time_range),
                "time_range",
                Rule::NotContained,
                "outside the dataset time_range",
            );
        }

        for (index, chunk) in self.results_chunks.iter().flatten().enumerate() {
            let mut chunk_violations = Violations::new();
            chunk.check_against(dataset, &mut chunk_violations);
            if let Some(window) = chunk.window(dataset.time_interval()) {
                chunk_violations.ensure(
                    window.overlaps(&self.time_range),
                    "chunk_day",
                    Rule::NotContained,
                    "chunk bucket lies outside the station time_range",
                );
            }
            v.nest(
                &format!("results_chunks[{index}]"),
                chunk_violations.into_vec(),
            );
        }

        v.into_vec()
    }
}

impl Record for DatasetStation {
    const KIND: &'static str = "dataset station";

    fn validate(&self) -> Vec<Violation> {
        let mut v = Violations::new();
        self.station.check(&mut v);
        v.not_empty("dataset_id", &self.dataset_id);
        v.all_finite("heights", &self.heights);
        self.time_range.check("time_range", &mut v);
        self.stats.check("stats", &mut v);

        if let Some(bands) = &self.bands {
            for (index, band) in bands.iter().enumerate() {
                v.ensure(
                    *band >= 0,
                    &format!("bands[{index}]"),
                    Rule::Negative,
                    format!("{band} must not be negative"),
                );
            }
        }

        for (index, chunk) in self.results_chunks.iter().flatten().enumerate() {
            let mut chunk_violations = Violations::new();
            chunk_violations.nest("", chunk.validate());
            chunk_violations.ensure(
                chunk.station_id == self.station.station_id,
                "station_id",
                Rule::Reference,
                format!("chunk belongs to station {}", chunk.station_id),
            );
            chunk_violations.ensure(
                chunk.dataset_id == self.dataset_id,
                "dataset_id",
                Rule::Reference,
                format!("chunk belongs to dataset {}", chunk.dataset_id),
            );
            v.nest(
                &format!("results_chunks[{index}]"),
                chunk_violations.into_vec(),
            );
        }

        v.into_vec()
    }
}

impl DeriveId for DatasetStation {
    fn derive_id(&self) -> Result<String, IdentityError> {
        self.station.derive_id()
    }
}
