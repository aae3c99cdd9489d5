//! Dataset catalog entries and their provenance graph.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tethys_geometry::Geometry;
use tethys_identity::{DATASET_IDENTITY_FIELDS, FIELD_DELIMITER, IdHasher, IdentityError};

use crate::result_type::{DimensionRule, ResultType, SpatialDims};
use crate::station::DatasetStation;
use crate::time::TimeRange;
use crate::validation::{Rule, ValidationError, Violation, Violations};
use crate::{DeriveId, Record};

/// The eight fields a `dataset_id` is derived from. Changing any of them
/// identifies a different dataset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatasetIdentity {
    /// The hydrologic feature (e.g. `waterway`).
    pub feature: String,
    /// The observed parameter (e.g. `streamflow`).
    pub parameter: String,
    /// How the observation was obtained (e.g. `sensor_recording`).
    pub method: String,
    /// Kind of product (e.g. `raw_data`, `quality_controlled`).
    pub product_code: String,
    /// Operator, owner or producer of the data.
    pub owner: String,
    /// Statistic over the frequency interval (e.g. `mean`).
    pub aggregation_statistic: String,
    /// Recording frequency, such as `1H`, `24H`, or `T` for instantaneous.
    pub frequency_interval: String,
    /// Offset from UTC of the frequency interval (e.g. `0H`).
    pub utc_offset: String,
}

impl DatasetIdentity {
    /// The identity fields in hashing order.
    #[must_use]
    pub fn fields(&self) -> [&str; 8] {
        [
            &self.feature,
            &self.parameter,
            &self.method,
            &self.product_code,
            &self.owner,
            &self.aggregation_statistic,
            &self.frequency_interval,
            &self.utc_offset,
        ]
    }

    /// Derives the dataset id.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::DelimiterInField`] if a field contains the
    /// reserved delimiter.
    pub fn dataset_id(&self) -> Result<String, IdentityError> {
        IdHasher::default().dataset_id(self.fields())
    }

    fn check(&self, v: &mut Violations) {
        for (name, value) in DATASET_IDENTITY_FIELDS.iter().zip(self.fields()) {
            v.not_empty(name, value);
            v.ensure(
                !value.contains(FIELD_DELIMITER),
                name,
                Rule::ContainsDelimiter,
                "contains the reserved field delimiter U+001F",
            );
        }
    }
}

/// How results are split into chunks.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ChunkParams {
    /// Side length in decimal degrees of the spatial grouping blocks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_length: Option<f64>,
    /// Number of days each time chunk covers; absent means time is not
    /// chunked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_interval: Option<i64>,
}

impl ChunkParams {
    fn check(&self, rule: DimensionRule, v: &mut Violations) {
        if let Some(block_length) = self.block_length {
            v.non_negative("chunk_parameters.block_length", block_length);
        }
        if let Some(time_interval) = self.time_interval {
            v.ensure(
                time_interval > 0,
                "chunk_parameters.time_interval",
                Rule::NotPositive,
                format!("{time_interval} must be greater than 0"),
            );
            v.ensure(
                rule.time,
                "chunk_parameters.time_interval",
                Rule::DimensionForbidden,
                "result type has no time dimension",
            );
        }
    }
}

/// Full dataset metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    /// Identity fields.
    #[serde(flatten)]
    pub identity: DatasetIdentity,
    /// Id derived from [`Dataset::identity`].
    pub dataset_id: String,
    /// Units of the result values.
    pub units: String,
    /// Data license defined by the owner.
    pub license: String,
    /// Attribution text that must accompany the data.
    pub attribution: String,
    /// How results are structurally stored.
    pub result_type: ResultType,
    /// Geographic extent as a rectangular polygon.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extent: Option<Geometry>,
    /// Overall time range of the results.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_range: Option<TimeRange>,
    /// Grid resolution in decimal degrees; required for grid result types.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spatial_resolution: Option<f64>,
    /// Every height present in the results.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heights: Option<Vec<f64>>,
    /// CF conventions standard name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cf_standard_name: Option<String>,
    /// WRF standard name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wrf_standard_name: Option<String>,
    /// Decimal precision of the result values.
    pub precision: f64,
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Description of the producing product, for simulations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_description: Option<String>,
    /// Ids of the datasets this one was derived from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_datasets: Option<Vec<String>>,
    /// Additional dataset-specific properties.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Map<String, Value>>,
    /// Time of the last edit.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "crate::datetime::option"
    )]
    pub modified_date: Option<DateTime<Utc>>,
    /// Version of the metadata structure (2 or later).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_version: Option<u32>,
    /// Band indices, for banded result types.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bands: Option<Vec<i64>>,
    /// Chunking parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_parameters: Option<ChunkParams>,
}

impl Dataset {
    /// Creates a dataset with only the required fields set, deriving
    /// `dataset_id` from `identity`.
    ///
    /// # Errors
    ///
    /// Returns an [`IdentityError`] if the id cannot be derived.
    pub fn new(
        identity: DatasetIdentity,
        units: impl Into<String>,
        license: impl Into<String>,
        attribution: impl Into<String>,
        result_type: ResultType,
        precision: f64,
    ) -> Result<Self, IdentityError> {
        Ok(Self {
            dataset_id: identity.dataset_id()?,
            identity,
            units: units.into(),
            license: license.into(),
            attribution: attribution.into(),
            result_type,
            extent: None,
            time_range: None,
            spatial_resolution: None,
            heights: None,
            cf_standard_name: None,
            wrf_standard_name: None,
            precision,
            description: None,
            product_description: None,
            parent_datasets: None,
            properties: None,
            modified_date: None,
            system_version: None,
            bands: None,
            chunk_parameters: None,
        })
    }

    /// The time chunking interval in days, if time is chunked.
    #[must_use]
    pub fn time_interval(&self) -> Option<i64> {
        self.chunk_parameters.and_then(|p| p.time_interval)
    }

    /// Widens `time_range`, `heights`, `bands` and `extent` to cover a
    /// station of this dataset.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] if the station belongs to another
    /// dataset or its dimensions do not match the result type; the dataset
    /// is left unchanged.
    pub fn absorb_station(&mut self, station: &DatasetStation) -> Result<(), ValidationError> {
        let mut v = Violations::new();
        v.ensure(
            station.dataset_id == self.dataset_id,
            "dataset_id",
            Rule::Reference,
            format!(
                "station belongs to {}, not {}",
                station.dataset_id, self.dataset_id
            ),
        );
        v.ensure(
            station.dimensions.result_type() == self.result_type,
            "dimensions",
            Rule::DimensionsMismatch,
            format!(
                "{} dimensions in a {} dataset",
                station.dimensions.result_type(),
                self.result_type
            ),
        );
        ValidationError::check(DatasetStation::KIND, v.into_vec())?;

        self.time_range = Some(
            self.time_range
                .map_or(station.time_range, |range| range.union(&station.time_range)),
        );

        if !station.heights.is_empty() {
            let heights = self.heights.get_or_insert_with(Vec::new);
            heights.extend(&station.heights);
            heights.sort_by(f64::total_cmp);
            heights.dedup();
        }

        if let Some(station_bands) = &station.bands {
            let bands = self.bands.get_or_insert_with(Vec::new);
            bands.extend(station_bands);
            bands.sort_unstable();
            bands.dedup();
        }

        if let Some(bounds) = station.station.geometry.bounds() {
            let bounds = match self.extent.as_ref().and_then(Geometry::bounds) {
                Some(extent) => extent.union(&bounds),
                None => bounds,
            };
            self.extent = Some(bounds.to_polygon());
        }

        log::debug!(
            "Dataset {} absorbed station {}",
            self.dataset_id,
            station.station.station_id
        );
        Ok(())
    }
}

impl Record for Dataset {
    const KIND: &'static str = "dataset";

    fn validate(&self) -> Vec<Violation> {
        let mut v = Violations::new();
        let rule = self.result_type.rule();

        self.identity.check(&mut v);
        v.not_empty("dataset_id", &self.dataset_id);
        if let Ok(derived) = self.derive_id() {
            v.ensure(
                derived == self.dataset_id,
                "dataset_id",
                Rule::IdMismatch,
                format!("expected {derived}"),
            );
        }

        v.not_empty("units", &self.units);
        v.not_empty("license", &self.license);
        v.not_empty("attribution", &self.attribution);
        v.not_empty_opt("cf_standard_name", self.cf_standard_name.as_deref());
        v.not_empty_opt("wrf_standard_name", self.wrf_standard_name.as_deref());

        for e in self.extent.iter().flat_map(Geometry::errors) {
            v.push("extent", Rule::InvalidGeometry, e.to_string());
        }
        if let Some(range) = &self.time_range {
            range.check("time_range", &mut v);
        }

        match self.spatial_resolution {
            Some(resolution) => v.positive("spatial_resolution", resolution),
            None if rule.spatial == SpatialDims::LatLon => v.push(
                "spatial_resolution",
                Rule::Required,
                format!("required for {} datasets", self.result_type),
            ),
            None => {}
        }

        if let Some(heights) = &self.heights {
            v.all_finite("heights", heights);
        }
        v.positive("precision", self.precision);

        for (index, parent) in self.parent_datasets.iter().flatten().enumerate() {
            let field = format!("parent_datasets[{index}]");
            v.not_empty(&field, parent);
            v.ensure(
                *parent != self.dataset_id,
                &field,
                Rule::Cycle,
                "a dataset cannot be its own parent",
            );
        }

        if let Some(version) = self.system_version {
            v.ensure(
                version >= 2,
                "system_version",
                Rule::OutOfRange,
                format!("{version} must be 2 or greater"),
            );
        }

        if let Some(bands) = &self.bands {
            v.ensure(
                rule.band,
                "bands",
                Rule::DimensionForbidden,
                format!("{} datasets have no bands", self.result_type),
            );
            for (index, band) in bands.iter().enumerate() {
                v.ensure(
                    *band >= 0,
                    &format!("bands[{index}]"),
                    Rule::Negative,
                    format!("{band} must not be negative"),
                );
            }
        }

        if let Some(params) = &self.chunk_parameters {
            params.check(rule, &mut v);
        }

        v.into_vec()
    }
}

impl DeriveId for Dataset {
    fn derive_id(&self) -> Result<String, IdentityError> {
        self.identity.dataset_id()
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    New,
    Active,
    Done,
}

/// Reports every dataset whose `parent_datasets` lead back to itself.
///
/// Parents that are not in `datasets` are ignored. Field paths index into
/// `datasets`, e.g. `[3].parent_datasets`.
#[must_use]
pub fn check_provenance(datasets: &[Dataset]) -> Vec<Violation> {
    let index: HashMap<&str, usize> = datasets
        .iter()
        .enumerate()
        .map(|(i, d)| (d.dataset_id.as_str(), i))
        .collect();

    let mut state = vec![Visit::New; datasets.len()];
    let mut stack = Vec::new();
    let mut on_cycle = BTreeSet::new();
    for start in 0..datasets.len() {
        if state[start] == Visit::New {
            visit(
                start,
                datasets,
                &index,
                &mut state,
                &mut stack,
                &mut on_cycle,
            );
        }
    }

    let mut v = Violations::new();
    for i in on_cycle {
        v.push(
            format!("[{i}].parent_datasets"),
            Rule::Cycle,
            format!("dataset {} is its own ancestor", datasets[i].dataset_id),
        );
    }
    v.into_vec()
}

fn visit(
    node: usize,
    datasets: &[Dataset],
    index: &HashMap<&str, usize>,
    state: &mut [Visit],
    stack: &mut Vec<usize>,
    on_cycle: &mut BTreeSet<usize>,
) {
    state[node] = Visit::Active;
    stack.push(node);

    for parent in datasets[node].parent_datasets.iter().flatten() {
        let Some(&next) = index.get(parent.as_str()) else {
            continue;
        };
        match state[next] {
            Visit::New => visit(next, datasets, index, state, stack, on_cycle),
            Visit::Active => {
                if let Some(start) = stack.iter().position(|&n| n == next) {
                    on_cycle.extend(stack[start..].iter().copied());
                }
            }
            Visit::Done => {}
        }
    }

    stack.pop();
    state[node] = Visit::Done;
}
