//! Content-addressed result chunks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tethys_identity::{CHUNK_DAY_MAX, CHUNK_DAY_MIN, ChunkCoords, IdHasher, IdentityError};

use crate::dataset::Dataset;
use crate::time::{TimeRange, chunk_window};
use crate::validation::{Rule, ValidationError, Violation, Violations};
use crate::{DeriveId, Record, RecordError};

/// One stored slice of a station's results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultChunk {
    /// Id derived from the addressed coordinates; unique within a station.
    pub chunk_id: String,
    /// Object-storage key of the chunk.
    pub key: String,
    /// Size of the stored object in bytes.
    pub content_length: i64,
    /// The results version this chunk belongs to.
    #[serde(with = "crate::datetime")]
    pub version_date: DateTime<Utc>,
    /// Digest of the chunk's bytes.
    pub chunk_hash: String,
    /// Owning dataset.
    pub dataset_id: String,
    /// Owning station.
    pub station_id: String,
    /// Height in millimetres.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<i64>,
    /// First day of the chunk's time bucket, in days since 1970-01-01.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_day: Option<i32>,
    /// Index into the dataset's bands.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub band: Option<i64>,
}

impl ResultChunk {
    /// Describes `content` stored at `key`, deriving `chunk_id` from the
    /// coordinates and `chunk_hash` from the bytes.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::Identity`] if the coordinates are out of
    /// range, or [`RecordError::Validation`] if the described chunk is not
    /// valid (for example empty `content`).
    pub fn new(
        dataset_id: impl Into<String>,
        station_id: impl Into<String>,
        coords: ChunkCoords,
        version_date: DateTime<Utc>,
        key: impl Into<String>,
        content: &[u8],
    ) -> Result<Self, RecordError> {
        let Ok(content_length) = i64::try_from(content.len()) else {
            return Err(ValidationError {
                kind: Self::KIND,
                violations: vec![Violation {
                    field: "content_length".to_string(),
                    rule: Rule::OutOfRange,
                    detail: format!("{} bytes do not fit in i64", content.len()),
                }],
            }
            .into());
        };

        let hasher = IdHasher::default();
        let chunk = Self {
            chunk_id: hasher.chunk_id(&coords)?,
            key: key.into(),
            content_length,
            version_date: crate::datetime::truncate(version_date),
            chunk_hash: hasher.content_hash(content)?,
            dataset_id: dataset_id.into(),
            station_id: station_id.into(),
            height: coords.height,
            chunk_day: coords.chunk_day,
            band: coords.band,
        };
        Ok(chunk.validated()?)
    }

    /// The addressed coordinates.
    #[must_use]
    pub const fn coords(&self) -> ChunkCoords {
        ChunkCoords {
            height: self.height,
            chunk_day: self.chunk_day,
            band: self.band,
        }
    }

    /// The time span of the chunk's bucket, when time is chunked.
    #[must_use]
    pub fn window(&self, time_interval: Option<i64>) -> Option<TimeRange> {
        chunk_window(self.chunk_day?, time_interval?)
    }

    /// Returns `true` if both chunks address the same slice of the same
    /// version.
    #[must_use]
    pub fn same_slot(&self, other: &Self) -> bool {
        self.chunk_id == other.chunk_id && self.version_date == other.version_date
    }

    /// Validates the chunk against the dataset it belongs to: the presence
    /// pattern of `height`/`chunk_day`/`band` must match the dataset's
    /// result type, `chunk_day` must be aligned to the dataset's
    /// `time_interval`, and `band` must index the dataset's bands.
    #[must_use]
    pub fn validate_for(&self, dataset: &Dataset) -> Vec<Violation> {
        let mut violations = Violations::new();
        violations.nest("", self.validate());
        self.check_against(dataset, &mut violations);
        violations.into_vec()
    }

    /// The dataset-dependent part of [`ResultChunk::validate_for`].
    pub(crate) fn check_against(&self, dataset: &Dataset, violations: &mut Violations) {
        violations.ensure(
            self.dataset_id == dataset.dataset_id,
            "dataset_id",
            Rule::Reference,
            format!(
                "chunk belongs to {}, not {}",
                self.dataset_id, dataset.dataset_id
            ),
        );

        dataset
            .result_type
            .rule()
            .check_chunk(&self.coords(), dataset.time_interval(), violations);

        if let (Some(band), Some(bands)) = (self.band, &dataset.bands)
            && band >= 0
        {
            violations.ensure(
                usize::try_from(band).is_ok_and(|band| band < bands.len()),
                "band",
                Rule::OutOfRange,
                format!("dataset has {} bands", bands.len()),
            );
        }
    }
}

impl Record for ResultChunk {
    const KIND: &'static str = "result chunk";

    fn validate(&self) -> Vec<Violation> {
        let mut v = Violations::new();
        v.not_empty("chunk_id", &self.chunk_id);
        v.not_empty("key", &self.key);
        v.not_empty("dataset_id", &self.dataset_id);
        v.not_empty("station_id", &self.station_id);
        v.ensure(
            self.content_length > 0,
            "content_length",
            Rule::NotPositive,
            format!("{} must be greater than 0", self.content_length),
        );
        v.ensure(
            !self.chunk_hash.is_empty()
                && self
                    .chunk_hash
                    .bytes()
                    .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b)),
            "chunk_hash",
            Rule::Malformed,
            "must be lowercase hex",
        );

        let mut coords_ok = true;
        if let Some(day) = self.chunk_day
            && !(CHUNK_DAY_MIN..=CHUNK_DAY_MAX).contains(&day)
        {
            coords_ok = false;
            v.push(
                "chunk_day",
                Rule::OutOfRange,
                format!("{day} is outside {CHUNK_DAY_MIN}..={CHUNK_DAY_MAX}"),
            );
        }
        if let Some(band) = self.band
            && band < 0
        {
            coords_ok = false;
            v.push("band", Rule::Negative, format!("{band} must not be negative"));
        }

        if coords_ok && let Ok(derived) = self.derive_id() {
            v.ensure(
                derived == self.chunk_id,
                "chunk_id",
                Rule::IdMismatch,
                format!("expected {derived}"),
            );
        }

        v.into_vec()
    }
}

impl DeriveId for ResultChunk {
    fn derive_id(&self) -> Result<String, IdentityError> {
        IdHasher::default().chunk_id(&self.coords())
    }
}
