#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Metadata records of the Tethys archive.
//!
//! Every record type implements [`Record`]: it serializes to compact JSON
//! with absent optionals omitted, and [`Record::validate`] collects *all*
//! rule violations rather than stopping at the first. Records parsed from
//! untrusted bytes go through [`Record::from_json`], which never returns a
//! record that fails validation.
//!
//! Rules that need more than one record (a chunk against its dataset's
//! result type, a station's time range against its dataset's) live on the
//! `validate_for` methods of [`ResultChunk`] and [`DatasetStation`].

pub mod chunk;
pub mod dataset;
pub mod datetime;
pub mod permit;
pub mod plan;
pub mod remote;
pub mod result_type;
pub mod station;
pub mod stats;
pub mod time;
pub mod validation;
pub mod version;

use serde::{Serialize, de::DeserializeOwned};
use tethys_identity::IdentityError;

pub use chunk::ResultChunk;
pub use dataset::{ChunkParams, Dataset, DatasetIdentity, check_provenance};
pub use permit::{
    Activity, ActivityType, AggregationStat, AquiferProp, Condition, ConditionType, Feature,
    Limit, LimitBoundary, Period, Permit, PermitStation, PermitType, SdMethod, Status, Units,
};
pub use plan::Plan;
pub use remote::{ConnectionConfig, Remote};
pub use result_type::{
    DimensionRule, GridBandsDims, GridDims, ResultDims, ResultType, SpatialDims,
    TimeSeriesBandsDims, TimeSeriesDims, TrajectoryBandsDims, TrajectoryDims,
};
pub use station::{ChunkSummary, DatasetStation, Station};
pub use stats::Stats;
pub use time::{TimeRange, chunk_day, chunk_days, chunk_window};
pub use validation::{Rule, ValidationError, Violation, Violations};
pub use version::ResultVersion;

/// Errors raised when reading, writing or identifying records.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    /// The bytes are not valid JSON for the record type.
    #[error("Failed to parse {kind}: {source}")]
    Json {
        /// Record kind being parsed.
        kind: &'static str,
        /// The underlying parse error.
        source: serde_json::Error,
    },

    /// The record failed to serialize.
    #[error("Failed to serialize {kind}: {source}")]
    Serialize {
        /// Record kind being serialized.
        kind: &'static str,
        /// The underlying serialization error.
        source: serde_json::Error,
    },

    /// The record parsed but violates one or more rules.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// An id could not be derived.
    #[error(transparent)]
    Identity(#[from] IdentityError),
}

/// A serializable, self-validating metadata record.
pub trait Record: Serialize + DeserializeOwned + Sized {
    /// Name of the record type used in error messages.
    const KIND: &'static str;

    /// Collects every rule the record violates. An empty list means the
    /// record is well-formed on its own.
    fn validate(&self) -> Vec<Violation>;

    /// Returns the record if it is valid.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] listing every violation.
    fn validated(self) -> Result<Self, ValidationError> {
        ValidationError::check(Self::KIND, self.validate())?;
        Ok(self)
    }

    /// Compact JSON bytes of the record; the stored and hashed form.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::Serialize`] if serialization fails.
    fn to_canonical_bytes(&self) -> Result<Vec<u8>, RecordError> {
        serde_json::to_vec(self).map_err(|source| RecordError::Serialize {
            kind: Self::KIND,
            source,
        })
    }

    /// Parses and totally validates a record.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::Json`] for malformed JSON, unknown enum values
    /// or wrong types, and [`RecordError::Validation`] if the parsed record
    /// breaks any rule.
    fn from_json(bytes: &[u8]) -> Result<Self, RecordError> {
        let record: Self = serde_json::from_slice(bytes).map_err(|source| RecordError::Json {
            kind: Self::KIND,
            source,
        })?;
        Ok(record.validated()?)
    }
}

/// Records whose id is derived from their content.
pub trait DeriveId {
    /// Derives the record's id from its identifying content.
    ///
    /// # Errors
    ///
    /// Returns an [`IdentityError`] if the identifying content cannot be
    /// canonically encoded.
    fn derive_id(&self) -> Result<String, IdentityError>;
}

/// A list of records, as stored in the `datasets` and `stations` objects.
impl<T: Record> Record for Vec<T> {
    const KIND: &'static str = T::KIND;

    fn validate(&self) -> Vec<Violation> {
        let mut violations = Violations::new();
        for (index, record) in self.iter().enumerate() {
            violations.nest(&format!("[{index}]"), record.validate());
        }
        violations.into_vec()
    }
}
