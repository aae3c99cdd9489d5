#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Deterministic, content-derived identifiers.
//!
//! Every id in the archive is a truncated BLAKE2b digest rendered as
//! lowercase hex:
//!
//! | Id | Digest input |
//! |---|---|
//! | `station_id` | ASCII bytes of the uppercase hex WKB of the station geometry |
//! | `dataset_id` | the eight identity fields joined by [`FIELD_DELIMITER`] |
//! | `chunk_id` | compact JSON of the present chunk coordinates (height, chunk_day, band) |
//! | `chunk_hash` | raw bytes of the stored chunk |
//!
//! The truncation length ([`ID_DIGEST_LEN`]) is part of the storage schema:
//! changing it re-keys every object, so it is pinned per schema version via
//! [`IdHasher`].
//!
//! Identical inputs always produce identical ids. Distinct inputs collide
//! only with the probability of a 96-bit digest collision; collisions are
//! not detected.

use blake2::Blake2bVar;
use blake2::digest::{Update, VariableOutput};
use serde::Serialize;
use tethys_geometry::{Geometry, GeometryError};

/// Digest length in bytes used by every built-in schema version.
pub const ID_DIGEST_LEN: usize = 12;

/// Largest output length BLAKE2b supports.
pub const MAX_DIGEST_LEN: usize = 64;

/// Separator placed between dataset identity fields before hashing.
///
/// Field values containing it are rejected so that the concatenation is
/// unambiguous.
pub const FIELD_DELIMITER: char = '\u{1f}';

/// Names of the dataset identity fields, in hashing order.
pub const DATASET_IDENTITY_FIELDS: [&str; 8] = [
    "feature",
    "parameter",
    "method",
    "product_code",
    "owner",
    "aggregation_statistic",
    "frequency_interval",
    "utc_offset",
];

/// Smallest valid `chunk_day` (1677-09-22, the minimum nanosecond timestamp).
pub const CHUNK_DAY_MIN: i32 = -106_751;

/// Largest valid `chunk_day`.
pub const CHUNK_DAY_MAX: i32 = 106_751;

/// Errors that can occur while deriving an identifier.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    /// The geometry cannot be canonically encoded.
    #[error("Geometry cannot be encoded: {0}")]
    Encoding(#[from] GeometryError),

    /// A dataset identity field contains the field delimiter.
    #[error("Identity field {field} contains the reserved delimiter U+001F")]
    DelimiterInField {
        /// Name of the offending field.
        field: &'static str,
    },

    /// Requested digest length is outside `1..=64`.
    #[error("Invalid digest length {len}: expected 1-64")]
    InvalidDigestLength {
        /// The rejected length.
        len: usize,
    },

    /// `chunk_day` is outside [`CHUNK_DAY_MIN`]..=[`CHUNK_DAY_MAX`].
    #[error("chunk_day {value} is outside -106751..=106751")]
    ChunkDayOutOfRange {
        /// The rejected value.
        value: i32,
    },

    /// `band` is negative.
    #[error("band {value} is negative")]
    NegativeBand {
        /// The rejected value.
        value: i64,
    },

    /// Chunk coordinates could not be serialized.
    #[error("Failed to encode chunk coordinates: {0}")]
    Json(#[from] serde_json::Error),
}

/// Computes a BLAKE2b digest of `bytes` with `output_len` bytes of output.
///
/// # Errors
///
/// Returns [`IdentityError::InvalidDigestLength`] if `output_len` is not in
/// `1..=64`.
pub fn digest(bytes: &[u8], output_len: usize) -> Result<Vec<u8>, IdentityError> {
    if output_len == 0 || output_len > MAX_DIGEST_LEN {
        return Err(IdentityError::InvalidDigestLength { len: output_len });
    }
    let mut hasher = Blake2bVar::new(output_len)
        .map_err(|_| IdentityError::InvalidDigestLength { len: output_len })?;
    hasher.update(bytes);

    let mut out = vec![0u8; output_len];
    hasher
        .finalize_variable(&mut out)
        .map_err(|_| IdentityError::InvalidDigestLength { len: output_len })?;
    Ok(out)
}

/// The addressed dimensions of one result chunk within a station.
///
/// Absent coordinates are skipped entirely when hashing, so a chunk without
/// bands hashes differently from one with `band: 0`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ChunkCoords {
    /// Height in millimetres.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<i64>,
    /// Start day of the time bucket, in days since 1970-01-01.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_day: Option<i32>,
    /// Band index.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub band: Option<i64>,
}

impl ChunkCoords {
    /// Checks the `chunk_day` range and band sign.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::ChunkDayOutOfRange`] or
    /// [`IdentityError::NegativeBand`].
    pub fn check(&self) -> Result<(), IdentityError> {
        if let Some(value) = self.chunk_day
            && (value < CHUNK_DAY_MIN || value > CHUNK_DAY_MAX)
        {
            return Err(IdentityError::ChunkDayOutOfRange { value });
        }
        if let Some(value) = self.band
            && value < 0
        {
            return Err(IdentityError::NegativeBand { value });
        }
        Ok(())
    }
}

/// Derives ids with a fixed digest length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdHasher {
    digest_len: usize,
}

impl Default for IdHasher {
    fn default() -> Self {
        Self {
            digest_len: ID_DIGEST_LEN,
        }
    }
}

impl IdHasher {
    /// Creates a hasher producing `digest_len`-byte ids.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::InvalidDigestLength`] if `digest_len` is not
    /// in `1..=64`.
    pub fn new(digest_len: usize) -> Result<Self, IdentityError> {
        if digest_len == 0 || digest_len > MAX_DIGEST_LEN {
            return Err(IdentityError::InvalidDigestLength { len: digest_len });
        }
        Ok(Self { digest_len })
    }

    /// Digest length in bytes (ids are twice as many hex characters).
    #[must_use]
    pub const fn digest_len(&self) -> usize {
        self.digest_len
    }

    /// Lowercase hex digest of arbitrary bytes.
    ///
    /// # Errors
    ///
    /// Propagates [`digest`] errors.
    pub fn hex_digest(&self, bytes: &[u8]) -> Result<String, IdentityError> {
        digest(bytes, self.digest_len).map(hex::encode)
    }

    /// Derives a station id from its geometry.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::Encoding`] if the geometry is invalid (for
    /// example an empty coordinate array).
    pub fn station_id(&self, geometry: &Geometry) -> Result<String, IdentityError> {
        let wkb_hex = geometry.to_wkb_hex()?;
        let id = self.hex_digest(wkb_hex.as_bytes())?;
        log::trace!("station_id {id} <- {} WKB", geometry.type_name());
        Ok(id)
    }

    /// Derives a dataset id from the eight identity fields given in
    /// [`DATASET_IDENTITY_FIELDS`] order.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::DelimiterInField`] if any value contains
    /// [`FIELD_DELIMITER`].
    pub fn dataset_id(&self, fields: [&str; 8]) -> Result<String, IdentityError> {
        if let Some(i) = fields.iter().position(|v| v.contains(FIELD_DELIMITER)) {
            return Err(IdentityError::DelimiterInField {
                field: DATASET_IDENTITY_FIELDS[i],
            });
        }

        let mut buf = String::with_capacity(fields.iter().map(|f| f.len() + 1).sum());
        for (i, value) in fields.iter().enumerate() {
            if i > 0 {
                buf.push(FIELD_DELIMITER);
            }
            buf.push_str(value);
        }

        let id = self.hex_digest(buf.as_bytes())?;
        log::trace!("dataset_id {id} <- {}", fields.join("/"));
        Ok(id)
    }

    /// Derives a chunk id from its coordinates.
    ///
    /// # Errors
    ///
    /// Returns an error if the coordinates are out of range.
    pub fn chunk_id(&self, coords: &ChunkCoords) -> Result<String, IdentityError> {
        coords.check()?;
        let encoded = serde_json::to_vec(coords)?;
        self.hex_digest(&encoded)
    }

    /// Hash of stored chunk content, used for change detection.
    ///
    /// # Errors
    ///
    /// Propagates [`digest`] errors.
    pub fn content_hash(&self, bytes: &[u8]) -> Result<String, IdentityError> {
        self.hex_digest(bytes)
    }

    /// Returns `true` if `id` looks like an id from this hasher.
    #[must_use]
    pub fn is_id(&self, id: &str) -> bool {
        id.len() == self.digest_len * 2
            && id
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    }
}

/// [`IdHasher::station_id`] with the default digest length.
///
/// # Errors
///
/// See [`IdHasher::station_id`].
pub fn station_id(geometry: &Geometry) -> Result<String, IdentityError> {
    IdHasher::default().station_id(geometry)
}

/// [`IdHasher::dataset_id`] with the default digest length.
///
/// # Errors
///
/// See [`IdHasher::dataset_id`].
pub fn dataset_id(fields: [&str; 8]) -> Result<String, IdentityError> {
    IdHasher::default().dataset_id(fields)
}

/// [`IdHasher::chunk_id`] with the default digest length.
///
/// # Errors
///
/// See [`IdHasher::chunk_id`].
pub fn chunk_id(coords: &ChunkCoords) -> Result<String, IdentityError> {
    IdHasher::default().chunk_id(coords)
}

/// [`IdHasher::content_hash`] with the default digest length.
///
/// # Errors
///
/// See [`IdHasher::content_hash`].
pub fn content_hash(bytes: &[u8]) -> Result<String, IdentityError> {
    IdHasher::default().content_hash(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIELDS: [&str; 8] = [
        "waterway",
        "streamflow",
        "sensor_recording",
        "raw_data",
        "Environment Southland",
        "mean",
        "1H",
        "0H",
    ];

    #[test]
    fn digest_respects_output_length() {
        assert_eq!(digest(b"hello", 12).unwrap().len(), 12);
        assert_eq!(digest(b"hello", 64).unwrap().len(), 64);
        assert!(matches!(
            digest(b"hello", 0),
            Err(IdentityError::InvalidDigestLength { len: 0 })
        ));
        assert!(matches!(
            digest(b"hello", 65),
            Err(IdentityError::InvalidDigestLength { len: 65 })
        ));
    }

    #[test]
    fn content_hash_matches_blake2b_reference() {
        assert_eq!(content_hash(b"hello").unwrap(), "8ed7252f4b03f9e8376db5b2");
    }

    #[test]
    fn station_id_matches_reference_vector() {
        let id = station_id(&Geometry::point(1.0, 2.0)).unwrap();
        assert_eq!(id, "2d9ca0c22a62b4b1ba671cbc");
    }

    #[test]
    fn station_id_is_deterministic_and_discriminating() {
        let a = Geometry::point(174.78, -41.29);
        let b = Geometry::point(174.78, -41.290_001);
        assert_eq!(station_id(&a).unwrap(), station_id(&a.clone()).unwrap());
        assert_ne!(station_id(&a).unwrap(), station_id(&b).unwrap());
    }

    #[test]
    fn station_id_rejects_empty_geometry() {
        let empty = Geometry::MultiPoint {
            coordinates: vec![],
        };
        assert!(matches!(
            station_id(&empty),
            Err(IdentityError::Encoding(GeometryError::EmptyCoordinates { .. }))
        ));
    }

    #[test]
    fn station_id_does_not_canonicalize_point_order() {
        let a = Geometry::MultiPoint {
            coordinates: vec![vec![0.0, 0.0], vec![1.0, 1.0]],
        };
        let b = Geometry::MultiPoint {
            coordinates: vec![vec![1.0, 1.0], vec![0.0, 0.0]],
        };
        assert_ne!(station_id(&a).unwrap(), station_id(&b).unwrap());
    }

    #[test]
    fn dataset_id_matches_reference_vector() {
        assert_eq!(dataset_id(FIELDS).unwrap(), "445cab7cb3a13f827e722c2a");
    }

    #[test]
    fn every_identity_field_changes_dataset_id() {
        let base = dataset_id(FIELDS).unwrap();
        for i in 0..FIELDS.len() {
            let mut fields = FIELDS;
            fields[i] = "changed";
            assert_ne!(
                dataset_id(fields).unwrap(),
                base,
                "changing {} did not change the id",
                DATASET_IDENTITY_FIELDS[i]
            );
        }
    }

    #[test]
    fn delimiter_prevents_field_boundary_shifts() {
        let mut a = FIELDS;
        a[0] = "ab";
        a[1] = "c";
        let mut b = FIELDS;
        b[0] = "a";
        b[1] = "bc";
        assert_ne!(dataset_id(a).unwrap(), dataset_id(b).unwrap());
    }

    #[test]
    fn delimiter_inside_value_is_rejected() {
        let mut fields = FIELDS;
        fields[4] = "Owner\u{1f}Inc";
        assert!(matches!(
            dataset_id(fields),
            Err(IdentityError::DelimiterInField { field: "owner" })
        ));
    }

    #[test]
    fn chunk_id_hashes_only_present_fields() {
        let coords = ChunkCoords {
            height: Some(1000),
            chunk_day: Some(18256),
            band: None,
        };
        assert_eq!(chunk_id(&coords).unwrap(), "a4a54bd712002c44df21878a");
        assert_eq!(
            chunk_id(&ChunkCoords::default()).unwrap(),
            "bf78e4a953b40eee238ca2e9"
        );

        let with_band = ChunkCoords {
            band: Some(0),
            ..coords
        };
        assert_ne!(chunk_id(&with_band).unwrap(), chunk_id(&coords).unwrap());
    }

    #[test]
    fn chunk_id_rejects_out_of_range_coordinates() {
        let coords = ChunkCoords {
            chunk_day: Some(CHUNK_DAY_MAX + 1),
            ..ChunkCoords::default()
        };
        assert!(matches!(
            chunk_id(&coords),
            Err(IdentityError::ChunkDayOutOfRange { .. })
        ));

        let coords = ChunkCoords {
            band: Some(-1),
            ..ChunkCoords::default()
        };
        assert!(matches!(
            chunk_id(&coords),
            Err(IdentityError::NegativeBand { value: -1 })
        ));
    }

    #[test]
    fn hasher_length_is_configurable() {
        let hasher = IdHasher::new(16).unwrap();
        let id = hasher.station_id(&Geometry::point(1.0, 2.0)).unwrap();
        assert_eq!(id.len(), 32);
        assert!(hasher.is_id(&id));
        assert!(!IdHasher::default().is_id(&id));
        assert!(IdHasher::new(0).is_err());
    }
}
