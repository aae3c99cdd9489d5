#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Helpers behind the `tethys` command line tool.
//!
//! Everything here is plain functions over bytes and strings so that the
//! binary stays a thin `clap` layer.

use std::path::Path;
use std::str::FromStr as _;

use tethys_geometry::Geometry;
use tethys_identity::IdentityError;
use tethys_keys::{KeyError, KeyParams, ParsedKey, Placeholder};
use tethys_models::{
    Dataset, DatasetStation, Permit, Plan, Record, RecordError, Remote, ResultChunk,
    ResultVersion, Station,
};
use tethys_storage::{Codec as _, StorageError, ZstdCodec};

/// Errors surfaced by the command line tool.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// A `name=value` key parameter is malformed.
    #[error("Invalid key parameter {value:?}, expected name=value")]
    InvalidParam {
        /// The rejected argument.
        value: String,
    },

    /// A geometry argument is not valid GeoJSON.
    #[error("Invalid geometry: {0}")]
    Geometry(String),

    /// A record failed to parse or validate.
    #[error(transparent)]
    Record(#[from] RecordError),

    /// An id could not be derived.
    #[error(transparent)]
    Identity(#[from] IdentityError),

    /// A key could not be rendered or parsed.
    #[error(transparent)]
    Key(#[from] KeyError),

    /// Reading from the remote failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A local file could not be read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Record types understood by `tethys validate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum RecordKind {
    /// A single dataset.
    Dataset,
    /// A list of datasets.
    Datasets,
    /// A base station.
    Station,
    /// A station of a dataset, with or without chunks.
    DatasetStation,
    /// A list of dataset stations.
    Stations,
    /// A single result chunk.
    Chunk,
    /// A list of result versions.
    Versions,
    /// A remote description.
    Remote,
    /// A permit.
    Permit,
    /// A plan.
    Plan,
}

/// Parses a `name=value` key parameter.
///
/// # Errors
///
/// Returns [`CliError::InvalidParam`] if there is no `=` or the name is not
/// a known placeholder.
pub fn parse_param(arg: &str) -> Result<(Placeholder, String), CliError> {
    let invalid = || CliError::InvalidParam {
        value: arg.to_string(),
    };
    let (name, value) = arg.split_once('=').ok_or_else(invalid)?;
    let placeholder = Placeholder::from_str(name.trim()).map_err(|_| invalid())?;
    Ok((placeholder, value.to_string()))
}

/// Collects key parameters from `name=value` arguments.
///
/// # Errors
///
/// See [`parse_param`].
pub fn key_params<'a>(args: impl IntoIterator<Item = &'a str>) -> Result<KeyParams, CliError> {
    let mut params = KeyParams::new();
    for arg in args {
        let (placeholder, value) = parse_param(arg)?;
        params.set(placeholder, value);
    }
    Ok(params)
}

/// One line per recovered parameter, after a version/role header.
#[must_use]
pub fn describe_key(parsed: &ParsedKey) -> String {
    let mut out = format!("version: {}\nrole: {}\n", parsed.version, parsed.role);
    for (placeholder, value) in parsed.params.iter() {
        out.push_str(&format!("{placeholder}: {value}\n"));
    }
    out
}

/// Parses a GeoJSON geometry object.
///
/// # Errors
///
/// Returns [`CliError::Geometry`] if the text is not a supported, valid
/// geometry.
pub fn parse_geometry(text: &str) -> Result<Geometry, CliError> {
    let geojson: geojson::Geometry =
        serde_json::from_str(text).map_err(|e| CliError::Geometry(e.to_string()))?;
    Geometry::try_from(geojson).map_err(|e| CliError::Geometry(e.to_string()))
}

/// Reads a file, decompressing it when the name ends in `.zst`.
///
/// # Errors
///
/// Returns [`CliError::Io`] if the file cannot be read or decompressed.
pub fn read_record_file(path: &Path) -> Result<Vec<u8>, CliError> {
    let bytes = std::fs::read(path)?;
    if path.extension().is_some_and(|ext| ext == "zst") {
        log::debug!("Decompressing {}", path.display());
        return Ok(ZstdCodec::default().decompress(&bytes)?);
    }
    Ok(bytes)
}

/// Parses and totally validates `bytes` as a record of `kind`.
///
/// Returns the number of records checked.
///
/// # Errors
///
/// Returns [`CliError::Record`] listing every violation.
pub fn validate_bytes(kind: RecordKind, bytes: &[u8]) -> Result<usize, CliError> {
    fn one<R: Record>(bytes: &[u8]) -> Result<usize, RecordError> {
        R::from_json(bytes).map(|_| 1)
    }
    fn many<R: Record>(bytes: &[u8]) -> Result<usize, RecordError> {
        Vec::<R>::from_json(bytes).map(|records| records.len())
    }

    let count = match kind {
        RecordKind::Dataset => one::<Dataset>(bytes)?,
        RecordKind::Datasets => {
            let datasets = Vec::<Dataset>::from_json(bytes)?;
            tethys_models::ValidationError::check(
                Dataset::KIND,
                tethys_models::check_provenance(&datasets),
            )
            .map_err(RecordError::from)?;
            datasets.len()
        }
        RecordKind::Station => one::<Station>(bytes)?,
        RecordKind::DatasetStation => one::<DatasetStation>(bytes)?,
        RecordKind::Stations => many::<DatasetStation>(bytes)?,
        RecordKind::Chunk => one::<ResultChunk>(bytes)?,
        RecordKind::Versions => many::<ResultVersion>(bytes)?,
        RecordKind::Remote => one::<Remote>(bytes)?,
        RecordKind::Permit => one::<Permit>(bytes)?,
        RecordKind::Plan => one::<Plan>(bytes)?,
    };
    Ok(count)
}

/// Fixed-width table rows describing datasets.
#[must_use]
pub fn dataset_table(datasets: &[Dataset]) -> Vec<String> {
    let mut rows = vec![format!(
        "{:<26} {:<18} {:<18} {:<16} OWNER",
        "DATASET_ID", "FEATURE", "PARAMETER", "RESULT_TYPE"
    )];
    rows.extend(datasets.iter().map(|d| {
        format!(
            "{:<26} {:<18} {:<18} {:<16} {}",
            d.dataset_id, d.identity.feature, d.identity.parameter, d.result_type, d.identity.owner
        )
    }));
    rows
}

#[cfg(test)]
mod tests {
    use tethys_keys::{KeyRegistry, Role};

    use super::*;

    #[test]
    fn params_parse_into_placeholders() {
        assert_eq!(
            parse_param("dataset_id=abc").unwrap(),
            (Placeholder::DatasetId, "abc".to_string())
        );
        assert!(matches!(
            parse_param("dataset_id"),
            Err(CliError::InvalidParam { .. })
        ));
        assert!(matches!(
            parse_param("colour=red"),
            Err(CliError::InvalidParam { .. })
        ));
    }

    #[test]
    fn rendered_key_describes_itself() {
        let registry = KeyRegistry::builtin();
        let params = key_params(["dataset_id=abc", "station_id=xyz"]).unwrap();
        let key = registry.render(4, Role::Station, &params).unwrap();
        assert_eq!(key, "tethys/v4/abc.xyz.station.json.zst");

        let described = describe_key(&registry.parse(&key).unwrap());
        assert!(described.starts_with("version: 4\nrole: station\n"), "{described}");
        assert!(described.contains("station_id: xyz"), "{described}");
    }

    #[test]
    fn geometry_arguments_are_geojson() {
        let point = parse_geometry(r#"{"type":"Point","coordinates":[1.0,2.0]}"#).unwrap();
        assert_eq!(
            tethys_identity::station_id(&point).unwrap(),
            "2d9ca0c22a62b4b1ba671cbc"
        );
        assert!(parse_geometry(r#"{"type":"Point"}"#).is_err());
    }

    #[test]
    fn validate_reports_kind_mismatches() {
        let remote = br#"{"bucket":"tethysts","version":4}"#;
        assert_eq!(validate_bytes(RecordKind::Remote, remote).unwrap(), 1);
        assert!(matches!(
            validate_bytes(RecordKind::Remote, br#"{"bucket":"tethysts","version":1}"#),
            Err(CliError::Record(RecordError::Validation(_)))
        ));
        assert!(matches!(
            validate_bytes(RecordKind::Dataset, remote),
            Err(CliError::Record(RecordError::Json { .. }))
        ));
        assert_eq!(validate_bytes(RecordKind::Versions, b"[]").unwrap(), 0);
    }

    #[test]
    fn compressed_files_are_decompressed() {
        let dir = std::env::temp_dir().join(format!("tethys-cli-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("remote.json.zst");
        let json = br#"{"bucket":"tethysts","version":4}"#;
        std::fs::write(&path, ZstdCodec::default().compress(json).unwrap()).unwrap();

        let bytes = read_record_file(&path).unwrap();
        assert_eq!(bytes, json);
        assert_eq!(validate_bytes(RecordKind::Remote, &bytes).unwrap(), 1);
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
