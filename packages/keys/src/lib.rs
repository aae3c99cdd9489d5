#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Object-storage key layouts for every schema version of the archive.
//!
//! A [`KeyRegistry`] maps a schema version to a [`Layout`], and a layout
//! maps each logical object [`Role`] to a [`Template`] such as
//! `tethys/v4/{dataset_id}.{station_id}.station.json.zst`. Keys are always
//! rendered for an explicit schema version; shapes differ between versions
//! (v2/v3 nest by `/`, v4 flattens with `.` and addresses individual result
//! chunks).
//!
//! The registry is append-only: a registered version can never be replaced,
//! so objects written under an old layout stay readable.

pub mod params;
pub mod registry;
pub mod template;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

pub use params::{KEY_DATE_FORMAT, KeyParams, format_key_date, parse_key_date};
pub use registry::{KeyRegistry, Layout, ParsedKey};
pub use template::Template;

/// Logical role of a stored object.
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
pub enum Role {
    /// Metadata of one dataset.
    Dataset,
    /// Catalog-wide list of datasets.
    Datasets,
    /// Metadata of one station within a dataset.
    Station,
    /// Per-dataset list of stations.
    Stations,
    /// A result blob (v2/v3) or a single result chunk (v4).
    Results,
    /// Per-dataset manifest of result object keys (v2/v3).
    ResultsObjectKeys,
    /// Per-dataset list of result versions (v4).
    Versions,
    /// Processing diagnostics for a run.
    Diagnostics,
    /// Scratch space for in-progress runs.
    InterimResults,
}

/// A named slot in a key template.
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
pub enum Placeholder {
    /// Dataset id.
    DatasetId,
    /// Station id.
    StationId,
    /// Run timestamp (key date format).
    RunDate,
    /// Chunk id.
    ChunkId,
    /// Result version timestamp (key date format).
    VersionDate,
    /// Start timestamp of an interim run (key date format).
    StartDate,
    /// Free-form run identifier.
    RunId,
}

impl Placeholder {
    /// Returns `true` for placeholders holding a timestamp.
    #[must_use]
    pub const fn is_date(self) -> bool {
        matches!(self, Self::RunDate | Self::VersionDate | Self::StartDate)
    }
}

/// Errors raised by key rendering, parsing and registry maintenance.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    /// No layout is registered for the schema version.
    #[error("Unknown schema version {version}")]
    UnknownSchemaVersion {
        /// The requested version.
        version: u32,
    },

    /// The layout has no template for the role.
    #[error("Schema version {version} has no template for role {role}")]
    UnknownRole {
        /// Schema version.
        version: u32,
        /// The requested role.
        role: Role,
    },

    /// A placeholder required by the template has no value.
    #[error("Missing parameter {placeholder} for role {role} in schema version {version}")]
    MissingParameter {
        /// Schema version.
        version: u32,
        /// Role being rendered.
        role: Role,
        /// The placeholder without a value.
        placeholder: Placeholder,
    },

    /// A placeholder value is empty or contains a separator character.
    #[error("Invalid value {value:?} for parameter {placeholder}")]
    InvalidParameter {
        /// The placeholder.
        placeholder: Placeholder,
        /// The rejected value.
        value: String,
    },

    /// A layout for the version is already registered.
    #[error("Schema version {version} is already registered")]
    VersionExists {
        /// Schema version.
        version: u32,
    },

    /// A layout was given two templates for the same role.
    #[error("Schema version {version} already has a template for role {role}")]
    DuplicateRole {
        /// Schema version.
        version: u32,
        /// The duplicated role.
        role: Role,
    },

    /// A template string cannot be parsed.
    #[error("Malformed template {template:?}: {reason}")]
    MalformedTemplate {
        /// The template source.
        template: String,
        /// What is wrong with it.
        reason: String,
    },

    /// No registered template matches the key.
    #[error("Key {key:?} does not match any registered layout")]
    UnrecognizedKey {
        /// The key.
        key: String,
    },

    /// A date placeholder value is not in [`KEY_DATE_FORMAT`].
    #[error("Invalid key date {value:?}")]
    InvalidDate {
        /// The rejected value.
        value: String,
    },
}
