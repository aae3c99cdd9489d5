#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Reading and writing Tethys archives in object storage.
//!
//! [`TethysClient`] ties together an [`ObjectStore`] backend, a [`Codec`]
//! and the key layout of one schema version. Records are stored as
//! compressed compact JSON; result chunks are stored as compressed bytes
//! addressed by their content-derived chunk id.
//!
//! ## Backends
//!
//! - [`MemoryStore`]: an in-process map, for tests and dry runs.
//! - [`S3Store`]: any S3-compatible service. Uploads compare size and
//!   MD5/`ETag` with the existing object and skip unchanged content.

pub mod client;
pub mod codec;
pub mod config;
pub mod memory;
pub mod s3;
pub mod store;

use tethys_identity::IdentityError;
use tethys_keys::KeyError;
use tethys_models::{RecordError, ValidationError};

pub use client::TethysClient;
pub use codec::{Codec, ZstdCodec};
pub use config::{load_remote, parse_remote};
pub use memory::MemoryStore;
pub use s3::S3Store;
pub use store::{ObjectStore, PutOutcome};

/// Errors raised by storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// No object is stored under the key.
    #[error("Object not found: {key}")]
    NotFound {
        /// The missing key.
        key: String,
    },

    /// The backend failed to carry out an operation.
    #[error("Failed to {operation} s3://{bucket}/{key}: {source}")]
    Backend {
        /// Operation name (`get`, `put`, `head`, `list`).
        operation: &'static str,
        /// Bucket name.
        bucket: String,
        /// Object key or prefix.
        key: String,
        /// Underlying SDK error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Compressing or decompressing an object failed.
    #[error("Failed to decode {key}: {source}")]
    Codec {
        /// Key of the object.
        key: String,
        /// Underlying codec error.
        source: std::io::Error,
    },

    /// The stored bytes do not match the recorded content hash.
    #[error("Content hash mismatch for {key}: expected {expected}, got {actual}")]
    HashMismatch {
        /// Key of the object.
        key: String,
        /// Hash recorded in the chunk metadata.
        expected: String,
        /// Hash of the fetched bytes.
        actual: String,
    },

    /// A record failed validation before being written.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A key could not be rendered.
    #[error(transparent)]
    Key(#[from] KeyError),

    /// A record could not be parsed or serialized.
    #[error(transparent)]
    Record(#[from] RecordError),

    /// An id or content hash could not be derived.
    #[error(transparent)]
    Identity(#[from] IdentityError),

    /// Missing required environment variable.
    #[error("Missing environment variable: {name}")]
    MissingEnv {
        /// Name of the missing environment variable.
        name: String,
    },

    /// The remote configuration file is malformed.
    #[error("Invalid remote configuration {path}: {source}")]
    Config {
        /// Path of the configuration file.
        path: String,
        /// Underlying parse error.
        source: toml::de::Error,
    },

    /// I/O error reading local files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
