//! Remote configuration from TOML files and the environment.
//!
//! A remote file holds the fields of [`Remote`]:
//!
//! ```toml
//! bucket = "tethysts"
//! version = 4
//! public_url = "https://b2.tethys-ts.xyz/file"
//!
//! [connection_config]
//! service_name = "s3"
//! endpoint_url = "https://s3.us-west-000.backblazeb2.com"
//! aws_access_key_id = "..."
//! aws_secret_access_key = "..."
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Overrides |
//! |---|---|
//! | `TETHYS_BUCKET` | `bucket` |
//! | `TETHYS_ENDPOINT_URL` | `connection_config.endpoint_url` |
//! | `TETHYS_ACCESS_KEY_ID` | `connection_config.aws_access_key_id` |
//! | `TETHYS_SECRET_ACCESS_KEY` | `connection_config.aws_secret_access_key` |
//!
//! When the file has no `connection_config`, the three connection
//! variables must be set together to create one.

use std::path::Path;

use tethys_models::{ConnectionConfig, Record as _, Remote};

use crate::StorageError;

pub const BUCKET_VAR: &str = "TETHYS_BUCKET";
pub const ENDPOINT_URL_VAR: &str = "TETHYS_ENDPOINT_URL";
pub const ACCESS_KEY_ID_VAR: &str = "TETHYS_ACCESS_KEY_ID";
pub const SECRET_ACCESS_KEY_VAR: &str = "TETHYS_SECRET_ACCESS_KEY";

/// Service name used for connections built from the environment.
const DEFAULT_SERVICE_NAME: &str = "s3";

/// Loads a remote from a TOML file and applies environment overrides.
///
/// # Errors
///
/// Returns [`StorageError::Io`] if the file cannot be read, and the errors
/// of [`parse_remote`].
pub fn load_remote(path: &Path) -> Result<Remote, StorageError> {
    log::debug!("Loading remote configuration from {}", path.display());
    let text = std::fs::read_to_string(path)?;
    parse_remote(&text, &path.display().to_string(), env_var)
}

/// Parses a remote from TOML, applies overrides from `lookup` and
/// validates the result.
///
/// # Errors
///
/// Returns [`StorageError::Config`] for malformed TOML,
/// [`StorageError::MissingEnv`] if only some connection variables are set
/// and [`StorageError::Validation`] if the final remote is invalid.
pub fn parse_remote(
    text: &str,
    origin: &str,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<Remote, StorageError> {
    let mut remote: Remote = toml::from_str(text).map_err(|source| StorageError::Config {
        path: origin.to_string(),
        source,
    })?;

    if let Some(bucket) = lookup(BUCKET_VAR) {
        remote.bucket = bucket;
    }

    match remote.connection_config.as_mut() {
        Some(config) => {
            if let Some(url) = lookup(ENDPOINT_URL_VAR) {
                config.endpoint_url = url;
            }
            if let Some(key) = lookup(ACCESS_KEY_ID_VAR) {
                config.aws_access_key_id = key;
            }
            if let Some(secret) = lookup(SECRET_ACCESS_KEY_VAR) {
                config.aws_secret_access_key = secret;
            }
        }
        None => {
            let any_set = [ENDPOINT_URL_VAR, ACCESS_KEY_ID_VAR, SECRET_ACCESS_KEY_VAR]
                .iter()
                .any(|&name| lookup(name).is_some());
            if any_set {
                remote.connection_config = Some(connection_from(&lookup)?);
            }
        }
    }

    Ok(remote.validated()?)
}

/// Builds connection settings from the `TETHYS_*` environment variables.
///
/// # Errors
///
/// Returns [`StorageError::MissingEnv`] if any variable is unset.
pub fn connection_from_env() -> Result<ConnectionConfig, StorageError> {
    connection_from(&env_var)
}

fn connection_from(
    lookup: &impl Fn(&str) -> Option<String>,
) -> Result<ConnectionConfig, StorageError> {
    let require = |name: &str| {
        lookup(name).ok_or_else(|| StorageError::MissingEnv {
            name: name.to_string(),
        })
    };
    Ok(ConnectionConfig {
        service_name: DEFAULT_SERVICE_NAME.to_string(),
        endpoint_url: require(ENDPOINT_URL_VAR)?,
        aws_access_key_id: require(ACCESS_KEY_ID_VAR)?,
        aws_secret_access_key: require(SECRET_ACCESS_KEY_VAR)?,
    })
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use tethys_models::Rule;

    use super::*;

    const FILE: &str = r#"
bucket = "tethysts"
version = 4
public_url = "https://b2.tethys-ts.xyz/file"

[connection_config]
service_name = "s3"
endpoint_url = "https://s3.example.com"
aws_access_key_id = "key"
aws_secret_access_key = "secret"
"#;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: BTreeMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn parses_a_remote_file() {
        let remote = parse_remote(FILE, "remote.toml", env(&[])).unwrap();
        assert_eq!(remote.bucket, "tethysts");
        assert_eq!(remote.version, 4);
        let config = remote.connection_config.unwrap();
        assert_eq!(config.endpoint_url, "https://s3.example.com");
    }

    #[test]
    fn environment_overrides_the_file() {
        let remote = parse_remote(
            FILE,
            "remote.toml",
            env(&[
                (BUCKET_VAR, "other"),
                (SECRET_ACCESS_KEY_VAR, "rotated"),
            ]),
        )
        .unwrap();
        assert_eq!(remote.bucket, "other");
        let config = remote.connection_config.unwrap();
        assert_eq!(config.aws_secret_access_key, "rotated");
        assert_eq!(config.aws_access_key_id, "key");
    }

    #[test]
    fn connection_from_environment_needs_all_variables() {
        let bare = "bucket = \"b\"\nversion = 4\n";
        assert!(
            parse_remote(bare, "bare.toml", env(&[]))
                .unwrap()
                .connection_config
                .is_none()
        );

        let partial = parse_remote(bare, "bare.toml", env(&[(ENDPOINT_URL_VAR, "https://x.io")]));
        assert!(
            matches!(&partial, Err(StorageError::MissingEnv { name }) if name == ACCESS_KEY_ID_VAR),
            "{partial:?}"
        );

        let full = parse_remote(
            bare,
            "bare.toml",
            env(&[
                (ENDPOINT_URL_VAR, "https://x.io"),
                (ACCESS_KEY_ID_VAR, "k"),
                (SECRET_ACCESS_KEY_VAR, "s"),
            ]),
        )
        .unwrap();
        assert_eq!(full.connection_config.unwrap().service_name, "s3");
    }

    #[test]
    fn invalid_files_are_rejected() {
        assert!(matches!(
            parse_remote("bucket = ", "broken.toml", env(&[])),
            Err(StorageError::Config { .. })
        ));

        match parse_remote("bucket = \"b\"\nversion = 1\n", "old.toml", env(&[])) {
            Err(StorageError::Validation(e)) => {
                assert!(e.has("version", Rule::OutOfRange), "{e}");
            }
            other => panic!("expected a validation error, got {other:?}"),
        }
    }
}
