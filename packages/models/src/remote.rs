//! Where an archive lives: bucket, credentials and schema version.

use serde::{Deserialize, Serialize};

use crate::Record;
use crate::validation::{Rule, Violation, Violations};

/// Oldest key-layout version a remote may declare.
pub const MIN_REMOTE_VERSION: u32 = 2;

/// S3-compatible connection settings.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Service name passed to the client, usually `s3`.
    pub service_name: String,
    /// Endpoint of the object store.
    pub endpoint_url: String,
    pub aws_access_key_id: String,
    pub aws_secret_access_key: String,
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("service_name", &self.service_name)
            .field("endpoint_url", &self.endpoint_url)
            .field("aws_access_key_id", &self.aws_access_key_id)
            .field("aws_secret_access_key", &"<redacted>")
            .finish()
    }
}

impl ConnectionConfig {
    fn check(&self, v: &mut Violations) {
        v.not_empty("service_name", &self.service_name);
        v.url("endpoint_url", &self.endpoint_url);
        v.not_empty("aws_access_key_id", &self.aws_access_key_id);
        v.not_empty("aws_secret_access_key", &self.aws_secret_access_key);
    }
}

/// A bucket holding a Tethys archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Remote {
    pub bucket: String,
    /// Credentials for writing; readers of a public bucket can omit them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_config: Option<ConnectionConfig>,
    /// Base URL for anonymous reads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_url: Option<String>,
    /// Key-layout version of the archive.
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Remote {
    /// A remote for `bucket` at the given key-layout version.
    #[must_use]
    pub fn new(bucket: impl Into<String>, version: u32) -> Self {
        Self {
            bucket: bucket.into(),
            connection_config: None,
            public_url: None,
            version,
            description: None,
        }
    }
}

impl Record for Remote {
    const KIND: &'static str = "remote";

    fn validate(&self) -> Vec<Violation> {
        let mut v = Violations::new();
        v.not_empty("bucket", &self.bucket);
        v.ensure(
            self.version >= MIN_REMOTE_VERSION,
            "version",
            Rule::OutOfRange,
            format!("{} is older than {MIN_REMOTE_VERSION}", self.version),
        );
        if let Some(config) = &self.connection_config {
            let mut inner = Violations::new();
            config.check(&mut inner);
            v.nest("connection_config", inner.into_vec());
        }
        if let Some(url) = &self.public_url {
            v.url("public_url", url);
        }
        v.not_empty_opt("description", self.description.as_deref());
        v.into_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ConnectionConfig {
        ConnectionConfig {
            service_name: "s3".to_string(),
            endpoint_url: "https://s3.example.com".to_string(),
            aws_access_key_id: "AKIA".to_string(),
            aws_secret_access_key: "hunter2".to_string(),
        }
    }

    #[test]
    fn debug_hides_the_secret() {
        let debug = format!("{:?}", config());
        assert!(!debug.contains("hunter2"), "{debug}");
        assert!(debug.contains("AKIA"));
    }

    #[test]
    fn remote_round_trips() {
        let mut remote = Remote::new("tethysts", 4);
        remote.connection_config = Some(config());
        remote.public_url = Some("https://b2.tethys-ts.xyz/file".to_string());
        let bytes = remote.to_canonical_bytes().unwrap();
        assert_eq!(Remote::from_json(&bytes).unwrap(), remote);

        let bare: Remote = serde_json::from_str(r#"{"bucket":"b","version":2}"#).unwrap();
        assert!(bare.validate().is_empty());
    }

    #[test]
    fn rejects_old_versions_and_bad_urls() {
        let mut remote = Remote::new("tethysts", 1);
        let mut config = config();
        config.endpoint_url = "s3.example.com".to_string();
        remote.connection_config = Some(config);
        remote.public_url = Some("ftp://example.com".to_string());

        let error = remote.validated().unwrap_err();
        assert!(error.has("version", Rule::OutOfRange), "{error}");
        assert!(error.has("connection_config.endpoint_url", Rule::InvalidUrl), "{error}");
        assert!(error.has("public_url", Rule::InvalidUrl), "{error}");
    }
}
