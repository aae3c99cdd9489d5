//! S3-compatible object store.
//!
//! ## Smart uploads
//!
//! `put` first issues a `HeadObject` and compares size and MD5/`ETag` with
//! the bytes about to be written. Matching objects are not re-uploaded,
//! which makes re-running an ingest over content-addressed chunks cheap.

use async_trait::async_trait;
use aws_config::Region;
use aws_sdk_s3::config::{Credentials, StalledStreamProtectionConfig};
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::operation::head_object::HeadObjectError;
use tethys_models::{ConnectionConfig, Remote};

use crate::StorageError;
use crate::config::connection_from_env;
use crate::store::{ObjectStore, PutOutcome};

/// Maximum number of download attempts (initial + retries).
const MAX_GET_ATTEMPTS: u32 = 3;

/// Base delay between download retries (doubles each attempt).
const RETRY_BASE_DELAY: std::time::Duration = std::time::Duration::from_secs(2);

/// Region passed to the SDK; S3-compatible services ignore it.
const DEFAULT_REGION: &str = "auto";

/// Remote object metadata from `HeadObject`.
struct RemoteMeta {
    size: u64,
    /// Usually the quoted MD5 hex digest for non-multipart uploads.
    etag: Option<String>,
}

/// An [`ObjectStore`] over one bucket of an S3-compatible service.
pub struct S3Store {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl std::fmt::Debug for S3Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Store")
            .field("bucket", &self.bucket)
            .finish_non_exhaustive()
    }
}

impl S3Store {
    /// Creates a store for `bucket` with explicit connection settings.
    #[must_use]
    pub fn new(bucket: impl Into<String>, connection: &ConnectionConfig) -> Self {
        let creds = Credentials::new(
            &connection.aws_access_key_id,
            &connection.aws_secret_access_key,
            None,
            None,
            "tethys-remote",
        );

        let config = aws_sdk_s3::Config::builder()
            .endpoint_url(&connection.endpoint_url)
            .region(Region::new(DEFAULT_REGION))
            .credentials_provider(creds)
            .force_path_style(true)
            .stalled_stream_protection(StalledStreamProtectionConfig::disabled())
            .build();

        Self {
            client: aws_sdk_s3::Client::from_conf(config),
            bucket: bucket.into(),
        }
    }

    /// Creates a store for a remote, using its connection settings or,
    /// when it has none, the `TETHYS_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::MissingEnv`] if the remote has no connection
    /// settings and the environment is incomplete.
    pub fn from_remote(remote: &Remote) -> Result<Self, StorageError> {
        match &remote.connection_config {
            Some(connection) => Ok(Self::new(&remote.bucket, connection)),
            None => Self::from_env(&remote.bucket),
        }
    }

    /// Creates a store for `bucket` from the `TETHYS_*` environment
    /// variables.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::MissingEnv`] if any variable is unset.
    pub fn from_env(bucket: &str) -> Result<Self, StorageError> {
        Ok(Self::new(bucket, &connection_from_env()?))
    }

    /// Name of the bucket.
    #[must_use]
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn backend_error(
        &self,
        operation: &'static str,
        key: &str,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> StorageError {
        StorageError::Backend {
            operation,
            bucket: self.bucket.clone(),
            key: key.to_string(),
            source: Box::new(source),
        }
    }

    /// Fetch object metadata via `HeadObject`.
    ///
    /// Returns `None` if the object doesn't exist.
    async fn head(&self, key: &str) -> Result<Option<RemoteMeta>, StorageError> {
        let result = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        match result {
            Ok(output) => {
                let size = u64::try_from(output.content_length().unwrap_or(0)).unwrap_or(0);
                let etag = output.e_tag().map(str::to_string);
                Ok(Some(RemoteMeta { size, etag }))
            }
            Err(err) => {
                if err
                    .as_service_error()
                    .is_some_and(HeadObjectError::is_not_found)
                {
                    return Ok(None);
                }
                Err(self.backend_error("head", key, err))
            }
        }
    }

    /// Single download attempt.
    async fn get_once(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let output = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(output) => output,
            Err(err) => {
                if err
                    .as_service_error()
                    .is_some_and(GetObjectError::is_no_such_key)
                {
                    return Err(StorageError::NotFound {
                        key: key.to_string(),
                    });
                }
                return Err(self.backend_error("get", key, err));
            }
        };

        let bytes = output
            .body
            .collect()
            .await
            .map_err(|e| self.backend_error("get", key, e))?;
        Ok(bytes.into_bytes().to_vec())
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<PutOutcome, StorageError> {
        if let Some(remote) = self.head(key).await?
            && is_match(&bytes, &remote)
        {
            log::info!("s3://{}/{key}: skipped (unchanged)", self.bucket);
            return Ok(PutOutcome::Unchanged);
        }

        log::info!(
            "Pushing s3://{}/{key} ({} bytes)",
            self.bucket,
            bytes.len()
        );

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(aws_sdk_s3::primitives::ByteStream::from(bytes))
            .content_type("application/zstd")
            .send()
            .await
            .map_err(|e| self.backend_error("put", key, e))?;

        Ok(PutOutcome::Written)
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        log::debug!("Pulling s3://{}/{key}", self.bucket);

        let mut attempt = 1;
        loop {
            match self.get_once(key).await {
                Err(e @ StorageError::Backend { .. }) if attempt < MAX_GET_ATTEMPTS => {
                    let delay = RETRY_BASE_DELAY * 2u32.saturating_pow(attempt - 1);
                    log::warn!(
                        "download attempt {attempt}/{MAX_GET_ATTEMPTS} of {key} failed ({e}), \
                         retrying in {delay:.1?}..."
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        log::info!("Listing s3://{}/{prefix}*", self.bucket);

        let mut keys = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix);

            if let Some(token) = &continuation_token {
                request = request.continuation_token(token);
            }

            let output = request
                .send()
                .await
                .map_err(|e| self.backend_error("list", prefix, e))?;

            keys.extend(output.contents().iter().filter_map(|obj| obj.key().map(String::from)));

            if output.is_truncated() == Some(true) {
                continuation_token = output.next_continuation_token().map(String::from);
            } else {
                break;
            }
        }

        log::info!("  found {} objects", keys.len());
        Ok(keys)
    }
}

/// Checks whether `bytes` match the remote object.
///
/// Sizes must be equal. When the `ETag` is a plain MD5 digest (not a
/// multipart `ETag`, which contains `-`) it must match the MD5 of `bytes`;
/// otherwise equal sizes are taken as a match.
fn is_match(bytes: &[u8], remote: &RemoteMeta) -> bool {
    if u64::try_from(bytes.len()).ok() != Some(remote.size) {
        return false;
    }

    if let Some(etag) = &remote.etag {
        let clean = etag.trim_matches('"');
        if !clean.contains('-') && clean.len() == 32 {
            let mut context = md5::Context::new();
            context.consume(bytes);
            return format!("{:x}", context.finalize()) == clean;
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(size: u64, etag: Option<&str>) -> RemoteMeta {
        RemoteMeta {
            size,
            etag: etag.map(str::to_string),
        }
    }

    #[test]
    fn md5_etag_decides_when_sizes_match() {
        // md5("hello")
        let etag = "\"5d41402abc4b2a76b9719d911017c592\"";
        assert!(is_match(b"hello", &meta(5, Some(etag))));
        assert!(!is_match(b"hellp", &meta(5, Some(etag))));
        assert!(!is_match(b"hello!", &meta(5, Some(etag))));
    }

    #[test]
    fn multipart_etag_falls_back_to_size() {
        assert!(is_match(b"hello", &meta(5, Some("\"abc123-5\""))));
        assert!(is_match(b"hello", &meta(5, None)));
    }

    #[test]
    fn store_from_remote_uses_its_connection() {
        let mut remote = Remote::new("tethysts", 4);
        remote.connection_config = Some(ConnectionConfig {
            service_name: "s3".to_string(),
            endpoint_url: "https://s3.example.com".to_string(),
            aws_access_key_id: "key".to_string(),
            aws_secret_access_key: "secret".to_string(),
        });
        let store = S3Store::from_remote(&remote).unwrap();
        assert_eq!(store.bucket(), "tethysts");
        assert!(!format!("{store:?}").contains("secret"));
    }
}
