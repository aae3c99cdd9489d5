//! Results versions of a dataset.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Record;
use crate::validation::{Violation, Violations};

/// A named version of a dataset's results.
///
/// `version_date` is the key that every [`crate::ResultChunk`] of the
/// version carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultVersion {
    /// Owning dataset.
    pub dataset_id: String,
    /// Identifies the version.
    #[serde(with = "crate::datetime")]
    pub version_date: DateTime<Utc>,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// DOI of this version, as an `http(s)` URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
    /// Free-text notes on the version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Time of the last update.
    #[serde(with = "crate::datetime")]
    pub modified_date: DateTime<Utc>,
}

impl ResultVersion {
    /// Creates a version entry; both timestamps are kept at second
    /// precision.
    #[must_use]
    pub fn new(
        dataset_id: impl Into<String>,
        version_date: DateTime<Utc>,
        modified_date: DateTime<Utc>,
    ) -> Self {
        Self {
            dataset_id: dataset_id.into(),
            version_date: crate::datetime::truncate(version_date),
            name: None,
            doi: None,
            description: None,
            modified_date: crate::datetime::truncate(modified_date),
        }
    }
}

impl Record for ResultVersion {
    const KIND: &'static str = "result version";

    fn validate(&self) -> Vec<Violation> {
        let mut v = Violations::new();
        v.not_empty("dataset_id", &self.dataset_id);
        v.not_empty_opt("name", self.name.as_deref());
        v.not_empty_opt("description", self.description.as_deref());
        if let Some(doi) = &self.doi {
            v.url("doi", doi);
        }
        v.into_vec()
    }
}
