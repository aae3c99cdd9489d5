//! Placeholder values supplied to key rendering and recovered by parsing.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::{KeyError, Placeholder};

/// `strftime` format of timestamps embedded in keys (e.g. `20200101T000000Z`).
pub const KEY_DATE_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// Formats a timestamp for use in a key.
#[must_use]
pub fn format_key_date(date: &DateTime<Utc>) -> String {
    date.format(KEY_DATE_FORMAT).to_string()
}

/// Parses a timestamp rendered by [`format_key_date`].
///
/// # Errors
///
/// Returns [`KeyError::InvalidDate`] if `value` is not in
/// [`KEY_DATE_FORMAT`].
pub fn parse_key_date(value: &str) -> Result<DateTime<Utc>, KeyError> {
    NaiveDateTime::parse_from_str(value, KEY_DATE_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|_| KeyError::InvalidDate {
            value: value.to_string(),
        })
}

/// Placeholder values for one key.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct KeyParams {
    values: BTreeMap<Placeholder, String>,
}

impl KeyParams {
    /// Creates an empty parameter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a placeholder value, replacing any previous one.
    pub fn set(&mut self, placeholder: Placeholder, value: impl Into<String>) {
        self.values.insert(placeholder, value.into());
    }

    /// Builder form of [`KeyParams::set`].
    #[must_use]
    pub fn with(mut self, placeholder: Placeholder, value: impl Into<String>) -> Self {
        self.set(placeholder, value);
        self
    }

    /// Sets `dataset_id`.
    #[must_use]
    pub fn dataset_id(self, value: impl Into<String>) -> Self {
        self.with(Placeholder::DatasetId, value)
    }

    /// Sets `station_id`.
    #[must_use]
    pub fn station_id(self, value: impl Into<String>) -> Self {
        self.with(Placeholder::StationId, value)
    }

    /// Sets `chunk_id`.
    #[must_use]
    pub fn chunk_id(self, value: impl Into<String>) -> Self {
        self.with(Placeholder::ChunkId, value)
    }

    /// Sets `run_id`.
    #[must_use]
    pub fn run_id(self, value: impl Into<String>) -> Self {
        self.with(Placeholder::RunId, value)
    }

    /// Sets `run_date` from a timestamp.
    #[must_use]
    pub fn run_date(self, date: &DateTime<Utc>) -> Self {
        self.with(Placeholder::RunDate, format_key_date(date))
    }

    /// Sets `version_date` from a timestamp.
    #[must_use]
    pub fn version_date(self, date: &DateTime<Utc>) -> Self {
        self.with(Placeholder::VersionDate, format_key_date(date))
    }

    /// Sets `start_date` from a timestamp.
    #[must_use]
    pub fn start_date(self, date: &DateTime<Utc>) -> Self {
        self.with(Placeholder::StartDate, format_key_date(date))
    }

    /// Returns the raw value of a placeholder.
    #[must_use]
    pub fn get(&self, placeholder: Placeholder) -> Option<&str> {
        self.values.get(&placeholder).map(String::as_str)
    }

    /// Returns a date placeholder as a timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::InvalidDate`] if the stored value does not parse.
    pub fn date(&self, placeholder: Placeholder) -> Result<Option<DateTime<Utc>>, KeyError> {
        self.get(placeholder).map(parse_key_date).transpose()
    }

    /// Iterates over all set placeholders in placeholder order.
    pub fn iter(&self) -> impl Iterator<Item = (Placeholder, &str)> {
        self.values.iter().map(|(p, v)| (*p, v.as_str()))
    }

    /// Number of placeholders set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if no placeholder is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Checks that a placeholder value can be embedded in a key and recovered.
pub(crate) fn check_value(placeholder: Placeholder, value: &str) -> Result<(), KeyError> {
    if value.is_empty() || value.contains(['/', '.']) {
        return Err(KeyError::InvalidParameter {
            placeholder,
            value: value.to_string(),
        });
    }
    if placeholder.is_date() {
        parse_key_date(value)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn key_dates_round_trip_at_second_precision() {
        let date = Utc.with_ymd_and_hms(2020, 1, 31, 12, 30, 5).unwrap();
        let formatted = format_key_date(&date);
        assert_eq!(formatted, "20200131T123005Z");
        assert_eq!(parse_key_date(&formatted).unwrap(), date);
    }

    #[test]
    fn rejects_malformed_dates() {
        assert!(matches!(
            parse_key_date("2020-01-31"),
            Err(KeyError::InvalidDate { .. })
        ));
    }

    #[test]
    fn builder_sets_values() {
        let date = Utc.with_ymd_and_hms(2021, 6, 1, 0, 0, 0).unwrap();
        let params = KeyParams::new()
            .dataset_id("abc")
            .station_id("xyz")
            .version_date(&date);
        assert_eq!(params.get(Placeholder::DatasetId), Some("abc"));
        assert_eq!(params.get(Placeholder::VersionDate), Some("20210601T000000Z"));
        assert_eq!(params.date(Placeholder::VersionDate).unwrap(), Some(date));
        assert_eq!(params.date(Placeholder::RunDate).unwrap(), None);
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn values_with_separators_are_invalid() {
        assert!(check_value(Placeholder::DatasetId, "abc").is_ok());
        assert!(check_value(Placeholder::DatasetId, "a/b").is_err());
        assert!(check_value(Placeholder::DatasetId, "a.b").is_err());
        assert!(check_value(Placeholder::RunId, "").is_err());
        assert!(check_value(Placeholder::RunDate, "yesterday").is_err());
    }
}
