//! Serde adapters for timestamps at second precision.
//!
//! Timestamps are written as `YYYY-MM-DDTHH:MM:SSZ`. Reading accepts any
//! RFC 3339 value (converted to UTC) and, for objects written by older
//! producers, a bare `YYYY-MM-DDTHH:MM:SS[.fff]` taken as UTC. Sub-second
//! digits are dropped on read so that a round trip is lossless.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Timelike as _, Utc};
use serde::{Deserialize as _, Deserializer, Serializer, de};

/// Drops the sub-second part of a timestamp.
#[must_use]
pub fn truncate(value: DateTime<Utc>) -> DateTime<Utc> {
    value.with_nanosecond(0).unwrap_or(value)
}

/// The current time at second precision.
#[must_use]
pub fn now() -> DateTime<Utc> {
    truncate(Utc::now())
}

/// Formats a timestamp the way records store it.
#[must_use]
pub fn format(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parses a stored timestamp.
///
/// # Errors
///
/// Returns the `chrono` parse error if `value` is neither RFC 3339 nor a
/// bare ISO-8601 date-time.
pub fn parse(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    match DateTime::parse_from_rfc3339(value) {
        Ok(parsed) => Ok(truncate(parsed.with_timezone(&Utc))),
        Err(e) => NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| truncate(naive.and_utc()))
            .map_err(|_| e),
    }
}

/// Serializes a timestamp; use with `#[serde(with = "crate::datetime")]`.
///
/// # Errors
///
/// Propagates serializer errors.
pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format(value))
}

/// Deserializes a timestamp.
///
/// # Errors
///
/// Fails if the value is not a string or does not parse.
pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    let value = String::deserialize(deserializer)?;
    parse(&value).map_err(|e| de::Error::custom(format_args!("invalid datetime {value:?}: {e}")))
}

/// The same adapters for `Option<DateTime<Utc>>`.
pub mod option {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize as _, Deserializer, Serializer, de};

    /// Serializes an optional timestamp.
    ///
    /// # Errors
    ///
    /// Propagates serializer errors.
    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(value) => serializer.serialize_some(&super::format(value)),
            None => serializer.serialize_none(),
        }
    }

    /// Deserializes an optional timestamp.
    ///
    /// # Errors
    ///
    /// Fails if a present value does not parse.
    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|value| {
                super::parse(&value).map_err(|e| {
                    de::Error::custom(format_args!("invalid datetime {value:?}: {e}"))
                })
            })
            .transpose()
    }
}
