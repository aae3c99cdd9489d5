//! Structured rule violations.

use std::fmt;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// The kind of rule a field broke.
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
pub enum Rule {
    /// A field required in this context is absent.
    Required,
    /// A string or list that must have content is empty.
    Empty,
    /// A number lies outside its allowed range.
    OutOfRange,
    /// A number must be greater than zero.
    NotPositive,
    /// A number must not be negative.
    Negative,
    /// A number is NaN or infinite.
    NonFinite,
    /// A value is not an absolute http(s) URL.
    InvalidUrl,
    /// A geometry fails structural validation.
    InvalidGeometry,
    /// A stored id differs from the id derived from the record's content.
    IdMismatch,
    /// A range ends before it starts.
    ReversedTimeRange,
    /// Summary statistics are not ordered `min <= mean, median <= max`.
    StatsOrder,
    /// The result type requires a dimension that is absent.
    DimensionRequired,
    /// The result type forbids a dimension that is present.
    DimensionForbidden,
    /// A dimension struct does not belong to the result type.
    DimensionsMismatch,
    /// A time range is not contained in the range that should enclose it.
    NotContained,
    /// A chunk day is not on a bucket boundary.
    Misaligned,
    /// A reference points to a different record than the one it belongs to.
    Reference,
    /// A value contains the reserved field delimiter.
    ContainsDelimiter,
    /// Parent references form a cycle.
    Cycle,
    /// A string does not have the required format.
    Malformed,
}

/// One broken rule on one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// Path of the offending field, e.g. `results_chunks[2].band`.
    pub field: String,
    /// The broken rule.
    pub rule: Rule,
    /// Human readable detail.
    pub detail: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} ({})", self.field, self.rule, self.detail)
    }
}

/// Every violation found in one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Record kind.
    pub kind: &'static str,
    /// The violations, in discovery order.
    pub violations: Vec<Violation>,
}

impl ValidationError {
    /// Fails if `violations` is non-empty.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] holding the violations.
    pub fn check(kind: &'static str, violations: Vec<Violation>) -> Result<(), Self> {
        if violations.is_empty() {
            Ok(())
        } else {
            Err(Self { kind, violations })
        }
    }

    /// Returns `true` if some violation is on `field` with `rule`.
    #[must_use]
    pub fn has(&self, field: &str, rule: Rule) -> bool {
        self.violations
            .iter()
            .any(|v| v.field == field && v.rule == rule)
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Invalid {} ({} violations)",
            self.kind,
            self.violations.len()
        )?;
        for violation in &self.violations {
            write!(f, "; {violation}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

/// Collector used by `validate` implementations.
#[derive(Debug, Default)]
pub struct Violations {
    items: Vec<Violation>,
}

impl Violations {
    /// Creates an empty collector.
    #[must_use]
    pub const fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Records a violation.
    pub fn push(&mut self, field: impl Into<String>, rule: Rule, detail: impl Into<String>) {
        self.items.push(Violation {
            field: field.into(),
            rule,
            detail: detail.into(),
        });
    }

    /// Records a violation unless `ok` holds.
    pub fn ensure(&mut self, ok: bool, field: &str, rule: Rule, detail: impl Into<String>) {
        if !ok {
            self.push(field, rule, detail);
        }
    }

    /// Adds violations of a nested value under `prefix`.
    ///
    /// Index prefixes (`[3]`) and index fields are joined without a dot.
    pub fn nest(&mut self, prefix: &str, inner: Vec<Violation>) {
        for mut violation in inner {
            violation.field = if prefix.is_empty() {
                violation.field
            } else if violation.field.is_empty() {
                prefix.to_string()
            } else if violation.field.starts_with('[') {
                format!("{prefix}{}", violation.field)
            } else {
                format!("{prefix}.{}", violation.field)
            };
            self.items.push(violation);
        }
    }

    /// Requires a non-empty (after trimming) string.
    pub fn not_empty(&mut self, field: &str, value: &str) {
        self.ensure(
            !value.trim().is_empty(),
            field,
            Rule::Empty,
            "must not be empty",
        );
    }

    /// Requires an optional string to be non-empty when present.
    pub fn not_empty_opt(&mut self, field: &str, value: Option<&str>) {
        if let Some(value) = value {
            self.not_empty(field, value);
        }
    }

    /// Requires a finite number.
    pub fn finite(&mut self, field: &str, value: f64) -> bool {
        let ok = value.is_finite();
        self.ensure(ok, field, Rule::NonFinite, format!("{value} is not finite"));
        ok
    }

    /// Requires a finite number greater than zero.
    pub fn positive(&mut self, field: &str, value: f64) {
        if self.finite(field, value) {
            self.ensure(
                value > 0.0,
                field,
                Rule::NotPositive,
                format!("{value} must be greater than 0"),
            );
        }
    }

    /// Requires a finite number that is zero or greater.
    pub fn non_negative(&mut self, field: &str, value: f64) {
        if self.finite(field, value) {
            self.ensure(
                value >= 0.0,
                field,
                Rule::Negative,
                format!("{value} must not be negative"),
            );
        }
    }

    /// Requires every element of a list to be finite.
    pub fn all_finite(&mut self, field: &str, values: &[f64]) {
        for (index, value) in values.iter().enumerate() {
            self.finite(&format!("{field}[{index}]"), *value);
        }
    }

    /// Requires an absolute `http` or `https` URL.
    pub fn url(&mut self, field: &str, value: &str) {
        match url::Url::parse(value) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") && parsed.has_host() => {}
            Ok(parsed) => self.push(
                field,
                Rule::InvalidUrl,
                format!("{value:?} has scheme {:?}, expected http(s)", parsed.scheme()),
            ),
            Err(e) => self.push(field, Rule::InvalidUrl, format!("{value:?}: {e}")),
        }
    }

    /// Returns `true` if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns the collected violations.
    #[must_use]
    pub fn into_vec(self) -> Vec<Violation> {
        self.items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_paths_join_fields_and_indices() {
        let mut inner = Violations::new();
        inner.push("band", Rule::Negative, "-1");
        let mut list = Violations::new();
        list.nest("[2]", inner.into_vec());

        let mut outer = Violations::new();
        outer.nest("results_chunks", list.into_vec());
        let violations = outer.into_vec();

        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].field, "results_chunks[2].band");
        assert_eq!(violations[0].rule, Rule::Negative);
    }

    #[test]
    fn urls_must_be_absolute_http() {
        let mut v = Violations::new();
        v.url("doi", "https://doi.org/10.1000/182");
        v.url("public_url", "http://example.com/bucket");
        assert!(v.is_empty());

        v.url("doi", "10.1000/182");
        v.url("doi", "ftp://example.com/file");
        let violations = v.into_vec();
        assert_eq!(violations.len(), 2);
        assert!(violations.iter().all(|v| v.rule == Rule::InvalidUrl));
    }

    #[test]
    fn numeric_helpers_report_one_violation_each() {
        let mut v = Violations::new();
        v.positive("precision", 0.0);
        v.positive("spatial_resolution", f64::NAN);
        v.non_negative("block_length", -1.0);
        v.non_negative("block_length", 0.0);

        let rules: Vec<_> = v.into_vec().into_iter().map(|v| v.rule).collect();
        assert_eq!(
            rules,
            vec![Rule::NotPositive, Rule::NonFinite, Rule::Negative]
        );
    }

    #[test]
    fn error_display_lists_every_violation() {
        let error = ValidationError {
            kind: "dataset",
            violations: vec![
                Violation {
                    field: "units".to_string(),
                    rule: Rule::Empty,
                    detail: "must not be empty".to_string(),
                },
                Violation {
                    field: "precision".to_string(),
                    rule: Rule::NotPositive,
                    detail: "0 must be greater than 0".to_string(),
                },
            ],
        };
        let message = error.to_string();
        assert!(message.contains("units: empty"), "{message}");
        assert!(message.contains("precision: not_positive"), "{message}");
        assert!(error.has("units", Rule::Empty));
        assert!(!error.has("units", Rule::NotPositive));
    }
}
