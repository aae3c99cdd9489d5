//! Parsed key templates.
//!
//! A template is a sequence of literal text and `{placeholder}` slots.
//! Placeholder values never contain `/` or `.`, and every literal that
//! follows a placeholder starts with one of those characters, so a key
//! matches a template in at most one way.

use std::fmt;
use std::str::FromStr;

use crate::params::check_value;
use crate::{KeyError, KeyParams, Placeholder};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Slot(Placeholder),
}

/// Why [`Template::fill`] failed; the registry adds version and role context.
#[derive(Debug)]
pub(crate) enum FillError {
    Missing(Placeholder),
    Invalid(KeyError),
}

/// A parsed key template such as `tethys/v4/{dataset_id}.dataset.json.zst`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    segments: Vec<Segment>,
}

impl Template {
    /// Parses a template string.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::MalformedTemplate`] on unbalanced braces, unknown
    /// placeholder names, or a placeholder not followed by `/`, `.` or the
    /// end of the template.
    pub fn parse(source: &str) -> Result<Self, KeyError> {
        let malformed = |reason: String| KeyError::MalformedTemplate {
            template: source.to_string(),
            reason,
        };

        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = source.chars();

        while let Some(c) = chars.next() {
            match c {
                '{' => {
                    let mut name = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some('{') | None => {
                                return Err(malformed("unclosed '{'".to_string()));
                            }
                            Some(c) => name.push(c),
                        }
                    }
                    let placeholder = Placeholder::from_str(&name)
                        .map_err(|_| malformed(format!("unknown placeholder {name:?}")))?;

                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    } else if matches!(segments.last(), Some(Segment::Slot(_))) {
                        return Err(malformed("adjacent placeholders".to_string()));
                    }
                    segments.push(Segment::Slot(placeholder));
                }
                '}' => return Err(malformed("unmatched '}'".to_string())),
                c => {
                    if literal.is_empty()
                        && matches!(segments.last(), Some(Segment::Slot(_)))
                        && c != '/'
                        && c != '.'
                    {
                        return Err(malformed(format!(
                            "placeholder must be followed by '/' or '.', found {c:?}"
                        )));
                    }
                    literal.push(c);
                }
            }
        }

        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    /// The template source string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Placeholders the template requires, in order of appearance.
    pub fn placeholders(&self) -> impl Iterator<Item = Placeholder> + '_ {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Slot(p) => Some(*p),
            Segment::Literal(_) => None,
        })
    }

    /// Literal text before the first placeholder.
    #[must_use]
    pub fn static_prefix(&self) -> &str {
        match self.segments.first() {
            Some(Segment::Literal(literal)) => literal,
            _ => "",
        }
    }

    /// Substitutes every placeholder.
    pub(crate) fn fill(&self, params: &KeyParams) -> Result<String, FillError> {
        let mut key = String::with_capacity(self.source.len() + 32);
        for segment in &self.segments {
            match segment {
                Segment::Literal(literal) => key.push_str(literal),
                Segment::Slot(placeholder) => {
                    let value = params
                        .get(*placeholder)
                        .ok_or(FillError::Missing(*placeholder))?;
                    check_value(*placeholder, value).map_err(FillError::Invalid)?;
                    key.push_str(value);
                }
            }
        }
        Ok(key)
    }

    /// Extracts placeholder values if `key` has this template's shape.
    #[must_use]
    pub fn matches(&self, key: &str) -> Option<KeyParams> {
        let mut rest = key;
        let mut params = KeyParams::new();

        for segment in &self.segments {
            match segment {
                Segment::Literal(literal) => rest = rest.strip_prefix(literal.as_str())?,
                Segment::Slot(placeholder) => {
                    let end = rest.find(['/', '.']).unwrap_or(rest.len());
                    if end == 0 {
                        return None;
                    }
                    let value = &rest[..end];
                    if placeholder.is_date() && crate::parse_key_date(value).is_err() {
                        return None;
                    }
                    params.set(*placeholder, value);
                    rest = &rest[end..];
                }
            }
        }

        rest.is_empty().then_some(params)
    }
}

impl FromStr for Template {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_placeholders_in_order() {
        let template =
            Template::parse("tethys/v4/{dataset_id}.{station_id}.station.json.zst").unwrap();
        let placeholders: Vec<_> = template.placeholders().collect();
        assert_eq!(
            placeholders,
            vec![Placeholder::DatasetId, Placeholder::StationId]
        );
        assert_eq!(template.static_prefix(), "tethys/v4/");
        assert_eq!(
            template.to_string(),
            "tethys/v4/{dataset_id}.{station_id}.station.json.zst"
        );
    }

    #[test]
    fn rejects_malformed_templates() {
        for bad in [
            "tethys/{dataset_id",
            "tethys/dataset_id}",
            "tethys/{nope}.json",
            "tethys/{dataset_id}{station_id}",
            "tethys/{dataset_id}_x.json",
        ] {
            assert!(
                matches!(
                    Template::parse(bad),
                    Err(KeyError::MalformedTemplate { .. })
                ),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn matches_only_its_own_shape() {
        let template = Template::parse("tethys/v4/{dataset_id}.dataset.json.zst").unwrap();
        let params = template.matches("tethys/v4/abc.dataset.json.zst").unwrap();
        assert_eq!(params.get(Placeholder::DatasetId), Some("abc"));

        assert!(template.matches("tethys/v4/datasets.json.zst").is_none());
        assert!(template.matches("tethys/v4/abc.xyz.dataset.json.zst").is_none());
        assert!(template.matches("tethys/v4/.dataset.json.zst").is_none());
    }

    #[test]
    fn date_slots_only_match_key_dates() {
        let template = Template::parse("tethys/v2/{dataset_id}/{run_date}/x.json").unwrap();
        assert!(template.matches("tethys/v2/abc/20200101T000000Z/x.json").is_some());
        assert!(template.matches("tethys/v2/abc/latest/x.json").is_none());
    }
}
