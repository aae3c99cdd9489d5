//! The versioned template registry and the built-in layouts.

use std::collections::BTreeMap;

use crate::template::FillError;
use crate::{KeyError, KeyParams, Role, Template};

/// Digest length (bytes) of ids issued under the built-in layouts.
const BUILTIN_ID_DIGEST_LEN: usize = 12;

/// Built-in templates, per schema version.
const BUILTIN_LAYOUTS: &[(u32, &[(Role, &str)])] = &[
    (
        2,
        &[
            (Role::Dataset, "tethys/v2/{dataset_id}/dataset.json.zst"),
            (Role::Datasets, "tethys/v2/datasets.json.zst"),
            (
                Role::Station,
                "tethys/v2/{dataset_id}/{station_id}/station.json.zst",
            ),
            (Role::Stations, "tethys/v2/{dataset_id}/stations.json.zst"),
            (
                Role::Results,
                "tethys/v2/{dataset_id}/{station_id}/{run_date}/results.nc.zst",
            ),
            (
                Role::ResultsObjectKeys,
                "tethys/v2/{dataset_id}/results_object_keys.json.zst",
            ),
        ],
    ),
    (
        3,
        &[
            (Role::Dataset, "tethys/v3/{dataset_id}/dataset.json.zst"),
            (Role::Datasets, "tethys/v3/datasets.json.zst"),
            (
                Role::Station,
                "tethys/v3/{dataset_id}/{station_id}/station.json.zst",
            ),
            (Role::Stations, "tethys/v3/{dataset_id}/stations.json.zst"),
            (
                Role::Results,
                "tethys/v3/{dataset_id}/{station_id}/{run_date}/results.nc.zst",
            ),
            (
                Role::ResultsObjectKeys,
                "tethys/v3/{dataset_id}/results_object_keys.json.zst",
            ),
            (
                Role::Diagnostics,
                "tethys/v3/{dataset_id}/{run_date}/diagnostics.json.zst",
            ),
            (
                Role::InterimResults,
                "tethys/v3/interim_results/{run_id}/{dataset_id}/{station_id}/{start_date}.results.nc.zst",
            ),
        ],
    ),
    (
        4,
        &[
            (Role::Dataset, "tethys/v4/{dataset_id}.dataset.json.zst"),
            (Role::Datasets, "tethys/v4/datasets.json.zst"),
            (
                Role::Station,
                "tethys/v4/{dataset_id}.{station_id}.station.json.zst",
            ),
            (Role::Stations, "tethys/v4/{dataset_id}.stations.json.zst"),
            (
                Role::Results,
                "tethys/v4/{dataset_id}.{station_id}.{chunk_id}.{version_date}.results.nc.zst",
            ),
            (Role::Versions, "tethys/v4/{dataset_id}.versions.json.zst"),
            (
                Role::Diagnostics,
                "tethys/v4/{dataset_id}.{run_date}.diagnostics.json.zst",
            ),
            (
                Role::InterimResults,
                "tethys/v4/interim_results/{run_id}/{dataset_id}.{station_id}.{chunk_id}.{start_date}.results.nc.zst",
            ),
        ],
    ),
];

/// The templates of one schema version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    version: u32,
    id_digest_len: usize,
    templates: BTreeMap<Role, Template>,
}

impl Layout {
    /// Creates an empty layout.
    #[must_use]
    pub const fn new(version: u32, id_digest_len: usize) -> Self {
        Self {
            version,
            id_digest_len,
            templates: BTreeMap::new(),
        }
    }

    /// Adds the template for a role.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::MalformedTemplate`] if the template does not
    /// parse, or [`KeyError::DuplicateRole`] if the role already has one.
    pub fn with_template(mut self, role: Role, template: &str) -> Result<Self, KeyError> {
        if self.templates.contains_key(&role) {
            return Err(KeyError::DuplicateRole {
                version: self.version,
                role,
            });
        }
        self.templates.insert(role, Template::parse(template)?);
        Ok(self)
    }

    /// Schema version of this layout.
    #[must_use]
    pub const fn version(&self) -> u32 {
        self.version
    }

    /// Digest length (bytes) of ids addressed by this layout.
    #[must_use]
    pub const fn id_digest_len(&self) -> usize {
        self.id_digest_len
    }

    /// Template for a role, if the layout has one.
    #[must_use]
    pub fn template(&self, role: Role) -> Option<&Template> {
        self.templates.get(&role)
    }

    /// Roles with a template, in role order.
    pub fn roles(&self) -> impl Iterator<Item = Role> + '_ {
        self.templates.keys().copied()
    }
}

/// A key recognised by [`KeyRegistry::parse`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedKey {
    /// Schema version of the matching layout.
    pub version: u32,
    /// Role of the matching template.
    pub role: Role,
    /// Placeholder values extracted from the key.
    pub params: KeyParams,
}

/// Append-only mapping from schema version to [`Layout`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRegistry {
    layouts: BTreeMap<u32, Layout>,
}

impl Default for KeyRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl KeyRegistry {
    /// Creates a registry without any layout.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            layouts: BTreeMap::new(),
        }
    }

    /// Creates a registry holding the built-in layouts (versions 2, 3, 4).
    ///
    /// # Panics
    ///
    /// Panics if a built-in template is malformed (covered by tests).
    #[must_use]
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        for (version, templates) in BUILTIN_LAYOUTS {
            let layout = templates
                .iter()
                .try_fold(
                    Layout::new(*version, BUILTIN_ID_DIGEST_LEN),
                    |layout, (role, template)| layout.with_template(*role, template),
                )
                .unwrap_or_else(|e| panic!("Built-in layout v{version} is invalid: {e}"));
            registry
                .register(layout)
                .unwrap_or_else(|e| panic!("Built-in layout v{version} registered twice: {e}"));
        }
        registry
    }

    /// Adds a layout for a new schema version.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::VersionExists`] if the version is already
    /// registered; existing layouts are never replaced.
    pub fn register(&mut self, layout: Layout) -> Result<(), KeyError> {
        let version = layout.version;
        if self.layouts.contains_key(&version) {
            return Err(KeyError::VersionExists { version });
        }
        log::debug!(
            "Registering key layout v{version} ({} roles)",
            layout.templates.len()
        );
        self.layouts.insert(version, layout);
        Ok(())
    }

    /// Layout of a schema version.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::UnknownSchemaVersion`] if it is not registered.
    pub fn layout(&self, version: u32) -> Result<&Layout, KeyError> {
        self.layouts
            .get(&version)
            .ok_or(KeyError::UnknownSchemaVersion { version })
    }

    /// Registered schema versions in ascending order.
    pub fn versions(&self) -> impl Iterator<Item = u32> + '_ {
        self.layouts.keys().copied()
    }

    /// Highest registered schema version.
    #[must_use]
    pub fn latest_version(&self) -> Option<u32> {
        self.layouts.keys().next_back().copied()
    }

    /// Renders the key of `role` under schema `version`.
    ///
    /// Parameters the template does not use are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::UnknownSchemaVersion`], [`KeyError::UnknownRole`],
    /// [`KeyError::MissingParameter`] or [`KeyError::InvalidParameter`].
    pub fn render(&self, version: u32, role: Role, params: &KeyParams) -> Result<String, KeyError> {
        let template = self
            .layout(version)?
            .template(role)
            .ok_or(KeyError::UnknownRole { version, role })?;

        template.fill(params).map_err(|e| match e {
            FillError::Missing(placeholder) => KeyError::MissingParameter {
                version,
                role,
                placeholder,
            },
            FillError::Invalid(e) => e,
        })
    }

    /// Recognises a key and recovers its version, role and parameters.
    ///
    /// Layouts are tried from the newest version down; the first matching
    /// template wins. Built-in templates never overlap.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::UnrecognizedKey`] if no template matches.
    pub fn parse(&self, key: &str) -> Result<ParsedKey, KeyError> {
        for layout in self.layouts.values().rev() {
            for (role, template) in &layout.templates {
                if !key.starts_with(template.static_prefix()) {
                    continue;
                }
                if let Some(params) = template.matches(key) {
                    return Ok(ParsedKey {
                        version: layout.version,
                        role: *role,
                        params,
                    });
                }
            }
        }

        log::trace!("No layout matches key {key}");
        Err(KeyError::UnrecognizedKey {
            key: key.to_string(),
        })
    }

    /// Common prefix of every key in a schema version, for listing.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::UnknownSchemaVersion`] if it is not registered.
    pub fn prefix(&self, version: u32) -> Result<String, KeyError> {
        let layout = self.layout(version)?;
        let mut prefixes = layout.templates.values().map(Template::static_prefix);
        let first = prefixes.next().unwrap_or_default();
        let common = prefixes.fold(first, |acc, p| {
            let len = acc
                .char_indices()
                .zip(p.chars())
                .take_while(|((_, a), b)| a == b)
                .last()
                .map_or(0, |((i, c), _)| i + c.len_utf8());
            &acc[..len]
        });
        Ok(common.to_string())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::Placeholder;

    fn full_params() -> KeyParams {
        let date = Utc.with_ymd_and_hms(2021, 3, 4, 5, 6, 7).unwrap();
        KeyParams::new()
            .dataset_id("abc")
            .station_id("xyz")
            .chunk_id("c0ffee")
            .run_id("run1")
            .run_date(&date)
            .version_date(&date)
            .start_date(&date)
    }

    #[test]
    fn builtin_layouts_load() {
        let registry = KeyRegistry::builtin();
        assert_eq!(registry.versions().collect::<Vec<_>>(), vec![2, 3, 4]);
        assert_eq!(registry.latest_version(), Some(4));
        for version in registry.versions() {
            assert_eq!(registry.layout(version).unwrap().id_digest_len(), 12);
        }
    }

    #[test]
    fn renders_v4_station_key() {
        let registry = KeyRegistry::builtin();
        let params = KeyParams::new().dataset_id("abc").station_id("xyz");
        assert_eq!(
            registry.render(4, Role::Station, &params).unwrap(),
            "tethys/v4/abc.xyz.station.json.zst"
        );
    }

    #[test]
    fn renders_nested_v2_results_key() {
        let registry = KeyRegistry::builtin();
        assert_eq!(
            registry.render(2, Role::Results, &full_params()).unwrap(),
            "tethys/v2/abc/xyz/20210304T050607Z/results.nc.zst"
        );
        assert_eq!(
            registry.render(4, Role::Results, &full_params()).unwrap(),
            "tethys/v4/abc.xyz.c0ffee.20210304T050607Z.results.nc.zst"
        );
    }

    #[test]
    fn missing_parameter_is_reported() {
        let registry = KeyRegistry::builtin();
        let params = KeyParams::new().dataset_id("abc");
        assert_eq!(
            registry.render(4, Role::Station, &params),
            Err(KeyError::MissingParameter {
                version: 4,
                role: Role::Station,
                placeholder: Placeholder::StationId,
            })
        );
    }

    #[test]
    fn unknown_version_and_role_are_reported() {
        let registry = KeyRegistry::builtin();
        let params = full_params();
        assert_eq!(
            registry.render(1, Role::Dataset, &params),
            Err(KeyError::UnknownSchemaVersion { version: 1 })
        );
        assert_eq!(
            registry.render(2, Role::Versions, &params),
            Err(KeyError::UnknownRole {
                version: 2,
                role: Role::Versions,
            })
        );
        assert_eq!(
            registry.render(4, Role::ResultsObjectKeys, &params),
            Err(KeyError::UnknownRole {
                version: 4,
                role: Role::ResultsObjectKeys,
            })
        );
    }

    #[test]
    fn invalid_values_are_rejected() {
        let registry = KeyRegistry::builtin();
        let params = KeyParams::new().dataset_id("a.b").station_id("xyz");
        assert!(matches!(
            registry.render(4, Role::Station, &params),
            Err(KeyError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn every_rendered_key_parses_back_to_its_role() {
        let registry = KeyRegistry::builtin();
        let params = full_params();
        for version in registry.versions() {
            let layout = registry.layout(version).unwrap();
            for role in layout.roles() {
                let key = registry.render(version, role, &params).unwrap();
                let parsed = registry.parse(&key).unwrap();
                assert_eq!(parsed.version, version, "{key}");
                assert_eq!(parsed.role, role, "{key}");

                let template = layout.template(role).unwrap();
                for placeholder in template.placeholders() {
                    assert_eq!(
                        parsed.params.get(placeholder),
                        params.get(placeholder),
                        "{key}: {placeholder}"
                    );
                }
            }
        }
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let registry = KeyRegistry::builtin();
        assert!(matches!(
            registry.parse("tethys/v9/abc.dataset.json.zst"),
            Err(KeyError::UnrecognizedKey { .. })
        ));
        assert!(matches!(
            registry.parse("other/abc.json"),
            Err(KeyError::UnrecognizedKey { .. })
        ));
    }

    #[test]
    fn registry_is_append_only() {
        let mut registry = KeyRegistry::builtin();
        let before = registry.layout(4).unwrap().clone();

        let replacement = Layout::new(4, 12)
            .with_template(Role::Dataset, "tethys/v4/{dataset_id}/other.json")
            .unwrap();
        assert_eq!(
            registry.register(replacement),
            Err(KeyError::VersionExists { version: 4 })
        );
        assert_eq!(registry.layout(4).unwrap(), &before);

        let v5 = Layout::new(5, 12)
            .with_template(Role::Dataset, "tethys/v5/{dataset_id}/meta.json.zst")
            .unwrap();
        registry.register(v5).unwrap();
        assert_eq!(registry.latest_version(), Some(5));
        assert_eq!(
            registry
                .render(5, Role::Dataset, &KeyParams::new().dataset_id("abc"))
                .unwrap(),
            "tethys/v5/abc/meta.json.zst"
        );
        assert_eq!(registry.layout(4).unwrap(), &before);
    }

    #[test]
    fn duplicate_roles_are_rejected() {
        let result = Layout::new(9, 12)
            .with_template(Role::Dataset, "a/{dataset_id}.json")
            .and_then(|l| l.with_template(Role::Dataset, "b/{dataset_id}.json"));
        assert_eq!(
            result,
            Err(KeyError::DuplicateRole {
                version: 9,
                role: Role::Dataset,
            })
        );
    }

    #[test]
    fn prefix_is_shared_by_all_templates() {
        let registry = KeyRegistry::builtin();
        assert_eq!(registry.prefix(2).unwrap(), "tethys/v2/");
        assert_eq!(registry.prefix(4).unwrap(), "tethys/v4/");
    }
}
