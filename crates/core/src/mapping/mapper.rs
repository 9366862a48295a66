//! Core attribute translation logic.
//!
//! [`AttributeMapper`] owns the configuration plus the tables derived from
//! it, and translates attribute records between the internal representation
//! and any configured profile.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use tracing::{debug, warn};

use super::nested::{construct_nested, get_nested};
use super::template::Template;
use crate::config::{AttributeMapConfig, MapperOptions};
use crate::errors::{ConfigError, CoreError};
use crate::models::{collect_values, values_to_json, ExternalAttributes, InternalAttributes};

/// Compiled templates of one derived attribute, keyed by profile.
type ProfileTemplates = HashMap<String, Vec<Template>>;

/// Bidirectional attribute mapper.
///
/// Immutable once built: every operation takes `&self`, so a single mapper
/// can be shared across threads behind an `Arc`.
#[derive(Debug, Clone)]
pub struct AttributeMapper {
    config: AttributeMapConfig,
    /// profile -> external name -> internal name.
    to_internal_attributes: HashMap<String, HashMap<String, String>>,
    /// internal name -> profile -> compiled templates, in declaration order.
    templates: Vec<(String, ProfileTemplates)>,
}

impl AttributeMapper {
    /// Build a mapper from a configuration.
    ///
    /// The configuration is validated and every template is compiled here;
    /// this is the only point at which the mapper reports errors.
    pub fn new(config: AttributeMapConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let to_internal_attributes = build_inverse_table(&config);
        let templates = compile_templates(&config)?;

        debug!(
            attributes = config.attributes.len(),
            template_attributes = templates.len(),
            profiles = to_internal_attributes.len(),
            "attribute mapper initialized"
        );

        Ok(Self {
            config,
            to_internal_attributes,
            templates,
        })
    }

    /// Load, validate and compile the configuration at `path`.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, CoreError> {
        let config = AttributeMapConfig::load_from_file(path)?;
        Ok(Self::new(config)?)
    }

    /// The configuration this mapper was built from.
    pub fn config(&self) -> &AttributeMapConfig {
        &self.config
    }

    /// Separator and template settings in effect.
    pub fn options(&self) -> &MapperOptions {
        &self.config.options
    }

    /// Profiles that have at least one plain attribute mapping, sorted.
    pub fn profiles(&self) -> Vec<String> {
        let mut profiles: Vec<String> = self.to_internal_attributes.keys().cloned().collect();
        profiles.sort();
        profiles
    }

    /// Translate external attribute names of `profile` to internal names.
    ///
    /// Unmapped names are ignored. The result holds each internal name once.
    /// An unknown profile yields an empty list.
    pub fn to_internal_filter<S: AsRef<str>>(
        &self,
        profile: &str,
        external_names: &[S],
    ) -> Vec<String> {
        let Some(profile_mapping) = self.to_internal_attributes.get(profile) else {
            warn!(profile, "no attribute mapping found for the given attribute profile");
            return Vec::new();
        };

        let internal_names: BTreeSet<&String> = external_names
            .iter()
            .filter_map(|name| profile_mapping.get(name.as_ref()))
            .collect();

        internal_names.into_iter().cloned().collect()
    }

    /// Translate an external record of `profile` into an internal record.
    ///
    /// For every configured internal attribute, the values of all its
    /// external names are collated in configured order. Attributes without
    /// values are left out. Template attributes are resolved afterwards
    /// against the result.
    pub fn to_internal(&self, profile: &str, external: &ExternalAttributes) -> InternalAttributes {
        let mut internal = InternalAttributes::new();

        for (internal_name, mapping) in &self.config.attributes {
            let Some(external_names) = mapping.get(profile) else {
                debug!(
                    internal = %internal_name,
                    profile,
                    "no attribute mapping found for internal attribute in profile"
                );
                continue;
            };

            let values = self.collate_by_priority(external_names, external);
            if values.is_empty() {
                debug!(external = ?external_names, "skipped backend attribute: no value found");
                continue;
            }

            debug!(
                external = ?external_names,
                internal = %internal_name,
                values = ?values,
                "backend attribute mapped"
            );
            internal.insert(internal_name.clone(), values);
        }

        self.apply_template_attributes(profile, &mut internal);
        internal
    }

    /// Translate an internal record into the external record of `profile`.
    ///
    /// Each internal attribute is written under the first external name
    /// configured for the profile. A nested name such as
    /// `address.street_address` is written as a nested object under its
    /// first segment; a later attribute targeting the same first segment
    /// replaces the earlier object.
    pub fn from_internal(&self, profile: &str, internal: &InternalAttributes) -> ExternalAttributes {
        let separator = self.config.options.separator;
        let mut external = ExternalAttributes::new();

        for (internal_name, values) in internal {
            let Some(mapping) = self.config.attributes.get(internal_name) else {
                debug!(internal = %internal_name, "no attribute mapping found for the internal attribute");
                continue;
            };
            let Some(external_name) = mapping.get(profile).and_then(|names| names.first()) else {
                debug!(
                    internal = %internal_name,
                    profile,
                    "no mapping found for internal attribute in attribute profile"
                );
                continue;
            };

            debug!(
                external = %external_name,
                internal = %internal_name,
                values = ?values,
                "frontend attribute mapped"
            );

            let value = values_to_json(values);
            match external_name.split_once(separator) {
                Some((top, rest)) => {
                    let segments: Vec<&str> = rest.split(separator).collect();
                    external.insert(top.to_string(), construct_nested(&segments, value));
                }
                None => {
                    external.insert(external_name.clone(), value);
                }
            }
        }

        external
    }

    /// Gather values for each external name in order, spreading lists.
    fn collate_by_priority(
        &self,
        external_names: &[String],
        external: &ExternalAttributes,
    ) -> Vec<String> {
        let separator = self.config.options.separator;
        let mut values = Vec::new();
        for name in external_names {
            if let Some(value) = get_nested(external, name, separator) {
                collect_values(value, &mut values);
            }
        }
        values
    }

    /// Resolve template attributes in place.
    ///
    /// Templates see the record as built so far, including the output of
    /// template attributes processed before them. A template that fails to
    /// render contributes no values. When no template of an attribute
    /// produces values, any existing value of that attribute is kept.
    fn apply_template_attributes(&self, profile: &str, internal: &mut InternalAttributes) {
        let separator = self.config.options.multivalue_separator;

        for (internal_name, by_profile) in &self.templates {
            let Some(templates) = by_profile.get(profile) else {
                continue;
            };

            let mut rendered = Vec::new();
            for template in templates {
                match template.render_values(internal, separator) {
                    Ok(values) => rendered.extend(values),
                    Err(e) => debug!(
                        internal = %internal_name,
                        template = template.source(),
                        error = %e,
                        "template produced no value"
                    ),
                }
            }

            if !rendered.is_empty() {
                debug!(internal = %internal_name, values = ?rendered, "template attribute rendered");
                internal.insert(internal_name.clone(), rendered);
            } else if internal.contains_key(internal_name) {
                debug!(internal = %internal_name, "templates empty, keeping mapped value");
            }
        }
    }
}

/// Invert `attributes` into profile -> external name -> internal name.
///
/// A (profile, external name) pair listed under several internal attributes
/// resolves to the one declared last.
fn build_inverse_table(config: &AttributeMapConfig) -> HashMap<String, HashMap<String, String>> {
    let mut table: HashMap<String, HashMap<String, String>> = HashMap::new();
    for (internal_name, mapping) in &config.attributes {
        for (profile, external_names) in mapping {
            let profile_table = table.entry(profile.clone()).or_default();
            for external_name in external_names {
                if let Some(previous) =
                    profile_table.insert(external_name.clone(), internal_name.clone())
                {
                    if previous != *internal_name {
                        debug!(
                            profile = %profile,
                            external = %external_name,
                            previous = %previous,
                            internal = %internal_name,
                            "external attribute remapped, last mapping wins"
                        );
                    }
                }
            }
        }
    }
    table
}

/// Compile the template entries of `template_attributes`.
///
/// Entries without the template marker are not templates and are skipped.
fn compile_templates(
    config: &AttributeMapConfig,
) -> Result<Vec<(String, ProfileTemplates)>, ConfigError> {
    let Some(ref template_attributes) = config.template_attributes else {
        return Ok(Vec::new());
    };
    let marker = config.options.template_marker;

    let mut compiled = Vec::with_capacity(template_attributes.len());
    for (internal_name, mapping) in template_attributes {
        let mut by_profile = ProfileTemplates::new();
        for (profile, entries) in mapping {
            let mut templates = Vec::new();
            for (index, entry) in entries.iter().enumerate() {
                if !entry.contains(marker) {
                    continue;
                }
                let template =
                    Template::compile(entry, marker).map_err(|e| ConfigError::InvalidTemplate {
                        field: format!("template_attributes.{internal_name}.{profile}[{index}]"),
                        detail: e.to_string(),
                    })?;
                templates.push(template);
            }
            by_profile.insert(profile.clone(), templates);
        }
        compiled.push((internal_name.clone(), by_profile));
    }
    Ok(compiled)
}
