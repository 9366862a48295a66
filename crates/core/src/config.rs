//! Typed configuration for the attribute mapper.
//!
//! The configuration maps every internal attribute name to, per profile, an
//! ordered list of external attribute names:
//!
//! ```toml
//! [attributes.mail]
//! saml = ["email", "mail", "urn:oid:0.9.2342.19200300.100.1.3"]
//! openid = ["email"]
//!
//! [attributes.street]
//! openid = ["address.street_address"]
//!
//! [template_attributes.domain]
//! saml = ["${eppn[0] | scope}"]
//!
//! [options]
//! separator = "."
//! multivalue_separator = ";"
//! template_marker = "$"
//! ```
//!
//! Files ending in `.json` are parsed as JSON with the same shape; anything
//! else is parsed as TOML. Both sections keep the order in which attributes
//! are declared, which is the order template attributes are resolved in.

use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::ConfigError;

/// Profile name -> ordered external attribute names.
pub type ProfileMapping = IndexMap<String, Vec<String>>;

/// Internal attribute name -> per-profile mapping.
pub type AttributeTable = IndexMap<String, ProfileMapping>;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level attribute mapping configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttributeMapConfig {
    /// Plain name mappings. Required.
    pub attributes: AttributeTable,

    /// Attributes derived from templates over other internal attributes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_attributes: Option<AttributeTable>,

    /// Separator characters and template marker.
    #[serde(default)]
    pub options: MapperOptions,
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Characters that drive nested names and template rendering.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MapperOptions {
    /// Separator for nested external names, e.g. `address.street_address`.
    #[serde(default = "default_separator")]
    pub separator: char,

    /// Separator between multiple values in rendered template output.
    #[serde(default = "default_multivalue_separator")]
    pub multivalue_separator: char,

    /// Marker that identifies an entry of `template_attributes` as a template.
    #[serde(default = "default_template_marker")]
    pub template_marker: char,
}

fn default_separator() -> char {
    '.'
}
fn default_multivalue_separator() -> char {
    ';'
}
fn default_template_marker() -> char {
    '$'
}

impl Default for MapperOptions {
    fn default() -> Self {
        Self {
            separator: default_separator(),
            multivalue_separator: default_multivalue_separator(),
            template_marker: default_template_marker(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading & validation
// ---------------------------------------------------------------------------

impl AttributeMapConfig {
    /// Load an [`AttributeMapConfig`] from a TOML or JSON file.
    ///
    /// This does **not** validate the result -- call
    /// [`validate`](Self::validate) afterwards, or use
    /// [`load_and_validate`](Self::load_and_validate).
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading attribute configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        let config = if is_json {
            Self::from_json_str(&contents)?
        } else {
            Self::from_toml_str(&contents)?
        };

        debug!(
            attributes = config.attributes.len(),
            template_attributes = config.template_attributes.as_ref().map_or(0, |t| t.len()),
            "configuration parsed successfully"
        );
        Ok(config)
    }

    /// Parse a configuration from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Parse a configuration from JSON text.
    pub fn from_json_str(contents: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(contents).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Validate the structural invariants the mapper relies on.
    ///
    /// Internal and external names must be non-empty. An empty name list is
    /// allowed and leaves the attribute unmapped for that profile.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_table("attributes", &self.attributes)?;
        if let Some(ref templates) = self.template_attributes {
            validate_table("template_attributes", templates)?;
        }

        let MapperOptions {
            separator,
            multivalue_separator,
            template_marker,
        } = self.options;
        if separator == multivalue_separator
            || separator == template_marker
            || multivalue_separator == template_marker
        {
            return Err(ConfigError::InvalidValue {
                field: "options".into(),
                detail: format!(
                    "separator '{separator}', multivalue_separator '{multivalue_separator}' \
                     and template_marker '{template_marker}' must be distinct"
                ),
            });
        }

        Ok(())
    }

    /// Convenience: load and validate in one call.
    pub fn load_and_validate<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load_from_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// All profile names referenced by either section, sorted.
    pub fn profiles(&self) -> Vec<String> {
        let mut profiles: Vec<String> = self
            .attributes
            .values()
            .chain(self.template_attributes.iter().flat_map(|t| t.values()))
            .flat_map(|mapping| mapping.keys().cloned())
            .collect();
        profiles.sort();
        profiles.dedup();
        profiles
    }
}

fn validate_table(section: &str, table: &AttributeTable) -> Result<(), ConfigError> {
    for (internal_name, mapping) in table {
        if internal_name.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: section.into(),
                detail: "internal attribute name must not be empty".into(),
            });
        }
        for (profile, external_names) in mapping {
            if let Some(index) = external_names.iter().position(String::is_empty) {
                return Err(ConfigError::InvalidValue {
                    field: format!("{section}.{internal_name}.{profile}[{index}]"),
                    detail: "external name must not be empty".into(),
                });
            }
        }
    }
    Ok(())
}
