//! attrmap core library.
//!
//! This crate translates user-attribute records between a canonical internal
//! representation and protocol-specific external profiles (SAML, OpenID
//! Connect, ...): configuration, error types, record types, and the mapping
//! engine.

pub mod config;
pub mod errors;
pub mod mapping;
pub mod models;

// Re-exports for convenience.
pub use config::{AttributeMapConfig, MapperOptions};
pub use errors::{ConfigError, CoreError, TemplateError};
pub use mapping::AttributeMapper;
pub use models::{ExternalAttributes, InternalAttributes};
