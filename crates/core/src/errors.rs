//! Error types for the attrmap core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them for callers that want a single
//! error type.
//!
//! Translation itself never fails: only configuration loading and validation
//! surface errors to callers. [`TemplateError`] is produced while rendering a
//! template and is swallowed by the mapper at the evaluation boundary.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Template(#[from] TemplateError),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML / JSON parse error, including a missing `attributes` section.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue {
        field: String,
        detail: String,
    },

    /// A template expression could not be compiled.
    #[error("invalid template for '{field}': {detail}")]
    InvalidTemplate {
        field: String,
        detail: String,
    },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Template errors
// ---------------------------------------------------------------------------

/// Errors from compiling or rendering a template expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    /// The template source is malformed.
    #[error("template syntax error at byte {position}: {detail}")]
    Syntax {
        position: usize,
        detail: String,
    },

    /// The template references an attribute with no value in the record.
    #[error("undefined variable '{0}'")]
    UndefinedVariable(String),

    /// `scope` was applied to a value without an `@`.
    #[error("unscoped string '{0}'")]
    Unscoped(String),

    /// The template calls a function that is not built in.
    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    /// An operation was applied to a value of the wrong shape.
    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    /// List indexing outside the bounds of the list.
    #[error("index {index} out of range for list of length {len}")]
    IndexOutOfRange {
        index: i64,
        len: usize,
    },

    /// The template exceeds one of the complexity caps.
    #[error("template too complex: {0}")]
    TooComplex(String),
}
