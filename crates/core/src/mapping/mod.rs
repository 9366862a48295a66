//! Attribute mapping engine for translating attribute records between the
//! internal representation and protocol-specific profiles.
//!
//! - [`mapper`]: lookup tables and the three translation operations
//! - [`nested`]: dotted external names such as `address.street_address`
//! - [`template`]: attributes derived from other internal attributes

pub mod mapper;
pub mod nested;
pub mod template;

pub use mapper::AttributeMapper;
pub use template::{scope, Template};
