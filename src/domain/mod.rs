//! Domain layer for Layer Guardian
//!
//! Architecture: Domain Model - Pure data and rules for architectural conformance
//! - Module records, violations, reports and the rule catalog
//! - Independent of file systems, parsers and terminals

pub mod catalog;
pub mod model;
pub mod violations;

// Re-export main domain types for convenience
pub use model::*;
pub use violations::*;
