//! Parameter assignment module.
//!
//! This module assigns the parameters requested through parameter rules:
//! - Candidate generation of integer and file rules
//! - Static row sources (range, sequence, list, file) of attach rules
//! - The registry of module generators
//! - Distribution of values over requesting objects

pub mod assign;
pub mod candidates;
pub mod generator;
pub mod source;

// Re-export commonly used types
pub use assign::{assign_attach_rules, assign_parameters};
pub use candidates::parameter_candidates;
pub use generator::{GeneratorContext, GeneratorFn, GeneratorRegistry};
pub use source::{generate_source_rows, Row};
