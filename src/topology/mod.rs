//! Network topology module.
//!
//! This module contains the input graph model and the label classifier that
//! turns raw graph labels into class, relational, place and value labels.

pub mod graph;
pub mod labels;

// Re-export key types and functions for easier access
pub use graph::{Graph, GraphEdge, GraphGroup, GraphNode};
pub use labels::{classify_labels, split_labels, ParsedLabels, RelationalLabel};
