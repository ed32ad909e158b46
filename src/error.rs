//! Compilation errors.
//!
//! Every failure of the resolution pipeline is a [`CompileError`]. Variants are
//! grouped by kind: reference errors (an unknown name), conflict errors
//! (contradicting declarations), capacity errors (not enough values), structural
//! errors (dependency cycles, internal invariants) and input errors (unreadable
//! or malformed source data). Each message names the offending object, class or
//! rule.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    // Reference errors
    #[error("unknown {kind} class '{name}' referenced by {object}")]
    UnknownClass {
        kind: String,
        name: String,
        object: String,
    },

    #[error("invalid parameter rule name {name} (requested by {object})")]
    UnknownRule { name: String, object: String },

    #[error("layer {layer} not found ({context})")]
    UnknownLayer { layer: String, context: String },

    #[error("invalid policy name {policy} in {kind}class {class}")]
    UnknownPolicy {
        policy: String,
        kind: String,
        class: String,
    },

    #[error("undefined IP policy {policy} for {object}")]
    UndefinedPolicy { policy: String, object: String },

    #[error("unknown node '{name}' referenced by {context}")]
    UnknownNode { name: String, context: String },

    #[error("unknown place label {target} (specified for meta value label {alias})")]
    UnknownPlaceLabel { target: String, alias: String },

    #[error("no generator found for {name}")]
    UnknownGenerator { name: String },

    #[error("unknown module {name}")]
    UnknownModule { name: String },

    // Conflict errors
    #[error("multiple primary {kind} classes on {object} ({first}, {second})")]
    DuplicatePrimary {
        kind: String,
        object: String,
        first: String,
        second: String,
    },

    #[error("{field} can be specified only in primary class (found in {kind}class {class})")]
    PrimaryOnlyField {
        field: String,
        kind: String,
        class: String,
    },

    #[error("inconsistent specification of ip address ({detail}) in network segment {segment}")]
    InconsistentAddress { detail: String, segment: String },

    #[error("inconsistent IP policy ({first}, {second}) for segment {segment}")]
    InconsistentPolicy {
        first: String,
        second: String,
        segment: String,
    },

    #[error("no policy defined for {object} in layer {layer}")]
    MissingPolicy { object: String, layer: String },

    #[error("duplicated place label {label} ({first}, {second})")]
    DuplicatePlaceLabel {
        label: String,
        first: String,
        second: String,
    },

    #[error("duplicated {kind} name {name}")]
    DuplicateName { kind: String, name: String },

    #[error("invalid member class on {object}: {reason}")]
    InvalidMemberClass { object: String, reason: String },

    #[error("management interface class {class} cannot be used on topology interface {object}")]
    MisplacedManagementClass { class: String, object: String },

    // Capacity errors
    #[error("not enough candidates for {rule} ({required} required)")]
    NotEnoughCandidates { rule: String, required: usize },

    #[error("no enough network prefix in address pool {pool} ({required} required)")]
    PoolExhausted { pool: String, required: u128 },

    #[error("address prefix {prefix} is too small ({required} addresses required)")]
    AddressExhausted { prefix: String, required: usize },

    // Structural errors
    #[error("cyclic dependency detected: [{}]", path.join(", "))]
    Cycle { path: Vec<String> },

    #[error("dependency {dependency} not found for node {node}")]
    UnresolvedDependency { dependency: String, node: String },

    #[error("some nodes are not included in the sorted list ({sorted} of {total})")]
    IncompleteSort { sorted: usize, total: usize },

    #[error("still exists unnamed interfaces on node {node}")]
    UnnamedInterface { node: String },

    // Input errors
    #[error("invalid topology: {0}")]
    InvalidTopology(String),

    #[error("invalid address '{value}': {reason}")]
    InvalidAddress { value: String, reason: String },

    #[error("invalid parameter rule {rule}: {reason}")]
    InvalidRule { rule: String, reason: String },

    #[error("failed to read source file {}: {source}", path.display())]
    SourceFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse source file {}: {reason}", path.display())]
    SourceFormat { path: PathBuf, reason: String },

    #[error("generator {name} failed: {reason}")]
    Generator { name: String, reason: String },

    #[error("module {module} requirement not satisfied: {reason}")]
    ModuleRequirement { module: String, reason: String },
}

impl CompileError {
    /// Short category name, used in log output.
    pub fn category(&self) -> &'static str {
        match self {
            CompileError::UnknownClass { .. }
            | CompileError::UnknownRule { .. }
            | CompileError::UnknownLayer { .. }
            | CompileError::UnknownPolicy { .. }
            | CompileError::UndefinedPolicy { .. }
            | CompileError::UnknownNode { .. }
            | CompileError::UnknownPlaceLabel { .. }
            | CompileError::UnknownGenerator { .. }
            | CompileError::UnknownModule { .. } => "reference",
            CompileError::DuplicatePrimary { .. }
            | CompileError::PrimaryOnlyField { .. }
            | CompileError::InconsistentAddress { .. }
            | CompileError::InconsistentPolicy { .. }
            | CompileError::MissingPolicy { .. }
            | CompileError::DuplicatePlaceLabel { .. }
            | CompileError::DuplicateName { .. }
            | CompileError::InvalidMemberClass { .. }
            | CompileError::MisplacedManagementClass { .. } => "conflict",
            CompileError::NotEnoughCandidates { .. }
            | CompileError::PoolExhausted { .. }
            | CompileError::AddressExhausted { .. } => "capacity",
            CompileError::Cycle { .. }
            | CompileError::UnresolvedDependency { .. }
            | CompileError::IncompleteSort { .. }
            | CompileError::UnnamedInterface { .. } => "structural",
            CompileError::InvalidTopology(_)
            | CompileError::InvalidAddress { .. }
            | CompileError::InvalidRule { .. }
            | CompileError::SourceFile { .. }
            | CompileError::SourceFormat { .. }
            | CompileError::Generator { .. }
            | CompileError::ModuleRequirement { .. } => "input",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_message_lists_path() {
        let err = CompileError::Cycle {
            path: vec!["A".to_string(), "B".to_string(), "A".to_string()],
        };
        assert_eq!(err.to_string(), "cyclic dependency detected: [A, B, A]");
        assert_eq!(err.category(), "structural");
    }

    #[test]
    fn test_duplicate_primary_names_both_classes() {
        let err = CompileError::DuplicatePrimary {
            kind: "node".to_string(),
            object: "node r1".to_string(),
            first: "router".to_string(),
            second: "host".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("router"));
        assert!(msg.contains("host"));
        assert_eq!(err.category(), "conflict");
    }
}
