//! Generic topology graph.
//!
//! This is the labelled multigraph handed over by a diagram parser: nodes
//! with label lists, edges with edge-level and per-end label lists, and
//! optional groups. It is read from YAML or JSON by `config_loader`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A node of the input graph
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GraphNode {
    /// Reference key used by edges and groups; defaults to the name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Node name; empty names are assigned during auto-naming
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub labels: Vec<String>,
}

impl GraphNode {
    pub fn key(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.name)
    }
}

/// A link between two graph nodes
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GraphEdge {
    pub src: String,
    pub dst: String,
    /// Labels of the connection itself
    #[serde(default)]
    pub labels: Vec<String>,
    /// Labels of the interface at the source end
    #[serde(default)]
    pub src_labels: Vec<String>,
    /// Labels of the interface at the destination end
    #[serde(default)]
    pub dst_labels: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dst_name: Option<String>,
}

/// A named set of nodes (a cluster in the diagram)
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GraphGroup {
    pub name: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub nodes: Vec<String>,
}

/// Labelled multigraph
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Graph {
    #[serde(default)]
    pub nodes: Vec<GraphNode>,
    #[serde(default)]
    pub edges: Vec<GraphEdge>,
    #[serde(default)]
    pub groups: Vec<GraphGroup>,
}

impl Graph {
    /// Check that node keys are unique and that every edge and group
    /// references an existing node.
    pub fn validate(&self) -> Result<(), String> {
        let mut names = BTreeSet::new();
        for (i, node) in self.nodes.iter().enumerate() {
            if node.key().is_empty() {
                return Err(format!("node {} has neither id nor name", i));
            }
            if !names.insert(node.key()) {
                return Err(format!("duplicated node '{}' in topology", node.key()));
            }
        }
        for (i, edge) in self.edges.iter().enumerate() {
            for end in [&edge.src, &edge.dst] {
                if !names.contains(end.as_str()) {
                    return Err(format!("edge {} references unknown node '{}'", i, end));
                }
            }
        }
        for group in &self.groups {
            for member in &group.nodes {
                if !names.contains(member.as_str()) {
                    return Err(format!(
                        "group '{}' references unknown node '{}'",
                        group.name, member
                    ));
                }
            }
        }
        Ok(())
    }

    /// Index of the node with the given reference key
    pub fn node_index(&self, key: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n.key() == key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graph_from_yaml() {
        let yaml = r#"
nodes:
  - name: r1
    labels: [router]
  - name: r2
edges:
  - src: r1
    dst: r2
    src_name: eth0
groups:
  - name: as1
    nodes: [r1, r2]
"#;
        let graph: Graph = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(graph.nodes.len(), 2);
        assert_eq!(graph.edges[0].src_name.as_deref(), Some("eth0"));
        assert!(graph.edges[0].dst_name.is_none());
        assert!(graph.validate().is_ok());
        assert_eq!(graph.node_index("r2"), Some(1));
    }

    #[test]
    fn test_unnamed_node_uses_id() {
        let yaml = r#"
nodes:
  - id: a
  - id: b
edges:
  - {src: a, dst: b}
"#;
        let graph: Graph = serde_yaml::from_str(yaml).unwrap();
        assert!(graph.validate().is_ok());
        assert!(graph.nodes[0].name.is_empty());
        assert_eq!(graph.node_index("b"), Some(1));
    }

    #[test]
    fn test_validate_unknown_edge_end() {
        let graph = Graph {
            nodes: vec![GraphNode {
                name: "r1".to_string(),
                ..Default::default()
            }],
            edges: vec![GraphEdge {
                src: "r1".to_string(),
                dst: "r9".to_string(),
                ..Default::default()
            }],
            groups: vec![],
        };
        let err = graph.validate().unwrap_err();
        assert!(err.contains("r9"));
    }
}
