//! Topology ingestion.
//!
//! Creates nodes, interfaces, connections and groups from the input graph.
//! Value labels become the objects' given parameters.

use log::info;

use super::objects::{Connection, Group, Interface, Node};
use super::{NetworkModel, NodeId};
use crate::config::Config;
use crate::error::CompileError;
use crate::topology::graph::Graph;
use crate::topology::labels::classify_labels;

impl NetworkModel {
    /// Build the object skeleton of a graph.
    ///
    /// Nodes, interfaces and connections are created in graph order; every
    /// edge produces a source interface, a destination interface and the
    /// connection between them.
    pub fn from_graph(graph: &Graph, config: &Config) -> Result<Self, CompileError> {
        graph.validate().map_err(CompileError::InvalidTopology)?;

        let mut model = NetworkModel::default();
        model.ns.add_param("name", config.name.clone());
        model.network_classes = config
            .network_classes
            .iter()
            .map(|c| c.name.clone())
            .collect();

        for gnode in &graph.nodes {
            let labels = classify_labels(&gnode.labels);
            let mut node = Node {
                name: gnode.name.clone(),
                ..Default::default()
            };
            for (key, value) in &labels.value_labels {
                node.ns.add_param(key.clone(), value.clone());
            }
            node.labels = labels;
            model.add_node(node);
        }

        for edge in &graph.edges {
            let src_node = lookup(graph, &edge.src, "edge source")?;
            let dst_node = lookup(graph, &edge.dst, "edge destination")?;

            let src = model.add_interface(new_interface(
                src_node,
                edge.src_name.clone(),
                &edge.src_labels,
            ));
            let dst = model.add_interface(new_interface(
                dst_node,
                edge.dst_name.clone(),
                &edge.dst_labels,
            ));

            let labels = classify_labels(&edge.labels);
            let mut conn = Connection::new(src, dst, labels);
            for (key, value) in &conn.labels.value_labels {
                conn.ns.add_param(key.clone(), value.clone());
            }
            model.add_connection(conn);
        }

        for ggroup in &graph.groups {
            let labels = classify_labels(&ggroup.labels);
            let nodes = ggroup
                .nodes
                .iter()
                .map(|key| lookup(graph, key, &format!("group {}", ggroup.name)))
                .collect::<Result<Vec<_>, _>>()?;
            let mut group = Group {
                name: ggroup.name.clone(),
                nodes,
                ..Default::default()
            };
            for (key, value) in &labels.value_labels {
                group.ns.add_param(key.clone(), value.clone());
            }
            group.labels = labels;
            model.add_group(group);
        }

        info!(
            "Ingested topology: {} nodes, {} connections, {} groups",
            model.nodes.len(),
            model.connections.len(),
            model.groups.len()
        );
        Ok(model)
    }
}

fn lookup(graph: &Graph, key: &str, context: &str) -> Result<NodeId, CompileError> {
    graph
        .node_index(key)
        .map(NodeId)
        .ok_or_else(|| CompileError::UnknownNode {
            name: key.to_string(),
            context: context.to_string(),
        })
}

fn new_interface(node: NodeId, name: Option<String>, raw_labels: &[String]) -> Interface {
    let labels = classify_labels(raw_labels);
    let mut iface = Interface::new(node, name.unwrap_or_default(), labels);
    let given: Vec<(String, String)> = iface
        .labels
        .value_labels
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    for (key, value) in given {
        iface.ns.add_param(key, value);
    }
    iface
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::graph::{GraphEdge, GraphGroup, GraphNode};

    fn two_node_graph() -> Graph {
        Graph {
            nodes: vec![
                GraphNode {
                    name: "r1".to_string(),
                    labels: vec!["router;asn=65001".to_string()],
                    ..Default::default()
                },
                GraphNode {
                    name: "r2".to_string(),
                    labels: vec!["router".to_string()],
                    ..Default::default()
                },
            ],
            edges: vec![GraphEdge {
                src: "r1".to_string(),
                dst: "r2".to_string(),
                src_labels: vec!["ip_addr=10.0.0.1".to_string()],
                src_name: Some("eth0".to_string()),
                ..Default::default()
            }],
            groups: vec![GraphGroup {
                name: "as1".to_string(),
                labels: vec![],
                nodes: vec!["r1".to_string(), "r2".to_string()],
            }],
        }
    }

    #[test]
    fn test_skeleton_from_graph() {
        let config = Config {
            name: "lab".to_string(),
            ..Default::default()
        };
        let model = NetworkModel::from_graph(&two_node_graph(), &config).unwrap();
        assert_eq!(model.nodes.len(), 2);
        assert_eq!(model.interfaces.len(), 2);
        assert_eq!(model.connections.len(), 1);
        assert_eq!(model.ns.param("name"), Some("lab"));

        let r1 = model.find_node("r1").unwrap();
        assert_eq!(model.node(r1).ns.param("asn"), Some("65001"));
        assert_eq!(model.node(r1).groups.len(), 1);

        let eth0 = model.find_interface(r1, "eth0").unwrap();
        assert_eq!(model.interface(eth0).ns.param("ip_addr"), Some("10.0.0.1"));
        let opp = model.opposite(eth0).unwrap();
        assert_eq!(model.opposite(opp), Some(eth0));
        assert!(model.interface(opp).name.is_empty());
    }
}
