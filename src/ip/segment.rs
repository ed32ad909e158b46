//! Network segment discovery.
//!
//! A segment is a broadcast domain of one layer: the connections reachable
//! from each other through interfaces that are not aware of the layer
//! (bridge ports), and the aware interfaces terminating them.

use log::{debug, info};
use std::collections::BTreeSet;

use crate::config::{ClassType, Config, Layer};
use crate::error::CompileError;
use crate::model::{
    ConnectionId, InterfaceId, Neighbor, NetworkModel, ScopeId, Segment, SegmentId,
};

/// An interface is aware of a layer when it has a policy of the layer or an
/// explicit address in it.
pub fn is_aware(model: &NetworkModel, iface: InterfaceId, layer: &Layer) -> bool {
    let iface = model.interface(iface);
    iface.policies.contains_key(&layer.name) || iface.ns.has_param(&layer.addr_key())
}

fn in_layer(model: &NetworkModel, conn: ConnectionId, layer: &str) -> bool {
    model.connection(conn).layers.contains(layer)
}

/// Discover the segments of one layer, in connection order.
pub fn search_layer_segments(model: &NetworkModel, layer: &Layer) -> Vec<Segment> {
    let mut checked: BTreeSet<ConnectionId> = BTreeSet::new();
    let mut segments = Vec::new();

    for conn in model.connection_ids() {
        if !in_layer(model, conn, &layer.name) || checked.contains(&conn) {
            continue;
        }
        let mut segment = Segment {
            name: format!("{}_seg{}", layer.name, segments.len()),
            layer: layer.name.clone(),
            ..Default::default()
        };
        checked.insert(conn);
        segment.connections.push(conn);

        let mut stack = vec![model.connection(conn).dst, model.connection(conn).src];
        while let Some(iface) = stack.pop() {
            if is_aware(model, iface, layer) {
                if !segment.interfaces.contains(&iface) {
                    segment.interfaces.push(iface);
                }
                continue;
            }
            // Transparent interface: every other transparent port of the node
            // bridges. An aware port ends the walk; its own link belongs to
            // the segment found from that link.
            let node = model.interface(iface).node;
            for other in &model.node(node).interfaces {
                if *other == iface || is_aware(model, *other, layer) {
                    continue;
                }
                let Some(other_conn) = model.interface(*other).connection else {
                    continue;
                };
                if !in_layer(model, other_conn, &layer.name) || checked.contains(&other_conn) {
                    continue;
                }
                checked.insert(other_conn);
                segment.connections.push(other_conn);
                if let Some(opposite) = model.opposite(*other) {
                    stack.push(opposite);
                }
            }
        }
        debug!(
            "Found segment {} with {} interfaces and {} connections",
            segment.name,
            segment.interfaces.len(),
            segment.connections.len()
        );
        segments.push(segment);
    }
    segments
}

/// Discover segments of every layer and add them to the model together with
/// their neighbors and segment classes.
pub fn search_segments(model: &mut NetworkModel, config: &Config) -> Result<(), CompileError> {
    for layer in &config.layers {
        let segments = search_layer_segments(model, layer);
        info!("Layer {}: {} segments", layer.name, segments.len());
        for segment in segments {
            let id = model.add_segment(segment);
            set_neighbors(model, id, &layer.name);
            apply_segment_classes(model, config, id)?;
        }
    }
    Ok(())
}

/// Materialize neighbors for interfaces interested in the segment's layer.
fn set_neighbors(model: &mut NetworkModel, segment: SegmentId, layer: &str) {
    let interfaces = model.segment(segment).interfaces.clone();
    for iface in &interfaces {
        if !model.interface(*iface).neighbor_layers.contains(layer) {
            continue;
        }
        for other in &interfaces {
            if other == iface {
                continue;
            }
            model.add_neighbor(Neighbor {
                self_iface: *iface,
                neighbor: *other,
                layer: layer.to_string(),
                ns: Default::default(),
            });
        }
    }
}

/// Attach segment classes named by `segment#<class>` labels on the segment's
/// connections and interfaces.
fn apply_segment_classes(
    model: &mut NetworkModel,
    config: &Config,
    segment: SegmentId,
) -> Result<(), CompileError> {
    let seg = model.segment(segment);
    let mut requested: Vec<(String, String)> = Vec::new();
    for conn in &seg.connections {
        let conn = model.connection(*conn);
        for name in conn.labels.relational_for(ClassType::Segment.as_str()) {
            requested.push((name.to_string(), conn.name.clone()));
        }
    }
    for iface in &seg.interfaces {
        for name in model
            .interface(*iface)
            .labels
            .relational_for(ClassType::Segment.as_str())
        {
            requested.push((name.to_string(), model.describe(ScopeId::Interface(*iface))));
        }
    }

    for (name, origin) in requested {
        let class = config
            .segment_class(&name)
            .ok_or_else(|| CompileError::UnknownClass {
                kind: ClassType::Segment.to_string(),
                name: name.clone(),
                object: origin,
            })?;
        if class.layer != model.segment(segment).layer {
            continue;
        }
        if model.segment(segment).classes.contains(&class.name) {
            continue;
        }
        let seg = model.segment_mut(segment);
        seg.classes.push(class.name.clone());
        for flag in &class.params {
            seg.ns.add_flag(flag.clone());
        }
        model.register_class_member(ClassType::Segment, &class.name, ScopeId::Segment(segment));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Connection, Interface, Node, NodeId};
    use crate::topology::labels::ParsedLabels;

    fn layer() -> Layer {
        Layer {
            name: "ip".to_string(),
            default_connect: true,
            policies: vec![],
        }
    }

    fn add_iface(model: &mut NetworkModel, node: NodeId, name: &str, aware: bool) -> InterfaceId {
        let mut iface = Interface::new(node, name.to_string(), ParsedLabels::default());
        if aware {
            iface.policies.insert("ip".to_string(), "p2p".to_string());
        }
        model.add_interface(iface)
    }

    fn link(model: &mut NetworkModel, a: InterfaceId, b: InterfaceId) -> ConnectionId {
        let mut conn = Connection::new(a, b, ParsedLabels::default());
        conn.layers.insert("ip".to_string());
        model.add_connection(conn)
    }

    /// r1 -- sw -- r2, sw is a bridge; r3 -- r4 separately
    fn bridged_model() -> NetworkModel {
        let mut model = NetworkModel::default();
        let names = ["r1", "sw", "r2", "r3", "r4"];
        let nodes: Vec<NodeId> = names
            .iter()
            .map(|n| {
                model.add_node(Node {
                    name: n.to_string(),
                    ..Default::default()
                })
            })
            .collect();
        let r1 = add_iface(&mut model, nodes[0], "eth0", true);
        let sw1 = add_iface(&mut model, nodes[1], "p1", false);
        let sw2 = add_iface(&mut model, nodes[1], "p2", false);
        let r2 = add_iface(&mut model, nodes[2], "eth0", true);
        link(&mut model, r1, sw1);
        link(&mut model, sw2, r2);
        let r3 = add_iface(&mut model, nodes[3], "eth0", true);
        let r4 = add_iface(&mut model, nodes[4], "eth0", true);
        link(&mut model, r3, r4);
        model
    }

    #[test]
    fn test_bridge_merges_segment() {
        let model = bridged_model();
        let segments = search_layer_segments(&model, &layer());
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].name, "ip_seg0");
        assert_eq!(segments[0].connections.len(), 2);
        let names: Vec<String> = segments[0]
            .interfaces
            .iter()
            .map(|i| model.sort_key(ScopeId::Interface(*i)))
            .collect();
        assert_eq!(names, vec!["r1.eth0", "r2.eth0"]);
        assert_eq!(segments[1].interfaces.len(), 2);
    }

    fn iface_names(model: &NetworkModel, segment: &Segment) -> Vec<String> {
        segment
            .interfaces
            .iter()
            .map(|i| model.sort_key(ScopeId::Interface(*i)))
            .collect()
    }

    #[test]
    fn test_aware_bridge_port_stops_walk() {
        // r1.eth0 -- sw.p1, sw.p2 (aware) -- sw2.q1, sw2.q2 -- r3.eth0
        let mut model = NetworkModel::default();
        let nodes: Vec<NodeId> = ["r1", "sw", "sw2", "r3"]
            .iter()
            .map(|n| {
                model.add_node(Node {
                    name: n.to_string(),
                    ..Default::default()
                })
            })
            .collect();
        let r1 = add_iface(&mut model, nodes[0], "eth0", true);
        let p1 = add_iface(&mut model, nodes[1], "p1", false);
        let p2 = add_iface(&mut model, nodes[1], "p2", true);
        let q1 = add_iface(&mut model, nodes[2], "q1", false);
        let q2 = add_iface(&mut model, nodes[2], "q2", false);
        let r3 = add_iface(&mut model, nodes[3], "eth0", true);
        link(&mut model, r1, p1);
        link(&mut model, p2, q1);
        link(&mut model, q2, r3);

        let segments = search_layer_segments(&model, &layer());
        assert_eq!(segments.len(), 2);
        assert_eq!(iface_names(&model, &segments[0]), vec!["r1.eth0"]);
        assert_eq!(segments[0].connections, vec![ConnectionId(0)]);
        assert_eq!(iface_names(&model, &segments[1]), vec!["sw.p2", "r3.eth0"]);
        assert_eq!(segments[1].connections, vec![ConnectionId(1), ConnectionId(2)]);
    }

    #[test]
    fn test_connection_outside_layer_ignored() {
        let mut model = bridged_model();
        model.connections[2].layers.clear();
        let segments = search_layer_segments(&model, &layer());
        assert_eq!(segments.len(), 1);
    }

    #[test]
    fn test_neighbors_only_for_interested_interfaces() {
        let mut model = bridged_model();
        model.interfaces[0].neighbor_layers.insert("ip".to_string());
        let config = Config {
            layers: vec![layer()],
            ..Default::default()
        };
        search_segments(&mut model, &config).unwrap();
        assert_eq!(model.segments.len(), 2);
        assert_eq!(model.neighbors.len(), 1);
        assert_eq!(model.neighbors[0].self_iface, InterfaceId(0));
        assert_eq!(model.neighbors[0].neighbor, InterfaceId(3));
    }
}
