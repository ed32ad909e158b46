//! Scope objects.
//!
//! [`ScopeId`] is the closed set of objects owning a parameter namespace. The
//! common capabilities (namespace access, naming, child and dependency
//! enumeration) are provided by [`NetworkModel`] over this type.

use log::debug;
use serde::Serialize;
use std::collections::BTreeSet;

use super::objects::{
    ConnectionId, GroupId, InterfaceId, MemberId, NeighborId, NodeId, SegmentId,
};
use super::{NameSpace, NetworkModel};
use crate::config::ClassType;
use crate::error::CompileError;

/// Child class of interfaces: neighbors of one layer
pub const NEIGHBOR_CLASS_PREFIX: &str = "neighbor_";
/// Child class of referrers: members of one member class
pub const MEMBER_CLASS_PREFIX: &str = "member_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum ScopeId {
    Network,
    Node(NodeId),
    Interface(InterfaceId),
    Connection(ConnectionId),
    Group(GroupId),
    Segment(SegmentId),
    Neighbor(NeighborId),
    Member(MemberId),
}

impl ScopeId {
    pub fn kind(&self) -> &'static str {
        match self {
            ScopeId::Network => "network",
            ScopeId::Node(_) => "node",
            ScopeId::Interface(_) => "interface",
            ScopeId::Connection(_) => "connection",
            ScopeId::Group(_) => "group",
            ScopeId::Segment(_) => "segment",
            ScopeId::Neighbor(_) => "neighbor",
            ScopeId::Member(_) => "member",
        }
    }
}

/// Child class name of members of a class
pub fn member_class_key(kind: ClassType, class: &str) -> String {
    format!("{}{}_{}", MEMBER_CLASS_PREFIX, kind, class)
}

/// Child class name of neighbors in a layer
pub fn neighbor_class_key(layer: &str) -> String {
    format!("{}{}", NEIGHBOR_CLASS_PREFIX, layer)
}

fn parse_member_class_key(key: &str) -> Option<(ClassType, &str)> {
    let rest = key.strip_prefix(MEMBER_CLASS_PREFIX)?;
    let (kind, class) = rest.split_once('_')?;
    Some((kind.parse().ok()?, class))
}

impl NetworkModel {
    pub fn namespace(&self, scope: ScopeId) -> &NameSpace {
        match scope {
            ScopeId::Network => &self.ns,
            ScopeId::Node(id) => &self.node(id).ns,
            ScopeId::Interface(id) => &self.interface(id).ns,
            ScopeId::Connection(id) => &self.connection(id).ns,
            ScopeId::Group(id) => &self.group(id).ns,
            ScopeId::Segment(id) => &self.segment(id).ns,
            ScopeId::Neighbor(id) => &self.neighbor(id).ns,
            ScopeId::Member(id) => &self.member(id).ns,
        }
    }

    pub fn namespace_mut(&mut self, scope: ScopeId) -> &mut NameSpace {
        match scope {
            ScopeId::Network => &mut self.ns,
            ScopeId::Node(id) => &mut self.nodes[id.0].ns,
            ScopeId::Interface(id) => &mut self.interfaces[id.0].ns,
            ScopeId::Connection(id) => &mut self.connections[id.0].ns,
            ScopeId::Group(id) => &mut self.groups[id.0].ns,
            ScopeId::Segment(id) => &mut self.segments[id.0].ns,
            ScopeId::Neighbor(id) => &mut self.neighbors[id.0].ns,
            ScopeId::Member(id) => &mut self.members[id.0].ns,
        }
    }

    /// Stable key used to order requesting objects
    pub fn sort_key(&self, scope: ScopeId) -> String {
        match scope {
            ScopeId::Network => String::new(),
            ScopeId::Node(id) => self.node(id).name.clone(),
            ScopeId::Interface(id) => {
                let iface = self.interface(id);
                format!("{}.{}", self.node(iface.node).name, iface.name)
            }
            ScopeId::Connection(id) => self.connection(id).name.clone(),
            ScopeId::Group(id) => self.group(id).name.clone(),
            ScopeId::Segment(id) => self.segment(id).name.clone(),
            ScopeId::Neighbor(id) => {
                let neighbor = self.neighbor(id);
                format!(
                    "{}:{}",
                    self.sort_key(ScopeId::Interface(neighbor.self_iface)),
                    self.sort_key(ScopeId::Interface(neighbor.neighbor))
                )
            }
            ScopeId::Member(id) => {
                let member = self.member(id);
                format!(
                    "{}:{}",
                    self.sort_key(member.referrer),
                    self.sort_key(member.member)
                )
            }
        }
    }

    /// Human readable object description, e.g. `interface r1.eth0`
    pub fn describe(&self, scope: ScopeId) -> String {
        match scope {
            ScopeId::Network => "network".to_string(),
            ScopeId::Neighbor(id) => format!(
                "neighbor {} of {}",
                self.sort_key(ScopeId::Interface(self.neighbor(id).neighbor)),
                self.sort_key(ScopeId::Interface(self.neighbor(id).self_iface))
            ),
            ScopeId::Member(id) => format!(
                "member {} of {}",
                self.describe(self.member(id).member),
                self.describe(self.member(id).referrer)
            ),
            other => format!("{} {}", other.kind(), self.sort_key(other)),
        }
    }

    /// Class names (resolved labels) of a scope object
    pub fn classes(&self, scope: ScopeId) -> &[String] {
        match scope {
            ScopeId::Network => &self.network_classes,
            ScopeId::Node(id) => &self.node(id).classes,
            ScopeId::Interface(id) => &self.interface(id).classes,
            ScopeId::Connection(id) => &self.connection(id).classes,
            ScopeId::Group(id) => &self.group(id).classes,
            ScopeId::Segment(id) => &self.segment(id).classes,
            ScopeId::Neighbor(_) | ScopeId::Member(_) => &[],
        }
    }

    fn member_keys(&self, members: &[MemberId]) -> Vec<String> {
        let keys: BTreeSet<String> = members
            .iter()
            .map(|m| {
                let member = self.member(*m);
                member_class_key(member.class_type, &member.class_name)
            })
            .collect();
        keys.into_iter().collect()
    }

    /// Classes of children reachable from a scope object
    pub fn child_classes(&self, scope: ScopeId) -> Vec<String> {
        let mut classes = Vec::new();
        match scope {
            ScopeId::Network => {
                for kind in ["node", "interface", "connection", "group", "segment"] {
                    classes.push(kind.to_string());
                }
            }
            ScopeId::Node(id) => {
                classes.push("interface".to_string());
                classes.extend(self.member_keys(&self.node(id).members));
            }
            ScopeId::Interface(id) => {
                let iface = self.interface(id);
                classes.extend(iface.neighbor_layers.iter().map(|l| neighbor_class_key(l)));
                classes.extend(self.member_keys(&iface.members));
            }
            ScopeId::Connection(id) => {
                classes.push("interface".to_string());
                classes.extend(self.member_keys(&self.connection(id).members));
            }
            ScopeId::Segment(_) => {
                classes.push("interface".to_string());
                classes.push("connection".to_string());
            }
            ScopeId::Group(_) => classes.push("node".to_string()),
            ScopeId::Neighbor(_) | ScopeId::Member(_) => {}
        }
        classes
    }

    /// Children of a scope object in one child class
    pub fn childs(&self, scope: ScopeId, class: &str) -> Result<Vec<ScopeId>, CompileError> {
        if let Some((kind, name)) = parse_member_class_key(class) {
            let members = match scope {
                ScopeId::Node(id) => &self.node(id).members,
                ScopeId::Interface(id) => &self.interface(id).members,
                ScopeId::Connection(id) => &self.connection(id).members,
                _ => return Ok(Vec::new()),
            };
            let found: Vec<ScopeId> = members
                .iter()
                .filter(|m| {
                    let member = self.member(**m);
                    member.class_type == kind && member.class_name == name
                })
                .map(|m| ScopeId::Member(*m))
                .collect();
            if found.is_empty() {
                debug!("No members of class {} on {}", class, self.describe(scope));
            }
            return Ok(found);
        }
        if let Some(layer) = class.strip_prefix(NEIGHBOR_CLASS_PREFIX) {
            return match scope {
                ScopeId::Interface(id) => Ok(self
                    .interface(id)
                    .neighbors
                    .get(layer)
                    .map(|ns| ns.iter().map(|n| ScopeId::Neighbor(*n)).collect())
                    .unwrap_or_default()),
                _ => Ok(Vec::new()),
            };
        }

        let childs = match (scope, class) {
            (ScopeId::Network, "node") => self.node_ids().map(ScopeId::Node).collect(),
            (ScopeId::Network, "interface") => {
                self.interface_ids().map(ScopeId::Interface).collect()
            }
            (ScopeId::Network, "connection") => {
                self.connection_ids().map(ScopeId::Connection).collect()
            }
            (ScopeId::Network, "group") => self.group_ids().map(ScopeId::Group).collect(),
            (ScopeId::Network, "segment") => self.segment_ids().map(ScopeId::Segment).collect(),
            (ScopeId::Node(id), "interface") => self
                .node(id)
                .interfaces
                .iter()
                .map(|i| ScopeId::Interface(*i))
                .collect(),
            (ScopeId::Connection(id), "interface") => {
                let conn = self.connection(id);
                vec![ScopeId::Interface(conn.src), ScopeId::Interface(conn.dst)]
            }
            (ScopeId::Segment(id), "interface") => self
                .segment(id)
                .interfaces
                .iter()
                .map(|i| ScopeId::Interface(*i))
                .collect(),
            (ScopeId::Segment(id), "connection") => self
                .segment(id)
                .connections
                .iter()
                .map(|c| ScopeId::Connection(*c))
                .collect(),
            (ScopeId::Group(id), "node") => self
                .group(id)
                .nodes
                .iter()
                .map(|n| ScopeId::Node(*n))
                .collect(),
            _ => {
                return Err(CompileError::UnknownClass {
                    kind: "child".to_string(),
                    name: class.to_string(),
                    object: self.describe(scope),
                })
            }
        };
        Ok(childs)
    }

    /// Classes of objects whose namespaces must be complete before this one
    pub fn depend_classes(&self, scope: ScopeId) -> Vec<String> {
        match scope {
            ScopeId::Network => ["node", "group", "connection", "segment"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            ScopeId::Node(_) | ScopeId::Interface(_) | ScopeId::Group(_) => {
                self.child_classes(scope)
            }
            ScopeId::Connection(id) => {
                let mut classes = self.member_keys(&self.connection(id).members);
                classes.push("interface".to_string());
                classes
            }
            ScopeId::Segment(_) => self.child_classes(scope),
            ScopeId::Neighbor(_) | ScopeId::Member(_) => Vec::new(),
        }
    }

    /// Objects of one dependency class
    pub fn depends(&self, scope: ScopeId, class: &str) -> Result<Vec<ScopeId>, CompileError> {
        self.childs(scope, class)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member_class_key_round_trip() {
        let key = member_class_key(ClassType::Interface, "ibgp_peer");
        assert_eq!(key, "member_interface_ibgp_peer");
        assert_eq!(
            parse_member_class_key(&key),
            Some((ClassType::Interface, "ibgp_peer"))
        );
        assert_eq!(parse_member_class_key("neighbor_ip"), None);
    }

    #[test]
    fn test_network_children() {
        let model = NetworkModel::default();
        assert!(model.childs(ScopeId::Network, "node").unwrap().is_empty());
        assert!(model.childs(ScopeId::Network, "bogus").is_err());
        assert_eq!(
            model.depend_classes(ScopeId::Network),
            vec!["node", "group", "connection", "segment"]
        );
    }
}
