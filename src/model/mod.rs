//! Network model arena.
//!
//! All topology objects of one compilation live in [`NetworkModel`] and are
//! addressed by the typed handles of [`objects`]. [`ScopeId`] names any object
//! that owns a parameter namespace.

pub mod build;
pub mod namespace;
pub mod objects;
pub mod scope;

use std::collections::BTreeMap;

use crate::config::ClassType;

// Re-export commonly used types
pub use namespace::NameSpace;
pub use objects::{
    Connection, ConnectionId, Group, GroupId, Interface, InterfaceId, Member, MemberId, Neighbor,
    NeighborId, Node, NodeId, Segment, SegmentId, Value, ValueId,
};
pub use scope::ScopeId;

/// Arena of all objects of one compilation
#[derive(Debug, Clone, Default)]
pub struct NetworkModel {
    pub nodes: Vec<Node>,
    pub interfaces: Vec<Interface>,
    pub connections: Vec<Connection>,
    pub groups: Vec<Group>,
    pub segments: Vec<Segment>,
    pub neighbors: Vec<Neighbor>,
    pub members: Vec<Member>,
    pub values: Vec<Value>,
    /// Network classes applied to the network object
    pub network_classes: Vec<String>,
    /// Namespace of the network object
    pub ns: NameSpace,
    class_index: BTreeMap<(ClassType, String), Vec<ScopeId>>,
}

impl NetworkModel {
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    pub fn interface(&self, id: InterfaceId) -> &Interface {
        &self.interfaces[id.0]
    }

    pub fn interface_mut(&mut self, id: InterfaceId) -> &mut Interface {
        &mut self.interfaces[id.0]
    }

    pub fn connection(&self, id: ConnectionId) -> &Connection {
        &self.connections[id.0]
    }

    pub fn connection_mut(&mut self, id: ConnectionId) -> &mut Connection {
        &mut self.connections[id.0]
    }

    pub fn group(&self, id: GroupId) -> &Group {
        &self.groups[id.0]
    }

    pub fn group_mut(&mut self, id: GroupId) -> &mut Group {
        &mut self.groups[id.0]
    }

    pub fn segment(&self, id: SegmentId) -> &Segment {
        &self.segments[id.0]
    }

    pub fn segment_mut(&mut self, id: SegmentId) -> &mut Segment {
        &mut self.segments[id.0]
    }

    pub fn neighbor(&self, id: NeighborId) -> &Neighbor {
        &self.neighbors[id.0]
    }

    pub fn member(&self, id: MemberId) -> &Member {
        &self.members[id.0]
    }

    pub fn value(&self, id: ValueId) -> &Value {
        &self.values[id.0]
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len()).map(NodeId)
    }

    pub fn interface_ids(&self) -> impl Iterator<Item = InterfaceId> {
        (0..self.interfaces.len()).map(InterfaceId)
    }

    pub fn connection_ids(&self) -> impl Iterator<Item = ConnectionId> {
        (0..self.connections.len()).map(ConnectionId)
    }

    pub fn group_ids(&self) -> impl Iterator<Item = GroupId> {
        (0..self.groups.len()).map(GroupId)
    }

    pub fn segment_ids(&self) -> impl Iterator<Item = SegmentId> {
        (0..self.segments.len()).map(SegmentId)
    }

    pub fn add_node(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    /// Add an interface and attach it to its node
    pub fn add_interface(&mut self, iface: Interface) -> InterfaceId {
        let node = iface.node;
        self.interfaces.push(iface);
        let id = InterfaceId(self.interfaces.len() - 1);
        self.nodes[node.0].interfaces.push(id);
        id
    }

    /// Add a connection and link both endpoints to it
    pub fn add_connection(&mut self, conn: Connection) -> ConnectionId {
        let (src, dst) = (conn.src, conn.dst);
        self.connections.push(conn);
        let id = ConnectionId(self.connections.len() - 1);
        self.interfaces[src.0].connection = Some(id);
        self.interfaces[dst.0].connection = Some(id);
        id
    }

    pub fn add_group(&mut self, group: Group) -> GroupId {
        let nodes = group.nodes.clone();
        self.groups.push(group);
        let id = GroupId(self.groups.len() - 1);
        for node in nodes {
            self.nodes[node.0].groups.push(id);
        }
        id
    }

    pub fn add_segment(&mut self, segment: Segment) -> SegmentId {
        self.segments.push(segment);
        SegmentId(self.segments.len() - 1)
    }

    pub fn add_neighbor(&mut self, neighbor: Neighbor) -> NeighborId {
        let (iface, layer) = (neighbor.self_iface, neighbor.layer.clone());
        self.neighbors.push(neighbor);
        let id = NeighborId(self.neighbors.len() - 1);
        self.interfaces[iface.0]
            .neighbors
            .entry(layer)
            .or_default()
            .push(id);
        id
    }

    /// Add a member and attach it to its referrer
    pub fn add_member(&mut self, member: Member) -> MemberId {
        let referrer = member.referrer;
        self.members.push(member);
        let id = MemberId(self.members.len() - 1);
        match referrer {
            ScopeId::Node(n) => self.nodes[n.0].members.push(id),
            ScopeId::Interface(i) => self.interfaces[i.0].members.push(id),
            ScopeId::Connection(c) => self.connections[c.0].members.push(id),
            _ => {}
        }
        id
    }

    /// Add a value and attach it to its owner
    pub fn add_value(&mut self, value: Value) -> ValueId {
        let owner = value.owner;
        self.values.push(value);
        let id = ValueId(self.values.len() - 1);
        match owner {
            ScopeId::Node(n) => self.nodes[n.0].values.push(id),
            ScopeId::Interface(i) => self.interfaces[i.0].values.push(id),
            ScopeId::Connection(c) => self.connections[c.0].values.push(id),
            ScopeId::Group(g) => self.groups[g.0].values.push(id),
            ScopeId::Segment(s) => self.segments[s.0].values.push(id),
            _ => {}
        }
        id
    }

    /// Opposite interface: the other end of the interface's connection
    pub fn opposite(&self, iface: InterfaceId) -> Option<InterfaceId> {
        let conn = self.interface(iface).connection?;
        self.connection(conn).other_end(iface)
    }

    pub fn find_node(&self, name: &str) -> Option<NodeId> {
        self.nodes.iter().position(|n| n.name == name).map(NodeId)
    }

    /// Interface of a node by name
    pub fn find_interface(&self, node: NodeId, name: &str) -> Option<InterfaceId> {
        self.node(node)
            .interfaces
            .iter()
            .copied()
            .find(|i| self.interface(*i).name == name)
    }

    pub fn segments_in_layer<'a>(&'a self, layer: &'a str) -> impl Iterator<Item = SegmentId> + 'a {
        self.segment_ids()
            .filter(move |s| self.segment(*s).layer == layer)
    }

    /// Register an object as member of a class, for member class queries.
    pub fn register_class_member(&mut self, kind: ClassType, class: &str, scope: ScopeId) {
        let entry = self
            .class_index
            .entry((kind, class.to_string()))
            .or_default();
        if !entry.contains(&scope) {
            entry.push(scope);
        }
    }

    /// Objects registered under a class, in registration order
    pub fn class_members(&self, kind: ClassType, class: &str) -> &[ScopeId] {
        self.class_index
            .get(&(kind, class.to_string()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Every scope object in namespace build order: the network, each node
    /// followed by its interfaces and their neighbors, connections, segments,
    /// members and groups.
    pub fn scopes(&self) -> Vec<ScopeId> {
        let mut scopes = vec![ScopeId::Network];
        for node in self.node_ids() {
            scopes.push(ScopeId::Node(node));
            for iface in &self.node(node).interfaces {
                scopes.push(ScopeId::Interface(*iface));
                for neighbors in self.interface(*iface).neighbors.values() {
                    scopes.extend(neighbors.iter().map(|n| ScopeId::Neighbor(*n)));
                }
            }
        }
        scopes.extend(self.connection_ids().map(ScopeId::Connection));
        scopes.extend(self.segment_ids().map(ScopeId::Segment));
        scopes.extend((0..self.members.len()).map(|m| ScopeId::Member(MemberId(m))));
        scopes.extend(self.group_ids().map(ScopeId::Group));
        scopes
    }
}
