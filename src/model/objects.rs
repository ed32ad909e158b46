//! Topology objects stored in the model arena.
//!
//! Objects reference each other only through typed integer handles, so the
//! interface/connection back-references need no shared ownership.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use super::namespace::NameSpace;
use super::scope::ScopeId;
use crate::config::{ClassType, MemberClass, PlatformAttributes};
use crate::topology::labels::ParsedLabels;
use crate::utils::ip_utils::IpPrefix;

macro_rules! define_handle {
    ($($(#[$meta:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
            pub struct $name(pub usize);

            impl $name {
                pub fn index(self) -> usize {
                    self.0
                }
            }
        )*
    };
}

define_handle!(
    /// Handle of a [`Node`]
    NodeId,
    /// Handle of an [`Interface`]
    InterfaceId,
    /// Handle of a [`Connection`]
    ConnectionId,
    /// Handle of a [`Group`]
    GroupId,
    /// Handle of a [`Segment`]
    SegmentId,
    /// Handle of a [`Neighbor`]
    NeighborId,
    /// Handle of a [`Member`]
    MemberId,
    /// Handle of a [`Value`]
    ValueId,
);

/// Default naming prefix of nodes
pub const DEFAULT_NODE_PREFIX: &str = "node";
/// Default naming prefix of interfaces
pub const DEFAULT_INTERFACE_PREFIX: &str = "net";

#[derive(Debug, Clone, Default)]
pub struct Node {
    pub name: String,
    pub labels: ParsedLabels,
    pub classes: Vec<String>,
    pub interfaces: Vec<InterfaceId>,
    pub groups: Vec<GroupId>,
    pub is_virtual: bool,
    pub name_prefix: String,
    pub primary_class: Option<String>,
    pub mgmt_class: Option<String>,
    pub mgmt_interface: Option<InterfaceId>,
    pub tinet: PlatformAttributes,
    pub clab: PlatformAttributes,
    /// layer -> IP policy name
    pub policies: BTreeMap<String, String>,
    pub member_classes: Vec<(String, MemberClass)>,
    pub members: Vec<MemberId>,
    pub values: Vec<ValueId>,
    pub ns: NameSpace,
}

#[derive(Debug, Clone)]
pub struct Interface {
    /// Empty until named
    pub name: String,
    pub node: NodeId,
    pub connection: Option<ConnectionId>,
    pub labels: ParsedLabels,
    pub classes: Vec<String>,
    pub is_virtual: bool,
    pub name_prefix: String,
    pub primary_class: Option<String>,
    pub tinet: PlatformAttributes,
    pub clab: PlatformAttributes,
    /// layer -> IP policy name
    pub policies: BTreeMap<String, String>,
    /// Layers whose neighbors are materialized for this interface
    pub neighbor_layers: BTreeSet<String>,
    /// layer -> neighbors
    pub neighbors: BTreeMap<String, Vec<NeighborId>>,
    pub member_classes: Vec<(String, MemberClass)>,
    pub members: Vec<MemberId>,
    pub values: Vec<ValueId>,
    /// Management interface created from the node's primary class
    pub is_mgmt: bool,
    pub ns: NameSpace,
}

impl Interface {
    pub fn new(node: NodeId, name: String, labels: ParsedLabels) -> Self {
        Interface {
            name,
            node,
            connection: None,
            labels,
            classes: Vec::new(),
            is_virtual: false,
            name_prefix: String::new(),
            primary_class: None,
            tinet: PlatformAttributes::new(),
            clab: PlatformAttributes::new(),
            policies: BTreeMap::new(),
            neighbor_layers: BTreeSet::new(),
            neighbors: BTreeMap::new(),
            member_classes: Vec::new(),
            members: Vec::new(),
            values: Vec::new(),
            is_mgmt: false,
            ns: NameSpace::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Connection {
    pub name: String,
    pub src: InterfaceId,
    pub dst: InterfaceId,
    pub labels: ParsedLabels,
    pub classes: Vec<String>,
    pub layers: BTreeSet<String>,
    pub is_virtual: bool,
    pub primary_class: Option<String>,
    /// Naming prefix for both endpoint interfaces
    pub name_prefix: Option<String>,
    pub member_classes: Vec<(String, MemberClass)>,
    pub members: Vec<MemberId>,
    pub values: Vec<ValueId>,
    pub ns: NameSpace,
}

impl Connection {
    pub fn new(src: InterfaceId, dst: InterfaceId, labels: ParsedLabels) -> Self {
        Connection {
            name: String::new(),
            src,
            dst,
            labels,
            classes: Vec::new(),
            layers: BTreeSet::new(),
            is_virtual: false,
            primary_class: None,
            name_prefix: None,
            member_classes: Vec::new(),
            members: Vec::new(),
            values: Vec::new(),
            ns: NameSpace::default(),
        }
    }

    /// The endpoint on the other side of `iface`
    pub fn other_end(&self, iface: InterfaceId) -> Option<InterfaceId> {
        if self.src == iface {
            Some(self.dst)
        } else if self.dst == iface {
            Some(self.src)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Group {
    pub name: String,
    pub labels: ParsedLabels,
    pub classes: Vec<String>,
    pub nodes: Vec<NodeId>,
    pub is_virtual: bool,
    pub values: Vec<ValueId>,
    pub ns: NameSpace,
}

/// A broadcast domain of one layer
#[derive(Debug, Clone, Default)]
pub struct Segment {
    pub name: String,
    pub layer: String,
    /// Interfaces aware of the layer, in discovery order
    pub interfaces: Vec<InterfaceId>,
    pub connections: Vec<ConnectionId>,
    /// Fixed prefix given explicitly or implied by reserved addresses
    pub bound: Option<IpPrefix>,
    pub classes: Vec<String>,
    pub values: Vec<ValueId>,
    pub ns: NameSpace,
}

/// A directed (self, neighbor) interface pair within one segment
#[derive(Debug, Clone)]
pub struct Neighbor {
    pub self_iface: InterfaceId,
    pub neighbor: InterfaceId,
    pub layer: String,
    pub ns: NameSpace,
}

/// Relationship from a referrer to an object matching a member class
#[derive(Debug, Clone)]
pub struct Member {
    pub class_type: ClassType,
    pub class_name: String,
    pub referrer: ScopeId,
    pub member: ScopeId,
    pub ns: NameSpace,
}

/// A structured record produced by an attach rule
#[derive(Debug, Clone)]
pub struct Value {
    pub rule: String,
    pub owner: ScopeId,
    pub index: usize,
    pub ns: NameSpace,
}
