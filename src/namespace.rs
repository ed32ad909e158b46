//! Relative namespace construction.
//!
//! Every scope object gets a relative parameter mapping merged from its own
//! parameters and the parameters of related objects. Merging is
//! first-writer-wins: the object's own values shadow inherited ones, and
//! nearer relations shadow farther ones.
//!
//! Place labels (`@core`) publish an object's own parameters to every other
//! object under `<label>_<key>`. Meta-value labels (`@alias=core`) republish
//! a place label under a local alias. The place-label table is built once per
//! compilation and passed explicitly to the builder.

use log::{debug, info};
use std::collections::BTreeMap;

use crate::dependency::order_scopes;
use crate::error::CompileError;
use crate::model::{GroupId, InterfaceId, NetworkModel, NodeId, ScopeId};

/// Separator between a prefix (place label, alias, class name) and a key
pub const SEPARATOR: &str = "_";
pub const NODE_PREFIX: &str = "node_";
pub const GROUP_PREFIX: &str = "group_";
pub const OPPOSITE_PREFIX: &str = "opp_";
pub const NEIGHBOR_PREFIX: &str = "n_";
pub const MEMBER_PREFIX: &str = "m_";

type Params = BTreeMap<String, String>;

/// Parameters published by place labels
#[derive(Debug, Clone, Default)]
pub struct PlaceLabelTable {
    /// label -> (publishing object, its own parameters)
    labels: BTreeMap<String, (String, Params)>,
}

impl PlaceLabelTable {
    /// Collect the place labels of nodes, interfaces and groups.
    pub fn build(model: &NetworkModel) -> Result<Self, CompileError> {
        let mut table = PlaceLabelTable::default();
        for node in model.node_ids() {
            table.publish(model, ScopeId::Node(node), &model.node(node).labels.place_labels)?;
            for iface in &model.node(node).interfaces {
                let labels = &model.interface(*iface).labels.place_labels;
                table.publish(model, ScopeId::Interface(*iface), labels)?;
            }
        }
        for group in model.group_ids() {
            table.publish(model, ScopeId::Group(group), &model.group(group).labels.place_labels)?;
        }
        debug!("Place label table holds {} labels", table.labels.len());
        Ok(table)
    }

    fn publish(
        &mut self,
        model: &NetworkModel,
        owner: ScopeId,
        labels: &[String],
    ) -> Result<(), CompileError> {
        for label in labels {
            if let Some((first, _)) = self.labels.get(label) {
                return Err(CompileError::DuplicatePlaceLabel {
                    label: label.clone(),
                    first: first.clone(),
                    second: model.describe(owner),
                });
            }
            let params = model.namespace(owner).params().clone();
            self.labels.insert(label.clone(), (model.describe(owner), params));
        }
        Ok(())
    }

    pub fn get(&self, label: &str) -> Option<&Params> {
        self.labels.get(label).map(|(_, params)| params)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    fn iter(&self) -> impl Iterator<Item = (&String, &Params)> {
        self.labels.iter().map(|(label, (_, params))| (label, params))
    }
}

/// Relative mapping under construction; the first writer of a key wins
#[derive(Debug, Default)]
struct View {
    entries: Params,
}

impl View {
    fn merge(&mut self, prefix: &str, params: &Params) {
        for (key, value) in params {
            self.entries
                .entry(format!("{}{}", prefix, key))
                .or_insert_with(|| value.clone());
        }
    }

    fn place_labels(&mut self, table: &PlaceLabelTable) {
        for (label, params) in table.iter() {
            self.merge(&format!("{}{}", label, SEPARATOR), params);
        }
    }

    fn meta_values(
        &mut self,
        table: &PlaceLabelTable,
        aliases: &BTreeMap<String, String>,
    ) -> Result<(), CompileError> {
        for (alias, target) in aliases {
            let params = table.get(target).ok_or_else(|| CompileError::UnknownPlaceLabel {
                target: target.clone(),
                alias: alias.clone(),
            })?;
            self.merge(&format!("{}{}", alias, SEPARATOR), params);
        }
        Ok(())
    }
}

struct Builder<'a> {
    model: &'a NetworkModel,
    table: &'a PlaceLabelTable,
}

impl Builder<'_> {
    fn own(&self, scope: ScopeId) -> &Params {
        self.model.namespace(scope).params()
    }

    /// Group parameters as `group_<key>` and `<groupclass>_<key>`
    fn groups(&self, view: &mut View, prefix: &str, groups: &[GroupId]) {
        for group in groups {
            let params = self.own(ScopeId::Group(*group));
            view.merge(&format!("{}{}", prefix, GROUP_PREFIX), params);
            for class in &self.model.group(*group).classes {
                view.merge(&format!("{}{}{}", prefix, class, SEPARATOR), params);
            }
        }
    }

    /// Own, node and node group parameters of an interface
    fn interface_base(&self, view: &mut View, prefix: &str, iface: InterfaceId) {
        let node = self.model.interface(iface).node;
        view.merge(prefix, self.own(ScopeId::Interface(iface)));
        view.merge(&format!("{}{}", prefix, NODE_PREFIX), self.own(ScopeId::Node(node)));
        self.groups(view, prefix, &self.model.node(node).groups);
    }

    fn opposite_base(&self, view: &mut View, prefix: &str, iface: InterfaceId) {
        if let Some(opposite) = self.model.opposite(iface) {
            self.interface_base(view, &format!("{}{}", prefix, OPPOSITE_PREFIX), opposite);
        }
    }

    fn node(&self, node: NodeId) -> Result<View, CompileError> {
        let mut view = View::default();
        view.merge("", self.own(ScopeId::Node(node)));
        self.groups(&mut view, "", &self.model.node(node).groups);
        view.place_labels(self.table);
        view.meta_values(self.table, &self.model.node(node).labels.meta_value_labels)?;
        Ok(view)
    }

    fn interface(&self, iface: InterfaceId) -> Result<View, CompileError> {
        let mut view = View::default();
        self.interface_base(&mut view, "", iface);
        self.opposite_base(&mut view, "", iface);
        view.place_labels(self.table);
        view.meta_values(self.table, &self.model.interface(iface).labels.meta_value_labels)?;
        Ok(view)
    }

    fn build(&self, scope: ScopeId) -> Result<View, CompileError> {
        let model = self.model;
        let view = match scope {
            ScopeId::Node(node) => return self.node(node),
            ScopeId::Interface(iface) => return self.interface(iface),
            ScopeId::Neighbor(id) => {
                let neighbor = model.neighbor(id);
                let mut view = View::default();
                self.interface_base(&mut view, "", neighbor.self_iface);
                self.opposite_base(&mut view, "", neighbor.self_iface);
                self.interface_base(&mut view, NEIGHBOR_PREFIX, neighbor.neighbor);
                self.opposite_base(&mut view, NEIGHBOR_PREFIX, neighbor.neighbor);
                view.place_labels(self.table);
                view
            }
            ScopeId::Member(id) => {
                let member = model.member(id);
                let mut view = View::default();
                view.merge("", self.own(member.referrer));
                if let ScopeId::Interface(iface) = member.referrer {
                    let node = model.interface(iface).node;
                    view.merge(NODE_PREFIX, self.own(ScopeId::Node(node)));
                }
                view.merge(MEMBER_PREFIX, self.own(member.member));
                view.place_labels(self.table);
                view
            }
            ScopeId::Group(group) => {
                let mut view = View::default();
                view.merge("", self.own(scope));
                self.groups(&mut view, "", &[group]);
                view.place_labels(self.table);
                view
            }
            ScopeId::Network | ScopeId::Connection(_) | ScopeId::Segment(_) => {
                let mut view = View::default();
                view.merge("", self.own(scope));
                view.place_labels(self.table);
                view
            }
        };
        Ok(view)
    }
}

/// Build the relative namespace of every scope object and Value record.
///
/// Scope objects are processed in dependency order. Returns the order used,
/// which is also the order of the output document.
pub fn build_namespaces(model: &mut NetworkModel) -> Result<Vec<ScopeId>, CompileError> {
    let table = PlaceLabelTable::build(model)?;
    let order = order_scopes(model, &model.scopes())?;

    let mut views = Vec::with_capacity(order.len());
    {
        let builder = Builder {
            model: &*model,
            table: &table,
        };
        for scope in &order {
            views.push((*scope, builder.build(*scope)?));
        }
    }
    for (scope, view) in views {
        model.namespace_mut(scope).replace_relative(view.entries);
    }
    for value in &mut model.values {
        let own = value.ns.params().clone();
        value.ns.replace_relative(own);
    }

    info!(
        "Built namespaces of {} objects ({} place labels)",
        order.len(),
        table.len()
    );
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClassType;
    use crate::model::{Connection, Group, Interface, Member, Neighbor, Node};
    use crate::topology::labels::classify_labels;

    fn node(name: &str, labels: &[&str], params: &[(&str, &str)]) -> Node {
        let mut node = Node {
            name: name.to_string(),
            labels: classify_labels(labels),
            ..Default::default()
        };
        node.ns.add_param("name", name);
        for (k, v) in params {
            node.ns.add_param(*k, *v);
        }
        node
    }

    fn iface(model: &mut NetworkModel, node: NodeId, name: &str) -> InterfaceId {
        let mut iface = Interface::new(node, name.to_string(), classify_labels::<&str>(&[]));
        iface.ns.add_param("name", name);
        model.add_interface(iface)
    }

    /// r1.eth0 -- r2.eth0, both nodes in group as1 of class "as"
    fn pair() -> (NetworkModel, InterfaceId, InterfaceId) {
        let mut model = NetworkModel::default();
        model.ns.add_param("name", "lab");
        let r1 = model.add_node(node("r1", &["@core"], &[("asn", "65001")]));
        let r2 = model.add_node(node("r2", &["@peer=core"], &[("asn", "65002")]));
        let a = iface(&mut model, r1, "eth0");
        let b = iface(&mut model, r2, "eth0");
        model.interface_mut(a).ns.add_param("ip_addr", "10.0.0.1");
        model.interface_mut(b).ns.add_param("ip_addr", "10.0.0.2");
        let conn = model.add_connection(Connection::new(a, b, classify_labels::<&str>(&[])));
        model.connection_mut(conn).ns.add_param("name", "r1.eth0--r2.eth0");
        let mut group = Group {
            name: "as1".to_string(),
            classes: vec!["as".to_string()],
            nodes: vec![r1, r2],
            ..Default::default()
        };
        group.ns.add_param("name", "as1");
        group.ns.add_param("asn", "100");
        model.add_group(group);
        (model, a, b)
    }

    fn rel<'a>(model: &'a NetworkModel, scope: ScopeId, key: &str) -> Option<&'a str> {
        model.namespace(scope).relative().get(key).map(String::as_str)
    }

    #[test]
    fn test_own_value_wins_over_group() {
        let (mut model, _, _) = pair();
        build_namespaces(&mut model).unwrap();
        let r1 = ScopeId::Node(NodeId(0));
        assert_eq!(rel(&model, r1, "asn"), Some("65001"));
        assert_eq!(rel(&model, r1, "group_asn"), Some("100"));
        assert_eq!(rel(&model, r1, "as_asn"), Some("100"));
        assert_eq!(rel(&model, r1, "core_asn"), Some("65001"));
    }

    #[test]
    fn test_interface_views() {
        let (mut model, a, _) = pair();
        build_namespaces(&mut model).unwrap();
        let a = ScopeId::Interface(a);
        assert_eq!(rel(&model, a, "ip_addr"), Some("10.0.0.1"));
        assert_eq!(rel(&model, a, "node_name"), Some("r1"));
        assert_eq!(rel(&model, a, "opp_ip_addr"), Some("10.0.0.2"));
        assert_eq!(rel(&model, a, "opp_node_asn"), Some("65002"));
        assert_eq!(rel(&model, a, "opp_group_asn"), Some("100"));
        assert_eq!(rel(&model, a, "core_name"), Some("r1"));
    }

    #[test]
    fn test_meta_value_alias() {
        let (mut model, _, _) = pair();
        build_namespaces(&mut model).unwrap();
        assert_eq!(rel(&model, ScopeId::Node(NodeId(1)), "peer_asn"), Some("65001"));
    }

    #[test]
    fn test_unknown_meta_value_target() {
        let (mut model, _, _) = pair();
        model.nodes[1].labels = classify_labels(&["@peer=edge"]);
        let err = build_namespaces(&mut model).unwrap_err();
        assert_eq!(
            err.to_string(),
            "unknown place label edge (specified for meta value label peer)"
        );
    }

    #[test]
    fn test_duplicate_place_label() {
        let (mut model, _, _) = pair();
        model.nodes[1].labels = classify_labels(&["@core"]);
        let err = build_namespaces(&mut model).unwrap_err();
        assert!(matches!(err, CompileError::DuplicatePlaceLabel { .. }));
        assert!(err.to_string().contains("node r1"));
        assert!(err.to_string().contains("node r2"));
    }

    #[test]
    fn test_neighbor_and_member_views() {
        let (mut model, a, b) = pair();
        let n = model.add_neighbor(Neighbor {
            self_iface: a,
            neighbor: b,
            layer: "ip".to_string(),
            ns: Default::default(),
        });
        let m = model.add_member(Member {
            class_type: ClassType::Node,
            class_name: "router".to_string(),
            referrer: ScopeId::Interface(a),
            member: ScopeId::Node(NodeId(1)),
            ns: Default::default(),
        });
        build_namespaces(&mut model).unwrap();

        let n = ScopeId::Neighbor(n);
        assert_eq!(rel(&model, n, "ip_addr"), Some("10.0.0.1"));
        assert_eq!(rel(&model, n, "n_ip_addr"), Some("10.0.0.2"));
        assert_eq!(rel(&model, n, "n_node_name"), Some("r2"));
        assert_eq!(rel(&model, n, "n_opp_ip_addr"), Some("10.0.0.1"));

        let m = ScopeId::Member(m);
        assert_eq!(rel(&model, m, "name"), Some("eth0"));
        assert_eq!(rel(&model, m, "node_name"), Some("r1"));
        assert_eq!(rel(&model, m, "m_name"), Some("r2"));
    }

    #[test]
    fn test_connection_and_network_views() {
        let (mut model, _, _) = pair();
        let order = build_namespaces(&mut model).unwrap();
        assert_eq!(rel(&model, ScopeId::Network, "name"), Some("lab"));
        assert_eq!(rel(&model, ScopeId::Network, "core_asn"), Some("65001"));
        let conn = ScopeId::Connection(crate::model::ConnectionId(0));
        assert_eq!(rel(&model, conn, "name"), Some("r1.eth0--r2.eth0"));

        let pos = |s: ScopeId| order.iter().position(|o| *o == s).unwrap();
        assert!(pos(ScopeId::Interface(InterfaceId(0))) < pos(conn));
        assert!(pos(ScopeId::Node(NodeId(0))) < pos(ScopeId::Network));
    }
}
