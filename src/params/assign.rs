//! Rule based parameter assignment.
//!
//! Objects request a parameter rule through the flags set by their classes.
//! Plain rules distribute one candidate value per requesting object (or per
//! segment or connection for interfaces); attach rules attach Value records.

use log::{debug, info};
use std::collections::{BTreeMap, BTreeSet};

use super::candidates::parameter_candidates;
use super::generator::{GeneratorContext, GeneratorRegistry};
use super::source::{apply_param_format, generate_source_rows, Row};
use crate::config::{AssignMode, Config, ParameterRule};
use crate::error::CompileError;
use crate::model::{InterfaceId, NameSpace, NetworkModel, ScopeId, Value};

/// Reserved parameter holding an object's name
pub const NAME_PARAM: &str = "name";
/// Prefix of node parameters copied to interfaces
pub const NODE_PREFIX: &str = "node_";
/// Prefix of connection parameters copied to interfaces
pub const CONNECTION_PREFIX: &str = "conn_";

/// Requesting objects per rule name, in the given object order
fn collect_flagged(model: &NetworkModel, scopes: &[ScopeId]) -> BTreeMap<String, Vec<ScopeId>> {
    let mut flagged: BTreeMap<String, Vec<ScopeId>> = BTreeMap::new();
    for scope in scopes {
        for flag in model.namespace(*scope).flags() {
            flagged.entry(flag.clone()).or_default().push(*scope);
        }
    }
    flagged
}

fn lookup_rule<'a>(
    config: &'a Config,
    model: &NetworkModel,
    name: &str,
    requester: ScopeId,
) -> Result<&'a ParameterRule, CompileError> {
    config
        .param_rule(name)
        .ok_or_else(|| CompileError::UnknownRule {
            name: name.to_string(),
            object: model.describe(requester),
        })
}

/// Assign one candidate per requesting object, objects ordered by sort key.
fn distribute(
    model: &mut NetworkModel,
    config: &Config,
    scopes: &[ScopeId],
) -> Result<(), CompileError> {
    for (name, mut objects) in collect_flagged(model, scopes) {
        let rule = lookup_rule(config, model, &name, objects[0])?;
        if rule.is_attach_mode() {
            continue;
        }
        objects.sort_by_cached_key(|o| model.sort_key(*o));
        let values = parameter_candidates(config, rule, objects.len())?;
        for (object, value) in objects.iter().zip(values) {
            model.namespace_mut(*object).add_param(name.clone(), value);
        }
        debug!("Assigned {} to {} objects", name, objects.len());
    }
    Ok(())
}

/// Groups of requesting interfaces sharing one value, in assignment order
fn interface_targets(
    model: &NetworkModel,
    config: &Config,
    rule: &ParameterRule,
    ifaces: &[InterfaceId],
) -> Result<Vec<Vec<InterfaceId>>, CompileError> {
    let requesting: BTreeSet<InterfaceId> = ifaces.iter().copied().collect();
    let endpoints = |conn| {
        let c = model.connection(conn);
        [c.src, c.dst]
            .into_iter()
            .filter(|i| requesting.contains(i))
            .collect::<Vec<_>>()
    };

    let targets = match rule.assign {
        AssignMode::Object => {
            let mut sorted = ifaces.to_vec();
            sorted.sort_by_cached_key(|i| model.sort_key(ScopeId::Interface(*i)));
            sorted.into_iter().map(|i| vec![i]).collect()
        }
        AssignMode::Segment => {
            let layer = rule.layer.as_deref().ok_or_else(|| CompileError::UnknownLayer {
                layer: String::new(),
                context: format!("parameter rule {} requires a layer", rule.name),
            })?;
            if config.layer(layer).is_none() {
                return Err(CompileError::UnknownLayer {
                    layer: layer.to_string(),
                    context: format!("parameter rule {}", rule.name),
                });
            }
            model
                .segments_in_layer(layer)
                .map(|seg| {
                    model
                        .segment(seg)
                        .connections
                        .iter()
                        .flat_map(|c| endpoints(*c))
                        .collect::<Vec<_>>()
                })
                .filter(|members| !members.is_empty())
                .collect()
        }
        AssignMode::Connection => model
            .connection_ids()
            .map(endpoints)
            .filter(|members| !members.is_empty())
            .collect(),
    };
    Ok(targets)
}

fn assign_interface_parameters(
    model: &mut NetworkModel,
    config: &Config,
) -> Result<(), CompileError> {
    let mut scopes = Vec::new();
    for node in model.node_ids().collect::<Vec<_>>() {
        let node_params = model.node(node).ns.params().clone();
        for iface in model.node(node).interfaces.clone() {
            let conn_params = model
                .interface(iface)
                .connection
                .map(|c| model.connection(c).ns.params().clone())
                .unwrap_or_default();
            let name = model.interface(iface).name.clone();
            let ns = &mut model.interface_mut(iface).ns;
            ns.add_param(NAME_PARAM, name);
            for (key, value) in &node_params {
                ns.add_param(format!("{}{}", NODE_PREFIX, key), value.clone());
            }
            for (key, value) in &conn_params {
                ns.add_param(format!("{}{}", CONNECTION_PREFIX, key), value.clone());
            }
            scopes.push(ScopeId::Interface(iface));
        }
    }

    for (name, objects) in collect_flagged(model, &scopes) {
        let rule = lookup_rule(config, model, &name, objects[0])?;
        if rule.is_attach_mode() {
            continue;
        }
        let ifaces: Vec<InterfaceId> = objects
            .iter()
            .filter_map(|o| match o {
                ScopeId::Interface(i) => Some(*i),
                _ => None,
            })
            .collect();
        let targets = interface_targets(model, config, rule, &ifaces)?;
        let values = parameter_candidates(config, rule, targets.len())?;
        for (group, value) in targets.iter().zip(values) {
            for iface in group {
                model.interface_mut(*iface).ns.add_param(name.clone(), value.clone());
            }
        }
        debug!("Assigned {} to {} interface groups", name, targets.len());
    }
    Ok(())
}

/// Owners scanned by attach rules, in attach order
fn attach_owners(model: &NetworkModel) -> Vec<ScopeId> {
    let mut owners: Vec<ScopeId> = model.node_ids().map(ScopeId::Node).collect();
    for node in model.node_ids() {
        owners.extend(model.node(node).interfaces.iter().map(|i| ScopeId::Interface(*i)));
    }
    owners.extend(model.connection_ids().map(ScopeId::Connection));
    owners.extend(model.group_ids().map(ScopeId::Group));
    owners.extend(model.segment_ids().map(ScopeId::Segment));
    owners
}

fn attach_values(model: &mut NetworkModel, rule: &str, owner: ScopeId, rows: Vec<Row>) {
    for (index, row) in rows.into_iter().enumerate() {
        let mut ns = NameSpace::default();
        for (key, value) in row {
            ns.add_param(key, value);
        }
        model.add_value(Value {
            rule: rule.to_string(),
            owner,
            index,
            ns,
        });
    }
}

/// Attach Value records of source and generator rules to flagged owners.
pub fn assign_attach_rules(
    model: &mut NetworkModel,
    config: &Config,
    generators: &GeneratorRegistry,
) -> Result<(), CompileError> {
    let source_rows = generate_source_rows(config)?;
    let owners = attach_owners(model);

    for rule in config.param_rules.iter().filter(|r| r.is_attach_mode()) {
        let flagged: Vec<ScopeId> = owners
            .iter()
            .copied()
            .filter(|o| model.namespace(*o).has_flag(&rule.name))
            .collect();
        if flagged.is_empty() {
            continue;
        }

        let mut pending = Vec::with_capacity(flagged.len());
        match rule.generator.as_deref().filter(|g| !g.is_empty()) {
            Some(generator) => {
                let ctx = GeneratorContext { config, model };
                for owner in &flagged {
                    let mut rows = generators.generate(generator, &ctx, *owner)?;
                    apply_param_format(&mut rows, &rule.param_format);
                    pending.push((*owner, rows));
                }
            }
            None => {
                let rows = source_rows.get(&rule.name).cloned().unwrap_or_default();
                pending.extend(flagged.iter().map(|o| (*o, rows.clone())));
            }
        }

        for (owner, rows) in pending {
            attach_values(model, &rule.name, owner, rows);
        }
        debug!("Attached values of {} to {} owners", rule.name, flagged.len());
    }
    Ok(())
}

/// Assign name parameters and every parameter rule.
///
/// Object kinds are processed in the order network, nodes, connections,
/// groups, segments and interfaces; interfaces copy the final parameters of
/// their node and connection.
pub fn assign_parameters(
    model: &mut NetworkModel,
    config: &Config,
    generators: &GeneratorRegistry,
) -> Result<(), CompileError> {
    model.ns.add_param(NAME_PARAM, config.name.clone());

    for node in &mut model.nodes {
        node.ns.add_param(NAME_PARAM, node.name.clone());
    }
    let nodes: Vec<ScopeId> = model.node_ids().map(ScopeId::Node).collect();
    distribute(model, config, &nodes)?;

    for conn in &mut model.connections {
        conn.ns.add_param(NAME_PARAM, conn.name.clone());
    }
    let connections: Vec<ScopeId> = model.connection_ids().map(ScopeId::Connection).collect();
    distribute(model, config, &connections)?;

    for group in &mut model.groups {
        group.ns.add_param(NAME_PARAM, group.name.clone());
    }
    let groups: Vec<ScopeId> = model.group_ids().map(ScopeId::Group).collect();
    distribute(model, config, &groups)?;

    for segment in &mut model.segments {
        segment.ns.add_param(NAME_PARAM, segment.name.clone());
    }
    let segments: Vec<ScopeId> = model.segment_ids().map(ScopeId::Segment).collect();
    distribute(model, config, &segments)?;

    assign_interface_parameters(model, config)?;
    assign_attach_rules(model, config, generators)?;

    info!(
        "Assigned parameters: {} rules, {} values attached",
        config.param_rules.len(),
        model.values.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Connection, Interface, Node, Segment};
    use crate::topology::labels::ParsedLabels;

    /// r1.eth0 -- r2.eth0 and r2.eth1 -- r3.eth0
    fn chain() -> NetworkModel {
        let mut model = NetworkModel::default();
        let nodes: Vec<_> = ["r1", "r2", "r3"]
            .iter()
            .map(|n| {
                model.add_node(Node {
                    name: n.to_string(),
                    ..Default::default()
                })
            })
            .collect();
        let iface = |model: &mut NetworkModel, node, name: &str| {
            model.add_interface(Interface::new(node, name.to_string(), ParsedLabels::default()))
        };
        let a = iface(&mut model, nodes[0], "eth0");
        let b = iface(&mut model, nodes[1], "eth0");
        let c = iface(&mut model, nodes[1], "eth1");
        let d = iface(&mut model, nodes[2], "eth0");
        let c1 = model.add_connection(Connection::new(a, b, ParsedLabels::default()));
        let c2 = model.add_connection(Connection::new(c, d, ParsedLabels::default()));
        model.connection_mut(c1).name = "r1.eth0--r2.eth0".to_string();
        model.connection_mut(c2).name = "r2.eth1--r3.eth0".to_string();
        for i in model.interface_ids().collect::<Vec<_>>() {
            model.interface_mut(i).ns.add_flag("vid");
        }
        model
    }

    fn config(assign: &str) -> Config {
        let yaml = format!(
            "layer:\n  - name: ip\nparam_rule:\n  - name: vid\n    min: 100\n    max: 200\n    assign: {}\n    layer: ip\n",
            assign
        );
        serde_yaml::from_str(&yaml).unwrap()
    }

    fn vids(model: &NetworkModel) -> Vec<&str> {
        model
            .interfaces
            .iter()
            .map(|i| i.ns.param("vid").unwrap_or(""))
            .collect()
    }

    #[test]
    fn test_object_mode_sorted_by_name() {
        let mut model = chain();
        model.nodes[0].name = "z1".to_string();
        assign_parameters(&mut model, &config("object"), &GeneratorRegistry::new()).unwrap();
        assert_eq!(vids(&model), vec!["103", "100", "101", "102"]);
        assert_eq!(model.interfaces[1].ns.param("node_name"), Some("r2"));
        assert_eq!(model.interfaces[0].ns.param("conn_name"), Some("r1.eth0--r2.eth0"));
    }

    #[test]
    fn test_connection_mode_shares_value() {
        let mut model = chain();
        assign_parameters(&mut model, &config("connection"), &GeneratorRegistry::new()).unwrap();
        assert_eq!(vids(&model), vec!["100", "100", "101", "101"]);
    }

    #[test]
    fn test_segment_mode_shares_value() {
        let mut model = chain();
        model.add_segment(Segment {
            name: "ip_seg0".to_string(),
            layer: "ip".to_string(),
            connections: vec![crate::model::ConnectionId(0), crate::model::ConnectionId(1)],
            ..Default::default()
        });
        // r3 does not request the rule
        model.interfaces[3].ns = NameSpace::default();
        assign_parameters(&mut model, &config("segment"), &GeneratorRegistry::new()).unwrap();
        assert_eq!(vids(&model), vec!["100", "100", "100", ""]);
        assert_eq!(model.segments[0].ns.param("name"), Some("ip_seg0"));
    }

    #[test]
    fn test_unknown_rule_is_reference_error() {
        let mut model = chain();
        model.nodes[0].ns.add_flag("missing");
        let err = assign_parameters(&mut model, &config("object"), &GeneratorRegistry::new())
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid parameter rule name missing (requested by node r1)"
        );
    }

    #[test]
    fn test_source_values_attached() {
        let yaml = r#"
param_rule:
  - name: users
    source: {type: list, values: [{user: alice}, {user: bob}]}
    param_format:
      home: "/home/{{ user }}"
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        let mut model = chain();
        for iface in &mut model.interfaces {
            iface.ns = NameSpace::default();
        }
        model.nodes[1].ns.add_flag("users");
        assign_parameters(&mut model, &config, &GeneratorRegistry::new()).unwrap();

        assert_eq!(model.values.len(), 2);
        assert_eq!(model.nodes[1].values.len(), 2);
        let bob = &model.values[1];
        assert_eq!(bob.index, 1);
        assert_eq!(bob.owner, ScopeId::Node(crate::model::NodeId(1)));
        assert_eq!(bob.ns.param("home"), Some("/home/bob"));
    }
}
