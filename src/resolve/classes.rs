//! Class resolution.
//!
//! Maps the class labels of every node, connection, interface and group to
//! class definitions and merges their effects (flags, IP policies, member
//! classes, virtual marks, primary-only attributes) onto the objects.

use log::{debug, warn};
use std::collections::BTreeMap;

use super::ExtraClasses;
use crate::config::{yaml_to_string, ClassType, Config, MemberClass, NeighborClass};
use crate::error::CompileError;
use crate::model::objects::{DEFAULT_INTERFACE_PREFIX, DEFAULT_NODE_PREFIX};
use crate::model::{
    ConnectionId, GroupId, Interface, InterfaceId, NameSpace, NetworkModel, NodeId, ScopeId,
};
use crate::topology::labels::{ParsedLabels, CLASS_ALL, CLASS_DEFAULT};

/// Class names of an object: implicit classes, labels, then module classes.
fn class_names(config: &Config, kind: ClassType, labels: &ParsedLabels, extra: &[String]) -> Vec<String> {
    let mut names = labels.with_implicit_classes(
        config.has_class(kind, CLASS_ALL),
        config.has_class(kind, CLASS_DEFAULT),
    );
    names.extend(extra.iter().cloned());
    names
}

/// Record an IP policy reference on an object's layer->policy map.
fn apply_policy(
    config: &Config,
    policies: &mut BTreeMap<String, String>,
    policy: &str,
    kind: ClassType,
    class: &str,
) -> Result<(), CompileError> {
    let (layer, _) = config
        .policy(policy)
        .ok_or_else(|| CompileError::UnknownPolicy {
            policy: policy.to_string(),
            kind: kind.to_string(),
            class: class.to_string(),
        })?;
    policies.insert(layer.name.clone(), policy.to_string());
    Ok(())
}

/// A `params` entry names either an IP policy or a parameter rule flag.
fn apply_params(
    config: &Config,
    params: &[String],
    policies: Option<&mut BTreeMap<String, String>>,
    ns: &mut NameSpace,
) {
    let mut policies = policies;
    for param in params {
        match (config.policy(param), policies.as_deref_mut()) {
            (Some((layer, _)), Some(policies)) => {
                policies.insert(layer.name.clone(), param.clone());
            }
            (Some(_), None) => {}
            (None, _) => ns.add_flag(param.clone()),
        }
    }
}

fn apply_values(values: &BTreeMap<String, serde_yaml::Value>, ns: &mut NameSpace) {
    for (key, value) in values {
        ns.add_param_if_absent(key.clone(), yaml_to_string(value));
    }
}

fn check_layer(config: &Config, layer: &str, context: String) -> Result<(), CompileError> {
    if config.layer(layer).is_none() {
        return Err(CompileError::UnknownLayer {
            layer: layer.to_string(),
            context,
        });
    }
    Ok(())
}

fn primary_only(field: &str, kind: ClassType, class: &str) -> CompileError {
    CompileError::PrimaryOnlyField {
        field: field.to_string(),
        kind: kind.to_string(),
        class: class.to_string(),
    }
}

/// Resolve the classes of all topology objects.
pub fn resolve_classes(
    model: &mut NetworkModel,
    config: &Config,
    extra: &ExtraClasses,
) -> Result<(), CompileError> {
    for node in model.node_ids().collect::<Vec<_>>() {
        resolve_node(model, config, node, &extra.node)?;
    }
    for conn in model.connection_ids().collect::<Vec<_>>() {
        resolve_connection(model, config, conn, &extra.connection)?;
    }
    for iface in model.interface_ids().collect::<Vec<_>>() {
        resolve_interface(model, config, iface, &extra.interface)?;
    }
    for group in model.group_ids().collect::<Vec<_>>() {
        resolve_group(model, config, group)?;
    }
    resolve_network(model, config);
    Ok(())
}

fn resolve_node(
    model: &mut NetworkModel,
    config: &Config,
    id: NodeId,
    extra: &[String],
) -> Result<(), CompileError> {
    let names = class_names(config, ClassType::Node, &model.node(id).labels, extra);
    let interfaces = model.node(id).interfaces.clone();
    model.node_mut(id).name_prefix = DEFAULT_NODE_PREFIX.to_string();

    for name in names {
        let class = config
            .node_class(&name)
            .ok_or_else(|| CompileError::UnknownClass {
                kind: ClassType::Node.to_string(),
                name: name.clone(),
                object: model.describe(ScopeId::Node(id)),
            })?;
        if model.node(id).classes.contains(&class.name) {
            continue;
        }
        model.register_class_member(ClassType::Node, &class.name, ScopeId::Node(id));

        for policy in &class.interface_policy {
            for iface in &interfaces {
                apply_policy(
                    config,
                    &mut model.interface_mut(*iface).policies,
                    policy,
                    ClassType::Node,
                    &class.name,
                )?;
            }
            if interfaces.is_empty() {
                apply_policy(config, &mut BTreeMap::new(), policy, ClassType::Node, &class.name)?;
            }
        }

        let object = model.describe(ScopeId::Node(id));
        let node = model.node_mut(id);
        node.classes.push(class.name.clone());
        if class.is_virtual {
            node.is_virtual = true;
        }
        for policy in &class.policies {
            apply_policy(config, &mut node.policies, policy, ClassType::Node, &class.name)?;
        }
        apply_params(config, &class.params, Some(&mut node.policies), &mut node.ns);
        node.member_classes.extend(
            class
                .classmembers
                .iter()
                .map(|m| (class.name.clone(), m.clone())),
        );

        if class.primary {
            if let Some(first) = &node.primary_class {
                return Err(CompileError::DuplicatePrimary {
                    kind: ClassType::Node.to_string(),
                    object,
                    first: first.clone(),
                    second: class.name.clone(),
                });
            }
            node.primary_class = Some(class.name.clone());
            if let Some(prefix) = &class.prefix {
                node.name_prefix = prefix.clone();
            }
            if let Some(mgmt) = &class.mgmt_interfaceclass {
                if config.interface_class(mgmt).is_none() {
                    return Err(CompileError::UnknownClass {
                        kind: ClassType::Interface.to_string(),
                        name: mgmt.clone(),
                        object: format!("nodeclass {}", class.name),
                    });
                }
                node.mgmt_class = Some(mgmt.clone());
            }
            node.tinet = class.tinet.clone();
            node.clab = class.clab.clone();
        } else {
            if class.prefix.is_some() {
                return Err(primary_only("prefix", ClassType::Node, &class.name));
            }
            if class.mgmt_interfaceclass.is_some() {
                return Err(primary_only("mgmt_interfaceclass", ClassType::Node, &class.name));
            }
            if !class.tinet.is_empty() || !class.clab.is_empty() {
                return Err(primary_only("platform attributes", ClassType::Node, &class.name));
            }
        }
        apply_values(&class.values, &mut node.ns);
    }

    let node = model.node(id);
    if node.primary_class.is_none() && !node.is_virtual {
        warn!("No primary node class on {}", model.describe(ScopeId::Node(id)));
    }
    Ok(())
}

fn resolve_connection(
    model: &mut NetworkModel,
    config: &Config,
    id: ConnectionId,
    extra: &[String],
) -> Result<(), CompileError> {
    let names = class_names(config, ClassType::Connection, &model.connection(id).labels, extra);
    let object = model.describe(ScopeId::Connection(id));
    {
        let conn = model.connection_mut(id);
        conn.layers
            .extend(config.default_connect_layers().map(str::to_string));
    }

    for name in names {
        let class = config
            .connection_class(&name)
            .ok_or_else(|| CompileError::UnknownClass {
                kind: ClassType::Connection.to_string(),
                name: name.clone(),
                object: object.clone(),
            })?;
        if model.connection(id).classes.contains(&class.name) {
            continue;
        }
        model.register_class_member(ClassType::Connection, &class.name, ScopeId::Connection(id));
        for layer in &class.layers {
            check_layer(config, layer, format!("connectionclass {}", class.name))?;
        }
        for policy in &class.policies {
            apply_policy(config, &mut BTreeMap::new(), policy, ClassType::Connection, &class.name)?;
        }

        let conn = model.connection_mut(id);
        conn.classes.push(class.name.clone());
        if class.is_virtual {
            conn.is_virtual = true;
        }
        apply_params(config, &class.params, None, &mut conn.ns);
        conn.layers.extend(class.layers.iter().cloned());
        conn.member_classes.extend(
            class
                .classmembers
                .iter()
                .map(|m| (class.name.clone(), m.clone())),
        );
        if class.primary {
            if let Some(first) = &conn.primary_class {
                return Err(CompileError::DuplicatePrimary {
                    kind: ClassType::Connection.to_string(),
                    object,
                    first: first.clone(),
                    second: class.name.clone(),
                });
            }
            conn.primary_class = Some(class.name.clone());
            conn.name_prefix = class.prefix.clone();
        } else {
            if class.prefix.is_some() {
                return Err(primary_only("prefix", ClassType::Connection, &class.name));
            }
            if !class.tinet.is_empty() || !class.clab.is_empty() {
                return Err(primary_only("platform attributes", ClassType::Connection, &class.name));
            }
        }
        apply_values(&class.values, &mut conn.ns);
    }
    Ok(())
}

fn apply_neighbor_classes(
    config: &Config,
    iface: &mut Interface,
    neighbors: &[NeighborClass],
    context: &str,
) -> Result<(), CompileError> {
    for neighbor in neighbors {
        check_layer(config, &neighbor.layer, context.to_string())?;
        iface.neighbor_layers.insert(neighbor.layer.clone());
    }
    Ok(())
}

fn resolve_interface(
    model: &mut NetworkModel,
    config: &Config,
    id: InterfaceId,
    extra: &[String],
) -> Result<(), CompileError> {
    let node = model.interface(id).node;
    let node_virtual = model.node(node).is_virtual;
    let mgmt_class = model.node(node).mgmt_class.clone();
    let connection = model.interface(id).connection;
    {
        let iface = model.interface_mut(id);
        iface.is_virtual = node_virtual;
        iface.name_prefix = DEFAULT_INTERFACE_PREFIX.to_string();
    }

    // Connection classes reach both endpoints
    if let Some(conn) = connection {
        let conn_classes = model.connection(conn).classes.clone();
        let conn_prefix = model.connection(conn).name_prefix.clone();
        let conn_virtual = model.connection(conn).is_virtual;
        let iface = model.interface_mut(id);
        for name in &conn_classes {
            let Some(class) = config.connection_class(name) else {
                continue;
            };
            for policy in &class.policies {
                apply_policy(config, &mut iface.policies, policy, ClassType::Connection, &class.name)?;
            }
            apply_params(config, &class.params, Some(&mut iface.policies), &mut iface.ns);
            apply_neighbor_classes(
                config,
                iface,
                &class.neighbors,
                &format!("connectionclass {}", class.name),
            )?;
            iface.member_classes.extend(
                class
                    .classmembers
                    .iter()
                    .map(|m| (class.name.clone(), m.clone())),
            );
        }
        if conn_virtual {
            iface.is_virtual = true;
        }
        if let Some(prefix) = conn_prefix {
            iface.name_prefix = prefix;
        }
    }

    let names = class_names(config, ClassType::Interface, &model.interface(id).labels, extra);
    for name in names {
        if mgmt_class.as_deref() == Some(name.as_str()) && !model.interface(id).is_mgmt {
            return Err(CompileError::MisplacedManagementClass {
                class: name,
                object: model.describe(ScopeId::Interface(id)),
            });
        }
        apply_interface_class(model, config, id, &name)?;
    }
    Ok(())
}

/// Apply one interface class to an interface.
pub(crate) fn apply_interface_class(
    model: &mut NetworkModel,
    config: &Config,
    id: InterfaceId,
    name: &str,
) -> Result<(), CompileError> {
    let object = model.describe(ScopeId::Interface(id));
    let class = config
        .interface_class(name)
        .ok_or_else(|| CompileError::UnknownClass {
            kind: ClassType::Interface.to_string(),
            name: name.to_string(),
            object: object.clone(),
        })?;
    if model.interface(id).classes.contains(&class.name) {
        return Ok(());
    }
    model.register_class_member(ClassType::Interface, &class.name, ScopeId::Interface(id));
    for layer in &class.layers {
        check_layer(config, layer, format!("interfaceclass {}", class.name))?;
    }

    let connection = model.interface(id).connection;
    if class.primary && model.interface(id).primary_class.is_none() {
        // One primary class per interface, counting its connection's
        if let Some(first) = connection.and_then(|c| model.connection(c).primary_class.clone()) {
            return Err(CompileError::DuplicatePrimary {
                kind: ClassType::Interface.to_string(),
                object,
                first,
                second: class.name.clone(),
            });
        }
    }
    if let Some(conn) = connection {
        let conn = model.connection_mut(conn);
        conn.layers.extend(class.layers.iter().cloned());
        if class.is_virtual {
            conn.is_virtual = true;
        }
    }

    let iface = model.interface_mut(id);
    iface.classes.push(class.name.clone());
    if class.is_virtual {
        iface.is_virtual = true;
    }
    for policy in &class.policies {
        apply_policy(config, &mut iface.policies, policy, ClassType::Interface, &class.name)?;
    }
    apply_params(config, &class.params, Some(&mut iface.policies), &mut iface.ns);
    apply_neighbor_classes(
        config,
        iface,
        &class.neighbors,
        &format!("interfaceclass {}", class.name),
    )?;
    iface.member_classes.extend(
        class
            .classmembers
            .iter()
            .map(|m: &MemberClass| (class.name.clone(), m.clone())),
    );
    if class.primary {
        if let Some(first) = &iface.primary_class {
            return Err(CompileError::DuplicatePrimary {
                kind: ClassType::Interface.to_string(),
                object,
                first: first.clone(),
                second: class.name.clone(),
            });
        }
        iface.primary_class = Some(class.name.clone());
        if let Some(prefix) = &class.prefix {
            iface.name_prefix = prefix.clone();
        }
        iface.tinet = class.tinet.clone();
        iface.clab = class.clab.clone();
    } else {
        if class.prefix.is_some() {
            return Err(primary_only("prefix", ClassType::Interface, &class.name));
        }
        if !class.tinet.is_empty() || !class.clab.is_empty() {
            return Err(primary_only("platform attributes", ClassType::Interface, &class.name));
        }
    }
    apply_values(&class.values, &mut iface.ns);
    debug!("Applied interfaceclass {} to {}", class.name, object);
    Ok(())
}

fn resolve_group(model: &mut NetworkModel, config: &Config, id: GroupId) -> Result<(), CompileError> {
    let names = class_names(config, ClassType::Group, &model.group(id).labels, &[]);
    for name in names {
        let class = config
            .group_class(&name)
            .ok_or_else(|| CompileError::UnknownClass {
                kind: ClassType::Group.to_string(),
                name: name.clone(),
                object: model.describe(ScopeId::Group(id)),
            })?;
        if model.group(id).classes.contains(&class.name) {
            continue;
        }
        model.register_class_member(ClassType::Group, &class.name, ScopeId::Group(id));
        let group = model.group_mut(id);
        group.classes.push(class.name.clone());
        if class.is_virtual {
            group.is_virtual = true;
        }
        apply_params(config, &class.params, None, &mut group.ns);
        apply_values(&class.values, &mut group.ns);
    }
    Ok(())
}

fn resolve_network(model: &mut NetworkModel, config: &Config) {
    for class in &config.network_classes {
        model.register_class_member(ClassType::Network, &class.name, ScopeId::Network);
        apply_values(&class.values, &mut model.ns);
    }
}
