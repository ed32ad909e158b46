//! Automatic naming of nodes, interfaces and connections.

use log::debug;
use std::collections::{BTreeMap, BTreeSet};

use crate::config::Config;
use crate::error::CompileError;
use crate::model::{NetworkModel, ScopeId};

/// Next free `prefix + n` name; `counters` tracks the next number per prefix.
fn next_name(
    prefix: &str,
    start: usize,
    counters: &mut BTreeMap<String, usize>,
    taken: &BTreeSet<String>,
) -> String {
    let counter = counters.entry(prefix.to_string()).or_insert(start);
    loop {
        let candidate = format!("{}{}", prefix, counter);
        *counter += 1;
        if !taken.contains(&candidate) {
            return candidate;
        }
    }
}

/// Name unnamed nodes (or every node with `global.nodeautoname`) as
/// `prefix + n`, numbering from 1 per prefix.
pub fn assign_node_names(model: &mut NetworkModel, config: &Config) -> Result<(), CompileError> {
    let rename_all = config.global.nodeautoname;
    let mut taken: BTreeSet<String> = if rename_all {
        BTreeSet::new()
    } else {
        model
            .nodes
            .iter()
            .filter(|n| !n.name.is_empty())
            .map(|n| n.name.clone())
            .collect()
    };
    let mut counters = BTreeMap::new();
    for node in &mut model.nodes {
        if !rename_all && !node.name.is_empty() {
            continue;
        }
        let name = next_name(&node.name_prefix, 1, &mut counters, &taken);
        debug!("Naming node {:?} as {}", node.name, name);
        taken.insert(name.clone());
        node.name = name;
    }

    let mut seen = BTreeSet::new();
    for node in &model.nodes {
        if !seen.insert(node.name.as_str()) {
            return Err(CompileError::DuplicateName {
                kind: "node".to_string(),
                name: node.name.clone(),
            });
        }
    }
    Ok(())
}

/// Name unnamed interfaces as `prefix + n`, numbering from 0 per node and
/// prefix, skipping names taken by explicitly named siblings.
pub fn assign_interface_names(model: &mut NetworkModel) -> Result<(), CompileError> {
    for node in model.node_ids().collect::<Vec<_>>() {
        let interfaces = model.node(node).interfaces.clone();
        let mut taken: BTreeSet<String> = interfaces
            .iter()
            .map(|i| model.interface(*i).name.clone())
            .filter(|n| !n.is_empty())
            .collect();
        let mut counters = BTreeMap::new();
        for iface in &interfaces {
            if !model.interface(*iface).name.is_empty() {
                continue;
            }
            let prefix = model.interface(*iface).name_prefix.clone();
            let name = next_name(&prefix, 0, &mut counters, &taken);
            taken.insert(name.clone());
            model.interface_mut(*iface).name = name;
        }

        let mut seen = BTreeSet::new();
        for iface in &interfaces {
            let name = &model.interface(*iface).name;
            if name.is_empty() {
                return Err(CompileError::UnnamedInterface {
                    node: model.node(node).name.clone(),
                });
            }
            if !seen.insert(name.clone()) {
                return Err(CompileError::DuplicateName {
                    kind: "interface".to_string(),
                    name: model.sort_key(ScopeId::Interface(*iface)),
                });
            }
        }
    }
    Ok(())
}

/// Name connections after their endpoints, e.g. `r1.eth0--r2.eth0`.
pub fn assign_connection_names(model: &mut NetworkModel) {
    for conn in model.connection_ids().collect::<Vec<_>>() {
        let (src, dst) = (model.connection(conn).src, model.connection(conn).dst);
        let name = format!(
            "{}--{}",
            model.sort_key(ScopeId::Interface(src)),
            model.sort_key(ScopeId::Interface(dst))
        );
        model.connection_mut(conn).name = name;
    }
}
