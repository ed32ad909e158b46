//! IP address allocation logic.
//!
//! This file assigns segment prefixes and interface addresses per layer,
//! node loopback addresses and management addresses. Every allocation goes
//! through [`IpPool`]; explicitly given addresses and prefixes are reserved
//! before free blocks are handed out.

use log::{debug, info};
use std::collections::BTreeMap;
use std::net::IpAddr;

use super::pool::IpPool;
use crate::config::{Config, IpPolicy, Layer, PolicyType};
use crate::error::CompileError;
use crate::model::{InterfaceId, NetworkModel, NodeId, ScopeId, SegmentId};
use crate::utils::ip_utils::{addr_bits, next_addr, parse_host, IpPrefix};

fn parse_prefix(value: &str) -> Result<IpPrefix, CompileError> {
    value
        .parse::<IpPrefix>()
        .map_err(|reason| CompileError::InvalidAddress {
            value: value.to_string(),
            reason,
        })
}

fn parse_addr(value: &str) -> Result<IpAddr, CompileError> {
    parse_host(value).map_err(|reason| CompileError::InvalidAddress {
        value: value.to_string(),
        reason,
    })
}

/// Pick `count` host addresses from `prefix` in increasing order, skipping
/// the network address, the IPv4 broadcast address and `reserved`.
pub fn host_addresses(
    prefix: &IpPrefix,
    count: usize,
    reserved: &[IpAddr],
) -> Result<Vec<IpAddr>, CompileError> {
    if count == 0 {
        return Ok(Vec::new());
    }
    let broadcast = prefix.broadcast();
    let host_bits = prefix.host_bits() as u32;
    let total = if host_bits >= 128 {
        u128::MAX
    } else {
        1u128 << host_bits
    };
    let unusable: u128 = if prefix.is_ipv4() { 2 } else { 1 };
    let mut distinct_reserved: Vec<&IpAddr> = reserved
        .iter()
        .filter(|a| prefix.contains_addr(a) && **a != prefix.addr())
        .filter(|a| !prefix.is_ipv4() || **a != broadcast)
        .collect();
    distinct_reserved.sort();
    distinct_reserved.dedup();
    let potential = total
        .saturating_sub(unusable)
        .saturating_sub(distinct_reserved.len() as u128);
    if count as u128 > potential {
        return Err(CompileError::AddressExhausted {
            prefix: prefix.to_string(),
            required: count,
        });
    }

    let mut addrs = Vec::with_capacity(count);
    let mut current = prefix.addr();
    while addrs.len() < count {
        current = next_addr(&current).ok_or_else(|| CompileError::AddressExhausted {
            prefix: prefix.to_string(),
            required: count,
        })?;
        if !prefix.contains_addr(&current) || (prefix.is_ipv4() && current == broadcast) {
            return Err(CompileError::AddressExhausted {
                prefix: prefix.to_string(),
                required: count,
            });
        }
        if reserved.contains(&current) {
            continue;
        }
        addrs.push(current);
    }
    Ok(addrs)
}

/// Address plan of one segment
#[derive(Debug)]
struct SegmentPlan {
    segment: SegmentId,
    policy: Option<String>,
    prefix: Option<IpPrefix>,
    unspecified: Vec<InterfaceId>,
    reserved: Vec<(InterfaceId, IpAddr)>,
}

fn segment_policy(
    model: &NetworkModel,
    config: &Config,
    layer: &Layer,
    segment: SegmentId,
) -> Result<Option<String>, CompileError> {
    let mut chosen: Option<String> = None;
    for iface in &model.segment(segment).interfaces {
        let object = model.describe(ScopeId::Interface(*iface));
        let Some(policy) = model.interface(*iface).policies.get(&layer.name) else {
            if !model.interface(*iface).ns.has_param(&layer.addr_key()) {
                return Err(CompileError::MissingPolicy {
                    object,
                    layer: layer.name.clone(),
                });
            }
            continue;
        };
        match config.policy(policy) {
            Some((l, p)) if l.name == layer.name && p.kind == PolicyType::Ip => {}
            _ => {
                return Err(CompileError::UndefinedPolicy {
                    policy: policy.clone(),
                    object,
                })
            }
        }
        match &chosen {
            Some(current) if current != policy => {
                return Err(CompileError::InconsistentPolicy {
                    first: current.clone(),
                    second: policy.clone(),
                    segment: model.segment(segment).name.clone(),
                })
            }
            Some(_) => {}
            None => chosen = Some(policy.clone()),
        }
    }
    Ok(chosen)
}

fn plan_segment(
    model: &NetworkModel,
    config: &Config,
    layer: &Layer,
    segment: SegmentId,
) -> Result<SegmentPlan, CompileError> {
    let policy = segment_policy(model, config, layer, segment)?;
    let seg = model.segment(segment);
    let net_key = layer.net_key();
    let addr_key = layer.addr_key();

    let mut prefix: Option<IpPrefix> = None;
    for conn in &seg.connections {
        if let Some(value) = model.connection(*conn).ns.param(&net_key) {
            let given = parse_prefix(value)?;
            if let Some(bound) = prefix {
                if bound != given {
                    return Err(CompileError::InconsistentAddress {
                        detail: format!("{} and {}", bound, given),
                        segment: seg.name.clone(),
                    });
                }
            }
            prefix = Some(given);
        }
    }

    let mut unspecified = Vec::new();
    let mut reserved = Vec::new();
    let mut given_lengths = Vec::new();
    for iface in &seg.interfaces {
        match model.interface(*iface).ns.param(&addr_key) {
            Some(value) => {
                reserved.push((*iface, parse_addr(value)?));
                if let Some((_, len)) = value.split_once('/') {
                    given_lengths.push(len.trim().parse::<u8>().map_err(|e| {
                        CompileError::InvalidAddress {
                            value: value.to_string(),
                            reason: e.to_string(),
                        }
                    })?);
                }
            }
            None => unspecified.push(*iface),
        }
    }

    if let Some(bound) = prefix {
        for (iface, addr) in &reserved {
            if !bound.contains_addr(addr) {
                return Err(CompileError::InconsistentAddress {
                    detail: format!(
                        "{} of {} is outside of {}",
                        addr,
                        model.describe(ScopeId::Interface(*iface)),
                        bound
                    ),
                    segment: seg.name.clone(),
                });
            }
        }
    } else if !reserved.is_empty() {
        let plen = match &policy {
            Some(name) => config.policy(name).map(|(_, p)| p.prefix),
            None => given_lengths.first().copied(),
        };
        if let Some(plen) = plen {
            for (iface, addr) in &reserved {
                let implied = IpPrefix::new(*addr, plen).map_err(|reason| {
                    CompileError::InvalidAddress {
                        value: addr.to_string(),
                        reason,
                    }
                })?;
                match prefix {
                    Some(bound) if bound != implied => {
                        return Err(CompileError::InconsistentAddress {
                            detail: format!(
                                "{} of {} is outside of {}",
                                addr,
                                model.describe(ScopeId::Interface(*iface)),
                                bound
                            ),
                            segment: seg.name.clone(),
                        })
                    }
                    _ => prefix = Some(implied),
                }
            }
        }
    }

    // Without a policy or prefix length nothing bounds the segment
    if policy.is_none() && prefix.is_none() {
        let first = unspecified
            .first()
            .copied()
            .or_else(|| reserved.first().map(|(iface, _)| *iface));
        if let Some(first) = first {
            return Err(CompileError::MissingPolicy {
                object: model.describe(ScopeId::Interface(first)),
                layer: layer.name.clone(),
            });
        }
    }

    Ok(SegmentPlan {
        segment,
        policy,
        prefix,
        unspecified,
        reserved,
    })
}

/// Assign a prefix to every segment and an address to every aware interface
/// of the layer's segments.
pub fn assign_segment_addresses(
    model: &mut NetworkModel,
    config: &Config,
    layer: &Layer,
) -> Result<(), CompileError> {
    let mut pools: BTreeMap<String, IpPool> = BTreeMap::new();
    for policy in layer.ip_policies() {
        let range = parse_prefix(&policy.range)?;
        pools.insert(
            policy.name.clone(),
            IpPool::new(policy.name.clone(), range, policy.prefix)?,
        );
    }

    let segments: Vec<SegmentId> = model.segments_in_layer(&layer.name).collect();
    let mut plans = Vec::with_capacity(segments.len());
    for segment in segments {
        if model.segment(segment).interfaces.is_empty() {
            continue;
        }
        plans.push(plan_segment(model, config, layer, segment)?);
    }

    for plan in &plans {
        if let Some(prefix) = &plan.prefix {
            for pool in pools.values_mut() {
                pool.reserve_prefix(prefix)?;
            }
        }
    }

    for policy in layer.ip_policies() {
        let waiting: Vec<usize> = plans
            .iter()
            .enumerate()
            .filter(|(_, p)| p.prefix.is_none() && p.policy.as_deref() == Some(policy.name.as_str()))
            .map(|(i, _)| i)
            .collect();
        if waiting.is_empty() {
            continue;
        }
        let pool = pools
            .get_mut(&policy.name)
            .ok_or_else(|| CompileError::UndefinedPolicy {
                policy: policy.name.clone(),
                object: format!("layer {}", layer.name),
            })?;
        let prefixes = pool.available_prefixes(waiting.len())?;
        for (i, prefix) in waiting.into_iter().zip(prefixes) {
            plans[i].prefix = Some(prefix);
        }
    }

    for plan in plans {
        let Some(prefix) = plan.prefix else {
            continue;
        };
        let reserved_addrs: Vec<IpAddr> = plan.reserved.iter().map(|(_, a)| *a).collect();
        let addrs = host_addresses(&prefix, plan.unspecified.len(), &reserved_addrs)?;
        let assigned = plan
            .unspecified
            .iter()
            .copied()
            .zip(addrs)
            .chain(plan.reserved.iter().copied());
        for (iface, addr) in assigned {
            let ns = &mut model.interface_mut(iface).ns;
            ns.add_param(layer.addr_key(), addr.to_string());
            ns.add_param(layer.net_key(), prefix.to_string());
            ns.add_param(layer.plen_key(), prefix.len().to_string());
        }
        let connections = model.segment(plan.segment).connections.clone();
        for conn in connections {
            model
                .connection_mut(conn)
                .ns
                .add_param_if_absent(layer.net_key(), prefix.to_string());
        }
        let seg = model.segment_mut(plan.segment);
        seg.bound = Some(prefix);
        seg.ns.add_param(layer.net_key(), prefix.to_string());
        seg.ns.add_param(layer.plen_key(), prefix.len().to_string());
        debug!("Segment {} uses {}", seg.name, prefix);
    }
    Ok(())
}

/// Assign one loopback address per node aware of a loopback policy.
pub fn assign_loopback_addresses(
    model: &mut NetworkModel,
    layer: &Layer,
    policy: &IpPolicy,
) -> Result<(), CompileError> {
    let range = parse_prefix(&policy.range)?;
    let mut pool = IpPool::new(policy.name.clone(), range, range.max_len())?;
    reserve_network_and_broadcast(&mut pool)?;

    let key = layer.loopback_key();
    let mut pending: Vec<NodeId> = Vec::new();
    for node in model.node_ids() {
        if let Some(value) = model.node(node).ns.param(&key) {
            pool.reserve_addr(&parse_addr(value)?)?;
        } else if model.node(node).policies.get(&layer.name) == Some(&policy.name) {
            pending.push(node);
        }
    }

    let prefixes = pool.available_prefixes(pending.len())?;
    for (node, prefix) in pending.into_iter().zip(prefixes) {
        model
            .node_mut(node)
            .ns
            .add_param(key.clone(), prefix.addr().to_string());
    }
    Ok(())
}

fn reserve_network_and_broadcast(pool: &mut IpPool) -> Result<(), CompileError> {
    let network = pool.range().addr();
    pool.reserve_addr(&network)?;
    if pool.range().is_ipv4() && pool.length() > 1 {
        let last = pool.last()?;
        pool.reserve_prefix(&last)?;
    }
    Ok(())
}

/// Assign management addresses to the management interfaces.
pub fn assign_management_addresses(
    model: &mut NetworkModel,
    config: &Config,
) -> Result<(), CompileError> {
    let Some(mgmt) = &config.mgmt_layer else {
        return Ok(());
    };
    let range = parse_prefix(&mgmt.range)?;
    let mut pool = IpPool::new(mgmt.name.clone(), range, addr_bits(&range.addr()))?;
    reserve_network_and_broadcast(&mut pool)?;
    let gateway = match &mgmt.gateway {
        Some(gateway) => parse_addr(gateway)?,
        None => next_addr(&range.addr()).ok_or_else(|| CompileError::InvalidAddress {
            value: mgmt.range.clone(),
            reason: "no gateway address available".to_string(),
        })?,
    };
    pool.reserve_addr(&gateway)?;

    let mgmt_ifaces: Vec<InterfaceId> = model
        .interface_ids()
        .filter(|i| model.interface(*i).is_mgmt)
        .collect();
    let mut pending = Vec::new();
    let mut assigned = Vec::new();
    for iface in mgmt_ifaces {
        match model.interface(iface).ns.param(&mgmt.addr_key()) {
            Some(value) => {
                let addr = parse_addr(value)?;
                pool.reserve_addr(&addr)?;
                assigned.push((iface, addr));
            }
            None => pending.push(iface),
        }
    }
    let prefixes = pool.available_prefixes(pending.len())?;
    assigned.extend(pending.into_iter().zip(prefixes.iter().map(|p| p.addr())));

    for (iface, addr) in assigned {
        let ns = &mut model.interface_mut(iface).ns;
        ns.add_param(mgmt.addr_key(), addr.to_string());
        ns.add_param(mgmt.net_key(), range.to_string());
        ns.add_param(mgmt.plen_key(), range.len().to_string());
    }
    info!("Management layer {}: gateway {}", mgmt.name, gateway);
    Ok(())
}

/// Run every address assignment of the configuration.
pub fn assign_addresses(model: &mut NetworkModel, config: &Config) -> Result<(), CompileError> {
    for layer in &config.layers {
        assign_segment_addresses(model, config, layer)?;
        for policy in layer.loopback_policies() {
            assign_loopback_addresses(model, layer, policy)?;
        }
    }
    assign_management_addresses(model, config)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PolicyType;
    use crate::ip::segment::search_segments;
    use crate::model::{Connection, Interface, Node};
    use crate::topology::labels::ParsedLabels;

    fn ip_layer() -> Layer {
        Layer {
            name: "ip".to_string(),
            default_connect: true,
            policies: vec![
                IpPolicy {
                    name: "p2p".to_string(),
                    kind: PolicyType::Ip,
                    range: "10.0.0.0/24".to_string(),
                    prefix: 30,
                },
                IpPolicy {
                    name: "lo".to_string(),
                    kind: PolicyType::Loopback,
                    range: "10.255.0.0/24".to_string(),
                    prefix: 0,
                },
            ],
        }
    }

    /// a -- sw -- b; a.eth0 carries `given` as explicit address
    fn bridged(given: Option<&str>) -> (NetworkModel, Config) {
        let mut model = NetworkModel::default();
        let nodes: Vec<NodeId> = ["a", "sw", "b"]
            .iter()
            .map(|n| {
                model.add_node(Node {
                    name: n.to_string(),
                    ..Default::default()
                })
            })
            .collect();
        let mut a = Interface::new(nodes[0], "eth0".to_string(), ParsedLabels::default());
        a.policies.insert("ip".to_string(), "p2p".to_string());
        if let Some(addr) = given {
            a.ns.add_param("ip_addr", addr);
        }
        let a = model.add_interface(a);
        let p1 = model.add_interface(Interface::new(nodes[1], "p1".to_string(), ParsedLabels::default()));
        let p2 = model.add_interface(Interface::new(nodes[1], "p2".to_string(), ParsedLabels::default()));
        let mut b = Interface::new(nodes[2], "eth0".to_string(), ParsedLabels::default());
        b.policies.insert("ip".to_string(), "p2p".to_string());
        let b = model.add_interface(b);
        for (x, y) in [(a, p1), (p2, b)] {
            let mut conn = Connection::new(x, y, ParsedLabels::default());
            conn.layers.insert("ip".to_string());
            model.add_connection(conn);
        }
        let config = Config {
            layers: vec![ip_layer()],
            ..Default::default()
        };
        (model, config)
    }

    #[test]
    fn test_host_addresses_skip_reserved() {
        let prefix: IpPrefix = "10.0.0.0/29".parse().unwrap();
        let reserved = vec!["10.0.0.2".parse().unwrap()];
        let addrs = host_addresses(&prefix, 3, &reserved).unwrap();
        let addrs: Vec<String> = addrs.iter().map(ToString::to_string).collect();
        assert_eq!(addrs, vec!["10.0.0.1", "10.0.0.3", "10.0.0.4"]);
        assert!(host_addresses(&prefix, 6, &reserved).is_err());
        assert!(host_addresses(&prefix, 5, &reserved).is_ok());
        assert!(host_addresses(&prefix, 0, &[]).unwrap().is_empty());
    }

    #[test]
    fn test_host_addresses_ipv6() {
        let prefix: IpPrefix = "2001:db8::/126".parse().unwrap();
        let addrs = host_addresses(&prefix, 3, &[]).unwrap();
        assert_eq!(addrs[2].to_string(), "2001:db8::3");
        assert!(host_addresses(&prefix, 4, &[]).is_err());
    }

    #[test]
    fn test_transparent_path_shares_prefix() {
        let (mut model, config) = bridged(Some("10.0.0.5"));
        search_segments(&mut model, &config).unwrap();
        assign_addresses(&mut model, &config).unwrap();
        assert_eq!(model.segments.len(), 1);
        let a = &model.interfaces[0].ns;
        let b = &model.interfaces[3].ns;
        assert_eq!(a.param("ip_addr"), Some("10.0.0.5"));
        assert_eq!(a.param("ip_net"), Some("10.0.0.4/30"));
        assert_eq!(b.param("ip_net"), Some("10.0.0.4/30"));
        assert_eq!(b.param("ip_addr"), Some("10.0.0.6"));
        assert_eq!(b.param("ip_plen"), Some("30"));
    }

    #[test]
    fn test_unbound_segment_allocated_from_pool() {
        let (mut model, config) = bridged(None);
        search_segments(&mut model, &config).unwrap();
        assign_addresses(&mut model, &config).unwrap();
        assert_eq!(model.interfaces[0].ns.param("ip_addr"), Some("10.0.0.1"));
        assert_eq!(model.interfaces[3].ns.param("ip_addr"), Some("10.0.0.2"));
        assert_eq!(model.segments[0].bound.map(|p| p.to_string()).as_deref(), Some("10.0.0.0/30"));
    }

    #[test]
    fn test_inconsistent_connection_prefix() {
        let (mut model, config) = bridged(None);
        model.connections[0].ns.add_param("ip_net", "10.0.0.0/30");
        model.connections[1].ns.add_param("ip_net", "10.0.0.8/30");
        search_segments(&mut model, &config).unwrap();
        let err = assign_addresses(&mut model, &config).unwrap_err();
        assert!(matches!(err, CompileError::InconsistentAddress { .. }));
    }

    #[test]
    fn test_explicit_address_outside_connection_prefix() {
        let (mut model, config) = bridged(Some("10.0.0.9"));
        model.connections[1].ns.add_param("ip_net", "10.0.0.0/30");
        search_segments(&mut model, &config).unwrap();
        let err = assign_addresses(&mut model, &config).unwrap_err();
        match err {
            CompileError::InconsistentAddress { detail, segment } => {
                assert!(detail.contains("10.0.0.9"));
                assert!(detail.contains("10.0.0.0/30"));
                assert_eq!(segment, "ip_seg0");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_explicit_addresses_in_different_prefixes() {
        let (mut model, config) = bridged(Some("10.0.0.5"));
        model.interfaces[3].ns.add_param("ip_addr", "10.0.0.9");
        search_segments(&mut model, &config).unwrap();
        let err = assign_addresses(&mut model, &config).unwrap_err();
        match err {
            CompileError::InconsistentAddress { detail, .. } => {
                assert!(detail.contains("10.0.0.9"));
                assert!(detail.contains("10.0.0.4/30"));
            }
            other => panic!("unexpected error: {}", other),
        }

        // Lengths given on the addresses apply without a policy
        let (mut model, config) = bridged(Some("10.0.0.5/29"));
        model.interfaces[0].policies.clear();
        model.interfaces[3].policies.clear();
        model.interfaces[3].ns.add_param("ip_addr", "10.0.0.9/29");
        search_segments(&mut model, &config).unwrap();
        let err = assign_addresses(&mut model, &config).unwrap_err();
        assert!(matches!(err, CompileError::InconsistentAddress { .. }));
    }

    #[test]
    fn test_explicit_addresses_without_length_need_policy() {
        let (mut model, config) = bridged(Some("10.0.0.5"));
        model.interfaces[0].policies.clear();
        model.interfaces[3].policies.clear();
        model.interfaces[3].ns.add_param("ip_addr", "10.0.0.6");
        search_segments(&mut model, &config).unwrap();
        let err = assign_addresses(&mut model, &config).unwrap_err();
        match err {
            CompileError::MissingPolicy { object, layer } => {
                assert!(object.contains("a.eth0"));
                assert_eq!(layer, "ip");
            }
            other => panic!("unexpected error: {}", other),
        }

        // A length on one of the addresses bounds the segment
        let (mut model, config) = bridged(Some("10.0.0.5/30"));
        model.interfaces[0].policies.clear();
        model.interfaces[3].policies.clear();
        model.interfaces[3].ns.add_param("ip_addr", "10.0.0.6");
        search_segments(&mut model, &config).unwrap();
        assign_addresses(&mut model, &config).unwrap();
        assert_eq!(model.interfaces[3].ns.param("ip_net"), Some("10.0.0.4/30"));
    }

    #[test]
    fn test_inconsistent_policy() {
        let (mut model, mut config) = bridged(None);
        config.layers[0].policies.push(IpPolicy {
            name: "lan".to_string(),
            kind: PolicyType::Ip,
            range: "192.168.0.0/16".to_string(),
            prefix: 24,
        });
        model.interfaces[3].policies.insert("ip".to_string(), "lan".to_string());
        search_segments(&mut model, &config).unwrap();
        let err = assign_addresses(&mut model, &config).unwrap_err();
        assert!(err.to_string().contains("p2p"));
        assert!(err.to_string().contains("lan"));
    }

    #[test]
    fn test_loopbacks_through_pool() {
        let (mut model, config) = bridged(None);
        for node in [0, 2] {
            model.nodes[node].policies.insert("ip".to_string(), "lo".to_string());
        }
        model.nodes[2].ns.add_param("ip_loopback", "10.255.0.1");
        assign_loopback_addresses(&mut model, &config.layers[0], &config.layers[0].policies[1]).unwrap();
        assert_eq!(model.nodes[0].ns.param("ip_loopback"), Some("10.255.0.2"));
        assert_eq!(model.nodes[2].ns.param("ip_loopback"), Some("10.255.0.1"));
        assert_eq!(model.nodes[1].ns.param("ip_loopback"), None);
    }
}
