//! Configuration structures.
//!
//! This file defines the YAML configuration model: layers and IP policies,
//! parameter rules, class definitions for every object kind, config template
//! descriptors and output file definitions. All class definitions are read-only
//! after loading and are shared by reference during compilation.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::utils::ip_utils::{parse_host, IpPrefix};
use crate::utils::validation::check_param_name;

/// Top-level configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Network name, exported as the `name` parameter of the network
    #[serde(default)]
    pub name: String,
    /// Names of the modules to load
    #[serde(default, rename = "module")]
    pub modules: Vec<String>,
    #[serde(default)]
    pub global: GlobalSettings,
    #[serde(default, rename = "file")]
    pub files: Vec<FileDefinition>,
    #[serde(default, rename = "layer")]
    pub layers: Vec<Layer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mgmt_layer: Option<ManagementLayer>,
    #[serde(default, rename = "param_rule")]
    pub param_rules: Vec<ParameterRule>,
    #[serde(default, rename = "networkclass")]
    pub network_classes: Vec<NetworkClass>,
    #[serde(default, rename = "nodeclass")]
    pub node_classes: Vec<NodeClass>,
    #[serde(default, rename = "interfaceclass")]
    pub interface_classes: Vec<InterfaceClass>,
    #[serde(default, rename = "connectionclass")]
    pub connection_classes: Vec<ConnectionClass>,
    #[serde(default, rename = "groupclass")]
    pub group_classes: Vec<GroupClass>,
    #[serde(default, rename = "segmentclass")]
    pub segment_classes: Vec<SegmentClass>,
    /// Directory of the configuration file, set by the loader
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

/// How relative paths in the configuration are resolved
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathMode {
    /// Relative to the working directory
    #[default]
    Default,
    /// Relative to the directory of the configuration file
    Local,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalSettings {
    #[serde(default)]
    pub path: PathMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mountsourcepath: Option<String>,
    /// Rename every node with its class prefix
    #[serde(default)]
    pub nodeautoname: bool,
}

/// An output file definition
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileDefinition {
    pub name: String,
    /// Mount path inside the emulated node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default)]
    pub formats: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// A connectivity layer, e.g. `ip` or `vlan`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Layer {
    pub name: String,
    /// Every connection participates in this layer
    #[serde(default)]
    pub default_connect: bool,
    #[serde(default, rename = "policy")]
    pub policies: Vec<IpPolicy>,
}

impl Layer {
    /// Parameter holding an interface address in this layer
    pub fn addr_key(&self) -> String {
        format!("{}_addr", self.name)
    }

    /// Parameter holding the segment prefix in this layer
    pub fn net_key(&self) -> String {
        format!("{}_net", self.name)
    }

    /// Parameter holding the prefix length in this layer
    pub fn plen_key(&self) -> String {
        format!("{}_plen", self.name)
    }

    /// Parameter holding a node loopback address in this layer
    pub fn loopback_key(&self) -> String {
        format!("{}_loopback", self.name)
    }

    pub fn ip_policies(&self) -> impl Iterator<Item = &IpPolicy> {
        self.policies.iter().filter(|p| p.kind == PolicyType::Ip)
    }

    pub fn loopback_policies(&self) -> impl Iterator<Item = &IpPolicy> {
        self.policies.iter().filter(|p| p.kind == PolicyType::Loopback)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyType {
    /// Addresses for interfaces, one prefix per segment
    #[default]
    Ip,
    /// One address per node
    Loopback,
}

/// An address pool policy of a layer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IpPolicy {
    pub name: String,
    #[serde(default, rename = "type")]
    pub kind: PolicyType,
    /// Address range, e.g. `10.0.0.0/16`
    pub range: String,
    /// Prefix length of the allocated segment prefixes
    #[serde(default)]
    pub prefix: u8,
}

impl IpPolicy {
    pub fn parsed_range(&self) -> Result<IpPrefix, String> {
        self.range.parse()
    }
}

/// Management network settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManagementLayer {
    pub name: String,
    pub range: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface_name: Option<String>,
}

impl ManagementLayer {
    pub const DEFAULT_INTERFACE_NAME: &'static str = "mgmt";

    pub fn interface_name(&self) -> &str {
        self.interface_name
            .as_deref()
            .unwrap_or(Self::DEFAULT_INTERFACE_NAME)
    }

    pub fn addr_key(&self) -> String {
        format!("{}_addr", self.name)
    }

    pub fn net_key(&self) -> String {
        format!("{}_net", self.name)
    }

    pub fn plen_key(&self) -> String {
        format!("{}_plen", self.name)
    }
}

/// Granularity of a parameter rule on interfaces
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssignMode {
    /// One value per requesting object
    #[default]
    Object,
    /// One value per network segment of the rule's layer
    Segment,
    /// One value per connection
    Connection,
}

/// Candidate generation of a plain parameter rule
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleType {
    #[default]
    #[serde(alias = "int")]
    Integer,
    File,
}

/// A named generator of parameter values
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParameterRule {
    pub name: String,
    #[serde(default)]
    pub assign: AssignMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: RuleType,
    #[serde(default)]
    pub max: i64,
    #[serde(default)]
    pub min: i64,
    #[serde(default)]
    pub header: String,
    #[serde(default)]
    pub footer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sourcefile: Option<String>,
    /// Static source of structured values
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<ValueSource>,
    /// Module generator of structured values (`module.generator`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generator: Option<String>,
    /// Extra row fields, `{{ key }}` is replaced with the row's values
    #[serde(default)]
    pub param_format: BTreeMap<String, String>,
}

impl ParameterRule {
    /// Attach rules produce Value records instead of plain parameters.
    pub fn is_attach_mode(&self) -> bool {
        self.source.is_some() || self.generator.as_deref().is_some_and(|g| !g.is_empty())
    }

    /// Split the generator name into module and generator parts.
    pub fn generator_parts(&self) -> Option<(&str, &str)> {
        let generator = self.generator.as_deref()?;
        match generator.split_once('.') {
            Some((module, name)) if !module.is_empty() && !name.is_empty() => Some((module, name)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Range,
    Sequence,
    List,
    File,
}

/// Static source of an attach rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValueSource {
    #[serde(rename = "type")]
    pub kind: SourceKind,
    #[serde(default)]
    pub start: i64,
    #[serde(default)]
    pub end: i64,
    #[serde(default)]
    pub values: Vec<BTreeMap<String, serde_yaml::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    /// `yaml`, `json`, `csv` or `text`; derived from the extension if absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

/// Object kinds that classes can be defined for
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassType {
    Network,
    Node,
    Interface,
    Connection,
    Group,
    Segment,
}

impl ClassType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClassType::Network => "network",
            ClassType::Node => "node",
            ClassType::Interface => "interface",
            ClassType::Connection => "connection",
            ClassType::Group => "group",
            ClassType::Segment => "segment",
        }
    }
}

impl fmt::Display for ClassType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClassType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "network" => Ok(ClassType::Network),
            "node" => Ok(ClassType::Node),
            "interface" => Ok(ClassType::Interface),
            "connection" => Ok(ClassType::Connection),
            "group" => Ok(ClassType::Group),
            "segment" => Ok(ClassType::Segment),
            other => Err(format!("unknown class type '{}'", other)),
        }
    }
}

/// Template style aggregating every template of a group
pub const STYLE_SORT: &str = "sort";
/// Default template style
pub const STYLE_HIERARCHY: &str = "hierarchy";

/// A config template descriptor. Templates are not rendered here; only their
/// ordering is computed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigTemplate {
    #[serde(default)]
    pub style: String,
    #[serde(default)]
    pub sort_group: String,
    #[serde(default)]
    pub file: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub depends: Vec<String>,
    #[serde(default)]
    pub node: String,
    #[serde(default)]
    pub nodes: Vec<String>,
    #[serde(default)]
    pub neighbor_node: String,
    #[serde(default)]
    pub neighbor_nodes: Vec<String>,
    #[serde(default)]
    pub empty: bool,
    #[serde(default)]
    pub platform: Vec<String>,
    #[serde(default)]
    pub format: String,
    #[serde(default)]
    pub formats: Vec<String>,
    #[serde(default)]
    pub template: Vec<String>,
    #[serde(default)]
    pub sourcefile: String,
}

impl ConfigTemplate {
    pub fn is_sort_style(&self) -> bool {
        self.style == STYLE_SORT
    }
}

/// Member class declaration: all objects of the named classes become members
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemberClass {
    #[serde(default)]
    pub node: String,
    #[serde(default)]
    pub nodes: Vec<String>,
    #[serde(default)]
    pub interface: String,
    #[serde(default)]
    pub interfaces: Vec<String>,
    #[serde(default)]
    pub connection: String,
    #[serde(default)]
    pub connections: Vec<String>,
    #[serde(default)]
    pub include_self: bool,
    #[serde(default)]
    pub config: Vec<ConfigTemplate>,
}

impl MemberClass {
    /// The referenced class kind and class names.
    pub fn specified_classes(&self) -> Result<(ClassType, Vec<String>), String> {
        let collect = |single: &str, many: &[String]| -> Vec<String> {
            std::iter::once(single)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .chain(many.iter().cloned())
                .collect()
        };
        let candidates = [
            (ClassType::Node, collect(&self.node, &self.nodes)),
            (ClassType::Interface, collect(&self.interface, &self.interfaces)),
            (ClassType::Connection, collect(&self.connection, &self.connections)),
        ];
        let mut specified = candidates.into_iter().filter(|(_, names)| !names.is_empty());
        let first = specified
            .next()
            .ok_or_else(|| "no class specified for member class".to_string())?;
        if let Some(second) = specified.next() {
            return Err(format!(
                "{} class and {} class cannot be specified at the same time",
                first.0, second.0
            ));
        }
        Ok(first)
    }
}

/// Neighbor declaration of an interface or connection class
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NeighborClass {
    pub layer: String,
    #[serde(default)]
    pub config: Vec<ConfigTemplate>,
}

/// Platform specific attributes (emulator blobs) of a primary class
pub type PlatformAttributes = BTreeMap<String, serde_yaml::Value>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkClass {
    pub name: String,
    #[serde(default)]
    pub values: BTreeMap<String, serde_yaml::Value>,
    #[serde(default)]
    pub config: Vec<ConfigTemplate>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeClass {
    pub name: String,
    #[serde(default)]
    pub primary: bool,
    #[serde(default, rename = "virtual")]
    pub is_virtual: bool,
    #[serde(default, rename = "policy")]
    pub policies: Vec<String>,
    #[serde(default)]
    pub params: Vec<String>,
    #[serde(default)]
    pub values: BTreeMap<String, serde_yaml::Value>,
    #[serde(default)]
    pub interface_policy: Vec<String>,
    #[serde(default)]
    pub config: Vec<ConfigTemplate>,
    #[serde(default)]
    pub classmembers: Vec<MemberClass>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mgmt_interfaceclass: Option<String>,
    #[serde(default)]
    pub tinet: PlatformAttributes,
    #[serde(default)]
    pub clab: PlatformAttributes,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InterfaceClass {
    pub name: String,
    #[serde(default)]
    pub primary: bool,
    #[serde(default, rename = "virtual")]
    pub is_virtual: bool,
    #[serde(default, rename = "policy")]
    pub policies: Vec<String>,
    #[serde(default)]
    pub params: Vec<String>,
    #[serde(default)]
    pub values: BTreeMap<String, serde_yaml::Value>,
    #[serde(default)]
    pub config: Vec<ConfigTemplate>,
    #[serde(default)]
    pub neighbors: Vec<NeighborClass>,
    #[serde(default)]
    pub classmembers: Vec<MemberClass>,
    /// Layers added to the interface's connection
    #[serde(default)]
    pub layers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(default)]
    pub tinet: PlatformAttributes,
    #[serde(default)]
    pub clab: PlatformAttributes,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionClass {
    pub name: String,
    #[serde(default)]
    pub primary: bool,
    #[serde(default, rename = "virtual")]
    pub is_virtual: bool,
    #[serde(default, rename = "policy")]
    pub policies: Vec<String>,
    #[serde(default)]
    pub layers: Vec<String>,
    #[serde(default)]
    pub params: Vec<String>,
    #[serde(default)]
    pub values: BTreeMap<String, serde_yaml::Value>,
    #[serde(default)]
    pub config: Vec<ConfigTemplate>,
    #[serde(default)]
    pub neighbors: Vec<NeighborClass>,
    #[serde(default)]
    pub classmembers: Vec<MemberClass>,
    /// Naming prefix of both endpoint interfaces
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(default)]
    pub tinet: PlatformAttributes,
    #[serde(default)]
    pub clab: PlatformAttributes,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupClass {
    pub name: String,
    #[serde(default, rename = "virtual")]
    pub is_virtual: bool,
    #[serde(default)]
    pub params: Vec<String>,
    #[serde(default)]
    pub values: BTreeMap<String, serde_yaml::Value>,
    #[serde(default)]
    pub config: Vec<ConfigTemplate>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SegmentClass {
    pub name: String,
    pub layer: String,
    #[serde(default)]
    pub params: Vec<String>,
    #[serde(default)]
    pub config: Vec<ConfigTemplate>,
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid global configuration: {0}")]
    InvalidGeneral(String),
    #[error("Invalid layer configuration: {0}")]
    InvalidLayer(String),
    #[error("Invalid parameter rule: {0}")]
    InvalidRule(String),
    #[error("Invalid class definition: {0}")]
    InvalidClass(String),
    #[error("Invalid parameter name: {0}")]
    InvalidName(String),
}

/// Convert a YAML scalar to the string used as parameter value.
pub fn yaml_to_string(value: &serde_yaml::Value) -> String {
    match value {
        serde_yaml::Value::Null => String::new(),
        serde_yaml::Value::Bool(b) => b.to_string(),
        serde_yaml::Value::Number(n) => n.to_string(),
        serde_yaml::Value::String(s) => s.clone(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.validate_layers()?;
        self.validate_rules()?;
        self.validate_classes()?;
        Ok(())
    }

    fn validate_layers(&self) -> Result<(), ValidationError> {
        let mut layer_names = BTreeSet::new();
        let mut policy_names = BTreeSet::new();
        for layer in &self.layers {
            if layer.name.is_empty() {
                return Err(ValidationError::InvalidLayer("layer name cannot be empty".to_string()));
            }
            if !layer_names.insert(layer.name.as_str()) {
                return Err(ValidationError::InvalidLayer(format!(
                    "duplicated layer name {}",
                    layer.name
                )));
            }
            for policy in &layer.policies {
                if !policy_names.insert(policy.name.as_str()) {
                    return Err(ValidationError::InvalidLayer(format!(
                        "duplicated policy name {}",
                        policy.name
                    )));
                }
                let range = policy.parsed_range().map_err(|e| {
                    ValidationError::InvalidLayer(format!("policy {}: {}", policy.name, e))
                })?;
                if policy.kind == PolicyType::Ip && policy.prefix > range.max_len() {
                    return Err(ValidationError::InvalidLayer(format!(
                        "policy {}: prefix length {} exceeds address length",
                        policy.name, policy.prefix
                    )));
                }
            }
        }
        if let Some(mgmt) = &self.mgmt_layer {
            if mgmt.name.is_empty() {
                return Err(ValidationError::InvalidLayer(
                    "mgmt_layer name cannot be empty".to_string(),
                ));
            }
            let range: IpPrefix = mgmt
                .range
                .parse()
                .map_err(|e| ValidationError::InvalidLayer(format!("mgmt_layer range: {}", e)))?;
            if let Some(gateway) = &mgmt.gateway {
                let addr = parse_host(gateway)
                    .map_err(|e| ValidationError::InvalidLayer(format!("mgmt_layer gateway: {}", e)))?;
                if !range.contains_addr(&addr) {
                    return Err(ValidationError::InvalidLayer(format!(
                        "mgmt_layer gateway {} is outside of {}",
                        gateway, range
                    )));
                }
            }
        }
        Ok(())
    }

    fn validate_rules(&self) -> Result<(), ValidationError> {
        let mut names = BTreeSet::new();
        for rule in &self.param_rules {
            if !names.insert(rule.name.as_str()) {
                return Err(ValidationError::InvalidRule(format!(
                    "duplicated parameter rule {}",
                    rule.name
                )));
            }
            check_param_name(&rule.name).map_err(ValidationError::InvalidName)?;
            if rule.source.is_some() && rule.generator.is_some() {
                return Err(ValidationError::InvalidRule(format!(
                    "param_rule {} specifies both source and generator",
                    rule.name
                )));
            }
            if rule.generator.is_some() && rule.generator_parts().is_none() {
                return Err(ValidationError::InvalidRule(format!(
                    "invalid generator format {}: expected 'module.generator'",
                    rule.generator.as_deref().unwrap_or_default()
                )));
            }
            if let Some(source) = &rule.source {
                if source.kind == SourceKind::File && source.file.is_none() {
                    return Err(ValidationError::InvalidRule(format!(
                        "param_rule {}: file source requires a file",
                        rule.name
                    )));
                }
            }
            if !rule.is_attach_mode() && rule.kind == RuleType::File && rule.sourcefile.is_none() {
                return Err(ValidationError::InvalidRule(format!(
                    "param_rule {}: file rule requires sourcefile",
                    rule.name
                )));
            }
            if rule.assign == AssignMode::Segment {
                match &rule.layer {
                    None => {
                        return Err(ValidationError::InvalidRule(format!(
                            "invalid parameter rule {}: layer is required",
                            rule.name
                        )))
                    }
                    Some(layer) if self.layer(layer).is_none() => {
                        return Err(ValidationError::InvalidRule(format!(
                            "invalid parameter rule {}: layer {} not found",
                            rule.name, layer
                        )))
                    }
                    Some(_) => {}
                }
            }
        }
        Ok(())
    }

    fn validate_classes(&self) -> Result<(), ValidationError> {
        fn unique<'a>(
            kind: ClassType,
            names: impl Iterator<Item = &'a str>,
        ) -> Result<(), ValidationError> {
            let mut seen = BTreeSet::new();
            for name in names {
                if name.is_empty() {
                    return Err(ValidationError::InvalidClass(format!("{} class without name", kind)));
                }
                if !seen.insert(name) {
                    return Err(ValidationError::InvalidClass(format!(
                        "duplicated {} class {}",
                        kind, name
                    )));
                }
            }
            Ok(())
        }
        unique(ClassType::Network, self.network_classes.iter().map(|c| c.name.as_str()))?;
        unique(ClassType::Node, self.node_classes.iter().map(|c| c.name.as_str()))?;
        unique(ClassType::Interface, self.interface_classes.iter().map(|c| c.name.as_str()))?;
        unique(ClassType::Connection, self.connection_classes.iter().map(|c| c.name.as_str()))?;
        unique(ClassType::Group, self.group_classes.iter().map(|c| c.name.as_str()))?;
        unique(ClassType::Segment, self.segment_classes.iter().map(|c| c.name.as_str()))?;

        let value_maps = self
            .network_classes
            .iter()
            .map(|c| &c.values)
            .chain(self.node_classes.iter().map(|c| &c.values))
            .chain(self.interface_classes.iter().map(|c| &c.values))
            .chain(self.connection_classes.iter().map(|c| &c.values))
            .chain(self.group_classes.iter().map(|c| &c.values));
        for values in value_maps {
            for key in values.keys() {
                check_param_name(key).map_err(ValidationError::InvalidName)?;
            }
        }

        let member_classes = self
            .node_classes
            .iter()
            .map(|c| (c.name.as_str(), &c.classmembers))
            .chain(self.interface_classes.iter().map(|c| (c.name.as_str(), &c.classmembers)))
            .chain(self.connection_classes.iter().map(|c| (c.name.as_str(), &c.classmembers)));
        for (class, members) in member_classes {
            for member in members {
                member.specified_classes().map_err(|e| {
                    ValidationError::InvalidClass(format!("class {}: {}", class, e))
                })?;
            }
        }

        for class in &self.segment_classes {
            if self.layer(&class.layer).is_none() {
                return Err(ValidationError::InvalidClass(format!(
                    "segment class {}: layer {} not found",
                    class.name, class.layer
                )));
            }
        }

        for template in self.all_templates() {
            if !template.style.is_empty()
                && template.style != STYLE_SORT
                && template.style != STYLE_HIERARCHY
            {
                return Err(ValidationError::InvalidClass(format!(
                    "unknown config template style {}",
                    template.style
                )));
            }
            if template.is_sort_style() && template.sort_group.is_empty() {
                return Err(ValidationError::InvalidClass(format!(
                    "config template {} of style sort requires sort_group",
                    template.name
                )));
            }
        }
        Ok(())
    }

    fn all_templates(&self) -> impl Iterator<Item = &ConfigTemplate> {
        self.network_classes
            .iter()
            .flat_map(|c| c.config.iter())
            .chain(self.node_classes.iter().flat_map(|c| c.config.iter()))
            .chain(self.interface_classes.iter().flat_map(|c| c.config.iter()))
            .chain(self.connection_classes.iter().flat_map(|c| c.config.iter()))
            .chain(self.group_classes.iter().flat_map(|c| c.config.iter()))
            .chain(self.segment_classes.iter().flat_map(|c| c.config.iter()))
    }

    pub fn node_class(&self, name: &str) -> Option<&NodeClass> {
        self.node_classes.iter().find(|c| c.name == name)
    }

    pub fn interface_class(&self, name: &str) -> Option<&InterfaceClass> {
        self.interface_classes.iter().find(|c| c.name == name)
    }

    pub fn connection_class(&self, name: &str) -> Option<&ConnectionClass> {
        self.connection_classes.iter().find(|c| c.name == name)
    }

    pub fn group_class(&self, name: &str) -> Option<&GroupClass> {
        self.group_classes.iter().find(|c| c.name == name)
    }

    pub fn segment_class(&self, name: &str) -> Option<&SegmentClass> {
        self.segment_classes.iter().find(|c| c.name == name)
    }

    pub fn network_class(&self, name: &str) -> Option<&NetworkClass> {
        self.network_classes.iter().find(|c| c.name == name)
    }

    /// Whether a class of the given kind and name is defined
    pub fn has_class(&self, kind: ClassType, name: &str) -> bool {
        match kind {
            ClassType::Network => self.network_class(name).is_some(),
            ClassType::Node => self.node_class(name).is_some(),
            ClassType::Interface => self.interface_class(name).is_some(),
            ClassType::Connection => self.connection_class(name).is_some(),
            ClassType::Group => self.group_class(name).is_some(),
            ClassType::Segment => self.segment_class(name).is_some(),
        }
    }

    /// Config templates of a class
    pub fn class_templates(&self, kind: ClassType, name: &str) -> &[ConfigTemplate] {
        let templates = match kind {
            ClassType::Network => self.network_class(name).map(|c| c.config.as_slice()),
            ClassType::Node => self.node_class(name).map(|c| c.config.as_slice()),
            ClassType::Interface => self.interface_class(name).map(|c| c.config.as_slice()),
            ClassType::Connection => self.connection_class(name).map(|c| c.config.as_slice()),
            ClassType::Group => self.group_class(name).map(|c| c.config.as_slice()),
            ClassType::Segment => self.segment_class(name).map(|c| c.config.as_slice()),
        };
        templates.unwrap_or(&[])
    }

    pub fn layer(&self, name: &str) -> Option<&Layer> {
        self.layers.iter().find(|l| l.name == name)
    }

    /// Find an IP policy by name, with the layer it belongs to
    pub fn policy(&self, name: &str) -> Option<(&Layer, &IpPolicy)> {
        self.layers
            .iter()
            .find_map(|l| l.policies.iter().find(|p| p.name == name).map(|p| (l, p)))
    }

    pub fn param_rule(&self, name: &str) -> Option<&ParameterRule> {
        self.param_rules.iter().find(|r| r.name == name)
    }

    /// Layers every connection participates in
    pub fn default_connect_layers(&self) -> impl Iterator<Item = &str> {
        self.layers
            .iter()
            .filter(|l| l.default_connect)
            .map(|l| l.name.as_str())
    }

    /// Resolve a path from the configuration according to `global.path`
    pub fn resolve_path(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            return path.to_path_buf();
        }
        match (self.global.path, &self.base_dir) {
            (PathMode::Local, Some(base)) => base.join(path),
            _ => path.to_path_buf(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
name: testnet
module: [containerlab]
global:
  path: local
  nodeautoname: false
file:
  - name: frr.conf
    path: /etc/frr/frr.conf
layer:
  - name: ip
    default_connect: true
    policy:
      - name: p2p
        range: 10.0.0.0/16
        prefix: 30
      - name: lo
        type: loopback
        range: 10.255.0.0/24
mgmt_layer:
  name: mgmt
  range: 172.20.0.0/24
param_rule:
  - name: vlan_id
    min: 100
    max: 200
  - name: seg_id
    assign: segment
    layer: ip
  - name: users
    source:
      type: range
      start: 1
      end: 3
nodeclass:
  - name: router
    primary: true
    prefix: r
    policy: [lo]
    interface_policy: [p2p]
    params: [vlan_id]
    values:
      asn: 65000
    clab:
      kind: linux
interfaceclass:
  - name: trunk
    neighbors:
      - layer: ip
connectionclass:
  - name: wan
    layers: [ip]
    virtual: true
segmentclass:
  - name: lan
    layer: ip
"#;

    #[test]
    fn test_config_parsing() {
        let config: Config = serde_yaml::from_str(SAMPLE).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.name, "testnet");
        assert_eq!(config.global.path, PathMode::Local);
        assert_eq!(config.modules, vec!["containerlab"]);

        let (layer, policy) = config.policy("lo").unwrap();
        assert_eq!(layer.name, "ip");
        assert_eq!(policy.kind, PolicyType::Loopback);
        assert_eq!(layer.ip_policies().count(), 1);

        let router = config.node_class("router").unwrap();
        assert!(router.primary);
        assert_eq!(yaml_to_string(&router.values["asn"]), "65000");
        assert!(config.connection_class("wan").unwrap().is_virtual);
        assert_eq!(config.param_rule("seg_id").unwrap().assign, AssignMode::Segment);
        assert!(config.param_rule("users").unwrap().is_attach_mode());
        assert!(!config.param_rule("vlan_id").unwrap().is_attach_mode());
        assert_eq!(config.default_connect_layers().collect::<Vec<_>>(), vec!["ip"]);
    }

    #[test]
    fn test_reserved_rule_name_rejected() {
        let config: Config = serde_yaml::from_str("param_rule:\n  - name: node_id\n").unwrap();
        match config.validate() {
            Err(ValidationError::InvalidName(msg)) => assert!(msg.contains("node_")),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_segment_rule_requires_layer() {
        let config: Config =
            serde_yaml::from_str("param_rule:\n  - name: seg\n    assign: segment\n").unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("layer is required"));
    }

    #[test]
    fn test_duplicate_policy_rejected() {
        let yaml = r#"
layer:
  - name: a
    policy: [{name: p, range: 10.0.0.0/8, prefix: 24}]
  - name: b
    policy: [{name: p, range: 10.0.0.0/8, prefix: 24}]
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(matches!(config.validate(), Err(ValidationError::InvalidLayer(_))));
    }

    #[test]
    fn test_member_class_kinds() {
        let member = MemberClass {
            node: "router".to_string(),
            ..Default::default()
        };
        assert_eq!(
            member.specified_classes().unwrap(),
            (ClassType::Node, vec!["router".to_string()])
        );

        let mixed = MemberClass {
            nodes: vec!["a".to_string()],
            interface: "b".to_string(),
            ..Default::default()
        };
        assert!(mixed.specified_classes().unwrap_err().contains("same time"));
        assert!(MemberClass::default().specified_classes().is_err());
    }

    #[test]
    fn test_generator_parts() {
        let rule = ParameterRule {
            name: "mounts".to_string(),
            generator: Some("clab.filemounts".to_string()),
            ..Default::default()
        };
        assert_eq!(rule.generator_parts(), Some(("clab", "filemounts")));
        let bad = ParameterRule {
            name: "bad".to_string(),
            generator: Some("filemounts".to_string()),
            ..Default::default()
        };
        assert!(bad.generator_parts().is_none());
    }

    #[test]
    fn test_resolve_path() {
        let mut config = Config::default();
        config.base_dir = Some(PathBuf::from("/etc/net"));
        assert_eq!(config.resolve_path("a.txt"), PathBuf::from("a.txt"));
        config.global.path = PathMode::Local;
        assert_eq!(config.resolve_path("a.txt"), PathBuf::from("/etc/net/a.txt"));
        assert_eq!(config.resolve_path("/tmp/a.txt"), PathBuf::from("/tmp/a.txt"));
    }
}
