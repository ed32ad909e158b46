//! Compilation orchestrator.
//!
//! This module coordinates the whole compilation, managing the flow from the
//! loaded configuration and topology graph through class resolution, address
//! and parameter assignment to the namespace-ordered output document.

use log::{debug, info};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::config::Config;
use crate::error::CompileError;
use crate::ip::{assign_addresses, search_segments};
use crate::model::{NetworkModel, ScopeId, ValueId};
use crate::modules::{load_modules, Module};
use crate::namespace::build_namespaces;
use crate::params::{assign_parameters, GeneratorRegistry};
use crate::resolve::{resolve, ExtraClasses};
use crate::templates::TemplateIndex;
use crate::topology::Graph;

/// A Value record attached to an object
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CompiledValue {
    pub rule: String,
    pub index: usize,
    pub params: BTreeMap<String, String>,
}

/// The resolved view of one scope object
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CompiledObject {
    pub kind: String,
    pub name: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub classes: Vec<String>,
    /// Relative parameters
    pub params: BTreeMap<String, String>,
    /// Config template labels in dependency order
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub templates: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<CompiledValue>,
}

/// Output document of a compilation
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CompiledNetwork {
    pub name: String,
    pub modules: Vec<String>,
    /// Scope objects in namespace order
    pub objects: Vec<CompiledObject>,
}

impl CompiledNetwork {
    /// Find an object by kind and name (`r1`, `r1.eth0`, ...)
    pub fn object(&self, kind: &str, name: &str) -> Option<&CompiledObject> {
        self.objects.iter().find(|o| o.kind == kind && o.name == name)
    }

    /// Relative parameter of an object
    pub fn param(&self, kind: &str, name: &str, key: &str) -> Option<&str> {
        self.object(kind, name)?.params.get(key).map(String::as_str)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}

/// A configuration prepared for compiling topologies: modules loaded, module
/// classes merged and generator references checked.
#[derive(Debug, Clone)]
pub struct Compiler {
    config: Config,
    modules: Vec<Module>,
    generators: GeneratorRegistry,
    extra: ExtraClasses,
}

impl Compiler {
    pub fn new(config: &Config) -> Result<Self, CompileError> {
        let modules = load_modules(config)?;

        let mut config = config.clone();
        let mut extra = ExtraClasses::default();
        let mut generators = GeneratorRegistry::new();
        for module in &modules {
            module.update_config(&mut config);
            module.extra_classes(&mut extra);
            module.register_generators(&mut generators);
        }
        generators.resolve_rules(&config)?;
        debug!(
            "Registered generators: {}",
            generators.names().collect::<Vec<_>>().join(", ")
        );

        Ok(Compiler {
            config,
            modules,
            generators,
            extra,
        })
    }

    /// Configuration with module classes merged in
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    /// Run every stage on a topology and return the resolved model with its
    /// namespace order.
    pub fn build_model(&self, graph: &Graph) -> Result<(NetworkModel, Vec<ScopeId>), CompileError> {
        let config = &self.config;

        info!("Building network model");
        let mut model = NetworkModel::from_graph(graph, config)?;

        info!("Resolving classes");
        resolve(&mut model, config, &self.extra)?;

        info!("Searching network segments");
        search_segments(&mut model, config)?;

        info!("Assigning addresses");
        assign_addresses(&mut model, config)?;

        info!("Assigning parameters");
        assign_parameters(&mut model, config, &self.generators)?;
        for module in &self.modules {
            module.generate_parameters(&mut model, config);
        }

        info!("Building namespaces");
        let order = build_namespaces(&mut model)?;

        for module in &self.modules {
            module.check_requirements(&model, config)?;
        }

        Ok((model, order))
    }

    /// Compile a topology into the output document.
    pub fn compile(&self, graph: &Graph) -> Result<CompiledNetwork, CompileError> {
        let (model, order) = self.build_model(graph)?;
        let templates = TemplateIndex::build(&self.config)?;

        let mut values_by_owner: BTreeMap<ScopeId, Vec<ValueId>> = BTreeMap::new();
        for (index, value) in model.values.iter().enumerate() {
            values_by_owner.entry(value.owner).or_default().push(ValueId(index));
        }

        let mut objects = Vec::with_capacity(order.len());
        for scope in order {
            let name = match scope {
                ScopeId::Network => self.config.name.clone(),
                other => model.sort_key(other),
            };
            let values = values_by_owner
                .get(&scope)
                .map(|ids| {
                    ids.iter()
                        .map(|id| {
                            let value = model.value(*id);
                            CompiledValue {
                                rule: value.rule.clone(),
                                index: value.index,
                                params: value.ns.relative().clone(),
                            }
                        })
                        .collect()
                })
                .unwrap_or_default();
            objects.push(CompiledObject {
                kind: scope.kind().to_string(),
                name,
                classes: model.classes(scope).to_vec(),
                params: model.namespace(scope).relative().clone(),
                templates: templates.templates(&model, &self.config, scope)?,
                values,
            });
        }

        info!(
            "Compiled network '{}': {} objects ({} nodes, {} interfaces, {} connections, {} segments)",
            self.config.name,
            objects.len(),
            model.nodes.len(),
            model.interfaces.len(),
            model.connections.len(),
            model.segments.len()
        );

        Ok(CompiledNetwork {
            name: self.config.name.clone(),
            modules: self.modules.iter().map(|m| m.name().to_string()).collect(),
            objects,
        })
    }
}

/// Compile a topology graph with a configuration.
pub fn compile(config: &Config, graph: &Graph) -> Result<CompiledNetwork, CompileError> {
    Compiler::new(config)?.compile(graph)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        serde_yaml::from_str(
            r#"
name: lab
layer:
  - name: ip
    default_connect: true
    policy:
      - name: p2p
        range: 10.0.0.0/24
        prefix: 30
nodeclass:
  - name: router
    primary: true
    config:
      - name: startup
interfaceclass:
  - name: p2p
    primary: true
    policy: [p2p]
"#,
        )
        .unwrap()
    }

    fn graph() -> Graph {
        serde_yaml::from_str(
            r#"
nodes:
  - name: r1
    labels: [router]
  - name: r2
    labels: [router]
edges:
  - src: r1
    dst: r2
    src_labels: [p2p]
    dst_labels: [p2p]
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_compile_two_routers() {
        let network = compile(&config(), &graph()).unwrap();
        assert_eq!(network.name, "lab");
        assert_eq!(network.modules, vec!["builtin".to_string()]);
        assert_eq!(network.param("network", "lab", "name"), Some("lab"));

        // The network depends on every node, so it comes after them
        let position = |kind: &str| network.objects.iter().position(|o| o.kind == kind).unwrap();
        assert!(position("node") < position("network"));

        let r1 = network.object("node", "r1").unwrap();
        assert_eq!(r1.templates, vec!["startup".to_string()]);

        let a = network.param("interface", "r1.net0", "ip_addr").unwrap();
        let b = network.param("interface", "r2.net0", "ip_addr").unwrap();
        assert_ne!(a, b);
        assert!(a.starts_with("10.0.0."));
        assert_eq!(network.param("interface", "r1.net0", "opp_ip_addr"), Some(b));
    }

    #[test]
    fn test_output_formats() {
        let network = compile(&config(), &graph()).unwrap();
        let json = network.to_json().unwrap();
        assert!(json.contains("\"kind\": \"node\""));
        let yaml = network.to_yaml().unwrap();
        assert!(yaml.contains("name: lab"));
    }

    #[test]
    fn test_unknown_module() {
        let mut config = config();
        config.modules.push("ns3".to_string());
        let err = Compiler::new(&config).unwrap_err();
        assert!(matches!(err, CompileError::UnknownModule { .. }));
    }
}
