//! Built-in modules.
//!
//! A module extends the compilation with classes, class labels added to every
//! object of a kind, value generators, module parameters and requirement
//! checks. The set of modules is closed; configurations select them by name.

use log::{debug, info};
use std::path::Path;
use std::str::FromStr;

use crate::config::{Config, ConfigTemplate, NodeClass};
use crate::error::CompileError;
use crate::model::{NetworkModel, ScopeId};
use crate::params::{GeneratorContext, GeneratorRegistry, Row};
use crate::resolve::ExtraClasses;

/// Node class added to every node by the containerlab module
pub const CLAB_NODE_CLASS: &str = "_clabNode";
pub const CLAB_NETWORK_NAME_PARAM: &str = "_clab_networkName";
pub const CLAB_ENDPOINTS_PARAM: &str = "_clab_link_endpoints";
pub const CLAB_BIND_MOUNTS_PARAM: &str = "_clab_bindMounts";
pub const CLAB_IMAGE_PARAM: &str = "image";
pub const CLAB_KIND_PARAM: &str = "kind";
/// Node config template every containerlab network needs
pub const STARTUP_TEMPLATE: &str = "startup";

const ENDPOINT_SEPARATOR: &str = "\n  - endpoints: ";
const MOUNT_SEPARATOR: &str = "\n      - ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Module {
    Builtin,
    Containerlab,
}

impl FromStr for Module {
    type Err = CompileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "builtin" => Ok(Module::Builtin),
            "containerlab" | "clab" => Ok(Module::Containerlab),
            other => Err(CompileError::UnknownModule {
                name: other.to_string(),
            }),
        }
    }
}

impl Module {
    pub fn name(&self) -> &'static str {
        match self {
            Module::Builtin => "builtin",
            Module::Containerlab => "containerlab",
        }
    }

    /// Add the module's classes to the configuration.
    pub fn update_config(&self, config: &mut Config) {
        match self {
            Module::Builtin => {}
            Module::Containerlab => {
                if config.node_class(CLAB_NODE_CLASS).is_some() {
                    return;
                }
                config.node_classes.push(NodeClass {
                    name: CLAB_NODE_CLASS.to_string(),
                    config: vec![
                        ConfigTemplate {
                            name: "clab_cmds".to_string(),
                            depends: vec![STARTUP_TEMPLATE.to_string()],
                            ..Default::default()
                        },
                        ConfigTemplate {
                            name: "clab_topo".to_string(),
                            depends: vec!["clab_cmds".to_string()],
                            ..Default::default()
                        },
                    ],
                    ..Default::default()
                });
            }
        }
    }

    /// Class labels the module adds to every object of a kind
    pub fn extra_classes(&self, extra: &mut ExtraClasses) {
        if let Module::Containerlab = self {
            extra.node.push(CLAB_NODE_CLASS.to_string());
        }
    }

    pub fn register_generators(&self, registry: &mut GeneratorRegistry) {
        if let Module::Containerlab = self {
            registry.register("clab.filemounts", clab_file_mounts);
        }
    }

    /// Set module parameters after all rules are assigned.
    pub fn generate_parameters(&self, model: &mut NetworkModel, config: &Config) {
        match self {
            Module::Builtin => {}
            Module::Containerlab => clab_parameters(model, config),
        }
    }

    /// Check what the module needs from the configuration and the model.
    pub fn check_requirements(
        &self,
        model: &NetworkModel,
        config: &Config,
    ) -> Result<(), CompileError> {
        match self {
            Module::Builtin => Ok(()),
            Module::Containerlab => clab_requirements(model, config),
        }
    }
}

/// The builtin module followed by the configured modules, without repeats.
pub fn load_modules(config: &Config) -> Result<Vec<Module>, CompileError> {
    let mut modules = vec![Module::Builtin];
    for name in &config.modules {
        let module: Module = name.parse()?;
        if !modules.contains(&module) {
            modules.push(module);
        }
    }
    info!(
        "Loaded modules: {}",
        modules.iter().map(Module::name).collect::<Vec<_>>().join(", ")
    );
    Ok(modules)
}

fn mount_source(config: &Config, node: &str, file: &str) -> String {
    let relative = Path::new(node).join(file);
    let source = match &config.global.mountsourcepath {
        Some(base) if !base.is_empty() => Path::new(base).join(relative),
        _ => relative,
    };
    source.to_string_lossy().into_owned()
}

/// One row `{source, target}` per file definition with a mount path
fn clab_file_mounts(ctx: &GeneratorContext<'_>, owner: ScopeId) -> Result<Vec<Row>, CompileError> {
    let ScopeId::Node(node) = owner else {
        return Err(CompileError::Generator {
            name: "clab.filemounts".to_string(),
            reason: format!("{} is not a node", ctx.model.describe(owner)),
        });
    };
    let name = &ctx.model.node(node).name;
    Ok(ctx
        .config
        .files
        .iter()
        .filter_map(|file| {
            let target = file.path.as_deref().filter(|p| !p.is_empty())?;
            let mut row = Row::new();
            row.insert("source".to_string(), mount_source(ctx.config, name, &file.name));
            row.insert("target".to_string(), target.to_string());
            Some(row)
        })
        .collect())
}

fn clab_parameters(model: &mut NetworkModel, config: &Config) {
    model.ns.add_param(CLAB_NETWORK_NAME_PARAM, config.name.clone());

    let endpoints: Vec<String> = model
        .connections
        .iter()
        .filter(|c| {
            let src = model.interface(c.src);
            let dst = model.interface(c.dst);
            !model.node(src.node).is_virtual && !model.node(dst.node).is_virtual
        })
        .map(|c| {
            let src = model.interface(c.src);
            let dst = model.interface(c.dst);
            format!(
                "[{}:{}, {}:{}]",
                model.node(src.node).name,
                src.name,
                model.node(dst.node).name,
                dst.name
            )
        })
        .collect();
    model.ns.add_param(
        CLAB_ENDPOINTS_PARAM,
        format!("  - endpoints: {}\n", endpoints.join(ENDPOINT_SEPARATOR)),
    );

    for node in model.nodes.iter_mut().filter(|n| !n.is_virtual) {
        let mounts: Vec<String> = config
            .files
            .iter()
            .filter_map(|file| {
                let target = file.path.as_deref().filter(|p| !p.is_empty())?;
                Some(format!("{}:{}", mount_source(config, &node.name, &file.name), target))
            })
            .collect();
        node.ns.add_param(
            CLAB_BIND_MOUNTS_PARAM,
            format!("      - {}\n", mounts.join(MOUNT_SEPARATOR)),
        );
    }
    debug!("Generated containerlab parameters for {} links", endpoints.len());
}

fn clab_requirements(model: &NetworkModel, config: &Config) -> Result<(), CompileError> {
    let requirement = |reason: String| CompileError::ModuleRequirement {
        module: Module::Containerlab.name().to_string(),
        reason,
    };
    let has_startup = config
        .node_classes
        .iter()
        .flat_map(|c| c.config.iter())
        .any(|t| t.name == STARTUP_TEMPLATE);
    if !has_startup {
        return Err(requirement(format!(
            "node config template named {} is required",
            STARTUP_TEMPLATE
        )));
    }

    for node in model.nodes.iter().filter(|n| !n.is_virtual) {
        for param in [CLAB_IMAGE_PARAM, CLAB_KIND_PARAM] {
            if !node.ns.relative().contains_key(param) {
                return Err(requirement(format!(
                    "every (non-virtual) node must have {} parameter (none for {})",
                    param, node.name
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Connection, Interface, Node, NodeId};
    use crate::topology::labels::ParsedLabels;

    const CONFIG: &str = r#"
name: lab
module: [clab]
file:
  - name: frr.conf
    path: /etc/frr/frr.conf
  - name: notes.txt
nodeclass:
  - name: router
    config:
      - name: startup
"#;

    fn model() -> NetworkModel {
        let mut model = NetworkModel::default();
        for (name, is_virtual) in [("r1", false), ("r2", false), ("sw", true)] {
            model.add_node(Node {
                name: name.to_string(),
                is_virtual,
                ..Default::default()
            });
        }
        let link = |model: &mut NetworkModel, a: usize, b: usize| {
            let src = model.add_interface(Interface::new(NodeId(a), "eth0".to_string(), ParsedLabels::default()));
            let dst = model.add_interface(Interface::new(NodeId(b), format!("eth{}", a), ParsedLabels::default()));
            model.add_connection(Connection::new(src, dst, ParsedLabels::default()));
        };
        link(&mut model, 0, 1);
        link(&mut model, 2, 1);
        model
    }

    #[test]
    fn test_load_modules() {
        let config: Config = serde_yaml::from_str(CONFIG).unwrap();
        let modules = load_modules(&config).unwrap();
        assert_eq!(modules, vec![Module::Builtin, Module::Containerlab]);

        let bad: Config = serde_yaml::from_str("module: [tinet]").unwrap();
        assert_eq!(load_modules(&bad).unwrap_err().to_string(), "unknown module tinet");
    }

    #[test]
    fn test_update_config_adds_node_class() {
        let mut config: Config = serde_yaml::from_str(CONFIG).unwrap();
        Module::Containerlab.update_config(&mut config);
        Module::Containerlab.update_config(&mut config);
        assert_eq!(config.node_classes.len(), 2);
        let class = config.node_class(CLAB_NODE_CLASS).unwrap();
        assert_eq!(class.config[0].depends, vec!["startup"]);

        let mut extra = ExtraClasses::default();
        Module::Containerlab.extra_classes(&mut extra);
        assert_eq!(extra.node, vec![CLAB_NODE_CLASS]);
    }

    #[test]
    fn test_clab_parameters() {
        let config: Config = serde_yaml::from_str(CONFIG).unwrap();
        let mut model = model();
        Module::Containerlab.generate_parameters(&mut model, &config);
        assert_eq!(model.ns.param(CLAB_NETWORK_NAME_PARAM), Some("lab"));
        assert_eq!(
            model.ns.param(CLAB_ENDPOINTS_PARAM),
            Some("  - endpoints: [r1:eth0, r2:eth0]\n")
        );
        assert_eq!(
            model.nodes[0].ns.param(CLAB_BIND_MOUNTS_PARAM),
            Some("      - r1/frr.conf:/etc/frr/frr.conf\n")
        );
        assert_eq!(model.nodes[2].ns.param(CLAB_BIND_MOUNTS_PARAM), None);
    }

    #[test]
    fn test_file_mounts_generator() {
        let config: Config = serde_yaml::from_str(CONFIG).unwrap();
        let model = model();
        let mut registry = GeneratorRegistry::new();
        Module::Containerlab.register_generators(&mut registry);
        let ctx = GeneratorContext {
            config: &config,
            model: &model,
        };
        let rows = registry
            .generate("clab.filemounts", &ctx, ScopeId::Node(NodeId(1)))
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["source"], "r2/frr.conf");
        assert_eq!(rows[0]["target"], "/etc/frr/frr.conf");
        assert!(registry.generate("clab.filemounts", &ctx, ScopeId::Network).is_err());
    }

    #[test]
    fn test_requirements() {
        let config: Config = serde_yaml::from_str(CONFIG).unwrap();
        let mut model = model();
        let err = Module::Containerlab
            .check_requirements(&model, &config)
            .unwrap_err();
        assert!(err.to_string().contains("image parameter (none for r1)"));

        for node in &mut model.nodes {
            let mut relative = std::collections::BTreeMap::new();
            relative.insert("image".to_string(), "frr".to_string());
            relative.insert("kind".to_string(), "linux".to_string());
            node.ns.replace_relative(relative);
        }
        assert!(Module::Containerlab.check_requirements(&model, &config).is_ok());

        let no_startup: Config = serde_yaml::from_str("module: [clab]").unwrap();
        let err = Module::Containerlab
            .check_requirements(&model, &no_startup)
            .unwrap_err();
        assert_eq!(err.category(), "input");
    }
}
