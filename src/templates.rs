//! Config template selection.
//!
//! Templates of one object kind are ordered together across every class of
//! that kind, so that a dependency on a template of another class resolves.
//! Each object then lists the templates of its own classes in that order.
//! Neighbors and members take the templates of the declaration that produced
//! them.

use log::debug;
use std::collections::BTreeMap;

use crate::config::{ClassType, Config, ConfigTemplate};
use crate::dependency::{order_config_templates, template_label};
use crate::error::CompileError;
use crate::model::{NetworkModel, ScopeId};

/// Ordered template labels per owning class, for one class kind
type KindOrder = Vec<(String, String)>;

fn class_configs(config: &Config, kind: ClassType) -> Vec<(&str, &[ConfigTemplate])> {
    match kind {
        ClassType::Network => config
            .network_classes
            .iter()
            .map(|c| (c.name.as_str(), c.config.as_slice()))
            .collect(),
        ClassType::Node => config
            .node_classes
            .iter()
            .map(|c| (c.name.as_str(), c.config.as_slice()))
            .collect(),
        ClassType::Interface => config
            .interface_classes
            .iter()
            .map(|c| (c.name.as_str(), c.config.as_slice()))
            .collect(),
        ClassType::Connection => config
            .connection_classes
            .iter()
            .map(|c| (c.name.as_str(), c.config.as_slice()))
            .collect(),
        ClassType::Group => config
            .group_classes
            .iter()
            .map(|c| (c.name.as_str(), c.config.as_slice()))
            .collect(),
        ClassType::Segment => config
            .segment_classes
            .iter()
            .map(|c| (c.name.as_str(), c.config.as_slice()))
            .collect(),
    }
}

fn order_kind(config: &Config, kind: ClassType) -> Result<KindOrder, CompileError> {
    let mut owners = Vec::new();
    let mut templates = Vec::new();
    for (class, configs) in class_configs(config, kind) {
        for template in configs {
            owners.push(class.to_string());
            templates.push(template.clone());
        }
    }
    let order = order_config_templates(&templates)?;
    Ok(order
        .into_iter()
        .map(|i| (owners[i].clone(), template_label(&templates[i], i)))
        .collect())
}

fn ordered_labels(templates: &[ConfigTemplate]) -> Result<Vec<String>, CompileError> {
    Ok(order_config_templates(templates)?
        .into_iter()
        .map(|i| template_label(&templates[i], i))
        .collect())
}

/// Config template labels of every scope object, in dependency order.
pub struct TemplateIndex {
    by_kind: BTreeMap<ClassType, KindOrder>,
}

impl TemplateIndex {
    pub fn build(config: &Config) -> Result<Self, CompileError> {
        let mut by_kind = BTreeMap::new();
        for kind in [
            ClassType::Network,
            ClassType::Node,
            ClassType::Interface,
            ClassType::Connection,
            ClassType::Group,
            ClassType::Segment,
        ] {
            let order = order_kind(config, kind)?;
            debug!("Ordered {} {} config templates", order.len(), kind);
            by_kind.insert(kind, order);
        }
        Ok(TemplateIndex { by_kind })
    }

    fn class_labels(&self, kind: ClassType, classes: &[String]) -> Vec<String> {
        self.by_kind
            .get(&kind)
            .map(|order| {
                order
                    .iter()
                    .filter(|(class, _)| classes.contains(class))
                    .map(|(_, label)| label.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Template labels of one scope object
    pub fn templates(
        &self,
        model: &NetworkModel,
        config: &Config,
        scope: ScopeId,
    ) -> Result<Vec<String>, CompileError> {
        let kind = match scope {
            ScopeId::Network => ClassType::Network,
            ScopeId::Node(_) => ClassType::Node,
            ScopeId::Interface(_) => ClassType::Interface,
            ScopeId::Connection(_) => ClassType::Connection,
            ScopeId::Group(_) => ClassType::Group,
            ScopeId::Segment(_) => ClassType::Segment,
            ScopeId::Neighbor(_) => return ordered_labels(&neighbor_templates(model, config, scope)),
            ScopeId::Member(_) => return ordered_labels(&member_templates(model, scope)),
        };
        Ok(self.class_labels(kind, model.classes(scope)))
    }
}

fn neighbor_templates(model: &NetworkModel, config: &Config, scope: ScopeId) -> Vec<ConfigTemplate> {
    let ScopeId::Neighbor(id) = scope else {
        return Vec::new();
    };
    let neighbor = model.neighbor(id);
    let iface = model.interface(neighbor.self_iface);
    let mut templates = Vec::new();
    for class in &iface.classes {
        if let Some(class) = config.interface_class(class) {
            for declared in class.neighbors.iter().filter(|n| n.layer == neighbor.layer) {
                templates.extend(declared.config.iter().cloned());
            }
        }
    }
    if let Some(conn) = iface.connection {
        for class in &model.connection(conn).classes {
            if let Some(class) = config.connection_class(class) {
                for declared in class.neighbors.iter().filter(|n| n.layer == neighbor.layer) {
                    templates.extend(declared.config.iter().cloned());
                }
            }
        }
    }
    templates
}

fn member_templates(model: &NetworkModel, scope: ScopeId) -> Vec<ConfigTemplate> {
    let ScopeId::Member(id) = scope else {
        return Vec::new();
    };
    let member = model.member(id);
    let declarations = match member.referrer {
        ScopeId::Node(id) => &model.node(id).member_classes,
        ScopeId::Interface(id) => &model.interface(id).member_classes,
        ScopeId::Connection(id) => &model.connection(id).member_classes,
        _ => return Vec::new(),
    };
    declarations
        .iter()
        .filter(|(_, declared)| {
            declared
                .specified_classes()
                .map(|(kind, classes)| kind == member.class_type && classes.contains(&member.class_name))
                .unwrap_or(false)
        })
        .flat_map(|(_, declared)| declared.config.iter().cloned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NodeClass;
    use crate::model::Node;

    fn template(name: &str, depends: &[&str]) -> ConfigTemplate {
        ConfigTemplate {
            name: name.to_string(),
            depends: depends.iter().map(|d| d.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_cross_class_dependency_order() {
        let config = Config {
            node_classes: vec![
                NodeClass {
                    name: "extra".to_string(),
                    config: vec![template("frr", &["startup"])],
                    ..Default::default()
                },
                NodeClass {
                    name: "router".to_string(),
                    primary: true,
                    config: vec![template("startup", &[])],
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        let mut model = NetworkModel::default();
        let both = model.add_node(Node {
            name: "r1".to_string(),
            classes: vec!["extra".to_string(), "router".to_string()],
            ..Default::default()
        });
        let only_router = model.add_node(Node {
            name: "r2".to_string(),
            classes: vec!["router".to_string()],
            ..Default::default()
        });

        let index = TemplateIndex::build(&config).unwrap();
        assert_eq!(
            index.templates(&model, &config, ScopeId::Node(both)).unwrap(),
            vec!["startup".to_string(), "frr".to_string()]
        );
        assert_eq!(
            index.templates(&model, &config, ScopeId::Node(only_router)).unwrap(),
            vec!["startup".to_string()]
        );
        assert!(index.templates(&model, &config, ScopeId::Network).unwrap().is_empty());
    }

    #[test]
    fn test_unresolved_template_dependency() {
        let config = Config {
            node_classes: vec![NodeClass {
                name: "router".to_string(),
                config: vec![template("frr", &["missing"])],
                ..Default::default()
            }],
            ..Default::default()
        };
        let err = TemplateIndex::build(&config).err().unwrap();
        assert!(matches!(err, CompileError::UnresolvedDependency { .. }));
    }
}
