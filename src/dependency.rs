//! Deterministic topological sorting.
//!
//! [`DependencyGraph`] sorts any set of [`DependencyNode`] items. Ids are
//! visited in sorted order and every dependency list is sorted before it is
//! traversed, so the output depends only on the content of the graph. Two
//! adapters use it: config template ordering and namespace build ordering.

use log::debug;
use std::collections::{BTreeMap, BTreeSet};

use crate::config::ConfigTemplate;
use crate::error::CompileError;
use crate::model::{NetworkModel, ScopeId};

/// An item of a dependency graph
pub trait DependencyNode {
    type Item;

    /// Unique id of the item in its graph
    fn id(&self) -> String;

    /// Ids this item depends on
    fn dependencies(&self) -> Result<Vec<String>, CompileError>;

    fn item(&self) -> Self::Item;
}

pub struct DependencyGraph<N: DependencyNode> {
    nodes: BTreeMap<String, N>,
}

/// Traversal state of one sort
struct Visit<T> {
    permanent: BTreeSet<String>,
    temporary: BTreeSet<String>,
    path: Vec<String>,
    sorted: Vec<T>,
}

impl<N: DependencyNode> Default for DependencyGraph<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N: DependencyNode> DependencyGraph<N> {
    pub fn new() -> Self {
        DependencyGraph {
            nodes: BTreeMap::new(),
        }
    }

    /// Add a node; a node with the same id is replaced.
    pub fn add_node(&mut self, node: N) {
        self.nodes.insert(node.id(), node);
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Sort the items so that every item comes after its dependencies.
    ///
    /// # Returns
    ///
    /// The item payloads in dependency order, or a [`CompileError::Cycle`]
    /// carrying the visit path closed by the repeated id, or a
    /// [`CompileError::UnresolvedDependency`] naming both ids.
    pub fn topological_sort(&self) -> Result<Vec<N::Item>, CompileError> {
        let mut state = Visit {
            permanent: BTreeSet::new(),
            temporary: BTreeSet::new(),
            path: Vec::new(),
            sorted: Vec::with_capacity(self.nodes.len()),
        };
        // BTreeMap keys are already in sorted order
        for id in self.nodes.keys() {
            if !state.permanent.contains(id) {
                self.visit(id, &mut state)?;
            }
        }
        if state.sorted.len() != self.nodes.len() {
            return Err(CompileError::IncompleteSort {
                sorted: state.sorted.len(),
                total: self.nodes.len(),
            });
        }
        Ok(state.sorted)
    }

    fn visit(&self, id: &str, state: &mut Visit<N::Item>) -> Result<(), CompileError> {
        if state.permanent.contains(id) {
            return Ok(());
        }
        if state.temporary.contains(id) {
            let mut path: Vec<String> = match state.path.iter().position(|p| p == id) {
                Some(start) => state.path[start..].to_vec(),
                None => Vec::new(),
            };
            path.push(id.to_string());
            return Err(CompileError::Cycle { path });
        }
        let Some(node) = self.nodes.get(id) else {
            return Ok(());
        };

        state.temporary.insert(id.to_string());
        state.path.push(id.to_string());

        let mut dependencies = node.dependencies()?;
        dependencies.sort();
        for dependency in &dependencies {
            if !self.nodes.contains_key(dependency) {
                return Err(CompileError::UnresolvedDependency {
                    dependency: dependency.clone(),
                    node: id.to_string(),
                });
            }
            self.visit(dependency, state)?;
        }

        state.temporary.remove(id);
        state.path.pop();
        state.permanent.insert(id.to_string());
        state.sorted.push(node.item());
        Ok(())
    }
}

fn template_id(index: usize) -> String {
    format!("template_{}", index)
}

/// Config template adapter
struct TemplateNode<'a> {
    index: usize,
    templates: &'a [ConfigTemplate],
    by_name: &'a BTreeMap<&'a str, Vec<usize>>,
    by_group: &'a BTreeMap<&'a str, Vec<usize>>,
}

impl DependencyNode for TemplateNode<'_> {
    type Item = usize;

    fn id(&self) -> String {
        template_id(self.index)
    }

    fn dependencies(&self) -> Result<Vec<String>, CompileError> {
        let template = &self.templates[self.index];
        let mut deps = Vec::new();
        if template.is_sort_style() {
            if let Some(members) = self.by_group.get(template.sort_group.as_str()) {
                deps.extend(
                    members
                        .iter()
                        .filter(|i| **i != self.index)
                        .map(|i| template_id(*i)),
                );
            }
        }
        for name in &template.depends {
            let targets = self
                .by_name
                .get(name.as_str())
                .ok_or_else(|| CompileError::UnresolvedDependency {
                    dependency: name.clone(),
                    node: template_label(template, self.index),
                })?;
            deps.extend(targets.iter().map(|i| template_id(*i)));
        }
        Ok(deps)
    }

    fn item(&self) -> usize {
        self.index
    }
}

/// Display name of a template: its name, or its positional id
pub fn template_label(template: &ConfigTemplate, index: usize) -> String {
    if template.name.is_empty() {
        template_id(index)
    } else {
        template.name.clone()
    }
}

/// Order config templates by their dependencies.
///
/// # Returns
///
/// Indices into `templates` in dependency order.
pub fn order_config_templates(templates: &[ConfigTemplate]) -> Result<Vec<usize>, CompileError> {
    let mut by_name: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    let mut by_group: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (index, template) in templates.iter().enumerate() {
        if !template.name.is_empty() {
            by_name.entry(template.name.as_str()).or_default().push(index);
        }
        if !template.group.is_empty() {
            by_group.entry(template.group.as_str()).or_default().push(index);
        }
    }

    let mut graph = DependencyGraph::new();
    for index in 0..templates.len() {
        graph.add_node(TemplateNode {
            index,
            templates,
            by_name: &by_name,
            by_group: &by_group,
        });
    }
    graph.topological_sort()
}

fn namespacer_id(index: usize) -> String {
    format!("namespacer_{}", index)
}

/// Scope object adapter
struct ScopeNode<'a> {
    index: usize,
    scope: ScopeId,
    model: &'a NetworkModel,
    positions: &'a BTreeMap<ScopeId, usize>,
}

impl DependencyNode for ScopeNode<'_> {
    type Item = ScopeId;

    fn id(&self) -> String {
        namespacer_id(self.index)
    }

    fn dependencies(&self) -> Result<Vec<String>, CompileError> {
        let mut deps = Vec::new();
        for class in self.model.depend_classes(self.scope) {
            for dep in self.model.depends(self.scope, &class)? {
                if let Some(position) = self.positions.get(&dep) {
                    deps.push(namespacer_id(*position));
                }
            }
        }
        Ok(deps)
    }

    fn item(&self) -> ScopeId {
        self.scope
    }
}

/// Order scope objects so that every object comes after the objects its
/// namespace depends on.
pub fn order_scopes(model: &NetworkModel, scopes: &[ScopeId]) -> Result<Vec<ScopeId>, CompileError> {
    let positions: BTreeMap<ScopeId, usize> = scopes
        .iter()
        .enumerate()
        .map(|(i, s)| (*s, i))
        .collect();
    let mut graph = DependencyGraph::new();
    for (index, scope) in scopes.iter().enumerate() {
        graph.add_node(ScopeNode {
            index,
            scope: *scope,
            model,
            positions: &positions,
        });
    }
    let sorted = graph.topological_sort()?;
    debug!("Sorted {} scope objects", sorted.len());
    Ok(sorted)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Item {
        id: &'static str,
        deps: Vec<&'static str>,
    }

    impl DependencyNode for Item {
        type Item = &'static str;

        fn id(&self) -> String {
            self.id.to_string()
        }

        fn dependencies(&self) -> Result<Vec<String>, CompileError> {
            Ok(self.deps.iter().map(|d| d.to_string()).collect())
        }

        fn item(&self) -> &'static str {
            self.id
        }
    }

    fn graph(items: Vec<(&'static str, Vec<&'static str>)>) -> DependencyGraph<Item> {
        let mut graph = DependencyGraph::new();
        for (id, deps) in items {
            graph.add_node(Item { id, deps });
        }
        graph
    }

    #[test]
    fn test_sort_respects_dependencies() {
        let g = graph(vec![("c", vec!["a", "b"]), ("b", vec!["a"]), ("a", vec![])]);
        assert_eq!(g.topological_sort().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_sort_independent_of_insertion_order() {
        let a = graph(vec![("x", vec![]), ("y", vec!["z"]), ("z", vec![])]);
        let b = graph(vec![("z", vec![]), ("y", vec!["z"]), ("x", vec![])]);
        assert_eq!(a.topological_sort().unwrap(), b.topological_sort().unwrap());
        assert_eq!(a.topological_sort().unwrap(), vec!["x", "z", "y"]);
    }

    #[test]
    fn test_cycle_path() {
        let g = graph(vec![("A", vec!["B"]), ("B", vec!["A"])]);
        match g.topological_sort() {
            Err(CompileError::Cycle { path }) => {
                assert_eq!(path, vec!["A", "B", "A"]);
            }
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_unresolved_dependency() {
        let g = graph(vec![("A", vec!["missing"])]);
        let err = g.topological_sort().unwrap_err();
        assert_eq!(err.to_string(), "dependency missing not found for node A");
    }

    fn template(name: &str, group: &str) -> ConfigTemplate {
        ConfigTemplate {
            name: name.to_string(),
            group: group.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_sort_template_after_group() {
        let templates = vec![
            ConfigTemplate {
                name: "all".to_string(),
                style: "sort".to_string(),
                sort_group: "bgp".to_string(),
                ..Default::default()
            },
            template("neighbor_a", "bgp"),
            template("neighbor_b", "bgp"),
            template("other", ""),
        ];
        let order = order_config_templates(&templates).unwrap();
        let pos = |i: usize| order.iter().position(|x| *x == i).unwrap();
        assert!(pos(0) > pos(1));
        assert!(pos(0) > pos(2));
        assert_eq!(order.len(), 4);
    }

    #[test]
    fn test_template_depends_by_name() {
        let mut first = template("startup", "");
        first.depends = vec!["base".to_string()];
        let templates = vec![first, template("base", "")];
        assert_eq!(order_config_templates(&templates).unwrap(), vec![1, 0]);

        let mut broken = template("x", "");
        broken.depends = vec!["nothing".to_string()];
        let err = order_config_templates(&[broken]).unwrap_err();
        assert!(matches!(err, CompileError::UnresolvedDependency { .. }));
    }
}
