//! Generator registry.
//!
//! Modules register value generators under `module.generator` names. Attach
//! rules with a `generator` are resolved against the registry before any
//! parameter is assigned, so an unknown name fails early.

use std::collections::BTreeMap;

use super::source::Row;
use crate::config::Config;
use crate::error::CompileError;
use crate::model::{NetworkModel, ScopeId};

/// Read-only view handed to generators
pub struct GeneratorContext<'a> {
    pub config: &'a Config,
    pub model: &'a NetworkModel,
}

/// A generator produces the rows of one owner object
pub type GeneratorFn = fn(&GeneratorContext<'_>, ScopeId) -> Result<Vec<Row>, CompileError>;

#[derive(Debug, Clone, Default)]
pub struct GeneratorRegistry {
    generators: BTreeMap<String, GeneratorFn>,
}

impl GeneratorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a generator under its full `module.generator` name.
    pub fn register(&mut self, name: impl Into<String>, generator: GeneratorFn) {
        self.generators.insert(name.into(), generator);
    }

    pub fn get(&self, name: &str) -> Option<GeneratorFn> {
        self.generators.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.generators.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.generators.keys().map(String::as_str)
    }

    /// Check that every generator referenced by a rule is registered.
    pub fn resolve_rules(&self, config: &Config) -> Result<(), CompileError> {
        for rule in &config.param_rules {
            if let Some(name) = rule.generator.as_deref().filter(|g| !g.is_empty()) {
                if !self.contains(name) {
                    return Err(CompileError::UnknownGenerator {
                        name: name.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Run a generator for one owner.
    pub fn generate(
        &self,
        name: &str,
        ctx: &GeneratorContext<'_>,
        owner: ScopeId,
    ) -> Result<Vec<Row>, CompileError> {
        let generator = self.get(name).ok_or_else(|| CompileError::UnknownGenerator {
            name: name.to_string(),
        })?;
        generator(ctx, owner).map_err(|e| match e {
            CompileError::Generator { .. } => e,
            other => CompileError::Generator {
                name: name.to_string(),
                reason: other.to_string(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kind_row(ctx: &GeneratorContext<'_>, owner: ScopeId) -> Result<Vec<Row>, CompileError> {
        let mut row = Row::new();
        row.insert("kind".to_string(), owner.kind().to_string());
        row.insert("network".to_string(), ctx.config.name.clone());
        Ok(vec![row])
    }

    #[test]
    fn test_register_and_generate() {
        let mut registry = GeneratorRegistry::new();
        registry.register("test.kind", kind_row);
        assert!(registry.contains("test.kind"));
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["test.kind"]);

        let config = Config {
            name: "lab".to_string(),
            ..Default::default()
        };
        let model = NetworkModel::default();
        let ctx = GeneratorContext {
            config: &config,
            model: &model,
        };
        let rows = registry.generate("test.kind", &ctx, ScopeId::Network).unwrap();
        assert_eq!(rows[0]["kind"], "network");
        assert_eq!(rows[0]["network"], "lab");
    }

    #[test]
    fn test_unknown_generator_rejected() {
        let config: Config =
            serde_yaml::from_str("param_rule:\n  - name: mounts\n    generator: clab.filemounts\n")
                .unwrap();
        let err = GeneratorRegistry::new().resolve_rules(&config).unwrap_err();
        assert_eq!(err.to_string(), "no generator found for clab.filemounts");
    }
}
