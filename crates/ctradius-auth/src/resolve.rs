//! Module configuration inheritance
//!
//! A module block either declares a `type` (it is the root of its chain) or
//! `inherits` from another block by name. Resolution flattens the chain with
//! a shallow merge where the child wins per key; arrays and objects are
//! replaced wholesale. The result never carries `inherits`.

use crate::config::ConfigError;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};

/// Raw module block as written in the config file
pub type ModuleBlock = Map<String, Value>;

pub const TYPE_KEY: &str = "type";
pub const INHERITS_KEY: &str = "inherits";

/// `type` declared by a block, if any
pub fn declared_type(block: &ModuleBlock) -> Option<&str> {
    block.get(TYPE_KEY).and_then(Value::as_str).filter(|t| !t.is_empty())
}

/// `inherits` target of a block, if any
pub fn declared_parent(block: &ModuleBlock) -> Option<&str> {
    block
        .get(INHERITS_KEY)
        .and_then(Value::as_str)
        .filter(|p| !p.is_empty())
}

/// Flatten the inheritance chain of `name` into a single block.
pub fn resolve_module_config(
    modules: &BTreeMap<String, ModuleBlock>,
    name: &str,
) -> Result<ModuleBlock, ConfigError> {
    resolve_with_visited(modules, name, &mut HashSet::new())
}

fn resolve_with_visited(
    modules: &BTreeMap<String, ModuleBlock>,
    name: &str,
    visited: &mut HashSet<String>,
) -> Result<ModuleBlock, ConfigError> {
    if !visited.insert(name.to_string()) {
        return Err(ConfigError::InheritanceCycle(name.to_string()));
    }

    let block = modules
        .get(name)
        .ok_or_else(|| ConfigError::ModuleNotFound(name.to_string()))?;

    if declared_type(block).is_some() {
        let mut resolved = block.clone();
        resolved.remove(INHERITS_KEY);
        return Ok(resolved);
    }

    let parent = declared_parent(block).ok_or_else(|| {
        ConfigError::Invalid(format!(
            "Module '{}' has neither 'type' nor 'inherits'",
            name
        ))
    })?;

    let mut resolved = resolve_with_visited(modules, parent, visited)?;
    for (key, value) in block {
        resolved.insert(key.clone(), value.clone());
    }
    resolved.remove(INHERITS_KEY);

    Ok(resolved)
}

/// Flattened, type-bearing configuration of one named module
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedModuleConfig {
    name: String,
    module_type: String,
    fields: ModuleBlock,
}

impl ResolvedModuleConfig {
    pub fn new(name: impl Into<String>, fields: ModuleBlock) -> Result<Self, ConfigError> {
        let name = name.into();
        let module_type = declared_type(&fields)
            .ok_or_else(|| {
                ConfigError::Invalid(format!("Module '{}' resolved without a 'type'", name))
            })?
            .to_string();
        Ok(ResolvedModuleConfig {
            name,
            module_type,
            fields,
        })
    }

    /// Name of the block in the config file
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn module_type(&self) -> &str {
        &self.module_type
    }

    pub fn fields(&self) -> &ModuleBlock {
        &self.fields
    }

    /// Deserialize into the module type's own schema
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, ConfigError> {
        serde_json::from_value(Value::Object(self.fields.clone())).map_err(|e| {
            ConfigError::Invalid(format!(
                "Invalid {} configuration for module '{}': {}",
                self.module_type, self.name, e
            ))
        })
    }
}
