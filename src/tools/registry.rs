//! Name-keyed tool store shared with the orchestrator.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

use super::{RegistrationError, Tool, ToolDefinition};

/// Registered tools. Filled once during startup, read concurrently afterwards.
#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<BTreeMap<String, Arc<dyn Tool>>>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.list())
            .finish()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool. Fails on an invalid definition or a duplicate name.
    pub fn register(&self, tool: Arc<dyn Tool>) -> Result<(), RegistrationError> {
        let def = tool.definition();
        validate_definition(&def)?;

        let mut tools = self.tools.write();
        if tools.contains_key(&def.name) {
            return Err(RegistrationError::DuplicateRegistration(def.name));
        }
        log::debug!("tool registered name={}", def.name);
        tools.insert(def.name, tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.read().contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn list(&self) -> Vec<String> {
        self.tools.read().keys().cloned().collect()
    }

    /// Definitions of every tool, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.read().values().map(|t| t.definition()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.read().is_empty()
    }
}

fn validate_definition(def: &ToolDefinition) -> Result<(), RegistrationError> {
    let invalid = |reason: &str| RegistrationError::InvalidDefinition {
        tool: def.name.clone(),
        reason: reason.to_string(),
    };

    if def.name.trim().is_empty() {
        return Err(invalid("name is empty"));
    }
    let Value::Object(params) = &def.parameters else {
        return Err(invalid("parameters must be a JSON object"));
    };
    if params.get("type").and_then(Value::as_str) != Some("object") {
        return Err(invalid("parameters.type must be \"object\""));
    }
    if let Some(required) = params.get("required") {
        let all_strings = required
            .as_array()
            .map(|items| items.iter().all(Value::is_string))
            .unwrap_or(false);
        if !all_strings {
            return Err(invalid("parameters.required must be an array of strings"));
        }
    }
    Ok(())
}
