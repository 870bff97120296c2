//! Tools the language model may invoke.
//!
//! A [`Tool`] takes raw JSON arguments and returns a string ("raw in, string
//! out"). Tools are built by the [`factory`] from configuration and stored in
//! a [`ToolRegistry`] that the orchestrator reads at run time.
//!
//! Registration has two front-ends, both in [`setup`]:
//!
//! - a declarative path driven by `tool_categories`, which fails on the first
//!   error;
//! - a legacy path driven by the flat `tools` map, which classifies each name
//!   through the [`catalog`] tables and logs and skips per-tool failures.

pub mod builtin;
pub mod catalog;
pub mod error;
pub mod factory;
pub mod registry;
pub mod setup;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use catalog::{catalog_drift, classify, Domain};
pub use error::{RegistrationError, ToolError};
pub use factory::build_tool;
pub use registry::ToolRegistry;
pub use setup::{
    setup_tools_for_set, setup_tools_from_categories, setup_tools_from_config,
    setup_tools_from_legacy, SetupMode, SetupSummary, ToolSet,
};

// ---------------------------------------------------------------------------
// Tool contract
// ---------------------------------------------------------------------------

/// Function-calling schema of a tool, as sent to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema object describing the arguments.
    pub parameters: Value,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn definition(&self) -> ToolDefinition;

    /// Run with the model-provided JSON arguments.
    async fn execute(&self, args_json: &str) -> Result<String, ToolError>;

    fn name(&self) -> String {
        self.definition().name
    }
}

/// Decode tool arguments. Blank input is treated as `{}`.
pub fn parse_args<T: DeserializeOwned>(args_json: &str) -> Result<T, ToolError> {
    let raw = if args_json.trim().is_empty() {
        "{}"
    } else {
        args_json
    };
    serde_json::from_str(raw).map_err(|e| ToolError::InvalidArguments(e.to_string()))
}

/// Serialize a tool result for the model.
pub fn to_output<T: Serialize>(value: &T) -> Result<String, ToolError> {
    serde_json::to_string(value).map_err(|e| ToolError::Failed(e.to_string()))
}

/// Schema for a tool without arguments.
pub fn empty_parameters() -> Value {
    serde_json::json!({ "type": "object", "properties": {} })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Args {
        #[serde(default)]
        id: u64,
    }

    #[test]
    fn test_parse_args_blank_is_empty_object() {
        let args: Args = parse_args("  ").unwrap();
        assert_eq!(args.id, 0);
    }

    #[test]
    fn test_parse_args_rejects_garbage() {
        let err = parse_args::<Args>("{id:").unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
