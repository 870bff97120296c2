//! Errors raised while building, registering and running tools.

use thiserror::Error;

use crate::clients::ClientError;
use crate::llm::LlmError;
use crate::state::TodoError;

/// Failure of a single tool invocation. Returned to the model as text.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("reference dictionaries are not loaded; try reload_wb_dictionaries")]
    ReferenceDataUnavailable,

    #[error("object storage is not configured")]
    StorageUnavailable,

    #[error("tool '{0}' not found")]
    NotFound(String),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Todo(#[from] TodoError),

    #[error("{0}")]
    Failed(String),
}

/// Failure to construct or register a tool.
#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("unknown tool '{0}'")]
    UnknownCapability(String),

    #[error("tool '{tool}' requires a {expected} client, got {found}")]
    ClientTypeMismatch {
        tool: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("tool '{tool}' requires {dependency}, which is not available")]
    MissingDependency {
        tool: String,
        dependency: &'static str,
    },

    #[error("tool config not found for '{0}'")]
    ToolConfigMissing(String),

    #[error("tool '{0}' is already registered")]
    DuplicateRegistration(String),

    #[error("invalid definition for tool '{tool}': {reason}")]
    InvalidDefinition { tool: String, reason: String },

    #[error("category {category}, tool {tool}: {source}")]
    InCategory {
        category: String,
        tool: String,
        #[source]
        source: Box<RegistrationError>,
    },
}

impl RegistrationError {
    /// The innermost error, unwrapping category context.
    pub fn root(&self) -> &RegistrationError {
        match self {
            RegistrationError::InCategory { source, .. } => source.root(),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_context_in_message() {
        let err = RegistrationError::InCategory {
            category: "wb".into(),
            tool: "get_wb_feedbacks".into(),
            source: Box::new(RegistrationError::MissingDependency {
                tool: "get_wb_feedbacks".into(),
                dependency: "marketplace client",
            }),
        };
        let msg = err.to_string();
        assert!(msg.starts_with("category wb, tool get_wb_feedbacks:"));
        assert!(matches!(err.root(), RegistrationError::MissingDependency { .. }));
    }
}
