//! Startup errors, one variant per initialization stage.

use thiserror::Error;

use crate::clients::ClientError;
use crate::config::ConfigError;
use crate::llm::LlmError;
use crate::prompts::PromptError;
use crate::tools::RegistrationError;

#[derive(Debug, Error)]
pub enum InitError {
    #[error("failed to create object storage client: {0}")]
    ObjectStorage(#[source] ClientError),

    #[error("failed to create marketplace client: {0}")]
    Marketplace(#[source] ClientError),

    #[error(
        "model '{0}' not found: configure default_reasoning or default_chat in config.yaml \
         and add it under models.definitions"
    )]
    ModelNotConfigured(String),

    #[error("failed to create model provider: {0}")]
    ModelProvider(#[source] LlmError),

    #[error("failed to register tools: {0}")]
    Tools(#[source] RegistrationError),

    #[error("failed to load tool post-prompts: {0}")]
    PostPrompts(#[source] PromptError),
}

#[derive(Debug, Error)]
pub enum PresetError {
    #[error("preset '{name}' not found. Available presets: {available:?}")]
    NotFound { name: String, available: Vec<String> },

    #[error("preset '{0}' already exists")]
    AlreadyRegistered(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("preset i/o failed: {0}")]
    Io(#[from] std::io::Error),
}
