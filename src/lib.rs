//! # Poncho
//!
//! Configuration-driven LLM agent runtime for marketplace sellers.
//!
//! `config.yaml` decides which tools exist and which backing client each one
//! talks to. At startup [`app::Components::initialize`] builds the clients,
//! registers tools through the declarative category path or the legacy flat
//! path, resolves the reasoning model and assembles the
//! [`agent::Orchestrator`]. Presets ([`app::presets`]) are overlays applied to
//! the loaded configuration before that happens.

pub mod agent;
pub mod app;
pub mod clients;
pub mod config;
pub mod events;
pub mod llm;
pub mod prompts;
pub mod state;
pub mod tools;

pub use agent::{AgentError, Orchestrator};
pub use app::{Components, InitError, PresetCatalog, PresetProfile};
pub use config::AppConfig;
pub use state::CoreState;
pub use tools::{Tool, ToolRegistry};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
