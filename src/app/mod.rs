//! Application wiring: component initialization and presets.

mod components;
mod error;
pub mod presets;

pub use components::{
    AgentClient, BackendFactory, Components, ExecutionResult, HttpBackends, InitOptions,
    DEFAULT_NETWORK_TIMEOUT,
};
pub use error::{InitError, PresetError};
pub use presets::{
    apply_preset, load_config_with_preset, run_line_loop, run_preset, AppType, ModelSelection,
    PresetCatalog, PresetProfile, RunOutcome, RunSummary, UiConfig,
};
