//! The agent orchestrator.

mod orchestrator;

use std::time::Duration;

use thiserror::Error;

use crate::llm::LlmError;

pub use orchestrator::{Orchestrator, DEFAULT_MAX_ITERATIONS, DEFAULT_TOOL_TIMEOUT};

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("model call failed: {0}")]
    Llm(#[from] LlmError),

    #[error("agent exceeded maximum iterations ({0})")]
    MaxIterations(usize),

    #[error("query timed out after {0:?}")]
    Timeout(Duration),
}
