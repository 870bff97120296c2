//! YAML prompt files: the agent system prompt and per-tool post-prompts.
//!
//! A prompt file looks like
//!
//! ```yaml
//! config:
//!   model: glm-4.6
//!   temperature: 0.3
//! messages:
//!   - role: system
//!     content: |
//!       You are ...
//! ```
//!
//! Message content may use `{{ variable }}` placeholders, rendered with tera.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::AppConfig;

/// File name of the agent system prompt inside the prompts directory.
pub const AGENT_SYSTEM_FILE: &str = "agent_system.yaml";

const DEFAULT_AGENT_PROMPT: &str = include_str!("agent_system_default.md");

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("prompt file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read prompt file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse prompt file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("failed to render message #{index} ({role}): {source}")]
    Render {
        index: usize,
        role: String,
        #[source]
        source: tera::Error,
    },

    #[error("post-prompt file not found for tool '{tool}': {} (configured as '{configured}')", path.display())]
    PostPromptMissing {
        tool: String,
        configured: String,
        path: PathBuf,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// `json_object` or empty for text.
    pub format: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptFile {
    pub config: PromptConfig,
    pub messages: Vec<PromptMessage>,
}

impl PromptFile {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PromptError> {
        let path = path.as_ref();
        let raw = read(path)?;
        serde_yaml::from_str(&raw).map_err(|source| PromptError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Content of the first message if it is a system message.
    pub fn system_message(&self) -> Option<&str> {
        self.messages
            .first()
            .filter(|m| m.role == "system")
            .map(|m| m.content.as_str())
    }

    /// Render every message with the given template context.
    pub fn render_messages(&self, ctx: &tera::Context) -> Result<Vec<PromptMessage>, PromptError> {
        self.messages
            .iter()
            .enumerate()
            .map(|(index, msg)| {
                let content = tera::Tera::one_off(&msg.content, ctx, false).map_err(|source| {
                    PromptError::Render {
                        index,
                        role: msg.role.clone(),
                        source,
                    }
                })?;
                Ok(PromptMessage {
                    role: msg.role.clone(),
                    content,
                })
            })
            .collect()
    }
}

fn read(path: &Path) -> Result<String, PromptError> {
    match std::fs::read_to_string(path) {
        Ok(raw) => Ok(raw),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(PromptError::NotFound(path.to_path_buf()))
        }
        Err(source) => Err(PromptError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

pub fn default_agent_prompt() -> &'static str {
    DEFAULT_AGENT_PROMPT
}

/// Load `agent_system.yaml` from `prompts_dir`.
///
/// The first message is rendered with `today` (ISO date) in scope. A missing
/// file, an empty message list or an empty first message yields the built-in
/// default; a file that exists but cannot be parsed or rendered is an error.
pub fn load_agent_system_prompt(prompts_dir: &Path) -> Result<String, PromptError> {
    let path = prompts_dir.join(AGENT_SYSTEM_FILE);
    if !path.exists() {
        log::debug!("agent prompt not found, using default path={}", path.display());
        return Ok(DEFAULT_AGENT_PROMPT.to_string());
    }
    let file = PromptFile::load(&path)?;
    let mut ctx = tera::Context::new();
    ctx.insert("today", &chrono::Utc::now().date_naive().to_string());
    match file.render_messages(&ctx)?.into_iter().next() {
        Some(msg) if !msg.content.trim().is_empty() => Ok(msg.content),
        _ => Ok(DEFAULT_AGENT_PROMPT.to_string()),
    }
}

/// Post-prompt texts keyed by tool name.
///
/// After a tool with a post-prompt runs, the orchestrator uses that text as
/// the system prompt for the next iteration.
#[derive(Debug, Clone, Default)]
pub struct PostPrompts {
    by_tool: HashMap<String, String>,
}

impl PostPrompts {
    /// Load the post-prompt of every enabled tool that configures one. A
    /// configured file that does not exist is an error.
    pub fn load(cfg: &AppConfig, prompts_dir: &Path) -> Result<Self, PromptError> {
        let mut by_tool = HashMap::new();
        for (tool, tool_cfg) in &cfg.tools {
            if !tool_cfg.enabled || tool_cfg.post_prompt.is_empty() {
                continue;
            }
            let path = prompts_dir.join(&tool_cfg.post_prompt);
            if !path.is_file() {
                return Err(PromptError::PostPromptMissing {
                    tool: tool.clone(),
                    configured: tool_cfg.post_prompt.clone(),
                    path,
                });
            }
            let text = post_prompt_text(&path)?;
            log::debug!("post-prompt loaded tool={tool} path={}", path.display());
            by_tool.insert(tool.clone(), text);
        }
        Ok(Self { by_tool })
    }

    pub fn get(&self, tool: &str) -> Option<&str> {
        self.by_tool.get(tool).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_tool.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_tool.is_empty()
    }
}

/// The file's leading system message, or its raw content when it is not a
/// prompt file.
fn post_prompt_text(path: &Path) -> Result<String, PromptError> {
    let raw = read(path)?;
    let parsed: Option<PromptFile> = serde_yaml::from_str(&raw).ok();
    Ok(parsed
        .as_ref()
        .and_then(PromptFile::system_message)
        .map(str::to_string)
        .unwrap_or(raw))
}
