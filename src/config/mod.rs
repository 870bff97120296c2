//! Application configuration loaded from `config.yaml`.
//!
//! The file is read once at startup, environment placeholders are expanded,
//! the YAML is parsed into [`AppConfig`], and critical settings are validated.
//! After that the configuration is treated as immutable (presets are applied
//! to the loaded value before any component sees it).

pub mod credentials;
pub mod discovery;
pub mod env;
pub mod error;

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub use credentials::{validate_credential, validate_wb_key};
pub use discovery::{
    ConfigPathFinder, DefaultConfigPathFinder, StandaloneConfigPathFinder, DEFAULT_CONFIG_NAME,
};
pub use error::ConfigError;

/// Default chain timeout when none is configured.
pub const DEFAULT_CHAIN_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Default chain iteration cap when none is configured.
pub const DEFAULT_CHAIN_MAX_ITERATIONS: usize = 10;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Root of `config.yaml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub models: ModelsConfig,
    /// Flat per-tool settings, keyed by tool name.
    pub tools: BTreeMap<String, ToolConfig>,
    /// Structured registration units, in declaration order.
    pub tool_categories: IndexMap<String, CategoryConfig>,
    pub tool_bundles: BTreeMap<String, ToolBundle>,
    pub enable_bundles: Vec<String>,
    pub s3: S3Config,
    pub app: AppSpecific,
    pub file_rules: Vec<FileRule>,
    pub wb: WbConfig,
    pub chains: HashMap<String, ChainConfig>,
}

/// One structured registration unit: a domain of tools sharing one client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryConfig {
    pub enabled: bool,
    /// Key into the client directory; empty means "no client required".
    pub client: String,
    pub tools: Vec<String>,
}

/// Per-tool settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    pub enabled: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub endpoint: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub path: String,
    #[serde(skip_serializing_if = "is_zero")]
    pub rate_limit: u32,
    #[serde(skip_serializing_if = "is_zero")]
    pub burst: u32,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub timeout: String,
    /// Prompt file (relative to `app.prompts_dir`) injected after the tool runs.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub post_prompt: String,
    #[serde(skip_serializing_if = "is_zero")]
    pub default_take: u32,
}

fn is_zero(v: &u32) -> bool {
    *v == 0
}

/// Named group of tools that can be switched on together.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolBundle {
    pub description: String,
    pub tools: Vec<String>,
}

// ---------------------------------------------------------------------------
// Models
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    pub default_reasoning: String,
    pub default_chat: String,
    pub default_vision: String,
    pub definitions: BTreeMap<String, ModelDef>,
}

/// A single model definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelDef {
    /// `openai`, `zai`, `openrouter`, `deepseek`, ...
    pub provider: String,
    pub model_name: String,
    pub api_key: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Request timeout such as `60s` or `2m`.
    pub timeout: String,
    pub base_url: String,
    /// `enabled`, `disabled`, or empty.
    pub thinking: String,
    pub parallel_tool_calls: Option<bool>,
    pub is_vision: bool,
}

impl ModelDef {
    /// Parsed request timeout, if one is configured and valid.
    pub fn timeout(&self) -> Option<Duration> {
        parse_duration(&self.timeout)
    }
}

// ---------------------------------------------------------------------------
// Backing services
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct S3Config {
    pub endpoint: String,
    pub region: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub use_ssl: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WbConfig {
    pub api_key: String,
    pub base_url: String,
    /// Requests per minute.
    pub rate_limit: u32,
    pub burst_limit: u32,
    pub retry_attempts: u32,
    pub timeout: String,
    pub brands_limit: u32,
}

impl WbConfig {
    /// Copy of this config with every unset field filled in.
    pub fn with_defaults(&self) -> WbConfig {
        let mut out = self.clone();
        if out.base_url.is_empty() {
            out.base_url = "https://content-api.wildberries.ru".to_string();
        }
        if out.rate_limit == 0 {
            out.rate_limit = 100;
        }
        if out.burst_limit == 0 {
            out.burst_limit = 5;
        }
        if out.retry_attempts == 0 {
            out.retry_attempts = 3;
        }
        if out.timeout.is_empty() {
            out.timeout = "30s".to_string();
        }
        if out.brands_limit == 0 {
            out.brands_limit = 500;
        }
        out
    }

    pub fn timeout_duration(&self) -> Duration {
        parse_duration(&self.timeout).unwrap_or(Duration::from_secs(30))
    }
}

/// Tag assigned to S3 files matching any of the glob patterns.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FileRule {
    pub tag: String,
    pub patterns: Vec<String>,
    pub required: bool,
}

// ---------------------------------------------------------------------------
// Application
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSpecific {
    pub debug: bool,
    pub prompts_dir: String,
    pub debug_logs: DebugConfig,
    pub streaming: StreamingConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub enabled: bool,
    pub save_logs: bool,
    pub logs_dir: String,
    pub include_tool_args: bool,
    pub include_tool_results: bool,
    pub max_result_size: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    pub enabled: bool,
    pub thinking_only: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    pub timeout: String,
    pub max_iterations: usize,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Read, expand, parse and validate the file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let cfg = Self::from_yaml_str(&env::expand_env(&raw))?;
        log::debug!(
            "config loaded path={} tools={} categories={}",
            path.display(),
            cfg.tools.len(),
            cfg.tool_categories.len()
        );
        Ok(cfg)
    }

    /// Parse and validate already-expanded YAML text.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let cfg: AppConfig = serde_yaml::from_str(yaml)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.s3.bucket.is_empty() {
            return Err(ConfigError::Validation("s3.bucket is required".into()));
        }
        if self.s3.endpoint.is_empty() {
            return Err(ConfigError::Validation("s3.endpoint is required".into()));
        }

        for (role, name) in [
            ("default_reasoning", &self.models.default_reasoning),
            ("default_chat", &self.models.default_chat),
            ("default_vision", &self.models.default_vision),
        ] {
            if !name.is_empty() && !self.models.definitions.contains_key(name) {
                return Err(ConfigError::Validation(format!(
                    "{role} model '{name}' is not defined in definitions"
                )));
            }
        }

        Ok(())
    }

    // -- model lookup -------------------------------------------------------

    /// Reasoning model by name; empty name means `default_reasoning`, then
    /// `default_chat`.
    pub fn reasoning_model(&self, name: &str) -> Option<&ModelDef> {
        let name = if !name.is_empty() {
            name
        } else if !self.models.default_reasoning.is_empty() {
            &self.models.default_reasoning
        } else {
            &self.models.default_chat
        };
        self.models.definitions.get(name)
    }

    /// Chat model by name; empty name means `default_chat`.
    pub fn chat_model(&self, name: &str) -> Option<&ModelDef> {
        let name = if name.is_empty() { &self.models.default_chat } else { name };
        self.models.definitions.get(name)
    }

    /// Vision model by name; empty name means `default_vision`.
    pub fn vision_model(&self, name: &str) -> Option<&ModelDef> {
        let name = if name.is_empty() { &self.models.default_vision } else { name };
        self.models.definitions.get(name)
    }

    // -- chains -------------------------------------------------------------

    pub fn chain_timeout(&self, chain: &str) -> Duration {
        self.chains
            .get(chain)
            .and_then(|c| parse_duration(&c.timeout))
            .unwrap_or(DEFAULT_CHAIN_TIMEOUT)
    }

    pub fn chain_max_iterations(&self, chain: &str) -> usize {
        match self.chains.get(chain) {
            Some(c) if c.max_iterations > 0 => c.max_iterations,
            _ => DEFAULT_CHAIN_MAX_ITERATIONS,
        }
    }

    // -- tools --------------------------------------------------------------

    /// Names of every tool with `enabled: true`, in alphabetical order.
    pub fn enabled_tools(&self) -> Vec<&str> {
        self.tools
            .iter()
            .filter(|(_, t)| t.enabled)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Prompts directory, resolved against `base` when relative.
    pub fn prompts_dir(&self, base: Option<&Path>) -> PathBuf {
        let dir = PathBuf::from(&self.app.prompts_dir);
        match base {
            Some(base) if dir.is_relative() => base.join(dir),
            _ => dir,
        }
    }
}

/// Parse durations such as `500ms`, `30s`, `5m` or `1h30m`.
///
/// Returns `None` for empty or malformed input.
pub fn parse_duration(input: &str) -> Option<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    let mut total = Duration::ZERO;
    let mut rest = input;
    while !rest.is_empty() {
        let digits = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if digits == 0 {
            return None;
        }
        let value: f64 = rest[..digits].parse().ok()?;
        rest = &rest[digits..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let seconds = match &rest[..unit_len] {
            "ms" => value / 1000.0,
            "s" => value,
            "m" => value * 60.0,
            "h" => value * 3600.0,
            _ => return None,
        };
        rest = &rest[unit_len..];
        total += Duration::from_secs_f64(seconds);
    }
    Some(total)
}
