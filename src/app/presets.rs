//! Presets: named deployment profiles laid over `config.yaml`.
//!
//! A preset never replaces the loaded configuration. [`apply_preset`] only
//! overwrites fields the profile sets to a non-empty value, so applying the
//! same profile twice yields the same configuration as applying it once.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use super::{AgentClient, PresetError};
use crate::config::AppConfig;
use crate::events::{ChanEmitter, Event};

/// Buffer of the event channel handed to interactive front-ends.
pub const EVENT_BUFFER: usize = 100;

pub const FEATURE_STREAMING: &str = "streaming";
pub const FEATURE_DEBUG: &str = "debug";
pub const FEATURE_INTERRUPTIONS: &str = "interruptions";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppType {
    Cli,
    Tui,
}

/// Model aliases a preset switches to. Empty means "keep config.yaml".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSelection {
    pub chat: String,
    pub reasoning: String,
    pub vision: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    pub title: String,
    pub input_prompt: String,
    pub show_timestamp: bool,
    /// Zero means unbounded.
    pub max_messages: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresetProfile {
    pub name: String,
    pub app_type: AppType,
    #[serde(default)]
    pub description: String,
    /// Replaces `enable_bundles` when non-empty.
    #[serde(default)]
    pub enable_bundles: Vec<String>,
    #[serde(default)]
    pub features: BTreeSet<String>,
    #[serde(default)]
    pub models: ModelSelection,
    #[serde(default)]
    pub ui: UiConfig,
}

impl PresetProfile {
    pub fn has_feature(&self, feature: &str) -> bool {
        self.features.contains(feature)
    }
}

fn features(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn builtin_profiles() -> Vec<PresetProfile> {
    vec![
        PresetProfile {
            name: "simple-cli".into(),
            app_type: AppType::Cli,
            description: "Minimal CLI interface for quick interactions".into(),
            enable_bundles: Vec::new(),
            features: features(&[FEATURE_STREAMING]),
            models: ModelSelection {
                chat: "glm-4.6".into(),
                ..Default::default()
            },
            ui: UiConfig {
                title: "AI CLI".into(),
                input_prompt: "AI> ".into(),
                ..Default::default()
            },
        },
        PresetProfile {
            name: "interactive-tui".into(),
            app_type: AppType::Tui,
            description: "Full-featured TUI with event streaming".into(),
            enable_bundles: Vec::new(),
            features: features(&[FEATURE_STREAMING, FEATURE_INTERRUPTIONS]),
            models: ModelSelection {
                reasoning: "glm-4.6".into(),
                ..Default::default()
            },
            ui: UiConfig {
                title: "Poncho AI".into(),
                input_prompt: "> ".into(),
                show_timestamp: true,
                max_messages: 0,
            },
        },
        PresetProfile {
            name: "full-featured".into(),
            app_type: AppType::Tui,
            description: "All features enabled for development and debugging".into(),
            enable_bundles: Vec::new(),
            features: features(&[FEATURE_STREAMING, FEATURE_DEBUG, FEATURE_INTERRUPTIONS]),
            models: ModelSelection {
                reasoning: "glm-4.6".into(),
                vision: "glm-4.6v-flash".into(),
                ..Default::default()
            },
            ui: UiConfig {
                title: "Poncho AI (Debug)".into(),
                input_prompt: "DEBUG> ".into(),
                show_timestamp: true,
                max_messages: 1000,
            },
        },
    ]
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// Named profiles. Built once at startup and passed to whoever registers
/// custom profiles; existing names are never overwritten.
#[derive(Debug, Clone, Default)]
pub struct PresetCatalog {
    presets: BTreeMap<String, PresetProfile>,
}

impl PresetCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog seeded with `simple-cli`, `interactive-tui` and `full-featured`.
    pub fn with_builtins() -> Self {
        let presets = builtin_profiles()
            .into_iter()
            .map(|p| (p.name.clone(), p))
            .collect();
        Self { presets }
    }

    pub fn register(&mut self, preset: PresetProfile) -> Result<(), PresetError> {
        if self.presets.contains_key(&preset.name) {
            return Err(PresetError::AlreadyRegistered(preset.name));
        }
        log::debug!("preset registered name={}", preset.name);
        self.presets.insert(preset.name.clone(), preset);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&PresetProfile, PresetError> {
        self.presets.get(name).ok_or_else(|| PresetError::NotFound {
            name: name.to_string(),
            available: self.names(),
        })
    }

    pub fn names(&self) -> Vec<String> {
        self.presets.keys().cloned().collect()
    }
}

// ---------------------------------------------------------------------------
// Overlay
// ---------------------------------------------------------------------------

fn overwrite(target: &mut String, value: &str) {
    if !value.is_empty() {
        *target = value.to_string();
    }
}

/// Lay `preset` over `cfg`. Unknown feature names are ignored.
pub fn apply_preset(mut cfg: AppConfig, preset: &PresetProfile) -> AppConfig {
    overwrite(&mut cfg.models.default_chat, &preset.models.chat);
    overwrite(&mut cfg.models.default_reasoning, &preset.models.reasoning);
    overwrite(&mut cfg.models.default_vision, &preset.models.vision);

    if !preset.enable_bundles.is_empty() {
        cfg.enable_bundles = preset.enable_bundles.clone();
    }

    for feature in &preset.features {
        match feature.as_str() {
            FEATURE_STREAMING => cfg.app.streaming.enabled = true,
            FEATURE_DEBUG => cfg.app.debug_logs.enabled = true,
            // Handled by the front-end.
            FEATURE_INTERRUPTIONS => {}
            other => log::debug!("ignoring unknown preset feature feature={other}"),
        }
    }
    cfg
}

/// Load `config.yaml` from `path` and lay `preset` over it.
pub fn load_config_with_preset(
    path: impl AsRef<Path>,
    preset: &PresetProfile,
) -> Result<AppConfig, PresetError> {
    let cfg = AppConfig::load(path)?;
    let cfg = apply_preset(cfg, preset);
    log::info!(
        "preset applied preset={} chat={} reasoning={}",
        preset.name,
        cfg.models.default_chat,
        cfg.models.default_reasoning
    );
    Ok(cfg)
}

// ---------------------------------------------------------------------------
// Running
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub queries: usize,
    pub failures: usize,
}

#[derive(Debug)]
pub enum RunOutcome {
    RanToCompletion(RunSummary),
    /// An interactive front-end has to take over: the client already sends
    /// its events into `events`.
    RequiresInteractiveHandoff {
        events: mpsc::Receiver<Event>,
        preset: PresetProfile,
    },
}

/// Run `preset` against `client`.
///
/// CLI presets run a line loop over `input` until end of input or
/// `exit`/`quit`. TUI presets get a channel emitter wired into the client and
/// the receiving half is returned to the caller.
pub async fn run_preset<R, W>(
    client: &dyn AgentClient,
    preset: &PresetProfile,
    input: R,
    output: W,
) -> Result<RunOutcome, PresetError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    match preset.app_type {
        AppType::Cli => {
            let summary = run_line_loop(client, preset, input, output).await?;
            Ok(RunOutcome::RanToCompletion(summary))
        }
        AppType::Tui => {
            let (emitter, events) = ChanEmitter::pair(EVENT_BUFFER);
            client.set_emitter(Arc::new(emitter));
            log::info!("interactive preset, handing off events preset={}", preset.name);
            Ok(RunOutcome::RequiresInteractiveHandoff {
                events,
                preset: preset.clone(),
            })
        }
    }
}

/// Line-based session: one query per line.
pub async fn run_line_loop<R, W>(
    client: &dyn AgentClient,
    preset: &PresetProfile,
    input: R,
    mut output: W,
) -> Result<RunSummary, PresetError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let title: &str = if preset.ui.title.is_empty() { &preset.name } else { &preset.ui.title };
    let prompt: &str = if preset.ui.input_prompt.is_empty() { "> " } else { &preset.ui.input_prompt };

    output
        .write_all(format!("=== {title} ===\nType 'exit' or 'quit' to exit\n\n").as_bytes())
        .await?;

    let mut summary = RunSummary::default();
    let mut lines = input.lines();
    loop {
        output.write_all(prompt.as_bytes()).await?;
        output.flush().await?;

        let Some(line) = lines.next_line().await? else {
            output.write_all(b"\n").await?;
            break;
        };
        let query = line.trim();
        if query.is_empty() {
            continue;
        }
        if query == "exit" || query == "quit" {
            output.write_all(b"Goodbye!\n").await?;
            break;
        }

        summary.queries += 1;
        match client.run(query).await {
            Ok(response) => output.write_all(format!("\n{response}\n\n").as_bytes()).await?,
            Err(e) => {
                summary.failures += 1;
                log::warn!("query failed error={e}");
                output.write_all(format!("Error: {e}\n\n").as_bytes()).await?;
            }
        }
    }
    output.flush().await?;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentError;
    use crate::events::{Emitter, EventKind};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    #[test]
    fn test_builtin_catalog() {
        let catalog = PresetCatalog::with_builtins();
        assert_eq!(catalog.names(), vec!["full-featured", "interactive-tui", "simple-cli"]);
        let full = catalog.get("full-featured").unwrap();
        assert_eq!(full.app_type, AppType::Tui);
        assert!(full.has_feature("debug"));
        assert_eq!(full.ui.max_messages, 1000);
        assert!(!catalog.get("simple-cli").unwrap().has_feature("debug"));
    }

    #[test]
    fn test_catalog_rejects_duplicates_and_reports_missing() {
        let mut catalog = PresetCatalog::with_builtins();
        let mut custom = catalog.get("simple-cli").unwrap().clone();
        let err = catalog.register(custom.clone()).unwrap_err();
        assert!(matches!(err, PresetError::AlreadyRegistered(ref n) if n == "simple-cli"));

        custom.name = "ecommerce".into();
        catalog.register(custom).unwrap();
        assert_eq!(catalog.get("ecommerce").unwrap().app_type, AppType::Cli);

        let err = catalog.get("nope").unwrap_err();
        let PresetError::NotFound { available, .. } = &err else {
            panic!("expected NotFound, got {err:?}");
        };
        assert_eq!(available.len(), 4);
        assert!(err.to_string().starts_with("preset 'nope' not found"));
    }

    fn base() -> AppConfig {
        let mut cfg = AppConfig::default();
        cfg.models.default_chat = "X".into();
        cfg.models.default_vision = "V".into();
        cfg.enable_bundles = vec!["wb-tools".into()];
        cfg
    }

    #[test]
    fn test_empty_fields_do_not_overwrite() {
        let preset = PresetProfile {
            name: "p".into(),
            app_type: AppType::Cli,
            description: String::new(),
            enable_bundles: Vec::new(),
            features: features(&["telepathy"]),
            models: ModelSelection::default(),
            ui: UiConfig::default(),
        };
        let cfg = apply_preset(base(), &preset);
        assert_eq!(cfg.models.default_chat, "X");
        assert_eq!(cfg.models.default_vision, "V");
        assert_eq!(cfg.enable_bundles, vec!["wb-tools"]);
        assert!(!cfg.app.streaming.enabled);
    }

    #[test]
    fn test_overlay_is_idempotent() {
        let mut preset = PresetCatalog::with_builtins().get("full-featured").unwrap().clone();
        preset.enable_bundles = vec!["vision-tools".into()];

        let once = apply_preset(base(), &preset);
        let twice = apply_preset(once.clone(), &preset);
        assert_eq!(
            serde_json::to_value(&once).unwrap(),
            serde_json::to_value(&twice).unwrap()
        );
        assert_eq!(once.models.default_chat, "X");
        assert_eq!(once.models.default_reasoning, "glm-4.6");
        assert_eq!(once.models.default_vision, "glm-4.6v-flash");
        assert_eq!(once.enable_bundles, vec!["vision-tools"]);
        assert!(once.app.streaming.enabled);
        assert!(once.app.debug_logs.enabled);
    }

    #[test]
    fn test_load_config_with_preset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "s3:\n  endpoint: storage.example.com\n  bucket: plm\n\
             models:\n  default_chat: local\n  definitions:\n    local:\n      provider: openai\n",
        )
        .unwrap();
        let preset = PresetCatalog::with_builtins().get("interactive-tui").unwrap().clone();

        let cfg = load_config_with_preset(&path, &preset).unwrap();
        assert_eq!(cfg.models.default_chat, "local");
        assert_eq!(cfg.models.default_reasoning, "glm-4.6");

        let err = load_config_with_preset(dir.path().join("missing.yaml"), &preset).unwrap_err();
        assert!(matches!(err, PresetError::Config(_)));
    }

    #[derive(Default)]
    struct Echo {
        emitter: Mutex<Option<Arc<dyn Emitter>>>,
    }

    #[async_trait]
    impl AgentClient for Echo {
        async fn run(&self, query: &str) -> Result<String, AgentError> {
            if query == "boom" {
                return Err(AgentError::MaxIterations(1));
            }
            let emitter = self.emitter.lock().clone();
            if let Some(emitter) = emitter {
                emitter.emit(EventKind::Done { content: query.into() }.into()).await;
            }
            Ok(format!("echo: {query}"))
        }

        fn set_emitter(&self, emitter: Arc<dyn Emitter>) {
            *self.emitter.lock() = Some(emitter);
        }
    }

    #[tokio::test]
    async fn test_cli_preset_runs_line_loop() {
        let preset = PresetCatalog::with_builtins().get("simple-cli").unwrap().clone();
        let input: &[u8] = b"hello\n\nboom\nquit\nnever\n";
        let mut output = Vec::new();

        let outcome = run_preset(&Echo::default(), &preset, input, &mut output).await.unwrap();
        let RunOutcome::RanToCompletion(summary) = outcome else {
            panic!("cli preset should run to completion");
        };
        assert_eq!(summary, RunSummary { queries: 2, failures: 1 });

        let text = String::from_utf8(output).unwrap();
        assert!(text.starts_with("=== AI CLI ===\nType 'exit' or 'quit' to exit\n"));
        assert!(text.contains("AI> \necho: hello\n"));
        assert!(text.contains("Error: "));
        assert!(text.ends_with("Goodbye!\n"));
        assert!(!text.contains("never"));
    }

    #[tokio::test]
    async fn test_tui_preset_hands_off_events() {
        let preset = PresetCatalog::with_builtins().get("interactive-tui").unwrap().clone();
        let client = Echo::default();

        let outcome = run_preset(&client, &preset, &b""[..], Vec::<u8>::new()).await.unwrap();
        let RunOutcome::RequiresInteractiveHandoff { mut events, preset } = outcome else {
            panic!("tui preset should hand off");
        };
        assert_eq!(preset.name, "interactive-tui");

        client.run("hi").await.unwrap();
        let event = events.recv().await.unwrap();
        assert!(matches!(event.kind, EventKind::Done { ref content } if content == "hi"));
    }
}
