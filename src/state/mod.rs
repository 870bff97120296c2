//! Shared runtime state.
//!
//! [`CoreState`] is created once by the initializer and shared behind an
//! `Arc`. Every field that changes at run time sits behind a
//! `parking_lot::RwLock` and is only reachable through accessor methods.

pub mod commands;
pub mod todo;

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::clients::{Dictionaries, ObjectStorage, RateLimiters};
use crate::config::AppConfig;
use crate::llm::Message;
use crate::tools::ToolRegistry;

pub use commands::{setup_todo_commands, CommandError, CommandRegistry};
pub use todo::{Task, TaskStatus, TodoError, TodoManager, TodoStats};

/// A storage object classified under a file rule tag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileMeta {
    pub tag: String,
    pub key: String,
    pub size: u64,
    pub filename: String,
    /// Filled in by image analysis.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub vision_description: String,
}

pub struct CoreState {
    config: Arc<AppConfig>,
    tools: Arc<ToolRegistry>,
    todo: Arc<TodoManager>,
    commands: CommandRegistry,
    rate_limiters: RateLimiters,
    storage: RwLock<Option<Arc<dyn ObjectStorage>>>,
    dictionaries: RwLock<Option<Arc<Dictionaries>>>,
    history: RwLock<Vec<Message>>,
    files: RwLock<BTreeMap<String, Vec<FileMeta>>>,
}

impl std::fmt::Debug for CoreState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreState")
            .field("tools", &self.tools.len())
            .field("todo", &self.todo.stats())
            .field("has_storage", &self.storage.read().is_some())
            .field("has_dictionaries", &self.dictionaries.read().is_some())
            .field("history", &self.history.read().len())
            .finish()
    }
}

impl CoreState {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config: Arc::new(config),
            tools: Arc::new(ToolRegistry::new()),
            todo: Arc::new(TodoManager::new()),
            commands: CommandRegistry::new(),
            rate_limiters: RateLimiters::new(),
            storage: RwLock::new(None),
            dictionaries: RwLock::new(None),
            history: RwLock::new(Vec::new()),
            files: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn config(&self) -> &Arc<AppConfig> {
        &self.config
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    pub fn todo(&self) -> &Arc<TodoManager> {
        &self.todo
    }

    /// Per-tool marketplace request limiters.
    pub fn rate_limiters(&self) -> &RateLimiters {
        &self.rate_limiters
    }

    pub fn commands(&self) -> &CommandRegistry {
        &self.commands
    }

    // -- storage / dictionaries ---------------------------------------------

    pub fn set_storage(&self, storage: Arc<dyn ObjectStorage>) {
        *self.storage.write() = Some(storage);
    }

    pub fn storage(&self) -> Option<Arc<dyn ObjectStorage>> {
        self.storage.read().clone()
    }

    pub fn set_dictionaries(&self, dicts: Option<Dictionaries>) {
        *self.dictionaries.write() = dicts.map(Arc::new);
    }

    pub fn dictionaries(&self) -> Option<Arc<Dictionaries>> {
        self.dictionaries.read().clone()
    }

    // -- history ------------------------------------------------------------

    pub fn append_message(&self, msg: Message) {
        self.history.write().push(msg);
    }

    pub fn history(&self) -> Vec<Message> {
        self.history.read().clone()
    }

    pub fn clear_history(&self) {
        self.history.write().clear();
    }

    // -- files --------------------------------------------------------------

    pub fn set_files(&self, files: BTreeMap<String, Vec<FileMeta>>) {
        *self.files.write() = files;
    }

    pub fn files(&self) -> BTreeMap<String, Vec<FileMeta>> {
        self.files.read().clone()
    }

    /// Attach an analysis result to a previously classified file.
    pub fn update_file_analysis(&self, tag: &str, filename: &str, description: &str) {
        let mut files = self.files.write();
        let Some(entry) = files
            .get_mut(tag)
            .and_then(|list| list.iter_mut().find(|f| f.filename == filename))
        else {
            log::warn!("file analysis target not found tag={tag} filename={filename}");
            return;
        };
        entry.vision_description = description.to_string();
    }

    /// Messages sent to the model: system prompt with file analysis context,
    /// the current plan, then the conversation history.
    pub fn build_agent_context(&self, system_prompt: &str) -> Vec<Message> {
        let mut visual = String::new();
        for (tag, files) in self.files.read().iter() {
            for f in files.iter().filter(|f| !f.vision_description.is_empty()) {
                visual.push_str(&format!("- File [{tag}] {}: {}\n", f.filename, f.vision_description));
            }
        }

        let mut system = system_prompt.to_string();
        if !visual.is_empty() {
            system.push_str("\nARTICLE CONTEXT (file analysis results):\n");
            system.push_str(&visual);
        }

        let history = self.history.read();
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(Message::system(system));
        messages.push(Message::system(self.todo.render()));
        messages.extend(history.iter().cloned());
        messages
    }
}
