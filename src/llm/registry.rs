//! Named model registry.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::{LlmError, LlmProvider, OpenAiCompatProvider};
use crate::config::{AppConfig, ModelDef};

/// Build a provider for a model definition.
pub fn new_provider(def: &ModelDef) -> Result<Arc<dyn LlmProvider>, LlmError> {
    match def.provider.as_str() {
        "openai" | "zai" | "openrouter" | "deepseek" => Ok(Arc::new(OpenAiCompatProvider::new(def)?)),
        _ if !def.base_url.is_empty() => Ok(Arc::new(OpenAiCompatProvider::new(def)?)),
        other => Err(LlmError::UnsupportedProvider(other.to_string())),
    }
}

#[derive(Clone)]
pub struct ModelEntry {
    pub provider: Arc<dyn LlmProvider>,
    pub def: ModelDef,
}

/// Every configured model, addressable by its alias.
#[derive(Default)]
pub struct ModelRegistry {
    models: RwLock<BTreeMap<String, ModelEntry>>,
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("models", &self.names())
            .finish()
    }
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build one provider per definition with `build`.
    pub fn from_config_with<F>(cfg: &AppConfig, build: F) -> Result<Self, LlmError>
    where
        F: Fn(&ModelDef) -> Result<Arc<dyn LlmProvider>, LlmError>,
    {
        let registry = Self::new();
        for (name, def) in &cfg.models.definitions {
            let provider = build(def)?;
            registry.register(name.clone(), def.clone(), provider)?;
        }
        Ok(registry)
    }

    pub fn from_config(cfg: &AppConfig) -> Result<Self, LlmError> {
        Self::from_config_with(cfg, new_provider)
    }

    pub fn register(
        &self,
        name: impl Into<String>,
        def: ModelDef,
        provider: Arc<dyn LlmProvider>,
    ) -> Result<(), LlmError> {
        let name = name.into();
        let mut models = self.models.write();
        if models.contains_key(&name) {
            return Err(LlmError::AlreadyRegistered(name));
        }
        models.insert(name, ModelEntry { provider, def });
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<ModelEntry, LlmError> {
        self.models
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| LlmError::ModelNotFound(name.to_string()))
    }

    /// `requested` if registered, otherwise `fallback`. Returns the alias used.
    pub fn get_with_fallback(
        &self,
        requested: &str,
        fallback: &str,
    ) -> Result<(String, ModelEntry), LlmError> {
        let models = self.models.read();
        [requested, fallback]
            .into_iter()
            .find_map(|name| models.get(name).map(|e| (name.to_string(), e.clone())))
            .ok_or_else(|| LlmError::ModelNotFound(requested.to_string()))
    }

    pub fn names(&self) -> Vec<String> {
        self.models.read().keys().cloned().collect()
    }

    /// Whether `name` is the configured vision default, flagged as vision, or
    /// named like a vision model.
    pub fn is_vision_model(&self, name: &str, default_vision: &str) -> bool {
        if name == default_vision {
            return true;
        }
        let models = self.models.read();
        match models.get(name) {
            Some(entry) if entry.def.is_vision => true,
            Some(_) => {
                let lower = name.to_lowercase();
                lower.contains("vision") || lower.ends_with('v')
            }
            None => false,
        }
    }
}
