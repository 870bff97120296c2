//! Component initialization: clients, state, tools, model and orchestrator.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::InitError;
use crate::agent::{AgentError, Orchestrator};
use crate::clients::{
    keys, ClientDirectory, ClientError, ClientHandle, MarketplaceApi, ObjectStorage, S3Client,
    WbClient,
};
use crate::config::{validate_wb_key, AppConfig, ModelDef, S3Config, WbConfig};
use crate::events::Emitter;
use crate::llm::{new_provider, GenerateOptions, LlmError, LlmProvider, Message, ModelRegistry};
use crate::prompts::{default_agent_prompt, load_agent_system_prompt, PostPrompts};
use crate::state::{setup_todo_commands, CoreState, TodoStats};
use crate::tools::{setup_tools_from_config, SetupSummary};

/// Bound on the startup network checks (marketplace ping, dictionaries).
pub const DEFAULT_NETWORK_TIMEOUT: Duration = Duration::from_secs(30);

/// Constructs backing clients. Swapped out in tests.
pub trait BackendFactory: Send + Sync {
    fn object_storage(&self, cfg: &S3Config) -> Result<Arc<dyn ObjectStorage>, ClientError>;

    fn marketplace(&self, cfg: &WbConfig) -> Result<Arc<dyn MarketplaceApi>, ClientError>;

    fn model_provider(&self, def: &ModelDef) -> Result<Arc<dyn LlmProvider>, LlmError>;
}

/// The real HTTP clients.
pub struct HttpBackends;

impl BackendFactory for HttpBackends {
    fn object_storage(&self, cfg: &S3Config) -> Result<Arc<dyn ObjectStorage>, ClientError> {
        Ok(Arc::new(S3Client::new(cfg)?))
    }

    fn marketplace(&self, cfg: &WbConfig) -> Result<Arc<dyn MarketplaceApi>, ClientError> {
        Ok(Arc::new(WbClient::from_config(cfg)?))
    }

    fn model_provider(&self, def: &ModelDef) -> Result<Arc<dyn LlmProvider>, LlmError> {
        new_provider(def)
    }
}

#[derive(Debug, Clone)]
pub struct InitOptions {
    pub max_iters: usize,
    /// Overrides `agent_system.yaml` when set.
    pub system_prompt: Option<String>,
    /// Directory relative `app.prompts_dir` is resolved against, usually the
    /// config file's directory.
    pub base_dir: Option<PathBuf>,
    pub network_timeout: Duration,
}

impl InitOptions {
    /// Defaults taken from the `default` chain of `cfg`.
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            max_iters: cfg.chain_max_iterations("default"),
            system_prompt: None,
            base_dir: None,
            network_timeout: DEFAULT_NETWORK_TIMEOUT,
        }
    }
}

/// Outcome of [`Components::execute`].
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub response: String,
    pub todo_summary: String,
    pub todo_stats: TodoStats,
    pub history: Vec<Message>,
    pub duration: Duration,
}

/// Everything a running session needs. Built once by [`Components::initialize`].
pub struct Components {
    pub config: Arc<AppConfig>,
    pub state: Arc<CoreState>,
    pub provider: Arc<dyn LlmProvider>,
    pub models: Arc<ModelRegistry>,
    pub clients: ClientDirectory,
    pub orchestrator: Arc<Orchestrator>,
    pub tools: SetupSummary,
}

impl std::fmt::Debug for Components {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Components")
            .field("tools", &self.state.tools().list())
            .field("models", &self.models.names())
            .finish_non_exhaustive()
    }
}

impl Components {
    pub async fn initialize(
        cfg: AppConfig,
        opts: InitOptions,
        backends: &dyn BackendFactory,
    ) -> Result<Self, InitError> {
        log::info!("initializing components max_iters={}", opts.max_iters);

        // Object storage.
        let storage = backends
            .object_storage(&cfg.s3)
            .map_err(InitError::ObjectStorage)?;
        log::info!("object storage client initialized bucket={}", storage.bucket());

        // Marketplace.
        let wb = cfg.wb.with_defaults();
        let marketplace: Arc<dyn MarketplaceApi> = match validate_wb_key(&wb.api_key) {
            Ok(()) => {
                let client = backends.marketplace(&wb).map_err(InitError::Marketplace)?;
                match tokio::time::timeout(opts.network_timeout, client.ping(&wb.base_url)).await {
                    Ok(Ok(_)) => log::info!("marketplace ping successful"),
                    Ok(Err(e)) => log::warn!("marketplace ping failed error={e}"),
                    Err(_) => log::warn!("marketplace ping timed out"),
                }
                client
            }
            Err(_) => {
                log::warn!("marketplace api key not set, using demo client");
                Arc::new(WbClient::demo())
            }
        };

        // Reference dictionaries.
        let dictionaries = if marketplace.is_demo() {
            log::warn!("demo marketplace client, reference dictionaries unavailable");
            None
        } else {
            match tokio::time::timeout(opts.network_timeout, marketplace.load_dictionaries(&wb.base_url)).await {
                Ok(Ok(dicts)) => {
                    log::info!(
                        "dictionaries loaded colors={} genders={} countries={} seasons={} vats={}",
                        dicts.colors.len(),
                        dicts.genders.len(),
                        dicts.countries.len(),
                        dicts.seasons.len(),
                        dicts.vats.len()
                    );
                    Some(dicts)
                }
                Ok(Err(e)) => {
                    log::warn!("failed to load dictionaries error={e}");
                    None
                }
                Err(_) => {
                    log::warn!("loading dictionaries timed out");
                    None
                }
            }
        };

        // Shared state.
        let state = Arc::new(CoreState::new(cfg.clone()));
        state.set_storage(storage.clone());
        state.set_dictionaries(dictionaries);
        setup_todo_commands(state.commands());

        // Models.
        let alias = if cfg.models.default_reasoning.is_empty() {
            cfg.models.default_chat.clone()
        } else {
            cfg.models.default_reasoning.clone()
        };
        let def = cfg
            .reasoning_model("")
            .cloned()
            .ok_or_else(|| InitError::ModelNotConfigured(alias.clone()))?;
        let models = Arc::new(
            ModelRegistry::from_config_with(&cfg, |d| backends.model_provider(d))
                .map_err(InitError::ModelProvider)?,
        );
        let provider = models.get(&alias).map_err(InitError::ModelProvider)?.provider;
        log::info!("model provider created provider={} model={}", def.provider, def.model_name);

        // Tools.
        let mut clients = ClientDirectory::new();
        clients.insert(keys::WB_CLIENT.into(), ClientHandle::Marketplace(marketplace));
        clients.insert(keys::S3_CLIENT.into(), ClientHandle::ObjectStorage(storage));
        clients.insert(keys::MODEL_REGISTRY.into(), ClientHandle::ModelRegistry(models.clone()));
        clients.insert(keys::TODO_MANAGER.into(), ClientHandle::TodoManager(state.todo().clone()));
        let tools = setup_tools_from_config(&state, &cfg, &clients).map_err(InitError::Tools)?;

        // Prompts.
        let prompts_dir = cfg.prompts_dir(opts.base_dir.as_deref());
        let system_prompt = match opts.system_prompt {
            Some(prompt) => prompt,
            None => load_agent_system_prompt(&prompts_dir).unwrap_or_else(|e| {
                log::warn!("failed to load agent prompt, using default error={e}");
                default_agent_prompt().to_string()
            }),
        };
        let post_prompts = PostPrompts::load(&cfg, &prompts_dir).map_err(InitError::PostPrompts)?;
        if !post_prompts.is_empty() {
            log::info!("tool post-prompts loaded count={}", post_prompts.len());
        }

        let orchestrator = Orchestrator::new(
            state.clone(),
            provider.clone(),
            GenerateOptions::from(&def),
            system_prompt,
        )
        .with_post_prompts(post_prompts)
        .with_max_iters(opts.max_iters)
        .with_tool_timeouts(&cfg);

        log::info!("components initialized tools={}", state.tools().len());
        Ok(Self {
            config: state.config().clone(),
            state,
            provider,
            models,
            clients,
            orchestrator: Arc::new(orchestrator),
            tools,
        })
    }

    pub async fn run(&self, query: &str) -> Result<String, AgentError> {
        self.orchestrator.run(query).await
    }

    /// Run `query` bounded by `timeout` and collect the session snapshot.
    pub async fn execute(&self, query: &str, timeout: Duration) -> Result<ExecutionResult, AgentError> {
        let started = Instant::now();
        log::info!("executing query timeout={timeout:?}");

        let response = tokio::time::timeout(timeout, self.orchestrator.run(query))
            .await
            .map_err(|_| AgentError::Timeout(timeout))??;

        let result = ExecutionResult {
            response,
            todo_summary: self.state.todo().render(),
            todo_stats: self.state.todo().stats(),
            history: self.state.history(),
            duration: started.elapsed(),
        };
        log::info!(
            "query executed response_len={} duration_ms={}",
            result.response.len(),
            result.duration.as_millis()
        );
        Ok(result)
    }
}

/// What a front-end needs from a running agent.
#[async_trait]
pub trait AgentClient: Send + Sync {
    async fn run(&self, query: &str) -> Result<String, AgentError>;

    fn set_emitter(&self, emitter: Arc<dyn Emitter>);
}

#[async_trait]
impl AgentClient for Components {
    async fn run(&self, query: &str) -> Result<String, AgentError> {
        Components::run(self, query).await
    }

    fn set_emitter(&self, emitter: Arc<dyn Emitter>) {
        self.orchestrator.set_emitter(emitter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{Dictionaries, StoredObject};
    use crate::config::{CategoryConfig, ToolConfig};
    use crate::llm::ToolCall;
    use crate::tools::ToolDefinition;
    use bytes::Bytes;
    use parking_lot::Mutex;
    use serde_json::{json, Value};
    use std::collections::VecDeque;

    struct EmptyBucket;

    #[async_trait]
    impl ObjectStorage for EmptyBucket {
        async fn list(&self, _prefix: &str) -> Result<Vec<StoredObject>, ClientError> {
            Ok(Vec::new())
        }

        async fn get_object(&self, key: &str) -> Result<Bytes, ClientError> {
            Err(ClientError::Status { status: 404, body: key.into() })
        }

        fn bucket(&self) -> &str {
            "test"
        }
    }

    /// Marketplace whose every call fails.
    struct Unreachable;

    #[async_trait]
    impl MarketplaceApi for Unreachable {
        async fn get(&self, _: &str, _: &str, _: &[(String, String)]) -> Result<Value, ClientError> {
            Err(ClientError::RetriesExhausted("connection refused".into()))
        }

        async fn post(&self, _: &str, _: &str, _: &Value) -> Result<Value, ClientError> {
            Err(ClientError::RetriesExhausted("connection refused".into()))
        }

        async fn load_dictionaries(&self, _: &str) -> Result<Dictionaries, ClientError> {
            Err(ClientError::RetriesExhausted("connection refused".into()))
        }
    }

    struct Scripted(Mutex<VecDeque<Message>>);

    #[async_trait]
    impl LlmProvider for Scripted {
        async fn generate(
            &self,
            _: &[Message],
            _: &[ToolDefinition],
            _: &GenerateOptions,
        ) -> Result<Message, LlmError> {
            let next = self.0.lock().pop_front();
            match next {
                Some(msg) => Ok(msg),
                None => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(Message::assistant("late"))
                }
            }
        }
    }

    struct FakeBackends {
        storage_fails: bool,
        replies: Vec<Message>,
    }

    impl FakeBackends {
        fn new(replies: Vec<Message>) -> Self {
            Self { storage_fails: false, replies }
        }
    }

    impl BackendFactory for FakeBackends {
        fn object_storage(&self, _: &S3Config) -> Result<Arc<dyn ObjectStorage>, ClientError> {
            if self.storage_fails {
                return Err(ClientError::Config("s3.bucket is required".into()));
            }
            Ok(Arc::new(EmptyBucket))
        }

        fn marketplace(&self, _: &WbConfig) -> Result<Arc<dyn MarketplaceApi>, ClientError> {
            Ok(Arc::new(Unreachable))
        }

        fn model_provider(&self, _: &ModelDef) -> Result<Arc<dyn LlmProvider>, LlmError> {
            Ok(Arc::new(Scripted(Mutex::new(self.replies.clone().into()))))
        }
    }

    fn enabled() -> ToolConfig {
        ToolConfig { enabled: true, ..Default::default() }
    }

    fn config() -> AppConfig {
        let mut cfg = AppConfig::default();
        cfg.models.default_chat = "glm".into();
        cfg.models.definitions.insert(
            "glm".into(),
            ModelDef { provider: "zai".into(), model_name: "glm-4.6".into(), ..Default::default() },
        );
        for name in ["plan_add_task", "get_wb_feedbacks", "wb_colors", "ping_llm_provider"] {
            cfg.tools.insert(name.into(), enabled());
        }
        cfg.app.prompts_dir = "prompts".into();
        cfg
    }

    fn opts(dir: &tempfile::TempDir) -> InitOptions {
        InitOptions {
            base_dir: Some(dir.path().to_path_buf()),
            network_timeout: Duration::from_secs(1),
            ..InitOptions::from_config(&AppConfig::default())
        }
    }

    #[tokio::test]
    async fn test_initialize_with_demo_marketplace() {
        let dir = tempfile::tempdir().unwrap();
        let components = Components::initialize(config(), opts(&dir), &FakeBackends::new(vec![]))
            .await
            .unwrap();

        let ClientHandle::Marketplace(wb) = &components.clients[keys::WB_CLIENT] else {
            panic!("marketplace handle expected");
        };
        assert!(wb.is_demo());
        assert!(components.state.dictionaries().is_none());
        assert!(components.state.storage().is_some());
        assert_eq!(
            components.state.tools().list(),
            vec!["get_wb_feedbacks", "ping_llm_provider", "plan_add_task", "wb_colors"]
        );
        assert!(components.state.commands().is_command("todo"));
        assert_eq!(components.orchestrator.max_iters(), 10);
    }

    #[tokio::test]
    async fn test_unreachable_marketplace_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config();
        cfg.wb.api_key = "secret".into();
        let components = Components::initialize(cfg, opts(&dir), &FakeBackends::new(vec![]))
            .await
            .unwrap();
        assert!(components.state.dictionaries().is_none());
        assert!(components.state.tools().contains("get_wb_feedbacks"));
    }

    #[tokio::test]
    async fn test_fatal_stages() {
        let dir = tempfile::tempdir().unwrap();

        let backends = FakeBackends { storage_fails: true, replies: vec![] };
        let err = Components::initialize(config(), opts(&dir), &backends).await.unwrap_err();
        assert!(matches!(err, InitError::ObjectStorage(_)));
        assert!(err.to_string().starts_with("failed to create object storage client"));

        let mut cfg = config();
        cfg.models.default_chat = "gpt".into();
        let err = Components::initialize(cfg, opts(&dir), &FakeBackends::new(vec![])).await.unwrap_err();
        assert!(matches!(err, InitError::ModelNotConfigured(ref m) if m == "gpt"));

        let mut cfg = config();
        cfg.tool_categories.insert(
            "broken".into(),
            CategoryConfig { enabled: true, client: String::new(), tools: vec!["get_ozon_orders".into()] },
        );
        let err = Components::initialize(cfg, opts(&dir), &FakeBackends::new(vec![])).await.unwrap_err();
        assert!(matches!(err, InitError::Tools(_)));

        let mut cfg = config();
        cfg.tools.get_mut("plan_add_task").unwrap().post_prompt = "missing.yaml".into();
        let err = Components::initialize(cfg, opts(&dir), &FakeBackends::new(vec![])).await.unwrap_err();
        assert!(matches!(err, InitError::PostPrompts(_)));
    }

    #[tokio::test]
    async fn test_execute_collects_plan_and_history() {
        let dir = tempfile::tempdir().unwrap();
        let replies = vec![
            Message::assistant("").with_tool_calls(vec![ToolCall {
                id: "c1".into(),
                name: "plan_add_task".into(),
                arguments: json!({"description": "check feedbacks"}).to_string(),
            }]),
            Message::assistant("Planned."),
        ];
        let components = Components::initialize(config(), opts(&dir), &FakeBackends::new(replies))
            .await
            .unwrap();

        let result = components.execute("plan my day", Duration::from_secs(5)).await.unwrap();
        assert_eq!(result.response, "Planned.");
        assert_eq!(result.todo_stats.pending, 1);
        assert!(result.todo_summary.contains("check feedbacks"));
        assert_eq!(result.history.len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let components = Components::initialize(config(), opts(&dir), &FakeBackends::new(vec![]))
            .await
            .unwrap();
        let err = components.execute("hello", Duration::from_secs(2)).await.unwrap_err();
        assert!(matches!(err, AgentError::Timeout(d) if d == Duration::from_secs(2)));
    }
}
