//! `ping_llm_provider`: reachability check for a configured model.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::llm::{LlmError, ModelRegistry};
use crate::tools::factory::BuildContext;
use crate::tools::{parse_args, to_output, Tool, ToolDefinition, ToolError};

pub fn build(models: Arc<ModelRegistry>, ctx: &BuildContext<'_>) -> Arc<dyn Tool> {
    Arc::new(LlmPingTool {
        description: ctx.description(
            "Checks that a model provider API is reachable and accepts the configured key.",
        ),
        default_model: ctx.config.models.default_chat.clone(),
        models,
    })
}

pub struct LlmPingTool {
    description: String,
    default_model: String,
    models: Arc<ModelRegistry>,
}

fn failure(message: String, error_type: &str) -> Value {
    json!({
        "available": false,
        "error": message,
        "error_type": error_type,
        "message": message,
    })
}

#[async_trait]
impl Tool for LlmPingTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "ping_llm_provider",
            &self.description,
            json!({
                "type": "object",
                "properties": {
                    "model": {
                        "type": "string",
                        "description": "Model alias to check; defaults to the chat model"
                    }
                },
                "required": []
            }),
        )
    }

    async fn execute(&self, args_json: &str) -> Result<String, ToolError> {
        #[derive(Deserialize, Default)]
        struct Args {
            #[serde(default)]
            model: String,
        }
        // Malformed arguments fall back to the default model.
        let args: Args = parse_args(args_json).unwrap_or_default();

        let alias = if args.model.is_empty() {
            self.default_model.clone()
        } else {
            args.model
        };
        if alias.is_empty() {
            return to_output(&failure("default_chat model is not configured".into(), "CONFIG_ERROR"));
        }

        let entry = match self.models.get(&alias) {
            Ok(entry) => entry,
            Err(e) => return to_output(&failure(e.to_string(), "MODEL_NOT_FOUND")),
        };
        if entry.def.api_key.trim().is_empty() {
            return to_output(&failure(
                format!("API key for model '{alias}' is not configured"),
                "API_KEY_MISSING",
            ));
        }

        let def = &entry.def;
        let report = match entry.provider.ping().await {
            Ok(status) => {
                let mut report = json!({
                    "available": true,
                    "provider": def.provider,
                    "model": def.model_name,
                    "status_code": status.status_code,
                    "latency_ms": status.latency.as_millis() as u64,
                });
                let (available, error_type, message) = match status.status_code {
                    200..=299 => (true, None, format!("{} API is reachable, model '{alias}' ({}) responds", def.provider, def.model_name)),
                    401 => (false, Some("AUTH_ERROR"), format!("API key for model '{alias}' was rejected")),
                    429 => (false, Some("RATE_LIMIT_ERROR"), format!("{} API rate limit exceeded, try again later", def.provider)),
                    code => (false, Some("HTTP_ERROR"), format!("{} API returned status {code}", def.provider)),
                };
                report["available"] = json!(available);
                report["message"] = json!(message);
                match error_type {
                    None => report["status"] = json!("OK"),
                    Some(kind) => report["error_type"] = json!(kind),
                }
                report
            }
            Err(LlmError::Unsupported(_)) => {
                failure(format!("provider '{}' does not support ping", def.provider), "UNSUPPORTED")
            }
            Err(e) => failure(format!("connection failed: {e}"), "CONNECTION_ERROR"),
        };
        to_output(&report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, ModelDef, ToolConfig};
    use crate::llm::{GenerateOptions, LlmProvider, Message, ProviderStatus};
    use crate::state::CoreState;
    use std::time::Duration;

    struct Status(u16);

    #[async_trait]
    impl LlmProvider for Status {
        async fn generate(
            &self,
            _: &[Message],
            _: &[ToolDefinition],
            _: &GenerateOptions,
        ) -> Result<Message, LlmError> {
            Ok(Message::assistant(""))
        }

        async fn ping(&self) -> Result<ProviderStatus, LlmError> {
            Ok(ProviderStatus {
                status_code: self.0,
                latency: Duration::from_millis(42),
            })
        }
    }

    fn tool(default_chat: &str, models: &[(&str, &str, u16)]) -> Arc<dyn Tool> {
        let registry = ModelRegistry::new();
        for (alias, key, status) in models {
            let def = ModelDef {
                provider: "zai".into(),
                model_name: alias.to_string(),
                api_key: key.to_string(),
                ..Default::default()
            };
            registry.register(*alias, def, Arc::new(Status(*status))).unwrap();
        }
        let mut cfg = AppConfig::default();
        cfg.models.default_chat = default_chat.into();
        let state = Arc::new(CoreState::new(cfg.clone()));
        let tool_cfg = ToolConfig::default();
        let ctx = BuildContext {
            name: "ping_llm_provider",
            tool: &tool_cfg,
            config: &cfg,
            state: &state,
        };
        build(Arc::new(registry), &ctx)
    }

    async fn run(tool: &Arc<dyn Tool>, args: &str) -> Value {
        serde_json::from_str(&tool.execute(args).await.unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_default_model_is_pinged() {
        let t = tool("glm", &[("glm", "k", 200)]);
        let out = run(&t, "{}").await;
        assert_eq!(out["available"], true);
        assert_eq!(out["status"], "OK");
        assert_eq!(out["latency_ms"], 42);
    }

    #[tokio::test]
    async fn test_failures_are_reported_in_band() {
        let t = tool("", &[("glm", "k", 401), ("nokey", "", 200)]);
        assert_eq!(run(&t, "{}").await["error_type"], "CONFIG_ERROR");
        assert_eq!(run(&t, r#"{"model": "gpt"}"#).await["error_type"], "MODEL_NOT_FOUND");
        assert_eq!(run(&t, r#"{"model": "nokey"}"#).await["error_type"], "API_KEY_MISSING");

        let out = run(&t, r#"{"model": "glm"}"#).await;
        assert_eq!(out["available"], false);
        assert_eq!(out["error_type"], "AUTH_ERROR");
    }
}
