//! OpenAI-compatible chat completions provider.
//!
//! Serves every vendor that speaks the `/chat/completions` wire format:
//! OpenAI itself, Z.AI (GLM), OpenRouter and DeepSeek, plus any definition
//! that sets an explicit `base_url`.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use super::{GenerateOptions, LlmError, LlmProvider, Message, ProviderStatus, ToolCall};
use crate::config::ModelDef;
use crate::tools::ToolDefinition;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default API base for a known provider name.
pub fn default_base_url(provider: &str) -> Option<&'static str> {
    match provider {
        "openai" => Some("https://api.openai.com/v1"),
        "zai" => Some("https://api.z.ai/api/paas/v4"),
        "openrouter" => Some("https://openrouter.ai/api/v1"),
        "deepseek" => Some("https://api.deepseek.com/v1"),
        _ => None,
    }
}

#[derive(Debug, Clone)]
pub struct OpenAiCompatProvider {
    provider: String,
    base_url: String,
    api_key: String,
    http: reqwest::Client,
    max_retries: u32,
}

impl OpenAiCompatProvider {
    pub fn new(def: &ModelDef) -> Result<Self, LlmError> {
        let base_url = if !def.base_url.is_empty() {
            def.base_url.trim_end_matches('/').to_string()
        } else {
            default_base_url(&def.provider)
                .ok_or_else(|| LlmError::UnsupportedProvider(def.provider.clone()))?
                .to_string()
        };

        let http = reqwest::Client::builder()
            .timeout(def.timeout().unwrap_or(DEFAULT_TIMEOUT))
            .build()?;

        Ok(Self {
            provider: def.provider.clone(),
            base_url,
            api_key: def.api_key.clone(),
            http,
            max_retries: DEFAULT_MAX_RETRIES,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let request = request.header("Authorization", format!("Bearer {}", self.api_key));
        if self.provider == "openrouter" {
            request
                .header("HTTP-Referer", "https://poncho-ai.dev")
                .header("X-Title", "Poncho AI")
        } else {
            request
        }
    }

    fn build_request_body(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        options: &GenerateOptions,
    ) -> Value {
        let mut body = Map::new();
        body.insert("model".into(), json!(options.model));
        body.insert(
            "messages".into(),
            Value::Array(messages.iter().map(message_to_wire).collect()),
        );
        if options.max_tokens > 0 {
            body.insert("max_tokens".into(), json!(options.max_tokens));
        }
        body.insert("temperature".into(), json!(options.temperature));

        if !tools.is_empty() {
            let wire_tools: Vec<Value> = tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect();
            body.insert("tools".into(), Value::Array(wire_tools));
            if let Some(parallel) = options.parallel_tool_calls {
                body.insert("parallel_tool_calls".into(), json!(parallel));
            }
        }

        if !options.thinking.is_empty() {
            body.insert("thinking".into(), json!({ "type": options.thinking }));
        }

        Value::Object(body)
    }
}

fn message_to_wire(msg: &Message) -> Value {
    let mut wire = json!({
        "role": msg.role.as_str(),
        "content": msg.content,
    });
    if !msg.tool_calls.is_empty() {
        wire["tool_calls"] = msg
            .tool_calls
            .iter()
            .map(|c| {
                json!({
                    "id": c.id,
                    "type": "function",
                    "function": { "name": c.name, "arguments": c.arguments },
                })
            })
            .collect();
    }
    if let Some(id) = &msg.tool_call_id {
        wire["tool_call_id"] = json!(id);
    }
    wire
}

/// Extract the assistant message from a chat completions response.
pub fn parse_completion(response: &Value) -> Result<Message, LlmError> {
    let message = response
        .pointer("/choices/0/message")
        .ok_or_else(|| LlmError::Parse("response has no choices".into()))?;

    let content = message
        .get("content")
        .and_then(Value::as_str)
        .unwrap_or_default();

    let tool_calls = message
        .get("tool_calls")
        .and_then(Value::as_array)
        .map(|calls| {
            calls
                .iter()
                .filter_map(|c| {
                    Some(ToolCall {
                        id: c.get("id").and_then(Value::as_str).unwrap_or_default().to_string(),
                        name: c.pointer("/function/name")?.as_str()?.to_string(),
                        arguments: c
                            .pointer("/function/arguments")
                            .and_then(Value::as_str)
                            .unwrap_or("{}")
                            .to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    let mut out = Message::assistant(content).with_tool_calls(tool_calls);
    out.reasoning = message
        .get("reasoning_content")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    Ok(out)
}

#[async_trait]
impl LlmProvider for OpenAiCompatProvider {
    async fn generate(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        options: &GenerateOptions,
    ) -> Result<Message, LlmError> {
        log::debug!(
            "chat completion provider={} model={} messages={} tools={}",
            self.provider,
            options.model,
            messages.len(),
            tools.len()
        );

        let endpoint = format!("{}/chat/completions", self.base_url);
        let body = self.build_request_body(messages, tools, options);

        let mut last_error = String::from("no attempts made");
        let mut retry_delay = Duration::from_secs(1);

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                log::warn!("chat completion retry attempt={attempt} delay={retry_delay:?}");
                tokio::time::sleep(retry_delay).await;
                retry_delay *= 2;
            }

            let request = self.authorized(self.http.post(&endpoint)).json(&body);
            let response = match request.send().await {
                Ok(resp) => resp,
                Err(e) => {
                    last_error = e.to_string();
                    continue;
                }
            };

            let status = response.status();
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                last_error = "rate limited (429)".into();
                continue;
            }
            if status.is_server_error() {
                last_error = format!("server error: {status}");
                continue;
            }

            let text = match response.text().await {
                Ok(text) => text,
                Err(e) => {
                    last_error = e.to_string();
                    continue;
                }
            };
            if status.is_client_error() {
                return Err(LlmError::Api {
                    status: status.as_u16(),
                    body: text,
                });
            }

            let json: Value = serde_json::from_str(&text).map_err(|e| {
                LlmError::Parse(format!("{e} - body: {}", text.chars().take(500).collect::<String>()))
            })?;
            return parse_completion(&json);
        }

        Err(LlmError::RetriesExhausted(last_error))
    }

    async fn ping(&self) -> Result<ProviderStatus, LlmError> {
        let started = Instant::now();
        let response = self
            .authorized(self.http.get(format!("{}/models", self.base_url)))
            .timeout(Duration::from_secs(10))
            .send()
            .await?;
        Ok(ProviderStatus {
            status_code: response.status().as_u16(),
            latency: started.elapsed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(provider: &str) -> ModelDef {
        ModelDef {
            provider: provider.into(),
            model_name: "glm-4.6".into(),
            api_key: "k".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_known_providers_get_default_base_url() {
        let p = OpenAiCompatProvider::new(&def("zai")).unwrap();
        assert_eq!(p.base_url(), "https://api.z.ai/api/paas/v4");
        let p = OpenAiCompatProvider::new(&def("openrouter")).unwrap();
        assert_eq!(p.base_url(), "https://openrouter.ai/api/v1");
    }

    #[test]
    fn test_unknown_provider_needs_base_url() {
        assert!(matches!(
            OpenAiCompatProvider::new(&def("ollama")),
            Err(LlmError::UnsupportedProvider(_))
        ));

        let mut d = def("ollama");
        d.base_url = "http://localhost:11434/v1/".into();
        let p = OpenAiCompatProvider::new(&d).unwrap();
        assert_eq!(p.base_url(), "http://localhost:11434/v1");
    }

    #[test]
    fn test_request_body_shape() {
        let p = OpenAiCompatProvider::new(&def("zai")).unwrap();
        let tools = vec![ToolDefinition {
            name: "plan_clear".into(),
            description: "Clear the plan".into(),
            parameters: json!({"type": "object", "properties": {}}),
        }];
        let call = ToolCall {
            id: "c1".into(),
            name: "plan_clear".into(),
            arguments: "{}".into(),
        };
        let messages = vec![
            Message::system("sys"),
            Message::assistant("").with_tool_calls(vec![call]),
            Message::tool_result("c1", "done"),
        ];
        let options = GenerateOptions {
            model: "glm-4.6".into(),
            max_tokens: 100,
            parallel_tool_calls: Some(false),
            thinking: "enabled".into(),
            ..Default::default()
        };

        let body = p.build_request_body(&messages, &tools, &options);
        assert_eq!(body["model"], "glm-4.6");
        assert_eq!(body["max_tokens"], 100);
        assert_eq!(body["tools"][0]["function"]["name"], "plan_clear");
        assert_eq!(body["parallel_tool_calls"], false);
        assert_eq!(body["thinking"]["type"], "enabled");
        assert_eq!(body["messages"][1]["tool_calls"][0]["function"]["arguments"], "{}");
        assert_eq!(body["messages"][2]["tool_call_id"], "c1");
        assert_eq!(body["messages"][0]["role"], "system");
    }

    #[test]
    fn test_parse_completion_with_tool_calls() {
        let response = json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "reasoning_content": "need the plan",
                    "tool_calls": [{
                        "id": "call_9",
                        "type": "function",
                        "function": {"name": "plan_add_task", "arguments": "{\"description\":\"x\"}"}
                    }]
                }
            }]
        });
        let msg = parse_completion(&response).unwrap();
        assert_eq!(msg.content, "");
        assert_eq!(msg.tool_calls[0].name, "plan_add_task");
        assert_eq!(msg.reasoning.as_deref(), Some("need the plan"));
    }

    #[test]
    fn test_parse_completion_without_choices() {
        assert!(matches!(
            parse_completion(&json!({"error": "bad"})),
            Err(LlmError::Parse(_))
        ));
    }
}
