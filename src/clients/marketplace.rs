//! HTTP client for the marketplace seller API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde_json::Value;

use super::{ClientError, MarketplaceApi};
use crate::config::WbConfig;

/// Key used by the placeholder client built when no credentials are configured.
pub const DEMO_KEY: &str = "demo_key";

/// Marketplace API client.
///
/// Authenticates with the raw key in the `Authorization` header (no `Bearer`
/// prefix). Network failures, `429` and `5xx` responses are retried with
/// exponential backoff; a `X-Ratelimit-Retry` header overrides the delay.
#[derive(Debug, Clone)]
pub struct WbClient {
    api_key: String,
    http: reqwest::Client,
    retry_attempts: u32,
    initial_backoff: Duration,
}

impl WbClient {
    /// Build a client from the `wb` config section. The API key is required.
    pub fn from_config(cfg: &WbConfig) -> Result<Self, ClientError> {
        let cfg = cfg.with_defaults();
        if cfg.api_key.is_empty() {
            return Err(ClientError::Config("wb.api_key is required".into()));
        }
        let timeout = crate::config::parse_duration(&cfg.timeout)
            .ok_or_else(|| ClientError::Config(format!("invalid wb.timeout format: {}", cfg.timeout)))?;

        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            api_key: cfg.api_key,
            http,
            retry_attempts: cfg.retry_attempts,
            initial_backoff: Duration::from_secs(1),
        })
    }

    /// Placeholder client that refuses every request without touching the network.
    pub fn demo() -> Self {
        Self {
            api_key: DEMO_KEY.to_string(),
            http: reqwest::Client::new(),
            retry_attempts: 1,
            initial_backoff: Duration::from_secs(1),
        }
    }

    async fn request(
        &self,
        method: Method,
        url: &str,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<Value, ClientError> {
        if self.is_demo() {
            return Err(ClientError::DemoMode);
        }

        let mut last_error = String::from("no attempts made");
        let mut retry_delay = self.initial_backoff;

        for attempt in 0..self.retry_attempts.max(1) {
            if attempt > 0 {
                log::warn!("marketplace retry attempt={attempt} delay={retry_delay:?} url={url}");
                tokio::time::sleep(retry_delay).await;
                retry_delay *= 2;
            }

            let mut request = self
                .http
                .request(method.clone(), url)
                .header("Authorization", &self.api_key)
                .header("Accept", "application/json");
            if !query.is_empty() {
                request = request.query(query);
            }
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = match request.send().await {
                Ok(resp) => resp,
                Err(e) => {
                    last_error = e.to_string();
                    continue;
                }
            };

            let status = response.status();
            if status == StatusCode::TOO_MANY_REQUESTS {
                if let Some(secs) = response
                    .headers()
                    .get("X-Ratelimit-Retry")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                {
                    retry_delay = Duration::from_secs(secs);
                }
                last_error = "rate limited (429)".to_string();
                continue;
            }
            if status.is_server_error() {
                last_error = format!("server error: {status}");
                continue;
            }

            let text = response.text().await?;
            if !status.is_success() {
                return Err(ClientError::Status {
                    status: status.as_u16(),
                    body: text,
                });
            }
            if text.trim().is_empty() {
                return Ok(Value::Null);
            }
            return Ok(serde_json::from_str(&text)?);
        }

        Err(ClientError::RetriesExhausted(last_error))
    }
}

#[async_trait]
impl MarketplaceApi for WbClient {
    async fn get(
        &self,
        base_url: &str,
        path: &str,
        query: &[(String, String)],
    ) -> Result<Value, ClientError> {
        let url = join_url(base_url, path)?;
        self.request(Method::GET, &url, query, None).await
    }

    async fn post(&self, base_url: &str, path: &str, body: &Value) -> Result<Value, ClientError> {
        let url = join_url(base_url, path)?;
        self.request(Method::POST, &url, &[], Some(body)).await
    }

    fn is_demo(&self) -> bool {
        self.api_key == DEMO_KEY
    }
}

fn join_url(base_url: &str, path: &str) -> Result<String, ClientError> {
    if base_url.is_empty() {
        return Err(ClientError::Config(
            "base url is required (tool should provide value from config)".into(),
        ));
    }
    Ok(format!("{}{}", base_url.trim_end_matches('/'), path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_requires_key() {
        let err = WbClient::from_config(&WbConfig::default()).unwrap_err();
        assert!(err.to_string().contains("wb.api_key is required"));
    }

    #[test]
    fn test_from_config_rejects_bad_timeout() {
        let cfg = WbConfig {
            api_key: "k".into(),
            timeout: "thirty".into(),
            ..Default::default()
        };
        assert!(matches!(
            WbClient::from_config(&cfg),
            Err(ClientError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_demo_client_refuses_requests() {
        let client = WbClient::demo();
        assert!(client.is_demo());
        let err = client.get("https://content-api.example", "/ping", &[]).await.unwrap_err();
        assert!(matches!(err, ClientError::DemoMode));
    }

    #[test]
    fn test_join_url() {
        assert_eq!(
            join_url("https://api.example/", "/ping").unwrap(),
            "https://api.example/ping"
        );
        assert!(join_url("", "/ping").is_err());
    }
}
