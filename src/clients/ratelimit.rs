//! Per-tool request throttling for the marketplace API.
//!
//! Each marketplace tool owns a token bucket refilled at `rate_limit`
//! requests per minute and holding at most `burst` tokens. Callers
//! [`RateLimiter::acquire`] a token before every request and sleep when the
//! bucket is empty.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::time::Instant;

use super::{ClientError, MarketplaceApi};

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    refilled_at: Instant,
}

/// Token bucket limiter. A `per_minute` of zero disables the limit.
#[derive(Debug)]
pub struct RateLimiter {
    per_minute: u32,
    burst: u32,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    pub fn new(per_minute: u32, burst: u32) -> Self {
        let burst = burst.max(1);
        Self {
            per_minute,
            burst,
            bucket: Mutex::new(Bucket {
                tokens: f64::from(burst),
                refilled_at: Instant::now(),
            }),
        }
    }

    pub fn per_minute(&self) -> u32 {
        self.per_minute
    }

    pub fn burst(&self) -> u32 {
        self.burst
    }

    /// Take a token if one is available, otherwise report how long until one is.
    pub fn try_acquire(&self) -> Result<(), Duration> {
        if self.per_minute == 0 {
            return Ok(());
        }
        let per_second = f64::from(self.per_minute) / 60.0;
        let now = Instant::now();

        let mut bucket = self.bucket.lock();
        let elapsed = now.saturating_duration_since(bucket.refilled_at).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * per_second).min(f64::from(self.burst));
        bucket.refilled_at = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            Ok(())
        } else {
            Err(Duration::from_secs_f64((1.0 - bucket.tokens) / per_second))
        }
    }

    /// Wait until a token is available and take it.
    pub async fn acquire(&self) {
        while let Err(wait) = self.try_acquire() {
            log::debug!(
                "rate limit reached, waiting wait_ms={} rate={} burst={}",
                wait.as_millis(),
                self.per_minute,
                self.burst
            );
            tokio::time::sleep(wait).await;
        }
    }
}

/// Limiters keyed by tool name, created on first use.
#[derive(Debug, Default)]
pub struct RateLimiters {
    limiters: Mutex<HashMap<String, Arc<RateLimiter>>>,
}

impl RateLimiters {
    pub fn new() -> Self {
        Self::default()
    }

    /// The limiter registered for `tool`, creating it with the given limits
    /// on first call. Later calls return the existing limiter unchanged.
    pub fn get_or_create(&self, tool: &str, per_minute: u32, burst: u32) -> Arc<RateLimiter> {
        self.limiters
            .lock()
            .entry(tool.to_string())
            .or_insert_with(|| {
                log::debug!("rate limiter created tool={tool} rate={per_minute} burst={burst}");
                Arc::new(RateLimiter::new(per_minute, burst))
            })
            .clone()
    }

    pub fn len(&self) -> usize {
        self.limiters.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.limiters.lock().is_empty()
    }
}

/// Marketplace client that takes a token from `limiter` before every request.
pub struct Throttled {
    inner: Arc<dyn MarketplaceApi>,
    limiter: Arc<RateLimiter>,
}

impl Throttled {
    pub fn new(inner: Arc<dyn MarketplaceApi>, limiter: Arc<RateLimiter>) -> Self {
        Self { inner, limiter }
    }
}

#[async_trait]
impl MarketplaceApi for Throttled {
    async fn get(
        &self,
        base_url: &str,
        path: &str,
        query: &[(String, String)],
    ) -> Result<Value, ClientError> {
        self.limiter.acquire().await;
        self.inner.get(base_url, path, query).await
    }

    async fn post(&self, base_url: &str, path: &str, body: &Value) -> Result<Value, ClientError> {
        self.limiter.acquire().await;
        self.inner.post(base_url, path, body).await
    }

    fn is_demo(&self) -> bool {
        self.inner.is_demo()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_burst_then_wait() {
        let limiter = RateLimiter::new(60, 2);
        let start = Instant::now();

        limiter.acquire().await;
        limiter.acquire().await;
        assert_eq!(start.elapsed(), Duration::ZERO);

        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_secs(1));
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bucket_refills_over_time() {
        let limiter = RateLimiter::new(120, 1);
        assert!(limiter.try_acquire().is_ok());
        let wait = limiter.try_acquire().unwrap_err();
        assert!(wait <= Duration::from_millis(500));

        tokio::time::advance(Duration::from_millis(500)).await;
        assert!(limiter.try_acquire().is_ok());
    }

    #[test]
    fn test_zero_rate_is_unlimited() {
        let limiter = RateLimiter::new(0, 0);
        for _ in 0..100 {
            assert!(limiter.try_acquire().is_ok());
        }
    }

    #[test]
    fn test_registry_reuses_limiter_per_tool() {
        let limiters = RateLimiters::new();
        let a = limiters.get_or_create("get_wb_feedbacks", 100, 5);
        let b = limiters.get_or_create("get_wb_feedbacks", 10, 1);
        let c = limiters.get_or_create("ping_wb_api", 30, 2);

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(b.per_minute(), 100);
        assert_eq!(c.burst(), 2);
        assert_eq!(limiters.len(), 2);
    }
}
