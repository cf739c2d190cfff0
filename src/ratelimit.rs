//! In-memory token-bucket rate limiting keyed by client address.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_client_ip::SecureClientIp;
use tokio::sync::Mutex;

use crate::{error::AppError, state::AppState};

/// Buckets beyond this count trigger a sweep of idle, full buckets.
const SWEEP_THRESHOLD: usize = 10_000;
/// Wait reported when the bucket never refills.
const NO_REFILL_RETRY: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub capacity: u32,
    /// Tokens added per second.
    pub refill_rate: f64,
}

impl RateLimitConfig {
    pub fn per_minute(requests: u32) -> Self {
        Self {
            capacity: requests,
            refill_rate: f64::from(requests) / 60.0,
        }
    }
}

#[derive(Clone)]
pub struct RateLimiter {
    buckets: Arc<Mutex<HashMap<IpAddr, TokenBucket>>>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        tracing::info!(
            capacity = config.capacity,
            refill_rate = config.refill_rate,
            "rate limiter initialized"
        );
        Self {
            buckets: Arc::new(Mutex::new(HashMap::new())),
            config,
        }
    }

    pub async fn check(&self, ip: IpAddr) -> Result<(), AppError> {
        self.check_at(ip, Instant::now()).await
    }

    pub async fn check_at(&self, ip: IpAddr, now: Instant) -> Result<(), AppError> {
        let capacity = f64::from(self.config.capacity);
        let rate = self.config.refill_rate;
        let mut buckets = self.buckets.lock().await;

        if buckets.len() > SWEEP_THRESHOLD {
            buckets.retain(|_, b| {
                b.tokens + now.saturating_duration_since(b.last_refill).as_secs_f64() * rate < capacity
            });
        }

        let bucket = buckets.entry(ip).or_insert(TokenBucket {
            tokens: capacity,
            last_refill: now,
        });
        let elapsed = now.saturating_duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * rate).min(capacity);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            return Ok(());
        }

        let retry_after = if rate > 0.0 {
            Duration::from_secs_f64(((1.0 - bucket.tokens) / rate).ceil())
        } else {
            NO_REFILL_RETRY
        };
        tracing::warn!(%ip, retry_after_secs = retry_after.as_secs(), "rate limit exceeded");
        Err(AppError::RateLimited { retry_after })
    }
}

/// Client address comes from the `SecureClientIpSource` extension set in `build_app`.
pub async fn rate_limit_me(
    SecureClientIp(ip): SecureClientIp,
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    match state.me_limiter.check(ip).await {
        Ok(()) => next.run(request).await,
        Err(error) => error.into_response(),
    }
}
