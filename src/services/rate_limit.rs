//! Per-client token bucket rate limiting.

use crate::{errors::AppError, state::AppState};
use axum::{
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::{
    collections::HashMap,
    net::SocketAddr,
    time::{Duration, Instant},
};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Number of tracked clients above which idle buckets are swept.
const SWEEP_THRESHOLD: usize = 1024;
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Token bucket limiter keyed by client address.
///
/// Buckets that have refilled completely carry no state worth keeping and
/// are dropped by a periodic sweep.
#[derive(Debug)]
pub struct RateLimiter {
    state: Mutex<Buckets>,
    refill_rate: f64, // tokens per second
    max_tokens: u32,
    sweep_threshold: usize,
    sweep_interval: Duration,
}

#[derive(Debug)]
struct Buckets {
    by_client: HashMap<String, TokenBucket>,
    last_sweep: Instant,
}

#[derive(Debug, Clone)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    /// Allow `per_minute` requests per client, with bursts up to the same amount.
    pub fn per_minute(per_minute: u32) -> Self {
        Self::with_rate(per_minute as f64 / 60.0, per_minute)
    }

    pub fn with_rate(refill_rate: f64, max_tokens: u32) -> Self {
        Self {
            state: Mutex::new(Buckets {
                by_client: HashMap::new(),
                last_sweep: Instant::now(),
            }),
            refill_rate,
            max_tokens,
            sweep_threshold: SWEEP_THRESHOLD,
            sweep_interval: SWEEP_INTERVAL,
        }
    }

    /// Take one token for `client`. Returns false when the client is over its limit.
    pub async fn check(&self, client: &str) -> bool {
        let mut state = self.state.lock().await;

        let now = Instant::now();
        if state.by_client.len() >= self.sweep_threshold
            && now.duration_since(state.last_sweep) >= self.sweep_interval
        {
            self.sweep(&mut state, now);
        }

        let bucket = state
            .by_client
            .entry(client.to_string())
            .or_insert_with(|| TokenBucket {
                tokens: self.max_tokens as f64,
                last_refill: now,
            });

        let elapsed = now.duration_since(bucket.last_refill);
        bucket.tokens =
            (bucket.tokens + elapsed.as_secs_f64() * self.refill_rate).min(self.max_tokens as f64);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Drop buckets that would be full by now.
    fn sweep(&self, state: &mut Buckets, now: Instant) {
        let before = state.by_client.len();
        state.by_client.retain(|_, bucket| {
            let refilled = bucket.tokens
                + now.duration_since(bucket.last_refill).as_secs_f64() * self.refill_rate;
            refilled < self.max_tokens as f64
        });
        state.last_sweep = now;
        debug!(
            dropped = before - state.by_client.len(),
            remaining = state.by_client.len(),
            "swept idle rate limit buckets"
        );
    }
}

/// Middleware rejecting requests from clients that exceed the limit with 429.
pub async fn rate_limit(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let client = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    if !state.limiter.check(&client).await {
        warn!(client = %client, "rate limit exceeded");
        return AppError::new(StatusCode::TOO_MANY_REQUESTS, "Too many requests").into_response();
    }

    next.run(request).await
}
