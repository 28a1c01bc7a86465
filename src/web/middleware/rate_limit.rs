//! Per-client rate limiting middleware.
//!
//! Clients are keyed by IP. By default that is the TCP peer address;
//! `X-Forwarded-For` / `X-Real-IP` are honored only when the server is
//! configured to sit behind a trusted reverse proxy, since any client can
//! set them.

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::{
    collections::HashMap,
    net::SocketAddr,
    num::NonZeroU32,
    sync::{Arc, Mutex, PoisonError, RwLock},
    time::{Duration, Instant},
};

use crate::web::error::ApiError;

/// Rate limiter for a single client.
pub type IpRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// A per-minute quota is fully replenished after this much idle time, so
/// forgetting such a client never resets a partly used budget.
const IDLE_RETENTION: Duration = Duration::from_secs(60);

const CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

struct ClientLimiter {
    limiter: IpRateLimiter,
    last_seen: Mutex<Instant>,
}

impl ClientLimiter {
    fn touch(&self) {
        *self.last_seen.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    fn idle_for(&self) -> Duration {
        self.last_seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed()
    }
}

/// State for rate limiting.
pub struct RateLimitState {
    limiters: RwLock<HashMap<String, Arc<ClientLimiter>>>,
    requests_per_minute: u32,
    trust_proxy_headers: bool,
}

impl RateLimitState {
    /// Create a rate limiter keyed by the TCP peer address.
    pub fn new(requests_per_minute: u32) -> Self {
        Self {
            limiters: RwLock::new(HashMap::new()),
            requests_per_minute,
            trust_proxy_headers: false,
        }
    }

    /// Key clients by `X-Forwarded-For` / `X-Real-IP` when present.
    ///
    /// Only safe behind a reverse proxy that overwrites those headers.
    pub fn with_trusted_proxy_headers(mut self, trust: bool) -> Self {
        self.trust_proxy_headers = trust;
        self
    }

    fn limiter_for(&self, ip: &str) -> Arc<ClientLimiter> {
        {
            let read_guard = self.limiters.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(client) = read_guard.get(ip) {
                return client.clone();
            }
        }

        let mut write_guard = self.limiters.write().unwrap_or_else(PoisonError::into_inner);
        write_guard
            .entry(ip.to_string())
            .or_insert_with(|| {
                let per_minute =
                    NonZeroU32::new(self.requests_per_minute).unwrap_or(NonZeroU32::MIN);
                Arc::new(ClientLimiter {
                    limiter: RateLimiter::direct(Quota::per_minute(per_minute)),
                    last_seen: Mutex::new(Instant::now()),
                })
            })
            .clone()
    }

    /// Check if a request from `ip` is allowed.
    pub fn check(&self, ip: &str) -> bool {
        let client = self.limiter_for(ip);
        client.touch();
        client.limiter.check().is_ok()
    }

    /// Forget clients that have been idle long enough to be back at a full
    /// budget.
    pub fn cleanup(&self) {
        self.cleanup_idle(IDLE_RETENTION);
    }

    fn cleanup_idle(&self, max_idle: Duration) {
        let mut guard = self.limiters.write().unwrap_or_else(PoisonError::into_inner);
        let before = guard.len();
        guard.retain(|_, client| Arc::strong_count(client) > 1 || client.idle_for() < max_idle);
        tracing::debug!(dropped = before - guard.len(), "Rate limiter cleanup");
    }

    /// Start a background task to periodically clean up idle clients.
    pub fn start_cleanup_task(self: Arc<Self>) {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(CLEANUP_INTERVAL);
            // The first tick fires immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                self.cleanup();
            }
        });
    }

    fn client_ip(&self, req: &Request<Body>) -> String {
        if self.trust_proxy_headers {
            // Proxies append, so the original client comes first.
            let forwarded = req
                .headers()
                .get("X-Forwarded-For")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
                .map(str::trim)
                .filter(|ip| !ip.is_empty());
            if let Some(ip) = forwarded {
                return ip.to_string();
            }

            if let Some(real_ip) = req
                .headers()
                .get("X-Real-IP")
                .and_then(|v| v.to_str().ok())
            {
                return real_ip.trim().to_string();
            }
        }

        match req.extensions().get::<ConnectInfo<SocketAddr>>() {
            Some(ConnectInfo(addr)) => addr.ip().to_string(),
            None => "unknown".to_string(),
        }
    }
}

/// Rate limiting middleware for the API.
pub async fn api_rate_limit(
    state: Arc<RateLimitState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let ip = state.client_ip(&req);

    if !state.check(&ip) {
        tracing::warn!(ip = %ip, "API rate limit exceeded");
        return ApiError::too_many_requests("Too many requests. Please try again later.")
            .into_response();
    }

    next.run(req).await
}
