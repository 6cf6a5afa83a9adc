//! Per-client fixed-window request limiting.
//!
//! Every response carries `RateLimit-Limit`, `RateLimit-Remaining` and
//! `RateLimit-Reset`; a client over its budget gets a 429 through
//! [`ApiError`] plus `Retry-After`.

use std::{
    net::SocketAddr,
    time::{Duration, Instant},
};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use tracing::warn;

use crate::{config::RateLimitConfig, error::ApiError, state::AppState};

const LIMIT: HeaderName = HeaderName::from_static("ratelimit-limit");
const REMAINING: HeaderName = HeaderName::from_static("ratelimit-remaining");
const RESET: HeaderName = HeaderName::from_static("ratelimit-reset");

/// Expired windows are swept once the table grows past this.
const SWEEP_THRESHOLD: usize = 10_000;

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_after: Duration,
}

impl Decision {
    fn write_headers(&self, headers: &mut HeaderMap) {
        let reset = HeaderValue::from(self.reset_after.as_secs().max(1));
        headers.insert(LIMIT, HeaderValue::from(self.limit));
        headers.insert(REMAINING, HeaderValue::from(self.remaining));
        headers.insert(RESET, reset.clone());
        if !self.allowed {
            headers.insert(axum::http::header::RETRY_AFTER, reset);
        }
    }
}

pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    windows: DashMap<String, Window>,
}

impl RateLimiter {
    pub fn new(cfg: &RateLimitConfig) -> Self {
        Self {
            max_requests: cfg.max_requests,
            window: cfg.window,
            windows: DashMap::new(),
        }
    }

    pub fn check(&self, client: &str) -> Decision {
        self.check_at(client, Instant::now())
    }

    fn check_at(&self, client: &str, now: Instant) -> Decision {
        if self.windows.len() > SWEEP_THRESHOLD {
            let window = self.window;
            self.windows
                .retain(|_, w| now.saturating_duration_since(w.started) < window);
        }

        let mut entry = self.windows.entry(client.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });
        if now.saturating_duration_since(entry.started) >= self.window {
            *entry = Window {
                started: now,
                count: 0,
            };
        }

        let allowed = entry.count < self.max_requests;
        if allowed {
            entry.count += 1;
        }
        Decision {
            allowed,
            limit: self.max_requests,
            remaining: self.max_requests.saturating_sub(entry.count),
            reset_after: self
                .window
                .saturating_sub(now.saturating_duration_since(entry.started)),
        }
    }
}

/// Socket address when the server was started with connect info, else the
/// first `x-forwarded-for` hop.
fn client_key(req: &Request) -> String {
    if let Some(ConnectInfo(addr)) = req.extensions().get::<ConnectInfo<SocketAddr>>() {
        return addr.ip().to_string();
    }
    req.headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

pub async fn rate_limit(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let client = client_key(&req);
    let decision = state.limiter.check(&client);

    let mut res = if decision.allowed {
        next.run(req).await
    } else {
        warn!(client = %client, limit = decision.limit, "rate limit exceeded");
        ApiError::TooManyRequests.into_response()
    };
    decision.write_headers(res.headers_mut());
    res
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max_requests: u32, window_secs: u64) -> RateLimiter {
        RateLimiter::new(&RateLimitConfig {
            max_requests,
            window: Duration::from_secs(window_secs),
        })
    }

    #[test]
    fn budget_is_spent_then_refused() {
        let limiter = limiter(2, 60);
        let now = Instant::now();

        let first = limiter.check_at("1.2.3.4", now);
        assert!(first.allowed);
        assert_eq!(first.remaining, 1);

        let second = limiter.check_at("1.2.3.4", now);
        assert!(second.allowed);
        assert_eq!(second.remaining, 0);

        let third = limiter.check_at("1.2.3.4", now + Duration::from_secs(10));
        assert!(!third.allowed);
        assert_eq!(third.remaining, 0);
        assert_eq!(third.reset_after, Duration::from_secs(50));
    }

    #[test]
    fn clients_are_counted_separately() {
        let limiter = limiter(1, 60);
        let now = Instant::now();
        assert!(limiter.check_at("a", now).allowed);
        assert!(!limiter.check_at("a", now).allowed);
        assert!(limiter.check_at("b", now).allowed);
    }

    #[test]
    fn window_resets_after_it_elapses() {
        let limiter = limiter(1, 60);
        let now = Instant::now();
        assert!(limiter.check_at("a", now).allowed);
        assert!(!limiter.check_at("a", now + Duration::from_secs(59)).allowed);

        let fresh = limiter.check_at("a", now + Duration::from_secs(60));
        assert!(fresh.allowed);
        assert_eq!(fresh.reset_after, Duration::from_secs(60));
    }

    #[test]
    fn refused_decisions_carry_retry_after() {
        let mut headers = HeaderMap::new();
        Decision {
            allowed: false,
            limit: 100,
            remaining: 0,
            reset_after: Duration::from_secs(30),
        }
        .write_headers(&mut headers);
        assert_eq!(headers[LIMIT], "100");
        assert_eq!(headers[REMAINING], "0");
        assert_eq!(headers[RESET], "30");
        assert_eq!(headers[axum::http::header::RETRY_AFTER], "30");
    }
}
