//! Per-IP sliding-window rate limiting
//!
//! Kept in process memory; counts reset on restart. Clients on trusted
//! networks are exempt.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::warn;

use crate::{get_client_ip, is_ip_trusted, AppState};

/// Rate limit settings
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Requests allowed per window per client IP
    pub max_requests: usize,
    /// Window length
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 60,
            window: Duration::from_secs(60),
        }
    }
}

/// Tracked-IP count above which stale entries are swept on each hit
const MAX_TRACKED_IPS: usize = 1024;

/// Sliding-window request counter keyed by client IP
pub struct RateLimiter {
    config: RateLimitConfig,
    hits: Mutex<HashMap<IpAddr, Vec<Instant>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            hits: Mutex::new(HashMap::new()),
        }
    }

    /// Record a request; Err carries the Retry-After seconds when over limit
    pub fn check(&self, ip: IpAddr) -> Result<(), u64> {
        let now = Instant::now();
        let mut hits = match self.hits.lock() {
            Ok(guard) => guard,
            // A poisoned lock fails open; throttling is best effort
            Err(poisoned) => poisoned.into_inner(),
        };

        let window = self.config.window;
        let entry = hits.entry(ip).or_default();
        entry.retain(|t| now.duration_since(*t) < window);

        if entry.len() >= self.config.max_requests {
            let retry_after = entry
                .first()
                .map(|oldest| window.saturating_sub(now.duration_since(*oldest)).as_secs() + 1)
                .unwrap_or(1);
            return Err(retry_after);
        }

        entry.push(now);

        // Evict IPs whose whole history has aged out so the map does not
        // grow unbounded; the current IP was just touched and survives
        if hits.len() > MAX_TRACKED_IPS {
            hits.retain(|_, v| v.last().is_some_and(|t| now.duration_since(*t) < window));
        }
        Ok(())
    }
}

/// Middleware enforcing the per-IP limit on /api routes
pub async fn rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    let Some(limiter) = &state.rate_limiter else {
        return next.run(request).await;
    };

    let client_ip = get_client_ip(request.headers(), addr.ip(), &state.config.trusted_proxies);
    if is_ip_trusted(client_ip, &state.config.trusted_networks) {
        return next.run(request).await;
    }

    match limiter.check(client_ip) {
        Ok(()) => next.run(request).await,
        Err(retry_after) => {
            warn!(ip = %client_ip, "Rate limit exceeded");
            (
                StatusCode::TOO_MANY_REQUESTS,
                [(header::RETRY_AFTER, retry_after.to_string())],
                Json(json!({"error": "Too many requests"})),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(last: u8) -> IpAddr {
        IpAddr::from([10, 0, 0, last])
    }

    #[test]
    fn test_allows_up_to_limit() {
        let limiter = RateLimiter::new(RateLimitConfig {
            max_requests: 3,
            window: Duration::from_secs(60),
        });
        assert!(limiter.check(ip(1)).is_ok());
        assert!(limiter.check(ip(1)).is_ok());
        assert!(limiter.check(ip(1)).is_ok());
        let retry = limiter.check(ip(1)).unwrap_err();
        assert!(retry >= 1);
    }

    #[test]
    fn test_limits_are_per_ip() {
        let limiter = RateLimiter::new(RateLimitConfig {
            max_requests: 1,
            window: Duration::from_secs(60),
        });
        assert!(limiter.check(ip(1)).is_ok());
        assert!(limiter.check(ip(2)).is_ok());
        assert!(limiter.check(ip(1)).is_err());
    }

    #[test]
    fn test_stale_ips_are_evicted() {
        let limiter = RateLimiter::new(RateLimitConfig {
            max_requests: 10,
            window: Duration::from_millis(10),
        });
        for third in 0..5u8 {
            for last in 0..=255u8 {
                assert!(limiter.check(IpAddr::from([10, 0, third, last])).is_ok());
            }
        }
        assert_eq!(limiter.hits.lock().unwrap().len(), 1280);

        std::thread::sleep(Duration::from_millis(20));
        assert!(limiter.check(ip(1)).is_ok());
        // Only the IP from the fresh request should remain
        assert_eq!(limiter.hits.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_window_expiry_frees_slots() {
        let limiter = RateLimiter::new(RateLimitConfig {
            max_requests: 1,
            window: Duration::from_millis(10),
        });
        assert!(limiter.check(ip(1)).is_ok());
        assert!(limiter.check(ip(1)).is_err());
        std::thread::sleep(Duration::from_millis(20));
        assert!(limiter.check(ip(1)).is_ok());
    }
}
