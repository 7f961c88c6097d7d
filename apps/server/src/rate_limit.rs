//! Per-IP sliding-window rate limiting. One limiter instance is shared by
//! every route group; each group attaches the middleware with its tier.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use dashmap::DashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::models::ApiResponse;

/// Request class, each with its own budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    /// Read-only endpoints: settings, availability, booked hours.
    Public,
    /// Reservation create/change. Strictest.
    Booking,
    /// Password attempts.
    Auth,
    /// Settings and content writes behind an admin session.
    Admin,
}

impl Tier {
    fn max_requests(self) -> usize {
        match self {
            Tier::Public => 60,
            Tier::Booking => 5,
            Tier::Auth => 10,
            Tier::Admin => 120,
        }
    }

    fn window(self) -> Duration {
        match self {
            Tier::Public => Duration::from_secs(60),
            Tier::Booking => Duration::from_secs(300),
            Tier::Auth => Duration::from_secs(60),
            Tier::Admin => Duration::from_secs(60),
        }
    }
}

/// In-memory limiter keyed by (tier, client IP), values are timestamps of
/// requests still inside the window.
#[derive(Debug, Clone, Default)]
pub struct RateLimiter {
    hits: Arc<DashMap<(Tier, IpAddr), Vec<Instant>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `Err(retry_after_secs)` when the budget is exhausted.
    pub fn check(&self, tier: Tier, ip: IpAddr) -> Result<(), u64> {
        let now = Instant::now();
        let window = tier.window();
        let mut entry = self.hits.entry((tier, ip)).or_default();

        entry.retain(|t| now.duration_since(*t) < window);

        if entry.len() >= tier.max_requests() {
            let oldest = entry[0];
            let retry_after = (oldest + window)
                .saturating_duration_since(now)
                .as_secs()
                .max(1);
            return Err(retry_after);
        }

        entry.push(now);
        Ok(())
    }

    /// Drop entries idle for more than twice their window. Run from a
    /// periodic background task.
    pub fn cleanup(&self) {
        let now = Instant::now();
        self.hits.retain(|(tier, _), timestamps| {
            let cutoff = tier.window() * 2;
            timestamps.retain(|t| now.duration_since(*t) < cutoff);
            !timestamps.is_empty()
        });
    }
}

/// Client IP: X-Forwarded-For when a reverse proxy fronts us, otherwise the
/// socket peer address.
fn client_ip(req: &Request) -> IpAddr {
    if let Some(forwarded) = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
    {
        if let Some(first) = forwarded.split(',').next() {
            if let Ok(ip) = first.trim().parse() {
                return ip;
            }
        }
    }
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip())
        .unwrap_or_else(|| "127.0.0.1".parse().unwrap())
}

/// Middleware shared by every tier; attach with
/// `from_fn_with_state((limiter, Tier::...), rate_limit)`.
pub async fn rate_limit(
    State((limiter, tier)): State<(RateLimiter, Tier)>,
    req: Request,
    next: Next,
) -> Result<Response, Response> {
    let ip = client_ip(&req);
    limiter.check(tier, ip).map_err(|retry_after| {
        (
            StatusCode::TOO_MANY_REQUESTS,
            [("Retry-After", retry_after.to_string())],
            Json(ApiResponse::<()>::error(format!(
                "Too many requests. Try again in {retry_after} seconds"
            ))),
        )
            .into_response()
    })?;
    Ok(next.run(req).await)
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn test_ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
    }

    #[test]
    fn test_allows_under_budget() {
        let limiter = RateLimiter::new();
        let ip = test_ip(1);
        for _ in 0..Tier::Booking.max_requests() {
            assert!(limiter.check(Tier::Booking, ip).is_ok());
        }
    }

    #[test]
    fn test_rejects_over_budget() {
        let limiter = RateLimiter::new();
        let ip = test_ip(1);
        for _ in 0..Tier::Booking.max_requests() {
            limiter.check(Tier::Booking, ip).unwrap();
        }
        let retry_after = limiter.check(Tier::Booking, ip).unwrap_err();
        assert!(retry_after >= 1);
        assert!(retry_after <= Tier::Booking.window().as_secs());
    }

    #[test]
    fn test_ips_are_independent() {
        let limiter = RateLimiter::new();
        for _ in 0..Tier::Booking.max_requests() {
            limiter.check(Tier::Booking, test_ip(1)).unwrap();
        }
        assert!(limiter.check(Tier::Booking, test_ip(1)).is_err());
        assert!(limiter.check(Tier::Booking, test_ip(2)).is_ok());
    }

    #[test]
    fn test_tiers_are_independent() {
        let limiter = RateLimiter::new();
        let ip = test_ip(1);
        for _ in 0..Tier::Booking.max_requests() {
            limiter.check(Tier::Booking, ip).unwrap();
        }
        assert!(limiter.check(Tier::Booking, ip).is_err());
        assert!(limiter.check(Tier::Public, ip).is_ok());
    }

    #[test]
    fn test_cleanup_preserves_active_entries() {
        let limiter = RateLimiter::new();
        let ip = test_ip(1);
        limiter.check(Tier::Auth, ip).unwrap();
        limiter.cleanup();
        // The fresh hit still counts toward the budget.
        for _ in 1..Tier::Auth.max_requests() {
            limiter.check(Tier::Auth, ip).unwrap();
        }
        assert!(limiter.check(Tier::Auth, ip).is_err());
    }
}
