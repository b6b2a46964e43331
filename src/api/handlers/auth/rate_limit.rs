//! Rate limiting primitives for auth flows.
//!
//! Limits are enforced in-process with a fixed window per (action, key).
//! The trait seam keeps a shared store swappable without touching handlers.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RateLimitAction {
    Register,
    Login,
    VerifyEmail,
    ResendVerification,
}

impl RateLimitAction {
    /// Attempts allowed per one-minute window.
    #[must_use]
    pub const fn limit(self) -> u32 {
        match self {
            Self::Register | Self::Login => 5,
            Self::VerifyEmail | Self::ResendVerification => 6,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Limited,
}

pub trait RateLimiter: Send + Sync {
    fn check(&self, action: RateLimitAction, key: &str) -> RateLimitDecision;
}

/// Login attempts are throttled per email+IP pair.
#[must_use]
pub fn throttle_key(email: &str, ip: Option<&str>) -> String {
    format!("{email}|{}", ip.unwrap_or("unknown"))
}

#[derive(Clone, Debug)]
pub struct NoopRateLimiter;

impl RateLimiter for NoopRateLimiter {
    fn check(&self, _action: RateLimitAction, _key: &str) -> RateLimitDecision {
        RateLimitDecision::Allowed
    }
}

struct Window {
    started_at: Instant,
    count: u32,
}

/// Fixed one-minute windows keyed by (action, caller key).
pub struct FixedWindowRateLimiter {
    window: Duration,
    windows: Mutex<HashMap<(RateLimitAction, String), Window>>,
}

impl FixedWindowRateLimiter {
    #[must_use]
    pub fn new() -> Self {
        Self::with_window(Duration::from_secs(60))
    }

    #[must_use]
    pub fn with_window(window: Duration) -> Self {
        Self {
            window,
            windows: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for FixedWindowRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter for FixedWindowRateLimiter {
    fn check(&self, action: RateLimitAction, key: &str) -> RateLimitDecision {
        let now = Instant::now();
        let Ok(mut windows) = self.windows.lock() else {
            // A poisoned lock means a panic elsewhere; fail open.
            return RateLimitDecision::Allowed;
        };

        // Prune expired windows while the map is held to bound its size.
        windows.retain(|_, window| now.duration_since(window.started_at) < self.window);

        let window = windows
            .entry((action, key.to_string()))
            .or_insert(Window {
                started_at: now,
                count: 0,
            });

        if window.count < action.limit() {
            window.count += 1;
            RateLimitDecision::Allowed
        } else {
            RateLimitDecision::Limited
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_rate_limiter_allows() {
        let limiter = NoopRateLimiter;
        assert_eq!(
            limiter.check(RateLimitAction::Login, "user@example.com|1.2.3.4"),
            RateLimitDecision::Allowed
        );
    }

    #[test]
    fn login_limited_on_sixth_attempt() {
        let limiter = FixedWindowRateLimiter::new();
        let key = throttle_key("jane@x.com", Some("1.2.3.4"));
        for _ in 0..5 {
            assert_eq!(
                limiter.check(RateLimitAction::Login, &key),
                RateLimitDecision::Allowed
            );
        }
        assert_eq!(
            limiter.check(RateLimitAction::Login, &key),
            RateLimitDecision::Limited
        );
    }

    #[test]
    fn verification_allows_six_per_window() {
        let limiter = FixedWindowRateLimiter::new();
        for _ in 0..6 {
            assert_eq!(
                limiter.check(RateLimitAction::VerifyEmail, "user-1"),
                RateLimitDecision::Allowed
            );
        }
        assert_eq!(
            limiter.check(RateLimitAction::VerifyEmail, "user-1"),
            RateLimitDecision::Limited
        );
    }

    #[test]
    fn keys_are_independent() {
        let limiter = FixedWindowRateLimiter::new();
        for _ in 0..5 {
            limiter.check(RateLimitAction::Login, "jane@x.com|1.2.3.4");
        }
        assert_eq!(
            limiter.check(RateLimitAction::Login, "jane@x.com|5.6.7.8"),
            RateLimitDecision::Allowed
        );
    }

    #[test]
    fn actions_are_independent() {
        let limiter = FixedWindowRateLimiter::new();
        for _ in 0..5 {
            limiter.check(RateLimitAction::Login, "jane@x.com|1.2.3.4");
        }
        assert_eq!(
            limiter.check(RateLimitAction::Register, "jane@x.com|1.2.3.4"),
            RateLimitDecision::Allowed
        );
    }

    #[test]
    fn window_resets() {
        let limiter = FixedWindowRateLimiter::with_window(Duration::from_millis(20));
        for _ in 0..5 {
            limiter.check(RateLimitAction::Login, "key");
        }
        assert_eq!(
            limiter.check(RateLimitAction::Login, "key"),
            RateLimitDecision::Limited
        );
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(
            limiter.check(RateLimitAction::Login, "key"),
            RateLimitDecision::Allowed
        );
    }

    #[test]
    fn throttle_key_includes_ip() {
        assert_eq!(
            throttle_key("jane@x.com", Some("1.2.3.4")),
            "jane@x.com|1.2.3.4"
        );
        assert_eq!(throttle_key("jane@x.com", None), "jane@x.com|unknown");
    }
}
