// Rate limit domain models - policy, per-key state and the verdict handed back to callers.
//
// Pure data types. The HTTP layer turns a `RateLimitResult` into
// `X-RateLimit-*` / `Retry-After` headers.

use std::time::{Duration, Instant};

// Stand-in deadline when `now + span` does not fit in an `Instant`
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// `now + span`, saturating instead of panicking on huge spans.
pub(crate) fn deadline_after(now: Instant, span: Duration) -> Instant {
    now.checked_add(span)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

/// Policy for one class of limited actions.
///
/// `prefix` namespaces the limiter so the same identifier gets an independent
/// budget per resource class ("comment" vs. anything added later).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Requests allowed inside one window
    pub max_requests: u32,
    /// Length of the counting window
    pub window: Duration,
    /// How long to hard-block after the quota is exceeded (zero = never block)
    pub block_duration: Duration,
    /// Namespace for the key (`prefix:identifier`)
    pub prefix: String,
}

impl RateLimitConfig {
    /// Policy applied to comment submissions: 3 per minute, then a 10 minute block.
    pub fn comment_policy() -> Self {
        Self {
            max_requests: 3,
            window: Duration::from_secs(60),
            block_duration: Duration::from_secs(600),
            prefix: "comment".to_string(),
        }
    }

    pub(crate) fn key_for(&self, identifier: &str) -> String {
        format!("{}:{}", self.prefix, identifier)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::comment_policy()
    }
}

/// State kept for a single `prefix:identifier` key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitEntry {
    /// Requests observed in the current window
    pub count: u32,
    /// When the count resets
    pub window_reset_at: Instant,
    /// Escalated block in effect
    pub blocked: bool,
    /// Only present while `blocked` is true
    pub block_expires_at: Option<Instant>,
}

impl RateLimitEntry {
    /// A new window holding the request that opened it.
    pub fn fresh(now: Instant, window: Duration) -> Self {
        Self {
            count: 1,
            window_reset_at: deadline_after(now, window),
            blocked: false,
            block_expires_at: None,
        }
    }

    /// The block deadline, if the block is still running at `now`.
    pub fn active_block(&self, now: Instant) -> Option<Instant> {
        match self.block_expires_at {
            Some(expires_at) if self.blocked && now < expires_at => Some(expires_at),
            _ => None,
        }
    }

    pub fn window_expired(&self, now: Instant) -> bool {
        now > self.window_reset_at
    }

    /// Whether the periodic sweep may drop this entry.
    pub fn is_stale(&self, now: Instant) -> bool {
        if self.blocked {
            self.active_block(now).is_none()
        } else {
            self.window_expired(now)
        }
    }
}

/// Verdict for a single `check_and_consume` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitResult {
    pub allowed: bool,
    pub remaining: u32,
    /// Time until the window (or the block, while blocked) ends
    pub reset_in: Duration,
    pub blocked: bool,
    pub block_expires_in: Option<Duration>,
}

impl RateLimitResult {
    pub fn allowed(remaining: u32, reset_in: Duration) -> Self {
        Self {
            allowed: true,
            remaining,
            reset_in,
            blocked: false,
            block_expires_in: None,
        }
    }

    /// Quota used up but no block configured.
    pub fn denied(reset_in: Duration) -> Self {
        Self {
            allowed: false,
            remaining: 0,
            reset_in,
            blocked: false,
            block_expires_in: None,
        }
    }

    pub fn blocked(expires_in: Duration) -> Self {
        Self {
            allowed: false,
            remaining: 0,
            reset_in: expires_in,
            blocked: true,
            block_expires_in: Some(expires_in),
        }
    }

    /// How long a denied caller should wait before trying again.
    pub fn retry_after(&self) -> Duration {
        self.block_expires_in.unwrap_or(self.reset_in)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comment_policy_values() {
        let policy = RateLimitConfig::comment_policy();
        assert_eq!(policy.max_requests, 3);
        assert_eq!(policy.window, Duration::from_secs(60));
        assert_eq!(policy.block_duration, Duration::from_secs(600));
        assert_eq!(policy.key_for("1.2.3.4"), "comment:1.2.3.4");
    }

    #[test]
    fn test_expired_block_is_stale() {
        let now = Instant::now();
        let entry = RateLimitEntry {
            count: 3,
            window_reset_at: now + Duration::from_secs(60),
            blocked: true,
            block_expires_at: Some(now + Duration::from_secs(10)),
        };

        assert!(!entry.is_stale(now));
        assert!(entry.is_stale(now + Duration::from_secs(10)));
    }

    #[test]
    fn test_retry_after_prefers_block() {
        let result = RateLimitResult::blocked(Duration::from_secs(42));
        assert_eq!(result.retry_after(), Duration::from_secs(42));

        let result = RateLimitResult::denied(Duration::from_secs(7));
        assert_eq!(result.retry_after(), Duration::from_secs(7));
    }

    #[test]
    fn test_huge_window_does_not_overflow() {
        let now = Instant::now();
        let entry = RateLimitEntry::fresh(now, Duration::MAX);

        assert!(entry.window_reset_at > now);
        assert!(!entry.window_expired(now + Duration::from_secs(3600)));
    }
}
