// Rate limiter - throttles actions per identifier inside a time window.
//
// This service handles:
// - Counting requests per `prefix:identifier` key
// - Escalating to a temporary hard block when the quota is exceeded
// - Lazily expiring windows and blocks on read
// - A periodic sweep that keeps memory bounded
//
// State is process-local. A restart resets every limit, and several
// instances behind a load balancer do NOT share budgets.

use super::rate_limit_models::{deadline_after, RateLimitConfig, RateLimitEntry, RateLimitResult};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// In-memory rate limiter shared by all request handlers.
///
/// The DashMap entry API gives us per-key atomicity without a global lock,
/// so concurrent requests from different clients never wait on each other.
pub struct RateLimiter {
    entries: DashMap<String, RateLimitEntry>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Check the quota for `identifier` and consume one request if allowed.
    ///
    /// Never fails: every call returns a verdict.
    pub fn check_and_consume(&self, identifier: &str, config: &RateLimitConfig) -> RateLimitResult {
        self.check_and_consume_at(identifier, config, Instant::now())
    }

    /// Same as [`check_and_consume`](Self::check_and_consume) with an explicit clock.
    pub fn check_and_consume_at(
        &self,
        identifier: &str,
        config: &RateLimitConfig,
        now: Instant,
    ) -> RateLimitResult {
        let key = config.key_for(identifier);

        match self.entries.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(RateLimitEntry::fresh(now, config.window));
                RateLimitResult::allowed(config.max_requests.saturating_sub(1), config.window)
            }
            Entry::Occupied(mut slot) => {
                let entry = slot.get_mut();

                // Running block: report it and leave the entry untouched
                if let Some(expires_at) = entry.active_block(now) {
                    return RateLimitResult::blocked(expires_at.saturating_duration_since(now));
                }

                // Expired block or expired window both start over
                if entry.blocked || entry.window_expired(now) {
                    *entry = RateLimitEntry::fresh(now, config.window);
                    return RateLimitResult::allowed(
                        config.max_requests.saturating_sub(1),
                        config.window,
                    );
                }

                if entry.count >= config.max_requests {
                    if config.block_duration.is_zero() {
                        return RateLimitResult::denied(
                            entry.window_reset_at.saturating_duration_since(now),
                        );
                    }

                    let expires_at = deadline_after(now, config.block_duration);
                    entry.blocked = true;
                    entry.block_expires_at = Some(expires_at);
                    tracing::warn!(
                        key = %slot.key(),
                        block_secs = config.block_duration.as_secs(),
                        "Rate limit exceeded, blocking client"
                    );
                    return RateLimitResult::blocked(expires_at.saturating_duration_since(now));
                }

                entry.count += 1;
                RateLimitResult::allowed(
                    config.max_requests.saturating_sub(entry.count),
                    entry.window_reset_at.saturating_duration_since(now),
                )
            }
        }
    }

    /// Drop entries whose window passed (unblocked) or whose block expired.
    ///
    /// Returns how many entries were removed.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    pub fn sweep_at(&self, now: Instant) -> usize {
        let before = self.entries.len();
        // retain() locks one shard at a time, so checks on other shards keep going
        self.entries.retain(|_, entry| !entry.is_stale(now));
        before.saturating_sub(self.entries.len())
    }

    /// Number of tracked keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Spawn the background sweep. Runs every `every` until the handle is aborted.
    pub fn spawn_sweeper(self: Arc<Self>, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let removed = self.sweep();
                tracing::debug!(removed, remaining = self.len(), "Rate limit sweep finished");
            }
        })
    }

    #[cfg(test)]
    pub(crate) fn entry_snapshot(&self, key: &str) -> Option<RateLimitEntry> {
        self.entries.get(key).map(|e| e.clone())
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================
