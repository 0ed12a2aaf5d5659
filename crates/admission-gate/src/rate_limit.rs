use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Fixed-window request counter keyed by caller and capability.
///
/// Window reset, evaluation and increment all happen while the key's
/// dashmap entry is held, so concurrent callers on one key serialize.
#[derive(Default)]
pub struct RateLimiter {
    windows: DashMap<String, WindowCounter>,
}

/// Point-in-time view of a single key's window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitUsage {
    pub count: u32,
    pub window_start: Instant,
}

#[derive(Clone, Debug)]
struct WindowCounter {
    count: u32,
    window_start: Instant,
    window: Duration,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_consume(&self, key: &str, limit: u32, window: Duration) -> bool {
        self.try_consume_at(key, limit, window, Instant::now())
    }

    /// A `limit` of zero disables limiting for the call and records nothing.
    pub fn try_consume_at(&self, key: &str, limit: u32, window: Duration, now: Instant) -> bool {
        if limit == 0 {
            return true;
        }

        let mut entry = self
            .windows
            .entry(key.to_string())
            .or_insert_with(|| WindowCounter::new(now, window));
        entry.consume(limit, window, now)
    }

    pub fn usage(&self, key: &str) -> Option<RateLimitUsage> {
        self.windows.get(key).map(|entry| RateLimitUsage {
            count: entry.count,
            window_start: entry.window_start,
        })
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    pub fn prune_idle(&self, max_idle: Duration) -> usize {
        self.prune_idle_at(max_idle, Instant::now())
    }

    /// Drops keys whose window closed more than `max_idle` before `now`.
    pub fn prune_idle_at(&self, max_idle: Duration, now: Instant) -> usize {
        if max_idle.is_zero() {
            return 0;
        }
        let before = self.windows.len();
        self.windows
            .retain(|_, counter| !counter.is_idle(now, max_idle));
        before.saturating_sub(self.windows.len())
    }
}

impl WindowCounter {
    fn new(now: Instant, window: Duration) -> Self {
        Self {
            count: 0,
            window_start: now,
            window,
        }
    }

    fn consume(&mut self, limit: u32, window: Duration, now: Instant) -> bool {
        self.window = window;
        if now.saturating_duration_since(self.window_start) >= window {
            self.count = 0;
            self.window_start = now;
        }
        if self.count >= limit {
            return false;
        }
        self.count += 1;
        true
    }

    fn is_idle(&self, now: Instant, max_idle: Duration) -> bool {
        let window_end = self.window_start + self.window;
        now.saturating_duration_since(window_end) >= max_idle
    }
}
