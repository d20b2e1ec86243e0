//! Reconciliation loop primitives.
//!
//! This library provides the dispatcher-side helpers for driving
//! reconciliation loops that converge desired state to current state:
//!
//! - **Work queue**: keyed, deduplicating, at-most-one-in-flight per key.
//! - **Backoff**: exponential delay with jitter for failed passes.
//! - **Retry tracking**: per-key failure counts within a window.
//!
//! # Invariants
//!
//! - A key is never handed to two workers at the same time
//! - Adding a queued key is a no-op; adding an in-flight key defers it
//!   until the in-flight pass reports `done`
//! - Backoff delay never exceeds the configured maximum (plus jitter)

mod queue;

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use rand::Rng;

pub use queue::WorkQueue;

/// Exponential backoff configuration.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Base delay for the first retry.
    pub base: Duration,

    /// Maximum delay.
    pub max: Duration,

    /// Jitter factor (0.0 to 1.0).
    pub jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(100),
            max: Duration::from_secs(30),
            jitter: 0.25,
        }
    }
}

impl BackoffPolicy {
    /// Calculate delay for the given attempt number (0-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay = self.base.as_millis() as f64 * 2.0_f64.powi(exp);
        let delay = delay.min(self.max.as_millis() as f64);

        let jitter_range = delay * self.jitter.clamp(0.0, 1.0);
        let jitter = if jitter_range > 0.0 {
            rand::rng().random_range(-jitter_range..=jitter_range)
        } else {
            0.0
        };

        Duration::from_millis((delay + jitter).max(0.0) as u64)
    }
}

/// Retry tracker for failed reconciliations.
#[derive(Debug, Clone)]
pub struct RetryTracker<K> {
    /// Maximum retries per key within the window.
    max_retries: u32,

    /// Retry window duration.
    window: Duration,

    /// Tracked failures: key -> (count, first_failure_time).
    failures: BTreeMap<K, (u32, Instant)>,
}

impl<K: Ord + Clone> RetryTracker<K> {
    pub fn new(max_retries: u32, window: Duration) -> Self {
        Self {
            max_retries,
            window,
            failures: BTreeMap::new(),
        }
    }

    /// Record a failure for a key.
    ///
    /// Returns the number of failures recorded within the current window,
    /// starting at 1.
    pub fn record_failure(&mut self, key: &K) -> u32 {
        let now = Instant::now();

        let (count, first) = self.failures.entry(key.clone()).or_insert((0, now));

        // Reset if outside window
        if now.duration_since(*first) > self.window {
            *count = 0;
            *first = now;
        }

        *count = count.saturating_add(1);
        *count
    }

    /// Number of failures currently counted for a key.
    pub fn failures(&self, key: &K) -> u32 {
        match self.failures.get(key) {
            Some((count, first)) if first.elapsed() <= self.window => *count,
            _ => 0,
        }
    }

    /// Check if retries are exhausted for a key.
    pub fn is_exhausted(&self, key: &K) -> bool {
        self.failures(key) > self.max_retries
    }

    /// Clear failure tracking for a key (on success).
    pub fn clear(&mut self, key: &K) {
        self.failures.remove(key);
    }

    /// Prune expired entries.
    pub fn prune(&mut self) {
        let window = self.window;
        self.failures
            .retain(|_, (_, first)| first.elapsed() <= window);
    }
}

/// Default periodic resync interval.
pub const DEFAULT_RESYNC_INTERVAL: Duration = Duration::from_secs(30);

/// Default retry limit before a key is reported as persistently failing.
pub const DEFAULT_MAX_RETRIES: u32 = 10;

/// Default retry window.
pub const DEFAULT_RETRY_WINDOW: Duration = Duration::from_secs(10 * 60); // 10 minutes
