//! Dispatch counters.
//!
//! Cheap atomic counters the dispatcher bumps for every inbound event, so the
//! demos (and tests) can see how many events were resolved, handled or dropped
//! without scraping logs.
//!
//! # Example
//!
//! ```rust
//! use selfkit_interactive::stats::DispatchStats;
//!
//! let stats = DispatchStats::new();
//! stats.record_received();
//! stats.record_unknown_request();
//!
//! let snapshot = stats.snapshot();
//! assert_eq!(snapshot.unknown_requests, 1);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Thread-safe dispatch counters.
#[derive(Debug)]
pub struct DispatchStats {
    received: AtomicU64,
    resolved: AtomicU64,
    unknown_requests: AtomicU64,
    handled: AtomicU64,
    decode_failures: AtomicU64,
    connections_accepted: AtomicU64,
    connection_failures: AtomicU64,
    start_time: Instant,
}

impl Default for DispatchStats {
    fn default() -> Self {
        Self::new()
    }
}

impl DispatchStats {
    pub fn new() -> Self {
        Self {
            received: AtomicU64::new(0),
            resolved: AtomicU64::new(0),
            unknown_requests: AtomicU64::new(0),
            handled: AtomicU64::new(0),
            decode_failures: AtomicU64::new(0),
            connections_accepted: AtomicU64::new(0),
            connection_failures: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    /// A response was delivered to its waiter.
    pub fn record_resolved(&self) {
        self.resolved.fetch_add(1, Ordering::Relaxed);
    }

    /// A response named a request nobody is waiting for.
    pub fn record_unknown_request(&self) {
        self.unknown_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// An unsolicited event was passed to the handler.
    pub fn record_handled(&self) {
        self.handled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decode_failure(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connection_accepted(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connection_failure(&self) {
        self.connection_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DispatchStatsSnapshot {
        DispatchStatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            resolved: self.resolved.load(Ordering::Relaxed),
            unknown_requests: self.unknown_requests.load(Ordering::Relaxed),
            handled: self.handled.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            connections_accepted: self.connections_accepted.load(Ordering::Relaxed),
            connection_failures: self.connection_failures.load(Ordering::Relaxed),
            uptime_secs: self.start_time.elapsed().as_secs(),
        }
    }
}

/// Point-in-time copy of [`DispatchStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct DispatchStatsSnapshot {
    pub received: u64,
    pub resolved: u64,
    pub unknown_requests: u64,
    pub handled: u64,
    pub decode_failures: u64,
    pub connections_accepted: u64,
    pub connection_failures: u64,
    pub uptime_secs: u64,
}

impl DispatchStatsSnapshot {
    /// Events that were dropped without reaching a waiter or handler.
    pub fn dropped(&self) -> u64 {
        self.unknown_requests + self.decode_failures
    }
}
