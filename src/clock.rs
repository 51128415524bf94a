// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2026 The neonlink-core Authors

//! Monotonic time source, kept as a narrow trait so tests can freeze time
//! instead of sleeping.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Capability for reading wall-clock milliseconds and a monotonic instant.
///
/// Sampling, heartbeats, and rate limiting all go through this trait rather
/// than calling `SystemTime::now()`/`Instant::now()` directly, the same
/// narrow-capability shape the design notes ask for (`Sampler`,
/// `CommandHandler`, `Clock`).
pub trait Clock: Send + Sync + 'static {
    /// Milliseconds since the Unix epoch, for wire timestamps.
    fn now_ms(&self) -> i64;

    /// A monotonic instant, for interval timing and lease checks.
    fn monotonic_now(&self) -> Instant;
}

/// Default clock backed by the OS.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    }

    fn monotonic_now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that can be advanced manually, for deterministic tests of the
/// rate limiter and heartbeat sweep.
#[derive(Debug)]
pub struct MockClock {
    epoch: Instant,
    offset_ms: AtomicI64,
    base_ms: i64,
}

impl MockClock {
    pub fn new(base_ms: i64) -> Self {
        Self {
            epoch: Instant::now(),
            offset_ms: AtomicI64::new(0),
            base_ms,
        }
    }

    pub fn advance_ms(&self, delta_ms: i64) {
        self.offset_ms.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl Clock for MockClock {
    fn now_ms(&self) -> i64 {
        self.base_ms + self.offset_ms.load(Ordering::SeqCst)
    }

    fn monotonic_now(&self) -> Instant {
        self.epoch + std::time::Duration::from_millis(self.offset_ms.load(Ordering::SeqCst).max(0) as u64)
    }
}
