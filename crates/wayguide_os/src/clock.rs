#![forbid(unsafe_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use wayguide_kernel_contracts::MonotonicTimeNs;

pub trait Clock: Send + Sync {
    fn now(&self) -> MonotonicTimeNs;
}

/// Nanoseconds since the clock was created.
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> MonotonicTimeNs {
        MonotonicTimeNs(u64::try_from(self.origin.elapsed().as_nanos()).unwrap_or(u64::MAX))
    }
}

/// Hand-driven clock for deterministic tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ns: AtomicU64,
}

impl ManualClock {
    pub fn new(start: MonotonicTimeNs) -> Self {
        Self {
            now_ns: AtomicU64::new(start.0),
        }
    }

    pub fn set(&self, t: MonotonicTimeNs) {
        self.now_ns.store(t.0, Ordering::SeqCst);
    }

    pub fn set_secs(&self, secs: u64) {
        self.set(MonotonicTimeNs::from_secs(secs));
    }

    pub fn advance_ms(&self, ms: u64) {
        self.now_ns
            .fetch_add(ms.saturating_mul(1_000_000), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> MonotonicTimeNs {
        MonotonicTimeNs(self.now_ns.load(Ordering::SeqCst))
    }
}
