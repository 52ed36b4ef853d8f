use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;

/// Strictly increasing nanosecond timestamps for AEAD nonces.
///
/// Returns `max(wall_clock_ns, last + 1)`, so two calls never yield the
/// same value even when the wall clock stalls or steps backwards.
#[derive(Debug, Default)]
pub struct NonceClock {
    last: AtomicU64,
}

impl NonceClock {
    pub const fn new() -> Self {
        Self {
            last: AtomicU64::new(0),
        }
    }

    pub fn now(&self) -> u64 {
        let wall = Utc::now()
            .timestamp_nanos_opt()
            .map(|ns| ns.max(0) as u64)
            .unwrap_or(0);
        self.next_after(wall)
    }

    fn next_after(&self, wall: u64) -> u64 {
        let mut prev = self.last.load(Ordering::Relaxed);
        loop {
            let next = wall.max(prev.saturating_add(1));
            match self
                .last
                .compare_exchange_weak(prev, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return next,
                Err(actual) => prev = actual,
            }
        }
    }
}
