use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::time::Instant;

pub trait Clock {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock driven by hand. Clones share the same reading.
#[derive(Debug, Clone)]
pub struct ManualClock {
    base: Instant,
    offset_us: Arc<AtomicU64>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset_us: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Sets the reading to `base + offset`. Moving backwards is allowed.
    pub fn set(&self, offset: Duration) {
        self.offset_us
            .store(offset.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn advance(&self, by: Duration) {
        self.offset_us
            .fetch_add(by.as_micros() as u64, Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + Duration::from_micros(self.offset_us.load(Ordering::Relaxed))
    }
}

/// Chunk timestamps in microseconds since the first chunk of a session.
///
/// Output is strictly increasing: a reading that did not move forward, or
/// moved backwards, yields `previous + 1`.
#[derive(Debug, Default)]
pub struct TimestampGenerator {
    origin: Option<Instant>,
    last: Option<u64>,
}

impl TimestampGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&mut self, now: Instant) -> u64 {
        let origin = *self.origin.get_or_insert(now);
        let elapsed = now.saturating_duration_since(origin).as_micros() as u64;
        let ts = match self.last {
            Some(last) if elapsed <= last => last + 1,
            _ => elapsed,
        };
        self.last = Some(ts);
        ts
    }

    pub fn reset(&mut self) {
        self.origin = None;
        self.last = None;
    }
}
