use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Trait representing the monotonic clock that bounds an acquisition run.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> Instant;
}

/// Default time source backed by `Instant::now`.
#[derive(Default)]
pub struct SystemTimeSource {
    _unit: (),
}

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Deterministic time source for tests and replays.
///
/// Each call to `now()` advances by a fixed step (10ms by default) so runs
/// end after a predictable number of clock reads, whatever the data rate.
pub struct StubTimeSource {
    start: Instant,
    step_ms: u64,
    offset_ms: AtomicU64,
}

impl StubTimeSource {
    pub fn new() -> Self {
        Self::with_step(Duration::from_millis(10))
    }

    pub fn with_step(step: Duration) -> Self {
        Self {
            start: Instant::now(),
            step_ms: step.as_millis() as u64,
            offset_ms: AtomicU64::new(0),
        }
    }
}

impl Default for StubTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for StubTimeSource {
    fn now(&self) -> Instant {
        let ms = self.offset_ms.fetch_add(self.step_ms, Ordering::SeqCst);
        self.start + Duration::from_millis(ms)
    }
}
