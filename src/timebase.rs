use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Milliseconds since the clock's origin.
pub type Ticks = f64;

pub const TICKS_PER_SEC: Ticks = 1000.0;

pub fn ticks_to_duration(ticks: Ticks) -> Duration {
    Duration::from_secs_f64((ticks / TICKS_PER_SEC).max(0.0))
}

/// Monotonic time source shared by the watcher, renderer and capture backends.
pub trait Clock: Send + Sync {
    fn now(&self) -> Ticks;
}

pub type SharedClock = Arc<dyn Clock>;

pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    pub fn shared() -> SharedClock {
        Arc::new(Self::new())
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Ticks {
        self.origin.elapsed().as_secs_f64() * TICKS_PER_SEC
    }
}

/// Clock that only moves when told to. Cloning shares the same time.
#[derive(Clone, Default)]
pub struct ManualClock {
    now: Arc<Mutex<Ticks>>,
}

impl ManualClock {
    pub fn new(start: Ticks) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn advance(&self, ticks: Ticks) {
        *self.now.lock() += ticks;
    }

    pub fn set(&self, ticks: Ticks) {
        *self.now.lock() = ticks;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Ticks {
        *self.now.lock()
    }
}

/// An `f64` published through an `AtomicU64`. Meant for one writer and any number of readers.
#[derive(Debug, Default)]
pub struct AtomicTicks(AtomicU64);

impl AtomicTicks {
    pub fn new(value: Ticks) -> Self {
        Self(AtomicU64::new(value.to_bits()))
    }

    pub fn load(&self) -> Ticks {
        f64::from_bits(self.0.load(Ordering::Acquire))
    }

    pub fn store(&self, value: Ticks) {
        self.0.store(value.to_bits(), Ordering::Release);
    }
}

/// Display refresh timing. Refreshed by whoever owns the display (a periodic
/// timer in the app), read by the render loop.
#[derive(Debug)]
pub struct VsyncTiming {
    duration: AtomicTicks,
    rate: AtomicTicks,
}

impl VsyncTiming {
    pub fn new(rate_hz: f64) -> Self {
        let timing = Self {
            duration: AtomicTicks::new(0.0),
            rate: AtomicTicks::new(0.0),
        };
        timing.set_rate(rate_hz);
        timing
    }

    pub fn update(&self, duration_ms: Ticks) {
        if duration_ms <= 0.0 {
            return;
        }
        self.duration.store(duration_ms);
        self.rate.store(TICKS_PER_SEC / duration_ms);
    }

    pub fn set_rate(&self, rate_hz: f64) {
        if rate_hz > 0.0 {
            self.update(TICKS_PER_SEC / rate_hz);
        }
    }

    /// Length of one refresh in ticks.
    pub fn duration(&self) -> Ticks {
        self.duration.load()
    }

    /// Refreshes per second.
    pub fn rate(&self) -> f64 {
        self.rate.load()
    }
}
