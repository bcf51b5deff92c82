use crate::chart::Chart;
use crate::timebase::{AtomicTicks, SharedClock, Ticks, TICKS_PER_SEC};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU32, Ordering};

const SNAPSHOT_DURATION: Ticks = TICKS_PER_SEC;

/// Rolling one-second aggregate published for the UI and the resync controller.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Snapshot {
    pub input_fps: f32,
    pub output_fps: f32,
    /// Smallest capture lag seen during the last window, in ticks.
    pub capture_lag: f32,
}

/// Frame-flow metrics. The render thread is the only writer; the charts are
/// drained by whoever draws them.
pub struct Watcher {
    clock: SharedClock,
    pub receive_chart: Chart,
    pub submit_chart: Chart,
    input_frames: AtomicU32,
    output_frames: AtomicU32,
    window_min_lag: AtomicTicks,
    last_snapshot: AtomicTicks,
    snapshot: RwLock<Snapshot>,
}

impl Watcher {
    pub fn new(clock: SharedClock) -> Self {
        let now = clock.now();
        Self {
            clock,
            receive_chart: Chart::new(),
            submit_chart: Chart::new(),
            input_frames: AtomicU32::new(0),
            output_frames: AtomicU32::new(0),
            window_min_lag: AtomicTicks::new(f64::INFINITY),
            last_snapshot: AtomicTicks::new(now),
            snapshot: RwLock::new(Snapshot::default()),
        }
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    pub fn now(&self) -> Ticks {
        self.clock.now()
    }

    pub fn start(&self) {
        let now = self.clock.now();
        self.receive_chart.clear(now);
        self.submit_chart.clear(now);
        self.input_frames.store(0, Ordering::Relaxed);
        self.output_frames.store(0, Ordering::Relaxed);
        self.window_min_lag.store(f64::INFINITY);
        self.last_snapshot.store(now);
        *self.snapshot.write() = Snapshot::default();
    }

    /// A capture backend produced a frame stamped at `capture_timestamp`.
    pub fn frame_received(&self, capture_timestamp: Ticks) {
        let now = self.clock.now();
        let lag = (now - capture_timestamp).max(0.0);
        self.receive_chart.add_value(lag as f32);
        self.input_frames.fetch_add(1, Ordering::Relaxed);
        if lag < self.window_min_lag.load() {
            self.window_min_lag.store(lag);
        }
        self.update_snapshot(now);
    }

    /// The renderer finished a sub-frame, presented or not.
    pub fn frame_submitted(&self) {
        let now = self.clock.now();
        self.submit_chart.add_delta(now);
        self.output_frames.fetch_add(1, Ordering::Relaxed);
        self.update_snapshot(now);
    }

    pub fn snapshot(&self) -> Snapshot {
        *self.snapshot.read()
    }

    fn update_snapshot(&self, now: Ticks) {
        let last = self.last_snapshot.load();
        if now - last <= SNAPSHOT_DURATION {
            return;
        }

        let seconds = ((now - last) / TICKS_PER_SEC) as f32;
        let input_frames = self.input_frames.swap(0, Ordering::Relaxed);
        let output_frames = self.output_frames.swap(0, Ordering::Relaxed);
        let min_lag = self.window_min_lag.load();
        self.window_min_lag.store(f64::INFINITY);
        self.last_snapshot.store(now);

        let mut snapshot = self.snapshot.write();
        snapshot.input_fps = input_frames as f32 / seconds;
        snapshot.output_fps = output_frames as f32 / seconds;
        if min_lag.is_finite() {
            snapshot.capture_lag = min_lag as f32;
        }
    }
}
