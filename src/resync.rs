use crate::watcher::Snapshot;

/// Input must run below this share of the output rate before drift is corrected.
pub const INPUT_RATE_RATIO: f32 = 0.75;

/// Decides when the sub-frame phase should jump to meet late captures.
///
/// Counts new frames down to the next check so that drift is evaluated about
/// once every `interval_secs` of content.
#[derive(Debug, Clone)]
pub struct ResyncController {
    interval_secs: f64,
    countdown: i64,
}

impl ResyncController {
    pub fn new(interval_secs: u32) -> Self {
        Self {
            interval_secs: interval_secs.max(1) as f64,
            countdown: 0,
        }
    }

    /// The first new frame after a reset runs a check.
    pub fn reset(&mut self) {
        self.countdown = 0;
    }

    /// New frames between two checks.
    pub fn interval(&self, vsync_rate: f64, sub_frames: u32) -> i64 {
        ((self.interval_secs * vsync_rate / sub_frames.max(1) as f64).ceil() as i64).max(1)
    }

    /// Called for each newly captured frame. Returns the number of sub-frames
    /// to skip, if a check ran and found drift.
    pub fn on_new_frame(
        &mut self,
        snapshot: &Snapshot,
        vsync_duration: f64,
        vsync_rate: f64,
        sub_frames: u32,
    ) -> Option<u32> {
        self.countdown -= 1;
        if self.countdown > 0 {
            return None;
        }
        self.countdown = self.interval(vsync_rate, sub_frames);
        drift_skip(snapshot, vsync_duration, sub_frames)
    }
}

/// Sub-frames to skip so the phase lines up with captures arriving
/// `snapshot.capture_lag` late, or `None` when in sync.
pub fn drift_skip(snapshot: &Snapshot, vsync_duration: f64, sub_frames: u32) -> Option<u32> {
    let lag = snapshot.capture_lag as f64;
    if vsync_duration <= 0.0 || sub_frames == 0 {
        return None;
    }
    if lag <= vsync_duration || snapshot.input_fps >= snapshot.output_fps * INPUT_RATE_RATIO {
        return None;
    }
    let drifted = (lag / vsync_duration).floor() as u64;
    Some(sub_frames - (drifted % sub_frames as u64) as u32)
}
