use super::{CaptureBackend, CaptureSettings, CapturedFrame, Grab};
use crate::error::CaptureError;
use crate::timebase::{SharedClock, Ticks, TICKS_PER_SEC};

const BAR_WIDTH: u64 = 20;
const BAR_SPEED: u64 = 8;

/// Synthetic source: vertical bars scrolling right by a fixed step per frame.
///
/// By default every grab produces a frame. With a content rate set, frames are
/// produced on that cadence instead, which lets the sub-frame pipeline run
/// against a slower source.
pub struct PatternCapture {
    clock: SharedClock,
    frame_interval: Option<Ticks>,
    latency: Ticks,
    next_due: Ticks,
    frame_no: u64,
    width: u32,
    height: u32,
    pixels: Vec<u32>,
}

impl PatternCapture {
    pub const NAME: &'static str = "Test Pattern";

    pub fn new(clock: SharedClock) -> Self {
        Self {
            clock,
            frame_interval: None,
            latency: 0.0,
            next_due: 0.0,
            frame_no: 0,
            width: 0,
            height: 0,
            pixels: Vec::new(),
        }
    }

    pub fn with_content_rate(mut self, fps: f64) -> Self {
        self.frame_interval = (fps > 0.0).then(|| TICKS_PER_SEC / fps);
        self
    }

    /// Stamps frames as produced this long before they are grabbed.
    pub fn with_latency(mut self, latency: Ticks) -> Self {
        self.latency = latency.max(0.0);
        self
    }

    pub fn frame_no(&self) -> u64 {
        self.frame_no
    }

    fn draw(&mut self) {
        let shift = self.frame_no * BAR_SPEED;
        let width = self.width as usize;
        for (i, pixel) in self.pixels.iter_mut().enumerate() {
            let x = (i % width) as u64;
            let v = (((x + shift) / BAR_WIDTH) % 2) as u32 * 255;
            *pixel = 0xff00_0000 | (v << 16) | (v << 8) | v;
        }
        self.frame_no += 1;
    }
}

impl CaptureBackend for PatternCapture {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn is_supported(&self) -> bool {
        true
    }

    fn supports_window_capture(&self) -> bool {
        false
    }

    fn start(&mut self, settings: &CaptureSettings) -> Result<(), CaptureError> {
        self.width = settings.output_width.max(1);
        self.height = settings.output_height.max(1);
        self.pixels = vec![0; self.width as usize * self.height as usize];
        self.frame_no = 0;
        self.next_due = self.clock.now();
        Ok(())
    }

    fn grab(&mut self) -> Result<Grab<'_>, CaptureError> {
        if self.pixels.is_empty() {
            return Err(CaptureError::Backend("pattern capture not started".to_string()));
        }

        let now = self.clock.now();
        let produced = match self.frame_interval {
            Some(interval) => {
                if now < self.next_due {
                    return Ok(Grab::Idle);
                }
                // frames missed between grabs are dropped, the newest one wins
                let behind = ((now - self.next_due) / interval).floor();
                let due = self.next_due + behind * interval;
                self.next_due = due + interval;
                due
            }
            None => now,
        };

        self.draw();
        Ok(Grab::Frame(CapturedFrame {
            width: self.width,
            height: self.height,
            timestamp: produced - self.latency,
            pixels: &self.pixels,
        }))
    }

    fn stop(&mut self) {
        self.pixels = Vec::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timebase::ManualClock;
    use std::sync::Arc;

    const BLACK: u32 = 0xff00_0000;
    const WHITE: u32 = 0xffff_ffff;

    fn settings() -> CaptureSettings {
        CaptureSettings {
            output_width: 48,
            output_height: 1,
            ..CaptureSettings::default()
        }
    }

    fn first_row(grab: Grab<'_>) -> Vec<u32> {
        match grab {
            Grab::Frame(frame) => frame.pixels.to_vec(),
            other => panic!("expected a frame, got {:?}", other),
        }
    }

    #[test]
    fn bars_scroll_each_frame() {
        let clock = ManualClock::new(0.0);
        let mut pattern = PatternCapture::new(Arc::new(clock));
        pattern.start(&settings()).unwrap();

        let row = first_row(pattern.grab().unwrap());
        assert_eq!(row[0], BLACK);
        assert_eq!(row[19], BLACK);
        assert_eq!(row[20], WHITE);
        assert_eq!(row[40], BLACK);

        let row = first_row(pattern.grab().unwrap());
        assert_eq!(row[11], BLACK);
        assert_eq!(row[12], WHITE);
        assert_eq!(pattern.frame_no(), 2);
    }

    #[test]
    fn content_rate_limits_new_frames() {
        let clock = ManualClock::new(0.0);
        let mut pattern = PatternCapture::new(Arc::new(clock.clone())).with_content_rate(100.0);
        pattern.start(&settings()).unwrap();

        assert!(matches!(pattern.grab().unwrap(), Grab::Frame(_)));
        clock.advance(4.0);
        assert!(matches!(pattern.grab().unwrap(), Grab::Idle));
        clock.advance(6.0);
        assert!(matches!(pattern.grab().unwrap(), Grab::Frame(_)));
    }

    #[test]
    fn late_grab_takes_newest_due_frame() {
        let clock = ManualClock::new(0.0);
        let mut pattern = PatternCapture::new(Arc::new(clock.clone()))
            .with_content_rate(100.0)
            .with_latency(5.0);
        pattern.start(&settings()).unwrap();
        pattern.grab().unwrap();

        clock.advance(35.0);
        match pattern.grab().unwrap() {
            Grab::Frame(frame) => assert_eq!(frame.timestamp, 25.0),
            other => panic!("expected a frame, got {:?}", other),
        }
        clock.advance(4.0);
        assert!(matches!(pattern.grab().unwrap(), Grab::Idle));
    }

    #[test]
    fn grab_before_start_fails() {
        let mut pattern = PatternCapture::new(Arc::new(ManualClock::new(0.0)));
        assert!(pattern.grab().is_err());
    }
}
