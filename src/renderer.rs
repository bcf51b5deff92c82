use crate::capture::{Capture, SlotWriter};
use crate::config::{MonitorType, Options, SplitScreen};
use crate::error::{LoopError, RenderError};
use crate::frame::{FrameCounter, SlotRing};
use crate::render_context::{InputFrame, RenderContext};
use crate::shader::{FrameInfo, ShaderProfile};
use crate::timebase::{Ticks, TICKS_PER_SEC};
use crate::watcher::Watcher;
use crate::log_info;
use std::fmt;
use std::sync::Arc;

pub const BENCHMARK_DURATION: Ticks = 4.0 * TICKS_PER_SEC;

/// The part of [`Options`] the renderer reads every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderSettings {
    pub sub_frames: u32,
    pub split_screen: SplitScreen,
    pub monitor_type: MonitorType,
    pub hardware_srgb: bool,
}

impl RenderSettings {
    pub fn from_options(options: &Options) -> Self {
        Self {
            sub_frames: options.sub_frames.max(1),
            split_screen: options.split_screen,
            monitor_type: options.monitor_type,
            hardware_srgb: options.hardware_srgb,
        }
    }
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self::from_options(&Options::default())
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct PhaseTimer {
    count: u64,
    ticks: Ticks,
}

impl PhaseTimer {
    fn add(&mut self, ticks: Ticks) {
        self.count += 1;
        self.ticks += ticks;
    }

    fn fps(&self) -> f64 {
        if self.ticks > 0.0 {
            self.count as f64 / (self.ticks / TICKS_PER_SEC)
        } else {
            0.0
        }
    }
}

/// Throughput measured by [`Renderer::benchmark`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BenchmarkReport {
    pub frames: u64,
    pub seconds: f64,
    pub fps: f64,
    pub copy_fps: f64,
    pub render_fps: f64,
    pub present_fps: f64,
}

impl fmt::Display for BenchmarkReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.0} FPS over {} frames (copy {:.0}, render {:.0}, present {:.0})",
            self.fps, self.frames, self.copy_fps, self.render_fps, self.present_fps
        )
    }
}

/// Runs the active shader profile once per display refresh and keeps the
/// sub-frame counters and the input slot ring.
///
/// Owned by the render thread while it runs; nothing here is shared.
pub struct Renderer<C: RenderContext> {
    ctx: C,
    profile: ShaderProfile,
    watcher: Arc<Watcher>,
    settings: RenderSettings,
    counter: FrameCounter,
    ring: SlotRing,
    started: bool,
}

fn frame_info<'a>(settings: &RenderSettings, counter: &FrameCounter, slots: &'a [usize]) -> FrameInfo<'a> {
    FrameInfo {
        frame_no: counter.frame_no(),
        sub_frame_no: counter.sub_frame_no(),
        sub_frames: counter.sub_frames(),
        input_slots: slots,
        monitor_type: settings.monitor_type,
        hardware_srgb: settings.hardware_srgb,
    }
}

impl<C: RenderContext> Renderer<C> {
    pub fn new(ctx: C, profile: ShaderProfile, watcher: Arc<Watcher>, settings: RenderSettings) -> Self {
        Self {
            ctx,
            profile,
            watcher,
            counter: FrameCounter::new(settings.sub_frames),
            settings,
            ring: SlotRing::default(),
            started: false,
        }
    }

    /// Resets the counters, allocates the profile's input slots and builds the profile.
    pub fn start(&mut self) -> Result<(), RenderError> {
        self.counter = FrameCounter::new(self.settings.sub_frames);
        let inputs = self.profile.num_inputs();
        self.ring = SlotRing::new(inputs)?;
        self.ctx.create_inputs(inputs)?;

        let info = frame_info(&self.settings, &self.counter, self.ring.as_slice());
        self.profile.create(&info, &mut self.ctx)?;
        self.started = true;

        log_info!(
            "Renderer started: {} with {} sub-frames, {} inputs",
            self.profile.name(),
            self.settings.sub_frames,
            inputs
        );
        Ok(())
    }

    pub fn stop(&mut self) {
        if !self.started {
            return;
        }
        self.profile.destroy();
        self.ctx.wait_till_idle();
        self.ctx.destroy();
        self.ring.clear();
        self.counter.reset();
        self.started = false;
    }

    /// Draws one sub-frame and moves the counters on.
    ///
    /// With `present` the call blocks until vsync. The watcher sees every
    /// rendered sub-frame either way.
    pub fn render(&mut self, present: bool, render_ui: bool) -> Result<(), RenderError> {
        if !self.started {
            return Err(RenderError::NotStarted);
        }

        self.ctx.begin_frame()?;
        let drawn = self.draw(render_ui);
        let ended = self.ctx.end_frame();
        drawn?;
        ended?;

        self.counter.advance();

        let presented = if present { self.ctx.present(true) } else { Ok(()) };
        self.watcher.frame_submitted();
        presented
    }

    fn draw(&mut self, render_ui: bool) -> Result<(), RenderError> {
        let info = frame_info(&self.settings, &self.counter, self.ring.as_slice());
        self.profile.render(&info, &mut self.ctx)?;

        if self.settings.split_screen != SplitScreen::Off {
            self.ctx.draw_split_screen(self.settings.split_screen, self.ring.front());
        }
        if render_ui {
            self.ctx.render_ui()?;
        }
        Ok(())
    }

    pub fn new_input_required(&self) -> bool {
        let info = frame_info(&self.settings, &self.counter, self.ring.as_slice());
        self.profile.new_input_required(&info)
    }

    pub fn supports_resync(&self) -> bool {
        let info = frame_info(&self.settings, &self.counter, self.ring.as_slice());
        self.profile.supports_resync(&info)
    }

    pub fn next_slot(&self) -> usize {
        self.ring.next_slot()
    }

    /// Must follow a write into [`Renderer::next_slot`] (or a poll that found nothing).
    pub fn roll_input(&mut self, new_frame: bool) {
        self.ring.roll(new_frame);
    }

    /// Where the next poll should write.
    pub fn slot_writer(&mut self) -> SlotWriter<'_> {
        let slot = self.ring.next_slot();
        SlotWriter::new(&mut self.ctx, slot)
    }

    /// Writes a frame into the next slot and makes it the newest.
    pub fn submit_input(&mut self, frame: &InputFrame<'_>) -> Result<(), RenderError> {
        if !self.started {
            return Err(RenderError::NotStarted);
        }
        let slot = self.ring.next_slot();
        self.ctx.submit_input(slot, frame)?;
        self.ring.roll(true);
        Ok(())
    }

    /// Jumps the sub-frame phase forward without touching the frame number.
    pub fn skip(&mut self, sub_frames: u32) {
        self.counter.skip(sub_frames);
    }

    /// Renders flat out for [`BENCHMARK_DURATION`], timing the capture copy,
    /// the shader and the present separately.
    pub fn benchmark(&mut self, mut capture: Option<&mut Capture>) -> Result<BenchmarkReport, LoopError> {
        if !self.started {
            return Err(RenderError::NotStarted.into());
        }

        let clock = self.watcher.clock().clone();
        let start = clock.now();
        let mut end = start;
        let mut frames = 0u64;
        let mut copy = PhaseTimer::default();
        let mut render = PhaseTimer::default();
        let mut present = PhaseTimer::default();

        while end < start + BENCHMARK_DURATION {
            if self.counter.sub_frame_no() == 0 {
                if let Some(capture) = capture.as_deref_mut() {
                    let t = clock.now();
                    capture.benchmark_copy(&mut self.slot_writer())?;
                    self.ctx.wait_till_idle();
                    copy.add(clock.now() - t);
                }
            }

            let t = clock.now();
            self.render(false, false)?;
            self.ctx.wait_till_idle();
            render.add(clock.now() - t);

            let t = clock.now();
            self.ctx.present(false)?;
            self.ctx.wait_till_idle();
            present.add(clock.now() - t);

            frames += 1;
            end = clock.now();
        }

        let seconds = (end - start) / TICKS_PER_SEC;
        let report = BenchmarkReport {
            frames,
            seconds,
            fps: if seconds > 0.0 { frames as f64 / seconds } else { 0.0 },
            copy_fps: copy.fps(),
            render_fps: render.fps(),
            present_fps: present.fps(),
        };
        log_info!("Benchmark: {}", report);
        Ok(report)
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn frame_no(&self) -> u64 {
        self.counter.frame_no()
    }

    pub fn sub_frame_no(&self) -> u32 {
        self.counter.sub_frame_no()
    }

    pub fn sub_frames(&self) -> u32 {
        self.counter.sub_frames()
    }

    pub fn input_slots(&self) -> &[usize] {
        self.ring.as_slice()
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    pub fn watcher(&self) -> &Arc<Watcher> {
        &self.watcher
    }

    pub fn profile(&self) -> &ShaderProfile {
        &self.profile
    }

    pub fn profile_mut(&mut self) -> &mut ShaderProfile {
        &mut self.profile
    }

    pub fn context(&self) -> &C {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut C {
        &mut self.ctx
    }

    pub fn into_context(mut self) -> C {
        self.stop();
        self.ctx
    }
}
