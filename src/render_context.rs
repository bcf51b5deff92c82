use crate::config::SplitScreen;
use crate::error::RenderError;
use crate::timebase::{ticks_to_duration, VsyncTiming};
use std::sync::Arc;
use std::time::Instant;

/// Opaque black, the colour input slots start out with.
pub const NEUTRAL_PIXEL: u32 = 0xff00_0000;

/// A captured image in 0xAARRGGBB pixels, placed at `(x, y)` in the output.
#[derive(Debug, Clone, Copy)]
pub struct InputFrame<'a> {
    pub width: u32,
    pub height: u32,
    pub x: i32,
    pub y: i32,
    pub pixels: &'a [u32],
}

/// One full-screen shader draw: uniforms plus input slots in the order the
/// shader binds them.
#[derive(Debug, Clone, Copy)]
pub struct ShaderPass<'a> {
    pub shader: &'a str,
    pub uniforms: &'a [f32],
    pub inputs: &'a [usize],
}

/// The GPU layer as the renderer sees it. Every call issues work and returns;
/// only `wait_till_idle` waits for completion.
pub trait RenderContext: Send {
    fn output_size(&self) -> (u32, u32);
    fn create_inputs(&mut self, count: usize) -> Result<(), RenderError>;
    fn destroy(&mut self);

    fn begin_frame(&mut self) -> Result<(), RenderError>;
    fn end_frame(&mut self) -> Result<(), RenderError>;
    fn present(&mut self, vsync: bool) -> Result<(), RenderError>;
    fn wait_till_idle(&mut self);

    fn submit_input(&mut self, slot: usize, frame: &InputFrame<'_>) -> Result<(), RenderError>;

    fn black_frame(&mut self);
    fn passthrough(&mut self, slot: usize);
    fn run_pass(&mut self, pass: &ShaderPass<'_>) -> Result<(), RenderError>;
    /// Copies the unshaded half of `slot` over the output.
    fn draw_split_screen(&mut self, split: SplitScreen, slot: usize);

    fn render_ui(&mut self) -> Result<(), RenderError> {
        Ok(())
    }
}

/// Call counts, for diagnostics and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContextStats {
    pub frames: u64,
    pub presents: u64,
    pub vsync_presents: u64,
    pub submits: u64,
    pub black_frames: u64,
    pub passthroughs: u64,
    pub passes: u64,
    pub split_screens: u64,
    pub ui_renders: u64,
    pub idle_waits: u64,
}

/// CPU render context. Shader passes run as a passthrough of their first
/// input; presenting with vsync paces to the display timing.
pub struct SoftwareContext {
    width: u32,
    height: u32,
    inputs: Vec<Vec<u32>>,
    output: Vec<u32>,
    timing: Option<Arc<VsyncTiming>>,
    next_vsync: Option<Instant>,
    in_frame: bool,
    last_uniforms: Vec<f32>,
    last_pass_inputs: Vec<usize>,
    stats: ContextStats,
}

impl SoftwareContext {
    pub fn new(width: u32, height: u32) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        Self {
            width,
            height,
            inputs: Vec::new(),
            output: vec![NEUTRAL_PIXEL; (width * height) as usize],
            timing: None,
            next_vsync: None,
            in_frame: false,
            last_uniforms: Vec::new(),
            last_pass_inputs: Vec::new(),
            stats: ContextStats::default(),
        }
    }

    /// Makes `present(true)` block until the next simulated refresh.
    pub fn with_vsync(mut self, timing: Arc<VsyncTiming>) -> Self {
        self.timing = Some(timing);
        self
    }

    pub fn stats(&self) -> ContextStats {
        self.stats
    }

    pub fn output(&self) -> &[u32] {
        &self.output
    }

    pub fn input(&self, slot: usize) -> Option<&[u32]> {
        self.inputs.get(slot).map(Vec::as_slice)
    }

    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    pub fn last_uniforms(&self) -> &[f32] {
        &self.last_uniforms
    }

    pub fn last_pass_inputs(&self) -> &[usize] {
        &self.last_pass_inputs
    }

    fn check_slot(&self, slot: usize) -> Result<(), RenderError> {
        if slot < self.inputs.len() {
            Ok(())
        } else {
            Err(RenderError::BadSlot {
                slot,
                count: self.inputs.len(),
            })
        }
    }

    fn copy_from_input(&mut self, slot: usize, from_x: u32, from_y: u32) {
        let Some(input) = self.inputs.get(slot) else {
            return;
        };
        let width = self.width as usize;
        for y in from_y as usize..self.height as usize {
            let row = y * width;
            self.output[row + from_x as usize..row + width]
                .copy_from_slice(&input[row + from_x as usize..row + width]);
        }
    }

    fn wait_for_vsync(&mut self) {
        let Some(timing) = &self.timing else {
            return;
        };
        let period = ticks_to_duration(timing.duration());
        let now = Instant::now();
        let target = match self.next_vsync {
            Some(next) if next > now => next,
            _ => now,
        };
        if target > now {
            spin_sleep::sleep(target - now);
        }
        self.next_vsync = Some(target + period);
    }
}

impl RenderContext for SoftwareContext {
    fn output_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn create_inputs(&mut self, count: usize) -> Result<(), RenderError> {
        let size = (self.width * self.height) as usize;
        self.inputs = (0..count).map(|_| vec![NEUTRAL_PIXEL; size]).collect();
        Ok(())
    }

    fn destroy(&mut self) {
        self.inputs.clear();
        self.next_vsync = None;
        self.in_frame = false;
    }

    fn begin_frame(&mut self) -> Result<(), RenderError> {
        if self.in_frame {
            return Err(RenderError::Context("begin_frame called twice".to_string()));
        }
        self.in_frame = true;
        Ok(())
    }

    fn end_frame(&mut self) -> Result<(), RenderError> {
        if !self.in_frame {
            return Err(RenderError::Context("end_frame without begin_frame".to_string()));
        }
        self.in_frame = false;
        self.stats.frames += 1;
        Ok(())
    }

    fn present(&mut self, vsync: bool) -> Result<(), RenderError> {
        if vsync {
            self.wait_for_vsync();
            self.stats.vsync_presents += 1;
        }
        self.stats.presents += 1;
        Ok(())
    }

    fn wait_till_idle(&mut self) {
        self.stats.idle_waits += 1;
    }

    fn submit_input(&mut self, slot: usize, frame: &InputFrame<'_>) -> Result<(), RenderError> {
        self.check_slot(slot)?;
        let expected = frame.width as usize * frame.height as usize;
        if frame.pixels.len() < expected {
            return Err(RenderError::Context(format!(
                "Input frame has {} pixels, {}x{} needs {}",
                frame.pixels.len(),
                frame.width,
                frame.height,
                expected
            )));
        }

        // trim to the output when the source is larger or offset
        let dest_x = frame.x.max(0) as u32;
        let dest_y = frame.y.max(0) as u32;
        let src_x = (-frame.x).max(0) as u32;
        let src_y = (-frame.y).max(0) as u32;
        let copy_w = frame
            .width
            .saturating_sub(src_x)
            .min(self.width.saturating_sub(dest_x));
        let copy_h = frame
            .height
            .saturating_sub(src_y)
            .min(self.height.saturating_sub(dest_y));

        let input = &mut self.inputs[slot];
        for row in 0..copy_h {
            let src = ((src_y + row) * frame.width + src_x) as usize;
            let dst = ((dest_y + row) * self.width + dest_x) as usize;
            input[dst..dst + copy_w as usize]
                .copy_from_slice(&frame.pixels[src..src + copy_w as usize]);
        }

        self.stats.submits += 1;
        Ok(())
    }

    fn black_frame(&mut self) {
        self.output.fill(NEUTRAL_PIXEL);
        self.stats.black_frames += 1;
    }

    fn passthrough(&mut self, slot: usize) {
        self.copy_from_input(slot, 0, 0);
        self.stats.passthroughs += 1;
    }

    fn run_pass(&mut self, pass: &ShaderPass<'_>) -> Result<(), RenderError> {
        for &slot in pass.inputs {
            self.check_slot(slot)?;
        }
        self.last_uniforms.clear();
        self.last_uniforms.extend_from_slice(pass.uniforms);
        self.last_pass_inputs.clear();
        self.last_pass_inputs.extend_from_slice(pass.inputs);
        if let Some(&first) = pass.inputs.first() {
            self.copy_from_input(first, 0, 0);
        }
        self.stats.passes += 1;
        Ok(())
    }

    fn draw_split_screen(&mut self, split: SplitScreen, slot: usize) {
        let (from_x, from_y) = match split {
            SplitScreen::Off => return,
            SplitScreen::Vertical => (self.width / 2, 0),
            SplitScreen::Horizontal => (0, self.height / 2),
        };
        self.copy_from_input(slot, from_x, from_y);
        self.stats.split_screens += 1;
    }

    fn render_ui(&mut self) -> Result<(), RenderError> {
        self.stats.ui_renders += 1;
        Ok(())
    }
}

/// Software output whose `present` panics once or fails from some point on.
#[cfg(test)]
pub(crate) struct FaultyPresent {
    inner: SoftwareContext,
    presents: u32,
    panic_on: Option<u32>,
    fail_from: Option<u32>,
}

#[cfg(test)]
impl FaultyPresent {
    /// Panics on the `n`th present only.
    pub(crate) fn panicking(inner: SoftwareContext, n: u32) -> Self {
        Self {
            inner,
            presents: 0,
            panic_on: Some(n),
            fail_from: None,
        }
    }

    /// Returns an error from the `n`th present on.
    pub(crate) fn failing(inner: SoftwareContext, n: u32) -> Self {
        Self {
            inner,
            presents: 0,
            panic_on: None,
            fail_from: Some(n),
        }
    }

    pub(crate) fn inner(&self) -> &SoftwareContext {
        &self.inner
    }
}

#[cfg(test)]
impl RenderContext for FaultyPresent {
    fn output_size(&self) -> (u32, u32) {
        self.inner.output_size()
    }

    fn create_inputs(&mut self, count: usize) -> Result<(), RenderError> {
        self.inner.create_inputs(count)
    }

    fn destroy(&mut self) {
        self.inner.destroy()
    }

    fn begin_frame(&mut self) -> Result<(), RenderError> {
        self.inner.begin_frame()
    }

    fn end_frame(&mut self) -> Result<(), RenderError> {
        self.inner.end_frame()
    }

    fn present(&mut self, vsync: bool) -> Result<(), RenderError> {
        self.presents += 1;
        if self.panic_on == Some(self.presents) {
            panic!("device lost");
        }
        if self.fail_from.is_some_and(|n| self.presents >= n) {
            return Err(RenderError::Context("present failed".to_string()));
        }
        self.inner.present(vsync)
    }

    fn wait_till_idle(&mut self) {
        self.inner.wait_till_idle()
    }

    fn submit_input(&mut self, slot: usize, frame: &InputFrame<'_>) -> Result<(), RenderError> {
        self.inner.submit_input(slot, frame)
    }

    fn black_frame(&mut self) {
        self.inner.black_frame()
    }

    fn passthrough(&mut self, slot: usize) {
        self.inner.passthrough(slot)
    }

    fn run_pass(&mut self, pass: &ShaderPass<'_>) -> Result<(), RenderError> {
        self.inner.run_pass(pass)
    }

    fn draw_split_screen(&mut self, split: SplitScreen, slot: usize) {
        self.inner.draw_split_screen(split, slot)
    }
}
