use super::{params::Choices, FrameInfo, Parameter, ParameterSet};
use crate::config::MonitorType;
use crate::error::RenderError;
use crate::frame::MAX_INPUTS;
use crate::render_context::{RenderContext, ShaderPass};

const SCAN_DIRECTIONS: Choices = &[
    (0, "None (Global Refresh)"),
    (1, "Top to Bottom"),
    (2, "Bottom to Top"),
    (3, "Left to Right"),
    (4, "Right to Left"),
];

const ANTI_RETENTION_MODES: Choices = &[(0, "Force Off"), (1, "Auto")];

const GAMMA: usize = 0;
const GAIN_VS_BLUR: usize = 1;
const SCAN_DIRECTION: usize = 2;
const FPS_DIVISOR: usize = 3;
const ANTI_RETENTION: usize = 4;
const INVERSION_SLEW: usize = 5;

/// Rolling-scan CRT simulation spread over the sub-frames of each refresh.
///
/// The beam position is derived on the CPU every sub-frame and handed to the
/// shader as uniforms, alongside the three newest captures.
#[derive(Debug)]
pub struct CrtBeamSimulator {
    params: ParameterSet,
    frames_per_hz: f64,
    hardware_srgb: bool,
    // last values sent to the shader
    effective_frames_per_hz: f64,
    raster_pos: f32,
    hz_counter: f64,
}

impl Default for CrtBeamSimulator {
    fn default() -> Self {
        Self::new()
    }
}

impl CrtBeamSimulator {
    pub const NUM_INPUTS: usize = 3;
    pub const SHADER: &'static str = "crt_beam_simulator";

    pub fn new() -> Self {
        let params = ParameterSet::new(vec![
            Parameter::float(
                "Gamma",
                "Your display's gamma value. Prevents horizontal banding.",
                2.2,
                0.5,
                5.0,
            ),
            Parameter::float(
                "Gain vs Blur",
                "Brightness against motion blur for bright pixels. 1.0 keeps brightness, 0.5 halves it over fewer frames.",
                0.5,
                0.0,
                1.0,
            ),
            Parameter::choice(
                "Scan Direction",
                "Direction of the simulated beam. 'None' removes banding at some cost in quality.",
                1,
                0,
                4,
                SCAN_DIRECTIONS,
            ),
            Parameter::int(
                "Slow Motion Mode",
                "Divides the simulated CRT rate. 1 runs at refresh rate, 10 at a tenth of it.",
                1,
                1,
                100,
            ),
            Parameter::choice(
                "LCD Anti-retention",
                "Keeps BFI from fighting LCD voltage inversion. Adds occasional stutter and one frame of latency.",
                1,
                0,
                1,
                ANTI_RETENTION_MODES,
            ),
            Parameter::float(
                "LCD Inversion Compensation",
                "Strength of LCD anti-retention. 0.001 normal, 0.01 enhanced.",
                0.001,
                0.0,
                0.02,
            ),
        ]);

        Self {
            params,
            frames_per_hz: 4.0,
            hardware_srgb: false,
            effective_frames_per_hz: 4.0,
            raster_pos: 0.0,
            hz_counter: 0.0,
        }
    }

    pub fn create(&mut self, info: &FrameInfo<'_>, _ctx: &mut dyn RenderContext) -> Result<(), RenderError> {
        self.frames_per_hz = info.sub_frames.max(1) as f64;
        self.hardware_srgb = info.hardware_srgb;
        self.effective_frames_per_hz = self.effective_rate(info);
        self.raster_pos = 0.0;
        self.hz_counter = 0.0;
        Ok(())
    }

    pub fn destroy(&mut self) {
        self.hz_counter = 0.0;
        self.raster_pos = 0.0;
    }

    /// Even sub-frame counts on an LCD would always black out the same
    /// inversion polarity, so the CRT rate is nudged off the refresh rate.
    pub fn anti_retention_required(&self, info: &FrameInfo<'_>) -> bool {
        self.params.i32_at(ANTI_RETENTION) != 0
            && info.monitor_type == MonitorType::Lcd
            && self.frames_per_hz.fract() == 0.0
            && (self.frames_per_hz as u32) % 2 == 0
    }

    pub fn supports_resync(&self, info: &FrameInfo<'_>) -> bool {
        !self.anti_retention_required(info)
    }

    pub fn new_input_required(&self, info: &FrameInfo<'_>) -> bool {
        if info.frame_no == 0 {
            return info.sub_frame_no == 0;
        }
        let counter = (self.effective_frame(info) / self.effective_frames_per_hz).floor();
        counter != self.hz_counter
    }

    pub fn render(&mut self, info: &FrameInfo<'_>, ctx: &mut dyn RenderContext) -> Result<(), RenderError> {
        let effective_frame = self.effective_frame(info);
        self.effective_frames_per_hz = self.effective_rate(info);
        self.raster_pos =
            ((effective_frame % self.effective_frames_per_hz) / self.effective_frames_per_hz) as f32;
        self.hz_counter = (effective_frame / self.effective_frames_per_hz).floor();

        let uniforms = [
            self.params.f32_at(GAMMA),
            self.params.f32_at(GAIN_VS_BLUR),
            self.params.i32_at(SCAN_DIRECTION) as f32,
            self.effective_frames_per_hz as f32,
            self.raster_pos,
            self.hz_counter as f32,
            if self.hardware_srgb { 1.0 } else { 0.0 },
        ];

        let mut inputs = [0usize; MAX_INPUTS];
        let count = info.input_slots.len().min(Self::NUM_INPUTS);
        inputs[..count].copy_from_slice(&info.input_slots[..count]);
        if !self.anti_retention_required(info) {
            // frame-ahead: every history input shows the newest capture
            let newest = info.newest_slot();
            inputs[..count].fill(newest);
        }

        ctx.run_pass(&ShaderPass {
            shader: Self::SHADER,
            uniforms: &uniforms,
            inputs: &inputs[..count],
        })
    }

    pub fn raster_pos(&self) -> f32 {
        self.raster_pos
    }

    pub fn hz_counter(&self) -> f64 {
        self.hz_counter
    }

    pub fn parameters(&self) -> &ParameterSet {
        &self.params
    }

    pub fn parameters_mut(&mut self) -> &mut ParameterSet {
        &mut self.params
    }

    fn effective_frame(&self, info: &FrameInfo<'_>) -> f64 {
        info.linear_frame() as f64 / self.params.i32_at(FPS_DIVISOR).max(1) as f64
    }

    fn effective_rate(&self, info: &FrameInfo<'_>) -> f64 {
        if self.anti_retention_required(info) {
            self.frames_per_hz + self.params.f32_at(INVERSION_SLEW) as f64
        } else {
            self.frames_per_hz
        }
    }
}
