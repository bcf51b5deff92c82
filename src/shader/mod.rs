//! Shader profiles: the effect run once per sub-frame.
//!
//! The set of profiles is closed, so a profile is an enum over one struct per
//! effect. Each effect decides how many input slots it needs, when a fresh
//! capture is worth polling for and whether the render loop may shift its
//! sub-frame phase.

mod bfi;
mod crt_beam;
pub mod params;

pub use bfi::SimpleBfi;
pub use crt_beam::CrtBeamSimulator;
pub use params::{ParamValue, Parameter, ParameterSet};

use crate::config::MonitorType;
use crate::error::RenderError;
use crate::render_context::RenderContext;
use serde::{Deserialize, Serialize};

/// What a profile sees of the renderer for one sub-frame.
#[derive(Debug, Clone, Copy)]
pub struct FrameInfo<'a> {
    pub frame_no: u64,
    pub sub_frame_no: u32,
    pub sub_frames: u32,
    /// Newest first.
    pub input_slots: &'a [usize],
    pub monitor_type: MonitorType,
    pub hardware_srgb: bool,
}

impl FrameInfo<'_> {
    pub fn linear_frame(&self) -> u64 {
        self.frame_no * self.sub_frames as u64 + self.sub_frame_no as u64
    }

    pub fn newest_slot(&self) -> usize {
        self.input_slots.first().copied().unwrap_or(0)
    }
}

/// One capture per content frame, taken on its first sub-frame.
pub fn default_new_input_required(info: &FrameInfo<'_>) -> bool {
    info.sub_frame_no == 0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ProfileKind {
    #[default]
    CrtBeamSimulator,
    SimpleBfi,
}

impl ProfileKind {
    pub const ALL: [ProfileKind; 2] = [ProfileKind::CrtBeamSimulator, ProfileKind::SimpleBfi];

    pub fn name(self) -> &'static str {
        match self {
            Self::CrtBeamSimulator => "Blur Busters CRT Beam Simulator",
            Self::SimpleBfi => "Simple BFI",
        }
    }

    /// Short names accepted on the command line.
    pub fn parse(text: &str) -> Option<Self> {
        match text.to_ascii_lowercase().as_str() {
            "crt" | "crt-beam" | "crtbeamsimulator" => Some(Self::CrtBeamSimulator),
            "bfi" | "simple-bfi" | "simplebfi" => Some(Self::SimpleBfi),
            _ => None,
        }
    }
}

pub enum ShaderProfile {
    CrtBeam(CrtBeamSimulator),
    SimpleBfi(SimpleBfi),
}

impl ShaderProfile {
    pub fn new(kind: ProfileKind) -> Self {
        match kind {
            ProfileKind::CrtBeamSimulator => Self::CrtBeam(CrtBeamSimulator::new()),
            ProfileKind::SimpleBfi => Self::SimpleBfi(SimpleBfi::new()),
        }
    }

    pub fn kind(&self) -> ProfileKind {
        match self {
            Self::CrtBeam(_) => ProfileKind::CrtBeamSimulator,
            Self::SimpleBfi(_) => ProfileKind::SimpleBfi,
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind().name()
    }

    pub fn num_inputs(&self) -> usize {
        match self {
            Self::CrtBeam(_) => CrtBeamSimulator::NUM_INPUTS,
            Self::SimpleBfi(_) => SimpleBfi::NUM_INPUTS,
        }
    }

    pub fn create(&mut self, info: &FrameInfo<'_>, ctx: &mut dyn RenderContext) -> Result<(), RenderError> {
        match self {
            Self::CrtBeam(profile) => profile.create(info, ctx),
            Self::SimpleBfi(_) => Ok(()),
        }
    }

    pub fn render(&mut self, info: &FrameInfo<'_>, ctx: &mut dyn RenderContext) -> Result<(), RenderError> {
        match self {
            Self::CrtBeam(profile) => profile.render(info, ctx),
            Self::SimpleBfi(profile) => {
                profile.render(info, ctx);
                Ok(())
            }
        }
    }

    pub fn destroy(&mut self) {
        match self {
            Self::CrtBeam(profile) => profile.destroy(),
            Self::SimpleBfi(_) => {}
        }
    }

    pub fn new_input_required(&self, info: &FrameInfo<'_>) -> bool {
        match self {
            Self::CrtBeam(profile) => profile.new_input_required(info),
            Self::SimpleBfi(_) => default_new_input_required(info),
        }
    }

    pub fn supports_resync(&self, info: &FrameInfo<'_>) -> bool {
        match self {
            Self::CrtBeam(profile) => profile.supports_resync(info),
            Self::SimpleBfi(_) => true,
        }
    }

    pub fn parameters(&self) -> &ParameterSet {
        match self {
            Self::CrtBeam(profile) => profile.parameters(),
            Self::SimpleBfi(profile) => profile.parameters(),
        }
    }

    pub fn parameters_mut(&mut self) -> &mut ParameterSet {
        match self {
            Self::CrtBeam(profile) => profile.parameters_mut(),
            Self::SimpleBfi(profile) => profile.parameters_mut(),
        }
    }

    pub fn reset_defaults(&mut self) {
        self.parameters_mut().reset_defaults();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(sub_frame_no: u32, slots: &[usize]) -> FrameInfo<'_> {
        FrameInfo {
            frame_no: 3,
            sub_frame_no,
            sub_frames: 4,
            input_slots: slots,
            monitor_type: MonitorType::Lcd,
            hardware_srgb: false,
        }
    }

    #[test]
    fn bfi_takes_one_capture_per_content_frame() {
        let profile = ShaderProfile::new(ProfileKind::SimpleBfi);
        assert_eq!(profile.num_inputs(), 1);
        assert!(profile.new_input_required(&info(0, &[0])));
        for sub_frame in 1..4 {
            assert!(!profile.new_input_required(&info(sub_frame, &[0])));
        }
        assert!(profile.supports_resync(&info(0, &[0])));
    }

    #[test]
    fn kinds_round_trip_through_profiles() {
        for kind in ProfileKind::ALL {
            assert_eq!(ShaderProfile::new(kind).kind(), kind);
        }
        assert_eq!(ProfileKind::parse("BFI"), Some(ProfileKind::SimpleBfi));
        assert_eq!(ProfileKind::parse("crt"), Some(ProfileKind::CrtBeamSimulator));
        assert_eq!(ProfileKind::parse("sharpen"), None);
    }

    #[test]
    fn linear_frame_counts_sub_frames() {
        assert_eq!(info(2, &[0]).linear_frame(), 14);
    }
}
