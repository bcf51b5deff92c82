use super::{FrameInfo, ParameterSet};
use crate::render_context::RenderContext;

/// Shows the newest capture on the first sub-frame and black on the rest.
#[derive(Debug, Default)]
pub struct SimpleBfi {
    params: ParameterSet,
}

impl SimpleBfi {
    pub const NUM_INPUTS: usize = 1;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn render(&self, info: &FrameInfo<'_>, ctx: &mut dyn RenderContext) {
        if info.sub_frame_no != 0 {
            ctx.black_frame();
        } else {
            ctx.passthrough(info.newest_slot());
        }
    }

    pub fn parameters(&self) -> &ParameterSet {
        &self.params
    }

    pub fn parameters_mut(&mut self) -> &mut ParameterSet {
        &mut self.params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MonitorType;
    use crate::render_context::SoftwareContext;

    #[test]
    fn black_on_every_sub_frame_but_the_first() {
        let mut ctx = SoftwareContext::new(2, 2);
        ctx.create_inputs(1).unwrap();
        let bfi = SimpleBfi::new();
        for sub_frame_no in 0..4 {
            let info = FrameInfo {
                frame_no: 0,
                sub_frame_no,
                sub_frames: 4,
                input_slots: &[0],
                monitor_type: MonitorType::Oled,
                hardware_srgb: false,
            };
            bfi.render(&info, &mut ctx);
        }
        assert_eq!(ctx.stats().passthroughs, 1);
        assert_eq!(ctx.stats().black_frames, 3);
    }
}
