use super::{CaptureBackend, CaptureSettings, CapturedFrame, Grab};
use crate::error::CaptureError;
use crate::timebase::SharedClock;
use image::ImageReader;
use std::path::{Path, PathBuf};

const WHITE: u32 = 0xffff_ffff;

/// Presents a still image as a source that produces a new frame on every grab.
/// Without an image file the frame is plain white.
pub struct ImageCapture {
    clock: SharedClock,
    path: Option<PathBuf>,
    width: u32,
    height: u32,
    pixels: Vec<u32>,
}

impl ImageCapture {
    pub const NAME: &'static str = "Image";

    pub fn new(clock: SharedClock, path: Option<PathBuf>) -> Self {
        Self {
            clock,
            path,
            width: 0,
            height: 0,
            pixels: Vec::new(),
        }
    }

    fn load(path: &Path) -> Result<(u32, u32, Vec<u32>), CaptureError> {
        let img = ImageReader::open(path)
            .map_err(|e| CaptureError::Backend(format!("Failed to open {}: {}", path.display(), e)))?
            .decode()
            .map_err(|e| CaptureError::Backend(format!("Failed to decode {}: {}", path.display(), e)))?;

        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();
        let pixels = rgba
            .pixels()
            .map(|p| {
                let [r, g, b, a] = p.0;
                (a as u32) << 24 | (r as u32) << 16 | (g as u32) << 8 | b as u32
            })
            .collect();
        Ok((width, height, pixels))
    }
}

impl CaptureBackend for ImageCapture {
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
        let (width, height, pixels) = match &self.path {
            Some(path) => Self::load(path)?,
            None => {
                let width = settings.output_width.max(1);
                let height = settings.output_height.max(1);
                (width, height, vec![WHITE; width as usize * height as usize])
            }
        };
        self.width = width;
        self.height = height;
        self.pixels = pixels;
        Ok(())
    }

    fn grab(&mut self) -> Result<Grab<'_>, CaptureError> {
        if self.pixels.is_empty() {
            return Ok(Grab::Idle);
        }
        Ok(Grab::Frame(CapturedFrame {
            width: self.width,
            height: self.height,
            timestamp: self.clock.now(),
            pixels: &self.pixels,
        }))
    }

    fn stop(&mut self) {
        self.pixels = Vec::new();
    }
}
