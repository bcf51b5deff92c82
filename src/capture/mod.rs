//! Capture side of the pipeline.
//!
//! A [`CaptureBackend`] produces frames; [`Capture`] wraps one and does the
//! work common to all of them: window offsets, the cross-adapter staging copy,
//! reporting arrivals to the [`Watcher`] and posting window-closed events.

mod image;
mod pattern;

pub use self::image::ImageCapture;
pub use self::pattern::PatternCapture;

use crate::config::WindowTarget;
use crate::error::{CaptureError, RenderError};
use crate::events::{AppEvent, EventSender};
use crate::render_context::{InputFrame, RenderContext};
use crate::timebase::{SharedClock, Ticks};
use crate::watcher::Watcher;
use crate::{log_info, log_warn};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// A frame handed over by a backend, in 0xAARRGGBB pixels.
#[derive(Debug, Clone, Copy)]
pub struct CapturedFrame<'a> {
    pub width: u32,
    pub height: u32,
    /// When the source produced the frame.
    pub timestamp: Ticks,
    pub pixels: &'a [u32],
}

#[derive(Debug)]
pub enum Grab<'a> {
    Frame(CapturedFrame<'a>),
    /// Nothing new since the last grab.
    Idle,
    /// The captured window no longer exists.
    WindowClosed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CaptureSettings {
    pub output_width: u32,
    pub output_height: u32,
    pub window: Option<WindowTarget>,
    /// Capture and render run on different adapters, so frames are staged in
    /// CPU memory before being uploaded.
    pub cross_adapter: bool,
}

/// A source of frames. `grab` is called from the render thread and must not block.
pub trait CaptureBackend: Send {
    fn name(&self) -> &'static str;
    fn is_supported(&self) -> bool;
    fn supports_window_capture(&self) -> bool;
    fn start(&mut self, settings: &CaptureSettings) -> Result<(), CaptureError>;
    fn grab(&mut self) -> Result<Grab<'_>, CaptureError>;
    fn stop(&mut self);
}

/// The input slot a poll writes into.
pub struct SlotWriter<'a> {
    ctx: &'a mut dyn RenderContext,
    slot: usize,
}

impl<'a> SlotWriter<'a> {
    pub fn new(ctx: &'a mut dyn RenderContext, slot: usize) -> Self {
        Self { ctx, slot }
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn write(&mut self, frame: &InputFrame<'_>) -> Result<(), RenderError> {
        self.ctx.submit_input(self.slot, frame)
    }
}

#[derive(Debug, Default)]
struct Staging {
    width: u32,
    height: u32,
    pixels: Vec<u32>,
    pending: bool,
}

pub struct Capture {
    backend: Box<dyn CaptureBackend>,
    watcher: Arc<Watcher>,
    events: Option<EventSender>,
    settings: CaptureSettings,
    offset: (i32, i32),
    staging: Staging,
    stopping: bool,
    window_closed: bool,
}

impl Capture {
    pub fn new(backend: Box<dyn CaptureBackend>, watcher: Arc<Watcher>, events: Option<EventSender>) -> Self {
        Self {
            backend,
            watcher,
            events,
            settings: CaptureSettings::default(),
            offset: (0, 0),
            staging: Staging::default(),
            stopping: true,
            window_closed: false,
        }
    }

    pub fn name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn is_supported(&self) -> bool {
        self.backend.is_supported()
    }

    pub fn supports_window_capture(&self) -> bool {
        self.backend.supports_window_capture()
    }

    pub fn is_running(&self) -> bool {
        !self.stopping
    }

    pub fn start(&mut self, settings: CaptureSettings) -> Result<(), CaptureError> {
        if !self.backend.is_supported() {
            return Err(CaptureError::Unsupported(self.backend.name()));
        }
        if settings.window.is_some() && !self.backend.supports_window_capture() {
            return Err(CaptureError::Backend(format!(
                "{} cannot capture a single window",
                self.backend.name()
            )));
        }

        self.settings = settings;
        self.offset = settings
            .window
            .map(|w| (w.offset_x, w.offset_y))
            .unwrap_or((0, 0));
        self.staging = Staging::default();
        self.window_closed = false;

        self.watcher.start();
        self.backend.start(&self.settings)?;
        self.stopping = false;

        log_info!(
            "Capture '{}' started ({}x{}{})",
            self.backend.name(),
            settings.output_width,
            settings.output_height,
            if settings.cross_adapter { ", cross-adapter" } else { "" }
        );
        Ok(())
    }

    pub fn stop(&mut self) {
        if self.stopping {
            return;
        }
        self.stopping = true;
        self.backend.stop();
        self.staging = Staging::default();
        log_info!("Capture '{}' stopped", self.backend.name());
    }

    /// Writes a new frame into `writer` if one is available.
    ///
    /// Returns whether a new frame arrived. With cross-adapter capture the
    /// upload happens after the backend has released its frame.
    pub fn poll(&mut self, writer: &mut SlotWriter<'_>) -> Result<bool, CaptureError> {
        if self.stopping {
            return Ok(false);
        }

        let new_frame = match self.backend.grab()? {
            Grab::Frame(frame) => {
                self.watcher.frame_received(frame.timestamp);
                if self.settings.cross_adapter {
                    self.staging.width = frame.width;
                    self.staging.height = frame.height;
                    self.staging.pixels.clear();
                    self.staging.pixels.extend_from_slice(frame.pixels);
                    self.staging.pending = true;
                } else {
                    writer.write(&InputFrame {
                        width: frame.width,
                        height: frame.height,
                        x: self.offset.0,
                        y: self.offset.1,
                        pixels: frame.pixels,
                    })?;
                }
                true
            }
            Grab::Idle => false,
            Grab::WindowClosed => {
                if !self.window_closed {
                    self.window_closed = true;
                    log_warn!("Captured window closed, falling back to desktop capture");
                    if let Some(events) = &self.events {
                        events.post(AppEvent::WindowClosed);
                    }
                }
                false
            }
        };

        if self.staging.pending {
            self.upload_staging(writer)?;
        }
        Ok(new_frame)
    }

    /// The copy a poll would do, for timing. Only cross-adapter capture has one.
    pub fn benchmark_copy(&mut self, writer: &mut SlotWriter<'_>) -> Result<(), CaptureError> {
        if self.settings.cross_adapter && !self.staging.pixels.is_empty() {
            self.upload_staging(writer)?;
        }
        Ok(())
    }

    fn upload_staging(&mut self, writer: &mut SlotWriter<'_>) -> Result<(), RenderError> {
        self.staging.pending = false;
        writer.write(&InputFrame {
            width: self.staging.width,
            height: self.staging.height,
            x: self.offset.0,
            y: self.offset.1,
            pixels: &self.staging.pixels,
        })
    }
}

/// Built-in capture backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CaptureMethod {
    #[default]
    Pattern,
    Image,
}

impl CaptureMethod {
    pub const ALL: [CaptureMethod; 2] = [CaptureMethod::Pattern, CaptureMethod::Image];

    pub fn name(self) -> &'static str {
        match self {
            Self::Pattern => PatternCapture::NAME,
            Self::Image => ImageCapture::NAME,
        }
    }

    pub fn create(self, clock: SharedClock, image_path: Option<&Path>) -> Box<dyn CaptureBackend> {
        match self {
            Self::Pattern => Box::new(PatternCapture::new(clock)),
            Self::Image => Box::new(ImageCapture::new(clock, image_path.map(Path::to_path_buf))),
        }
    }
}
