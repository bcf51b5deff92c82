use crate::capture::{Capture, CaptureSettings};
use crate::config::Options;
use crate::events::{AppEvent, EventQueue, EventSender};
use crate::render_context::RenderContext;
use crate::render_thread::{LoopSettings, LoopStatus, RenderLoop, RenderThread};
use crate::renderer::{BenchmarkReport, RenderSettings, Renderer};
use crate::settings::SettingsStore;
use crate::shader::ShaderProfile;
use crate::timebase::{SharedClock, VsyncTiming};
use crate::watcher::{Snapshot, Watcher};
use crate::{log_error, log_info, log_warn};
use anyhow::{Context, Result};
use std::sync::Arc;

pub type ContextFactory<C> = Box<dyn FnMut(&Options) -> Result<C>>;

/// Everything one running pipeline needs, in one place: options, shared
/// timing and metrics, the render thread and the application event queue.
pub struct Session<C: RenderContext + 'static> {
    options: Options,
    clock: SharedClock,
    watcher: Arc<Watcher>,
    timing: Arc<VsyncTiming>,
    events: EventQueue,
    thread: RenderThread<C>,
    active: bool,
    status: Arc<LoopStatus>,
    error_message: Option<String>,
    make_context: ContextFactory<C>,
    settings: Option<SettingsStore>,
}

impl<C: RenderContext + 'static> Session<C> {
    pub fn new(options: Options, clock: SharedClock, timing: Arc<VsyncTiming>, make_context: ContextFactory<C>) -> Self {
        let watcher = Arc::new(Watcher::new(clock.clone()));
        Self {
            options,
            clock,
            watcher,
            timing,
            events: EventQueue::new(),
            thread: RenderThread::new(),
            active: false,
            status: Arc::new(LoopStatus::default()),
            error_message: None,
            make_context,
            settings: None,
        }
    }

    /// Saves options (and shader parameter changes) to `store` on every stop.
    pub fn with_settings(mut self, store: SettingsStore) -> Self {
        self.settings = Some(store);
        self
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Changes take effect on the next start.
    pub fn options_mut(&mut self) -> &mut Options {
        &mut self.options
    }

    pub fn watcher(&self) -> &Arc<Watcher> {
        &self.watcher
    }

    pub fn timing(&self) -> &Arc<VsyncTiming> {
        &self.timing
    }

    pub fn snapshot(&self) -> Snapshot {
        self.watcher.snapshot()
    }

    pub fn status(&self) -> &Arc<LoopStatus> {
        &self.status
    }

    pub fn is_running(&self) -> bool {
        self.thread.is_running()
    }

    /// Why capture could not start, otherwise the latest render-loop error.
    pub fn error_message(&self) -> Option<String> {
        self.error_message.clone().or_else(|| self.status.last_error())
    }

    pub fn benchmark(&self) -> Option<BenchmarkReport> {
        self.status.benchmark()
    }

    pub fn event_sender(&self) -> EventSender {
        self.events.sender()
    }

    pub fn post(&self, event: AppEvent) {
        self.events.post(event);
    }

    /// Renderer and thread failures are fatal. A capture that fails to start
    /// is recorded in [`Session::error_message`] and the output keeps
    /// presenting without input.
    pub fn start(&mut self) -> Result<()> {
        if self.thread.is_running() {
            return Ok(());
        }
        if self.active {
            // the render thread ended on its own
            self.stop();
        }

        self.options.validate();
        self.error_message = None;

        let ctx = (self.make_context)(&self.options).context("Failed to create render context")?;
        let mut profile = ShaderProfile::new(self.options.shader_profile);
        for e in profile.parameters_mut().apply_overrides(&self.options.shader_parameters) {
            log_warn!("Ignoring saved shader parameter: {}", e);
        }

        let mut renderer = Renderer::new(
            ctx,
            profile,
            Arc::clone(&self.watcher),
            RenderSettings::from_options(&self.options),
        );
        renderer.start().context("Failed to start renderer")?;

        self.watcher.start();
        let capture = self.start_capture();

        self.status = Arc::new(LoopStatus::default());
        let render_loop = RenderLoop::new(
            renderer,
            capture,
            Arc::clone(&self.timing),
            LoopSettings::from_options(&self.options),
            Arc::clone(&self.status),
        );
        self.thread
            .start(render_loop)
            .context("Failed to start render thread")?;
        self.active = true;

        log_info!(
            "Session started: {}, {} sub-frames at {:.2}Hz, capture '{}'",
            self.options.shader_profile.name(),
            self.options.sub_frames,
            self.timing.rate(),
            self.options.capture_method.name()
        );
        Ok(())
    }

    fn start_capture(&mut self) -> Option<Capture> {
        let backend = self
            .options
            .capture_method
            .create(self.clock.clone(), self.options.capture_image.as_deref());
        let mut capture = Capture::new(backend, Arc::clone(&self.watcher), Some(self.events.sender()));

        if self.options.capture_window.is_some() && !capture.supports_window_capture() {
            log_warn!("{} cannot capture a window, capturing the desktop", capture.name());
            self.options.capture_window = None;
        }

        let settings = CaptureSettings {
            output_width: self.options.output_width,
            output_height: self.options.output_height,
            window: self.options.capture_window,
            cross_adapter: self.options.cross_adapter,
        };
        match capture.start(settings) {
            Ok(()) => Some(capture),
            Err(e) => {
                log_error!("Unable to start capture: {}", e);
                self.error_message = Some(format!("Unable to start capture: {}", e));
                None
            }
        }
    }

    /// Stops the render thread, then capture and renderer, and saves settings.
    pub fn stop(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;

        match self.thread.stop() {
            Some(render_loop) => {
                let (renderer, _) = render_loop.shutdown();
                self.options.shader_parameters = renderer.profile().parameters().overrides();
            }
            None => log_error!("Render thread did not hand back its renderer, keeping saved shader parameters"),
        }

        if let Some(error) = self.status.last_error() {
            log_warn!(
                "Session stopped after {} render errors, last: {}",
                self.status.errors(),
                error
            );
        }
        self.save_settings();
        log_info!("Session stopped");
    }

    pub fn save_settings(&self) {
        if let Some(store) = &self.settings {
            store.update(|o| *o = self.options.clone());
        }
    }

    /// Handles queued events. Returns `false` once the session should quit.
    pub fn process_events(&mut self) -> Result<bool> {
        for event in self.events.drain() {
            match event {
                AppEvent::Restart => {
                    self.stop();
                    self.start()?;
                }
                AppEvent::Benchmark => {
                    log_info!("Benchmark requested");
                    self.thread.request_benchmark();
                }
                AppEvent::WindowClosed => {
                    self.options.capture_window = None;
                    self.events.post(AppEvent::Restart);
                }
                AppEvent::ToggleActive => {
                    if self.thread.is_running() {
                        self.stop();
                    } else {
                        self.start()?;
                    }
                }
                AppEvent::Quit => {
                    self.stop();
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }
}

impl<C: RenderContext + 'static> Drop for Session<C> {
    fn drop(&mut self) {
        self.stop();
    }
}
