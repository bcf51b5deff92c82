use crate::capture::Capture;
use crate::config::Options;
use crate::error::{LoopError, ThreadError};
use crate::render_context::RenderContext;
use crate::renderer::{BenchmarkReport, Renderer};
use crate::resync::ResyncController;
use crate::timebase::VsyncTiming;
use crate::{log_error, log_info, log_warn};
use parking_lot::Mutex;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopSettings {
    pub auto_sync: bool,
    pub auto_sync_interval: u32,
    pub show_ui: bool,
}

impl LoopSettings {
    pub fn from_options(options: &Options) -> Self {
        Self {
            auto_sync: options.auto_sync,
            auto_sync_interval: options.auto_sync_interval,
            show_ui: options.show_ui,
        }
    }
}

/// What the render thread publishes for the application thread.
#[derive(Debug, Default)]
pub struct LoopStatus {
    iterations: AtomicU64,
    errors: AtomicU64,
    resyncs: AtomicU64,
    last_error: Mutex<Option<String>>,
    benchmark: Mutex<Option<BenchmarkReport>>,
}

impl LoopStatus {
    pub fn iterations(&self) -> u64 {
        self.iterations.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    pub fn resyncs(&self) -> u64 {
        self.resyncs.load(Ordering::Relaxed)
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }

    pub fn benchmark(&self) -> Option<BenchmarkReport> {
        *self.benchmark.lock()
    }

    fn record_error(&self, error: &LoopError) -> u64 {
        *self.last_error.lock() = Some(error.to_string());
        self.errors.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// One iteration of work per display refresh: maybe benchmark, maybe poll,
/// then render and present.
pub struct RenderLoop<C: RenderContext> {
    renderer: Renderer<C>,
    capture: Option<Capture>,
    resync: ResyncController,
    timing: Arc<VsyncTiming>,
    settings: LoopSettings,
    status: Arc<LoopStatus>,
    last_error_log: Option<Instant>,
}

impl<C: RenderContext> RenderLoop<C> {
    /// `capture` is `None` when no source could be started; the loop still
    /// renders so the output keeps presenting.
    pub fn new(
        renderer: Renderer<C>,
        capture: Option<Capture>,
        timing: Arc<VsyncTiming>,
        settings: LoopSettings,
        status: Arc<LoopStatus>,
    ) -> Self {
        Self {
            renderer,
            capture,
            resync: ResyncController::new(settings.auto_sync_interval),
            timing,
            settings,
            status,
            last_error_log: None,
        }
    }

    /// Runs one iteration, recording any failure instead of returning it.
    /// A panic inside the iteration counts as one more error.
    pub fn run_once(&mut self, benchmark: bool) {
        self.status.iterations.fetch_add(1, Ordering::Relaxed);
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.iteration(benchmark)))
            .unwrap_or_else(|payload| Err(LoopError::Panic(panic_message(payload.as_ref()))));
        if let Err(e) = result {
            let count = self.status.record_error(&e);
            let due = self
                .last_error_log
                .map_or(true, |last| last.elapsed().as_secs() >= 1);
            if due {
                log_error!("Render error (count: {}): {}", count, e);
                self.last_error_log = Some(Instant::now());
            }
        }
    }

    pub fn iteration(&mut self, benchmark: bool) -> Result<(), LoopError> {
        if benchmark {
            let report = self.renderer.benchmark(self.capture.as_mut())?;
            *self.status.benchmark.lock() = Some(report);
        }
        if self.renderer.new_input_required() {
            self.poll_capture()?;
        }
        self.renderer.render(true, self.settings.show_ui)?;
        Ok(())
    }

    /// Polls into the next slot, rolls the ring and, now and then, checks
    /// whether captures arrive late enough to shift the sub-frame phase.
    pub fn poll_capture(&mut self) -> Result<bool, LoopError> {
        let new_frame = match self.capture.as_mut() {
            Some(capture) => capture.poll(&mut self.renderer.slot_writer())?,
            None => false,
        };
        self.renderer.roll_input(new_frame);

        if new_frame && self.settings.auto_sync && self.renderer.supports_resync() {
            let snapshot = self.renderer.watcher().snapshot();
            let skip = self.resync.on_new_frame(
                &snapshot,
                self.timing.duration(),
                self.timing.rate(),
                self.renderer.sub_frames(),
            );
            if let Some(skip) = skip {
                self.renderer.skip(skip);
                self.status.resyncs.fetch_add(1, Ordering::Relaxed);
                log_info!(
                    "Resync: capture lag {:.2}ms, skipping {} sub-frames",
                    snapshot.capture_lag,
                    skip
                );
            }
        }
        Ok(new_frame)
    }

    pub fn renderer(&self) -> &Renderer<C> {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut Renderer<C> {
        &mut self.renderer
    }

    pub fn capture(&self) -> Option<&Capture> {
        self.capture.as_ref()
    }

    pub fn status(&self) -> &Arc<LoopStatus> {
        &self.status
    }

    /// Stops capture and renderer and hands both back.
    pub fn shutdown(mut self) -> (Renderer<C>, Option<Capture>) {
        if let Some(capture) = self.capture.as_mut() {
            capture.stop();
        }
        self.renderer.stop();
        (self.renderer, self.capture)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

/// Marks the thread stopped however its closure exits.
struct ExitGuard(Arc<Mutex<ThreadState>>);

impl Drop for ExitGuard {
    fn drop(&mut self) {
        *self.0.lock() = ThreadState::Stopped;
    }
}

/// Owns the thread a [`RenderLoop`] runs on.
pub struct RenderThread<C: RenderContext + 'static> {
    state: Arc<Mutex<ThreadState>>,
    benchmark: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<Option<RenderLoop<C>>>>,
}

impl<C: RenderContext + 'static> RenderThread<C> {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ThreadState::Idle)),
            benchmark: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    pub fn state(&self) -> ThreadState {
        *self.state.lock()
    }

    pub fn is_running(&self) -> bool {
        self.state() == ThreadState::Running
    }

    /// Hands `render_loop` to a new thread. A loop that cannot be started is
    /// shut down before the error is returned.
    pub fn start(&mut self, render_loop: RenderLoop<C>) -> Result<(), ThreadError> {
        if let Some(handle) = &self.handle {
            if !handle.is_finished() {
                render_loop.shutdown();
                return Err(ThreadError::AlreadyRunning);
            }
            if let Some(finished) = self.stop() {
                finished.shutdown();
            }
        }

        *self.state.lock() = ThreadState::Running;
        self.benchmark.store(false, Ordering::Release);
        let state = Arc::clone(&self.state);
        let benchmark = Arc::clone(&self.benchmark);
        let handoff = Arc::new(Mutex::new(Some(render_loop)));
        let pending = Arc::clone(&handoff);

        let spawned = thread::Builder::new()
            .name("render".to_string())
            .spawn(move || {
                let _exit = ExitGuard(Arc::clone(&state));
                let mut render_loop = pending.lock().take()?;
                elevate_priority();
                log_info!("Render thread started");
                while *state.lock() == ThreadState::Running {
                    let run_benchmark = benchmark.swap(false, Ordering::AcqRel);
                    render_loop.run_once(run_benchmark);
                }
                restore_priority();
                let errors = render_loop.status().errors();
                if errors > 0 {
                    log_warn!("Render thread exiting with {} render errors encountered", errors);
                }
                log_info!("Render thread ended");
                Some(render_loop)
            });

        match spawned {
            Ok(handle) => {
                self.handle = Some(handle);
                Ok(())
            }
            Err(e) => {
                *self.state.lock() = ThreadState::Idle;
                if let Some(render_loop) = handoff.lock().take() {
                    render_loop.shutdown();
                }
                Err(ThreadError::Spawn(e))
            }
        }
    }

    /// Asks the loop to finish its current iteration and waits for it.
    pub fn stop(&mut self) -> Option<RenderLoop<C>> {
        let handle = self.handle.take()?;
        *self.state.lock() = ThreadState::Stopping;

        let render_loop = match handle.join() {
            Ok(render_loop) => render_loop,
            Err(_) => {
                log_error!("Render thread panicked");
                None
            }
        };
        *self.state.lock() = ThreadState::Stopped;
        render_loop
    }

    /// Runs a benchmark at the start of the next iteration.
    pub fn request_benchmark(&self) {
        self.benchmark.store(true, Ordering::Release);
    }
}

impl<C: RenderContext + 'static> Default for RenderThread<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: RenderContext + 'static> Drop for RenderThread<C> {
    fn drop(&mut self) {
        if let Some(render_loop) = self.stop() {
            render_loop.shutdown();
        }
    }
}

#[cfg(windows)]
fn elevate_priority() {
    use windows::Win32::Media::timeBeginPeriod;
    use windows::Win32::System::Threading::{GetCurrentThread, SetThreadPriority, THREAD_PRIORITY_TIME_CRITICAL};

    unsafe {
        if let Err(e) = SetThreadPriority(GetCurrentThread(), THREAD_PRIORITY_TIME_CRITICAL) {
            log_warn!("Failed to raise render thread priority: {}", e);
        }
        timeBeginPeriod(1);
    }
}

#[cfg(windows)]
fn restore_priority() {
    use windows::Win32::Media::timeEndPeriod;

    unsafe {
        timeEndPeriod(1);
    }
}

#[cfg(not(windows))]
fn elevate_priority() {}

#[cfg(not(windows))]
fn restore_priority() {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{CaptureBackend, CaptureSettings, Grab, PatternCapture};
    use crate::error::CaptureError;
    use crate::config::MonitorType;
    use crate::render_context::{FaultyPresent, SoftwareContext};
    use crate::renderer::RenderSettings;
    use crate::shader::{ProfileKind, ShaderProfile};
    use crate::timebase::{ManualClock, SharedClock, SystemClock};
    use crate::watcher::Watcher;
    use std::time::Duration;

    const RATE: f64 = 240.0;

    fn build(
        clock: SharedClock,
        kind: ProfileKind,
        monitor_type: MonitorType,
        auto_sync: bool,
        latency: f64,
    ) -> RenderLoop<SoftwareContext> {
        let watcher = Arc::new(Watcher::new(clock.clone()));
        let mut renderer = Renderer::new(
            SoftwareContext::new(8, 2),
            ShaderProfile::new(kind),
            watcher.clone(),
            RenderSettings {
                sub_frames: 4,
                monitor_type,
                ..RenderSettings::default()
            },
        );
        renderer.start().unwrap();

        let pattern = PatternCapture::new(clock).with_latency(latency);
        let mut capture = Capture::new(Box::new(pattern), watcher, None);
        capture
            .start(CaptureSettings {
                output_width: 8,
                output_height: 2,
                ..CaptureSettings::default()
            })
            .unwrap();

        RenderLoop::new(
            renderer,
            Some(capture),
            Arc::new(VsyncTiming::new(RATE)),
            LoopSettings {
                auto_sync,
                auto_sync_interval: 2,
                show_ui: false,
            },
            Arc::new(LoopStatus::default()),
        )
    }

    fn faulty_loop(timing: Arc<VsyncTiming>, clock: SharedClock) -> RenderLoop<FaultyPresent> {
        let ctx = FaultyPresent::panicking(SoftwareContext::new(8, 2).with_vsync(timing.clone()), 3);
        let mut renderer = Renderer::new(
            ctx,
            ShaderProfile::new(ProfileKind::SimpleBfi),
            Arc::new(Watcher::new(clock)),
            RenderSettings::default(),
        );
        renderer.start().unwrap();
        RenderLoop::new(
            renderer,
            None,
            timing,
            LoopSettings {
                auto_sync: false,
                auto_sync_interval: 2,
                show_ui: false,
            },
            Arc::new(LoopStatus::default()),
        )
    }

    fn run(render_loop: &mut RenderLoop<SoftwareContext>, clock: &ManualClock, iterations: usize) {
        for _ in 0..iterations {
            clock.advance(1000.0 / RATE);
            render_loop.run_once(false);
        }
    }

    #[test]
    fn one_poll_per_content_frame() {
        let clock = ManualClock::new(0.0);
        let mut render_loop = build(Arc::new(clock.clone()), ProfileKind::SimpleBfi, MonitorType::Lcd, false, 0.0);
        run(&mut render_loop, &clock, 8);

        let stats = render_loop.renderer().context().stats();
        assert_eq!(stats.submits, 2);
        assert_eq!(stats.vsync_presents, 8);
        assert_eq!(render_loop.status().iterations(), 8);
        assert_eq!(render_loop.status().errors(), 0);
    }

    #[test]
    fn late_captures_shift_the_phase() {
        let clock = ManualClock::new(0.0);
        let mut render_loop = build(Arc::new(clock.clone()), ProfileKind::SimpleBfi, MonitorType::Lcd, true, 9.0);
        run(&mut render_loop, &clock, 600);
        assert_eq!(render_loop.status().resyncs(), 1);
    }

    #[test]
    fn no_resync_when_disabled() {
        let clock = ManualClock::new(0.0);
        let mut render_loop = build(Arc::new(clock.clone()), ProfileKind::SimpleBfi, MonitorType::Lcd, false, 9.0);
        run(&mut render_loop, &clock, 600);
        assert_eq!(render_loop.status().resyncs(), 0);
    }

    #[test]
    fn no_resync_while_anti_retention_is_active() {
        let clock = ManualClock::new(0.0);
        let mut render_loop = build(
            Arc::new(clock.clone()),
            ProfileKind::CrtBeamSimulator,
            MonitorType::Lcd,
            true,
            9.0,
        );
        run(&mut render_loop, &clock, 600);
        assert_eq!(render_loop.status().resyncs(), 0);
    }

    #[test]
    fn loop_without_capture_keeps_presenting() {
        let clock = ManualClock::new(0.0);
        let render_loop = build(Arc::new(clock.clone()), ProfileKind::SimpleBfi, MonitorType::Lcd, true, 0.0);
        let (mut renderer, _) = render_loop.shutdown();
        renderer.start().unwrap();
        let mut render_loop = RenderLoop::new(
            renderer,
            None,
            Arc::new(VsyncTiming::new(RATE)),
            LoopSettings {
                auto_sync: true,
                auto_sync_interval: 2,
                show_ui: true,
            },
            Arc::new(LoopStatus::default()),
        );
        run(&mut render_loop, &clock, 4);
        let stats = render_loop.renderer().context().stats();
        assert_eq!(stats.submits, 0);
        assert_eq!(stats.presents, 4);
        assert_eq!(stats.ui_renders, 4);
    }

    #[test]
    fn errors_are_counted_and_the_loop_goes_on() {
        let clock = ManualClock::new(0.0);
        let render_loop = build(Arc::new(clock.clone()), ProfileKind::SimpleBfi, MonitorType::Lcd, false, 0.0);
        // a stopped renderer fails every render
        let (renderer, capture) = render_loop.shutdown();
        let mut render_loop = RenderLoop::new(
            renderer,
            capture,
            Arc::new(VsyncTiming::new(RATE)),
            LoopSettings {
                auto_sync: false,
                auto_sync_interval: 2,
                show_ui: false,
            },
            Arc::new(LoopStatus::default()),
        );
        run(&mut render_loop, &clock, 3);
        assert_eq!(render_loop.status().errors(), 3);
        assert!(render_loop.status().last_error().is_some());
    }

    #[test]
    fn thread_runs_until_stopped() {
        let clock: SharedClock = SystemClock::shared();
        let timing = Arc::new(VsyncTiming::new(1000.0));
        let watcher = Arc::new(Watcher::new(clock.clone()));
        let mut renderer = Renderer::new(
            SoftwareContext::new(8, 2).with_vsync(timing.clone()),
            ShaderProfile::new(ProfileKind::SimpleBfi),
            watcher,
            RenderSettings::default(),
        );
        renderer.start().unwrap();
        let status = Arc::new(LoopStatus::default());
        let render_loop = RenderLoop::new(
            renderer,
            None,
            timing,
            LoopSettings {
                auto_sync: true,
                auto_sync_interval: 2,
                show_ui: false,
            },
            status.clone(),
        );

        let mut render_thread = RenderThread::new();
        assert_eq!(render_thread.state(), ThreadState::Idle);
        render_thread.start(render_loop).unwrap();
        assert!(render_thread.is_running());

        thread::sleep(Duration::from_millis(30));
        let render_loop = render_thread.stop().unwrap();
        assert_eq!(render_thread.state(), ThreadState::Stopped);
        assert!(status.iterations() > 0);
        assert_eq!(status.errors(), 0);
        assert_eq!(
            render_loop.renderer().context().stats().presents,
            status.iterations()
        );
        assert!(render_thread.stop().is_none());
    }

    #[test]
    fn panicking_iteration_is_counted_as_an_error() {
        let clock = ManualClock::new(0.0);
        let mut render_loop = faulty_loop(Arc::new(VsyncTiming::new(RATE)), Arc::new(clock.clone()));
        for _ in 0..6 {
            clock.advance(1000.0 / RATE);
            render_loop.run_once(false);
        }

        let status = render_loop.status();
        assert_eq!(status.iterations(), 6);
        assert_eq!(status.errors(), 1);
        assert!(status.last_error().unwrap().contains("device lost"));
        assert_eq!(render_loop.renderer().context().inner().stats().presents, 5);
    }

    #[test]
    fn thread_survives_a_panicking_present() {
        let timing = Arc::new(VsyncTiming::new(1000.0));
        let render_loop = faulty_loop(timing, SystemClock::shared());
        let status = Arc::clone(render_loop.status());

        let mut render_thread = RenderThread::new();
        render_thread.start(render_loop).unwrap();
        thread::sleep(Duration::from_millis(50));
        let before = status.iterations();
        thread::sleep(Duration::from_millis(50));

        assert!(status.iterations() > before);
        assert!(render_thread.is_running());
        assert_eq!(status.errors(), 1);

        let render_loop = render_thread.stop();
        assert!(render_loop.is_some());
        assert_eq!(render_thread.state(), ThreadState::Stopped);
    }

    /// Records whether capture was stopped.
    struct StopFlag(Arc<AtomicBool>);

    impl CaptureBackend for StopFlag {
        fn name(&self) -> &'static str {
            "Stop flag"
        }

        fn is_supported(&self) -> bool {
            true
        }

        fn supports_window_capture(&self) -> bool {
            false
        }

        fn start(&mut self, _settings: &CaptureSettings) -> Result<(), CaptureError> {
            Ok(())
        }

        fn grab(&mut self) -> Result<Grab<'_>, CaptureError> {
            Ok(Grab::Idle)
        }

        fn stop(&mut self) {
            self.0.store(true, Ordering::Release);
        }
    }

    #[test]
    fn rejected_loop_is_shut_down() {
        let timing = Arc::new(VsyncTiming::new(1000.0));
        let mut render_thread = RenderThread::new();
        render_thread
            .start(faulty_loop(timing.clone(), SystemClock::shared()))
            .unwrap();

        let clock = SystemClock::shared();
        let watcher = Arc::new(Watcher::new(clock));
        let stopped = Arc::new(AtomicBool::new(false));
        let mut capture = Capture::new(Box::new(StopFlag(stopped.clone())), watcher.clone(), None);
        capture.start(CaptureSettings::default()).unwrap();
        let mut renderer = Renderer::new(
            FaultyPresent::failing(SoftwareContext::new(8, 2), u32::MAX),
            ShaderProfile::new(ProfileKind::SimpleBfi),
            watcher,
            RenderSettings::default(),
        );
        renderer.start().unwrap();
        let second = RenderLoop::new(
            renderer,
            Some(capture),
            timing,
            LoopSettings {
                auto_sync: false,
                auto_sync_interval: 2,
                show_ui: false,
            },
            Arc::new(LoopStatus::default()),
        );

        assert!(matches!(render_thread.start(second), Err(ThreadError::AlreadyRunning)));
        assert!(stopped.load(Ordering::Acquire));
        assert!(render_thread.is_running());
        assert!(render_thread.stop().is_some());
    }
}
