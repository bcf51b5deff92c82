pub mod capture;
pub mod chart;
pub mod config;
pub mod error;
pub mod events;
pub mod frame;
pub mod logger;
pub mod render_context;
pub mod render_thread;
pub mod renderer;
pub mod resync;
pub mod session;
pub mod settings;
pub mod shader;
pub mod timebase;
pub mod watcher;

pub use logger::*;
pub use capture::{Capture, CaptureBackend, CaptureMethod};
pub use config::{MonitorType, Options, SplitScreen};
pub use events::AppEvent;
pub use render_context::{RenderContext, SoftwareContext};
pub use renderer::{BenchmarkReport, Renderer};
pub use session::Session;
pub use settings::SettingsStore;
pub use shader::{ProfileKind, ShaderProfile};
pub use timebase::{SystemClock, VsyncTiming};
pub use watcher::{Snapshot, Watcher};
