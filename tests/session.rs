use beamsync::config::Options;
use beamsync::events::AppEvent;
use beamsync::render_context::SoftwareContext;
use beamsync::session::Session;
use beamsync::settings::SettingsStore;
use beamsync::shader::ProfileKind;
use beamsync::timebase::{SystemClock, VsyncTiming};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("beamsync-it-{}-{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

fn software_session(options: Options, rate: f64) -> Session<SoftwareContext> {
    let timing = Arc::new(VsyncTiming::new(rate));
    let pacing = Arc::clone(&timing);
    Session::new(
        options,
        SystemClock::shared(),
        timing,
        Box::new(move |o: &Options| {
            Ok(SoftwareContext::new(o.output_width, o.output_height).with_vsync(Arc::clone(&pacing)))
        }),
    )
}

fn small_options() -> Options {
    Options {
        sub_frames: 4,
        output_width: 64,
        output_height: 16,
        ..Options::default()
    }
}

#[test]
fn test_pattern_reaches_the_output() {
    let mut session = software_session(small_options(), 240.0);
    session.start().unwrap();

    // snapshots cover one second
    thread::sleep(Duration::from_millis(1300));
    let snapshot = session.snapshot();
    assert!(session.status().iterations() > 0);
    assert!(snapshot.output_fps > 0.0);
    assert!(snapshot.input_fps > 0.0);
    assert_eq!(session.status().errors(), 0);

    session.post(AppEvent::Quit);
    assert!(!session.process_events().unwrap());
}

#[test]
fn test_benchmark_reports_through_status() {
    let mut session = software_session(small_options(), 240.0);
    session.start().unwrap();
    session.post(AppEvent::Benchmark);
    session.process_events().unwrap();

    let deadline = Instant::now() + Duration::from_secs(20);
    let report = loop {
        if let Some(report) = session.benchmark() {
            break report;
        }
        assert!(Instant::now() < deadline, "benchmark never finished");
        thread::sleep(Duration::from_millis(50));
    };

    assert!(report.frames > 0);
    assert!(report.seconds >= 4.0);
    assert!(report.fps > 0.0);
    session.stop();
}

#[test]
fn test_shader_parameters_persist_between_sessions() {
    let dir = temp_dir("params");
    {
        let store = SettingsStore::open(&dir).unwrap();
        let mut options = small_options();
        options.shader_profile = ProfileKind::CrtBeamSimulator;
        options
            .shader_parameters
            .insert("Slow Motion Mode".to_string(), "3".to_string());
        let mut session = software_session(options, 240.0).with_settings(store);
        session.start().unwrap();
        thread::sleep(Duration::from_millis(50));
        session.stop();
    }

    let store = SettingsStore::open(&dir).unwrap();
    let options = store.options();
    assert_eq!(options.sub_frames, 4);
    assert_eq!(
        options.shader_parameters.get("Slow Motion Mode").map(String::as_str),
        Some("3")
    );
    drop(store);
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_restart_picks_up_new_options() {
    let mut session = software_session(small_options(), 240.0);
    session.start().unwrap();

    session.options_mut().sub_frames = 2;
    session.options_mut().shader_profile = ProfileKind::SimpleBfi;
    session.post(AppEvent::Restart);
    assert!(session.process_events().unwrap());
    assert!(session.is_running());

    thread::sleep(Duration::from_millis(50));
    assert!(session.status().iterations() > 0);
    session.stop();
    assert!(!session.is_running());
}
