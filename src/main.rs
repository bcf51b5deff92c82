use anyhow::{bail, Context, Result};
use beamsync::capture::CaptureMethod;
use beamsync::config::{Options, SplitScreen};
use beamsync::events::AppEvent;
use beamsync::render_context::SoftwareContext;
use beamsync::session::Session;
use beamsync::settings::SettingsStore;
use beamsync::shader::ProfileKind;
use beamsync::timebase::{SystemClock, VsyncTiming};
use beamsync::{log_error, log_info, log_warn};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

const DEFAULT_REFRESH_RATE: f64 = 240.0;
const DEFAULT_RUN_SECONDS: f64 = 10.0;
const LOG_RETENTION: usize = 10;
const POLL_INTERVAL: Duration = Duration::from_millis(20);

const USAGE: &str = "Usage: beamsync [options]
  --sub-frames N        output refreshes per content frame (1-16)
  --profile crt|bfi     shader profile
  --hz RATE             simulated display refresh rate
  --seconds S           how long to run
  --size WxH            output size
  --split off|vertical|horizontal
  --image PATH          capture a still image instead of the test pattern
  --benchmark           run the 4 second benchmark and exit
  --no-autosync         disable drift resync
  --forget              do not load or save settings
  --stream-logs         echo the log to stdout as it is written";

fn main() -> Result<()> {
    let result = run_app();
    if let Err(e) = &result {
        log_error!("Fatal: {:#}", e);
    }
    let _ = beamsync::logger::finalize_logs();
    result
}

fn arg_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

fn parse_size(text: &str) -> Option<(u32, u32)> {
    let (w, h) = text.split_once(['x', 'X'])?;
    Some((w.trim().parse().ok()?, h.trim().parse().ok()?))
}

fn parse_split(text: &str) -> Option<SplitScreen> {
    match text.to_ascii_lowercase().as_str() {
        "off" | "none" => Some(SplitScreen::Off),
        "vertical" | "v" => Some(SplitScreen::Vertical),
        "horizontal" | "h" => Some(SplitScreen::Horizontal),
        _ => None,
    }
}

/// Layers command line flags over `options`.
fn apply_args(args: &[String], options: &mut Options, refresh_rate: f64) -> Result<()> {
    match arg_value(args, "--sub-frames") {
        Some(value) => {
            options.sub_frames = value
                .parse()
                .with_context(|| format!("Invalid --sub-frames value: {}", value))?;
        }
        None if arg_value(args, "--hz").is_some() => {
            options.sub_frames = Options::default_sub_frames(refresh_rate);
        }
        None => {}
    }

    if let Some(value) = arg_value(args, "--profile") {
        options.shader_profile = match ProfileKind::parse(value) {
            Some(kind) => kind,
            None => bail!("Unknown profile: {}", value),
        };
    }

    if let Some(value) = arg_value(args, "--size") {
        let Some((width, height)) = parse_size(value) else {
            bail!("Invalid --size value: {}", value);
        };
        options.output_width = width;
        options.output_height = height;
    }

    if let Some(value) = arg_value(args, "--split") {
        options.split_screen = match parse_split(value) {
            Some(split) => split,
            None => bail!("Invalid --split value: {}", value),
        };
    }

    if let Some(path) = arg_value(args, "--image") {
        options.capture_method = CaptureMethod::Image;
        options.capture_image = Some(PathBuf::from(path));
    }

    if args.contains(&"--no-autosync".to_string()) {
        options.auto_sync = false;
    }

    options.validate();
    Ok(())
}

fn run_app() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.contains(&"--help".to_string()) || args.contains(&"-h".to_string()) {
        println!("{}", USAGE);
        println!("Profiles:");
        for kind in ProfileKind::ALL {
            println!("  {}", kind.name());
        }
        println!("Capture sources:");
        for method in CaptureMethod::ALL {
            println!("  {}", method.name());
        }
        return Ok(());
    }

    let stream_logs = args.contains(&"--stream-logs".to_string());
    let benchmark = args.contains(&"--benchmark".to_string());
    let forget = args.contains(&"--forget".to_string());

    let settings_dir = SettingsStore::default_dir()?;
    beamsync::logger::init_logger(settings_dir.join("logs"), "beamsync", LOG_RETENTION, stream_logs)?;

    log_info!("BeamSync {} started", env!("CARGO_PKG_VERSION"));
    if let Some(log_path) = beamsync::logger::get_log_path() {
        log_info!("Log file: {}", log_path.display());
    }
    if stream_logs {
        log_info!("Streaming mode enabled via --stream-logs");
    } else {
        log_info!("Buffered mode - logs will be written to file on exit");
    }

    let refresh_rate = match arg_value(&args, "--hz") {
        Some(value) => value
            .parse::<f64>()
            .ok()
            .filter(|hz| *hz > 0.0)
            .with_context(|| format!("Invalid --hz value: {}", value))?,
        None => DEFAULT_REFRESH_RATE,
    };
    let run_for = match arg_value(&args, "--seconds") {
        Some(value) => value
            .parse::<f64>()
            .ok()
            .filter(|s| *s > 0.0)
            .with_context(|| format!("Invalid --seconds value: {}", value))?,
        None => DEFAULT_RUN_SECONDS,
    };

    let store = if forget {
        None
    } else {
        match SettingsStore::open(&settings_dir) {
            Ok(store) => Some(store),
            Err(e) => {
                log_warn!("Settings unavailable, using defaults: {:#}", e);
                None
            }
        }
    };

    let mut options = store.as_ref().map(SettingsStore::options).unwrap_or_default();
    apply_args(&args, &mut options, refresh_rate)?;

    let timing = Arc::new(VsyncTiming::new(refresh_rate));
    let pacing = Arc::clone(&timing);
    let mut session = Session::new(
        options,
        SystemClock::shared(),
        timing,
        Box::new(move |o: &Options| {
            Ok(SoftwareContext::new(o.output_width, o.output_height).with_vsync(Arc::clone(&pacing)))
        }),
    );
    if let Some(store) = store {
        session = session.with_settings(store);
    }

    session.start()?;
    if let Some(message) = session.error_message() {
        eprintln!("{}", message);
    }
    if benchmark {
        session.post(AppEvent::Benchmark);
    }

    let started = Instant::now();
    let mut last_report = Instant::now();
    loop {
        if !session.process_events()? {
            break;
        }

        if benchmark {
            if let Some(report) = session.benchmark() {
                println!("{}", report);
                session.post(AppEvent::Quit);
                continue;
            }
        } else if started.elapsed().as_secs_f64() >= run_for {
            session.post(AppEvent::Quit);
            continue;
        }

        if last_report.elapsed() >= Duration::from_secs(1) {
            last_report = Instant::now();
            let snapshot = session.snapshot();
            let watcher = session.watcher();
            let lag = watcher.receive_chart.drain_summary().unwrap_or_default();
            let frame_time = watcher.submit_chart.drain_summary().unwrap_or_default();
            log_info!(
                "Input {:.1} FPS, output {:.1} FPS, lag {:.1}ms (avg {:.1}, max {:.1}), frame time max {:.2}ms, resyncs {}, errors {}",
                snapshot.input_fps,
                snapshot.output_fps,
                snapshot.capture_lag,
                lag.mean,
                lag.max,
                frame_time.max,
                session.status().resyncs(),
                session.status().errors()
            );
        }

        spin_sleep::sleep(POLL_INTERVAL);
    }

    log_info!("BeamSync exiting normally");
    Ok(())
}
