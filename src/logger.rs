use anyhow::{Context, Result};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::thread;

/// Lines held in memory before buffered mode writes them out.
const BUFFER_LIMIT: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn prefix(self) -> &'static str {
        match self {
            LogLevel::Info => "",
            LogLevel::Warn => "WARN: ",
            LogLevel::Error => "ERROR: ",
        }
    }
}

enum WriteCommand {
    Lines(Vec<String>),
    Sync(Sender<()>),
    Shutdown,
}

/// One log file per session, named `<app>_<timestamp>.log`.
///
/// Buffered mode keeps lines in memory and hands full batches to a writer
/// thread, so a logging thread only waits on disk in `flush_to_disk`.
/// Streaming mode echoes to stdout and appends every line as it comes.
pub struct SessionLogger {
    buffer: Mutex<Vec<String>>,
    log_path: PathBuf,
    log_dir: PathBuf,
    retention_count: usize,
    app_name: String,
    stream_to_stdout: bool,
    write_sender: Sender<WriteCommand>,
    write_thread: Mutex<Option<thread::JoinHandle<()>>>,
}

impl SessionLogger {
    pub fn new(log_dir: PathBuf, app_name: &str, retention_count: usize, stream_to_stdout: bool) -> Result<Self> {
        fs::create_dir_all(&log_dir)?;

        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let log_path = log_dir.join(format!("{}_{}.log", app_name, timestamp));

        let (write_sender, write_receiver) = unbounded();
        let worker_path = log_path.clone();
        let write_thread = thread::Builder::new()
            .name("log-writer".to_string())
            .spawn(move || Self::write_worker(worker_path, write_receiver))
            .context("Failed to start log writer")?;

        let logger = Self {
            buffer: Mutex::new(Vec::new()),
            log_path,
            log_dir,
            retention_count,
            app_name: app_name.to_string(),
            stream_to_stdout,
            write_sender,
            write_thread: Mutex::new(Some(write_thread)),
        };

        logger.clean_old_logs()?;
        logger.log(LogLevel::Info, format!("=== {} Session Started ===", app_name));

        Ok(logger)
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn log(&self, level: LogLevel, message: impl AsRef<str>) {
        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
        let line = format!("[{}] {}{}", timestamp, level.prefix(), message.as_ref());

        if self.stream_to_stdout {
            println!("{}", line);
            let _ = self.append(std::slice::from_ref(&line));
            return;
        }

        let batch = {
            let mut buffer = self.buffer.lock();
            buffer.push(line);
            if buffer.len() >= BUFFER_LIMIT {
                Some(std::mem::take(&mut *buffer))
            } else {
                None
            }
        };
        if let Some(lines) = batch {
            let _ = self.write_sender.send(WriteCommand::Lines(lines));
        }
    }

    fn append(&self, lines: &[String]) -> Result<()> {
        append_lines(&self.log_path, lines)
    }

    fn write_worker(log_path: PathBuf, receiver: Receiver<WriteCommand>) {
        while let Ok(cmd) = receiver.recv() {
            match cmd {
                WriteCommand::Lines(lines) => {
                    if let Err(e) = append_lines(&log_path, &lines) {
                        eprintln!("Failed to write log file: {}", e);
                    }
                }
                WriteCommand::Sync(done) => {
                    let _ = done.send(());
                }
                WriteCommand::Shutdown => break,
            }
        }
    }

    /// Deletes all but the newest `retention_count` logs of this app.
    fn clean_old_logs(&self) -> Result<()> {
        let prefix = format!("{}_", self.app_name);
        let mut log_files: Vec<(PathBuf, std::time::SystemTime)> = fs::read_dir(&self.log_dir)?
            .flatten()
            .filter_map(|entry| {
                let path = entry.path();
                let name = path.file_name()?.to_str()?;
                if !name.starts_with(&prefix) || path.extension()? != "log" {
                    return None;
                }
                let modified = entry.metadata().ok()?.modified().ok()?;
                Some((path, modified))
            })
            .collect();

        log_files.sort_by(|a, b| b.1.cmp(&a.1));

        // the file for this session is created later and counts against the limit
        for (path, _) in log_files.iter().skip(self.retention_count.saturating_sub(1)) {
            let _ = fs::remove_file(path);
        }

        Ok(())
    }

    /// Hands buffered lines to the writer and waits until everything queued is on disk.
    pub fn flush_to_disk(&self) -> Result<()> {
        let lines = std::mem::take(&mut *self.buffer.lock());
        if !lines.is_empty() {
            self.write_sender
                .send(WriteCommand::Lines(lines))
                .map_err(|_| anyhow::anyhow!("Log writer stopped"))?;
        }

        let (done_sender, done_receiver) = bounded(1);
        self.write_sender
            .send(WriteCommand::Sync(done_sender))
            .map_err(|_| anyhow::anyhow!("Log writer stopped"))?;
        done_receiver.recv().context("Log writer stopped")?;
        Ok(())
    }

    #[cfg(test)]
    fn buffered_lines(&self) -> usize {
        self.buffer.lock().len()
    }

    pub fn finalize(&self) -> Result<()> {
        self.log(LogLevel::Info, format!("=== {} Session Ended ===", self.app_name));
        self.flush_to_disk()
    }
}

impl Drop for SessionLogger {
    fn drop(&mut self) {
        let _ = self.finalize();
        let _ = self.write_sender.send(WriteCommand::Shutdown);
        if let Some(handle) = self.write_thread.lock().take() {
            let _ = handle.join();
        }
    }
}

fn append_lines(path: &Path, lines: &[String]) -> Result<()> {
    let mut file = fs::OpenOptions::new().create(true).append(true).open(path)?;
    for line in lines {
        writeln!(file, "{}", line)?;
    }
    file.flush()?;
    Ok(())
}

static LOGGER: once_cell::sync::OnceCell<SessionLogger> = once_cell::sync::OnceCell::new();

pub fn init_logger(log_dir: PathBuf, app_name: &str, retention_count: usize, stream_to_stdout: bool) -> Result<()> {
    let logger = SessionLogger::new(log_dir, app_name, retention_count, stream_to_stdout)?;
    LOGGER.set(logger).map_err(|_| anyhow::anyhow!("Logger already initialized"))?;
    Ok(())
}

pub fn log_error(message: impl AsRef<str>) {
    if let Some(logger) = LOGGER.get() {
        logger.log(LogLevel::Error, message);
    }
}

pub fn log_warn(message: impl AsRef<str>) {
    if let Some(logger) = LOGGER.get() {
        logger.log(LogLevel::Warn, message);
    }
}

pub fn log_info(message: impl AsRef<str>) {
    if let Some(logger) = LOGGER.get() {
        logger.log(LogLevel::Info, message);
    }
}

pub fn flush_logs() -> Result<()> {
    if let Some(logger) = LOGGER.get() {
        logger.flush_to_disk()?;
    }
    Ok(())
}

/// Statics are never dropped, so the session end has to be written explicitly.
pub fn finalize_logs() -> Result<()> {
    if let Some(logger) = LOGGER.get() {
        logger.finalize()?;
    }
    Ok(())
}

pub fn get_log_path() -> Option<PathBuf> {
    LOGGER.get().map(|logger| logger.log_path.clone())
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::logger::log_info(format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::logger::log_warn(format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        $crate::logger::log_error(format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("beamsync-logs-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn buffered_lines_reach_the_file_on_flush() {
        let dir = temp_dir("buffered");
        let logger = SessionLogger::new(dir.clone(), "Test", 5, false).unwrap();
        logger.log(LogLevel::Warn, "capture slow");
        assert!(!logger.log_path().exists());

        logger.flush_to_disk().unwrap();
        let text = fs::read_to_string(logger.log_path()).unwrap();
        assert!(text.contains("Session Started"));
        assert!(text.contains("WARN: capture slow"));
        drop(logger);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn full_buffer_goes_to_the_writer() {
        let dir = temp_dir("full");
        let logger = SessionLogger::new(dir.clone(), "Test", 5, false).unwrap();
        // the start banner already sits in the buffer
        for i in 1..BUFFER_LIMIT {
            logger.log(LogLevel::Info, format!("line {}", i));
        }
        assert_eq!(logger.buffered_lines(), 0);

        logger.log(LogLevel::Info, "after the batch");
        assert_eq!(logger.buffered_lines(), 1);

        logger.flush_to_disk().unwrap();
        let text = fs::read_to_string(logger.log_path()).unwrap();
        let batch_end = text.find(&format!("line {}", BUFFER_LIMIT - 1)).unwrap();
        assert!(text.find("after the batch").unwrap() > batch_end);
        drop(logger);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn old_logs_are_pruned() {
        let dir = temp_dir("prune");
        fs::create_dir_all(&dir).unwrap();
        for i in 0..4 {
            fs::write(dir.join(format!("Test_2020010{}_000000.log", i)), "old").unwrap();
        }
        fs::write(dir.join("Other_20200101_000000.log"), "keep").unwrap();

        let logger = SessionLogger::new(dir.clone(), "Test", 2, false).unwrap();
        let remaining = fs::read_dir(&dir)
            .unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().starts_with("Test_"))
            .count();
        assert_eq!(remaining, 1);
        assert!(dir.join("Other_20200101_000000.log").exists());
        drop(logger);
        let _ = fs::remove_dir_all(&dir);
    }
}
