use crate::config::Options;
use anyhow::{Context, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::RwLock;
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

const SCHEMA_VERSION: i32 = 1;
const OPTIONS_KEY: &str = "options";

enum WriteCommand {
    Update(Box<Options>),
    Shutdown,
}

/// Options cached in memory and persisted to SQLite from a background writer.
pub struct SettingsStore {
    options: Arc<RwLock<Options>>,
    write_sender: Sender<WriteCommand>,
    write_thread: Option<thread::JoinHandle<()>>,
}

impl SettingsStore {
    /// Per-user settings directory: `%APPDATA%\BeamSync`, else `$XDG_CONFIG_HOME/beamsync`
    /// or `~/.config/beamsync`.
    pub fn default_dir() -> Result<PathBuf> {
        if let Ok(app_data) = std::env::var("APPDATA") {
            return Ok(PathBuf::from(app_data).join("BeamSync"));
        }
        if let Ok(config) = std::env::var("XDG_CONFIG_HOME") {
            return Ok(PathBuf::from(config).join("beamsync"));
        }
        let home = std::env::var("HOME").context("Failed to find a settings directory")?;
        Ok(PathBuf::from(home).join(".config").join("beamsync"))
    }

    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).context("Failed to create settings directory")?;
        let db_path = dir.join("settings.db");

        let conn = Connection::open(&db_path).context("Failed to open database")?;
        Self::init_database(&conn)?;
        let mut initial = Self::load_options(&conn)?;
        initial.validate();
        drop(conn);

        let (write_sender, write_receiver) = unbounded();
        let write_thread = thread::Builder::new()
            .name("settings-writer".to_string())
            .spawn(move || Self::write_worker(db_path, write_receiver))
            .context("Failed to start settings writer")?;

        Ok(Self {
            options: Arc::new(RwLock::new(initial)),
            write_sender,
            write_thread: Some(write_thread),
        })
    }

    fn init_database(conn: &Connection) -> Result<()> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
            [],
        )?;

        let current_version: Option<i32> = conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| row.get(0))
            .ok();

        if current_version.is_none() {
            conn.execute("INSERT INTO schema_version (version) VALUES (?1)", params![SCHEMA_VERSION])?;
        }

        Ok(())
    }

    fn load_options(conn: &Connection) -> Result<Options> {
        let json: Option<String> = conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![OPTIONS_KEY],
                |row| row.get(0),
            )
            .ok();

        match json {
            Some(json) => serde_json::from_str(&json).context("Failed to parse settings JSON"),
            None => Ok(Options::default()),
        }
    }

    fn write_worker(db_path: PathBuf, receiver: Receiver<WriteCommand>) {
        let conn = match Connection::open(&db_path) {
            Ok(c) => c,
            Err(e) => {
                crate::log_error!("Failed to open database in settings writer: {}", e);
                return;
            }
        };

        let _ = conn.pragma_update(None, "journal_mode", "WAL");
        let _ = conn.pragma_update(None, "synchronous", "NORMAL");

        while let Ok(cmd) = receiver.recv() {
            match cmd {
                WriteCommand::Update(options) => match serde_json::to_string(&options) {
                    Ok(json) => {
                        if let Err(e) = conn.execute(
                            "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
                            params![OPTIONS_KEY, json],
                        ) {
                            crate::log_error!("Failed to write settings: {}", e);
                        }
                    }
                    Err(e) => crate::log_error!("Failed to serialize settings: {}", e),
                },
                WriteCommand::Shutdown => break,
            }
        }

        let _ = conn.pragma_update(None, "wal_checkpoint", "TRUNCATE");
    }

    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&Options) -> R,
    {
        f(&self.options.read())
    }

    pub fn options(&self) -> Options {
        self.options.read().clone()
    }

    /// Changes the cached options and queues the persisted form for writing.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut Options),
    {
        let mut options = self.options.write();
        f(&mut options);
        options.validate();
        let _ = self
            .write_sender
            .send(WriteCommand::Update(Box::new(options.persisted())));
    }
}

impl Drop for SettingsStore {
    fn drop(&mut self) {
        let _ = self.write_sender.send(WriteCommand::Shutdown);
        if let Some(handle) = self.write_thread.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SplitScreen;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("beamsync-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn fresh_store_has_defaults() {
        let dir = temp_dir("fresh");
        let store = SettingsStore::open(&dir).unwrap();
        assert_eq!(store.read(|o| o.sub_frames), Options::default().sub_frames);
        assert!(dir.join("settings.db").exists());
        drop(store);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn updates_survive_reopen() {
        let dir = temp_dir("reopen");
        {
            let store = SettingsStore::open(&dir).unwrap();
            store.update(|o| {
                o.sub_frames = 6;
                o.split_screen = SplitScreen::Vertical;
                o.shader_parameters.insert("Gamma".to_string(), "2.4".to_string());
                o.cross_adapter = true;
            });
        }

        let store = SettingsStore::open(&dir).unwrap();
        let options = store.options();
        assert_eq!(options.sub_frames, 6);
        assert_eq!(options.split_screen, SplitScreen::Vertical);
        assert_eq!(options.shader_parameters.get("Gamma").map(String::as_str), Some("2.4"));
        // session-only fields never reach disk
        assert!(!options.cross_adapter);
        drop(store);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn forgetting_settings_keeps_only_the_flag() {
        let dir = temp_dir("forget");
        {
            let store = SettingsStore::open(&dir).unwrap();
            store.update(|o| {
                o.sub_frames = 7;
                o.remember_settings = false;
            });
            // the cache keeps the live value
            assert_eq!(store.read(|o| o.sub_frames), 7);
        }

        let store = SettingsStore::open(&dir).unwrap();
        assert!(!store.read(|o| o.remember_settings));
        assert_eq!(store.read(|o| o.sub_frames), Options::default().sub_frames);
        drop(store);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn updates_are_validated() {
        let dir = temp_dir("validate");
        let store = SettingsStore::open(&dir).unwrap();
        store.update(|o| o.sub_frames = 0);
        assert_eq!(store.read(|o| o.sub_frames), 1);
        drop(store);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
