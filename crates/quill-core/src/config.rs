use crate::error::Result;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_DIR_ENV: &str = "QUILL_CONFIG_DIR";
pub const PID_FILENAME: &str = "quill-daemon.pid";
pub const SETTINGS_FILENAME: &str = "settings.json";
pub const HISTORY_FILENAME: &str = "history.json";
pub const STATS_FILENAME: &str = "stats.json";
pub const API_PORT_FILENAME: &str = "api_port.txt";
pub const API_PID_FILENAME: &str = "api_server.pid";
pub const LOG_DIRNAME: &str = "logs";

/// Get the quill configuration directory
pub fn get_config_dir() -> PathBuf {
    if let Ok(dir) = env::var(CONFIG_DIR_ENV) {
        let trimmed = dir.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }
    env::var("HOME")
        .map(|home| PathBuf::from(home).join(".quill"))
        .unwrap_or_else(|_| PathBuf::from(".quill"))
}

/// Ensure the configuration directory exists
pub fn ensure_config_dir() -> Result<PathBuf> {
    let config_dir = get_config_dir();
    if !config_dir.exists() {
        fs::create_dir_all(&config_dir)?;
    }
    Ok(config_dir)
}

/// Files that live under one configuration directory.
#[derive(Debug, Clone)]
pub struct ConfigPaths {
    root: PathBuf,
}

impl ConfigPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Paths rooted at the user's configuration directory.
    pub fn from_env() -> Self {
        Self::new(get_config_dir())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn settings_file(&self) -> PathBuf {
        self.root.join(SETTINGS_FILENAME)
    }

    pub fn history_file(&self) -> PathBuf {
        self.root.join(HISTORY_FILENAME)
    }

    pub fn stats_file(&self) -> PathBuf {
        self.root.join(STATS_FILENAME)
    }

    pub fn pid_file(&self) -> PathBuf {
        self.root.join(PID_FILENAME)
    }

    pub fn api_port_file(&self) -> PathBuf {
        self.root.join(API_PORT_FILENAME)
    }

    pub fn api_pid_file(&self) -> PathBuf {
        self.root.join(API_PID_FILENAME)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.root.join(LOG_DIRNAME)
    }
}

/// Get the path to the PID file
pub fn get_pid_file_path() -> PathBuf {
    ConfigPaths::from_env().pid_file()
}

/// Check if daemon is running
pub fn is_daemon_running() -> Result<Option<u32>> {
    ConfigPaths::from_env().daemon_pid()
}

impl ConfigPaths {
    /// PID recorded by a running daemon. An unreadable or invalid PID file
    /// is removed and treated as not running.
    pub fn daemon_pid(&self) -> Result<Option<u32>> {
        let pid_file = self.pid_file();

        if pid_file.exists() {
            match fs::read_to_string(&pid_file) {
                Ok(contents) => {
                    match contents.trim().parse::<u32>() {
                        Ok(pid) => Ok(Some(pid)),
                        Err(_) => {
                            // Invalid PID, treat as not running and clean up
                            let _ = fs::remove_file(&pid_file);
                            Ok(None)
                        }
                    }
                }
                Err(_) => {
                    let _ = fs::remove_file(&pid_file);
                    Ok(None)
                }
            }
        } else {
            Ok(None)
        }
    }
}
