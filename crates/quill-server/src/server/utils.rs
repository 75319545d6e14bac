//! Utilities for managing the API server.

use quill_core::{ConfigPaths, QuillError, Result};
use std::fs;
use std::net::TcpListener;

/// Try to get the API server port from stored configuration
pub fn get_api_server_port() -> Result<u16> {
    read_api_port(&ConfigPaths::from_env())
}

pub fn read_api_port(paths: &ConfigPaths) -> Result<u16> {
    let port_file_path = paths.api_port_file();

    if port_file_path.exists() {
        let contents = fs::read_to_string(port_file_path)?;
        contents
            .trim()
            .parse::<u16>()
            .map_err(|_| QuillError::Other("Invalid port stored in configuration".to_string()))
    } else {
        Err(QuillError::Other(
            "API server port information not found".to_string(),
        ))
    }
}

/// Save the API port so the CLI and the shell can find the server
pub fn save_api_port(paths: &ConfigPaths, port: u16) -> Result<()> {
    if !paths.root().exists() {
        fs::create_dir_all(paths.root())?;
    }
    fs::write(paths.api_port_file(), port.to_string())?;
    Ok(())
}

pub fn remove_api_port(paths: &ConfigPaths) -> Result<()> {
    let port_file_path = paths.api_port_file();
    if port_file_path.exists() {
        fs::remove_file(port_file_path)?;
    }
    Ok(())
}

/// Remember which process serves the API, so only that process is stopped
pub fn save_api_pid(paths: &ConfigPaths, pid: u32) -> Result<()> {
    fs::create_dir_all(paths.root())?;
    fs::write(paths.api_pid_file(), pid.to_string())?;
    Ok(())
}

pub fn read_api_pid(paths: &ConfigPaths) -> Option<u32> {
    fs::read_to_string(paths.api_pid_file())
        .ok()
        .and_then(|contents| contents.trim().parse().ok())
}

pub fn remove_api_pid(paths: &ConfigPaths) -> Result<()> {
    let pid_file = paths.api_pid_file();
    if pid_file.exists() {
        fs::remove_file(pid_file)?;
    }
    Ok(())
}

/// Forget the running server: returns the recorded port and PID and
/// removes both files. `None` when no server was recorded.
pub fn take_api_server_record(paths: &ConfigPaths) -> Option<(u16, Option<u32>)> {
    let port = read_api_port(paths).ok();
    let pid = read_api_pid(paths);
    let _ = remove_api_port(paths);
    let _ = remove_api_pid(paths);
    match (port, pid) {
        (None, None) => None,
        (port, pid) => Some((port.unwrap_or_default(), pid)),
    }
}

/// Check if a port is available by trying to bind to it
pub fn port_is_available(port: u16) -> bool {
    TcpListener::bind(("127.0.0.1", port)).is_ok()
}

/// First free port in `start..start + attempts`
pub fn find_available_port(start: u16, attempts: u16) -> Option<u16> {
    (0..attempts)
        .filter_map(|offset| start.checked_add(offset))
        .find(|port| port_is_available(*port))
}
