use crate::keyboard_listener::{start_keyboard_listener, ListenerState};
use crate::logging::init_file_logging;
use crate::permissions::{check_and_request_permissions, missing_requirements};
use crate::process::verify_process_running;
use quill_core::shortcut::HotkeyMatcher;
use quill_core::{
    ensure_config_dir, ConfigPaths, Dispatcher, InFlightGuard, QuillError, Result, SettingsStore,
};
use quill_server::server::http_server::{check_api_server_health, stop_api_server};
use quill_server::server::utils::{find_available_port, port_is_available, read_api_port};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{self, Command};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime};
use tracing::{error, info, warn};

/// How often the worker looks at settings.json
const RELOAD_INTERVAL: Duration = Duration::from_secs(1);

/// Start the daemon process
pub fn start_daemon(api_port: u16) -> Result<()> {
    let paths = ConfigPaths::from_env();

    // Check if daemon is already running
    if let Some(pid) = paths.daemon_pid()? {
        if verify_process_running(pid) {
            println!("Daemon is already running with PID {}.", pid);
        } else {
            println!("Found stale PID file. Cleaning up and starting new daemon...");
            let _ = fs::remove_file(paths.pid_file());
        }
    }

    if paths.daemon_pid()?.is_none() {
        println!("Starting quill daemon...");
        ensure_config_dir()?;

        // Surface bad shortcuts here rather than in a background log
        let settings = SettingsStore::new(paths.settings_file()).load()?;
        HotkeyMatcher::from_settings(&settings)?;

        check_and_request_permissions(&settings)?;

        let log_file = stdout_log(&paths, "daemon")?;
        spawn_detached(&["daemon-worker"], &log_file)?;

        // Wait for the daemon to start and create its PID file
        for _ in 0..20 {
            thread::sleep(Duration::from_millis(100));
            if paths.daemon_pid()?.is_some() {
                break;
            }
        }

        match paths.daemon_pid()? {
            Some(pid) if verify_process_running(pid) => {
                info!(pid, "daemon started");
                println!("Daemon started successfully with PID {}.", pid);
            }
            _ => {
                return Err(QuillError::Other(format!(
                    "Daemon failed to start. Check logs in {}",
                    paths.log_dir().display()
                )));
            }
        }
    }

    start_api_process(&paths, api_port)
}

/// Run `quill serve` in the background on the first free port from `api_port`
fn start_api_process(paths: &ConfigPaths, api_port: u16) -> Result<()> {
    if let Ok(port) = check_api_server_health() {
        println!("API server is already running on port {}.", port);
        return Ok(());
    }

    println!("Starting API server...");
    let port = find_available_port(api_port, 10).ok_or_else(|| {
        QuillError::Other(format!(
            "No free port between {} and {}",
            api_port,
            api_port.saturating_add(9)
        ))
    })?;
    if port != api_port {
        println!("Port {} is busy, using {}...", api_port, port);
    }

    let log_file = stdout_log(paths, "api-server")?;
    spawn_detached(&["serve", "--port", &port.to_string()], &log_file)?;

    // Verify the server started by checking that the port is taken
    for _ in 0..20 {
        thread::sleep(Duration::from_millis(100));
        if !port_is_available(port) {
            info!(port, "API server started");
            println!("API server started on port {}.", port);
            println!("You can access the server at: http://localhost:{}", port);
            return Ok(());
        }
    }

    Err(QuillError::Other(format!(
        "API server failed to start. Check log at {}",
        log_file.display()
    )))
}

/// Where a detached child's stdout and stderr go
fn stdout_log(paths: &ConfigPaths, name: &str) -> Result<PathBuf> {
    let log_dir = paths.log_dir();
    fs::create_dir_all(&log_dir)?;
    Ok(log_dir.join(format!("{}-stdout.log", name)))
}

/// Re-run the current executable with `args`, detached from this terminal
fn spawn_detached(args: &[&str], log_file: &Path) -> Result<()> {
    let current_exe = std::env::current_exe()?;

    #[cfg(unix)]
    {
        let cmd = format!(
            "nohup \"{}\" {} > \"{}\" 2>&1 &",
            current_exe.to_string_lossy(),
            args.join(" "),
            log_file.display()
        );
        Command::new("sh").arg("-c").arg(&cmd).status()?;
        Ok(())
    }

    #[cfg(windows)]
    {
        let cmd = format!(
            "START /B \"quill\" \"{}\" {} > \"{}\" 2>&1",
            current_exe.to_string_lossy(),
            args.join(" "),
            log_file.display()
        );
        Command::new("cmd").arg("/C").arg(&cmd).status()?;
        Ok(())
    }

    #[cfg(not(any(unix, windows)))]
    {
        let _ = (current_exe, args, log_file);
        Err(QuillError::Other(
            "Running in the background is not supported on this platform".to_string(),
        ))
    }
}

/// Stop the daemon if it's running
pub fn stop_daemon() -> Result<()> {
    let paths = ConfigPaths::from_env();
    let pid_file = paths.pid_file();

    if !pid_file.exists() {
        // The API server may still be up on its own
        let _ = stop_api_server();
        return Err(QuillError::DaemonNotRunning);
    }

    let pid = match fs::read_to_string(&pid_file) {
        Ok(content) => match content.trim().parse::<u32>() {
            Ok(pid) => pid,
            Err(_) => {
                let _ = fs::remove_file(&pid_file);
                return Err(QuillError::InvalidPid);
            }
        },
        Err(e) => {
            let _ = fs::remove_file(&pid_file);
            return Err(QuillError::Other(format!("Failed to read PID file: {}", e)));
        }
    };

    println!("Attempting to stop daemon with PID {}...", pid);
    let _ = stop_api_server();

    if !verify_process_running(pid) {
        println!("Process with PID {} is not running.", pid);
        let _ = fs::remove_file(&pid_file);
        return Ok(());
    }

    if terminate(pid) {
        info!(pid, "daemon stopped");
        println!("Daemon stopped successfully.");
    } else {
        warn!(pid, "failed to stop daemon process");
        println!("WARNING: Failed to stop daemon process. PID file will be removed anyway.");
    }
    let _ = fs::remove_file(&pid_file);

    Ok(())
}

/// Ask politely, then force. Returns whether the process is gone.
fn terminate(pid: u32) -> bool {
    let pid_arg = pid.to_string();

    #[cfg(unix)]
    let (graceful, forced): (Vec<&str>, Vec<&str>) = (
        vec!["kill", pid_arg.as_str()],
        vec!["kill", "-9", pid_arg.as_str()],
    );
    #[cfg(windows)]
    let (graceful, forced): (Vec<&str>, Vec<&str>) = (
        vec!["taskkill", "/PID", pid_arg.as_str()],
        vec!["taskkill", "/F", "/T", "/PID", pid_arg.as_str()],
    );
    #[cfg(not(any(unix, windows)))]
    let (graceful, forced): (Vec<&str>, Vec<&str>) = (vec![], vec![]);

    for (attempt, command) in [graceful, forced].iter().enumerate() {
        let Some((program, args)) = command.split_first() else {
            return false;
        };
        if attempt > 0 {
            println!("Daemon didn't terminate gracefully, using force kill...");
        }
        let _ = Command::new(program).args(args).status();

        for _ in 0..5 {
            thread::sleep(Duration::from_millis(100));
            if !verify_process_running(pid) {
                return true;
            }
        }
    }
    false
}

/// Check daemon status
pub fn daemon_status() -> Result<()> {
    let paths = ConfigPaths::from_env();
    match paths.daemon_pid()? {
        Some(pid) if verify_process_running(pid) => {
            println!("quill daemon is running with PID {}", pid);
            if let Ok(port) = read_api_port(&paths) {
                println!("API server is running on port {}", port);
            }
        }
        Some(pid) => {
            println!("PID file exists but process {} is not running", pid);
            println!("This could indicate the daemon crashed or was stopped abruptly");
            println!("Recommend running 'quill stop' followed by 'quill start'");
        }
        None => println!("quill daemon is not running"),
    }
    Ok(())
}

/// This function runs as a separate daemon process
pub fn daemon_worker_entry() -> Result<()> {
    let paths = ConfigPaths::from_env();
    ensure_config_dir()?;
    let _log_guard = init_file_logging(&paths, "daemon")?;

    let pid_file = paths.pid_file();
    fs::write(&pid_file, process::id().to_string())?;
    info!(pid = process::id(), "daemon worker started");

    let result = run_daemon_worker(&paths);
    if let Err(e) = &result {
        error!("daemon worker stopped: {}", e);
    }

    // Clean up PID file on exit
    let _ = fs::remove_file(&pid_file);
    result
}

/// Listen for shortcuts until the listener gives up, rebuilding the
/// dispatcher whenever settings.json changes
pub fn run_daemon_worker(paths: &ConfigPaths) -> Result<()> {
    let store = SettingsStore::new(paths.settings_file());
    let guard = InFlightGuard::new();

    let (dispatcher, matcher) = build_dispatcher(&store, paths, &guard)?;
    for problem in missing_requirements(dispatcher.settings()) {
        warn!("{}", problem);
    }
    let state = Arc::new(ListenerState::new(dispatcher, matcher));
    let running = Arc::new(AtomicBool::new(true));
    let keyboard_thread = start_keyboard_listener(Arc::clone(&state), Arc::clone(&running));

    let mut watcher = SettingsWatcher::new(store.path());
    while running.load(Ordering::SeqCst) {
        thread::sleep(RELOAD_INTERVAL);

        if watcher.changed() {
            match build_dispatcher(&store, paths, &guard) {
                Ok((dispatcher, matcher)) => {
                    state.replace(dispatcher, matcher);
                    info!("settings reloaded");
                }
                Err(e) => warn!("keeping previous settings, reload failed: {}", e),
            }
        }
    }

    if keyboard_thread.join().is_err() {
        error!("keyboard listener thread panicked");
    }
    Err(QuillError::Other(
        "keyboard listener stopped; see the daemon log".to_string(),
    ))
}

fn build_dispatcher(
    store: &SettingsStore,
    paths: &ConfigPaths,
    guard: &InFlightGuard,
) -> Result<(Dispatcher, HotkeyMatcher)> {
    let settings = store.load()?;
    let matcher = HotkeyMatcher::from_settings(&settings)?;
    for (hotkey, action) in matcher.bindings() {
        info!(%hotkey, %action, "shortcut bound");
    }

    let dispatcher = Dispatcher::for_platform(settings, paths).with_guard(guard.clone());
    Ok((dispatcher, matcher))
}

/// Notices modification-time changes of one file, including its creation
/// and removal.
struct SettingsWatcher {
    path: PathBuf,
    last_modified: Option<SystemTime>,
}

impl SettingsWatcher {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            last_modified: modified_time(path),
        }
    }

    fn changed(&mut self) -> bool {
        let current = modified_time(&self.path);
        if current != self.last_modified {
            self.last_modified = current;
            true
        } else {
            false
        }
    }
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}
