//! Background side of quill: the hotkey worker process and the commands
//! that start, stop and inspect it.

mod daemon_manager;
mod keyboard_listener;
pub mod logging;
mod permissions;
mod process;

pub use daemon_manager::{
    daemon_status, daemon_worker_entry, run_daemon_worker, start_daemon, stop_daemon,
};
pub use logging::{init_file_logging, LOG_ENV};
pub use permissions::missing_requirements;
pub use process::verify_process_running;
