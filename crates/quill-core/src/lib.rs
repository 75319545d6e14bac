pub mod action;
pub mod clipboard;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod history;
pub mod keyboard;
pub mod notify;
pub mod platform;
pub mod rewrite;
pub mod selection;
pub mod settings;
pub mod shortcut;
pub mod stats;
pub mod storage;
mod tool;

// Re-export common items for convenience
pub use action::RewriteAction;
pub use config::{ensure_config_dir, get_config_dir, is_daemon_running, ConfigPaths};
pub use dispatcher::{DispatchState, Dispatcher, InFlightGuard, Outcome};
pub use error::{FailureKind, QuillError, Result};
pub use history::{HistoryEntry, HistoryStore};
pub use platform::Platform;
pub use rewrite::{Backend, ChatClient, RewriteClient, RewriteRequest};
pub use selection::{Selection, SelectionBackend};
pub use settings::{Settings, SettingsStore};
pub use stats::{StatsStore, UsageStats};
pub use tool::tool_available;
