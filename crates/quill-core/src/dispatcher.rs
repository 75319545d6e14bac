//! Runs one rewrite action end to end: capture the selection, rewrite it,
//! paste the result back.
//!
//! Stages never overlap within an invocation. A second invocation that
//! arrives while one is in flight is rejected with [`Outcome::Busy`] before
//! it touches the clipboard.

use crate::action::RewriteAction;
use crate::config::ConfigPaths;
use crate::error::{FailureKind, QuillError};
use crate::history::{HistoryEntry, HistoryStore};
use crate::notify::{Notifier, SystemNotifier};
use crate::platform::Platform;
use crate::rewrite::{ChatClient, RewriteClient, RewriteRequest};
use crate::selection::{require_text, SelectionBackend};
use crate::settings::Settings;
use crate::stats::StatsStore;
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tracing::{error, info, warn};

pub const NOTHING_SELECTED: &str = "No text selected";
pub const DONE: &str = "Done!";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchState {
    Idle,
    CapturingSelection,
    RequestingRewrite,
    ReplacingSelection,
}

impl fmt::Display for DispatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DispatchState::Idle => "idle",
            DispatchState::CapturingSelection => "capturing selection",
            DispatchState::RequestingRewrite => "requesting rewrite",
            DispatchState::ReplacingSelection => "replacing selection",
        };
        f.write_str(name)
    }
}

/// How an invocation ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Replaced { original: String, modified: String },
    NothingSelected,
    /// The action is switched off in settings
    Disabled,
    /// Another invocation was still in flight
    Busy,
    Failed(FailureKind),
}

/// Single-slot guard shared by every dispatcher built from the same
/// settings lineage, so a reload cannot admit a second invocation.
#[derive(Debug, Clone)]
pub struct InFlightGuard {
    state: Arc<Mutex<DispatchState>>,
}

impl Default for InFlightGuard {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(DispatchState::Idle)),
        }
    }
}

impl InFlightGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> DispatchState {
        *lock(&self.state)
    }

    fn try_begin(&self) -> Option<InFlight<'_>> {
        let mut state = lock(&self.state);
        if *state != DispatchState::Idle {
            return None;
        }
        *state = DispatchState::CapturingSelection;
        Some(InFlight { guard: self })
    }
}

/// Holds the slot for one invocation and frees it when dropped
struct InFlight<'a> {
    guard: &'a InFlightGuard,
}

impl InFlight<'_> {
    fn enter(&self, state: DispatchState) {
        *lock(&self.guard.state) = state;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        *lock(&self.guard.state) = DispatchState::Idle;
    }
}

pub struct Dispatcher {
    settings: Settings,
    selection: Mutex<Box<dyn SelectionBackend>>,
    client: Box<dyn RewriteClient>,
    notifier: Arc<dyn Notifier>,
    history: Arc<HistoryStore>,
    stats: Arc<StatsStore>,
    guard: InFlightGuard,
}

impl Dispatcher {
    pub fn new(
        settings: Settings,
        selection: Box<dyn SelectionBackend>,
        client: Box<dyn RewriteClient>,
        notifier: Arc<dyn Notifier>,
        history: Arc<HistoryStore>,
        stats: Arc<StatsStore>,
    ) -> Self {
        Self {
            settings,
            selection: Mutex::new(selection),
            client,
            notifier,
            history,
            stats,
            guard: InFlightGuard::new(),
        }
    }

    /// Wire the OS backends for this platform and the stores under `paths`
    pub fn for_platform(settings: Settings, paths: &ConfigPaths) -> Self {
        let platform = Platform::current();
        let selection = platform.selection_backend(&settings);
        let client = ChatClient::from_settings(&settings);
        Self::new(
            settings,
            selection,
            Box::new(client),
            Arc::new(SystemNotifier::new(platform)),
            Arc::new(HistoryStore::open(paths.history_file())),
            Arc::new(StatsStore::open(paths.stats_file())),
        )
    }

    /// Share an existing in-flight slot
    pub fn with_guard(mut self, guard: InFlightGuard) -> Self {
        self.guard = guard;
        self
    }

    pub fn guard(&self) -> &InFlightGuard {
        &self.guard
    }

    pub fn state(&self) -> DispatchState {
        self.guard.state()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn invoke(&self, action: RewriteAction) -> Outcome {
        self.invoke_with_language(action, None)
    }

    pub fn invoke_with_language(
        &self,
        action: RewriteAction,
        target_language: Option<String>,
    ) -> Outcome {
        if !self.settings.features.is_enabled(action) {
            info!(%action, "action is disabled, ignoring");
            return Outcome::Disabled;
        }

        let Some(flight) = self.guard.try_begin() else {
            warn!(%action, state = %self.guard.state(), "rewrite already in flight, rejecting");
            return Outcome::Busy;
        };

        info!(%action, "invocation started");
        self.run(action, target_language, &flight)
    }

    fn run(
        &self,
        action: RewriteAction,
        target_language: Option<String>,
        flight: &InFlight<'_>,
    ) -> Outcome {
        let captured = match self.selection().capture_selection() {
            Ok(selection) => selection,
            Err(e) => return self.fail(action, e),
        };
        let original = match require_text(captured) {
            Ok(text) => text,
            Err(_) => {
                info!(%action, "nothing selected");
                self.notify(action, NOTHING_SELECTED);
                return Outcome::NothingSelected;
            }
        };

        flight.enter(DispatchState::RequestingRewrite);
        info!(%action, "{}", action.progress_message());
        let request =
            RewriteRequest::new(original.clone(), action).with_target_language(target_language);
        let started = Instant::now();
        let modified = match self.client.rewrite(&request) {
            Ok(text) => text,
            Err(e) => return self.fail(action, e),
        };
        let elapsed = started.elapsed();

        flight.enter(DispatchState::ReplacingSelection);
        if let Err(e) = self.selection().replace_selection(&modified) {
            return self.fail(action, e);
        }

        if let Err(e) = self
            .history
            .record(HistoryEntry::new(action, original.clone(), modified.clone()))
        {
            warn!("failed to record history: {}", e);
        }
        if let Err(e) = self.stats.record(action, &original, elapsed) {
            warn!("failed to record usage stats: {}", e);
        }

        info!(
            %action,
            elapsed_ms = elapsed.as_millis() as u64,
            chars = modified.chars().count(),
            "invocation finished"
        );
        self.notify(action, DONE);
        Outcome::Replaced { original, modified }
    }

    fn fail(&self, action: RewriteAction, err: QuillError) -> Outcome {
        error!(%action, kind = ?err.kind(), "invocation failed: {}", err);
        self.notify(action, &err.user_message());
        Outcome::Failed(err.kind())
    }

    fn notify(&self, action: RewriteAction, body: &str) {
        if self.settings.show_notifications {
            self.notifier.notify(action.title(), body);
        }
    }

    fn selection(&self) -> MutexGuard<'_, Box<dyn SelectionBackend>> {
        lock(&self.selection)
    }
}

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
