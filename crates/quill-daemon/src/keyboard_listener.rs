use quill_core::shortcut::HotkeyMatcher;
use quill_core::{Dispatcher, Outcome, RewriteAction};
use rdev::{self, EventType};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// What the listener reads on every key event. Replaced wholesale when
/// settings change.
pub struct ListenerState {
    dispatcher: Mutex<Arc<Dispatcher>>,
    matcher: Mutex<HotkeyMatcher>,
    /// A matched shortcut waiting for its modifiers to be let go
    pending: Mutex<Option<RewriteAction>>,
}

impl ListenerState {
    pub fn new(dispatcher: Dispatcher, matcher: HotkeyMatcher) -> Self {
        Self {
            dispatcher: Mutex::new(Arc::new(dispatcher)),
            matcher: Mutex::new(matcher),
            pending: Mutex::new(None),
        }
    }

    pub fn replace(&self, dispatcher: Dispatcher, matcher: HotkeyMatcher) {
        *lock(&self.matcher) = matcher;
        *lock(&self.pending) = None;
        *lock(&self.dispatcher) = Arc::new(dispatcher);
    }

    fn dispatcher(&self) -> Arc<Dispatcher> {
        Arc::clone(&lock(&self.dispatcher))
    }

    /// Feed one event to the matcher. A completed shortcut is held back
    /// until no modifier is down, so the simulated copy and paste are not
    /// combined with the keys the user is still holding.
    pub fn handle_event(&self, event: &EventType) -> Option<RewriteAction> {
        let mut matcher = lock(&self.matcher);
        let mut pending = lock(&self.pending);
        if let Some(action) = matcher.handle(event) {
            debug!(%action, "shortcut matched, waiting for modifiers");
            *pending = Some(action);
        }
        if matcher.held_modifiers().is_empty() {
            pending.take()
        } else {
            None
        }
    }
}

/// Run `action` on its own thread so the event hook never blocks
fn spawn_invocation(state: &ListenerState, action: RewriteAction) {
    let dispatcher = state.dispatcher();
    thread::spawn(move || match dispatcher.invoke(action) {
        Outcome::Replaced { original, modified } => debug!(
            %action,
            original_chars = original.chars().count(),
            modified_chars = modified.chars().count(),
            "selection replaced"
        ),
        Outcome::Failed(kind) => debug!(%action, ?kind, "invocation failed"),
        other => debug!(%action, outcome = outcome_name(&other), "invocation ended"),
    });
}

fn outcome_name(outcome: &Outcome) -> &'static str {
    match outcome {
        Outcome::Replaced { .. } => "replaced",
        Outcome::NothingSelected => "nothing_selected",
        Outcome::Disabled => "disabled",
        Outcome::Busy => "busy",
        Outcome::Failed(_) => "failed",
    }
}

/// Starts listening for global key events and dispatches bound shortcuts
pub fn start_keyboard_listener(
    state: Arc<ListenerState>,
    running: Arc<AtomicBool>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let callback_state = Arc::clone(&state);
        let callback_running = Arc::clone(&running);
        let callback = move |event: rdev::Event| {
            if !callback_running.load(Ordering::SeqCst) {
                return;
            }
            if let Some(action) = callback_state.handle_event(&event.event_type) {
                info!(%action, "shortcut pressed");
                spawn_invocation(&callback_state, action);
            }
        };

        // Start a retry loop for the keyboard listener
        let mut retry_count = 0;
        let max_retries = 5;

        while running.load(Ordering::SeqCst) && retry_count < max_retries {
            match rdev::listen(callback.clone()) {
                Ok(()) => break,
                Err(e) => {
                    retry_count += 1;
                    warn!(
                        "keyboard listener failed ({:?}), retrying ({}/{})",
                        e, retry_count, max_retries
                    );
                    thread::sleep(Duration::from_secs(1));
                }
            }
        }

        if retry_count >= max_retries {
            error!(
                "failed to start keyboard listener after {} attempts",
                max_retries
            );
            running.store(false, Ordering::SeqCst);
        }
    })
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_core::notify::LogNotifier;
    use quill_core::rewrite::{RewriteClient, RewriteRequest};
    use quill_core::selection::{Selection, SelectionBackend};
    use quill_core::{HistoryStore, Settings, StatsStore};
    use rdev::Key;

    struct NoSelection;

    impl SelectionBackend for NoSelection {
        fn capture_selection(&mut self) -> quill_core::Result<Selection> {
            Ok(Selection::Empty)
        }

        fn replace_selection(&mut self, _text: &str) -> quill_core::Result<()> {
            Ok(())
        }
    }

    struct Unused;

    impl RewriteClient for Unused {
        fn rewrite(&self, request: &RewriteRequest) -> quill_core::Result<String> {
            Ok(request.text.clone())
        }
    }

    fn dispatcher(settings: Settings) -> Dispatcher {
        Dispatcher::new(
            settings,
            Box::new(NoSelection),
            Box::new(Unused),
            Arc::new(LogNotifier),
            Arc::new(HistoryStore::in_memory()),
            Arc::new(StatsStore::in_memory()),
        )
    }

    fn press_chord(state: &ListenerState, keys: &[Key]) -> Option<RewriteAction> {
        let mut fired = None;
        for key in keys {
            if let Some(action) = state.handle_event(&EventType::KeyPress(*key)) {
                fired = Some(action);
            }
        }
        for key in keys.iter().rev() {
            if let Some(action) = state.handle_event(&EventType::KeyRelease(*key)) {
                fired = Some(action);
            }
        }
        fired
    }

    #[test]
    fn action_waits_for_modifiers_to_be_released() {
        let mut settings = Settings::default();
        settings.shortcuts.grammar = "Ctrl+Shift+G".to_string();
        let matcher = HotkeyMatcher::from_settings(&settings).unwrap();
        let state = ListenerState::new(dispatcher(settings), matcher);

        for key in [Key::ControlLeft, Key::ShiftLeft, Key::KeyG] {
            assert_eq!(state.handle_event(&EventType::KeyPress(key)), None);
        }
        assert_eq!(state.handle_event(&EventType::KeyRelease(Key::KeyG)), None);
        assert_eq!(state.handle_event(&EventType::KeyRelease(Key::ShiftLeft)), None);
        assert_eq!(
            state.handle_event(&EventType::KeyRelease(Key::ControlLeft)),
            Some(RewriteAction::Grammar)
        );
        // Released once only
        assert_eq!(state.handle_event(&EventType::KeyPress(Key::KeyA)), None);
    }

    #[test]
    fn replaced_bindings_take_effect() {
        let mut settings = Settings::default();
        settings.shortcuts.grammar = "Ctrl+Alt+G".to_string();
        let matcher = HotkeyMatcher::from_settings(&settings).unwrap();
        let state = ListenerState::new(dispatcher(settings.clone()), matcher);

        let chord = [Key::ControlLeft, Key::Alt, Key::KeyG];
        assert_eq!(press_chord(&state, &chord), Some(RewriteAction::Grammar));

        settings.features.grammar = false;
        let matcher = HotkeyMatcher::from_settings(&settings).unwrap();
        state.replace(dispatcher(settings), matcher);
        assert_eq!(press_chord(&state, &chord), None);
    }
}
