//! Selection capture and replacement over the system clipboard.
//!
//! No OS exposes "read the current selection of another process", so the
//! clipboard is used as a side channel: copy the selection into it, read it
//! back, and later paste replacement text through it. Every operation puts
//! the user's own clipboard text back before it returns, on success and on
//! failure.
//!
//! Focus can move between a capture and the following replace; nothing here
//! can detect that, so the replacement may land in whichever window has focus
//! by then. Other applications may also touch the clipboard during the settle
//! waits. Neither race is solvable in-process.

use crate::clipboard::ClipboardAccess;
use crate::error::{QuillError, Result};
use crate::keyboard::KeystrokeSender;
use crate::settings::SettleTimings;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, warn};
use uuid::Uuid;

const MARKER_PREFIX: &str = "quill-capture-marker:";

/// Result of a capture attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Text(String),
    /// Nothing was selected, or the application ignored the copy keystroke
    Empty,
}

impl Selection {
    pub fn text(&self) -> Option<&str> {
        match self {
            Selection::Text(text) => Some(text),
            Selection::Empty => None,
        }
    }
}

/// Reads and overwrites the selection in the focused application.
pub trait SelectionBackend: Send {
    fn capture_selection(&mut self) -> Result<Selection>;
    fn replace_selection(&mut self, text: &str) -> Result<()>;
}

/// A sentinel that cannot collide with anything the user copied
pub fn new_marker() -> String {
    format!("{}{}", MARKER_PREFIX, Uuid::new_v4())
}

/// The capture/replace contract implemented once over any clipboard and
/// keystroke primitives.
pub struct ClipboardProtocol<C, K> {
    clipboard: C,
    keys: K,
    timings: SettleTimings,
}

impl<C, K> ClipboardProtocol<C, K>
where
    C: ClipboardAccess,
    K: KeystrokeSender,
{
    pub fn new(clipboard: C, keys: K, timings: SettleTimings) -> Self {
        Self {
            clipboard,
            keys,
            timings,
        }
    }

    fn capture_with_marker(&mut self, marker: &str) -> Result<Selection> {
        self.clipboard.write_text(marker)?;
        self.keys.send_copy()?;
        pause(self.timings.copy_settle());

        let copied = self.clipboard.read_text()?;
        if copied.is_empty() || copied == marker {
            debug!("copy left the marker in place, nothing selected");
            return Ok(Selection::Empty);
        }
        Ok(Selection::Text(copied))
    }

    fn paste(&mut self, text: &str) -> Result<()> {
        self.clipboard.write_text(text)?;
        pause(self.timings.paste_prepare());
        self.keys.send_paste()?;
        pause(self.timings.paste_settle());
        Ok(())
    }

    /// Put `original` back. A failed restore only becomes the reported error
    /// when the operation itself succeeded.
    fn finish<T>(&mut self, outcome: Result<T>, original: &str) -> Result<T> {
        let restored = self.clipboard.write_text(original);
        match (outcome, restored) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => {
                error!("failed to restore the clipboard: {}", e);
                Err(e)
            }
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(restore_err)) => {
                error!("failed to restore the clipboard after an error: {}", restore_err);
                Err(e)
            }
        }
    }
}

impl<C, K> SelectionBackend for ClipboardProtocol<C, K>
where
    C: ClipboardAccess,
    K: KeystrokeSender,
{
    fn capture_selection(&mut self) -> Result<Selection> {
        let original = self.clipboard.read_text()?;
        let marker = new_marker();

        let outcome = self.capture_with_marker(&marker);
        if let Ok(Selection::Text(_)) = &outcome {
            // Leave the copied value in place briefly in case the caller
            // pastes straight away
            pause(self.timings.restore_delay());
        }
        if let Err(e) = &outcome {
            warn!("capture failed: {}", e);
        }

        let selection = self.finish(outcome, &original)?;
        if let Selection::Text(text) = &selection {
            debug!(chars = text.chars().count(), "captured selection");
        }
        Ok(selection)
    }

    fn replace_selection(&mut self, text: &str) -> Result<()> {
        let original = self.clipboard.read_text()?;

        let outcome = self.paste(text);
        if let Err(e) = &outcome {
            warn!("replace failed: {}", e);
        }
        self.finish(outcome, &original)?;

        debug!(chars = text.chars().count(), "replaced selection");
        Ok(())
    }
}

fn pause(duration: Duration) {
    if !duration.is_zero() {
        thread::sleep(duration);
    }
}

/// Fail fast when the selection is only whitespace
pub fn require_text(selection: Selection) -> Result<String> {
    match selection {
        Selection::Text(text) if !text.trim().is_empty() => Ok(text),
        _ => Err(QuillError::EmptyInput),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory stand-ins for the OS clipboard and keyboard.

    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Default)]
    pub struct Desktop {
        pub clipboard: String,
        /// What the focused application would copy; `None` ignores Ctrl+C
        pub selection: Option<String>,
        /// Text that ended up in the focused application through pastes
        pub pasted: Vec<String>,
        pub fail_copy: bool,
        pub fail_paste: bool,
        pub fail_clipboard_writes: bool,
        /// Refuse only the n-th clipboard write, counting from 1
        pub fail_write_number: Option<usize>,
        pub clipboard_writes: usize,
    }

    pub type SharedDesktop = Arc<Mutex<Desktop>>;

    pub struct FakeClipboard(pub SharedDesktop);
    pub struct FakeKeys(pub SharedDesktop);

    impl ClipboardAccess for FakeClipboard {
        fn read_text(&mut self) -> Result<String> {
            Ok(self.0.lock().unwrap().clipboard.clone())
        }

        fn write_text(&mut self, text: &str) -> Result<()> {
            let mut desktop = self.0.lock().unwrap();
            if desktop.fail_clipboard_writes
                || desktop.fail_write_number == Some(desktop.clipboard_writes + 1)
            {
                return Err(QuillError::Automation("clipboard locked".to_string()));
            }
            desktop.clipboard_writes += 1;
            desktop.clipboard = text.to_string();
            Ok(())
        }
    }

    impl KeystrokeSender for FakeKeys {
        fn send_copy(&mut self) -> Result<()> {
            let mut desktop = self.0.lock().unwrap();
            if desktop.fail_copy {
                return Err(QuillError::PermissionDenied("no accessibility".to_string()));
            }
            if let Some(selection) = desktop.selection.clone() {
                desktop.clipboard = selection;
            }
            Ok(())
        }

        fn send_paste(&mut self) -> Result<()> {
            let mut desktop = self.0.lock().unwrap();
            if desktop.fail_paste {
                return Err(QuillError::PermissionDenied("no accessibility".to_string()));
            }
            let pasted = desktop.clipboard.clone();
            desktop.selection = Some(pasted.clone());
            desktop.pasted.push(pasted);
            Ok(())
        }
    }

    pub fn desktop(clipboard: &str, selection: Option<&str>) -> SharedDesktop {
        Arc::new(Mutex::new(Desktop {
            clipboard: clipboard.to_string(),
            selection: selection.map(|s| s.to_string()),
            ..Desktop::default()
        }))
    }

    pub fn protocol(desktop: &SharedDesktop) -> ClipboardProtocol<FakeClipboard, FakeKeys> {
        ClipboardProtocol::new(
            FakeClipboard(Arc::clone(desktop)),
            FakeKeys(Arc::clone(desktop)),
            SettleTimings::immediate(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[test]
    fn capture_returns_selection_and_restores_clipboard() {
        let desktop = desktop("user clipboard", Some("selected words"));
        let mut protocol = protocol(&desktop);

        let selection = protocol.capture_selection().unwrap();
        assert_eq!(selection, Selection::Text("selected words".to_string()));
        assert_eq!(desktop.lock().unwrap().clipboard, "user clipboard");
    }

    #[test]
    fn capture_without_selection_is_empty_not_marker() {
        let desktop = desktop("keep me", None);
        let mut protocol = protocol(&desktop);

        let selection = protocol.capture_selection().unwrap();
        assert_eq!(selection, Selection::Empty);
        let state = desktop.lock().unwrap();
        assert_eq!(state.clipboard, "keep me");
        assert!(state.pasted.is_empty());
    }

    #[test]
    fn capture_treats_empty_copy_as_nothing_selected() {
        let desktop = desktop("", Some(""));
        let mut protocol = protocol(&desktop);
        assert_eq!(protocol.capture_selection().unwrap(), Selection::Empty);
        assert_eq!(desktop.lock().unwrap().clipboard, "");
    }

    #[test]
    fn capture_failure_still_restores() {
        let desktop = desktop("precious", Some("text"));
        desktop.lock().unwrap().fail_copy = true;
        let mut protocol = protocol(&desktop);

        let err = protocol.capture_selection().unwrap_err();
        assert!(matches!(err, QuillError::PermissionDenied(_)));
        assert_eq!(desktop.lock().unwrap().clipboard, "precious");
    }

    #[test]
    fn replace_pastes_and_restores() {
        let desktop = desktop("original clip", Some("old"));
        let mut protocol = protocol(&desktop);

        protocol.replace_selection("new text").unwrap();
        let state = desktop.lock().unwrap();
        assert_eq!(state.pasted, vec!["new text".to_string()]);
        assert_eq!(state.clipboard, "original clip");
    }

    #[test]
    fn replace_failure_restores_and_reports_permission() {
        let desktop = desktop("original clip", Some("old"));
        desktop.lock().unwrap().fail_paste = true;
        let mut protocol = protocol(&desktop);

        let err = protocol.replace_selection("new text").unwrap_err();
        assert!(matches!(err, QuillError::PermissionDenied(_)));
        let state = desktop.lock().unwrap();
        assert_eq!(state.clipboard, "original clip");
        assert!(state.pasted.is_empty());
    }

    #[test]
    fn clipboard_matches_after_any_sequence() {
        let desktop = desktop("start", Some("a"));
        let mut protocol = protocol(&desktop);

        for round in 0..6 {
            {
                let mut state = desktop.lock().unwrap();
                state.fail_copy = round % 3 == 1;
                state.fail_paste = round % 2 == 1;
                state.selection = if round % 4 == 2 { None } else { Some("a".to_string()) };
            }
            let before = desktop.lock().unwrap().clipboard.clone();
            let _ = protocol.capture_selection();
            assert_eq!(desktop.lock().unwrap().clipboard, before);
            let _ = protocol.replace_selection("b");
            assert_eq!(desktop.lock().unwrap().clipboard, before);
        }
    }

    #[test]
    fn locked_clipboard_is_an_automation_failure() {
        let desktop = desktop("mine", Some("text"));
        desktop.lock().unwrap().fail_clipboard_writes = true;
        let mut protocol = protocol(&desktop);

        let err = protocol.capture_selection().unwrap_err();
        assert!(matches!(err, QuillError::Automation(_)));
        let state = desktop.lock().unwrap();
        assert_eq!(state.clipboard, "mine");
        assert_eq!(state.clipboard_writes, 0);
    }

    #[test]
    fn failed_restore_after_capture_is_an_automation_failure() {
        // Write 1 puts the marker in place, write 2 restores
        let desktop = desktop("mine", Some("text"));
        desktop.lock().unwrap().fail_write_number = Some(2);
        let mut protocol = protocol(&desktop);

        let err = protocol.capture_selection().unwrap_err();
        assert!(matches!(err, QuillError::Automation(_)));
        let state = desktop.lock().unwrap();
        assert_eq!(state.clipboard, "text");
        assert_eq!(state.clipboard_writes, 1);
    }

    #[test]
    fn failed_restore_after_replace_is_an_automation_failure() {
        // Write 1 stages the replacement, write 2 restores
        let desktop = desktop("mine", Some("old"));
        desktop.lock().unwrap().fail_write_number = Some(2);
        let mut protocol = protocol(&desktop);

        let err = protocol.replace_selection("new").unwrap_err();
        assert!(matches!(err, QuillError::Automation(_)));
        let state = desktop.lock().unwrap();
        assert_eq!(state.pasted, vec!["new".to_string()]);
        assert_eq!(state.clipboard, "new");
    }

    #[test]
    fn markers_are_unique() {
        let a = new_marker();
        let b = new_marker();
        assert_ne!(a, b);
        assert!(a.starts_with(MARKER_PREFIX));
    }

    #[test]
    fn whitespace_selection_is_not_text() {
        assert!(require_text(Selection::Text("  \n".to_string())).is_err());
        assert!(require_text(Selection::Empty).is_err());
        assert_eq!(require_text(Selection::Text("hi".to_string())).unwrap(), "hi");
    }
}
