use crate::error::{QuillError, Result};
use crate::tool::{check_status, run_tool, run_tool_with_input};
use arboard::Clipboard;

/// Text access to the system clipboard. A clipboard holding no text reads
/// as an empty string.
pub trait ClipboardAccess: Send {
    fn read_text(&mut self) -> Result<String>;
    fn write_text(&mut self, text: &str) -> Result<()>;
}

/// Clipboard through arboard. A handle is opened per call so the backend
/// stays `Send` on every platform.
#[derive(Debug, Default)]
pub struct ArboardClipboard;

impl ArboardClipboard {
    fn open() -> Result<Clipboard> {
        Clipboard::new().map_err(clipboard_error)
    }
}

impl ClipboardAccess for ArboardClipboard {
    fn read_text(&mut self) -> Result<String> {
        match Self::open()?.get_text() {
            Ok(text) => Ok(text),
            Err(arboard::Error::ContentNotAvailable) => Ok(String::new()),
            Err(e) => Err(clipboard_error(e)),
        }
    }

    fn write_text(&mut self, text: &str) -> Result<()> {
        Self::open()?.set_text(text).map_err(clipboard_error)
    }
}

fn clipboard_error(err: arboard::Error) -> QuillError {
    QuillError::Automation(format!("Clipboard error: {}", err))
}

/// X11 clipboard selection through `xclip`
#[derive(Debug, Default)]
pub struct XclipClipboard;

impl ClipboardAccess for XclipClipboard {
    fn read_text(&mut self) -> Result<String> {
        let output = run_tool("xclip", &["-selection", "clipboard", "-o"])?;
        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).to_string());
        }

        // xclip exits non-zero when the selection has no text target
        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("not available") || stderr.trim().is_empty() {
            return Ok(String::new());
        }
        check_status("xclip", &output)?;
        Ok(String::new())
    }

    fn write_text(&mut self, text: &str) -> Result<()> {
        run_tool_with_input("xclip", &["-selection", "clipboard", "-i"], text)
    }
}

/// Get the current clipboard content as text
pub fn get_clipboard_text() -> Result<String> {
    ArboardClipboard.read_text()
}

/// Set the clipboard content as text
pub fn set_clipboard_text(text: &str) -> Result<()> {
    ArboardClipboard.write_text(text)
}
