use crate::error::{QuillError, Result};
use crate::tool::{check_status, run_tool};
use enigo::{Direction, Enigo, Key, Keyboard, Settings};
use std::thread;
use std::time::Duration;

/// Sends the OS-native copy and paste chords to the focused application.
pub trait KeystrokeSender: Send {
    fn send_copy(&mut self) -> Result<()>;
    fn send_paste(&mut self) -> Result<()>;
}

/// Create a keyboard controller
pub fn create_keyboard_controller() -> Result<Enigo> {
    // For Enigo 0.3.0 which requires Settings
    let settings = Settings::default();
    match Enigo::new(&settings) {
        Ok(enigo) => Ok(enigo),
        Err(err) => Err(QuillError::PermissionDenied(format!(
            "Failed to create keyboard controller: {}",
            err
        ))),
    }
}

/// In-process input simulation through enigo
#[derive(Debug, Default)]
pub struct EnigoKeys;

impl EnigoKeys {
    fn chord(&self, letter: char) -> Result<()> {
        let mut keyboard = create_keyboard_controller()?;

        // The user is usually still holding the shortcut's Shift/Alt
        for held in [Key::Shift, Key::Alt] {
            keyboard
                .key(held, Direction::Release)
                .map_err(|e| enigo_error("release modifier", e))?;
        }
        thread::sleep(Duration::from_millis(10));

        let modifier = if cfg!(target_os = "macos") {
            Key::Meta
        } else {
            Key::Control
        };

        keyboard
            .key(modifier, Direction::Press)
            .map_err(|e| enigo_error("press modifier", e))?;
        let clicked = keyboard.key(Key::Unicode(letter), Direction::Click);
        // Always release the modifier, even when the click failed
        let released = keyboard.key(modifier, Direction::Release);

        clicked.map_err(|e| enigo_error("send key", e))?;
        released.map_err(|e| enigo_error("release modifier", e))?;
        Ok(())
    }
}

impl KeystrokeSender for EnigoKeys {
    fn send_copy(&mut self) -> Result<()> {
        self.chord('c')
    }

    fn send_paste(&mut self) -> Result<()> {
        self.chord('v')
    }
}

fn enigo_error(step: &str, err: enigo::InputError) -> QuillError {
    QuillError::Automation(format!("Keyboard controller failed to {}: {}", step, err))
}

/// macOS: System Events keystrokes through `osascript`
#[derive(Debug, Default)]
pub struct OsaScriptKeys;

impl OsaScriptKeys {
    fn keystroke(&self, letter: char) -> Result<()> {
        let script = format!(
            "tell application \"System Events\" to keystroke \"{}\" using command down",
            letter
        );
        let output = run_tool("osascript", &["-e", &script])?;
        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        if is_macos_permission_error(&stderr) {
            return Err(QuillError::PermissionDenied(format!(
                "System Events refused the keystroke; allow your terminal or quill under Privacy & Security > Accessibility ({})",
                stderr.trim()
            )));
        }
        check_status("osascript", &output)
    }
}

impl KeystrokeSender for OsaScriptKeys {
    fn send_copy(&mut self) -> Result<()> {
        self.keystroke('c')
    }

    fn send_paste(&mut self) -> Result<()> {
        self.keystroke('v')
    }
}

pub(crate) fn is_macos_permission_error(stderr: &str) -> bool {
    let lowered = stderr.to_lowercase();
    lowered.contains("not allowed to send keystrokes")
        || lowered.contains("not allowed assistive access")
        || lowered.contains("(1002)")
        || lowered.contains("(-1743)")
        || lowered.contains("(-25211)")
}

/// Windows: `SendKeys` through PowerShell
#[derive(Debug, Default)]
pub struct PowerShellKeys;

impl PowerShellKeys {
    fn send_keys(&self, keys: &str) -> Result<()> {
        let script = format!(
            "Add-Type -AssemblyName System.Windows.Forms; [System.Windows.Forms.SendKeys]::SendWait('{}')",
            keys
        );
        let output = run_tool(
            "powershell",
            &["-NoProfile", "-NonInteractive", "-Command", &script],
        )?;
        check_status("powershell", &output)
    }
}

impl KeystrokeSender for PowerShellKeys {
    fn send_copy(&mut self) -> Result<()> {
        self.send_keys("^c")
    }

    fn send_paste(&mut self) -> Result<()> {
        self.send_keys("^v")
    }
}

/// X11: virtual keystrokes through `xdotool`
#[derive(Debug, Default)]
pub struct XdotoolKeys;

impl XdotoolKeys {
    fn key(&self, chord: &str) -> Result<()> {
        let output = run_tool("xdotool", &["key", "--clearmodifiers", chord])?;
        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("Can't open display") {
            return Err(QuillError::PermissionDenied(
                "xdotool cannot open the X display; quill needs an X11 session (DISPLAY)".to_string(),
            ));
        }
        check_status("xdotool", &output)
    }
}

impl KeystrokeSender for XdotoolKeys {
    fn send_copy(&mut self) -> Result<()> {
        self.key("ctrl+c")
    }

    fn send_paste(&mut self) -> Result<()> {
        self.key("ctrl+v")
    }
}
