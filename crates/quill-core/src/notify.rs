use crate::error::Result;
use crate::platform::Platform;
use crate::tool::{check_status, run_tool};
use std::sync::Mutex;
use std::thread;
use tracing::{info, warn};

/// Fire-and-forget user notices. Delivery failures are logged, never returned.
pub trait Notifier: Send + Sync {
    fn notify(&self, title: &str, body: &str);
}

/// Desktop notifications through the OS notification center
#[derive(Debug, Clone, Copy)]
pub struct SystemNotifier {
    platform: Platform,
}

impl SystemNotifier {
    pub fn new(platform: Platform) -> Self {
        Self { platform }
    }

    /// Deliver synchronously and report failures; used by `quill doctor`
    pub fn send(&self, title: &str, body: &str) -> Result<()> {
        match self.platform {
            Platform::MacOs => {
                let script = format!(
                    "display notification \"{}\" with title \"{}\"",
                    applescript_escape(body),
                    applescript_escape(title)
                );
                let output = run_tool("osascript", &["-e", &script])?;
                check_status("osascript", &output)
            }
            Platform::Linux => {
                let output = run_tool("notify-send", &["--app-name=quill", title, body])?;
                check_status("notify-send", &output)
            }
            Platform::Windows => {
                let script = format!(
                    "Add-Type -AssemblyName System.Windows.Forms; \
                     $n = New-Object System.Windows.Forms.NotifyIcon; \
                     $n.Icon = [System.Drawing.SystemIcons]::Information; \
                     $n.Visible = $true; \
                     $n.ShowBalloonTip(3000, '{}', '{}', 'Info'); \
                     Start-Sleep -Seconds 4; $n.Dispose()",
                    powershell_escape(title),
                    powershell_escape(body)
                );
                let output = run_tool(
                    "powershell",
                    &["-NoProfile", "-NonInteractive", "-Command", &script],
                )?;
                check_status("powershell", &output)
            }
        }
    }
}

impl Notifier for SystemNotifier {
    fn notify(&self, title: &str, body: &str) {
        let notifier = *self;
        let title = title.to_string();
        let body = body.to_string();
        thread::spawn(move || {
            if let Err(e) = notifier.send(&title, &body) {
                warn!("notification not delivered: {}", e);
            }
        });
    }
}

/// Writes notices to the log only
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, title: &str, body: &str) {
        info!(title, body, "notice");
    }
}

/// A notice kept by [`MemoryNotifier`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub title: String,
    pub body: String,
}

/// Keeps every notice in memory, for headless callers that report afterwards
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl MemoryNotifier {
    pub fn notices(&self) -> Vec<Notice> {
        self.notices
            .lock()
            .map(|n| n.clone())
            .unwrap_or_default()
    }
}

impl Notifier for MemoryNotifier {
    fn notify(&self, title: &str, body: &str) {
        if let Ok(mut notices) = self.notices.lock() {
            notices.push(Notice {
                title: title.to_string(),
                body: body.to_string(),
            });
        }
    }
}

fn applescript_escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

fn powershell_escape(text: &str) -> String {
    text.replace('\'', "''")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_quotes_for_each_shell() {
        assert_eq!(applescript_escape(r#"say "hi" \o/"#), r#"say \"hi\" \\o/"#);
        assert_eq!(powershell_escape("it's"), "it''s");
    }

    #[test]
    fn memory_notifier_keeps_order() {
        let notifier = MemoryNotifier::default();
        notifier.notify("Grammar Check", "Done!");
        notifier.notify("Rephrase", "No text selected");

        let notices = notifier.notices();
        assert_eq!(notices.len(), 2);
        assert_eq!(notices[1].body, "No text selected");
    }
}
