use crate::clipboard::{ArboardClipboard, XclipClipboard};
use crate::keyboard::{EnigoKeys, OsaScriptKeys, PowerShellKeys, XdotoolKeys};
use crate::selection::{ClipboardProtocol, SelectionBackend};
use crate::settings::{InputBackend, Settings};
use crate::tool::tool_available;
use serde::Serialize;
use std::fmt;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    MacOs,
    Windows,
    Linux,
}

impl Platform {
    /// The OS this binary was built for; unknown Unix flavours use the X11 tools
    pub fn current() -> Self {
        if cfg!(target_os = "macos") {
            Platform::MacOs
        } else if cfg!(target_os = "windows") {
            Platform::Windows
        } else {
            Platform::Linux
        }
    }

    /// External helpers the script backend depends on
    pub fn required_tools(self) -> &'static [&'static str] {
        match self {
            Platform::MacOs => &["osascript"],
            Platform::Windows => &["powershell"],
            Platform::Linux => &["xdotool", "xclip"],
        }
    }

    pub fn missing_tools(self) -> Vec<&'static str> {
        self.required_tools()
            .iter()
            .copied()
            .filter(|tool| !tool_available(tool))
            .collect()
    }

    /// Build the selection backend for this OS. Chosen once at startup.
    pub fn selection_backend(self, settings: &Settings) -> Box<dyn SelectionBackend> {
        let timings = settings.timings;
        info!(platform = %self, backend = ?settings.input_backend, "selecting input backend");

        match (settings.input_backend, self) {
            (InputBackend::Native, _) => Box::new(ClipboardProtocol::new(
                ArboardClipboard,
                EnigoKeys,
                timings,
            )),
            (InputBackend::Script, Platform::MacOs) => Box::new(ClipboardProtocol::new(
                ArboardClipboard,
                OsaScriptKeys,
                timings,
            )),
            (InputBackend::Script, Platform::Windows) => Box::new(ClipboardProtocol::new(
                ArboardClipboard,
                PowerShellKeys,
                timings,
            )),
            (InputBackend::Script, Platform::Linux) => Box::new(ClipboardProtocol::new(
                XclipClipboard,
                XdotoolKeys,
                timings,
            )),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Platform::MacOs => "macOS",
            Platform::Windows => "Windows",
            Platform::Linux => "Linux",
        };
        f.write_str(name)
    }
}
