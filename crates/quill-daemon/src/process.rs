use std::process::Command;

/// Verify if a process with the given PID is running
#[cfg(unix)]
pub fn verify_process_running(pid: u32) -> bool {
    // kill -0 only checks that the process exists
    Command::new("kill")
        .args(["-0", &pid.to_string()])
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

#[cfg(windows)]
pub fn verify_process_running(pid: u32) -> bool {
    Command::new("tasklist")
        .args(["/FI", &format!("PID eq {}", pid), "/NH"])
        .output()
        .map(|output| String::from_utf8_lossy(&output.stdout).contains(&pid.to_string()))
        .unwrap_or(false)
}

/// Whether we run as root, which the hotkey listener should never need
pub fn is_elevated() -> bool {
    whoami::username() == "root" || std::env::var("SUDO_USER").is_ok()
}

/// The terminal the user launched quill from, named the way the macOS
/// privacy settings list it
#[cfg(target_os = "macos")]
pub fn detect_terminal_app() -> String {
    if let Ok(program) = std::env::var("TERM_PROGRAM") {
        match program.as_str() {
            "Apple_Terminal" => return "Terminal".to_string(),
            "iTerm.app" => return "iTerm2".to_string(),
            "" => {}
            other => return other.to_string(),
        }
    }

    let mut pid = parent_pid(std::process::id());
    // Shells sit between us and the terminal; walk a few levels up
    for _ in 0..6 {
        let Some(current) = pid else { break };
        let comm = command_name(current);
        let base = comm.rsplit('/').next().unwrap_or(&comm).to_string();
        match base.as_str() {
            "iTerm2" | "iTerm" => return "iTerm2".to_string(),
            "Terminal" => return "Terminal".to_string(),
            "Alacritty" | "alacritty" => return "Alacritty".to_string(),
            "kitty" => return "kitty".to_string(),
            "WezTerm" | "wezterm-gui" => return "WezTerm".to_string(),
            "Hyper" => return "Hyper".to_string(),
            _ => pid = parent_pid(current),
        }
    }

    "your terminal application (Terminal.app, iTerm2, etc.)".to_string()
}

#[cfg(target_os = "macos")]
fn parent_pid(pid: u32) -> Option<u32> {
    let output = Command::new("ps")
        .args(["-o", "ppid=", "-p", &pid.to_string()])
        .output()
        .ok()?;
    let ppid = String::from_utf8_lossy(&output.stdout).trim().parse::<u32>().ok()?;
    (ppid != 0 && ppid != pid).then_some(ppid)
}

#[cfg(target_os = "macos")]
fn command_name(pid: u32) -> String {
    Command::new("ps")
        .args(["-p", &pid.to_string(), "-o", "comm="])
        .output()
        .map(|output| String::from_utf8_lossy(&output.stdout).trim().to_string())
        .unwrap_or_default()
}

#[cfg(target_os = "linux")]
pub fn detect_linux_terminal() -> String {
    if let Ok(term) = std::env::var("TERM_PROGRAM") {
        if !term.is_empty() {
            return term;
        }
    }

    let output = Command::new("ps")
        .args(["-o", "comm=", "-p", &std::os::unix::process::parent_id().to_string()])
        .output();
    if let Ok(output) = output {
        let parent = String::from_utf8_lossy(&output.stdout).trim().to_string();
        for known in ["gnome-terminal", "konsole", "xterm", "alacritty", "kitty", "terminator"] {
            if parent.contains(known) {
                return known.to_string();
            }
        }
    }

    "your terminal emulator".to_string()
}

#[cfg(target_os = "linux")]
pub fn detect_desktop_environment() -> String {
    for var in ["XDG_CURRENT_DESKTOP", "DESKTOP_SESSION", "GDMSESSION"] {
        if let Ok(val) = std::env::var(var) {
            if val.is_empty() {
                continue;
            }
            let upper = val.to_uppercase();
            for (needle, name) in [
                ("GNOME", "GNOME"),
                ("KDE", "KDE"),
                ("XFCE", "XFCE"),
                ("CINNAMON", "Cinnamon"),
                ("MATE", "MATE"),
            ] {
                if upper.contains(needle) {
                    return name.to_string();
                }
            }
            return val;
        }
    }
    "Unknown".to_string()
}

/// `x11` or `wayland` as reported by the session, if known
#[cfg(target_os = "linux")]
pub fn session_type() -> Option<String> {
    std::env::var("XDG_SESSION_TYPE")
        .ok()
        .filter(|s| !s.is_empty())
        .map(|s| s.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn own_process_is_running() {
        assert!(verify_process_running(std::process::id()));
    }
}
