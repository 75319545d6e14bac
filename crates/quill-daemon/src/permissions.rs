use quill_core::settings::InputBackend;
use quill_core::{Platform, QuillError, Result, Settings};
use tracing::{info, warn};

#[cfg(target_os = "macos")]
use crate::process::detect_terminal_app;

#[cfg(target_os = "linux")]
use crate::process::{detect_desktop_environment, detect_linux_terminal, session_type};

/// Problems that stop quill from listening for shortcuts or driving the
/// focused application. Empty when everything is in place.
pub fn missing_requirements(settings: &Settings) -> Vec<String> {
    let platform = Platform::current();
    let mut problems = Vec::new();

    if settings.input_backend == InputBackend::Script {
        for tool in platform.missing_tools() {
            problems.push(format!(
                "'{}' is not installed; it is needed to copy and paste in other applications",
                tool
            ));
        }
    }

    #[cfg(target_os = "linux")]
    {
        if std::env::var_os("DISPLAY").is_none() {
            problems.push(
                "DISPLAY is not set; global shortcuts and keystrokes need an X11 session".to_string(),
            );
        }
        if session_type().as_deref() == Some("wayland") {
            problems.push(
                "Wayland session detected; shortcuts only reach X11/XWayland applications".to_string(),
            );
        }
    }

    #[cfg(target_os = "macos")]
    {
        if platform.missing_tools().is_empty() && !has_accessibility_permission() {
            problems.push(format!(
                "{} is not allowed to control your computer (Accessibility)",
                detect_terminal_app()
            ));
        }
    }

    problems
}

/// Check requirements before the daemon starts, walking the user through
/// the fix where the OS needs a manual grant.
pub fn check_and_request_permissions(settings: &Settings) -> Result<()> {
    if crate::process::is_elevated() {
        warn!("running as root; global shortcuts will not see the user's session");
        println!("⚠️  quill is running as root. Run it as your normal user instead.");
    }

    let problems = missing_requirements(settings);
    if problems.is_empty() {
        info!("permission and tool checks passed");
        return Ok(());
    }

    #[cfg(target_os = "macos")]
    {
        if !has_accessibility_permission() {
            return request_macos_permissions();
        }
    }

    #[cfg(target_os = "linux")]
    {
        print_linux_help();
    }

    for problem in &problems {
        warn!("{}", problem);
    }
    Err(QuillError::PermissionDenied(problems.join("; ")))
}

#[cfg(target_os = "macos")]
fn has_accessibility_permission() -> bool {
    std::process::Command::new("osascript")
        .arg("-e")
        .arg("tell application \"System Events\" to return name of first process")
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

#[cfg(target_os = "macos")]
fn request_macos_permissions() -> Result<()> {
    let terminal_app = detect_terminal_app();

    println!("⚠️  quill needs accessibility permissions to copy and paste for you");
    println!("------------------------------------------------------------------");
    println!("1. Open System Settings > Privacy & Security > Accessibility");
    println!("2. Find and check the box next to '{}'", terminal_app);
    println!("3. If it's already checked, uncheck and recheck it");
    println!("4. Also allow '{}' under Input Monitoring", terminal_app);
    println!();
    println!("Would you like to open System Settings now? (y/n)");

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    if input.trim().eq_ignore_ascii_case("y") {
        let _ = std::process::Command::new("open")
            .arg("x-apple.systempreferences:com.apple.preference.security?Privacy_Accessibility")
            .status();
    }

    println!("\nPress Enter once you've granted permission...");
    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;

    if has_accessibility_permission() {
        println!("\n✅ Permission granted successfully!");
        Ok(())
    } else {
        Err(QuillError::PermissionDenied(format!(
            "Accessibility permission not granted for {}. Please restart quill after granting it.",
            terminal_app
        )))
    }
}

#[cfg(target_os = "linux")]
fn print_linux_help() {
    println!("⚠️  quill cannot drive the desktop yet");
    println!("-------------------------------------");
    println!("Detected terminal: {}", detect_linux_terminal());
    println!("Desktop environment: {}", detect_desktop_environment());
    println!();
    println!("quill uses xdotool and xclip on X11. On Debian/Ubuntu:");
    println!("   sudo apt install xdotool xclip");
    println!("Or switch to the built-in backend:");
    println!("   quill config set input_backend native");
}
