//! Running the external helpers (osascript, powershell, xdotool, xclip) the
//! script backends drive.

use crate::error::{QuillError, Result};
use std::io::{ErrorKind, Write};
use std::process::{Command, Output, Stdio};

/// Run `program` to completion and capture its output. A missing binary is
/// reported as an automation failure naming the tool.
pub(crate) fn run_tool(program: &str, args: &[&str]) -> Result<Output> {
    Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| spawn_error(program, e))
}

/// Run `program` with `input` on stdin. Stdout is discarded because helpers
/// such as xclip fork a child that keeps serving the selection.
pub(crate) fn run_tool_with_input(program: &str, args: &[&str], input: &str) -> Result<()> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| spawn_error(program, e))?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(input.as_bytes())?;
    }

    let status = child.wait()?;
    if status.success() {
        Ok(())
    } else {
        Err(QuillError::Automation(format!(
            "{} exited with code {:?}",
            program,
            status.code()
        )))
    }
}

/// Turn a failed exit into an automation error carrying stderr
pub(crate) fn check_status(program: &str, output: &Output) -> Result<()> {
    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    Err(QuillError::Automation(format!(
        "{} failed ({:?}): {}",
        program,
        output.status.code(),
        stderr
    )))
}

fn spawn_error(program: &str, err: std::io::Error) -> QuillError {
    if err.kind() == ErrorKind::NotFound {
        QuillError::Automation(format!(
            "'{}' was not found on PATH; install it to use the script input backend",
            program
        ))
    } else {
        QuillError::Automation(format!("Failed to run {}: {}", program, err))
    }
}

/// Whether a helper binary is available
pub fn tool_available(program: &str) -> bool {
    which::which(program).is_ok()
}
