use serde::Serialize;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QuillError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// A simulated keystroke or clipboard operation failed.
    #[error("Automation error: {0}")]
    Automation(String),
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    /// Network, HTTP status or response-shape failure from the rewrite endpoint.
    #[error("Rewrite service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("Nothing to rewrite: input text is empty")]
    EmptyInput,
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Invalid shortcut: {0}")]
    InvalidShortcut(String),
    #[error("Daemon is not running")]
    DaemonNotRunning,
    #[error("Invalid PID in daemon file")]
    InvalidPid,
    #[error("Error: {0}")]
    Other(String),
}

/// Failure categories surfaced to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Automation,
    Permission,
    Service,
    Configuration,
    Input,
    Internal,
}

impl QuillError {
    pub fn kind(&self) -> FailureKind {
        match self {
            QuillError::Automation(_) => FailureKind::Automation,
            QuillError::PermissionDenied(_) => FailureKind::Permission,
            QuillError::ServiceUnavailable(_) => FailureKind::Service,
            QuillError::InvalidConfig(_) | QuillError::InvalidShortcut(_) => {
                FailureKind::Configuration
            }
            QuillError::EmptyInput => FailureKind::Input,
            QuillError::Io(_)
            | QuillError::Json(_)
            | QuillError::DaemonNotRunning
            | QuillError::InvalidPid
            | QuillError::Other(_) => FailureKind::Internal,
        }
    }

    /// The single line shown to the user for this failure. Service failures
    /// never expose their cause here; it is logged instead.
    pub fn user_message(&self) -> String {
        self.kind().user_message().to_string()
    }
}

impl FailureKind {
    pub fn user_message(self) -> &'static str {
        match self {
            FailureKind::Automation => {
                "Could not copy or paste in the active application"
            }
            FailureKind::Permission => {
                "quill is not allowed to control the keyboard. Grant accessibility/automation permission and try again"
            }
            FailureKind::Service => {
                "Rewrite service unavailable, check your configuration or updates"
            }
            FailureKind::Configuration => "Invalid configuration, check your settings",
            FailureKind::Input => "No text to rewrite",
            FailureKind::Internal => "Oops, something went wrong",
        }
    }
}

pub type Result<T> = std::result::Result<T, QuillError>;
