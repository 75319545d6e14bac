use crate::error::QuillError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the fixed rewrite operations a shortcut can trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RewriteAction {
    Grammar,
    Rephrase,
    Summarize,
    Translate,
}

impl RewriteAction {
    pub const ALL: [RewriteAction; 4] = [
        RewriteAction::Grammar,
        RewriteAction::Rephrase,
        RewriteAction::Summarize,
        RewriteAction::Translate,
    ];

    pub fn name(self) -> &'static str {
        match self {
            RewriteAction::Grammar => "grammar",
            RewriteAction::Rephrase => "rephrase",
            RewriteAction::Summarize => "summarize",
            RewriteAction::Translate => "translate",
        }
    }

    /// Title used for notifications
    pub fn title(self) -> &'static str {
        match self {
            RewriteAction::Grammar => "Grammar Check",
            RewriteAction::Rephrase => "Rephrase",
            RewriteAction::Summarize => "Summarize",
            RewriteAction::Translate => "Translate",
        }
    }

    /// Progress line shown while the request is in flight
    pub fn progress_message(self) -> &'static str {
        match self {
            RewriteAction::Grammar => "Checking grammar...",
            RewriteAction::Rephrase => "Rephrasing text...",
            RewriteAction::Summarize => "Condensing...",
            RewriteAction::Translate => "Translating...",
        }
    }
}

impl fmt::Display for RewriteAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RewriteAction {
    type Err = QuillError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "grammar" | "grammar-check" | "grammarcheck" => Ok(RewriteAction::Grammar),
            "rephrase" => Ok(RewriteAction::Rephrase),
            "summarize" | "summarise" | "summary" => Ok(RewriteAction::Summarize),
            "translate" | "translation" => Ok(RewriteAction::Translate),
            other => Err(QuillError::Other(format!("Unknown action '{}'", other))),
        }
    }
}
