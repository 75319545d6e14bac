use clap::{Parser, Subcommand};
use quill_core::RewriteAction;
use std::env;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    version = env!("CARGO_PKG_VERSION"),
    about = "quill - rewrite the selected text in any application",
    long_about = "quill copies the text you have selected, sends it to a language model \
                  for grammar correction, rephrasing, summarizing or translation, and pastes \
                  the result back in place. Bind the actions to global shortcuts with \
                  'quill start'."
)]
pub struct Quill {
    #[clap(subcommand)]
    pub commands: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the shortcut daemon and the local API server
    Start {
        #[clap(long, short, default_value = "3000", help = "Port for the API server")]
        port: u16,
    },
    /// Stop the quill daemon
    Stop,
    /// Check the status of the quill daemon
    Status,
    /// Start just the API server (without daemon)
    Serve {
        #[clap(long, short, default_value = "3000", help = "Port to listen on")]
        port: u16,
    },
    /// Show the API server port
    Port,
    /// Check if the API server is responsive
    ApiStatus,
    /// Rewrite the selection in the focused application once
    Run {
        #[clap(help = "grammar, rephrase, summarize or translate")]
        action: RewriteAction,

        #[clap(long, short, help = "Target language for translate")]
        language: Option<String>,
    },
    /// Rewrite the given text and print the result
    Rewrite {
        #[clap(help = "grammar, rephrase, summarize or translate")]
        action: RewriteAction,

        #[clap(long, short, help = "Text to rewrite")]
        text: String,

        #[clap(long, short, help = "Target language for translate")]
        language: Option<String>,
    },
    /// Show or change settings
    Config {
        #[clap(subcommand)]
        command: ConfigCommand,
    },
    /// Show, clear or export the rewrite history
    History {
        #[clap(subcommand)]
        command: HistoryCommand,
    },
    /// Show, clear or export usage statistics
    Stats {
        #[clap(subcommand)]
        command: StatsCommand,
    },
    /// Check clipboard access, helper tools, permissions and notifications
    Doctor,
    // Hidden command used internally to run the daemon worker
    #[clap(hide = true)]
    DaemonWorker,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Print all settings (API keys masked)
    Show,
    /// Print the settings file location
    Path,
    /// Restore every setting to its default
    Reset,
    /// Print one setting, e.g. `shortcuts.grammar`
    Get { key: String },
    /// Change one setting, e.g. `set features.translate false`
    Set { key: String, value: String },
}

#[derive(Subcommand)]
pub enum HistoryCommand {
    /// List recent rewrites, newest first
    List {
        #[clap(long, short = 'n', default_value = "10", help = "Number of entries to show")]
        limit: usize,
    },
    /// Delete all history entries
    Clear,
    /// Write the history to a JSON file
    Export {
        #[clap(long, short, help = "Output file (default: quill-history-<date>.json)")]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub enum StatsCommand {
    /// Print usage counters
    Show,
    /// Reset all counters
    Clear,
    /// Write the counters to a JSON file
    Export {
        #[clap(long, short, help = "Output file (default: quill-stats-<date>.json)")]
        output: Option<PathBuf>,
    },
}
