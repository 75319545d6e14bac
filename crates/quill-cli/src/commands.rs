use crate::cli::{Commands, ConfigCommand, HistoryCommand, StatsCommand};
use chrono::Local;
use quill_core::clipboard::{get_clipboard_text, set_clipboard_text};
use quill_core::notify::SystemNotifier;
use quill_core::settings::parse_setting_value;
use quill_core::storage::export_file_name;
use quill_core::{
    ChatClient, ConfigPaths, Dispatcher, HistoryEntry, HistoryStore, Outcome, Platform,
    QuillError, Result, RewriteAction, RewriteClient, RewriteRequest, Settings, SettingsStore,
    StatsStore,
};
use quill_daemon::{
    daemon_status, daemon_worker_entry, init_file_logging, missing_requirements, start_daemon,
    stop_daemon, verify_process_running,
};
use quill_server::server::http_server::check_api_server_health;
use quill_server::server::start_api_server;
use quill_server::server::utils::get_api_server_port;
use std::path::PathBuf;
use std::time::Instant;
use tracing::warn;

pub fn handle_command(command: Option<Commands>) -> Result<()> {
    match command {
        Some(command) => handle_subcommand(command),
        None => show_overview(), // Default: short status summary
    }
}

fn handle_subcommand(command: Commands) -> Result<()> {
    match command {
        Commands::Start { port } => start_daemon(port),
        Commands::Stop => stop_daemon(),
        Commands::Status => daemon_status(),
        Commands::Serve { port } => handle_serve_command(port),
        Commands::Port => handle_port_command(),
        Commands::ApiStatus => handle_api_status_command(),
        Commands::Run { action, language } => handle_run_command(action, language),
        Commands::Rewrite {
            action,
            text,
            language,
        } => handle_rewrite_command(action, text, language),
        Commands::Config { command } => handle_config_command(command),
        Commands::History { command } => handle_history_command(command),
        Commands::Stats { command } => handle_stats_command(command),
        Commands::Doctor => handle_doctor_command(),
        Commands::DaemonWorker => daemon_worker_entry(),
    }
}

fn settings_store(paths: &ConfigPaths) -> SettingsStore {
    SettingsStore::new(paths.settings_file())
}

fn show_overview() -> Result<()> {
    let paths = ConfigPaths::from_env();
    println!("quill {}", env!("CARGO_PKG_VERSION"));

    match paths.daemon_pid()? {
        Some(pid) if verify_process_running(pid) => println!("Daemon:     running (PID {})", pid),
        _ => println!("Daemon:     not running"),
    }
    match check_api_server_health() {
        Ok(port) => println!("API server: http://localhost:{}", port),
        Err(_) => println!("API server: not running"),
    }
    println!("Settings:   {}", paths.settings_file().display());
    println!();
    println!("Run 'quill start' to enable the shortcuts, or 'quill --help' for all commands.");
    Ok(())
}

fn handle_serve_command(port: u16) -> Result<()> {
    let paths = ConfigPaths::from_env();
    let _log_guard = init_file_logging(&paths, "api-server")?;

    // Start API server only in a properly configured runtime
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| QuillError::Other(format!("Failed to start async runtime: {}", e)))?;

    // Block the current thread with the server
    runtime.block_on(async {
        println!("Starting standalone API server on port {}...", port);
        start_api_server(port).await
    })
}

fn handle_port_command() -> Result<()> {
    match get_api_server_port() {
        Ok(port) => {
            println!("quill API server is running on port {}", port);
            println!("API available at: http://localhost:{}", port);
        }
        Err(_) => {
            println!("quill API server port information not found.");
            println!("The API server may not be running.");
            println!("Try 'quill status' for more details.");
        }
    }
    Ok(())
}

fn handle_api_status_command() -> Result<()> {
    let port = check_api_server_health()?;
    println!("API server is responding on port {}", port);
    Ok(())
}

fn handle_run_command(action: RewriteAction, language: Option<String>) -> Result<()> {
    let paths = ConfigPaths::from_env();
    let settings = settings_store(&paths).load()?;
    let dispatcher = Dispatcher::for_platform(settings, &paths);

    match dispatcher.invoke_with_language(action, language) {
        Outcome::Replaced { original, modified } => {
            println!(
                "{}: replaced {} characters with {}",
                action.title(),
                original.chars().count(),
                modified.chars().count()
            );
            Ok(())
        }
        Outcome::NothingSelected => {
            println!("No text selected");
            Ok(())
        }
        Outcome::Disabled => Err(QuillError::InvalidConfig(format!(
            "{} is disabled; enable it with 'quill config set features.{} true'",
            action.title(),
            action
        ))),
        Outcome::Busy => Err(QuillError::Other(
            "Another rewrite is still in progress".to_string(),
        )),
        Outcome::Failed(kind) => Err(QuillError::Other(kind.user_message().to_string())),
    }
}

fn handle_rewrite_command(
    action: RewriteAction,
    text: String,
    language: Option<String>,
) -> Result<()> {
    let paths = ConfigPaths::from_env();
    let settings = settings_store(&paths).load()?;
    let client = ChatClient::from_settings(&settings);
    let request = RewriteRequest::new(text.clone(), action).with_target_language(language);

    let started = Instant::now();
    let modified = client.rewrite(&request).map_err(|e| {
        warn!(%action, "rewrite failed: {}", e);
        match e {
            QuillError::ServiceUnavailable(_) => QuillError::Other(e.user_message()),
            other => other,
        }
    })?;
    let elapsed = started.elapsed();

    if let Err(e) = HistoryStore::open(paths.history_file()).record(HistoryEntry::new(
        action,
        text.clone(),
        modified.clone(),
    )) {
        warn!("failed to record history: {}", e);
    }
    if let Err(e) = StatsStore::open(paths.stats_file()).record(action, &text, elapsed) {
        warn!("failed to record usage stats: {}", e);
    }

    println!("{}", modified);
    Ok(())
}

fn handle_config_command(command: ConfigCommand) -> Result<()> {
    let paths = ConfigPaths::from_env();
    let store = settings_store(&paths);

    match command {
        ConfigCommand::Show => {
            let settings = store.load()?;
            println!("{}", serde_json::to_string_pretty(&settings.redacted())?);
        }
        ConfigCommand::Path => println!("{}", store.path().display()),
        ConfigCommand::Reset => {
            store.reset()?;
            println!("Settings reset to defaults");
        }
        ConfigCommand::Get { key } => {
            println!("{}", display_value(&config_value(&store, &key)?));
        }
        ConfigCommand::Set { key, value } => {
            let parsed = parse_setting_value(&value);
            store.set_value(&key, parsed.clone())?;
            if is_secret(&key) {
                println!("Updated {}", key);
            } else {
                println!("Set {} = {}", key, display_value(&parsed));
            }
            if daemon_is_running(&paths) {
                println!("The running daemon picks up the change within a second.");
            }
        }
    }
    Ok(())
}

/// One setting for display, with API keys masked
fn config_value(store: &SettingsStore, key: &str) -> Result<serde_json::Value> {
    let value = store.get_value(key)?;
    if !is_secret(key) {
        return Ok(value);
    }
    let masked = value
        .as_str()
        .map(quill_core::settings::mask_secret)
        .unwrap_or_default();
    Ok(serde_json::Value::String(masked))
}

fn is_secret(key: &str) -> bool {
    key.ends_with("api_key")
}

fn display_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn daemon_is_running(paths: &ConfigPaths) -> bool {
    matches!(paths.daemon_pid(), Ok(Some(pid)) if verify_process_running(pid))
}

fn handle_history_command(command: HistoryCommand) -> Result<()> {
    let paths = ConfigPaths::from_env();
    let store = HistoryStore::open(paths.history_file());

    match command {
        HistoryCommand::List { limit } => {
            let entries = store.entries()?;
            if entries.is_empty() {
                println!("No rewrites yet.");
                return Ok(());
            }
            for entry in entries.iter().take(limit) {
                println!(
                    "{}  {:<9}  {}",
                    entry.timestamp.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
                    entry.action.name(),
                    preview(&entry.original, 40)
                );
                println!("{:28}-> {}", "", preview(&entry.modified, 40));
            }
            if entries.len() > limit {
                println!("... {} more (use --limit)", entries.len() - limit);
            }
        }
        HistoryCommand::Clear => {
            store.clear()?;
            println!("History cleared");
        }
        HistoryCommand::Export { output } => {
            let path = output.unwrap_or_else(|| default_export_path("history"));
            let count = store.export(&path)?;
            println!("Exported {} entries to {}", count, path.display());
        }
    }
    Ok(())
}

fn handle_stats_command(command: StatsCommand) -> Result<()> {
    let paths = ConfigPaths::from_env();
    let store = StatsStore::open(paths.stats_file());

    match command {
        StatsCommand::Show => {
            let stats = store.load()?;
            println!("Grammar checks:  {}", stats.grammar_checks);
            println!("Rephrases:       {}", stats.rephrases);
            println!("Summarizations:  {}", stats.summarizations);
            println!("Translations:    {}", stats.translations);
            println!("Words processed: {}", stats.total_words);
            match stats.average_response_ms() {
                Some(ms) => println!("Average response: {} ms", ms),
                None => println!("Average response: -"),
            }
        }
        StatsCommand::Clear => {
            store.clear()?;
            println!("Usage statistics cleared");
        }
        StatsCommand::Export { output } => {
            let path = output.unwrap_or_else(|| default_export_path("stats"));
            store.export(&path)?;
            println!("Exported usage statistics to {}", path.display());
        }
    }
    Ok(())
}

fn default_export_path(kind: &str) -> PathBuf {
    PathBuf::from(export_file_name(kind, Local::now().date_naive()))
}

/// First line of `text`, cut to `max` characters
fn preview(text: &str, max: usize) -> String {
    let line = text.lines().next().unwrap_or("");
    if line.chars().count() > max || line.len() < text.trim_end().len() {
        let cut: String = line.chars().take(max).collect();
        format!("{}...", cut)
    } else {
        line.to_string()
    }
}

fn handle_doctor_command() -> Result<()> {
    let paths = ConfigPaths::from_env();
    let settings = settings_store(&paths).load()?;
    let mut failures = 0;

    println!("Checking clipboard access...");
    match clipboard_round_trip() {
        Ok(()) => println!("  ✅ clipboard read and write work"),
        Err(e) => {
            failures += 1;
            println!("  ❌ {}", e);
        }
    }

    println!("Checking helper tools and permissions...");
    let problems = missing_requirements(&settings);
    if problems.is_empty() {
        println!("  ✅ nothing missing");
    }
    for problem in &problems {
        failures += 1;
        println!("  ❌ {}", problem);
    }

    println!("Checking rewrite service settings...");
    match credential_problem(&settings) {
        None => println!("  ✅ API key configured"),
        Some(problem) => {
            failures += 1;
            println!("  ❌ {}", problem);
        }
    }

    println!("Checking notifications...");
    match SystemNotifier::new(Platform::current()).send("quill", "Notifications are working") {
        Ok(()) => println!("  ✅ test notification sent"),
        Err(e) => {
            failures += 1;
            println!("  ❌ {}", e);
        }
    }

    if failures == 0 {
        println!("\nEverything looks good.");
        Ok(())
    } else {
        Err(QuillError::Other(format!("{} check(s) failed", failures)))
    }
}

/// Write a test value to the clipboard, read it back, then put the old text back
fn clipboard_round_trip() -> Result<()> {
    let previous = get_clipboard_text()?;
    let sample = format!("quill doctor {}", std::process::id());

    let result = set_clipboard_text(&sample).and_then(|_| get_clipboard_text());
    let restored = set_clipboard_text(&previous);

    let read_back = result?;
    restored?;
    if read_back == sample {
        Ok(())
    } else {
        Err(QuillError::Automation(
            "clipboard did not return the text that was written".to_string(),
        ))
    }
}

fn credential_problem(settings: &Settings) -> Option<String> {
    let (key, name) = if settings.use_azure {
        (&settings.azure_api_key, "azure_api_key")
    } else {
        (&settings.openai_api_key, "openai_api_key")
    };
    key.trim().is_empty().then(|| {
        format!(
            "{} is empty; set it with 'quill config set {} <key>'",
            name, name
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_cuts_long_and_multiline_text() {
        assert_eq!(preview("short", 10), "short");
        assert_eq!(preview("abcdefghijkl", 5), "abcde...");
        assert_eq!(preview("first\nsecond", 10), "first...");
        assert_eq!(preview("", 10), "");
    }

    #[test]
    fn credential_check_follows_backend() {
        let mut settings = Settings::default();
        assert!(credential_problem(&settings)
            .unwrap()
            .contains("azure_api_key"));

        settings.azure_api_key = "secret".to_string();
        assert!(credential_problem(&settings).is_none());

        settings.use_azure = false;
        assert!(credential_problem(&settings)
            .unwrap()
            .contains("openai_api_key"));
    }

    #[test]
    fn secrets_are_detected_by_key_name() {
        assert!(is_secret("azure_api_key"));
        assert!(is_secret("openai_api_key"));
        assert!(!is_secret("openai_model"));
    }

    #[test]
    fn config_get_rejects_unknown_keys_and_masks_secrets() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(ConfigPaths::new(dir.path()).settings_file());
        store
            .set_value("openai_api_key", serde_json::json!("sk-0123456789"))
            .unwrap();

        let unknown = config_value(&store, "bogus_api_key").unwrap_err();
        assert!(unknown.to_string().contains("Unknown setting"));
        assert!(config_value(&store, "bogus").is_err());

        assert_eq!(
            config_value(&store, "openai_api_key").unwrap(),
            serde_json::json!("****6789")
        );
        assert_eq!(
            config_value(&store, "openai_model").unwrap(),
            serde_json::to_value(Settings::default().openai_model).unwrap()
        );
    }

    #[test]
    fn values_display_without_quotes() {
        assert_eq!(display_value(&serde_json::json!("gpt-4o")), "gpt-4o");
        assert_eq!(display_value(&serde_json::json!(15)), "15");
        assert_eq!(display_value(&serde_json::json!(true)), "true");
    }
}
