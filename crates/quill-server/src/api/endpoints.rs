use crate::api::models::{
    ApiResponse, ApiServerInfo, DaemonStatus, RewriteBody, RewriteResult, StatsSummary,
};
use chrono::Local;
use quill_core::storage::export_file_name;
use quill_core::{
    ChatClient, ConfigPaths, HistoryEntry, HistoryStore, Result, RewriteClient, RewriteRequest,
    Settings, SettingsStore, StatsStore,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

pub type ClientFactory = Arc<dyn Fn(&Settings) -> Box<dyn RewriteClient> + Send + Sync>;

/// Everything a request handler needs, cloned into each route
#[derive(Clone)]
pub struct ApiContext {
    paths: ConfigPaths,
    port: u16,
    settings: Arc<SettingsStore>,
    history: Arc<HistoryStore>,
    stats: Arc<StatsStore>,
    client_factory: ClientFactory,
}

impl ApiContext {
    pub fn new(paths: ConfigPaths, port: u16) -> Self {
        Self {
            settings: Arc::new(SettingsStore::new(paths.settings_file())),
            history: Arc::new(HistoryStore::open(paths.history_file())),
            stats: Arc::new(StatsStore::open(paths.stats_file())),
            client_factory: Arc::new(|settings: &Settings| {
                Box::new(ChatClient::from_settings(settings)) as Box<dyn RewriteClient>
            }),
            paths,
            port,
        }
    }

    /// Replace how rewrite clients are built from the current settings
    pub fn with_client_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(&Settings) -> Box<dyn RewriteClient> + Send + Sync + 'static,
    {
        self.client_factory = Arc::new(factory);
        self
    }

    pub fn paths(&self) -> &ConfigPaths {
        &self.paths
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

/// Current settings with API keys masked
pub fn get_settings(ctx: &ApiContext) -> ApiResponse<Settings> {
    match ctx.settings.load() {
        Ok(settings) => ApiResponse::success(settings.redacted()),
        Err(e) => ApiResponse::error(format!("Failed to load settings: {}", e)),
    }
}

/// Replace the settings. Masked keys sent back unchanged keep their stored value.
pub fn update_settings(ctx: &ApiContext, incoming: Settings) -> ApiResponse<Settings> {
    let current = match ctx.settings.load() {
        Ok(settings) => settings,
        Err(e) => return ApiResponse::error(format!("Failed to load settings: {}", e)),
    };

    let merged = incoming.with_secrets_from(&current);
    match ctx.settings.save(&merged) {
        Ok(()) => {
            info!("settings updated through the API");
            ApiResponse::success(merged.redacted())
        }
        Err(e) => ApiResponse::error(format!("Failed to save settings: {}", e)),
    }
}

pub fn reset_settings(ctx: &ApiContext) -> ApiResponse<Settings> {
    match ctx.settings.reset() {
        Ok(()) => {
            info!("settings reset through the API");
            ApiResponse::success(Settings::default().redacted())
        }
        Err(e) => ApiResponse::error(format!("Failed to reset settings: {}", e)),
    }
}

pub fn get_history(ctx: &ApiContext) -> ApiResponse<Vec<HistoryEntry>> {
    match ctx.history.entries() {
        Ok(entries) => ApiResponse::success(entries),
        Err(e) => ApiResponse::error(format!("Failed to load history: {}", e)),
    }
}

pub fn clear_history(ctx: &ApiContext) -> ApiResponse<()> {
    match ctx.history.clear() {
        Ok(()) => ApiResponse::success(()),
        Err(e) => ApiResponse::error(format!("Failed to clear history: {}", e)),
    }
}

/// File name and JSON document for a history download
pub fn history_export(ctx: &ApiContext) -> Result<(String, String)> {
    let entries = ctx.history.entries()?;
    let body = serde_json::to_string_pretty(&entries)?;
    Ok((export_file_name("history", Local::now().date_naive()), body))
}

pub fn get_stats(ctx: &ApiContext) -> ApiResponse<StatsSummary> {
    match ctx.stats.load() {
        Ok(stats) => ApiResponse::success(stats.into()),
        Err(e) => ApiResponse::error(format!("Failed to load stats: {}", e)),
    }
}

pub fn clear_stats(ctx: &ApiContext) -> ApiResponse<()> {
    match ctx.stats.clear() {
        Ok(()) => ApiResponse::success(()),
        Err(e) => ApiResponse::error(format!("Failed to clear stats: {}", e)),
    }
}

/// File name and JSON document for a stats download
pub fn stats_export(ctx: &ApiContext) -> Result<(String, String)> {
    let stats = ctx.stats.load()?;
    let body = serde_json::to_string_pretty(&stats)?;
    Ok((export_file_name("stats", Local::now().date_naive()), body))
}

/// Rewrite supplied text without touching the clipboard. Blocks on the
/// remote call.
pub fn rewrite_text(ctx: &ApiContext, body: RewriteBody) -> ApiResponse<RewriteResult> {
    let settings = match ctx.settings.load() {
        Ok(settings) => settings,
        Err(e) => return ApiResponse::error(format!("Failed to load settings: {}", e)),
    };
    if !settings.features.is_enabled(body.action) {
        return ApiResponse::error(format!("{} is disabled in settings", body.action.title()));
    }

    let client = (ctx.client_factory)(&settings);
    let request = RewriteRequest::new(body.text.clone(), body.action)
        .with_target_language(body.target_language);

    let started = Instant::now();
    match client.rewrite(&request) {
        Ok(modified) => {
            let elapsed = started.elapsed();
            if let Err(e) = ctx.history.record(HistoryEntry::new(
                body.action,
                body.text.clone(),
                modified.clone(),
            )) {
                warn!("failed to record history: {}", e);
            }
            if let Err(e) = ctx.stats.record(body.action, &body.text, elapsed) {
                warn!("failed to record usage stats: {}", e);
            }
            ApiResponse::success(RewriteResult {
                action: body.action,
                original: body.text,
                modified,
            })
        }
        Err(e) => {
            error!(action = %body.action, "API rewrite failed: {}", e);
            ApiResponse::error(e.user_message())
        }
    }
}

/// Get detailed daemon information
pub fn get_daemon_status(ctx: &ApiContext) -> ApiResponse<DaemonStatus> {
    match ctx.paths.daemon_pid() {
        Ok(pid) => ApiResponse::success(DaemonStatus {
            running: pid.is_some(),
            pid,
            config_path: ctx.paths.root().to_string_lossy().to_string(),
            api_server: ApiServerInfo {
                port: ctx.port,
                url: format!("http://localhost:{}", ctx.port),
            },
        }),
        Err(e) => ApiResponse::error(format!("Failed to check daemon status: {}", e)),
    }
}
