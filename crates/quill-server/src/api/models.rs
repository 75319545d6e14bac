//! Data models for API requests and responses.

use quill_core::{RewriteAction, UsageStats};
use serde::{Deserialize, Serialize};

/// Standard API response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

/// Daemon status information
#[derive(Debug, Serialize, Deserialize)]
pub struct DaemonStatus {
    pub running: bool,
    pub pid: Option<u32>,
    pub config_path: String,
    pub api_server: ApiServerInfo,
}

/// API server information
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiServerInfo {
    pub port: u16,
    pub url: String,
}

/// In-app rewrite of supplied text
#[derive(Debug, Deserialize)]
pub struct RewriteBody {
    pub action: RewriteAction,
    pub text: String,
    #[serde(default)]
    pub target_language: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RewriteResult {
    pub action: RewriteAction,
    pub original: String,
    pub modified: String,
}

/// Usage counters plus the figures the shell displays
#[derive(Debug, Serialize, Deserialize)]
pub struct StatsSummary {
    #[serde(flatten)]
    pub stats: UsageStats,
    pub total_rewrites: u64,
    pub average_response_ms: Option<u64>,
}

impl From<UsageStats> for StatsSummary {
    fn from(stats: UsageStats) -> Self {
        Self {
            total_rewrites: stats.total_rewrites(),
            average_response_ms: stats.average_response_ms(),
            stats,
        }
    }
}
