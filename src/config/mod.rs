use crate::{Result, SpiralError};
use serde::{Deserialize, Serialize};
use std::env;

use crate::constants::DEFAULT_BACKEND_BASE_URL;


/// Top-level process configuration, loaded once at startup.
///
/// Authentication is an explicit non-goal of this backend: unlike the
/// teacher this config carries no API key gate, no CORS allowlist tied to
/// an auth boundary. CORS stays permissive (see `api::build_router`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub workspace: WorkspaceConfig,
    pub assistant: AssistantConfig,
    pub adapters: AdapterConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub base_url: String,
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Base directory under which `Runtime/{workspace_id}/` is created.
    pub runtime_base_path: String,
    pub default_workspace_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantConfig {
    /// Seconds between Director poll cycles.
    pub polling_interval_secs: f64,
    /// Keeps the materialization scratch directory for debugging instead of
    /// cleaning it up after `execute_for_task` returns.
    pub keep_materialize_temp_dir: bool,
}

/// Opaque secrets for out-of-scope LLM/media adapters. Never logged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterConfig {
    pub llm_api_key: Option<String>,
    pub llm_base_url: Option<String>,
    pub media_api_key: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        match dotenvy::dotenv() {
            Ok(path) => tracing::info!("Loaded .env file from: {:?}", path),
            Err(e) => tracing::debug!("No .env file loaded: {}", e),
        }

        let base_url =
            env::var("BACKEND_BASE_URL").unwrap_or_else(|_| DEFAULT_BACKEND_BASE_URL.to_string());

        let port = parse_port_from_url(&base_url).unwrap_or(5002);

        let server = ServerConfig {
            host: env::var("API_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env::var("API_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(port),
            base_url,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        };

        let polling_interval_secs = env::var("POLLING_INTERVAL")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(1.0);

        if polling_interval_secs <= 0.0 {
            return Err(SpiralError::Configuration(
                "POLLING_INTERVAL must be a positive number of seconds".to_string(),
            ));
        }

        let workspace = WorkspaceConfig {
            runtime_base_path: env::var("RUNTIME_BASE_PATH").unwrap_or_else(|_| "Runtime".to_string()),
            default_workspace_id: env::var("DEFAULT_WORKSPACE_ID")
                .unwrap_or_else(|_| "default".to_string()),
        };

        let assistant = AssistantConfig {
            polling_interval_secs,
            keep_materialize_temp_dir: env::var("SPIRAL_KEEP_MEDIA_TEMP")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        };

        let adapters = AdapterConfig {
            llm_api_key: env::var("LLM_API_KEY").ok(),
            llm_base_url: env::var("LLM_BASE_URL").ok(),
            media_api_key: env::var("MEDIA_API_KEY").ok(),
        };

        Ok(Config {
            server,
            workspace,
            assistant,
            adapters,
        })
    }
}

fn parse_port_from_url(url: &str) -> Option<u16> {
    url.rsplit(':').next()?.trim_end_matches('/').parse().ok()
}
