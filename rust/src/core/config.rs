use std::path::Path;

use serde::Deserialize;

use super::AppCore;

pub(super) const DEFAULT_API_BASE_URL: &str = "https://api.grange.market";
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 15_000;
const DEFAULT_REQUEST_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(super) struct AppConfig {
    pub(super) api_base_url: Option<String>,
    pub(super) disable_network: Option<bool>,
    pub(super) request_timeout_ms: Option<u64>,
    pub(super) request_attempts: Option<u32>,
}

pub(super) fn load_app_config(data_dir: &str) -> AppConfig {
    let path = Path::new(data_dir).join("grange_config.json");
    let Ok(bytes) = std::fs::read(&path) else {
        return AppConfig::default();
    };
    serde_json::from_slice::<AppConfig>(&bytes).unwrap_or_default()
}

impl AppConfig {
    pub(super) fn api_base_url(&self) -> String {
        self.api_base_url
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToString::to_string)
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string())
    }

    pub(super) fn request_timeout_ms(&self) -> u64 {
        self.request_timeout_ms.unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS)
    }

    pub(super) fn request_attempts(&self) -> u32 {
        self.request_attempts.unwrap_or(DEFAULT_REQUEST_ATTEMPTS).max(1)
    }
}

impl AppCore {
    pub(super) fn network_enabled(&self) -> bool {
        // Used to keep Rust tests deterministic and offline.
        if let Some(disable) = self.config.disable_network {
            return !disable;
        }
        std::env::var("GRANGE_DISABLE_NETWORK").ok().as_deref() != Some("1")
    }
}
