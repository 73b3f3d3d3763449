use std::time::Duration;

use once_cell::sync::Lazy;
use crate::settings::ExplorerSettings;

// Default values for configuration
// These serve as fallback values and can be used for "reset to defaults" functionality
pub const DEFAULT_SERVER_URL: &str = "http://localhost:32168";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 5000;
pub const DEFAULT_ANIMATION_LOOP_MS: u64 = 5000;
pub const DEFAULT_FRAME_INTERVAL_MS: u64 = 16;
pub const FALLBACK_FRAME_INTERVAL_MS: u64 = 50;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_url: String,
    pub poll_interval: Duration,       // Module list refresh period
    pub animation_loop: Duration,      // One full rotation of the animated frame
    pub frame_interval: Duration,      // Redraw period of the animated frame
    pub request_timeout: Duration,     // Client-side cancellation of processing calls
    pub ui_from_server: bool,
    pub sort_by_confidence: bool,
    pub pinned_tabs: Vec<String>,
}

impl Config {
    pub fn from_settings(settings: &ExplorerSettings) -> Self {
        let frame_interval_ms = if settings.frame_interval_ms == 0 {
            FALLBACK_FRAME_INTERVAL_MS
        } else {
            settings.frame_interval_ms
        };

        Config {
            server_url: settings.server_url.trim_end_matches('/').to_string(),
            poll_interval: Duration::from_millis(settings.poll_interval_ms.max(1)),
            animation_loop: Duration::from_millis(settings.animation_loop_ms.max(1)),
            frame_interval: Duration::from_millis(frame_interval_ms),
            request_timeout: Duration::from_secs(settings.request_timeout_secs),
            ui_from_server: settings.ui_from_server,
            sort_by_confidence: settings.sort_by_confidence,
            pinned_tabs: settings.pinned_tabs.clone(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_settings(&ExplorerSettings::default())
    }
}

pub static CONFIG: Lazy<Config> = Lazy::new(|| {
    // Load settings from YAML file
    let settings = ExplorerSettings::load(None);
    Config::from_settings(&settings)
});
