use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use log::{debug, info, warn, error};

use crate::config::{
    DEFAULT_ANIMATION_LOOP_MS, DEFAULT_FRAME_INTERVAL_MS, DEFAULT_POLL_INTERVAL_MS,
    DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_SERVER_URL,
};

/// User-specific settings that persist across explorer sessions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplorerSettings {
    /// Base URL of the inference server
    #[serde(default = "default_server_url")]
    pub server_url: String,

    /// How often the running-module list is polled
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Time for the rotating frame highlight to travel once around the box
    #[serde(default = "default_animation_loop_ms")]
    pub animation_loop_ms: u64,

    /// Redraw period of the rotating frame loop
    #[serde(default = "default_frame_interval_ms")]
    pub frame_interval_ms: u64,

    /// Client-side timeout for module processing calls
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Compose module UIs from the server (true) or toggle static cards (false)
    #[serde(default = "default_true")]
    pub ui_from_server: bool,

    /// Sort predictions by descending confidence before rendering
    #[serde(default = "default_true")]
    pub sort_by_confidence: bool,

    /// Tab categories that stay visible even with no running module
    #[serde(default)]
    pub pinned_tabs: Vec<String>,
}

fn default_server_url() -> String {
    DEFAULT_SERVER_URL.to_string()
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_animation_loop_ms() -> u64 {
    DEFAULT_ANIMATION_LOOP_MS
}

fn default_frame_interval_ms() -> u64 {
    DEFAULT_FRAME_INTERVAL_MS
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_true() -> bool {
    true
}

impl Default for ExplorerSettings {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            animation_loop_ms: DEFAULT_ANIMATION_LOOP_MS,
            frame_interval_ms: DEFAULT_FRAME_INTERVAL_MS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            ui_from_server: true,
            sort_by_confidence: true,
            pinned_tabs: Vec::new(),
        }
    }
}

impl ExplorerSettings {
    /// Get the path to the settings file
    /// On macOS: ~/Library/Application Support/InferenceExplorer/settings.yaml
    /// On Linux: ~/.config/InferenceExplorer/settings.yaml
    /// On Windows: C:\Users\<user>\AppData\Roaming\InferenceExplorer\settings.yaml
    pub fn settings_path() -> PathBuf {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."));

        config_dir.join("InferenceExplorer").join("settings.yaml")
    }

    /// Load settings from the YAML file
    /// If custom_path is provided, uses that path; otherwise uses the default settings path
    pub fn load(custom_path: Option<&str>) -> Self {
        let path = match custom_path {
            Some(p) => {
                info!("Using custom settings path: {}", p);
                PathBuf::from(p)
            }
            None => Self::settings_path(),
        };

        if !path.exists() {
            info!("Settings file not found at {:?}, using defaults", path);
            return Self::default();
        }

        match fs::read_to_string(&path) {
            Ok(contents) => match Self::from_yaml(&contents) {
                Ok(settings) => {
                    info!("Loaded settings from {:?}", path);
                    debug!("Settings: server={}, poll={}ms, timeout={}s, ui_from_server={}",
                        settings.server_url, settings.poll_interval_ms,
                        settings.request_timeout_secs, settings.ui_from_server);
                    settings
                }
                Err(e) => {
                    error!("Failed to parse settings file at {:?}: {}", path, e);
                    warn!("Using default settings");
                    Self::default()
                }
            },
            Err(e) => {
                error!("Failed to read settings file at {:?}: {}", path, e);
                warn!("Using default settings");
                Self::default()
            }
        }
    }

    pub fn from_yaml(contents: &str) -> Result<Self, serde_yaml::Error> {
        // An empty document deserializes to unit, not to an all-defaults map
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(contents)
    }

    /// Save settings to the YAML file while preserving comments
    pub fn save(&self, custom_path: Option<&str>) -> Result<PathBuf, String> {
        let path = custom_path.map(PathBuf::from).unwrap_or_else(Self::settings_path);

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)
                    .map_err(|e| format!("Failed to create settings directory: {}", e))?;
            }
        }

        if path.exists() {
            match fs::read_to_string(&path) {
                Ok(contents) => {
                    let updated = self.update_yaml_values(&contents);
                    fs::write(&path, updated)
                        .map_err(|e| format!("Failed to write settings file: {}", e))?;
                    info!("Saved settings to {:?} (comments preserved)", path);
                    return Ok(path);
                }
                Err(e) => {
                    warn!("Failed to read existing settings file for comment preservation: {}", e);
                }
            }
        }

        fs::write(&path, self.to_yaml_with_comments())
            .map_err(|e| format!("Failed to write settings file: {}", e))?;

        info!("Saved settings to {:?}", path);
        Ok(path)
    }

    /// Update YAML values while preserving existing comments and structure
    fn update_yaml_values(&self, yaml_content: &str) -> String {
        let mut result = yaml_content.to_string();

        result = Self::replace_yaml_value(&result, "server_url", &format!("\"{}\"", self.server_url));
        result = Self::replace_yaml_value(&result, "poll_interval_ms", &self.poll_interval_ms.to_string());
        result = Self::replace_yaml_value(&result, "animation_loop_ms", &self.animation_loop_ms.to_string());
        result = Self::replace_yaml_value(&result, "frame_interval_ms", &self.frame_interval_ms.to_string());
        result = Self::replace_yaml_value(&result, "request_timeout_secs", &self.request_timeout_secs.to_string());
        result = Self::replace_yaml_value(&result, "ui_from_server", &self.ui_from_server.to_string());
        result = Self::replace_yaml_value(&result, "sort_by_confidence", &self.sort_by_confidence.to_string());
        result = Self::replace_yaml_value(&result, "pinned_tabs", &self.pinned_tabs_yaml());

        result
    }

    /// Replace a YAML key's value while preserving the rest of the line
    fn replace_yaml_value(yaml: &str, key: &str, new_value: &str) -> String {
        let pattern = format!(r"(?m)^(\s*{}\s*:\s*).*$", regex::escape(key));
        let replacement = format!("${{1}}{}", new_value);

        match regex::Regex::new(&pattern) {
            Ok(re) => re.replace_all(yaml, replacement.as_str()).to_string(),
            Err(e) => {
                warn!("Failed to create regex for key '{}': {}", key, e);
                yaml.to_string()
            }
        }
    }

    fn pinned_tabs_yaml(&self) -> String {
        let quoted: Vec<String> = self.pinned_tabs.iter().map(|t| format!("\"{}\"", t)).collect();
        format!("[{}]", quoted.join(", "))
    }

    /// Generate YAML content with comments for new files
    pub fn to_yaml_with_comments(&self) -> String {
        format!(
            r#"# Inference Explorer Settings
# This file is loaded automatically when the explorer starts.
# Settings specified here will override the default values.

# Base URL of the inference server
server_url: "{}"

# Interval between running-module polls (milliseconds)
poll_interval_ms: {}

# Time for one full rotation of the animated bounding box frame (milliseconds)
animation_loop_ms: {}

# Redraw period of the animated frame (milliseconds, 50 is a relaxed fallback)
frame_interval_ms: {}

# Client-side timeout for processing requests (seconds)
request_timeout_secs: {}

# Module UI source
# - true: module cards are composed from UI fragments supplied by the server
# - false: static cards are shown or hidden from the module status list
ui_from_server: {}

# Sort predictions by descending confidence in summaries and overlays
sort_by_confidence: {}

# Tab categories that stay visible even when no running module uses them
pinned_tabs: {}
"#,
            self.server_url,
            self.poll_interval_ms,
            self.animation_loop_ms,
            self.frame_interval_ms,
            self.request_timeout_secs,
            self.ui_from_server,
            self.sort_by_confidence,
            self.pinned_tabs_yaml(),
        )
    }
}
