use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::prefs::{Preferences, TomlPreferences};

/// Preference names, `section.field` of the config file
pub mod pref {
    pub const DEBUG_LOGGING: &str = "general.debug_logging";

    pub const AI_RENAMING_ENABLED: &str = "renaming.enabled";
    pub const API_KEY: &str = "renaming.api_key";
    pub const API_URL: &str = "renaming.api_url";
    pub const MODEL: &str = "renaming.model";
    pub const MAX_FILENAME_LENGTH: &str = "renaming.max_filename_length";
    pub const MAX_FILE_SIZE: &str = "renaming.max_file_size";
    pub const FALLBACK_RENAMING: &str = "renaming.fallback_enabled";
    pub const REQUEST_TIMEOUT_SECS: &str = "renaming.request_timeout_secs";
    pub const RENAME_START_DELAY_MS: &str = "renaming.start_delay_ms";

    pub const AUTOHIDE_DISABLED: &str = "pods.autohide_disabled";
    pub const AUTOHIDE_DELAY_MS: &str = "pods.autohide_delay_ms";
    pub const INTERACTION_GRACE_MS: &str = "pods.interaction_grace_ms";
    pub const PROGRESS_THROTTLE_MS: &str = "pods.progress_throttle_ms";
    pub const STABLE_FOCUS: &str = "pods.stable_focus";
    pub const RESHOW_WINDOW_HOURS: &str = "pods.reshow_window_hours";

    pub const CONTAINER_WIDTH: &str = "layout.container_width";
    pub const POD_WIDTH: &str = "layout.pod_width";
    pub const POD_OVERLAP: &str = "layout.pod_overlap";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub general: GeneralSettings,

    #[serde(default)]
    pub renaming: RenamingSettings,

    #[serde(default)]
    pub pods: PodSettings,

    #[serde(default)]
    pub layout: LayoutSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneralSettings {
    #[serde(default)]
    pub debug_logging: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenamingSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_key: String,

    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_max_filename_length")]
    pub max_filename_length: usize,

    /// Files above this size (bytes) are never sent for analysis
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    #[serde(default)]
    pub fallback_enabled: bool,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_start_delay")]
    pub start_delay_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodSettings {
    #[serde(default)]
    pub autohide_disabled: bool,

    #[serde(default = "default_autohide_delay")]
    pub autohide_delay_ms: u64,

    #[serde(default = "default_interaction_grace")]
    pub interaction_grace_ms: u64,

    #[serde(default = "default_progress_throttle")]
    pub progress_throttle_ms: u64,

    #[serde(default = "default_true")]
    pub stable_focus: bool,

    #[serde(default = "default_reshow_window")]
    pub reshow_window_hours: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutSettings {
    #[serde(default = "default_container_width")]
    pub container_width: u32,

    #[serde(default = "default_pod_width")]
    pub pod_width: u32,

    #[serde(default = "default_pod_overlap")]
    pub pod_overlap: u32,
}

impl Settings {
    /// Read every setting through the preference gateway
    pub fn from_prefs(prefs: &Preferences) -> Self {
        let defaults = Settings::default();

        let settings = Self {
            general: GeneralSettings {
                debug_logging: prefs
                    .get_bool(pref::DEBUG_LOGGING, defaults.general.debug_logging),
            },
            renaming: RenamingSettings {
                enabled: prefs.get_bool(pref::AI_RENAMING_ENABLED, defaults.renaming.enabled),
                api_key: prefs.get_string(pref::API_KEY, &defaults.renaming.api_key),
                api_url: prefs.get_string(pref::API_URL, &defaults.renaming.api_url),
                model: prefs.get_string(pref::MODEL, &defaults.renaming.model),
                max_filename_length: prefs.get_u64(
                    pref::MAX_FILENAME_LENGTH,
                    defaults.renaming.max_filename_length as u64,
                ) as usize,
                max_file_size: prefs.get_u64(pref::MAX_FILE_SIZE, defaults.renaming.max_file_size),
                fallback_enabled: prefs
                    .get_bool(pref::FALLBACK_RENAMING, defaults.renaming.fallback_enabled),
                request_timeout_secs: prefs.get_u64(
                    pref::REQUEST_TIMEOUT_SECS,
                    defaults.renaming.request_timeout_secs,
                ),
                start_delay_ms: prefs
                    .get_u64(pref::RENAME_START_DELAY_MS, defaults.renaming.start_delay_ms),
            },
            pods: PodSettings {
                autohide_disabled: prefs
                    .get_bool(pref::AUTOHIDE_DISABLED, defaults.pods.autohide_disabled),
                autohide_delay_ms: prefs
                    .get_u64(pref::AUTOHIDE_DELAY_MS, defaults.pods.autohide_delay_ms),
                interaction_grace_ms: prefs
                    .get_u64(pref::INTERACTION_GRACE_MS, defaults.pods.interaction_grace_ms),
                progress_throttle_ms: prefs
                    .get_u64(pref::PROGRESS_THROTTLE_MS, defaults.pods.progress_throttle_ms),
                stable_focus: prefs.get_bool(pref::STABLE_FOCUS, defaults.pods.stable_focus),
                reshow_window_hours: prefs
                    .get_u64(pref::RESHOW_WINDOW_HOURS, defaults.pods.reshow_window_hours),
            },
            layout: LayoutSettings {
                container_width: prefs
                    .get_u32(pref::CONTAINER_WIDTH, defaults.layout.container_width),
                pod_width: prefs.get_u32(pref::POD_WIDTH, defaults.layout.pod_width),
                pod_overlap: prefs.get_u32(pref::POD_OVERLAP, defaults.layout.pod_overlap),
            },
        };

        debug!(
            "Settings resolved (ai renaming: {}, stable focus: {}, autohide: {}ms)",
            settings.renaming.enabled, settings.pods.stable_focus, settings.pods.autohide_delay_ms
        );
        settings
    }

    /// Open the config file as a preference store, writing defaults on first run
    pub fn load_preferences() -> Result<Preferences> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            let store = TomlPreferences::load(&config_path)
                .with_context(|| format!("Failed to load config file {:?}", config_path))?;
            info!("Config loaded successfully");
            Ok(Preferences::new(Arc::new(store)))
        } else {
            info!("No config file found, using defaults");
            Settings::default().save()?;
            Ok(Preferences::defaults())
        }
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = self.to_toml()?;
        fs::write(&config_path, contents).context("Failed to write config file")?;

        debug!("Config saved to {:?}", config_path);
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("Failed to get config directory")?;
        Ok(config_dir.join("tidy-downloads").join("config.toml"))
    }

    /// AI renaming needs both the switch and a key
    pub fn ai_renaming_configured(&self) -> bool {
        self.renaming.enabled && !self.renaming.api_key.trim().is_empty()
    }

    pub fn autohide_delay(&self) -> Duration {
        Duration::from_millis(self.pods.autohide_delay_ms)
    }

    pub fn interaction_grace(&self) -> Duration {
        Duration::from_millis(self.pods.interaction_grace_ms)
    }

    pub fn progress_throttle(&self) -> Duration {
        Duration::from_millis(self.pods.progress_throttle_ms)
    }

    pub fn rename_start_delay(&self) -> Duration {
        Duration::from_millis(self.renaming.start_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.renaming.request_timeout_secs)
    }

    pub fn reshow_window(&self) -> chrono::Duration {
        chrono::Duration::hours(self.pods.reshow_window_hours.min(i64::MAX as u64 / 3600) as i64)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            general: GeneralSettings::default(),
            renaming: RenamingSettings::default(),
            pods: PodSettings::default(),
            layout: LayoutSettings::default(),
        }
    }
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            debug_logging: false,
        }
    }
}

impl Default for RenamingSettings {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            api_key: String::new(),
            api_url: default_api_url(),
            model: default_model(),
            max_filename_length: default_max_filename_length(),
            max_file_size: default_max_file_size(),
            fallback_enabled: false,
            request_timeout_secs: default_request_timeout(),
            start_delay_ms: default_start_delay(),
        }
    }
}

impl Default for PodSettings {
    fn default() -> Self {
        Self {
            autohide_disabled: false,
            autohide_delay_ms: default_autohide_delay(),
            interaction_grace_ms: default_interaction_grace(),
            progress_throttle_ms: default_progress_throttle(),
            stable_focus: default_true(),
            reshow_window_hours: default_reshow_window(),
        }
    }
}

impl Default for LayoutSettings {
    fn default() -> Self {
        Self {
            container_width: default_container_width(),
            pod_width: default_pod_width(),
            pod_overlap: default_pod_overlap(),
        }
    }
}

// Default value functions
fn default_true() -> bool { true }
fn default_api_url() -> String { "https://api.mistral.ai/v1/chat/completions".to_string() }
fn default_model() -> String { "pixtral-large-latest".to_string() }
fn default_max_filename_length() -> usize { 70 }
fn default_max_file_size() -> u64 { 50 * 1024 * 1024 }
fn default_request_timeout() -> u64 { 30 }
fn default_start_delay() -> u64 { 1500 }
fn default_autohide_delay() -> u64 { 15_000 }
fn default_interaction_grace() -> u64 { 5_000 }
fn default_progress_throttle() -> u64 { 100 }
fn default_reshow_window() -> u64 { 24 }
fn default_container_width() -> u32 { 300 }
fn default_pod_width() -> u32 { 56 }
fn default_pod_overlap() -> u32 { 40 }
