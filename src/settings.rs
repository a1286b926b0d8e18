use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, PoisonError, RwLock};

pub const CURRENT_VERSION: u32 = 1;
const SETTINGS_FILENAME: &str = "config.yaml";
const APP_NAME: &str = "flipbook";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default = "default_true")]
    pub preload_enabled: bool,

    /// Pages rendered concurrently per preload batch
    #[serde(default = "default_preload_batch_size")]
    pub preload_batch_size: usize,

    #[serde(default = "default_preload_batch_delay_ms")]
    pub preload_batch_delay_ms: u64,

    /// Points-to-pixels multiplier before the device pixel ratio is applied
    #[serde(default = "default_render_base_scale")]
    pub render_base_scale: f32,

    #[serde(default = "default_max_device_pixel_ratio")]
    pub max_device_pixel_ratio: f32,

    /// Rendered pages kept in memory
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    #[serde(default = "default_render_workers")]
    pub render_workers: usize,

    /// Width / height used when a document reports no usable page size
    #[serde(default = "default_fallback_aspect_ratio")]
    pub fallback_aspect_ratio: f32,
}

fn default_true() -> bool {
    true
}

fn default_version() -> u32 {
    CURRENT_VERSION
}

fn default_preload_batch_size() -> usize {
    2
}

fn default_preload_batch_delay_ms() -> u64 {
    18
}

fn default_render_base_scale() -> f32 {
    1.6
}

fn default_max_device_pixel_ratio() -> f32 {
    2.0
}

fn default_cache_capacity() -> usize {
    512
}

fn default_render_workers() -> usize {
    2
}

fn default_fallback_aspect_ratio() -> f32 {
    0.77
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            preload_enabled: true,
            preload_batch_size: default_preload_batch_size(),
            preload_batch_delay_ms: default_preload_batch_delay_ms(),
            render_base_scale: default_render_base_scale(),
            max_device_pixel_ratio: default_max_device_pixel_ratio(),
            cache_capacity: default_cache_capacity(),
            render_workers: default_render_workers(),
            fallback_aspect_ratio: default_fallback_aspect_ratio(),
        }
    }
}

impl Settings {
    /// Raise counts that must be at least one
    fn normalize(&mut self) {
        if self.preload_batch_size == 0 {
            warn!("preload_batch_size must be at least 1, using 1");
            self.preload_batch_size = 1;
        }
        if self.cache_capacity == 0 {
            warn!("cache_capacity must be at least 1, using 1");
            self.cache_capacity = 1;
        }
        if self.render_workers == 0 {
            warn!("render_workers must be at least 1, using 1");
            self.render_workers = 1;
        }
    }
}

static SETTINGS: LazyLock<RwLock<Settings>> = LazyLock::new(|| RwLock::new(Settings::default()));

/// `<config_dir>/flipbook/config.yaml`
pub fn preferred_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|config| config.join(APP_NAME).join(SETTINGS_FILENAME))
}

pub fn load_settings() {
    let Some(path) = preferred_config_path() else {
        warn!("Could not determine config directory, using default settings");
        return;
    };
    load_settings_from_path(&path);
}

/// Load settings from `path`, creating it with defaults if it does not exist.
/// Unreadable or malformed files leave the current settings untouched.
pub fn load_settings_from_path(path: &Path) {
    if !path.exists() {
        info!("Settings file not found, creating with defaults at {path:?}");
        save_settings_to_path(&current_settings(), path);
        return;
    }

    match fs::read_to_string(path) {
        Ok(content) => match serde_yaml::from_str::<Settings>(&content) {
            Ok(mut settings) => {
                debug!("Loaded settings from {path:?}");
                settings.normalize();

                if settings.version < CURRENT_VERSION {
                    migrate_settings(&mut settings);
                    save_settings_to_path(&settings, path);
                }

                *SETTINGS.write().unwrap_or_else(PoisonError::into_inner) = settings;
            }
            Err(e) => {
                error!("Failed to parse settings file {path:?}: {e}");
            }
        },
        Err(e) => {
            error!("Failed to read settings file {path:?}: {e}");
        }
    }
}

fn migrate_settings(settings: &mut Settings) {
    info!(
        "Migrating settings from v{} to v{}",
        settings.version, CURRENT_VERSION
    );
    settings.version = CURRENT_VERSION;
}

pub fn save_settings_to_path(settings: &Settings, path: &Path) {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            if let Err(e) = fs::create_dir_all(parent) {
                error!("Failed to create config directory {parent:?}: {e}");
                return;
            }
        }
    }

    let content = generate_settings_yaml(settings);

    match fs::write(path, content) {
        Ok(()) => debug!("Saved settings to {path:?}"),
        Err(e) => error!("Failed to save settings to {path:?}: {e}"),
    }
}

fn generate_settings_yaml(settings: &Settings) -> String {
    let mut content = String::new();

    content.push_str(&format!("version: {}\n", settings.version));
    content.push('\n');
    content.push_str("# Render every page in the background after a document opens\n");
    content.push_str(&format!("preload_enabled: {}\n", settings.preload_enabled));
    content.push_str(&format!(
        "preload_batch_size: {}\n",
        settings.preload_batch_size
    ));
    content.push_str(&format!(
        "preload_batch_delay_ms: {}\n",
        settings.preload_batch_delay_ms
    ));
    content.push('\n');
    content.push_str("# Render scale = render_base_scale * clamp(device pixel ratio, 1, max_device_pixel_ratio)\n");
    content.push_str(&format!(
        "render_base_scale: {:?}\n",
        settings.render_base_scale
    ));
    content.push_str(&format!(
        "max_device_pixel_ratio: {:?}\n",
        settings.max_device_pixel_ratio
    ));
    content.push('\n');
    content.push_str(&format!("cache_capacity: {}\n", settings.cache_capacity));
    content.push_str(&format!("render_workers: {}\n", settings.render_workers));
    content.push_str(&format!(
        "fallback_aspect_ratio: {:?}\n",
        settings.fallback_aspect_ratio
    ));

    content
}

// Public API for accessing settings

/// Snapshot of the process-wide settings
pub fn current_settings() -> Settings {
    SETTINGS
        .read()
        .map(|s| s.clone())
        .unwrap_or_default()
}

pub fn set_settings(settings: Settings) {
    *SETTINGS.write().unwrap_or_else(PoisonError::into_inner) = settings;
}

pub fn set_preload_enabled(enabled: bool) {
    if let Ok(mut settings) = SETTINGS.write() {
        settings.preload_enabled = enabled;
    }
}
