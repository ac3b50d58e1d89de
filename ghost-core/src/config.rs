//! Settings
//!
//! Settings are stored as JSON. Every field has a default so older or
//! hand-edited files load; out-of-range values are corrected on load with a
//! warning rather than rejected.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

const APP_DIR: &str = "ghost-replay";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to access settings file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid settings file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// How ghost drift is corrected
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncType {
    /// Snap when drift exceeds `sync_distance`, otherwise steer with velocity
    #[default]
    Distance,
    /// Snap every tick
    Constant,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForceLights {
    /// Use recorded light state
    #[default]
    Default,
    ForceOff,
    ForceOn,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForceRoof {
    /// Use recorded roof state
    #[default]
    Default,
    ForceDown,
    ForceUp,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub main: MainSettings,
    pub record: RecordSettings,
    pub replay: ReplaySettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MainSettings {
    /// Show a map marker on active ghosts
    pub ghost_blips: bool,
    pub notify_laps: bool,
    pub debug: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordSettings {
    /// Minimum interval between recorded nodes; 0 records every tick
    pub delta_millis: u64,
    /// Write compact, compressed replay files
    pub reduce_file_size: bool,
    pub optional: OptionalChannels,
}

/// Which sparse channels the recorder captures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptionalChannels {
    pub lights: bool,
    pub indicators: bool,
    pub siren: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplaySettings {
    /// Delay applied to ghost replay time
    pub offset_seconds: f64,
    /// 0 (invisible) to 100 (opaque)
    pub vehicle_alpha: u8,
    pub force_lights: ForceLights,
    pub force_roof: ForceRoof,
    pub scrub_distance_seconds: f64,
    pub fallback_model: String,
    pub force_fallback_model: bool,
    pub zero_velocity_on_pause: bool,
    pub sync_type: SyncType,
    /// Drift in meters above which the ghost is snapped (Distance sync)
    pub sync_distance: f32,
    /// Gain applied to drift when steering via velocity (Distance sync)
    pub sync_compensation: f32,
    pub enable_drivers: bool,
    pub driver_models: Vec<String>,
    pub enable_collision: bool,
}

impl Default for MainSettings {
    fn default() -> Self {
        Self {
            ghost_blips: true,
            notify_laps: true,
            debug: false,
        }
    }
}

impl Default for OptionalChannels {
    fn default() -> Self {
        Self {
            lights: true,
            indicators: true,
            siren: true,
        }
    }
}

impl Default for ReplaySettings {
    fn default() -> Self {
        Self {
            offset_seconds: 0.0,
            vehicle_alpha: 100,
            force_lights: ForceLights::Default,
            force_roof: ForceRoof::Default,
            scrub_distance_seconds: 1.0,
            fallback_model: "sultan".to_string(),
            force_fallback_model: false,
            zero_velocity_on_pause: true,
            sync_type: SyncType::Distance,
            sync_distance: 5.0,
            sync_compensation: 0.1,
            enable_drivers: false,
            driver_models: Vec::new(),
            enable_collision: false,
        }
    }
}

impl Settings {
    /// Default settings file location
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(APP_DIR).join("settings.json"))
    }

    /// Default replay directory
    pub fn replays_dir() -> Option<PathBuf> {
        dirs::data_dir().map(|d| d.join(APP_DIR).join("replays"))
    }

    /// Default track directory
    pub fn tracks_dir() -> Option<PathBuf> {
        dirs::data_dir().map(|d| d.join(APP_DIR).join("tracks"))
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut settings: Settings =
            serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        settings.sanitize();
        info!("Settings loaded from {}", path.display());
        Ok(settings)
    }

    /// Load settings, falling back to defaults when the file is missing or broken.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(settings) => settings,
            Err(ConfigError::Io { source, .. }) if source.kind() == std::io::ErrorKind::NotFound => {
                info!("No settings at {}, using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                warn!("{}, using defaults", e);
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let text = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, text).map_err(io_err)
    }

    /// Correct out-of-range values in place
    pub fn sanitize(&mut self) {
        let defaults = ReplaySettings::default();
        let replay = &mut self.replay;

        if replay.vehicle_alpha > 100 {
            warn!(
                "[Settings] replay.vehicle_alpha: Invalid value '{}', using 100",
                replay.vehicle_alpha
            );
            replay.vehicle_alpha = 100;
        }

        if !replay.sync_distance.is_finite() || replay.sync_distance < 0.0 {
            warn!(
                "[Settings] replay.sync_distance: Invalid value '{}', using {}",
                replay.sync_distance, defaults.sync_distance
            );
            replay.sync_distance = defaults.sync_distance;
        }

        if !replay.sync_compensation.is_finite() || replay.sync_compensation < 0.0 {
            warn!(
                "[Settings] replay.sync_compensation: Invalid value '{}', using {}",
                replay.sync_compensation, defaults.sync_compensation
            );
            replay.sync_compensation = defaults.sync_compensation;
        }

        if !replay.offset_seconds.is_finite() {
            warn!("[Settings] replay.offset_seconds: Invalid value, using 0");
            replay.offset_seconds = 0.0;
        }

        if !replay.scrub_distance_seconds.is_finite() || replay.scrub_distance_seconds <= 0.0 {
            warn!(
                "[Settings] replay.scrub_distance_seconds: Invalid value '{}', using {}",
                replay.scrub_distance_seconds, defaults.scrub_distance_seconds
            );
            replay.scrub_distance_seconds = defaults.scrub_distance_seconds;
        }

        if replay.fallback_model.trim().is_empty() {
            warn!(
                "[Settings] replay.fallback_model: empty, using {}",
                defaults.fallback_model
            );
            replay.fallback_model = defaults.fallback_model;
        }
    }
}
