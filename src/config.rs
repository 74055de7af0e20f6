//! Configuration system using TOML files.
//!
//! Config is stored in the OS-standard config directory:
//! - Windows: %APPDATA%\playdeck\config.toml
//! - macOS: ~/Library/Application Support/playdeck/config.toml
//! - Linux: ~/.config/playdeck/config.toml
//!
//! The config file is human-readable and editable. Settings are loaded
//! at startup; the backend mode is fixed for the whole session once the
//! engine has been constructed from it.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Backend selection and remote renderer address
    pub backend: BackendConfig,

    /// Playback accounting thresholds and volume
    pub playback: PlaybackConfig,

    /// History/queue database location
    pub library: LibraryConfig,
}

/// Backend selection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// "local" drives the in-process pipeline, "remote" a network renderer
    pub mode: String,

    /// Base URL of the remote renderer (remote mode only)
    pub remote_url: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            mode: "local".to_string(),
            remote_url: "http://127.0.0.1:8710".to_string(),
        }
    }
}

/// Playback accounting settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Accumulated played time before a track counts as played (ms)
    pub played_threshold_ms: u64,

    /// Window before track end inside which reaching the end counts
    /// as played regardless of accumulated time (ms)
    pub near_end_window_ms: u64,

    /// Progress ticks moving less than this are treated as noise (ms)
    pub jitter_threshold_ms: u64,

    /// Last volume level (0 - 100)
    pub volume: u8,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            played_threshold_ms: 100_000,
            near_end_window_ms: 5_000,
            jitter_threshold_ms: 250,
            volume: 70,
        }
    }
}

/// History database settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    /// Path to the history/queue SQLite database (empty = default location)
    pub db_path: Option<PathBuf>,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self { db_path: None }
    }
}

// ============================================================================
// Config File Operations
// ============================================================================

/// Get the config directory path
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("playdeck"))
}

/// Get the full path to the config file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}

/// Default path for the history database, next to the config file.
pub fn default_db_path() -> PathBuf {
    config_dir()
        .map(|d| d.join("history.db"))
        .unwrap_or_else(|| PathBuf::from("playdeck.db"))
}

impl Config {
    /// Load config from disk, or return defaults if missing/invalid.
    pub fn load() -> Self {
        let Some(path) = config_path() else {
            tracing::warn!("Could not determine config directory, using defaults");
            return Self::default();
        };

        match std::fs::read_to_string(&path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("Failed to parse config file: {}, using defaults", e);
                    Self::default()
                }
            },
            Err(_) => Self::default(), // File doesn't exist yet
        }
    }

    /// Save config to disk.
    pub fn save(&self) -> crate::error::Result<()> {
        let path = config_path()
            .ok_or_else(|| crate::error::Error::config("no config directory available"))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| crate::error::Error::config(format!("serialize failed: {e}")))?;
        std::fs::write(&path, contents)?;
        Ok(())
    }

    /// Resolved history database path.
    pub fn db_path(&self) -> PathBuf {
        self.library
            .db_path
            .clone()
            .unwrap_or_else(default_db_path)
    }
}
