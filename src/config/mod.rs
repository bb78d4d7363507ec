// SPDX-License-Identifier: MPL-2.0
//! This module handles the engine's configuration, including loading and saving
//! user preferences to a `settings.toml` file.
//!
//! A missing or malformed file falls back to defaults rather than erroring, so
//! a bad edit never locks the user out of their watched threads.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_FILE: &str = "settings.toml";
const APP_NAME: &str = "ThreadWatch";

/// Network gate for automatic full-resolution media loads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutoLoadMode {
    /// Load on any connection.
    All,
    /// Load only on unmetered (wifi) connections.
    Wifi,
    /// Never load automatically.
    None,
}

/// The connection kind currently in use, reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkKind {
    Wifi,
    Metered,
}

impl AutoLoadMode {
    /// Whether a load should proceed on the given connection.
    #[must_use]
    pub fn allows(self, network: NetworkKind) -> bool {
        match self {
            AutoLoadMode::All => true,
            AutoLoadMode::Wifi => network == NetworkKind::Wifi,
            AutoLoadMode::None => false,
        }
    }
}

/// User preferences recognized by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Master switch for thread watching.
    pub watch_enabled: bool,
    /// Notify about quotes of the user's own posts only, not every new post.
    pub notify_quotes_only: bool,
    /// Make sound only for quotes even when notifying about all posts.
    pub sound_quotes_only: bool,
    /// Allow the heads-up ("peek") notification presentation.
    pub watch_peek: bool,
    /// Reveal spoilered images without a tap.
    pub reveal_image_spoilers: bool,
    /// Network gate for automatic image loads.
    pub image_auto_load: AutoLoadMode,
    /// Network gate for automatic video loads, checked in addition to the
    /// image gate.
    pub video_auto_load: AutoLoadMode,
    /// Seconds between watcher polls while watching is active.
    pub poll_interval_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            watch_enabled: true,
            notify_quotes_only: false,
            sound_quotes_only: false,
            watch_peek: true,
            reveal_image_spoilers: false,
            image_auto_load: AutoLoadMode::Wifi,
            video_auto_load: AutoLoadMode::Wifi,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
        }
    }
}

pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;

fn get_default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|mut path| {
        path.push(APP_NAME);
        path.push(CONFIG_FILE);
        path
    })
}

pub fn load() -> Result<Settings> {
    if let Some(path) = get_default_config_path() {
        if path.exists() {
            return load_from_path(&path);
        }
    }
    Ok(Settings::default())
}

pub fn save(settings: &Settings) -> Result<()> {
    if let Some(path) = get_default_config_path() {
        return save_to_path(settings, &path);
    }
    Ok(())
}

pub fn load_from_path(path: &Path) -> Result<Settings> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content).unwrap_or_default())
}

pub fn save_to_path(settings: &Settings, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(settings)?;
    fs::write(path, content)?;
    Ok(())
}
