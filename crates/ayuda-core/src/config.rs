use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use anyhow::{Result, anyhow};

use crate::ai::ClientSettings;

/// User configuration; every field is an optional override of a built-in default.
///
/// The API key lives in storage, not here (see [`crate::keystore`]).
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speech_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translate_language: Option<String>,
    /// Command used to play synthesized speech, e.g. `aplay` or `afplay`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_player: Option<String>,
    /// Override for the built-in emergency directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory_path: Option<PathBuf>,
    /// Override for the built-in scenario guides
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guides_path: Option<PathBuf>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;
        Self::load_from(&config_path)
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(config_path)?;
        let config: Config = serde_json::from_str(&config_content)
            .map_err(|e| anyhow!("Invalid config file {:?}: {}", config_path, e))?;
        Ok(config)
    }

    /// Resolve overrides against the built-in client defaults
    pub fn client_settings(&self) -> ClientSettings {
        let defaults = ClientSettings::default();
        ClientSettings {
            base_url: self.api_base_url.clone().unwrap_or(defaults.base_url),
            chat_model: self.chat_model.clone().unwrap_or(defaults.chat_model),
            speech_model: self.speech_model.clone().unwrap_or(defaults.speech_model),
            image_model: self.image_model.clone().unwrap_or(defaults.image_model),
            voice: self.voice.clone().unwrap_or(defaults.voice),
        }
    }

    pub fn translate_language(&self) -> &str {
        self.translate_language.as_deref().unwrap_or(DEFAULT_TRANSLATE_LANGUAGE)
    }

    pub fn get_config_path() -> Result<PathBuf> {
        Ok(Self::get_config_dir()?.join("config.json"))
    }

    pub fn get_config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("ayuda-gt"))
    }

    /// Scratch directory for speech clips, generated images and the TUI log
    pub fn get_cache_dir() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("ayuda-gt")
    }
}

/// Indigenous language offered by the translate action
pub const DEFAULT_TRANSLATE_LANGUAGE: &str = "K'iche'";
