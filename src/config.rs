use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::{klog_debug, Error, Result};

/// Default cap on parsed titles, in characters.
pub const DEFAULT_TITLE_CAP: usize = 80;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Directory holding the state snapshot. Defaults to ~/.kanri.
    pub data_dir: Option<String>,
    /// Maximum length of titles produced by the requirement parser.
    pub title_cap: Option<usize>,
}

impl Config {
    pub fn kanri_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".kanri"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::kanri_dir()?.join("kanri.toml"))
    }

    /// Path of the JSON state snapshot, honoring a configured data_dir.
    pub fn state_path(&self) -> Result<PathBuf> {
        let dir = match &self.data_dir {
            Some(dir) => expand_tilde(dir),
            None => Self::kanri_dir()?,
        };
        Ok(dir.join("state.json"))
    }

    pub fn effective_title_cap(&self) -> usize {
        self.title_cap.unwrap_or(DEFAULT_TITLE_CAP)
    }

    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        klog_debug!("Config::load path={}", path.display());
        if !path.exists() {
            klog_debug!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(&path)?)?;
        klog_debug!(
            "Config loaded: data_dir={:?}, title_cap={:?}",
            config.data_dir,
            config.title_cap
        );
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let kanri_dir = Self::kanri_dir()?;
        klog_debug!("Config::save kanri_dir={}", kanri_dir.display());
        if !kanri_dir.exists() {
            fs::create_dir_all(&kanri_dir)?;
        }
        let path = Self::config_path()?;
        fs::write(&path, toml::to_string_pretty(self)?)?;
        klog_debug!("Config saved to {}", path.display());
        Ok(())
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        let kanri_dir = Self::kanri_dir()?;
        if !kanri_dir.exists() {
            klog_debug!("Creating kanri directory: {}", kanri_dir.display());
            fs::create_dir_all(&kanri_dir)?;
        }
        if let Some(parent) = self.state_path()?.parent() {
            if !parent.exists() {
                klog_debug!("Creating data directory: {}", parent.display());
                fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
