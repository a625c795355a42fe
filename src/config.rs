use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::app_dirs::AppDirs;
use crate::error::Result;
use crate::focal::HighlightStrategy;
use crate::pacing::{RateBounds, DEFAULT_WPM};
use crate::session::SignificancePolicy;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub wpm: u32,
    pub strategy: HighlightStrategy,
    pub rate_bounds: RateBounds,
    /// tokens skipped by the jump keys
    pub seek_jump: usize,
    /// tokens skipped by the step keys
    pub seek_step: usize,
    pub significance: SignificancePolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            wpm: DEFAULT_WPM,
            strategy: HighlightStrategy::default(),
            rate_bounds: RateBounds::default(),
            seek_jump: 10,
            seek_step: 5,
            significance: SignificancePolicy::default(),
        }
    }
}

impl Config {
    /// Apply command line overrides on top of the stored values
    pub fn with_overrides(mut self, wpm: Option<u32>, strategy: Option<HighlightStrategy>) -> Self {
        if let Some(wpm) = wpm {
            self.wpm = wpm;
        }
        if let Some(strategy) = strategy {
            self.strategy = strategy;
        }
        self.rate_bounds = self.rate_bounds.sanitized();
        self.wpm = self.rate_bounds.clamp(self.wpm);
        self
    }
}

pub trait ConfigStore {
    fn load(&self) -> Config;
    fn save(&self, cfg: &Config) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let path = AppDirs::config_path().unwrap_or_else(|| PathBuf::from("flick_config.json"));
        Self { path }
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FileConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> Config {
        let Ok(bytes) = fs::read(&self.path) else {
            return Config::default();
        };
        match serde_json::from_slice::<Config>(&bytes) {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "ignoring unreadable config");
                Config::default()
            }
        }
    }

    fn save(&self, cfg: &Config) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(cfg)?;
        fs::write(&self.path, data)?;
        Ok(())
    }
}
