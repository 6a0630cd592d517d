use log::warn;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::app_dirs::AppDirs;
use crate::leaderboard;
use crate::session::{TestMode, DEFAULT_IDLE_TIMEOUT_SECS};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub language: String,
    pub mode: TestMode,
    /// Seconds in time mode, words in word mode
    pub limit: u32,
    pub idle_timeout_secs: u64,
    pub leaderboard_limit: usize,
    /// Signing key for bearer tokens; generated on first run
    pub token_secret: Option<String>,
    /// Bearer token of the logged-in user
    pub token: Option<String>,
    pub db_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            mode: TestMode::Time,
            limit: 15,
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT_SECS,
            leaderboard_limit: leaderboard::DEFAULT_LIMIT,
            token_secret: None,
            token: None,
            db_path: None,
        }
    }
}

impl Config {
    pub fn is_logged_in(&self) -> bool {
        self.token.is_some()
    }

    pub fn db_path(&self) -> Option<PathBuf> {
        self.db_path.clone().or_else(AppDirs::db_path)
    }
}

pub trait ConfigStore {
    fn load(&self) -> Config;
    fn save(&self, cfg: &Config) -> std::io::Result<()>;
}

#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    pub fn new() -> Self {
        let path = AppDirs::config_path().unwrap_or_else(|| PathBuf::from("showspeed_config.json"));
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

        serde_json::from_slice::<Config>(&bytes).unwrap_or_else(|err| {
            warn!("ignoring unreadable config {}: {err}", self.path.display());
            Config::default()
        })
    }

    fn save(&self, cfg: &Config) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(cfg)?;
        fs::write(&self.path, data)
    }
}
