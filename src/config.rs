use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;
use crate::scheduler::SchedulerParams;

pub const CONFIG_ENV: &str = "NEUROLEARN_CONFIG";
pub const DB_ENV: &str = "NEUROLEARN_DB";
const APP_DIR: &str = "neurolearn";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: Option<PathBuf>,
    pub scheduler: SchedulerParams,
}

impl Config {
    /// Load from `$NEUROLEARN_CONFIG`, else the per-user config file if present.
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = env::var(CONFIG_ENV) {
            return Self::load_from(path);
        }
        match default_config_path() {
            Some(path) if path.exists() => Self::load_from(path),
            _ => Ok(Self::default()),
        }
    }

    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        debug!(path = %path.display(), "loading config");
        let contents = fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn db_path(&self) -> PathBuf {
        resolve_db_path(env::var_os(DB_ENV).map(PathBuf::from), self.database.as_deref())
    }
}

fn app_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join("config.toml"))
}

fn resolve_db_path(from_env: Option<PathBuf>, from_config: Option<&Path>) -> PathBuf {
    from_env
        .or_else(|| from_config.map(Path::to_path_buf))
        .unwrap_or_else(|| app_dir().join("neurolearn.db"))
}
