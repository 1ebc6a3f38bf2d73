use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::{twlog_debug, Error, Result};

pub const DEFAULT_MAX_CONCURRENT_WORKERS: usize = 4;
pub const DEFAULT_ALPHA: f64 = 0.05;
pub const DEFAULT_EVENT_LOG_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Upper bound on worker calls in flight within one layer.
    #[serde(default = "default_max_concurrent_workers")]
    pub max_concurrent_workers: usize,
    /// Conformal miscoverage level.
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    /// Directory holding `<task_type>.toml` workflow templates.
    pub template_dir: Option<String>,
    #[serde(default = "default_event_log_capacity")]
    pub event_log_capacity: usize,
    pub worker_timeout_secs: Option<u64>,
    /// Replica identity for the CRDT store; a random one is used when unset.
    pub replica_id: Option<String>,
}

fn default_max_concurrent_workers() -> usize {
    DEFAULT_MAX_CONCURRENT_WORKERS
}

fn default_alpha() -> f64 {
    DEFAULT_ALPHA
}

fn default_event_log_capacity() -> usize {
    DEFAULT_EVENT_LOG_CAPACITY
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_concurrent_workers: DEFAULT_MAX_CONCURRENT_WORKERS,
            alpha: DEFAULT_ALPHA,
            template_dir: None,
            event_log_capacity: DEFAULT_EVENT_LOG_CAPACITY,
            worker_timeout_secs: None,
            replica_id: None,
        }
    }
}

impl Config {
    pub fn taskweave_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".taskweave"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::taskweave_dir()?.join("taskweave.toml"))
    }

    pub fn templates_dir(&self) -> Result<PathBuf> {
        match &self.template_dir {
            Some(dir) => Ok(expand_tilde(dir)),
            None => Ok(Self::taskweave_dir()?.join("workflows")),
        }
    }

    pub fn worker_timeout(&self) -> Option<Duration> {
        self.worker_timeout_secs.map(Duration::from_secs)
    }

    /// Reject values the orchestrator cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_workers == 0 {
            return Err(Error::Validation(
                "max_concurrent_workers must be at least 1".to_string(),
            ));
        }
        if !(self.alpha > 0.0 && self.alpha < 1.0) {
            return Err(Error::Validation(format!(
                "alpha must lie in (0, 1), got {}",
                self.alpha
            )));
        }
        if self.event_log_capacity == 0 {
            return Err(Error::Validation(
                "event_log_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        twlog_debug!("Config::load path={}", path.display());
        if !path.exists() {
            twlog_debug!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(&path)?)?;
        config.validate()?;
        twlog_debug!(
            "Config loaded: max_concurrent_workers={}, alpha={}, template_dir={:?}",
            config.max_concurrent_workers,
            config.alpha,
            config.template_dir
        );
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let dir = Self::taskweave_dir()?;
        if !dir.exists() {
            twlog_debug!("Creating taskweave directory: {}", dir.display());
            fs::create_dir_all(&dir)?;
        }
        let path = Self::config_path()?;
        fs::write(&path, toml::to_string_pretty(self)?)?;
        twlog_debug!("Config saved to {}", path.display());
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
