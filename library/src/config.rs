use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use log::{Level, warn};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// How a step evaluates dirty components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvaluationMode {
    /// Single-threaded, synchronous `update_if_dirty` recursion.
    #[default]
    Pull,
    /// Ready components run on the scheduler's worker pool.
    Push,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Worker threads for push mode; 0 picks the available parallelism.
    pub worker_count: usize,
    pub mode: EvaluationMode,
    /// Seconds of document time per step.
    pub timestep: f64,
    /// Steps run by the command line driver.
    pub steps: u64,
    /// Directory scanned for component module libraries.
    pub module_dir: Option<PathBuf>,
    pub timing_log_level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_count: 0,
            mode: EvaluationMode::Pull,
            timestep: 0.04,
            steps: 1,
            module_dir: None,
            timing_log_level: "debug".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, EngineError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Per-user config location, e.g. `~/.config/slotflow/engine.toml`.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("org", "slotflow", "slotflow").map(|dirs| dirs.config_dir().join("engine.toml"))
    }

    /// Loads the per-user config, falling back to defaults when it is missing or broken.
    pub fn load_or_default() -> Self {
        let Some(path) = Self::default_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        match Self::load(&path) {
            Ok(config) => config,
            Err(e) => {
                warn!("Failed to load config {}, using defaults: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn resolved_worker_count(&self) -> usize {
        if self.worker_count > 0 {
            return self.worker_count;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }

    pub fn timing_level(&self) -> Level {
        self.timing_log_level.parse().unwrap_or(Level::Debug)
    }
}
