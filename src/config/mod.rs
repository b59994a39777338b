//! Configuration module
//!
//! Handles loading and managing configuration.

pub mod env;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::executor::PoolConfig;
use crate::ipc::WorkerCommand;
use env::EnvConfig;

/// Configuration file locations (in order of precedence)
const CONFIG_LOCATIONS: &[&str] = &[
    "./worker-dispatch.yaml",
    "./worker-dispatch.yml",
    "./.worker-dispatch.yaml",
    "~/.config/worker-dispatch/config.yaml",
];

/// Application configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Number of worker processes
    pub workers: usize,

    /// Command used to launch each worker
    pub worker: WorkerCommand,

    /// Replacement workers a slot may start after a crash
    pub max_restarts: u32,

    /// Output format (table, json, json-pretty, csv, summary)
    pub format: String,

    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            worker: WorkerCommand::default(),
            max_restarts: 3,
            format: "table".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let config: Self = if is_yaml_file(path) {
            serde_yaml::from_str(&content).context("Failed to parse YAML config")?
        } else {
            serde_json::from_str(&content).context("Failed to parse JSON config")?
        };

        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = if is_yaml_file(path) {
            serde_yaml::to_string(self).context("Failed to serialize config")?
        } else {
            serde_json::to_string_pretty(self).context("Failed to serialize config")?
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        std::fs::write(path, content).context("Failed to write config file")?;
        Ok(())
    }

    /// Resolve configuration: an explicit path, then the path named by the
    /// environment, then the well-known locations, then defaults. Environment
    /// overrides are applied on top. Returns the file that was used, if any.
    pub fn discover(explicit: Option<&Path>, env: &EnvConfig) -> Result<(Self, Option<PathBuf>)> {
        let path = explicit
            .map(Path::to_path_buf)
            .or_else(|| env.config_file.as_deref().map(PathBuf::from))
            .or_else(find_config_file);

        let mut config = match &path {
            Some(path) => {
                debug!("Loading config from {}", path.display());
                Self::load(path)?
            }
            None => Self::default(),
        };

        config.apply_env(env);
        Ok((config, path))
    }

    /// Apply environment variable overrides
    pub fn apply_env(&mut self, env: &EnvConfig) {
        if let Some(workers) = env.workers {
            self.workers = workers;
        }
        if let Some(program) = &env.worker {
            self.worker.program = program.clone();
        }
        if let Some(max_restarts) = env.max_restarts {
            self.max_restarts = max_restarts;
        }
        if let Some(format) = &env.format {
            self.format = format.clone();
        }
        if let Some(level) = &env.log_level {
            self.log_level = level.clone();
        }
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig::new(self.worker.clone())
            .workers(self.workers)
            .max_restarts(self.max_restarts)
    }
}

/// First existing file among [`CONFIG_LOCATIONS`]
fn find_config_file() -> Option<PathBuf> {
    CONFIG_LOCATIONS
        .iter()
        .map(|location| expand_path(location))
        .find(|path| path.is_file())
}

/// Default path for `config init`
pub fn default_config_path() -> PathBuf {
    expand_path("~/.config/worker-dispatch/config.yaml")
}

/// Expand ~ to home directory
fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

/// Check if file is YAML based on extension
fn is_yaml_file(path: &Path) -> bool {
    path.extension()
        .map(|e| e == "yaml" || e == "yml")
        .unwrap_or(false)
}
