//! Runner configuration.
//!
//! Stored in `~/.config/taskctx/config.toml`.
//!
//! ## Priority order (highest to lowest)
//!
//! 1. Environment variables (`TASKCTX_*`)
//! 2. Config file (`~/.config/taskctx/config.toml`)
//! 3. Defaults

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{RunnerError, RunnerResult};

/// Main configuration structure. The run-root, project root, and
/// passthrough-env list are otherwise passed as explicit engine
/// constructor parameters, never read from a module-level singleton.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RunnerConfig {
    #[serde(default)]
    pub runner: RunnerSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunnerSettings {
    /// Parallelism for the execution engine. `None` means host parallelism.
    pub parallelism: Option<usize>,
    /// Force sequential (pool size 1) dispatch, preserving topological order.
    pub sequential: bool,
    /// Keep the run directory even on success (debugging aid).
    pub keep_run_dir: bool,
    /// Retainer subprocess wall-clock limit, in seconds.
    pub retainer_timeout_secs: u64,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            parallelism: None,
            sequential: false,
            keep_run_dir: false,
            retainer_timeout_secs: 60,
        }
    }
}

impl RunnerConfig {
    pub fn config_dir() -> PathBuf {
        dirs::config_dir().unwrap_or_else(|| PathBuf::from(".")).join("taskctx")
    }

    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Load configuration from file, falling back to defaults if absent.
    pub fn load() -> RunnerResult<Self> {
        let path = Self::config_path();
        if !path.exists() {
            return Ok(Self::default().with_env());
        }

        let content = fs::read_to_string(&path).map_err(|e| RunnerError::Config {
            reason: format!("failed to read config file: {e}"),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| RunnerError::Config {
            reason: format!("failed to parse config file: {e}"),
        })?;
        Ok(config.with_env())
    }

    pub fn save(&self) -> RunnerResult<()> {
        let dir = Self::config_dir();
        if !dir.exists() {
            fs::create_dir_all(&dir).map_err(|e| RunnerError::Config {
                reason: format!("failed to create config directory: {e}"),
            })?;
        }

        let content = toml::to_string_pretty(self).map_err(|e| RunnerError::Config {
            reason: format!("failed to serialize config: {e}"),
        })?;

        fs::write(Self::config_path(), content).map_err(|e| RunnerError::Config {
            reason: format!("failed to write config file: {e}"),
        })?;
        Ok(())
    }

    /// Merge with environment variables; env wins over the file.
    pub fn with_env(mut self) -> Self {
        if let Ok(value) = std::env::var("TASKCTX_PARALLELISM") {
            if let Ok(parsed) = value.parse::<usize>() {
                self.runner.parallelism = Some(parsed);
            }
        }
        if let Ok(value) = std::env::var("TASKCTX_SEQUENTIAL") {
            self.runner.sequential = value == "1" || value.eq_ignore_ascii_case("true");
        }
        self
    }

    /// Effective parallelism: configured value, or host parallelism.
    pub fn effective_parallelism(&self) -> usize {
        if self.runner.sequential {
            return 1;
        }
        self.runner
            .parallelism
            .unwrap_or_else(|| std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1))
    }
}
