//! Runtime configuration, read from the environment

use std::path::PathBuf;
use std::time::Duration;

use runcache_core::summary::DEFAULT_TOP_N;

use crate::background::BackgroundConfig;
use crate::executor::{ExecutorConfig, DEFAULT_TIMEOUT};

const DEFAULT_STOP_GRACE_MS: u64 = 500;

/// Settings for a [`ToolService`](crate::ToolService)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerConfig {
    /// Durable cache and patterns live here; `None` keeps everything in memory
    pub data_dir: Option<PathBuf>,
    /// Background stdout/stderr files
    pub temp_dir: PathBuf,
    pub default_timeout: Duration,
    pub stop_grace: Duration,
    pub top_n: usize,
    /// Default for `keep_files` when a stop request leaves it unset
    pub keep_files: bool,
    /// Interpreter command line for scripts, e.g. `bash -c`
    pub shell: Option<String>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            temp_dir: std::env::temp_dir(),
            default_timeout: DEFAULT_TIMEOUT,
            stop_grace: Duration::from_millis(DEFAULT_STOP_GRACE_MS),
            top_n: DEFAULT_TOP_N,
            keep_files: false,
            shell: None,
        }
    }
}

impl RunnerConfig {
    /// Read `RUNCACHE_*` variables; unset or malformed values keep their defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            data_dir: env_string("RUNCACHE_DATA_DIR").map(PathBuf::from),
            temp_dir: env_string("RUNCACHE_TEMP_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.temp_dir),
            default_timeout: env_positive("RUNCACHE_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.default_timeout),
            stop_grace: env_positive("RUNCACHE_STOP_GRACE_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.stop_grace),
            top_n: env_positive("RUNCACHE_TOP_N")
                .map(|n| n as usize)
                .unwrap_or(defaults.top_n),
            keep_files: env_flag("RUNCACHE_KEEP_FILES", defaults.keep_files),
            shell: env_string("RUNCACHE_SHELL"),
        }
    }

    /// Directory of the durable cache documents
    pub fn cache_dir(&self) -> Option<PathBuf> {
        self.data_dir.as_ref().map(|dir| dir.join("cache"))
    }

    /// Saved user patterns
    pub fn patterns_file(&self) -> Option<PathBuf> {
        self.data_dir.as_ref().map(|dir| dir.join("patterns.json"))
    }

    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            default_timeout: self.default_timeout,
            top_n: self.top_n,
            ..Default::default()
        }
    }

    pub fn background_config(&self) -> BackgroundConfig {
        BackgroundConfig {
            temp_dir: self.temp_dir.clone(),
            stop_grace: self.stop_grace,
            top_n: self.top_n,
            ..Default::default()
        }
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
}

fn env_positive(name: &str) -> Option<u64> {
    env_string(name)
        .and_then(|raw| raw.parse::<u64>().ok())
        .filter(|value| *value > 0)
}

pub(crate) fn env_flag(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}
