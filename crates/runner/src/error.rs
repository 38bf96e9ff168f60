//! Error types for runcache-runner

use thiserror::Error;

/// Result type alias for runner operations
pub type Result<T> = std::result::Result<T, RunnerError>;

/// Errors that can occur while running or harvesting work
#[derive(Debug, Error)]
pub enum RunnerError {
    /// Cache, pattern or validation error from the core library
    #[error(transparent)]
    Core(#[from] runcache_core::Error),

    /// The process (or script interpreter) could not be started
    #[error("Failed to spawn process: {message}")]
    SpawnFailed {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Wall-clock limit exceeded; the work was terminated and nothing was cached
    #[error("'{name}' timed out after {elapsed_ms} ms; the process was terminated and the cache left unchanged")]
    Timeout { name: String, elapsed_ms: u64 },

    /// Background job not found
    #[error("Background job not found: {name}")]
    JobNotFound { name: String },

    /// A job with this name is still registered
    #[error("Background job '{name}' is still registered (pid {pid}); stop it before spawning again")]
    JobConflict { name: String, pid: u32 },

    /// No script engine is configured
    #[error("No script engine is configured")]
    EngineUnavailable,

    /// Rejected request
    #[error("Invalid input: {0}")]
    Validation(String),

    /// The work faulted after it started
    #[error("Execution failed: {message}")]
    ExecutionFailed { message: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RunnerError {
    /// Create a SpawnFailed error
    pub fn spawn_failed(message: impl Into<String>) -> Self {
        Self::SpawnFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Create a SpawnFailed error with source
    pub fn spawn_failed_with_source(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::SpawnFailed {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Create an ExecutionFailed error
    pub fn execution_failed(message: impl Into<String>) -> Self {
        Self::ExecutionFailed {
            message: message.into(),
        }
    }

    /// Errors that mean the work never started; these must not touch the cache
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::SpawnFailed { .. } | Self::EngineUnavailable | Self::Validation(_)
        )
    }

    /// Whether the error only reports an unknown name
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::JobNotFound { .. } => true,
            Self::Core(e) => e.is_not_found(),
            _ => false,
        }
    }
}
