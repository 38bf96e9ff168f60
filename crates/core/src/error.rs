//! Error types for the core library

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("No cached result named '{0}'")]
    NotFound(String),

    #[error("Unknown channel '{0}' (expected Error, Warning, Verbose, Debug, Information, Output or Stderr)")]
    ChannelUnknown(String),

    #[error("Pattern not found: {0}")]
    PatternNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl Error {
    /// Whether the caller can simply correct the request and retry
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::ChannelUnknown(_))
    }

    /// Whether the error only reports a missing name
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::PatternNotFound(_))
    }
}
