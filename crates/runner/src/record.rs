//! Output records produced by a unit of work

use serde::{Deserialize, Serialize};

/// Declared level of a trace diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceLevel {
    Verbose,
    Debug,
    Information,
}

/// One item emitted by an execution backend.
///
/// This is the only shape the classifier understands; backends translate
/// whatever their runtime produces into these variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutputRecord {
    /// Exception or error diagnostic
    Error { message: String },

    /// Warning diagnostic
    Warning { message: String },

    /// Verbose/debug/information trace
    Trace { level: TraceLevel, message: String },

    /// Ordinary returned or printed text
    Value { text: String },

    /// Structured or tabular result
    Object { value: serde_json::Value },

    /// Line from an external process's stdout
    Stdout { line: String },

    /// Line from an external process's stderr
    Stderr { line: String },

    /// stderr of a native command run from inside a script
    NativeStderr { line: String },
}

impl OutputRecord {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::Warning {
            message: message.into(),
        }
    }

    pub fn trace(level: TraceLevel, message: impl Into<String>) -> Self {
        Self::Trace {
            level,
            message: message.into(),
        }
    }

    pub fn value(text: impl Into<String>) -> Self {
        Self::Value { text: text.into() }
    }
}

/// Output stream type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputStream {
    Stdout,
    Stderr,
}
