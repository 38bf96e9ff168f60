//! Runcache Runner - execution capture for an AI tool host
//!
//! This crate runs scripts and external processes, classifies their output
//! into channels, caches it through `runcache-core` and manages background
//! jobs. [`ToolService`] exposes every operation to a transport layer.

mod background;
mod classifier;
mod config;
mod engine;
mod error;
mod executor;
mod parser;
mod process;
mod record;
mod service;

pub use background::{BackgroundConfig, BackgroundRegistry, JobHandle, JobInfo, JobStatus};
pub use classifier::{capture, classify, split_lines};
pub use config::RunnerConfig;
pub use engine::{ScriptEngine, ScriptOutcome, ShellScriptEngine};
pub use error::{Result, RunnerError};
pub use executor::{
    ExecuteRequest, ExecutionReport, Executor, ExecutorConfig, UnitOfWork, DEFAULT_TIMEOUT,
};
pub use parser::{create_parser, JsonRecordParser, LineParser, ParserKind, RawLineParser};
pub use process::{ProcessHandle, ProcessSpec};
pub use record::{OutputRecord, OutputStream, TraceLevel};
pub use service::ToolService;
