//! Foreground executor - runs one unit of work under a deadline and caches the result

use std::sync::Arc;
use std::time::{Duration, Instant};

use runcache_core::summary::DEFAULT_TOP_N;
use runcache_core::{generate_summary, CacheEntry, CacheStore, ChannelKind, Summary};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::classifier::capture;
use crate::engine::ScriptEngine;
use crate::error::{Result, RunnerError};
use crate::parser::ParserKind;
use crate::process::{ProcessHandle, ProcessSpec};
use crate::record::OutputRecord;

/// Default wall-clock limit for foreground work
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

const RECORD_BUFFER: usize = 1024;

/// Configuration for the executor
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Limit used when a request does not set one
    pub default_timeout: Duration,
    /// Rows per channel in summaries
    pub top_n: usize,
    /// How long to wait for a cancelled worker to release its process
    pub kill_wait: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            default_timeout: DEFAULT_TIMEOUT,
            top_n: DEFAULT_TOP_N,
            kill_wait: Duration::from_secs(5),
        }
    }
}

/// What to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitOfWork {
    /// Script text handed to the configured engine
    Script { body: String },
    /// External process; stdout goes to Output and stderr to Error
    Process(ProcessSpec),
}

impl UnitOfWork {
    pub fn script(body: impl Into<String>) -> Self {
        Self::Script { body: body.into() }
    }

    pub fn process(spec: ProcessSpec) -> Self {
        Self::Process(spec)
    }

    /// Text recorded as the entry's command
    pub fn describe(&self) -> String {
        match self {
            Self::Script { body } => body.clone(),
            Self::Process(spec) => spec.display(),
        }
    }
}

/// Request to run a unit of work
#[derive(Debug, Clone)]
pub struct ExecuteRequest {
    /// Cache key
    pub name: String,
    pub unit: UnitOfWork,
    /// Channels to include in the summary
    pub channels: Vec<ChannelKind>,
    /// Wall-clock limit; `None` or zero uses the configured default
    pub timeout: Option<Duration>,
}

impl ExecuteRequest {
    pub fn new(name: impl Into<String>, unit: UnitOfWork) -> Self {
        Self {
            name: name.into(),
            unit,
            channels: vec![ChannelKind::Error, ChannelKind::Warning],
            timeout: None,
        }
    }

    pub fn channels(mut self, channels: impl Into<Vec<ChannelKind>>) -> Self {
        self.channels = channels.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Result of a completed execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionReport {
    pub summary: Summary,
    pub exit_code: Option<i32>,
    /// Wall-clock time, kept out of the summary text so the text stays deterministic
    pub duration_ms: u64,
}

struct WorkOutcome {
    exit_code: Option<i32>,
    fault: Option<String>,
}

type Worker = JoinHandle<Result<Option<WorkOutcome>>>;

/// Runs foreground work and commits the captured output to the cache
pub struct Executor {
    cache: Arc<CacheStore>,
    engine: Option<Arc<dyn ScriptEngine>>,
    config: ExecutorConfig,
}

impl Executor {
    pub fn new(
        cache: Arc<CacheStore>,
        engine: Option<Arc<dyn ScriptEngine>>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            cache,
            engine,
            config,
        }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Run `request` to completion or until its deadline.
    ///
    /// On success the entry for `request.name` is replaced and summarized.
    /// On spawn failure or timeout the cache is left exactly as it was.
    pub async fn execute(&self, request: ExecuteRequest) -> Result<ExecutionReport> {
        if request.name.trim().is_empty() {
            return Err(RunnerError::Validation("Name must not be empty".to_string()));
        }
        let limit = request
            .timeout
            .filter(|t| !t.is_zero())
            .unwrap_or(self.config.default_timeout);
        if matches!(request.unit, UnitOfWork::Script { .. }) && self.engine.is_none() {
            return Err(RunnerError::EngineUnavailable);
        }

        let command = request.unit.describe();
        info!("Executing '{}' (timeout {:?})", request.name, limit);

        let started = Instant::now();
        let deadline = tokio::time::Instant::now() + limit;
        let (tx, mut rx) = mpsc::channel(RECORD_BUFFER);
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let mut worker: Worker = tokio::spawn(run_unit(
            request.unit,
            self.engine.clone(),
            tx,
            cancel_rx,
        ));

        let mut entry = CacheEntry::new(&request.name, command);
        let mut joined = None;
        let mut open = true;
        let sleep = tokio::time::sleep_until(deadline);
        tokio::pin!(sleep);

        while open || joined.is_none() {
            tokio::select! {
                record = rx.recv(), if open => match record {
                    Some(record) => capture(&mut entry, record),
                    None => open = false,
                },
                result = &mut worker, if joined.is_none() => joined = Some(result),
                _ = &mut sleep => {
                    let elapsed_ms = started.elapsed().as_millis() as u64;
                    if joined.is_none() {
                        self.cancel(cancel_tx, &mut worker).await;
                    }
                    warn!(
                        "'{}' timed out after {} ms; cache left unchanged",
                        request.name, elapsed_ms
                    );
                    return Err(RunnerError::Timeout {
                        name: request.name,
                        elapsed_ms,
                    });
                },
            }
        }

        let outcome = match joined {
            Some(Ok(Ok(Some(outcome)))) => outcome,
            Some(Ok(Ok(None))) => WorkOutcome {
                exit_code: None,
                fault: Some("Execution was cancelled".to_string()),
            },
            Some(Ok(Err(e))) if e.is_fatal() => {
                error!("'{}' could not start: {}", request.name, e);
                return Err(e);
            },
            Some(Ok(Err(e))) => WorkOutcome {
                exit_code: None,
                fault: Some(e.to_string()),
            },
            Some(Err(join_error)) => WorkOutcome {
                exit_code: None,
                fault: Some(format!("Worker failed: {}", join_error)),
            },
            None => {
                return Err(RunnerError::execution_failed("Worker result missing"));
            },
        };

        if let Some(fault) = outcome.fault {
            capture(&mut entry, OutputRecord::error(fault));
        }
        if let Some(code) = outcome.exit_code {
            if code != 0 {
                entry.push(ChannelKind::Error, format!("Process exited with code {}", code));
            }
            entry = entry.with_exit_code(code);
        }
        let duration_ms = started.elapsed().as_millis() as u64;
        entry = entry.with_duration_ms(duration_ms);

        let stored = self.cache.put(entry).await;
        info!(
            "'{}' finished in {} ms ({} output lines)",
            stored.name,
            duration_ms,
            stored.count(ChannelKind::Output)
        );

        Ok(ExecutionReport {
            summary: generate_summary(&stored, &request.channels, self.config.top_n),
            exit_code: outcome.exit_code,
            duration_ms,
        })
    }

    /// Ask the worker to kill its process, then make sure it is gone
    async fn cancel(&self, cancel_tx: oneshot::Sender<()>, worker: &mut Worker) {
        cancel_tx.send(()).ok();
        if tokio::time::timeout(self.config.kill_wait, &mut *worker)
            .await
            .is_err()
        {
            warn!("Worker did not stop within {:?}; aborting", self.config.kill_wait);
            worker.abort();
            (&mut *worker).await.ok();
        }
    }
}

/// Worker body. `Ok(None)` means the run was cancelled and its process reaped.
async fn run_unit(
    unit: UnitOfWork,
    engine: Option<Arc<dyn ScriptEngine>>,
    tx: mpsc::Sender<OutputRecord>,
    mut cancel: oneshot::Receiver<()>,
) -> Result<Option<WorkOutcome>> {
    match unit {
        UnitOfWork::Process(spec) => {
            let mut handle = ProcessHandle::spawn(&spec, ParserKind::Raw, tx)?;
            let exited = tokio::select! {
                code = handle.wait() => Some(code),
                Ok(()) = &mut cancel => None,
            };
            match exited {
                Some(code) => Ok(Some(WorkOutcome {
                    exit_code: Some(code?),
                    fault: None,
                })),
                None => {
                    handle.kill().await?;
                    Ok(None)
                },
            }
        },
        UnitOfWork::Script { body } => {
            let engine = engine.ok_or(RunnerError::EngineUnavailable)?;
            // Dropping the engine future on cancel releases its process
            let finished = tokio::select! {
                result = engine.run(&body, tx) => Some(result),
                Ok(()) = &mut cancel => None,
            };
            match finished {
                Some(result) => {
                    let outcome = result?;
                    Ok(Some(WorkOutcome {
                        exit_code: Some(outcome.exit_code),
                        fault: outcome.fault,
                    }))
                },
                None => Ok(None),
            }
        },
    }
}
