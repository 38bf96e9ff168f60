//! Background process registry
//!
//! Long-running commands are started detached with stdout/stderr redirected
//! to temp files. `stop` kills the process tree, harvests both files into a
//! fresh cache entry and returns its summary.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use runcache_core::summary::DEFAULT_TOP_N;
use runcache_core::{generate_summary, CacheEntry, CacheStore, ChannelKind};
use serde::{Deserialize, Serialize};
use sysinfo::{Pid, System};
use tokio::process::Child;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Result, RunnerError};
use crate::executor::ExecutionReport;
use crate::process::{kill_process_group, kill_tree, ProcessSpec};

/// Configuration for background jobs
#[derive(Debug, Clone)]
pub struct BackgroundConfig {
    /// Where stdout/stderr files are written
    pub temp_dir: PathBuf,
    /// Delay after the kill so the OS flushes redirected output
    pub stop_grace: Duration,
    /// Rows per channel in summaries
    pub top_n: usize,
    /// Channels summarized on stop
    pub channels: Vec<ChannelKind>,
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            temp_dir: std::env::temp_dir(),
            stop_grace: Duration::from_millis(500),
            top_n: DEFAULT_TOP_N,
            channels: vec![ChannelKind::Error],
        }
    }
}

/// Public view of a registered job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobHandle {
    pub name: String,
    pub pid: u32,
    pub command: String,
    pub started_at: DateTime<Utc>,
    pub stdout_path: PathBuf,
    pub stderr_path: PathBuf,
}

/// Result of polling a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobStatus {
    #[serde(rename_all = "camelCase")]
    Running {
        pid: u32,
        cpu_percent: f32,
        memory_bytes: u64,
        elapsed_ms: u64,
    },
    /// The process has ended but has not been harvested yet
    #[serde(rename_all = "camelCase")]
    Exited {
        pid: u32,
        exit_code: Option<i32>,
        elapsed_ms: u64,
    },
    NotFound { name: String },
}

/// A registered job together with its current state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobInfo {
    #[serde(flatten)]
    pub handle: JobHandle,
    pub status: JobStatus,
}

struct BackgroundJob {
    handle: JobHandle,
    started: Instant,
    child: tokio::sync::Mutex<Child>,
    reaped: AtomicBool,
}

impl Drop for BackgroundJob {
    fn drop(&mut self) {
        if !self.reaped.load(Ordering::Acquire) {
            debug!("Killing unharvested job '{}'", self.handle.name);
            kill_process_group(self.handle.pid);
        }
    }
}

/// A name claimed by a spawn that has not registered its job yet
struct Reservation<'a> {
    starting: &'a Mutex<HashSet<String>>,
    name: String,
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        lock(self.starting).remove(&self.name);
    }
}

/// Process-wide registry of background jobs, keyed by name
pub struct BackgroundRegistry {
    jobs: RwLock<HashMap<String, Arc<BackgroundJob>>>,
    starting: Mutex<HashSet<String>>,
    cache: Arc<CacheStore>,
    config: BackgroundConfig,
    system: Mutex<System>,
}

impl BackgroundRegistry {
    pub fn new(cache: Arc<CacheStore>, config: BackgroundConfig) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            starting: Mutex::new(HashSet::new()),
            cache,
            config,
            system: Mutex::new(System::new()),
        }
    }

    /// Start `command` through the platform shell.
    ///
    /// A name stays reserved until the job is stopped.
    pub async fn spawn(&self, name: &str, command: &str) -> Result<JobHandle> {
        if name.trim().is_empty() {
            return Err(RunnerError::Validation("Name must not be empty".to_string()));
        }
        if command.trim().is_empty() {
            return Err(RunnerError::Validation("Command must not be empty".to_string()));
        }

        if let Some(existing) = self.jobs.read().await.get(name) {
            return Err(conflict(name, existing));
        }
        let _reservation = self.reserve(name)?;

        let job = Arc::new(self.start(name, command).await?);
        let handle = job.handle.clone();

        let mut jobs = self.jobs.write().await;
        if let Some(existing) = jobs.get(name) {
            // Lost a race with a spawn that registered after our first check
            let err = conflict(name, existing);
            drop(jobs);
            drop(job);
            remove_files(&handle.stdout_path, &handle.stderr_path).await;
            return Err(err);
        }
        jobs.insert(name.to_string(), job);
        info!("Started background job '{}' (pid {})", name, handle.pid);
        Ok(handle)
    }

    fn reserve(&self, name: &str) -> Result<Reservation<'_>> {
        if !lock(&self.starting).insert(name.to_string()) {
            // Still starting, so there is no pid to report yet
            return Err(RunnerError::JobConflict {
                name: name.to_string(),
                pid: 0,
            });
        }
        Ok(Reservation {
            starting: &self.starting,
            name: name.to_string(),
        })
    }

    /// Create the output files and launch the process; no registry lock is held
    async fn start(&self, name: &str, command: &str) -> Result<BackgroundJob> {
        tokio::fs::create_dir_all(&self.config.temp_dir).await?;
        let stem = format!("runcache-{}-{}", file_safe(name), Uuid::new_v4());
        let stdout_path = self.config.temp_dir.join(format!("{}.stdout", stem));
        let stderr_path = self.config.temp_dir.join(format!("{}.stderr", stem));

        let stdout = tokio::fs::File::create(&stdout_path).await?.into_std().await;
        let stderr = match tokio::fs::File::create(&stderr_path).await {
            Ok(file) => file.into_std().await,
            Err(e) => {
                remove_files(&stdout_path, &stderr_path).await;
                return Err(e.into());
            },
        };

        let spec = ProcessSpec::shell(command);
        let mut cmd = spec.command();
        cmd.stdout(Stdio::from(stdout)).stderr(Stdio::from(stderr));

        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                remove_files(&stdout_path, &stderr_path).await;
                return Err(RunnerError::spawn_failed_with_source(
                    format!("Failed to spawn background job '{}': {}", name, e),
                    e,
                ));
            },
        };
        let Some(pid) = child.id() else {
            remove_files(&stdout_path, &stderr_path).await;
            return Err(RunnerError::spawn_failed("Spawned process has no pid"));
        };

        Ok(BackgroundJob {
            handle: JobHandle {
                name: name.to_string(),
                pid,
                command: command.to_string(),
                started_at: Utc::now(),
                stdout_path,
                stderr_path,
            },
            started: Instant::now(),
            child: tokio::sync::Mutex::new(child),
            reaped: AtomicBool::new(false),
        })
    }

    /// Report a job's state without blocking on it
    pub async fn poll(&self, name: &str) -> JobStatus {
        let job = self.jobs.read().await.get(name).cloned();
        let Some(job) = job else {
            return JobStatus::NotFound {
                name: name.to_string(),
            };
        };

        let pid = job.handle.pid;
        let elapsed_ms = job.started.elapsed().as_millis() as u64;

        // Locked only while a stop is in progress
        if let Ok(mut child) = job.child.try_lock() {
            match child.try_wait() {
                Ok(Some(status)) => {
                    return JobStatus::Exited {
                        pid,
                        exit_code: status.code(),
                        elapsed_ms,
                    };
                },
                Ok(None) => {},
                Err(e) => warn!("Failed to check job '{}': {}", name, e),
            }
        }

        let (cpu_percent, memory_bytes) = self.sample(pid);
        JobStatus::Running {
            pid,
            cpu_percent,
            memory_bytes,
            elapsed_ms,
        }
    }

    /// Kill a job, harvest its output into the cache and summarize it
    pub async fn stop(&self, name: &str, keep_files: bool) -> Result<ExecutionReport> {
        let job = self
            .jobs
            .write()
            .await
            .remove(name)
            .ok_or_else(|| RunnerError::JobNotFound {
                name: name.to_string(),
            })?;

        let handle = &job.handle;
        let duration_ms = job.started.elapsed().as_millis() as u64;

        let exit_code = {
            let mut child = job.child.lock().await;
            let exited = child.try_wait().ok().flatten();
            match kill_tree(&mut child, Some(handle.pid)).await {
                Ok(()) => job.reaped.store(true, Ordering::Release),
                Err(e) => warn!("Failed to kill job '{}' (pid {}): {}", name, handle.pid, e),
            }
            exited.and_then(|status| status.code())
        };
        info!("Stopped background job '{}' (pid {})", name, handle.pid);

        tokio::time::sleep(self.config.stop_grace).await;

        let harvested = harvest(&handle.stdout_path, &handle.stderr_path).await;
        if !keep_files {
            remove_files(&handle.stdout_path, &handle.stderr_path).await;
        }
        let (stdout, stderr) = harvested?;

        let mut entry = CacheEntry::new(name, &handle.command)
            .with_lines(ChannelKind::Output, stdout)
            .with_lines(ChannelKind::Error, stderr)
            .with_duration_ms(duration_ms);
        if let Some(code) = exit_code {
            entry = entry.with_exit_code(code);
        }

        // Stale entry must never be visible next to the new one
        if let Err(e) = self.cache.invalidate(name).await {
            warn!("Failed to invalidate stale entry '{}': {}", name, e);
        }
        let stored = self.cache.put(entry).await;

        Ok(ExecutionReport {
            summary: generate_summary(&stored, &self.config.channels, self.config.top_n),
            exit_code,
            duration_ms,
        })
    }

    /// All registered jobs with their state, oldest first
    pub async fn list(&self) -> Vec<JobInfo> {
        let mut jobs = Vec::new();
        for handle in self.handles().await {
            let status = self.poll(&handle.name).await;
            jobs.push(JobInfo { handle, status });
        }
        jobs
    }

    /// Stop every job, deleting its files
    pub async fn shutdown(&self) -> Vec<ExecutionReport> {
        let mut reports = Vec::new();
        for handle in self.handles().await {
            match self.stop(&handle.name, false).await {
                Ok(report) => reports.push(report),
                Err(e) if e.is_not_found() => {},
                Err(e) => warn!("Failed to stop job '{}' during shutdown: {}", handle.name, e),
            }
        }
        reports
    }

    async fn handles(&self) -> Vec<JobHandle> {
        let jobs = self.jobs.read().await;
        let mut handles: Vec<JobHandle> = jobs.values().map(|job| job.handle.clone()).collect();
        handles.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        handles
    }

    fn sample(&self, pid: u32) -> (f32, u64) {
        let mut system = lock(&self.system);
        let pid = Pid::from_u32(pid);
        system.refresh_process(pid);
        system
            .process(pid)
            .map(|process| (process.cpu_usage(), process.memory()))
            .unwrap_or_default()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn conflict(name: &str, existing: &BackgroundJob) -> RunnerError {
    RunnerError::JobConflict {
        name: name.to_string(),
        pid: existing.handle.pid,
    }
}

fn file_safe(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

async fn read_file_lines(path: &Path) -> Result<Vec<String>> {
    let bytes = tokio::fs::read(path).await?;
    Ok(String::from_utf8_lossy(&bytes)
        .lines()
        .map(str::to_string)
        .collect())
}

async fn harvest(stdout: &Path, stderr: &Path) -> Result<(Vec<String>, Vec<String>)> {
    Ok((read_file_lines(stdout).await?, read_file_lines(stderr).await?))
}

async fn remove_files(stdout: &Path, stderr: &Path) {
    for path in [stdout, stderr] {
        if let Err(e) = tokio::fs::remove_file(path).await {
            debug!("Failed to remove {:?}: {}", path, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn registry(dir: &TempDir) -> (BackgroundRegistry, Arc<CacheStore>) {
        let cache = Arc::new(CacheStore::new());
        let config = BackgroundConfig {
            temp_dir: dir.path().to_path_buf(),
            stop_grace: Duration::from_millis(50),
            ..Default::default()
        };
        (BackgroundRegistry::new(Arc::clone(&cache), config), cache)
    }

    #[test]
    fn test_file_safe() {
        assert_eq!(file_safe("build/web app"), "build_web_app");
        assert_eq!(file_safe("ok-name_1"), "ok-name_1");
    }

    #[tokio::test]
    async fn test_unknown_names() {
        let dir = TempDir::new().unwrap();
        let (registry, _) = registry(&dir);

        assert_eq!(
            registry.poll("nope").await,
            JobStatus::NotFound {
                name: "nope".to_string()
            }
        );
        let err = registry.stop("nope", false).await.unwrap_err();
        assert!(matches!(err, RunnerError::JobNotFound { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_spawn_poll_stop_lifecycle() {
        let dir = TempDir::new().unwrap();
        let (registry, cache) = registry(&dir);
        cache
            .put(CacheEntry::new("srv", "old").with_lines(ChannelKind::Error, ["stale"]))
            .await;

        let handle = registry
            .spawn("srv", "echo hello; echo oops 1>&2; sleep 5")
            .await
            .unwrap();
        assert!(handle.pid > 0);
        assert!(handle.stdout_path.exists());
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert!(matches!(
            registry.poll("srv").await,
            JobStatus::Running { pid, .. } if pid == handle.pid
        ));
        let listed = registry.list().await;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].handle, handle);
        assert!(matches!(listed[0].status, JobStatus::Running { .. }));

        let started = Instant::now();
        let report = registry.stop("srv", false).await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(3));
        assert!(report
            .summary
            .text
            .starts_with("Cached as 'srv' (Output: 1 lines)"));
        assert!(report.summary.text.contains("Errors: 1 (1 unique)"));

        assert_eq!(
            cache.get("srv", ChannelKind::Output, false).await.unwrap(),
            vec!["hello"]
        );
        assert_eq!(
            cache.get("srv", ChannelKind::Error, false).await.unwrap(),
            vec!["oops"]
        );
        assert!(matches!(registry.poll("srv").await, JobStatus::NotFound { .. }));
        assert!(!handle.stdout_path.exists());
        assert!(!handle.stderr_path.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_name_is_reserved_until_stopped() {
        let dir = TempDir::new().unwrap();
        let (registry, _) = registry(&dir);

        let first = registry.spawn("w", "sleep 5").await.unwrap();
        let err = registry.spawn("w", "sleep 5").await.unwrap_err();
        assert!(matches!(err, RunnerError::JobConflict { pid, .. } if pid == first.pid));

        registry.stop("w", false).await.unwrap();
        registry.spawn("w", "sleep 5").await.unwrap();
        assert_eq!(registry.shutdown().await.len(), 1);
        assert!(registry.list().await.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exited_job_keeps_exit_code_and_files() {
        let dir = TempDir::new().unwrap();
        let (registry, _) = registry(&dir);

        let handle = registry.spawn("quick", "echo done; exit 2").await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(matches!(
            registry.poll("quick").await,
            JobStatus::Exited { exit_code: Some(2), .. }
        ));

        let report = registry.stop("quick", true).await.unwrap();
        assert_eq!(report.exit_code, Some(2));
        assert!(handle.stdout_path.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_concurrent_spawns_of_one_name() {
        let dir = TempDir::new().unwrap();
        let (registry, _) = registry(&dir);

        let (a, b) = tokio::join!(
            registry.spawn("dup", "sleep 5"),
            registry.spawn("dup", "sleep 5")
        );
        assert_eq!(usize::from(a.is_ok()) + usize::from(b.is_ok()), 1);
        let err = a.err().or(b.err()).unwrap();
        assert!(matches!(err, RunnerError::JobConflict { .. }));
        assert_eq!(registry.list().await.len(), 1);

        assert_eq!(registry.shutdown().await.len(), 1);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stop_with_unreadable_output_still_removes_job() {
        let dir = TempDir::new().unwrap();
        let (registry, cache) = registry(&dir);

        let handle = registry.spawn("gone", "sleep 5").await.unwrap();
        std::fs::remove_file(&handle.stdout_path).unwrap();

        let err = registry.stop("gone", false).await.unwrap_err();
        assert!(matches!(err, RunnerError::Io(_)));
        assert!(matches!(registry.poll("gone").await, JobStatus::NotFound { .. }));
        assert!(registry.list().await.is_empty());
        assert!(!cache.contains("gone").await);
        assert!(!handle.stderr_path.exists());

        // The name is free again
        registry.spawn("gone", "sleep 5").await.unwrap();
        registry.shutdown().await;
    }
}
