//! Tool service - the single entry point a transport layer calls into

use std::sync::Arc;
use std::time::Duration;

use runcache_core::analysis::{
    group_build_errors, group_similar, BuildErrorRow, Cluster, PatternInfo, PatternRegistry,
    PatternTest, DEFAULT_THRESHOLD,
};
use runcache_core::cache::FileJsonStore;
use runcache_core::channel::parse_channels;
use runcache_core::{generate_summary, CacheListing, CacheStore, ChannelKind, Summary};
use serde_json::Value;
use tracing::info;

use crate::background::{BackgroundRegistry, JobHandle, JobInfo, JobStatus};
use crate::config::RunnerConfig;
use crate::engine::{ScriptEngine, ShellScriptEngine};
use crate::error::Result;
use crate::executor::{ExecuteRequest, ExecutionReport, Executor, UnitOfWork};

/// Owns the cache, pattern and job registries and exposes every tool operation.
///
/// Instances are independent: two services never share state unless they
/// are built over the same data directory.
pub struct ToolService {
    config: RunnerConfig,
    cache: Arc<CacheStore>,
    patterns: Arc<PatternRegistry>,
    background: Arc<BackgroundRegistry>,
    executor: Executor,
}

impl ToolService {
    /// Build a service from `config`, loading durable state if a data dir is set
    pub async fn new(config: RunnerConfig) -> Result<Self> {
        let cache = match config.cache_dir() {
            Some(dir) => CacheStore::with_durable(Arc::new(FileJsonStore::new(dir))),
            None => CacheStore::new(),
        };
        let patterns = match config.patterns_file() {
            Some(path) => PatternRegistry::with_file(path).await?,
            None => PatternRegistry::new(),
        };
        let engine: Arc<dyn ScriptEngine> = match &config.shell {
            Some(shell) => Arc::new(ShellScriptEngine::with_interpreter(shell)?),
            None => Arc::new(ShellScriptEngine::new()),
        };

        info!(
            "Tool service ready (data dir: {:?}, engine: {})",
            config.data_dir,
            engine.name()
        );
        Ok(Self::with_parts(
            config,
            Arc::new(cache),
            Arc::new(patterns),
            Some(engine),
        ))
    }

    /// Assemble a service from existing components
    pub fn with_parts(
        config: RunnerConfig,
        cache: Arc<CacheStore>,
        patterns: Arc<PatternRegistry>,
        engine: Option<Arc<dyn ScriptEngine>>,
    ) -> Self {
        let background = Arc::new(BackgroundRegistry::new(
            Arc::clone(&cache),
            config.background_config(),
        ));
        let executor = Executor::new(Arc::clone(&cache), engine, config.executor_config());
        Self {
            config,
            cache,
            patterns,
            background,
            executor,
        }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    // Foreground execution and cache

    /// Run `unit` under `name` and summarize `channels`.
    ///
    /// A `timeout_secs` of 0 or `None` uses the configured default.
    pub async fn execute<S: AsRef<str>>(
        &self,
        name: &str,
        unit: UnitOfWork,
        channels: &[S],
        timeout_secs: Option<u64>,
    ) -> Result<ExecutionReport> {
        let channels = parse_channels(channels)?;
        let mut request = ExecuteRequest::new(name, unit).channels(channels);
        if let Some(secs) = timeout_secs {
            request = request.timeout(Duration::from_secs(secs));
        }
        self.executor.execute(request).await
    }

    /// Cached lines of one channel, in capture order
    pub async fn get_channel(&self, name: &str, channel: &str, force: bool) -> Result<Vec<String>> {
        let channel: ChannelKind = channel.parse()?;
        Ok(self.cache.get(name, channel, force).await?)
    }

    pub async fn list_cache(&self) -> Vec<CacheListing> {
        self.cache.list().await
    }

    /// Drop one entry from both cache tiers; `false` if it was not cached
    pub async fn invalidate_cache(&self, name: &str) -> Result<bool> {
        Ok(self.cache.invalidate(name).await?)
    }

    /// Drop every entry from both cache tiers
    pub async fn invalidate_all(&self) -> Result<usize> {
        Ok(self.cache.invalidate_all().await?)
    }

    /// Re-summarize a cached entry, e.g. with other channels or a larger top-N
    pub async fn summarize_cached<S: AsRef<str>>(
        &self,
        name: &str,
        channels: &[S],
        top_n: Option<usize>,
    ) -> Result<Summary> {
        let channels = parse_channels(channels)?;
        let entry = self.cache.get_entry(name, false).await?;
        Ok(generate_summary(
            &entry,
            &channels,
            top_n.unwrap_or(self.config.top_n),
        ))
    }

    // Background jobs

    pub async fn spawn(&self, name: &str, command: &str) -> Result<JobHandle> {
        self.background.spawn(name, command).await
    }

    pub async fn poll(&self, name: &str) -> JobStatus {
        self.background.poll(name).await
    }

    /// Stop and harvest a job; `keep_files` defaults to the configured value
    pub async fn stop(&self, name: &str, keep_files: Option<bool>) -> Result<ExecutionReport> {
        self.background
            .stop(name, keep_files.unwrap_or(self.config.keep_files))
            .await
    }

    pub async fn list_jobs(&self) -> Vec<JobInfo> {
        self.background.list().await
    }

    /// Stop and harvest every background job
    pub async fn shutdown(&self) -> Vec<ExecutionReport> {
        let reports = self.background.shutdown().await;
        info!("Tool service shut down ({} jobs harvested)", reports.len());
        reports
    }

    // Patterns and analysis

    pub async fn register_pattern(
        &self,
        name: &str,
        regex: &str,
        description: &str,
        category: &str,
    ) -> Result<PatternInfo> {
        Ok(self
            .patterns
            .register(name, regex, description, category)
            .await?)
    }

    pub async fn list_patterns(&self, filter: Option<&str>) -> Vec<PatternInfo> {
        self.patterns.list(filter).await
    }

    pub async fn test_pattern(&self, name: &str, sample: &str) -> Result<PatternTest> {
        Ok(self.patterns.test(name, sample).await?)
    }

    /// Cluster JSON items by text similarity.
    ///
    /// With `property`, each object's field is clustered and items without
    /// it are skipped; otherwise strings are used as-is and other values as
    /// compact JSON.
    pub fn cluster(
        &self,
        items: &[Value],
        threshold: Option<f64>,
        property: Option<&str>,
    ) -> Result<Vec<Cluster>> {
        let texts: Vec<String> = items
            .iter()
            .filter_map(|item| item_text(item, property))
            .collect();
        Ok(group_similar(&texts, threshold.unwrap_or(DEFAULT_THRESHOLD))?)
    }

    /// Extract with a registered pattern, group by code, then cluster messages
    pub async fn group_build_errors<S: AsRef<str>>(
        &self,
        items: &[S],
        pattern_name: &str,
        threshold: Option<f64>,
    ) -> Result<Vec<BuildErrorRow>> {
        let pattern = self.patterns.get(pattern_name).await?;
        Ok(group_build_errors(
            items,
            &pattern,
            threshold.unwrap_or(DEFAULT_THRESHOLD),
        )?)
    }
}

fn item_text(item: &Value, property: Option<&str>) -> Option<String> {
    let value = match property {
        Some(property) => item.get(property).filter(|v| !v.is_null())?,
        None => item,
    };
    Some(match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    })
}
