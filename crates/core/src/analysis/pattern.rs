//! Named extraction patterns
//!
//! The registry is seeded with common compiler/runtime diagnostic formats
//! and may be persisted as a single document:
//! ```text
//! {"patterns": {"<name>": {"pattern": "...", "description": "...", "category": "..."}}}
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::{Error, Result};

/// A compiled, named regular expression
#[derive(Debug, Clone)]
pub struct Pattern {
    pub name: String,
    pub regex: Regex,
    pub category: String,
    pub description: String,
}

impl Pattern {
    /// Compile a pattern, rejecting empty names and invalid regexes
    pub fn new(
        name: impl Into<String>,
        pattern: &str,
        description: impl Into<String>,
        category: impl Into<String>,
    ) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::Validation("Pattern name must not be empty".into()));
        }

        let regex = Regex::new(pattern).map_err(|e| {
            Error::Validation(format!("Invalid regex for pattern '{}': {}", name, e))
        })?;

        Ok(Self {
            name,
            regex,
            category: category.into(),
            description: description.into(),
        })
    }

    /// Source text of the regex
    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }

    /// Named capture groups, in pattern order
    pub fn group_names(&self) -> Vec<&str> {
        self.regex.capture_names().flatten().collect()
    }

    pub fn has_group(&self, group: &str) -> bool {
        self.regex.capture_names().flatten().any(|g| g == group)
    }

    /// Fail unless every group in `groups` is exposed
    pub fn require_groups(&self, groups: &[&str]) -> Result<()> {
        let missing: Vec<&str> = groups
            .iter()
            .copied()
            .filter(|g| !self.has_group(g))
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(format!(
                "Pattern '{}' is missing named group(s): {}",
                self.name,
                missing.join(", ")
            )))
        }
    }

    pub fn info(&self) -> PatternInfo {
        PatternInfo {
            name: self.name.clone(),
            pattern: self.as_str().to_string(),
            description: self.description.clone(),
            category: self.category.clone(),
        }
    }
}

/// Serializable view of a pattern
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternInfo {
    pub name: String,
    pub pattern: String,
    pub description: String,
    pub category: String,
}

/// Result of trying a pattern against a sample line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternTest {
    pub pattern: String,
    pub matched: bool,
    pub captures: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PatternSpec {
    pattern: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    category: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PatternsDocument {
    #[serde(default)]
    patterns: BTreeMap<String, PatternSpec>,
}

/// (name, regex, description, category)
const BUILTIN_PATTERNS: &[(&str, &str, &str, &str)] = &[
    (
        "msbuild",
        r"^\s*(?<file>[^(\s][^(]*)\((?<line>\d+),(?<column>\d+)\): (?<severity>error|warning) (?<code>[A-Z]+\d+): (?<message>.+?)(?: \[(?<project>[^\]]+)\])?$",
        "MSBuild / C# compiler diagnostics: file(line,col): error CS0103: message",
        "build",
    ),
    (
        "rustc",
        r"^(?<severity>error|warning)\[(?<code>E\d{4})\]: (?<message>.+)$",
        "rustc diagnostics: error[E0425]: message",
        "build",
    ),
    (
        "rustc-location",
        r"^\s*--> (?<file>.+?):(?<line>\d+):(?<column>\d+)$",
        "rustc source location following a diagnostic:  --> src/main.rs:4:5",
        "location",
    ),
    (
        "gcc",
        r"^(?<file>[^:\s]+):(?<line>\d+):(?<column>\d+): (?<severity>error|warning|fatal error): (?<message>.+?)(?: \[(?<code>-W[\w=-]+)\])?$",
        "GCC / Clang diagnostics: file:line:col: error: message [-Wflag]",
        "build",
    ),
    (
        "tsc",
        r"^(?<file>.+?)\((?<line>\d+),(?<column>\d+)\): (?<severity>error|warning) (?<code>TS\d+): (?<message>.+)$",
        "TypeScript compiler diagnostics: file(line,col): error TS2304: message",
        "build",
    ),
    (
        "python-traceback",
        r#"^\s*File "(?<file>[^"]+)", line (?<line>\d+)(?:, in (?<function>.+))?$"#,
        "Python traceback frames: File \"x.py\", line 3, in main",
        "runtime",
    ),
    (
        "generic-code",
        r"(?<code>[A-Z]+\d+): (?<message>.+)",
        "Any CODE123: message pair",
        "generic",
    ),
];

/// Shared registry of named patterns
pub struct PatternRegistry {
    patterns: RwLock<BTreeMap<String, Arc<Pattern>>>,
    path: Option<PathBuf>,
}

impl Default for PatternRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PatternRegistry {
    /// Create a registry holding only the built-in patterns
    pub fn new() -> Self {
        let mut patterns = BTreeMap::new();
        for (name, regex, description, category) in BUILTIN_PATTERNS {
            // Checked by test_builtins_compile
            if let Ok(pattern) = Pattern::new(*name, regex, *description, *category) {
                patterns.insert(name.to_string(), Arc::new(pattern));
            }
        }

        Self {
            patterns: RwLock::new(patterns),
            path: None,
        }
    }

    /// Create a registry persisted at `path`, overlaying any saved patterns on the built-ins
    pub async fn with_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut registry = Self::new();

        if path.exists() {
            let content = tokio::fs::read_to_string(&path).await?;
            let doc: PatternsDocument = serde_json::from_str(&content)?;
            let mut patterns = registry.patterns.write().await;
            for (name, spec) in doc.patterns {
                let pattern = Pattern::new(&name, &spec.pattern, spec.description, spec.category)?;
                patterns.insert(name, Arc::new(pattern));
            }
            info!("Loaded {} patterns from {:?}", patterns.len(), path);
        }

        registry.path = Some(path);
        Ok(registry)
    }

    /// Compile and register a pattern, replacing any pattern with the same name
    pub async fn register(
        &self,
        name: &str,
        regex: &str,
        description: &str,
        category: &str,
    ) -> Result<PatternInfo> {
        let pattern = Pattern::new(name, regex, description, category)?;
        let info = pattern.info();

        {
            let mut patterns = self.patterns.write().await;
            patterns.insert(name.to_string(), Arc::new(pattern));
        }
        debug!("Registered pattern '{}'", name);

        self.persist().await?;
        Ok(info)
    }

    /// Look up a pattern by name
    pub async fn get(&self, name: &str) -> Result<Arc<Pattern>> {
        self.patterns
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| Error::PatternNotFound(name.to_string()))
    }

    /// Patterns whose name, category or description contains `filter` (case-insensitive)
    pub async fn list(&self, filter: Option<&str>) -> Vec<PatternInfo> {
        let needle = filter
            .map(|f| f.trim().to_lowercase())
            .filter(|f| !f.is_empty());
        let patterns = self.patterns.read().await;

        patterns
            .values()
            .filter(|p| match &needle {
                Some(n) => {
                    p.name.to_lowercase().contains(n)
                        || p.category.to_lowercase().contains(n)
                        || p.description.to_lowercase().contains(n)
                }
                None => true,
            })
            .map(|p| p.info())
            .collect()
    }

    /// Try a registered pattern against a sample line
    pub async fn test(&self, name: &str, sample: &str) -> Result<PatternTest> {
        let pattern = self.get(name).await?;
        let captures = match pattern.regex.captures(sample) {
            Some(caps) => pattern
                .regex
                .capture_names()
                .flatten()
                .filter_map(|g| caps.name(g).map(|m| (g.to_string(), m.as_str().to_string())))
                .collect(),
            None => {
                return Ok(PatternTest {
                    pattern: name.to_string(),
                    matched: false,
                    captures: BTreeMap::new(),
                })
            }
        };

        Ok(PatternTest {
            pattern: name.to_string(),
            matched: true,
            captures,
        })
    }

    /// Write the patterns document, if a path is configured
    async fn persist(&self) -> Result<()> {
        let path = match &self.path {
            Some(path) => path,
            None => return Ok(()),
        };

        let doc = {
            let patterns = self.patterns.read().await;
            PatternsDocument {
                patterns: patterns
                    .values()
                    .map(|p| {
                        (
                            p.name.clone(),
                            PatternSpec {
                                pattern: p.as_str().to_string(),
                                description: p.description.clone(),
                                category: p.category.clone(),
                            },
                        )
                    })
                    .collect(),
            }
        };
        let content = serde_json::to_string_pretty(&doc)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, content).await?;
        debug!("Saved patterns to {:?}", path);
        Ok(())
    }
}
