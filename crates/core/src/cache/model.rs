//! Cache entry definitions

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::channel::ChannelKind;

/// The stored result of one execution, keyed by a caller-chosen name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub name: String,
    /// Command line or script body, kept so the caller can re-run it
    #[serde(default)]
    pub command: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub channels: BTreeMap<ChannelKind, Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl CacheEntry {
    /// Create an empty entry
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            created_at: Utc::now(),
            channels: BTreeMap::new(),
            exit_code: None,
            duration_ms: None,
        }
    }

    /// Replace the lines of one channel
    pub fn with_lines<I, S>(mut self, channel: ChannelKind, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.channels
            .insert(channel, lines.into_iter().map(Into::into).collect());
        self
    }

    /// Set the exit code
    pub fn with_exit_code(mut self, exit_code: i32) -> Self {
        self.exit_code = Some(exit_code);
        self
    }

    /// Set the run duration
    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// Append a line to a channel. Only used while an entry is being captured.
    pub fn push(&mut self, channel: ChannelKind, line: impl Into<String>) {
        self.channels.entry(channel).or_default().push(line.into());
    }

    /// Lines of a channel; empty when the channel never received output
    pub fn lines(&self, channel: ChannelKind) -> &[String] {
        self.channels
            .get(&channel)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Number of lines in a channel
    pub fn count(&self, channel: ChannelKind) -> usize {
        self.lines(channel).len()
    }

    /// Line counts for every channel
    pub fn counts(&self) -> BTreeMap<ChannelKind, usize> {
        ChannelKind::ALL
            .iter()
            .map(|c| (*c, self.count(*c)))
            .collect()
    }
}

/// Listing row for a cached entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheListing {
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub counts: BTreeMap<ChannelKind, usize>,
}

impl From<&CacheEntry> for CacheListing {
    fn from(entry: &CacheEntry) -> Self {
        Self {
            name: entry.name.clone(),
            created_at: entry.created_at,
            counts: entry.counts(),
        }
    }
}
