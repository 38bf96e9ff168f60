//! Condensed, deterministic reports over a cached entry

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::cache::CacheEntry;
use crate::channel::ChannelKind;

/// Default number of rows reported per channel
pub const DEFAULT_TOP_N: usize = 5;

/// Longest line text rendered in a summary row
pub const MAX_ITEM_CHARS: usize = 80;

/// Rough token count of `text`: one token per four bytes, rounded up
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}

/// Token estimate of every captured line of `entry`, as if joined by newlines
pub fn captured_tokens(entry: &CacheEntry) -> usize {
    let (bytes, lines) = entry
        .channels
        .values()
        .flatten()
        .fold((0usize, 0usize), |(bytes, lines), line| (bytes + line.len(), lines + 1));
    (bytes + lines.saturating_sub(1)).div_ceil(4)
}

/// How often a distinct line occurred
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrequencyRow {
    pub item: String,
    pub count: usize,
}

impl FrequencyRow {
    /// Render as `"{count}x: {text}"` with the text cut to [`MAX_ITEM_CHARS`]
    pub fn render(&self) -> String {
        let text: String = self.item.chars().take(MAX_ITEM_CHARS).collect();
        format!("{}x: {}", self.count, text)
    }
}

/// Count distinct lines, most frequent first; ties keep first-seen order
pub fn frequency_table(lines: &[String]) -> Vec<FrequencyRow> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut rows: Vec<FrequencyRow> = Vec::new();

    for line in lines {
        match index.get(line.as_str()) {
            Some(&i) => rows[i].count += 1,
            None => {
                index.insert(line.as_str(), rows.len());
                rows.push(FrequencyRow {
                    item: line.clone(),
                    count: 1,
                });
            }
        }
    }

    // Stable sort keeps first-seen order among equal counts
    rows.sort_by(|a, b| b.count.cmp(&a.count));
    rows
}

/// Per-channel section of a summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSummary {
    pub channel: ChannelKind,
    pub total: usize,
    pub unique: usize,
    pub top: Vec<FrequencyRow>,
}

/// Token-efficient report of one cached entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub name: String,
    pub output_lines: usize,
    pub channels: Vec<ChannelSummary>,
    pub text: String,
    /// Estimated tokens of `text`
    pub text_tokens: usize,
    /// Estimated tokens of the raw capture the summary stands in for
    pub captured_tokens: usize,
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Summarize the requested channels of `entry`.
///
/// The Output line count is always reported. Channels appear in request
/// order, duplicates dropped.
pub fn generate_summary(entry: &CacheEntry, channels: &[ChannelKind], top_n: usize) -> Summary {
    let output_lines = entry.count(ChannelKind::Output);
    let mut text = vec![format!(
        "Cached as '{}' (Output: {} lines)",
        entry.name, output_lines
    )];

    let mut sections: Vec<ChannelSummary> = Vec::new();
    for &channel in channels {
        if sections.iter().any(|s| s.channel == channel) {
            continue;
        }

        let lines = entry.lines(channel);
        let table = frequency_table(lines);
        let section = ChannelSummary {
            channel,
            total: lines.len(),
            unique: table.len(),
            top: table.into_iter().take(top_n).collect(),
        };

        if section.total == 0 {
            text.push(format!("{}: 0", channel.label()));
        } else {
            text.push(format!(
                "{}: {} ({} unique)",
                channel.label(),
                section.total,
                section.unique
            ));
            for row in &section.top {
                text.push(format!("  {}", row.render()));
            }
        }
        sections.push(section);
    }

    let text = text.join("\n");
    Summary {
        name: entry.name.clone(),
        output_lines,
        channels: sections,
        text_tokens: estimate_tokens(&text),
        captured_tokens: captured_tokens(entry),
        text,
    }
}
