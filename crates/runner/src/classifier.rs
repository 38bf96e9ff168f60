//! Output classification: maps each record to exactly one channel

use runcache_core::{CacheEntry, ChannelKind};
use serde_json::{Map, Value};
use tracing::debug;

use crate::record::{OutputRecord, TraceLevel};

/// Classify a record and render it into the lines stored on its channel.
///
/// Structured values are rendered to text here; if rendering fails the
/// record degrades to its compact JSON form so nothing is lost.
pub fn classify(record: OutputRecord) -> (ChannelKind, Vec<String>) {
    match record {
        OutputRecord::Error { message } => (ChannelKind::Error, split_lines(&message)),
        OutputRecord::Warning { message } => (ChannelKind::Warning, split_lines(&message)),
        OutputRecord::Trace { level, message } => {
            let channel = match level {
                TraceLevel::Verbose => ChannelKind::Verbose,
                TraceLevel::Debug => ChannelKind::Debug,
                TraceLevel::Information => ChannelKind::Information,
            };
            (channel, split_lines(&message))
        },
        OutputRecord::Value { text } => (ChannelKind::Output, split_lines(&text)),
        OutputRecord::Object { value } => {
            let lines = render_value(&value).unwrap_or_else(|e| {
                debug!("Falling back to JSON for unrenderable object: {}", e);
                vec![value.to_string()]
            });
            (ChannelKind::Output, lines)
        },
        OutputRecord::Stdout { line } => (ChannelKind::Output, vec![line]),
        // stderr of an external process is its error stream
        OutputRecord::Stderr { line } => (ChannelKind::Error, vec![line]),
        OutputRecord::NativeStderr { line } => (ChannelKind::Stderr, vec![line]),
    }
}

/// Classify a record and append its lines to `entry`
pub fn capture(entry: &mut CacheEntry, record: OutputRecord) {
    let (channel, lines) = classify(record);
    for line in lines {
        entry.push(channel, line);
    }
}

/// Split multi-line text; a single trailing line break does not add an empty line
pub fn split_lines(text: &str) -> Vec<String> {
    let text = text.strip_suffix('\n').unwrap_or(text);
    let text = text.strip_suffix('\r').unwrap_or(text);
    text.split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line).to_string())
        .collect()
}

#[derive(Debug)]
enum RenderError {
    MixedArray,
}

impl std::fmt::Display for RenderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MixedArray => write!(f, "array mixes objects and scalars"),
        }
    }
}

fn render_value(value: &Value) -> Result<Vec<String>, RenderError> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::String(s) => Ok(split_lines(s)),
        Value::Bool(_) | Value::Number(_) => Ok(vec![value.to_string()]),
        Value::Object(map) => Ok(render_list(map)),
        Value::Array(items) => {
            if items.is_empty() {
                return Ok(Vec::new());
            }
            let objects: Vec<&Map<String, Value>> =
                items.iter().filter_map(Value::as_object).collect();
            if objects.len() == items.len() {
                return Ok(render_table(&objects));
            }
            if !objects.is_empty() || items.iter().any(Value::is_array) {
                return Err(RenderError::MixedArray);
            }
            let mut lines = Vec::new();
            for item in items {
                lines.extend(render_value(item)?);
            }
            Ok(lines)
        },
    }
}

fn cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.replace(['\r', '\n'], " "),
        other => other.to_string(),
    }
}

/// `key : value` lines with keys padded to a common width
fn render_list(map: &Map<String, Value>) -> Vec<String> {
    let width = map.keys().map(|k| k.chars().count()).max().unwrap_or(0);
    map.iter()
        .map(|(key, value)| {
            format!("{:<width$} : {}", key, cell(value), width = width)
                .trim_end()
                .to_string()
        })
        .collect()
}

/// Header, dashed rule, then one aligned row per object
fn render_table(rows: &[&Map<String, Value>]) -> Vec<String> {
    let mut columns: Vec<&str> = Vec::new();
    for row in rows {
        for key in row.keys() {
            if !columns.contains(&key.as_str()) {
                columns.push(key);
            }
        }
    }

    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            columns
                .iter()
                .map(|c| row.get(*c).map(cell).unwrap_or_default())
                .collect()
        })
        .collect();

    let widths: Vec<usize> = columns
        .iter()
        .enumerate()
        .map(|(i, c)| {
            cells
                .iter()
                .map(|r| r[i].chars().count())
                .chain(std::iter::once(c.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let format_row = |values: Vec<String>| -> String {
        values
            .iter()
            .zip(&widths)
            .map(|(v, w)| format!("{:<w$}", v, w = *w))
            .collect::<Vec<_>>()
            .join(" ")
            .trim_end()
            .to_string()
    };

    let mut lines = Vec::with_capacity(rows.len() + 2);
    lines.push(format_row(columns.iter().map(|c| c.to_string()).collect()));
    lines.push(format_row(widths.iter().map(|w| "-".repeat(*w)).collect()));
    for row in cells {
        lines.push(format_row(row));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_each_record_kind_routes_to_one_channel() {
        let cases = [
            (OutputRecord::error("e"), ChannelKind::Error),
            (OutputRecord::warning("w"), ChannelKind::Warning),
            (OutputRecord::trace(TraceLevel::Verbose, "v"), ChannelKind::Verbose),
            (OutputRecord::trace(TraceLevel::Debug, "d"), ChannelKind::Debug),
            (OutputRecord::trace(TraceLevel::Information, "i"), ChannelKind::Information),
            (OutputRecord::value("o"), ChannelKind::Output),
            (OutputRecord::Stdout { line: "o".into() }, ChannelKind::Output),
            (OutputRecord::Stderr { line: "e".into() }, ChannelKind::Error),
            (OutputRecord::NativeStderr { line: "s".into() }, ChannelKind::Stderr),
        ];
        for (record, expected) in cases {
            assert_eq!(classify(record).0, expected);
        }
    }

    #[test]
    fn test_split_lines() {
        assert_eq!(split_lines("a\nb\n"), vec!["a", "b"]);
        assert_eq!(split_lines("a\r\nb"), vec!["a", "b"]);
        assert_eq!(split_lines("a\n\nb"), vec!["a", "", "b"]);
        assert_eq!(split_lines(""), vec![""]);
    }

    #[test]
    fn test_object_renders_as_list() {
        let (channel, lines) = classify(OutputRecord::Object {
            value: json!({"name": "svc", "id": 42}),
        });
        assert_eq!(channel, ChannelKind::Output);
        assert_eq!(lines, vec!["id   : 42", "name : svc"]);
    }

    #[test]
    fn test_object_array_renders_as_table() {
        let (_, lines) = classify(OutputRecord::Object {
            value: json!([
                {"name": "alpha", "size": 1},
                {"name": "b", "size": 1024},
            ]),
        });
        assert_eq!(
            lines,
            vec!["name  size", "----- ----", "alpha 1", "b     1024"]
        );
    }

    #[test]
    fn test_scalar_values() {
        let (_, lines) = classify(OutputRecord::Object {
            value: json!([1, "two", true, null]),
        });
        assert_eq!(lines, vec!["1", "two", "true"]);

        let (_, lines) = classify(OutputRecord::Object { value: Value::Null });
        assert!(lines.is_empty());
    }

    #[test]
    fn test_unrenderable_value_degrades_to_json() {
        let value = json!([{"a": 1}, 2]);
        let (channel, lines) = classify(OutputRecord::Object {
            value: value.clone(),
        });
        assert_eq!(channel, ChannelKind::Output);
        assert_eq!(lines, vec![value.to_string()]);
    }

    #[test]
    fn test_capture_appends_in_order() {
        let mut entry = CacheEntry::new("t", "cmd");
        capture(&mut entry, OutputRecord::error("E1\nE2"));
        capture(&mut entry, OutputRecord::error("E1"));
        assert_eq!(entry.lines(ChannelKind::Error), ["E1", "E2", "E1"]);
    }
}
