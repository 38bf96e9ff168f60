//! Structured field extraction from raw lines

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::pattern::Pattern;

/// Fields captured from one matching line, keyed by group name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtractedRecord(pub BTreeMap<String, String>);

impl ExtractedRecord {
    /// Value of a field; groups that did not participate in the match are empty
    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.0
    }
}

/// Extract one record per matching line; non-matching lines are dropped
pub fn extract<S: AsRef<str>>(pattern: &Pattern, lines: &[S]) -> Vec<ExtractedRecord> {
    let groups = pattern.group_names();

    lines
        .iter()
        .filter_map(|line| pattern.regex.captures(line.as_ref()))
        .map(|caps| {
            ExtractedRecord(
                groups
                    .iter()
                    .map(|g| {
                        let value = caps.name(g).map(|m| m.as_str()).unwrap_or_default();
                        (g.to_string(), value.to_string())
                    })
                    .collect(),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code_pattern() -> Pattern {
        Pattern::new("codes", r"(?<code>[A-Z]+\d+): (?<message>.+)", "", "").unwrap()
    }

    #[test]
    fn test_extract_single_record() {
        let records = extract(&code_pattern(), &["CS0103: name not found"]);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get("code"), Some("CS0103"));
        assert_eq!(records[0].get("message"), Some("name not found"));
        assert_eq!(records[0].fields().len(), 2);
    }

    #[test]
    fn test_non_matching_lines_are_dropped() {
        assert!(extract(&code_pattern(), &["all good"]).is_empty());

        let records = extract(
            &code_pattern(),
            &["noise", "E1: first", "more noise", "W2: second"],
        );
        let codes: Vec<_> = records.iter().filter_map(|r| r.get("code")).collect();
        assert_eq!(codes, vec!["E1", "W2"]);
    }

    #[test]
    fn test_optional_group_is_empty() {
        let pattern = Pattern::new(
            "opt",
            r"^(?<code>[A-Z]+\d+)(?: in (?<file>\S+))?: (?<message>.+)$",
            "",
            "",
        )
        .unwrap();
        let records = extract(&pattern, &["E1: boom"]);
        assert_eq!(records[0].get("file"), Some(""));
    }

    #[test]
    fn test_record_serializes_flat() {
        let records = extract(&code_pattern(), &["CS0103: name not found"]);
        let json = serde_json::to_value(&records[0]).unwrap();
        assert_eq!(json["code"], "CS0103");
        assert_eq!(json["message"], "name not found");
    }
}
