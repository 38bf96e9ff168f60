//! Build-error grouping: exact by code, fuzzy by message

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::cluster::{cluster_indices, validate_threshold};
use super::extract::{extract, ExtractedRecord};
use super::pattern::Pattern;
use crate::Result;

/// One (code, message-cluster) group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildErrorRow {
    pub count: usize,
    pub code: String,
    /// Exemplar message of the cluster
    pub message: String,
    /// Distinct non-empty `file` values among the members
    pub files: usize,
}

/// Group diagnostics extracted from `lines` with `pattern`.
///
/// The pattern must expose `code` and `message` groups; `file` is optional.
/// Rows come back by count, largest first; ties keep first-seen order.
pub fn group_build_errors<S: AsRef<str>>(
    lines: &[S],
    pattern: &Pattern,
    threshold: f64,
) -> Result<Vec<BuildErrorRow>> {
    validate_threshold(threshold)?;
    pattern.require_groups(&["code", "message"])?;

    let records = extract(pattern, lines);

    // Exact grouping by code, in first-seen order
    let mut order: Vec<&str> = Vec::new();
    let mut by_code: HashMap<&str, Vec<&ExtractedRecord>> = HashMap::new();
    for record in &records {
        let code = record.get("code").unwrap_or_default();
        by_code
            .entry(code)
            .or_insert_with(|| {
                order.push(code);
                Vec::new()
            })
            .push(record);
    }

    let mut rows = Vec::new();
    for code in order {
        let group = &by_code[code];
        let messages: Vec<&str> = group
            .iter()
            .map(|r| r.get("message").unwrap_or_default())
            .collect();

        for members in cluster_indices(&messages, threshold) {
            let files: HashSet<&str> = members
                .iter()
                .filter_map(|&i| group[i].get("file"))
                .filter(|f| !f.is_empty())
                .collect();

            rows.push(BuildErrorRow {
                count: members.len(),
                code: code.to_string(),
                message: messages[members[0]].to_string(),
                files: files.len(),
            });
        }
    }

    rows.sort_by(|a, b| b.count.cmp(&a.count));
    Ok(rows)
}
