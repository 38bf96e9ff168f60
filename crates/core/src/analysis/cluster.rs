//! Greedy single-pass similarity clustering

use serde::{Deserialize, Serialize};

use super::similarity::jaro_winkler;
use crate::{Error, Result};

/// Similarity needed to join a cluster when the caller gives none
pub const DEFAULT_THRESHOLD: f64 = 0.85;

/// A group of near-duplicate strings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    /// First member seen; every later member was compared against it
    pub exemplar: String,
    pub members: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl Cluster {
    pub fn size(&self) -> usize {
        self.members.len()
    }
}

/// Reject thresholds outside `[0, 1]` (NaN included)
pub fn validate_threshold(threshold: f64) -> Result<()> {
    if (0.0..=1.0).contains(&threshold) {
        Ok(())
    } else {
        Err(Error::Validation(format!(
            "Threshold must be between 0 and 1, got {}",
            threshold
        )))
    }
}

/// Cluster `items` by index.
///
/// Each item joins the first existing cluster whose exemplar scores at
/// least `threshold`, otherwise it starts a new one. Clusters come back
/// largest first; equal sizes keep creation order.
pub(crate) fn cluster_indices<S: AsRef<str>>(items: &[S], threshold: f64) -> Vec<Vec<usize>> {
    // Arena of clusters; element 0 of each is the exemplar
    let mut clusters: Vec<Vec<usize>> = Vec::new();

    for (i, item) in items.iter().enumerate() {
        let item = item.as_ref();
        let home = clusters
            .iter()
            .position(|members| jaro_winkler(item, items[members[0]].as_ref()) >= threshold);
        match home {
            Some(c) => clusters[c].push(i),
            None => clusters.push(vec![i]),
        }
    }

    clusters.sort_by(|a, b| b.len().cmp(&a.len()));
    clusters
}

/// Group near-duplicate strings
pub fn group_similar<S: AsRef<str>>(items: &[S], threshold: f64) -> Result<Vec<Cluster>> {
    validate_threshold(threshold)?;

    let clusters = cluster_indices(items, threshold)
        .into_iter()
        .map(|members| Cluster {
            exemplar: items[members[0]].as_ref().to_string(),
            members: members
                .iter()
                .map(|&i| items[i].as_ref().to_string())
                .collect(),
            code: None,
        })
        .collect();
    Ok(clusters)
}
