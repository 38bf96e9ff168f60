//! Log analysis
//!
//! Named regex patterns, structured extraction, Jaro-Winkler clustering and
//! the build-error pipeline that composes them.

mod build_errors;
mod cluster;
mod extract;
mod pattern;
mod similarity;

pub use build_errors::{group_build_errors, BuildErrorRow};
pub use cluster::{group_similar, validate_threshold, Cluster, DEFAULT_THRESHOLD};
pub use extract::{extract, ExtractedRecord};
pub use pattern::{Pattern, PatternInfo, PatternRegistry, PatternTest};
pub use similarity::jaro_winkler;
