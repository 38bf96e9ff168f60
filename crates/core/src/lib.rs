//! Core library for runcache
//!
//! This crate contains the capture-independent logic, including:
//! - Output channels and cached execution results
//! - The two-tier cache store
//! - Summaries
//! - Pattern extraction and similarity clustering

pub mod analysis;
pub mod cache;
pub mod channel;
pub mod error;
pub mod summary;

pub use cache::{CacheEntry, CacheListing, CacheStore};
pub use channel::ChannelKind;
pub use error::Error;
pub use summary::{estimate_tokens, generate_summary, FrequencyRow, Summary};
pub type Result<T> = std::result::Result<T, Error>;
