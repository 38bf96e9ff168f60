//! Cache module
//!
//! Named execution results with overwrite-only semantics and an optional
//! durable JSON tier.

mod durable;
mod model;
mod store;

pub use durable::{DurableStore, FileJsonStore, MemoryJsonStore};
pub use model::{CacheEntry, CacheListing};
pub use store::CacheStore;
