//! Reference analysis cache
//!
//! Reference vocals are analyzed once per song and audio version, then
//! shared by every request for that song:
//! - In-memory cache with lock-free reads and per-key singleflight builds
//! - Optional persistent store of analyzed contours

pub mod reference;
pub mod store;

pub use reference::{AnalysisSettings, ReferenceCache, ReferenceCacheEntry};
pub use store::{ContourStore, JsonFileStore};
