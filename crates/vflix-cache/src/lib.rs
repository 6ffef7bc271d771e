//! Response cache shared by catalogue readers.
//!
//! Readers store rendered responses here. Writers invalidate the whole
//! cache whenever the asset set changes.

pub mod cache;
pub mod config;
pub mod error;
pub mod memory;
pub mod redis_cache;

pub use cache::{invalidate, ResponseCache};
pub use config::{CacheConfig, CachePolicy};
pub use error::{CacheError, CacheResult};
pub use memory::InMemoryResponseCache;
pub use redis_cache::RedisResponseCache;
