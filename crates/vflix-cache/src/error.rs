//! Cache error types.

use thiserror::Error;

pub type CacheResult<T> = Result<T, CacheError>;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid cache policy: {0}")]
    InvalidPolicy(String),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}
