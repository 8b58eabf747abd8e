//! Concrete key-value backends

pub mod memory;
#[cfg(feature = "backend-redis")]
pub mod redis;

pub use memory::MemoryBackend;
#[cfg(feature = "backend-redis")]
pub use redis::RedisBackend;
