//! Infrastructure-backed publishers.
//!
//! The `EventPublisher` seam lives in `instructor-events`; this module adds
//! the Redis transport behind the `redis` feature.

#[cfg(feature = "redis")]
pub mod redis_streams;

#[cfg(feature = "redis")]
pub use redis_streams::RedisStreamsPublisher;
