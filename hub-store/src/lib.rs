//! Tenant and session context storage for the hub.
//!
//! A [`StoreBackend`] provides raw key-value and append-stream operations;
//! [`ContextStore`] layers key namespacing, TTL defaults, and JSON codecs on
//! top. [`MemoryBackend`] keeps everything in process (tests, local runs);
//! [`RedisBackend`] talks to a shared Redis.

#![warn(missing_docs, clippy::pedantic)]

mod backend;
mod memory;
mod redis_backend;
mod store;

pub use backend::{StoreBackend, StoreError, StoreResult, StreamEntry};
pub use memory::MemoryBackend;
pub use redis_backend::RedisBackend;
pub use store::ContextStore;
