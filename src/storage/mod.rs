//! Storage backends.
//!
//! [`traits::OmStore`] is the narrow command surface the mapper consumes;
//! [`redis::RedisStore`] is the production backend, [`memory::InMemoryStore`]
//! the test double for everything except search itself.

pub mod memory;
pub mod redis;
pub mod traits;

pub use memory::InMemoryStore;
pub use redis::RedisStore;
pub use traits::{
    HitPayload, KeyKind, OmStore, SearchHit, SearchPage, SearchRequest, SortBy, StorageError,
};
