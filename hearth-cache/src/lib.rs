//! Result cache for the Hearth record engine.
//!
//! Maps a key to a previously computed result for a fixed time-to-live.
//! Expired entries are never returned: they are dropped lazily on read and
//! eagerly by a background sweeper task (see [`ResultCache::spawn_sweeper`]).
//!
//! Keys follow a `"{table}:..."` layout so that every entry of one entity can
//! be invalidated by prefix:
//! - identity lookups: [`identity_key`] (`"{table}:id:{id}"`)
//! - arbitrary queries: [`query_key`] (`"{table}:query:{sha256(sql, params)}"`)

mod cache;
mod keys;

pub use cache::{CacheStats, MIN_SWEEP_PERIOD, ResultCache};
pub use keys::{entity_prefix, identity_key, identity_prefix, query_fingerprint, query_key};
