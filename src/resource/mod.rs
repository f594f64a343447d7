//! Reactive keyed cache.
//!
//! A [`CachedResource`] holds values fetched through a [`ResourceLoader`] and
//! tracks per-key metadata (loading, outdated, error, loaded includes). The
//! [`CachedMapResource`] specialization adds item add / delete events, an
//! "all entries" alias and cascading deletes between resources.

mod cached;
mod error;
mod executor;
mod key;
mod loader;
mod map;
mod metadata;
mod scheduler;

#[cfg(test)]
mod tests;

pub use cached::{AliasResolver, CachedResource, DataError};
pub use error::ResourceError;
pub use executor::{HandlerId, SyncExecutor};
pub use key::{Key, OneOrMany, ResourceAlias, ResourceKey, ResourceKeyList};
pub use loader::{LoadRequest, LoadedEntries, ResourceLoader, INCLUDE_BASE};
pub use map::{cached_map_empty_key, CachedMapResource, CACHED_MAP_ALL_KEY, CACHED_MAP_EMPTY_MARK};
