//! Keyed-map specialization of [`CachedResource`].

use std::ops::Deref;
use std::sync::Arc;

use tracing::debug;

use super::cached::CachedResource;
use super::executor::SyncExecutor;
use super::key::{Key, ResourceAlias, ResourceKey, ResourceKeyList};
use super::loader::ResourceLoader;

/// Alias for every entry of a map resource. Loading it fetches the whole
/// collection; entries the loader no longer returns are deleted.
pub const CACHED_MAP_ALL_KEY: ResourceAlias = ResourceAlias::new("all");

/// Mark carried by [`cached_map_empty_key`].
pub const CACHED_MAP_EMPTY_MARK: ResourceAlias = ResourceAlias::new("empty");

/// A key-set denoting no keys at all.
pub fn cached_map_empty_key<K>() -> ResourceKey<K> {
  ResourceKey::List(ResourceKeyList::with_mark(Vec::new(), CACHED_MAP_EMPTY_MARK))
}

/// Cache of key → value entries with add / delete notifications and cascading
/// deletes into dependent resources.
///
/// Derefs to [`CachedResource`] for the load / outdate lifecycle.
pub struct CachedMapResource<K, V> {
  resource: CachedResource<K, V>,
}

impl<K, V> Clone for CachedMapResource<K, V> {
  fn clone(&self) -> Self {
    Self {
      resource: self.resource.clone(),
    }
  }
}

impl<K, V> std::fmt::Debug for CachedMapResource<K, V> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_tuple("CachedMapResource")
      .field(&self.resource)
      .finish()
  }
}

impl<K, V> Deref for CachedMapResource<K, V> {
  type Target = CachedResource<K, V>;

  fn deref(&self) -> &Self::Target {
    &self.resource
  }
}

impl<K, V> CachedMapResource<K, V>
where
  K: Key,
  V: Clone + Send + Sync + 'static,
{
  pub fn new<L>(name: &'static str, loader: L) -> Self
  where
    L: ResourceLoader<K, V>,
  {
    Self::with_includes(name, loader, &[])
  }

  pub fn with_includes<L>(name: &'static str, loader: L, default_includes: &[&str]) -> Self
  where
    L: ResourceLoader<K, V>,
  {
    let resource = CachedResource::with_includes(name, loader, default_includes);
    resource.register_alias(CACHED_MAP_ALL_KEY, Arc::new(|keys: &[K]| keys.to_vec()), true);
    Self { resource }
  }

  /// Fired after entries were written, by `set` or by a fetch.
  pub fn on_item_add(&self) -> &SyncExecutor<ResourceKey<K>> {
    &self.resource.events().on_item_add
  }

  /// Fired before entries are removed, so dependents can react while the
  /// values are still readable.
  pub fn on_item_delete(&self) -> &SyncExecutor<ResourceKey<K>> {
    &self.resource.events().on_item_delete
  }

  /// Write a value and mark it up to date.
  pub fn set(&self, key: K, value: V) {
    self
      .resource
      .set_entries(ResourceKey::Single(key.clone()), vec![(key, value)]);
  }

  /// Write several values at once; `on_item_add` fires once with the list.
  pub fn set_many(&self, entries: impl IntoIterator<Item = (K, V)>) {
    let entries: Vec<(K, V)> = entries.into_iter().collect();
    let key = ResourceKey::list(entries.iter().map(|(k, _)| k.clone()));
    self.resource.set_entries(key, entries);
  }

  /// Remove a key-set. `on_item_delete` fires first; values and metadata are
  /// dropped afterwards.
  pub fn delete(&self, key: &ResourceKey<K>) {
    self.resource.delete_entries(key);
  }

  /// Drop all entries and metadata.
  pub fn clear(&self) {
    self.resource.clear_entries();
  }

  /// Every key of the set has every one of `includes` loaded.
  pub fn is_includes(&self, key: &ResourceKey<K>, includes: &[&str]) -> bool {
    self.resource.includes_loaded(key, includes)
  }

  /// Cascade deletes from this resource into `dependent`.
  ///
  /// `map` translates deleted keys into the dependent's key space; without it
  /// the keys are used as they are. The cascade runs synchronously, before the
  /// entries of this resource are removed.
  pub fn delete_in_resource<T, W, F>(&self, dependent: &CachedMapResource<T, W>, map: F) -> &Self
  where
    T: Key,
    W: Clone + Send + Sync + 'static,
    F: Fn(&ResourceKey<K>) -> ResourceKey<T> + Send + Sync + 'static,
  {
    let dependent = dependent.clone();
    let source = self.name();
    self.on_item_delete().add_handler(move |key| {
      let key = map(key);
      debug!(
        resource = source,
        dependent = dependent.name(),
        key = ?key,
        "cascading delete"
      );
      dependent.delete(&key);
    });
    self
  }

  /// [`delete_in_resource`](Self::delete_in_resource) for dependents keyed the
  /// same way.
  pub fn delete_in_same_keys<W>(&self, dependent: &CachedMapResource<K, W>) -> &Self
  where
    W: Clone + Send + Sync + 'static,
  {
    self.delete_in_resource(dependent, |key| key.clone())
  }
}
