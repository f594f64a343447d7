//! The cache engine.
//!
//! [`CachedResource`] tracks, for every key, whether its value is present,
//! loading, outdated or errored, and drives the load / refresh / outdate
//! lifecycle on top of a [`ResourceLoader`]:
//!
//! - `load` is a no-op when the key-set is loaded with the requested includes
//!   and not outdated; otherwise it fetches through the single-flight
//!   [`TaskScheduler`].
//! - `refresh` always fetches.
//! - `mark_outdated` is deferred while an overlapping fetch is in flight and
//!   applied when it completes, so a fetch that raced the request cannot leave
//!   the key marked fresh.
//!
//! Aliases (symbolic key-sets such as "all entries") are resolved against the
//! current keys every time they are read.
//!
//! All state mutations are synchronous and happen under one lock; the only
//! suspension point is the loader's future. Events fire after the lock is
//! released, in the turn of the mutation that caused them.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::FutureExt;
use indexmap::{IndexMap, IndexSet};
use tracing::{debug, trace, warn};

use super::error::ResourceError;
use super::executor::SyncExecutor;
use super::key::{Key, OneOrMany, ResourceAlias, ResourceKey, ResourceKeyList};
use super::loader::{LoadRequest, LoadedEntries, ResourceLoader, INCLUDE_BASE};
use super::metadata::MetadataMap;
use super::scheduler::{Schedule, TaskFuture, TaskHandle, TaskScheduler};

/// Maps the current keys of a resource to the keys an alias stands for.
pub type AliasResolver<K> = Arc<dyn Fn(&[K]) -> Vec<K> + Send + Sync>;

pub(super) struct AliasEntry<K> {
  alias: ResourceAlias,
  resolver: AliasResolver<K>,
  /// A load of the alias returns every entry of the resource.
  exhaustive: bool,
}

pub(super) struct ResourceState<K, V> {
  pub(super) data: IndexMap<K, V>,
  pub(super) metadata: MetadataMap<K>,
  /// Aliases that have been materialized at least once.
  pub(super) loaded_keys: Vec<ResourceAlias>,
  aliases: Vec<AliasEntry<K>>,
}

impl<K: Key, V> ResourceState<K, V> {
  fn alias_entry(&self, alias: ResourceAlias) -> Option<&AliasEntry<K>> {
    self.aliases.iter().find(|entry| entry.alias == alias)
  }

  fn is_alias_loaded(&self, alias: ResourceAlias) -> bool {
    self.loaded_keys.contains(&alias)
  }

  fn mark_alias_loaded(&mut self, alias: ResourceAlias) {
    if !self.is_alias_loaded(alias) {
      self.loaded_keys.push(alias);
    }
  }

  /// Resolve an alias to the concrete list it stands for right now. Other
  /// key-sets are returned as they are. An unknown alias resolves to an empty
  /// list.
  pub(super) fn resolve(&self, key: &ResourceKey<K>) -> ResourceKey<K> {
    match key {
      ResourceKey::Alias(alias) => {
        let keys = match self.alias_entry(*alias) {
          Some(entry) => {
            let current: Vec<K> = self.data.keys().cloned().collect();
            (entry.resolver)(&current)
          }
          None => Vec::new(),
        };
        ResourceKey::List(ResourceKeyList::with_mark(keys, *alias))
      }
      _ => key.clone(),
    }
  }

  fn all_keys(&self) -> ResourceKey<K> {
    ResourceKey::list(self.data.keys().cloned())
  }
}

/// Payload of the `on_data_error` event.
#[derive(Debug, Clone)]
pub struct DataError<K> {
  pub key: ResourceKey<K>,
  pub exception: ResourceError,
}

/// Lifecycle events of a resource.
pub(super) struct ResourceEvents<K> {
  pub(super) on_item_add: SyncExecutor<ResourceKey<K>>,
  pub(super) on_item_delete: SyncExecutor<ResourceKey<K>>,
  pub(super) on_data_error: SyncExecutor<DataError<K>>,
  pub(super) on_data_outdated: SyncExecutor<ResourceKey<K>>,
}

struct ResourceInner<K, V> {
  name: &'static str,
  state: Mutex<ResourceState<K, V>>,
  scheduler: TaskScheduler<K>,
  loader: Box<dyn ResourceLoader<K, V>>,
  events: ResourceEvents<K>,
}

/// Keyed cache with per-key lifecycle tracking.
///
/// Cloning is cheap and yields a handle to the same cache.
pub struct CachedResource<K, V> {
  inner: Arc<ResourceInner<K, V>>,
}

impl<K, V> Clone for CachedResource<K, V> {
  fn clone(&self) -> Self {
    Self {
      inner: Arc::clone(&self.inner),
    }
  }
}

impl<K, V> fmt::Debug for CachedResource<K, V> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CachedResource")
      .field("name", &self.inner.name)
      .finish_non_exhaustive()
  }
}

impl<K, V> CachedResource<K, V>
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

  /// Create a resource whose keys carry `default_includes` from the start.
  pub fn with_includes<L>(name: &'static str, loader: L, default_includes: &[&str]) -> Self
  where
    L: ResourceLoader<K, V>,
  {
    let default_includes = default_includes.iter().map(|s| s.to_string()).collect();
    Self {
      inner: Arc::new(ResourceInner {
        name,
        state: Mutex::new(ResourceState {
          data: IndexMap::new(),
          metadata: MetadataMap::new(default_includes),
          loaded_keys: Vec::new(),
          aliases: Vec::new(),
        }),
        scheduler: TaskScheduler::new(name),
        loader: Box::new(loader),
        events: ResourceEvents {
          on_item_add: SyncExecutor::new(),
          on_item_delete: SyncExecutor::new(),
          on_data_error: SyncExecutor::new(),
          on_data_outdated: SyncExecutor::new(),
        },
      }),
    }
  }

  pub fn name(&self) -> &'static str {
    self.inner.name
  }

  pub(super) fn state(&self) -> MutexGuard<'_, ResourceState<K, V>> {
    self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  pub(super) fn events(&self) -> &ResourceEvents<K> {
    &self.inner.events
  }

  /// Fired with the key-set of every failed fetch.
  pub fn on_data_error(&self) -> &SyncExecutor<DataError<K>> {
    &self.inner.events.on_data_error
  }

  /// Fired with the affected key-set whenever keys are marked outdated.
  pub fn on_data_outdated(&self) -> &SyncExecutor<ResourceKey<K>> {
    &self.inner.events.on_data_outdated
  }

  /// Register `alias`; `resolver` receives the current keys each time the
  /// alias is read.
  pub fn add_alias<F>(&self, alias: ResourceAlias, resolver: F)
  where
    F: Fn(&[K]) -> Vec<K> + Send + Sync + 'static,
  {
    self.register_alias(alias, Arc::new(resolver), false);
  }

  pub(super) fn register_alias(
    &self,
    alias: ResourceAlias,
    resolver: AliasResolver<K>,
    exhaustive: bool,
  ) {
    let mut state = self.state();
    state.aliases.retain(|entry| entry.alias != alias);
    state.aliases.push(AliasEntry {
      alias,
      resolver,
      exhaustive,
    });
  }

  /// Whether `key` is, or was resolved from, a registered alias.
  pub fn is_alias(&self, key: &ResourceKey<K>) -> bool {
    key
      .mark()
      .is_some_and(|mark| self.state().alias_entry(mark).is_some())
  }

  /// Whether the alias of `key` has been materialized. Concrete key-sets
  /// always count as loaded here.
  pub fn is_alias_loaded(&self, key: &ResourceKey<K>) -> bool {
    match key {
      ResourceKey::Alias(alias) => self.state().is_alias_loaded(*alias),
      _ => true,
    }
  }

  /// Resolve aliases to the concrete key list they currently stand for.
  pub fn transform_param(&self, key: &ResourceKey<K>) -> ResourceKey<K> {
    self.state().resolve(key)
  }

  /// Values for a key-set: a scalar for a single key, a parallel vector
  /// otherwise.
  pub fn get(&self, key: &ResourceKey<K>) -> OneOrMany<Option<V>> {
    let state = self.state();
    state.resolve(key).map(|k| state.data.get(k).cloned())
  }

  pub fn get_one(&self, key: &K) -> Option<V> {
    self.state().data.get(key).cloned()
  }

  pub fn has(&self, key: &K) -> bool {
    self.state().data.contains_key(key)
  }

  /// Present keys, in insertion order.
  pub fn keys(&self) -> Vec<K> {
    self.state().data.keys().cloned().collect()
  }

  /// Present values, in insertion order.
  pub fn values(&self) -> Vec<V> {
    self.state().data.values().cloned().collect()
  }

  pub fn len(&self) -> usize {
    self.state().data.len()
  }

  pub fn is_empty(&self) -> bool {
    self.state().data.is_empty()
  }

  /// Every key of the set is present and carries all of `includes`. An alias
  /// that was never materialized is not loaded.
  pub fn is_loaded(&self, key: &ResourceKey<K>, includes: &[&str]) -> bool {
    self.is_loaded_with(key, includes.iter())
  }

  fn is_loaded_with<I>(&self, key: &ResourceKey<K>, includes: I) -> bool
  where
    I: IntoIterator + Clone,
    I::Item: AsRef<str>,
  {
    let mut guard = self.state();
    let state = &mut *guard;

    if let ResourceKey::Alias(alias) = key {
      if !state.is_alias_loaded(*alias) {
        return false;
      }
    }

    state.resolve(key).every(|k| {
      state.data.contains_key(k) && state.metadata.get(k).has_includes(includes.clone())
    })
  }

  /// Any key of the set is outdated. An alias that was never materialized is
  /// outdated.
  pub fn is_outdated(&self, key: &ResourceKey<K>) -> bool {
    let mut guard = self.state();
    let state = &mut *guard;

    if let ResourceKey::Alias(alias) = key {
      if !state.is_alias_loaded(*alias) {
        return true;
      }
    }

    state
      .resolve(key)
      .some(|k| state.metadata.get(k).outdated)
  }

  /// Any key of the set is being fetched.
  pub fn is_data_loading(&self, key: &ResourceKey<K>) -> bool {
    let loading = {
      let mut guard = self.state();
      let state = &mut *guard;
      state.resolve(key).some(|k| state.metadata.get(k).loading)
    };
    loading || (key.is_alias() && self.inner.scheduler.is_executing(key))
  }

  /// A fetch overlapping `key` (or any fetch, without a key) is in flight.
  pub fn is_executing(&self, key: Option<&ResourceKey<K>>) -> bool {
    match key {
      Some(key) => self.inner.scheduler.is_executing(key),
      None => self.inner.scheduler.executing(),
    }
  }

  /// Last fetch error per key, shaped like the key-set.
  pub fn get_exception(&self, key: &ResourceKey<K>) -> OneOrMany<Option<ResourceError>> {
    let mut guard = self.state();
    let state = &mut *guard;
    state
      .resolve(key)
      .map(|k| state.metadata.get(k).exception.clone())
  }

  /// Includes loaded for the first key of the set, or the defaults.
  pub fn get_includes(&self, key: Option<&ResourceKey<K>>) -> Vec<String> {
    let mut guard = self.state();
    let state = &mut *guard;

    let first = key.and_then(|key| state.resolve(key).first().cloned());
    match first {
      Some(first) => state.metadata.get(&first).includes.iter().cloned().collect(),
      None => state.metadata.default_includes().iter().cloned().collect(),
    }
  }

  /// Flag map handed to loaders: the base flag, the default includes, the
  /// requested `includes` and whatever the key already carries.
  pub fn get_includes_map(
    &self,
    key: Option<&ResourceKey<K>>,
    includes: &[&str],
  ) -> BTreeMap<String, bool> {
    let key_includes = self.get_includes(key);
    let defaults: Vec<String> = self
      .state()
      .metadata
      .default_includes()
      .iter()
      .cloned()
      .collect();

    std::iter::once(INCLUDE_BASE.to_string())
      .chain(defaults)
      .chain(includes.iter().map(|s| s.to_string()))
      .chain(key_includes)
      .map(|include| (include, true))
      .collect()
  }

  /// Mark a key-set outdated, or everything when `key` is `None`.
  ///
  /// While an overlapping fetch is in flight the request is parked and applied
  /// once the fetch has completed.
  pub fn mark_outdated(&self, key: Option<&ResourceKey<K>>) {
    if self.inner.scheduler.defer_outdate(key) {
      debug!(resource = self.name(), key = ?key, "outdate deferred until fetch completes");
      return;
    }
    self.mark_outdated_sync(key);
  }

  fn mark_outdated_sync(&self, key: Option<&ResourceKey<K>>) {
    let outdated = {
      let mut guard = self.state();
      let state = &mut *guard;

      let outdated = match key {
        None => {
          let loaded = std::mem::take(&mut state.loaded_keys);
          let mut parts = vec![state.all_keys()];
          parts.extend(loaded.iter().map(|alias| state.resolve(&alias.key())));
          state.metadata.reset_includes();
          ResourceKey::join(parts)
        }
        Some(key) => {
          if let ResourceKey::Alias(alias) = key {
            state.loaded_keys.retain(|loaded| loaded != alias);
          }
          state.resolve(key)
        }
      };

      outdated.for_each(|k, _| state.metadata.get(k).outdated = true);
      outdated
    };

    trace!(resource = self.name(), key = ?outdated, "marked outdated");
    self.inner.events.on_data_outdated.execute(&outdated);
  }

  /// Clear the outdated flag without fetching, or for every present key when
  /// `key` is `None`. Marking an alias updated registers it as materialized.
  pub fn mark_updated(&self, key: Option<&ResourceKey<K>>) {
    let mut guard = self.state();
    let state = &mut *guard;

    let key = match key {
      None => state.all_keys(),
      Some(key) => {
        if let ResourceKey::Alias(alias) = key {
          state.mark_alias_loaded(*alias);
        }
        state.resolve(key)
      }
    };

    key.for_each(|k, _| state.metadata.get(k).outdated = false);
  }

  /// Forget stored fetch errors, for every present key when `key` is `None`.
  pub fn clean_error(&self, key: Option<&ResourceKey<K>>) {
    let mut guard = self.state();
    let state = &mut *guard;

    let key = match key {
      None => state.all_keys(),
      Some(key) => state.resolve(key),
    };

    key.for_each(|k, _| state.metadata.get(k).exception = None);
  }

  fn mark_data_loading(&self, key: &ResourceKey<K>) {
    let mut guard = self.state();
    let state = &mut *guard;
    state
      .resolve(key)
      .for_each(|k, _| state.metadata.get(k).loading = true);
  }

  fn mark_data_error(&self, key: &ResourceKey<K>, exception: ResourceError) {
    let key = {
      let mut guard = self.state();
      let state = &mut *guard;
      let key = state.resolve(key);
      key.for_each(|k, _| {
        let metadata = state.metadata.get(k);
        metadata.exception = Some(exception.clone());
        metadata.loading = false;
      });
      key
    };

    self
      .inner
      .events
      .on_data_error
      .execute(&DataError { key, exception });
  }

  /// Values for `key`, fetching first unless the key-set is loaded with
  /// `includes` and not outdated.
  pub async fn load(
    &self,
    key: &ResourceKey<K>,
    includes: &[&str],
  ) -> Result<OneOrMany<Option<V>>, ResourceError> {
    self.load_data(key, false, includes).await?;
    Ok(self.get(key))
  }

  /// Values for `key` after an unconditional fetch.
  pub async fn refresh(
    &self,
    key: &ResourceKey<K>,
    includes: &[&str],
  ) -> Result<OneOrMany<Option<V>>, ResourceError> {
    self.load_data(key, true, includes).await?;
    Ok(self.get(key))
  }

  async fn load_data(
    &self,
    key: &ResourceKey<K>,
    refresh: bool,
    includes: &[&str],
  ) -> Result<(), ResourceError> {
    let includes: IndexSet<String> = includes.iter().map(|s| s.to_string()).collect();
    let mut request = key.clone();

    loop {
      if !refresh && self.is_satisfied(key, &includes) {
        return Ok(());
      }

      match self.inner.scheduler.schedule(&request, &includes) {
        // A fetch issued before this call cannot stand in for a refresh.
        Schedule::Join(task) if !refresh => {
          debug!(resource = self.name(), key = ?key, "joining in-flight fetch");
          return task.await;
        }
        Schedule::Join(task) | Schedule::Wait(task) => {
          debug!(resource = self.name(), key = ?key, "waiting for overlapping fetch");
          // The outcome is re-evaluated on the next iteration.
          let _ = task.await;
          if !refresh {
            request = self.uncovered(key, &includes);
          }
        }
        Schedule::Run(handle) => {
          // Another caller may have committed between the check above and
          // claiming the task.
          if !refresh && self.is_satisfied(key, &includes) {
            self.finish_task(handle, Ok(()));
            return Ok(());
          }
          return self.start(handle, request, includes, refresh).await;
        }
      }
    }
  }

  fn is_satisfied(&self, key: &ResourceKey<K>, includes: &IndexSet<String>) -> bool {
    self.is_loaded_with(key, includes) && !self.is_outdated(key)
  }

  /// Retire a task, apply the outdates parked behind it and wake its waiters.
  fn finish_task(&self, handle: TaskHandle, outcome: Result<(), ResourceError>) {
    for deferred in self.inner.scheduler.finish(handle.id()) {
      debug!(resource = self.name(), key = ?deferred, "applying deferred outdate");
      self.mark_outdated_sync(deferred.as_ref());
    }

    handle.complete(outcome);
  }

  /// The keys of an anonymous list that are still missing, outdated or lack
  /// `includes`. Other key-sets are fetched as a whole.
  fn uncovered(&self, key: &ResourceKey<K>, includes: &IndexSet<String>) -> ResourceKey<K> {
    let ResourceKey::List(list) = key else {
      return key.clone();
    };
    if list.mark().is_some() {
      return key.clone();
    }

    let mut guard = self.state();
    let state = &mut *guard;
    let pending: Vec<K> = list
      .keys()
      .iter()
      .filter(|k| {
        let metadata = state.metadata.get(k);
        !state.data.contains_key(*k) || metadata.outdated || !metadata.has_includes(includes)
      })
      .cloned()
      .collect();

    if pending.is_empty() {
      key.clone()
    } else {
      ResourceKey::list(pending)
    }
  }

  /// Mark the key-set loading and spawn the fetch. The fetch runs to
  /// completion even if every caller stops waiting for it.
  fn start(
    &self,
    handle: TaskHandle,
    key: ResourceKey<K>,
    includes: IndexSet<String>,
    refresh: bool,
  ) -> TaskFuture {
    let task = handle.future();
    self.mark_data_loading(&key);
    let known = self.exhaustive_keys(&key);

    let requested: Vec<&str> = includes.iter().map(String::as_str).collect();
    let request = LoadRequest {
      includes: self.get_includes_map(Some(&key), &requested),
      key: key.clone(),
      refresh,
    };

    let resource = self.clone();
    tokio::spawn(async move {
      resource
        .execute(handle, key, request, includes, known)
        .await
    });

    task
  }

  /// Keys an exhaustive alias stands for when its fetch starts. Only these can
  /// be dropped as stale; entries set while the fetch runs are kept.
  fn exhaustive_keys(&self, key: &ResourceKey<K>) -> Option<Vec<K>> {
    let ResourceKey::Alias(alias) = key else {
      return None;
    };

    let state = self.state();
    state
      .alias_entry(*alias)
      .filter(|entry| entry.exhaustive)
      .map(|_| state.resolve(key).as_slice().to_vec())
  }

  async fn execute(
    self,
    handle: TaskHandle,
    key: ResourceKey<K>,
    request: LoadRequest<K>,
    includes: IndexSet<String>,
    known: Option<Vec<K>>,
  ) {
    let name = self.name();
    debug!(resource = name, key = ?key, refresh = request.refresh, "fetching");

    let loader = &self.inner.loader;
    let result = AssertUnwindSafe(async { loader.load(request).await })
      .catch_unwind()
      .await;

    let outcome = match result {
      Ok(Ok(entries)) => {
        self.commit(&key, entries, &includes, known);
        Ok(())
      }
      Ok(Err(report)) => Err(ResourceError::fetch(name, report)),
      Err(_) => Err(ResourceError::interrupted(name)),
    };

    if let Err(error) = &outcome {
      warn!(resource = name, key = ?key, error = %error, "fetch failed");
      self.mark_data_error(&key, error.clone());
    }

    self.finish_task(handle, outcome);
  }

  /// Store a successful fetch: values in, metadata fresh, includes recorded.
  fn commit(
    &self,
    key: &ResourceKey<K>,
    entries: LoadedEntries<K, V>,
    includes: &IndexSet<String>,
    known: Option<Vec<K>>,
  ) {
    let (mut added, stale) = {
      let mut guard = self.state();
      let state = &mut *guard;

      let requested = state.resolve(key);
      let mut added = Vec::with_capacity(entries.len());

      for (k, value) in entries {
        let metadata = state.metadata.get(&k);
        metadata.outdated = false;
        metadata.loading = false;
        metadata.exception = None;
        metadata.commit_includes(includes);
        state.data.insert(k.clone(), value);
        added.push(k);
      }

      // Requested keys missing from the response keep their flags but are no
      // longer loading.
      requested.for_each(|k, _| state.metadata.get(k).loading = false);

      if let ResourceKey::Alias(alias) = key {
        state.mark_alias_loaded(*alias);
      }

      let mut stale = Vec::new();
      if let Some(known) = known {
        let returned: HashSet<&K> = added.iter().collect();
        stale = known
          .into_iter()
          .filter(|k| !returned.contains(k) && state.data.contains_key(k))
          .collect();
      }

      (added, stale)
    };

    debug!(
      resource = self.name(),
      key = ?key,
      loaded = added.len(),
      removed = stale.len(),
      "fetch committed"
    );

    if !added.is_empty() {
      let added = match key {
        ResourceKey::Single(_) if added.len() == 1 => ResourceKey::Single(added.remove(0)),
        _ => ResourceKey::list(added),
      };
      self.inner.events.on_item_add.execute(&added);
    }

    if !stale.is_empty() {
      self.delete_entries(&ResourceKey::list(stale));
    }
  }

  /// Write values, mark them updated, then fire `on_item_add` with `key`.
  pub(super) fn set_entries(&self, key: ResourceKey<K>, entries: Vec<(K, V)>) {
    {
      let mut guard = self.state();
      let state = &mut *guard;
      for (k, value) in entries {
        state.metadata.get(&k).outdated = false;
        state.data.insert(k, value);
      }
      if let ResourceKey::Alias(alias) = &key {
        state.mark_alias_loaded(*alias);
      }
    }

    trace!(resource = self.name(), key = ?key, "set");
    self.inner.events.on_item_add.execute(&key);
  }

  /// Fire `on_item_delete`, then drop values and metadata of the key-set.
  pub(super) fn delete_entries(&self, key: &ResourceKey<K>) {
    let resolved = self.transform_param(key);
    self.inner.events.on_item_delete.execute(&resolved);

    let mut guard = self.state();
    let state = &mut *guard;
    resolved.for_each(|k, _| {
      state.data.shift_remove(k);
      state.metadata.delete(k);
    });
    if let ResourceKey::Alias(alias) = key {
      state.mark_alias_loaded(*alias);
    }

    trace!(resource = self.name(), key = ?resolved, "deleted");
  }

  /// Drop every value, metadata record and materialized alias.
  pub(super) fn clear_entries(&self) {
    let mut state = self.state();
    state.data.clear();
    state.metadata.clear();
    state.loaded_keys.clear();
  }

  /// Every key of the set already carries all of `includes`.
  pub(super) fn includes_loaded(&self, key: &ResourceKey<K>, includes: &[&str]) -> bool {
    let mut guard = self.state();
    let state = &mut *guard;
    state
      .resolve(key)
      .every(|k| state.metadata.get(k).has_includes(includes))
  }
}
