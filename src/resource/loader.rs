//! The collaborator contract: how a resource fetches its data.

use std::collections::BTreeMap;
use std::future::Future;

use color_eyre::Result;
use futures::future::BoxFuture;

use super::key::ResourceKey;

/// Include flag always present in the includes map handed to loaders.
pub const INCLUDE_BASE: &str = "customIncludeBase";

/// A fetch request for a key-set.
#[derive(Debug, Clone)]
pub struct LoadRequest<K> {
  /// The requested key-set. Aliases are passed unresolved so the loader can
  /// issue a bulk request for them.
  pub key: ResourceKey<K>,
  /// Flags for every include the response should carry.
  pub includes: BTreeMap<String, bool>,
  /// Set when the caller asked for an unconditional re-fetch.
  pub refresh: bool,
}

impl<K> LoadRequest<K> {
  /// Whether the response should carry the optional field `include`.
  pub fn has_include(&self, include: &str) -> bool {
    self.includes.get(include).copied().unwrap_or(false)
  }
}

/// Entries returned by a loader, in response order.
pub type LoadedEntries<K, V> = Vec<(K, V)>;

/// Supplies data to a cached resource.
///
/// The returned future is spawned onto the runtime, so it must own everything
/// it touches. Errors are stored on every requested key and handed to every
/// caller waiting on the request.
pub trait ResourceLoader<K, V>: Send + Sync + 'static {
  fn load(&self, request: LoadRequest<K>) -> BoxFuture<'static, Result<LoadedEntries<K, V>>>;
}

impl<K, V, F, Fut> ResourceLoader<K, V> for F
where
  F: Fn(LoadRequest<K>) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = Result<LoadedEntries<K, V>>> + Send + 'static,
{
  fn load(&self, request: LoadRequest<K>) -> BoxFuture<'static, Result<LoadedEntries<K, V>>> {
    Box::pin(self(request))
  }
}
