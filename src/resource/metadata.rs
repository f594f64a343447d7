//! Per-key metadata: loading, outdated, error and includes state.

use std::collections::HashMap;

use indexmap::IndexSet;

use super::error::ResourceError;
use super::key::Key;

/// State tracked for one key of a resource.
#[derive(Debug, Clone)]
pub struct ResourceMetadata {
  /// The cached value must be re-fetched before it is authoritative.
  pub outdated: bool,
  /// A fetch covering this key is running.
  pub loading: bool,
  /// Last fetch failure, cleared by the next successful load.
  pub exception: Option<ResourceError>,
  /// Optional fields already loaded for this key.
  pub includes: IndexSet<String>,
}

impl ResourceMetadata {
  pub fn new(default_includes: &IndexSet<String>) -> Self {
    Self {
      outdated: true,
      loading: false,
      exception: None,
      includes: default_includes.clone(),
    }
  }

  /// Whether all of `includes` were loaded for this key.
  pub fn has_includes<I>(&self, includes: I) -> bool
  where
    I: IntoIterator,
    I::Item: AsRef<str>,
  {
    includes
      .into_iter()
      .all(|include| self.includes.contains(include.as_ref()))
  }

  pub fn commit_includes<I>(&mut self, includes: I)
  where
    I: IntoIterator,
    I::Item: AsRef<str>,
  {
    for include in includes {
      if !self.includes.contains(include.as_ref()) {
        self.includes.insert(include.as_ref().to_string());
      }
    }
  }
}

/// Lazily populated map of key to metadata.
///
/// A record is created with default values on first access and lives until the
/// key is deleted, so repeated lookups of a key hit the same record.
#[derive(Debug)]
pub struct MetadataMap<K> {
  entries: HashMap<K, ResourceMetadata>,
  default_includes: IndexSet<String>,
}

impl<K: Key> MetadataMap<K> {
  pub fn new(default_includes: IndexSet<String>) -> Self {
    Self {
      entries: HashMap::new(),
      default_includes,
    }
  }

  pub fn default_includes(&self) -> &IndexSet<String> {
    &self.default_includes
  }

  /// Record for `key`, created with defaults if absent.
  pub fn get(&mut self, key: &K) -> &mut ResourceMetadata {
    let defaults = &self.default_includes;
    self
      .entries
      .entry(key.clone())
      .or_insert_with(|| ResourceMetadata::new(defaults))
  }

  /// Record for `key` without creating one.
  #[cfg(test)]
  pub fn peek(&self, key: &K) -> Option<&ResourceMetadata> {
    self.entries.get(key)
  }

  pub fn delete(&mut self, key: &K) -> Option<ResourceMetadata> {
    self.entries.remove(key)
  }

  pub fn clear(&mut self) {
    self.entries.clear();
  }

  #[cfg(test)]
  pub fn len(&self) -> usize {
    self.entries.len()
  }

  /// Reset every record's includes to the defaults.
  pub fn reset_includes(&mut self) {
    for metadata in self.entries.values_mut() {
      metadata.includes = self.default_includes.clone();
    }
  }
}
