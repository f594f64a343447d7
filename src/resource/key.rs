//! Resource keys: a single key, an ordered list of keys, or a symbolic alias.
//!
//! Every cache operation accepts a [`ResourceKey`] and iterates the atomic keys it
//! denotes. A list may carry a `mark` naming the alias it was resolved from, so an
//! alias resolution stays distinguishable from an equal-valued anonymous list.

use std::fmt::{self, Debug};
use std::hash::Hash;

use indexmap::IndexSet;

/// Bounds required from the atomic key type of a resource.
pub trait Key: Clone + Eq + Hash + Debug + Send + Sync + 'static {}

impl<T> Key for T where T: Clone + Eq + Hash + Debug + Send + Sync + 'static {}

/// A named symbolic key-set, resolved to concrete keys at read time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceAlias(&'static str);

impl ResourceAlias {
  pub const fn new(mark: &'static str) -> Self {
    Self(mark)
  }

  pub fn mark(&self) -> &'static str {
    self.0
  }

  /// Wrap the alias into a key usable with any resource.
  pub fn key<K>(self) -> ResourceKey<K> {
    ResourceKey::Alias(self)
  }
}

impl fmt::Display for ResourceAlias {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "@{}", self.0)
  }
}

/// Ordered list of keys, optionally tagged with the alias it represents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceKeyList<K> {
  keys: Vec<K>,
  mark: Option<ResourceAlias>,
}

impl<K> ResourceKeyList<K> {
  pub fn new(keys: impl IntoIterator<Item = K>) -> Self {
    Self {
      keys: keys.into_iter().collect(),
      mark: None,
    }
  }

  pub fn with_mark(keys: impl IntoIterator<Item = K>, mark: ResourceAlias) -> Self {
    Self {
      keys: keys.into_iter().collect(),
      mark: Some(mark),
    }
  }

  pub fn keys(&self) -> &[K] {
    &self.keys
  }

  pub fn mark(&self) -> Option<ResourceAlias> {
    self.mark
  }

  pub fn len(&self) -> usize {
    self.keys.len()
  }

  pub fn is_empty(&self) -> bool {
    self.keys.is_empty()
  }

  pub fn into_keys(self) -> Vec<K> {
    self.keys
  }
}

/// A key-set: one key, a list of keys, or an unresolved alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceKey<K> {
  Single(K),
  List(ResourceKeyList<K>),
  Alias(ResourceAlias),
}

impl<K> From<K> for ResourceKey<K> {
  fn from(key: K) -> Self {
    ResourceKey::Single(key)
  }
}

/// Result of mapping over a key-set: a scalar for a single key, a parallel
/// vector for lists and aliases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OneOrMany<T> {
  One(T),
  Many(Vec<T>),
}

impl<T> OneOrMany<T> {
  /// The scalar value, if this came from a single key.
  pub fn one(self) -> Option<T> {
    match self {
      OneOrMany::One(value) => Some(value),
      OneOrMany::Many(_) => None,
    }
  }

  pub fn into_vec(self) -> Vec<T> {
    match self {
      OneOrMany::One(value) => vec![value],
      OneOrMany::Many(values) => values,
    }
  }

  pub fn is_many(&self) -> bool {
    matches!(self, OneOrMany::Many(_))
  }
}

impl<T> OneOrMany<Option<T>> {
  /// Flatten a single-key lookup into its value.
  pub fn value(self) -> Option<T> {
    self.one().flatten()
  }
}

impl<K> ResourceKey<K> {
  pub fn single(key: K) -> Self {
    ResourceKey::Single(key)
  }

  pub fn list(keys: impl IntoIterator<Item = K>) -> Self {
    ResourceKey::List(ResourceKeyList::new(keys))
  }

  pub fn is_alias(&self) -> bool {
    matches!(self, ResourceKey::Alias(_))
  }

  pub fn is_list(&self) -> bool {
    matches!(self, ResourceKey::List(_))
  }

  /// The alias mark of an alias or of a list resolved from one.
  pub fn mark(&self) -> Option<ResourceAlias> {
    match self {
      ResourceKey::Single(_) => None,
      ResourceKey::List(list) => list.mark(),
      ResourceKey::Alias(alias) => Some(*alias),
    }
  }

  /// Two key-sets denote the same alias when both carry the same mark.
  pub fn is_alias_equal(&self, other: &ResourceKey<K>) -> bool {
    match (self.mark(), other.mark()) {
      (Some(a), Some(b)) => a == b,
      _ => false,
    }
  }

  /// The atomic keys of this key-set. An unresolved alias has none.
  pub fn as_slice(&self) -> &[K] {
    match self {
      ResourceKey::Single(key) => std::slice::from_ref(key),
      ResourceKey::List(list) => list.keys(),
      ResourceKey::Alias(_) => &[],
    }
  }

  pub fn iter(&self) -> std::slice::Iter<'_, K> {
    self.as_slice().iter()
  }

  /// True only for a list with no keys.
  pub fn is_empty(&self) -> bool {
    match self {
      ResourceKey::List(list) => list.is_empty(),
      _ => false,
    }
  }

  pub fn first(&self) -> Option<&K> {
    self.as_slice().first()
  }

  /// Visit every key; the index is `None` for a single key.
  pub fn for_each(&self, mut f: impl FnMut(&K, Option<usize>)) {
    match self {
      ResourceKey::Single(key) => f(key, None),
      _ => self
        .as_slice()
        .iter()
        .enumerate()
        .for_each(|(i, key)| f(key, Some(i))),
    }
  }

  pub fn map<T>(&self, mut f: impl FnMut(&K) -> T) -> OneOrMany<T> {
    match self {
      ResourceKey::Single(key) => OneOrMany::One(f(key)),
      _ => OneOrMany::Many(self.as_slice().iter().map(f).collect()),
    }
  }

  /// Map the atomic keys into another key space, keeping shape and mark.
  pub fn map_key<T>(&self, mut f: impl FnMut(&K) -> T) -> ResourceKey<T> {
    match self {
      ResourceKey::Single(key) => ResourceKey::Single(f(key)),
      ResourceKey::List(list) => ResourceKey::List(ResourceKeyList {
        keys: list.keys().iter().map(f).collect(),
        mark: list.mark(),
      }),
      ResourceKey::Alias(alias) => ResourceKey::Alias(*alias),
    }
  }

  pub fn every(&self, f: impl FnMut(&K) -> bool) -> bool {
    self.as_slice().iter().all(f)
  }

  pub fn some(&self, f: impl FnMut(&K) -> bool) -> bool {
    self.as_slice().iter().any(f)
  }
}

impl<K: PartialEq> ResourceKey<K> {
  /// Whether every key of `other` is part of this key-set.
  ///
  /// Aliases are compared by mark; an alias never includes a concrete key-set
  /// and vice versa, since its resolution is not known here. Two empty lists
  /// include each other whatever their marks.
  pub fn includes(&self, other: &ResourceKey<K>) -> bool {
    if self.is_empty() && other.is_empty() {
      return true;
    }
    if self.is_alias() || other.is_alias() {
      return self.is_alias_equal(other);
    }
    let keys = self.as_slice();
    other.every(|key| keys.contains(key))
  }

  /// Whether the two key-sets may share a key. Aliases conservatively overlap
  /// everything.
  pub fn intersects(&self, other: &ResourceKey<K>) -> bool {
    if self.is_alias_equal(other) || (self.is_empty() && other.is_empty()) {
      return true;
    }
    if self.is_alias() || other.is_alias() {
      return true;
    }
    let keys = self.as_slice();
    other.some(|key| keys.contains(key))
  }
}

impl<K: Key> ResourceKey<K> {
  /// Join key-sets into one list without duplicates. The result keeps the
  /// alias mark only when every operand carries that same mark.
  pub fn join(keys: impl IntoIterator<Item = ResourceKey<K>>) -> ResourceKey<K> {
    let mut joined = IndexSet::new();
    let mut mark = None;
    let mut shared_mark = true;

    for (i, key) in keys.into_iter().enumerate() {
      match (i, key.mark()) {
        (0, first) => mark = first,
        (_, next) if next != mark => shared_mark = false,
        _ => {}
      }
      joined.extend(key.as_slice().iter().cloned());
    }

    ResourceKey::List(ResourceKeyList {
      keys: joined.into_iter().collect(),
      mark: if shared_mark { mark } else { None },
    })
  }
}
