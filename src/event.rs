use std::fmt;

use tokio::sync::mpsc;

use crate::catalog::CatalogResources;
use crate::resource::{CachedMapResource, DataError, Key, ResourceKey};

/// Cache notifications, as seen by the console
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
  Added { resource: &'static str, keys: Vec<String> },
  Deleted { resource: &'static str, keys: Vec<String> },
  Outdated { resource: &'static str, keys: Vec<String> },
  Failed { resource: &'static str, keys: Vec<String>, error: String },
}

impl fmt::Display for Event {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let (verb, resource, keys) = match self {
      Event::Added { resource, keys } => ("added", resource, keys),
      Event::Deleted { resource, keys } => ("deleted", resource, keys),
      Event::Outdated { resource, keys } => ("outdated", resource, keys),
      Event::Failed { resource, keys, .. } => ("failed", resource, keys),
    };
    write!(f, "{resource}: {verb} [{}]", keys.join(", "))?;
    if let Event::Failed { error, .. } = self {
      write!(f, " ({error})")?;
    }
    Ok(())
  }
}

fn key_names<K: Key + fmt::Display>(key: &ResourceKey<K>) -> Vec<String> {
  key.iter().map(ToString::to_string).collect()
}

/// Forwards resource events into a channel so they can be reported after the
/// operation that caused them.
pub struct EventHandler {
  tx: mpsc::UnboundedSender<Event>,
  rx: mpsc::UnboundedReceiver<Event>,
}

impl EventHandler {
  pub fn new() -> Self {
    let (tx, rx) = mpsc::unbounded_channel();
    Self { tx, rx }
  }

  /// Subscribe to every event of `resource`.
  pub fn watch<K, V>(&self, resource: &CachedMapResource<K, V>)
  where
    K: Key + fmt::Display,
    V: Clone + Send + Sync + 'static,
  {
    let name = resource.name();

    let tx = self.tx.clone();
    resource.on_item_add().add_handler(move |key: &ResourceKey<K>| {
      let _ = tx.send(Event::Added {
        resource: name,
        keys: key_names(key),
      });
    });

    let tx = self.tx.clone();
    resource.on_item_delete().add_handler(move |key: &ResourceKey<K>| {
      let _ = tx.send(Event::Deleted {
        resource: name,
        keys: key_names(key),
      });
    });

    let tx = self.tx.clone();
    resource
      .on_data_outdated()
      .add_handler(move |key: &ResourceKey<K>| {
        let _ = tx.send(Event::Outdated {
          resource: name,
          keys: key_names(key),
        });
      });

    let tx = self.tx.clone();
    resource.on_data_error().add_handler(move |error: &DataError<K>| {
      let _ = tx.send(Event::Failed {
        resource: name,
        keys: key_names(&error.key),
        error: error.exception.to_string(),
      });
    });
  }

  /// Subscribe to every resource of the catalog.
  pub fn watch_catalog(&self, resources: &CatalogResources) {
    self.watch(&resources.connections);
    self.watch(&resources.driver_properties);
  }

  /// Events received so far, oldest first.
  pub fn drain(&mut self) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = self.rx.try_recv() {
      events.push(event);
    }
    events
  }
}

impl Default for EventHandler {
  fn default() -> Self {
    Self::new()
  }
}
