//! Synchronous, ordered event dispatch.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

type Handler<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Identifies a registered handler so it can be removed again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// Event emitter whose handlers run synchronously, in registration order, in
/// the same turn as the call to [`execute`](Self::execute).
pub struct SyncExecutor<T> {
  handlers: Mutex<Vec<(HandlerId, Handler<T>)>>,
  next_id: AtomicU64,
}

impl<T> Default for SyncExecutor<T> {
  fn default() -> Self {
    Self {
      handlers: Mutex::new(Vec::new()),
      next_id: AtomicU64::new(0),
    }
  }
}

impl<T> SyncExecutor<T> {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn add_handler<F>(&self, handler: F) -> HandlerId
  where
    F: Fn(&T) + Send + Sync + 'static,
  {
    let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
    self
      .handlers
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .push((id, Arc::new(handler)));
    id
  }

  pub fn remove_handler(&self, id: HandlerId) -> bool {
    let mut handlers = self.handlers.lock().unwrap_or_else(PoisonError::into_inner);
    let before = handlers.len();
    handlers.retain(|(handler_id, _)| *handler_id != id);
    handlers.len() != before
  }

  pub fn len(&self) -> usize {
    self
      .handlers
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Run every handler with `data`.
  ///
  /// Handlers are snapshotted first, so a handler may register or remove
  /// handlers (or fire further events) without deadlocking.
  pub fn execute(&self, data: &T) {
    let handlers: Vec<Handler<T>> = self
      .handlers
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .iter()
      .map(|(_, handler)| Arc::clone(handler))
      .collect();

    for handler in handlers {
      handler(data);
    }
  }
}

impl<T> std::fmt::Debug for SyncExecutor<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("SyncExecutor")
      .field("handlers", &self.len())
      .finish()
  }
}
