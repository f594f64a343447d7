//! Single-flight scheduling of resource fetches.
//!
//! At most one fetch runs for any group of overlapping key-sets. A request that
//! an in-flight task already covers (same or wider key-set, includes satisfied)
//! joins that task and receives its result. A request that only overlaps waits
//! for the task to finish and is then re-evaluated by the caller.
//!
//! The scheduler also owns the outdate wait-list: "mark outdated" requests that
//! arrive while an overlapping fetch is in flight are parked here and released
//! once no overlapping task is left, so a fetch that started before the request
//! cannot leave stale data marked fresh.

use std::sync::{Mutex, MutexGuard, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};
use indexmap::IndexSet;
use tokio::sync::oneshot;

use super::error::ResourceError;
use super::key::{Key, ResourceKey};

pub type TaskResult = Result<(), ResourceError>;

/// Future resolving when a scheduled task completes. Cloneable, every clone
/// yields the same result.
pub type TaskFuture = Shared<BoxFuture<'static, TaskResult>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

/// Outcome of [`TaskScheduler::schedule`].
pub enum Schedule {
  /// An in-flight task covers the request; await it for the result.
  Join(TaskFuture),
  /// An in-flight task overlaps the request; await it, then re-evaluate.
  Wait(TaskFuture),
  /// No overlapping task runs; the caller owns a new task and must run it.
  Run(TaskHandle),
}

/// Ownership of a scheduled task. The holder runs the fetch, calls
/// [`TaskScheduler::finish`] and then [`complete`](Self::complete).
///
/// Dropping the handle without completing resolves the task as interrupted.
pub struct TaskHandle {
  id: TaskId,
  sender: oneshot::Sender<TaskResult>,
  future: TaskFuture,
}

impl TaskHandle {
  pub fn id(&self) -> TaskId {
    self.id
  }

  pub fn future(&self) -> TaskFuture {
    self.future.clone()
  }

  pub fn complete(self, result: TaskResult) {
    // Nobody awaiting the task is fine.
    let _ = self.sender.send(result);
  }
}

struct ActiveTask<K> {
  id: TaskId,
  key: ResourceKey<K>,
  includes: IndexSet<String>,
  future: TaskFuture,
}

struct SchedulerState<K> {
  active: Vec<ActiveTask<K>>,
  /// Deferred outdate requests; `None` stands for "every key".
  outdate_wait_list: Vec<Option<ResourceKey<K>>>,
  next_id: u64,
}

/// Single-flight gate over overlapping key-sets.
pub struct TaskScheduler<K> {
  name: &'static str,
  state: Mutex<SchedulerState<K>>,
}

impl<K: Key> TaskScheduler<K> {
  pub fn new(name: &'static str) -> Self {
    Self {
      name,
      state: Mutex::new(SchedulerState {
        active: Vec::new(),
        outdate_wait_list: Vec::new(),
        next_id: 0,
      }),
    }
  }

  fn state(&self) -> MutexGuard<'_, SchedulerState<K>> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Any task in flight.
  pub fn executing(&self) -> bool {
    !self.state().active.is_empty()
  }

  /// A task overlapping `key` is in flight.
  pub fn is_executing(&self, key: &ResourceKey<K>) -> bool {
    self.state().active.iter().any(|task| task.key.intersects(key))
  }

  /// Claim the right to fetch `key`, or learn which task to await instead.
  pub fn schedule(&self, key: &ResourceKey<K>, includes: &IndexSet<String>) -> Schedule {
    let mut state = self.state();

    let covering = state
      .active
      .iter()
      .find(|task| task.key.includes(key) && includes.is_subset(&task.includes));
    if let Some(task) = covering {
      return Schedule::Join(task.future.clone());
    }

    if let Some(task) = state.active.iter().find(|task| task.key.intersects(key)) {
      return Schedule::Wait(task.future.clone());
    }

    let id = TaskId(state.next_id);
    state.next_id += 1;

    let name = self.name;
    let (sender, receiver) = oneshot::channel();
    let future = receiver
      .map(move |result| result.unwrap_or_else(|_| Err(ResourceError::interrupted(name))))
      .boxed()
      .shared();

    state.active.push(ActiveTask {
      id,
      key: key.clone(),
      includes: includes.clone(),
      future: future.clone(),
    });

    Schedule::Run(TaskHandle { id, sender, future })
  }

  /// Park an outdate request if an overlapping task is in flight.
  ///
  /// Returns `false` when nothing overlapping runs and the caller should apply
  /// the request right away. A request already covered by a parked one is
  /// absorbed.
  pub fn defer_outdate(&self, key: Option<&ResourceKey<K>>) -> bool {
    let mut state = self.state();

    let executing = match key {
      None => !state.active.is_empty(),
      Some(key) => state.active.iter().any(|task| task.key.intersects(key)),
    };
    if !executing {
      return false;
    }

    let covered = state.outdate_wait_list.iter().any(|parked| match (parked, key) {
      (None, _) => true,
      (Some(_), None) => false,
      (Some(parked), Some(key)) => parked.includes(key),
    });

    if !covered {
      match key {
        None => {
          state.outdate_wait_list.clear();
          state.outdate_wait_list.push(None);
        }
        Some(key) => state.outdate_wait_list.push(Some(key.clone())),
      }
    }

    true
  }

  /// Retire a task and release the parked outdate requests no remaining task
  /// overlaps.
  pub fn finish(&self, id: TaskId) -> Vec<Option<ResourceKey<K>>> {
    let mut state = self.state();
    state.active.retain(|task| task.id != id);

    let SchedulerState {
      active,
      outdate_wait_list,
      ..
    } = &mut *state;

    let (ready, parked): (Vec<_>, Vec<_>) =
      outdate_wait_list.drain(..).partition(|entry| match entry {
        None => active.is_empty(),
        Some(key) => !active.iter().any(|task| task.key.intersects(key)),
      });
    *outdate_wait_list = parked;

    ready
  }

  /// Number of parked outdate requests.
  #[cfg(test)]
  pub fn deferred(&self) -> usize {
    self.state().outdate_wait_list.len()
  }
}
