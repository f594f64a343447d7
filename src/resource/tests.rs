//! End-to-end behaviour of map resources against a scripted backend.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use color_eyre::eyre::eyre;
use indexmap::IndexMap;
use tokio::sync::Notify;

use super::*;

/// Backend the test loaders read from. Every fetch is counted and recorded
/// and reads its rows when called; an installed gate then holds the response
/// until it is notified.
#[derive(Default)]
struct Backend {
  rows: Mutex<IndexMap<u32, String>>,
  calls: AtomicUsize,
  requests: Mutex<Vec<LoadRequest<u32>>>,
  fail: AtomicBool,
  gate: Mutex<Option<Arc<Notify>>>,
}

impl Backend {
  fn with_rows(rows: &[(u32, &str)]) -> Arc<Self> {
    let backend = Self::default();
    backend.set_rows(rows);
    Arc::new(backend)
  }

  fn set_rows(&self, rows: &[(u32, &str)]) {
    *self.rows.lock().unwrap() = rows.iter().map(|(k, v)| (*k, v.to_string())).collect();
  }

  fn gate(&self) -> Arc<Notify> {
    let gate = Arc::new(Notify::new());
    *self.gate.lock().unwrap() = Some(Arc::clone(&gate));
    gate
  }

  fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }

  fn last_request(&self) -> LoadRequest<u32> {
    self.requests.lock().unwrap().last().cloned().unwrap()
  }

  async fn load(&self, request: LoadRequest<u32>) -> color_eyre::Result<LoadedEntries<u32, String>> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    self.requests.lock().unwrap().push(request.clone());

    let entries: LoadedEntries<u32, String> = {
      let rows = self.rows.lock().unwrap();
      match &request.key {
        ResourceKey::Alias(_) => rows.iter().map(|(k, v)| (*k, v.clone())).collect(),
        key => key
          .iter()
          .filter_map(|k| rows.get(k).map(|v| (*k, v.clone())))
          .collect(),
      }
    };

    let gate = self.gate.lock().unwrap().clone();
    if let Some(gate) = gate {
      gate.notified().await;
    }

    if self.fail.load(Ordering::SeqCst) {
      return Err(eyre!("backend unavailable"));
    }
    Ok(entries)
  }
}

fn resource(backend: &Arc<Backend>) -> CachedMapResource<u32, String> {
  let backend = Arc::clone(backend);
  CachedMapResource::new("test", move |request: LoadRequest<u32>| {
    let backend = Arc::clone(&backend);
    async move { backend.load(request).await }
  })
}

/// Yield to the runtime until `condition` holds.
async fn until(mut condition: impl FnMut() -> bool) {
  for _ in 0..1000 {
    if condition() {
      return;
    }
    tokio::task::yield_now().await;
  }
  panic!("condition never became true");
}

/// Collects every key an executor fires with.
fn record<K: Key>(executor: &SyncExecutor<ResourceKey<K>>) -> Arc<Mutex<Vec<ResourceKey<K>>>> {
  let seen = Arc::new(Mutex::new(Vec::new()));
  let sink = Arc::clone(&seen);
  executor.add_handler(move |key: &ResourceKey<K>| sink.lock().unwrap().push(key.clone()));
  seen
}

fn one(key: u32) -> ResourceKey<u32> {
  ResourceKey::single(key)
}

#[tokio::test]
async fn test_unknown_key_defaults() {
  let backend = Backend::with_rows(&[]);
  let resource = resource(&backend);

  assert!(!resource.is_loaded(&one(1), &[]));
  assert!(resource.is_outdated(&one(1)));
  assert!(!resource.is_data_loading(&one(1)));
  assert_eq!(resource.get(&one(1)), OneOrMany::One(None));
  assert!(resource.get_exception(&one(1)).value().is_none());

  let all = CACHED_MAP_ALL_KEY.key();
  assert!(!resource.is_alias_loaded(&all));
  assert!(!resource.is_loaded(&all, &[]));
  assert!(resource.is_outdated(&all));
  assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn test_set_marks_entry_updated() {
  let backend = Backend::with_rows(&[]);
  let resource = resource(&backend);
  let added = record(resource.on_item_add());

  resource.set(1, "one".to_string());

  assert!(resource.has(&1));
  assert_eq!(resource.get(&one(1)).value().as_deref(), Some("one"));
  assert!(!resource.is_outdated(&one(1)));
  assert!(resource.is_loaded(&one(1), &[]));
  assert_eq!(*added.lock().unwrap(), vec![one(1)]);

  // Loaded and fresh, so no fetch is needed.
  let value = resource.load(&one(1), &[]).await.unwrap();
  assert_eq!(value.value().as_deref(), Some("one"));
  assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn test_set_many_fires_once_with_list() {
  let backend = Backend::with_rows(&[]);
  let resource = resource(&backend);
  let added = record(resource.on_item_add());

  resource.set_many([(1, "one".to_string()), (2, "two".to_string())]);

  assert_eq!(resource.keys(), vec![1, 2]);
  assert_eq!(*added.lock().unwrap(), vec![ResourceKey::list([1, 2])]);
}

#[tokio::test]
async fn test_delete_notifies_before_removal() {
  let backend = Backend::with_rows(&[]);
  let resource = resource(&backend);
  resource.set(1, "one".to_string());

  let observed = Arc::new(Mutex::new(Vec::new()));
  let sink = Arc::clone(&observed);
  let reader = resource.clone();
  resource.on_item_delete().add_handler(move |key| {
    let present = reader.get(key).into_vec().into_iter().all(|v| v.is_some());
    sink.lock().unwrap().push((key.clone(), present));
  });

  resource.delete(&one(1));

  assert_eq!(*observed.lock().unwrap(), vec![(one(1), true)]);
  assert!(!resource.has(&1));
  assert!(resource.is_outdated(&one(1)));
  assert!(resource.is_empty());
}

#[tokio::test]
async fn test_concurrent_loads_share_one_fetch() {
  let backend = Backend::with_rows(&[(1, "one")]);
  let gate = backend.gate();
  let resource = resource(&backend);
  let key = one(1);

  let (first, second, _) = tokio::join!(
    resource.load(&key, &[]),
    resource.load(&key, &[]),
    async {
      until(|| resource.is_executing(Some(&key))).await;
      assert!(resource.is_data_loading(&key));
      gate.notify_one();
    }
  );

  assert_eq!(first.unwrap().value().as_deref(), Some("one"));
  assert_eq!(second.unwrap().value().as_deref(), Some("one"));
  assert_eq!(backend.calls(), 1);
  assert!(!resource.is_data_loading(&one(1)));
  assert!(!resource.is_executing(None));
}

#[tokio::test]
async fn test_wider_fetch_covers_narrower_request() {
  let backend = Backend::with_rows(&[(1, "one"), (2, "two")]);
  let gate = backend.gate();
  let resource = resource(&backend);

  let (wide, narrow) = (ResourceKey::list([1, 2]), one(2));

  let (both, single, _) = tokio::join!(
    resource.load(&wide, &[]),
    resource.load(&narrow, &[]),
    async {
      until(|| resource.is_executing(None)).await;
      gate.notify_one();
    }
  );

  assert_eq!(
    both.unwrap(),
    OneOrMany::Many(vec![Some("one".to_string()), Some("two".to_string())])
  );
  assert_eq!(single.unwrap().value().as_deref(), Some("two"));
  assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn test_overlapping_request_fetches_only_the_rest() {
  let backend = Backend::with_rows(&[(1, "one"), (2, "two")]);
  let gate = backend.gate();
  let resource = resource(&backend);

  let (narrow, wide) = (one(1), ResourceKey::list([1, 2]));

  let (single, both, _) = tokio::join!(
    resource.load(&narrow, &[]),
    resource.load(&wide, &[]),
    async {
      until(|| resource.is_executing(None)).await;
      *backend.gate.lock().unwrap() = None;
      gate.notify_one();
    }
  );

  assert_eq!(single.unwrap().value().as_deref(), Some("one"));
  assert_eq!(
    both.unwrap(),
    OneOrMany::Many(vec![Some("one".to_string()), Some("two".to_string())])
  );
  assert_eq!(backend.calls(), 2);
  assert_eq!(backend.last_request().key, ResourceKey::list([2]));
}

#[tokio::test]
async fn test_outdated_key_is_fetched_again() {
  let backend = Backend::with_rows(&[(1, "one")]);
  let resource = resource(&backend);
  let outdated = record(resource.on_data_outdated());

  resource.load(&one(1), &[]).await.unwrap();
  resource.load(&one(1), &[]).await.unwrap();
  assert_eq!(backend.calls(), 1);

  resource.mark_outdated(Some(&one(1)));
  assert!(resource.is_outdated(&one(1)));
  assert_eq!(*outdated.lock().unwrap(), vec![one(1)]);

  backend.set_rows(&[(1, "uno")]);
  let value = resource.load(&one(1), &[]).await.unwrap();
  assert_eq!(value.value().as_deref(), Some("uno"));
  assert_eq!(backend.calls(), 2);
  assert!(!resource.is_outdated(&one(1)));
}

#[tokio::test]
async fn test_refresh_always_fetches() {
  let backend = Backend::with_rows(&[(1, "one")]);
  let resource = resource(&backend);

  resource.load(&one(1), &[]).await.unwrap();
  resource.refresh(&one(1), &[]).await.unwrap();

  assert_eq!(backend.calls(), 2);
  assert!(backend.last_request().refresh);
}

#[tokio::test]
async fn test_refresh_does_not_join_earlier_fetch() {
  let backend = Backend::with_rows(&[(1, "one")]);
  let gate = backend.gate();
  let resource = resource(&backend);
  let key = one(1);
  let changed = || backend.rows.lock().unwrap().get(&1).map(String::as_str) == Some("uno");

  let (loaded, refreshed, _) = tokio::join!(
    resource.load(&key, &[]),
    async {
      // The running fetch has already read the old row.
      until(|| backend.calls() == 1).await;
      backend.set_rows(&[(1, "uno")]);
      resource.refresh(&key, &[]).await
    },
    async {
      until(changed).await;
      *backend.gate.lock().unwrap() = None;
      gate.notify_one();
    }
  );

  loaded.unwrap();
  assert_eq!(refreshed.unwrap().value().as_deref(), Some("uno"));
  assert_eq!(backend.calls(), 2);
  assert!(backend.last_request().refresh);
  assert_eq!(resource.get_one(&1).as_deref(), Some("uno"));
  assert!(!resource.is_outdated(&key));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_loads_fetch_once() {
  let backend = Backend::with_rows(&[(1, "one")]);
  let resource = resource(&backend);

  let loads: Vec<_> = (0..32)
    .map(|_| {
      let resource = resource.clone();
      tokio::spawn(async move { resource.load(&ResourceKey::single(1), &[]).await })
    })
    .collect();

  for load in futures::future::join_all(loads).await {
    assert_eq!(load.unwrap().unwrap().value().as_deref(), Some("one"));
  }
  assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn test_outdate_during_fetch_applies_after_commit() {
  let backend = Backend::with_rows(&[(1, "one")]);
  let gate = backend.gate();
  let resource = resource(&backend);
  let outdated = record(resource.on_data_outdated());
  let key = one(1);

  let (loaded, _) = tokio::join!(resource.load(&key, &[]), async {
    until(|| resource.is_executing(None)).await;
    resource.mark_outdated(Some(&one(1)));
    assert!(outdated.lock().unwrap().is_empty());
    gate.notify_one();
  });

  // The fetch started before the request, so its result stays outdated.
  assert_eq!(loaded.unwrap().value().as_deref(), Some("one"));
  assert!(resource.is_outdated(&one(1)));
  assert_eq!(outdated.lock().unwrap().len(), 1);

  *backend.gate.lock().unwrap() = None;
  resource.load(&one(1), &[]).await.unwrap();
  assert_eq!(backend.calls(), 2);
  assert!(!resource.is_outdated(&one(1)));
}

#[tokio::test]
async fn test_stacked_outdates_coalesce() {
  let backend = Backend::with_rows(&[(1, "one")]);
  let gate = backend.gate();
  let resource = resource(&backend);
  let outdated = record(resource.on_data_outdated());

  let key = one(1);

  let (loaded, _) = tokio::join!(resource.load(&key, &[]), async {
    until(|| resource.is_executing(None)).await;
    resource.mark_outdated(Some(&one(1)));
    resource.mark_outdated(Some(&one(1)));
    resource.mark_outdated(Some(&ResourceKey::list([1])));
    gate.notify_one();
  });

  loaded.unwrap();
  assert!(resource.is_outdated(&one(1)));
  assert_eq!(*outdated.lock().unwrap(), vec![one(1)]);
}

#[tokio::test]
async fn test_outdate_of_unrelated_key_is_immediate() {
  let backend = Backend::with_rows(&[(1, "one")]);
  let gate = backend.gate();
  let resource = resource(&backend);
  resource.set(2, "two".to_string());
  let key = one(1);

  let (loaded, _) = tokio::join!(resource.load(&key, &[]), async {
    until(|| resource.is_executing(None)).await;
    resource.mark_outdated(Some(&one(2)));
    assert!(resource.is_outdated(&one(2)));
    gate.notify_one();
  });

  loaded.unwrap();
  assert!(!resource.is_outdated(&one(1)));
}

#[tokio::test]
async fn test_mark_outdated_everything() {
  let backend = Backend::with_rows(&[(1, "one"), (2, "two")]);
  let resource = resource(&backend);
  let all = CACHED_MAP_ALL_KEY.key();

  resource.load(&all, &[]).await.unwrap();
  assert!(resource.is_alias_loaded(&all));

  resource.mark_outdated(None);
  assert!(!resource.is_alias_loaded(&all));
  assert!(resource.is_outdated(&one(1)));
  assert!(resource.is_outdated(&one(2)));

  resource.load(&all, &[]).await.unwrap();
  assert_eq!(backend.calls(), 2);

  resource.mark_outdated(None);
  resource.mark_updated(None);
  assert!(!resource.is_outdated(&one(1)));
}

#[tokio::test]
async fn test_cascading_delete() {
  let connections = resource(&Backend::with_rows(&[]));
  let properties = CachedMapResource::<u32, String>::new("properties", |_request: LoadRequest<u32>| async {
    Ok::<LoadedEntries<u32, String>, color_eyre::Report>(Vec::new())
  });
  let labels = CachedMapResource::<String, String>::new("labels", |_request: LoadRequest<String>| async {
    Ok::<LoadedEntries<String, String>, color_eyre::Report>(Vec::new())
  });

  connections
    .delete_in_same_keys(&properties)
    .delete_in_resource(&labels, |key| key.map_key(|id| format!("label-{id}")));

  connections.set_many([(1, "one".to_string()), (2, "two".to_string())]);
  properties.set_many([(1, "p1".to_string()), (2, "p2".to_string())]);
  labels.set("label-1".to_string(), "first".to_string());
  let deleted = record(properties.on_item_delete());

  connections.delete(&one(1));

  assert!(!properties.has(&1));
  assert!(properties.has(&2));
  assert!(!labels.has(&"label-1".to_string()));
  assert_eq!(*deleted.lock().unwrap(), vec![one(1)]);
}

#[tokio::test]
async fn test_includes_extend_loaded_entry() {
  let backend = Backend::with_rows(&[(1, "one")]);
  let resource = resource(&backend);

  resource.load(&one(1), &[]).await.unwrap();
  assert!(!resource.is_includes(&one(1), &["details"]));
  assert!(!resource.is_loaded(&one(1), &["details"]));

  resource.load(&one(1), &["details"]).await.unwrap();
  assert_eq!(backend.calls(), 2);
  let request = backend.last_request();
  assert!(request.has_include("details"));
  assert!(request.has_include(INCLUDE_BASE));
  assert!(resource.is_includes(&one(1), &["details"]));
  assert_eq!(resource.get_includes(Some(&one(1))), vec!["details".to_string()]);

  // Already satisfied, with or without the include.
  resource.load(&one(1), &["details"]).await.unwrap();
  resource.load(&one(1), &[]).await.unwrap();
  assert_eq!(backend.calls(), 2);
}

#[tokio::test]
async fn test_includes_map_carries_defaults() {
  let backend = Backend::with_rows(&[]);
  let backend_ref = Arc::clone(&backend);
  let resource = CachedMapResource::with_includes(
    "test",
    move |request: LoadRequest<u32>| {
      let backend = Arc::clone(&backend_ref);
      async move { backend.load(request).await }
    },
    &["base"],
  );

  let map = resource.get_includes_map(None, &["extra"]);
  assert_eq!(map.get(INCLUDE_BASE), Some(&true));
  assert_eq!(map.get("base"), Some(&true));
  assert_eq!(map.get("extra"), Some(&true));
  assert_eq!(map.len(), 3);
  assert_eq!(resource.get_includes(None), vec!["base".to_string()]);
}

#[tokio::test]
async fn test_all_alias_follows_new_keys() {
  let backend = Backend::with_rows(&[(1, "one"), (2, "two")]);
  let resource = resource(&backend);
  let added = record(resource.on_item_add());
  let all = CACHED_MAP_ALL_KEY.key();

  let values = resource.load(&all, &[]).await.unwrap();
  assert_eq!(
    values,
    OneOrMany::Many(vec![Some("one".to_string()), Some("two".to_string())])
  );
  assert!(resource.is_alias_loaded(&all));
  assert!(resource.is_loaded(&all, &[]));
  assert_eq!(*added.lock().unwrap(), vec![ResourceKey::list([1, 2])]);

  resource.set(3, "three".to_string());
  assert_eq!(resource.get(&all).into_vec().len(), 3);
  assert_eq!(resource.transform_param(&all).as_slice(), &[1, 2, 3]);
  assert!(resource.transform_param(&all).is_alias_equal(&all));

  resource.load(&all, &[]).await.unwrap();
  assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn test_all_load_removes_missing_entries() {
  let backend = Backend::with_rows(&[(1, "one"), (2, "two")]);
  let resource = resource(&backend);
  let deleted = record(resource.on_item_delete());
  let all = CACHED_MAP_ALL_KEY.key();

  resource.load(&all, &[]).await.unwrap();
  backend.set_rows(&[(1, "one")]);
  resource.refresh(&all, &[]).await.unwrap();

  assert_eq!(resource.keys(), vec![1]);
  assert_eq!(*deleted.lock().unwrap(), vec![ResourceKey::list([2])]);
}

#[tokio::test]
async fn test_all_refresh_keeps_entries_set_meanwhile() {
  let backend = Backend::with_rows(&[(1, "one"), (2, "two")]);
  let resource = resource(&backend);
  let deleted = record(resource.on_item_delete());
  let all = CACHED_MAP_ALL_KEY.key();

  resource.load(&all, &[]).await.unwrap();
  backend.set_rows(&[(1, "one")]);
  let gate = backend.gate();

  let (refreshed, _) = tokio::join!(resource.refresh(&all, &[]), async {
    until(|| resource.is_executing(None)).await;
    resource.set(3, "three".to_string());
    gate.notify_one();
  });

  refreshed.unwrap();
  assert_eq!(resource.keys(), vec![1, 3]);
  assert!(!resource.is_outdated(&one(3)));
  assert_eq!(*deleted.lock().unwrap(), vec![ResourceKey::list([2])]);
}

#[tokio::test]
async fn test_custom_alias() {
  let backend = Backend::with_rows(&[(1, "one"), (2, "two"), (3, "three")]);
  let resource = resource(&backend);
  let odd = ResourceAlias::new("odd");
  resource.add_alias(odd, |keys: &[u32]| keys.iter().copied().filter(|k| k % 2 == 1).collect());

  resource.load(&CACHED_MAP_ALL_KEY.key(), &[]).await.unwrap();
  assert!(resource.is_alias(&odd.key()));
  assert!(!resource.is_alias(&one(1)));
  assert_eq!(resource.transform_param(&odd.key()).as_slice(), &[1, 3]);
  assert!(!resource.is_alias_loaded(&odd.key()));

  resource.mark_updated(Some(&odd.key()));
  assert!(resource.is_alias_loaded(&odd.key()));
  assert!(resource.is_loaded(&odd.key(), &[]));
}

#[tokio::test]
async fn test_empty_key_needs_no_fetch() {
  let backend = Backend::with_rows(&[(1, "one")]);
  let resource = resource(&backend);
  let empty = cached_map_empty_key();

  let values = resource.load(&empty, &[]).await.unwrap();
  assert_eq!(values, OneOrMany::Many(Vec::new()));
  assert!(resource.is_loaded(&empty, &[]));
  assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn test_failure_reaches_every_caller() {
  let backend = Backend::with_rows(&[(1, "one")]);
  backend.fail.store(true, Ordering::SeqCst);
  let gate = backend.gate();
  let resource = resource(&backend);
  let errors = Arc::new(AtomicUsize::new(0));
  let counter = Arc::clone(&errors);
  resource.on_data_error().add_handler(move |error: &DataError<u32>| {
    assert_eq!(error.key, one(1));
    counter.fetch_add(1, Ordering::SeqCst);
  });

  let key = one(1);

  let (first, second, _) = tokio::join!(
    resource.load(&key, &[]),
    resource.load(&key, &[]),
    async {
      until(|| resource.is_executing(None)).await;
      gate.notify_one();
    }
  );

  let (first, second) = (first.unwrap_err(), second.unwrap_err());
  assert!(matches!(first, ResourceError::Fetch { resource: "test", .. }));
  assert_eq!(first.to_string(), second.to_string());
  assert_eq!(backend.calls(), 1);
  assert_eq!(errors.load(Ordering::SeqCst), 1);

  assert!(resource.is_outdated(&one(1)));
  assert!(!resource.is_data_loading(&one(1)));
  assert!(resource.get_exception(&one(1)).value().is_some());

  backend.fail.store(false, Ordering::SeqCst);
  *backend.gate.lock().unwrap() = None;
  resource.load(&one(1), &[]).await.unwrap();
  assert!(resource.get_exception(&one(1)).value().is_none());
}

#[tokio::test]
async fn test_failure_keeps_previous_value() {
  let backend = Backend::with_rows(&[(1, "one")]);
  let resource = resource(&backend);
  resource.load(&one(1), &[]).await.unwrap();

  resource.mark_outdated(Some(&one(1)));
  backend.fail.store(true, Ordering::SeqCst);
  assert!(resource.load(&one(1), &[]).await.is_err());

  assert_eq!(resource.get_one(&1).as_deref(), Some("one"));
  assert!(resource.is_outdated(&one(1)));

  resource.clean_error(None);
  assert!(resource.get_exception(&one(1)).value().is_none());
}

#[tokio::test]
async fn test_failed_alias_load_is_not_materialized() {
  let backend = Backend::with_rows(&[(1, "one")]);
  backend.fail.store(true, Ordering::SeqCst);
  let resource = resource(&backend);
  let all = CACHED_MAP_ALL_KEY.key();

  assert!(resource.load(&all, &[]).await.is_err());
  assert!(!resource.is_alias_loaded(&all));
  assert!(resource.is_outdated(&all));
}

#[tokio::test]
async fn test_loader_panic_interrupts_callers() {
  let resource = CachedMapResource::<u32, String>::new("panicky", |_request: LoadRequest<u32>| async {
    if true {
      panic!("loader bug");
    }
    Ok::<LoadedEntries<u32, String>, color_eyre::Report>(Vec::new())
  });

  let error = resource.load(&one(1), &[]).await.unwrap_err();
  assert!(matches!(error, ResourceError::Interrupted { resource: "panicky" }));
  assert!(!resource.is_executing(None));
  assert!(resource.get_exception(&one(1)).value().is_some());
}

#[tokio::test]
async fn test_abandoned_load_still_commits() {
  let backend = Backend::with_rows(&[(1, "one")]);
  let gate = backend.gate();
  let resource = resource(&backend);

  let caller = resource.clone();
  let handle = tokio::spawn(async move { caller.load(&one(1), &[]).await });
  until(|| resource.is_executing(None)).await;
  handle.abort();

  gate.notify_one();
  until(|| !resource.is_executing(None)).await;
  assert_eq!(resource.get_one(&1).as_deref(), Some("one"));
}

#[tokio::test]
async fn test_clear_forgets_everything() {
  let backend = Backend::with_rows(&[(1, "one")]);
  let resource = resource(&backend);
  let all = CACHED_MAP_ALL_KEY.key();

  resource.load(&all, &[]).await.unwrap();
  resource.clear();

  assert!(resource.is_empty());
  assert!(!resource.is_alias_loaded(&all));
  assert!(resource.is_outdated(&one(1)));
}
