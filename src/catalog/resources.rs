//! Catalog resources: connection info and driver properties served through
//! the resource cache.

use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::{CatalogConfig, ResourcesConfig};
use crate::resource::{
  CachedMapResource, LoadRequest, LoadedEntries, ResourceKey, CACHED_MAP_ALL_KEY,
};

use super::storage::SqliteCatalog;
use super::types::{ConnectionInfo, DriverProperties, INCLUDE_AUTH_PROPERTIES};

pub type ConnectionInfoResource = CachedMapResource<String, ConnectionInfo>;
pub type DriverPropertiesResource = CachedMapResource<String, DriverProperties>;

/// Async access to the catalog store.
///
/// Queries run on the blocking pool, after an optional artificial delay that
/// makes the catalog behave like a remote service.
#[derive(Clone)]
pub struct CatalogClient {
  storage: Arc<SqliteCatalog>,
  latency: Duration,
}

impl CatalogClient {
  pub fn new(storage: SqliteCatalog, latency: Duration) -> Self {
    Self {
      storage: Arc::new(storage),
      latency,
    }
  }

  /// Open the catalog described by `config`.
  pub fn open(config: &CatalogConfig) -> Result<Self> {
    let storage = SqliteCatalog::open(config.path.as_deref())?;
    if config.seed {
      storage.seed()?;
    }
    Ok(Self::new(storage, Duration::from_millis(config.latency_ms)))
  }

  async fn run<T, F>(&self, query: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&SqliteCatalog) -> Result<T> + Send + 'static,
  {
    if !self.latency.is_zero() {
      tokio::time::sleep(self.latency).await;
    }
    let storage = Arc::clone(&self.storage);
    tokio::task::spawn_blocking(move || query(&storage))
      .await
      .map_err(|e| eyre!("Catalog query failed to run: {}", e))?
  }

  /// Connections by id, or all of them when `ids` is `None`.
  pub async fn connections(
    &self,
    ids: Option<Vec<String>>,
    include_auth: bool,
  ) -> Result<Vec<ConnectionInfo>> {
    self
      .run(move |storage| match ids {
        Some(ids) => storage.get_connections(&ids, include_auth),
        None => storage.list_connections(include_auth),
      })
      .await
  }

  /// Driver properties of each connection; unknown ids are skipped.
  pub async fn driver_properties(&self, ids: Option<Vec<String>>) -> Result<Vec<DriverProperties>> {
    self
      .run(move |storage| {
        let ids = match ids {
          Some(ids) => ids,
          None => storage
            .list_connections(false)?
            .into_iter()
            .map(|c| c.id)
            .collect(),
        };
        let mut found = Vec::with_capacity(ids.len());
        for id in &ids {
          if let Some(properties) = storage.driver_properties(id)? {
            found.push(properties);
          }
        }
        Ok(found)
      })
      .await
  }

  pub async fn rename_connection(&self, id: &str, name: &str) -> Result<bool> {
    let (id, name) = (id.to_string(), name.to_string());
    self
      .run(move |storage| storage.rename_connection(&id, &name))
      .await
  }

  pub async fn set_property(&self, connection_id: &str, property_id: &str, value: &str) -> Result<()> {
    let (connection_id, property_id, value) = (
      connection_id.to_string(),
      property_id.to_string(),
      value.to_string(),
    );
    self
      .run(move |storage| storage.set_property(&connection_id, &property_id, &value))
      .await
  }

  pub async fn delete_connection(&self, id: &str) -> Result<bool> {
    let id = id.to_string();
    self.run(move |storage| storage.delete_connection(&id)).await
  }
}

/// Concrete ids of a request; `None` stands for every entry.
fn requested_ids(key: &ResourceKey<String>) -> Option<Vec<String>> {
  match key {
    ResourceKey::Alias(_) => None,
    key => Some(key.as_slice().to_vec()),
  }
}

async fn load_connections(
  client: CatalogClient,
  request: LoadRequest<String>,
) -> Result<LoadedEntries<String, ConnectionInfo>> {
  let include_auth = request.has_include(INCLUDE_AUTH_PROPERTIES);
  let connections = client
    .connections(requested_ids(&request.key), include_auth)
    .await?;
  debug!(count = connections.len(), include_auth, "loaded connections");
  Ok(connections.into_iter().map(|c| (c.id.clone(), c)).collect())
}

async fn load_driver_properties(
  client: CatalogClient,
  request: LoadRequest<String>,
) -> Result<LoadedEntries<String, DriverProperties>> {
  let properties = client.driver_properties(requested_ids(&request.key)).await?;
  debug!(count = properties.len(), "loaded driver properties");
  Ok(
    properties
      .into_iter()
      .map(|p| (p.connection_id.clone(), p))
      .collect(),
  )
}

/// The catalog's resources, wired so that deleting a connection also drops
/// its cached driver properties.
#[derive(Clone)]
pub struct CatalogResources {
  client: CatalogClient,
  pub connections: ConnectionInfoResource,
  pub driver_properties: DriverPropertiesResource,
}

impl CatalogResources {
  pub fn new(client: CatalogClient, config: &ResourcesConfig) -> Self {
    let connection_includes: Vec<&str> =
      config.connection_includes.iter().map(String::as_str).collect();
    let property_includes: Vec<&str> = config
      .driver_property_includes
      .iter()
      .map(String::as_str)
      .collect();

    let loader_client = client.clone();
    let connections = ConnectionInfoResource::with_includes(
      "connections",
      move |request: LoadRequest<String>| load_connections(loader_client.clone(), request),
      &connection_includes,
    );

    let loader_client = client.clone();
    let driver_properties = DriverPropertiesResource::with_includes(
      "driver_properties",
      move |request: LoadRequest<String>| load_driver_properties(loader_client.clone(), request),
      &property_includes,
    );

    connections.delete_in_same_keys(&driver_properties);

    Self {
      client,
      connections,
      driver_properties,
    }
  }

  /// Every connection, fetched once and then served from the cache.
  pub async fn all_connections(&self) -> Result<Vec<ConnectionInfo>> {
    let connections = self
      .connections
      .load(&CACHED_MAP_ALL_KEY.key(), &[])
      .await?;
    Ok(connections.into_vec().into_iter().flatten().collect())
  }

  pub async fn connection(&self, id: &str, includes: &[&str]) -> Result<Option<ConnectionInfo>> {
    let key = ResourceKey::single(id.to_string());
    Ok(self.connections.load(&key, includes).await?.value())
  }

  pub async fn properties(&self, id: &str) -> Result<Option<DriverProperties>> {
    let key = ResourceKey::single(id.to_string());
    Ok(self.driver_properties.load(&key, &[]).await?.value())
  }

  /// Rename in the catalog; the cached entry is outdated and re-fetched on
  /// next access.
  pub async fn rename_connection(&self, id: &str, name: &str) -> Result<()> {
    if !self.client.rename_connection(id, name).await? {
      return Err(eyre!("Connection not found: {}", id));
    }
    self
      .connections
      .mark_outdated(Some(&ResourceKey::single(id.to_string())));
    Ok(())
  }

  /// Override a driver property; the cached properties are outdated.
  pub async fn set_property(&self, id: &str, property_id: &str, value: &str) -> Result<()> {
    self.client.set_property(id, property_id, value).await?;
    self
      .driver_properties
      .mark_outdated(Some(&ResourceKey::single(id.to_string())));
    Ok(())
  }

  /// Delete from the catalog, then from the cache. Cached driver properties of
  /// the connection go with it.
  pub async fn delete_connection(&self, id: &str) -> Result<()> {
    if !self.client.delete_connection(id).await? {
      return Err(eyre!("Connection not found: {}", id));
    }
    info!(connection = id, "deleted connection");
    self
      .connections
      .delete(&ResourceKey::single(id.to_string()));
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::resource::{OneOrMany, ResourceError};

  fn resources(includes: &[&str]) -> CatalogResources {
    let storage = SqliteCatalog::open(None).unwrap();
    storage.seed().unwrap();
    let config = ResourcesConfig {
      connection_includes: includes.iter().map(|s| s.to_string()).collect(),
      driver_property_includes: Vec::new(),
    };
    CatalogResources::new(CatalogClient::new(storage, Duration::ZERO), &config)
  }

  fn key(id: &str) -> ResourceKey<String> {
    ResourceKey::single(id.to_string())
  }

  #[tokio::test]
  async fn test_all_connections_loaded_once() {
    let resources = resources(&[]);

    let all = resources.all_connections().await.unwrap();
    assert_eq!(all.len(), 3);
    assert!(resources.connections.is_alias_loaded(&CACHED_MAP_ALL_KEY.key()));
    assert!(all.iter().all(|c| c.auth_properties.is_none()));

    // Served from the cache without touching the store.
    resources.client.delete_connection("pg-reports").await.unwrap();
    assert_eq!(resources.all_connections().await.unwrap().len(), 3);

    resources.connections.mark_outdated(None);
    assert_eq!(resources.all_connections().await.unwrap().len(), 2);
    assert!(!resources.connections.has(&"pg-reports".to_string()));
  }

  #[tokio::test]
  async fn test_auth_include_refetches() {
    let resources = resources(&[]);

    let plain = resources.connection("pg-main", &[]).await.unwrap().unwrap();
    assert!(plain.auth_properties.is_none());

    let with_auth = resources
      .connection("pg-main", &[INCLUDE_AUTH_PROPERTIES])
      .await
      .unwrap()
      .unwrap();
    assert!(with_auth.auth_properties.is_some());
    assert!(resources
      .connections
      .is_includes(&key("pg-main"), &[INCLUDE_AUTH_PROPERTIES]));
  }

  #[tokio::test]
  async fn test_default_includes_reach_loader() {
    let resources = resources(&[INCLUDE_AUTH_PROPERTIES]);
    let info = resources.connection("pg-main", &[]).await.unwrap().unwrap();
    assert!(info.auth_properties.is_some());
  }

  #[tokio::test]
  async fn test_unknown_connection_is_absent() {
    let resources = resources(&[]);
    assert!(resources.connection("missing", &[]).await.unwrap().is_none());
    assert!(resources.properties("missing").await.unwrap().is_none());
  }

  #[tokio::test]
  async fn test_rename_outdates_cached_entry() {
    let resources = resources(&[]);
    resources.connection("pg-main", &[]).await.unwrap();

    resources.rename_connection("pg-main", "Primary").await.unwrap();
    assert!(resources.connections.is_outdated(&key("pg-main")));

    let info = resources.connection("pg-main", &[]).await.unwrap().unwrap();
    assert_eq!(info.name, "Primary");
    assert!(resources.rename_connection("missing", "x").await.is_err());
  }

  #[tokio::test]
  async fn test_set_property_outdates_properties() {
    let resources = resources(&[]);
    resources.properties("pg-reports").await.unwrap();

    resources
      .set_property("pg-reports", "applicationName", "reports")
      .await
      .unwrap();
    let properties = resources.properties("pg-reports").await.unwrap().unwrap();
    let app_name = properties
      .properties
      .iter()
      .find(|p| p.id == "applicationName")
      .unwrap();
    assert_eq!(app_name.effective_value(), Some("reports"));
  }

  #[tokio::test]
  async fn test_delete_cascades_into_properties() {
    let resources = resources(&[]);
    resources.all_connections().await.unwrap();
    resources.properties("pg-main").await.unwrap();
    resources.properties("mysql-legacy").await.unwrap();

    resources.delete_connection("pg-main").await.unwrap();

    assert!(!resources.connections.has(&"pg-main".to_string()));
    assert!(!resources.driver_properties.has(&"pg-main".to_string()));
    assert!(resources.driver_properties.has(&"mysql-legacy".to_string()));
    assert!(resources.delete_connection("pg-main").await.is_err());
  }

  #[tokio::test]
  async fn test_properties_for_every_connection() {
    let resources = resources(&[]);
    let all = resources
      .driver_properties
      .load(&CACHED_MAP_ALL_KEY.key(), &[])
      .await
      .unwrap();
    assert!(matches!(all, OneOrMany::Many(ref values) if values.len() == 3));
  }

  #[tokio::test]
  async fn test_closed_store_surfaces_fetch_error() {
    let resources = resources(&[]);
    resources
      .client
      .run(|storage| {
        storage
          .lock()?
          .execute_batch("DROP TABLE connections")
          .map_err(|e| eyre!("{}", e))
      })
      .await
      .unwrap();

    let error = resources.connection("pg-main", &[]).await.unwrap_err();
    let error = error.downcast_ref::<ResourceError>().unwrap();
    assert_eq!(error.resource(), "connections");
    assert!(resources.connections.get_exception(&key("pg-main")).value().is_some());
  }
}
