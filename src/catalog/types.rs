//! Domain types served by the connection catalog.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Include flag asking the catalog to attach a connection's auth properties.
pub const INCLUDE_AUTH_PROPERTIES: &str = "includeAuthProperties";

/// A configured database connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
  pub id: String,
  pub name: String,
  pub driver_id: String,
  pub host: String,
  pub port: u16,
  pub database: String,
  pub created_at: DateTime<Utc>,
  /// Only present when fetched with [`INCLUDE_AUTH_PROPERTIES`].
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub auth_properties: Option<BTreeMap<String, String>>,
}

impl ConnectionInfo {
  /// host:port/database, the way connection lists show it
  pub fn address(&self) -> String {
    format!("{}:{}/{}", self.host, self.port, self.database)
  }
}

/// A driver property, with the value a connection overrides it with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverProperty {
  pub id: String,
  pub display_name: String,
  pub default_value: Option<String>,
  pub value: Option<String>,
}

impl DriverProperty {
  /// The overridden value, falling back to the driver default.
  pub fn effective_value(&self) -> Option<&str> {
    self.value.as_deref().or(self.default_value.as_deref())
  }
}

/// Driver properties of one connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverProperties {
  pub connection_id: String,
  pub driver_id: String,
  pub properties: Vec<DriverProperty>,
}
