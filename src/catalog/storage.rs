//! SQLite-backed connection catalog.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

use super::types::{ConnectionInfo, DriverProperties, DriverProperty};

/// The catalog store: connections, the properties their drivers expose and
/// per-connection overrides of those properties.
pub struct SqliteCatalog {
  conn: Mutex<Connection>,
}

/// Columns of a `connections` row, before decoding.
struct ConnectionRow {
  id: String,
  name: String,
  driver_id: String,
  host: String,
  port: u16,
  database: String,
  auth_properties: Option<Vec<u8>>,
  created_at: String,
}

impl ConnectionRow {
  fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id: row.get(0)?,
      name: row.get(1)?,
      driver_id: row.get(2)?,
      host: row.get(3)?,
      port: row.get(4)?,
      database: row.get(5)?,
      auth_properties: row.get(6)?,
      created_at: row.get(7)?,
    })
  }

  fn into_info(self, include_auth: bool) -> Result<ConnectionInfo> {
    let auth_properties = match (include_auth, self.auth_properties) {
      (true, Some(data)) => Some(
        serde_json::from_slice(&data)
          .map_err(|e| eyre!("Failed to decode auth properties of {}: {}", self.id, e))?,
      ),
      (true, None) => Some(BTreeMap::new()),
      (false, _) => None,
    };

    Ok(ConnectionInfo {
      created_at: parse_datetime(&self.created_at)?,
      id: self.id,
      name: self.name,
      driver_id: self.driver_id,
      host: self.host,
      port: self.port,
      database: self.database,
      auth_properties,
    })
  }
}

const SELECT_CONNECTION: &str = "SELECT id, name, driver_id, host, port, database, auth_properties, created_at
   FROM connections";

impl SqliteCatalog {
  /// Open the catalog at `path`, or an in-memory one when no path is given.
  pub fn open(path: Option<&Path>) -> Result<Self> {
    let conn = match path {
      Some(path) => {
        // Ensure parent directory exists
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
          std::fs::create_dir_all(parent)
            .map_err(|e| eyre!("Failed to create catalog directory: {}", e))?;
        }
        Connection::open(path)
          .map_err(|e| eyre!("Failed to open catalog at {}: {}", path.display(), e))?
      }
      None => Connection::open_in_memory()
        .map_err(|e| eyre!("Failed to open in-memory catalog: {}", e))?,
    };

    let catalog = Self {
      conn: Mutex::new(conn),
    };
    catalog.run_migrations()?;

    Ok(catalog)
  }

  pub(super) fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
    self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))
  }

  fn run_migrations(&self) -> Result<()> {
    self
      .lock()?
      .execute_batch(CATALOG_SCHEMA)
      .map_err(|e| eyre!("Failed to run catalog migrations: {}", e))?;
    Ok(())
  }

  /// Fill an empty catalog with a few sample drivers and connections.
  pub fn seed(&self) -> Result<()> {
    let mut conn = self.lock()?;
    let count: i64 = conn
      .query_row("SELECT COUNT(*) FROM connections", [], |row| row.get(0))
      .map_err(|e| eyre!("Failed to count connections: {}", e))?;
    if count > 0 {
      return Ok(());
    }

    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;
    tx.execute_batch(CATALOG_SEED)
      .map_err(|e| eyre!("Failed to seed catalog: {}", e))?;
    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(())
  }

  /// Every connection, in creation order.
  pub fn list_connections(&self, include_auth: bool) -> Result<Vec<ConnectionInfo>> {
    let conn = self.lock()?;
    let mut stmt = conn
      .prepare(&format!("{SELECT_CONNECTION} ORDER BY rowid"))
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let rows: Vec<ConnectionRow> = stmt
      .query_map([], ConnectionRow::from_row)
      .map_err(|e| eyre!("Failed to query connections: {}", e))?
      .collect::<rusqlite::Result<_>>()
      .map_err(|e| eyre!("Failed to read connection: {}", e))?;

    rows.into_iter().map(|row| row.into_info(include_auth)).collect()
  }

  /// The connections with the given ids, skipping unknown ones.
  pub fn get_connections(&self, ids: &[String], include_auth: bool) -> Result<Vec<ConnectionInfo>> {
    let conn = self.lock()?;
    let mut stmt = conn
      .prepare(&format!("{SELECT_CONNECTION} WHERE id = ?"))
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let mut connections = Vec::with_capacity(ids.len());
    for id in ids {
      let row = stmt
        .query_row(params![id], ConnectionRow::from_row)
        .optional()
        .map_err(|e| eyre!("Failed to query connection {}: {}", id, e))?;
      if let Some(row) = row {
        connections.push(row.into_info(include_auth)?);
      }
    }

    Ok(connections)
  }

  /// Insert or replace a connection. Auth properties are only written when
  /// present.
  pub fn upsert_connection(&self, info: &ConnectionInfo) -> Result<()> {
    let auth = info
      .auth_properties
      .as_ref()
      .map(serde_json::to_vec)
      .transpose()
      .map_err(|e| eyre!("Failed to serialize auth properties: {}", e))?;

    self
      .lock()?
      .execute(
        "INSERT INTO connections (id, name, driver_id, host, port, database, auth_properties)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(id) DO UPDATE SET
           name = excluded.name,
           driver_id = excluded.driver_id,
           host = excluded.host,
           port = excluded.port,
           database = excluded.database,
           auth_properties = COALESCE(excluded.auth_properties, connections.auth_properties)",
        params![
          info.id,
          info.name,
          info.driver_id,
          info.host,
          info.port,
          info.database,
          auth
        ],
      )
      .map_err(|e| eyre!("Failed to store connection {}: {}", info.id, e))?;

    Ok(())
  }

  /// Returns whether the connection existed.
  pub fn rename_connection(&self, id: &str, name: &str) -> Result<bool> {
    let changed = self
      .lock()?
      .execute(
        "UPDATE connections SET name = ? WHERE id = ?",
        params![name, id],
      )
      .map_err(|e| eyre!("Failed to rename connection {}: {}", id, e))?;
    Ok(changed > 0)
  }

  /// Delete a connection and its property overrides. Returns whether it
  /// existed.
  pub fn delete_connection(&self, id: &str) -> Result<bool> {
    let mut conn = self.lock()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute(
      "DELETE FROM connection_properties WHERE connection_id = ?",
      params![id],
    )
    .map_err(|e| eyre!("Failed to delete properties of {}: {}", id, e))?;
    let deleted = tx
      .execute("DELETE FROM connections WHERE id = ?", params![id])
      .map_err(|e| eyre!("Failed to delete connection {}: {}", id, e))?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(deleted > 0)
  }

  /// Driver properties of a connection with its overrides applied, or `None`
  /// for an unknown connection.
  pub fn driver_properties(&self, connection_id: &str) -> Result<Option<DriverProperties>> {
    let conn = self.lock()?;

    let driver_id: Option<String> = conn
      .query_row(
        "SELECT driver_id FROM connections WHERE id = ?",
        params![connection_id],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to query connection {}: {}", connection_id, e))?;

    let Some(driver_id) = driver_id else {
      return Ok(None);
    };

    let mut stmt = conn
      .prepare(
        "SELECT dp.property_id, dp.display_name, dp.default_value, cp.value
         FROM driver_properties dp
         LEFT JOIN connection_properties cp
           ON cp.property_id = dp.property_id AND cp.connection_id = ?
         WHERE dp.driver_id = ?
         ORDER BY dp.position",
      )
      .map_err(|e| eyre!("Failed to prepare property query: {}", e))?;

    let properties = stmt
      .query_map(params![connection_id, driver_id], |row| {
        Ok(DriverProperty {
          id: row.get(0)?,
          display_name: row.get(1)?,
          default_value: row.get(2)?,
          value: row.get(3)?,
        })
      })
      .map_err(|e| eyre!("Failed to query properties: {}", e))?
      .collect::<rusqlite::Result<Vec<_>>>()
      .map_err(|e| eyre!("Failed to read property: {}", e))?;

    Ok(Some(DriverProperties {
      connection_id: connection_id.to_string(),
      driver_id,
      properties,
    }))
  }

  /// Override a driver property for one connection.
  pub fn set_property(&self, connection_id: &str, property_id: &str, value: &str) -> Result<()> {
    self
      .lock()?
      .execute(
        "INSERT OR REPLACE INTO connection_properties (connection_id, property_id, value)
         VALUES (?, ?, ?)",
        params![connection_id, property_id, value],
      )
      .map_err(|e| eyre!("Failed to store property {}: {}", property_id, e))?;
    Ok(())
  }
}

/// Schema for catalog tables.
const CATALOG_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS connections (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    driver_id TEXT NOT NULL,
    host TEXT NOT NULL,
    port INTEGER NOT NULL,
    database TEXT NOT NULL,
    auth_properties BLOB,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Properties each driver exposes
CREATE TABLE IF NOT EXISTS driver_properties (
    driver_id TEXT NOT NULL,
    property_id TEXT NOT NULL,
    display_name TEXT NOT NULL,
    default_value TEXT,
    position INTEGER NOT NULL,
    PRIMARY KEY (driver_id, property_id)
);

-- Per-connection overrides of driver properties
CREATE TABLE IF NOT EXISTS connection_properties (
    connection_id TEXT NOT NULL,
    property_id TEXT NOT NULL,
    value TEXT NOT NULL,
    PRIMARY KEY (connection_id, property_id)
);
"#;

const CATALOG_SEED: &str = r#"
INSERT INTO driver_properties (driver_id, property_id, display_name, default_value, position) VALUES
    ('postgresql', 'sslmode', 'SSL mode', 'prefer', 0),
    ('postgresql', 'connectTimeout', 'Connect timeout', '10', 1),
    ('postgresql', 'applicationName', 'Application name', NULL, 2),
    ('mysql', 'useSSL', 'Use SSL', 'false', 0),
    ('mysql', 'serverTimezone', 'Server timezone', NULL, 1);

INSERT INTO connections (id, name, driver_id, host, port, database, auth_properties) VALUES
    ('pg-main', 'Main database', 'postgresql', 'localhost', 5432, 'app', CAST('{"user":"app"}' AS BLOB)),
    ('pg-reports', 'Reporting replica', 'postgresql', 'replica.internal', 5432, 'reports', NULL),
    ('mysql-legacy', 'Legacy shop', 'mysql', 'legacy.internal', 3306, 'shop', CAST('{"user":"shop"}' AS BLOB));

INSERT INTO connection_properties (connection_id, property_id, value) VALUES
    ('pg-main', 'sslmode', 'require'),
    ('mysql-legacy', 'serverTimezone', 'UTC');
"#;

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}
