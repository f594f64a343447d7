use crate::catalog::{
  CatalogClient, CatalogResources, ConnectionInfo, DriverProperties, INCLUDE_AUTH_PROPERTIES,
};
use crate::config::Config;
use crate::event::EventHandler;
use color_eyre::{eyre::eyre, Result};
use std::io::Write;
use tracing::info;

/// What a run should do besides listing the catalog
#[derive(Debug, Clone, Default)]
pub struct Actions {
  /// Show details for this connection instead of the first one
  pub connection: Option<String>,
  /// Delete this connection
  pub delete: Option<String>,
}

/// Main application state
pub struct App {
  /// Cached catalog resources
  resources: CatalogResources,

  /// Cache notifications not yet reported
  events: EventHandler,
}

impl App {
  pub fn new(config: &Config) -> Result<Self> {
    let client = CatalogClient::open(&config.catalog)?;
    let resources = CatalogResources::new(client, &config.resources);

    let events = EventHandler::new();
    events.watch_catalog(&resources);

    Ok(Self { resources, events })
  }

  pub fn resources(&self) -> &CatalogResources {
    &self.resources
  }

  /// Walk the catalog through the cache, writing a report to `out`.
  pub async fn run(&mut self, actions: &Actions, out: &mut impl Write) -> Result<()> {
    let connections = self.resources.all_connections().await?;
    writeln!(out, "{} connection(s)", connections.len())?;
    for connection in &connections {
      write_connection(out, connection)?;
    }
    self.report_events(out)?;

    let focus = match &actions.connection {
      Some(id) => Some(id.clone()),
      None => connections.first().map(|c| c.id.clone()),
    };
    if let Some(id) = focus {
      self.show_connection(&id, out).await?;
    }

    if let Some(id) = &actions.delete {
      info!(connection = %id, "deleting connection");
      self.resources.delete_connection(id).await?;
      writeln!(out, "deleted {id}")?;
      self.report_events(out)?;
    }

    // Everything is outdated now; the next read goes back to the catalog.
    self.resources.connections.mark_outdated(None);
    let connections = self.resources.all_connections().await?;
    writeln!(out, "{} connection(s) after reload", connections.len())?;
    self.report_events(out)?;

    Ok(())
  }

  async fn show_connection(&mut self, id: &str, out: &mut impl Write) -> Result<()> {
    let connection = self
      .resources
      .connection(id, &[INCLUDE_AUTH_PROPERTIES])
      .await?
      .ok_or_else(|| eyre!("Connection not found: {}", id))?;
    write_connection(out, &connection)?;

    let auth = connection.auth_properties.unwrap_or_default();
    let auth_keys: Vec<&str> = auth.keys().map(String::as_str).collect();
    writeln!(out, "  auth: [{}]", auth_keys.join(", "))?;

    if let Some(properties) = self.resources.properties(id).await? {
      write_properties(out, &properties)?;
    }
    self.report_events(out)?;

    Ok(())
  }

  fn report_events(&mut self, out: &mut impl Write) -> Result<()> {
    for event in self.events.drain() {
      writeln!(out, "  * {event}")?;
    }
    Ok(())
  }
}

fn write_connection(out: &mut impl Write, connection: &ConnectionInfo) -> Result<()> {
  writeln!(
    out,
    "{:<16} {:<20} {:<12} {}",
    connection.id,
    connection.name,
    connection.driver_id,
    connection.address()
  )?;
  Ok(())
}

fn write_properties(out: &mut impl Write, properties: &DriverProperties) -> Result<()> {
  writeln!(out, "  {} properties:", properties.driver_id)?;
  for property in &properties.properties {
    writeln!(
      out,
      "    {:<20} {}",
      property.display_name,
      property.effective_value().unwrap_or("-")
    )?;
  }
  Ok(())
}
