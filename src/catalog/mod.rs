//! A database connection catalog served through cached resources.

mod resources;
mod storage;
mod types;

pub use resources::{
  CatalogClient, CatalogResources, ConnectionInfoResource, DriverPropertiesResource,
};
pub use storage::SqliteCatalog;
pub use types::{ConnectionInfo, DriverProperties, DriverProperty, INCLUDE_AUTH_PROPERTIES};
