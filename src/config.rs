use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
  pub logging: LoggingConfig,
  pub catalog: CatalogConfig,
  pub resources: ResourcesConfig,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
  /// Multi-line, human friendly output
  #[default]
  Pretty,
  /// One line per event
  Compact,
  /// Newline-delimited JSON
  Json,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
  /// Default filter directive; `RUST_LOG` takes precedence
  #[serde(deserialize_with = "deserialize_lowercase")]
  pub level: String,
  pub format: LogFormat,
  /// Write daily log files here instead of stderr
  pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
  fn default() -> Self {
    Self {
      level: "info".to_string(),
      format: LogFormat::default(),
      directory: None,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
  /// SQLite file backing the catalog (in-memory when unset)
  pub path: Option<PathBuf>,
  /// Fill an empty catalog with sample connections
  pub seed: bool,
  /// Delay added to every catalog query, in milliseconds
  pub latency_ms: u64,
}

impl Default for CatalogConfig {
  fn default() -> Self {
    Self {
      path: None,
      seed: true,
      latency_ms: 0,
    }
  }
}

/// Includes every key of a resource carries from the start
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ResourcesConfig {
  pub connection_includes: Vec<String>,
  pub driver_property_includes: Vec<String>,
}

fn deserialize_lowercase<'de, D>(deserializer: D) -> Result<String, D::Error>
where
  D: serde::Deserializer<'de>,
{
  let v = String::deserialize(deserializer)?;
  Ok(v.to_lowercase())
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./dbresource.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/dbresource/config.yaml
  ///
  /// Without a file the defaults apply.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("dbresource.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("dbresource").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self, serde_yaml::Error> {
    // An empty document deserializes to unit, not to an empty map
    if contents.trim().is_empty() {
      return Ok(Self::default());
    }
    serde_yaml::from_str(contents)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_empty_config_uses_defaults() {
    let config = Config::parse("").unwrap();
    assert_eq!(config.logging.level, "info");
    assert_eq!(config.logging.format, LogFormat::Pretty);
    assert!(config.catalog.path.is_none());
    assert!(config.catalog.seed);
    assert!(config.resources.connection_includes.is_empty());
  }

  #[test]
  fn test_partial_config() {
    let config = Config::parse(
      r#"
logging:
  level: DEBUG
  format: json
catalog:
  path: /tmp/catalog.db
  latency_ms: 25
resources:
  connection_includes: [includeAuthProperties]
"#,
    )
    .unwrap();

    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.logging.format, LogFormat::Json);
    assert_eq!(config.catalog.path, Some(PathBuf::from("/tmp/catalog.db")));
    assert_eq!(config.catalog.latency_ms, 25);
    assert!(config.catalog.seed);
    assert_eq!(config.resources.connection_includes, vec!["includeAuthProperties"]);
  }

  #[test]
  fn test_unknown_format_is_rejected() {
    assert!(Config::parse("logging:\n  format: fancy\n").is_err());
  }

  #[test]
  fn test_missing_explicit_path_is_an_error() {
    assert!(Config::load(Some(Path::new("/nonexistent/dbresource.yaml"))).is_err());
  }
}
