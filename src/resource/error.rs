//! Errors surfaced by cached resources.

use std::sync::Arc;

use color_eyre::Report;
use thiserror::Error;

/// Failure of a resource operation.
///
/// Cloneable so that one fetch failure reaches every caller awaiting the same
/// in-flight task and can be stored per key in the metadata.
#[derive(Debug, Clone, Error)]
pub enum ResourceError {
  /// The loader rejected the request.
  #[error("{resource}: fetch failed: {report}")]
  Fetch {
    resource: &'static str,
    report: Arc<Report>,
  },
  /// The fetch task ended without reporting a result.
  #[error("{resource}: fetch task was interrupted")]
  Interrupted { resource: &'static str },
}

impl ResourceError {
  pub fn fetch(resource: &'static str, report: Report) -> Self {
    Self::Fetch {
      resource,
      report: Arc::new(report),
    }
  }

  pub fn interrupted(resource: &'static str) -> Self {
    Self::Interrupted { resource }
  }

  /// Name of the resource the error originated from.
  pub fn resource(&self) -> &'static str {
    match self {
      Self::Fetch { resource, .. } | Self::Interrupted { resource } => resource,
    }
  }

  /// The loader's report, when the failure came from the loader.
  pub fn report(&self) -> Option<&Report> {
    match self {
      Self::Fetch { report, .. } => Some(report),
      Self::Interrupted { .. } => None,
    }
  }
}
