use color_eyre::{eyre::eyre, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, LoggingConfig};

const LOG_FILE_PREFIX: &str = "dbresource.log";

/// `RUST_LOG` if set, otherwise the configured level.
fn env_filter(level: &str) -> Result<EnvFilter> {
  match std::env::var("RUST_LOG") {
    Ok(directives) if !directives.is_empty() => EnvFilter::try_new(&directives)
      .map_err(|e| eyre!("Invalid RUST_LOG '{}': {}", directives, e)),
    _ => EnvFilter::try_new(level).map_err(|e| eyre!("Invalid log level '{}': {}", level, e)),
  }
}

/// Initializes logging.
///
/// Events go to stderr, or to a daily rolling file when a log directory is
/// configured. The returned guard flushes the file writer on drop and must be
/// held until the program exits.
pub fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
  let filter = env_filter(&config.level)?;

  let (writer, guard) = match &config.directory {
    Some(directory) => {
      std::fs::create_dir_all(directory)
        .map_err(|e| eyre!("Failed to create log directory {}: {}", directory.display(), e))?;
      let appender = tracing_appender::rolling::daily(directory, LOG_FILE_PREFIX);
      let (writer, guard) = tracing_appender::non_blocking(appender);
      (BoxMakeWriter::new(writer), Some(guard))
    }
    None => (BoxMakeWriter::new(std::io::stderr), None),
  };

  let fmt_layer = {
    let layer = tracing_subscriber::fmt::layer()
      .with_writer(writer)
      .with_ansi(guard.is_none())
      .with_target(true);

    match config.format {
      LogFormat::Pretty => layer.pretty().boxed(),
      LogFormat::Compact => layer.compact().boxed(),
      LogFormat::Json => layer.json().boxed(),
    }
  }
  .with_filter(filter);

  tracing_subscriber::registry()
    .with(fmt_layer)
    .try_init()
    .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;

  Ok(guard)
}
