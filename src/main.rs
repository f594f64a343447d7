use clap::Parser;
use color_eyre::Result;
use dbresource::app::{Actions, App};
use dbresource::config::Config;
use dbresource::logging;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "dbresource")]
#[command(about = "Walk a database connection catalog through a reactive cache")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/dbresource/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Connection to show in detail (defaults to the first one)
  #[arg(long)]
  connection: Option<String>,

  /// Connection to delete, cascading into its cached driver properties
  #[arg(long)]
  delete: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = Config::load(args.config.as_deref())?;
  let _guard = logging::init_logging(&config.logging)?;

  let actions = Actions {
    connection: args.connection,
    delete: args.delete,
  };

  let mut app = App::new(&config)?;
  app.run(&actions, &mut std::io::stdout().lock()).await?;

  Ok(())
}
