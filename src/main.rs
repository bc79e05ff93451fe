mod api;
mod app;
mod config;
mod event;
mod logging;
mod query;
mod ui;

use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "todoq")]
#[command(about = "A todo list demonstrating paginated queries and optimistic updates")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/todoq/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Simulated backend latency in milliseconds
  #[arg(long)]
  latency_ms: Option<u64>,

  /// Number of todos per page
  #[arg(long)]
  page_size: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let mut config = config::Config::load(args.config.as_deref())?;

  // Override backend settings if specified on command line
  if let Some(latency_ms) = args.latency_ms {
    config.api.latency_ms = latency_ms;
  }
  if let Some(page_size) = args.page_size {
    config.api.page_size = page_size;
  }
  config.validate()?;

  let _log_guard = logging::init(&config.log)?;
  tracing::info!(
    latency_ms = config.api.latency_ms,
    page_size = config.api.page_size,
    "starting todoq"
  );

  // Initialize and run the app
  let mut app = app::App::new(config);
  app.run().await?;

  Ok(())
}
