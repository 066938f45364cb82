mod app;
mod config;
mod input;
mod ui;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use ratatui::{
  DefaultTerminal,
  crossterm::event::{self, Event, KeyEventKind},
};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use app::App;
use config::{Config, Overrides, Settings};
use vidshelf::SortOrder;

// --- CLI ---

#[derive(Parser, Debug)]
#[command(author, version = env!("CARGO_PKG_VERSION"), about, long_about = None)]
struct Args {
  /// Catalog API root, e.g. http://nas.local:8000/api (default: saved prefs, then built-in)
  #[arg(long)]
  api_url: Option<String>,

  /// Initial sort order
  #[arg(short, long, value_enum)]
  sort: Option<CliSortOrder>,

  /// Also list videos whose files are missing on disk
  #[arg(long)]
  include_unavailable: bool,

  /// Start filtered by this tag (repeatable)
  #[arg(short, long = "tag", value_name = "NAME")]
  tags: Vec<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliSortOrder {
  Newest,
  Oldest,
}

impl From<CliSortOrder> for SortOrder {
  fn from(value: CliSortOrder) -> Self {
    match value {
      CliSortOrder::Newest => SortOrder::NewestFirst,
      CliSortOrder::Oldest => SortOrder::OldestFirst,
    }
  }
}

impl From<Args> for Overrides {
  fn from(args: Args) -> Self {
    Self {
      api_url: args.api_url,
      sort_order: args.sort.map(SortOrder::from),
      include_unavailable: args.include_unavailable,
      tags: args.tags,
    }
  }
}

// --- Logging ---

/// Log to a daily file; the terminal belongs to the UI. The guard must live
/// until exit so buffered lines are flushed.
fn init_tracing() -> Result<WorkerGuard> {
  let dir = config::log_dir();
  std::fs::create_dir_all(&dir).with_context(|| format!("Failed to create log directory {}", dir.display()))?;
  let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(&dir, "vidshelf.log"));
  tracing_subscriber::registry()
    .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "vidshelf=info".into()))
    .with(fmt::layer().with_writer(writer).with_ansi(false))
    .init();
  Ok(guard)
}

// --- Main ---

#[tokio::main]
async fn main() -> Result<()> {
  let args = Args::parse();
  let _guard = init_tracing()?;

  let prefs = Config::load();
  let settings = Settings::resolve(args.into(), &prefs);
  info!(?settings, "vidshelf starting");

  let default_hook = std::panic::take_hook();
  std::panic::set_hook(Box::new(move |info| {
    ratatui::restore();
    default_hook(info);
  }));

  let mut terminal = ratatui::init();
  let result = run(&mut terminal, settings, prefs).await;
  ratatui::restore();
  result
}

async fn run(terminal: &mut DefaultTerminal, settings: Settings, prefs: Config) -> Result<()> {
  let api_url = settings.api_url.clone();
  let mut app = App::new(settings, prefs).with_context(|| format!("Invalid API url '{}'", api_url))?;

  loop {
    app.tick();

    terminal.draw(|frame| ui::ui(frame, &mut app)).context("Failed to draw frame")?;
    app.observe_viewport();

    if event::poll(app.poll_timeout())? {
      match event::read()? {
        Event::Key(key) if key.kind == KeyEventKind::Press => {
          input::handle_key_event(&mut app, key);
        }
        _ => {}
      }
    }

    if app.should_quit {
      break;
    }
  }

  app.shutdown();
  info!("vidshelf exiting");
  Ok(())
}
