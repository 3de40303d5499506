use clap::{Parser, Subcommand};
use color_eyre::Result;
use std::path::PathBuf;

use pokedex::api::detail::EntityLookup;
use pokedex::{app, config, logging};

#[derive(Parser, Debug)]
#[command(name = "pokedex")]
#[command(about = "Browse the Pokémon catalog from the command line")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/pokedex/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Don't read or write the on-disk response cache
  #[arg(long, global = true)]
  no_cache: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// List the catalog, one page at a time
  List {
    /// Number of pages to load
    #[arg(short, long, default_value_t = 1, value_parser = clap::value_parser!(u16).range(1..))]
    pages: u16,

    /// Ignore cached pages and fetch them again
    #[arg(long)]
    refresh: bool,
  },
  /// Show one Pokémon by id or name
  Show {
    /// Numeric id (e.g. 25) or name (e.g. pikachu)
    lookup: EntityLookup,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _log_guard = logging::init()?;

  // Load configuration
  let mut config = config::Config::load(args.config.as_deref())?;
  if args.no_cache {
    config.cache.persist = false;
  }

  let mut app = app::App::new(config)?;
  let result = match args.command {
    Command::List { pages, refresh } => app.list(usize::from(pages), refresh).await,
    Command::Show { lookup } => app.show(lookup).await,
  };

  // Save what was fetched even if the command itself failed
  app.shutdown()?;
  result
}
