use color_eyre::{eyre::eyre, Result};
use std::future::Future;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::{info, warn};

use crate::api::cached_client::CachedPokeClient;
use crate::api::client::PokeApiClient;
use crate::api::detail::{DetailQuery, EntityLookup};
use crate::cache::{CacheStorage, NoopStorage, ResponseCache, SqliteStorage};
use crate::config::Config;
use crate::event::{Event, EventHandler};
use crate::pagination::{ListState, PagedList};
use crate::render;

const TICK_RATE: Duration = Duration::from_millis(25);

/// Owns the cache for the lifetime of the process and drives the list and
/// detail state machines from a tick loop.
pub struct App {
  config: Config,
  client: CachedPokeClient,
  storage: Box<dyn CacheStorage>,
  stdin: Lines<BufReader<Stdin>>,
}

impl App {
  pub fn new(config: Config) -> Result<Self> {
    let transport = PokeApiClient::new(&config)?;
    info!(base_url = transport.base_url(), "Using catalog API");

    let storage: Box<dyn CacheStorage> = if config.cache.persist {
      Box::new(SqliteStorage::open(config.cache.path.as_deref())?)
    } else {
      Box::new(NoopStorage)
    };

    let cache = ResponseCache::new();
    match storage.load() {
      Ok(Some(snapshot)) => {
        let restored = cache.restore(snapshot);
        info!(restored, "Rehydrated response cache");
      }
      Ok(None) => {}
      // A broken cache file shouldn't stop the app; it's rewritten on exit
      Err(e) => warn!(error = %e, "Ignoring unreadable cache"),
    }

    Ok(Self {
      config,
      client: CachedPokeClient::new(Arc::new(transport), cache),
      storage,
      stdin: BufReader::new(tokio::io::stdin()).lines(),
    })
  }

  /// Print the catalog, loading up to `pages` pages.
  pub async fn list(&mut self, pages: usize, refresh: bool) -> Result<()> {
    let mut list = PagedList::new(self.client.clone(), self.config.list.page_size);
    if refresh {
      list.refresh();
    } else {
      list.mount();
    }

    let mut events = EventHandler::new(TICK_RATE);
    let mut printed = 0;
    let mut pages_loaded = 0;

    while let Some(event) = events.next().await {
      if event == Event::Interrupt {
        break;
      }
      if !list.poll() {
        continue;
      }

      let view = list.view();
      // A retry rebuilds the list from the first page; only print what's new
      if view.items.len() > printed {
        for entry in &view.items[printed..] {
          println!("{}", render::entry_line(entry));
        }
        printed = view.items.len();
      }

      match list.state() {
        ListState::Ready => {
          pages_loaded += 1;
          if pages_loaded < pages && list.load_more() {
            continue;
          }
          println!("\n{}", render::list_footer(printed, list.has_more()));
          break;
        }
        ListState::Error => {
          let message = view
            .error
            .map(|e| render::error_message(e, "Pokémon list"))
            .unwrap_or_default();
          eprintln!("{message}");

          if self.confirm_retry().await? {
            list.retry();
            pages_loaded = 0;
            continue;
          }
          return Err(eyre!("Failed to load Pokémon list"));
        }
        ListState::Idle | ListState::LoadingInitial | ListState::LoadingMore => {}
      }
    }

    Ok(())
  }

  /// Print one entity's detail record.
  pub async fn show(&mut self, lookup: EntityLookup) -> Result<()> {
    let mut detail = DetailQuery::new(self.client.clone(), lookup);
    detail.fetch();

    let mut events = EventHandler::new(TICK_RATE);
    while let Some(event) = events.next().await {
      if event == Event::Interrupt {
        break;
      }
      if !detail.poll() {
        continue;
      }

      let view = detail.view();
      if let Some(pokemon) = view.data {
        print!("{}", render::pokemon_detail(pokemon));
        break;
      }

      let Some(error) = view.error.cloned() else {
        continue;
      };
      eprintln!("{}", render::error_message(&error, "Pokémon details"));

      // A different id or name is needed for a missing entity
      if error.is_retryable() && self.confirm_retry().await? {
        detail.retry();
        continue;
      }
      return Err(eyre!("Failed to load {}", detail.lookup()));
    }

    Ok(())
  }

  /// Persist the response cache.
  pub fn shutdown(&self) -> Result<()> {
    let snapshot = self.client.cache().snapshot();
    info!(entries = snapshot.entries.len(), "Saving response cache");
    self.storage.save(&snapshot)
  }

  async fn confirm_retry(&mut self) -> Result<bool> {
    print!("Retry? [Y/n] ");
    std::io::stdout().flush()?;

    read_confirmation(&mut self.stdin, tokio::signal::ctrl_c()).await
  }
}

/// Read a yes/no answer, defaulting to yes. End of input or `interrupt`
/// firing first counts as no.
async fn read_confirmation<R, I>(lines: &mut Lines<R>, interrupt: I) -> Result<bool>
where
  R: AsyncBufRead + Unpin,
  I: Future<Output = std::io::Result<()>>,
{
  tokio::select! {
    answer = lines.next_line() => Ok(match answer? {
      // Non-interactive input
      None => false,
      Some(line) => matches!(line.trim().to_lowercase().as_str(), "" | "y" | "yes"),
    }),
    _ = interrupt => Ok(false),
  }
}
