//! Single-entity lookup with retry, for detail views.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use super::cache::{is_valid_name, PokeQueryKey};
use super::cached_client::CachedPokeClient;
use super::types::Pokemon;
use super::FetchError;
use crate::cache::Subscription;
use crate::query::Query;

/// How an entity is looked up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityLookup {
  Id(u32),
  Name(String),
}

impl EntityLookup {
  pub fn key(&self) -> PokeQueryKey {
    match self {
      Self::Id(id) => PokeQueryKey::ById { id: *id },
      Self::Name(name) => PokeQueryKey::by_name(name),
    }
  }
}

/// Input that names no entity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
  #[error("expected a Pokémon id or name")]
  Empty,
  #[error("'{0}' is not a Pokémon name")]
  InvalidName(String),
}

impl FromStr for EntityLookup {
  type Err = LookupError;

  /// All-digit input is an id, anything else a name.
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let s = s.trim();
    if s.is_empty() {
      return Err(LookupError::Empty);
    }
    if let Ok(id) = s.parse() {
      return Ok(Self::Id(id));
    }
    if !is_valid_name(s) {
      return Err(LookupError::InvalidName(s.to_string()));
    }
    Ok(Self::Name(s.to_string()))
  }
}

impl fmt::Display for EntityLookup {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Id(id) => write!(f, "#{id}"),
      Self::Name(name) => write!(f, "{name}"),
    }
  }
}

/// What a detail view renders from.
#[derive(Debug)]
pub struct DetailView<'a> {
  pub data: Option<&'a Pokemon>,
  pub is_loading: bool,
  pub error: Option<&'a FetchError>,
}

/// Detail fetch for one entity, driven by `fetch`/`poll`/`retry`.
///
/// Holds a subscription on the entity's cache entry for as long as it lives.
pub struct DetailQuery {
  client: CachedPokeClient,
  lookup: EntityLookup,
  query: Query<Pokemon>,
  _subscription: Subscription,
}

impl DetailQuery {
  pub fn new(client: CachedPokeClient, lookup: EntityLookup) -> Self {
    let query = {
      let client = client.clone();
      let lookup = lookup.clone();
      Query::new(move || {
        let client = client.clone();
        let lookup = lookup.clone();
        async move {
          match lookup {
            EntityLookup::Id(id) => client.get_by_id(id).await,
            EntityLookup::Name(name) => client.get_by_name(&name).await,
          }
        }
      })
    };

    let subscription = client.cache().subscribe(&lookup.key());

    Self {
      client,
      lookup,
      query,
      _subscription: subscription,
    }
  }

  pub fn lookup(&self) -> &EntityLookup {
    &self.lookup
  }

  pub fn fetch(&mut self) {
    self.query.fetch();
  }

  /// Apply a finished fetch. Returns `true` if the view changed.
  pub fn poll(&mut self) -> bool {
    self.query.poll()
  }

  /// Invalidate this entity's tag and fetch it again.
  pub fn retry(&mut self) {
    self.client.invalidate(&self.lookup.key().lookup_tag());
    self.query.refetch();
  }

  pub fn view(&self) -> DetailView<'_> {
    DetailView {
      data: self.query.data(),
      is_loading: self.query.is_loading(),
      error: self.query.error(),
    }
  }
}
