//! Query keys for the catalog endpoints.

use std::collections::BTreeMap;
use std::fmt::Display;

use serde_json::Value;

use crate::cache::QueryKey;

const RESOURCE: &str = "pokemon";

/// Tag carried by every catalog page.
pub const LIST_TAG: &str = "list";

/// Tag carried by a single entity, looked up by id or by name.
pub fn entity_tag(id_or_name: impl Display) -> String {
  format!("entity:{id_or_name}")
}

/// Query key types for catalog API calls.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PokeQueryKey {
  /// One page of the catalog list
  List { limit: u32, offset: u32 },
  /// A single entity by numeric id
  ById { id: u32 },
  /// A single entity by name (always lower-case)
  ByName { name: String },
}

impl PokeQueryKey {
  /// Name lookups are case-insensitive upstream, so the key is too.
  pub fn by_name(name: &str) -> Self {
    Self::ByName {
      name: normalize_name(name),
    }
  }

  /// The tag that identifies this lookup's entity, used for targeted retries.
  pub fn lookup_tag(&self) -> String {
    match self {
      Self::List { .. } => LIST_TAG.to_string(),
      Self::ById { id } => entity_tag(id),
      Self::ByName { name } => entity_tag(name),
    }
  }
}

impl QueryKey for PokeQueryKey {
  fn path_segments(&self) -> Vec<String> {
    let resource = RESOURCE.to_string();
    match self {
      Self::List { .. } => vec![resource],
      Self::ById { id } => vec![resource, id.to_string()],
      Self::ByName { name } => vec![resource, name.clone()],
    }
  }

  fn params(&self) -> BTreeMap<String, String> {
    match self {
      Self::List { limit, offset } => BTreeMap::from([
        ("limit".to_string(), limit.to_string()),
        ("offset".to_string(), offset.to_string()),
      ]),
      Self::ById { .. } | Self::ByName { .. } => BTreeMap::new(),
    }
  }

  fn provides_tags(&self, data: &Value) -> Vec<String> {
    match self {
      Self::List { .. } => vec![LIST_TAG.to_string()],
      Self::ById { id } => vec![entity_tag(id)],
      Self::ByName { name } => {
        let mut tags = vec![entity_tag(name)];
        // A name lookup also answers for the entity's id
        if let Some(id) = data.get("id").and_then(Value::as_u64) {
          tags.push(entity_tag(id));
        }
        tags
      }
    }
  }

  fn description(&self) -> String {
    match self {
      Self::List { limit, offset } => format!("pokemon list offset={offset} limit={limit}"),
      Self::ById { id } => format!("pokemon #{id}"),
      Self::ByName { name } => format!("pokemon {name}"),
    }
  }
}

/// Whether `name` can address a single entity.
///
/// `.` and `..` would be dropped or resolved as path segments, and an empty
/// name would address the list endpoint.
pub fn is_valid_name(name: &str) -> bool {
  !matches!(normalize_name(name).as_str(), "" | "." | "..")
}

/// Normalize a name for consistent hashing.
/// Trims whitespace and lowercases for case-insensitive matching.
fn normalize_name(name: &str) -> String {
  name.trim().to_lowercase()
}
