//! Serde types matching the catalog API responses.

use serde::{Deserialize, Serialize};

/// One entry of the catalog list endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListEntry {
  pub name: String,
  pub url: String,
}

/// A list entry with the numeric id derived from its locator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedEntry {
  pub name: String,
  pub url: String,
  pub id: u32,
}

/// One offset-based page of results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
  pub count: u64,
  pub next: Option<String>,
  pub previous: Option<String>,
  pub results: Vec<T>,
}

impl<T> Page<T> {
  /// Whether the server reports another page after this one.
  pub fn has_next(&self) -> bool {
    self.next.is_some()
  }

  pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
    Page {
      count: self.count,
      next: self.next,
      previous: self.previous,
      results: self.results.into_iter().map(f).collect(),
    }
  }
}

/// A `{name, url}` reference to another resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedResource {
  pub name: String,
  pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sprites {
  pub front_default: Option<String>,
  pub front_shiny: Option<String>,
  pub back_default: Option<String>,
  pub back_shiny: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PokemonType {
  pub slot: u8,
  #[serde(rename = "type")]
  pub kind: NamedResource,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PokemonStat {
  pub base_stat: u32,
  pub effort: u32,
  pub stat: NamedResource,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PokemonAbility {
  pub ability: NamedResource,
  pub is_hidden: bool,
  pub slot: u8,
}

/// Full entity detail record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pokemon {
  pub id: u32,
  pub name: String,
  // Some forms come back with a null base experience
  #[serde(default)]
  pub base_experience: Option<u32>,
  /// Decimetres
  pub height: u32,
  /// Hectograms
  pub weight: u32,
  #[serde(default)]
  pub sprites: Sprites,
  #[serde(default)]
  pub types: Vec<PokemonType>,
  #[serde(default)]
  pub stats: Vec<PokemonStat>,
  #[serde(default)]
  pub abilities: Vec<PokemonAbility>,
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_pokemon_ignores_unknown_fields() {
    let body = json!({
      "id": 25,
      "name": "pikachu",
      "base_experience": 112,
      "height": 4,
      "weight": 60,
      "order": 35,
      "sprites": { "front_default": null, "front_shiny": null, "back_default": null, "back_shiny": null, "other": {} },
      "types": [{ "slot": 1, "type": { "name": "electric", "url": "https://pokeapi.co/api/v2/type/13/" } }],
      "stats": [{ "base_stat": 90, "effort": 2, "stat": { "name": "speed", "url": "https://pokeapi.co/api/v2/stat/6/" } }],
      "abilities": [{ "ability": { "name": "lightning-rod", "url": "https://pokeapi.co/api/v2/ability/31/" }, "is_hidden": true, "slot": 3 }],
      "moves": []
    });

    let pokemon: Pokemon = serde_json::from_value(body).unwrap();
    assert_eq!(pokemon.id, 25);
    assert_eq!(pokemon.types[0].kind.name, "electric");
    assert!(pokemon.abilities[0].is_hidden);
    assert_eq!(pokemon.sprites.front_default, None);
  }

  #[test]
  fn test_last_page_has_no_next() {
    let page: Page<ListEntry> = serde_json::from_value(json!({
      "count": 1,
      "next": null,
      "previous": "https://pokeapi.co/api/v2/pokemon?offset=0&limit=20",
      "results": [{ "name": "venusaur", "url": "https://pokeapi.co/api/v2/pokemon/3/" }]
    }))
    .unwrap();

    assert!(!page.has_next());
    assert_eq!(page.results.len(), 1);
  }
}
