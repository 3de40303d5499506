//! Entity normalization and display formatting.
//!
//! Everything here is total: malformed input degrades to a neutral value
//! (id 0, the default color) rather than failing.

use crate::api::types::{ListEntry, NormalizedEntry};

const SPRITE_BASE_URL: &str =
  "https://raw.githubusercontent.com/PokeAPI/sprites/master/sprites/pokemon";

const DEFAULT_TYPE_COLOR: &str = "#68A090";

const TYPE_COLORS: &[(&str, &str)] = &[
  ("normal", "#A8A878"),
  ("fire", "#F08030"),
  ("water", "#6890F0"),
  ("electric", "#F8D030"),
  ("grass", "#78C850"),
  ("ice", "#98D8D8"),
  ("fighting", "#C03028"),
  ("poison", "#A040A0"),
  ("ground", "#E0C068"),
  ("flying", "#A890F0"),
  ("psychic", "#F85888"),
  ("bug", "#A8B820"),
  ("rock", "#B8A038"),
  ("ghost", "#705898"),
  ("dragon", "#7038F8"),
  ("dark", "#705848"),
  ("steel", "#B8B8D0"),
  ("fairy", "#EE99AC"),
];

/// Stat value at which a stat bar is drawn full.
const STAT_BAR_MAX: f64 = 200.0;

/// Derive the numeric id from a resource locator such as
/// `https://pokeapi.co/api/v2/pokemon/25/`.
///
/// The last non-empty path segment is read as a base-10 integer. Like a
/// lenient `parseInt`, leading whitespace is skipped and anything after the
/// leading digits is ignored, so `"25abc"` yields 25. No digits, an empty
/// locator or a value that overflows `u32` all yield 0.
pub fn derive_id(url: &str) -> u32 {
  let Some(segment) = url.split('/').filter(|s| !s.is_empty()).last() else {
    return 0;
  };

  let segment = segment.trim_start();
  let digits_end = segment
    .find(|c: char| !c.is_ascii_digit())
    .unwrap_or(segment.len());

  segment[..digits_end].parse().unwrap_or(0)
}

/// Fold the derived id into a list entry.
pub fn normalize_entry(entry: ListEntry) -> NormalizedEntry {
  let id = derive_id(&entry.url);
  NormalizedEntry {
    name: entry.name,
    url: entry.url,
    id,
  }
}

/// `1` → `"001"`, `151` → `"151"`, `1025` → `"1025"`.
pub fn format_display_id(id: u32) -> String {
  format!("{id:03}")
}

/// Uppercase the first character and leave the rest untouched.
pub fn format_display_name(name: &str) -> String {
  let mut chars = name.chars();
  match chars.next() {
    Some(first) => first.to_uppercase().chain(chars).collect(),
    None => String::new(),
  }
}

/// Turn a hyphenated token into a title-cased label:
/// `"special-attack"` → `"Special Attack"`.
pub fn format_label(token: &str) -> String {
  token
    .split('-')
    .map(format_display_name)
    .collect::<Vec<_>>()
    .join(" ")
}

/// Artwork fallback used when an entity has no `front_default` sprite.
pub fn sprite_url(id: u32) -> String {
  format!("{SPRITE_BASE_URL}/{id}.png")
}

/// Height arrives in decimetres.
pub fn format_height(decimetres: u32) -> String {
  format!("{:.1} m", f64::from(decimetres) / 10.0)
}

/// Weight arrives in hectograms.
pub fn format_weight(hectograms: u32) -> String {
  format!("{:.1} kg", f64::from(hectograms) / 10.0)
}

pub fn type_color(type_name: &str) -> &'static str {
  TYPE_COLORS
    .iter()
    .find(|(name, _)| *name == type_name)
    .map(|(_, color)| *color)
    .unwrap_or(DEFAULT_TYPE_COLOR)
}

pub fn stat_bar_color(base_stat: u32) -> &'static str {
  if base_stat > 100 {
    "#10B981"
  } else if base_stat > 50 {
    "#F59E0B"
  } else {
    "#EF4444"
  }
}

/// Fraction of the stat bar to fill, in `0.0..=1.0`.
pub fn stat_bar_fill(base_stat: u32) -> f64 {
  (f64::from(base_stat) / STAT_BAR_MAX).min(1.0)
}
