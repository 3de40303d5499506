//! Plain-text rendering of list entries and detail records.

use crate::api::types::{NormalizedEntry, Pokemon};
use crate::api::FetchError;
use crate::normalize::{
  format_display_id, format_display_name, format_height, format_label, format_weight, sprite_url,
  stat_bar_color, stat_bar_fill, type_color,
};

const STAT_BAR_WIDTH: usize = 20;

pub fn entry_line(entry: &NormalizedEntry) -> String {
  format!(
    "#{}  {}",
    format_display_id(entry.id),
    format_display_name(&entry.name)
  )
}

pub fn list_footer(shown: usize, has_more: bool) -> String {
  if has_more {
    format!("{shown} shown, more available (use --pages to load further)")
  } else {
    "You've caught them all!".to_string()
  }
}

pub fn stat_bar(base_stat: u32) -> String {
  // Truncation is fine: the value is in 0..=STAT_BAR_WIDTH
  let filled = (stat_bar_fill(base_stat) * STAT_BAR_WIDTH as f64).round() as usize;
  format!(
    "{}{}",
    "█".repeat(filled),
    "░".repeat(STAT_BAR_WIDTH - filled)
  )
}

pub fn pokemon_detail(pokemon: &Pokemon) -> String {
  let sprite = pokemon
    .sprites
    .front_default
    .clone()
    .unwrap_or_else(|| sprite_url(pokemon.id));
  let types: Vec<String> = pokemon
    .types
    .iter()
    .map(|t| format!("{} ({})", format_display_name(&t.kind.name), type_color(&t.kind.name)))
    .collect();
  let base_experience = pokemon
    .base_experience
    .map_or_else(|| "-".to_string(), |xp| xp.to_string());

  let mut lines = vec![
    format!(
      "{}  #{}",
      format_display_name(&pokemon.name),
      format_display_id(pokemon.id)
    ),
    sprite,
    String::new(),
    format!("Types: {}", types.join(", ")),
    String::new(),
    format!("Height: {}", format_height(pokemon.height)),
    format!("Weight: {}", format_weight(pokemon.weight)),
    format!("Base Experience: {base_experience}"),
    String::new(),
    "Abilities:".to_string(),
  ];

  lines.extend(pokemon.abilities.iter().map(|ability| {
    let hidden = if ability.is_hidden { " (Hidden)" } else { "" };
    format!("  {}{hidden}", format_label(&ability.ability.name))
  }));

  lines.push(String::new());
  lines.push("Stats:".to_string());
  lines.extend(pokemon.stats.iter().map(|stat| {
    format!(
      "  {:<16} {:>3} {} {}",
      format_label(&stat.stat.name),
      stat.base_stat,
      stat_bar(stat.base_stat),
      stat_bar_color(stat.base_stat)
    )
  }));

  let mut out = lines.join("\n");
  out.push('\n');
  out
}

pub fn error_message(error: &FetchError, what: &str) -> String {
  match error {
    FetchError::NotFound { .. } => format!("No {what} found. Try a different id or name."),
    FetchError::Network { .. } => {
      format!("Failed to load {what}. Please check your internet connection and try again. ({error})")
    }
    FetchError::Decode { .. } => format!("Failed to load {what}. ({error})"),
  }
}
