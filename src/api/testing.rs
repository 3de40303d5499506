//! Scripted transport for tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use futures::future::{BoxFuture, FutureExt};
use serde_json::{json, Value};
use tokio::sync::Notify;

use super::client::Transport;
use super::FetchError;

/// Answers requests from a script, counts calls and can hold a response
/// until the test releases it.
#[derive(Default)]
pub struct FakeTransport {
  responses: Mutex<HashMap<String, Result<Value, FetchError>>>,
  calls: Mutex<Vec<String>>,
  gates: Mutex<HashMap<String, Arc<Notify>>>,
}

impl FakeTransport {
  pub fn new() -> Self {
    Self::default()
  }

  /// Request string for a catalog page with the default page size.
  pub fn list_request(offset: u32) -> String {
    format!("/pokemon?limit=20&offset={offset}")
  }

  pub fn respond(&self, request: &str, response: Result<Value, FetchError>) {
    self
      .responses
      .lock()
      .unwrap()
      .insert(request.to_string(), response);
  }

  pub fn respond_list(&self, offset: u32, response: Result<Value, FetchError>) {
    self.respond(&Self::list_request(offset), response);
  }

  /// Hold responses for `request` until [`release`](Self::release).
  pub fn hold(&self, request: &str) {
    self
      .gates
      .lock()
      .unwrap()
      .insert(request.to_string(), Arc::new(Notify::new()));
  }

  pub fn release(&self, request: &str) {
    if let Some(gate) = self.gates.lock().unwrap().remove(request) {
      gate.notify_one();
    }
  }

  pub fn calls(&self, request: &str) -> usize {
    self
      .calls
      .lock()
      .unwrap()
      .iter()
      .filter(|c| *c == request)
      .count()
  }

  pub fn total_calls(&self) -> usize {
    self.calls.lock().unwrap().len()
  }
}

impl Transport for FakeTransport {
  fn fetch(
    &self,
    segments: &[String],
    params: &BTreeMap<String, String>,
  ) -> BoxFuture<'static, Result<Value, FetchError>> {
    let path = format!("/{}", segments.join("/"));
    let request = if params.is_empty() {
      path
    } else {
      let query: Vec<String> = params.iter().map(|(k, v)| format!("{k}={v}")).collect();
      format!("{path}?{}", query.join("&"))
    };

    self.calls.lock().unwrap().push(request.clone());
    let gate = self.gates.lock().unwrap().get(&request).cloned();
    let response = self
      .responses
      .lock()
      .unwrap()
      .get(&request)
      .cloned()
      .unwrap_or_else(|| {
        Err(FetchError::NotFound {
          resource: request.trim_start_matches('/').to_string(),
        })
      });

    async move {
      if let Some(gate) = gate {
        gate.notified().await;
      }
      response
    }
    .boxed()
  }
}

/// A list page body. `next_offset` of `None` marks the last page.
pub fn list_page(next_offset: Option<u32>, entries: &[(&str, &str)]) -> Value {
  json!({
    "count": 1154,
    "next": next_offset.map(|o| format!("https://pokeapi.co/api/v2/pokemon?offset={o}&limit=20")),
    "previous": null,
    "results": entries
      .iter()
      .map(|(name, url)| json!({ "name": name, "url": url }))
      .collect::<Vec<_>>(),
  })
}

pub fn pokemon_json(id: u32, name: &str) -> Value {
  json!({
    "id": id,
    "name": name,
    "base_experience": 112,
    "height": 4,
    "weight": 60,
    "sprites": { "front_default": null, "front_shiny": null, "back_default": null, "back_shiny": null },
    "types": [{ "slot": 1, "type": { "name": "electric", "url": "https://pokeapi.co/api/v2/type/13/" } }],
    "stats": [
      { "base_stat": 35, "effort": 0, "stat": { "name": "hp", "url": "https://pokeapi.co/api/v2/stat/1/" } },
      { "base_stat": 50, "effort": 0, "stat": { "name": "special-attack", "url": "https://pokeapi.co/api/v2/stat/4/" } }
    ],
    "abilities": [
      { "ability": { "name": "static", "url": "https://pokeapi.co/api/v2/ability/9/" }, "is_hidden": false, "slot": 1 },
      { "ability": { "name": "lightning-rod", "url": "https://pokeapi.co/api/v2/ability/31/" }, "is_hidden": true, "slot": 3 }
    ]
  })
}
