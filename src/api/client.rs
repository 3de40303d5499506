use std::collections::BTreeMap;
use std::time::Duration;

use color_eyre::{eyre::eyre, Result};
use futures::future::{BoxFuture, FutureExt};
use reqwest::StatusCode;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::api::FetchError;
use crate::config::Config;

/// The upstream fetch capability: `GET /segments?params` returning a JSON body.
///
/// Each segment is one path segment, never split further. Implementations own
/// timeout policy. The cache layer never retries.
pub trait Transport: Send + Sync + 'static {
  fn fetch(
    &self,
    segments: &[String],
    params: &BTreeMap<String, String>,
  ) -> BoxFuture<'static, Result<Value, FetchError>>;
}

/// HTTP client for a PokeAPI-compatible service
#[derive(Clone)]
pub struct PokeApiClient {
  http: reqwest::Client,
  base_url: String,
}

impl PokeApiClient {
  pub fn new(config: &Config) -> Result<Self> {
    let http = reqwest::Client::builder()
      .timeout(Duration::from_secs(config.api.timeout_secs))
      .user_agent(concat!("pokedex/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| eyre!("Failed to build HTTP client: {}", e))?;

    Self::from_reqwest(&config.api.base_url, http)
  }

  /// Wrap an existing reqwest client. The base URL must be absolute.
  pub fn from_reqwest(base_url: &str, http: reqwest::Client) -> Result<Self> {
    Url::parse(base_url).map_err(|e| eyre!("Invalid API base URL {}: {}", base_url, e))?;

    Ok(Self {
      http,
      base_url: base_url.trim_end_matches('/').to_string(),
    })
  }

  pub fn base_url(&self) -> &str {
    &self.base_url
  }

  fn endpoint_url(
    &self,
    segments: &[String],
    params: &BTreeMap<String, String>,
  ) -> Result<Url, FetchError> {
    let mut url = Url::parse(&self.base_url)
      .map_err(|e| FetchError::network(format!("invalid API base URL: {e}")))?;

    // `extend` percent-encodes `/`, `?` and `%` inside a segment
    url
      .path_segments_mut()
      .map_err(|_| FetchError::network(format!("API base URL {} cannot take a path", self.base_url)))?
      .pop_if_empty()
      .extend(segments);

    if !params.is_empty() {
      url.query_pairs_mut().extend_pairs(params);
    }

    Ok(url)
  }

  /// GET a JSON document
  pub async fn get_json(
    &self,
    segments: &[String],
    params: &BTreeMap<String, String>,
  ) -> Result<Value, FetchError> {
    let url = self.endpoint_url(segments, params)?;
    let path = segments.join("/");
    debug!(%url, "GET");

    let response = self
      .http
      .get(url)
      .header("Content-Type", "application/json")
      .send()
      .await
      .map_err(|e| FetchError::Network {
        message: e.to_string(),
        status: e.status().map(|s| s.as_u16()),
      })?;

    let status = response.status();
    if status == StatusCode::NOT_FOUND {
      return Err(FetchError::NotFound {
        resource: path,
      });
    }
    if !status.is_success() {
      return Err(FetchError::Network {
        message: format!("HTTP {status} for {path}"),
        status: Some(status.as_u16()),
      });
    }

    response.json::<Value>().await.map_err(|e| FetchError::Decode {
      message: format!("invalid JSON from {path}: {e}"),
    })
  }
}

impl Transport for PokeApiClient {
  fn fetch(
    &self,
    segments: &[String],
    params: &BTreeMap<String, String>,
  ) -> BoxFuture<'static, Result<Value, FetchError>> {
    let client = self.clone();
    let segments = segments.to_vec();
    let params = params.clone();
    async move { client.get_json(&segments, &params).await }.boxed()
  }
}
