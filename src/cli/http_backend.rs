use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::blocking::{Client, RequestBuilder};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::models::{IndexSummary, SearchRequest, SearchResult};

/// HTTP client backend that delegates search and index operations to a
/// running `addrgram` daemon.
pub struct HttpSearchBackend {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

impl HttpSearchBackend {
    /// Create a new HTTP backend targeting the given base URL
    /// (e.g. "http://127.0.0.1:7878").
    pub fn new<S: Into<String>>(base_url: S) -> Result<Self> {
        let base_url = base_url.into();
        let base_url = base_url.trim_end_matches('/').to_string();

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self { client, base_url })
    }

    /// Execute a search via `POST /v1/search`, returning a
    /// deserialized `SearchResult`.
    pub fn search(&self, request: &SearchRequest) -> Result<SearchResult> {
        self.post_json("/v1/search", request)
    }

    /// Ask the daemon to rebuild and publish its index via
    /// `POST /v1/index`.
    pub fn index(&self) -> Result<IndexSummary> {
        self.post_json("/v1/index", &serde_json::json!({}))
    }

    /// Inspect the daemon's persisted index via `GET /v1/index/info`.
    pub fn index_info(&self) -> Result<IndexSummary> {
        let url = self.url_for("/v1/index/info");
        self.send(&url, self.client.get(&url))
    }

    fn post_json<T, R>(&self, path: &str, body: &T) -> Result<R>
    where
        T: Serialize,
        R: DeserializeOwned,
    {
        let url = self.url_for(path);
        self.send(&url, self.client.post(&url).json(body))
    }

    fn send<R: DeserializeOwned>(&self, url: &str, request: RequestBuilder) -> Result<R> {
        let response = request
            .send()
            .with_context(|| format!("failed to send request to {}", url))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ErrorBody>()
                .map(|body| body.error)
                .unwrap_or_else(|_| "no error details".to_string());
            bail!("server returned {} for {}: {}", status, url, message);
        }

        let value = response
            .json::<R>()
            .context("failed to decode JSON response from server")?;

        Ok(value)
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}
