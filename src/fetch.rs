//! Retrieval of issuer key sets and trusted issuer directories.
//!
//! Validation only needs "GET this URL as JSON". The trait seam lets tests
//! and offline callers supply documents without a network.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, ClientBuilder};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::error::{Result, ValidationError};

/// Source of JSON documents addressed by URL.
#[async_trait]
pub trait JsonFetcher: Send + Sync {
    async fn fetch_json(&self, url: &str) -> Result<Value>;
}

/// Fetches documents over HTTP(S) with `reqwest`.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = ClientBuilder::new()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(5)))
            .user_agent(format!("shc-validator/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ValidationError::HttpClientError(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl JsonFetcher for HttpFetcher {
    #[instrument(skip(self))]
    async fn fetch_json(&self, url: &str) -> Result<Value> {
        debug!(url = %url, "Fetching JSON document");

        let response = self.client.get(url).send().await.map_err(|e| {
            warn!(url = %url, error = %e, "HTTP request failed");
            ValidationError::FetchError {
                url: url.to_string(),
                reason: e.to_string(),
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            warn!(url = %url, status = %status, "Non-success status");
            return Err(ValidationError::FetchError {
                url: url.to_string(),
                reason: format!("HTTP {}", status),
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| ValidationError::FetchError {
                url: url.to_string(),
                reason: format!("invalid JSON body: {}", e),
            })
    }
}

/// Serves a fixed set of documents; any other URL fails like an unreachable host.
#[derive(Debug, Clone, Default)]
pub struct StaticFetcher {
    documents: HashMap<String, Value>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(mut self, url: impl Into<String>, document: Value) -> Self {
        self.documents.insert(url.into(), document);
        self
    }
}

#[async_trait]
impl JsonFetcher for StaticFetcher {
    async fn fetch_json(&self, url: &str) -> Result<Value> {
        self.documents
            .get(url)
            .cloned()
            .ok_or_else(|| ValidationError::FetchError {
                url: url.to_string(),
                reason: "no document available".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use serde_json::json;
    use tiny_http::{Response, Server};

    use super::*;

    fn serve_once(body: &'static str, status: u16) -> (String, thread::JoinHandle<()>) {
        let server = Server::http("127.0.0.1:0").unwrap();
        let addr = server.server_addr();
        let handle = thread::spawn(move || {
            if let Ok(request) = server.recv() {
                let response = Response::from_string(body).with_status_code(status);
                request.respond(response).unwrap();
            }
        });
        (format!("http://{}", addr), handle)
    }

    #[tokio::test]
    async fn http_fetcher_parses_json_body() {
        let (base, handle) = serve_once(r#"{"keys":[]}"#, 200);
        let fetcher = HttpFetcher::new(Duration::from_secs(5)).unwrap();

        let doc = fetcher
            .fetch_json(&format!("{}/.well-known/jwks.json", base))
            .await
            .unwrap();
        handle.join().unwrap();

        assert_eq!(doc, json!({ "keys": [] }));
    }

    #[tokio::test]
    async fn http_fetcher_rejects_error_status() {
        let (base, handle) = serve_once("Not Found", 404);
        let fetcher = HttpFetcher::new(Duration::from_secs(5)).unwrap();

        let result = fetcher.fetch_json(&format!("{}/missing", base)).await;
        handle.join().unwrap();

        assert!(matches!(result, Err(ValidationError::FetchError { .. })));
    }

    #[tokio::test]
    async fn static_fetcher_misses_unknown_urls() {
        let fetcher =
            StaticFetcher::new().with_document("https://a.example/doc", json!({ "ok": true }));

        assert!(fetcher.fetch_json("https://a.example/doc").await.is_ok());
        assert!(fetcher.fetch_json("https://b.example/doc").await.is_err());
    }
}
