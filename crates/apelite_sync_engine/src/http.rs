//! HTTP remote store.
//!
//! Talks JSON to a document gateway in front of the remote database:
//!
//! ```text
//! GET  {base}/health
//! GET  {base}/collections/{collection}/documents
//! GET  {base}/collections/{collection}/documents/{id}    (404 = not found)
//! PUT  {base}/collections/{collection}/documents/{id}
//! ```
//!
//! Network errors and non-success statuses surface as `RemoteUnavailable`,
//! deadlines as `Timeout`.

use crate::config::RemoteConfig;
use crate::error::{SyncError, SyncResult};
use crate::remote::{document_id, strip_internal_id, RemoteStore};
use apelite_core::{Row, Table};
use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::{Client, StatusCode, Url};
use serde_json::Value;
use tracing::debug;

/// Remote store reached over HTTP.
#[derive(Debug)]
pub struct HttpRemoteStore {
    base: Url,
    client: Client,
    config: RemoteConfig,
    last_error: RwLock<Option<String>>,
}

impl HttpRemoteStore {
    /// Creates a client for `config.base_url`.
    pub fn new(config: RemoteConfig) -> SyncResult<Self> {
        let base = Url::parse(&config.base_url).map_err(|e| {
            SyncError::remote_unavailable(format!("invalid remote URL {}: {e}", config.base_url))
        })?;
        if base.cannot_be_a_base() {
            return Err(SyncError::remote_unavailable(format!(
                "remote URL cannot be a base: {}",
                config.base_url
            )));
        }
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| SyncError::remote_unavailable(format!("cannot build HTTP client: {e}")))?;

        Ok(Self {
            base,
            client,
            config,
            last_error: RwLock::new(None),
        })
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        self.base.as_str()
    }

    /// Returns the last error message.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    fn url(&self, segments: &[&str]) -> SyncResult<Url> {
        let mut url = self.base.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| SyncError::remote_unavailable("remote URL cannot carry a path"))?;
            path.pop_if_empty().extend(segments);
        }
        Ok(url)
    }

    fn collection_url(&self, collection: Table) -> SyncResult<Url> {
        self.url(&["collections", collection.as_str(), "documents"])
    }

    fn document_url(&self, collection: Table, id: &str) -> SyncResult<Url> {
        self.url(&["collections", collection.as_str(), "documents", id])
    }

    fn fail(&self, err: reqwest::Error) -> SyncError {
        *self.last_error.write() = Some(err.to_string());
        if err.is_timeout() {
            SyncError::Timeout
        } else {
            SyncError::remote_unavailable(err.to_string())
        }
    }

    fn fail_status(&self, method: &str, url: &Url, status: StatusCode) -> SyncError {
        let message = format!("{method} {url}: HTTP {status}");
        *self.last_error.write() = Some(message.clone());
        SyncError::remote_unavailable(message)
    }

    fn clear_error(&self) {
        *self.last_error.write() = None;
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn ping(&self) -> bool {
        let Ok(url) = self.url(&["health"]) else {
            return false;
        };
        match self
            .client
            .get(url)
            .timeout(self.config.ping_timeout)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!("ping {} failed: {e}", self.base);
                false
            }
        }
    }

    async fn fetch_all(&self, collection: Table) -> SyncResult<Vec<Value>> {
        let url = self.collection_url(collection)?;
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| self.fail(e))?;
        if !response.status().is_success() {
            return Err(self.fail_status("GET", &url, response.status()));
        }
        let documents: Vec<Value> = response.json().await.map_err(|e| self.fail(e))?;
        self.clear_error();
        Ok(documents.into_iter().map(strip_internal_id).collect())
    }

    async fn find(&self, collection: Table, id: &str) -> SyncResult<Option<Value>> {
        let url = self.document_url(collection, id)?;
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| self.fail(e))?;
        if response.status() == StatusCode::NOT_FOUND {
            self.clear_error();
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(self.fail_status("GET", &url, response.status()));
        }
        let document: Value = response.json().await.map_err(|e| self.fail(e))?;
        self.clear_error();
        Ok(Some(strip_internal_id(document)))
    }

    async fn upsert(&self, collection: Table, document: &Row) -> SyncResult<()> {
        let url = self.document_url(collection, document_id(document)?)?;
        let response = self
            .client
            .put(url.clone())
            .json(document)
            .send()
            .await
            .map_err(|e| self.fail(e))?;
        if !response.status().is_success() {
            return Err(self.fail_status("PUT", &url, response.status()));
        }
        self.clear_error();
        Ok(())
    }
}
