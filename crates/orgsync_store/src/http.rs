//! HTTP key-value store.
//!
//! Talks to a realtime database over its REST surface: every key path is
//! a JSON document at `<base>/<path>.json`, read with `GET` and replaced
//! with `PUT`. An absent document reads back as `null`.
//!
//! The actual HTTP client is abstracted via a trait so the store can be
//! exercised without a network.

use crate::backend::KeyValueStore;
use crate::config::RemoteConfig;
use crate::error::{StoreError, StoreResult};
use serde_json::Value;
use tracing::debug;

/// A raw HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP client abstraction.
///
/// Implement this trait to provide the actual transport.
pub trait HttpClient: Send + Sync {
    /// Sends a GET request.
    fn get(&self, url: &str) -> Result<HttpResponse, String>;

    /// Sends a PUT request with a JSON body.
    fn put(&self, url: &str, body: Vec<u8>) -> Result<HttpResponse, String>;
}

/// A [`KeyValueStore`] backed by a realtime database's REST API.
///
/// Network failures surface immediately; there is no retry.
pub struct HttpKeyValueStore<C: HttpClient> {
    config: RemoteConfig,
    client: C,
}

impl<C: HttpClient> HttpKeyValueStore<C> {
    /// Creates a store using `config` for addressing and credentials.
    pub fn new(config: &RemoteConfig, client: C) -> Self {
        Self {
            config: config.clone(),
            client,
        }
    }

    /// Base URL of the remote database.
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn check(&self, path: &str, response: HttpResponse) -> StoreResult<Vec<u8>> {
        if response.is_success() {
            Ok(response.body)
        } else {
            Err(StoreError::transport(
                self.config.document_url(path),
                format!(
                    "HTTP {}: {}",
                    response.status,
                    String::from_utf8_lossy(&response.body).trim()
                ),
            ))
        }
    }
}

impl<C: HttpClient> KeyValueStore for HttpKeyValueStore<C> {
    fn get(&self, path: &str) -> StoreResult<Option<Value>> {
        debug!(url = %self.config.document_url(path), "GET");
        let response = self
            .client
            .get(&self.config.request_url(path))
            .map_err(|e| StoreError::transport(self.config.document_url(path), e))?;
        let body = self.check(path, response)?;

        let value: Value = serde_json::from_slice(&body)?;
        Ok(if value.is_null() { None } else { Some(value) })
    }

    fn set(&self, path: &str, value: &Value) -> StoreResult<()> {
        debug!(url = %self.config.document_url(path), "PUT");
        let body = serde_json::to_vec(value)?;
        let response = self
            .client
            .put(&self.config.request_url(path), body)
            .map_err(|e| StoreError::transport(self.config.document_url(path), e))?;
        self.check(path, response)?;
        Ok(())
    }
}
