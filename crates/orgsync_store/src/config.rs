//! Remote store connection settings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Connection settings for the realtime store.
///
/// Built once at process start and passed by reference to every adapter
/// that talks to the remote store.
#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RemoteConfig {
    /// Base URL of the database, e.g. `https://org-chart.example.firebaseio.com`.
    pub base_url: String,
    /// Optional access token, sent as the `auth` query parameter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    /// Optional request timeout in seconds. No timeout when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl RemoteConfig {
    /// Creates a configuration for the given base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            auth_token: None,
            timeout_secs: None,
        }
    }

    /// Sets the access token.
    #[must_use]
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = Some(timeout.as_secs());
        self
    }

    /// The request timeout, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// URL of the JSON document at `path`, without credentials.
    pub fn document_url(&self, path: &str) -> String {
        format!("{}/{}.json", self.base_url.trim_end_matches('/'), path)
    }

    /// URL of the JSON document at `path`, with credentials.
    pub fn request_url(&self, path: &str) -> String {
        let url = self.document_url(path);
        match &self.auth_token {
            Some(token) => format!("{url}?auth={token}"),
            None => url,
        }
    }
}

impl fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("base_url", &self.base_url)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<redacted>"))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}
