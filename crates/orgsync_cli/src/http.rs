//! Blocking HTTP client for the remote store.

use orgsync_store::{HttpClient, HttpResponse, RemoteConfig};
use reqwest::blocking::{Client, Response};
use reqwest::header::CONTENT_TYPE;

/// [`HttpClient`] backed by `reqwest`'s blocking client.
pub struct ReqwestClient {
    client: Client,
}

impl ReqwestClient {
    /// Builds a client honoring the configured timeout.
    ///
    /// Without a configured timeout, requests never time out.
    pub fn new(config: &RemoteConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(config.timeout()).build()?;
        Ok(Self { client })
    }
}

fn into_response(response: Response) -> Result<HttpResponse, String> {
    let status = response.status().as_u16();
    let body = response.bytes().map_err(|e| e.to_string())?.to_vec();
    Ok(HttpResponse { status, body })
}

impl HttpClient for ReqwestClient {
    fn get(&self, url: &str) -> Result<HttpResponse, String> {
        let response = self.client.get(url).send().map_err(|e| e.without_url().to_string())?;
        into_response(response)
    }

    fn put(&self, url: &str, body: Vec<u8>) -> Result<HttpResponse, String> {
        let response = self
            .client
            .put(url)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .map_err(|e| e.without_url().to_string())?;
        into_response(response)
    }
}
