//! HTTP client used for the negotiate request.

use crate::{config::Headers, error::SignalRClientError};
use async_trait::async_trait;
use tracing::*;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status_code: u16,
    pub body: Vec<u8>,
}

#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Sends a POST request with an empty body.
    ///
    /// Non-success status codes are not errors, they are reported in the response.
    async fn post(&self, url: &Url, headers: &Headers) -> Result<HttpResponse, SignalRClientError>;
}

/// [`HttpClient`] backed by [`reqwest`].
#[derive(Debug, Clone, Default)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    pub fn new(client: reqwest::Client) -> Self {
        ReqwestHttpClient { client }
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn post(&self, url: &Url, headers: &Headers) -> Result<HttpResponse, SignalRClientError> {
        let mut request = self
            .client
            .post(url.as_str())
            .header("Accept", "application/json");

        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send().await?;
        let status_code = response.status().as_u16();
        let body = response.bytes().await?.to_vec();

        event!(Level::TRACE, status_code, length = body.len(), "negotiate response received");

        Ok(HttpResponse { status_code, body })
    }
}
