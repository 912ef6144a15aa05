//! Transports: perform a single HTTP exchange.

use crate::error::{Error, Result};
use crate::request::AttemptRequest;
use crate::response::Response;
use async_trait::async_trait;
use reqwest::header::{HeaderValue, CONTENT_LENGTH};
use reqwest::Client;
use std::time::Duration;

/// Performs one HTTP exchange.
///
/// A transport returns either a response, whatever its status, or an error
/// when no response could be obtained (DNS, dial, TLS, timeout).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send the request and wait for the response head.
    async fn execute(&self, request: AttemptRequest<'_>) -> Result<Response>;
}

/// Transport backed by a [`reqwest::Client`].
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Create a transport with a default reqwest client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a transport with a custom reqwest client.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Create a transport whose client applies a per-attempt timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    /// The underlying client.
    pub fn client(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: AttemptRequest<'_>) -> Result<Response> {
        let mut builder = self
            .client
            .request(request.method().clone(), request.url().clone())
            .headers(request.headers().clone());

        if let Some(len) = request.content_length() {
            builder = builder.header(CONTENT_LENGTH, HeaderValue::from(len));
        }
        if let Some(body) = request.body {
            builder = builder.body(body.into_reqwest());
        }

        let response = builder.send().await.map_err(Error::from)?;
        Ok(Response::from(response))
    }
}
