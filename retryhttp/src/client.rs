//! HTTP client with automatic retries.

use crate::backoff::BackoffPolicy;
use crate::body::ReplayableBody;
use crate::config::RetryConfig;
use crate::error::Failure;
use crate::executor;
use crate::handler::ErrorHandler;
use crate::hooks::{RequestHook, RequestModifier, ResponseHook};
use crate::metrics::Metrics;
use crate::policy::RetryPolicy;
use crate::request::Request;
use crate::response::Response;
use crate::transport::{ReqwestTransport, Transport};
use reqwest::Method;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// A retrying HTTP client.
///
/// Cheap to clone; clones share the transport and configuration, and may be
/// used from many tasks at once.
#[derive(Clone)]
pub struct Client {
    transport: Arc<dyn Transport>,
    config: RetryConfig,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl Client {
    /// Create a client with default retry settings over reqwest.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Start building a client.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// The retry configuration.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Execute a request, retrying as configured.
    pub async fn execute(&self, request: Request) -> Result<Response, Failure> {
        executor::execute(self.transport.as_ref(), &self.config, request).await
    }

    /// Send a `GET` request.
    pub async fn get(&self, url: &str) -> Result<Response, Failure> {
        self.execute(Request::new(Method::GET, url)?).await
    }

    /// Send a `HEAD` request.
    pub async fn head(&self, url: &str) -> Result<Response, Failure> {
        self.execute(Request::new(Method::HEAD, url)?).await
    }

    /// Send a `POST` request with the given content type.
    pub async fn post(
        &self,
        url: &str,
        content_type: &str,
        body: impl Into<ReplayableBody>,
    ) -> Result<Response, Failure> {
        let request = Request::new(Method::POST, url)?
            .with_content_type(content_type)?
            .with_body(body);
        self.execute(request).await
    }

    /// Send a `POST` request with form-encoded fields.
    pub async fn post_form<K, V>(&self, url: &str, fields: &[(K, V)]) -> Result<Response, Failure>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        self.post(url, FORM_CONTENT_TYPE, encode_form(fields)).await
    }
}

fn encode_form<K: AsRef<str>, V: AsRef<str>>(fields: &[(K, V)]) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(fields.iter().map(|(k, v)| (k.as_ref(), v.as_ref())))
        .finish()
}

/// Builder for [`Client`].
#[derive(Default)]
pub struct ClientBuilder {
    transport: Option<Arc<dyn Transport>>,
    config: RetryConfig,
}

impl fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("custom_transport", &self.transport.is_some())
            .field("config", &self.config)
            .finish()
    }
}

impl ClientBuilder {
    /// Use a custom transport instead of reqwest.
    #[must_use]
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Use a reqwest client for the default transport.
    #[must_use]
    pub fn reqwest_client(self, client: reqwest::Client) -> Self {
        self.transport(ReqwestTransport::with_client(client))
    }

    /// Replace the whole retry configuration.
    #[must_use]
    pub fn config(mut self, config: RetryConfig) -> Self {
        self.config = config;
        self
    }

    /// Set max retries.
    #[must_use]
    pub fn max_retries(mut self, n: u32) -> Self {
        self.config = self.config.max_retries(n);
        self
    }

    /// Set the wait bounds handed to the backoff policy.
    #[must_use]
    pub fn wait(mut self, min: Duration, max: Duration) -> Self {
        self.config = self.config.wait(min, max);
        self
    }

    /// Set the retry policy.
    #[must_use]
    pub fn retry_policy(mut self, policy: impl RetryPolicy + 'static) -> Self {
        self.config = self.config.retry_policy(policy);
        self
    }

    /// Set the backoff policy.
    #[must_use]
    pub fn backoff(mut self, backoff: impl BackoffPolicy + 'static) -> Self {
        self.config = self.config.backoff(backoff);
        self
    }

    /// Set the handler for exhausted retries.
    #[must_use]
    pub fn error_handler(mut self, handler: impl ErrorHandler + 'static) -> Self {
        self.config = self.config.error_handler(handler);
        self
    }

    /// Set the hook run before each attempt.
    #[must_use]
    pub fn request_hook(mut self, hook: impl RequestHook + 'static) -> Self {
        self.config = self.config.request_hook(hook);
        self
    }

    /// Set the hook run on each response.
    #[must_use]
    pub fn response_hook(mut self, hook: impl ResponseHook + 'static) -> Self {
        self.config = self.config.response_hook(hook);
        self
    }

    /// Set the modifier applied before the first attempt.
    #[must_use]
    pub fn request_modifier(mut self, modifier: impl RequestModifier + 'static) -> Self {
        self.config = self.config.request_modifier(modifier);
        self
    }

    /// Record call metrics.
    #[must_use]
    pub fn metrics(mut self, metrics: impl Metrics + 'static) -> Self {
        self.config = self.config.metrics(metrics);
        self
    }

    /// Log attempts and responses through `tracing`.
    #[must_use]
    pub fn logging(mut self) -> Self {
        self.config = self.config.logging();
        self
    }

    /// Build the client.
    pub fn build(self) -> Client {
        Client {
            transport: self
                .transport
                .unwrap_or_else(|| Arc::new(ReqwestTransport::new())),
            config: self.config,
        }
    }
}
