//! Request types.

use crate::body::{BodyStream, ReplayableBody};
use crate::error::{Error, Result};
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Method;
use std::any::Any;
use std::io;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Cancellation and deadline state of a call.
///
/// Cloning shares the cancellation token.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl CallContext {
    /// A context that is never cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `token` as the cancellation signal.
    #[must_use]
    pub fn with_token(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    /// Fail the call once `deadline` is reached.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Fail the call once `timeout` has elapsed from now.
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// The cancellation token.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// The deadline, if one was set.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// The cancellation error if the context is already done.
    ///
    /// Explicit cancellation wins over an elapsed deadline.
    pub fn err(&self) -> Option<Error> {
        if self.token.is_cancelled() {
            Some(Error::Cancelled)
        } else if self.deadline.is_some_and(|d| d <= Instant::now()) {
            Some(Error::DeadlineExceeded)
        } else {
            None
        }
    }

    /// Whether the context is already done.
    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// Resolve once the context is cancelled or its deadline passes.
    pub async fn done(&self) -> Error {
        match self.deadline {
            Some(deadline) => tokio::select! {
                biased;
                _ = self.token.cancelled() => Error::Cancelled,
                _ = tokio::time::sleep_until(deadline) => Error::DeadlineExceeded,
            },
            None => {
                self.token.cancelled().await;
                Error::Cancelled
            }
        }
    }
}

/// A logical HTTP request.
///
/// A request is consumed by a single call. Its method, URL and headers stay
/// fixed for all attempts; only the body stream is rebuilt per attempt.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Option<ReplayableBody>,
    context: CallContext,
}

impl Request {
    /// Create a request without a body.
    pub fn new(method: Method, url: &str) -> Result<Self> {
        Ok(Self::from_url(method, Url::parse(url)?))
    }

    /// Create a request from an already parsed URL.
    pub fn from_url(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
            context: CallContext::default(),
        }
    }

    /// Create a request from an arbitrary payload value.
    ///
    /// See [`ReplayableBody::classify`] for the accepted payload types.
    pub fn with_payload<T>(method: Method, url: &str, payload: T) -> Result<Self>
    where
        T: Any + Send,
    {
        let body = ReplayableBody::classify(payload)?;
        Ok(Self::new(method, url)?.with_body(body))
    }

    /// Set the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<ReplayableBody>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Add a header, replacing any previous value.
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Set the `Content-Type` header.
    pub fn with_content_type(self, content_type: &str) -> Result<Self> {
        let value = HeaderValue::from_str(content_type)
            .map_err(|e| Error::InvalidRequest(format!("content type {content_type:?}: {e}")))?;
        Ok(self.with_header(CONTENT_TYPE, value))
    }

    /// Rebind the cancellation context.
    ///
    /// Only meaningful before the request is executed.
    #[must_use]
    pub fn with_context(mut self, context: CallContext) -> Self {
        self.context = context;
        self
    }

    /// Method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Mutable headers.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// The replayable body, if any.
    pub fn body(&self) -> Option<&ReplayableBody> {
        self.body.as_ref()
    }

    /// The cancellation context.
    pub fn context(&self) -> &CallContext {
        &self.context
    }

    /// Content length of the body, when known.
    pub fn content_length(&self) -> Option<u64> {
        self.body.as_ref().and_then(ReplayableBody::content_length)
    }

    /// A copy of the body content. The body stays replayable.
    ///
    /// Do not call this while the request is being executed if the body
    /// is backed by a seekable source.
    pub async fn body_bytes(&self) -> io::Result<Option<Bytes>> {
        match self.body {
            Some(ref body) => body.bytes().await.map(Some),
            None => Ok(None),
        }
    }

    pub(crate) async fn rewind(&self) -> io::Result<Option<BodyStream>> {
        match self.body {
            Some(ref body) => body.obtain().await.map(Some),
            None => Ok(None),
        }
    }
}

/// The request as seen by the transport for one attempt.
#[derive(Debug)]
pub struct AttemptRequest<'a> {
    /// The logical request.
    pub request: &'a Request,
    /// Fresh body stream for this attempt.
    pub body: Option<BodyStream>,
    /// Attempt index; `0` is the initial attempt.
    pub attempt: u32,
}

impl AttemptRequest<'_> {
    /// Method.
    pub fn method(&self) -> &Method {
        self.request.method()
    }

    /// URL.
    pub fn url(&self) -> &Url {
        self.request.url()
    }

    /// Headers.
    pub fn headers(&self) -> &HeaderMap {
        self.request.headers()
    }

    /// Content length of this attempt's body, when known.
    pub fn content_length(&self) -> Option<u64> {
        self.body.as_ref().and_then(BodyStream::content_length)
    }
}
