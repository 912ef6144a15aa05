//! # retryhttp
//!
//! HTTP requests with automatic retries and exponential backoff.
//!
//! A call is retried on connection errors and on server errors (`5xx` except
//! `501`, plus the invalid status `0`). Request bodies are replayable: every
//! attempt sends the same bytes, whether the payload came from a buffer, a
//! seekable reader, a one-shot stream or a factory.
//!
//! ## Core Concepts
//!
//! - **[`Client`]**: Retrying HTTP client over a pluggable [`Transport`]
//! - **[`RetryPolicy`]**: Decides whether an attempt is retried
//! - **[`BackoffPolicy`]**: Decides how long to wait before the next attempt
//! - **[`ErrorHandler`]**: Decides the outcome once retries run out
//! - **[`ReplayableBody`]**: Request payload that can be re-read per attempt
//! - **[`CallContext`]**: Cancellation token and deadline of a call
//!
//! ## Backoff Policies
//!
//! - [`ExponentialBackoff`]: `min * 2^attempt`, capped at `max` (default)
//! - [`LinearJitterBackoff`]: random wait in `[min, max)` scaled by attempt
//! - [`RetryAfterBackoff`]: honors `Retry-After` on `429` and `503`
//!
//! ## Example
//!
//! ```ignore
//! use retryhttp::{Client, LinearJitterBackoff};
//! use std::time::Duration;
//!
//! let client = Client::builder()
//!     .max_retries(3)
//!     .wait(Duration::from_millis(100), Duration::from_secs(5))
//!     .backoff(LinearJitterBackoff::new())
//!     .logging()
//!     .build();
//!
//! let response = client.get("https://api.example.com/data").await?;
//! ```
//!
//! ## Cancellation
//!
//! ```ignore
//! use retryhttp::{CallContext, CancellationToken, Client, Method, Request};
//!
//! let token = CancellationToken::new();
//! let request = Request::new(Method::GET, "https://api.example.com/slow")?
//!     .with_context(CallContext::new().with_token(token.clone()));
//!
//! // token.cancel() from another task ends the call with Error::Cancelled
//! let result = Client::new().execute(request).await;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod backoff;
pub mod body;
pub mod client;
pub mod config;
pub mod error;
pub mod executor;
pub mod handler;
pub mod hooks;
pub mod metrics;
pub mod policy;
pub mod request;
pub mod response;
pub mod transport;

#[cfg(test)]
mod testing;

// Re-exports
pub use backoff::{BackoffPolicy, ExponentialBackoff, LinearJitterBackoff, RetryAfterBackoff};
pub use body::{BodyStream, ReplayableBody};
pub use client::{Client, ClientBuilder};
pub use config::{
    BackoffKind, RetryConfig, RetrySettings, DEFAULT_MAX_RETRIES, DEFAULT_MAX_WAIT,
    DEFAULT_MIN_WAIT,
};
pub use error::{Error, Failure, Result, TransportErrorKind};
pub use executor::execute;
pub use handler::{ErrorHandler, Exhausted, GiveUpHandler, PassthroughHandler};
pub use hooks::{LoggingHooks, RequestHook, RequestModifier, ResponseHook};
pub use metrics::{AtomicMetrics, Metrics, MetricsSnapshot, NoopMetrics};
pub use policy::{is_retryable_status, AttemptResult, Decision, DefaultRetryPolicy, NeverRetry, RetryPolicy};
pub use request::{AttemptRequest, CallContext, Request};
pub use response::{Response, ResponseBody};
pub use transport::{ReqwestTransport, Transport};

pub use reqwest::Method;
pub use tokio_util::sync::CancellationToken;

/// Prelude for common imports.
pub mod prelude {
    pub use crate::{
        BackoffPolicy, CallContext, Client, Decision, Error, ErrorHandler, Failure, Method,
        ReplayableBody, Request, Response, RetryConfig, RetryPolicy,
    };
}
