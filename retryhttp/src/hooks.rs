//! Side-effect hooks run around each attempt.
//!
//! Hooks observe; they never change the control flow of a call.

use crate::request::{AttemptRequest, Request};
use crate::response::Response;
use tracing::{debug, info};

/// Runs before every attempt, including the first.
pub trait RequestHook: Send + Sync {
    /// Observe the outgoing request. `attempt` is `0` for the initial attempt.
    fn before_attempt(&self, request: &AttemptRequest<'_>, attempt: u32);
}

impl<F> RequestHook for F
where
    F: Fn(&AttemptRequest<'_>, u32) + Send + Sync,
{
    fn before_attempt(&self, request: &AttemptRequest<'_>, attempt: u32) {
        self(request, attempt)
    }
}

/// Runs on every response received, whether or not it is retried.
///
/// Reading or closing the body here affects the response returned to the
/// caller.
pub trait ResponseHook: Send + Sync {
    /// Observe a response.
    fn after_response(&self, response: &Response);
}

impl<F> ResponseHook for F
where
    F: Fn(&Response) + Send + Sync,
{
    fn after_response(&self, response: &Response) {
        self(response)
    }
}

/// Rewrites a request once, before its first attempt.
pub trait RequestModifier: Send + Sync {
    /// Return the request to execute.
    fn modify(&self, request: Request) -> Request;
}

impl<F> RequestModifier for F
where
    F: Fn(Request) -> Request + Send + Sync,
{
    fn modify(&self, request: Request) -> Request {
        self(request)
    }
}

/// Hooks that emit a `tracing` event per attempt and per response.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingHooks;

impl RequestHook for LoggingHooks {
    fn before_attempt(&self, request: &AttemptRequest<'_>, attempt: u32) {
        if attempt == 0 {
            debug!(
                method = %request.method(),
                url = %request.url(),
                content_length = ?request.content_length(),
                "Sending request"
            );
        } else {
            info!(
                method = %request.method(),
                url = %request.url(),
                attempt,
                "Retrying request"
            );
        }
    }
}

impl ResponseHook for LoggingHooks {
    fn after_response(&self, response: &Response) {
        debug!(status = response.status(), "Received response");
    }
}
