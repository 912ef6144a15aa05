//! Handling of exhausted retry budgets.

use crate::error::{Error, Failure};
use crate::response::Response;
use reqwest::Method;
use url::Url;

/// State handed to an [`ErrorHandler`] once the retry budget is spent.
#[derive(Debug)]
pub struct Exhausted {
    /// Method of the request.
    pub method: Method,
    /// URL of the request.
    pub url: Url,
    /// Total number of attempts made, initial attempt included.
    pub attempts: u32,
    /// Response of the last attempt, body not yet drained.
    pub response: Option<Response>,
    /// Error of the last attempt.
    pub error: Option<Error>,
}

/// Decides the final outcome of a call that ran out of retries.
///
/// Called at most once per call, after the last attempt was still judged
/// retryable. Implementations own the last response and must close it if
/// they do not return it.
pub trait ErrorHandler: Send + Sync {
    /// Produce the final outcome.
    fn handle(&self, exhausted: Exhausted) -> Result<Response, Failure>;
}

impl<F> ErrorHandler for F
where
    F: Fn(Exhausted) -> Result<Response, Failure> + Send + Sync,
{
    fn handle(&self, exhausted: Exhausted) -> Result<Response, Failure> {
        self(exhausted)
    }
}

/// Closes the last response and reports [`Error::GivingUp`].
#[derive(Debug, Clone, Copy, Default)]
pub struct GiveUpHandler;

impl ErrorHandler for GiveUpHandler {
    fn handle(&self, exhausted: Exhausted) -> Result<Response, Failure> {
        if let Some(response) = exhausted.response {
            response.close();
        }
        Err(Failure::new(Error::GivingUp {
            method: exhausted.method,
            url: exhausted.url,
            attempts: exhausted.attempts,
        }))
    }
}

/// Returns the last response or error unchanged.
///
/// The response body is left open; closing it is up to the caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughHandler;

impl ErrorHandler for PassthroughHandler {
    fn handle(&self, exhausted: Exhausted) -> Result<Response, Failure> {
        match (exhausted.response, exhausted.error) {
            (response, Some(error)) => {
                let failure = Failure::new(error);
                Err(match response {
                    Some(response) => failure.with_response(response),
                    None => failure,
                })
            }
            (Some(response), None) => Ok(response),
            (None, None) => Err(Failure::new(Error::GivingUp {
                method: exhausted.method,
                url: exhausted.url,
                attempts: exhausted.attempts,
            })),
        }
    }
}
