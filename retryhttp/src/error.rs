//! Error types for retryhttp.
//!
//! [`Error`] is the taxonomy of everything that can go wrong during a call.
//! [`Failure`] is what [`Client::execute`](crate::Client::execute) returns on
//! the error path: the error plus, in a few documented cases, the last
//! response that was received before the call ended.

use crate::response::Response;
use reqwest::Method;
use std::fmt;
use std::io;
use thiserror::Error;
use url::Url;

/// Errors produced while executing a request.
#[derive(Debug, Error)]
pub enum Error {
    /// The request body could not be materialized or replayed.
    #[error("request body could not be replayed: {0}")]
    Payload(#[source] io::Error),

    /// The payload given to the request could not be classified.
    #[error("cannot handle payload of type {type_name}")]
    UnsupportedPayloadType {
        /// Name of the rejected type.
        type_name: &'static str,
    },

    /// The request could not be built (bad URL, bad header).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Connection level failure reported by the transport.
    #[error("{kind} error: {message}")]
    Transport {
        /// Classification of the failure.
        kind: TransportErrorKind,
        /// Human readable description.
        message: String,
        /// Underlying error, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The call was cancelled through its cancellation token.
    #[error("request cancelled")]
    Cancelled,

    /// The deadline attached to the call elapsed.
    #[error("request deadline exceeded")]
    DeadlineExceeded,

    /// The retry budget was exhausted.
    #[error("{method} {url} giving up after {attempts} attempt(s)")]
    GivingUp {
        /// Method of the request.
        method: Method,
        /// URL of the request.
        url: Url,
        /// Total number of attempts made.
        attempts: u32,
    },
}

/// Classification of transport failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportErrorKind {
    /// DNS resolution, dial or TLS handshake failure.
    Connect,
    /// The transport timed out.
    Timeout,
    /// The request could not be written.
    Request,
    /// Reading the response body failed.
    Body,
    /// Anything else.
    Other,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connect => "connect",
            Self::Timeout => "timeout",
            Self::Request => "request",
            Self::Body => "body",
            Self::Other => "transport",
        };
        f.write_str(name)
    }
}

impl Error {
    /// Create a transport error without an underlying source.
    pub fn transport(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self::Transport {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Create a connection error.
    pub fn connect(message: impl Into<String>) -> Self {
        Self::transport(TransportErrorKind::Connect, message)
    }

    /// Create a payload error from anything convertible into an I/O error.
    pub fn payload(err: impl Into<io::Error>) -> Self {
        Self::Payload(err.into())
    }

    /// Whether this error is a transport failure.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    /// Whether this error reflects cancellation or deadline expiry.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled | Self::DeadlineExceeded)
    }

    /// Whether this error was synthesized after exhausting retries.
    pub fn is_giving_up(&self) -> bool {
        matches!(self, Self::GivingUp { .. })
    }

    /// The transport failure kind, if this is a transport error.
    pub fn transport_kind(&self) -> Option<TransportErrorKind> {
        match self {
            Self::Transport { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            TransportErrorKind::Timeout
        } else if err.is_connect() {
            TransportErrorKind::Connect
        } else if err.is_body() || err.is_decode() {
            TransportErrorKind::Body
        } else if err.is_request() {
            TransportErrorKind::Request
        } else {
            TransportErrorKind::Other
        };
        Self::Transport {
            kind,
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidRequest(err.to_string())
    }
}

/// Result type for operations that only fail with an [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Terminal failure of a call.
///
/// `response` is set when the call ended with a response still in hand: a
/// retry policy override on a received response, cancellation observed after
/// a response arrived, or a custom error handler that returns both. The body
/// of such a response has not been drained and belongs to the caller.
#[derive(Debug)]
pub struct Failure {
    error: Error,
    response: Option<Response>,
}

impl Failure {
    /// Create a failure without a response.
    pub fn new(error: Error) -> Self {
        Self {
            error,
            response: None,
        }
    }

    /// Attach the response that was current when the call ended.
    #[must_use]
    pub fn with_response(mut self, response: Response) -> Self {
        self.response = Some(response);
        self
    }

    /// The error.
    pub fn error(&self) -> &Error {
        &self.error
    }

    /// The response kept alongside the error, if any.
    pub fn response(&self) -> Option<&Response> {
        self.response.as_ref()
    }

    /// Split into the error and the optional response.
    pub fn into_parts(self) -> (Error, Option<Response>) {
        (self.error, self.response)
    }

    /// Discard the response and keep only the error.
    pub fn into_error(self) -> Error {
        self.error
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;
        if let Some(ref response) = self.response {
            write!(f, " (last status: {})", response.status())?;
        }
        Ok(())
    }
}

impl std::error::Error for Failure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl From<Error> for Failure {
    fn from(error: Error) -> Self {
        Self::new(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_giving_up_message() {
        let err = Error::GivingUp {
            method: Method::POST,
            url: Url::parse("http://localhost/upload").unwrap(),
            attempts: 3,
        };
        assert_eq!(
            err.to_string(),
            "POST http://localhost/upload giving up after 3 attempt(s)"
        );
        assert!(err.is_giving_up());
    }

    #[test]
    fn test_transport_helpers() {
        let err = Error::connect("connection refused");
        assert!(err.is_transport());
        assert_eq!(err.transport_kind(), Some(TransportErrorKind::Connect));
        assert_eq!(err.to_string(), "connect error: connection refused");
        assert!(!Error::Cancelled.is_transport());
    }

    #[test]
    fn test_cancellation_kinds() {
        assert!(Error::Cancelled.is_cancellation());
        assert!(Error::DeadlineExceeded.is_cancellation());
        assert!(!Error::connect("x").is_cancellation());
    }

    #[test]
    fn test_failure_display_with_response() {
        let failure = Failure::new(Error::Cancelled).with_response(Response::new(503));
        assert_eq!(failure.to_string(), "request cancelled (last status: 503)");
        assert_eq!(failure.response().map(Response::status), Some(503));

        let (error, response) = failure.into_parts();
        assert!(matches!(error, Error::Cancelled));
        assert!(response.is_some());
    }

    #[test]
    fn test_failure_source() {
        use std::error::Error as _;

        let failure = Failure::from(Error::DeadlineExceeded);
        assert!(failure.source().is_some());
        assert!(failure.response().is_none());
    }
}
