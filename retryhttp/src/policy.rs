//! Retry policies: decide whether an attempt should be retried.

use crate::error::Error;
use crate::request::CallContext;
use crate::response::Response;

/// Outcome of a single attempt as seen by the policy.
pub type AttemptResult = Result<Response, Error>;

/// Verdict of a [`RetryPolicy`].
#[derive(Debug, Default)]
pub struct Decision {
    /// Whether to try again.
    pub retry: bool,
    /// Error returned instead of the attempt's own error when not retrying.
    pub error: Option<Error>,
}

impl Decision {
    /// Try again.
    pub fn retry() -> Self {
        Self {
            retry: true,
            error: None,
        }
    }

    /// Stop and return the attempt's outcome as-is.
    pub fn stop() -> Self {
        Self::default()
    }

    /// Stop and return `error` in place of the attempt's error.
    pub fn stop_with(error: Error) -> Self {
        Self {
            retry: false,
            error: Some(error),
        }
    }
}

/// Decides whether an attempt is retried.
///
/// The client closes the response body whenever it retries. When a custom
/// policy declines to retry, the response is handed to the caller untouched,
/// so a policy that reads the body must leave it in a usable state.
pub trait RetryPolicy: Send + Sync {
    /// Inspect the outcome of an attempt.
    fn decide(&self, ctx: &CallContext, outcome: &AttemptResult) -> Decision;
}

impl<F> RetryPolicy for F
where
    F: Fn(&CallContext, &AttemptResult) -> Decision + Send + Sync,
{
    fn decide(&self, ctx: &CallContext, outcome: &AttemptResult) -> Decision {
        self(ctx, outcome)
    }
}

/// Retries connection errors and server errors.
///
/// In priority order:
///
/// 1. a cancelled or expired context stops, surfacing the cancellation;
/// 2. a transport error is retried;
/// 3. status `0` and any `5xx` status other than `501` are retried;
/// 4. everything else stops.
///
/// `501 Not Implemented` is a permanent refusal, not an outage.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultRetryPolicy;

impl DefaultRetryPolicy {
    /// Create the default policy.
    pub fn new() -> Self {
        Self
    }
}

impl RetryPolicy for DefaultRetryPolicy {
    fn decide(&self, ctx: &CallContext, outcome: &AttemptResult) -> Decision {
        if let Some(err) = ctx.err() {
            return Decision::stop_with(err);
        }

        match outcome {
            Err(_) => Decision::retry(),
            Ok(response) if is_retryable_status(response.status()) => Decision::retry(),
            Ok(_) => Decision::stop(),
        }
    }
}

/// Whether the default policy retries a response with `status`.
pub fn is_retryable_status(status: u16) -> bool {
    status == 0 || ((500..600).contains(&status) && status != 501)
}

/// Never retries.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverRetry;

impl NeverRetry {
    /// Create a policy that never retries.
    pub fn new() -> Self {
        Self
    }
}

impl RetryPolicy for NeverRetry {
    fn decide(&self, ctx: &CallContext, _outcome: &AttemptResult) -> Decision {
        match ctx.err() {
            Some(err) => Decision::stop_with(err),
            None => Decision::stop(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tokio_util::sync::CancellationToken;

    #[rstest]
    #[case(200)]
    #[case(204)]
    #[case(302)]
    #[case(404)]
    #[case(429)]
    #[case(501)]
    #[case(600)]
    #[case(999)]
    fn test_default_policy_stops(#[case] status: u16) {
        let decision = DefaultRetryPolicy.decide(&CallContext::new(), &Ok(Response::new(status)));
        assert!(!decision.retry);
        assert!(decision.error.is_none());
    }

    #[rstest]
    #[case(0)]
    #[case(500)]
    #[case(502)]
    #[case(503)]
    #[case(504)]
    #[case(599)]
    fn test_default_policy_retries(#[case] status: u16) {
        let decision = DefaultRetryPolicy.decide(&CallContext::new(), &Ok(Response::new(status)));
        assert!(decision.retry);
    }

    #[test]
    fn test_default_policy_retries_transport_errors() {
        let decision =
            DefaultRetryPolicy.decide(&CallContext::new(), &Err(Error::connect("refused")));
        assert!(decision.retry);
        assert!(decision.error.is_none());
    }

    #[test]
    fn test_cancellation_overrides_transport_error() {
        let token = CancellationToken::new();
        token.cancel();
        let ctx = CallContext::new().with_token(token);

        let decision = DefaultRetryPolicy.decide(&ctx, &Err(Error::connect("refused")));
        assert!(!decision.retry);
        assert!(matches!(decision.error, Some(Error::Cancelled)));

        let decision = DefaultRetryPolicy.decide(&ctx, &Ok(Response::new(503)));
        assert!(!decision.retry);
        assert!(matches!(decision.error, Some(Error::Cancelled)));
    }

    #[test]
    fn test_never_retry() {
        let decision = NeverRetry.decide(&CallContext::new(), &Ok(Response::new(503)));
        assert!(!decision.retry);
        let decision = NeverRetry.decide(&CallContext::new(), &Err(Error::connect("refused")));
        assert!(!decision.retry);
    }

    #[test]
    fn test_closure_policy() {
        let policy = |_: &CallContext, outcome: &AttemptResult| match outcome {
            Ok(r) if r.status() == 429 => Decision::retry(),
            _ => Decision::stop(),
        };
        assert!(policy.decide(&CallContext::new(), &Ok(Response::new(429))).retry);
        assert!(!policy.decide(&CallContext::new(), &Ok(Response::new(500))).retry);
    }
}
