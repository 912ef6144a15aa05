//! The retry loop.
//!
//! [`execute`] runs one logical call: it replays the request body for every
//! attempt, asks the [`RetryPolicy`](crate::policy::RetryPolicy) whether to
//! try again, sleeps for the backoff computed by the
//! [`BackoffPolicy`](crate::backoff::BackoffPolicy) and hands the final state
//! to the [`ErrorHandler`](crate::handler::ErrorHandler) once the budget is
//! spent. Every suspension point (body rewind, transport call, backoff sleep)
//! races against the request's [`CallContext`](crate::request::CallContext).

use crate::config::RetryConfig;
use crate::error::{Error, Failure};
use crate::handler::Exhausted;
use crate::metrics::Metrics;
use crate::policy::AttemptResult;
use crate::request::{AttemptRequest, Request};
use crate::response::Response;
use crate::transport::Transport;
use tokio::time::Instant;
use tracing::{debug, error, Instrument};

/// Attempt bookkeeping for one call.
#[derive(Debug, Clone, Copy)]
struct RetryState {
    attempt: u32,
    max_retries: u32,
}

impl RetryState {
    fn new(max_retries: u32) -> Self {
        Self {
            attempt: 0,
            max_retries,
        }
    }

    fn is_retry(&self) -> bool {
        self.attempt > 0
    }

    fn remaining(&self) -> u32 {
        self.max_retries.saturating_sub(self.attempt)
    }

    fn attempts(&self) -> u32 {
        self.attempt.saturating_add(1)
    }
}

/// Execute `request` through `transport`, retrying as `config` dictates.
///
/// Returns exactly one outcome per call. A [`Failure`] may carry the last
/// response when a policy override or a late cancellation stopped the call
/// after a response had already arrived.
///
/// # Example
///
/// ```ignore
/// use retryhttp::{execute, ReqwestTransport, Request, RetryConfig};
/// use reqwest::Method;
///
/// let request = Request::new(Method::GET, "https://example.com/health")?;
/// let response = execute(&ReqwestTransport::new(), &RetryConfig::new(), request).await?;
/// ```
pub async fn execute(
    transport: &dyn Transport,
    config: &RetryConfig,
    request: Request,
) -> Result<Response, Failure> {
    let span = tracing::info_span!(
        "retryhttp.execute",
        method = %request.method(),
        url = %request.url(),
    );

    async move {
        let started = Instant::now();
        if let Some(metrics) = &config.metrics {
            metrics.call_started();
        }

        let result = run(transport, config, request).await;

        if let Some(metrics) = &config.metrics {
            match result {
                Ok(_) => metrics.call_succeeded(),
                Err(_) => metrics.call_failed(),
            }
            metrics.observe_call(started.elapsed());
        }
        result
    }
    .instrument(span)
    .await
}

async fn run(
    transport: &dyn Transport,
    config: &RetryConfig,
    request: Request,
) -> Result<Response, Failure> {
    let request = match &config.request_modifier {
        Some(modifier) => modifier.modify(request),
        None => request,
    };
    let ctx = request.context().clone();
    let mut state = RetryState::new(config.max_retries);

    loop {
        let attempt_started = Instant::now();
        if state.is_retry() {
            record(config, |m| m.retry_started());
        }

        let rewound = tokio::select! {
            biased;
            err = ctx.done() => Err(err),
            body = request.rewind() => body.map_err(Error::Payload),
        };
        let body = match rewound {
            Ok(body) => body,
            Err(err) => {
                if state.is_retry() {
                    record(config, |m| m.retry_failed());
                }
                return Err(Failure::new(err));
            }
        };

        let outgoing = AttemptRequest {
            request: &request,
            body,
            attempt: state.attempt,
        };
        if let Some(hook) = &config.request_hook {
            hook.before_attempt(&outgoing, state.attempt);
        }

        let outcome: AttemptResult = tokio::select! {
            biased;
            err = ctx.done() => Err(err),
            result = transport.execute(outgoing) => result,
        };

        let decision = config.retry_policy.decide(&ctx, &outcome);
        if state.is_retry() {
            record(config, |m| m.observe_retry(attempt_started.elapsed()));
        }

        match &outcome {
            Ok(response) => {
                if let Some(hook) = &config.response_hook {
                    hook.after_response(response);
                }
            }
            Err(err) => {
                if state.is_retry() {
                    record(config, |m| m.retry_failed());
                }
                if err.is_cancellation() {
                    debug!(attempt = state.attempt, error = %err, "Request cancelled");
                } else {
                    error!(
                        method = %request.method(),
                        url = %request.url(),
                        attempt = state.attempt,
                        error = %err,
                        "Request failed"
                    );
                }
            }
        }

        if !decision.retry {
            return match (outcome, decision.error) {
                (Ok(response), None) => Ok(response),
                (Ok(response), Some(err)) => Err(Failure::new(err).with_response(response)),
                (Err(err), None) => Err(Failure::new(err)),
                (Err(_), Some(err)) => Err(Failure::new(err)),
            };
        }

        let remaining = state.remaining();
        if remaining == 0 {
            let (response, error) = match outcome {
                Ok(response) => (Some(response), None),
                Err(err) => (None, Some(err)),
            };
            return config.error_handler.handle(Exhausted {
                method: request.method().clone(),
                url: request.url().clone(),
                attempts: state.attempts(),
                response,
                error,
            });
        }

        let mut response = outcome.ok();
        if let Some(response) = response.as_mut() {
            if let Err(e) = response.drain_body().await {
                error!(error = %e, "Error reading response body");
            }
        }

        let wait = config.backoff.backoff(
            config.min_wait,
            config.max_wait,
            state.attempt,
            response.as_ref(),
        );
        debug!(
            method = %request.method(),
            url = %request.url(),
            remaining,
            desc = %describe(&request, response.as_ref()),
            wait_ms = wait.as_millis() as u64,
            "Retrying http request"
        );
        drop(response);

        if let Some(err) = ctx.err() {
            return Err(Failure::new(err));
        }
        tokio::select! {
            biased;
            err = ctx.done() => return Err(Failure::new(err)),
            _ = tokio::time::sleep(wait) => {}
        }

        state.attempt += 1;
    }
}

fn record(config: &RetryConfig, f: impl FnOnce(&dyn Metrics)) {
    if let Some(metrics) = &config.metrics {
        f(metrics.as_ref());
    }
}

/// `"METHOD URL"`, with `" (status: N)"` appended when a response exists.
fn describe(request: &Request, response: Option<&Response>) -> String {
    match response {
        Some(response) => format!(
            "{} {} (status: {})",
            request.method(),
            request.url(),
            response.status()
        ),
        None => format!("{} {}", request.method(), request.url()),
    }
}
