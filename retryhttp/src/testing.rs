//! Scripted transport for exercising the retry loop in tests.

use crate::error::{Error, Result, TransportErrorKind};
use crate::request::AttemptRequest;
use crate::response::{Response, ResponseBody};
use crate::transport::Transport;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use parking_lot::Mutex;
use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

/// What the transport does on one attempt.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Step {
    Status(u16),
    RetryAfter(u16, u64),
    Fail(TransportErrorKind),
    Hang,
}

/// Plays back a list of steps; the last step repeats forever.
#[derive(Debug)]
pub(crate) struct ScriptedTransport {
    steps: Vec<Step>,
    calls: AtomicUsize,
    bodies: Mutex<Vec<Option<Bytes>>>,
    closed: Arc<AtomicUsize>,
}

impl ScriptedTransport {
    pub(crate) fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        let steps: Vec<Step> = steps.into_iter().collect();
        assert!(!steps.is_empty(), "script needs at least one step");
        Self {
            steps,
            calls: AtomicUsize::new(0),
            bodies: Mutex::new(Vec::new()),
            closed: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of attempts that reached the transport.
    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Request bodies received, one entry per attempt.
    pub(crate) fn bodies(&self) -> Vec<Option<Bytes>> {
        self.bodies.lock().clone()
    }

    /// Number of response bodies that have been dropped.
    pub(crate) fn closed_bodies(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    fn response(&self, status: u16) -> Response {
        Response::new(status).with_body(ResponseBody::from_stream(TrackedBody {
            data: Some(Bytes::from(format!("status {status}"))),
            closed: Arc::clone(&self.closed),
        }))
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn execute(&self, request: AttemptRequest<'_>) -> Result<Response> {
        let index = self.calls.fetch_add(1, Ordering::SeqCst);
        let body = match request.body {
            Some(body) => Some(body.bytes().await.map_err(Error::Payload)?),
            None => None,
        };
        self.bodies.lock().push(body);

        let step = self.steps[index.min(self.steps.len() - 1)];
        match step {
            Step::Status(status) => Ok(self.response(status)),
            Step::RetryAfter(status, secs) => {
                let mut headers = HeaderMap::new();
                headers.insert(RETRY_AFTER, HeaderValue::from(secs));
                Ok(self.response(status).with_headers(headers))
            }
            Step::Fail(kind) => Err(Error::transport(kind, "scripted failure")),
            Step::Hang => futures::future::pending().await,
        }
    }
}

/// Single-chunk body that counts how many times it was dropped.
struct TrackedBody {
    data: Option<Bytes>,
    closed: Arc<AtomicUsize>,
}

impl Stream for TrackedBody {
    type Item = std::io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Poll::Ready(self.data.take().map(Ok))
    }
}

impl Drop for TrackedBody {
    fn drop(&mut self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}
