//! Responses returned by a transport.

use crate::body::ByteStream;
use bytes::{Bytes, BytesMut};
use futures::stream::{self, BoxStream, Stream, StreamExt};
use reqwest::header::HeaderMap;
use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Number of bytes read from a response body before it is dropped on retry.
pub const DRAIN_READ_LIMIT: usize = 4096;

/// Streaming response body.
///
/// Dropping the body closes it.
pub struct ResponseBody {
    inner: ByteStream,
}

impl ResponseBody {
    /// An empty body.
    pub fn empty() -> Self {
        Self::from_stream(stream::empty())
    }

    /// A body backed by a stream of chunks.
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = io::Result<Bytes>> + Send + Sync + 'static,
    {
        Self {
            inner: Box::pin(stream),
        }
    }

    /// Read the whole body into memory.
    pub async fn bytes(mut self) -> io::Result<Bytes> {
        let mut buf = BytesMut::new();
        while let Some(chunk) = self.inner.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(buf.freeze())
    }

    /// Read and discard at most `limit` bytes, then close the body.
    ///
    /// Returns the number of bytes that were read.
    pub async fn drain(mut self, limit: usize) -> io::Result<usize> {
        let mut read = 0;
        while read < limit {
            match self.inner.next().await {
                Some(chunk) => read += chunk?.len(),
                None => break,
            }
        }
        Ok(read.min(limit))
    }

    /// Close the body without reading it.
    pub fn close(self) {}

    /// Convert into a boxed stream of chunks.
    pub fn into_stream(self) -> BoxStream<'static, io::Result<Bytes>> {
        self.inner.boxed()
    }
}

impl Stream for ResponseBody {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseBody").finish_non_exhaustive()
    }
}

impl From<Bytes> for ResponseBody {
    fn from(bytes: Bytes) -> Self {
        Self::from_stream(stream::iter(std::iter::once(Ok(bytes))))
    }
}

impl From<&'static str> for ResponseBody {
    fn from(s: &'static str) -> Self {
        Bytes::from_static(s.as_bytes()).into()
    }
}

impl From<String> for ResponseBody {
    fn from(s: String) -> Self {
        Bytes::from(s).into()
    }
}

/// An HTTP response.
///
/// The status is kept as a raw code so that transports reporting `0` or a
/// code outside the registered range can still be represented.
#[derive(Debug)]
pub struct Response {
    status: u16,
    headers: HeaderMap,
    body: ResponseBody,
}

impl Response {
    /// Create a response with an empty body.
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: ResponseBody::empty(),
        }
    }

    /// Set the headers.
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Set the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<ResponseBody>) -> Self {
        self.body = body.into();
        self
    }

    /// Status code.
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Whether the status is in the 2xx range.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Response headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Mutable access to the body stream.
    pub fn body_mut(&mut self) -> &mut ResponseBody {
        &mut self.body
    }

    /// Take the body, dropping status and headers.
    pub fn into_body(self) -> ResponseBody {
        self.body
    }

    /// Read the whole body.
    pub async fn bytes(self) -> io::Result<Bytes> {
        self.body.bytes().await
    }

    /// Read the whole body as UTF-8 text.
    pub async fn text(self) -> io::Result<String> {
        let bytes = self.bytes().await?;
        String::from_utf8(bytes.to_vec()).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// Close the body without reading it.
    pub fn close(self) {
        self.body.close();
    }

    /// Drain up to [`DRAIN_READ_LIMIT`] bytes and close the body so the
    /// underlying connection can be reused.
    pub async fn drain(self) -> io::Result<usize> {
        self.body.drain(DRAIN_READ_LIMIT).await
    }

    /// Like [`drain`](Self::drain), but keeps status and headers readable.
    /// The body is replaced by an empty one.
    pub async fn drain_body(&mut self) -> io::Result<usize> {
        std::mem::replace(&mut self.body, ResponseBody::empty())
            .drain(DRAIN_READ_LIMIT)
            .await
    }
}

impl From<reqwest::Response> for Response {
    fn from(response: reqwest::Response) -> Self {
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = ResponseBody::from_stream(
            response
                .bytes_stream()
                .map(|chunk| chunk.map_err(|e| io::Error::new(io::ErrorKind::Other, e))),
        );
        Self {
            status,
            headers,
            body,
        }
    }
}
