//! Replayable request bodies.
//!
//! A request is sent once per attempt, so its payload has to be readable
//! more than once. [`ReplayableBody`] classifies a payload once, when the
//! request is built, and picks the cheapest way to produce the same bytes
//! again on every [`obtain`](ReplayableBody::obtain):
//!
//! | Payload                         | Replay strategy                           |
//! |---------------------------------|-------------------------------------------|
//! | `Bytes`, `Vec<u8>`, `String`... | re-wrapped, no copy                       |
//! | shared buffer (`Arc<T>`)        | re-read from the shared storage, no copy  |
//! | seekable reader                 | rewound to the start before each read     |
//! | one-shot reader or stream       | buffered in memory on first use           |
//! | factory closure                 | invoked fresh on every attempt            |
//!
//! A seekable reader is shared by every attempt of every request built from
//! it. Do not use the same reader outside the client, or in two overlapping
//! calls, while a call is in flight.

use crate::error::Error;
use bytes::{Bytes, BytesMut};
use futures::stream::{Stream, StreamExt};
use std::any::Any;
use std::fmt;
use std::io::{self, SeekFrom};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncSeek, AsyncSeekExt, ReadBuf};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_util::io::ReaderStream;

pub(crate) type ByteStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send + Sync>>;

/// A readable, seekable payload source.
pub trait SeekableSource: AsyncRead + AsyncSeek + Send + Sync + Unpin {}

impl<T> SeekableSource for T where T: AsyncRead + AsyncSeek + Send + Sync + Unpin {}

type Factory = dyn Fn() -> io::Result<BodyStream> + Send + Sync;

/// A single-use body stream handed to the transport for one attempt.
pub struct BodyStream {
    inner: StreamInner,
    content_length: Option<u64>,
}

enum StreamInner {
    Full(Bytes),
    Stream(ByteStream),
}

impl BodyStream {
    /// A fully buffered body. The content length is known.
    pub fn full(bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        Self {
            content_length: Some(bytes.len() as u64),
            inner: StreamInner::Full(bytes),
        }
    }

    /// A body produced by a stream of chunks. The content length is unknown
    /// unless set with [`with_content_length`](Self::with_content_length).
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = io::Result<Bytes>> + Send + Sync + 'static,
    {
        Self {
            inner: StreamInner::Stream(Box::pin(stream)),
            content_length: None,
        }
    }

    /// A body read from an async reader.
    pub fn from_reader<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + Sync + 'static,
    {
        Self::from_stream(ReaderStream::new(reader))
    }

    /// Declare the content length of the stream.
    #[must_use]
    pub fn with_content_length(mut self, len: u64) -> Self {
        self.content_length = Some(len);
        self
    }

    /// Content length, when known.
    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    /// Read the whole stream into memory.
    pub async fn bytes(self) -> io::Result<Bytes> {
        match self.inner {
            StreamInner::Full(bytes) => Ok(bytes),
            StreamInner::Stream(stream) => collect(stream).await,
        }
    }

    pub(crate) fn into_reqwest(self) -> reqwest::Body {
        match self.inner {
            StreamInner::Full(bytes) => reqwest::Body::from(bytes),
            StreamInner::Stream(stream) => reqwest::Body::wrap_stream(stream),
        }
    }
}

impl fmt::Debug for BodyStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.inner {
            StreamInner::Full(_) => "full",
            StreamInner::Stream(_) => "stream",
        };
        f.debug_struct("BodyStream")
            .field("kind", &kind)
            .field("content_length", &self.content_length)
            .finish()
    }
}

async fn collect(mut stream: ByteStream) -> io::Result<Bytes> {
    let mut buf = BytesMut::new();
    while let Some(chunk) = stream.next().await {
        buf.extend_from_slice(&chunk?);
    }
    Ok(buf.freeze())
}

/// A request payload that can be read once per attempt.
///
/// Cloning is cheap; clones share the same underlying payload.
#[derive(Clone)]
pub struct ReplayableBody {
    source: Source,
}

#[derive(Clone)]
enum Source {
    Bytes(Bytes),
    Shared(Arc<dyn AsRef<[u8]> + Send + Sync>),
    Seekable(Arc<Mutex<Box<dyn SeekableSource>>>),
    OneShot(Arc<Mutex<OneShot>>),
    Factory(Arc<Factory>),
}

enum OneShot {
    Pending(ByteStream),
    Buffered(Bytes),
    Failed,
}

impl ReplayableBody {
    /// A payload backed by an in-memory buffer shared with the caller.
    ///
    /// Each attempt reads the caller's storage directly.
    pub fn shared<T>(buffer: Arc<T>) -> Self
    where
        T: AsRef<[u8]> + Send + Sync + 'static,
    {
        Self {
            source: Source::Shared(buffer),
        }
    }

    /// A payload read from a seekable source, rewound before every attempt.
    pub fn seekable<S>(source: S) -> Self
    where
        S: SeekableSource + 'static,
    {
        let source: Box<dyn SeekableSource> = Box::new(source);
        Self {
            source: Source::Seekable(Arc::new(Mutex::new(source))),
        }
    }

    /// A one-shot reader. It is read to the end on first use and replayed
    /// from memory afterwards.
    pub fn from_reader<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + Sync + 'static,
    {
        Self::from_stream(ReaderStream::new(reader))
    }

    /// A one-shot stream of chunks. It is collected on first use and
    /// replayed from memory afterwards.
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = io::Result<Bytes>> + Send + Sync + 'static,
    {
        Self {
            source: Source::OneShot(Arc::new(Mutex::new(OneShot::Pending(Box::pin(stream))))),
        }
    }

    /// A payload produced by `factory`, called once per attempt.
    ///
    /// The factory is also called once here, so a broken payload is rejected
    /// before any attempt. Every call must yield the same bytes.
    pub fn factory<F>(factory: F) -> io::Result<Self>
    where
        F: Fn() -> io::Result<BodyStream> + Send + Sync + 'static,
    {
        drop(factory()?);
        Ok(Self {
            source: Source::Factory(Arc::new(factory)),
        })
    }

    /// Classify an arbitrary payload value.
    ///
    /// Accepts byte buffers, strings, shared buffers (`Arc<Vec<u8>>`,
    /// `Arc<[u8]>`, `Arc<String>`, `Arc<Bytes>`), in-memory cursors and
    /// an existing `ReplayableBody`. Anything else fails with
    /// [`Error::UnsupportedPayloadType`].
    pub fn classify<T>(payload: T) -> Result<Self, Error>
    where
        T: Any + Send,
    {
        let payload: Box<dyn Any + Send> = Box::new(payload);
        let payload = match payload.downcast::<ReplayableBody>() {
            Ok(body) => return Ok(*body),
            Err(other) => other,
        };
        let payload = match payload.downcast::<Bytes>() {
            Ok(bytes) => return Ok(Self::from(*bytes)),
            Err(other) => other,
        };
        let payload = match payload.downcast::<Vec<u8>>() {
            Ok(buf) => return Ok(Self::from(*buf)),
            Err(other) => other,
        };
        let payload = match payload.downcast::<String>() {
            Ok(s) => return Ok(Self::from(*s)),
            Err(other) => other,
        };
        let payload = match payload.downcast::<&'static str>() {
            Ok(s) => return Ok(Self::from(*s)),
            Err(other) => other,
        };
        let payload = match payload.downcast::<&'static [u8]>() {
            Ok(buf) => return Ok(Self::from(*buf)),
            Err(other) => other,
        };
        let payload = match payload.downcast::<Arc<Vec<u8>>>() {
            Ok(buf) => return Ok(Self::shared(*buf)),
            Err(other) => other,
        };
        let payload = match payload.downcast::<Arc<String>>() {
            Ok(buf) => return Ok(Self::shared(*buf)),
            Err(other) => other,
        };
        let payload = match payload.downcast::<Arc<Bytes>>() {
            Ok(buf) => return Ok(Self::shared(*buf)),
            Err(other) => other,
        };
        let payload = match payload.downcast::<Arc<[u8]>>() {
            Ok(buf) => return Ok(Self::shared(Arc::new(SharedSlice(*buf)))),
            Err(other) => other,
        };
        let payload = match payload.downcast::<io::Cursor<Vec<u8>>>() {
            Ok(cursor) => {
                let position = cursor.position();
                return Ok(Self::from(unread(Bytes::from(cursor.into_inner()), position)));
            }
            Err(other) => other,
        };
        if let Ok(cursor) = payload.downcast::<io::Cursor<Bytes>>() {
            let position = cursor.position();
            return Ok(Self::from(unread(cursor.into_inner(), position)));
        }

        Err(Error::UnsupportedPayloadType {
            type_name: std::any::type_name::<T>(),
        })
    }

    /// Produce a fresh stream over the payload.
    pub async fn obtain(&self) -> io::Result<BodyStream> {
        match &self.source {
            Source::Bytes(bytes) => Ok(BodyStream::full(bytes.clone())),
            Source::Shared(buffer) => Ok(BodyStream::full(Bytes::from_owner(SharedBuffer(
                Arc::clone(buffer),
            )))),
            Source::Seekable(source) => {
                let mut guard = Arc::clone(source).lock_owned().await;
                let len = guard.seek(SeekFrom::End(0)).await?;
                guard.seek(SeekFrom::Start(0)).await?;
                Ok(BodyStream::from_reader(SeekGuard(guard)).with_content_length(len))
            }
            Source::OneShot(state) => {
                let mut state = state.lock().await;
                match std::mem::replace(&mut *state, OneShot::Failed) {
                    OneShot::Buffered(bytes) => {
                        *state = OneShot::Buffered(bytes.clone());
                        Ok(BodyStream::full(bytes))
                    }
                    OneShot::Pending(stream) => {
                        let bytes = collect(stream).await?;
                        *state = OneShot::Buffered(bytes.clone());
                        Ok(BodyStream::full(bytes))
                    }
                    OneShot::Failed => Err(io::Error::new(
                        io::ErrorKind::Other,
                        "one-shot payload failed on its first read and cannot be replayed",
                    )),
                }
            }
            Source::Factory(factory) => {
                let produce: &Factory = &**factory;
                produce()
            }
        }
    }

    /// Content length, when it can be known without reading the payload.
    ///
    /// One-shot payloads report a length only once they have been buffered.
    pub fn content_length(&self) -> Option<u64> {
        match &self.source {
            Source::Bytes(bytes) => Some(bytes.len() as u64),
            Source::Shared(buffer) => Some((**buffer).as_ref().len() as u64),
            Source::OneShot(state) => match state.try_lock().as_deref() {
                Ok(OneShot::Buffered(bytes)) => Some(bytes.len() as u64),
                _ => None,
            },
            Source::Seekable(_) | Source::Factory(_) => None,
        }
    }

    /// Read the payload into memory without consuming it.
    pub async fn bytes(&self) -> io::Result<Bytes> {
        self.obtain().await?.bytes().await
    }

    fn kind(&self) -> &'static str {
        match self.source {
            Source::Bytes(_) => "bytes",
            Source::Shared(_) => "shared",
            Source::Seekable(_) => "seekable",
            Source::OneShot(_) => "one-shot",
            Source::Factory(_) => "factory",
        }
    }
}

impl fmt::Debug for ReplayableBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplayableBody")
            .field("kind", &self.kind())
            .field("content_length", &self.content_length())
            .finish()
    }
}

impl From<Bytes> for ReplayableBody {
    fn from(bytes: Bytes) -> Self {
        Self {
            source: Source::Bytes(bytes),
        }
    }
}

impl From<Vec<u8>> for ReplayableBody {
    fn from(buf: Vec<u8>) -> Self {
        Bytes::from(buf).into()
    }
}

impl From<String> for ReplayableBody {
    fn from(s: String) -> Self {
        Bytes::from(s).into()
    }
}

impl From<&'static str> for ReplayableBody {
    fn from(s: &'static str) -> Self {
        Bytes::from_static(s.as_bytes()).into()
    }
}

impl From<&'static [u8]> for ReplayableBody {
    fn from(buf: &'static [u8]) -> Self {
        Bytes::from_static(buf).into()
    }
}

/// The part of an in-memory cursor that has not been read yet.
fn unread(bytes: Bytes, position: u64) -> Bytes {
    let start = usize::try_from(position).map_or(bytes.len(), |p| p.min(bytes.len()));
    bytes.slice(start..)
}

struct SharedBuffer(Arc<dyn AsRef<[u8]> + Send + Sync>);

impl AsRef<[u8]> for SharedBuffer {
    fn as_ref(&self) -> &[u8] {
        (*self.0).as_ref()
    }
}

struct SharedSlice(Arc<[u8]>);

impl AsRef<[u8]> for SharedSlice {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Holds the seekable source for the lifetime of one attempt's stream.
struct SeekGuard(OwnedMutexGuard<Box<dyn SeekableSource>>);

impl AsyncRead for SeekGuard {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        Pin::new(&mut *this.0).poll_read(cx, buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use rstest::rstest;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const PAYLOAD: &[u8] = b"hello replayable world";

    async fn read_n_times(body: &ReplayableBody, n: usize) -> Vec<Bytes> {
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            out.push(body.obtain().await.unwrap().bytes().await.unwrap());
        }
        out
    }

    fn variants() -> Vec<ReplayableBody> {
        let chunks: Vec<io::Result<Bytes>> = PAYLOAD
            .chunks(5)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        vec![
            ReplayableBody::from(PAYLOAD),
            ReplayableBody::from(PAYLOAD.to_vec()),
            ReplayableBody::shared(Arc::new(PAYLOAD.to_vec())),
            ReplayableBody::seekable(io::Cursor::new(PAYLOAD.to_vec())),
            ReplayableBody::from_reader(io::Cursor::new(PAYLOAD.to_vec())),
            ReplayableBody::from_stream(stream::iter(chunks)),
            ReplayableBody::factory(|| Ok(BodyStream::full(PAYLOAD))).unwrap(),
        ]
    }

    #[tokio::test]
    async fn test_every_variant_replays_identical_bytes() {
        for body in variants() {
            let reads = read_n_times(&body, 4).await;
            for read in reads {
                assert_eq!(&read[..], PAYLOAD, "variant {}", body.kind());
            }
        }
    }

    #[tokio::test]
    async fn test_clones_share_payload() {
        let body = ReplayableBody::from_reader(io::Cursor::new(PAYLOAD.to_vec()));
        let clone = body.clone();
        assert_eq!(&body.bytes().await.unwrap()[..], PAYLOAD);
        assert_eq!(&clone.bytes().await.unwrap()[..], PAYLOAD);
    }

    #[tokio::test]
    async fn test_content_length_known_for_buffers() {
        assert_eq!(
            ReplayableBody::from(PAYLOAD).content_length(),
            Some(PAYLOAD.len() as u64)
        );
        assert_eq!(
            ReplayableBody::shared(Arc::new(PAYLOAD.to_vec())).content_length(),
            Some(PAYLOAD.len() as u64)
        );
    }

    #[tokio::test]
    async fn test_one_shot_length_known_after_first_read() {
        let body = ReplayableBody::from_reader(io::Cursor::new(PAYLOAD.to_vec()));
        assert_eq!(body.content_length(), None);

        let stream = body.obtain().await.unwrap();
        assert_eq!(stream.content_length(), Some(PAYLOAD.len() as u64));
        assert_eq!(body.content_length(), Some(PAYLOAD.len() as u64));
    }

    #[tokio::test]
    async fn test_seekable_rewinds_after_partial_read() {
        use tokio::io::AsyncReadExt;

        let body = ReplayableBody::seekable(io::Cursor::new(PAYLOAD.to_vec()));
        {
            let stream = body.obtain().await.unwrap();
            assert_eq!(stream.content_length(), Some(PAYLOAD.len() as u64));
            // read only a prefix and drop the stream
            let mut reader = tokio_util::io::StreamReader::new(match stream.inner {
                StreamInner::Stream(s) => s,
                StreamInner::Full(_) => unreachable!("seekable payloads stream"),
            });
            let mut prefix = [0u8; 5];
            reader.read_exact(&mut prefix).await.unwrap();
            assert_eq!(&prefix, b"hello");
        }

        assert_eq!(&body.bytes().await.unwrap()[..], PAYLOAD);
    }

    #[tokio::test]
    async fn test_factory_called_per_obtain() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let body = ReplayableBody::factory(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(BodyStream::from_reader(io::Cursor::new(PAYLOAD.to_vec())))
        })
        .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        read_n_times(&body, 3).await;
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(body.content_length(), None);
    }

    #[tokio::test]
    async fn test_factory_error_propagates() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let body = ReplayableBody::factory(move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(BodyStream::full(PAYLOAD))
            } else {
                Err(io::Error::new(io::ErrorKind::NotFound, "payload file missing"))
            }
        })
        .unwrap();
        let err = body.obtain().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_broken_factory_rejected_at_construction() {
        let err = ReplayableBody::factory(|| {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "payload file locked"))
        })
        .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
    }

    #[tokio::test]
    async fn test_failed_one_shot_is_not_replayed() {
        let chunks: Vec<io::Result<Bytes>> = vec![
            Ok(Bytes::from_static(b"abc")),
            Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated")),
        ];
        let body = ReplayableBody::from_stream(stream::iter(chunks));

        assert_eq!(
            body.obtain().await.unwrap_err().kind(),
            io::ErrorKind::UnexpectedEof
        );
        assert!(body.obtain().await.is_err());
    }

    #[rstest]
    #[case::vec(ReplayableBody::classify(PAYLOAD.to_vec()))]
    #[case::string(ReplayableBody::classify(String::from_utf8_lossy(PAYLOAD).into_owned()))]
    #[case::static_bytes(ReplayableBody::classify(PAYLOAD))]
    #[case::bytes(ReplayableBody::classify(Bytes::from_static(PAYLOAD)))]
    #[case::shared(ReplayableBody::classify(Arc::new(PAYLOAD.to_vec())))]
    #[case::shared_slice(ReplayableBody::classify(Arc::<[u8]>::from(PAYLOAD)))]
    #[case::cursor(ReplayableBody::classify(io::Cursor::new(PAYLOAD.to_vec())))]
    #[tokio::test]
    async fn test_classify_supported(#[case] body: Result<ReplayableBody, Error>) {
        let body = body.unwrap();
        assert_eq!(&body.bytes().await.unwrap()[..], PAYLOAD);
    }

    #[tokio::test]
    async fn test_classify_cursor_replays_unread_bytes_from_memory() {
        let mut cursor = io::Cursor::new(PAYLOAD.to_vec());
        cursor.set_position(6);
        let body = ReplayableBody::classify(cursor).unwrap();

        assert_eq!(body.kind(), "bytes");
        assert_eq!(body.content_length(), Some(PAYLOAD.len() as u64 - 6));
        for read in read_n_times(&body, 2).await {
            assert_eq!(&read[..], b"replayable world");
        }

        let mut past_end = io::Cursor::new(Bytes::from_static(PAYLOAD));
        past_end.set_position(1000);
        let body = ReplayableBody::classify(past_end).unwrap();
        assert_eq!(body.content_length(), Some(0));
    }

    #[test]
    fn test_classify_unsupported() {
        let err = ReplayableBody::classify(42u64).unwrap_err();
        match err {
            Error::UnsupportedPayloadType { type_name } => assert_eq!(type_name, "u64"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
