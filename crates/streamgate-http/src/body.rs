//! Body stream primitives.
//!
//! [`ChunkedBytesStream`] slices an in-memory body into fixed-size chunks
//! with `Bytes::slice()`, so the application can consume a request body
//! incrementally without a copy. The small helper streams below keep
//! `futures-util` out of the runtime dependencies.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_core::Stream;

use crate::HttpError;

/// Default chunk size when slicing a buffered body into a stream (64 KB).
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// A type-erased, fallible stream of body chunks.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, HttpError>> + Send>>;

/// A type-erased, infallible stream of body chunks.
pub type InfallibleByteStream = Pin<Box<dyn Stream<Item = Bytes> + Send>>;

/// Yields a buffer in `chunk_size` slices that share its allocation.
pub(crate) struct ChunkedBytesStream {
    buf: Bytes,
    chunk_size: usize,
    offset: usize,
}

impl ChunkedBytesStream {
    pub fn new(buf: Bytes, chunk_size: usize) -> Self {
        assert!(chunk_size > 0, "chunk_size must be > 0");
        Self {
            buf,
            chunk_size,
            offset: 0,
        }
    }
}

impl Stream for ChunkedBytesStream {
    type Item = Result<Bytes, HttpError>;

    fn poll_next(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.offset >= this.buf.len() {
            return Poll::Ready(None);
        }
        let end = std::cmp::min(this.offset + this.chunk_size, this.buf.len());
        let chunk = this.buf.slice(this.offset..end);
        this.offset = end;
        Poll::Ready(Some(Ok(chunk)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.buf.len().saturating_sub(self.offset);
        let n = remaining.div_ceil(self.chunk_size);
        (n, Some(n))
    }
}

// ── Helper streams ──────────────────────────────────────────────────

pub(crate) struct EmptyFallibleStream;

impl Stream for EmptyFallibleStream {
    type Item = Result<Bytes, HttpError>;

    fn poll_next(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Poll::Ready(None)
    }
}

pub(crate) struct EmptyInfallibleStream;

impl Stream for EmptyInfallibleStream {
    type Item = Bytes;

    fn poll_next(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Poll::Ready(None)
    }
}

/// Yields one buffer, then ends.
pub(crate) struct OnceStream(pub Option<Bytes>);

impl Stream for OnceStream {
    type Item = Bytes;

    fn poll_next(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Poll::Ready(self.get_mut().0.take())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(stream: &mut ChunkedBytesStream) -> Vec<Bytes> {
        let mut chunks = Vec::new();
        let mut cx = Context::from_waker(std::task::Waker::noop());
        while let Poll::Ready(Some(item)) = Pin::new(&mut *stream).poll_next(&mut cx) {
            chunks.push(item.expect("chunked stream is infallible"));
        }
        chunks
    }

    #[test]
    fn chunked_stream_remainder() {
        let mut stream = ChunkedBytesStream::new(Bytes::from(vec![0xBB; 3000]), 1024);
        assert_eq!(stream.size_hint(), (3, Some(3)));

        let chunks = drain(&mut stream);
        let sizes: Vec<usize> = chunks.iter().map(Bytes::len).collect();
        assert_eq!(sizes, vec![1024, 1024, 952]);
    }

    #[test]
    fn chunked_stream_empty_body() {
        let mut stream = ChunkedBytesStream::new(Bytes::new(), 1024);
        assert!(drain(&mut stream).is_empty());
    }

    #[test]
    fn chunked_stream_shares_allocation() {
        let original = Bytes::from(vec![0xFF; 8192]);
        let ptr = original.as_ptr();

        let mut stream = ChunkedBytesStream::new(original, 4096);
        let chunks = drain(&mut stream);

        assert_eq!(chunks[0].as_ptr(), ptr);
        assert_eq!(chunks[1].as_ptr(), ptr.wrapping_add(4096));
    }

    #[test]
    #[should_panic(expected = "chunk_size must be > 0")]
    fn chunked_stream_zero_chunk_size_panics() {
        let _ = ChunkedBytesStream::new(Bytes::new(), 0);
    }

    #[test]
    fn once_stream_yields_then_ends() {
        let mut stream = OnceStream(Some(Bytes::from("hello")));
        let mut cx = Context::from_waker(std::task::Waker::noop());

        match Pin::new(&mut stream).poll_next(&mut cx) {
            Poll::Ready(Some(b)) => assert_eq!(b, "hello"),
            other => panic!("expected Some, got {other:?}"),
        }
        assert!(matches!(
            Pin::new(&mut stream).poll_next(&mut cx),
            Poll::Ready(None)
        ));
    }

    #[test]
    fn empty_streams_end_immediately() {
        let mut cx = Context::from_waker(std::task::Waker::noop());
        assert!(matches!(
            Pin::new(&mut EmptyFallibleStream).poll_next(&mut cx),
            Poll::Ready(None)
        ));
        assert!(matches!(
            Pin::new(&mut EmptyInfallibleStream).poll_next(&mut cx),
            Poll::Ready(None)
        ));
    }
}
