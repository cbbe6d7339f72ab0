use bytes::Bytes;
use futures_core::Stream;

use crate::body::{EmptyInfallibleStream, InfallibleByteStream, OnceStream};
use crate::header::HeaderMap;

/// Status code and header snapshot that precede a response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preamble {
    pub status: u16,
    pub headers: HeaderMap,
}

impl Preamble {
    pub fn new(status: u16, headers: HeaderMap) -> Self {
        Self { status, headers }
    }
}

impl Default for Preamble {
    fn default() -> Self {
        Self::new(200, HeaderMap::new())
    }
}

/// A complete response assembled in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferedResponse {
    pub preamble: Preamble,
    pub body: Bytes,
}

/// A response value an application can hand over in one piece.
///
/// The body is either pre-buffered or a stream that is drained chunk by
/// chunk when the response is written out, so a streaming body is never
/// collected unless the caller asks for it with
/// [`into_bytes()`](Response::into_bytes).
pub struct Response {
    status: u16,
    headers: HeaderMap,
    body: ResponseBody,
}

enum ResponseBody {
    Buffered(Bytes),
    Streaming(InfallibleByteStream),
}

impl Response {
    pub fn new(status: u16, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers,
            body: ResponseBody::Buffered(body.into()),
        }
    }

    pub fn empty(status: u16, headers: HeaderMap) -> Self {
        Self::new(status, headers, Bytes::new())
    }

    /// Create a response whose body is produced incrementally.
    pub fn streaming(
        status: u16,
        headers: HeaderMap,
        stream: impl Stream<Item = Bytes> + Send + 'static,
    ) -> Self {
        Self {
            status,
            headers,
            body: ResponseBody::Streaming(Box::pin(stream)),
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self.body, ResponseBody::Streaming(_))
    }

    /// Split into the preamble and a body stream. A buffered body becomes a
    /// single chunk; an empty one yields nothing.
    pub fn into_parts(self) -> (Preamble, InfallibleByteStream) {
        let stream: InfallibleByteStream = match self.body {
            ResponseBody::Buffered(bytes) if bytes.is_empty() => Box::pin(EmptyInfallibleStream),
            ResponseBody::Buffered(bytes) => Box::pin(OnceStream(Some(bytes))),
            ResponseBody::Streaming(stream) => stream,
        };
        (Preamble::new(self.status, self.headers), stream)
    }

    /// Collect the whole body into one buffer.
    pub async fn into_bytes(self) -> Bytes {
        match self.body {
            ResponseBody::Buffered(bytes) => bytes,
            ResponseBody::Streaming(mut stream) => {
                let mut collected = Vec::new();
                while let Some(chunk) =
                    std::future::poll_fn(|cx| stream.as_mut().poll_next(cx)).await
                {
                    collected.extend_from_slice(&chunk);
                }
                Bytes::from(collected)
            }
        }
    }
}

impl std::fmt::Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("streaming", &self.is_streaming())
            .finish()
    }
}
