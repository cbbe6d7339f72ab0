use bytes::Bytes;
use http::Method;

use crate::body::{ByteStream, ChunkedBytesStream, DEFAULT_CHUNK_SIZE, EmptyFallibleStream};
use crate::header::HeaderMap;
use crate::HttpError;

/// The canonical, immutable description of one invocation's request.
///
/// Construction always (re)writes `content-length` to the real body
/// length, so the application never sees a client-supplied value that
/// disagrees with the bytes it will read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedRequest {
    method: Method,
    path: String,
    query: Option<String>,
    headers: HeaderMap,
    body: Bytes,
    request_id: Option<String>,
}

impl NormalizedRequest {
    pub fn new(
        method: Method,
        path: impl Into<String>,
        query: Option<String>,
        mut headers: HeaderMap,
        body: impl Into<Bytes>,
    ) -> Self {
        let body = body.into();
        headers.insert("content-length", body.len().to_string());
        Self {
            method,
            path: path.into(),
            query: query.filter(|q| !q.is_empty()),
            headers,
            body,
            request_id: None,
        }
    }

    /// Attach the platform's request id.
    pub fn with_request_id(self, request_id: impl Into<String>) -> Self {
        Self {
            request_id: Some(request_id.into()),
            ..self
        }
    }

    /// Derive a copy with one extra header. `content-length` cannot be
    /// overridden this way.
    pub fn with_header(&self, name: &str, value: impl Into<String>) -> Self {
        let mut derived = self.clone();
        if !name.eq_ignore_ascii_case("content-length") {
            derived.headers.insert(name, value);
        }
        derived
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Path plus `?query` when a query string is present.
    pub fn url(&self) -> String {
        match &self.query {
            Some(q) => format!("{}?{}", self.path, q),
            None => self.path.clone(),
        }
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    /// Build a fresh application-facing request. Each call yields an
    /// independent body that can be consumed once.
    pub fn to_incoming(&self) -> IncomingRequest {
        IncomingRequest {
            method: self.method.clone(),
            path: self.path.clone(),
            url: self.url(),
            headers: self.headers.clone(),
            body: Some(self.body.clone()),
        }
    }
}

/// The request object handed to the wrapped application.
///
/// The body is readable exactly once. It is already fully in memory, so
/// reads complete without waiting on the network.
#[derive(Debug)]
pub struct IncomingRequest {
    method: Method,
    path: String,
    url: String,
    headers: HeaderMap,
    body: Option<Bytes>,
}

impl IncomingRequest {
    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Path and query, e.g. `/chat?session=1`.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn is_body_consumed(&self) -> bool {
        self.body.is_none()
    }

    /// Take the whole body.
    pub fn take_body(&mut self) -> Result<Bytes, HttpError> {
        self.body.take().ok_or(HttpError::BodyConsumed)
    }

    /// Take the body as a stream of [`DEFAULT_CHUNK_SIZE`] chunks.
    pub fn body_stream(&mut self) -> Result<ByteStream, HttpError> {
        self.body_stream_chunked(DEFAULT_CHUNK_SIZE)
    }

    /// Like [`body_stream()`](IncomingRequest::body_stream) with a custom
    /// chunk size.
    pub fn body_stream_chunked(&mut self, chunk_size: usize) -> Result<ByteStream, HttpError> {
        let body = self.take_body()?;
        if body.is_empty() {
            return Ok(Box::pin(EmptyFallibleStream));
        }
        Ok(Box::pin(ChunkedBytesStream::new(body, chunk_size)))
    }
}
