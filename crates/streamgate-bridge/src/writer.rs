//! The response object handed to the application.
//!
//! [`ResponseWriter`] keeps a pending status and header map until the first
//! body write (or `end`), at which point the preamble is committed to the
//! sink exactly once. The sink decides what committing means: the streaming
//! sink forwards everything to the output channel immediately, the
//! buffered sink collects into memory and hands over a
//! [`BufferedResponse`] when the writer is ended.

use bytes::{Bytes, BytesMut};
use streamgate_http::{BufferedResponse, Header, HeaderMap, HttpError, Preamble, Response};
use tokio::sync::oneshot;
use tracing::trace;

use crate::channel::OutputChannel;
use crate::error::{BridgeError, BridgeResult};

/// Where committed bytes go.
enum Sink {
    Streaming(StreamingSink),
    Buffered(BufferedSink),
}

struct StreamingSink {
    channel: OutputChannel,
}

struct BufferedSink {
    preamble: Option<Preamble>,
    body: BytesMut,
    deliver: Option<oneshot::Sender<BufferedResponse>>,
}

impl Sink {
    async fn commit(&mut self, preamble: Preamble) -> BridgeResult<()> {
        match self {
            Sink::Streaming(s) => Ok(s.channel.set_metadata(preamble).await?),
            Sink::Buffered(b) => {
                b.preamble = Some(preamble);
                Ok(())
            }
        }
    }

    async fn write(&mut self, chunk: Bytes) -> BridgeResult<()> {
        match self {
            Sink::Streaming(s) => Ok(s.channel.append(chunk).await?),
            Sink::Buffered(b) => {
                b.body.extend_from_slice(&chunk);
                Ok(())
            }
        }
    }

    async fn finish(&mut self) -> BridgeResult<()> {
        match self {
            Sink::Streaming(s) => Ok(s.channel.end().await?),
            Sink::Buffered(b) => {
                let deliver = b.deliver.take().ok_or(BridgeError::ChannelWriteAfterEnd)?;
                let response = BufferedResponse {
                    preamble: b.preamble.take().unwrap_or_default(),
                    body: std::mem::take(&mut b.body).freeze(),
                };
                // The receiver only goes away when the invocation is torn down.
                let _ = deliver.send(response);
                Ok(())
            }
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Sink::Streaming(_) => "streaming",
            Sink::Buffered(_) => "buffered",
        }
    }
}

/// Synthetic response object passed to [`Framework::dispatch`].
///
/// Dropping the writer without calling [`end`](ResponseWriter::end) is
/// treated as an abandoned response.
///
/// [`Framework::dispatch`]: crate::Framework::dispatch
pub struct ResponseWriter {
    status: u16,
    headers: HeaderMap,
    preamble_sent: bool,
    sink: Sink,
    finished: Option<oneshot::Sender<()>>,
}

impl ResponseWriter {
    fn with_sink(sink: Sink) -> (Self, oneshot::Receiver<()>) {
        let (finished_tx, finished_rx) = oneshot::channel();
        let writer = Self {
            status: 200,
            headers: HeaderMap::new(),
            preamble_sent: false,
            sink,
            finished: Some(finished_tx),
        };
        (writer, finished_rx)
    }

    /// A writer that forwards every commit straight to `channel`.
    pub(crate) fn streaming(channel: OutputChannel) -> (Self, oneshot::Receiver<()>) {
        Self::with_sink(Sink::Streaming(StreamingSink { channel }))
    }

    /// A writer that collects the whole response in memory.
    pub(crate) fn buffered() -> (
        Self,
        oneshot::Receiver<()>,
        oneshot::Receiver<BufferedResponse>,
    ) {
        let (deliver_tx, deliver_rx) = oneshot::channel();
        let (writer, finished_rx) = Self::with_sink(Sink::Buffered(BufferedSink {
            preamble: None,
            body: BytesMut::new(),
            deliver: Some(deliver_tx),
        }));
        (writer, finished_rx, deliver_rx)
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn set_status(&mut self, status: u16) -> BridgeResult<()> {
        self.ensure_pending()?;
        if !(100..=999).contains(&status) {
            return Err(HttpError::InvalidStatus(status).into());
        }
        self.status = status;
        Ok(())
    }

    /// Set a pending header. A later call with the same name in any case
    /// replaces the earlier value, including values added with
    /// [`append_header`](ResponseWriter::append_header).
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) -> BridgeResult<()> {
        self.ensure_pending()?;
        let header = Header::new(name, value);
        header.validate()?;
        self.headers.insert(header.name, header.value);
        Ok(())
    }

    /// Add a pending header without replacing earlier values of the same
    /// name. Use it for headers that repeat, such as `set-cookie`;
    /// [`set_header`](ResponseWriter::set_header) keeps only the last value.
    pub fn append_header(&mut self, name: &str, value: impl Into<String>) -> BridgeResult<()> {
        self.ensure_pending()?;
        let header = Header::new(name, value);
        header.validate()?;
        self.headers.append(header.name, header.value);
        Ok(())
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn remove_header(&mut self, name: &str) -> BridgeResult<Option<String>> {
        self.ensure_pending()?;
        Ok(self.headers.remove(name))
    }

    /// Set status and merge `headers` into the pending set in one call.
    /// Each name in `headers` replaces the pending values for that name;
    /// repeated names inside `headers` are all kept. Nothing is committed
    /// until the first write or `end`.
    pub fn write_head(&mut self, status: u16, headers: HeaderMap) -> BridgeResult<()> {
        self.set_status(status)?;
        let mut seen: Vec<String> = Vec::new();
        for header in headers.into_vec() {
            if seen.contains(&header.name) {
                self.append_header(&header.name, header.value)?;
            } else {
                self.set_header(&header.name, header.value)?;
                seen.push(header.name);
            }
        }
        Ok(())
    }

    /// Whether the preamble has been committed.
    pub fn headers_sent(&self) -> bool {
        self.preamble_sent
    }

    /// Write a body chunk, committing the preamble first if needed.
    pub async fn write_chunk(&mut self, chunk: impl Into<Bytes>) -> BridgeResult<()> {
        self.send_preamble_once().await?;
        let chunk = chunk.into();
        if chunk.is_empty() {
            return Ok(());
        }
        self.sink.write(chunk).await
    }

    /// Finish the response. A zero-byte body still commits the preamble.
    pub async fn end(self) -> BridgeResult<()> {
        self.end_with(Bytes::new()).await
    }

    /// Write a final chunk and finish the response.
    pub async fn end_with(mut self, chunk: impl Into<Bytes>) -> BridgeResult<()> {
        self.write_chunk(chunk).await?;
        self.sink.finish().await?;
        trace!(sink = self.sink.kind(), status = self.status, "response ended");
        if let Some(finished) = self.finished.take() {
            let _ = finished.send(());
        }
        Ok(())
    }

    /// Write a whole [`Response`], draining a streaming body chunk by chunk.
    pub async fn send(mut self, response: Response) -> BridgeResult<()> {
        let (preamble, mut body) = response.into_parts();
        self.write_head(preamble.status, preamble.headers)?;
        self.send_preamble_once().await?;
        while let Some(chunk) = std::future::poll_fn(|cx| body.as_mut().poll_next(cx)).await {
            self.write_chunk(chunk).await?;
        }
        self.end().await
    }

    fn ensure_pending(&self) -> BridgeResult<()> {
        if self.preamble_sent {
            return Err(BridgeError::HeadersSent);
        }
        Ok(())
    }

    async fn send_preamble_once(&mut self) -> BridgeResult<()> {
        if self.preamble_sent {
            return Ok(());
        }
        let preamble = Preamble::new(self.status, self.headers.clone());
        self.sink.commit(preamble).await?;
        self.preamble_sent = true;
        Ok(())
    }
}

impl std::fmt::Debug for ResponseWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseWriter")
            .field("sink", &self.sink.kind())
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("preamble_sent", &self.preamble_sent)
            .finish()
    }
}
