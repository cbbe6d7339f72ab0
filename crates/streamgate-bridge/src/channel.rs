//! The per-invocation output channel.
//!
//! [`OutputChannel`] is the producer half handed to the bridge. It accepts
//! the response metadata exactly once, then body chunks, then an end (or
//! an abort). [`ChannelReceiver`] is the consumer half held by whatever
//! delivers bytes to the client: the Lambda runtime or the local trigger.
//!
//! The receiver reports delivery back to the producer. Reading the end of
//! stream marks the channel [`Delivery::Finished`]; dropping the receiver
//! before that marks it [`Delivery::Closed`].

use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_core::Stream;
use streamgate_http::Preamble;
use tokio::sync::{mpsc, watch};

use crate::completion::Completion;
use crate::error::ChannelError;

/// One unit passed from producer to consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Preamble(Preamble),
    Data(Bytes),
    End,
    Abort(String),
}

/// Delivery status as observed by the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Open,
    /// The consumer read the end of stream.
    Finished,
    /// The consumer went away before the end of stream.
    Closed,
}

#[derive(Debug, Default)]
struct ChannelState {
    preamble_sent: bool,
    ended: bool,
    bytes_sent: u64,
}

/// Create a bounded channel holding at most `capacity` frames in flight.
pub fn output_channel(capacity: usize) -> (OutputChannel, ChannelReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let (delivery_tx, delivery_rx) = watch::channel(Delivery::Open);
    (
        OutputChannel {
            tx,
            state: Arc::new(Mutex::new(ChannelState::default())),
            delivery: delivery_rx,
        },
        ChannelReceiver {
            rx,
            delivery: delivery_tx,
            preamble: None,
            done: false,
        },
    )
}

/// Producer half of the output channel. Clones share state.
#[derive(Debug, Clone)]
pub struct OutputChannel {
    tx: mpsc::Sender<Frame>,
    state: Arc<Mutex<ChannelState>>,
    delivery: watch::Receiver<Delivery>,
}

impl OutputChannel {
    /// Commit the response metadata. Allowed once, before any body byte.
    pub async fn set_metadata(&self, preamble: Preamble) -> Result<(), ChannelError> {
        {
            let mut state = self.state.lock().expect("channel state lock");
            if state.ended {
                return Err(ChannelError::WriteAfterEnd);
            }
            if state.preamble_sent {
                return Err(ChannelError::MetadataAlreadySet);
            }
            state.preamble_sent = true;
        }
        self.send(Frame::Preamble(preamble)).await
    }

    /// Append body bytes. Empty chunks are dropped.
    pub async fn append(&self, chunk: Bytes) -> Result<(), ChannelError> {
        {
            let mut state = self.state.lock().expect("channel state lock");
            if state.ended {
                return Err(ChannelError::WriteAfterEnd);
            }
            if !state.preamble_sent {
                return Err(ChannelError::MissingPreamble);
            }
            if chunk.is_empty() {
                return Ok(());
            }
            state.bytes_sent += chunk.len() as u64;
        }
        self.send(Frame::Data(chunk)).await
    }

    /// Signal end of stream. No writes are accepted afterwards.
    pub async fn end(&self) -> Result<(), ChannelError> {
        {
            let mut state = self.state.lock().expect("channel state lock");
            if state.ended {
                return Err(ChannelError::WriteAfterEnd);
            }
            if !state.preamble_sent {
                return Err(ChannelError::MissingPreamble);
            }
            state.ended = true;
        }
        self.send(Frame::End).await
    }

    /// Terminate the stream with an error the consumer will surface.
    pub async fn abort(&self, reason: impl Into<String>) -> Result<(), ChannelError> {
        {
            let mut state = self.state.lock().expect("channel state lock");
            if state.ended {
                return Err(ChannelError::WriteAfterEnd);
            }
            state.ended = true;
        }
        self.send(Frame::Abort(reason.into())).await
    }

    /// Whether the preamble has been committed.
    pub fn is_committed(&self) -> bool {
        self.state.lock().expect("channel state lock").preamble_sent
    }

    pub fn is_ended(&self) -> bool {
        self.state.lock().expect("channel state lock").ended
    }

    pub fn bytes_sent(&self) -> u64 {
        self.state.lock().expect("channel state lock").bytes_sent
    }

    pub fn delivery(&self) -> Delivery {
        *self.delivery.borrow()
    }

    /// A handle that resolves once the consumer finished or went away.
    pub fn completion(&self) -> Completion {
        Completion::new(self.delivery.clone())
    }

    async fn send(&self, frame: Frame) -> Result<(), ChannelError> {
        self.tx.send(frame).await.map_err(|_| ChannelError::Closed)
    }
}

/// Consumer half of the output channel.
///
/// Use [`recv`](ChannelReceiver::recv) to observe raw frames, or
/// [`recv_preamble`](ChannelReceiver::recv_preamble) followed by polling
/// the receiver as a `Stream` of body chunks.
#[derive(Debug)]
pub struct ChannelReceiver {
    rx: mpsc::Receiver<Frame>,
    delivery: watch::Sender<Delivery>,
    preamble: Option<Preamble>,
    done: bool,
}

impl ChannelReceiver {
    /// Receive the next raw frame. Reading [`Frame::End`] marks delivery
    /// finished. `None` once every producer is gone.
    pub async fn recv(&mut self) -> Option<Frame> {
        let frame = self.rx.recv().await;
        if matches!(frame, Some(Frame::End)) {
            self.finish();
        }
        frame
    }

    /// Wait for the preamble. `None` means the producer went away without
    /// committing a response.
    pub async fn recv_preamble(&mut self) -> Option<Preamble> {
        if let Some(preamble) = self.preamble.take() {
            return Some(preamble);
        }
        match self.recv().await {
            Some(Frame::Preamble(preamble)) => Some(preamble),
            _ => {
                self.done = true;
                None
            }
        }
    }

    /// Whether delivery was marked finished.
    pub fn is_finished(&self) -> bool {
        *self.delivery.borrow() == Delivery::Finished
    }

    fn finish(&mut self) {
        self.done = true;
        self.delivery.send_replace(Delivery::Finished);
    }
}

impl Stream for ChannelReceiver {
    type Item = Result<Bytes, ChannelError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if this.done {
                return Poll::Ready(None);
            }
            match this.rx.poll_recv(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Some(Frame::Preamble(preamble))) => this.preamble = Some(preamble),
                Poll::Ready(Some(Frame::Data(chunk))) => return Poll::Ready(Some(Ok(chunk))),
                Poll::Ready(Some(Frame::End)) => {
                    this.finish();
                    return Poll::Ready(None);
                }
                Poll::Ready(Some(Frame::Abort(reason))) => {
                    this.done = true;
                    return Poll::Ready(Some(Err(ChannelError::Aborted(reason))));
                }
                Poll::Ready(None) => {
                    this.done = true;
                    return Poll::Ready(Some(Err(ChannelError::Aborted(
                        "producer dropped before end of stream".to_string(),
                    ))));
                }
            }
        }
    }
}

impl Drop for ChannelReceiver {
    fn drop(&mut self) {
        self.delivery.send_if_modified(|d| {
            if *d == Delivery::Open {
                *d = Delivery::Closed;
                true
            } else {
                false
            }
        });
    }
}
