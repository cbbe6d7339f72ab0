//! Bridge error types.

use streamgate_http::HttpError;
use thiserror::Error;

/// Errors raised by the output channel.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChannelError {
    /// The consumer went away (client disconnect or platform teardown).
    #[error("output channel closed by the consumer")]
    Closed,

    #[error("write after end of stream")]
    WriteAfterEnd,

    #[error("response metadata already set")]
    MetadataAlreadySet,

    #[error("body written before response metadata")]
    MissingPreamble,

    /// The producer terminated the stream with an error after committing.
    #[error("stream aborted: {0}")]
    Aborted(String),
}

/// Errors that can occur while bridging one invocation.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The invocation event could not be turned into a request. Fatal; the
    /// application is never called.
    #[error("malformed invocation: {0}")]
    MalformedInvocation(String),

    /// The streaming attempt failed before anything reached the channel.
    #[error("stream setup failed: {0}")]
    StreamSetupFailure(#[source] anyhow::Error),

    /// The streaming attempt failed after the preamble was committed.
    #[error("stream failed after flush: {0}")]
    StreamFailureAfterFlush(#[source] anyhow::Error),

    /// A write reached the channel after end of stream.
    #[error("write after end of stream")]
    ChannelWriteAfterEnd,

    /// Status or headers changed after the preamble was sent.
    #[error("headers already sent")]
    HeadersSent,

    /// The application dropped the response without ending it.
    #[error("response dropped without end")]
    ResponseAbandoned,

    /// The application failed on the buffered path.
    #[error("application error: {0}")]
    Framework(#[source] anyhow::Error),

    #[error("invalid streaming route: {0}")]
    InvalidRoute(String),

    #[error(transparent)]
    Http(#[from] HttpError),

    #[error("output channel error: {0}")]
    Channel(ChannelError),
}

impl From<ChannelError> for BridgeError {
    fn from(err: ChannelError) -> Self {
        match err {
            ChannelError::WriteAfterEnd => BridgeError::ChannelWriteAfterEnd,
            other => BridgeError::Channel(other),
        }
    }
}

pub type BridgeResult<T> = Result<T, BridgeError>;
